//! Mock implementations of the collaborator traits.
//!
//! All mocks are thread-safe so a test can keep an `Arc` while the
//! orchestrator holds another.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::traits::{AgentInvoker, InactivityChoice, InactivityPrompter};
use crate::error::{LoopError, Result};
use crate::ui::{LogLevel, LoopStatus, UiMessage, UiSink};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock agent recording every prompt it receives.
///
/// # Example
///
/// ```rust,ignore
/// let agent = MockAgent::new().with_error("not installed");
/// assert!(agent.trigger_agent("prompt").await.is_err());
/// assert_eq!(agent.call_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockAgent {
    error: Option<String>,
    prompts: Mutex<Vec<String>>,
    generation_prompts: Mutex<Vec<String>>,
    call_count: AtomicU32,
}

impl MockAgent {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the mock to fail every call.
    #[must_use]
    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// Number of calls to `trigger_agent`.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    #[must_use]
    pub fn generation_prompts(&self) -> Vec<String> {
        lock(&self.generation_prompts).clone()
    }

    fn result(&self) -> Result<()> {
        match &self.error {
            Some(error) => Err(LoopError::agent(error.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AgentInvoker for MockAgent {
    async fn trigger_agent(&self, prompt: &str) -> Result<()> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.prompts).push(prompt.to_string());
        self.result()
    }

    async fn trigger_document_generation(&self, prompt: &str) -> Result<()> {
        lock(&self.generation_prompts).push(prompt.to_string());
        self.result()
    }
}

/// Mock prompter answering from a scripted queue.
///
/// Once the queue is empty every question is dismissed.
#[derive(Debug, Default)]
pub struct MockPrompter {
    answers: Mutex<VecDeque<Option<InactivityChoice>>>,
    questions: Mutex<Vec<String>>,
    notices: Mutex<Vec<(LogLevel, String)>>,
}

impl MockPrompter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an answer.
    #[must_use]
    pub fn with_answer(self, answer: InactivityChoice) -> Self {
        lock(&self.answers).push_back(Some(answer));
        self
    }

    /// Queue a dismissed dialog.
    #[must_use]
    pub fn with_dismissal(self) -> Self {
        lock(&self.answers).push_back(None);
        self
    }

    /// Task descriptions the prompter was asked about.
    #[must_use]
    pub fn questions(&self) -> Vec<String> {
        lock(&self.questions).clone()
    }

    #[must_use]
    pub fn notices(&self) -> Vec<(LogLevel, String)> {
        lock(&self.notices).clone()
    }
}

#[async_trait]
impl InactivityPrompter for MockPrompter {
    async fn ask(&self, task_description: &str) -> Option<InactivityChoice> {
        lock(&self.questions).push(task_description.to_string());
        lock(&self.answers).pop_front().flatten()
    }

    fn notify(&self, level: LogLevel, message: &str) {
        lock(&self.notices).push((level, message.to_string()));
    }
}

/// UI sink keeping every message it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<UiMessage>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<UiMessage> {
        lock(&self.messages).clone()
    }

    /// Every `(status, iteration)` pair broadcast so far.
    #[must_use]
    pub fn statuses(&self) -> Vec<(LoopStatus, u32)> {
        lock(&self.messages)
            .iter()
            .filter_map(|m| match m {
                UiMessage::Status {
                    status, iteration, ..
                } => Some((*status, *iteration)),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn last_status(&self) -> Option<(LoopStatus, u32)> {
        self.statuses().pop()
    }

    /// Every countdown value broadcast so far.
    #[must_use]
    pub fn countdowns(&self) -> Vec<u32> {
        lock(&self.messages)
            .iter()
            .filter_map(|m| match m {
                UiMessage::Countdown { seconds } => Some(*seconds),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn logs(&self) -> Vec<String> {
        lock(&self.messages)
            .iter()
            .filter_map(|m| match m {
                UiMessage::Log { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.messages).clear();
    }
}

impl UiSink for RecordingSink {
    fn deliver(&self, message: UiMessage) {
        lock(&self.messages).push(message);
    }
}
