//! Task runner: iteration accounting, per-task timing and agent delegation.
//!
//! The runner never waits for the agent to finish. Completion is inferred by
//! the orchestrator from task-document changes and reported back through
//! [`TaskRunner::record_task_completion`].

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::error::{LoopError, Result};
use crate::history::TaskCompletion;
use crate::prd::Task;
use crate::testing::AgentInvoker;

// ============================================================================
// Task Runner
// ============================================================================

/// Tracks iterations and the task currently handed to the agent.
pub struct TaskRunner {
    agent: Arc<dyn AgentInvoker>,
    iteration: u32,
    max_iterations: u32,
    current_task: Option<Task>,
    task_started_at: Option<DateTime<Utc>>,
    history: Vec<TaskCompletion>,
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("iteration", &self.iteration)
            .field("max_iterations", &self.max_iterations)
            .field("current_task", &self.current_task)
            .field("history", &self.history.len())
            .finish()
    }
}

impl TaskRunner {
    #[must_use]
    pub fn new(agent: Arc<dyn AgentInvoker>, max_iterations: u32) -> Self {
        Self {
            agent,
            iteration: 0,
            max_iterations,
            current_task: None,
            task_started_at: None,
            history: Vec::new(),
        }
    }

    #[must_use]
    pub fn agent(&self) -> &Arc<dyn AgentInvoker> {
        &self.agent
    }

    /// Start the agent on a task prompt. Failures are logged.
    pub async fn trigger_agent(&self, prompt: &str) -> bool {
        info!("Starting agent for iteration {}", self.iteration);
        match self.agent.trigger_agent(prompt).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Agent invocation failed: {}", e);
                false
            }
        }
    }

    /// Start the agent on writing the task document. Failures are logged.
    pub async fn trigger_prd_generation(&self, prompt: &str) -> bool {
        info!("Starting agent for task document generation");
        match self.agent.trigger_document_generation(prompt).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Document generation failed to start: {}", e);
                false
            }
        }
    }

    // ------------------------------------------------------------------------
    // Iterations
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    #[must_use]
    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn set_max_iterations(&mut self, max_iterations: u32) {
        self.max_iterations = max_iterations;
    }

    /// Whether another iteration may run. A ceiling of 0 never refuses.
    #[must_use]
    pub fn check_iteration_limit(&self) -> bool {
        if self.max_iterations > 0 && self.iteration >= self.max_iterations {
            info!(
                "Iteration limit reached ({}/{})",
                self.iteration, self.max_iterations
            );
            return false;
        }
        true
    }

    pub fn increment_iteration(&mut self) -> u32 {
        self.iteration += 1;
        self.iteration
    }

    pub fn reset_iterations(&mut self) {
        self.iteration = 0;
    }

    // ------------------------------------------------------------------------
    // Current task and timing
    // ------------------------------------------------------------------------

    /// Track `task` as the one in progress.
    ///
    /// Re-setting the same description keeps the original start time.
    pub fn set_current_task(&mut self, task: Option<Task>) {
        self.set_current_task_at(task, Utc::now());
    }

    pub(crate) fn set_current_task_at(&mut self, task: Option<Task>, now: DateTime<Utc>) {
        let same = matches!(
            (&self.current_task, &task),
            (Some(old), Some(new)) if old.description == new.description
        );
        if !same {
            self.task_started_at = task.as_ref().map(|_| now);
        }
        self.current_task = task;
    }

    #[must_use]
    pub fn current_task(&self) -> Option<&Task> {
        self.current_task.as_ref()
    }

    /// Close out the current task and append it to the in-memory history.
    pub fn record_task_completion(&mut self) -> Option<TaskCompletion> {
        self.record_task_completion_at(Utc::now())
    }

    pub(crate) fn record_task_completion_at(&mut self, now: DateTime<Utc>) -> Option<TaskCompletion> {
        let task = self.current_task.as_ref()?;
        let started = self.task_started_at.unwrap_or(now);
        let completion = TaskCompletion {
            description: task.description.clone(),
            completed_at: now,
            duration_ms: u64::try_from((now - started).num_milliseconds()).unwrap_or(0),
            iteration: self.iteration,
        };
        debug!(
            "Task '{}' took {} ms",
            completion.description, completion.duration_ms
        );
        self.history.push(completion.clone());
        Some(completion)
    }

    #[must_use]
    pub fn task_history(&self) -> &[TaskCompletion] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

// ============================================================================
// Command Agent
// ============================================================================

/// Agent invoker that spawns a configured program with the prompt on stdin.
///
/// The child runs detached; its exit status is only logged.
#[derive(Debug)]
pub struct CommandAgent {
    config: AgentConfig,
    working_dir: RwLock<PathBuf>,
}

impl CommandAgent {
    #[must_use]
    pub fn new(config: AgentConfig, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            working_dir: RwLock::new(working_dir.into()),
        }
    }

    fn working_dir(&self) -> PathBuf {
        self.working_dir
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn spawn(&self, prompt: &str) -> Result<()> {
        let program = which::which(&self.config.program).map_err(|e| {
            LoopError::agent(format!("{} not found: {}", self.config.program, e))
        })?;
        let dir = self.working_dir();

        debug!(
            "Running {} in {} ({} chars prompt)",
            program.display(),
            dir.display(),
            prompt.len()
        );

        let mut child = AsyncCommand::new(&program)
            .args(&self.config.args)
            .current_dir(&dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(prompt.as_bytes()).await?;
            stdin.flush().await?;
            drop(stdin);
        }

        let name = self.config.program.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => info!("{} finished", name),
                Ok(status) => warn!("{} exited with code {}", name, status.code().unwrap_or(-1)),
                Err(e) => warn!("Failed to wait for {}: {}", name, e),
            }
        });
        Ok(())
    }
}

#[async_trait]
impl AgentInvoker for CommandAgent {
    async fn trigger_agent(&self, prompt: &str) -> Result<()> {
        self.spawn(prompt).await
    }

    async fn trigger_document_generation(&self, prompt: &str) -> Result<()> {
        self.spawn(prompt).await
    }

    fn set_working_dir(&self, dir: &Path) {
        *self
            .working_dir
            .write()
            .unwrap_or_else(PoisonError::into_inner) = dir.to_path_buf();
    }
}
