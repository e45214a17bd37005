//! Trait definitions for the loop's external collaborators.
//!
//! These traits abstract the agent process and the interactive prompt so the
//! orchestrator can be driven in tests without spawning anything.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::ui::LogLevel;

/// Abstraction for the coding agent.
///
/// Both calls are fire-and-forget: success means the agent was started, not
/// that the work is done. Completion is observed through the task document.
///
/// # Example
///
/// ```rust,ignore
/// use prdloop::testing::AgentInvoker;
///
/// async fn kick(agent: &dyn AgentInvoker) -> bool {
///     agent.trigger_agent("Complete the next task").await.is_ok()
/// }
/// ```
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Start the agent on a task prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent could not be started.
    async fn trigger_agent(&self, prompt: &str) -> Result<()>;

    /// Start the agent on writing a new task document.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent could not be started.
    async fn trigger_document_generation(&self, prompt: &str) -> Result<()>;

    /// Point subsequent invocations at a new project root.
    fn set_working_dir(&self, _dir: &Path) {}
}

/// Answer to the inactivity prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InactivityChoice {
    /// Keep waiting on the agent.
    Continue,
    /// Run the current task again.
    Retry,
    /// Give up on the current task and move on.
    Skip,
    /// Stop the loop.
    Stop,
}

impl fmt::Display for InactivityChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Continue => "continue",
            Self::Retry => "retry",
            Self::Skip => "skip",
            Self::Stop => "stop",
        };
        write!(f, "{s}")
    }
}

/// Abstraction for interactive user prompts and transient notices.
#[async_trait]
pub trait InactivityPrompter: Send + Sync {
    /// Ask what to do about a stalled task. `None` means dismissed.
    async fn ask(&self, task_description: &str) -> Option<InactivityChoice>;

    /// Show a transient notification.
    fn notify(&self, level: LogLevel, message: &str);
}
