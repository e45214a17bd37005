//! prdloop - checklist-driven task loop for a coding agent
//!
//! prdloop reads a Markdown checklist (the PRD), hands the next open task to
//! an external coding agent, watches the document for the agent's edits and
//! moves on once the task changes, keeping a history of completions.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`prd`] - Task document parsing and in-place mutation
//! - [`history`] - Persistent completion history, statistics, reports and exports
//! - [`timers`] - Countdown and inactivity timers
//! - [`watcher`] - File watchers for the task document and project activity
//! - [`runner`] - Iteration accounting and agent invocation
//! - [`prompt`] - Prompt templates for the agent
//! - [`orchestrator`] - The loop state machine
//! - [`ui`] - Messages to UI surfaces and the terminal renderer
//! - [`config`] - Per-project settings
//! - [`progress_log`] - Append-only progress log
//! - [`error`] - Custom error types and handling
//! - [`testing`] - Testing infrastructure (traits, mocks, fixtures)
//!
//! # Example
//!
//! ```rust,ignore
//! use prdloop::config::LoopSettings;
//! use prdloop::orchestrator::{Command, LoopOrchestrator};
//! use prdloop::runner::CommandAgent;
//! use prdloop::ui::{TerminalPrompter, TerminalSink, UiBroadcaster};
//!
//! let settings = LoopSettings::load(".".as_ref())?;
//! let agent = Arc::new(CommandAgent::new(settings.agent.clone(), "."));
//! let mut orchestrator = LoopOrchestrator::new(".", settings, agent, Arc::new(TerminalPrompter))
//!     .with_ui(UiBroadcaster::new().with_sink(Arc::new(TerminalSink::new())));
//!
//! orchestrator.start().await;
//! while orchestrator.is_running() && orchestrator.step().await {}
//! ```

pub mod config;
pub mod error;
pub mod history;
pub mod orchestrator;
pub mod prd;
pub mod progress_log;
pub mod prompt;
pub mod runner;
pub mod testing;
pub mod timers;
pub mod ui;
pub mod watcher;

// Re-export commonly used types
pub use error::{LoopError, Result};

pub use config::{LoopSettings, Requirements};
pub use history::{HistoryStore, TaskCompletion, TaskCompletionRecord};
pub use orchestrator::{Command, LoopHandle, LoopOrchestrator};
pub use prd::{PrdDocument, Task, TaskStats, TaskStatus};
pub use ui::{LoopStatus, UiBroadcaster, UiMessage, UiSink};
