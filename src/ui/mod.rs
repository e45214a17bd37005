//! UI surfaces and the messages the loop sends them.
//!
//! The orchestrator only ever talks to [`UiSink`]s through a
//! [`UiBroadcaster`]. All messages are one-way notifications.
//!
//! - [`surface`] - panel and sidebar sinks that queue while hidden
//! - [`terminal`] - colored terminal output and stdin prompts for the CLI

pub mod surface;
pub mod terminal;

pub use surface::{SurfaceKind, SurfaceSink};
pub use terminal::{TerminalPrompter, TerminalSink};

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::history::TaskCompletion;
use crate::prd::{Task, TaskStats, TaskStatus};

/// Loop status as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopStatus {
    Idle,
    Running,
    /// Running, with the agent working and the document watched.
    Waiting,
    Paused,
}

impl fmt::Display for LoopStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Paused => "paused",
        };
        write!(f, "{s}")
    }
}

/// Display form of the tracked task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub id: String,
    pub description: String,
    pub line_number: usize,
    pub status: TaskStatus,
    pub acceptance_criteria: Vec<String>,
    /// Dependencies not yet satisfied by a finished task.
    pub unmet_dependencies: Vec<String>,
}

impl TaskInfo {
    /// Describe `task` in the context of the whole task list.
    #[must_use]
    pub fn new(task: &Task, all: &[Task]) -> Self {
        Self {
            id: task.id.clone(),
            description: task.description.clone(),
            line_number: task.line_number,
            status: task.status,
            acceptance_criteria: task.acceptance_criteria.clone(),
            unmet_dependencies: crate::prd::unmet_dependencies(task, all),
        }
    }
}

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Notification sent to every surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UiMessage {
    Status {
        status: LoopStatus,
        iteration: u32,
        task: Option<TaskInfo>,
    },
    /// Remaining seconds; 0 clears the display.
    Countdown { seconds: u32 },
    History { completions: Vec<TaskCompletion> },
    SessionTiming {
        start: Option<DateTime<Utc>>,
        completions: Vec<TaskCompletion>,
        pending: usize,
    },
    Stats(TaskStats),
    Log {
        message: String,
        level: LogLevel,
        highlight: bool,
    },
    PrdGenerating,
    PrdGenerated,
    Refresh,
}

impl UiMessage {
    #[must_use]
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::Log {
            message: message.into(),
            level,
            highlight: false,
        }
    }

    /// A log line important enough for compact surfaces.
    #[must_use]
    pub fn highlight(level: LogLevel, message: impl Into<String>) -> Self {
        Self::Log {
            message: message.into(),
            level,
            highlight: true,
        }
    }
}

/// Receiver of UI notifications.
pub trait UiSink: Send + Sync {
    fn deliver(&self, message: UiMessage);
}

/// Fans messages out to every registered sink.
#[derive(Default, Clone)]
pub struct UiBroadcaster {
    sinks: Vec<Arc<dyn UiSink>>,
}

impl fmt::Debug for UiBroadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiBroadcaster")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl UiBroadcaster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink (builder form).
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn UiSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn register(&mut self, sink: Arc<dyn UiSink>) {
        self.sinks.push(sink);
    }

    pub fn broadcast(&self, message: UiMessage) {
        for sink in &self.sinks {
            sink.deliver(message.clone());
        }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.broadcast(UiMessage::log(level, message));
    }

    pub fn highlight(&self, level: LogLevel, message: impl Into<String>) {
        self.broadcast(UiMessage::highlight(level, message));
    }
}
