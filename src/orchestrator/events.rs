//! Commands and events consumed by the orchestrator.

use std::path::PathBuf;

use chrono::NaiveDate;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::config::{LoopSettings, Requirements};
use crate::history::{ExportFormat, ReportFormat, ReportPeriod};
use crate::testing::InactivityChoice;

/// A user command from any UI surface.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Stop,
    Pause,
    Resume,
    /// Run one task without arming the loop.
    Next,
    SkipTask,
    RetryTask,
    CompleteAllTasks,
    ResetAllTasks,
    /// Task ids in their new order.
    ReorderTasks(Vec<String>),
    /// Ask the agent to write a task document from a description.
    GeneratePrd(String),
    SwitchProject(PathBuf),
    SettingsChanged(LoopSettings),
    RequirementsChanged(Requirements),
    ExportData(ExportFormat),
    ExportLog(Vec<String>),
    GenerateReport {
        period: ReportPeriod,
        format: ReportFormat,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    },
}

/// Everything the orchestrator reacts to, processed one at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopEvent {
    Command(Command),
    /// The task document changed while being watched.
    PrdChanged(String),
    /// Something was written in the project tree.
    Activity,
    InactivityTimeout,
    /// The user's answer about a stalled task.
    InactivityAnswer {
        task: String,
        choice: Option<InactivityChoice>,
    },
    /// A countdown tick; stale generations are ignored.
    CountdownTick { generation: u64, remaining: u32 },
    /// A requested task document appeared.
    PrdCreated,
    /// Stop the loop and end the event stream.
    Shutdown,
}

/// Cloneable sender for commands into a running orchestrator.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    tx: UnboundedSender<LoopEvent>,
}

impl LoopHandle {
    pub(crate) fn new(tx: UnboundedSender<LoopEvent>) -> Self {
        Self { tx }
    }

    /// Queue a command. Returns `false` once the orchestrator is gone.
    pub fn send(&self, command: Command) -> bool {
        debug!("Queued command {:?}", command);
        self.tx.send(LoopEvent::Command(command)).is_ok()
    }

    /// Ask the orchestrator to stop and leave its event loop.
    pub fn shutdown(&self) -> bool {
        self.tx.send(LoopEvent::Shutdown).is_ok()
    }
}
