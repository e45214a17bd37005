//! Task and status types for the checklist document.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a checklist task, encoded by the single bracket marker.
///
/// # Example
///
/// ```
/// use prdloop::prd::TaskStatus;
///
/// assert_eq!(TaskStatus::from_marker('X'), Some(TaskStatus::Complete));
/// assert_eq!(TaskStatus::Skipped.marker(), 's');
/// assert_eq!(TaskStatus::from_marker('?'), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Complete,
    Blocked,
    Skipped,
}

impl TaskStatus {
    /// Map a marker character to a status (case-insensitive).
    #[must_use]
    pub fn from_marker(marker: char) -> Option<Self> {
        match marker {
            ' ' => Some(Self::Pending),
            'x' | 'X' => Some(Self::Complete),
            '~' => Some(Self::InProgress),
            '!' => Some(Self::Blocked),
            's' | 'S' => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Canonical marker written for this status.
    #[must_use]
    pub fn marker(self) -> char {
        match self {
            Self::Pending => ' ',
            Self::Complete => 'x',
            Self::InProgress => '~',
            Self::Blocked => '!',
            Self::Skipped => 's',
        }
    }

    /// Pending or in progress: the loop may still pick this task.
    #[must_use]
    pub fn is_actionable(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }

    /// Complete or skipped.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Skipped)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in progress",
            Self::Complete => "complete",
            Self::Blocked => "blocked",
            Self::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

/// One checklist line of the task document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// `task-<line>`, derived from the line position at parse time.
    pub id: String,
    pub description: String,
    pub status: TaskStatus,
    /// 1-based line in the source document.
    pub line_number: usize,
    /// Full original line, used to rewrite the document on reorder.
    pub raw_line: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acceptance_criteria: Vec<String>,
}

impl Task {
    /// Id for the task on the given 1-based line.
    #[must_use]
    pub fn id_for_line(line_number: usize) -> String {
        format!("task-{line_number}")
    }

    /// Description with the dependency and acceptance-criteria annotations
    /// stripped, for display and prompts.
    #[must_use]
    pub fn title(&self) -> String {
        super::parse::strip_annotations(&self.description)
    }
}

/// Per-status task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub complete: usize,
    pub blocked: usize,
    pub skipped: usize,
}

impl TaskStats {
    /// Count tasks by status.
    #[must_use]
    pub fn from_tasks(tasks: &[Task]) -> Self {
        tasks.iter().fold(Self::default(), |mut stats, task| {
            stats.total += 1;
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::InProgress => stats.in_progress += 1,
                TaskStatus::Complete => stats.complete += 1,
                TaskStatus::Blocked => stats.blocked += 1,
                TaskStatus::Skipped => stats.skipped += 1,
            }
            stats
        })
    }

    /// Tasks the loop can still run.
    #[must_use]
    pub fn actionable(&self) -> usize {
        self.pending + self.in_progress
    }

    /// Percentage of tasks in a terminal state, 0 for an empty document.
    #[must_use]
    pub fn percent_done(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.complete + self.skipped) as f64 * 100.0 / self.total as f64
        }
    }
}
