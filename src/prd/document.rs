//! File-backed task document.
//!
//! Wraps the pure parse/mutate functions with whole-file read-modify-write.
//! I/O failures never escape: they are logged and reported as `None`/`false`.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{mutate, parse, Task, TaskStats, TaskStatus};
use crate::error::Result;

/// The PRD file of one project.
#[derive(Debug, Clone)]
pub struct PrdDocument {
    path: PathBuf,
}

impl PrdDocument {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Read the whole document.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub async fn try_read(&self) -> Result<String> {
        Ok(tokio::fs::read_to_string(&self.path).await?)
    }

    /// Read the document, logging and returning `None` on failure.
    pub async fn read(&self) -> Option<String> {
        match self.try_read().await {
            Ok(content) => Some(content),
            Err(e) => {
                warn!("Failed to read {}: {}", self.path.display(), e);
                None
            }
        }
    }

    async fn write(&self, content: &str) -> bool {
        match tokio::fs::write(&self.path, content).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to write {}: {}", self.path.display(), e);
                false
            }
        }
    }

    /// Parse the current tasks; empty when the file cannot be read.
    pub async fn tasks(&self) -> Vec<Task> {
        self.read().await.map(|c| parse(&c)).unwrap_or_default()
    }

    /// The task the loop would run next.
    pub async fn next_task(&self) -> Option<Task> {
        let tasks = self.tasks().await;
        super::next_task(&tasks).cloned()
    }

    pub async fn stats(&self) -> TaskStats {
        TaskStats::from_tasks(&self.tasks().await)
    }

    /// Set the status of the task on `line_number`.
    ///
    /// Returns `false` if the line no longer holds a task or I/O failed.
    pub async fn set_status(&self, line_number: usize, status: TaskStatus) -> bool {
        let Some(content) = self.read().await else {
            return false;
        };
        match mutate::set_marker(&content, line_number, status.marker()) {
            Some(updated) => self.write(&updated).await,
            None => {
                warn!(
                    "Line {} of {} is no longer a task line",
                    line_number,
                    self.path.display()
                );
                false
            }
        }
    }

    /// Mark the next actionable task skipped, returning it.
    pub async fn skip_next(&self) -> Option<Task> {
        let task = self.next_task().await?;
        self.set_status(task.line_number, TaskStatus::Skipped)
            .await
            .then_some(task)
    }

    /// Mark the actionable task whose description matches `description`
    /// skipped. Falls back to the next actionable task when none matches.
    pub async fn skip_task(&self, description: &str) -> Option<Task> {
        let tasks = self.tasks().await;
        let task = tasks
            .iter()
            .find(|t| t.status.is_actionable() && t.description == description)
            .or_else(|| super::next_task(&tasks))?
            .clone();
        self.set_status(task.line_number, TaskStatus::Skipped)
            .await
            .then_some(task)
    }

    /// Move the first blocked task back to pending, returning it.
    pub async fn retry_blocked(&self) -> Option<Task> {
        let tasks = self.tasks().await;
        let task = super::first_blocked(&tasks)?.clone();
        self.set_status(task.line_number, TaskStatus::Pending)
            .await
            .then_some(task)
    }

    /// Mark every unfinished task complete; `None` on I/O failure.
    pub async fn complete_all(&self) -> Option<usize> {
        let content = self.read().await?;
        let (updated, count) = mutate::mark_all_complete(&content);
        if count > 0 && !self.write(&updated).await {
            return None;
        }
        Some(count)
    }

    /// Reset every task to pending; `None` on I/O failure.
    pub async fn reset_all(&self) -> Option<usize> {
        let content = self.read().await?;
        let (updated, count) = mutate::reset_all(&content);
        if count > 0 && !self.write(&updated).await {
            return None;
        }
        Some(count)
    }

    /// Reorder tasks by id; `false` on unknown ids or I/O failure.
    pub async fn reorder(&self, ordered_ids: &[String]) -> bool {
        let Some(content) = self.read().await else {
            return false;
        };
        match mutate::reorder(&content, ordered_ids) {
            Ok(updated) => {
                debug!("Reordered {} tasks", ordered_ids.len());
                self.write(&updated).await
            }
            Err(e) => {
                warn!("Reorder rejected: {}", e);
                false
            }
        }
    }
}
