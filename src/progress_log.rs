//! Plain-text progress log.
//!
//! Each entry is one line: `[<ISO-8601 UTC timestamp>] <entry>`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::Result;

/// Heading written when the log is first created.
const LOG_HEADER: &str = "# Progress Log\n\n";

/// Format one log line, newline included.
#[must_use]
pub fn format_entry(at: DateTime<Utc>, entry: &str) -> String {
    format!("[{}] {}\n", at.format("%Y-%m-%dT%H:%M:%S%.3fZ"), entry)
}

/// Append-only progress log of one project.
#[derive(Debug, Clone)]
pub struct ProgressLog {
    path: PathBuf,
}

impl ProgressLog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the log with a heading if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub async fn ensure_exists(&self) -> Result<()> {
        if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(());
        }
        tokio::fs::write(&self.path, LOG_HEADER).await?;
        Ok(())
    }

    /// Append one timestamped entry.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub async fn try_append(&self, entry: &str) -> Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format_entry(Utc::now(), entry).as_bytes())
            .await?;
        file.flush().await?;
        Ok(())
    }

    /// Append, logging failures instead of returning them.
    pub async fn append(&self, entry: &str) -> bool {
        match self.try_append(entry).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to append to {}: {}", self.path.display(), e);
                false
            }
        }
    }
}
