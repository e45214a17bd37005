//! Test fixtures for creating reproducible project directories.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::{DEFAULT_PRD_FILE, DEFAULT_PROGRESS_FILE};

/// A temporary project directory with a task document.
///
/// Automatically cleans up when dropped.
///
/// # Example
///
/// ```rust,ignore
/// let fixture = TestProject::with_prd("- [ ] One\n- [ ] Two\n");
/// assert!(fixture.prd_path().exists());
/// ```
pub struct TestProject {
    temp_dir: TempDir,
}

impl TestProject {
    /// An empty project with no task document.
    ///
    /// # Panics
    ///
    /// Panics if temporary directory creation fails.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// A project whose task document holds `content`.
    ///
    /// # Panics
    ///
    /// Panics if the document cannot be written.
    #[must_use]
    pub fn with_prd(content: &str) -> Self {
        let fixture = Self::empty();
        fixture.write_prd(content);
        fixture
    }

    /// The standard three-task document.
    #[must_use]
    pub fn three_tasks() -> Self {
        Self::with_prd(Self::three_task_content())
    }

    #[must_use]
    pub fn three_task_content() -> &'static str {
        "# Plan\n\n- [ ] Task 1\n- [ ] Task 2\n- [ ] Task 3\n"
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    #[must_use]
    pub fn prd_path(&self) -> PathBuf {
        self.path().join(DEFAULT_PRD_FILE)
    }

    #[must_use]
    pub fn progress_path(&self) -> PathBuf {
        self.path().join(DEFAULT_PROGRESS_FILE)
    }

    #[must_use]
    pub fn history_path(&self) -> PathBuf {
        self.path().join("history").join("completion-history.json")
    }

    /// # Panics
    ///
    /// Panics if the write fails.
    pub fn write_prd(&self, content: &str) {
        std::fs::write(self.prd_path(), content).expect("Failed to write PRD.md");
    }

    /// # Panics
    ///
    /// Panics if the read fails.
    #[must_use]
    pub fn read_prd(&self) -> String {
        std::fs::read_to_string(self.prd_path()).expect("Failed to read PRD.md")
    }

    /// Progress log contents, empty if missing.
    #[must_use]
    pub fn read_progress(&self) -> String {
        std::fs::read_to_string(self.progress_path()).unwrap_or_default()
    }
}
