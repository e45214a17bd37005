//! Loop configuration loading and persistence.
//!
//! Settings live in `<project>/.prdloop/settings.json`. A missing file means
//! defaults; an unreadable one is an error for the caller to log.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{LoopError, Result};

/// Directory (relative to the project root) holding loop state and exports.
pub const STATE_DIR: &str = ".prdloop";

/// Default task document name.
pub const DEFAULT_PRD_FILE: &str = "PRD.md";

/// Default progress log name.
pub const DEFAULT_PROGRESS_FILE: &str = "progress.txt";

fn default_max_iterations() -> u32 {
    50
}

fn default_countdown_seconds() -> u32 {
    5
}

fn default_inactivity_timeout_secs() -> u64 {
    60
}

fn default_inactivity_check_secs() -> u64 {
    10
}

fn default_prd_file() -> String {
    DEFAULT_PRD_FILE.to_string()
}

fn default_progress_file() -> String {
    DEFAULT_PROGRESS_FILE.to_string()
}

fn default_true() -> bool {
    true
}

/// Quality requirements the agent is asked to satisfy for every task.
///
/// These are folded into the agent prompt; the loop itself never checks them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirements {
    #[serde(default = "default_true")]
    pub write_tests: bool,
    #[serde(default = "default_true")]
    pub run_tests: bool,
    #[serde(default)]
    pub type_check: bool,
    #[serde(default)]
    pub lint: bool,
    #[serde(default)]
    pub update_docs: bool,
    #[serde(default)]
    pub commit: bool,
}

impl Default for Requirements {
    fn default() -> Self {
        Self {
            write_tests: true,
            run_tests: true,
            type_check: false,
            lint: false,
            update_docs: false,
            commit: false,
        }
    }
}

impl Requirements {
    /// Human-readable checklist lines for the enabled requirements.
    #[must_use]
    pub fn enabled_items(&self) -> Vec<&'static str> {
        let mut items = Vec::new();
        if self.write_tests {
            items.push("Write unit tests for the new behavior");
        }
        if self.run_tests {
            items.push("Run the test suite and make sure it passes");
        }
        if self.type_check {
            items.push("Run the type checker and fix all errors");
        }
        if self.lint {
            items.push("Run the linter and fix all warnings");
        }
        if self.update_docs {
            items.push("Update documentation affected by the change");
        }
        if self.commit {
            items.push("Commit the change with a descriptive message");
        }
        items
    }
}

/// External agent command used by the default invoker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            args: vec!["-p".to_string(), "--dangerously-skip-permissions".to_string()],
        }
    }
}

/// Loop settings.
///
/// # Example
///
/// ```
/// use prdloop::config::LoopSettings;
///
/// let settings = LoopSettings::default();
/// assert_eq!(settings.max_iterations, 50);
/// assert_eq!(settings.prd_file, "PRD.md");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopSettings {
    /// Iteration ceiling; 0 means unlimited.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Pause between a detected completion and the next task.
    #[serde(default = "default_countdown_seconds")]
    pub countdown_seconds: u32,

    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,

    #[serde(default = "default_inactivity_check_secs")]
    pub inactivity_check_secs: u64,

    /// Task document path, relative to the project root.
    #[serde(default = "default_prd_file")]
    pub prd_file: String,

    /// Progress log path, relative to the project root.
    #[serde(default = "default_progress_file")]
    pub progress_file: String,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub requirements: Requirements,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            countdown_seconds: default_countdown_seconds(),
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
            inactivity_check_secs: default_inactivity_check_secs(),
            prd_file: default_prd_file(),
            progress_file: default_progress_file(),
            agent: AgentConfig::default(),
            requirements: Requirements::default(),
        }
    }
}

impl LoopSettings {
    /// Load settings for a project, falling back to defaults when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let settings_path = Self::settings_path(project_dir);

        if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            let settings: Self = serde_json::from_str(&content)
                .map_err(|e| LoopError::settings_file(settings_path, e.to_string()))?;
            settings.validate()?;
            Ok(settings)
        } else {
            Ok(Self::default())
        }
    }

    /// Reject settings the loop cannot run with.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.prd_file.trim().is_empty() {
            return Err(LoopError::config("prdFile must not be empty"));
        }
        if self.progress_file.trim().is_empty() {
            return Err(LoopError::config("progressFile must not be empty"));
        }
        if self.agent.program.trim().is_empty() {
            return Err(LoopError::config("agent.program must not be empty"));
        }
        if self.inactivity_timeout_secs == 0 {
            return Err(LoopError::config(
                "inactivityTimeoutSecs must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Write settings back to the project.
    ///
    /// # Errors
    ///
    /// Returns an error if the state directory or file cannot be written.
    pub fn save(&self, project_dir: &Path) -> Result<()> {
        let path = Self::settings_path(project_dir);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Get the settings.json path for a project
    #[must_use]
    pub fn settings_path(project_dir: &Path) -> PathBuf {
        Self::state_dir(project_dir).join("settings.json")
    }

    /// Get the loop state directory for a project
    #[must_use]
    pub fn state_dir(project_dir: &Path) -> PathBuf {
        project_dir.join(STATE_DIR)
    }

    /// Get the export directory for a project
    #[must_use]
    pub fn export_dir(project_dir: &Path) -> PathBuf {
        Self::state_dir(project_dir).join("exports")
    }

    #[must_use]
    pub fn prd_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.prd_file)
    }

    #[must_use]
    pub fn progress_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.progress_file)
    }

    #[must_use]
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    #[must_use]
    pub fn inactivity_check_interval(&self) -> Duration {
        Duration::from_secs(self.inactivity_check_secs.max(1))
    }
}

/// Default location of the cross-project completion history.
///
/// Falls back to the current directory when no platform data dir exists.
#[must_use]
pub fn default_history_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("prdloop")
        .join("completion-history.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_returns_default() {
        let temp = TempDir::new().unwrap();
        let settings = LoopSettings::load(temp.path()).unwrap();
        assert_eq!(settings, LoopSettings::default());
    }

    #[test]
    fn test_load_partial_json_fills_defaults() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(STATE_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("settings.json"),
            r#"{"maxIterations": 3, "requirements": {"lint": true}}"#,
        )
        .unwrap();

        let settings = LoopSettings::load(temp.path()).unwrap();
        assert_eq!(settings.max_iterations, 3);
        assert_eq!(settings.countdown_seconds, 5);
        assert!(settings.requirements.lint);
        assert!(settings.requirements.write_tests);
    }

    #[test]
    fn test_validate_rejects_empty_paths() {
        let settings = LoopSettings {
            prd_file: "  ".into(),
            ..LoopSettings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("prdFile"));

        let settings = LoopSettings {
            inactivity_timeout_secs: 0,
            ..LoopSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(LoopError::Config { .. })
        ));
        assert!(LoopSettings::default().validate().is_ok());
    }

    #[test]
    fn test_load_invalid_json_is_config_error() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(STATE_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("settings.json"), "{not json").unwrap();

        let err = LoopSettings::load(temp.path()).unwrap_err();
        assert!(matches!(err, LoopError::Config { path: Some(_), .. }));
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let settings = LoopSettings {
            max_iterations: 7,
            prd_file: "tasks.md".into(),
            ..Default::default()
        };
        settings.save(temp.path()).unwrap();
        assert_eq!(LoopSettings::load(temp.path()).unwrap(), settings);
    }

    #[test]
    fn test_paths_are_relative_to_project() {
        let settings = LoopSettings::default();
        let root = Path::new("/work/app");
        assert_eq!(settings.prd_path(root), PathBuf::from("/work/app/PRD.md"));
        assert_eq!(
            settings.progress_path(root),
            PathBuf::from("/work/app/progress.txt")
        );
        assert_eq!(
            LoopSettings::export_dir(root),
            PathBuf::from("/work/app/.prdloop/exports")
        );
    }

    #[test]
    fn test_requirements_enabled_items() {
        let reqs = Requirements {
            write_tests: false,
            run_tests: true,
            lint: true,
            ..Default::default()
        };
        assert_eq!(
            reqs.enabled_items(),
            vec![
                "Run the test suite and make sure it passes",
                "Run the linter and fix all warnings"
            ]
        );
    }

    #[test]
    fn test_check_interval_never_zero() {
        let settings = LoopSettings {
            inactivity_check_secs: 0,
            ..Default::default()
        };
        assert_eq!(settings.inactivity_check_interval(), Duration::from_secs(1));
    }
}
