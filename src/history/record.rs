//! Completion record types and their persisted container.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Schema version written to the history file.
pub const HISTORY_VERSION: u32 = 1;

/// Project name used when a completion has no project path.
pub const UNKNOWN_PROJECT: &str = "Unknown Project";

/// One finished task, as observed by the task runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCompletion {
    pub description: String,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub iteration: u32,
}

/// A persisted completion, stamped with project and session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCompletionRecord {
    pub id: String,
    pub description: String,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub iteration: u32,
    pub project_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    pub session_id: String,
    /// Local calendar date of completion, `YYYY-MM-DD`.
    pub date: String,
}

impl TaskCompletionRecord {
    /// Stamp a completion with a fresh id, date key and project name.
    #[must_use]
    pub fn from_completion(
        completion: &TaskCompletion,
        session_id: &str,
        project_path: Option<&Path>,
    ) -> Self {
        let project_name = project_path
            .and_then(|p| p.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| UNKNOWN_PROJECT.to_string());

        Self {
            id: format!(
                "{}-{}",
                completion.completed_at.timestamp_millis(),
                &uuid::Uuid::new_v4().simple().to_string()[..8]
            ),
            description: completion.description.clone(),
            completed_at: completion.completed_at,
            duration_ms: completion.duration_ms,
            iteration: completion.iteration,
            project_name,
            project_path: project_path.map(|p| p.display().to_string()),
            session_id: session_id.to_string(),
            date: date_key(completion.completed_at),
        }
    }

    /// Completion time in local time.
    #[must_use]
    pub fn completed_local(&self) -> DateTime<Local> {
        self.completed_at.with_timezone(&Local)
    }
}

/// Local `YYYY-MM-DD` key for a timestamp.
#[must_use]
pub fn date_key(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d").to_string()
}

/// Persisted history aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionHistoryData {
    pub records: Vec<TaskCompletionRecord>,
    pub last_cleanup: DateTime<Utc>,
    pub version: u32,
}

impl Default for CompletionHistoryData {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            last_cleanup: Utc::now(),
            version: HISTORY_VERSION,
        }
    }
}

/// Loosely-typed file shape, so one bad record cannot fail the whole load.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawHistoryData {
    #[serde(default)]
    records: Vec<serde_json::Value>,
    last_cleanup: Option<DateTime<Utc>>,
    version: Option<u32>,
}

impl CompletionHistoryData {
    /// Parse stored JSON, dropping records with missing or invalid fields.
    ///
    /// # Errors
    ///
    /// Returns an error only if the top-level document is not valid JSON of
    /// the expected shape.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let raw: RawHistoryData = serde_json::from_str(json)?;
        let total = raw.records.len();
        let records: Vec<TaskCompletionRecord> = raw
            .records
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect();
        if records.len() < total {
            debug!(
                "Dropped {} malformed history records",
                total - records.len()
            );
        }

        Ok(Self {
            records,
            last_cleanup: raw.last_cleanup.unwrap_or_else(Utc::now),
            version: raw.version.unwrap_or(HISTORY_VERSION),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn completion() -> TaskCompletion {
        TaskCompletion {
            description: "Write parser".into(),
            completed_at: Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap(),
            duration_ms: 90_000,
            iteration: 2,
        }
    }

    #[test]
    fn test_record_takes_project_basename() {
        let path = PathBuf::from("/home/dev/my-app");
        let record = TaskCompletionRecord::from_completion(&completion(), "s1", Some(&path));
        assert_eq!(record.project_name, "my-app");
        assert_eq!(record.project_path.as_deref(), Some("/home/dev/my-app"));
        assert_eq!(record.session_id, "s1");
        assert_eq!(record.date, date_key(record.completed_at));
        assert!(record.id.starts_with(&record.completed_at.timestamp_millis().to_string()));
    }

    #[test]
    fn test_record_without_path_uses_sentinel() {
        let record = TaskCompletionRecord::from_completion(&completion(), "s1", None);
        assert_eq!(record.project_name, UNKNOWN_PROJECT);
        assert!(record.project_path.is_none());
    }

    #[test]
    fn test_record_ids_are_unique() {
        let a = TaskCompletionRecord::from_completion(&completion(), "s", None);
        let b = TaskCompletionRecord::from_completion(&completion(), "s", None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_from_json_filters_malformed_records() {
        let good = TaskCompletionRecord::from_completion(&completion(), "s1", None);
        let json = serde_json::json!({
            "records": [
                serde_json::to_value(&good).unwrap(),
                {"id": "broken", "description": "no timestamps"},
                42
            ],
            "lastCleanup": "2024-03-01T00:00:00Z",
            "version": 1
        });

        let data = CompletionHistoryData::from_json(&json.to_string()).unwrap();
        assert_eq!(data.records, vec![good]);
        assert_eq!(data.version, 1);
    }

    #[test]
    fn test_from_json_missing_fields_default() {
        let data = CompletionHistoryData::from_json("{}").unwrap();
        assert!(data.records.is_empty());
        assert_eq!(data.version, HISTORY_VERSION);
        assert!(CompletionHistoryData::from_json("[1,2]").is_err());
    }
}
