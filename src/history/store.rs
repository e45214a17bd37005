//! Persistent completion history.
//!
//! The whole history lives in one JSON file that is rewritten atomically
//! (tmp file + rename) under an exclusive lock. Reads degrade to an empty
//! history on any failure.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use fs2::FileExt;
use tracing::{debug, info, warn};

use super::report::{self, ProductivityReport, ReportPeriod};
use super::stats::{self, DailyCompletionSummary, SessionStats};
use super::{
    CompletionHistoryData, TaskCompletion, TaskCompletionRecord, CLEANUP_INTERVAL_HOURS,
    MAX_RECORDS, RETENTION_DAYS,
};
use crate::error::Result;

/// Temporary file suffix for atomic writes.
const TMP_SUFFIX: &str = ".tmp";

/// Lock file suffix for concurrent access prevention.
const LOCK_SUFFIX: &str = ".lock";

/// File-backed history with an active session.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    session_id: Option<String>,
}

impl HistoryStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            session_id: None,
        }
    }

    /// Store at the per-user default location.
    #[must_use]
    pub fn at_default_location() -> Self {
        Self::new(crate::config::default_history_path())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Begin a new session and return its id.
    pub fn start_session(&mut self) -> String {
        let id = format!(
            "session-{}-{}",
            Utc::now().timestamp_millis(),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        info!("Started history session {}", id);
        self.session_id = Some(id.clone());
        id
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Load the stored history.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn try_load(&self) -> Result<CompletionHistoryData> {
        if !self.path.exists() {
            return Ok(CompletionHistoryData::default());
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(CompletionHistoryData::from_json(&contents)?)
    }

    /// Load the stored history, falling back to an empty one.
    #[must_use]
    pub fn load(&self) -> CompletionHistoryData {
        self.try_load().unwrap_or_else(|e| {
            warn!(
                "Failed to load history from {}: {}. Starting empty.",
                self.path.display(),
                e
            );
            CompletionHistoryData::default()
        })
    }

    /// Save history atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock, write or rename fails.
    pub fn save(&self, data: &CompletionHistoryData) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = File::create(self.sibling(LOCK_SUFFIX))?;
        FileExt::lock_exclusive(&lock_file)?;

        let tmp_path = self.sibling(TMP_SUFFIX);
        let json = serde_json::to_string_pretty(data)?;

        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(json.as_bytes())?;
        tmp_file.sync_all()?;

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    // ========================================================================
    // Recording
    // ========================================================================

    /// Persist one completion and return the stored record.
    ///
    /// A failed save is logged; the returned record is still valid.
    pub fn record_completion(
        &self,
        completion: &TaskCompletion,
        session_id: &str,
        project_path: Option<&Path>,
    ) -> TaskCompletionRecord {
        self.record_completion_at(completion, session_id, project_path, Utc::now())
    }

    fn record_completion_at(
        &self,
        completion: &TaskCompletion,
        session_id: &str,
        project_path: Option<&Path>,
        now: DateTime<Utc>,
    ) -> TaskCompletionRecord {
        let record = TaskCompletionRecord::from_completion(completion, session_id, project_path);
        let mut data = self.load();
        data.records.push(record.clone());
        apply_limits(&mut data, now);

        if let Err(e) = self.save(&data) {
            warn!("Failed to save history to {}: {}", self.path.display(), e);
        }
        debug!("Recorded completion {} ({})", record.id, record.description);
        record
    }

    /// Delete all records.
    pub fn clear(&self) {
        let data = CompletionHistoryData {
            records: Vec::new(),
            ..self.load()
        };
        if let Err(e) = self.save(&data) {
            warn!("Failed to clear history: {}", e);
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[must_use]
    pub fn records(&self) -> Vec<TaskCompletionRecord> {
        self.load().records
    }

    #[must_use]
    pub fn daily_summaries(&self, days: u32) -> Vec<DailyCompletionSummary> {
        stats::daily_summaries(&self.records(), days, Utc::now())
    }

    /// Stats for the active session; zeroed when no session was started.
    #[must_use]
    pub fn session_stats(&self) -> SessionStats {
        let session_id = self.session_id.as_deref().unwrap_or_default();
        stats::session_stats(&self.records(), session_id, Utc::now())
    }

    /// Build a productivity report for a period.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LoopError::InvalidDateRange`] for an incomplete or
    /// inverted custom range.
    pub fn generate_report(
        &self,
        period: ReportPeriod,
        custom_start: Option<NaiveDate>,
        custom_end: Option<NaiveDate>,
    ) -> Result<ProductivityReport> {
        let now = Local::now();
        let window = report::resolve_window(period, custom_start, custom_end, now)?;
        Ok(report::build_report(&self.records(), period, &window, now))
    }

    // ========================================================================
    // Async access
    // ========================================================================

    /// Run `f` against a copy of this store on the blocking pool.
    ///
    /// Every store operation does synchronous file I/O under an `fs2` lock,
    /// which must not stall the runtime's worker threads.
    async fn off_runtime<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(HistoryStore) -> T + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        Ok(tokio::task::spawn_blocking(move || f(store)).await?)
    }

    /// [`record_completion`](Self::record_completion) on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LoopError::Background`] if the blocking task fails.
    pub async fn record_completion_async(
        &self,
        completion: TaskCompletion,
        session_id: String,
        project_path: Option<PathBuf>,
    ) -> Result<TaskCompletionRecord> {
        self.off_runtime(move |store| {
            store.record_completion(&completion, &session_id, project_path.as_deref())
        })
        .await
    }

    /// [`records`](Self::records) on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LoopError::Background`] if the blocking task fails.
    pub async fn records_async(&self) -> Result<Vec<TaskCompletionRecord>> {
        self.off_runtime(|store| store.records()).await
    }

    /// [`generate_report`](Self::generate_report) on the blocking pool.
    ///
    /// # Errors
    ///
    /// Same as [`generate_report`](Self::generate_report), plus
    /// [`crate::LoopError::Background`] if the blocking task fails.
    pub async fn generate_report_async(
        &self,
        period: ReportPeriod,
        custom_start: Option<NaiveDate>,
        custom_end: Option<NaiveDate>,
    ) -> Result<ProductivityReport> {
        self.off_runtime(move |store| store.generate_report(period, custom_start, custom_end))
            .await?
    }
}

/// Prune by retention when a cleanup is due, then cap the record count.
fn apply_limits(data: &mut CompletionHistoryData, now: DateTime<Utc>) {
    if now - data.last_cleanup > Duration::hours(CLEANUP_INTERVAL_HOURS) {
        let cutoff = now - Duration::days(RETENTION_DAYS);
        let before = data.records.len();
        data.records.retain(|r| r.completed_at >= cutoff);
        data.last_cleanup = now;
        debug!("Pruned {} expired records", before - data.records.len());
    }

    if data.records.len() > MAX_RECORDS {
        data.records.sort_by_key(|r| r.completed_at);
        let excess = data.records.len() - MAX_RECORDS;
        data.records.drain(..excess);
    }
}
