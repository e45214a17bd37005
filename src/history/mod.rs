//! Productivity history.
//!
//! Every completed task is stamped with its project and session and appended
//! to a bounded, periodically pruned JSON store. Daily summaries, session
//! statistics and productivity reports are derived from the stored records
//! on demand and never persisted.
//!
//! - [`record`] - record types and lenient loading
//! - [`store`] - atomic file persistence
//! - [`stats`] - daily summaries and session statistics
//! - [`report`] - period reports with trends and streaks
//! - [`export`] - JSON/CSV export and report rendering

pub mod export;
pub mod record;
pub mod report;
pub mod stats;
pub mod store;

pub use export::{format_duration_ms, ExportFormat, HistoryExporter, ReportFormat};
pub use record::{
    date_key, CompletionHistoryData, TaskCompletion, TaskCompletionRecord, HISTORY_VERSION,
    UNKNOWN_PROJECT,
};
pub use report::{
    build_report, resolve_window, DailyActivity, ProductivityReport, ProjectBreakdown,
    ReportPeriod, ReportWindow, TimeBreakdown, TrendDirection, TrendMetrics,
};
pub use stats::{DailyCompletionSummary, SessionStats, TaskTiming};
pub use store::HistoryStore;

/// Maximum number of records kept; the oldest are evicted first.
pub const MAX_RECORDS: usize = 1000;

/// Records older than this many days are pruned.
pub const RETENTION_DAYS: i64 = 90;

/// Minimum hours between retention passes.
pub const CLEANUP_INTERVAL_HOURS: i64 = 24;
