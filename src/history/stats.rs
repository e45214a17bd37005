//! Daily summaries and per-session statistics.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::TaskCompletionRecord;

/// Two completions further apart than this many minutes break the session streak.
pub const STREAK_GAP_MINUTES: i64 = 30;

/// Number of recent task descriptions kept in session stats.
pub const RECENT_TASKS: usize = 10;

/// Completions grouped by local calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyCompletionSummary {
    pub date: String,
    pub total_tasks: usize,
    pub total_duration_ms: u64,
    pub average_duration_ms: u64,
    pub projects: Vec<String>,
    pub tasks: Vec<String>,
}

/// A task and how long it took.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTiming {
    pub description: String,
    pub duration_ms: u64,
}

/// Statistics for the active session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub session_id: String,
    pub session_start: DateTime<Utc>,
    pub tasks_completed: usize,
    pub total_duration_ms: u64,
    pub average_duration_ms: u64,
    pub fastest_task: Option<TaskTiming>,
    pub slowest_task: Option<TaskTiming>,
    /// Consecutive completions, newest first, each within [`STREAK_GAP_MINUTES`].
    pub current_streak: usize,
    pub tasks_per_hour: f64,
    /// Newest first.
    pub recent_tasks: Vec<String>,
    pub projects_worked_on: usize,
}

impl SessionStats {
    /// Zeroed stats, stamped with `now` so the UI always has a start time.
    #[must_use]
    pub fn empty(session_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.to_string(),
            session_start: now,
            tasks_completed: 0,
            total_duration_ms: 0,
            average_duration_ms: 0,
            fastest_task: None,
            slowest_task: None,
            current_streak: 0,
            tasks_per_hour: 0.0,
            recent_tasks: Vec::new(),
            projects_worked_on: 0,
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Group records completed in the trailing `days` days by date key.
///
/// Sorted by date, newest first.
#[must_use]
pub fn daily_summaries(
    records: &[TaskCompletionRecord],
    days: u32,
    now: DateTime<Utc>,
) -> Vec<DailyCompletionSummary> {
    let cutoff = now - Duration::days(i64::from(days));
    let mut by_date: BTreeMap<&str, Vec<&TaskCompletionRecord>> = BTreeMap::new();
    for record in records.iter().filter(|r| r.completed_at >= cutoff) {
        by_date.entry(record.date.as_str()).or_default().push(record);
    }

    by_date
        .into_iter()
        .rev()
        .map(|(date, day)| {
            let total_duration_ms: u64 = day.iter().map(|r| r.duration_ms).sum();
            let projects: BTreeSet<&str> = day.iter().map(|r| r.project_name.as_str()).collect();
            DailyCompletionSummary {
                date: date.to_string(),
                total_tasks: day.len(),
                total_duration_ms,
                average_duration_ms: total_duration_ms / day.len() as u64,
                projects: projects.into_iter().map(str::to_string).collect(),
                tasks: day.iter().map(|r| r.description.clone()).collect(),
            }
        })
        .collect()
}

/// Length of the run of completions, scanning newest to oldest, whose
/// consecutive gaps stay within [`STREAK_GAP_MINUTES`]. Input must be sorted
/// oldest first.
fn completion_streak(records: &[&TaskCompletionRecord]) -> usize {
    if records.is_empty() {
        return 0;
    }
    let gap = Duration::minutes(STREAK_GAP_MINUTES);
    let mut streak = 1;
    for pair in records.windows(2).rev() {
        if pair[1].completed_at - pair[0].completed_at <= gap {
            streak += 1;
        } else {
            break;
        }
    }
    streak
}

/// Compute stats for one session.
#[must_use]
pub fn session_stats(
    records: &[TaskCompletionRecord],
    session_id: &str,
    now: DateTime<Utc>,
) -> SessionStats {
    let mut session: Vec<&TaskCompletionRecord> = records
        .iter()
        .filter(|r| r.session_id == session_id)
        .collect();
    session.sort_by_key(|r| r.completed_at);

    let Some(first) = session.first() else {
        return SessionStats::empty(session_id, now);
    };

    let session_start = first.completed_at - Duration::milliseconds(first.duration_ms as i64);
    let total_duration_ms: u64 = session.iter().map(|r| r.duration_ms).sum();
    let timing = |r: &&TaskCompletionRecord| TaskTiming {
        description: r.description.clone(),
        duration_ms: r.duration_ms,
    };

    let elapsed_hours = (now - session_start).num_milliseconds() as f64 / 3_600_000.0;
    let tasks_per_hour = if elapsed_hours > 0.0 {
        round1(session.len() as f64 / elapsed_hours)
    } else {
        0.0
    };

    let projects: BTreeSet<&str> = session.iter().map(|r| r.project_name.as_str()).collect();

    SessionStats {
        session_id: session_id.to_string(),
        session_start,
        tasks_completed: session.len(),
        total_duration_ms,
        average_duration_ms: total_duration_ms / session.len() as u64,
        fastest_task: session.iter().min_by_key(|r| r.duration_ms).map(timing),
        slowest_task: session
            .iter()
            .rev()
            .max_by_key(|r| r.duration_ms)
            .map(timing),
        current_streak: completion_streak(&session),
        tasks_per_hour,
        recent_tasks: session
            .iter()
            .rev()
            .take(RECENT_TASKS)
            .map(|r| r.description.clone())
            .collect(),
        projects_worked_on: projects.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::test_support::record_at;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_empty_session_is_zeroed_with_now() {
        let now = at(9, 0);
        let stats = session_stats(&[], "s1", now);
        assert_eq!(stats, SessionStats::empty("s1", now));
        assert_eq!(stats.session_start, now);
    }

    #[test]
    fn test_session_start_back_computed_from_first_task() {
        let records = vec![
            record_at("A", at(10, 0), 600_000, "s1", "app"),
            record_at("B", at(10, 20), 60_000, "s1", "app"),
        ];
        let stats = session_stats(&records, "s1", at(11, 0));
        assert_eq!(stats.session_start, at(9, 50));
        assert_eq!(stats.tasks_completed, 2);
        assert_eq!(stats.total_duration_ms, 660_000);
        assert_eq!(stats.average_duration_ms, 330_000);
        assert_eq!(stats.fastest_task.unwrap().description, "B");
        assert_eq!(stats.slowest_task.unwrap().description, "A");
        // 2 tasks over 70 minutes
        assert!((stats.tasks_per_hour - 1.7).abs() < 1e-9);
        assert_eq!(stats.recent_tasks, vec!["B", "A"]);
    }

    #[test]
    fn test_session_filters_other_sessions() {
        let records = vec![
            record_at("A", at(10, 0), 1_000, "old", "app"),
            record_at("B", at(10, 5), 1_000, "s1", "app"),
            record_at("C", at(10, 6), 1_000, "s1", "lib"),
        ];
        let stats = session_stats(&records, "s1", at(10, 10));
        assert_eq!(stats.tasks_completed, 2);
        assert_eq!(stats.projects_worked_on, 2);
    }

    #[test]
    fn test_streak_stops_at_first_large_gap() {
        let records = vec![
            record_at("A", at(8, 0), 1_000, "s", "p"),
            record_at("B", at(9, 0), 1_000, "s", "p"),
            record_at("C", at(9, 25), 1_000, "s", "p"),
            record_at("D", at(9, 55), 1_000, "s", "p"),
        ];
        let stats = session_stats(&records, "s", at(10, 0));
        assert_eq!(stats.current_streak, 3);
    }

    #[test]
    fn test_recent_tasks_capped() {
        let records: Vec<_> = (0..15)
            .map(|i| record_at(&format!("T{i}"), at(10, i), 1_000, "s", "p"))
            .collect();
        let stats = session_stats(&records, "s", at(11, 0));
        assert_eq!(stats.recent_tasks.len(), RECENT_TASKS);
        assert_eq!(stats.recent_tasks[0], "T14");
    }

    #[test]
    fn test_daily_summaries_group_and_sort_desc() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let mut a = record_at("A", now - Duration::days(1), 2_000, "s", "app");
        a.date = "2024-05-09".into();
        let mut b = record_at("B", now - Duration::days(1), 4_000, "s", "lib");
        b.date = "2024-05-09".into();
        let mut c = record_at("C", now, 1_000, "s", "app");
        c.date = "2024-05-10".into();
        let mut old = record_at("Old", now - Duration::days(30), 1_000, "s", "app");
        old.date = "2024-04-10".into();

        let summaries = daily_summaries(&[a, b, c, old], 7, now);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].date, "2024-05-10");
        assert_eq!(summaries[1].total_tasks, 2);
        assert_eq!(summaries[1].average_duration_ms, 3_000);
        assert_eq!(summaries[1].projects, vec!["app", "lib"]);
        assert_eq!(summaries[1].tasks, vec!["A", "B"]);
    }
}
