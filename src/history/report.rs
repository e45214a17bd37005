//! Productivity reports over a date window.
//!
//! A report pulls every record in the window and derives time, project and
//! daily breakdowns plus trend metrics. An empty window still yields a
//! complete, zeroed report.

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use super::TaskCompletionRecord;
use crate::error::{LoopError, Result};

/// Change (in percent) between period halves needed to call a trend.
const TREND_THRESHOLD_PERCENT: f64 = 10.0;

const DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

// ============================================================================
// Period and Window
// ============================================================================

/// Report period selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportPeriod {
    Today,
    Week,
    Month,
    Custom,
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Today => "today",
            Self::Week => "week",
            Self::Month => "month",
            Self::Custom => "custom",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ReportPeriod {
    type Err = LoopError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "today" => Ok(Self::Today),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "custom" => Ok(Self::Custom),
            _ => Err(LoopError::invalid_format(s, "today, week, month, custom")),
        }
    }
}

/// Inclusive time window a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindow {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
}

impl ReportWindow {
    /// Whole days covered, rounded up, at least 1.
    #[must_use]
    pub fn days(&self) -> i64 {
        let ms = (self.end - self.start).num_milliseconds().max(0);
        let day_ms = Duration::days(1).num_milliseconds();
        ((ms + day_ms - 1) / day_ms).max(1)
    }

    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let at = at.with_timezone(&Local);
        self.start <= at && at <= self.end
    }

    fn midpoint(&self) -> DateTime<Local> {
        self.start + (self.end - self.start) / 2
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Local> {
    let naive = date.and_time(NaiveTime::MIN);
    Local
        .from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| Local.from_utc_datetime(&naive))
}

/// Resolve the window for a period relative to `now`.
///
/// `week` and `month` cover 7 and 30 calendar days including today. A custom
/// window needs both dates and spans whole days, inclusive.
///
/// # Errors
///
/// Returns [`LoopError::InvalidDateRange`] for a custom period with a missing
/// date or with start after end.
pub fn resolve_window(
    period: ReportPeriod,
    custom_start: Option<NaiveDate>,
    custom_end: Option<NaiveDate>,
    now: DateTime<Local>,
) -> Result<ReportWindow> {
    let today = now.date_naive();
    let from_days_back = |days: i64| ReportWindow {
        start: start_of_day(today - Duration::days(days)),
        end: now,
    };

    match period {
        ReportPeriod::Today => Ok(from_days_back(0)),
        ReportPeriod::Week => Ok(from_days_back(6)),
        ReportPeriod::Month => Ok(from_days_back(29)),
        ReportPeriod::Custom => {
            let (Some(start), Some(end)) = (custom_start, custom_end) else {
                return Err(LoopError::date_range(
                    "custom period requires both start and end dates",
                ));
            };
            if start > end {
                return Err(LoopError::date_range(format!(
                    "start {start} is after end {end}"
                )));
            }
            Ok(ReportWindow {
                start: start_of_day(start),
                end: start_of_day(end + Duration::days(1)) - Duration::milliseconds(1),
            })
        }
    }
}

// ============================================================================
// Report Types
// ============================================================================

/// Duration statistics across the window's tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBreakdown {
    pub total_ms: u64,
    pub average_ms: f64,
    /// Population standard deviation.
    pub std_dev_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectBreakdown {
    pub project_name: String,
    pub project_path: Option<String>,
    pub task_count: usize,
    pub total_time_ms: u64,
    pub task_percentage: f64,
    pub time_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyActivity {
    pub date: String,
    pub task_count: usize,
    pub total_time_ms: u64,
}

/// Direction of task throughput between the two halves of the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    #[default]
    Stable,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Stable => "stable",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendMetrics {
    pub avg_tasks_per_day: f64,
    /// 0 = Sunday .. 6 = Saturday.
    pub busiest_day_of_week: u32,
    /// 0..23, local time.
    pub busiest_hour: u32,
    pub direction: TrendDirection,
    /// Magnitude of the change between halves, in percent.
    pub change_percent: f64,
    pub longest_streak: u32,
    pub current_streak: u32,
}

impl TrendMetrics {
    #[must_use]
    pub fn busiest_day_name(&self) -> &'static str {
        DAY_NAMES[self.busiest_day_of_week as usize % 7]
    }
}

/// Productivity report for a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductivityReport {
    pub period: ReportPeriod,
    pub start_date: String,
    pub end_date: String,
    pub generated_at: DateTime<Utc>,
    pub total_tasks: usize,
    pub total_sessions: usize,
    pub total_projects: usize,
    pub time_breakdown: TimeBreakdown,
    pub projects: Vec<ProjectBreakdown>,
    pub daily_activity: Vec<DailyActivity>,
    pub trends: TrendMetrics,
}

impl ProductivityReport {
    /// Zeroed report for a window with no completions.
    #[must_use]
    pub fn empty(period: ReportPeriod, window: &ReportWindow) -> Self {
        Self {
            period,
            start_date: window.start.format("%Y-%m-%d").to_string(),
            end_date: window.end.format("%Y-%m-%d").to_string(),
            generated_at: Utc::now(),
            total_tasks: 0,
            total_sessions: 0,
            total_projects: 0,
            time_breakdown: TimeBreakdown::default(),
            projects: Vec::new(),
            daily_activity: Vec::new(),
            trends: TrendMetrics::default(),
        }
    }
}

// ============================================================================
// Computation
// ============================================================================

fn percentage(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        (part * 1000.0 / whole).round() / 10.0
    } else {
        0.0
    }
}

fn time_breakdown(records: &[&TaskCompletionRecord]) -> TimeBreakdown {
    let durations: Vec<u64> = records.iter().map(|r| r.duration_ms).collect();
    let total_ms: u64 = durations.iter().sum();
    let n = durations.len() as f64;
    let average_ms = total_ms as f64 / n;
    let variance = durations
        .iter()
        .map(|&d| {
            let diff = d as f64 - average_ms;
            diff * diff
        })
        .sum::<f64>()
        / n;

    TimeBreakdown {
        total_ms,
        average_ms,
        std_dev_ms: variance.sqrt(),
        min_ms: durations.iter().copied().min().unwrap_or(0),
        max_ms: durations.iter().copied().max().unwrap_or(0),
    }
}

fn project_breakdown(records: &[&TaskCompletionRecord], total_ms: u64) -> Vec<ProjectBreakdown> {
    let mut by_project: BTreeMap<&str, ProjectBreakdown> = BTreeMap::new();
    for record in records {
        let entry = by_project
            .entry(record.project_name.as_str())
            .or_insert_with(|| ProjectBreakdown {
                project_name: record.project_name.clone(),
                project_path: record.project_path.clone(),
                task_count: 0,
                total_time_ms: 0,
                task_percentage: 0.0,
                time_percentage: 0.0,
            });
        entry.task_count += 1;
        entry.total_time_ms += record.duration_ms;
    }

    let total_tasks = records.len() as f64;
    let mut projects: Vec<ProjectBreakdown> = by_project
        .into_values()
        .map(|mut p| {
            p.task_percentage = percentage(p.task_count as f64, total_tasks);
            p.time_percentage = percentage(p.total_time_ms as f64, total_ms as f64);
            p
        })
        .collect();
    projects.sort_by(|a, b| b.task_count.cmp(&a.task_count));
    projects
}

fn daily_activity(records: &[&TaskCompletionRecord]) -> Vec<DailyActivity> {
    let mut by_date: BTreeMap<&str, DailyActivity> = BTreeMap::new();
    for record in records {
        let day = by_date
            .entry(record.date.as_str())
            .or_insert_with(|| DailyActivity {
                date: record.date.clone(),
                task_count: 0,
                total_time_ms: 0,
            });
        day.task_count += 1;
        day.total_time_ms += record.duration_ms;
    }
    by_date.into_values().rev().collect()
}

/// Index of the largest bucket; the first maximum wins.
fn argmax(buckets: &[usize]) -> u32 {
    let mut best = 0;
    for (i, &count) in buckets.iter().enumerate() {
        if count > buckets[best] {
            best = i;
        }
    }
    best as u32
}

/// Compare the two halves of the window.
fn trend_direction(first_half: usize, second_half: usize) -> (TrendDirection, f64) {
    match (first_half, second_half) {
        (0, 0) => (TrendDirection::Stable, 0.0),
        (0, _) => (TrendDirection::Up, 100.0),
        _ => {
            let change =
                (second_half as f64 - first_half as f64) * 100.0 / first_half as f64;
            let direction = if change > TREND_THRESHOLD_PERCENT {
                TrendDirection::Up
            } else if change < -TREND_THRESHOLD_PERCENT {
                TrendDirection::Down
            } else {
                TrendDirection::Stable
            };
            (direction, (change.abs() * 10.0).round() / 10.0)
        }
    }
}

/// Longest run of consecutive calendar days, and the run ending at the most
/// recent day if that day is today or yesterday (else 0).
#[must_use]
pub fn day_streaks(dates: &BTreeSet<NaiveDate>, today: NaiveDate) -> (u32, u32) {
    let mut longest = 0;
    let mut run = 0;
    let mut previous: Option<NaiveDate> = None;
    for &date in dates {
        run = match previous {
            Some(prev) if date - prev == Duration::days(1) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(date);
    }

    let current = match previous {
        Some(last) if last == today || last == today - Duration::days(1) => run,
        _ => 0,
    };
    (longest, current)
}

/// Build a report from all records, keeping those inside `window`.
#[must_use]
pub fn build_report(
    records: &[TaskCompletionRecord],
    period: ReportPeriod,
    window: &ReportWindow,
    now: DateTime<Local>,
) -> ProductivityReport {
    let in_window: Vec<&TaskCompletionRecord> = records
        .iter()
        .filter(|r| window.contains(r.completed_at))
        .collect();

    if in_window.is_empty() {
        return ProductivityReport::empty(period, window);
    }

    let time = time_breakdown(&in_window);
    let projects = project_breakdown(&in_window, time.total_ms);

    let mut weekdays = [0usize; 7];
    let mut hours = [0usize; 24];
    let mut dates = BTreeSet::new();
    let mid = window.midpoint();
    let mut first_half = 0;
    for record in &in_window {
        let local = record.completed_local();
        weekdays[local.weekday().num_days_from_sunday() as usize] += 1;
        hours[local.hour() as usize] += 1;
        dates.insert(local.date_naive());
        if local < mid {
            first_half += 1;
        }
    }
    let (direction, change_percent) = trend_direction(first_half, in_window.len() - first_half);
    let (longest_streak, current_streak) = day_streaks(&dates, now.date_naive());

    let sessions: HashSet<&str> = in_window.iter().map(|r| r.session_id.as_str()).collect();

    ProductivityReport {
        period,
        start_date: window.start.format("%Y-%m-%d").to_string(),
        end_date: window.end.format("%Y-%m-%d").to_string(),
        generated_at: Utc::now(),
        total_tasks: in_window.len(),
        total_sessions: sessions.len(),
        total_projects: projects.len(),
        daily_activity: daily_activity(&in_window),
        trends: TrendMetrics {
            avg_tasks_per_day: in_window.len() as f64 / window.days() as f64,
            busiest_day_of_week: argmax(&weekdays),
            busiest_hour: argmax(&hours),
            direction,
            change_percent,
            longest_streak,
            current_streak,
        },
        time_breakdown: time,
        projects,
    }
}
