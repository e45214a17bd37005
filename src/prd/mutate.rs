//! In-place mutations of the checklist document.
//!
//! Every function takes the whole document and returns the whole document.
//! Only the marker byte of matching task lines (or, for reorder, the exact
//! set of task line slots) ever changes.

use std::collections::{HashMap, HashSet};

use super::parse::{parse, ChecklistLine, MARKER_OFFSET};
use super::{Task, TaskStatus};
use crate::error::{LoopError, Result};

fn replace_marker(line: &str, marker: char) -> String {
    let mut out = String::with_capacity(line.len());
    out.push_str(&line[..MARKER_OFFSET]);
    out.push(marker);
    out.push_str(&line[MARKER_OFFSET + 1..]);
    out
}

/// Rewrite markers of every task line selected by `select`.
///
/// Returns the new content and the number of lines changed.
fn rewrite_markers<F>(content: &str, marker: char, select: F) -> (String, usize)
where
    F: Fn(TaskStatus) -> bool,
{
    let mut count = 0;
    let lines: Vec<String> = content
        .split('\n')
        .map(|line| match ChecklistLine::parse(line) {
            ChecklistLine::Task(task) if select(task.status) => {
                count += 1;
                replace_marker(line, marker)
            }
            _ => line.to_string(),
        })
        .collect();
    (lines.join("\n"), count)
}

/// Replace the marker on `line_number` (1-based).
///
/// Returns `None` when the line is out of range, no longer matches the task
/// grammar, or `marker` is not a valid status marker.
///
/// # Example
///
/// ```
/// use prdloop::prd::set_marker;
///
/// let doc = "# Plan\n- [ ] Build it\n";
/// assert_eq!(set_marker(doc, 2, 'x').unwrap(), "# Plan\n- [x] Build it\n");
/// assert!(set_marker(doc, 1, 'x').is_none());
/// ```
#[must_use]
pub fn set_marker(content: &str, line_number: usize, marker: char) -> Option<String> {
    TaskStatus::from_marker(marker)?;
    let index = line_number.checked_sub(1)?;
    let line = content.split('\n').nth(index)?;
    ChecklistLine::parse(line).as_task()?;

    let replaced = replace_marker(line, marker);
    let lines: Vec<&str> = content
        .split('\n')
        .enumerate()
        .map(|(i, l)| if i == index { replaced.as_str() } else { l })
        .collect();
    Some(lines.join("\n"))
}

/// Mark every pending, in-progress or blocked task complete.
#[must_use]
pub fn mark_all_complete(content: &str) -> (String, usize) {
    rewrite_markers(content, TaskStatus::Complete.marker(), |status| {
        !status.is_terminal()
    })
}

/// Reset every non-pending task to pending.
#[must_use]
pub fn reset_all(content: &str) -> (String, usize) {
    rewrite_markers(content, TaskStatus::Pending.marker(), |status| {
        status != TaskStatus::Pending
    })
}

/// Reorder tasks by id.
///
/// The line slots occupied by the listed tasks are sorted, and each slot
/// receives the raw line of the task at the same position in `ordered_ids`.
/// Prose between tasks stays where it is.
///
/// # Errors
///
/// Returns [`LoopError::UnknownTask`] if an id is not in the document and
/// [`LoopError::InvalidFormat`] if an id is listed twice. Nothing is written
/// in either case.
///
/// # Example
///
/// ```
/// use prdloop::prd::reorder;
///
/// let doc = "- [ ] A\nnote\n- [ ] B";
/// let ids = vec!["task-3".to_string(), "task-1".to_string()];
/// assert_eq!(reorder(doc, &ids).unwrap(), "- [ ] B\nnote\n- [ ] A");
/// ```
pub fn reorder(content: &str, ordered_ids: &[String]) -> Result<String> {
    let tasks = parse(content);
    let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();

    let mut seen = HashSet::new();
    let mut ordered = Vec::with_capacity(ordered_ids.len());
    for id in ordered_ids {
        let task = by_id
            .get(id.as_str())
            .ok_or_else(|| LoopError::UnknownTask { id: id.clone() })?;
        if !seen.insert(id.as_str()) {
            return Err(LoopError::invalid_format(id, "each task id at most once"));
        }
        ordered.push(*task);
    }

    let mut slots: Vec<usize> = ordered.iter().map(|t| t.line_number).collect();
    slots.sort_unstable();

    let mut lines: Vec<&str> = content.split('\n').collect();
    for (slot, task) in slots.iter().zip(&ordered) {
        lines[slot - 1] = &task.raw_line;
    }
    Ok(lines.join("\n"))
}
