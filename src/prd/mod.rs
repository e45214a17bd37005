//! Task document model.
//!
//! The PRD is a markdown checklist. This module parses it into [`Task`]s and
//! rewrites individual markers or task line slots without disturbing any
//! other byte of the document.
//!
//! - [`parse`] - line grammar and task extraction
//! - [`mutate`] - marker changes, bulk updates and reordering
//! - [`document`] - file-backed wrapper used by the orchestrator

pub mod document;
pub mod mutate;
pub mod parse;
mod task;

pub use document::PrdDocument;
pub use mutate::{mark_all_complete, reorder, reset_all, set_marker};
pub use parse::{
    extract_acceptance_criteria, extract_dependencies, first_blocked, next_task, parse,
    strip_annotations, unmet_dependencies, ChecklistLine, TaskLine,
};
pub use task::{Task, TaskStats, TaskStatus};

#[cfg(test)]
mod tests {
    use super::*;

    /// Reordering then re-parsing puts the requested raw lines in the sorted
    /// slots and leaves prose alone.
    #[test]
    fn test_reorder_then_parse_round_trip() {
        let content = "# Plan\n- [ ] One\nprose\n- [x] Two\n\n- [~] Three\n* [!] Four\nend\n";
        let tasks = parse(content);
        let order: Vec<String> = ["task-7", "task-2", "task-6", "task-4"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let result = reorder(content, &order).unwrap();
        let reparsed = parse(&result);

        let expected_raw: Vec<&str> = order
            .iter()
            .map(|id| tasks.iter().find(|t| &t.id == id).unwrap().raw_line.as_str())
            .collect();
        let actual_raw: Vec<&str> = reparsed.iter().map(|t| t.raw_line.as_str()).collect();
        assert_eq!(actual_raw, expected_raw);

        let slots: Vec<usize> = reparsed.iter().map(|t| t.line_number).collect();
        assert_eq!(slots, vec![2, 4, 6, 7]);

        for (before, after) in content.split('\n').zip(result.split('\n')) {
            if ChecklistLine::parse(before).as_task().is_none() {
                assert_eq!(before, after);
            }
        }
    }
}
