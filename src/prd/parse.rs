//! Line grammar and parsing for the checklist document.
//!
//! A task line is exactly `[-*] \[M\] text` starting in column 0, where `M`
//! is one of ` `, `x`, `~`, `!`, `s` (case-insensitive). Everything else is
//! prose and is never represented or touched.

use regex::Regex;
use std::sync::LazyLock;

use super::{Task, TaskStatus};

/// Byte offset of the marker character inside a task line.
pub(crate) const MARKER_OFFSET: usize = 3;

/// Byte offset of the task text inside a task line.
const TEXT_OFFSET: usize = 6;

static DEPENDS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\(depends on:\s*([^)]*)\)").expect("dependency pattern is valid")
});

static AC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[AC:\s*([^\]]*)\]").expect("AC pattern is valid"));

// ============================================================================
// Line Grammar
// ============================================================================

/// Structured view of a single document line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecklistLine<'a> {
    Task(TaskLine<'a>),
    Other,
}

/// The fields of a line that matched the task grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskLine<'a> {
    pub bullet: char,
    pub marker: char,
    pub status: TaskStatus,
    /// Text after the marker, untrimmed, without a trailing `\r`.
    pub text: &'a str,
}

impl<'a> ChecklistLine<'a> {
    /// Classify one line (without its `\n`).
    ///
    /// # Example
    ///
    /// ```
    /// use prdloop::prd::{ChecklistLine, TaskStatus};
    ///
    /// match ChecklistLine::parse("* [~] Wire the watcher") {
    ///     ChecklistLine::Task(line) => assert_eq!(line.status, TaskStatus::InProgress),
    ///     ChecklistLine::Other => unreachable!(),
    /// }
    /// assert_eq!(ChecklistLine::parse("  - [ ] nested"), ChecklistLine::Other);
    /// ```
    #[must_use]
    pub fn parse(line: &'a str) -> Self {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let bytes = line.as_bytes();
        if bytes.len() <= TEXT_OFFSET {
            return Self::Other;
        }

        let bullet = bytes[0];
        if !(bullet == b'-' || bullet == b'*')
            || bytes[1] != b' '
            || bytes[2] != b'['
            || bytes[4] != b']'
            || bytes[5] != b' '
        {
            return Self::Other;
        }

        let marker = bytes[MARKER_OFFSET];
        if !marker.is_ascii() {
            return Self::Other;
        }
        let marker = char::from(marker);
        let Some(status) = TaskStatus::from_marker(marker) else {
            return Self::Other;
        };

        Self::Task(TaskLine {
            bullet: char::from(bullet),
            marker,
            status,
            text: &line[TEXT_OFFSET..],
        })
    }

    /// The task fields, if this is a task line.
    #[must_use]
    pub fn as_task(&self) -> Option<&TaskLine<'a>> {
        match self {
            Self::Task(line) => Some(line),
            Self::Other => None,
        }
    }
}

// ============================================================================
// Document Parsing
// ============================================================================

/// Parse all top-level checklist tasks in document order.
///
/// # Example
///
/// ```
/// use prdloop::prd::{parse, TaskStatus};
///
/// let tasks = parse("# Plan\n- [x] Setup\n- [ ] Build the parser\n  - [ ] nested note\n");
/// assert_eq!(tasks.len(), 2);
/// assert_eq!(tasks[1].id, "task-3");
/// assert_eq!(tasks[1].status, TaskStatus::Pending);
/// ```
#[must_use]
pub fn parse(content: &str) -> Vec<Task> {
    content
        .split('\n')
        .enumerate()
        .filter_map(|(index, raw)| {
            let line = ChecklistLine::parse(raw);
            let task_line = line.as_task()?;
            let line_number = index + 1;
            let description = task_line.text.trim().to_string();
            Some(Task {
                id: Task::id_for_line(line_number),
                dependencies: extract_dependencies(&description),
                acceptance_criteria: extract_acceptance_criteria(&description),
                description,
                status: task_line.status,
                line_number,
                raw_line: raw.to_string(),
            })
        })
        .collect()
}

/// Extract `(depends on: "A", "B")` references; quotes are optional.
#[must_use]
pub fn extract_dependencies(description: &str) -> Vec<String> {
    DEPENDS_RE
        .captures(description)
        .map(|caps| {
            caps[1]
                .split(',')
                .map(|dep| dep.trim().trim_matches(|c| c == '"' || c == '\'').trim())
                .filter(|dep| !dep.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Extract `[AC: c1; c2]` criteria, dropping empty entries.
#[must_use]
pub fn extract_acceptance_criteria(description: &str) -> Vec<String> {
    AC_RE
        .captures(description)
        .map(|caps| {
            caps[1]
                .split(';')
                .map(str::trim)
                .filter(|criterion| !criterion.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Remove dependency and AC annotations from a description.
#[must_use]
pub fn strip_annotations(description: &str) -> String {
    let without_deps = DEPENDS_RE.replace_all(description, "");
    let without_ac = AC_RE.replace_all(&without_deps, "");
    without_ac.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// Selection
// ============================================================================

/// First pending or in-progress task in document order.
#[must_use]
pub fn next_task(tasks: &[Task]) -> Option<&Task> {
    tasks.iter().find(|task| task.status.is_actionable())
}

/// First blocked task in document order.
#[must_use]
pub fn first_blocked(tasks: &[Task]) -> Option<&Task> {
    tasks.iter().find(|task| task.status == TaskStatus::Blocked)
}

/// Dependencies of `task` that no finished task satisfies.
///
/// A dependency is satisfied by a complete or skipped task whose title equals
/// it or contains it, ignoring case.
#[must_use]
pub fn unmet_dependencies(task: &Task, tasks: &[Task]) -> Vec<String> {
    let finished: Vec<String> = tasks
        .iter()
        .filter(|t| t.status.is_terminal())
        .map(|t| t.title().to_lowercase())
        .collect();

    task.dependencies
        .iter()
        .filter(|dep| {
            let dep = dep.to_lowercase();
            !finished.iter().any(|title| title.contains(&dep))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_status_mapping() {
        let cases = [
            ("- [ ] T", TaskStatus::Pending),
            ("- [x] T", TaskStatus::Complete),
            ("- [X] T", TaskStatus::Complete),
            ("- [~] T", TaskStatus::InProgress),
            ("- [!] T", TaskStatus::Blocked),
            ("- [s] T", TaskStatus::Skipped),
            ("- [S] T", TaskStatus::Skipped),
        ];
        for (doc, status) in cases {
            let tasks = parse(doc);
            assert_eq!(tasks.len(), 1, "{doc}");
            assert_eq!(tasks[0].status, status, "{doc}");
        }
    }

    #[test]
    fn test_other_bracket_content_is_not_a_task() {
        for doc in ["- [o] T", "- [-] T", "- [xx] T", "- [] T", "- [?] T", "- [é] T"] {
            assert!(parse(doc).is_empty(), "{doc}");
        }
    }

    #[test]
    fn test_shape_must_be_exact() {
        for doc in [
            "  - [ ] indented",
            "\t- [ ] tabbed",
            "-  [ ] two spaces",
            "- [ ]no space",
            "- [ ] ",
            "+ [ ] plus bullet",
            "1. [ ] numbered",
        ] {
            assert!(parse(doc).is_empty(), "{doc:?}");
        }
        assert_eq!(parse("* [ ] star bullet").len(), 1);
    }

    #[test]
    fn test_description_is_trimmed_and_raw_line_kept() {
        let tasks = parse("- [ ]   padded task   ");
        assert_eq!(tasks[0].description, "padded task");
        assert_eq!(tasks[0].raw_line, "- [ ]   padded task   ");
    }

    #[test]
    fn test_crlf_lines_match_and_keep_raw() {
        let tasks = parse("# H\r\n- [ ] First\r\n- [x] Second\r\n");
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].description, "First");
        assert_eq!(tasks[0].raw_line, "- [ ] First\r");
        assert_eq!(tasks[1].line_number, 3);
    }

    #[test]
    fn test_ids_follow_line_numbers() {
        let tasks = parse("# Title\n\nIntro\n- [ ] A\ntext\n- [ ] B");
        let ids: Vec<_> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["task-4", "task-6"]);
        assert_eq!(tasks[1].line_number, 6);
    }

    #[test]
    fn test_dependency_and_ac_extraction() {
        let tasks =
            parse(r#"- [ ] Task C (depends on: "Task A", "Task B") [AC: Tests pass; Docs updated]"#);
        assert_eq!(tasks[0].dependencies, vec!["Task A", "Task B"]);
        assert_eq!(tasks[0].acceptance_criteria, vec!["Tests pass", "Docs updated"]);
    }

    #[test]
    fn test_unquoted_dependencies_and_empty_criteria() {
        assert_eq!(
            extract_dependencies("Deploy (Depends On: build, test )"),
            vec!["build", "test"]
        );
        assert_eq!(
            extract_acceptance_criteria("Ship [AC: ; works ;; fast ;]"),
            vec!["works", "fast"]
        );
        assert!(extract_dependencies("No deps here").is_empty());
        assert!(extract_acceptance_criteria("No AC").is_empty());
    }

    #[test]
    fn test_strip_annotations() {
        assert_eq!(
            strip_annotations(r#"Task C (depends on: "Task A") [AC: ok]  now"#),
            "Task C now"
        );
    }

    #[test]
    fn test_next_task_picks_first_actionable() {
        let tasks = parse("- [x] Done\n- [!] Stuck\n- [~] Working\n- [ ] Later");
        assert_eq!(next_task(&tasks).unwrap().description, "Working");
        assert_eq!(first_blocked(&tasks).unwrap().description, "Stuck");
        assert!(next_task(&parse("- [x] a\n- [s] b")).is_none());
    }

    #[test]
    fn test_unmet_dependencies() {
        let tasks = parse(
            "- [x] Set up database\n- [ ] Write API\n- [ ] Ship (depends on: \"set up database\", \"Write API\")",
        );
        assert_eq!(unmet_dependencies(&tasks[2], &tasks), vec!["Write API"]);
    }
}
