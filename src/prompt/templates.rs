//! Base templates and marker substitution.
//!
//! # Example
//!
//! ```
//! use prdloop::prompt::templates::TemplateMarker;
//!
//! assert_eq!(TemplateMarker::Task.tag(), "{{TASK}}");
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{[A-Z_]+\}\}").expect("marker pattern is valid"));

/// Injection points in a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateMarker {
    /// Description of the task to work on.
    Task,
    /// Bullet list of acceptance criteria.
    AcceptanceCriteria,
    /// Bullet list of enabled requirements.
    Requirements,
    /// File name of the task document.
    PrdFile,
    /// File name of the progress log.
    ProgressFile,
    /// Free-form project description for document generation.
    Description,
}

impl TemplateMarker {
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            TemplateMarker::Task => "{{TASK}}",
            TemplateMarker::AcceptanceCriteria => "{{ACCEPTANCE_CRITERIA}}",
            TemplateMarker::Requirements => "{{REQUIREMENTS}}",
            TemplateMarker::PrdFile => "{{PRD_FILE}}",
            TemplateMarker::ProgressFile => "{{PROGRESS_FILE}}",
            TemplateMarker::Description => "{{DESCRIPTION}}",
        }
    }

    /// The marker written as `tag`, if any.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<TemplateMarker> {
        Self::all().iter().copied().find(|m| m.tag() == tag)
    }

    #[must_use]
    pub fn all() -> &'static [TemplateMarker] {
        &[
            TemplateMarker::Task,
            TemplateMarker::AcceptanceCriteria,
            TemplateMarker::Requirements,
            TemplateMarker::PrdFile,
            TemplateMarker::ProgressFile,
            TemplateMarker::Description,
        ]
    }
}

/// Template for one task iteration.
pub const TASK_TEMPLATE: &str = "\
You are working through the task list in {{PRD_FILE}}.

Current task: {{TASK}}
{{ACCEPTANCE_CRITERIA}}
When the task is done:
{{REQUIREMENTS}}
- Mark the task complete by changing its `[ ]` to `[x]` in {{PRD_FILE}}.
- Append a one-line summary of what you did to {{PROGRESS_FILE}}.

Work on this task only. Do not start the next one.
";

/// Template for generating a new task document.
pub const PRD_TEMPLATE: &str = "\
Create a file named {{PRD_FILE}} in the project root describing the work below
as a checklist of small, independently verifiable tasks.

Project description:
{{DESCRIPTION}}

Format every task as a top-level line `- [ ] <task>`. Where a task needs
another one first, append `(depends on: \"<other task>\")`. Where useful,
append acceptance criteria as `[AC: first; second]`.
";

/// Replace every known marker in `template` in a single pass.
///
/// Markers without a value are removed. Substituted values are never
/// scanned again, so a `{{...}}` inside a task description stays literal.
#[must_use]
pub fn render(template: &str, values: &HashMap<TemplateMarker, String>) -> String {
    MARKER_RE
        .replace_all(template, |caps: &Captures<'_>| {
            let tag = &caps[0];
            match TemplateMarker::from_tag(tag) {
                Some(marker) => values.get(&marker).cloned().unwrap_or_default(),
                None => tag.to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_and_drops_missing() {
        let mut values = HashMap::new();
        values.insert(TemplateMarker::Task, "Write docs".to_string());
        let out = render("Do {{TASK}} now{{REQUIREMENTS}}.", &values);
        assert_eq!(out, "Do Write docs now.");
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let mut values = HashMap::new();
        values.insert(TemplateMarker::Task, "Document {{PRD_FILE}} syntax".to_string());
        values.insert(TemplateMarker::PrdFile, "PRD.md".to_string());
        let out = render("{{TASK}} in {{PRD_FILE}}", &values);
        assert_eq!(out, "Document {{PRD_FILE}} syntax in PRD.md");
    }

    #[test]
    fn test_unknown_markers_stay() {
        assert_eq!(render("keep {{OTHER}}", &HashMap::new()), "keep {{OTHER}}");
    }

    #[test]
    fn test_templates_use_only_known_markers() {
        for template in [TASK_TEMPLATE, PRD_TEMPLATE] {
            let rendered = render(template, &HashMap::new());
            assert!(!rendered.contains("{{"), "unresolved marker in {template}");
        }
    }
}
