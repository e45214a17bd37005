//! Agent prompt construction.
//!
//! - [`templates`] - base templates and marker substitution
//!
//! # Example
//!
//! ```
//! use prdloop::config::Requirements;
//! use prdloop::prompt::PromptBuilder;
//!
//! let builder = PromptBuilder::new("PRD.md", "progress.txt", Requirements::default());
//! let prompt = builder.prd_generation_prompt("A todo app");
//! assert!(prompt.contains("A todo app"));
//! ```

pub mod templates;

use std::collections::HashMap;

use crate::config::Requirements;
use crate::prd::Task;
use templates::{render, TemplateMarker, PRD_TEMPLATE, TASK_TEMPLATE};

/// Builds prompts for the agent from the current settings.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    prd_file: String,
    progress_file: String,
    requirements: Requirements,
}

impl PromptBuilder {
    #[must_use]
    pub fn new(
        prd_file: impl Into<String>,
        progress_file: impl Into<String>,
        requirements: Requirements,
    ) -> Self {
        Self {
            prd_file: prd_file.into(),
            progress_file: progress_file.into(),
            requirements,
        }
    }

    pub fn set_requirements(&mut self, requirements: Requirements) {
        self.requirements = requirements;
    }

    #[must_use]
    pub fn requirements(&self) -> &Requirements {
        &self.requirements
    }

    fn base_values(&self) -> HashMap<TemplateMarker, String> {
        HashMap::from([
            (TemplateMarker::PrdFile, self.prd_file.clone()),
            (TemplateMarker::ProgressFile, self.progress_file.clone()),
        ])
    }

    /// Prompt asking the agent to complete one task.
    #[must_use]
    pub fn task_prompt(&self, task: &Task) -> String {
        let mut values = self.base_values();
        values.insert(TemplateMarker::Task, task.description.clone());

        if !task.acceptance_criteria.is_empty() {
            let mut criteria = String::from("\nAcceptance criteria:\n");
            for item in &task.acceptance_criteria {
                criteria.push_str(&format!("- {item}\n"));
            }
            values.insert(TemplateMarker::AcceptanceCriteria, criteria);
        }

        let requirements: Vec<String> = self
            .requirements
            .enabled_items()
            .into_iter()
            .map(|item| format!("- {item}"))
            .collect();
        values.insert(TemplateMarker::Requirements, requirements.join("\n"));

        render(TASK_TEMPLATE, &values)
    }

    /// Prompt asking the agent to write the task document.
    #[must_use]
    pub fn prd_generation_prompt(&self, description: &str) -> String {
        let mut values = self.base_values();
        values.insert(TemplateMarker::Description, description.trim().to_string());
        render(PRD_TEMPLATE, &values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prd::parse;

    fn builder(requirements: Requirements) -> PromptBuilder {
        PromptBuilder::new("PRD.md", "progress.txt", requirements)
    }

    #[test]
    fn test_task_prompt_includes_task_and_criteria() {
        let tasks = parse("- [ ] Add login [AC: Form renders; Errors shown]");
        let prompt = builder(Requirements::default()).task_prompt(&tasks[0]);
        assert!(prompt.contains("Current task: Add login [AC: Form renders; Errors shown]"));
        assert!(prompt.contains("- Form renders\n- Errors shown"));
        assert!(prompt.contains("progress.txt"));
    }

    #[test]
    fn test_task_prompt_lists_enabled_requirements() {
        let tasks = parse("- [ ] Add login");
        let requirements = Requirements {
            write_tests: true,
            run_tests: false,
            commit: true,
            ..Requirements::default()
        };
        let prompt = builder(requirements).task_prompt(&tasks[0]);
        assert!(prompt.contains("- Write unit tests"));
        assert!(prompt.contains("- Commit the change"));
        assert!(!prompt.contains("Run the test suite"));
        assert!(!prompt.contains("Acceptance criteria"));
    }

    #[test]
    fn test_prd_prompt_names_file() {
        let prompt = builder(Requirements::default()).prd_generation_prompt("  A CLI  ");
        assert!(prompt.contains("named PRD.md"));
        assert!(prompt.contains("\nA CLI\n"));
    }
}
