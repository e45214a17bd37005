//! Testing infrastructure for prdloop.
//!
//! # Architecture
//!
//! - **Traits**: seams for the coding agent and the interactive prompt
//! - **Mocks**: scripted implementations of those traits plus a recording UI sink
//! - **Fixtures**: temporary project directories (test-only)
//!
//! # Example
//!
//! ```rust,ignore
//! use prdloop::testing::{InactivityChoice, MockAgent, MockPrompter};
//!
//! let agent = MockAgent::new();
//! let prompter = MockPrompter::new().with_answer(InactivityChoice::Skip);
//! ```

#[cfg(test)]
pub mod fixtures;
pub mod mocks;
pub mod traits;

#[cfg(test)]
pub use fixtures::*;
pub use mocks::*;
pub use traits::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::{LogLevel, LoopStatus, UiMessage, UiSink};

    #[tokio::test]
    async fn test_mock_agent_records_prompts() {
        let agent = MockAgent::new();
        agent.trigger_agent("first").await.unwrap();
        agent.trigger_document_generation("doc").await.unwrap();
        assert_eq!(agent.call_count(), 1);
        assert_eq!(agent.prompts(), vec!["first"]);
        assert_eq!(agent.generation_prompts(), vec!["doc"]);
    }

    #[tokio::test]
    async fn test_mock_agent_with_error() {
        let agent = MockAgent::new().with_error("missing binary");
        let err = agent.trigger_agent("p").await.unwrap_err();
        assert!(err.to_string().contains("missing binary"));
    }

    #[tokio::test]
    async fn test_mock_prompter_answers_then_dismisses() {
        let prompter = MockPrompter::new()
            .with_answer(InactivityChoice::Retry)
            .with_dismissal();
        assert_eq!(prompter.ask("A").await, Some(InactivityChoice::Retry));
        assert_eq!(prompter.ask("A").await, None);
        assert_eq!(prompter.ask("A").await, None);
        assert_eq!(prompter.questions().len(), 3);

        prompter.notify(LogLevel::Warning, "careful");
        assert_eq!(prompter.notices(), vec![(LogLevel::Warning, "careful".to_string())]);
    }

    #[test]
    fn test_recording_sink_views() {
        let sink = RecordingSink::new();
        sink.deliver(UiMessage::Status {
            status: LoopStatus::Waiting,
            iteration: 2,
            task: None,
        });
        sink.deliver(UiMessage::Countdown { seconds: 4 });
        sink.deliver(UiMessage::log(LogLevel::Info, "hi"));

        assert_eq!(sink.last_status(), Some((LoopStatus::Waiting, 2)));
        assert_eq!(sink.countdowns(), vec![4]);
        assert_eq!(sink.logs(), vec!["hi"]);
        sink.clear();
        assert!(sink.messages().is_empty());
    }

    #[test]
    fn test_fixture_three_tasks() {
        let project = TestProject::three_tasks();
        assert!(project.prd_path().exists());
        assert_eq!(crate::prd::parse(&project.read_prd()).len(), 3);
        assert!(project.read_progress().is_empty());
    }
}
