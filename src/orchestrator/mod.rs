//! Loop orchestration.
//!
//! - [`events`] - UI commands and internal events, plus the [`LoopHandle`]
//! - [`machine`] - the state machine and its lifecycle transitions
//! - [`actions`] - task mutations, project switching, generation and exports
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  Command   ┌──────────────────┐   prompt   ┌─────────┐
//! │ UI surfaces  │───────────>│ LoopOrchestrator │──────────>│  Agent  │
//! └──────────────┘            │  (one event at   │            └─────────┘
//!        ^                    │   a time)        │                 │
//!        │ UiMessage          └──────────────────┘                 │ edits
//!        │                      ^      ^      ^                    v
//!        │            countdown │      │      │ PrdChanged   ┌─────────┐
//!        └──────────────────────┘  inactivity └──────────────│ PRD.md  │
//!                                                            └─────────┘
//! ```

pub mod actions;
pub mod events;
pub mod machine;

pub use events::{Command, LoopEvent, LoopHandle};
pub use machine::LoopOrchestrator;
