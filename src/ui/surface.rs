//! Host surfaces that may be hidden.
//!
//! A surface queues every accepted message while hidden and flushes the
//! queue, in order, when it becomes visible again.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::{UiMessage, UiSink};

/// Which host surface a sink represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    /// Full panel: receives everything.
    Panel,
    /// Compact sidebar: no history, only highlighted log lines.
    Sidebar,
}

impl SurfaceKind {
    /// Whether this surface shows `message` at all.
    #[must_use]
    pub fn accepts(&self, message: &UiMessage) -> bool {
        match self {
            SurfaceKind::Panel => true,
            SurfaceKind::Sidebar => match message {
                UiMessage::History { .. } => false,
                UiMessage::Log { highlight, .. } => *highlight,
                _ => true,
            },
        }
    }
}

type Output = Box<dyn Fn(UiMessage) + Send + Sync>;

#[derive(Debug, Default)]
struct SurfaceState {
    visible: bool,
    queue: VecDeque<UiMessage>,
}

/// A surface that hands visible messages to `output`.
pub struct SurfaceSink {
    kind: SurfaceKind,
    state: Mutex<SurfaceState>,
    output: Output,
}

impl std::fmt::Debug for SurfaceSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceSink")
            .field("kind", &self.kind)
            .field("state", &*self.state())
            .finish()
    }
}

impl SurfaceSink {
    /// Create a hidden surface.
    pub fn new<F>(kind: SurfaceKind, output: F) -> Self
    where
        F: Fn(UiMessage) + Send + Sync + 'static,
    {
        Self {
            kind,
            state: Mutex::new(SurfaceState::default()),
            output: Box::new(output),
        }
    }

    fn state(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.state().visible
    }

    #[must_use]
    pub fn queued(&self) -> usize {
        self.state().queue.len()
    }

    /// Show or hide the surface. Showing flushes queued messages.
    pub fn set_visible(&self, visible: bool) {
        let pending: Vec<UiMessage> = {
            let mut state = self.state();
            state.visible = visible;
            if visible {
                state.queue.drain(..).collect()
            } else {
                Vec::new()
            }
        };
        if !pending.is_empty() {
            debug!("Flushing {} queued messages to {:?}", pending.len(), self.kind);
        }
        for message in pending {
            (self.output)(message);
        }
    }
}

impl UiSink for SurfaceSink {
    fn deliver(&self, message: UiMessage) {
        if !self.kind.accepts(&message) {
            return;
        }
        {
            let mut state = self.state();
            if !state.visible {
                state.queue.push_back(message);
                return;
            }
        }
        (self.output)(message);
    }
}
