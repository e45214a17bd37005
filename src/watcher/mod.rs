//! Filesystem watchers feeding the loop.
//!
//! Each watcher wraps a `notify` watcher whose events are bridged into a
//! tokio channel and handled on a spawned task. A watcher whose setup fails
//! logs a warning and stays inert.
//!
//! - [`PrdWatcher`] - content-diff watch of the task document
//! - [`ActivityWatcher`] - workspace liveness signal
//! - [`CreationWatcher`] - one-shot wait for a file to appear

mod activity;
mod creation;
mod prd;

pub use activity::{ActivityFilter, ActivityWatcher, DEFAULT_IGNORED_DIRS};
pub use creation::CreationWatcher;
pub use prd::PrdWatcher;

use std::path::Path;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::Result;

/// Start a `notify` watcher on `path` whose events arrive on the returned
/// receiver.
fn bridge(
    path: &Path,
    mode: RecursiveMode,
) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<Event>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        if let Ok(event) = res {
            let _ = tx.send(event);
        }
    })?;
    watcher.watch(path, mode)?;
    Ok((watcher, rx))
}

/// Whether an event changes file contents or existence.
fn is_write_event(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Whether any path of an event names the file `target`.
fn touches(event: &Event, target: &Path) -> bool {
    let Some(name) = target.file_name() else {
        return false;
    };
    event.paths.iter().any(|p| p.file_name() == Some(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};
    use std::path::PathBuf;

    #[test]
    fn test_write_event_kinds() {
        assert!(is_write_event(&EventKind::Create(CreateKind::File)));
        assert!(is_write_event(&EventKind::Modify(ModifyKind::Any)));
        assert!(!is_write_event(&EventKind::Access(AccessKind::Any)));
    }

    #[test]
    fn test_touches_matches_file_name() {
        let event = Event::new(EventKind::Any).add_path(PathBuf::from("/work/PRD.md"));
        assert!(touches(&event, Path::new("/other/root/PRD.md")));
        assert!(!touches(&event, Path::new("/work/progress.txt")));
    }
}
