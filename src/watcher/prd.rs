//! Content-diff watcher for the task document.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use notify::{RecommendedWatcher, RecursiveMode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type ChangeCallback = dyn Fn(String) + Send + Sync;

/// Baseline plus enable gate.
#[derive(Debug)]
struct DiffState {
    baseline: String,
    enabled: bool,
}

impl DiffState {
    /// Returns the new content when it should be reported, rebasing on it.
    fn observe(&mut self, content: String) -> Option<String> {
        if !self.enabled || content == self.baseline {
            return None;
        }
        self.baseline.clone_from(&content);
        Some(content)
    }
}

struct Shared {
    path: PathBuf,
    state: Mutex<DiffState>,
    on_change: Box<ChangeCallback>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, DiffState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn refresh(&self) {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) => {
                debug!("Skipping change of {}: {}", self.path.display(), e);
                return;
            }
        };
        let changed = self.state().observe(content);
        if let Some(content) = changed {
            (self.on_change)(content);
        }
    }
}

/// Reports task-document edits that differ from the last seen content.
///
/// Starts disabled. Changes are only processed while enabled, so writes made
/// while the loop is busy never trigger it.
pub struct PrdWatcher {
    shared: Arc<Shared>,
    watcher: Option<RecommendedWatcher>,
    token: CancellationToken,
}

impl std::fmt::Debug for PrdWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrdWatcher")
            .field("path", &self.shared.path)
            .field("active", &self.watcher.is_some())
            .finish()
    }
}

impl PrdWatcher {
    /// Watch `path` with `initial_content` as baseline.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start<F>(path: impl Into<PathBuf>, initial_content: String, on_change: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let shared = Arc::new(Shared {
            path: path.into(),
            state: Mutex::new(DiffState {
                baseline: initial_content,
                enabled: false,
            }),
            on_change: Box::new(on_change),
        });
        let token = CancellationToken::new();
        let watcher = Self::spawn(&shared, &token);
        Self {
            shared,
            watcher,
            token,
        }
    }

    fn spawn(shared: &Arc<Shared>, token: &CancellationToken) -> Option<RecommendedWatcher> {
        let dir = shared
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let (watcher, mut events) = match super::bridge(dir, RecursiveMode::NonRecursive) {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Cannot watch {}: {}", shared.path.display(), e);
                return None;
            }
        };

        let shared = Arc::clone(shared);
        let token = token.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    () = token.cancelled() => break,
                    event = events.recv() => event,
                };
                let Some(event) = event else { break };
                if super::is_write_event(&event.kind) && super::touches(&event, &shared.path) {
                    shared.refresh().await;
                }
            }
        });
        Some(watcher)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Whether the underlying filesystem watch was set up.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.watcher.is_some() && !self.token.is_cancelled()
    }

    pub fn enable(&self) {
        self.shared.state().enabled = true;
    }

    pub fn disable(&self) {
        self.shared.state().enabled = false;
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.shared.state().enabled
    }

    /// Replace the baseline without reporting.
    pub fn update_content(&self, content: String) {
        self.shared.state().baseline = content;
    }

    /// Re-read the file now, as if a change event had arrived.
    pub async fn refresh(&self) {
        self.shared.refresh().await;
    }

    pub fn stop(&mut self) {
        self.token.cancel();
        self.watcher = None;
    }
}

impl Drop for PrdWatcher {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    fn diff(baseline: &str, enabled: bool) -> DiffState {
        DiffState {
            baseline: baseline.to_string(),
            enabled,
        }
    }

    #[test]
    fn test_diff_against_baseline_not_last_event() {
        let mut state = diff("A", true);
        assert_eq!(state.observe("B".into()), Some("B".into()));
        assert_eq!(state.observe("B".into()), None);
        assert_eq!(state.observe("A".into()), Some("A".into()));
    }

    #[test]
    fn test_disabled_ignores_changes() {
        let mut state = diff("A", false);
        assert_eq!(state.observe("B".into()), None);
        state.enabled = true;
        assert_eq!(state.observe("B".into()), Some("B".into()));
    }

    /// Watcher driven only by explicit `refresh` calls.
    fn collecting_watcher(path: PathBuf, initial: &str) -> (PrdWatcher, Arc<StdMutex<Vec<String>>>) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut watcher = PrdWatcher::start(path, initial.to_string(), move |c| {
            sink.lock().unwrap().push(c);
        });
        watcher.stop();
        (watcher, seen)
    }

    #[tokio::test]
    async fn test_two_identical_changes_fire_once() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("PRD.md");
        std::fs::write(&path, "- [ ] A\n").unwrap();
        let (watcher, seen) = collecting_watcher(path.clone(), "- [ ] A\n");
        watcher.enable();

        std::fs::write(&path, "- [x] A\n").unwrap();
        watcher.refresh().await;
        watcher.refresh().await;

        assert_eq!(*seen.lock().unwrap(), vec!["- [x] A\n".to_string()]);
    }

    #[tokio::test]
    async fn test_update_content_rebases_silently() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("PRD.md");
        std::fs::write(&path, "one").unwrap();
        let (watcher, seen) = collecting_watcher(path.clone(), "one");
        watcher.enable();

        std::fs::write(&path, "two").unwrap();
        watcher.update_content("two".into());
        watcher.refresh().await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_watcher_stays_quiet() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("PRD.md");
        std::fs::write(&path, "one").unwrap();
        let (watcher, seen) = collecting_watcher(path.clone(), "one");
        assert!(!watcher.is_enabled());

        std::fs::write(&path, "two").unwrap();
        watcher.refresh().await;
        assert!(seen.lock().unwrap().is_empty());
        assert!(!watcher.is_active());
    }
}
