//! One-shot watcher waiting for a file to be created.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use notify::{RecommendedWatcher, RecursiveMode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type Callback = Box<dyn FnOnce() + Send>;

/// Fires once when `path` exists, then disposes itself.
pub struct CreationWatcher {
    path: PathBuf,
    watcher: Option<RecommendedWatcher>,
    token: CancellationToken,
}

impl std::fmt::Debug for CreationWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreationWatcher")
            .field("path", &self.path)
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// Run the callback at most once.
fn fire(slot: &Mutex<Option<Callback>>, token: &CancellationToken) {
    let callback = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    if let Some(callback) = callback {
        token.cancel();
        callback();
    }
}

impl CreationWatcher {
    /// Wait for `path`. Fires immediately if it already exists. Must be
    /// called inside a tokio runtime.
    pub fn start<F>(path: impl Into<PathBuf>, on_created: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let path = path.into();
        let token = CancellationToken::new();
        let slot: Arc<Mutex<Option<Callback>>> = Arc::new(Mutex::new(Some(Box::new(on_created))));

        if path.exists() {
            fire(&slot, &token);
            return Self {
                path,
                watcher: None,
                token,
            };
        }

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let watcher = match super::bridge(dir, RecursiveMode::NonRecursive) {
            Ok((watcher, mut events)) => {
                let target = path.clone();
                let token = token.clone();
                tokio::spawn(async move {
                    loop {
                        let event = tokio::select! {
                            () = token.cancelled() => break,
                            event = events.recv() => event,
                        };
                        let Some(event) = event else { break };
                        if super::touches(&event, &target) && target.exists() {
                            debug!("{} created", target.display());
                            fire(&slot, &token);
                            break;
                        }
                    }
                });
                Some(watcher)
            }
            Err(e) => {
                warn!("Cannot watch for {}: {}", path.display(), e);
                token.cancel();
                None
            }
        };

        Self {
            path,
            watcher,
            token,
        }
    }

    /// Whether the callback may still fire.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub fn stop(&mut self) {
        self.token.cancel();
        self.watcher = None;
    }
}

impl Drop for CreationWatcher {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_existing_file_fires_immediately() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("PRD.md");
        std::fs::write(&path, "# P").unwrap();

        let count = Arc::new(AtomicU32::new(0));
        let inner = Arc::clone(&count);
        let watcher = CreationWatcher::start(&path, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!watcher.is_pending());
    }

    #[tokio::test]
    async fn test_later_create_fires_once() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("PRD.md");

        let count = Arc::new(AtomicU32::new(0));
        let inner = Arc::clone(&count);
        let watcher = CreationWatcher::start(&path, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        assert!(watcher.is_pending());
        assert_eq!(count.load(Ordering::SeqCst), 0);

        std::fs::write(&path, "- [ ] Generated\n").unwrap();
        for _ in 0..100 {
            if !watcher.is_pending() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!watcher.is_pending());

        std::fs::write(&path, "- [ ] Generated\n- [ ] Again\n").unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_disarms() {
        let temp = TempDir::new().unwrap();
        let mut watcher = CreationWatcher::start(temp.path().join("PRD.md"), || {});
        assert!(watcher.is_pending());
        watcher.stop();
        assert!(!watcher.is_pending());
    }

    #[tokio::test]
    async fn test_unwatchable_parent_is_inert() {
        let watcher = CreationWatcher::start("/definitely/not/here/PRD.md", || {});
        assert!(!watcher.is_pending());
    }
}
