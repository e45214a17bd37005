//! Workspace activity watcher.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::{RecommendedWatcher, RecursiveMode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::STATE_DIR;

/// Directories whose writes never count as activity.
pub const DEFAULT_IGNORED_DIRS: &[&str] = &[".git", "node_modules", "target", STATE_DIR];

/// Decides whether a path under the root counts as activity.
#[derive(Debug, Clone)]
pub struct ActivityFilter {
    root: PathBuf,
    ignored: GlobSet,
}

impl ActivityFilter {
    /// Build a filter ignoring the given directory names at any depth.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, ignored_dirs: &[&str]) -> Self {
        let mut builder = GlobSetBuilder::new();
        for dir in ignored_dirs {
            for pattern in [format!("{dir}/**"), format!("**/{dir}/**")] {
                match Glob::new(&pattern) {
                    Ok(glob) => {
                        builder.add(glob);
                    }
                    Err(e) => warn!("Bad ignore pattern {}: {}", pattern, e),
                }
            }
        }
        let ignored = builder.build().unwrap_or_else(|e| {
            warn!("Failed to build ignore set: {}", e);
            GlobSet::empty()
        });
        Self {
            root: root.into(),
            ignored,
        }
    }

    #[must_use]
    pub fn is_ignored(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        self.ignored.is_match(relative)
    }
}

/// Fires `on_activity` for every write under the root outside ignored
/// directories.
pub struct ActivityWatcher {
    root: PathBuf,
    watcher: Option<RecommendedWatcher>,
    token: CancellationToken,
}

impl std::fmt::Debug for ActivityWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityWatcher")
            .field("root", &self.root)
            .field("active", &self.watcher.is_some())
            .finish()
    }
}

impl ActivityWatcher {
    /// Watch `root` recursively. Must be called inside a tokio runtime.
    pub fn start<F>(root: impl Into<PathBuf>, on_activity: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let root = root.into();
        let token = CancellationToken::new();
        let watcher = match super::bridge(&root, RecursiveMode::Recursive) {
            Ok((watcher, mut events)) => {
                let filter = ActivityFilter::new(&root, DEFAULT_IGNORED_DIRS);
                let token = token.clone();
                tokio::spawn(async move {
                    loop {
                        let event = tokio::select! {
                            () = token.cancelled() => break,
                            event = events.recv() => event,
                        };
                        let Some(event) = event else { break };
                        if super::is_write_event(&event.kind)
                            && event.paths.iter().any(|p| !filter.is_ignored(p))
                        {
                            on_activity();
                        }
                    }
                    debug!("Activity watcher finished");
                });
                Some(watcher)
            }
            Err(e) => {
                warn!("Cannot watch {} for activity: {}", root.display(), e);
                None
            }
        };

        Self {
            root,
            watcher,
            token,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.watcher.is_some() && !self.token.is_cancelled()
    }

    pub fn stop(&mut self) {
        self.token.cancel();
        self.watcher = None;
    }
}

impl Drop for ActivityWatcher {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_ignores_tool_directories() {
        let filter = ActivityFilter::new("/work", DEFAULT_IGNORED_DIRS);
        assert!(filter.is_ignored(Path::new("/work/.git/index")));
        assert!(filter.is_ignored(Path::new("/work/web/node_modules/x/index.js")));
        assert!(filter.is_ignored(Path::new("/work/target/debug/app")));
        assert!(filter.is_ignored(Path::new("/work/.prdloop/settings.json")));
    }

    #[test]
    fn test_source_edits_count() {
        let filter = ActivityFilter::new("/work", DEFAULT_IGNORED_DIRS);
        assert!(!filter.is_ignored(Path::new("/work/src/main.rs")));
        assert!(!filter.is_ignored(Path::new("/work/PRD.md")));
        assert!(!filter.is_ignored(Path::new("/work/targets.md")));
    }

    async fn wait_for(count: &AtomicU32, at_least: u32) -> bool {
        for _ in 0..100 {
            if count.load(Ordering::SeqCst) >= at_least {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_source_write_fires_but_target_write_does_not() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("target/debug")).unwrap();

        let count = Arc::new(AtomicU32::new(0));
        let inner = Arc::clone(&count);
        let watcher = ActivityWatcher::start(temp.path(), move || {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        assert!(watcher.is_active());

        std::fs::write(temp.path().join("target/debug/app"), "bin").unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        std::fs::write(temp.path().join("main.rs"), "fn main() {}").unwrap();
        assert!(wait_for(&count, 1).await);
    }

    #[tokio::test]
    async fn test_missing_root_is_inert() {
        let mut watcher = ActivityWatcher::start("/definitely/not/here", || {});
        assert!(!watcher.is_active());
        watcher.stop();
    }
}
