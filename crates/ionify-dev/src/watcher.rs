//! Per-path file watcher with debouncing and a polling fallback.
//!
//! OS notifications (notify) carry the fast path; a periodic mtime/size
//! poll layered on top converges platforms with lossy notification
//! delivery. Events within the debounce window for one path coalesce
//! into a single emission, which absorbs editor save bursts.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::DevError;

/// Default per-path debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Default polling fallback interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Directories skipped unless a caller explicitly forces a watch.
pub const NOISE_DIRS: &[&str] = &["node_modules", ".git", ".ionify", "dist"];

/// A file change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Added(PathBuf),
    Changed(PathBuf),
    Deleted(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Added(p) | WatchEvent::Changed(p) | WatchEvent::Deleted(p) => p,
        }
    }
}

/// Whether any path component is a known-noisy directory.
pub fn is_noise_path(path: &Path) -> bool {
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|name| NOISE_DIRS.contains(&name))
    })
}

#[derive(Debug, Clone, Copy)]
struct PathState {
    exists: bool,
    mtime: Option<SystemTime>,
    size: Option<u64>,
}

impl PathState {
    fn probe(path: &Path) -> Self {
        match std::fs::metadata(path) {
            Ok(meta) => Self {
                exists: true,
                mtime: meta.modified().ok(),
                size: Some(meta.len()),
            },
            Err(_) => Self {
                exists: false,
                mtime: None,
                size: None,
            },
        }
    }
}

struct DebounceGate {
    window: Duration,
    last: Mutex<FxHashMap<PathBuf, Instant>>,
}

impl DebounceGate {
    fn admit(&self, path: &Path) -> bool {
        let mut last = self.last.lock();
        let now = Instant::now();
        if let Some(previous) = last.get(path) {
            if now.duration_since(*previous) < self.window {
                return false;
            }
        }
        last.insert(path.to_path_buf(), now);
        true
    }
}

/// Per-path watcher. `watch` is idempotent (one observer per absolute
/// path); `close_all` releases every OS handle and is idempotent.
pub struct FileWatcher {
    watcher: Mutex<Option<RecommendedWatcher>>,
    watched: Arc<Mutex<FxHashMap<PathBuf, PathState>>>,
    gate: Arc<DebounceGate>,
    poll_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl FileWatcher {
    /// Create a watcher and the event receiver.
    ///
    /// Must run inside a tokio runtime (spawns the polling fallback).
    pub fn new(
        debounce: Duration,
        poll_interval: Duration,
    ) -> Result<(Self, mpsc::Receiver<WatchEvent>), DevError> {
        let (tx, rx) = mpsc::channel(256);
        let watched: Arc<Mutex<FxHashMap<PathBuf, PathState>>> = Arc::new(Mutex::new(FxHashMap::default()));
        let gate = Arc::new(DebounceGate {
            window: debounce,
            last: Mutex::new(FxHashMap::default()),
        });

        let notify_watched = Arc::clone(&watched);
        let notify_gate = Arc::clone(&gate);
        let notify_tx = tx.clone();
        let watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    warn!("watch backend error: {}", e);
                    return;
                }
            };
            for path in &event.paths {
                let change = {
                    let mut watched = notify_watched.lock();
                    let Some(state) = watched.get_mut(path) else {
                        continue;
                    };
                    match event.kind {
                        notify::EventKind::Create(_) => {
                            state.exists = true;
                            WatchEvent::Added(path.clone())
                        }
                        notify::EventKind::Modify(_) => WatchEvent::Changed(path.clone()),
                        notify::EventKind::Remove(_) => {
                            state.exists = false;
                            WatchEvent::Deleted(path.clone())
                        }
                        _ => continue,
                    }
                };
                if notify_gate.admit(path) {
                    let _ = notify_tx.blocking_send(change);
                }
            }
        })?;

        let poll_watched = Arc::clone(&watched);
        let poll_gate = Arc::clone(&gate);
        let poll_tx = tx.clone();
        let poll_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let paths: Vec<(PathBuf, PathState)> = poll_watched
                    .lock()
                    .iter()
                    .map(|(p, s)| (p.clone(), *s))
                    .collect();

                for (path, previous) in paths {
                    let current = PathState::probe(&path);
                    let change = if previous.exists && !current.exists {
                        Some(WatchEvent::Deleted(path.clone()))
                    } else if !previous.exists && current.exists {
                        Some(WatchEvent::Added(path.clone()))
                    } else if current.exists
                        && (previous.mtime != current.mtime || previous.size != current.size)
                    {
                        Some(WatchEvent::Changed(path.clone()))
                    } else {
                        None
                    };

                    if let Some(change) = change {
                        {
                            let mut watched = poll_watched.lock();
                            if let Some(state) = watched.get_mut(&path) {
                                *state = current;
                            } else {
                                continue;
                            }
                        }
                        if poll_gate.admit(&path) {
                            debug!(path = %path.display(), "poll fallback detected change");
                            if poll_tx.send(change).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok((
            Self {
                watcher: Mutex::new(Some(watcher)),
                watched,
                gate,
                poll_task: Mutex::new(Some(poll_task)),
            },
            rx,
        ))
    }

    /// Watch one absolute path. Noise paths are skipped (returns
    /// `false`); use [`FileWatcher::force_watch`] to override.
    /// Idempotent: a second registration is a no-op returning `true`.
    pub fn watch(&self, path: &Path) -> Result<bool, DevError> {
        if is_noise_path(path) {
            return Ok(false);
        }
        self.force_watch(path)?;
        Ok(true)
    }

    /// Watch a path regardless of the noise skip list.
    pub fn force_watch(&self, path: &Path) -> Result<(), DevError> {
        {
            let mut watched = self.watched.lock();
            if watched.contains_key(path) {
                return Ok(());
            }
            watched.insert(path.to_path_buf(), PathState::probe(path));
        }

        let mut guard = self.watcher.lock();
        match guard.as_mut() {
            Some(watcher) => {
                // A path that does not exist yet is still tracked by the
                // poll fallback; the OS watch attaches when it appears.
                if path.exists() {
                    watcher.watch(path, RecursiveMode::NonRecursive)?;
                }
                Ok(())
            }
            None => Err(DevError::WatcherClosed),
        }
    }

    /// Stop watching a path.
    pub fn unwatch(&self, path: &Path) {
        let removed = self.watched.lock().remove(path).is_some();
        if removed {
            if let Some(watcher) = self.watcher.lock().as_mut() {
                let _ = watcher.unwatch(path);
            }
        }
    }

    /// Number of watched paths.
    pub fn watched_count(&self) -> usize {
        self.watched.lock().len()
    }

    /// Release every underlying handle and stop the poll task.
    /// Idempotent.
    pub fn close_all(&self) {
        // Dropping the notify watcher releases all OS handles at once.
        self.watcher.lock().take();
        self.watched.lock().clear();
        self.gate.last.lock().clear();
        if let Some(task) = self.poll_task.lock().take() {
            task.abort();
        }
    }

}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fast_watcher() -> (FileWatcher, mpsc::Receiver<WatchEvent>) {
        FileWatcher::new(Duration::from_millis(100), Duration::from_millis(50)).unwrap()
    }

    #[tokio::test]
    async fn test_noise_paths_skipped() {
        let (watcher, _rx) = fast_watcher();
        let registered = watcher
            .watch(Path::new("/project/node_modules/react/index.js"))
            .unwrap();
        assert!(!registered);
        assert_eq!(watcher.watched_count(), 0);
    }

    #[tokio::test]
    async fn test_watch_idempotent() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.ts");
        std::fs::write(&file, "x").unwrap();

        let (watcher, _rx) = fast_watcher();
        assert!(watcher.watch(&file).unwrap());
        assert!(watcher.watch(&file).unwrap());
        assert_eq!(watcher.watched_count(), 1);

        watcher.unwatch(&file);
        assert_eq!(watcher.watched_count(), 0);
    }

    #[tokio::test]
    async fn test_close_all_idempotent() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.ts");
        std::fs::write(&file, "x").unwrap();

        let (watcher, _rx) = fast_watcher();
        watcher.watch(&file).unwrap();
        watcher.close_all();
        watcher.close_all();
        assert_eq!(watcher.watched_count(), 0);
        assert!(matches!(
            watcher.force_watch(&file),
            Err(DevError::WatcherClosed)
        ));
    }

    #[tokio::test]
    async fn test_poll_fallback_detects_deletion() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("doomed.ts");
        std::fs::write(&file, "x").unwrap();

        let (watcher, mut rx) = fast_watcher();
        watcher.watch(&file).unwrap();
        std::fs::remove_file(&file).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = rx.recv().await.expect("watcher alive");
                if matches!(event, WatchEvent::Deleted(_)) {
                    return event;
                }
            }
        })
        .await
        .expect("deletion detected");
        assert_eq!(event.path(), file);
    }

    #[tokio::test]
    async fn test_poll_fallback_detects_content_change() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("grow.ts");
        std::fs::write(&file, "short").unwrap();

        let (watcher, mut rx) = fast_watcher();
        watcher.watch(&file).unwrap();

        // Size change makes the poll diff robust to coarse mtimes.
        tokio::time::sleep(Duration::from_millis(150)).await;
        std::fs::write(&file, "considerably longer content").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = rx.recv().await.expect("watcher alive");
                if event.path() == file && !matches!(event, WatchEvent::Added(_)) {
                    return event;
                }
            }
        })
        .await
        .expect("change detected");
        assert!(matches!(event, WatchEvent::Changed(_)));
    }

    #[tokio::test]
    async fn test_debounce_coalesces_bursts() {
        let (watcher, _rx) = fast_watcher();
        let path = Path::new("/src/burst.ts");

        // Ten admissions in a tight burst collapse to one.
        let admitted = (0..10).filter(|_| watcher.gate.admit(path)).count();
        assert_eq!(admitted, 1);

        // After the window passes, the next event is admitted again.
        std::thread::sleep(Duration::from_millis(120));
        assert!(watcher.gate.admit(path));
    }
}
