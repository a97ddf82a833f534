//! 파일 시스템 감시 및 안정화(quiescence) 판정 모듈
//!
//! 감시 루트와 새로 생긴 하위 폴더의 변경 알림을 받아, 일정 시간 동안 변경이 없으면
//! 한 번만 "안정화됨" 이벤트를 발생시킵니다.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::PipelineError;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(5);
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Raw change notifications buffered between the notify thread and the event loop.
pub const CHANGE_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct WatchState {
    pub root: PathBuf,
    /// Child folder names known so far, starting with the set seen at monitoring start.
    pub tracked_children: HashSet<String>,
    pub last_change_timestamp: HashMap<PathBuf, Instant>,
}

/// Debounce state for one watched root. Time is always passed in, so the
/// decision logic has no clock or thread of its own.
#[derive(Debug)]
pub struct StabilityDetector {
    state: WatchState,
    debounce: Duration,
    armed: bool,
}

impl StabilityDetector {
    pub fn new(root: PathBuf, debounce: Duration) -> Self {
        Self {
            state: WatchState {
                root,
                ..Default::default()
            },
            debounce,
            armed: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.state.root
    }

    pub fn state(&self) -> &WatchState {
        &self.state
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Starts a monitoring session: the current child folders become the baseline.
    pub fn begin(&mut self) -> io::Result<()> {
        self.reset();
        self.state.tracked_children = list_child_dirs(&self.state.root)?;
        log::debug!(
            "Baseline of {} child folders under {}",
            self.state.tracked_children.len(),
            self.state.root.display()
        );
        Ok(())
    }

    /// Returns child folders that appeared since the last call (sorted), and
    /// starts tracking them.
    pub fn discover_new_children(&mut self) -> io::Result<Vec<String>> {
        let current = list_child_dirs(&self.state.root)?;
        let mut delta: Vec<String> = current
            .difference(&self.state.tracked_children)
            .cloned()
            .collect();
        delta.sort();
        self.state.tracked_children.extend(delta.iter().cloned());
        Ok(delta)
    }

    /// Enables the periodic check. The timer starts counting from `now`.
    pub fn arm(&mut self, now: Instant) {
        self.armed = true;
        self.state
            .last_change_timestamp
            .insert(self.state.root.clone(), now);
    }

    /// Any notification restarts the quiet period.
    pub fn record_change(&mut self, path: &Path, now: Instant) {
        self.state.last_change_timestamp.insert(path.to_path_buf(), now);
        self.state
            .last_change_timestamp
            .insert(self.state.root.clone(), now);
    }

    pub fn last_change(&self) -> Option<Instant> {
        self.state.last_change_timestamp.values().max().copied()
    }

    pub fn quiet_for(&self, now: Instant) -> Option<Duration> {
        self.last_change().map(|t| now.saturating_duration_since(t))
    }

    /// Periodic check. Returns `true` exactly once per arming, when the quiet
    /// period meets or exceeds the debounce window.
    pub fn poll(&mut self, now: Instant) -> bool {
        if !self.armed {
            return false;
        }
        match self.quiet_for(now) {
            Some(quiet) if quiet >= self.debounce => {
                self.armed = false;
                log::info!(
                    "{} quiet for {:.1}s, treating as stable",
                    self.state.root.display(),
                    quiet.as_secs_f64()
                );
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.armed = false;
        self.state.tracked_children.clear();
        self.state.last_change_timestamp.clear();
    }
}

fn list_child_dirs(root: &Path) -> io::Result<HashSet<String>> {
    let mut names = HashSet::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.path().is_dir() {
            names.insert(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

/// Source of raw "this path changed" notifications with a dynamic watch list.
pub trait ChangeNotifier: Send {
    fn watch(&mut self, path: &Path) -> Result<(), PipelineError>;
    fn unwatch(&mut self, path: &Path) -> Result<(), PipelineError>;
    fn unwatch_all(&mut self);
    fn watched_paths(&self) -> Vec<PathBuf>;
}

/// `notify`-backed notifier. Each path is watched non-recursively; changed
/// paths are pushed into the event loop's channel.
pub struct NotifyWatcher {
    watcher: RecommendedWatcher,
    watched: HashSet<PathBuf>,
}

impl NotifyWatcher {
    pub fn new(tx: mpsc::Sender<PathBuf>) -> Result<Self, PipelineError> {
        let watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    log::warn!("Watch error: {e}");
                    return;
                }
            };

            // 실제 파일 변경 이벤트만 처리
            if matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            ) {
                for path in event.paths {
                    // A full channel already holds pending changes, each of which
                    // resets the timer, so dropping this one loses nothing.
                    let _ = tx.try_send(path);
                }
            }
        })?;

        Ok(Self {
            watcher,
            watched: HashSet::new(),
        })
    }
}

impl ChangeNotifier for NotifyWatcher {
    fn watch(&mut self, path: &Path) -> Result<(), PipelineError> {
        if self.watched.contains(path) {
            return Ok(());
        }
        self.watcher.watch(path, RecursiveMode::NonRecursive)?;
        self.watched.insert(path.to_path_buf());
        log::debug!("Watching {}", path.display());
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> Result<(), PipelineError> {
        if self.watched.remove(path) {
            self.watcher.unwatch(path)?;
            log::debug!("Stopped watching {}", path.display());
        }
        Ok(())
    }

    fn unwatch_all(&mut self) {
        for path in self.watched.drain() {
            // Deleted folders are dropped by the backend on its own.
            if let Err(e) = self.watcher.unwatch(&path) {
                log::debug!("Unwatch {} failed: {e}", path.display());
            }
        }
    }

    fn watched_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.watched.iter().cloned().collect();
        paths.sort();
        paths
    }
}

impl Drop for NotifyWatcher {
    fn drop(&mut self) {
        self.unwatch_all();
    }
}
