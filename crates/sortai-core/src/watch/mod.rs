//! Watch Manager (C14, spec §4.14)
//!
//! Subscribes to filesystem events on configured folders and, after a quiet
//! period with no further modification, hands the file off to the categorization
//! engine via the ready callback — the sole path from watch into Phase 1/2.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};

use crate::events::{EventBus, SortAiEvent};

/// Default quiet period before a watched file is considered ready (spec §2 Open
/// Question resolution, spec §6 default).
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::seconds(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Stopped,
    Starting,
    Watching,
    Paused,
    Processing,
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("cannot {action} while watcher is {state:?}")]
    InvalidTransition { action: &'static str, state: WatchState },
}

pub type Result<T> = std::result::Result<T, WatchError>;

#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub path: PathBuf,
    pub detected_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
    pub attempts: u32,
    pub is_large: bool,
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub excluded_dirs: Vec<PathBuf>,
    pub partial_download_suffixes: Vec<String>,
    pub max_file_size: Option<u64>,
    pub large_file_threshold: Option<u64>,
    pub max_queue_size: usize,
    pub quiet_period: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            excluded_dirs: Vec::new(),
            partial_download_suffixes: vec![".crdownload".to_string(), ".part".to_string(), ".download".to_string()],
            max_file_size: None,
            large_file_threshold: Some(100 * 1024 * 1024),
            max_queue_size: 10_000,
            quiet_period: DEFAULT_QUIET_PERIOD,
        }
    }
}

fn is_excluded(path: &Path, excluded_dirs: &[PathBuf]) -> bool {
    excluded_dirs.iter().any(|excluded| path.starts_with(excluded))
}

fn has_partial_download_suffix(path: &Path, suffixes: &[String]) -> bool {
    let name = path.to_string_lossy();
    suffixes.iter().any(|suffix| name.ends_with(suffix.as_str()))
}

/// Filesystem-watch state machine and quiet-period debounce queue. `notify`
/// itself delivers raw OS events; this struct owns the policy layer on top: path
/// filtering, size limits, backpressure, and debouncing (spec §4.14).
pub struct WatchManager {
    state: WatchState,
    config: WatchConfig,
    queue: HashMap<PathBuf, QueueEntry>,
    events: Option<EventBus>,
}

impl WatchManager {
    pub fn new(config: WatchConfig) -> Self {
        Self {
            state: WatchState::Stopped,
            config,
            queue: HashMap::new(),
            events: None,
        }
    }

    /// Attach an [`EventBus`] so state transitions and ready files become
    /// observable (spec §4.14, §6 "Outputs").
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    fn transition(&mut self, next: WatchState) {
        let previous = self.state;
        self.state = next;
        if let Some(bus) = &self.events {
            if previous != next {
                bus.publish(SortAiEvent::WatchStateChanged {
                    previous: format!("{previous:?}"),
                    current: format!("{next:?}"),
                    timestamp: Utc::now(),
                });
            }
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn start(&mut self) -> Result<()> {
        if self.state != WatchState::Stopped {
            return Err(WatchError::InvalidTransition { action: "start", state: self.state });
        }
        self.transition(WatchState::Starting);
        self.transition(WatchState::Watching);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.state != WatchState::Watching {
            return Err(WatchError::InvalidTransition { action: "pause", state: self.state });
        }
        self.transition(WatchState::Paused);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.state != WatchState::Paused {
            return Err(WatchError::InvalidTransition { action: "resume", state: self.state });
        }
        self.transition(WatchState::Watching);
        Ok(())
    }

    /// Stop releases all OS resources and drops the in-memory queue (spec §4.14
    /// "stopped releases all OS resources").
    pub fn stop(&mut self) {
        self.transition(WatchState::Stopped);
        self.queue.clear();
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Handle one raw filesystem-change event. Returns `true` if the path was
    /// enqueued or updated, `false` if it was filtered or deferred.
    pub fn on_event(&mut self, path: &Path, size: u64, now: DateTime<Utc>) -> bool {
        if self.state == WatchState::Paused || self.state == WatchState::Stopped {
            return false;
        }
        if is_excluded(path, &self.config.excluded_dirs) {
            return false;
        }
        if has_partial_download_suffix(path, &self.config.partial_download_suffixes) {
            return false;
        }
        if let Some(max) = self.config.max_file_size {
            if size > max {
                return false;
            }
        }
        if !self.queue.contains_key(path) && self.queue.len() >= self.config.max_queue_size {
            return false;
        }

        let is_large = self.config.large_file_threshold.is_some_and(|threshold| size >= threshold);
        self.queue
            .entry(path.to_path_buf())
            .and_modify(|entry| {
                entry.last_modified = now;
                entry.size = size;
            })
            .or_insert(QueueEntry {
                path: path.to_path_buf(),
                detected_at: now,
                last_modified: now,
                size,
                attempts: 0,
                is_large,
            });
        true
    }

    /// Drain entries whose quiet period has elapsed, transitioning through the
    /// transient `Processing` sub-state while the ready callback would run (spec
    /// "processing is a transient sub-state of watching").
    pub fn drain_ready(&mut self, now: DateTime<Utc>) -> Vec<QueueEntry> {
        if self.state != WatchState::Watching {
            return Vec::new();
        }
        self.transition(WatchState::Processing);
        let ready_paths: Vec<PathBuf> = self
            .queue
            .values()
            .filter(|entry| now - entry.last_modified >= self.config.quiet_period)
            .map(|entry| entry.path.clone())
            .collect();
        let ready: Vec<QueueEntry> = ready_paths
            .iter()
            .filter_map(|path| self.queue.remove(path))
            .collect();
        self.transition(WatchState::Watching);
        if let Some(bus) = &self.events {
            for entry in &ready {
                bus.publish(SortAiEvent::WatchFileReady {
                    path: entry.path.to_string_lossy().into_owned(),
                    size: entry.size,
                    timestamp: now,
                });
            }
        }
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excluded_directory_is_rejected() {
        let mut manager = WatchManager::new(WatchConfig {
            excluded_dirs: vec![PathBuf::from("/home/user/.cache")],
            ..Default::default()
        });
        manager.start().unwrap();
        let accepted = manager.on_event(Path::new("/home/user/.cache/x.tmp"), 10, Utc::now());
        assert!(!accepted);
        assert_eq!(manager.queue_len(), 0);
    }

    #[test]
    fn partial_download_suffix_is_rejected() {
        let mut manager = WatchManager::new(WatchConfig::default());
        manager.start().unwrap();
        assert!(!manager.on_event(Path::new("/downloads/movie.mp4.crdownload"), 10, Utc::now()));
    }

    #[test]
    fn quiet_period_gates_readiness() {
        let mut manager = WatchManager::new(WatchConfig {
            quiet_period: Duration::seconds(5),
            ..Default::default()
        });
        manager.start().unwrap();
        let t0 = Utc::now();
        manager.on_event(Path::new("/docs/report.pdf"), 100, t0);
        assert!(manager.drain_ready(t0 + Duration::seconds(1)).is_empty());
        assert_eq!(manager.drain_ready(t0 + Duration::seconds(6)).len(), 1);
    }

    #[test]
    fn single_callback_fires_once_per_quiet_window_despite_repeated_writes() {
        let mut manager = WatchManager::new(WatchConfig {
            quiet_period: Duration::seconds(5),
            ..Default::default()
        });
        manager.start().unwrap();
        let t0 = Utc::now();
        manager.on_event(Path::new("/docs/report.pdf"), 100, t0);
        manager.on_event(Path::new("/docs/report.pdf"), 120, t0 + Duration::seconds(2));
        manager.on_event(Path::new("/docs/report.pdf"), 150, t0 + Duration::seconds(4));
        assert!(manager.drain_ready(t0 + Duration::seconds(6)).is_empty());
        let ready = manager.drain_ready(t0 + Duration::seconds(9));
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].size, 150);
    }

    #[test]
    fn paused_watcher_refuses_new_enqueues_but_keeps_existing_queue() {
        let mut manager = WatchManager::new(WatchConfig::default());
        manager.start().unwrap();
        manager.on_event(Path::new("/docs/a.pdf"), 10, Utc::now());
        manager.pause().unwrap();
        assert!(!manager.on_event(Path::new("/docs/b.pdf"), 10, Utc::now()));
        assert_eq!(manager.queue_len(), 1);
    }

    #[test]
    fn stop_releases_queue() {
        let mut manager = WatchManager::new(WatchConfig::default());
        manager.start().unwrap();
        manager.on_event(Path::new("/docs/a.pdf"), 10, Utc::now());
        manager.stop();
        assert_eq!(manager.queue_len(), 0);
        assert_eq!(manager.state(), WatchState::Stopped);
    }
}
