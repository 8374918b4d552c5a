//! File watcher for the data directory
//!
//! Uses notify with adaptive debouncing; a changed table file is reloaded
//! into the store, which then publishes `DatasetReloaded`.

use crate::config::SETTINGS_FILE;
use crate::event::DataEvent;
use crate::parsers::Table;
use crate::store::DataStore;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

/// Configuration for the file watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Base debounce delay
    pub debounce_delay: Duration,

    /// Maximum debounce delay during burst
    pub max_debounce_delay: Duration,

    /// Burst detection threshold (events per second)
    pub burst_threshold: u32,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_delay: Duration::from_millis(500),
            max_debounce_delay: Duration::from_secs(3),
            burst_threshold: 10,
        }
    }
}

/// What a file change asks the store to reload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum WatchTarget {
    Table(Table),
    Settings,
}

/// File watcher that keeps the store in sync with the data directory
pub struct FileWatcher {
    /// Notify watcher instance
    _watcher: RecommendedWatcher,

    /// Shutdown signal
    shutdown_tx: mpsc::Sender<()>,
}

impl FileWatcher {
    /// Start watching the store's data directory, plus the settings file when it lives elsewhere
    pub async fn start(
        store: Arc<DataStore>,
        config_path: Option<PathBuf>,
        config: WatcherConfig,
    ) -> Result<Self, notify::Error> {
        let (event_tx, mut event_rx) = mpsc::channel::<notify::Result<Event>>(100);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = event_tx.blocking_send(res);
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let data_dir = store.data_dir().to_path_buf();
        watcher.watch(&data_dir, RecursiveMode::NonRecursive)?;
        debug!(path = %data_dir.display(), "Watching path");

        if let Some(parent) = config_path
            .as_deref()
            .and_then(Path::parent)
            .filter(|p| *p != data_dir && p.is_dir())
        {
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
            debug!(path = %parent.display(), "Watching path");
        }

        info!(data_dir = %data_dir.display(), "File watcher started");

        tokio::spawn(async move {
            let mut debounce_state = DebounceState::new(config);

            loop {
                tokio::select! {
                    Some(result) = event_rx.recv() => {
                        match result {
                            Ok(event) => {
                                if let Some(target) = Self::process_event(&event, config_path.as_deref()) {
                                    if debounce_state.should_emit(target) {
                                        debug!(?target, "Reloading after file change");
                                        Self::handle_target(target, &store).await;
                                    }
                                }
                            }
                            Err(e) => {
                                error!(error = %e, "File watcher error");
                                store.event_bus().publish(DataEvent::WatcherError(e.to_string()));
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("File watcher shutting down");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            shutdown_tx,
        })
    }

    /// Map a notify event to the data it invalidates
    fn process_event(event: &Event, config_path: Option<&Path>) -> Option<WatchTarget> {
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => {}
            _ => return None,
        }

        // renames report the destination last
        let path = event.paths.last()?;
        trace!(path = %path.display(), "Processing file event");

        let is_settings = match config_path {
            Some(config) => path == config,
            None => path.file_name().is_some_and(|n| n == SETTINGS_FILE),
        };
        if is_settings {
            return Some(WatchTarget::Settings);
        }

        Table::from_path(path).map(WatchTarget::Table)
    }

    async fn handle_target(target: WatchTarget, store: &DataStore) {
        match target {
            WatchTarget::Table(table) => store.reload_table(table).await,
            WatchTarget::Settings => store.reload_settings(),
        }
    }

    /// Stop the watcher
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Debounce state for adaptive debouncing
struct DebounceState {
    config: WatcherConfig,
    last_events: HashMap<WatchTarget, Instant>,
    event_count_window: VecDeque<Instant>,
}

impl DebounceState {
    fn new(config: WatcherConfig) -> Self {
        Self {
            config,
            last_events: HashMap::new(),
            event_count_window: VecDeque::new(),
        }
    }

    fn should_emit(&mut self, target: WatchTarget) -> bool {
        let now = Instant::now();

        self.event_count_window.push_back(now);
        while self
            .event_count_window
            .front()
            .is_some_and(|t| now.duration_since(*t) > Duration::from_secs(1))
        {
            self.event_count_window.pop_front();
        }

        let delay = if self.event_count_window.len() as u32 > self.config.burst_threshold {
            self.config.max_debounce_delay
        } else {
            self.config.debounce_delay
        };

        if let Some(last) = self.last_events.get(&target) {
            if now.duration_since(*last) < delay {
                trace!(?target, "Debouncing event");
                return false;
            }
        }

        self.last_events.insert(target, now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, ModifyKind, RemoveKind};

    fn modify(path: &str) -> Event {
        Event {
            kind: EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            paths: vec![PathBuf::from(path)],
            ..Default::default()
        }
    }

    #[test]
    fn test_debounce_state_basic() {
        let config = WatcherConfig {
            debounce_delay: Duration::from_millis(100),
            max_debounce_delay: Duration::from_millis(500),
            burst_threshold: 5,
        };
        let mut state = DebounceState::new(config);

        assert!(state.should_emit(WatchTarget::Table(Table::Timesheets)));
        assert!(!state.should_emit(WatchTarget::Table(Table::Timesheets)));
        assert!(state.should_emit(WatchTarget::Table(Table::Staffings)));
        assert!(state.should_emit(WatchTarget::Settings));
    }

    #[test]
    fn test_process_event_table() {
        let result = FileWatcher::process_event(&modify("/data/timesheets.json"), None);
        assert_eq!(result, Some(WatchTarget::Table(Table::Timesheets)));

        let created = Event {
            kind: EventKind::Create(CreateKind::File),
            paths: vec![PathBuf::from("/data/bills.json")],
            ..Default::default()
        };
        assert_eq!(
            FileWatcher::process_event(&created, None),
            Some(WatchTarget::Table(Table::Bills))
        );
    }

    #[test]
    fn test_process_event_ignores_temp_and_removals() {
        assert_eq!(FileWatcher::process_event(&modify("/data/.timesheets.json.tmp"), None), None);
        assert_eq!(FileWatcher::process_event(&modify("/data/notes.json"), None), None);

        let removed = Event {
            kind: EventKind::Remove(RemoveKind::File),
            paths: vec![PathBuf::from("/data/missions.json")],
            ..Default::default()
        };
        assert_eq!(FileWatcher::process_event(&removed, None), None);
    }

    #[test]
    fn test_process_event_settings() {
        assert_eq!(
            FileWatcher::process_event(&modify("/data/consultboard.toml"), None),
            Some(WatchTarget::Settings)
        );

        let custom = PathBuf::from("/etc/consultboard/site.toml");
        assert_eq!(
            FileWatcher::process_event(&modify("/etc/consultboard/site.toml"), Some(&custom)),
            Some(WatchTarget::Settings)
        );
        assert_eq!(
            FileWatcher::process_event(&modify("/data/consultboard.toml"), Some(&custom)),
            None
        );
    }
}
