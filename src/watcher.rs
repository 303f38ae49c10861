//! Filesystem watcher over the host's cache directory.
//!
//! Creations and modifications of prefix-named entries are coalesced over a
//! short debounce window and then handed to the coordinator as a
//! [`Trigger::Watcher`] run. The watcher thread polls a shutdown flag
//! between events, so dropping the [`CacheWatcher`] or pressing Ctrl+C stops
//! it within one poll interval.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::coordinator::{ScanCoordinator, Trigger};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Errors raised while starting the watcher.
#[derive(thiserror::Error, Debug)]
pub enum WatchError {
    /// The directory to watch does not exist yet.
    #[error("Cache folder does not exist: {0}")]
    MissingDir(PathBuf),

    /// The platform watcher could not be created.
    #[error("Failed to watch cache folder: {0}")]
    Notify(#[from] notify::Error),

    /// The event thread could not be spawned.
    #[error("Failed to spawn watcher thread: {0}")]
    Thread(#[source] std::io::Error),
}

/// What to watch and how eagerly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSettings {
    /// Cache directory.
    pub dir: PathBuf,
    /// File name prefix of cache entries.
    pub prefix: String,
    /// Quiet period before a burst of events triggers a run.
    pub debounce: Duration,
}

/// A running watcher. Stops when dropped.
pub struct CacheWatcher {
    _watcher: RecommendedWatcher,
    coordinator: Arc<ScanCoordinator>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for CacheWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheWatcher")
            .field("stop", &self.stop)
            .field("running", &self.handle.is_some())
            .finish()
    }
}

impl CacheWatcher {
    /// Start watching and enable watcher triggers on `coordinator`.
    ///
    /// # Arguments
    ///
    /// * `coordinator` - Receives a [`Trigger::Watcher`] run per debounced burst
    /// * `settings` - Directory, prefix and debounce window
    /// * `shutdown` - External stop flag, e.g. from the Ctrl+C handler
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::MissingDir`] if the cache directory does not
    /// exist, or an error from the platform watcher.
    pub fn start(
        coordinator: Arc<ScanCoordinator>,
        settings: WatchSettings,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, WatchError> {
        if !settings.dir.is_dir() {
            return Err(WatchError::MissingDir(settings.dir));
        }

        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            NotifyConfig::default(),
        )?;
        watcher.watch(&settings.dir, RecursiveMode::NonRecursive)?;

        let stop = Arc::new(AtomicBool::new(false));
        let loop_stop = Arc::clone(&stop);
        let loop_coordinator = Arc::clone(&coordinator);
        log::info!(
            "Watching {} (debounce {}ms)",
            settings.dir.display(),
            settings.debounce.as_millis()
        );

        let handle = thread::Builder::new()
            .name("cache-watcher".to_string())
            .spawn(move || {
                event_loop(&rx, &settings, &loop_stop, &shutdown, || {
                    let report = loop_coordinator.run(Trigger::Watcher);
                    log::debug!("Watcher run finished: {:?}", report);
                });
            })
            .map_err(WatchError::Thread)?;

        coordinator.set_watcher_enabled(true);
        Ok(Self {
            _watcher: watcher,
            coordinator,
            stop,
            handle: Some(handle),
        })
    }

    /// Stop watching and wait for a run in progress to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.coordinator.set_watcher_enabled(false);
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Watcher thread panicked");
            }
        }
    }
}

impl Drop for CacheWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// True for creations or modifications of a prefix-named file.
fn is_relevant(event: &Event, prefix: &str) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event.paths.iter().any(|path| has_prefix(path, prefix))
}

fn has_prefix(path: &Path, prefix: &str) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(prefix))
}

/// Debounce relevant events into calls to `trigger` until stopped.
fn event_loop(
    rx: &Receiver<notify::Result<Event>>,
    settings: &WatchSettings,
    stop: &AtomicBool,
    shutdown: &AtomicBool,
    mut trigger: impl FnMut(),
) {
    let mut pending: Option<Instant> = None;
    loop {
        if stop.load(Ordering::SeqCst) || shutdown.load(Ordering::SeqCst) {
            break;
        }

        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Ok(event)) => {
                if is_relevant(&event, &settings.prefix) {
                    log::trace!("Cache event: {:?} {:?}", event.kind, event.paths);
                    pending = Some(Instant::now() + settings.debounce);
                }
            }
            Ok(Err(e)) => log::warn!("Watcher error: {e}"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if pending.is_some_and(|deadline| Instant::now() >= deadline) {
            pending = None;
            trigger();
        }
    }
    log::debug!("Watcher stopped");
}
