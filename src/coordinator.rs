//! Scan coordinator: one pipeline run at a time, whatever triggered it.
//!
//! # Overview
//!
//! Two independent sources start the pipeline: the filesystem watcher and a
//! manual force scan. Both go through [`ScanCoordinator::run`], which holds
//! a single pipeline mutex for the full fetch, scan, apply and library
//! sequence.
//!
//! A manual run additionally suspends the watcher trigger and the UI
//! controls for its duration and restores the watcher's prior state on
//! every exit path. Watcher triggers that arrive while the watcher is
//! suspended are dropped with [`RunReport::Suppressed`].
//!
//! ```text
//! Idle ──trigger──► Scanning ──report──► Idle
//!         (lock)     ensure → scan → apply → library
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::asset::{AssetStore, ImportWrapper};
use crate::config::Config;
use crate::events::EventSink;
use crate::fetcher::{FetchSettings, HttpSource, ReferenceFetcher};
use crate::host::{HostControl, SystemHost};
use crate::patcher::{HostLayout, LibraryPatcher, PatchApplier, ReloadSettings, PATCHED_MARKER};
use crate::scanner::{CacheScanner, ScanStatus, ScannerConfig};

/// What started a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A cache entry changed on disk.
    Watcher,
    /// The user asked for a scan.
    Manual {
        /// Re-check the remote even if the asset is fresh.
        force_refresh: bool,
    },
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReport {
    /// An original entry was found and patched.
    Patched(PathBuf),
    /// The cache already holds the patched stylesheet.
    AlreadyPatched,
    /// Neither form was found; the entry may not exist yet.
    NotFound,
    /// The host has not populated its cache, or is in the way.
    EnvironmentNotReady(String),
    /// No usable reference stylesheet could be obtained.
    FetchFailed,
    /// The cache directory was cleared.
    Cleared,
    /// Any other failure.
    Failed(String),
    /// A watcher trigger arrived while the watcher was suspended.
    Suppressed,
}

impl RunReport {
    /// True for outcomes that leave the cache patched or intentionally
    /// untouched.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Patched(_) | Self::AlreadyPatched | Self::Cleared | Self::Suppressed
        )
    }
}

/// Serializes pipeline runs between the watcher and manual scans.
pub struct ScanCoordinator {
    fetcher: ReferenceFetcher,
    scanner: CacheScanner,
    applier: PatchApplier,
    library: Option<LibraryPatcher>,
    host: Arc<dyn HostControl>,
    cache_dir: PathBuf,
    events: Arc<dyn EventSink>,
    pipeline: Mutex<()>,
    watcher_enabled: AtomicBool,
}

impl std::fmt::Debug for ScanCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanCoordinator")
            .field("fetcher", &self.fetcher)
            .field("scanner", &self.scanner)
            .field("applier", &self.applier)
            .field("library", &self.library)
            .field("cache_dir", &self.cache_dir)
            .field("watcher_enabled", &self.watcher_enabled)
            .finish()
    }
}

/// Restores the watcher and UI controls when a manual run ends.
struct Suspension<'a> {
    coordinator: &'a ScanCoordinator,
    prior: bool,
}

impl<'a> Suspension<'a> {
    fn begin(coordinator: &'a ScanCoordinator) -> Self {
        let prior = coordinator.watcher_enabled.swap(false, Ordering::SeqCst);
        coordinator.events.controls_enabled(false);
        Self { coordinator, prior }
    }
}

impl Drop for Suspension<'_> {
    fn drop(&mut self) {
        self.coordinator
            .watcher_enabled
            .store(self.prior, Ordering::SeqCst);
        self.coordinator.events.controls_enabled(true);
    }
}

impl ScanCoordinator {
    /// Assemble a coordinator from its components.
    #[must_use]
    pub fn new(
        fetcher: ReferenceFetcher,
        scanner: CacheScanner,
        applier: PatchApplier,
        cache_dir: impl Into<PathBuf>,
        host: Arc<dyn HostControl>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            fetcher,
            scanner,
            applier,
            library: None,
            host,
            cache_dir: cache_dir.into(),
            events,
            pipeline: Mutex::new(()),
            watcher_enabled: AtomicBool::new(false),
        }
    }

    /// Run the library patcher after every pipeline run.
    #[must_use]
    pub fn with_library(mut self, library: LibraryPatcher) -> Self {
        self.library = Some(library);
        self
    }

    /// Wire production components from a validated configuration.
    ///
    /// # Errors
    ///
    /// Fails if a required directory is not configured or the HTTP client
    /// cannot be built.
    pub fn from_config(config: &Config, events: Arc<dyn EventSink>) -> Result<Self> {
        let host_dir = config.host_dir()?;
        let ui_dir = config.ui_dir()?;
        let stem = config.asset_stem();

        let store = Arc::new(AssetStore::new(Duration::from_secs(
            config.refresh_interval_secs,
        )));
        let source = HttpSource::new(
            config.document_url(),
            &config.user_agent,
            Duration::from_secs(config.http_timeout_secs),
        )
        .context("Failed to create HTTP client")?;
        let wrapper = ImportWrapper::new(&config.loopback_base, stem);
        let fetcher = ReferenceFetcher::new(
            store,
            Arc::new(source),
            FetchSettings {
                asset_name: config.asset_name.clone(),
                fallback_url: config.fallback_url.clone(),
                wrapper,
            },
            Arc::clone(&events),
        )?;

        let scanner = CacheScanner::new(
            ScannerConfig::default()
                .with_prefix(config.cache_prefix.clone())
                .with_io_threads(config.io_threads),
            Arc::clone(&events),
        );

        let host: Arc<dyn HostControl> = Arc::new(
            SystemHost::new(config.host_process_name.clone(), &config.host_executable()?)
                .with_window_class(config.host_window_class.clone()),
        );
        let reload = ReloadSettings {
            signals: config.reload_signals.clone(),
            delay: Duration::from_millis(config.reload_delay_ms),
        };
        let applier = PatchApplier::new(
            HostLayout::new(&ui_dir, stem),
            reload,
            Arc::clone(&host),
            Arc::clone(&events),
        )
        .with_notifications(config.notifications);

        let mut coordinator = Self::new(
            fetcher,
            scanner,
            applier,
            config.cache_dir()?,
            host,
            Arc::clone(&events),
        );
        if config.patch_library {
            let library_dir = host_dir.join(&config.library_subdir);
            let targets = LibraryPatcher::default_targets(&library_dir, &ui_dir, &config.asset_name);
            coordinator = coordinator.with_library(LibraryPatcher::new(
                library_dir,
                targets,
                &config.loopback_base,
                events,
            ));
        }
        Ok(coordinator)
    }

    /// Cache directory being scanned.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Shared asset store.
    #[must_use]
    pub fn store(&self) -> &Arc<AssetStore> {
        self.fetcher.store()
    }

    /// Whether watcher triggers are currently accepted.
    #[must_use]
    pub fn watcher_enabled(&self) -> bool {
        self.watcher_enabled.load(Ordering::SeqCst)
    }

    /// Accept or drop watcher triggers.
    pub fn set_watcher_enabled(&self, enabled: bool) {
        self.watcher_enabled.store(enabled, Ordering::SeqCst);
    }

    fn lock_pipeline(&self) -> MutexGuard<'_, ()> {
        self.pipeline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run the pipeline for `trigger`, blocking while another run is active.
    pub fn run(&self, trigger: Trigger) -> RunReport {
        let report = match trigger {
            Trigger::Watcher => {
                if !self.watcher_enabled() {
                    log::debug!("Watcher trigger dropped: watcher suspended");
                    return RunReport::Suppressed;
                }
                let _pipeline = self.lock_pipeline();
                self.pipeline(false)
            }
            Trigger::Manual { force_refresh } => {
                let _pipeline = self.lock_pipeline();
                let _suspension = Suspension::begin(self);
                self.events.info("Force scan started.");
                self.pipeline(force_refresh)
            }
        };
        self.events.finished();
        report
    }

    fn pipeline(&self, force_refresh: bool) -> RunReport {
        let report = self.fetch_and_scan(force_refresh);
        if let Some(library) = &self.library {
            library.patch_all();
        }
        report
    }

    fn fetch_and_scan(&self, force_refresh: bool) -> RunReport {
        if !self.fetcher.ensure(force_refresh) {
            self.events
                .error("Stylesheet could not be obtained, ending scan...");
            return RunReport::FetchFailed;
        }

        let asset = self.store().get();
        if asset.is_empty() {
            self.events
                .error("Stylesheet could not be obtained, ending scan...");
            return RunReport::FetchFailed;
        }

        let result = self.scanner.scan(&self.cache_dir, &asset, |path, css| {
            self.applier.apply(path, css, &asset)
        });

        match result {
            Ok(outcome) => match (outcome.status(), outcome.matched) {
                (ScanStatus::Patched, Some(path)) => RunReport::Patched(path),
                (ScanStatus::AlreadyPatched, _) => {
                    self.events.info("Cache file is already patched.");
                    match self.applier.restore_side_file(&asset) {
                        Ok(true) => self
                            .events
                            .info("Restored missing or outdated original stylesheet."),
                        Ok(false) => {}
                        Err(e) => self
                            .events
                            .warn(&format!("Could not restore original stylesheet: {e}")),
                    }
                    RunReport::AlreadyPatched
                }
                _ => {
                    self.events
                        .warn("Cache file does not exist or is outdated.");
                    RunReport::NotFound
                }
            },
            Err(e) if e.is_environment_not_ready() => {
                self.events.warn(&e.to_string());
                self.events.warn(
                    "Please confirm that the host is running and its window is open, then try again.",
                );
                RunReport::EnvironmentNotReady(e.to_string())
            }
            Err(e) => {
                self.events.error(&format!("Scan failed: {e}"));
                RunReport::Failed(e.to_string())
            }
        }
    }

    /// Delete the host's cache directory and the patched library root.
    ///
    /// Refuses while the host is running, since it holds the cache open.
    pub fn clear_cache(&self) -> RunReport {
        let report = {
            let _pipeline = self.lock_pipeline();
            let _suspension = Suspension::begin(self);
            self.clear_cache_locked()
        };
        self.events.finished();
        report
    }

    fn clear_cache_locked(&self) -> RunReport {
        if !self.cache_dir.exists() {
            self.events.warn("Cache folder does not exist.");
            return RunReport::EnvironmentNotReady(format!(
                "Cache folder does not exist: {}",
                self.cache_dir.display()
            ));
        }
        if self.host.is_running() {
            let message = "The host must be shut down before its cache can be cleared.";
            self.events.warn(message);
            return RunReport::EnvironmentNotReady(message.to_string());
        }

        self.events.info("Deleting cache files...");
        if let Err(e) = fs::remove_dir_all(&self.cache_dir) {
            self.events
                .error(&format!("Some cache files in use, cannot delete: {e}"));
            return RunReport::Failed(e.to_string());
        }
        self.events.info("Cache files deleted.");

        if let Some(target) = self
            .library
            .as_ref()
            .and_then(|library| library.targets().first())
        {
            let is_patched = fs::read_to_string(&target.source)
                .map(|text| text.starts_with(PATCHED_MARKER))
                .unwrap_or(false);
            if is_patched {
                self.events.info("Deleting patched library file...");
                if let Err(e) = fs::remove_file(&target.source) {
                    self.events.warn(&format!(
                        "Could not delete {}: {e}",
                        target.source.display()
                    ));
                }
            }
        }
        RunReport::Cleared
    }
}
