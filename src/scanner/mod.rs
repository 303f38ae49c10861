//! Cache scanner: finds the tracked stylesheet among anonymous cache entries.
//!
//! This module provides functionality for:
//! - Enumerating prefix-named entries of the host's disk cache
//! - Narrowing them by length before any content is read
//! - Parallel byte comparison with early exit on the first original match
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`candidates`]: Directory listing, size filter, recency ordering
//! - [`matcher`]: Parallel comparison and the one-shot stop flag
//!
//! # Example
//!
//! ```no_run
//! use cachepatch::asset::AssetStore;
//! use cachepatch::events::LogSink;
//! use cachepatch::scanner::{CacheScanner, ScannerConfig};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let store = AssetStore::default();
//! let scanner = CacheScanner::new(ScannerConfig::default(), Arc::new(LogSink));
//! let outcome = scanner.scan(Path::new("/tmp/Cache"), &store.get(), |path, _css| {
//!     println!("would patch {}", path.display());
//!     Ok(())
//! });
//! ```

pub mod candidates;
pub mod matcher;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use crate::asset::Asset;
use crate::events::EventSink;
use crate::patcher::PatchError;

pub use candidates::collect_candidates;
pub use matcher::{classify_bytes, compare_candidates, Classification};

/// Default prefix of the host's cache entry files.
pub const DEFAULT_CACHE_PREFIX: &str = "f_";

/// A file in the cache directory that passed the length filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheCandidate {
    /// Absolute path of the cache entry
    pub path: PathBuf,
    /// File length in bytes
    pub len: u64,
    /// Last modification time
    pub modified: SystemTime,
}

impl CacheCandidate {
    /// Create a new candidate.
    #[must_use]
    pub fn new(path: PathBuf, len: u64, modified: SystemTime) -> Self {
        Self {
            path,
            len,
            modified,
        }
    }
}

/// Result of one scan pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Cache entry that matched the original and was handed to the patcher.
    pub matched: Option<PathBuf>,
    /// Some cache entry already holds the patched bytes.
    pub patched_already_present: bool,
    /// Number of candidates compared.
    pub candidates: usize,
}

/// User-facing summary of a [`ScanOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    /// An original entry was found and patched.
    Patched,
    /// No original entry, but a patched one exists.
    AlreadyPatched,
    /// Neither form is in the cache; the entry may not exist yet.
    NotFound,
}

impl ScanOutcome {
    /// Summarize the outcome. An original match wins over a patched one.
    #[must_use]
    pub fn status(&self) -> ScanStatus {
        if self.matched.is_some() {
            ScanStatus::Patched
        } else if self.patched_already_present {
            ScanStatus::AlreadyPatched
        } else {
            ScanStatus::NotFound
        }
    }
}

/// Errors that can occur during a cache scan.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// The cache directory does not exist (host not running yet).
    #[error("Cache folder does not exist: {0}")]
    CacheDirMissing(PathBuf),

    /// No entry of a matching length exists.
    #[error("No matching cache files found in {0}")]
    NoCandidates(PathBuf),

    /// Scanning was requested without a downloaded asset.
    #[error("No reference stylesheet available")]
    NoAsset,

    /// The cache directory could not be read.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The comparison pool could not be created.
    #[error("Failed to create scan thread pool: {0}")]
    ThreadPool(String),

    /// Patching the matched entry failed.
    #[error(transparent)]
    Patch(#[from] PatchError),
}

impl ScanError {
    /// True for conditions that mean the host has not populated its cache
    /// yet, as opposed to real failures.
    #[must_use]
    pub fn is_environment_not_ready(&self) -> bool {
        matches!(self, Self::CacheDirMissing(_) | Self::NoCandidates(_))
    }
}

/// Configuration for the cache scanner.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// File name prefix of cache entries.
    pub prefix: String,
    /// Number of comparison workers.
    /// Default is 4 to prevent disk thrashing.
    pub io_threads: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_CACHE_PREFIX.to_string(),
            io_threads: 4,
        }
    }
}

impl ScannerConfig {
    /// Set the cache entry prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the number of comparison workers.
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }
}

/// Scans a cache directory for the tracked stylesheet.
///
/// Holds a mutex for the whole of [`scan`](Self::scan) so two scans never
/// interleave their directory reads.
pub struct CacheScanner {
    config: ScannerConfig,
    events: Arc<dyn EventSink>,
    lock: Mutex<()>,
}

impl std::fmt::Debug for CacheScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheScanner")
            .field("config", &self.config)
            .field("events", &"<sink>")
            .finish()
    }
}

impl CacheScanner {
    /// Create a scanner.
    #[must_use]
    pub fn new(config: ScannerConfig, events: Arc<dyn EventSink>) -> Self {
        Self {
            config,
            events,
            lock: Mutex::new(()),
        }
    }

    /// Scanner configuration.
    #[must_use]
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Scan `dir` for `asset`, calling `on_match` for the single original
    /// match.
    ///
    /// # Errors
    ///
    /// - [`ScanError::NoAsset`] if `asset` is empty
    /// - [`ScanError::CacheDirMissing`] / [`ScanError::NoCandidates`] when
    ///   the environment is not ready
    /// - [`ScanError::Patch`] if `on_match` fails
    pub fn scan<F>(&self, dir: &Path, asset: &Asset, on_match: F) -> Result<ScanOutcome, ScanError>
    where
        F: Fn(&Path, &[u8]) -> Result<(), PatchError> + Sync,
    {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        if asset.is_empty() {
            return Err(ScanError::NoAsset);
        }
        if !dir.is_dir() {
            return Err(ScanError::CacheDirMissing(dir.to_path_buf()));
        }

        self.events.info("Finding list of possible cache files...");
        let lengths = [asset.original().len() as u64, asset.patched().len() as u64];
        let candidates = collect_candidates(dir, &self.config.prefix, &lengths)?;
        if candidates.is_empty() {
            return Err(ScanError::NoCandidates(dir.to_path_buf()));
        }

        self.events
            .info(&format!("Found {} possible cache files.", candidates.len()));
        self.events.info("Checking cache files for match...");

        compare_candidates(
            &candidates,
            asset,
            self.config.io_threads,
            self.events.as_ref(),
            on_match,
        )
    }
}
