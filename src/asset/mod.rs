//! Tracked stylesheet and the synchronized store that owns it.
//!
//! # Overview
//!
//! An [`Asset`] pairs the stylesheet exactly as downloaded with its patched
//! variant. Both byte forms are produced together by
//! [`Asset::from_original`]; there is no way to change one without the other.
//!
//! [`AssetStore`] owns the current asset and the "refresh in progress" flag.
//! Every component reads the asset through [`AssetStore::get`], which hands
//! out an `Arc` snapshot, and only the fetcher replaces it, through a
//! [`RefreshTicket`] obtained from [`AssetStore::begin_refresh`].
//!
//! # Refresh protocol
//!
//! ```text
//!            begin_refresh ──► ticket ──► commit / unchanged / drop (abort)
//!                 │ None
//!                 ▼
//!          wait_until_idle ──► snapshot
//! ```
//!
//! Callers that lose the race for the ticket block on a condition variable
//! until the in-flight refresh finishes, then reuse its result.

pub mod codec;

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

pub use codec::{compress, decompress, is_gzip, CodecError, ImportWrapper, GZIP_MAGIC};

/// Default minimum age before a non-forced refresh hits the network again.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// The tracked stylesheet in its original and patched compressed forms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Asset {
    original: Vec<u8>,
    patched: Vec<u8>,
    token: Option<String>,
    fetched_at: Option<DateTime<Local>>,
}

impl Asset {
    /// Build an asset from the downloaded gzip body.
    ///
    /// The patched form is derived here and nowhere else.
    ///
    /// # Arguments
    ///
    /// * `original` - Compressed body as served by the remote
    /// * `token` - Freshness token reported by the remote, if any
    /// * `wrapper` - Import preamble used to build the patched form
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if `original` is empty or not valid gzip.
    pub fn from_original(
        original: Vec<u8>,
        token: Option<String>,
        wrapper: &ImportWrapper,
    ) -> Result<Self, CodecError> {
        if original.is_empty() {
            return Err(CodecError::Empty);
        }
        let patched = wrapper.patch(&original)?;
        Ok(Self {
            original,
            patched,
            token: token.filter(|t| !t.is_empty()),
            fetched_at: Some(Local::now()),
        })
    }

    /// Compressed stylesheet as downloaded.
    #[must_use]
    pub fn original(&self) -> &[u8] {
        &self.original
    }

    /// Compressed stylesheet with the import preamble.
    #[must_use]
    pub fn patched(&self) -> &[u8] {
        &self.patched
    }

    /// Freshness token of the downloaded body.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Wall-clock time the body was downloaded.
    #[must_use]
    pub fn fetched_at(&self) -> Option<DateTime<Local>> {
        self.fetched_at
    }

    /// True until a download has been committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.original.is_empty() || self.patched.is_empty()
    }
}

#[derive(Debug, Default)]
struct State {
    asset: Arc<Asset>,
    refreshing: bool,
    last_refresh: Option<Instant>,
}

/// Mutex-guarded owner of the current [`Asset`] and refresh flag.
#[derive(Debug)]
pub struct AssetStore {
    state: Mutex<State>,
    idle: Condvar,
    refresh_interval: Duration,
}

impl Default for AssetStore {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_INTERVAL)
    }
}

impl AssetStore {
    /// Create an empty store.
    ///
    /// # Arguments
    ///
    /// * `refresh_interval` - Age below which a non-forced refresh is skipped
    #[must_use]
    pub fn new(refresh_interval: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            idle: Condvar::new(),
            refresh_interval,
        }
    }

    // A panic while holding the lock cannot leave a half-written asset:
    // every writer swaps the whole `Arc`.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn within_interval(&self, state: &State) -> bool {
        state
            .last_refresh
            .is_some_and(|t| t.elapsed() < self.refresh_interval)
    }

    /// Configured refresh interval.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Snapshot of the current asset. May be stale or empty.
    #[must_use]
    pub fn get(&self) -> Arc<Asset> {
        Arc::clone(&self.lock().asset)
    }

    /// True if a usable asset was refreshed within the interval.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        let state = self.lock();
        !state.asset.is_empty() && self.within_interval(&state)
    }

    /// True while a refresh is in flight.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.lock().refreshing
    }

    /// Atomically claim the refresh flag.
    ///
    /// Returns `false` without side effects when a refresh is already in
    /// flight, or when the last refresh is younger than the interval and
    /// `force` is not set.
    pub fn try_begin_refresh(&self, force: bool) -> bool {
        let mut state = self.lock();
        if state.refreshing || (!force && self.within_interval(&state)) {
            return false;
        }
        state.refreshing = true;
        true
    }

    /// Claim the refresh flag and wrap it in a ticket that aborts on drop.
    pub fn begin_refresh(&self, force: bool) -> Option<RefreshTicket<'_>> {
        self.try_begin_refresh(force).then(|| RefreshTicket {
            store: self,
            done: false,
        })
    }

    /// Replace the stored asset and clear the refresh flag.
    pub fn commit(&self, asset: Asset) {
        let mut state = self.lock();
        state.asset = Arc::new(asset);
        state.refreshing = false;
        state.last_refresh = Some(Instant::now());
        drop(state);
        self.idle.notify_all();
    }

    /// Clear the refresh flag and restamp the refresh time, keeping the bytes.
    pub fn complete_unchanged(&self) {
        let mut state = self.lock();
        state.refreshing = false;
        state.last_refresh = Some(Instant::now());
        drop(state);
        self.idle.notify_all();
    }

    /// Clear the refresh flag without touching the asset.
    pub fn abort_refresh(&self) {
        self.lock().refreshing = false;
        self.idle.notify_all();
    }

    /// Block until no refresh is in flight and return the resulting snapshot.
    pub fn wait_until_idle(&self) -> Arc<Asset> {
        let mut state = self.lock();
        while state.refreshing {
            state = self
                .idle
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Arc::clone(&state.asset)
    }
}

/// Exclusive right to finish the current refresh.
///
/// Dropping the ticket without calling [`commit`](Self::commit) or
/// [`unchanged`](Self::unchanged) aborts the refresh.
#[derive(Debug)]
#[must_use = "dropping the ticket aborts the refresh"]
pub struct RefreshTicket<'a> {
    store: &'a AssetStore,
    done: bool,
}

impl RefreshTicket<'_> {
    /// Token of the asset currently stored.
    #[must_use]
    pub fn current_token(&self) -> Option<String> {
        self.store.get().token().map(str::to_owned)
    }

    /// Store a freshly built asset.
    pub fn commit(mut self, asset: Asset) {
        self.done = true;
        self.store.commit(asset);
    }

    /// Keep the stored asset, marking it fresh.
    pub fn unchanged(mut self) {
        self.done = true;
        self.store.complete_unchanged();
    }
}

impl Drop for RefreshTicket<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.store.abort_refresh();
        }
    }
}
