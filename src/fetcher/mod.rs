//! Reference fetcher: keeps the [`AssetStore`] in sync with the remote.
//!
//! # Overview
//!
//! [`ReferenceFetcher::ensure`] is the only entry point. It is cheap when
//! the stored asset is fresh, converges concurrent callers on a single
//! download, and skips the download entirely when the remote reports the
//! same freshness token as last time.
//!
//! ```text
//! ensure(force)
//!   ├─ fresh && !force ─────────────────────────────► true
//!   ├─ refresh in flight ─► wait_until_idle ─────────► usable?
//!   └─ fetch_document ─► extract url + token
//!        ├─ token == stored ─► unchanged ───────────► true
//!        ├─ no token ─► fetch fallback, ETag as token
//!        └─ fetch url ─► Asset::from_original ─► commit ─► true
//! ```
//!
//! The remote is reached through the [`AssetSource`] trait so the protocol
//! can be exercised without a network.

pub mod extract;
pub mod http;

use std::sync::Arc;

use crate::asset::{Asset, AssetStore, CodecError, ImportWrapper, RefreshTicket};
use crate::events::EventSink;

pub use extract::{DocumentPatterns, RemoteReference};
pub use http::{HttpSource, DEFAULT_TIMEOUT};

/// Errors raised while refreshing the reference asset.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    /// Transport or HTTP status failure.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// The remote could not be reached for another reason.
    #[error("Remote unavailable: {0}")]
    Unavailable(String),

    /// The remote answered with an empty body.
    #[error("Downloaded asset is empty: {0}")]
    EmptyBody(String),

    /// The downloaded body could not be patched.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// An extraction pattern failed to compile.
    #[error("Invalid extraction pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Body and transport-level identifier of a downloaded asset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Download {
    /// Raw (still compressed) response body.
    pub bytes: Vec<u8>,
    /// `ETag` response header, if present.
    pub etag: Option<String>,
}

/// Remote that serves the chat UI page and the stylesheet.
pub trait AssetSource: Send + Sync {
    /// Fetch the chat UI page that embeds the stylesheet link.
    fn fetch_document(&self) -> Result<String, FetchError>;

    /// Fetch a stylesheet body without transparent decompression.
    fn fetch_asset(&self, url: &str) -> Result<Download, FetchError>;
}

/// Static settings for a [`ReferenceFetcher`].
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// File name of the stylesheet inside the page (e.g. `friends.css`).
    pub asset_name: String,
    /// URL fetched directly when the page yields no token.
    pub fallback_url: String,
    /// Import preamble used to build the patched variant.
    pub wrapper: ImportWrapper,
}

/// Refreshes the stored asset from an [`AssetSource`].
pub struct ReferenceFetcher {
    store: Arc<AssetStore>,
    source: Arc<dyn AssetSource>,
    patterns: DocumentPatterns,
    fallback_url: String,
    wrapper: ImportWrapper,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for ReferenceFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceFetcher")
            .field("store", &self.store)
            .field("source", &"<source>")
            .field("patterns", &self.patterns)
            .field("fallback_url", &self.fallback_url)
            .field("wrapper", &self.wrapper)
            .finish()
    }
}

impl ReferenceFetcher {
    /// Create a fetcher.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Pattern`] if the asset name cannot be compiled
    /// into an extraction pattern.
    pub fn new(
        store: Arc<AssetStore>,
        source: Arc<dyn AssetSource>,
        settings: FetchSettings,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, FetchError> {
        Ok(Self {
            store,
            source,
            patterns: DocumentPatterns::new(&settings.asset_name)?,
            fallback_url: settings.fallback_url,
            wrapper: settings.wrapper,
            events,
        })
    }

    /// The store this fetcher writes to.
    #[must_use]
    pub fn store(&self) -> &Arc<AssetStore> {
        &self.store
    }

    /// Make sure a usable asset is stored.
    ///
    /// Returns `true` if a usable asset is stored afterwards, `false` if
    /// none is. A failed refresh is reported to the event sink and leaves
    /// the previous asset in place, which is still used.
    pub fn ensure(&self, force: bool) -> bool {
        if !force && self.store.is_fresh() {
            log::trace!("Asset is fresh, skipping refresh");
            return true;
        }

        let Some(ticket) = self.store.begin_refresh(force) else {
            self.events
                .debug("Stylesheet refresh already in progress, waiting for it");
            return !self.store.wait_until_idle().is_empty();
        };

        self.events.info("Checking for latest stylesheet...");
        match self.refresh(ticket) {
            Ok(()) => true,
            Err(e) => {
                self.events
                    .error(&format!("Failed to download stylesheet: {e}"));
                let usable = !self.store.get().is_empty();
                if usable {
                    self.events
                        .warn("Using the previously downloaded stylesheet.");
                }
                usable
            }
        }
    }

    fn refresh(&self, ticket: RefreshTicket<'_>) -> Result<(), FetchError> {
        let document = self.source.fetch_document()?;
        let reference = self.patterns.extract(&document);
        let current = ticket.current_token();

        if reference.token.is_some() && reference.token == current {
            self.events.info("Stylesheet is already up to date.");
            ticket.unchanged();
            return Ok(());
        }

        let (bytes, token, url) = match (reference.url, reference.token) {
            (Some(url), Some(token)) => {
                self.events.debug(&format!("Freshness token: {token}"));
                let download = self.source.fetch_asset(&url)?;
                (download.bytes, Some(token), url)
            }
            _ => {
                self.events
                    .debug("Could not find freshness token, using latest from CDN.");
                let download = self.source.fetch_asset(&self.fallback_url)?;
                if download.etag.is_some() && download.etag == current {
                    self.events.info("Stylesheet is already up to date.");
                    ticket.unchanged();
                    return Ok(());
                }
                if let Some(etag) = &download.etag {
                    self.events.debug(&format!("ETag: {etag}"));
                }
                (download.bytes, download.etag, self.fallback_url.clone())
            }
        };

        if bytes.is_empty() {
            return Err(FetchError::EmptyBody(url));
        }

        let asset = Asset::from_original(bytes, token, &self.wrapper)?;
        log::debug!(
            "Stylesheet: {} original, {} patched",
            bytesize::ByteSize(asset.original().len() as u64),
            bytesize::ByteSize(asset.patched().len() as u64)
        );
        ticket.commit(asset);
        self.events.info("Successfully downloaded latest stylesheet.");
        Ok(())
    }
}
