//! Patch application for a matched cache entry.
//!
//! # Overview
//!
//! Applying a patch writes three things, in this order:
//!
//! 1. `{ui_dir}/{stem}.original.css`: the decompressed original stylesheet,
//!    prefixed with a `/*token*/` comment line. The patched stylesheet
//!    imports it, so it must exist before the cache entry changes.
//! 2. The matched cache entry, overwritten in place with the patched bytes.
//! 3. `{ui_dir}/{stem}.custom.css`: created empty if missing, never touched
//!    otherwise.
//!
//! A failure at step 1 leaves the cache entry untouched.
//!
//! After a successful write the host is asked to reload its UI window if it
//! is running, by sending two URI commands with a short pause in between.

pub mod library;

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::asset::{Asset, CodecError};
use crate::events::EventSink;
use crate::host::HostControl;

pub use library::{LibraryPatcher, LibraryStatus, LibraryTarget, PATCHED_MARKER};

/// Errors raised while applying a patch.
#[derive(thiserror::Error, Debug)]
pub enum PatchError {
    /// A file could not be written.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The matched entry could not be decompressed.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl PatchError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Where the host serves its UI files from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLayout {
    /// Directory the loopback origin maps to.
    pub ui_dir: PathBuf,
    /// Stem of the tracked stylesheet (e.g. `friends`).
    pub stem: String,
}

impl HostLayout {
    /// Create a layout.
    #[must_use]
    pub fn new(ui_dir: impl Into<PathBuf>, stem: impl Into<String>) -> Self {
        Self {
            ui_dir: ui_dir.into(),
            stem: stem.into(),
        }
    }

    /// Preserved original stylesheet.
    #[must_use]
    pub fn original_file(&self) -> PathBuf {
        self.ui_dir.join(format!("{}.original.css", self.stem))
    }

    /// User-authored override stylesheet.
    #[must_use]
    pub fn custom_file(&self) -> PathBuf {
        self.ui_dir.join(format!("{}.custom.css", self.stem))
    }
}

/// URI commands that make the host reload the patched stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadSettings {
    /// Commands sent in order.
    pub signals: Vec<String>,
    /// Pause between consecutive commands.
    pub delay: Duration,
}

impl Default for ReloadSettings {
    fn default() -> Self {
        Self {
            signals: vec![
                "steam://friends/status/offline".to_string(),
                "steam://friends/status/online".to_string(),
            ],
            delay: Duration::from_secs(1),
        }
    }
}

/// Writes the patch for a matched cache entry.
pub struct PatchApplier {
    layout: HostLayout,
    reload: ReloadSettings,
    host: Arc<dyn HostControl>,
    events: Arc<dyn EventSink>,
    notifications: bool,
}

impl std::fmt::Debug for PatchApplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchApplier")
            .field("layout", &self.layout)
            .field("reload", &self.reload)
            .field("host", &"<host>")
            .field("notifications", &self.notifications)
            .finish()
    }
}

impl PatchApplier {
    /// Create an applier.
    #[must_use]
    pub fn new(
        layout: HostLayout,
        reload: ReloadSettings,
        host: Arc<dyn HostControl>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            layout,
            reload,
            host,
            events,
            notifications: true,
        }
    }

    /// Enable or disable the success notification.
    #[must_use]
    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.notifications = enabled;
        self
    }

    /// Output layout.
    #[must_use]
    pub fn layout(&self) -> &HostLayout {
        &self.layout
    }

    /// Patch `matched` in place.
    ///
    /// # Arguments
    ///
    /// * `matched` - Cache entry holding the original compressed stylesheet
    /// * `css` - Decompressed original stylesheet
    /// * `asset` - Asset whose patched bytes replace the entry
    ///
    /// # Errors
    ///
    /// Returns [`PatchError::Io`] for the first write that fails. Host
    /// reload failures are reported as warnings only.
    pub fn apply(&self, matched: &Path, css: &[u8], asset: &Asset) -> Result<(), PatchError> {
        let original_file = self.layout.original_file();
        fs::create_dir_all(&self.layout.ui_dir).map_err(PatchError::io(&self.layout.ui_dir))?;

        fs::write(&original_file, side_file_content(css, asset))
            .map_err(PatchError::io(&original_file))?;

        self.events.info("Overwriting with patched version...");
        fs::write(matched, asset.patched()).map_err(PatchError::io(matched))?;

        let custom_file = self.layout.custom_file();
        ensure_file(&custom_file)?;

        if self.host.is_running() && self.host.window_present() {
            self.reload_host();
        }

        self.events.info(&format!(
            "Done! Put your custom css in {}",
            custom_file.display()
        ));
        self.events
            .info("Close and reopen the host window to see changes.");
        if self.notifications {
            self.events
                .notify("cachepatch", "Successfully patched stylesheet!");
        }
        Ok(())
    }

    /// Rewrite the preserved original stylesheet if it is missing or does
    /// not match `asset`. The cache entry is never touched.
    ///
    /// Returns `true` if the file was written.
    ///
    /// # Errors
    ///
    /// Returns an error if `asset` cannot be decompressed or the file cannot
    /// be written.
    pub fn restore_side_file(&self, asset: &Asset) -> Result<bool, PatchError> {
        let css = crate::asset::decompress(asset.original())?;
        let expected = side_file_content(&css, asset);
        let original_file = self.layout.original_file();
        if fs::read(&original_file).is_ok_and(|current| current == expected) {
            return Ok(false);
        }

        fs::create_dir_all(&self.layout.ui_dir).map_err(PatchError::io(&self.layout.ui_dir))?;
        fs::write(&original_file, expected).map_err(PatchError::io(&original_file))?;
        ensure_file(&self.layout.custom_file())?;
        Ok(true)
    }

    fn reload_host(&self) {
        self.events.info("Reloading host window...");
        for (i, signal) in self.reload.signals.iter().enumerate() {
            if i > 0 {
                thread::sleep(self.reload.delay);
            }
            if let Err(e) = self.host.send_signal(signal) {
                self.events.warn(&format!("Could not reload host window: {e}"));
                return;
            }
        }
    }
}

/// `/*token*/` header line followed by the original stylesheet.
fn side_file_content(css: &[u8], asset: &Asset) -> Vec<u8> {
    let header = format!("/*{}*/\n", asset.token().unwrap_or_default());
    let mut side = Vec::with_capacity(header.len() + css.len());
    side.extend_from_slice(header.as_bytes());
    side.extend_from_slice(css);
    side
}

/// Create `path` empty unless it already exists.
pub(crate) fn ensure_file(path: &Path) -> Result<(), PatchError> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => file.flush().map_err(PatchError::io(path)),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(PatchError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
