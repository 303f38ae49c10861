//! Patching of the host's uncompressed library stylesheets.
//!
//! Unlike the cached stylesheet these files live in the host install
//! directory as plain text. Each target is replaced by a marker line and two
//! `@import` directives, padded with tabs to its original length, after the
//! original content has been copied aside.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{ensure_file, PatchError};
use crate::events::EventSink;

/// First line of every patched library stylesheet.
pub const PATCHED_MARKER: &str = "/*patched*/";

/// One stylesheet to patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryTarget {
    /// Stylesheet the host loads.
    pub source: PathBuf,
    /// Directory served by the loopback origin, receives the side files.
    pub out_dir: PathBuf,
    /// Stem of the side files (`{stem}.original.css`, `{stem}.custom.css`).
    pub stem: String,
}

impl LibraryTarget {
    /// Create a target.
    #[must_use]
    pub fn new(source: impl Into<PathBuf>, out_dir: impl Into<PathBuf>, stem: &str) -> Self {
        Self {
            source: source.into(),
            out_dir: out_dir.into(),
            stem: stem.to_string(),
        }
    }

    fn original_file(&self) -> PathBuf {
        self.out_dir.join(format!("{}.original.css", self.stem))
    }

    fn custom_file(&self) -> PathBuf {
        self.out_dir.join(format!("{}.custom.css", self.stem))
    }
}

/// Result of patching a single target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryStatus {
    /// The target file does not exist.
    Missing,
    /// The target already starts with [`PATCHED_MARKER`].
    AlreadyPatched,
    /// The target was patched now.
    Patched,
}

/// Patches a fixed set of library stylesheets.
pub struct LibraryPatcher {
    library_dir: PathBuf,
    targets: Vec<LibraryTarget>,
    loopback_base: String,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for LibraryPatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryPatcher")
            .field("library_dir", &self.library_dir)
            .field("targets", &self.targets)
            .field("loopback_base", &self.loopback_base)
            .finish()
    }
}

impl LibraryPatcher {
    /// Create a patcher for explicit targets.
    #[must_use]
    pub fn new(
        library_dir: impl Into<PathBuf>,
        targets: Vec<LibraryTarget>,
        loopback_base: &str,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            library_dir: library_dir.into(),
            targets,
            loopback_base: loopback_base.trim_end_matches('/').to_string(),
            events,
        }
    }

    /// Default targets: the library root and main stylesheets, plus the
    /// offline copy of the tracked stylesheet shipped in the UI directory.
    ///
    /// # Arguments
    ///
    /// * `library_dir` - Host library UI directory
    /// * `ui_dir` - Host chat UI directory
    /// * `asset_name` - File name of the tracked stylesheet
    #[must_use]
    pub fn default_targets(library_dir: &Path, ui_dir: &Path, asset_name: &str) -> Vec<LibraryTarget> {
        let css = library_dir.join("css");
        let stem = asset_name.strip_suffix(".css").unwrap_or(asset_name);
        vec![
            LibraryTarget::new(css.join("libraryroot.css"), library_dir, "libraryroot"),
            LibraryTarget::new(css.join("main.css"), library_dir, "main"),
            LibraryTarget::new(
                ui_dir.join("css").join(asset_name),
                ui_dir,
                &format!("o{stem}"),
            ),
        ]
    }

    /// Configured targets.
    #[must_use]
    pub fn targets(&self) -> &[LibraryTarget] {
        &self.targets
    }

    /// Patch every target, reporting progress to the event sink.
    ///
    /// Returns one result per target, in target order. Returns an empty
    /// list if the library directory does not exist.
    pub fn patch_all(&self) -> Vec<Result<LibraryStatus, PatchError>> {
        if !self.library_dir.join("css").is_dir() {
            self.events.info("Library UI directory not found.");
            return Vec::new();
        }

        self.events.info("Patching library...");
        let results: Vec<_> = self
            .targets
            .iter()
            .map(|target| {
                let result = self.patch_target(target);
                match &result {
                    Ok(LibraryStatus::Missing) => self
                        .events
                        .debug(&format!("{} not found.", target.source.display())),
                    Ok(LibraryStatus::AlreadyPatched) => self
                        .events
                        .debug(&format!("{} already patched.", target.source.display())),
                    Ok(LibraryStatus::Patched) => self
                        .events
                        .debug(&format!("Patched {}.", target.source.display())),
                    Err(e) => self.events.error(&format!("Library patch failed: {e}")),
                }
                result
            })
            .collect();

        if results.iter().any(|r| matches!(r, Ok(LibraryStatus::Patched))) {
            self.events.info("Library patched!");
            if let Some(first) = self.targets.first() {
                self.events.info(&format!(
                    "Put custom library css in {}",
                    first.custom_file().display()
                ));
            }
        }
        results
    }

    fn patch_target(&self, target: &LibraryTarget) -> Result<LibraryStatus, PatchError> {
        if !target.source.is_file() {
            return Ok(LibraryStatus::Missing);
        }

        let content = fs::read_to_string(&target.source).map_err(PatchError::io(&target.source))?;
        if content.starts_with(PATCHED_MARKER) {
            return Ok(LibraryStatus::AlreadyPatched);
        }

        let original = target.original_file();
        fs::copy(&target.source, &original).map_err(PatchError::io(&original))?;
        ensure_file(&target.custom_file())?;

        let patched = self.patched_content(&target.stem, content.len());
        fs::write(&target.source, patched).map_err(PatchError::io(&target.source))?;
        Ok(LibraryStatus::Patched)
    }

    /// Marker and imports, tab-padded to `original_len` bytes when shorter.
    fn patched_content(&self, stem: &str, original_len: usize) -> String {
        let mut text = format!(
            "{PATCHED_MARKER}\n@import url(\"{base}/{stem}.original.css\");\n@import url(\"{base}/{stem}.custom.css\");\n",
            base = self.loopback_base
        );
        if text.len() < original_len {
            let fill = original_len - text.len();
            text.extend(std::iter::repeat('\t').take(fill));
        }
        text
    }
}
