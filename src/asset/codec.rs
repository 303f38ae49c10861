//! Gzip codec and override-import wrapper for the tracked stylesheet.
//!
//! # Overview
//!
//! The host caches the stylesheet exactly as the CDN served it, gzip
//! compressed. The patched variant is produced by decompressing that body,
//! wrapping it with two `@import` directives that point at the host's
//! loopback origin, and compressing it again:
//!
//! ```text
//! @import url("https://steamloopback.host/friends.original.css");
//! @import url("https://steamloopback.host/friends.custom.css");
//! {<original stylesheet>}
//! ```
//!
//! Compression uses a fixed level and a zero mtime header, so the same
//! input always yields the same bytes for a given flate2 version.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

/// Leading two bytes of every gzip member.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Errors produced while decoding or re-encoding the stylesheet.
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    /// The downloaded body was empty.
    #[error("Asset body is empty")]
    Empty,

    /// The body does not start with the gzip magic bytes.
    #[error("Asset body is not gzip data")]
    NotGzip,

    /// The gzip stream could not be decoded.
    #[error("Failed to decompress asset: {0}")]
    Decompress(#[source] std::io::Error),

    /// The patched stylesheet could not be encoded.
    #[error("Failed to compress patched asset: {0}")]
    Compress(#[source] std::io::Error),
}

/// Check whether `bytes` begins with a gzip header.
#[must_use]
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Decompress a gzip body.
///
/// # Errors
///
/// Returns [`CodecError::NotGzip`] when the magic bytes are missing and
/// [`CodecError::Decompress`] for truncated or corrupt streams.
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::Empty);
    }
    if !is_gzip(bytes) {
        return Err(CodecError::NotGzip);
    }

    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::with_capacity(bytes.len() * 4);
    decoder
        .read_to_end(&mut out)
        .map_err(CodecError::Decompress)?;
    Ok(out)
}

/// Compress `bytes` with the best compression level.
///
/// # Errors
///
/// Returns [`CodecError::Compress`] if the encoder fails to write.
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::best());
    encoder.write_all(bytes).map_err(CodecError::Compress)?;
    encoder.finish().map_err(CodecError::Compress)
}

/// The fixed `@import` preamble that turns the cached stylesheet into a
/// loader for the original and custom override files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportWrapper {
    original_url: String,
    custom_url: String,
}

impl ImportWrapper {
    /// Build a wrapper for `{base}/{stem}.original.css` and
    /// `{base}/{stem}.custom.css`.
    ///
    /// # Arguments
    ///
    /// * `loopback_base` - Origin the host serves its UI directory from
    /// * `stem` - File stem of the tracked asset (e.g. `friends`)
    #[must_use]
    pub fn new(loopback_base: &str, stem: &str) -> Self {
        let base = loopback_base.trim_end_matches('/');
        Self {
            original_url: format!("{base}/{stem}.original.css"),
            custom_url: format!("{base}/{stem}.custom.css"),
        }
    }

    /// URL of the preserved original stylesheet.
    #[must_use]
    pub fn original_url(&self) -> &str {
        &self.original_url
    }

    /// URL of the user-authored override stylesheet.
    #[must_use]
    pub fn custom_url(&self) -> &str {
        &self.custom_url
    }

    /// Text inserted before the original content, ending with the opening
    /// brace of the reconstructed rule block.
    #[must_use]
    pub fn preamble(&self) -> String {
        format!(
            "@import url(\"{}\");\n@import url(\"{}\");\n{{",
            self.original_url, self.custom_url
        )
    }

    /// Wrap decompressed stylesheet content.
    #[must_use]
    pub fn wrap(&self, css: &[u8]) -> Vec<u8> {
        let preamble = self.preamble();
        let mut out = Vec::with_capacity(preamble.len() + css.len() + 1);
        out.extend_from_slice(preamble.as_bytes());
        out.extend_from_slice(css);
        out.push(b'}');
        out
    }

    /// Decompress `original`, wrap it and recompress.
    ///
    /// # Errors
    ///
    /// Propagates any [`CodecError`] from either direction.
    pub fn patch(&self, original: &[u8]) -> Result<Vec<u8>, CodecError> {
        let css = decompress(original)?;
        compress(&self.wrap(&css))
    }
}

impl Default for ImportWrapper {
    fn default() -> Self {
        Self::new("https://steamloopback.host", "friends")
    }
}
