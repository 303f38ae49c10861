//! Blocking HTTP implementation of [`AssetSource`].

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT_ENCODING, ETAG};

use super::{AssetSource, Download, FetchError};

/// Default transport timeout. Bounds how long other callers wait on an
/// in-flight refresh.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Fetches the chat UI page and stylesheet over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    document_url: String,
}

impl HttpSource {
    /// Build a client with the given user agent and timeout.
    ///
    /// # Arguments
    ///
    /// * `document_url` - Fully-qualified chat UI page URL
    /// * `user_agent` - User agent the remote expects from the host client
    /// * `timeout` - Per-request transport timeout
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if the TLS backend fails to
    /// initialize.
    pub fn new(
        document_url: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(FetchError::ClientBuild)?;
        Ok(Self {
            client,
            document_url: document_url.into(),
        })
    }
}

impl AssetSource for HttpSource {
    fn fetch_document(&self) -> Result<String, FetchError> {
        log::debug!("GET {}", self.document_url);
        let text = self
            .client
            .get(&self.document_url)
            .send()?
            .error_for_status()?
            .text()?;
        Ok(text)
    }

    fn fetch_asset(&self, url: &str) -> Result<Download, FetchError> {
        log::debug!("GET {} (gzip)", url);
        // Without the `gzip` feature reqwest leaves the body compressed,
        // which is exactly the form the host caches.
        let response = self
            .client
            .get(url)
            .header(ACCEPT_ENCODING, "gzip")
            .send()?
            .error_for_status()?;

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let bytes = response.bytes()?.to_vec();

        Ok(Download { bytes, etag })
    }
}
