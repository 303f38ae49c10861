//! Pattern extraction of the stylesheet URL and version from the chat UI page.
//!
//! The page is not parsed. It embeds the stylesheet as
//! `<link href="https://cdn.example/css/friends.css?v=TOKEN&amp;l=english" rel=...>`
//! and two captures pull out the URL and the `v` query value.

use regex::Regex;

/// URL and freshness token found in the chat UI document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteReference {
    /// Absolute stylesheet URL with HTML entities decoded.
    pub url: Option<String>,
    /// Value of the `v` query parameter.
    pub token: Option<String>,
}

/// Compiled extraction patterns for one asset name.
#[derive(Debug, Clone)]
pub struct DocumentPatterns {
    link: Regex,
    version: Regex,
}

impl DocumentPatterns {
    /// Compile patterns that look for `asset_name` inside a `<link href>`.
    ///
    /// # Errors
    ///
    /// Returns a regex error only if the compiled pattern exceeds size limits.
    pub fn new(asset_name: &str) -> Result<Self, regex::Error> {
        let link = Regex::new(&format!(
            r#"<link href="([^"]+{}[^"]*)" rel"#,
            regex::escape(asset_name)
        ))?;
        let version = Regex::new(r"\?v=([^&]+)")?;
        Ok(Self { link, version })
    }

    /// Pull the stylesheet URL and token out of `document`.
    #[must_use]
    pub fn extract(&self, document: &str) -> RemoteReference {
        let url = self
            .link
            .captures(document)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().replace("&amp;", "&"));

        let token = url.as_deref().and_then(|u| {
            self.version
                .captures(u)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .filter(|t| !t.is_empty())
        });

        RemoteReference { url, token }
    }
}
