//! Application configuration management.
//!
//! Settings are layered with figment, later layers winning:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. `config.toml` in the platform config directory, or an explicit file
//! 3. `CACHEPATCH_*` environment variables (e.g. `CACHEPATCH_IO_THREADS=8`)
//! 4. Command-line overrides, applied by the caller
//!
//! Paths left unset are derived from the host install directory.

use std::path::{Path, PathBuf};

use directories::{BaseDirs, ProjectDirs};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Prefix of environment variables that override configuration keys.
pub const ENV_PREFIX: &str = "CACHEPATCH_";

/// Errors raised while loading or validating configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A layer could not be parsed or extracted.
    #[error("Invalid configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// A value is out of range or missing.
    #[error("Invalid configuration value for {key}: {reason}")]
    Invalid {
        /// Configuration key
        key: &'static str,
        /// Why the value was rejected
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host install directory.
    pub host_dir: Option<PathBuf>,
    /// Host disk cache directory. Derived from the local data dir if unset.
    pub cache_dir: Option<PathBuf>,
    /// Executable that accepts URI commands. Derived from `host_dir` if unset.
    pub host_executable: Option<PathBuf>,
    /// Process name used to detect a running host.
    pub host_process_name: String,
    /// Window class of the host's UI window (checked on Windows only).
    pub host_window_class: String,
    /// Locale passed to the chat document (`cc=` query parameter).
    pub locale: String,
    /// Chat UI document that links the current stylesheet.
    pub chat_url: String,
    /// Stylesheet URL used when the document yields no link.
    pub fallback_url: String,
    /// User agent sent with every request.
    pub user_agent: String,
    /// File name of the tracked stylesheet.
    pub asset_name: String,
    /// Origin the host maps to its UI directory.
    pub loopback_base: String,
    /// File name prefix of cache entries.
    pub cache_prefix: String,
    /// UI directory under `host_dir` served by the loopback origin.
    pub ui_subdir: String,
    /// Library UI directory under `host_dir`.
    pub library_subdir: String,
    /// Also patch the library stylesheets.
    pub patch_library: bool,
    /// Number of comparison workers.
    pub io_threads: usize,
    /// Minimum seconds between two remote checks.
    pub refresh_interval_secs: u64,
    /// Pause between reload commands, in milliseconds.
    pub reload_delay_ms: u64,
    /// URI commands that make the host reload its UI.
    pub reload_signals: Vec<String>,
    /// HTTP request timeout in seconds.
    pub http_timeout_secs: u64,
    /// Quiet period before a burst of cache events triggers a scan.
    pub watch_debounce_ms: u64,
    /// Show a notification after a successful patch.
    pub notifications: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host_dir: default_host_dir(),
            cache_dir: None,
            host_executable: None,
            host_process_name: if cfg!(windows) {
                "steam.exe".to_string()
            } else {
                "steam".to_string()
            },
            host_window_class: crate::host::DEFAULT_WINDOW_CLASS.to_string(),
            locale: "english".to_string(),
            chat_url: "https://steam-chat.com/chat/clientui/".to_string(),
            fallback_url: "https://steamcommunity-a.akamaihd.net/public/css/webui/friends.css"
                .to_string(),
            user_agent: "Mozilla/5.0 (Windows; U; Windows NT 10.0; en-US; Valve Steam Client/default/0; ) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/70.0.3538.110 Safari/537.36".to_string(),
            asset_name: "friends.css".to_string(),
            loopback_base: "https://steamloopback.host".to_string(),
            cache_prefix: crate::scanner::DEFAULT_CACHE_PREFIX.to_string(),
            ui_subdir: "clientui".to_string(),
            library_subdir: "steamui".to_string(),
            patch_library: false,
            io_threads: 4,
            refresh_interval_secs: crate::asset::DEFAULT_REFRESH_INTERVAL.as_secs(),
            reload_delay_ms: 1000,
            reload_signals: vec![
                "steam://friends/status/offline".to_string(),
                "steam://friends/status/online".to_string(),
            ],
            http_timeout_secs: crate::fetcher::http::DEFAULT_TIMEOUT.as_secs(),
            watch_debounce_ms: 500,
            notifications: true,
        }
    }
}

fn default_host_dir() -> Option<PathBuf> {
    let base = BaseDirs::new()?;
    let candidate = if cfg!(windows) {
        PathBuf::from(r"C:\Program Files (x86)\Steam")
    } else {
        base.home_dir().join(".steam").join("steam")
    };
    candidate.is_dir().then_some(candidate)
}

impl Config {
    /// Default platform-specific configuration file path.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "cachepatch", "cachepatch")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Layered figment: defaults, then the TOML file, then the environment.
    ///
    /// # Arguments
    ///
    /// * `path` - Explicit config file; the default path is used if `None`
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = path.map(Path::to_path_buf).or_else(Self::default_path) {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load configuration from all layers.
    ///
    /// A missing config file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if a layer is malformed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(path).extract().map_err(Box::new)?;
        log::debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Reject values the pipeline cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.io_threads == 0 {
            return Err(ConfigError::invalid("io_threads", "must be at least 1"));
        }
        if self.cache_prefix.is_empty() {
            return Err(ConfigError::invalid("cache_prefix", "must not be empty"));
        }
        if self.asset_name.is_empty() {
            return Err(ConfigError::invalid("asset_name", "must not be empty"));
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "http_timeout_secs",
                "must be at least 1",
            ));
        }
        match &self.host_dir {
            None => Err(ConfigError::invalid(
                "host_dir",
                "host install directory not found, set host_dir or CACHEPATCH_HOST_DIR",
            )),
            Some(dir) if !dir.is_dir() => Err(ConfigError::invalid(
                "host_dir",
                format!("{} is not a directory", dir.display()),
            )),
            Some(_) => Ok(()),
        }
    }

    /// Host install directory.
    ///
    /// # Errors
    ///
    /// Fails if it is neither configured nor detected.
    pub fn host_dir(&self) -> Result<&Path, ConfigError> {
        self.host_dir
            .as_deref()
            .ok_or_else(|| ConfigError::invalid("host_dir", "not configured"))
    }

    /// Directory the loopback origin maps to.
    ///
    /// # Errors
    ///
    /// Fails if the host directory is unknown.
    pub fn ui_dir(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.host_dir()?.join(&self.ui_subdir))
    }

    /// Host disk cache directory.
    ///
    /// # Errors
    ///
    /// Fails if it is not configured and no local data directory exists.
    pub fn cache_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        BaseDirs::new()
            .map(|base| {
                base.data_local_dir()
                    .join("Steam")
                    .join("htmlcache")
                    .join("Cache")
            })
            .ok_or_else(|| ConfigError::invalid("cache_dir", "local data directory not found"))
    }

    /// Executable used to send URI commands.
    ///
    /// # Errors
    ///
    /// Fails if it is not configured and the host directory is unknown.
    pub fn host_executable(&self) -> Result<PathBuf, ConfigError> {
        if let Some(exe) = &self.host_executable {
            return Ok(exe.clone());
        }
        let name = if cfg!(windows) { "steam.exe" } else { "steam.sh" };
        Ok(self.host_dir()?.join(name))
    }

    /// Chat document URL for the configured locale.
    #[must_use]
    pub fn document_url(&self) -> String {
        format!("{}?l=&cc={}&build=", self.chat_url, self.locale)
    }

    /// Stylesheet name without its `.css` extension.
    #[must_use]
    pub fn asset_stem(&self) -> &str {
        self.asset_name
            .strip_suffix(".css")
            .unwrap_or(&self.asset_name)
    }
}
