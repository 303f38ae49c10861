//! Command-line interface definitions for cachepatch.
//!
//! Global options control verbosity, error format and configuration
//! overrides; subcommands pick the operation.
//!
//! # Example
//!
//! ```bash
//! # Patch once and exit
//! cachepatch scan
//!
//! # Re-check the remote stylesheet even if it was fetched recently
//! cachepatch scan --refresh
//!
//! # Keep watching the cache; press Enter for a manual scan
//! cachepatch -v watch
//!
//! # Delete the host's cache (host must be closed)
//! cachepatch clear-cache
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;

/// Keeps a patched stylesheet in sync inside the host's disk cache.
#[derive(Debug, Parser)]
#[command(name = "cachepatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Configuration file (default: platform config dir/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Settings that override the configuration file
    #[command(flatten)]
    pub overrides: ConfigOverrides,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch the reference stylesheet and patch the cache once
    Scan(ScanArgs),
    /// Watch the cache directory and patch whenever the entry changes
    Watch(WatchArgs),
    /// Delete the host's disk cache
    ClearCache,
    /// Print the effective configuration as TOML
    ShowConfig,
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Check the remote stylesheet even if the local copy is fresh
    #[arg(short, long)]
    pub refresh: bool,
}

/// Arguments for the watch subcommand.
#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Do not run a scan when watching starts
    #[arg(long)]
    pub no_initial_scan: bool,
}

/// Command-line overrides, the last configuration layer.
#[derive(Debug, Default, Args)]
pub struct ConfigOverrides {
    /// Host install directory
    #[arg(long, value_name = "PATH", global = true)]
    pub host_dir: Option<PathBuf>,

    /// Host disk cache directory
    #[arg(long, value_name = "PATH", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Number of I/O threads for comparing cache entries
    ///
    /// Lower values reduce disk thrashing on HDDs.
    #[arg(long, value_name = "N", global = true)]
    pub io_threads: Option<usize>,

    /// Locale of the chat document
    #[arg(long, value_name = "LOCALE", global = true)]
    pub locale: Option<String>,

    /// Also patch the library stylesheets
    #[arg(long, global = true)]
    pub patch_library: bool,

    /// Do not show a notification after patching
    #[arg(long, global = true)]
    pub no_notifications: bool,
}

impl ConfigOverrides {
    /// Apply every override that was given.
    pub fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.host_dir {
            config.host_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = Some(dir.clone());
        }
        if let Some(threads) = self.io_threads {
            config.io_threads = threads;
        }
        if let Some(locale) = &self.locale {
            config.locale = locale.clone();
        }
        if self.patch_library {
            config.patch_library = true;
        }
        if self.no_notifications {
            config.notifications = false;
        }
    }
}
