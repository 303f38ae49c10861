//! cachepatch - keeps a patched stylesheet in sync inside a host's disk cache
//!
//! A Chromium-embedded host application caches a remote stylesheet as an
//! anonymous gzip-compressed entry. cachepatch downloads the same stylesheet,
//! finds the cache entry holding it by size and content, and overwrites it
//! with a wrapper that imports the original and a user-editable override
//! file from the host's loopback origin.
//!
//! # Architecture
//!
//! - [`asset`]: Reference stylesheet, its patched form and the shared store
//! - [`fetcher`]: Downloads the reference stylesheet and tracks its version
//! - [`scanner`]: Finds the matching cache entry with parallel comparison
//! - [`patcher`]: Writes the patch, side files and library stylesheets
//! - [`coordinator`]: Serializes watcher and manual pipeline runs
//! - [`watcher`]: Filesystem events on the cache directory
//! - [`host`]: Host process detection and reload commands
//! - [`events`]: Status messages and notifications

pub mod asset;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod host;
pub mod logging;
pub mod patcher;
pub mod scanner;
pub mod signal;
pub mod watcher;

use std::io::BufRead;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::cli::{Cli, Commands, WatchArgs};
use crate::config::Config;
use crate::coordinator::{ScanCoordinator, Trigger};
use crate::error::ExitCode;
use crate::events::{EventSink, LogSink};
use crate::watcher::{CacheWatcher, WatchError, WatchSettings};

/// Run the application for parsed command-line arguments.
///
/// # Errors
///
/// Returns an error if configuration is invalid or a component cannot be
/// created. Pipeline outcomes are reported through the exit code instead.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.overrides.apply(&mut config);

    if let Commands::ShowConfig = cli.command {
        let text = toml::to_string_pretty(&config).context("Failed to serialize configuration")?;
        println!("{text}");
        return Ok(ExitCode::Success);
    }

    config.validate()?;
    let events: Arc<dyn EventSink> = Arc::new(LogSink);
    let coordinator = Arc::new(ScanCoordinator::from_config(&config, events)?);

    match cli.command {
        Commands::Scan(args) => {
            let report = coordinator.run(Trigger::Manual {
                force_refresh: args.refresh,
            });
            Ok(ExitCode::from_report(&report))
        }
        Commands::Watch(args) => run_watch(&coordinator, &config, &args),
        Commands::ClearCache => Ok(ExitCode::from_report(&coordinator.clear_cache())),
        Commands::ShowConfig => Ok(ExitCode::Success),
    }
}

/// Watch the cache until Ctrl+C, running a manual scan for every line read
/// from stdin (`r` forces a remote refresh, `q` quits).
fn run_watch(coordinator: &Arc<ScanCoordinator>, config: &Config, args: &WatchArgs) -> Result<ExitCode> {
    let shutdown = signal::install_handler()?;

    if !args.no_initial_scan {
        coordinator.run(Trigger::Manual {
            force_refresh: false,
        });
    }

    let settings = WatchSettings {
        dir: config.cache_dir()?,
        prefix: config.cache_prefix.clone(),
        debounce: Duration::from_millis(config.watch_debounce_ms),
    };
    let watcher = match CacheWatcher::start(Arc::clone(coordinator), settings, shutdown.get_flag()) {
        Ok(watcher) => watcher,
        Err(WatchError::MissingDir(dir)) => {
            log::warn!(
                "Cache folder {} does not exist; start the host and try again.",
                dir.display()
            );
            return Ok(ExitCode::EnvironmentNotReady);
        }
        Err(e) => return Err(e.into()),
    };
    log::info!("Press Enter to scan now, 'r' + Enter to refresh the stylesheet first, 'q' + Enter to quit.");

    let (tx, rx) = mpsc::channel::<String>();
    thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines().map_while(Result::ok) {
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("Failed to spawn stdin reader")?;

    let mut stdin_open = true;
    let code = loop {
        if shutdown.is_shutdown_requested() {
            break ExitCode::Interrupted;
        }
        if !stdin_open {
            thread::sleep(Duration::from_millis(200));
            continue;
        }
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(line) => match line.trim() {
                "q" | "quit" => break ExitCode::Success,
                command => {
                    coordinator.run(Trigger::Manual {
                        force_refresh: matches!(command, "r" | "refresh"),
                    });
                }
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                log::debug!("stdin closed, watching until interrupted");
                stdin_open = false;
            }
        }
    };

    watcher.stop();
    Ok(code)
}
