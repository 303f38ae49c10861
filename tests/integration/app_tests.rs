use super::support::{write_entry, ENV_MUTEX};
use cachepatch::cli::Cli;
use cachepatch::config::ConfigError;
use cachepatch::error::ExitCode;
use clap::Parser;
use std::fs;
use tempfile::tempdir;

fn write_config(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    fs::write(
        &path,
        "host_process_name = \"cachepatch-test-no-such-host\"\nnotifications = false\n",
    )
    .unwrap();
    path
}

#[test]
fn test_show_config_succeeds() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());
    let cli = Cli::try_parse_from([
        "cachepatch",
        "--config",
        config.to_str().unwrap(),
        "show-config",
    ])
    .unwrap();

    assert_eq!(cachepatch::run_app(cli).unwrap(), ExitCode::Success);
}

#[test]
fn test_invalid_config_is_reported() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());
    let cli = Cli::try_parse_from([
        "cachepatch",
        "--config",
        config.to_str().unwrap(),
        "--host-dir",
        dir.path().to_str().unwrap(),
        "--io-threads",
        "0",
        "scan",
    ])
    .unwrap();

    let err = cachepatch::run_app(cli).unwrap_err();
    assert!(err.downcast_ref::<ConfigError>().is_some());
}

#[test]
fn test_clear_cache_command() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());
    let cache = dir.path().join("Cache");
    fs::create_dir_all(&cache).unwrap();
    write_entry(&cache.join("f_000001"), b"stale", 5);

    let cli = Cli::try_parse_from([
        "cachepatch",
        "--config",
        config.to_str().unwrap(),
        "--host-dir",
        dir.path().to_str().unwrap(),
        "--cache-dir",
        cache.to_str().unwrap(),
        "clear-cache",
    ])
    .unwrap();

    assert_eq!(cachepatch::run_app(cli).unwrap(), ExitCode::Success);
    assert!(!cache.exists());
}

#[test]
fn test_clear_cache_missing_dir_exit_code() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());

    let cli = Cli::try_parse_from([
        "cachepatch",
        "--config",
        config.to_str().unwrap(),
        "--host-dir",
        dir.path().to_str().unwrap(),
        "--cache-dir",
        dir.path().join("missing").to_str().unwrap(),
        "clear-cache",
    ])
    .unwrap();

    assert_eq!(
        cachepatch::run_app(cli).unwrap(),
        ExitCode::EnvironmentNotReady
    );
}
