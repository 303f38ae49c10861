use super::support::ENV_MUTEX;
use cachepatch::config::{Config, ConfigError};
use figment::providers::{Env, Serialized};
use figment::Figment;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // Use figment directly without Env to avoid interference from other tests
    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .extract()
        .unwrap();
    assert_eq!(config.io_threads, 4);
    assert_eq!(config.asset_name, "friends.css");
    assert_eq!(config.loopback_base, "https://steamloopback.host");
}

#[test]
fn test_config_load_from_env() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    std::env::set_var("CACHEPATCH_IO_THREADS", "16");
    std::env::set_var("CACHEPATCH_LOCALE", "japanese");
    std::env::set_var("CACHEPATCH_PATCH_LIBRARY", "true");

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed("CACHEPATCH_"))
        .extract()
        .unwrap();

    std::env::remove_var("CACHEPATCH_IO_THREADS");
    std::env::remove_var("CACHEPATCH_LOCALE");
    std::env::remove_var("CACHEPATCH_PATCH_LIBRARY");

    assert_eq!(config.io_threads, 16);
    assert_eq!(config.locale, "japanese");
    assert!(config.patch_library);
}

#[test]
fn test_env_overrides_file() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "io_threads = 2\ncache_prefix = \"g_\"\n").unwrap();
    std::env::set_var("CACHEPATCH_IO_THREADS", "6");

    let config = Config::load(Some(&path));
    std::env::remove_var("CACHEPATCH_IO_THREADS");
    let config = config.unwrap();

    assert_eq!(config.io_threads, 6);
    assert_eq!(config.cache_prefix, "g_");
}

#[test]
fn test_load_missing_file_uses_defaults() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempdir().unwrap();
    let config = Config::load(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(config.cache_prefix, "f_");
}

#[test]
fn test_load_invalid_toml_fails() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "io_threads = \"many\"").unwrap();

    let err = Config::load(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::Load(_)));
}

#[test]
fn test_config_toml_round_trip() {
    let config = Config {
        io_threads: 3,
        locale: "german".into(),
        host_dir: Some("/opt/steam".into()),
        ..Config::default()
    };

    let text = toml::to_string_pretty(&config).unwrap();
    assert!(text.contains("io_threads = 3"));
    assert!(text.contains("locale = \"german\""));

    let parsed: Config = toml::from_str(&text).unwrap();
    assert_eq!(parsed, config);
}
