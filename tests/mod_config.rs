use nexus_bridge::config::{BridgeConfig, CONFIG_ENV};
use nexus_bridge::engine::RetryPolicy;
use nexus_bridge::errors::DbError;
use nexus_bridge::logger;
use std::time::Duration;

const SAMPLE: &str = r#"
[retry]
max_attempts = 0
backoff_ms = 25

[field_removal]
max_rounds = 8
parallelism = 2

[query]
max_limit = 50
"#;

#[test]
fn explicit_file_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bridge.toml");
    std::fs::write(&path, SAMPLE).unwrap();
    let cfg = BridgeConfig::load_with(Some(&path), |_| None).unwrap();
    assert_eq!(cfg.field_removal.max_rounds, 8);
    assert_eq!(cfg.field_removal.parallelism, 2);
    assert_eq!(cfg.query.max_limit, 50);
    assert_eq!(cfg.store.max_sessions, 16);

    let policy = RetryPolicy::from(&cfg.retry);
    assert_eq!(policy, RetryPolicy::new(0, Duration::from_millis(25)));
}

#[test]
fn missing_explicit_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = BridgeConfig::load_with(Some(&dir.path().join("nope.toml")), |_| None).unwrap_err();
    assert!(matches!(err, DbError::Config(_)));
}

#[test]
fn env_variable_selects_file_and_overrides_apply() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("env.toml");
    std::fs::write(&path, SAMPLE).unwrap();
    let p = path.display().to_string();
    let cfg = BridgeConfig::load_with(None, |k| match k {
        CONFIG_ENV => Some(p.clone()),
        "NEXUS_BRIDGE_MAX_RETRIES" => Some("3".into()),
        _ => None,
    })
    .unwrap();
    assert_eq!(cfg.query.max_limit, 50);
    assert_eq!(cfg.retry.max_attempts, 3);
    assert_eq!(cfg.retry.backoff_ms, 25);
}

#[test]
fn invalid_toml_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[retry\nmax_attempts = ").unwrap();
    assert!(matches!(BridgeConfig::load_with(Some(&path), |_| None), Err(DbError::Config(_))));
    assert!(matches!(
        BridgeConfig::from_toml_str("[query]\nmax_limit = \"many\"\n"),
        Err(DbError::Config(_))
    ));
}

#[test]
fn no_file_means_defaults() {
    let cfg = BridgeConfig::load_with(None, |_| None).unwrap();
    assert_eq!(cfg, BridgeConfig::default());
}

#[test]
fn logging_can_be_configured_into_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("logs");
    logger::configure_logging(Some(&logs), Some("debug"), Some(2)).unwrap();
    assert!(logs.is_dir());
    log::info!("logging configured for test");
    // A second call must not fail even though the global logger is already set.
    logger::configure_logging(Some(&logs), Some("warn"), None).unwrap();
}

#[test]
fn env_logging_needs_an_explicit_directory() {
    assert!(!logger::configure_from_env_with(|_| None).unwrap());

    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("env-logs");
    let target = logs.display().to_string();
    let configured = logger::configure_from_env_with(|k| match k {
        "NEXUS_BRIDGE_LOG_DIR" => Some(target.clone()),
        _ => None,
    })
    .unwrap();
    assert!(configured);
    assert!(logs.is_dir());
}
