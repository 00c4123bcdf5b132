//! log4rs wiring: a rolling application log plus a dedicated audit log.
//!
//! Successful writes are recorded on the `nexus_bridge::audit` target, which is
//! routed only to `audit.log`.

use crate::config::LogConfig;
use crate::errors::DbError;
use log::LevelFilter;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};

pub const AUDIT_TARGET: &str = "nexus_bridge::audit";

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_SIZE: u64 = 10 * 1024 * 1024;

#[must_use]
pub fn parse_level(level: Option<&str>) -> LevelFilter {
    match level.unwrap_or("info").to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

fn rolling(base: &Path, stem: &str, keep: u32) -> Result<RollingFileAppender, DbError> {
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", base.join(format!("{stem}.{{}}.log")).display()), keep)
        .map_err(|e| DbError::Config(e.to_string()))?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(base.join(format!("{stem}.log")), Box::new(policy))
        .map_err(|e| DbError::Io(e.to_string()))
}

/// Configure logging globally for the process.
/// - dir: base directory for logs; if None, current directory.
/// - level: off|error|warn|info|debug|trace
/// - retention: number of rolled files to keep (default 7)
///
/// A second initialisation in the same process is ignored.
///
/// # Errors
/// Returns an error if the directory or the log files cannot be created.
pub fn configure_logging(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<usize>,
) -> Result<(), DbError> {
    let base = dir
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    std::fs::create_dir_all(&base).map_err(|e| DbError::Io(e.to_string()))?;
    let keep = u32::try_from(retention.unwrap_or(7)).unwrap_or(u32::MAX);
    let lvl = parse_level(level);
    let config = Config::builder()
        .appender(Appender::builder().build("app", Box::new(rolling(&base, "app", keep)?)))
        .appender(Appender::builder().build("audit", Box::new(rolling(&base, "audit", keep)?)))
        .logger(Logger::builder().appender("audit").additive(false).build(AUDIT_TARGET, lvl))
        .build(Root::builder().appender("app").build(lvl))
        .map_err(|e| DbError::Config(e.to_string()))?;
    if log4rs::init_config(config).is_err() {
        log::debug!("logger already initialised; keeping existing configuration");
    }
    Ok(())
}

/// # Errors
/// See [`configure_logging`].
pub fn init_from_config(cfg: &LogConfig) -> Result<(), DbError> {
    configure_logging(cfg.dir.as_deref(), cfg.level.as_deref(), cfg.retention)
}

/// Configure logging from environment variables if present:
/// - NEXUS_BRIDGE_LOG_DIR
/// - NEXUS_BRIDGE_LOG_LEVEL
/// - NEXUS_BRIDGE_LOG_RETENTION
///
/// Without `NEXUS_BRIDGE_LOG_DIR` no log files are written. Returns whether
/// file logging was configured.
///
/// # Errors
/// See [`configure_logging`].
pub fn configure_from_env() -> Result<bool, DbError> {
    configure_from_env_with(|k| std::env::var(k).ok())
}

/// Same as [`configure_from_env`] with a caller-supplied environment.
///
/// # Errors
/// See [`configure_logging`].
pub fn configure_from_env_with(env: impl Fn(&str) -> Option<String>) -> Result<bool, DbError> {
    let Some(dir) = env("NEXUS_BRIDGE_LOG_DIR").map(PathBuf::from) else {
        return Ok(false);
    };
    let level = env("NEXUS_BRIDGE_LOG_LEVEL");
    let retention = env("NEXUS_BRIDGE_LOG_RETENTION").and_then(|s| s.parse::<usize>().ok());
    configure_logging(Some(&dir), level.as_deref(), retention)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_default_to_info() {
        assert_eq!(parse_level(None), LevelFilter::Info);
        assert_eq!(parse_level(Some("DEBUG")), LevelFilter::Debug);
        assert_eq!(parse_level(Some("nonsense")), LevelFilter::Info);
    }

    #[test]
    fn env_without_directory_writes_no_files() {
        assert!(!configure_from_env_with(|k| match k {
            "NEXUS_BRIDGE_LOG_LEVEL" => Some("debug".into()),
            _ => None,
        })
        .unwrap());
    }
}
