//! Bridge configuration, loaded from TOML with environment overrides.

use crate::errors::DbError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "NEXUS_BRIDGE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "nexus-bridge.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts made by `update_with_retry`/`upsert_with_retry`, the first one included.
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 5, backoff_ms: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldRemovalConfig {
    /// Upper bound on retry rounds before a field removal gives up with a conflict.
    pub max_rounds: u32,
    /// Worker threads used per round.
    pub parallelism: usize,
}

impl Default for FieldRemovalConfig {
    fn default() -> Self {
        Self { max_rounds: 64, parallelism: 4 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub max_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { max_limit: 10_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub max_sessions: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { max_sessions: 16 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub dir: Option<PathBuf>,
    pub level: Option<String>,
    pub retention: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub retry: RetryConfig,
    pub field_removal: FieldRemovalConfig,
    pub query: QueryConfig,
    pub store: StoreConfig,
    pub log: LogConfig,
}

impl BridgeConfig {
    /// # Errors
    /// Returns `DbError::Config` if the text is not valid TOML for this shape.
    pub fn from_toml_str(s: &str) -> Result<Self, DbError> {
        toml::from_str(s).map_err(|e| DbError::Config(e.to_string()))
    }

    /// # Errors
    /// Returns `DbError::Io` if the file cannot be read, `DbError::Config` if it cannot be parsed.
    pub fn from_file(path: &Path) -> Result<Self, DbError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DbError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Precedence: explicit path > `NEXUS_BRIDGE_CONFIG` > `./nexus-bridge.toml` > defaults,
    /// then `NEXUS_BRIDGE_MAX_RETRIES` and `NEXUS_BRIDGE_BACKOFF_MS` on top.
    ///
    /// # Errors
    /// An explicit path that does not exist, or any selected file that fails to parse.
    pub fn load(explicit: Option<&Path>) -> Result<Self, DbError> {
        Self::load_with(explicit, |k| std::env::var(k).ok())
    }

    /// Same as [`BridgeConfig::load`] with a caller-supplied environment.
    ///
    /// # Errors
    /// See [`BridgeConfig::load`].
    pub fn load_with(
        explicit: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, DbError> {
        if let Some(p) = explicit
            && !p.exists()
        {
            return Err(DbError::Config(format!("config file not found: {}", p.display())));
        }
        let mut candidates: Vec<PathBuf> = Vec::new();
        candidates.extend(explicit.map(Path::to_path_buf));
        candidates.extend(env(CONFIG_ENV).map(PathBuf::from));
        if let Ok(cur) = std::env::current_dir() {
            candidates.push(cur.join(DEFAULT_CONFIG_FILE));
        }
        let mut cfg = match candidates.iter().find(|p| p.exists()) {
            Some(p) => {
                log::debug!("loading config from {}", p.display());
                Self::from_file(p)?
            }
            None => Self::default(),
        };
        cfg.apply_env(env);
        Ok(cfg)
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(n) = env("NEXUS_BRIDGE_MAX_RETRIES").and_then(|s| s.parse::<u32>().ok()) {
            self.retry.max_attempts = n;
        }
        if let Some(ms) = env("NEXUS_BRIDGE_BACKOFF_MS").and_then(|s| s.parse::<u64>().ok()) {
            self.retry.backoff_ms = ms;
        }
    }
}
