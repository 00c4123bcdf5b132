pub mod cli;
pub mod config;
pub mod document;
pub mod engine;
pub mod errors;
pub mod logger;
pub mod query;
pub mod schema;
pub mod store;
pub mod types;
pub mod update;

use crate::config::BridgeConfig;
use crate::engine::Engine;
use crate::errors::DbError;
use crate::schema::SchemaLookup;
use crate::store::MemoryStore;
use std::path::Path;
use std::sync::Arc;

/// Loads configuration (see [`BridgeConfig::load`]) and configures logging from it.
/// Environment logging variables take over when the config names no log directory;
/// with neither, no log files are written.
///
/// # Errors
/// Returns an error if the configuration cannot be loaded or logging cannot be set up.
pub fn init(config_path: Option<&Path>) -> Result<BridgeConfig, DbError> {
    let cfg = BridgeConfig::load(config_path)?;
    if cfg.log.dir.is_some() {
        logger::init_from_config(&cfg.log)?;
    } else {
        if !logger::configure_from_env()? {
            log::debug!("no log directory configured; file logging disabled");
        }
    }
    Ok(cfg)
}

/// Builds an engine over a fresh [`MemoryStore`] sized from `config.store`.
/// The store handle is returned too, for inspection.
pub fn in_memory(config: BridgeConfig, schema: Arc<dyn SchemaLookup>) -> (Engine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new(config.store.max_sessions));
    let engine = Engine::new(store.clone(), schema, config);
    (engine, store)
}
