//! Optimistic write engine.
//!
//! Every operation follows read, transform, conditional write. A write addressed
//! by a stale `(key, version)` reports [`WriteOutcome::Retry`] instead of
//! overwriting. Sessions are taken per request and released before returning,
//! so none is ever held across a retry.

mod read;
mod removal;
mod types;
mod write;

pub use types::{DeleteReport, FieldRemovalReport, RetryPolicy, WriteOutcome};

use crate::config::BridgeConfig;
use crate::errors::DbError;
use crate::query::NativeFilter;
use crate::schema::SchemaLookup;
use crate::store::{DocumentStore, IndexSpec, StoreError, StoreSession};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-collection state reused across operations: the index-metadata cache.
pub struct CollectionHandle {
    name: String,
    indexes: RwLock<Option<Arc<Vec<IndexSpec>>>>,
    index_lock: Mutex<()>,
}

impl CollectionHandle {
    fn new(name: &str) -> Self {
        Self { name: name.to_string(), indexes: RwLock::new(None), index_lock: Mutex::new(()) }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cached index list if it has been loaded.
    #[must_use]
    pub fn cached_indexes(&self) -> Option<Arc<Vec<IndexSpec>>> {
        self.indexes.read().clone()
    }
}

/// Context object shared by all callers of one store.
pub struct Engine {
    store: Arc<dyn DocumentStore>,
    schema: Arc<dyn SchemaLookup>,
    config: BridgeConfig,
    collections: RwLock<HashMap<String, Arc<CollectionHandle>>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("collections", &self.collections.read().len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        schema: Arc<dyn SchemaLookup>,
        config: BridgeConfig,
    ) -> Self {
        Self { store, schema, config, collections: RwLock::new(HashMap::new()) }
    }

    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Retry policy taken from the `[retry]` config section.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.config.retry)
    }

    /// Returns the handle for `name`, creating it on first use.
    pub fn collection(&self, name: &str) -> Arc<CollectionHandle> {
        if let Some(h) = self.collections.read().get(name) {
            return h.clone();
        }
        self.collections
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CollectionHandle::new(name)))
            .clone()
    }

    pub(crate) fn session(
        &self,
        op: &'static str,
        collection: &str,
    ) -> Result<Box<dyn StoreSession + '_>, DbError> {
        self.store.connect().map_err(|e| classify(op, collection, None, e))
    }

    /// Index list for `collection`, loaded from the store on first use.
    ///
    /// # Errors
    /// Propagates store failures from the initial load.
    pub fn indexes(&self, collection: &str) -> Result<Arc<Vec<IndexSpec>>, DbError> {
        let handle = self.collection(collection);
        if let Some(list) = handle.cached_indexes() {
            return Ok(list);
        }
        let _guard = handle.index_lock.lock();
        if let Some(list) = handle.cached_indexes() {
            return Ok(list);
        }
        let loaded = Arc::new(self.load_indexes(collection)?);
        *handle.indexes.write() = Some(loaded.clone());
        Ok(loaded)
    }

    fn load_indexes(&self, collection: &str) -> Result<Vec<IndexSpec>, DbError> {
        let mut session = self.session("list_indexes", collection)?;
        session.list_indexes(collection).map_err(|e| classify("list_indexes", collection, None, e))
    }

    /// # Errors
    /// `DuplicateValue` when a unique index cannot be built over existing data,
    /// otherwise the store failure.
    pub fn create_index(&self, collection: &str, spec: &IndexSpec) -> Result<(), DbError> {
        let handle = self.collection(collection);
        let _guard = handle.index_lock.lock();
        let mut current = match handle.cached_indexes() {
            Some(list) => (*list).clone(),
            None => self.load_indexes(collection)?,
        };
        {
            let mut session = self.session("create_index", collection)?;
            session
                .create_index(collection, spec)
                .map_err(|e| classify("create_index", collection, None, e))?;
        }
        current.retain(|i| i.name != spec.name);
        current.push(spec.clone());
        *handle.indexes.write() = Some(Arc::new(current));
        log::info!(target: crate::logger::AUDIT_TARGET, "create_index collection={collection} name={}", spec.name);
        Ok(())
    }

    /// # Errors
    /// Propagates store failures, including an unknown index name.
    pub fn drop_index(&self, collection: &str, name: &str) -> Result<(), DbError> {
        let handle = self.collection(collection);
        let _guard = handle.index_lock.lock();
        let mut current = match handle.cached_indexes() {
            Some(list) => (*list).clone(),
            None => self.load_indexes(collection)?,
        };
        {
            let mut session = self.session("drop_index", collection)?;
            session.drop_index(collection, name).map_err(|e| classify("drop_index", collection, None, e))?;
        }
        current.retain(|i| i.name != name);
        *handle.indexes.write() = Some(Arc::new(current));
        log::info!(target: crate::logger::AUDIT_TARGET, "drop_index collection={collection} name={name}");
        Ok(())
    }
}

/// Maps a store failure onto the crate taxonomy. Unique violations become
/// `DuplicateValue`; everything else is logged with its context and wrapped.
pub(crate) fn classify(
    op: &'static str,
    collection: &str,
    filter: Option<&NativeFilter>,
    err: StoreError,
) -> DbError {
    if err.is_unique_violation() {
        return DbError::DuplicateValue { collection: collection.to_string(), field: err.duplicate_field() };
    }
    log::error!(
        "store failure op={op} collection={collection} filter_shape=[{}]: {err}",
        filter.map(NativeFilter::shape).unwrap_or_default()
    );
    DbError::Store { op, message: err.message }
}
