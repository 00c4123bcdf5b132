//! In-process [`DocumentStore`] with the native engine's quirks.
//!
//! Used by the CLI and by tests. Besides storage it exposes a few hooks for
//! exercising the engine: a session gauge, one-shot failure injection and a
//! read gate that parks readers on a barrier.

use super::native_eval::{native_matches, validate};
use super::{
    DocumentStore, IndexSpec, NativeFind, StoreError, StoreResult, StoreSession, UNIQUE_VIOLATION,
};
use crate::document::{bson_equal, get_path, to_f64};
use crate::types::{DocumentKey, StoredDocument, VersionToken};
use bson::{Bson, Document as BsonDocument};
use parking_lot::{Mutex, RwLock};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Barrier};

/// Where an injected failure fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Connect,
    Find,
    Insert,
    Replace,
    Remove,
}

#[derive(Default)]
struct MemCollection {
    docs: Vec<StoredDocument>,
    indexes: Vec<IndexSpec>,
}

struct ReadGate {
    barrier: Arc<Barrier>,
    remaining: usize,
}

pub struct MemoryStore {
    collections: RwLock<HashMap<String, MemCollection>>,
    max_sessions: usize,
    open: AtomicUsize,
    requests: AtomicUsize,
    failures: Mutex<Vec<(FailPoint, StoreError)>>,
    read_gate: Mutex<Option<ReadGate>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(16)
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new(max_sessions: usize) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
            open: AtomicUsize::new(0),
            requests: AtomicUsize::new(0),
            failures: Mutex::new(Vec::new()),
            read_gate: Mutex::new(None),
        }
    }

    /// Sessions currently checked out.
    pub fn open_sessions(&self) -> usize {
        self.open.load(AtomicOrdering::SeqCst)
    }

    /// Number of session operations served so far, connects excluded.
    pub fn requests(&self) -> usize {
        self.requests.load(AtomicOrdering::SeqCst)
    }

    /// Arms a one-shot failure: the next operation at `point` returns `error`.
    pub fn inject_failure(&self, point: FailPoint, error: StoreError) {
        self.failures.lock().push((point, error));
    }

    /// The next `reads` finds each wait on `barrier` after reading and before returning.
    pub fn set_read_gate(&self, barrier: Arc<Barrier>, reads: usize) {
        *self.read_gate.lock() = Some(ReadGate { barrier, remaining: reads });
    }

    pub fn clear_read_gate(&self) {
        *self.read_gate.lock() = None;
    }

    /// Snapshot of a collection in insertion order.
    pub fn documents(&self, collection: &str) -> Vec<StoredDocument> {
        self.collections.read().get(collection).map(|c| c.docs.clone()).unwrap_or_default()
    }

    fn take_failure(&self, point: FailPoint) -> StoreResult<()> {
        let mut failures = self.failures.lock();
        if let Some(pos) = failures.iter().position(|(p, _)| *p == point) {
            let (_, err) = failures.remove(pos);
            return Err(err);
        }
        Ok(())
    }

    fn pass_read_gate(&self) {
        let barrier = {
            let mut gate = self.read_gate.lock();
            let Some(g) = gate.as_mut() else { return };
            let barrier = g.barrier.clone();
            g.remaining = g.remaining.saturating_sub(1);
            if g.remaining == 0 {
                *gate = None;
            }
            barrier
        };
        barrier.wait();
    }
}

impl DocumentStore for MemoryStore {
    fn connect(&self) -> StoreResult<Box<dyn StoreSession + '_>> {
        self.take_failure(FailPoint::Connect)?;
        let prev = self.open.fetch_add(1, AtomicOrdering::SeqCst);
        if prev >= self.max_sessions {
            self.open.fetch_sub(1, AtomicOrdering::SeqCst);
            return Err(StoreError::new(format!("session limit reached ({})", self.max_sessions)));
        }
        Ok(Box::new(MemorySession { store: self }))
    }
}

struct MemorySession<'a> {
    store: &'a MemoryStore,
}

impl Drop for MemorySession<'_> {
    fn drop(&mut self) {
        self.store.open.fetch_sub(1, AtomicOrdering::SeqCst);
    }
}

impl MemorySession<'_> {
    fn begin(&self, point: Option<FailPoint>) -> StoreResult<()> {
        self.store.requests.fetch_add(1, AtomicOrdering::SeqCst);
        match point {
            Some(p) => self.store.take_failure(p),
            None => Ok(()),
        }
    }
}

impl StoreSession for MemorySession<'_> {
    fn insert(&mut self, collection: &str, content: BsonDocument) -> StoreResult<StoredDocument> {
        self.begin(Some(FailPoint::Insert))?;
        let mut cols = self.store.collections.write();
        let col = cols.entry(collection.to_string()).or_default();
        let key = DocumentKey::generate();
        check_unique(col, &key, &content)?;
        let stored = StoredDocument { key, version: VersionToken::generate(), content };
        col.docs.push(stored.clone());
        Ok(stored)
    }

    fn find(&mut self, collection: &str, request: &NativeFind) -> StoreResult<Vec<StoredDocument>> {
        self.begin(Some(FailPoint::Find))?;
        let (query, orderby) = unwrap_orderby(request.filter.as_document())?;
        validate(query)?;
        let mut out: Vec<StoredDocument> = {
            let cols = self.store.collections.read();
            cols.get(collection)
                .map(|c| c.docs.iter().filter(|d| native_matches(&d.content, query)).cloned().collect())
                .unwrap_or_default()
        };
        if !orderby.is_empty() {
            out.sort_by(|a, b| compare_ordered(&a.content, &b.content, &orderby));
        }
        let skip = request.skip.unwrap_or(0);
        let limit = request.limit.unwrap_or(usize::MAX);
        let out: Vec<StoredDocument> = out.into_iter().skip(skip).take(limit).collect();
        self.store.pass_read_gate();
        Ok(out)
    }

    fn replace_if_version(
        &mut self,
        collection: &str,
        key: &DocumentKey,
        version: &VersionToken,
        content: BsonDocument,
    ) -> StoreResult<bool> {
        self.begin(Some(FailPoint::Replace))?;
        let mut cols = self.store.collections.write();
        let Some(col) = cols.get_mut(collection) else { return Ok(false) };
        let Some(pos) = col.docs.iter().position(|d| &d.key == key && &d.version == version) else {
            return Ok(false);
        };
        check_unique(col, key, &content)?;
        let slot = &mut col.docs[pos];
        slot.content = content;
        slot.version = VersionToken::generate();
        Ok(true)
    }

    fn remove_if_version(
        &mut self,
        collection: &str,
        key: &DocumentKey,
        version: &VersionToken,
    ) -> StoreResult<bool> {
        self.begin(Some(FailPoint::Remove))?;
        let mut cols = self.store.collections.write();
        let Some(col) = cols.get_mut(collection) else { return Ok(false) };
        let before = col.docs.len();
        col.docs.retain(|d| !(&d.key == key && &d.version == version));
        Ok(col.docs.len() < before)
    }

    fn create_index(&mut self, collection: &str, spec: &IndexSpec) -> StoreResult<()> {
        self.begin(None)?;
        let mut cols = self.store.collections.write();
        let col = cols.entry(collection.to_string()).or_default();
        if let Some(existing) = col.indexes.iter().find(|i| i.name == spec.name) {
            if existing == spec {
                return Ok(());
            }
            return Err(StoreError::new(format!("index {} already exists with a different definition", spec.name)));
        }
        if spec.unique {
            for (i, a) in col.docs.iter().enumerate() {
                for b in &col.docs[i + 1..] {
                    if let Some(values) = unique_values(spec, &a.content)
                        && unique_values(spec, &b.content).is_some_and(|other| same_values(&values, &other))
                    {
                        return Err(unique_violation(spec, &values));
                    }
                }
            }
        }
        col.indexes.push(spec.clone());
        Ok(())
    }

    fn drop_index(&mut self, collection: &str, name: &str) -> StoreResult<()> {
        self.begin(None)?;
        let mut cols = self.store.collections.write();
        let col = cols.get_mut(collection).ok_or_else(|| StoreError::new(format!("index {name} not found")))?;
        let before = col.indexes.len();
        col.indexes.retain(|i| i.name != name);
        if col.indexes.len() == before {
            return Err(StoreError::new(format!("index {name} not found")));
        }
        Ok(())
    }

    fn list_indexes(&mut self, collection: &str) -> StoreResult<Vec<IndexSpec>> {
        self.begin(None)?;
        Ok(self.store.collections.read().get(collection).map(|c| c.indexes.clone()).unwrap_or_default())
    }
}

struct OrderKey {
    path: String,
    numeric: bool,
    descending: bool,
}

/// Splits `{$query, $orderby}` into its parts; a bare filter has no ordering.
fn unwrap_orderby(filter: &BsonDocument) -> StoreResult<(&BsonDocument, Vec<OrderKey>)> {
    let Some(query) = filter.get("$query") else {
        if filter.contains_key("$orderby") {
            return Err(StoreError::new("malformed filter: $orderby without $query"));
        }
        return Ok((filter, Vec::new()));
    };
    let Bson::Document(query) = query else {
        return Err(StoreError::new("malformed filter: $query must be an object"));
    };
    let mut keys = Vec::new();
    if let Some(Bson::Array(items)) = filter.get("$orderby") {
        for item in items {
            let Bson::Document(spec) = item else {
                return Err(StoreError::new("malformed filter: $orderby entries must be objects"));
            };
            let path = spec
                .get_str("path")
                .map_err(|_| StoreError::new("malformed filter: $orderby entry without path"))?;
            keys.push(OrderKey {
                path: path.to_string(),
                numeric: spec.get_str("datatype").is_ok_and(|d| d == "number"),
                descending: spec.get_str("order").is_ok_and(|o| o == "desc"),
            });
        }
    }
    Ok((query, keys))
}

/// Missing values sort first. String ordering compares the textual form, so
/// numbers sorted as strings order lexically.
fn compare_ordered(a: &BsonDocument, b: &BsonDocument, keys: &[OrderKey]) -> Ordering {
    for key in keys {
        let (va, vb) = (get_path(a, &key.path), get_path(b, &key.path));
        let ord = if key.numeric {
            let fa = va.and_then(to_f64);
            let fb = vb.and_then(to_f64);
            match (fa, fb) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                (x, y) => x.is_some().cmp(&y.is_some()),
            }
        } else {
            va.map(text_of).cmp(&vb.map(text_of))
        };
        let ord = if key.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn text_of(v: &Bson) -> String {
    match v {
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Values of the indexed fields, or `None` when any of them is absent or null.
fn unique_values(spec: &IndexSpec, content: &BsonDocument) -> Option<Vec<Bson>> {
    spec.fields
        .iter()
        .map(|f| match get_path(content, f) {
            None | Some(Bson::Null) => None,
            Some(v) => Some(v.clone()),
        })
        .collect()
}

fn same_values(a: &[Bson], b: &[Bson]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| bson_equal(x, y))
}

fn check_unique(col: &MemCollection, key: &DocumentKey, content: &BsonDocument) -> StoreResult<()> {
    for spec in col.indexes.iter().filter(|i| i.unique) {
        let Some(values) = unique_values(spec, content) else { continue };
        let clash = col
            .docs
            .iter()
            .filter(|d| &d.key != key)
            .any(|d| unique_values(spec, &d.content).is_some_and(|other| same_values(&values, &other)));
        if clash {
            return Err(unique_violation(spec, &values));
        }
    }
    Ok(())
}

fn unique_violation(spec: &IndexSpec, values: &[Bson]) -> StoreError {
    let values: Vec<String> = values.iter().map(text_of).collect();
    StoreError::with_code(
        UNIQUE_VIOLATION,
        format!(
            "duplicate key value violates unique constraint \"{}\"; Key ({})=({}) already exists.",
            spec.name,
            spec.fields.join(", "),
            values.join(", ")
        ),
    )
}
