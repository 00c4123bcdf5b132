use bson::doc;
use nexus_bridge::config::BridgeConfig;
use nexus_bridge::engine::{Engine, RetryPolicy, WriteOutcome};
use nexus_bridge::errors::DbError;
use nexus_bridge::query::{Filter, parse_filter_json};
use nexus_bridge::schema::StaticSchema;
use nexus_bridge::store::{
    DocumentStore, IndexSpec, MemoryStore, NativeFind, StoreResult, StoreSession,
};
use nexus_bridge::types::{DocumentKey, StoredDocument, VersionToken};
use nexus_bridge::update::{UpdateDoc, parse_update_json};
use std::sync::{Arc, Barrier};
use std::time::Duration;

fn update(json: &str) -> UpdateDoc {
    parse_update_json(json).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_updates_one_done_one_retry() {
    let (engine, store) = nexus_bridge::in_memory(BridgeConfig::default(), Arc::new(StaticSchema::new()));
    let engine = Arc::new(engine);
    engine.insert("Game", doc! { "name": "x" }).unwrap();
    store.set_read_gate(Arc::new(Barrier::new(2)), 2);

    let filter = parse_filter_json(r#"{"name":"x"}"#).unwrap();
    let (e1, f1) = (engine.clone(), filter.clone());
    let (e2, f2) = (engine.clone(), filter.clone());
    let a = tokio::task::spawn_blocking(move || e1.update_one("Game", &f1, &update(r#"{"a":1}"#)));
    let b = tokio::task::spawn_blocking(move || e2.update_one("Game", &f2, &update(r#"{"b":2}"#)));
    let ra = a.await.unwrap().unwrap();
    let rb = b.await.unwrap().unwrap();

    let done = [&ra, &rb].iter().filter(|o| matches!(o, WriteOutcome::Done(_))).count();
    let retry = [&ra, &rb].iter().filter(|o| o.is_retry()).count();
    assert_eq!((done, retry), (1, 1));

    // The loser re-runs the whole cycle and both disjoint fields survive.
    let loser = if ra.is_retry() { r#"{"a":1}"# } else { r#"{"b":2}"# };
    assert!(matches!(engine.update_one("Game", &filter, &update(loser)).unwrap(), WriteOutcome::Done(_)));
    let docs = store.documents("Game");
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].content.get_i32("a").unwrap(), 1);
    assert_eq!(docs[0].content.get_i32("b").unwrap(), 2);
    assert_eq!(store.open_sessions(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn retrying_callers_lose_no_increments() {
    let (engine, store) = nexus_bridge::in_memory(BridgeConfig::default(), Arc::new(StaticSchema::new()));
    let engine = Arc::new(engine);
    engine.insert("Counter", doc! { "name": "hits", "n": 0 }).unwrap();
    let filter = parse_filter_json(r#"{"name":"hits"}"#).unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let (e, f) = (engine.clone(), filter.clone());
        tasks.push(tokio::task::spawn_blocking(move || {
            for _ in 0..10 {
                e.update_with_retry("Counter", &f, &update(r#"{"$inc":{"n":1}}"#), &RetryPolicy::unbounded())
                    .unwrap();
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }
    assert_eq!(store.documents("Counter")[0].content.get_i32("n").unwrap(), 80);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn field_removal_races_with_updates() {
    let (engine, store) = nexus_bridge::in_memory(BridgeConfig::default(), Arc::new(StaticSchema::new()));
    let engine = Arc::new(engine);
    for i in 0..40 {
        engine.insert("Game", doc! { "i": i, "tmp": true, "n": 0 }).unwrap();
    }
    let writer = {
        let e = engine.clone();
        tokio::task::spawn_blocking(move || {
            for i in 0..40 {
                let f = parse_filter_json(&format!(r#"{{"i":{i}}}"#)).unwrap();
                e.update_with_retry("Game", &f, &update(r#"{"$inc":{"n":1}}"#), &RetryPolicy::unbounded())
                    .unwrap();
            }
        })
    };
    let remover = {
        let e = engine.clone();
        tokio::task::spawn_blocking(move || e.remove_field("Game", "tmp"))
    };
    writer.await.unwrap();
    let report = remover.await.unwrap().unwrap();
    assert_eq!(report.modified, 40);
    for d in store.documents("Game") {
        assert!(!d.content.contains_key("tmp"));
        assert_eq!(d.content.get_i32("n").unwrap(), 1);
    }
}

/// Store whose conditional writes always see a newer version.
struct StaleStore {
    inner: MemoryStore,
}

struct StaleSession<'a> {
    inner: Box<dyn StoreSession + 'a>,
}

impl DocumentStore for StaleStore {
    fn connect(&self) -> StoreResult<Box<dyn StoreSession + '_>> {
        Ok(Box::new(StaleSession { inner: self.inner.connect()? }))
    }
}

impl StoreSession for StaleSession<'_> {
    fn insert(&mut self, collection: &str, content: bson::Document) -> StoreResult<StoredDocument> {
        self.inner.insert(collection, content)
    }

    fn find(&mut self, collection: &str, request: &NativeFind) -> StoreResult<Vec<StoredDocument>> {
        self.inner.find(collection, request)
    }

    fn replace_if_version(
        &mut self,
        _collection: &str,
        _key: &DocumentKey,
        _version: &VersionToken,
        _content: bson::Document,
    ) -> StoreResult<bool> {
        Ok(false)
    }

    fn remove_if_version(&mut self, _: &str, _: &DocumentKey, _: &VersionToken) -> StoreResult<bool> {
        Ok(false)
    }

    fn create_index(&mut self, collection: &str, spec: &IndexSpec) -> StoreResult<()> {
        self.inner.create_index(collection, spec)
    }

    fn drop_index(&mut self, collection: &str, name: &str) -> StoreResult<()> {
        self.inner.drop_index(collection, name)
    }

    fn list_indexes(&mut self, collection: &str) -> StoreResult<Vec<IndexSpec>> {
        self.inner.list_indexes(collection)
    }
}

fn stale_engine() -> Engine {
    let mut cfg = BridgeConfig::default();
    cfg.field_removal.max_rounds = 3;
    let store = Arc::new(StaleStore { inner: MemoryStore::default() });
    let engine = Engine::new(store, Arc::new(StaticSchema::new()), cfg);
    engine.insert("Game", doc! { "name": "x", "tmp": 1 }).unwrap();
    engine
}

#[test]
fn bounded_retry_gives_up_with_conflict() {
    let engine = stale_engine();
    let f = parse_filter_json(r#"{"name":"x"}"#).unwrap();
    assert_eq!(engine.update_one("Game", &f, &update(r#"{"a":1}"#)).unwrap(), WriteOutcome::Retry);
    let policy = RetryPolicy::new(3, Duration::from_millis(1));
    let err = engine.update_with_retry("Game", &f, &update(r#"{"a":1}"#), &policy).unwrap_err();
    assert!(matches!(err, DbError::VersionConflict { .. }));
    assert!(err.is_retryable());
    assert!(engine.upsert_with_retry("Game", &f, &update(r#"{"a":1}"#), &policy).is_err());
}

#[test]
fn multi_document_loops_are_bounded_by_rounds() {
    let engine = stale_engine();
    assert!(matches!(engine.remove_field("Game", "tmp"), Err(DbError::VersionConflict { .. })));
    assert!(matches!(engine.delete_many("Game", &Filter::True), Err(DbError::VersionConflict { .. })));
    assert_eq!(engine.delete_one("Game", &Filter::True).unwrap(), WriteOutcome::Retry);
}
