use super::{DeleteReport, Engine, RetryPolicy, WriteOutcome, classify};
use crate::document::set_path;
use crate::errors::DbError;
use crate::logger::AUDIT_TARGET;
use crate::query::Filter;
use crate::types::StoredDocument;
use crate::update::{UpdateDoc, apply_update};
use bson::Document as BsonDocument;

impl Engine {
    /// # Errors
    /// `DuplicateValue` on a uniqueness violation, `Store` for any other store failure.
    pub fn insert(&self, collection: &str, content: BsonDocument) -> Result<StoredDocument, DbError> {
        let mut session = self.session("insert", collection)?;
        let stored = session.insert(collection, content).map_err(|e| classify("insert", collection, None, e))?;
        log::info!(target: AUDIT_TARGET, "insert collection={collection} key={}", stored.key);
        Ok(stored)
    }

    /// Reads the first match, applies `update` and replaces it conditionally on its version.
    /// Never loops: a lost race is reported as [`WriteOutcome::Retry`].
    ///
    /// # Errors
    /// `Translation` for an untranslatable filter or an update that does not fit
    /// the stored content, `DuplicateValue`/`Store` from the store.
    pub fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &UpdateDoc,
    ) -> Result<WriteOutcome, DbError> {
        let prepared = self.prepare(collection, filter, None)?;
        if prepared.translation.is_no_match() {
            return Ok(WriteOutcome::NotFound);
        }
        let mut session = self.session("update", collection)?;
        let Some(current) = self
            .fetch(session.as_mut(), "update", collection, &prepared, None, Some(1), None)?
            .into_iter()
            .next()
        else {
            return Ok(WriteOutcome::NotFound);
        };
        let next = apply_update(&current.content, update)?;
        let replaced = session
            .replace_if_version(collection, &current.key, &current.version, next.clone())
            .map_err(|e| classify("update", collection, prepared.native().as_ref(), e))?;
        if !replaced {
            log::warn!("version conflict updating {collection}/{}", current.key);
            return Ok(WriteOutcome::Retry);
        }
        log::info!(target: AUDIT_TARGET, "replace collection={collection} key={}", current.key);
        Ok(WriteOutcome::Done(next))
    }

    /// Like [`Engine::update_one`], but inserts when nothing matches. The inserted
    /// content is the filter's literal fields with `update` applied on top.
    ///
    /// # Errors
    /// See [`Engine::update_one`] and [`Engine::insert`].
    pub fn upsert_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &UpdateDoc,
    ) -> Result<WriteOutcome, DbError> {
        match self.update_one(collection, filter, update)? {
            WriteOutcome::NotFound => {
                let mut seed = BsonDocument::new();
                for (path, value) in filter.literal_fields() {
                    if !set_path(&mut seed, &path, value) {
                        return Err(DbError::Translation(format!("cannot seed upsert field {path}")));
                    }
                }
                let content = apply_update(&seed, update)?;
                let stored = self.insert(collection, content)?;
                Ok(WriteOutcome::Done(stored.content))
            }
            other => Ok(other),
        }
    }

    /// Removes the first match if its version is still current.
    ///
    /// # Errors
    /// `Translation` for an untranslatable filter, `Store` for store failures.
    pub fn delete_one(&self, collection: &str, filter: &Filter) -> Result<WriteOutcome, DbError> {
        let prepared = self.prepare(collection, filter, None)?;
        if prepared.translation.is_no_match() {
            return Ok(WriteOutcome::NotFound);
        }
        let mut session = self.session("delete", collection)?;
        let Some(current) = self
            .fetch(session.as_mut(), "delete", collection, &prepared, None, Some(1), None)?
            .into_iter()
            .next()
        else {
            return Ok(WriteOutcome::NotFound);
        };
        let removed = session
            .remove_if_version(collection, &current.key, &current.version)
            .map_err(|e| classify("delete", collection, prepared.native().as_ref(), e))?;
        if !removed {
            log::warn!("version conflict deleting {collection}/{}", current.key);
            return Ok(WriteOutcome::Retry);
        }
        log::info!(target: AUDIT_TARGET, "delete collection={collection} key={}", current.key);
        Ok(WriteOutcome::Done(current.content))
    }

    /// Deletes every match. Documents whose version moved between read and delete
    /// are re-read and retried, for at most `field_removal.max_rounds` rounds.
    ///
    /// # Errors
    /// `VersionConflict` when conflicts persist past the round limit.
    pub fn delete_many(&self, collection: &str, filter: &Filter) -> Result<DeleteReport, DbError> {
        let prepared = self.prepare(collection, filter, None)?;
        let mut report = DeleteReport::default();
        if prepared.translation.is_no_match() {
            return Ok(report);
        }
        for _ in 0..self.config.field_removal.max_rounds.max(1) {
            let mut session = self.session("delete_many", collection)?;
            let docs = self.fetch(session.as_mut(), "delete_many", collection, &prepared, None, None, None)?;
            let mut conflicts = 0usize;
            for doc in &docs {
                let removed = session
                    .remove_if_version(collection, &doc.key, &doc.version)
                    .map_err(|e| classify("delete_many", collection, prepared.native().as_ref(), e))?;
                if removed {
                    report.deleted += 1;
                    log::info!(target: AUDIT_TARGET, "delete collection={collection} key={}", doc.key);
                } else {
                    conflicts += 1;
                }
            }
            if conflicts == 0 {
                return Ok(report);
            }
            log::warn!("delete_many {collection}: {conflicts} version conflicts, re-reading");
        }
        Err(DbError::VersionConflict { collection: collection.to_string() })
    }

    /// Re-runs [`Engine::update_one`] while it reports `Retry`, within `policy`.
    /// `Ok(None)` when nothing matched.
    ///
    /// # Errors
    /// `VersionConflict` once the attempts are used up; other errors immediately.
    pub fn update_with_retry(
        &self,
        collection: &str,
        filter: &Filter,
        update: &UpdateDoc,
        policy: &RetryPolicy,
    ) -> Result<Option<BsonDocument>, DbError> {
        Self::retry_loop(collection, policy, || self.update_one(collection, filter, update))
    }

    /// # Errors
    /// See [`Engine::update_with_retry`].
    pub fn upsert_with_retry(
        &self,
        collection: &str,
        filter: &Filter,
        update: &UpdateDoc,
        policy: &RetryPolicy,
    ) -> Result<BsonDocument, DbError> {
        Self::retry_loop(collection, policy, || self.upsert_one(collection, filter, update))?
            .ok_or_else(|| DbError::NotFound(format!("upsert into {collection} produced no document")))
    }

    fn retry_loop(
        collection: &str,
        policy: &RetryPolicy,
        mut attempt_once: impl FnMut() -> Result<WriteOutcome, DbError>,
    ) -> Result<Option<BsonDocument>, DbError> {
        let mut attempt = 0u32;
        while policy.allows(attempt) {
            attempt = attempt.saturating_add(1);
            match attempt_once()? {
                WriteOutcome::Done(doc) => return Ok(Some(doc)),
                WriteOutcome::NotFound => return Ok(None),
                WriteOutcome::Retry => {
                    if !policy.backoff.is_zero() {
                        std::thread::sleep(policy.backoff);
                    }
                }
            }
        }
        log::warn!("{collection}: giving up after {attempt} conflicting attempts");
        Err(DbError::VersionConflict { collection: collection.to_string() })
    }
}
