use super::{Engine, FieldRemovalReport, classify};
use crate::document::unset_path;
use crate::errors::DbError;
use crate::logger::AUDIT_TARGET;
use crate::query::{Filter, PreparedQuery};
use crate::types::StoredDocument;

#[derive(Default)]
struct RoundTally {
    modified: usize,
    conflicts: usize,
}

impl Engine {
    /// Removes `field` from every document that has it.
    ///
    /// Each round reads the affected documents and rewrites them concurrently,
    /// one session per worker. Documents that lost a version race are picked up
    /// again by the next round's read.
    ///
    /// # Errors
    /// `VersionConflict` if conflicts remain after `field_removal.max_rounds`
    /// rounds; the first store failure of any worker otherwise.
    pub fn remove_field(&self, collection: &str, field: &str) -> Result<FieldRemovalReport, DbError> {
        let filter = Filter::Exists { path: field.to_string(), exists: true };
        let prepared = self.prepare(collection, &filter, None)?;
        let mut report = FieldRemovalReport::default();
        while report.rounds < self.config.field_removal.max_rounds.max(1) {
            report.rounds += 1;
            let docs = {
                let mut session = self.session("remove_field", collection)?;
                self.fetch(session.as_mut(), "remove_field", collection, &prepared, None, None, None)?
            };
            if docs.is_empty() {
                return Ok(report);
            }
            let tally = self.remove_round(collection, field, &prepared, &docs)?;
            report.modified += tally.modified;
            if tally.conflicts == 0 {
                return Ok(report);
            }
            log::warn!("remove_field {collection}.{field}: {} conflicts in round {}", tally.conflicts, report.rounds);
        }
        Err(DbError::VersionConflict { collection: collection.to_string() })
    }

    fn remove_round(
        &self,
        collection: &str,
        field: &str,
        prepared: &PreparedQuery,
        docs: &[StoredDocument],
    ) -> Result<RoundTally, DbError> {
        let workers = self.config.field_removal.parallelism.max(1);
        let chunk = docs.len().div_ceil(workers).max(1);
        let results: Vec<Result<RoundTally, DbError>> = std::thread::scope(|s| {
            let handles: Vec<_> = docs
                .chunks(chunk)
                .map(|part| s.spawn(move || self.remove_in(collection, field, prepared, part)))
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join().unwrap_or_else(|_| {
                        Err(DbError::Store { op: "remove_field", message: "worker panicked".into() })
                    })
                })
                .collect()
        });
        let mut total = RoundTally::default();
        for r in results {
            let t = r?;
            total.modified += t.modified;
            total.conflicts += t.conflicts;
        }
        Ok(total)
    }

    fn remove_in(
        &self,
        collection: &str,
        field: &str,
        prepared: &PreparedQuery,
        docs: &[StoredDocument],
    ) -> Result<RoundTally, DbError> {
        let mut session = self.session("remove_field", collection)?;
        let mut tally = RoundTally::default();
        for doc in docs {
            let mut content = doc.content.clone();
            if !unset_path(&mut content, field) {
                continue;
            }
            let replaced = session
                .replace_if_version(collection, &doc.key, &doc.version, content)
                .map_err(|e| classify("remove_field", collection, prepared.native().as_ref(), e))?;
            if replaced {
                tally.modified += 1;
                log::info!(target: AUDIT_TARGET, "remove_field collection={collection} key={} field={field}", doc.key);
            } else {
                tally.conflicts += 1;
            }
        }
        Ok(tally)
    }
}
