use super::{Engine, classify};
use crate::errors::DbError;
use crate::query::{Filter, FindOptions, PreparedQuery, post_filter, prepare, project_keys};
use crate::store::{NativeFind, StoreSession};
use crate::types::StoredDocument;

impl Engine {
    pub(crate) fn prepare(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&[(String, i32)]>,
    ) -> Result<PreparedQuery, DbError> {
        prepare(filter.clone(), sort, self.schema.as_ref(), collection)
    }

    /// Runs a prepared query on an open session. A query that cannot match returns
    /// nothing without touching the store. With deferred clauses, skip and limit
    /// are applied after the post-filter.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn fetch(
        &self,
        session: &mut (dyn StoreSession + '_),
        op: &'static str,
        collection: &str,
        prepared: &PreparedQuery,
        skip: Option<usize>,
        limit: Option<usize>,
        hint: Option<String>,
    ) -> Result<Vec<StoredDocument>, DbError> {
        let Some(native) = prepared.native() else { return Ok(Vec::new()) };
        let deferred = prepared.needs_post_filter();
        let request = NativeFind {
            filter: native,
            skip: if deferred { None } else { skip },
            limit: if deferred { None } else { limit },
            hint,
        };
        let docs = session
            .find(collection, &request)
            .map_err(|e| classify(op, collection, Some(&request.filter), e))?;
        if !deferred {
            return Ok(docs);
        }
        Ok(post_filter(docs, &prepared.original)
            .into_iter()
            .skip(skip.unwrap_or(0))
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    /// Reads matching documents. `keys` projects content after the read.
    ///
    /// # Errors
    /// `Translation` for filters or sorts that cannot be expressed, `Store` for store failures.
    pub fn find(
        &self,
        collection: &str,
        filter: &Filter,
        opts: &FindOptions,
    ) -> Result<Vec<StoredDocument>, DbError> {
        let prepared = self.prepare(collection, filter, opts.sort.as_deref())?;
        if prepared.translation.is_no_match() {
            return Ok(Vec::new());
        }
        let max = self.config.query.max_limit;
        let limit = opts.limit.unwrap_or(max).min(max);
        let mut docs = {
            let mut session = self.session("find", collection)?;
            self.fetch(session.as_mut(), "find", collection, &prepared, opts.skip, Some(limit), opts.hint.clone())?
        };
        if let Some(keys) = &opts.keys {
            for d in &mut docs {
                d.content = project_keys(std::mem::take(&mut d.content), keys);
            }
        }
        Ok(docs)
    }

    /// # Errors
    /// See [`Engine::find`].
    pub fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        opts: &FindOptions,
    ) -> Result<Option<StoredDocument>, DbError> {
        let opts = FindOptions { limit: Some(1), ..opts.clone() };
        Ok(self.find(collection, filter, &opts)?.into_iter().next())
    }

    /// # Errors
    /// See [`Engine::find`].
    pub fn count(&self, collection: &str, filter: &Filter) -> Result<usize, DbError> {
        let prepared = self.prepare(collection, filter, None)?;
        if prepared.translation.is_no_match() {
            return Ok(0);
        }
        let mut session = self.session("count", collection)?;
        Ok(self.fetch(session.as_mut(), "count", collection, &prepared, None, None, None)?.len())
    }
}
