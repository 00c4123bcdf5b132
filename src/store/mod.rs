//! Boundary to the native key/version document store.
//!
//! Every request runs on a [`StoreSession`] obtained from [`DocumentStore::connect`];
//! dropping the session releases the underlying connection.

mod memory;
mod native_eval;

pub use memory::{FailPoint, MemoryStore};
pub use native_eval::native_matches;

use crate::query::NativeFilter;
use crate::types::{DocumentKey, StoredDocument, VersionToken};
use bson::Document as BsonDocument;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// SQLSTATE-style code the store reports for a uniqueness violation.
pub const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct StoreError {
    pub code: Option<String>,
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { code: None, message: message.into() }
    }

    pub fn with_code(code: &str, message: impl Into<String>) -> Self {
        Self { code: Some(code.to_string()), message: message.into() }
    }

    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        self.code.as_deref() == Some(UNIQUE_VIOLATION)
            || self.message.contains("unique constraint")
    }

    /// Field named in diagnostics of the form `Key (field)=(value) already exists.`
    #[must_use]
    pub fn duplicate_field(&self) -> Option<String> {
        let start = self.message.find("Key (")? + "Key (".len();
        let rest = &self.message[start..];
        let end = rest.find(")=")?;
        let field = &rest[..end];
        (!field.is_empty()).then(|| field.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A native find request. Sort travels inside the filter as `$query/$orderby`.
#[derive(Debug, Clone, Default)]
pub struct NativeFind {
    pub filter: NativeFilter,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub fields: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexSpec {
    #[must_use]
    pub fn new(name: &str, fields: &[&str]) -> Self {
        Self { name: name.to_string(), fields: fields.iter().map(|f| (*f).to_string()).collect(), unique: false }
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

pub trait DocumentStore: Send + Sync {
    /// Acquires one connection-scoped session.
    ///
    /// # Errors
    /// Returns an error when no connection can be obtained.
    fn connect(&self) -> StoreResult<Box<dyn StoreSession + '_>>;
}

/// Operations available on one connection. No method blindly overwrites an existing document.
pub trait StoreSession {
    fn insert(&mut self, collection: &str, content: BsonDocument) -> StoreResult<StoredDocument>;

    fn find(&mut self, collection: &str, request: &NativeFind) -> StoreResult<Vec<StoredDocument>>;

    /// Replaces the content only if `(key, version)` is current. `Ok(false)` on version mismatch.
    fn replace_if_version(
        &mut self,
        collection: &str,
        key: &DocumentKey,
        version: &VersionToken,
        content: BsonDocument,
    ) -> StoreResult<bool>;

    /// Removes the document only if `(key, version)` is current. `Ok(false)` on version mismatch.
    fn remove_if_version(
        &mut self,
        collection: &str,
        key: &DocumentKey,
        version: &VersionToken,
    ) -> StoreResult<bool>;

    fn create_index(&mut self, collection: &str, spec: &IndexSpec) -> StoreResult<()>;

    fn drop_index(&mut self, collection: &str, name: &str) -> StoreResult<()>;

    fn list_indexes(&mut self, collection: &str) -> StoreResult<Vec<IndexSpec>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_duplicate_field() {
        let e = StoreError::with_code(
            UNIQUE_VIOLATION,
            "duplicate key value violates unique constraint \"users_email\"; Key (email)=(a@b.c) already exists.",
        );
        assert!(e.is_unique_violation());
        assert_eq!(e.duplicate_field().as_deref(), Some("email"));
        assert_eq!(StoreError::new("connection reset").duplicate_field(), None);
        assert!(!StoreError::new("connection reset").is_unique_violation());
    }
}
