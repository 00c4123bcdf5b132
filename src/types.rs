use bson::Document as BsonDocument;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type CollectionName = String;

/// Natural key assigned by the store on insert. Immutable for the document's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentKey(pub String);

impl DocumentKey {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string().to_ascii_uppercase())
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque token that changes on every successful replace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionToken(pub String);

impl VersionToken {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A transient copy of a stored document: key, version and content.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub key: DocumentKey,
    pub version: VersionToken,
    pub content: BsonDocument,
}
