use bson::Document as BsonDocument;

/// Bookkeeping fields returned even when a projection does not ask for them.
pub const ALWAYS_KEPT: [&str; 5] = ["createdAt", "updatedAt", "objectId", "_rperm", "_wperm"];

/// Strips every top-level key not in `keys` (or the always-kept list).
#[must_use]
pub fn project_keys(content: BsonDocument, keys: &[String]) -> BsonDocument {
    content
        .into_iter()
        .filter(|(k, _)| ALWAYS_KEPT.contains(&k.as_str()) || keys.iter().any(|want| want == k))
        .collect()
}
