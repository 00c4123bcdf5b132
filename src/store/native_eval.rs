//! Query-by-example evaluation as the native store performs it.
//!
//! These are the store's own semantics, not the caller's algebra:
//! `{f: null}` only matches a field that is present and null, `$ne` matches an
//! absent field, and empty `$in`/`$all` lists or empty sub-filters are rejected.

use super::{StoreError, StoreResult};
use crate::document::{bson_equal, MAX_PATH_DEPTH};
use bson::{Bson, Document as BsonDocument};

fn malformed(msg: impl Into<String>) -> StoreError {
    StoreError::with_code("QBE-40001", format!("malformed filter: {}", msg.into()))
}

/// Checks that every node is something the native engine accepts.
pub(crate) fn validate(filter: &BsonDocument) -> StoreResult<()> {
    for (key, value) in filter {
        match key.as_str() {
            "$and" | "$or" => {
                let Bson::Array(items) = value else { return Err(malformed(format!("{key} requires an array"))) };
                if items.is_empty() {
                    return Err(malformed(format!("{key} requires at least one element")));
                }
                for item in items {
                    match item {
                        Bson::Document(d) if d.is_empty() => {
                            return Err(malformed(format!("empty sub-filter in {key}")));
                        }
                        Bson::Document(d) => validate(d)?,
                        _ => return Err(malformed(format!("{key} elements must be objects"))),
                    }
                }
            }
            k if k.starts_with('$') => return Err(malformed(format!("unknown operator {k}"))),
            _ => {
                if let Bson::Document(ops) = value {
                    if ops.keys().any(|k| k.starts_with('$')) {
                        validate_ops(ops)?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn validate_ops(ops: &BsonDocument) -> StoreResult<()> {
    for (op, operand) in ops {
        match (op.as_str(), operand) {
            ("$eq" | "$ne", _) => {}
            ("$exists", Bson::Boolean(_)) => {}
            ("$nin", Bson::Array(_)) => {}
            ("$in", Bson::Array(items)) if !items.is_empty() => {}
            ("$all", Bson::Array(items)) if !items.is_empty() => {
                if items.iter().any(|i| matches!(i, Bson::Document(_))) {
                    return Err(malformed("$all cannot match nested objects"));
                }
            }
            ("$in" | "$all", Bson::Array(_)) => return Err(malformed(format!("{op} with empty list"))),
            (other, _) => return Err(malformed(format!("bad operand for {other}"))),
        }
    }
    Ok(())
}

/// Evaluates an already-validated native filter against document content.
#[must_use]
pub fn native_matches(content: &BsonDocument, filter: &BsonDocument) -> bool {
    filter.iter().all(|(key, value)| match key.as_str() {
        "$and" => sub_filters(value).all(|f| native_matches(content, f)),
        "$or" => sub_filters(value).any(|f| native_matches(content, f)),
        path => {
            let found = resolve(content, path);
            match value {
                Bson::Document(ops) if ops.keys().any(|k| k.starts_with('$')) => {
                    ops.iter().all(|(op, operand)| eval_op(&found, op, operand))
                }
                literal => found.iter().any(|v| literal_eq(v, literal)),
            }
        }
    })
}

fn sub_filters(value: &Bson) -> impl Iterator<Item = &BsonDocument> {
    let items: &[Bson] = match value {
        Bson::Array(items) => items,
        _ => &[],
    };
    items.iter().filter_map(Bson::as_document)
}

fn literal_eq(found: &Bson, literal: &Bson) -> bool {
    match (found, literal) {
        (Bson::Array(items), l) if !matches!(l, Bson::Array(_)) => items.iter().any(|i| bson_equal(i, l)),
        _ => bson_equal(found, literal),
    }
}

fn eval_op(found: &[&Bson], op: &str, operand: &Bson) -> bool {
    match op {
        "$eq" => found.iter().any(|v| literal_eq(v, operand)),
        "$ne" => !found.iter().any(|v| literal_eq(v, operand)),
        "$exists" => matches!(operand, Bson::Boolean(b) if *b == !found.is_empty()),
        "$in" => match operand {
            Bson::Array(set) => found.iter().any(|v| set.iter().any(|s| literal_eq(v, s))),
            _ => false,
        },
        "$nin" => match operand {
            Bson::Array(set) => !found.iter().any(|v| set.iter().any(|s| literal_eq(v, s))),
            _ => false,
        },
        "$all" => match operand {
            Bson::Array(wanted) => found.iter().any(|v| match v {
                Bson::Array(items) => wanted.iter().all(|w| items.iter().any(|i| bson_equal(i, w))),
                _ => false,
            }),
            _ => false,
        },
        _ => false,
    }
}

/// Resolves a dotted path where a segment ending in `[*]` fans out over an array.
fn resolve<'a>(content: &'a BsonDocument, path: &str) -> Vec<&'a Bson> {
    let mut current: Vec<&Bson> = Vec::new();
    for (depth, segment) in path.split('.').enumerate() {
        if depth >= MAX_PATH_DEPTH {
            return Vec::new();
        }
        let (name, fan_out) = match segment.strip_suffix("[*]") {
            Some(n) => (n, true),
            None => (segment, false),
        };
        let mut next: Vec<&Bson> = Vec::new();
        if depth == 0 {
            next.extend(content.get(name));
        } else {
            for v in &current {
                if let Bson::Document(d) = v {
                    next.extend(d.get(name));
                }
            }
        }
        if fan_out {
            next = next
                .into_iter()
                .flat_map(|v| match v {
                    Bson::Array(items) => items.iter().collect::<Vec<_>>(),
                    _ => Vec::new(),
                })
                .collect();
        }
        current = next;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn null_literal_needs_present_field() {
        let f = doc! { "score": null };
        assert!(native_matches(&doc! { "score": null }, &f));
        assert!(!native_matches(&doc! {}, &f));
    }

    #[test]
    fn ne_matches_absent_field() {
        let f = doc! { "score": { "$ne": null } };
        assert!(native_matches(&doc! {}, &f));
        assert!(native_matches(&doc! { "score": 5 }, &f));
    }

    #[test]
    fn wildcard_paths_fan_out() {
        let d = doc! { "tags": [ { "k": "a", "v": 1 }, { "k": "b" } ] };
        assert!(native_matches(&d, &doc! { "tags[*].k": "b" }));
        assert!(!native_matches(&d, &doc! { "tags[*].k": "c" }));
    }

    #[test]
    fn rejects_shapes_the_engine_cannot_run() {
        assert!(validate(&doc! { "$and": [ {} ] }).is_err());
        assert!(validate(&doc! { "f": { "$in": [] } }).is_err());
        assert!(validate(&doc! { "f": { "$all": [] } }).is_err());
        assert!(validate(&doc! { "f": { "$all": [ { "a": 1 } ] } }).is_err());
        assert!(validate(&doc! { "f": { "$regex": "x" } }).is_err());
        assert!(validate(&doc! { "f": { "$nin": [] }, "$or": [ { "a": 1 } ] }).is_ok());
    }
}
