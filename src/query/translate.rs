//! Rewrites the rich filter algebra into a filter-by-example document the native
//! store accepts literally.
//!
//! Rewrites applied, in order of precedence:
//! - `{f: null}` becomes `{$or: [{f: {$exists: false}}, {f: null}]}` so that absent
//!   and explicit-null fields both match.
//! - `{f: {$ne: null}}` becomes existence plus non-null; a `null` member of
//!   `$in`/`$nin` is widened or narrowed the same way.
//! - Object values are compared through `$eq`, never spliced in as operators.
//! - Empty `$in`/`$all` can never match; empty `$nin` never constrains.
//! - `$all` over objects becomes per-key `f[*].key` path equalities.
//! - `$containedBy` is deferred to a client-side post-filter.
//! - Clauses colliding on a key (two `$or` groups, two predicates on one field)
//!   are wrapped into a `$and` instead of overwriting each other, and empty
//!   sub-filters never reach a `$and` array.

use crate::errors::DbError;
use bson::{Bson, Document as BsonDocument, doc};

use super::types::{Filter, NativeFilter, Translation};

enum Fragment {
    /// Matches nothing.
    Never,
    /// Matches everything; contributes no constraint.
    Always,
    Clause(BsonDocument),
}

/// # Errors
/// Returns `DbError::Translation` when the filter combines operators the native
/// store cannot express (for example `$containedBy` under `$or`).
pub fn translate(filter: &Filter) -> Result<Translation, DbError> {
    let out = match translate_node(filter, false)? {
        Fragment::Never => Translation::NoMatch,
        Fragment::Always => Translation::Native(NativeFilter::default()),
        Fragment::Clause(d) => Translation::Native(NativeFilter(d)),
    };
    log::debug!("translated {} filter into {:?}", filter.kind_name(), out);
    Ok(out)
}

fn translate_node(filter: &Filter, under_or: bool) -> Result<Fragment, DbError> {
    Ok(match filter {
        Filter::True => Fragment::Always,
        Filter::Eq { path, value: Bson::Null } => Fragment::Clause(doc! {
            "$or": [ { path.as_str(): { "$exists": false } }, { path.as_str(): Bson::Null } ]
        }),
        Filter::Eq { path, value } => Fragment::Clause(eq_clause(path, value)),
        Filter::Ne { path, value: Bson::Null } => Fragment::Clause(doc! {
            "$and": [ { path.as_str(): { "$exists": true } }, { path.as_str(): { "$ne": Bson::Null } } ]
        }),
        Filter::Ne { path, value } => {
            Fragment::Clause(doc! { path.as_str(): { "$ne": value.clone() } })
        }
        Filter::In { values, .. } if values.is_empty() => Fragment::Never,
        Filter::In { path, values } if values.iter().any(|v| matches!(v, Bson::Null)) => {
            Fragment::Clause(doc! {
                "$or": [ { path.as_str(): { "$exists": false } }, { path.as_str(): { "$in": values.clone() } } ]
            })
        }
        Filter::In { path, values } => {
            Fragment::Clause(doc! { path.as_str(): { "$in": values.clone() } })
        }
        Filter::Nin { values, .. } if values.is_empty() => Fragment::Always,
        Filter::Nin { path, values } if values.iter().any(|v| matches!(v, Bson::Null)) => {
            Fragment::Clause(doc! {
                "$and": [ { path.as_str(): { "$exists": true } }, { path.as_str(): { "$nin": values.clone() } } ]
            })
        }
        Filter::Nin { path, values } => {
            Fragment::Clause(doc! { path.as_str(): { "$nin": values.clone() } })
        }
        Filter::All { values, .. } if values.is_empty() => Fragment::Never,
        Filter::All { path, values } => translate_all(path, values)?,
        Filter::Exists { path, exists } => {
            Fragment::Clause(doc! { path.as_str(): { "$exists": *exists } })
        }
        Filter::ContainedBy { path, .. } => {
            if under_or {
                return Err(DbError::Translation(format!(
                    "$containedBy on {path} cannot be evaluated inside $or"
                )));
            }
            Fragment::Always
        }
        Filter::And(children) => {
            let mut merged = BsonDocument::new();
            for child in children {
                match translate_node(child, under_or)? {
                    Fragment::Never => return Ok(Fragment::Never),
                    Fragment::Always => {}
                    Fragment::Clause(d) => merge_into(&mut merged, d),
                }
            }
            if merged.is_empty() { Fragment::Always } else { Fragment::Clause(merged) }
        }
        Filter::Or(children) => {
            let mut branches: Vec<BsonDocument> = Vec::with_capacity(children.len());
            for child in children {
                match translate_node(child, true)? {
                    Fragment::Always => return Ok(Fragment::Always),
                    Fragment::Never => {}
                    Fragment::Clause(d) => branches.push(d),
                }
            }
            match branches.len() {
                0 => Fragment::Never,
                1 => Fragment::Clause(branches.remove(0)),
                _ => Fragment::Clause(doc! {
                    "$or": branches.into_iter().map(Bson::Document).collect::<Vec<_>>()
                }),
            }
        }
    })
}

fn translate_all(path: &str, values: &[Bson]) -> Result<Fragment, DbError> {
    let objects = values.iter().filter(|v| matches!(v, Bson::Document(_))).count();
    if objects == 0 {
        return Ok(Fragment::Clause(doc! { path: { "$all": values.to_vec() } }));
    }
    if objects != values.len() {
        return Err(DbError::Translation(format!(
            "$all on {path} mixes objects and scalar values"
        )));
    }
    let mut per_key: Vec<Bson> = Vec::new();
    for value in values {
        if let Bson::Document(obj) = value {
            for (k, v) in obj {
                per_key.push(Bson::Document(eq_clause(&format!("{path}[*].{k}"), v)));
            }
        }
    }
    Ok(match per_key.len() {
        0 => Fragment::Always,
        _ => Fragment::Clause(doc! { "$and": per_key }),
    })
}

/// Literal equality. An object value goes through `$eq` so the store never reads
/// its keys as operators.
fn eq_clause(path: &str, value: &Bson) -> BsonDocument {
    match value {
        Bson::Document(_) => doc! { path: { "$eq": value.clone() } },
        _ => doc! { path: value.clone() },
    }
}

/// Merges `fragment` into `target`. A key already present is not overwritten:
/// both versions move into the `$and` array.
fn merge_into(target: &mut BsonDocument, fragment: BsonDocument) {
    for (key, value) in fragment {
        if key == "$and" {
            if let Bson::Array(items) = value {
                for item in items {
                    push_and(target, item);
                }
            }
            continue;
        }
        match target.remove(&key) {
            None => {
                target.insert(key, value);
            }
            Some(existing) => {
                push_and(target, Bson::Document(doc! { key.as_str(): existing }));
                push_and(target, Bson::Document(doc! { key.as_str(): value }));
            }
        }
    }
}

fn push_and(target: &mut BsonDocument, item: Bson) {
    if matches!(&item, Bson::Document(d) if d.is_empty()) {
        return;
    }
    match target.get_mut("$and") {
        Some(Bson::Array(items)) => items.push(item),
        _ => {
            target.insert("$and", Bson::Array(vec![item]));
        }
    }
}
