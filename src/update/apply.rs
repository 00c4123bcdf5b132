use crate::document::{get_path, same_element, set_path, unset_path};
use crate::errors::DbError;
use bson::{Bson, Document as BsonDocument};

use super::types::{CLASS_PERMISSIONS_KEY, METADATA_KEY, UpdateDoc};

/// Computes the full replacement content for `old` under `upd`. `old` is left untouched.
///
/// # Errors
/// Returns `DbError::Translation` when an operator targets a value of the wrong type
/// (incrementing a string, adding to a non-array).
pub fn apply_update(old: &BsonDocument, upd: &UpdateDoc) -> Result<BsonDocument, DbError> {
    let mut doc = old.clone();
    if let Some((name, value)) = upd.single_field_definition() {
        doc.insert(name, value.clone());
        return Ok(doc);
    }
    for path in &upd.unset {
        unset_path(&mut doc, path);
    }
    for (path, delta) in &upd.inc {
        let next = add_numbers(path, get_path(&doc, path), delta)?;
        if !set_path(&mut doc, path, next) {
            return Err(DbError::Translation(format!("cannot set {path} under a non-object")));
        }
    }
    for (path, candidates) in &upd.add_to_set {
        let mut items = array_at(&doc, path, "$addToSet")?.unwrap_or_default();
        for candidate in candidates {
            if !items.iter().any(|existing| same_element(existing, candidate)) {
                items.push(candidate.clone());
            }
        }
        if !set_path(&mut doc, path, Bson::Array(items)) {
            return Err(DbError::Translation(format!("cannot set {path} under a non-object")));
        }
    }
    for (path, removals) in &upd.pull_all {
        if let Some(items) = array_at(&doc, path, "$pullAll")? {
            let remainder: Vec<Bson> = items
                .into_iter()
                .filter(|item| !removals.iter().any(|r| same_element(item, r)))
                .collect();
            set_path(&mut doc, path, Bson::Array(remainder));
        }
    }
    for (key, value) in &upd.fields {
        merge_field(&mut doc, key, value)?;
    }
    Ok(doc)
}

fn array_at(doc: &BsonDocument, path: &str, op: &str) -> Result<Option<Vec<Bson>>, DbError> {
    match get_path(doc, path) {
        None | Some(Bson::Null) => Ok(None),
        Some(Bson::Array(items)) => Ok(Some(items.clone())),
        Some(_) => Err(DbError::Translation(format!("{op}: field {path} is not an array"))),
    }
}

/// Absent counts as zero. Integers stay integers; any double makes the result a double.
#[allow(clippy::cast_precision_loss)]
fn add_numbers(path: &str, current: Option<&Bson>, delta: &Bson) -> Result<Bson, DbError> {
    let current = current.unwrap_or(&Bson::Int32(0));
    let overflow = || DbError::Translation(format!("$inc on {path} overflows a 64-bit integer"));
    Ok(match (current, delta) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(v) => Bson::Int32(v),
            None => Bson::Int64(i64::from(*a) + i64::from(*b)),
        },
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(*a).checked_add(*b).ok_or_else(overflow)?),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a.checked_add(i64::from(*b)).ok_or_else(overflow)?),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.checked_add(*b).ok_or_else(overflow)?),
        (Bson::Double(a), Bson::Double(b)) => Bson::Double(a + b),
        (Bson::Double(a), Bson::Int32(b)) => Bson::Double(a + f64::from(*b)),
        (Bson::Double(a), Bson::Int64(b)) => Bson::Double(a + *b as f64),
        (Bson::Int32(a), Bson::Double(b)) => Bson::Double(f64::from(*a) + b),
        (Bson::Int64(a), Bson::Double(b)) => Bson::Double(*a as f64 + b),
        _ => return Err(DbError::Translation(format!("cannot increment non-numeric field {path}"))),
    })
}

fn merge_field(doc: &mut BsonDocument, key: &str, value: &Bson) -> Result<(), DbError> {
    if matches!(value, Bson::Document(d) if d.is_empty()) {
        unset_path(doc, key);
        return Ok(());
    }
    if key == METADATA_KEY {
        if let (Some(Bson::Document(existing)), Bson::Document(incoming)) = (doc.get_mut(key), value) {
            merge_metadata(existing, incoming);
            return Ok(());
        }
    }
    if key.contains('.') {
        if !set_path(doc, key, value.clone()) {
            return Err(DbError::Translation(format!("cannot set {key} under a non-object")));
        }
    } else {
        doc.insert(key, value.clone());
    }
    Ok(())
}

/// Key-by-key merge into existing metadata. Nested objects merge recursively,
/// except the class-level permission set which is replaced as a whole.
fn merge_metadata(existing: &mut BsonDocument, incoming: &BsonDocument) {
    for (k, v) in incoming {
        if k != CLASS_PERMISSIONS_KEY {
            if let (Some(Bson::Document(cur)), Bson::Document(inc)) = (existing.get_mut(k), v) {
                merge_metadata(cur, inc);
                continue;
            }
        }
        existing.insert(k.clone(), v.clone());
    }
}
