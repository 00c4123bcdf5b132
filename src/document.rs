//! Dotted-path access and value comparison over document content.

use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;

pub(crate) const MAX_PATH_DEPTH: usize = 32;

pub fn get_path<'a>(doc: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    let mut iter = path.split('.');
    let first = iter.next()?;
    let mut depth = 1usize;
    let mut cur: Option<&Bson> = doc.get(first);
    for part in iter {
        depth += 1;
        if depth > MAX_PATH_DEPTH {
            return None;
        }
        match cur {
            Some(Bson::Document(d)) => cur = d.get(part),
            _ => return None,
        }
    }
    cur
}

/// Sets `val` at `path`, creating intermediate sub-documents where missing.
/// Returns false when an intermediate segment exists but is not a document.
pub fn set_path(doc: &mut BsonDocument, path: &str, val: Bson) -> bool {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.len() > MAX_PATH_DEPTH {
        return false;
    }
    let Some((last, parents)) = parts.split_last() else { return false };
    let mut cur = doc;
    for key in parents {
        if !cur.contains_key(*key) {
            cur.insert((*key).to_string(), Bson::Document(BsonDocument::new()));
        }
        match cur.get_mut(*key) {
            Some(Bson::Document(d)) => cur = d,
            _ => return false,
        }
    }
    cur.insert((*last).to_string(), val);
    true
}

pub fn unset_path(doc: &mut BsonDocument, path: &str) -> bool {
    let parts: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = parts.split_last() else { return false };
    let mut cur = doc;
    for key in parents {
        match cur.get_mut(*key) {
            Some(Bson::Document(d)) => cur = d,
            _ => return false,
        }
    }
    cur.remove(*last).is_some()
}

#[allow(clippy::cast_precision_loss)]
pub fn to_f64(b: &Bson) -> Option<f64> {
    match b {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

/// Equality that treats Int32/Int64/Double as one numeric domain.
#[allow(clippy::float_cmp, clippy::cast_precision_loss)]
pub fn bson_equal(a: &Bson, b: &Bson) -> bool {
    match (a, b) {
        (Bson::Int32(x), Bson::Int64(y)) => i64::from(*x) == *y,
        (Bson::Int64(x), Bson::Int32(y)) => *x == i64::from(*y),
        (Bson::Int32(x), Bson::Double(y)) => f64::from(*x) == *y,
        (Bson::Double(x), Bson::Int32(y)) => *x == f64::from(*y),
        (Bson::Int64(x), Bson::Double(y)) => (*x as f64) == *y,
        (Bson::Double(x), Bson::Int64(y)) => *x == (*y as f64),
        (Bson::Array(x), Bson::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| bson_equal(l, r))
        }
        _ => a == b,
    }
}

pub fn bson_cmp(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(af), Some(bf)) = (to_f64(a), to_f64(b)) {
        return af.partial_cmp(&bf);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Array membership identity: objects match on their first key (name and value),
/// everything else on numeric-aware equality.
pub fn same_element(a: &Bson, b: &Bson) -> bool {
    match (a, b) {
        (Bson::Document(x), Bson::Document(y)) => match (x.iter().next(), y.iter().next()) {
            (Some((kx, vx)), Some((ky, vy))) => kx == ky && bson_equal(vx, vy),
            (None, None) => true,
            _ => false,
        },
        _ => bson_equal(a, b),
    }
}

/// Parses a JSON object into a document. Integers that fit in 32 bits become
/// `Int32`, larger ones `Int64`, so JSON input compares and increments like
/// documents built in code.
///
/// # Errors
/// Returns `DbError::Json` if the text is not a JSON object.
pub fn parse_json_document(json: &str) -> Result<BsonDocument, crate::errors::DbError> {
    let doc: BsonDocument = serde_json::from_str(json)?;
    Ok(narrow_document(doc))
}

fn narrow_document(doc: BsonDocument) -> BsonDocument {
    doc.into_iter().map(|(k, v)| (k, narrow(v))).collect()
}

fn narrow(v: Bson) -> Bson {
    match v {
        Bson::Int64(i) => i32::try_from(i).map_or(Bson::Int64(i), Bson::Int32),
        Bson::Array(items) => Bson::Array(items.into_iter().map(narrow).collect()),
        Bson::Document(d) => Bson::Document(narrow_document(d)),
        other => other,
    }
}
