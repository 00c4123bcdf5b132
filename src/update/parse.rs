use crate::document::parse_json_document;
use crate::errors::DbError;
use bson::{Bson, Document as BsonDocument};

use super::types::{MAX_UPDATE_FIELDS, UpdateDoc};

fn err(msg: impl Into<String>) -> DbError {
    DbError::Translation(msg.into())
}

/// # Errors
/// Returns an error if the JSON string cannot be parsed into an update structure.
pub fn parse_update_json(json: &str) -> Result<UpdateDoc, DbError> {
    parse_update_doc(&parse_json_document(json)?)
}

/// # Errors
/// Returns `DbError::Translation` for unknown operators or malformed operands.
pub fn parse_update_doc(doc: &BsonDocument) -> Result<UpdateDoc, DbError> {
    if doc.len() > MAX_UPDATE_FIELDS {
        return Err(err(format!("update has too many keys: {}", doc.len())));
    }
    let mut out = UpdateDoc::default();
    for (key, value) in doc {
        match key.as_str() {
            "$unset" => out.unset = parse_unset(value)?,
            "$inc" => {
                for (field, delta) in operand_doc(key, value)? {
                    match delta {
                        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => {
                            out.inc.push((field.clone(), delta.clone()));
                        }
                        _ => return Err(err(format!("$inc on {field} requires a number"))),
                    }
                }
            }
            "$addToSet" => {
                for (field, spec) in operand_doc(key, value)? {
                    let each = match spec {
                        Bson::Document(d) if d.contains_key("$each") => match d.get("$each") {
                            Some(Bson::Array(items)) => items.clone(),
                            _ => return Err(err(format!("$addToSet.$each on {field} requires an array"))),
                        },
                        single => vec![single.clone()],
                    };
                    out.add_to_set.push((field.clone(), each));
                }
            }
            "$pullAll" => {
                for (field, values) in operand_doc(key, value)? {
                    let Bson::Array(items) = values else {
                        return Err(err(format!("$pullAll on {field} requires an array")));
                    };
                    out.pull_all.push((field.clone(), items.clone()));
                }
            }
            "$set" => {
                for (field, v) in operand_doc(key, value)? {
                    out.fields.push((field.clone(), v.clone()));
                }
            }
            op if op.starts_with('$') => return Err(err(format!("unsupported update operator {op}"))),
            field => out.fields.push((field.to_string(), value.clone())),
        }
    }
    Ok(out)
}

fn operand_doc<'a>(op: &str, value: &'a Bson) -> Result<&'a BsonDocument, DbError> {
    match value {
        Bson::Document(d) if d.len() <= MAX_UPDATE_FIELDS => Ok(d),
        Bson::Document(_) => Err(err(format!("{op} has too many fields"))),
        _ => Err(err(format!("{op} requires an object"))),
    }
}

/// Accepts either a list of field names or a `{field: <anything>}` map.
fn parse_unset(value: &Bson) -> Result<Vec<String>, DbError> {
    match value {
        Bson::Array(items) => items
            .iter()
            .map(|i| match i {
                Bson::String(s) => Ok(s.clone()),
                _ => Err(err("$unset entries must be field names")),
            })
            .collect(),
        Bson::Document(d) => Ok(d.keys().cloned().collect()),
        _ => Err(err("$unset requires an array or object")),
    }
}
