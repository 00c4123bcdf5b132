use crate::document::parse_json_document;
use crate::errors::DbError;
use bson::{Bson, Document as BsonDocument};

use super::types::{Filter, MAX_FILTER_DEPTH, MAX_IN_SET};

fn err(msg: impl Into<String>) -> DbError {
    DbError::Translation(msg.into())
}

/// # Errors
/// Returns an error if the JSON string is not an object or uses an unsupported operator.
pub fn parse_filter_json(json: &str) -> Result<Filter, DbError> {
    parse_filter_doc(&parse_json_document(json)?)
}

/// Parses a Mongo-style filter document. `{}` is [`Filter::True`]; several keys form an implicit `$and`.
///
/// # Errors
/// Returns `DbError::Translation` for unknown operators or malformed operands.
pub fn parse_filter_doc(doc: &BsonDocument) -> Result<Filter, DbError> {
    parse_level(doc, 0)
}

impl TryFrom<&BsonDocument> for Filter {
    type Error = DbError;
    fn try_from(doc: &BsonDocument) -> Result<Self, Self::Error> {
        parse_filter_doc(doc)
    }
}

fn parse_level(doc: &BsonDocument, depth: usize) -> Result<Filter, DbError> {
    if depth > MAX_FILTER_DEPTH {
        return Err(err("filter nested too deeply"));
    }
    let mut clauses = Vec::with_capacity(doc.len());
    for (key, value) in doc {
        match key.as_str() {
            "$and" => clauses.push(Filter::And(parse_children(key, value, depth)?)),
            "$or" => clauses.push(Filter::Or(parse_children(key, value, depth)?)),
            k if k.starts_with('$') => return Err(err(format!("unsupported top-level operator {k}"))),
            field => clauses.push(parse_field(field, value)?),
        }
    }
    Ok(match clauses.len() {
        0 => Filter::True,
        1 => clauses.remove(0),
        _ => Filter::And(clauses),
    })
}

fn parse_children(op: &str, value: &Bson, depth: usize) -> Result<Vec<Filter>, DbError> {
    let Bson::Array(items) = value else {
        return Err(err(format!("{op} requires an array")));
    };
    items
        .iter()
        .map(|item| match item {
            Bson::Document(d) => parse_level(d, depth + 1),
            _ => Err(err(format!("{op} elements must be objects"))),
        })
        .collect()
}

fn parse_field(field: &str, value: &Bson) -> Result<Filter, DbError> {
    if field.is_empty() {
        return Err(err("empty field name"));
    }
    let Bson::Document(ops) = value else {
        return Ok(Filter::Eq { path: field.to_string(), value: value.clone() });
    };
    let operator_keys = ops.keys().filter(|k| k.starts_with('$')).count();
    if operator_keys == 0 {
        return Ok(Filter::Eq { path: field.to_string(), value: value.clone() });
    }
    if operator_keys != ops.len() {
        return Err(err(format!("field {field} mixes operators and literal keys")));
    }
    let mut clauses = Vec::with_capacity(ops.len());
    for (op, operand) in ops {
        let path = field.to_string();
        let clause = match op.as_str() {
            "$eq" => Filter::Eq { path, value: literal_operand(op, field, operand)? },
            "$ne" => Filter::Ne { path, value: literal_operand(op, field, operand)? },
            "$in" => Filter::In { path, values: array_operand(op, operand)? },
            "$nin" => Filter::Nin { path, values: array_operand(op, operand)? },
            "$all" => Filter::All { path, values: array_operand(op, operand)? },
            "$containedBy" => Filter::ContainedBy { path, values: array_operand(op, operand)? },
            "$exists" => match operand {
                Bson::Boolean(b) => Filter::Exists { path, exists: *b },
                _ => return Err(err("$exists requires a boolean")),
            },
            other => return Err(err(format!("unsupported operator {other} on field {field}"))),
        };
        clauses.push(clause);
    }
    Ok(if clauses.len() == 1 { clauses.remove(0) } else { Filter::And(clauses) })
}

/// `$eq`/`$ne` compare against a value, never against another operator object.
fn literal_operand(op: &str, field: &str, operand: &Bson) -> Result<Bson, DbError> {
    match operand {
        Bson::Document(d) if d.keys().any(|k| k.starts_with('$')) => {
            Err(err(format!("{op} on field {field} takes a value, not an operator object")))
        }
        other => Ok(other.clone()),
    }
}

fn array_operand(op: &str, operand: &Bson) -> Result<Vec<Bson>, DbError> {
    match operand {
        Bson::Array(items) if items.len() <= MAX_IN_SET => Ok(items.clone()),
        Bson::Array(items) => Err(err(format!("{op} operand too large: {}", items.len()))),
        _ => Err(err(format!("{op} requires an array"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn implicit_and_of_fields() {
        let f = parse_filter_doc(&doc! { "a": 1, "b": { "$ne": null } }).unwrap();
        assert_eq!(
            f,
            Filter::And(vec![
                Filter::Eq { path: "a".into(), value: Bson::Int32(1) },
                Filter::Ne { path: "b".into(), value: Bson::Null },
            ])
        );
    }

    #[test]
    fn literal_object_is_equality() {
        let f = parse_filter_doc(&doc! { "loc": { "x": 1 } }).unwrap();
        assert!(matches!(f, Filter::Eq { .. }));
    }

    #[test]
    fn rejects_malformed() {
        assert!(parse_filter_doc(&doc! { "a": { "$regex": "x" } }).is_err());
        assert!(parse_filter_doc(&doc! { "a": { "$in": 3 } }).is_err());
        assert!(parse_filter_doc(&doc! { "a": { "$exists": 1 } }).is_err());
        assert!(parse_filter_doc(&doc! { "a": { "$ne": 1, "b": 2 } }).is_err());
        assert!(parse_filter_doc(&doc! { "$or": { "a": 1 } }).is_err());
        assert!(parse_filter_doc(&doc! { "$nor": [] }).is_err());
        assert!(parse_filter_doc(&doc! { "a": { "$eq": { "$in": [1] } } }).is_err());
        assert!(parse_filter_doc(&doc! { "a": { "$ne": { "$exists": true } } }).is_err());
        assert!(parse_filter_doc(&doc! { "a": { "$eq": { "b": 1 } } }).is_ok());
    }

    #[test]
    fn json_entry_point() {
        let f = parse_filter_json(r#"{"$or":[{"a":null},{"b":{"$in":[1,2]}}]}"#).unwrap();
        let Filter::Or(children) = f else { panic!("expected $or") };
        assert_eq!(children.len(), 2);
        assert!(parse_filter_json("[1,2]").is_err());
    }
}
