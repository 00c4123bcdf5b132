//! Programmatic form of the `nexus-bridge` commands, shared by the binary and tests.

use crate::document::parse_json_document;
use crate::errors::DbError;
use crate::query::{self, parse_filter_json};
use crate::schema::StaticSchema;
use crate::update::{apply_update, parse_update_json};
use bson::Bson;
use serde_json::{Value, json};

pub enum Command {
    /// Translate a filter (and optional sort) into the native form.
    Translate {
        filter_json: String,
        sort_json: Option<String>,
        schema_json: Option<String>,
        class_name: String,
    },
    /// Apply an update to a document and return the replacement content.
    Apply { document_json: String, update_json: String },
}

/// # Errors
/// Returns an error for unparseable input or anything the translator/transformer rejects.
pub fn run(cmd: Command) -> Result<Value, DbError> {
    match cmd {
        Command::Translate { filter_json, sort_json, schema_json, class_name } => {
            let filter = parse_filter_json(&filter_json)?;
            let schema = match schema_json {
                Some(s) => StaticSchema::from_json(&s)?,
                None => StaticSchema::new(),
            };
            let sort = sort_json.as_deref().map(parse_sort).transpose()?;
            let prepared = query::prepare(filter, sort.as_deref(), &schema, &class_name)?;
            match prepared.native() {
                None => Ok(json!({ "$noMatch": true })),
                Some(native) => {
                    let mut out = Bson::Document(native.0).into_relaxed_extjson();
                    if prepared.needs_post_filter()
                        && let Value::Object(map) = &mut out
                    {
                        map.insert("$postFilter".into(), Value::Bool(true));
                    }
                    Ok(out)
                }
            }
        }
        Command::Apply { document_json, update_json } => {
            let old = parse_json_document(&document_json)?;
            let update = parse_update_json(&update_json)?;
            Ok(Bson::Document(apply_update(&old, &update)?).into_relaxed_extjson())
        }
    }
}

/// Parses `{"field": 1, "other": -1}` keeping key order.
fn parse_sort(json: &str) -> Result<Vec<(String, i32)>, DbError> {
    let doc = parse_json_document(json)?;
    doc.iter()
        .map(|(k, v)| {
            let dir = match v {
                Bson::Int32(i) => *i,
                Bson::Int64(i) => i32::try_from(*i).unwrap_or(0),
                _ => 0,
            };
            Ok((k.clone(), dir))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_reports_no_match() {
        let out = run(Command::Translate {
            filter_json: r#"{"tags":{"$in":[]}}"#.into(),
            sort_json: None,
            schema_json: None,
            class_name: "Game".into(),
        })
        .unwrap();
        assert_eq!(out, json!({ "$noMatch": true }));
    }

    #[test]
    fn translate_wraps_sort() {
        let out = run(Command::Translate {
            filter_json: r#"{"name":"x"}"#.into(),
            sort_json: Some(r#"{"score":-1}"#.into()),
            schema_json: Some(r#"{"Game":{"score":"Number"}}"#.into()),
            class_name: "Game".into(),
        })
        .unwrap();
        assert_eq!(
            out,
            json!({
                "$query": { "name": "x" },
                "$orderby": [ { "path": "score", "datatype": "number", "order": "desc" } ]
            })
        );
    }

    #[test]
    fn apply_returns_new_document() {
        let out = run(Command::Apply {
            document_json: r#"{"a":1,"b":[1,2]}"#.into(),
            update_json: r#"{"$inc":{"a":5},"$addToSet":{"b":{"$each":[2,3]}}}"#.into(),
        })
        .unwrap();
        assert_eq!(out, json!({ "a": 6, "b": [1, 2, 3] }));
    }
}
