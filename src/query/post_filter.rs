use crate::document::{bson_equal, get_path};
use crate::types::StoredDocument;
use bson::{Bson, Document as BsonDocument};

use super::types::Filter;

/// True when the filter carries a clause the native store cannot evaluate.
pub(crate) fn has_deferred(filter: &Filter) -> bool {
    match filter {
        Filter::ContainedBy { .. } => true,
        Filter::And(children) | Filter::Or(children) => children.iter().any(has_deferred),
        _ => false,
    }
}

/// Drops every candidate whose array violates a `$containedBy` clause of the
/// original filter. Only clauses reachable through `$and` are considered; the
/// translator rejects them anywhere else.
pub fn post_filter(docs: Vec<StoredDocument>, original: &Filter) -> Vec<StoredDocument> {
    let mut clauses = Vec::new();
    collect_contained_by(original, &mut clauses);
    if clauses.is_empty() {
        return docs;
    }
    docs.into_iter()
        .filter(|d| clauses.iter().all(|(path, allowed)| contained_by(&d.content, path, allowed)))
        .collect()
}

fn collect_contained_by<'a>(filter: &'a Filter, out: &mut Vec<(&'a str, &'a [Bson])>) {
    match filter {
        Filter::ContainedBy { path, values } => out.push((path.as_str(), values.as_slice())),
        Filter::And(children) => children.iter().for_each(|c| collect_contained_by(c, out)),
        _ => {}
    }
}

/// An absent field is the empty set and passes; a scalar is treated as a one-element array.
fn contained_by(content: &BsonDocument, path: &str, allowed: &[Bson]) -> bool {
    match get_path(content, path) {
        None => true,
        Some(Bson::Array(items)) => {
            items.iter().all(|item| allowed.iter().any(|a| bson_equal(item, a)))
        }
        Some(scalar) => allowed.iter().any(|a| bson_equal(scalar, a)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DocumentKey, VersionToken};
    use bson::doc;

    fn stored(content: BsonDocument) -> StoredDocument {
        StoredDocument { key: DocumentKey::generate(), version: VersionToken::generate(), content }
    }

    #[test]
    fn drops_documents_with_foreign_elements() {
        let docs = vec![
            stored(doc! { "t": [1, 2] }),
            stored(doc! { "t": [1, 3] }),
            stored(doc! { "t": [] }),
            stored(doc! {}),
        ];
        let f = Filter::And(vec![
            Filter::True,
            Filter::ContainedBy { path: "t".into(), values: vec![Bson::Int32(1), Bson::Int32(2)] },
        ]);
        let kept = post_filter(docs, &f);
        assert_eq!(kept.len(), 3);
        assert!(kept.iter().all(|d| d.content.get_array("t").map_or(true, |a| !a.contains(&Bson::Int32(3)))));
    }
}
