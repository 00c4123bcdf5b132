use bson::{Bson, Document, doc};
use nexus_bridge::query::{Translation, parse_filter_doc, translate};
use nexus_bridge::store::native_matches;
use proptest::prelude::*;

fn native(filter: &Document) -> Document {
    match translate(&parse_filter_doc(filter).unwrap()).unwrap() {
        Translation::Native(n) => n.0,
        Translation::NoMatch => Document::new(),
    }
}

fn score_value() -> impl Strategy<Value = Option<Bson>> {
    prop_oneof![
        Just(None),
        Just(Some(Bson::Null)),
        any::<i32>().prop_map(|v| Some(Bson::Int32(v))),
        "[a-z]{0,3}".prop_map(|s| Some(Bson::String(s))),
        Just(Some(Bson::Boolean(false))),
    ]
}

proptest! {
    #[test]
    fn prop_null_equality_matches_absent_or_null(score in score_value(), other in any::<i32>()) {
        let mut content = doc! { "other": other };
        if let Some(v) = &score {
            content.insert("score", v.clone());
        }
        let missing = matches!(score, None | Some(Bson::Null));
        let eq = native(&doc! { "score": null });
        let ne = native(&doc! { "score": { "$ne": null } });
        prop_assert_eq!(native_matches(&content, &eq), missing);
        prop_assert_eq!(native_matches(&content, &ne), !missing);
    }

    #[test]
    fn prop_empty_in_never_reaches_the_store(
        score in score_value(),
        set in proptest::collection::vec(-5i32..5, 0..4),
    ) {
        let mut content = Document::new();
        if let Some(v) = &score {
            content.insert("score", v.clone());
        }
        let filter = doc! { "score": { "$in": set.clone() } };
        let t = translate(&parse_filter_doc(&filter).unwrap()).unwrap();
        if set.is_empty() {
            prop_assert!(t.is_no_match());
        } else {
            let expected = matches!(&score, Some(Bson::Int32(v)) if set.contains(v));
            prop_assert_eq!(native_matches(&content, &native(&filter)), expected);
        }
    }
}
