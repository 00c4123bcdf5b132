use bson::{Bson, doc};
use nexus_bridge::errors::DbError;
use nexus_bridge::update::{apply_update, parse_update_doc, parse_update_json};

#[test]
fn precedence_example() {
    let old = doc! { "a": 1, "b": [1, 2] };
    let upd = parse_update_json(r#"{"$inc":{"a":5},"$addToSet":{"b":{"$each":[2,3]}}}"#).unwrap();
    assert_eq!(apply_update(&old, &upd).unwrap(), doc! { "a": 6, "b": [1, 2, 3] });
}

#[test]
fn operator_order_is_fixed_regardless_of_input_order() {
    let old = doc! { "xs": [1, 2], "n": 1 };
    let forward = parse_update_json(r#"{"$addToSet":{"xs":{"$each":[3]}},"$pullAll":{"xs":[3,1]},"$unset":["n"],"$inc":{"n":4}}"#)
        .unwrap();
    let backward = parse_update_json(r#"{"$inc":{"n":4},"$unset":["n"],"$pullAll":{"xs":[3,1]},"$addToSet":{"xs":{"$each":[3]}}}"#)
        .unwrap();
    let a = apply_update(&old, &forward).unwrap();
    let b = apply_update(&old, &backward).unwrap();
    assert_eq!(a, b);
    assert_eq!(a, doc! { "xs": [2], "n": 4 });
}

#[test]
fn dotted_paths_for_every_operator() {
    let old = doc! { "stats": { "hits": 1, "tags": ["a"], "old": true } };
    let upd = parse_update_doc(&doc! {
        "$unset": ["stats.old"],
        "$inc": { "stats.hits": 1 },
        "$addToSet": { "stats.tags": "b" },
        "stats.label": "x",
    })
    .unwrap();
    let out = apply_update(&old, &upd).unwrap();
    assert_eq!(out, doc! { "stats": { "hits": 2, "tags": ["a", "b"], "label": "x" } });
}

#[test]
fn add_to_set_creates_missing_array() {
    let upd = parse_update_json(r#"{"$addToSet":{"tags":{"$each":["a","a"]}}}"#).unwrap();
    assert_eq!(apply_update(&doc! {}, &upd).unwrap(), doc! { "tags": ["a"] });
}

#[test]
fn object_identity_uses_first_key_only() {
    // Two different objects sharing a first key collide.
    let old = doc! { "acl": [ { "user": "u1", "write": false } ] };
    let upd = parse_update_json(r#"{"$addToSet":{"acl":{"$each":[{"user":"u1","write":true}]}}}"#).unwrap();
    assert_eq!(apply_update(&old, &upd).unwrap(), old);

    let pull = parse_update_json(r#"{"$pullAll":{"acl":[{"user":"u1","write":true}]}}"#).unwrap();
    assert_eq!(apply_update(&old, &pull).unwrap(), doc! { "acl": [] });
}

#[test]
fn numeric_widths() {
    let old = doc! { "i": 1, "l": Bson::Int64(1), "d": 1.5 };
    let upd = parse_update_json(r#"{"$inc":{"i":1,"l":1,"d":1}}"#).unwrap();
    let out = apply_update(&old, &upd).unwrap();
    assert_eq!(out.get("i"), Some(&Bson::Int32(2)));
    assert_eq!(out.get("l"), Some(&Bson::Int64(2)));
    assert_eq!(out.get("d"), Some(&Bson::Double(2.5)));
}

#[test]
fn type_mismatches_are_translation_errors() {
    let cases = [
        (doc! { "s": "x" }, r#"{"$inc":{"s":1}}"#),
        (doc! { "s": 1 }, r#"{"$addToSet":{"s":{"$each":[1]}}}"#),
        (doc! { "s": 1 }, r#"{"$pullAll":{"s":[1]}}"#),
        (doc! { "s": 1 }, r#"{"s.t":1}"#),
    ];
    for (old, json) in cases {
        let upd = parse_update_json(json).unwrap();
        assert!(matches!(apply_update(&old, &upd), Err(DbError::Translation(_))), "{json}");
    }
}

#[test]
fn metadata_merge_and_permission_replace() {
    let old = doc! { "_metadata": { "indexes": { "a_1": { "a": 1 } }, "class_permissions": { "find": { "*": true } } }, "x": 1 };
    let upd = parse_update_json(r#"{"_metadata":{"indexes":{"b_1":{"b":1}},"class_permissions":{"get":{"*":true}}}}"#).unwrap();
    let out = apply_update(&old, &upd).unwrap();
    let meta = out.get_document("_metadata").unwrap();
    assert_eq!(meta.get_document("indexes").unwrap().len(), 2);
    assert_eq!(meta.get_document("class_permissions").unwrap(), &doc! { "get": { "*": true } });
    assert_eq!(out.get_i32("x").unwrap(), 1);
}

#[test]
fn schema_field_definition_is_merged_alone() {
    let old = doc! { "_id": "Game", "score": "Number" };
    let upd = parse_update_json(r#"{"owner":"Pointer"}"#).unwrap();
    assert_eq!(apply_update(&old, &upd).unwrap(), doc! { "_id": "Game", "score": "Number", "owner": "Pointer" });
}

#[test]
fn dotted_keys_nest_whatever_the_value_spelling() {
    let old = doc! { "profile": { "x": 1 } };
    for kind in ["String", "string"] {
        let upd = parse_update_json(&format!(r#"{{"profile.kind":"{kind}"}}"#)).unwrap();
        let out = apply_update(&old, &upd).unwrap();
        assert_eq!(out, doc! { "profile": { "x": 1, "kind": kind } });
        assert!(!out.contains_key("profile.kind"));
    }
}

#[test]
fn int64_overflow_is_not_reported_as_non_numeric() {
    let upd = parse_update_json(r#"{"$inc":{"n":1}}"#).unwrap();
    match apply_update(&doc! { "n": i64::MAX }, &upd) {
        Err(DbError::Translation(msg)) => {
            assert!(msg.contains("overflows"), "{msg}");
            assert!(!msg.contains("non-numeric"), "{msg}");
        }
        other => panic!("expected an overflow error, got {other:?}"),
    }
}
