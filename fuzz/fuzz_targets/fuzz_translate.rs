#![no_main]
use libfuzzer_sys::fuzz_target;
use nexus_bridge::query::{Translation, parse_filter_json, translate};

fuzz_target!(|data: &[u8]| {
    if data.len() > 8192 { return; }
    let Ok(s) = std::str::from_utf8(data) else { return };
    let Ok(filter) = parse_filter_json(s) else { return };
    if let Ok(Translation::Native(native)) = translate(&filter) {
        let docs = [
            bson::doc! {"a": 1, "b": null, "name": "x"},
            bson::doc! {"tags": [{"k": "a"}, {"k": "b"}], "nested": {"z": 3}},
            bson::doc! {},
        ];
        for d in &docs {
            let _ = nexus_bridge::store::native_matches(d, &native.0);
        }
    }
});
