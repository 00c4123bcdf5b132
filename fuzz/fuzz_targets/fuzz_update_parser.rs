#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 8192 { return; }
    let Ok(s) = std::str::from_utf8(data) else { return };
    if let Ok(upd) = nexus_bridge::update::parse_update_json(s) {
        let base = bson::doc! { "n": 1, "tags": ["a"], "_metadata": { "indexes": {} } };
        let _ = nexus_bridge::update::apply_update(&base, &upd);
    }
});
