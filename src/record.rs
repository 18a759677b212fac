use serde_json::{Map, Value};

/// One component's entry in the intermediate form. Field order mirrors the
/// on-disk byte order and is part of the contract, which is why the crate
/// enables serde_json's `preserve_order` feature (an IndexMap underneath).
pub type Record = Map<String, Value>;

/// Looks a string field up on a JSON object, tolerating absence.
pub fn get_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key)?.as_str()
}
