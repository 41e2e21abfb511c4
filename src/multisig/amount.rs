//! Serde adapter writing native amounts as decimal strings
//!
//! Use with `#[serde(with = "crate::multisig::amount")]` on `u128` fields.
//! Strings survive tagged/flattened serde paths and JSON consumers that
//! cannot represent 128-bit integers.

use serde::{de, Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(de::Error::custom)
}
