//! JSON value codec used by the cache facade.
//!
//! Values are stored as their JSON text. JSON integers are plain decimal
//! text, so counters written through the codec stay usable by `INCRBY`.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Result;

/// Encode a value to its stored text form.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Decode stored text back to a value.
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T> {
    Ok(serde_json::from_str(raw)?)
}

/// Decode an optional stored value, keeping absence as `None`.
pub fn decode_opt<T: DeserializeOwned>(raw: Option<String>) -> Result<Option<T>> {
    raw.as_deref().map(decode::<T>).transpose()
}

/// Encode every item of a slice.
pub fn encode_all<T: Serialize>(values: &[T]) -> Result<Vec<String>> {
    values.iter().map(encode).collect()
}

/// Decode every item of a list of stored values.
pub fn decode_all<T: DeserializeOwned>(raw: Vec<String>) -> Result<Vec<T>> {
    raw.iter().map(|value| decode(value)).collect()
}
