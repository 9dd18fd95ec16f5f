//! JSON decoding without a nesting limit.
//!
//! Call traces nest one object and one array per call frame, so a legal trace can be far
//! deeper than the 128 levels `serde_json` accepts by default. These helpers lift the limit
//! and grow the stack on demand while decoding.

use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

/// Decodes `T` from JSON bytes, at any nesting depth.
pub fn from_slice<T: DeserializeOwned>(bytes: &[u8]) -> serde_json::Result<T> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    deserializer.disable_recursion_limit();
    let value = T::deserialize(serde_stacker::Deserializer::new(&mut deserializer))?;
    deserializer.end()?;
    Ok(value)
}

/// Decodes `T` from an already parsed [`Value`], at any nesting depth.
pub fn from_value<T: DeserializeOwned>(value: Value) -> serde_json::Result<T> {
    T::deserialize(serde_stacker::Deserializer::new(value))
}
