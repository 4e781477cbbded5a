//! AttributeMap: the key-value store on entities.

use std::collections::HashMap;
use super::Value;

/// A map of attribute names to values.
pub type AttributeMap = HashMap<String, Value>;

/// Build an AttributeMap from (key, value) pairs.
pub fn attributes<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> AttributeMap
where
    K: Into<String>,
    V: Into<Value>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}
