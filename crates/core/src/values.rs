//! Submitted form values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Mapping from form field name to the ordered values submitted for it.
///
/// Multi-value fields (checkbox groups, multi-selects) keep every value in
/// submission order. Keys iterate in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueMap(BTreeMap<String, Vec<String>>);

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from raw `(name, value)` pairs, keeping only `fields`.
    ///
    /// Every listed field is present in the result, with an empty sequence when
    /// nothing was submitted for it.
    pub fn from_pairs<'a, I>(pairs: I, fields: &[&str]) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut map: BTreeMap<String, Vec<String>> = fields
            .iter()
            .map(|f| (f.to_string(), Vec::new()))
            .collect();
        for (name, value) in pairs {
            if let Some(values) = map.get_mut(name) {
                values.push(value.to_string());
            }
        }
        Self(map)
    }

    /// Replace all values of `key`.
    pub fn insert(&mut self, key: impl Into<String>, values: Vec<String>) {
        self.0.insert(key.into(), values);
    }

    /// Append one value to `key`.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.entry(key.into()).or_default().push(value.into());
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(Vec::as_slice)
    }

    /// First submitted value of `key`, if any.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Hex SHA-256 over the canonical (sorted, length-prefixed) content.
    ///
    /// Equal maps always produce the same digest.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (key, values) in &self.0 {
            hasher.update((key.len() as u64).to_le_bytes());
            hasher.update(key.as_bytes());
            hasher.update((values.len() as u64).to_le_bytes());
            for value in values {
                hasher.update((value.len() as u64).to_le_bytes());
                hasher.update(value.as_bytes());
            }
        }
        hex::encode(hasher.finalize())
    }
}

impl<K, V> FromIterator<(K, V)> for ValueMap
where
    K: Into<String>,
    V: IntoIterator,
    V::Item: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into_iter().map(Into::into).collect()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn from_pairs_keeps_only_form_fields_and_order() {
        let pairs = [
            ("colour", "red"),
            ("unknown", "x"),
            ("colour", "blue"),
            ("name", "n"),
        ];
        let values = ValueMap::from_pairs(pairs, &["colour", "name", "empty"]);

        assert_eq!(values.len(), 3);
        assert_eq!(values.get("colour").unwrap(), ["red", "blue"]);
        assert_eq!(values.first("name"), Some("n"));
        assert_eq!(values.get("empty").unwrap().len(), 0);
        assert!(values.get("unknown").is_none());
    }

    #[test]
    fn digest_depends_on_content_not_insertion_order() {
        let mut a = ValueMap::new();
        a.push("A", "alpha");
        a.push("Ω", "omega");

        let mut b = ValueMap::new();
        b.push("Ω", "omega");
        b.push("A", "alpha");

        assert_eq!(a.digest(), b.digest());

        b.push("A", "again");
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn digest_separates_key_and_value_boundaries() {
        let a: ValueMap = [("ab", vec!["c"])].into_iter().collect();
        let b: ValueMap = [("a", vec!["bc"])].into_iter().collect();
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn serializes_as_plain_object() {
        let values: ValueMap = [("k", vec!["v1", "v2"])].into_iter().collect();
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"{"k":["v1","v2"]}"#);
        let back: ValueMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, values);
    }

    proptest! {
        /// Property: the digest only depends on the set of keys and the
        /// per-key value order, never on the order keys were added in.
        #[test]
        fn digest_ignores_key_insertion_order(
            entries in prop::collection::btree_map("[a-zΩ]{1,6}", prop::collection::vec(".{0,8}", 0..4), 0..8)
        ) {
            let forward: ValueMap = entries.clone().into_iter().collect();
            let backward: ValueMap = entries.into_iter().rev().collect();
            prop_assert_eq!(forward.digest(), backward.digest());
            prop_assert_eq!(forward.digest().len(), 64);
        }
    }
}
