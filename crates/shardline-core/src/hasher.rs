//! Composite keys and the deterministic key hash
//!
//! The hash is the classic 32-bit polynomial string hash (`h = 31 * h + unit`
//! over UTF-16 code units, wrapping on overflow). It depends only on the key
//! text, so placements are reproducible across runs, processes and hosts.

use serde::{Deserialize, Serialize};
use shardline_common::{Result, ShardlineError};
use std::fmt;

/// Ordered column values that decide where a record lives
///
/// Parts are concatenated in order without a separator before hashing, so
/// `["1", "23"]` and `["12", "3"]` hash identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompositeKey {
    parts: Vec<String>,
}

impl CompositeKey {
    /// Build a key from its ordered parts
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }

    /// Key made of a single column value
    pub fn single(part: impl Into<String>) -> Self {
        Self {
            parts: vec![part.into()],
        }
    }

    pub fn builder() -> CompositeKeyBuilder {
        CompositeKeyBuilder::default()
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// True when the concatenated key text is empty
    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(String::is_empty)
    }

    /// The exact text that gets hashed
    pub fn concatenated(&self) -> String {
        self.parts.concat()
    }

    /// Non-negative hash of this key
    pub fn hash_value(&self) -> Result<u32> {
        KeyHasher::hash(&self.parts)
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.parts.join("|"))
    }
}

impl<S: Into<String>> FromIterator<S> for CompositeKey {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Builder mirroring how column values are collected from a row
///
/// Missing columns are skipped rather than contributing an empty part.
#[derive(Debug, Default)]
pub struct CompositeKeyBuilder {
    parts: Vec<String>,
}

impl CompositeKeyBuilder {
    pub fn part(mut self, value: impl Into<String>) -> Self {
        self.parts.push(value.into());
        self
    }

    pub fn optional_part<S: Into<String>>(mut self, value: Option<S>) -> Self {
        if let Some(value) = value {
            self.parts.push(value.into());
        }
        self
    }

    pub fn build(self) -> CompositeKey {
        CompositeKey { parts: self.parts }
    }
}

/// Deterministic hash for composite keys
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyHasher;

impl KeyHasher {
    /// Signed 32-bit string hash of the concatenated parts
    ///
    /// Streams over the parts, no concatenated string is allocated.
    pub fn raw_hash<S: AsRef<str>>(parts: &[S]) -> i32 {
        parts
            .iter()
            .flat_map(|part| part.as_ref().encode_utf16())
            .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
    }

    /// Non-negative hash of the concatenated parts
    ///
    /// Uses the magnitude of the signed hash, so `i32::MIN` becomes `2^31`
    /// instead of staying negative. Fails with [`ShardlineError::EmptyKey`]
    /// when there is no key text to hash.
    pub fn hash<S: AsRef<str>>(parts: &[S]) -> Result<u32> {
        if parts.iter().all(|part| part.as_ref().is_empty()) {
            return Err(ShardlineError::EmptyKey);
        }
        Ok(Self::raw_hash(parts).unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_hash_known_values() {
        assert_eq!(KeyHasher::raw_hash(&["3"]), 51);
        assert_eq!(KeyHasher::raw_hash(&["7728"]), 1_692_966);
        assert_eq!(KeyHasher::raw_hash(&["1024"]), 1_507_489);
        assert_eq!(KeyHasher::raw_hash(&["0", "User0"]), 1_456_225_141);
    }

    #[test]
    fn test_parts_are_concatenated_without_separator() {
        assert_eq!(KeyHasher::raw_hash(&["1", "23"]), KeyHasher::raw_hash(&["12", "3"]));
        assert_eq!(KeyHasher::raw_hash(&["12", "", "3"]), KeyHasher::raw_hash(&["123"]));
    }

    #[test]
    fn test_part_order_matters() {
        assert_ne!(KeyHasher::raw_hash(&["a", "b"]), KeyHasher::raw_hash(&["b", "a"]));
    }

    #[test]
    fn test_min_value_is_forced_non_negative() {
        assert_eq!(KeyHasher::raw_hash(&["polygenelubricants"]), i32::MIN);
        assert_eq!(KeyHasher::hash(&["polygenelubricants"]).unwrap(), 2_147_483_648);
    }

    #[test]
    fn test_negative_hash_uses_magnitude() {
        let raw = KeyHasher::raw_hash(&["a much longer key that overflows"]);
        let hashed = KeyHasher::hash(&["a much longer key that overflows"]).unwrap();
        assert_eq!(raw, -1_240_101_892);
        assert_eq!(hashed, 1_240_101_892);
    }

    #[test]
    fn test_hashes_utf16_code_units() {
        assert_eq!(KeyHasher::raw_hash(&["é"]), 233);
        // U+1F600 is the surrogate pair D83D DE00
        let expected = 0xD83Di32.wrapping_mul(31).wrapping_add(0xDE00);
        assert_eq!(KeyHasher::raw_hash(&["\u{1F600}"]), expected);
    }

    #[test]
    fn test_empty_key_is_rejected() {
        let none: [&str; 0] = [];
        assert!(matches!(KeyHasher::hash(&none), Err(ShardlineError::EmptyKey)));
        assert!(matches!(KeyHasher::hash(&["", ""]), Err(ShardlineError::EmptyKey)));
    }

    #[test]
    fn test_builder_skips_missing_columns() {
        let key = CompositeKey::builder()
            .part("42")
            .optional_part(None::<String>)
            .optional_part(Some("User42"))
            .build();
        assert_eq!(key.parts(), ["42", "User42"]);
        assert_eq!(key.concatenated(), "42User42");
        assert_eq!(key.to_string(), "42|User42");
        assert_eq!(key.hash_value().unwrap(), KeyHasher::hash(&["42User42"]).unwrap());
    }

    #[test]
    fn test_collect_into_key() {
        let key: CompositeKey = ["7", "User7"].into_iter().collect();
        assert_eq!(key, CompositeKey::new(vec!["7", "User7"]));
        assert!(!key.is_empty());
        assert!(CompositeKey::single("").is_empty());
    }
}
