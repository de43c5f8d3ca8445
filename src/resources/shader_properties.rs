//! Shader Property System
//!
//! A [`ShaderProperties`] set is the atomic unit of "shader configuration":
//! an ordered, deduplicated list of `(property id, i32 value)` pairs.
//!
//! # Architecture
//!
//! Property ids are the FNV-1a hash of a human readable name, so they are
//! stable across runs and can be persisted. Pairs are kept sorted by id,
//! which gives:
//!
//! - **Deterministic hashing**: equal sets always fold to the same signature
//! - **Fast lookup**: binary search
//! - **Cheap comparison**: length check, then element-wise
//!
//! # Usage
//!
//! ```rust,ignore
//! use myth_pso::resources::{ShaderProperties, ShaderPropertyId};
//!
//! let mut properties = ShaderProperties::new();
//! properties.set_value(ShaderPropertyId::from_name("UseNormalMap"), 1);
//! properties.set_value(ShaderPropertyId::from_name("NumberOfLights"), 8);
//! ```

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::utils::hash::{FNV1A_INITIAL_HASH_32, fnv1a_32};

/// Opaque, totally ordered shader property identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ShaderPropertyId(u32);

impl ShaderPropertyId {
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Derives the id from a human readable property name.
    #[inline]
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        Self(fnv1a_32(name.as_bytes(), FNV1A_INITIAL_HASH_32))
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for ShaderPropertyId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// A single `(id, value)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShaderProperty {
    pub id: ShaderPropertyId,
    pub value: i32,
}

impl ShaderProperty {
    #[inline]
    #[must_use]
    pub const fn new(id: ShaderPropertyId, value: i32) -> Self {
        Self { id, value }
    }
}

/// Sorted, id-unique set of shader properties.
///
/// # Performance
///
/// - Lookup: O(log n), binary search
/// - Insert: O(n), shifting the tail
/// - No allocation beyond the backing vector for up to 8 properties
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ShaderProperties {
    properties: SmallVec<[ShaderProperty; 8]>,
}

impl ShaderProperties {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            properties: SmallVec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            properties: SmallVec::with_capacity(capacity),
        }
    }

    #[inline]
    fn find(&self, id: ShaderPropertyId) -> Result<usize, usize> {
        self.properties.binary_search_by_key(&id, |p| p.id)
    }

    #[inline]
    #[must_use]
    pub fn has_value(&self, id: ShaderPropertyId) -> bool {
        self.find(id).is_ok()
    }

    /// Returns the stored value, or `None` when the property is not set.
    #[inline]
    #[must_use]
    pub fn get_value(&self, id: ShaderPropertyId) -> Option<i32> {
        self.find(id).ok().map(|idx| self.properties[idx].value)
    }

    /// Hot-path lookup that cannot tell "stored as `default`" apart from
    /// "not stored".
    #[inline]
    #[must_use]
    pub fn get_value_or(&self, id: ShaderPropertyId, default: i32) -> i32 {
        self.get_value(id).unwrap_or(default)
    }

    /// Inserts the property, or updates its value if the id is already present.
    pub fn set_value(&mut self, id: ShaderPropertyId, value: i32) {
        match self.find(id) {
            Ok(idx) => self.properties[idx].value = value,
            Err(idx) => self.properties.insert(idx, ShaderProperty::new(id, value)),
        }
    }

    /// Removes the property; returns whether it was present.
    pub fn remove(&mut self, id: ShaderPropertyId) -> bool {
        if let Ok(idx) = self.find(id) {
            self.properties.remove(idx);
            true
        } else {
            false
        }
    }

    /// Applies every pair of `other` via [`Self::set_value`], in `other`'s order.
    ///
    /// Values from `other` override values in `self`.
    pub fn merge_from(&mut self, other: &ShaderProperties) {
        for property in &other.properties {
            self.set_value(property.id, property.value);
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.properties.clear();
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Iterates in ascending id order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &ShaderProperty> {
        self.properties.iter()
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[ShaderProperty] {
        &self.properties
    }
}

impl<'a> IntoIterator for &'a ShaderProperties {
    type Item = &'a ShaderProperty;
    type IntoIter = std::slice::Iter<'a, ShaderProperty>;

    fn into_iter(self) -> Self::IntoIter {
        self.properties.iter()
    }
}

impl From<&[(ShaderPropertyId, i32)]> for ShaderProperties {
    fn from(pairs: &[(ShaderPropertyId, i32)]) -> Self {
        let mut result = Self::with_capacity(pairs.len());
        for &(id, value) in pairs {
            result.set_value(id, value);
        }
        result
    }
}

impl FromIterator<(ShaderPropertyId, i32)> for ShaderProperties {
    fn from_iter<I: IntoIterator<Item = (ShaderPropertyId, i32)>>(iter: I) -> Self {
        let mut result = Self::new();
        for (id, value) in iter {
            result.set_value(id, value);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u32) -> ShaderPropertyId {
        ShaderPropertyId::new(raw)
    }

    #[test]
    fn test_set_and_get() {
        let mut properties = ShaderProperties::new();
        properties.set_value(id(10), 1);
        properties.set_value(id(3), 7);

        assert!(properties.has_value(id(10)));
        assert!(properties.has_value(id(3)));
        assert!(!properties.has_value(id(4)));

        assert_eq!(properties.get_value(id(3)), Some(7));
        assert_eq!(properties.get_value(id(4)), None);
        assert_eq!(properties.get_value_or(id(4), -1), -1);
        assert_eq!(properties.get_value_or(id(10), -1), 1);
    }

    #[test]
    fn test_ordering_and_uniqueness() {
        let mut properties = ShaderProperties::new();
        for raw in [50, 7, 99, 7, 1, 50, 23] {
            properties.set_value(id(raw), raw as i32);
        }

        let ids: Vec<u32> = properties.iter().map(|p| p.id.raw()).collect();
        assert_eq!(ids, vec![1, 7, 23, 50, 99]);
        assert!(
            ids.windows(2).all(|w| w[0] < w[1]),
            "Ids should be strictly ascending"
        );
    }

    #[test]
    fn test_set_value_is_idempotent() {
        let mut once = ShaderProperties::new();
        once.set_value(id(5), 2);

        let mut twice = once.clone();
        twice.set_value(id(5), 2);

        assert_eq!(once, twice);
        assert_eq!(twice.len(), 1);
    }

    #[test]
    fn test_update_overrides() {
        let mut properties = ShaderProperties::new();
        properties.set_value(id(5), 2);
        properties.set_value(id(5), 3);
        assert_eq!(properties.get_value(id(5)), Some(3));
        assert_eq!(properties.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut properties = ShaderProperties::from(&[(id(1), 1), (id(2), 2)][..]);
        assert!(properties.remove(id(1)));
        assert!(!properties.remove(id(1)));
        assert_eq!(properties.len(), 1);
        assert_eq!(properties.get_value(id(2)), Some(2));
    }

    #[test]
    fn test_merge() {
        let mut p1 = ShaderProperties::new();
        p1.set_value(id(1), 1);
        p1.set_value(id(2), 2);

        let mut p2 = ShaderProperties::new();
        p2.set_value(id(2), 3);
        p2.set_value(id(3), 4);

        p1.merge_from(&p2);

        assert_eq!(p1.get_value(id(1)), Some(1));
        assert_eq!(p1.get_value(id(2)), Some(3)); // Overwritten
        assert_eq!(p1.get_value(id(3)), Some(4));
    }

    #[test]
    fn test_equality_is_structural() {
        let a: ShaderProperties = [(id(2), 1), (id(1), 1)].into_iter().collect();
        let b: ShaderProperties = [(id(1), 1), (id(2), 1)].into_iter().collect();
        assert_eq!(a, b);

        let c: ShaderProperties = [(id(1), 1)].into_iter().collect();
        assert_ne!(a, c);

        let d: ShaderProperties = [(id(1), 1), (id(2), 2)].into_iter().collect();
        assert_ne!(a, d);
    }

    #[test]
    fn test_clear() {
        let mut properties = ShaderProperties::from(&[(id(1), 1)][..]);
        properties.clear();
        assert!(properties.is_empty());
    }

    #[test]
    fn test_id_from_name_is_stable() {
        assert_eq!(
            ShaderPropertyId::from_name("UseNormalMap"),
            ShaderPropertyId::from_name("UseNormalMap")
        );
        assert_ne!(
            ShaderPropertyId::from_name("UseNormalMap"),
            ShaderPropertyId::from_name("UseEmissiveMap")
        );
        assert_eq!(ShaderPropertyId::from_name("a").raw(), 0xe40c_292c);
    }
}
