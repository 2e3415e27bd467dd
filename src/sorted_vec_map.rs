use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;
use std::{cmp::Ordering, fmt::Debug};

/// A map that keeps its entries sorted by key in a `SmallVec`.
///
/// Used for the per-group keyed tables of this crate (e.g. the fitted scaler
/// statistics per [`GroupKey`](crate::table::GroupKey)). Lookup does not
/// depend on insertion order: two maps built from the same entries in a
/// different order compare equal and serialize identically.
///
/// # Type Parameters
///
/// - `N`: Inline capacity (default: 8). Number of entries stored on the stack before heap allocation.
///
/// # Performance Characteristics
///
/// - Insertion: O(n) - requires shifting to maintain sorted order
/// - Lookup: O(log n) - binary search
/// - Iteration: O(n) - sequential, in key order
///
/// # Serialization
///
/// Serialized as a sequence of `[key, value]` pairs in key order. Deserialization
/// re-sorts and deduplicates (last write wins), so hand-edited documents stay valid.
///
/// # Examples
///
/// ```rust
/// # use tsprep::sorted_vec_map::SortedVecMap;
/// let mut map = SortedVecMap::new();
/// map.insert("zebra", 3);
/// map.insert("apple", 1);
/// map.insert("mango", 2);
///
/// let keys: Vec<_> = map.keys().copied().collect();
/// assert_eq!(keys, vec!["apple", "mango", "zebra"]);
/// assert_eq!(map.get(&"apple"), Some(&1));
/// ```
#[derive(Clone, Debug, Default)]
pub struct SortedVecMap<K, V, const N: usize = 8> {
    inner: SmallVec<[(K, V); N]>,
}

impl<K: Ord, V> SortedVecMap<K, V> {
    /// Creates an empty `SortedVecMap`.
    #[inline]
    pub const fn new() -> Self {
        Self {
            inner: SmallVec::new_const(),
        }
    }

    /// Creates a `SortedVecMap` able to hold `capacity` entries without reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: SmallVec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        self.position(key).is_ok()
    }

    /// Returns a reference to the value corresponding to the key.
    #[inline]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.position(key).ok().map(|i| &self.inner[i].1)
    }

    /// Inserts a key-value pair, maintaining sorted order.
    ///
    /// Returns the previous value if the key was already present.
    ///
    /// ```rust
    /// # use tsprep::sorted_vec_map::SortedVecMap;
    /// let mut map = SortedVecMap::new();
    /// assert_eq!(map.insert(37, "a"), None);
    /// assert_eq!(map.insert(37, "b"), Some("a"));
    /// assert_eq!(map.get(&37), Some(&"b"));
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.position(&key) {
            Ok(i) => Some(std::mem::replace(&mut self.inner[i].1, value)),
            Err(i) => {
                self.inner.insert(i, (key, value));
                None
            }
        }
    }

    /// Returns an iterator over the keys in sorted order.
    #[inline]
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.inner.iter().map(|(k, _)| k)
    }

    /// Returns an iterator over the values in key-sorted order.
    #[inline]
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.inner.iter().map(|(_, v)| v)
    }

    /// Returns an iterator over the key-value pairs in key-sorted order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.inner.iter().map(|(k, v)| (k, v))
    }

    fn position(&self, key: &K) -> Result<usize, usize> {
        self.inner.binary_search_by(|(k, _)| k.cmp(key))
    }

    /// Sorts the internal storage and removes duplicate keys, keeping the last write.
    fn sort_and_dedup(&mut self) {
        // Stable sort keeps insertion order among equal keys; reverse so the
        // last write survives `dedup_by`, which keeps the first of a run.
        self.inner.reverse();
        self.inner.sort_by(|a, b| a.0.cmp(&b.0));
        self.inner.dedup_by(|a, b| a.0 == b.0);
    }
}

impl<K: Ord, V> FromIterator<(K, V)> for SortedVecMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self {
            inner: iter.into_iter().collect(),
        };
        map.sort_and_dedup();
        map
    }
}

impl<K: Ord, V> From<Vec<(K, V)>> for SortedVecMap<K, V> {
    fn from(vec: Vec<(K, V)>) -> Self {
        let mut map = Self {
            inner: SmallVec::from_vec(vec),
        };
        map.sort_and_dedup();
        map
    }
}

impl<'a, K, V> IntoIterator for &'a SortedVecMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = std::iter::Map<std::slice::Iter<'a, (K, V)>, fn(&'a (K, V)) -> (&'a K, &'a V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter().map(|(k, v)| (k, v))
    }
}

impl<K: PartialEq, V: PartialEq> PartialEq for SortedVecMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<K: Ord, V: PartialOrd> PartialOrd for SortedVecMap<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.inner.partial_cmp(&other.inner)
    }
}

impl<K: Serialize, V: Serialize> Serialize for SortedVecMap<K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.inner.iter())
    }
}

impl<'de, K, V> Deserialize<'de> for SortedVecMap<K, V>
where
    K: Deserialize<'de> + Ord,
    V: Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<(K, V)>::deserialize(deserializer).map(Self::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_keys_sorted() {
        let mut map = SortedVecMap::new();
        map.insert(3, "c");
        map.insert(1, "a");
        map.insert(2, "b");

        assert_eq!(map.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(map.values().copied().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn lookup_is_independent_of_insertion_order() {
        let a: SortedVecMap<_, _> = vec![("b", 2), ("a", 1), ("c", 3)].into();
        let b: SortedVecMap<_, _> = [("c", 3), ("b", 2), ("a", 1)].into_iter().collect();

        assert_eq!(a, b);
        assert_eq!(a.get(&"c"), Some(&3));
        assert!(!a.contains_key(&"d"));
    }

    #[test]
    fn from_vec_keeps_last_duplicate() {
        let map: SortedVecMap<_, _> = vec![(1, "first"), (2, "x"), (1, "second")].into();

        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&1), Some(&"second"));
    }

    #[test]
    fn json_round_trip_preserves_order_and_values() {
        let map: SortedVecMap<String, f64> =
            vec![("z".to_string(), 1.5), ("a".to_string(), -2.0)].into();

        let json = serde_json::to_string(&map).expect("serialize");
        assert_eq!(json, r#"[["a",-2.0],["z",1.5]]"#);

        let back: SortedVecMap<String, f64> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, map);
    }
}
