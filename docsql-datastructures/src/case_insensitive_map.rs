use linked_hash_map::LinkedHashMap;
use std::iter::IntoIterator;
use thiserror::Error;

/// An insertion-ordered map whose keys compare without regard to case.
///
/// The spelling used by the first insertion of a key is the one reported by
/// `keys` and `iter`; later writes with a different spelling update the value
/// in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseInsensitiveMap<V>(LinkedHashMap<String, (String, V)>);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("duplicate key found: {0}")]
pub struct DuplicateKeyError(pub String);

impl DuplicateKeyError {
    pub fn get_key_name(self) -> String {
        self.0
    }
}

fn fold(key: &str) -> String {
    key.to_lowercase()
}

impl<V> CaseInsensitiveMap<V> {
    pub fn new() -> Self {
        Self(LinkedHashMap::new())
    }

    /// Inserts or overwrites, returning the previous value for the key.
    pub fn insert(&mut self, k: impl Into<String>, v: V) -> Option<V> {
        let k = k.into();
        let folded = fold(&k);
        if let Some(entry) = self.0.get_mut(&folded) {
            return Some(std::mem::replace(&mut entry.1, v));
        }
        self.0.insert(folded, (k, v));
        None
    }

    /// Inserts only if no key with the same case-folded spelling exists.
    pub fn try_insert(&mut self, k: impl Into<String>, v: V) -> Result<(), DuplicateKeyError> {
        let k = k.into();
        let folded = fold(&k);
        if self.0.contains_key(&folded) {
            return Err(DuplicateKeyError(k));
        }
        self.0.insert(folded, (k, v));
        Ok(())
    }

    pub fn get(&self, k: &str) -> Option<&V> {
        self.0.get(&fold(k)).map(|(_, v)| v)
    }

    pub fn remove(&mut self, k: &str) -> Option<V> {
        self.0.remove(&fold(k)).map(|(_, v)| v)
    }

    pub fn contains_key(&self, k: &str) -> bool {
        self.0.contains_key(&fold(k))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.values().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.0.values().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.values().map(|(k, v)| (k.as_str(), v))
    }
}

impl<V> Default for CaseInsensitiveMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> IntoIterator for CaseInsensitiveMap<V> {
    type Item = (String, V);
    type IntoIter = std::iter::Map<linked_hash_map::IntoIter<String, (String, V)>, fn((String, (String, V))) -> (String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        fn unfold<V>((_, entry): (String, (String, V))) -> (String, V) {
            entry
        }
        self.0.into_iter().map(unfold::<V> as fn(_) -> _)
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for CaseInsensitiveMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (k, v) in iter {
            out.insert(k, v);
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::{CaseInsensitiveMap, DuplicateKeyError};

    #[test]
    fn lookups_ignore_case() {
        let mut map = CaseInsensitiveMap::new();
        map.insert("Orders", 1);
        assert_eq!(Some(&1), map.get("ORDERS"));
        assert!(map.contains_key("orders"));
    }

    #[test]
    fn overwrite_keeps_first_spelling() {
        let mut map = CaseInsensitiveMap::new();
        map.insert("Orders", 1);
        assert_eq!(Some(1), map.insert("orders", 2));
        assert_eq!(vec![("Orders", &2)], map.iter().collect::<Vec<_>>());
    }

    #[test]
    fn try_insert_rejects_duplicates() {
        let mut map = CaseInsensitiveMap::new();
        assert_eq!(Ok(()), map.try_insert("a", ()));
        assert_eq!(Err(DuplicateKeyError("A".to_string())), map.try_insert("A", ()));
    }

    #[test]
    fn preserves_insertion_order() {
        let map: CaseInsensitiveMap<i32> = vec![("c", 3), ("a", 1), ("b", 2)].into_iter().collect();
        assert_eq!(vec!["c", "a", "b"], map.keys().collect::<Vec<_>>());
        assert_eq!(
            vec![("c".to_string(), 3), ("a".to_string(), 1), ("b".to_string(), 2)],
            map.into_iter().collect::<Vec<_>>()
        );
    }
}
