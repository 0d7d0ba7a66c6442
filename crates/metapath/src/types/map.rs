use super::shared::shared;
use super::{AtomicValue, MapKey, Sequence};
use crate::error::MetapathError;
use indexmap::IndexMap;
use metaschema_mdm::NodeItem;
use std::fmt;
use std::sync::Arc;

/// An immutable map from [`MapKey`] to sequence, preserving insertion order.
///
/// `==` compares entries regardless of order, while [`MapItem::deep_equals`] also
/// requires the entries to appear in the same order.
pub struct MapItem<N> {
    entries: Arc<IndexMap<MapKey, Sequence<N>>>,
}

/// How `map:merge` resolves a key that appears in more than one input map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Raise a duplicate-key error.
    Reject,
    #[default]
    UseFirst,
    UseLast,
    /// Keep any one value; this implementation keeps the first.
    UseAny,
    /// Concatenate the values in input order.
    Combine,
}

impl DuplicatePolicy {
    /// Parses the `duplicates` option value, e.g. `use-last`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "reject" => Some(Self::Reject),
            "use-first" => Some(Self::UseFirst),
            "use-last" => Some(Self::UseLast),
            "use-any" => Some(Self::UseAny),
            "combine" => Some(Self::Combine),
            _ => None,
        }
    }
}

impl<N> Clone for MapItem<N> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<N: fmt::Debug> fmt::Debug for MapItem<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl<N: NodeItem> MapItem<N> {
    pub fn new(entries: IndexMap<MapKey, Sequence<N>>) -> Self {
        Self {
            entries: Arc::new(entries),
        }
    }

    /// The empty map. Every call returns the same shared instance.
    pub fn empty() -> Self {
        Self {
            entries: shared(IndexMap::new),
        }
    }

    /// Builds a map from key/value pairs; a later duplicate key replaces the earlier value
    /// in place.
    pub fn from_entries(entries: impl IntoIterator<Item = (AtomicValue, Sequence<N>)>) -> Self {
        Self::new(
            entries
                .into_iter()
                .map(|(k, v)| (MapKey::new(k), v))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &AtomicValue) -> Option<&Sequence<N>> {
        self.entries.get(&MapKey::new(key.clone()))
    }

    pub fn contains(&self, key: &AtomicValue) -> bool {
        self.entries.contains_key(&MapKey::new(key.clone()))
    }

    pub fn put(&self, key: AtomicValue, value: Sequence<N>) -> Self {
        let mut entries = self.entries.as_ref().clone();
        entries.insert(MapKey::new(key), value);
        Self::new(entries)
    }

    pub fn remove(&self, keys: &[AtomicValue]) -> Self {
        let mut entries = self.entries.as_ref().clone();
        for key in keys {
            entries.shift_remove(&MapKey::new(key.clone()));
        }
        Self::new(entries)
    }

    pub fn keys(&self) -> impl Iterator<Item = &AtomicValue> {
        self.entries.keys().map(MapKey::key)
    }

    pub fn values(&self) -> impl Iterator<Item = &Sequence<N>> {
        self.entries.values()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&MapKey, &Sequence<N>)> {
        self.entries.iter()
    }

    /// Merges maps left to right, resolving keys present in more than one map by
    /// `policy`. The key order is that of first appearance.
    pub fn merge(maps: &[MapItem<N>], policy: DuplicatePolicy) -> Result<Self, MetapathError> {
        let mut entries: IndexMap<MapKey, Sequence<N>> = IndexMap::new();
        for map in maps {
            for (key, value) in map.entries.iter() {
                let Some(existing) = entries.get_mut(key) else {
                    entries.insert(key.clone(), value.clone());
                    continue;
                };
                match policy {
                    DuplicatePolicy::Reject => {
                        return Err(MetapathError::MergeDuplicateKey {
                            key: key.key().to_string_value(),
                        });
                    }
                    DuplicatePolicy::UseFirst | DuplicatePolicy::UseAny => {}
                    DuplicatePolicy::UseLast => *existing = value.clone(),
                    DuplicatePolicy::Combine => {
                        *existing = Sequence::concat([existing.clone(), value.clone()])?;
                    }
                }
            }
        }
        Ok(Self::new(entries))
    }

    /// Equal size and, entry by entry in iteration order, equal keys and deep-equal
    /// values.
    pub fn deep_equals(&self, other: &MapItem<N>) -> bool {
        self.len() == other.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|((k1, v1), (k2, v2))| k1 == k2 && v1.deep_equals(v2))
    }

    pub fn to_signature(&self) -> String {
        let entries: Vec<String> = self
            .entries
            .iter()
            .map(|(key, value)| {
                let value = match value.items() {
                    Ok([item]) => item.to_signature(),
                    _ => value.to_signature(),
                };
                format!("{}:{}", key.key().to_string_value(), value)
            })
            .collect();
        format!("map{{{}}}", entries.join(","))
    }
}

impl<N: NodeItem> PartialEq for MapItem<N> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries) || self.entries == other.entries
    }
}
