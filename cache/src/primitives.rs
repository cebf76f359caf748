use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Universal value container inside every index. Membership is O(1);
/// iteration order carries no meaning.
pub type StringSet = HashSet<String>;

/// Key → set-of-values map used for dimensions, labels, and tags.
///
/// Empty keys and empty values are rejected at the edge so no index ever
/// grows an empty-string partition.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LabelIndex {
    values: HashMap<String, StringSet>,
}

impl LabelIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one pair; returns true when the value was not present yet.
    pub fn insert(&mut self, key: &str, value: &str) -> bool {
        if key.is_empty() || value.is_empty() {
            return false;
        }
        self.values
            .entry(key.to_string())
            .or_default()
            .insert(value.to_string())
    }

    /// Union every pair of `other` into this index.
    pub fn union_pairs<'a, I>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (key, value) in pairs {
            self.insert(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&StringSet> {
        self.values.get(key)
    }

    pub fn contains_pair(&self, key: &str, value: &str) -> bool {
        self.values.get(key).is_some_and(|set| set.contains(value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StringSet)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
