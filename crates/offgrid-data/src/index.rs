//! Per-tile inverted token index.

use std::{collections::BTreeMap, ops::Bound};

use ahash::AHashMap as HashMap;
use itertools::Itertools;

use crate::{classif::TypeId, feature::FeatureId, normalize::tokenize};

/// Read side of a tile's token index. All returned id lists are sorted and
/// free of duplicates.
pub trait TokenLookup: Send + Sync {
    /// Features having `token` as a whole name token.
    fn exact(&self, token: &str) -> Vec<FeatureId>;
    /// Features having a name token that starts with `prefix`.
    fn prefix(&self, prefix: &str) -> Vec<FeatureId>;
    /// Features of type `t`.
    fn by_type(&self, t: TypeId) -> Vec<FeatureId>;
}

/// In-memory token index backed by a sorted map, so prefix lookups are a
/// range scan.
#[derive(Debug, Clone, Default)]
pub struct TokenIndex {
    tokens: BTreeMap<String, Vec<FeatureId>>,
    types: HashMap<TypeId, Vec<FeatureId>>,
}

impl TokenIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes every word of `name` for `id`.
    pub fn insert_name(&mut self, id: FeatureId, name: &str) {
        for token in tokenize(name) {
            self.tokens.entry(token).or_default().push(id);
        }
    }

    pub fn insert_type(&mut self, id: FeatureId, t: TypeId) {
        self.types.entry(t).or_default().push(id);
    }

    /// Sorts and dedups every posting list. Must be called before lookups.
    pub fn finish(&mut self) {
        for ids in self.tokens.values_mut().chain(self.types.values_mut()) {
            ids.sort_unstable();
            ids.dedup();
        }
    }

    pub fn num_tokens(&self) -> usize {
        self.tokens.len()
    }
}

impl TokenLookup for TokenIndex {
    fn exact(&self, token: &str) -> Vec<FeatureId> {
        self.tokens.get(token).cloned().unwrap_or_default()
    }

    fn prefix(&self, prefix: &str) -> Vec<FeatureId> {
        self.tokens
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(token, _)| token.starts_with(prefix))
            .map(|(_, ids)| ids.iter().copied())
            .kmerge()
            .dedup()
            .collect()
    }

    fn by_type(&self, t: TypeId) -> Vec<FeatureId> {
        self.types.get(&t).cloned().unwrap_or_default()
    }
}
