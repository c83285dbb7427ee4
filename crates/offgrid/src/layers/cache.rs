use ahash::AHashMap as HashMap;
use offgrid_data::FeatureId;

use crate::geometry::StreetProjector;

/// A per-query cache keyed by feature id: values live in an arena, the map
/// only holds slot indices. Emptied by [`clear`](Self::clear) when the
/// query (or the tile it reads) is done.
#[derive(Debug, Clone)]
pub struct IdCache<V> {
    slots: HashMap<FeatureId, usize>,
    arena: Vec<V>,
}

impl<V> Default for IdCache<V> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
            arena: Vec::new(),
        }
    }
}

impl<V> IdCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: FeatureId) -> Option<&V> {
        self.slots.get(&id).map(|&slot| &self.arena[slot])
    }

    pub fn get_or_insert_with(&mut self, id: FeatureId, f: impl FnOnce() -> V) -> &V {
        let slot = match self.slots.get(&id) {
            Some(&slot) => slot,
            None => {
                self.arena.push(f());
                let slot = self.arena.len() - 1;
                self.slots.insert(id, slot);
                slot
            }
        };
        &self.arena[slot]
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.arena.clear();
    }
}

/// Caches the layer matcher fills while joining layers of one tile.
#[derive(Debug, Clone, Default)]
pub struct MatcherCaches {
    /// POI → streets within the POI-to-street distance.
    pub nearby_streets: IdCache<Vec<FeatureId>>,
    /// Building → the street it is addressed to.
    pub matching_street: IdCache<Option<FeatureId>>,
    /// Place → buildings addressed to it.
    pub place_addresses: IdCache<Vec<FeatureId>>,
    /// Street → buildings in its vicinity addressed to it.
    pub street_buildings: IdCache<Vec<FeatureId>>,
    pub projectors: IdCache<Option<StreetProjector>>,
}

impl MatcherCaches {
    pub fn clear(&mut self) {
        self.nearby_streets.clear();
        self.matching_street.clear();
        self.place_addresses.clear();
        self.street_buildings.clear();
        self.projectors.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.nearby_streets.is_empty()
            && self.matching_street.is_empty()
            && self.place_addresses.is_empty()
            && self.street_buildings.is_empty()
            && self.projectors.is_empty()
    }
}
