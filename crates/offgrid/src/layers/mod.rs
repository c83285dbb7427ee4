//! Feature layers and the joins between them.
//!
//! A layer is the set of features of one search type matched by one token
//! range. The geocoder stacks layers for disjoint token ranges; the path
//! finder then walks from the most general layer to the most specific one,
//! using the matcher to compute belongs-to pairs between adjacent layers.

pub mod cache;
pub mod matcher;
pub mod path_finder;

use offgrid_data::FeatureId;

use crate::{
    model::SearchType,
    query::{QueryParams, TokenRange},
};

pub use cache::{IdCache, MatcherCaches};
pub use matcher::{FeaturesLayerMatcher, LayerMatcher};
pub use path_finder::{FeaturesLayerPathFinder, PathFinderMode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeaturesLayer {
    pub search_type: SearchType,
    pub range: TokenRange,
    /// Sorted, free of duplicates.
    pub features: Vec<FeatureId>,
    /// Buildings not retrieved from the index: they are found during
    /// matching by comparing house numbers with `sub_query`.
    pub has_delayed_features: bool,
    pub last_token_is_prefix: bool,
    pub sub_query: String,
}

impl FeaturesLayer {
    pub fn new(
        search_type: SearchType,
        range: TokenRange,
        mut features: Vec<FeatureId>,
        query: &QueryParams,
    ) -> Self {
        features.sort_unstable();
        features.dedup();
        Self {
            search_type,
            range,
            features,
            has_delayed_features: false,
            last_token_is_prefix: query.range_has_prefix(range),
            sub_query: query.range_text(range),
        }
    }

    /// A building layer whose features are matched by house number later.
    pub fn delayed_buildings(range: TokenRange, query: &QueryParams) -> Self {
        let mut layer = Self::new(SearchType::Building, range, Vec::new(), query);
        layer.has_delayed_features = true;
        layer
    }

    /// A copy restricted to `features`, which are then known explicitly.
    pub fn narrowed(&self, mut features: Vec<FeatureId>) -> Self {
        features.sort_unstable();
        features.dedup();
        Self {
            features,
            has_delayed_features: false,
            sub_query: self.sub_query.clone(),
            ..*self
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn contains(&self, id: FeatureId) -> bool {
        self.features.binary_search(&id).is_ok()
    }
}

/// One path through the layer stack: the feature chosen on every level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct IntersectionResult {
    pub sub_poi: Option<FeatureId>,
    pub complex_poi: Option<FeatureId>,
    pub building: Option<FeatureId>,
    pub street: Option<FeatureId>,
    pub suburb: Option<FeatureId>,
}

impl IntersectionResult {
    pub fn set(&mut self, search_type: SearchType, id: FeatureId) {
        match search_type {
            SearchType::SubPoi => self.sub_poi = Some(id),
            SearchType::ComplexPoi => self.complex_poi = Some(id),
            SearchType::Building => self.building = Some(id),
            SearchType::Street => self.street = Some(id),
            SearchType::Suburb => self.suburb = Some(id),
            _ => {}
        }
    }

    pub fn get(&self, search_type: SearchType) -> Option<FeatureId> {
        match search_type {
            SearchType::SubPoi => self.sub_poi,
            SearchType::ComplexPoi => self.complex_poi,
            SearchType::Building => self.building,
            SearchType::Street => self.street,
            SearchType::Suburb => self.suburb,
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.innermost().is_some()
    }

    /// The most specific feature on the path.
    pub fn innermost(&self) -> Option<FeatureId> {
        self.sub_poi
            .or(self.complex_poi)
            .or(self.building)
            .or(self.street)
            .or(self.suburb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use offgrid_data::{CategoriesTable, Synonyms};

    #[test]
    fn test_layer_features_are_sorted_unique() {
        let query = QueryParams::new("main street", "en", &CategoriesTable::new(), &Synonyms::new());
        let layer = FeaturesLayer::new(
            SearchType::Street,
            TokenRange::new(0, 2),
            vec![5, 1, 5, 3],
            &query,
        );
        assert_eq!(layer.features, vec![1, 3, 5]);
        assert!(layer.last_token_is_prefix);
        assert_eq!(layer.sub_query, "main street");
        assert!(layer.contains(3));

        let narrowed = layer.narrowed(vec![3]);
        assert_eq!(narrowed.features, vec![3]);
        assert_eq!(narrowed.range, layer.range);
    }

    #[test]
    fn test_intersection_result() {
        let mut result = IntersectionResult::default();
        assert!(!result.is_valid());
        result.set(SearchType::Street, 4);
        result.set(SearchType::Building, 9);
        assert_eq!(result.innermost(), Some(9));
        assert_eq!(result.get(SearchType::Street), Some(4));
    }
}
