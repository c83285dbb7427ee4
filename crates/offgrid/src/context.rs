use std::sync::Arc;

use ahash::AHashSet as HashSet;
use offgrid_data::{
    CategoriesTable, CitiesBoundaries, Classificator, DataError, Feature, FeatureRef, MapTile,
    RegionInfo, Synonyms, TileId, geometry::Point, test_data::TestWorld,
};
use tracing::info;

use crate::{error::Result, model::Model};

/// Read-only data shared by every query: the classificator and its compiled
/// rules, category and synonym tables, region lookups and the loaded tiles.
///
/// Built once and shared between engine threads behind an `Arc`.
#[derive(Debug)]
pub struct SearchContext {
    pub classif: Arc<Classificator>,
    pub categories: CategoriesTable,
    pub synonyms: Synonyms,
    pub regions: RegionInfo,
    pub cities_boundaries: CitiesBoundaries,
    pub model: Model,
    tiles: Vec<Arc<MapTile>>,
}

impl SearchContext {
    pub fn new(
        classif: Arc<Classificator>,
        categories: CategoriesTable,
        synonyms: Synonyms,
        regions: RegionInfo,
        cities_boundaries: CitiesBoundaries,
        tiles: Vec<Arc<MapTile>>,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        for tile in &tiles {
            if !seen.insert(tile.id()) {
                return Err(DataError::DuplicateTile(tile.id().0).into());
            }
        }
        let model = Model::new(&classif);
        info!(tiles = tiles.len(), types = classif.len(), "Search context ready");
        Ok(Self {
            classif,
            categories,
            synonyms,
            regions,
            cities_boundaries,
            model,
            tiles,
        })
    }

    pub fn tiles(&self) -> &[Arc<MapTile>] {
        &self.tiles
    }

    pub fn tile(&self, id: TileId) -> Option<&Arc<MapTile>> {
        self.tiles.iter().find(|t| t.id() == id)
    }

    /// The tile holding countries, states and major cities, if loaded.
    pub fn world(&self) -> Option<&Arc<MapTile>> {
        self.tiles.iter().find(|t| t.is_world())
    }

    pub fn feature(&self, r: FeatureRef) -> Option<&Feature> {
        self.tile(r.tile)?.feature(r.id)
    }

    pub fn center(&self, r: FeatureRef) -> Option<Point> {
        self.tile(r.tile)?.center(r.id)
    }
}

impl TryFrom<TestWorld> for SearchContext {
    type Error = crate::error::OffgridError;

    fn try_from(world: TestWorld) -> Result<Self> {
        Self::new(
            world.classif,
            world.categories,
            world.synonyms,
            world.regions,
            world.cities_boundaries,
            world.tiles,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OffgridError;

    #[test]
    fn test_context_from_test_world() {
        let ctx = SearchContext::try_from(TestWorld::sample().unwrap()).unwrap();
        assert_eq!(ctx.tiles().len(), 2);
        assert!(ctx.world().is_some_and(|w| w.is_world()));
    }

    #[test]
    fn test_duplicate_tiles_are_rejected() {
        let mut world = TestWorld::sample().unwrap();
        let first = world.tiles[0].clone();
        world.tiles.push(first);
        let result = SearchContext::try_from(world);
        assert!(matches!(
            result,
            Err(OffgridError::Data(DataError::DuplicateTile(0)))
        ));
    }
}
