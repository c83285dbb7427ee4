//! Countries, states, cities and villages named by the query.

use std::cmp::Reverse;

use ahash::AHashMap as HashMap;
use offgrid_data::{
    FeatureId, FeatureRef, MapTile,
    geometry::{Point, Rect, rect_around},
};
use tracing::{debug, warn};

use crate::{
    geocoder::filter::intersect,
    model::{Model, SearchType, locality_radius_m},
    query::{QueryParams, TokenRange},
};

/// A locality candidate and the tokens it was matched by.
#[derive(Debug, Clone, PartialEq)]
pub struct Locality {
    pub id: FeatureRef,
    pub search_type: SearchType,
    pub range: TokenRange,
    pub rank: u8,
    pub center: Point,
    pub population: u64,
    /// False when the range ends with the prefix token and the name only
    /// starts with it.
    pub exact_match: bool,
}

impl Locality {
    /// Area searched for streets and buildings of a city or village.
    pub fn search_rect(&self) -> Rect {
        rect_around(self.center, locality_radius_m(self.search_type, self.population))
    }

    pub const fn is_region(&self) -> bool {
        matches!(self.search_type, SearchType::Country | SearchType::State)
    }
}

/// Localities of `kinds` in `tile` matched by contiguous token ranges.
///
/// Ranges made of numbers only never name a locality. A feature matched by
/// several ranges keeps the longest. At most `max_per_kind` candidates of
/// each kind are kept, the ones covering more tokens first, then by rank.
pub fn find_localities(
    tile: &MapTile,
    model: &Model,
    query: &QueryParams,
    token_ids: &[Vec<FeatureId>],
    exact_last: &[FeatureId],
    kinds: &[SearchType],
    max_per_kind: usize,
) -> Vec<Locality> {
    let n = token_ids.len().min(query.len());
    let mut best: HashMap<FeatureId, Locality> = HashMap::new();

    for start in 0..n {
        let mut ids = token_ids[start].clone();
        for end in start + 1..=n {
            if end > start + 1 {
                ids = intersect(&ids, &token_ids[end - 1]);
            }
            if ids.is_empty() {
                break;
            }
            let range = TokenRange::new(start, end);
            if query.is_number_tokens(range) {
                continue;
            }
            for &id in &ids {
                let Some(feature) = tile.feature(id) else {
                    warn!(tile = tile.name(), id, "Missing locality feature, dropped");
                    continue;
                };
                let search_type = model.search_type(feature);
                if !kinds.contains(&search_type) {
                    continue;
                }
                if best.get(&id).is_some_and(|l| l.range.len() >= range.len()) {
                    continue;
                }
                let Some(center) = tile.center(id) else {
                    continue;
                };
                let exact_match =
                    !query.range_has_prefix(range) || exact_last.binary_search(&id).is_ok();
                best.insert(
                    id,
                    Locality {
                        id: FeatureRef::new(tile.id(), id),
                        search_type,
                        range,
                        rank: feature.rank,
                        center,
                        population: feature.population,
                        exact_match,
                    },
                );
            }
        }
    }

    let mut localities: Vec<Locality> = best.into_values().collect();
    localities.sort_by_key(|l| (l.search_type, Reverse(l.range.len()), Reverse(l.rank), l.id));
    let mut kept = Vec::with_capacity(localities.len());
    let mut per_kind = [0usize; SearchType::COUNT];
    for locality in localities {
        let count = &mut per_kind[locality.search_type.index()];
        if *count < max_per_kind {
            *count += 1;
            kept.push(locality);
        }
    }
    debug!(tile = tile.name(), localities = kept.len(), "Localities found");
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use offgrid_data::{
        CategoriesTable, Synonyms,
        test_data::{COUNTRY_TILE, TestWorld, WORLD_TILE},
    };

    fn token_ids(tile: &MapTile, query: &QueryParams) -> Vec<Vec<FeatureId>> {
        query
            .tokens()
            .iter()
            .enumerate()
            .map(|(i, t)| {
                if query.is_prefix_token(i) {
                    tile.index.prefix(&t.original)
                } else {
                    tile.index.exact(&t.original)
                }
            })
            .collect()
    }

    fn query(text: &str) -> QueryParams {
        QueryParams::new(text, "en", &CategoriesTable::new(), &Synonyms::new())
    }

    #[test]
    fn test_city_and_country_in_world_tile() {
        let world = TestWorld::sample().unwrap();
        let model = Model::new(&world.classif);
        let tile = world.tile(WORLD_TILE).unwrap();
        let q = query("main street springfield testland ");
        let ids = token_ids(tile, &q);
        let localities = find_localities(
            tile,
            &model,
            &q,
            &ids,
            &ids[ids.len() - 1],
            &[SearchType::Country, SearchType::State, SearchType::City],
            5,
        );
        assert_eq!(localities.len(), 2);
        assert_eq!(localities[0].search_type, SearchType::City);
        assert_eq!(localities[0].range, TokenRange::new(2, 3));
        assert_eq!(localities[1].search_type, SearchType::Country);
        assert_eq!(localities[1].range, TokenRange::new(3, 4));
        assert!(localities[0].search_rect().width() > 0.1);
    }

    #[test]
    fn test_longest_range_wins() {
        let world = TestWorld::sample().unwrap();
        let model = Model::new(&world.classif);
        let tile = world.tile(COUNTRY_TILE).unwrap();
        let q = query("little hamlet");
        let ids = token_ids(tile, &q);
        let localities =
            find_localities(tile, &model, &q, &ids, &[], &[SearchType::Village], 5);
        assert_eq!(localities.len(), 1);
        assert_eq!(localities[0].range, TokenRange::new(0, 2));
        // "hamlet" is still being typed and no exact list was given.
        assert!(!localities[0].exact_match);
    }

    #[test]
    fn test_per_kind_limit() {
        let world = TestWorld::sample().unwrap();
        let model = Model::new(&world.classif);
        let tile = world.tile(WORLD_TILE).unwrap();
        let q = query("springfield north province ");
        let ids = token_ids(tile, &q);
        let kinds = [SearchType::State, SearchType::City];
        assert_eq!(find_localities(tile, &model, &q, &ids, &[], &kinds, 5).len(), 2);
        assert!(find_localities(tile, &model, &q, &ids, &[], &kinds, 0).is_empty());
    }
}
