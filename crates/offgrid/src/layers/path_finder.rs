//! Walks a stack of layers and reports every complete belongs-to path.
//!
//! Layers are ordered from the most specific (index 0) to the most general
//! (last). A path picks one feature per layer such that each feature
//! belongs to the one chosen on the next layer. For every bottom feature
//! with at least one complete path, exactly one path is reported: the one
//! that picks the smallest parent id on every level. Both traversal
//! directions report the same paths.

use std::collections::{BTreeMap, BTreeSet};

use offgrid_data::FeatureId;
use tracing::{debug, instrument};

use crate::{
    cancel::CancelResult,
    layers::{FeaturesLayer, IntersectionResult, LayerMatcher},
};

/// Assumed size of a layer whose buildings are only found while matching.
const DELAYED_LAYER_SIZE: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathFinderMode {
    /// From the most general layer down, narrowing each child layer.
    TopDown,
    /// From the most specific layer up, then validated top-down.
    BottomUp,
    /// Whichever direction is estimated to be cheaper.
    #[default]
    Auto,
}

/// Child id at one level → the chosen parent id on the level above.
type Links = BTreeMap<FeatureId, FeatureId>;

#[derive(Debug, Clone, Copy, Default)]
pub struct FeaturesLayerPathFinder {
    mode: PathFinderMode,
}

impl FeaturesLayerPathFinder {
    pub const fn new(mode: PathFinderMode) -> Self {
        Self { mode }
    }

    #[instrument(name = "Find paths", level = "debug", skip_all, fields(layers = layers.len()))]
    pub fn find_reachable(
        &self,
        matcher: &mut impl LayerMatcher,
        layers: &[&FeaturesLayer],
        f: &mut dyn FnMut(&IntersectionResult),
    ) -> CancelResult<()> {
        let Some(&top) = layers.last() else {
            return Ok(());
        };
        if layers
            .iter()
            .any(|l| l.is_empty() && !l.has_delayed_features)
        {
            return Ok(());
        }
        if layers.len() == 1 {
            for &id in &top.features {
                let mut result = IntersectionResult::default();
                result.set(top.search_type, id);
                f(&result);
            }
            return Ok(());
        }

        let mode = match self.mode {
            PathFinderMode::Auto => {
                let top_down = top_down_cost(layers);
                let bottom_up = bottom_up_cost(layers);
                debug!(top_down, bottom_up, "Estimated pass costs");
                if top_down <= bottom_up {
                    PathFinderMode::TopDown
                } else {
                    PathFinderMode::BottomUp
                }
            }
            mode => mode,
        };
        let links = match mode {
            PathFinderMode::BottomUp => bottom_up(matcher, layers)?,
            _ => top_down(matcher, layers)?,
        };

        let mut emitted = 0usize;
        'bottom: for &bottom in links[0].keys() {
            let mut result = IntersectionResult::default();
            let mut id = bottom;
            result.set(layers[0].search_type, id);
            for (level, level_links) in links.iter().enumerate() {
                let Some(&parent) = level_links.get(&id) else {
                    continue 'bottom;
                };
                id = parent;
                result.set(layers[level + 1].search_type, id);
            }
            emitted += 1;
            f(&result);
        }
        debug!(?mode, paths = emitted, "Paths found");
        Ok(())
    }
}

fn layer_size(layer: &FeaturesLayer) -> u64 {
    if layer.has_delayed_features {
        DELAYED_LAYER_SIZE
    } else {
        layer.len() as u64
    }
}

/// Pairs examined when each pass can only shrink the reachable set.
fn pass_cost<'a>(mut layers: impl Iterator<Item = &'a &'a FeaturesLayer>) -> u64 {
    let Some(first) = layers.next() else {
        return 0;
    };
    let mut reachable = layer_size(first);
    let mut cost = 0u64;
    for layer in layers {
        let size = layer_size(layer);
        cost = cost.saturating_add(size.max(1).saturating_mul(reachable));
        reachable = reachable.min(size);
    }
    cost
}

fn top_down_cost(layers: &[&FeaturesLayer]) -> u64 {
    pass_cost(layers.iter().rev())
}

fn bottom_up_cost(layers: &[&FeaturesLayer]) -> u64 {
    pass_cost(layers.iter())
}

fn keep_min(links: &mut Links, child: FeatureId, parent: FeatureId) {
    links
        .entry(child)
        .and_modify(|p| *p = (*p).min(parent))
        .or_insert(parent);
}

fn top_down(matcher: &mut impl LayerMatcher, layers: &[&FeaturesLayer]) -> CancelResult<Vec<Links>> {
    let n = layers.len();
    let mut links = vec![Links::new(); n - 1];
    let mut parent = layers[n - 1].clone();
    for level in (0..n - 1).rev() {
        let child = layers[level];
        let level_links = &mut links[level];
        matcher.match_layers(child, &parent, &mut |c, p| keep_min(level_links, c, p))?;
        if level_links.is_empty() {
            break;
        }
        parent = child.narrowed(level_links.keys().copied().collect());
    }
    Ok(links)
}

fn bottom_up(matcher: &mut impl LayerMatcher, layers: &[&FeaturesLayer]) -> CancelResult<Vec<Links>> {
    let n = layers.len();
    let mut edges: Vec<Vec<(FeatureId, FeatureId)>> = Vec::with_capacity(n - 1);
    let mut child = layers[0].clone();
    for &parent in &layers[1..] {
        let mut pairs = Vec::new();
        matcher.match_layers(&child, parent, &mut |c, p| pairs.push((c, p)))?;
        if pairs.is_empty() {
            return Ok(vec![Links::new(); n - 1]);
        }
        child = parent.narrowed(pairs.iter().map(|&(_, p)| p).collect());
        edges.push(pairs);
    }

    let mut links = vec![Links::new(); n - 1];
    let mut valid: BTreeSet<FeatureId> = child.features.iter().copied().collect();
    for (level, pairs) in edges.iter().enumerate().rev() {
        let level_links = &mut links[level];
        for &(c, p) in pairs {
            if valid.contains(&p) {
                keep_min(level_links, c, p);
            }
        }
        valid = level_links.keys().copied().collect();
    }
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cancel::Cancelled,
        model::SearchType,
        query::TokenRange,
    };

    const LAYER_TYPES: [SearchType; 5] = SearchType::LAYER_TYPES;

    fn layer(level: usize, features: Vec<FeatureId>) -> FeaturesLayer {
        FeaturesLayer {
            search_type: LAYER_TYPES[level],
            range: TokenRange::new(level, level + 1),
            features,
            has_delayed_features: false,
            last_token_is_prefix: false,
            sub_query: String::new(),
        }
    }

    /// Links a child to a parent when a fixed hash of the pair is small.
    struct HashMatcher {
        salt: u64,
        modulo: u64,
    }

    impl HashMatcher {
        fn linked(&self, t: SearchType, c: FeatureId, p: FeatureId) -> bool {
            let mut h = self.salt ^ (t.index() as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
            h ^= u64::from(c).wrapping_mul(0xbf58_476d_1ce4_e5b9);
            h = h.rotate_left(31) ^ u64::from(p).wrapping_mul(0x94d0_49bb_1331_11eb);
            h ^= h >> 29;
            h.wrapping_mul(0x2545_f491_4f6c_dd1d) % self.modulo == 0
        }
    }

    impl LayerMatcher for HashMatcher {
        fn match_layers(
            &mut self,
            child: &FeaturesLayer,
            parent: &FeaturesLayer,
            f: &mut dyn FnMut(FeatureId, FeatureId),
        ) -> CancelResult<()> {
            for &c in &child.features {
                for &p in &parent.features {
                    if self.linked(child.search_type, c, p) {
                        f(c, p);
                    }
                }
            }
            Ok(())
        }
    }

    struct CancellingMatcher;

    impl LayerMatcher for CancellingMatcher {
        fn match_layers(
            &mut self,
            _: &FeaturesLayer,
            _: &FeaturesLayer,
            _: &mut dyn FnMut(FeatureId, FeatureId),
        ) -> CancelResult<()> {
            Err(Cancelled::ByUser)
        }
    }

    fn collect(
        mode: PathFinderMode,
        matcher: &mut HashMatcher,
        layers: &[FeaturesLayer],
    ) -> Vec<IntersectionResult> {
        let refs: Vec<&FeaturesLayer> = layers.iter().collect();
        let mut results = Vec::new();
        FeaturesLayerPathFinder::new(mode)
            .find_reachable(matcher, &refs, &mut |r| results.push(*r))
            .unwrap();
        results
    }

    fn complete_path_exists(
        matcher: &HashMatcher,
        layers: &[FeaturesLayer],
        level: usize,
        id: FeatureId,
    ) -> bool {
        if level + 1 == layers.len() {
            return true;
        }
        layers[level + 1].features.iter().any(|&p| {
            matcher.linked(layers[level].search_type, id, p)
                && complete_path_exists(matcher, layers, level + 1, p)
        })
    }

    #[test]
    fn test_directions_agree_on_random_stacks() {
        let mut rng = fastrand::Rng::with_seed(7);
        for round in 0..200 {
            let depth = rng.usize(2..=LAYER_TYPES.len());
            let layers: Vec<FeaturesLayer> = (0..depth)
                .map(|level| {
                    let n = rng.usize(1..12);
                    layer(level, (0..n).map(|_| rng.u32(0..40)).collect())
                })
                .map(|l| l.narrowed(l.features.clone()))
                .collect();
            let mut matcher = HashMatcher {
                salt: rng.u64(..),
                modulo: rng.u64(2..5),
            };

            let top_down = collect(PathFinderMode::TopDown, &mut matcher, &layers);
            let bottom_up = collect(PathFinderMode::BottomUp, &mut matcher, &layers);
            let auto = collect(PathFinderMode::Auto, &mut matcher, &layers);
            assert_eq!(top_down, bottom_up, "round {round}");
            assert_eq!(top_down, auto, "round {round}");

            let expected: Vec<FeatureId> = layers[0]
                .features
                .iter()
                .copied()
                .filter(|&id| complete_path_exists(&matcher, &layers, 0, id))
                .collect();
            let bottoms: Vec<FeatureId> = top_down
                .iter()
                .filter_map(|r| r.get(LAYER_TYPES[0]))
                .collect();
            assert_eq!(bottoms, expected, "round {round}");

            for result in &top_down {
                for level in 0..depth - 1 {
                    let c = result.get(LAYER_TYPES[level]).unwrap();
                    let p = result.get(LAYER_TYPES[level + 1]).unwrap();
                    assert!(matcher.linked(LAYER_TYPES[level], c, p));
                }
            }
        }
    }

    #[test]
    fn test_single_layer_emits_every_feature() {
        let layers = vec![layer(3, vec![4, 8])];
        let mut matcher = HashMatcher { salt: 0, modulo: 2 };
        let results = collect(PathFinderMode::Auto, &mut matcher, &layers);
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].street, Some(8));
        assert_eq!(results[1].innermost(), Some(8));
    }

    #[test]
    fn test_empty_layer_short_circuits() {
        let layers = vec![layer(2, vec![]), layer(3, vec![1])];
        let mut matcher = HashMatcher { salt: 0, modulo: 1 };
        assert!(collect(PathFinderMode::TopDown, &mut matcher, &layers).is_empty());
    }

    #[test]
    fn test_cancellation_propagates() {
        let a = layer(2, vec![1]);
        let b = layer(3, vec![2]);
        for mode in [PathFinderMode::TopDown, PathFinderMode::BottomUp] {
            let result = FeaturesLayerPathFinder::new(mode).find_reachable(
                &mut CancellingMatcher,
                &[&a, &b],
                &mut |_| panic!("nothing may be emitted"),
            );
            assert_eq!(result, Err(Cancelled::ByUser));
        }
    }

    #[test]
    fn test_cost_prefers_small_top() {
        let big = layer(1, (0..500).collect());
        let mid = layer(2, (0..100).collect());
        let small = layer(3, vec![1]);
        let stack = [&big, &mid, &small];
        assert!(top_down_cost(&stack) < bottom_up_cost(&stack));
    }
}
