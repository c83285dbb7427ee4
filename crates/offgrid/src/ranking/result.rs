use std::ops::Range;

use offgrid_data::{FeatureRef, TypeId, geometry::Point};

use crate::{model::SearchType, ranking::info::RankingInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResultKind {
    /// A feature of a map tile.
    Feature,
    /// A coordinate typed in as the query.
    LatLon,
}

/// One presentation-ready search result.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SearchResult {
    pub kind: ResultKind,
    pub feature: Option<FeatureRef>,
    pub center: Point,
    /// Display name in the query locale when the feature has one.
    pub name: String,
    /// Byte ranges of `name` matched by query tokens.
    pub highlights: Vec<Range<usize>>,
    /// "street, house number, city, country", missing parts skipped.
    pub address: String,
    pub best_type: Option<TypeId>,
    pub search_type: Option<SearchType>,
    pub ranking: Option<RankingInfo>,
}

impl SearchResult {
    pub fn lat_lon(lat: f64, lon: f64) -> Self {
        Self {
            kind: ResultKind::LatLon,
            feature: None,
            center: Point::new(lon, lat),
            name: format!("{lat:.6}, {lon:.6}"),
            highlights: Vec::new(),
            address: String::new(),
            best_type: None,
            search_type: None,
            ranking: None,
        }
    }
}

/// How a result stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EndMarker {
    Finished,
    Cancelled,
}

/// A snapshot of the results of one query. The last snapshot of a query
/// carries an end marker.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Results {
    pub items: Vec<SearchResult>,
    pub end: Option<EndMarker>,
    /// The query hit its deadline, so more results may exist.
    pub incomplete: bool,
}

impl Results {
    pub fn finished(items: Vec<SearchResult>) -> Self {
        Self {
            items,
            end: Some(EndMarker::Finished),
            incomplete: false,
        }
    }

    pub fn is_end(&self) -> bool {
        self.end.is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        self.end == Some(EndMarker::Cancelled)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SearchResult> {
        self.items.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|r| r.name.as_str())
    }
}
