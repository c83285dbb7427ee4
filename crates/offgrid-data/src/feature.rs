//! Feature records stored in a map tile.

use geo::{BoundingRect, Centroid};

use crate::{
    classif::TypeId,
    geometry::{LineString, Point, Polygon, Rect},
};

/// Index of a feature inside its tile.
pub type FeatureId = u32;

/// Identifier of a map tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TileId(pub u16);

/// A feature address that is unique across all loaded tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureRef {
    pub tile: TileId,
    pub id: FeatureId,
}

impl FeatureRef {
    pub const fn new(tile: TileId, id: FeatureId) -> Self {
        Self { tile, id }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GeomKind {
    Point,
    Line,
    Area,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Point),
    Line(LineString),
    Area(Polygon),
}

impl Geometry {
    pub const fn kind(&self) -> GeomKind {
        match self {
            Self::Point(_) => GeomKind::Point,
            Self::Line(_) => GeomKind::Line,
            Self::Area(_) => GeomKind::Area,
        }
    }

    /// Representative point: the point itself, or the centroid of a line/area.
    pub fn center(&self) -> Option<Point> {
        match self {
            Self::Point(p) => Some(*p),
            Self::Line(l) => l.centroid(),
            Self::Area(a) => a.centroid(),
        }
    }

    pub fn bounding_rect(&self) -> Option<Rect> {
        match self {
            Self::Point(p) => Some(Rect::new(p.0, p.0)),
            Self::Line(l) => l.bounding_rect(),
            Self::Area(a) => a.bounding_rect(),
        }
    }
}

/// House number interpolation kind of an `addr:interpolation` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Interpolation {
    Odd,
    Even,
    All,
}

/// A name in one language. `lang` is `"default"` for the local name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name {
    pub lang: String,
    pub text: String,
}

pub const DEFAULT_LANG: &str = "default";

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: FeatureId,
    pub names: Vec<Name>,
    /// Alternative and historical names, matched but shown only in brackets.
    pub alt_names: Vec<String>,
    pub types: Vec<TypeId>,
    pub geometry: Geometry,
    pub house_number: Option<String>,
    /// `addr:street` of an address feature.
    pub street: Option<String>,
    /// `addr:place` of an address feature that has no street.
    pub place: Option<String>,
    pub postcode: Option<String>,
    pub interpolation: Option<Interpolation>,
    /// Population-derived importance, 0..=255.
    pub rank: u8,
    pub popularity: u8,
    pub population: u64,
    /// Lowest zoom level the feature is visible at.
    pub min_scale: u8,
}

impl Feature {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            id: 0,
            names: Vec::new(),
            alt_names: Vec::new(),
            types: Vec::new(),
            geometry,
            house_number: None,
            street: None,
            place: None,
            postcode: None,
            interpolation: None,
            rank: 0,
            popularity: 0,
            population: 0,
            min_scale: 0,
        }
    }

    pub fn point(lon: f64, lat: f64) -> Self {
        Self::new(Geometry::Point(Point::new(lon, lat)))
    }

    pub fn line(coords: &[(f64, f64)]) -> Self {
        Self::new(Geometry::Line(LineString::from(coords.to_vec())))
    }

    pub fn area(exterior: &[(f64, f64)]) -> Self {
        Self::new(Geometry::Area(Polygon::new(
            LineString::from(exterior.to_vec()),
            vec![],
        )))
    }

    pub fn named(mut self, text: impl Into<String>) -> Self {
        self.names.push(Name {
            lang: DEFAULT_LANG.to_owned(),
            text: text.into(),
        });
        self
    }

    pub fn named_in(mut self, lang: impl Into<String>, text: impl Into<String>) -> Self {
        self.names.push(Name {
            lang: lang.into(),
            text: text.into(),
        });
        self
    }

    pub fn alt_name(mut self, text: impl Into<String>) -> Self {
        self.alt_names.push(text.into());
        self
    }

    pub fn typed(mut self, t: TypeId) -> Self {
        if !self.types.contains(&t) {
            self.types.push(t);
        }
        self
    }

    pub fn house_number(mut self, hn: impl Into<String>) -> Self {
        self.house_number = Some(hn.into());
        self
    }

    pub fn on_street(mut self, street: impl Into<String>) -> Self {
        self.street = Some(street.into());
        self
    }

    pub fn in_place(mut self, place: impl Into<String>) -> Self {
        self.place = Some(place.into());
        self
    }

    pub fn postcode(mut self, postcode: impl Into<String>) -> Self {
        self.postcode = Some(postcode.into());
        self
    }

    pub const fn interpolated(mut self, kind: Interpolation) -> Self {
        self.interpolation = Some(kind);
        self
    }

    pub const fn rank(mut self, rank: u8) -> Self {
        self.rank = rank;
        self
    }

    pub const fn popularity(mut self, popularity: u8) -> Self {
        self.popularity = popularity;
        self
    }

    pub const fn population(mut self, population: u64) -> Self {
        self.population = population;
        self
    }

    pub const fn min_scale(mut self, scale: u8) -> Self {
        self.min_scale = scale;
        self
    }

    pub fn default_name(&self) -> Option<&str> {
        self.name(DEFAULT_LANG)
            .or_else(|| self.names.first().map(|n| n.text.as_str()))
    }

    pub fn name(&self, lang: &str) -> Option<&str> {
        self.names
            .iter()
            .find(|n| n.lang == lang)
            .map(|n| n.text.as_str())
    }

    pub fn has_name(&self) -> bool {
        !self.names.is_empty()
    }

    /// Every name the feature can be found by, with a flag set for
    /// alternative/historical names. Alternative names may hold several
    /// variants separated by `;`.
    pub fn searchable_names(&self) -> impl Iterator<Item = (&str, bool)> {
        self.names
            .iter()
            .map(|n| (n.text.as_str(), false))
            .chain(
                self.alt_names
                    .iter()
                    .flat_map(|n| n.split(';'))
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(|n| (n, true)),
            )
    }

    pub fn center(&self) -> Option<Point> {
        self.geometry.center()
    }

    pub fn bounding_rect(&self) -> Option<Rect> {
        self.geometry.bounding_rect()
    }

    pub const fn geom_kind(&self) -> GeomKind {
        self.geometry.kind()
    }

    pub fn has_type(&self, t: TypeId) -> bool {
        self.types.contains(&t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_name_falls_back_to_first() {
        let f = Feature::point(0.0, 0.0).named_in("en", "Cafe");
        assert_eq!(f.default_name(), Some("Cafe"));
        let f = f.named("Кафе");
        assert_eq!(f.default_name(), Some("Кафе"));
        assert_eq!(f.name("en"), Some("Cafe"));
    }

    #[test]
    fn test_alt_names_split_on_semicolon() {
        let f = Feature::point(0.0, 0.0)
            .named("Tverskaya")
            .alt_name("Gorky Street; Yamskaya");
        let names: Vec<_> = f.searchable_names().collect();
        assert_eq!(
            names,
            vec![
                ("Tverskaya", false),
                ("Gorky Street", true),
                ("Yamskaya", true)
            ]
        );
    }

    #[test]
    fn test_line_center_and_rect() {
        let f = Feature::line(&[(0.0, 0.0), (2.0, 0.0)]);
        let c = f.center().unwrap();
        assert!((c.x() - 1.0).abs() < 1e-9);
        let r = f.bounding_rect().unwrap();
        assert_eq!(r.min().x, 0.0);
        assert_eq!(r.max().x, 2.0);
        assert_eq!(f.geom_kind(), GeomKind::Line);
    }
}
