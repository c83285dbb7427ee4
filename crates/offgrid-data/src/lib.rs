//! Map tile model and collaborator contracts for the `offgrid` geocoder.
//!
//! A map tile is a self-contained bundle of features plus the indices the
//! search pipeline reads from. This crate defines:
//!
//! - the feature model ([`Feature`], [`Geometry`], [`FeatureRef`]),
//! - the classificator and type rules ([`Classificator`], [`TypeRule`]),
//! - the collaborator traits the pipeline consumes ([`FeatureSource`],
//!   [`TokenLookup`]) with in-memory implementations,
//! - region, city boundary and reverse geocoding lookups,
//! - a [`TileBuilder`] that precomputes the house→street and place→address
//!   tables, and
//! - synthetic fixtures in [`test_data`].
//!
//! There is no on-disk container format: tiles are built in
//! memory, either by an importer or by the fixtures.

pub mod builder;
pub mod classif;
mod error;
pub mod feature;
pub mod geometry;
pub mod index;
pub mod normalize;
pub mod region;
pub mod reverse;
pub mod test_data;
pub mod tile;

pub use builder::TileBuilder;
pub use classif::{CategoriesTable, Classificator, CompiledRule, Synonyms, TypeId, TypeRule};
pub use error::{DataError, Result};
pub use feature::{
    Feature, FeatureId, FeatureRef, GeomKind, Geometry, Interpolation, Name, TileId,
};
pub use index::{TokenIndex, TokenLookup};
pub use region::{CitiesBoundaries, Region, RegionInfo};
pub use reverse::{NearbyStreet, ReverseGeocoder};
pub use tile::{
    AddressTables, FeatureSource, FeatureTable, MapTile, TileInfo, TileKind, postcode_key,
};
