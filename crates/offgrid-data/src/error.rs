use thiserror::Error;

pub type Result<T> = std::result::Result<T, DataError>;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Unknown type path: {0}")]
    UnknownType(String),
    #[error("Feature #{0} has a degenerate geometry")]
    DegenerateGeometry(u32),
    #[error("Invalid house number range on feature #{id}: {value}")]
    InvalidInterpolationRange { id: u32, value: String },
    #[error("Tile {0} has no features")]
    EmptyTile(String),
    #[error("Duplicate tile id: {0}")]
    DuplicateTile(u16),
}
