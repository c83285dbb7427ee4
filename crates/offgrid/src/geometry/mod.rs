pub mod point_rect_matcher;
pub mod projection;

pub use point_rect_matcher::{PointIdPair, RectIdPair, RequestType, match_points_rects};
pub use projection::{Projection, StreetProjector};
