use std::time::Duration;

use offgrid_data::geometry::{Point, Rect};

/// Where a query looks for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mode {
    /// Everywhere, nearest to the viewport first.
    #[default]
    Everywhere,
    /// Only inside the viewport, ordered by distance.
    Viewport,
    /// Only countries, states and cities, for picking maps to download.
    Downloader,
    /// Bookmarks are searched elsewhere: always empty.
    Bookmarks,
}

/// A search request.
///
/// # Examples
///
/// ```rust
/// use offgrid::{Mode, SearchParams};
/// use offgrid_data::geometry::{Point, rect_around};
///
/// let params = SearchParams::new("main street 2", rect_around(Point::new(10.0, 50.0), 2_000.0))
///     .with_locale("en")
///     .with_mode(Mode::Everywhere)
///     .with_max_results(10);
/// assert_eq!(params.max_results, Some(10));
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SearchParams {
    pub query: String,
    pub viewport: Rect,
    /// The user's position, if known.
    pub position: Option<Point>,
    /// Locale of the query. The engine's locale is used when unset.
    pub locale: Option<String>,
    pub mode: Mode,
    /// Overrides the configured number of results.
    pub max_results: Option<usize>,
    /// Overrides the configured timeout.
    pub timeout: Option<Duration>,
}

impl SearchParams {
    pub fn new(query: impl Into<String>, viewport: Rect) -> Self {
        Self {
            query: query.into(),
            viewport,
            position: None,
            locale: None,
            mode: Mode::default(),
            max_results: None,
            timeout: None,
        }
    }

    pub fn with_position(mut self, position: Point) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub const fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub const fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
