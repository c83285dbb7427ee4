//! Offgrid - Offline Map Search
//!
//! Offgrid turns free-text queries into ranked map features. Everything runs
//! against local tiles: a token index per tile, a feature table and a
//! spatial index. No network access is needed.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use offgrid::{Engine, SearchConfig, SearchContext, SearchParams};
//! use offgrid::data::{
//!     geometry::{Point, rect_around},
//!     test_data::TestWorld,
//! };
//!
//! // Load the data every query shares
//! let ctx = Arc::new(SearchContext::try_from(TestWorld::sample()?)?);
//!
//! // Start a pool of search threads
//! let engine = Engine::new(ctx, SearchConfig::default())?;
//!
//! // Search around the visible part of the map
//! let viewport = rect_around(Point::new(10.0, 50.0), 2_000.0);
//! let results = engine.search(SearchParams::new("blue cafe", viewport))?.wait();
//! if let Some(first) = results.items.first() {
//!     println!("Found: {} ({})", first.name, first.address);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Pipeline
//!
//! - **Query parsing**: tokens, the unfinished prefix token, categories and
//!   house numbers
//! - **Geocoding**: regions, cities and villages first, then streets,
//!   buildings and POIs nested inside them, tile by tile
//! - **Pre-ranking**: cheap per-hit scores, deduplication and a spatial
//!   spread of the survivors
//! - **Ranking**: name matching, distances and ranks folded into one score
//!   and a display form for each result
//! - **Engine**: a thread pool that serves queries and applies settings
//!   changes to every thread
use once_cell::sync::OnceCell;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

pub mod cancel;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod geocoder;
pub mod geometry;
pub mod layers;
pub mod model;
pub mod params;
pub mod processor;
pub mod query;
pub mod ranking;

pub use cancel::{CancelToken, Cancelled};
pub use config::{SearchConfig, SearchConfigBuilder};
pub use context::SearchContext;
pub use engine::{Broadcast, Engine, QueryHandle};
pub use error::OffgridError;
pub use offgrid_data as data;
pub use params::{Mode, SearchParams};
pub use processor::Processor;
pub use ranking::{EndMarker, Results, SearchResult};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Initialize logging for the Offgrid library.
///
/// `RUST_LOG` takes precedence over `level` when it is set. Calling this
/// more than once is a no-op.
///
/// # Examples
///
/// ```rust
/// use offgrid::init_logging;
/// use tracing::Level;
///
/// init_logging(Level::INFO)?;
/// # Ok::<(), offgrid::OffgridError>(())
/// ```
pub fn init_logging(level: impl Into<LevelFilter>) -> Result<&'static (), OffgridError> {
    LOGGER_INIT.get_or_try_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level.into().to_string()))?;

        tracing_subscriber::fmt::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .init();
        Ok(())
    })
}

#[cfg(test)]
pub(crate) fn setup_test_env() {
    let _ = init_logging(tracing::Level::WARN);
}
