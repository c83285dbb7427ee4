//! Scoring of geocoder hits: a cheap pre-ranking stage that batches and
//! de-duplicates raw hits, then full ranking with name matching, address
//! formatting and result de-duplication.

pub mod address;
pub mod display;
pub mod info;
pub mod name_score;
pub mod pre_ranker;
pub mod ranker;
pub mod result;

pub use info::{MAX_DISTANCE_M, PreRankerResult, PreRankingInfo, RankingInfo, TokenRanges};
pub use name_score::{NameMatch, NameScore};
pub use pre_ranker::{NestedRectsCache, PreRanker, PreRankerParams};
pub use ranker::{Ranker, RankerParams, RankerResult, RankerResultMaker};
pub use result::{EndMarker, ResultKind, Results, SearchResult};
