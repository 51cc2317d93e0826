//! Data acquisition for the daily picture feed.
//!
//! Layered bottom-up: [`cache::BoundedCache`] holds fetched days,
//! [`coalesce::RangeFetchCoalescer`] turns an interval into the fewest
//! upstream requests, [`pagination::PaginationController`] pulls fixed-size
//! pages through the coalescer, and [`selection::select`] derives what is
//! shown from what has been loaded.

pub mod cache;
pub mod coalesce;
pub mod errors;
pub mod notice;
pub mod pagination;
pub mod preload;
pub mod selection;
pub mod upstream;

pub use cache::{BoundedCache, CacheError, CacheStats};
pub use coalesce::{FetchOutcome, FetchReport, RangeFetchCoalescer};
pub use errors::{FailureClass, FetchError};
pub use notice::{Notice, NoticeBoard, NoticeKind};
pub use pagination::{
    Accumulator, ControllerState, PageCursor, PageOutcome, PaginationController,
    PaginationSettings,
};
pub use preload::{HttpPreloader, MediaPreloader, NoopPreloader};
pub use selection::{SelectionInputs, TitleMatcher, select};
pub use upstream::{ApodClient, Upstream};
