//! Data model shared by the feed, selection, and session layers.

pub mod types;

pub use types::{
    ApodRecord, DateInterval, DayKey, LikeFilter, MediaKind, SortDirection, format_day, parse_day,
};
