//! Normalized entity structs for the daily media feed.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Canonical calendar-day identifier used for cache and record identity.
pub type DayKey = NaiveDate;

/// Wire format for day-keys, both upstream and in persisted state.
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Parse a `YYYY-MM-DD` day-key.
pub fn parse_day(raw: &str) -> Result<DayKey, chrono::ParseError> {
    NaiveDate::parse_from_str(raw.trim(), DAY_FORMAT)
}

/// Format a day-key as `YYYY-MM-DD`.
pub fn format_day(day: DayKey) -> String {
    day.format(DAY_FORMAT).to_string()
}

/// Kind of media attached to a day's entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    /// Anything the feed labels with a type we don't render (e.g. interactive pages).
    #[serde(other)]
    Other,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Video => write!(f, "video"),
            MediaKind::Other => write!(f, "other"),
        }
    }
}

/// One day's media entry. Immutable once fetched.
///
/// Field names follow the upstream feed; the Rust names describe what the
/// field means to the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApodRecord {
    pub date: DayKey,
    pub title: String,
    pub media_type: MediaKind,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hdurl: Option<String>,
    /// Still frame for video entries (only sent when previews are requested).
    #[serde(
        rename = "thumbnail_url",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub preview_url: Option<String>,
    #[serde(rename = "explanation", default)]
    pub description: String,
    #[serde(rename = "copyright", default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_version: Option<String>,
}

impl ApodRecord {
    /// Asset to warm when the record is first fetched: the preview frame for
    /// videos, the media itself otherwise.
    pub fn preload_target(&self) -> Option<&str> {
        let target = match self.media_type {
            MediaKind::Video => self.preview_url.as_deref(),
            MediaKind::Image | MediaKind::Other => Some(self.url.as_str()),
        };
        target.filter(|url| !url.trim().is_empty())
    }

    /// Human-facing date, e.g. `Jan 5, 2024`.
    pub fn display_date(&self) -> String {
        self.date.format("%b %-d, %Y").to_string()
    }
}

/// Inclusive calendar interval, normalized so `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateInterval {
    start: DayKey,
    end: DayKey,
}

impl DateInterval {
    /// Build an interval from two days in either order.
    pub fn new(a: DayKey, b: DayKey) -> Self {
        if b < a {
            Self { start: b, end: a }
        } else {
            Self { start: a, end: b }
        }
    }

    /// Interval covering exactly one day.
    pub fn single(day: DayKey) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    pub fn start(&self) -> DayKey {
        self.start
    }

    pub fn end(&self) -> DayKey {
        self.end
    }

    /// Days between the endpoints; zero for a single-day interval.
    pub fn span_days(&self) -> u64 {
        u64::try_from(self.end.signed_duration_since(self.start).num_days()).unwrap_or(0)
    }

    /// Number of days covered, counting both endpoints.
    pub fn len_days(&self) -> u64 {
        self.span_days() + 1
    }

    pub fn contains(&self, day: DayKey) -> bool {
        self.start <= day && day <= self.end
    }

    /// Every day from `start` to `end`, ascending.
    pub fn days(&self) -> impl Iterator<Item = DayKey> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }
}

impl std::fmt::Display for DateInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", format_day(self.start), format_day(self.end))
    }
}

/// Order in which days are rendered and paged.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Most recent day first; paging walks backwards from the end date.
    #[default]
    Newest,
    /// Earliest day first; paging walks forwards from the start date.
    Oldest,
}

impl std::fmt::Display for SortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Newest => write!(f, "newest"),
            Self::Oldest => write!(f, "oldest"),
        }
    }
}

/// Restricts the view by like-state.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LikeFilter {
    #[default]
    All,
    Liked,
    Unliked,
}

impl LikeFilter {
    pub fn admits(self, liked: bool) -> bool {
        match self {
            Self::All => true,
            Self::Liked => liked,
            Self::Unliked => !liked,
        }
    }
}

impl std::fmt::Display for LikeFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Liked => write!(f, "liked"),
            Self::Unliked => write!(f, "unliked"),
        }
    }
}
