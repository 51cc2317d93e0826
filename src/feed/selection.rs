//! Derives the rendered list from accumulated records and the user's
//! current query, like filter and sort.
//!
//! Steps run in a fixed order: dedup by day, like filter, title match, sort.
//! Nothing here mutates its inputs.

use std::collections::HashSet;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::likes::LikedSet;
use crate::model::{ApodRecord, DayKey, LikeFilter, SortDirection};

/// User-chosen predicates applied on every recomputation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionInputs {
    pub query: String,
    pub like_filter: LikeFilter,
    pub sort: SortDirection,
}

/// Case-insensitive literal title match.
///
/// The query is escaped before compiling, so `.` or `(` in user input match
/// themselves.
#[derive(Debug, Clone)]
pub enum TitleMatcher {
    Any,
    Pattern(Regex),
    /// Used if the escaped query exceeds the regex size limit.
    Lowercase(String),
}

impl TitleMatcher {
    pub fn new(query: &str) -> Self {
        if query.is_empty() {
            return Self::Any;
        }
        match RegexBuilder::new(&regex::escape(query))
            .case_insensitive(true)
            .build()
        {
            Ok(re) => Self::Pattern(re),
            Err(_) => Self::Lowercase(query.to_lowercase()),
        }
    }

    pub fn matches(&self, title: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Pattern(re) => re.is_match(title),
            Self::Lowercase(needle) => title.to_lowercase().contains(needle.as_str()),
        }
    }
}

/// Produce the ordered view of `records` for `inputs`.
pub fn select<'a>(
    records: &'a [ApodRecord],
    inputs: &SelectionInputs,
    liked: &LikedSet,
) -> Vec<&'a ApodRecord> {
    let matcher = TitleMatcher::new(&inputs.query);
    let mut seen: HashSet<DayKey> = HashSet::with_capacity(records.len());

    let mut view: Vec<&ApodRecord> = records
        .iter()
        .filter(|record| seen.insert(record.date))
        .filter(|record| inputs.like_filter.admits(liked.contains(record.date)))
        .filter(|record| matcher.matches(&record.title))
        .collect();

    match inputs.sort {
        SortDirection::Newest => view.sort_by(|a, b| b.date.cmp(&a.date)),
        SortDirection::Oldest => view.sort_by_key(|record| record.date),
    }
    view
}
