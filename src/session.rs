//! A browsing session: one pagination controller plus the user's selection
//! inputs and liked set, wired together.
//!
//! Query and like filter only change what [`BrowseSession::visible`] returns.
//! Interval and sort change what is fetched, so setting either resets paging.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::FeedConfig;
use crate::feed::{
    ApodClient, CacheError, ControllerState, FetchError, HttpPreloader, MediaPreloader,
    NoopPreloader, Notice, PageOutcome, PaginationController, PaginationSettings,
    RangeFetchCoalescer, SelectionInputs, Upstream, select,
};
use crate::likes::{LikedSet, LikesError};
use crate::model::{ApodRecord, DateInterval, DayKey, LikeFilter, SortDirection};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("could not build feed client: {0}")]
    Client(#[from] FetchError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Likes(#[from] LikesError),
}

#[derive(Debug)]
pub struct BrowseSession {
    controller: PaginationController,
    liked: LikedSet,
    query: String,
    like_filter: LikeFilter,
}

impl BrowseSession {
    pub fn new(
        coalescer: Arc<RangeFetchCoalescer>,
        liked: LikedSet,
        interval: DateInterval,
        sort: SortDirection,
        settings: PaginationSettings,
    ) -> Self {
        Self {
            controller: PaginationController::new(coalescer, interval, sort, settings),
            liked,
            query: String::new(),
            like_filter: LikeFilter::All,
        }
    }

    /// Session against the live feed, with likes loaded from the configured file.
    ///
    /// A likes file that exists but cannot be read is an error rather than an
    /// empty set, since liking a day would otherwise overwrite it.
    pub fn from_config(
        config: &FeedConfig,
        interval: DateInterval,
        sort: SortDirection,
    ) -> Result<Self, SessionError> {
        let upstream: Arc<dyn Upstream> = Arc::new(ApodClient::from_config(config)?);
        let preloader: Arc<dyn MediaPreloader> = if config.preload_media {
            Arc::new(HttpPreloader::new(config.preload_timeout())?)
        } else {
            Arc::new(NoopPreloader)
        };
        let coalescer = RangeFetchCoalescer::new(upstream, preloader, config.cache_capacity)?
            .with_preload_timeout(config.preload_timeout());
        let liked = LikedSet::try_load(&config.likes_path())?;
        debug!(
            interval = %interval,
            sort = %sort,
            liked = liked.len(),
            "browse session ready"
        );
        Ok(Self::new(
            Arc::new(coalescer),
            liked,
            interval,
            sort,
            config.pagination_settings(),
        ))
    }

    // -- Selection inputs --

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    pub fn like_filter(&self) -> LikeFilter {
        self.like_filter
    }

    pub fn set_like_filter(&mut self, filter: LikeFilter) {
        self.like_filter = filter;
    }

    pub fn sort(&self) -> SortDirection {
        self.controller.sort()
    }

    /// Returns true if paging was reset.
    pub fn set_sort(&mut self, sort: SortDirection) -> bool {
        self.controller.set_sort(sort)
    }

    pub fn interval(&self) -> DateInterval {
        self.controller.interval()
    }

    /// Returns true if paging was reset.
    pub fn set_interval(&mut self, interval: DateInterval) -> bool {
        self.controller.set_interval(interval)
    }

    pub fn selection_inputs(&self) -> SelectionInputs {
        SelectionInputs {
            query: self.query.clone(),
            like_filter: self.like_filter,
            sort: self.controller.sort(),
        }
    }

    // -- Paging --

    pub fn state(&self) -> ControllerState {
        self.controller.state()
    }

    pub fn has_more(&self) -> bool {
        self.controller.has_more()
    }

    pub fn load_next_page(&mut self) -> bool {
        self.controller.load_next_page()
    }

    pub fn poll(&mut self) -> Option<PageOutcome> {
        self.controller.poll()
    }

    pub async fn settle(&mut self) -> PageOutcome {
        self.controller.settle().await
    }

    pub fn reset(&mut self) {
        self.controller.reset();
    }

    /// Load and settle pages one after another until the interval is
    /// exhausted, a page fails, or `max_pages` pages were loaded.
    pub async fn load_pages(&mut self, max_pages: Option<usize>) -> Vec<PageOutcome> {
        let mut outcomes = Vec::new();
        while max_pages.is_none_or(|max| outcomes.len() < max) {
            if !self.controller.load_next_page() {
                break;
            }
            let outcome = self.controller.settle().await;
            let failed = matches!(outcome, PageOutcome::Failed(_));
            outcomes.push(outcome);
            if failed {
                break;
            }
        }
        outcomes
    }

    pub fn controller(&self) -> &PaginationController {
        &self.controller
    }

    pub fn notices(&mut self) -> &[Notice] {
        self.controller.notices()
    }

    // -- Records --

    /// Everything loaded for the current interval and sort, in delivery order.
    pub fn records(&self) -> &[ApodRecord] {
        self.controller.records()
    }

    /// The rendered list for the current inputs.
    pub fn visible(&self) -> Vec<&ApodRecord> {
        select(
            self.controller.records(),
            &self.selection_inputs(),
            &self.liked,
        )
    }

    // -- Likes --

    pub fn liked(&self) -> &LikedSet {
        &self.liked
    }

    pub fn is_liked(&self, day: DayKey) -> bool {
        self.liked.contains(day)
    }

    pub fn like(&mut self, day: DayKey) -> bool {
        let changed = self.liked.like(day);
        if changed {
            self.persist_likes();
        }
        changed
    }

    pub fn unlike(&mut self, day: DayKey) -> bool {
        let changed = self.liked.unlike(day);
        if changed {
            self.persist_likes();
        }
        changed
    }

    /// Returns the new like-state.
    pub fn toggle_like(&mut self, day: DayKey) -> bool {
        let liked = self.liked.toggle(day);
        self.persist_likes();
        liked
    }

    fn persist_likes(&self) {
        if let Err(err) = self.liked.save() {
            warn!(error = %err, "failed to save likes");
        }
    }
}
