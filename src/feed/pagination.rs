//! Incremental page loading over a date interval.
//!
//! The controller walks the interval in fixed-size day chunks, away from the
//! edge the current sort puts first. Each page fetch runs as a spawned task
//! that posts its result, tagged with the context it was issued under, into
//! the controller's inbox. A reset bumps the context, so a page that lands
//! after the interval or sort changed is dropped on arrival instead of
//! leaking into the fresh accumulator.
//!
//! State machine:
//!
//! ```text
//! Idle --load_next_page--> Fetching --ok, more left--> Idle
//!                                   --ok, edge hit---> Exhausted
//!                                   --failure-------> Errored
//! (any) --reset--> Idle
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Days;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::coalesce::{FetchOutcome, FetchReport, RangeFetchCoalescer};
use super::errors::{FailureClass, FetchError};
use super::notice::{DEFAULT_NOTICE_TTL, Notice, NoticeBoard};
use crate::model::{ApodRecord, DateInterval, DayKey, SortDirection};

pub const DEFAULT_PAGE_DAYS: u32 = 5;
pub const DEFAULT_STALL_AFTER: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    Idle,
    Fetching,
    /// Every day of the interval has been delivered.
    Exhausted,
    /// A page failed; paging stays off until the next reset.
    Errored,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Exhausted => "exhausted",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationSettings {
    /// Days per page; treated as 1 if zero.
    pub page_days: u32,
    pub stall_after: Duration,
    pub notice_ttl: Duration,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            page_days: DEFAULT_PAGE_DAYS,
            stall_after: DEFAULT_STALL_AFTER,
            notice_ttl: DEFAULT_NOTICE_TTL,
        }
    }
}

/// Next undelivered day plus the number of pages delivered so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageCursor {
    pub day: DayKey,
    pub page: u32,
}

impl PageCursor {
    fn at_edge(interval: DateInterval, sort: SortDirection) -> Self {
        let day = match sort {
            SortDirection::Newest => interval.end(),
            SortDirection::Oldest => interval.start(),
        };
        Self { day, page: 0 }
    }
}

/// Records delivered for the current context, in delivery order.
#[derive(Debug, Default, Clone)]
pub struct Accumulator {
    records: Vec<ApodRecord>,
}

impl Accumulator {
    fn extend(&mut self, records: Vec<ApodRecord>) -> usize {
        let added = records.len();
        self.records.extend(records);
        added
    }

    fn clear(&mut self) {
        self.records.clear();
    }

    pub fn records(&self) -> &[ApodRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Result of settling a page fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Delivered {
        chunk: DateInterval,
        added: usize,
        exhausted: bool,
        report: FetchReport,
    },
    Failed(FailureClass),
    /// Nothing was in flight for the current context.
    NotFetching,
}

struct PageDelivery {
    context: u64,
    chunk: DateInterval,
    result: Result<FetchOutcome, FetchError>,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    context: u64,
    chunk: DateInterval,
    stall_at: Instant,
    stall_raised: bool,
}

enum Wake {
    Delivery(Option<PageDelivery>),
    Stall,
}

pub struct PaginationController {
    coalescer: Arc<RangeFetchCoalescer>,
    settings: PaginationSettings,
    interval: DateInterval,
    sort: SortDirection,
    state: ControllerState,
    cursor: PageCursor,
    accumulator: Accumulator,
    /// Bumped on every reset; deliveries carrying an older value are stale.
    context: u64,
    in_flight: Option<InFlight>,
    outbox: mpsc::UnboundedSender<PageDelivery>,
    inbox: mpsc::UnboundedReceiver<PageDelivery>,
    notices: NoticeBoard,
    last_error: Option<FetchError>,
    stale_discarded: usize,
}

impl std::fmt::Debug for PaginationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaginationController")
            .field("interval", &self.interval)
            .field("sort", &self.sort)
            .field("state", &self.state)
            .field("cursor", &self.cursor)
            .field("accumulated", &self.accumulator.len())
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl PaginationController {
    pub fn new(
        coalescer: Arc<RangeFetchCoalescer>,
        interval: DateInterval,
        sort: SortDirection,
        settings: PaginationSettings,
    ) -> Self {
        let (outbox, inbox) = mpsc::unbounded_channel();
        Self {
            coalescer,
            settings,
            interval,
            sort,
            state: ControllerState::Idle,
            cursor: PageCursor::at_edge(interval, sort),
            accumulator: Accumulator::default(),
            context: 0,
            in_flight: None,
            outbox,
            inbox,
            notices: NoticeBoard::new(settings.notice_ttl),
            last_error: None,
            stale_discarded: 0,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// True while further pages can still be loaded for this context.
    pub fn has_more(&self) -> bool {
        matches!(self.state, ControllerState::Idle | ControllerState::Fetching)
    }

    pub fn interval(&self) -> DateInterval {
        self.interval
    }

    pub fn sort(&self) -> SortDirection {
        self.sort
    }

    pub fn cursor(&self) -> PageCursor {
        self.cursor
    }

    pub fn records(&self) -> &[ApodRecord] {
        self.accumulator.records()
    }

    pub fn accumulator(&self) -> &Accumulator {
        &self.accumulator
    }

    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    pub fn coalescer(&self) -> &Arc<RangeFetchCoalescer> {
        &self.coalescer
    }

    /// Deliveries dropped because their context had been superseded.
    pub fn stale_discarded(&self) -> usize {
        self.stale_discarded
    }

    /// Active notices; raises the stall notice first if its deadline passed.
    pub fn notices(&mut self) -> &[Notice] {
        let now = Instant::now();
        self.check_stall(now);
        self.notices.active(now)
    }

    /// Start fetching the next page.
    ///
    /// Returns false without doing anything unless the controller is idle
    /// and a tokio runtime is available to run the fetch on.
    pub fn load_next_page(&mut self) -> bool {
        if self.state != ControllerState::Idle {
            debug!(state = %self.state, "load_next_page ignored");
            return false;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(err) => {
                warn!(error = %err, "load_next_page called outside a tokio runtime");
                return false;
            }
        };

        let chunk = self.next_chunk();
        let context = self.context;
        let coalescer = Arc::clone(&self.coalescer);
        let outbox = self.outbox.clone();
        runtime.spawn(async move {
            let result = coalescer.fetch_interval(chunk).await;
            // The controller may be gone; nothing left to notify.
            let _ = outbox.send(PageDelivery {
                context,
                chunk,
                result,
            });
        });

        debug!(
            chunk = %chunk,
            context,
            page = self.cursor.page + 1,
            "page fetch started"
        );
        self.in_flight = Some(InFlight {
            context,
            chunk,
            stall_at: Instant::now() + self.settings.stall_after,
            stall_raised: false,
        });
        self.state = ControllerState::Fetching;
        true
    }

    /// Apply any page result that has already arrived, without waiting.
    pub fn poll(&mut self) -> Option<PageOutcome> {
        self.check_stall(Instant::now());
        while let Ok(delivery) = self.inbox.try_recv() {
            if let Some(outcome) = self.accept(delivery) {
                return Some(outcome);
            }
        }
        None
    }

    /// Wait for the in-flight page to settle, raising the stall notice if it
    /// runs past the deadline.
    pub async fn settle(&mut self) -> PageOutcome {
        loop {
            let Some(in_flight) = self.in_flight else {
                return PageOutcome::NotFetching;
            };

            let wake = tokio::select! {
                delivery = self.inbox.recv() => Wake::Delivery(delivery),
                () = tokio::time::sleep_until(in_flight.stall_at), if !in_flight.stall_raised => Wake::Stall,
            };

            match wake {
                Wake::Delivery(Some(delivery)) => {
                    if let Some(outcome) = self.accept(delivery) {
                        return outcome;
                    }
                }
                // The controller holds a sender, so the channel cannot close.
                Wake::Delivery(None) => return PageOutcome::NotFetching,
                Wake::Stall => self.check_stall(Instant::now()),
            }
        }
    }

    /// Drop everything delivered for the current context and rewind to the
    /// sort's leading edge. Any fetch still in flight becomes stale.
    pub fn reset(&mut self) {
        self.context += 1;
        self.accumulator.clear();
        self.cursor = PageCursor::at_edge(self.interval, self.sort);
        self.state = ControllerState::Idle;
        self.in_flight = None;
        self.last_error = None;
        self.notices.clear_stall();
        debug!(context = self.context, interval = %self.interval, sort = %self.sort, "pagination reset");
    }

    /// Change the interval; resets only when it actually differs.
    pub fn set_interval(&mut self, interval: DateInterval) -> bool {
        if interval == self.interval {
            return false;
        }
        self.interval = interval;
        self.reset();
        true
    }

    /// Change the sort direction; resets only when it actually differs.
    pub fn set_sort(&mut self, sort: SortDirection) -> bool {
        if sort == self.sort {
            return false;
        }
        self.sort = sort;
        self.reset();
        true
    }

    fn next_chunk(&self) -> DateInterval {
        let span = Days::new(u64::from(self.settings.page_days.max(1) - 1));
        let day = self.cursor.day;
        match self.sort {
            SortDirection::Newest => {
                let start = day
                    .checked_sub_days(span)
                    .map_or(self.interval.start(), |d| d.max(self.interval.start()));
                DateInterval::new(start, day)
            }
            SortDirection::Oldest => {
                let end = day
                    .checked_add_days(span)
                    .map_or(self.interval.end(), |d| d.min(self.interval.end()));
                DateInterval::new(day, end)
            }
        }
    }

    /// Move the cursor past `chunk`. Returns true when the interval edge was reached.
    fn advance(&mut self, chunk: DateInterval) -> bool {
        self.cursor.page += 1;
        let next = match self.sort {
            SortDirection::Newest if chunk.start() > self.interval.start() => chunk.start().pred_opt(),
            SortDirection::Oldest if chunk.end() < self.interval.end() => chunk.end().succ_opt(),
            _ => None,
        };
        match next {
            Some(day) => {
                self.cursor.day = day;
                false
            }
            None => true,
        }
    }

    fn check_stall(&mut self, now: Instant) {
        let Some(in_flight) = self.in_flight.as_mut() else {
            return;
        };
        if in_flight.stall_raised || now < in_flight.stall_at {
            return;
        }
        in_flight.stall_raised = true;
        if self.notices.raise_stall(now) {
            warn!(chunk = %in_flight.chunk, "page fetch is stalling");
        }
    }

    /// Apply a delivery. Returns None when it belonged to a superseded context.
    fn accept(&mut self, delivery: PageDelivery) -> Option<PageOutcome> {
        let current = self
            .in_flight
            .is_some_and(|f| f.context == delivery.context && f.chunk == delivery.chunk);
        if !current {
            self.stale_discarded += 1;
            debug!(
                chunk = %delivery.chunk,
                issued_under = delivery.context,
                current = self.context,
                "discarding stale page"
            );
            return None;
        }

        self.in_flight = None;
        self.notices.clear_stall();
        let chunk = delivery.chunk;

        match delivery.result {
            Ok(FetchOutcome {
                mut records,
                report,
            }) => {
                if self.sort == SortDirection::Newest {
                    records.reverse();
                }
                let added = self.accumulator.extend(records);
                let exhausted = self.advance(chunk);
                self.state = if exhausted {
                    ControllerState::Exhausted
                } else {
                    ControllerState::Idle
                };
                info!(
                    chunk = %chunk,
                    added,
                    exhausted,
                    total = self.accumulator.len(),
                    "page delivered"
                );
                Some(PageOutcome::Delivered {
                    chunk,
                    added,
                    exhausted,
                    report,
                })
            }
            Err(err) => {
                let class = err.class();
                warn!(chunk = %chunk, error = %err.log_message(), "page fetch failed");
                self.notices.raise_failure(class, Instant::now());
                self.last_error = Some(err);
                self.state = ControllerState::Errored;
                Some(PageOutcome::Failed(class))
            }
        }
    }
}
