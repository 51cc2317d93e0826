//! Range fetch coalescing.
//!
//! [`RangeFetchCoalescer::fetch`] walks an interval day by day, serving cached
//! days directly and folding every maximal run of consecutive misses into a
//! single upstream request. The number of requests issued for an interval is
//! therefore the number of gaps in the cache, never the number of missing
//! days, and no day is requested while it is cached.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::cache::{BoundedCache, CacheError, CacheStats};
use super::errors::FetchError;
use super::preload::MediaPreloader;
use super::upstream::Upstream;
use crate::model::{ApodRecord, DateInterval, DayKey};

/// Default ceiling on a single media warm-up.
pub const DEFAULT_PRELOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// What a single coalesced fetch cost.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchReport {
    /// Days served from the cache.
    pub cache_hits: usize,
    /// Upstream requests issued, in the order they were sent.
    pub requested: Vec<DateInterval>,
    /// Records received from upstream across all requests.
    pub fetched: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Records in ascending day order.
    pub records: Vec<ApodRecord>,
    pub report: FetchReport,
}

pub struct RangeFetchCoalescer {
    upstream: Arc<dyn Upstream>,
    preloader: Arc<dyn MediaPreloader>,
    // Never held across an await.
    cache: Mutex<BoundedCache<DayKey, ApodRecord>>,
    preload_timeout: Duration,
}

impl std::fmt::Debug for RangeFetchCoalescer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.cache.lock();
        f.debug_struct("RangeFetchCoalescer")
            .field("cached", &cache.len())
            .field("capacity", &cache.capacity())
            .field("preload_timeout", &self.preload_timeout)
            .finish_non_exhaustive()
    }
}

impl RangeFetchCoalescer {
    pub fn new(
        upstream: Arc<dyn Upstream>,
        preloader: Arc<dyn MediaPreloader>,
        capacity: usize,
    ) -> Result<Self, CacheError> {
        Ok(Self::with_cache(upstream, preloader, BoundedCache::new(capacity)?))
    }

    /// Build around an existing (possibly pre-filled) cache.
    pub fn with_cache(
        upstream: Arc<dyn Upstream>,
        preloader: Arc<dyn MediaPreloader>,
        cache: BoundedCache<DayKey, ApodRecord>,
    ) -> Self {
        Self {
            upstream,
            preloader,
            cache: Mutex::new(cache),
            preload_timeout: DEFAULT_PRELOAD_TIMEOUT,
        }
    }

    pub fn with_preload_timeout(mut self, timeout: Duration) -> Self {
        self.preload_timeout = timeout;
        self
    }

    /// Fetch every available record in `[start, end]`; reversed endpoints are swapped.
    pub async fn fetch(&self, start: DayKey, end: DayKey) -> Result<Vec<ApodRecord>, FetchError> {
        Ok(self
            .fetch_interval(DateInterval::new(start, end))
            .await?
            .records)
    }

    /// Fetch `interval`, reporting how many days were served from the cache
    /// and which ranges went upstream.
    ///
    /// On failure, runs completed earlier in the same call stay cached.
    pub async fn fetch_interval(&self, interval: DateInterval) -> Result<FetchOutcome, FetchError> {
        let capacity_hint = usize::try_from(interval.len_days()).unwrap_or(0).min(1024);
        let mut records = Vec::with_capacity(capacity_hint);
        let mut report = FetchReport::default();
        let mut run_start: Option<DayKey> = None;
        let last = interval.end();

        for day in interval.days() {
            let cached = self.cache.lock().get(&day).cloned();
            match cached {
                Some(record) => {
                    // Another caller filled this day after the run was opened.
                    if let (Some(start), Some(prev)) = (run_start.take(), day.pred_opt()) {
                        let run = self.fetch_run(DateInterval::new(start, prev), &mut report).await?;
                        records.extend(run);
                    }
                    report.cache_hits += 1;
                    records.push(record);
                }
                None => {
                    let start = *run_start.get_or_insert(day);
                    let next_cached = day < last
                        && day
                            .succ_opt()
                            .is_some_and(|next| self.cache.lock().has(&next));
                    if day == last || next_cached {
                        run_start = None;
                        let run = self.fetch_run(DateInterval::new(start, day), &mut report).await?;
                        records.extend(run);
                    }
                }
            }
        }

        debug!(
            interval = %interval,
            returned = records.len(),
            cache_hits = report.cache_hits,
            requests = report.requested.len(),
            "coalesced fetch complete"
        );
        Ok(FetchOutcome { records, report })
    }

    async fn fetch_run(
        &self,
        run: DateInterval,
        report: &mut FetchReport,
    ) -> Result<Vec<ApodRecord>, FetchError> {
        debug!(run = %run, days = run.len_days(), "requesting miss-run");
        report.requested.push(run);

        let mut fetched = self.upstream.fetch_range(run).await.inspect_err(|err| {
            warn!(run = %run, error = %err, "miss-run request failed");
        })?;
        fetched.retain(|record| run.contains(record.date));
        fetched.sort_by_key(|record| record.date);
        fetched.dedup_by_key(|record| record.date);

        {
            let mut cache = self.cache.lock();
            for record in &fetched {
                cache.set(record.date, record.clone());
            }
        }
        report.fetched += fetched.len();

        self.preload(&fetched).await;
        Ok(fetched)
    }

    /// Warm media for freshly fetched records, waiting until every attempt
    /// has settled. Failures and timeouts are logged, never returned.
    async fn preload(&self, records: &[ApodRecord]) {
        let mut tasks = JoinSet::new();
        for url in records.iter().filter_map(ApodRecord::preload_target) {
            let preloader = Arc::clone(&self.preloader);
            let url = url.to_string();
            let limit = self.preload_timeout;
            tasks.spawn(async move {
                let outcome = tokio::time::timeout(limit, preloader.warm(&url)).await;
                (url, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(Ok(())))) => {}
                Ok((url, Ok(Err(err)))) => debug!(url, error = %err, "media preload failed"),
                Ok((url, Err(_))) => debug!(url, "media preload timed out"),
                Err(err) => debug!(error = %err, "media preload task did not finish"),
            }
        }
    }

    pub fn is_cached(&self, day: DayKey) -> bool {
        self.cache.lock().has(&day)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Snapshot of (hits, misses, evictions).
    pub fn cache_stats(&self) -> (u64, u64, u64) {
        self.cache.lock().stats().get()
    }

    pub fn cache_hit_rate(&self) -> f64 {
        let cache = self.cache.lock();
        let stats: &CacheStats = cache.stats();
        stats.hit_rate()
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::preload::NoopPreloader;
    use crate::model::MediaKind;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn day(d: u32) -> DayKey {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn record(date: DayKey) -> ApodRecord {
        ApodRecord {
            date,
            title: format!("Picture {date}"),
            media_type: MediaKind::Image,
            url: format!("https://example.org/{date}.jpg"),
            hdurl: None,
            preview_url: None,
            description: String::new(),
            attribution: None,
            service_version: None,
        }
    }

    /// Answers every range with one record per day, logging each request.
    #[derive(Default)]
    struct EveryDay {
        calls: Mutex<Vec<DateInterval>>,
    }

    #[async_trait]
    impl Upstream for EveryDay {
        async fn fetch_range(&self, range: DateInterval) -> Result<Vec<ApodRecord>, FetchError> {
            self.calls.lock().push(range);
            // Reverse order to check the coalescer sorts.
            Ok(range.days().collect::<Vec<_>>().into_iter().rev().map(record).collect())
        }
    }

    struct CountingPreloader {
        warmed: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl MediaPreloader for CountingPreloader {
        async fn warm(&self, _url: &str) -> Result<(), FetchError> {
            self.warmed.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(FetchError::Transport("broken".into()))
            } else {
                Ok(())
            }
        }
    }

    fn coalescer(upstream: Arc<EveryDay>, capacity: usize) -> RangeFetchCoalescer {
        RangeFetchCoalescer::new(upstream, Arc::new(NoopPreloader), capacity).unwrap()
    }

    #[tokio::test]
    async fn cold_interval_is_one_request() {
        let upstream = Arc::new(EveryDay::default());
        let coalescer = coalescer(upstream.clone(), 100);

        let outcome = coalescer
            .fetch_interval(DateInterval::new(day(1), day(5)))
            .await
            .unwrap();

        assert_eq!(*upstream.calls.lock(), vec![DateInterval::new(day(1), day(5))]);
        let days: Vec<_> = outcome.records.iter().map(|r| r.date).collect();
        assert_eq!(days, vec![day(1), day(2), day(3), day(4), day(5)]);
        assert_eq!(outcome.report.cache_hits, 0);
        assert_eq!(outcome.report.fetched, 5);
    }

    #[tokio::test]
    async fn gaps_around_cached_block_become_two_requests() {
        let upstream = Arc::new(EveryDay::default());
        let mut cache = BoundedCache::new(100).unwrap();
        for d in 12..=14 {
            cache.set(day(d), record(day(d)));
        }
        let coalescer =
            RangeFetchCoalescer::with_cache(upstream.clone(), Arc::new(NoopPreloader), cache);

        let records = coalescer.fetch(day(10), day(20)).await.unwrap();

        assert_eq!(
            *upstream.calls.lock(),
            vec![
                DateInterval::new(day(10), day(11)),
                DateInterval::new(day(15), day(20))
            ]
        );
        assert_eq!(records.len(), 11);
        assert!(records.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[tokio::test]
    async fn reversed_endpoints_are_swapped() {
        let upstream = Arc::new(EveryDay::default());
        let coalescer = coalescer(upstream.clone(), 10);
        let records = coalescer.fetch(day(3), day(1)).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(*upstream.calls.lock(), vec![DateInterval::new(day(1), day(3))]);
    }

    #[tokio::test]
    async fn second_fetch_is_fully_cached() {
        let upstream = Arc::new(EveryDay::default());
        let coalescer = coalescer(upstream.clone(), 100);

        let first = coalescer.fetch(day(1), day(7)).await.unwrap();
        let second = coalescer.fetch_interval(DateInterval::new(day(1), day(7))).await.unwrap();

        assert_eq!(upstream.calls.lock().len(), 1);
        assert_eq!(first, second.records);
        assert_eq!(second.report.cache_hits, 7);
        assert!(second.report.requested.is_empty());
    }

    #[tokio::test]
    async fn upstream_gaps_are_not_requested_again_within_call() {
        struct Sparse;
        #[async_trait]
        impl Upstream for Sparse {
            async fn fetch_range(
                &self,
                range: DateInterval,
            ) -> Result<Vec<ApodRecord>, FetchError> {
                Ok(range.days().filter(|d| *d != day(3)).map(record).collect())
            }
        }
        let coalescer =
            RangeFetchCoalescer::new(Arc::new(Sparse), Arc::new(NoopPreloader), 10).unwrap();
        let outcome = coalescer
            .fetch_interval(DateInterval::new(day(1), day(5)))
            .await
            .unwrap();
        assert_eq!(outcome.records.len(), 4);
        assert_eq!(outcome.report.requested.len(), 1);
        assert!(!coalescer.is_cached(day(3)));
    }

    #[tokio::test]
    async fn preload_failures_do_not_fail_fetch() {
        let upstream = Arc::new(EveryDay::default());
        let preloader = Arc::new(CountingPreloader {
            warmed: AtomicUsize::new(0),
            fail: true,
        });
        let coalescer = RangeFetchCoalescer::new(upstream, preloader.clone(), 10).unwrap();

        let records = coalescer.fetch(day(1), day(3)).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(preloader.warmed.load(Ordering::SeqCst), 3);

        // Cache hits are not warmed again.
        coalescer.fetch(day(1), day(3)).await.unwrap();
        assert_eq!(preloader.warmed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_preload_is_bounded_by_timeout() {
        struct Hanging;
        #[async_trait]
        impl MediaPreloader for Hanging {
            async fn warm(&self, _url: &str) -> Result<(), FetchError> {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
        let coalescer =
            RangeFetchCoalescer::new(Arc::new(EveryDay::default()), Arc::new(Hanging), 10)
                .unwrap()
                .with_preload_timeout(Duration::from_secs(2));

        let records = coalescer.fetch(day(1), day(2)).await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn small_cache_still_returns_whole_interval() {
        let upstream = Arc::new(EveryDay::default());
        let coalescer = coalescer(upstream.clone(), 2);

        let records = coalescer.fetch(day(1), day(6)).await.unwrap();
        assert_eq!(records.len(), 6);
        assert_eq!(coalescer.cache_len(), 2);
        assert!(coalescer.is_cached(day(5)));
        assert!(coalescer.is_cached(day(6)));
        let (_, _, evictions) = coalescer.cache_stats();
        assert_eq!(evictions, 4);
    }

    #[tokio::test]
    async fn clear_cache_forces_refetch() {
        let upstream = Arc::new(EveryDay::default());
        let coalescer = coalescer(upstream.clone(), 10);
        coalescer.fetch(day(1), day(2)).await.unwrap();
        coalescer.clear_cache();
        coalescer.fetch(day(1), day(2)).await.unwrap();
        assert_eq!(upstream.calls.lock().len(), 2);
    }
}
