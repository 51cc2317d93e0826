use apod_browse::feed::{
    FetchError, NoopPreloader, PaginationController, PaginationSettings, RangeFetchCoalescer,
    Upstream,
};
use apod_browse::model::{ApodRecord, DateInterval, DayKey, MediaKind, SortDirection};
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Day `d` of January 2024.
#[allow(dead_code)]
pub fn day(d: u32) -> DayKey {
    NaiveDate::from_ymd_opt(2024, 1, d).expect("valid January day")
}

#[allow(dead_code)]
pub fn span(a: u32, b: u32) -> DateInterval {
    DateInterval::new(day(a), day(b))
}

#[allow(dead_code)]
pub fn record(date: DayKey) -> ApodRecord {
    ApodRecord {
        date,
        title: format!("Picture for {date}"),
        media_type: MediaKind::Image,
        url: String::new(),
        hdurl: None,
        preview_url: None,
        description: String::new(),
        attribution: None,
        service_version: None,
    }
}

/// Upstream double with scripted behaviour per call index.
///
/// Every call is logged. By default a range yields one record per day.
#[derive(Default)]
#[allow(dead_code)]
pub struct ScriptedUpstream {
    calls: Mutex<Vec<DateInterval>>,
    missing: HashSet<DayKey>,
    failures: HashMap<usize, FetchError>,
    delays: HashMap<usize, Duration>,
}

#[allow(dead_code)]
impl ScriptedUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Days the feed has no entry for.
    pub fn missing(mut self, days: impl IntoIterator<Item = DayKey>) -> Self {
        self.missing.extend(days);
        self
    }

    /// Make the `index`-th call (0-based) fail.
    pub fn fail_call(mut self, index: usize, err: FetchError) -> Self {
        self.failures.insert(index, err);
        self
    }

    /// Make the `index`-th call (0-based) take `delay` before answering.
    pub fn delay_call(mut self, index: usize, delay: Duration) -> Self {
        self.delays.insert(index, delay);
        self
    }

    pub fn calls(&self) -> Vec<DateInterval> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn fetch_range(&self, range: DateInterval) -> Result<Vec<ApodRecord>, FetchError> {
        let index = {
            let mut calls = self.calls.lock();
            calls.push(range);
            calls.len() - 1
        };
        if let Some(delay) = self.delays.get(&index) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(err) = self.failures.get(&index) {
            return Err(err.clone());
        }
        Ok(range
            .days()
            .filter(|d| !self.missing.contains(d))
            .map(record)
            .collect())
    }
}

#[allow(dead_code)]
pub fn coalescer(upstream: Arc<ScriptedUpstream>, capacity: usize) -> Arc<RangeFetchCoalescer> {
    Arc::new(
        RangeFetchCoalescer::new(upstream, Arc::new(NoopPreloader), capacity)
            .expect("non-zero capacity"),
    )
}

#[allow(dead_code)]
pub fn controller(
    upstream: Arc<ScriptedUpstream>,
    interval: DateInterval,
    sort: SortDirection,
    settings: PaginationSettings,
) -> PaginationController {
    PaginationController::new(coalescer(upstream, 1000), interval, sort, settings)
}

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

#[allow(dead_code)]
pub struct EnvGuard {
    key: String,
    prev: Option<String>,
}

#[allow(dead_code)]
impl EnvGuard {
    pub fn set(key: &str, val: impl AsRef<str>) -> Self {
        let prev = std::env::var(key).ok();
        unsafe { std::env::set_var(key, val.as_ref()) };
        Self {
            key: key.to_string(),
            prev,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.prev {
            Some(v) => unsafe { std::env::set_var(&self.key, v) },
            None => unsafe { std::env::remove_var(&self.key) },
        }
    }
}

struct TestWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
