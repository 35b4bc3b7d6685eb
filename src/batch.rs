//! Batched lookups with a static rate-limiting discipline.
//!
//! Ids are split into consecutive groups of `batch_size`. Each group is fetched concurrently and
//! fully settles (successes and failures) before the [`Throttle`] decides how long to pause ahead
//! of the next group. Results come back in request order; failures are kept next to their id but
//! never abort the run, and nothing is retried.

use futures::future::join_all;
use std::{fmt::Display, future::Future, time::Duration};
use tokio::time::Instant;

use crate::{
    config::BatchConfig,
    error::ReftreeError,
    properties::ResolvedEntry,
    source::ContentSource,
};

/// Decides how long to wait before each group is issued.
pub trait Throttle: Send {
    /// `index` is the 0-based group number, `len` its number of lookups.
    fn before_group(&mut self, index: usize, len: usize, now: Instant) -> Duration;
}

/// Constant pause between groups, none before the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay(pub Duration);

impl Throttle for FixedDelay {
    fn before_group(&mut self, index: usize, _len: usize, _now: Instant) -> Duration {
        if index == 0 {
            Duration::ZERO
        } else {
            self.0
        }
    }
}

/// At most `limit` lookups per `window`; a group that would overflow the current window waits
/// for the next one.
#[derive(Debug, Clone)]
pub struct FixedWindow {
    limit: usize,
    window: Duration,
    started: Option<Instant>,
    used: usize,
}

impl FixedWindow {
    pub fn new(limit: usize, window: Duration) -> Self {
        FixedWindow {
            limit,
            window,
            started: None,
            used: 0,
        }
    }
}

impl Throttle for FixedWindow {
    fn before_group(&mut self, _index: usize, len: usize, now: Instant) -> Duration {
        let start = *self.started.get_or_insert(now);
        if now >= start + self.window {
            self.started = Some(now);
            self.used = 0;
        }
        let start = self.started.unwrap_or(now);
        if self.used > 0 && self.used + len > self.limit {
            let wait = (start + self.window).saturating_duration_since(now);
            self.started = Some(now + wait);
            self.used = len;
            wait
        } else {
            self.used += len;
            Duration::ZERO
        }
    }
}

/// Outcome of one batched run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport<K> {
    /// One result per input, in input order.
    pub results: Vec<(K, Result<ResolvedEntry, ReftreeError>)>,
    /// Number of groups issued.
    pub groups: usize,
    /// Total time spent paused by the throttle.
    pub paused: Duration,
}

impl<K> BatchReport<K> {
    pub fn entries(&self) -> impl Iterator<Item = &ResolvedEntry> {
        self.results.iter().filter_map(|(_, r)| r.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&K, &ReftreeError)> {
        self.results
            .iter()
            .filter_map(|(k, r)| r.as_ref().err().map(|e| (k, e)))
    }

    pub fn into_entries(self) -> Vec<ResolvedEntry> {
        self.results.into_iter().filter_map(|(_, r)| r.ok()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct BatchScheduler<T: Throttle = FixedDelay> {
    batch_size: usize,
    throttle: T,
}

impl BatchScheduler<FixedDelay> {
    pub fn from_config(config: &BatchConfig) -> Result<Self, ReftreeError> {
        BatchScheduler::new(config.size, FixedDelay(config.delay()))
    }
}

impl<T: Throttle> BatchScheduler<T> {
    pub fn new(batch_size: usize, throttle: T) -> Result<Self, ReftreeError> {
        if batch_size == 0 {
            return Err(ReftreeError::Config(
                "batch size must be positive".to_string(),
            ));
        }
        Ok(BatchScheduler {
            batch_size,
            throttle,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Run `fetch` over `items`, `batch_size` at a time.
    pub async fn fetch_in_batches<'a, K, F, Fut>(
        &mut self,
        items: &'a [K],
        fetch: F,
    ) -> BatchReport<K>
    where
        K: Clone + Display,
        F: Fn(&'a K) -> Fut,
        Fut: Future<Output = Result<ResolvedEntry, ReftreeError>>,
    {
        let mut report = BatchReport {
            results: Vec::with_capacity(items.len()),
            groups: 0,
            paused: Duration::ZERO,
        };
        for (index, group) in items.chunks(self.batch_size).enumerate() {
            let pause = self
                .throttle
                .before_group(index, group.len(), Instant::now());
            if !pause.is_zero() {
                tracing::debug!("Pausing {pause:?} before batch {index}");
                tokio::time::sleep(pause).await;
                report.paused += pause;
            }
            report.groups += 1;
            let settled = join_all(group.iter().map(&fetch)).await;
            for (item, result) in group.iter().zip(settled) {
                if let Err(e) = &result {
                    tracing::warn!("Lookup of {item} failed, dropping it: {e}");
                }
                report.results.push((item.clone(), result));
            }
        }
        tracing::debug!(
            "Fetched {} items in {} batches ({} failed)",
            items.len(),
            report.groups,
            report.failures().count()
        );
        report
    }

    /// Look up plain entry ids through `source`.
    pub async fn fetch_ids<S: ContentSource>(
        &mut self,
        source: &S,
        ids: &[String],
    ) -> BatchReport<String> {
        self.fetch_in_batches(ids, |id| source.get_entry(id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{source::MemorySource, tests::helpers::init_logging};

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn seeded(raw: &[&str]) -> MemorySource {
        let source = MemorySource::new("en-US").with_latency(Duration::from_millis(10));
        for id in raw {
            source.insert(ResolvedEntry::new(*id, "poi"));
        }
        source
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_id_is_dropped_and_groups_are_delayed() {
        init_logging();
        let source = seeded(&["1", "2", "4", "5"]);
        let mut scheduler = BatchScheduler::new(2, FixedDelay(Duration::from_millis(100))).unwrap();

        let started = Instant::now();
        let report = scheduler
            .fetch_ids(&source, &ids(&["1", "2", "3", "4", "5"]))
            .await;

        assert_eq!(report.groups, 3);
        assert_eq!(report.paused, Duration::from_millis(200));
        let found: Vec<_> = report.entries().map(|e| e.id.as_str()).collect();
        assert_eq!(found, vec!["1", "2", "4", "5"]);
        let failed: Vec<_> = report.failures().map(|(id, _)| id.as_str()).collect();
        assert_eq!(failed, vec!["3"]);
        // Two pauses plus three groups of one latency each.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(230), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(240), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_never_exceeds_batch_size() {
        let raw: Vec<String> = (0..11).map(|i| i.to_string()).collect();
        let refs: Vec<&str> = raw.iter().map(String::as_str).collect();
        let source = seeded(&refs);
        for size in [1usize, 3, 4, 11, 20] {
            source.reset_counters();
            let mut scheduler = BatchScheduler::new(size, FixedDelay(Duration::ZERO)).unwrap();
            let report = scheduler.fetch_ids(&source, &raw).await;
            assert_eq!(report.groups, raw.len().div_ceil(size));
            assert_eq!(source.max_in_flight(), size.min(raw.len()));
            assert_eq!(source.requests(), raw);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_input_issues_no_groups() {
        let source = seeded(&[]);
        let mut scheduler = BatchScheduler::new(4, FixedDelay(Duration::from_secs(1))).unwrap();
        let report = scheduler.fetch_ids(&source, &[]).await;
        assert_eq!(report.groups, 0);
        assert!(report.results.is_empty());
        assert_eq!(report.paused, Duration::ZERO);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(BatchScheduler::new(0, FixedDelay(Duration::ZERO)).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_window_waits_for_next_window() {
        let mut window = FixedWindow::new(4, Duration::from_secs(1));
        let now = Instant::now();
        assert_eq!(window.before_group(0, 2, now), Duration::ZERO);
        assert_eq!(window.before_group(1, 2, now), Duration::ZERO);
        assert_eq!(
            window.before_group(2, 2, now + Duration::from_millis(300)),
            Duration::from_millis(700)
        );
        // A fresh window opens after the wait.
        assert_eq!(
            window.before_group(3, 2, now + Duration::from_millis(1000)),
            Duration::ZERO
        );
    }
}
