// src/dispatch.rs
//! One dispatch cycle: fetch each source in priority order, resolve what is
//! new against its cursor, post oldest-first, advance the cursor per success.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use rand::Rng;
use tokio::sync::{watch, Mutex};

use crate::config::Settings;
use crate::cursor::CursorStore;
use crate::error::{RelayError, Result};
use crate::feed::{resolve_with_reason, Resolution, ResolvePolicy, SourceFeed};
use crate::notify::Notifier;
use crate::sources;

/// Random delay between two posts, uniform in `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    min: Duration,
    max: Duration,
}

impl Pacing {
    pub fn new(min: Duration, max: Duration) -> Result<Self> {
        if min > max {
            return Err(RelayError::config(format!(
                "pacing min ({}ms) exceeds max ({}ms)",
                min.as_millis(),
                max.as_millis()
            )));
        }
        Ok(Self { min, max })
    }

    /// No delay at all.
    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let lo = self.min.as_millis() as u64;
        let hi = self.max.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(lo..=hi))
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(600),
            max: Duration::from_millis(1_600),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    FetchFailed(String),
    Empty,
    NothingNew,
    Dispatched,
    /// Shutdown was requested before every new item was started.
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub source: String,
    pub fetched: usize,
    pub new_items: usize,
    pub posted: usize,
    pub failed: usize,
    pub outcome: SourceOutcome,
}

impl SourceReport {
    fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            fetched: 0,
            new_items: 0,
            posted: 0,
            failed: 0,
            outcome: SourceOutcome::Empty,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
}

impl CycleReport {
    pub fn source(&self, id: &str) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.source == id)
    }

    pub fn total_posted(&self) -> usize {
        self.sources.iter().map(|s| s.posted).sum()
    }
}

struct SourceEntry {
    feed: Box<dyn SourceFeed>,
    page_limit: usize,
    policy: ResolvePolicy,
}

/// Owns the sources, the notifier and the cursor store for the process.
pub struct Relay {
    sources: Vec<SourceEntry>,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn CursorStore>,
    pacing: Pacing,
    shutdown: Option<watch::Receiver<bool>>,
    cycle_lock: Mutex<()>,
}

impl Relay {
    pub fn new(notifier: Arc<dyn Notifier>, store: Arc<dyn CursorStore>) -> Self {
        Self {
            sources: Vec::new(),
            notifier,
            store,
            pacing: Pacing::default(),
            shutdown: None,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Build every configured source adapter, in priority order.
    pub fn from_settings(
        settings: &Settings,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn CursorStore>,
    ) -> Result<Self> {
        let mut relay = Self::new(notifier, store).with_pacing(settings.pacing);
        for src in &settings.sources {
            let feed = sources::build_feed(&src.id, src.adapter.clone())?;
            relay = relay.with_source(feed, src.page_limit, src.policy);
        }
        Ok(relay)
    }

    /// Append a source; sources run in the order they were added.
    pub fn with_source(
        mut self,
        feed: Box<dyn SourceFeed>,
        page_limit: usize,
        policy: ResolvePolicy,
    ) -> Self {
        self.sources.push(SourceEntry {
            feed,
            page_limit,
            policy,
        });
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_shutdown(mut self, rx: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(rx);
        self
    }

    pub fn source_ids(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.feed.id()).collect()
    }

    pub fn store(&self) -> &Arc<dyn CursorStore> {
        &self.store
    }

    /// Run one cycle. `None` when another cycle still holds the guard.
    pub async fn run_cycle(&self) -> Option<CycleReport> {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            counter!("relay_cycles_skipped_total").increment(1);
            tracing::info!("previous cycle still running, skipping");
            return None;
        };

        let started_at = Utc::now();
        let t0 = Instant::now();
        let mut sources = Vec::with_capacity(self.sources.len());
        for entry in &self.sources {
            if self.stopping() {
                tracing::info!("shutdown requested, remaining sources skipped");
                break;
            }
            sources.push(self.run_source(entry).await);
        }
        let finished_at = Utc::now();

        counter!("relay_cycles_total").increment(1);
        histogram!("relay_cycle_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        gauge!("relay_last_cycle_ts").set(finished_at.timestamp() as f64);

        let report = CycleReport {
            started_at,
            finished_at,
            sources,
        };
        tracing::info!(
            posted = report.total_posted(),
            sources = report.sources.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "cycle finished"
        );
        Some(report)
    }

    async fn run_source(&self, entry: &SourceEntry) -> SourceReport {
        let id = entry.feed.id();
        let mut report = SourceReport::new(id);

        let items = match entry.feed.fetch(entry.page_limit).await {
            Ok(items) => items,
            Err(e) => {
                counter!("relay_fetch_errors_total", "source" => id.to_string()).increment(1);
                tracing::warn!(source = id, error = %e, "fetch failed, source skipped");
                report.outcome = SourceOutcome::FetchFailed(e.to_string());
                return report;
            }
        };
        report.fetched = items.len();
        counter!("relay_items_fetched_total", "source" => id.to_string()).increment(items.len() as u64);
        if items.is_empty() {
            tracing::debug!(source = id, "nothing fetched");
            return report;
        }

        let cursor = self.store.get(id);
        let (fresh, resolution) = resolve_with_reason(&items, cursor.as_ref(), &entry.policy);
        match resolution {
            Resolution::CursorLost => {
                counter!("relay_fallback_total", "source" => id.to_string()).increment(1);
                tracing::warn!(
                    source = id,
                    cursor = cursor.as_ref().map(|c| c.as_str()).unwrap_or("-"),
                    cap = entry.policy.fallback_cap,
                    "cursor not on page, posting newest items only"
                );
            }
            other => tracing::debug!(source = id, resolution = ?other, "resolved"),
        }

        report.new_items = fresh.len();
        if fresh.is_empty() {
            report.outcome = SourceOutcome::NothingNew;
            return report;
        }

        report.outcome = SourceOutcome::Dispatched;
        for (i, item) in fresh.iter().enumerate() {
            if i > 0 {
                self.pace().await;
            }
            if self.stopping() {
                report.outcome = SourceOutcome::Interrupted;
                break;
            }

            let fp = item.fingerprint();
            match self.notifier.post(item).await {
                Ok(()) => {
                    report.posted += 1;
                    counter!("relay_posts_total", "source" => id.to_string()).increment(1);
                    tracing::info!(source = id, fingerprint = %fp, "posted");
                    if let Err(e) = self.store.set(id, &fp).await {
                        counter!("relay_cursor_write_errors_total").increment(1);
                        tracing::error!(source = id, error = %e, "cursor write failed");
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    counter!("relay_post_failures_total", "source" => id.to_string()).increment(1);
                    tracing::warn!(source = id, fingerprint = %fp, error = %e, "post failed, cursor kept");
                }
            }
        }
        report
    }

    fn stopping(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Sleep for one pacing interval; returns early on shutdown.
    async fn pace(&self) {
        let delay = self.pacing.sample();
        if delay.is_zero() {
            return;
        }
        match self.shutdown.clone() {
            Some(mut rx) => {
                let stopped = async move {
                    if rx.wait_for(|stop| *stop).await.is_err() {
                        // Sender gone: never wakes, the sleep decides.
                        std::future::pending::<()>().await;
                    }
                };
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = stopped => {}
                }
            }
            None => tokio::time::sleep(delay).await,
        }
    }
}
