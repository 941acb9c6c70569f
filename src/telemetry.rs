// src/telemetry.rs
//! Tracing subscriber and Prometheus recorder setup.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "udemy_coupon_relay=info,warn";

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter; `LOG_FORMAT=json` switches the
/// output to one JSON object per line. Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// One-time metrics registration (so series show up on /metrics).
pub fn describe_metrics() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("relay_cycles_total", "Dispatch cycles that ran to completion or interruption.");
        describe_counter!(
            "relay_cycles_skipped_total",
            "Cycles skipped because another cycle was still running."
        );
        describe_counter!("relay_items_fetched_total", "Items returned by source adapters.");
        describe_counter!("relay_fetch_errors_total", "Source fetches that failed outright.");
        describe_counter!("relay_posts_total", "Items delivered to the channel.");
        describe_counter!("relay_post_failures_total", "Items whose delivery failed.");
        describe_counter!("relay_cursor_write_errors_total", "Cursor file writes that failed.");
        describe_counter!(
            "relay_fallback_total",
            "Cycles where the stored cursor was not found on the page."
        );
        describe_histogram!("relay_cycle_ms", "Dispatch cycle duration in milliseconds.");
        describe_gauge!("relay_last_cycle_ts", "Unix ts when the last cycle finished.");
    });
}

/// Install the Prometheus recorder once per process and return its handle.
///
/// Later calls return the same handle, which keeps tests that build several
/// routers in one process working.
pub fn install_prometheus() -> anyhow::Result<PrometheusHandle> {
    static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();
    let handle = HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new().install_recorder()?;
        describe_metrics();
        Ok::<_, anyhow::Error>(handle)
    })?;
    Ok(handle.clone())
}
