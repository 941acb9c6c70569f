//! One dispatch cycle against the live sources, logging instead of posting.
//! Reads the cursor file but never writes it.

use std::sync::Arc;

use anyhow::Context;
use udemy_coupon_relay::{
    config::Settings,
    cursor::{CursorStore, JsonCursorStore, MemoryCursorStore},
    dispatch::Pacing,
    notify::LogNotifier,
    telemetry, Relay, SourceOutcome,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let settings = Settings::load_without_credentials().context("loading settings")?;
    let on_disk = JsonCursorStore::open(&settings.cursor_path).await;
    let store = Arc::new(MemoryCursorStore::with_entries(on_disk.snapshot()));

    let relay = Relay::from_settings(&settings, Arc::new(LogNotifier), store)
        .context("building source adapters")?
        .with_pacing(Pacing::none());

    let Some(report) = relay.run_cycle().await else {
        anyhow::bail!("cycle skipped");
    };

    for s in &report.sources {
        let outcome = match &s.outcome {
            SourceOutcome::FetchFailed(e) => format!("fetch failed: {e}"),
            other => format!("{other:?}"),
        };
        println!(
            "{:<15} fetched={:<3} new={:<3} would_post={:<3} {}",
            s.source, s.fetched, s.new_items, s.posted, outcome
        );
    }
    println!("dry run done: {} item(s) would be posted", report.total_posted());
    Ok(())
}
