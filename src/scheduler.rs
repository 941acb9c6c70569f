// src/scheduler.rs
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::dispatch::Relay;

/// Shared "scheduler task is running" flag read by the health endpoint.
#[derive(Clone, Debug, Default)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, alive: bool) {
        self.0.store(alive, Ordering::SeqCst);
    }
}

/// Clears the flag when the task ends, including by panic or abort.
struct AliveGuard(Liveness);

impl AliveGuard {
    fn arm(liveness: Liveness) -> Self {
        liveness.set(true);
        Self(liveness)
    }
}

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Run one cycle now, then one per `interval` until `shutdown` flips to true.
///
/// Ticks missed while a cycle runs are dropped, not queued.
pub fn spawn_scheduler(
    relay: Arc<Relay>,
    interval: Duration,
    liveness: Liveness,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    liveness.set(true);
    tokio::spawn(async move {
        let _alive = AliveGuard::arm(liveness);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(
            interval_secs = interval.as_secs(),
            sources = ?relay.source_ids(),
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if *shutdown.borrow() {
                break;
            }
            relay.run_cycle().await;
        }
        tracing::info!("scheduler stopped");
    })
}
