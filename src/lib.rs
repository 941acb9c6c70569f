// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod cursor;
pub mod dispatch;
pub mod error;
pub mod feed;
pub mod notify;
pub mod scheduler;
pub mod sources;
pub mod telemetry;

pub use crate::api::router;
pub use crate::dispatch::{CycleReport, Relay, SourceOutcome, SourceReport};
pub use crate::error::{RelayError, Result};
pub use crate::feed::{Fingerprint, Item};
