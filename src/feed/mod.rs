// src/feed/mod.rs
pub mod item;
pub mod resolve;

use async_trait::async_trait;

use crate::error::Result;

pub use item::{fingerprint, Fingerprint, Item};
pub use resolve::{classify, resolve_new_items, resolve_with_reason, Resolution, ResolvePolicy};

/// A coupon aggregator that can be polled for its latest listings.
#[async_trait]
pub trait SourceFeed: Send + Sync {
    /// Stable source id, used as the cursor key and fingerprint prefix.
    fn id(&self) -> &str;

    /// Fetch up to `page_limit` listing pages, newest-first.
    /// May return fewer items than a full page.
    async fn fetch(&self, page_limit: usize) -> Result<Vec<Item>>;
}
