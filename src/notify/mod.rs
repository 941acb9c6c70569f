pub mod telegram;

use async_trait::async_trait;

use crate::error::Result;
use crate::feed::Item;

pub use telegram::TelegramNotifier;

/// Delivers one item to the channel. Retries are the notifier's own business;
/// an `Err` means the item was not delivered.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post(&self, item: &Item) -> Result<()>;
}

/// Logs instead of posting. Used by the dry-run binary.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn post(&self, item: &Item) -> Result<()> {
        tracing::info!(
            source = %item.source_id,
            fingerprint = %item.fingerprint(),
            title = %item.display_title(),
            url = item.target_url.as_deref().unwrap_or("-"),
            "dry-run: would post"
        );
        Ok(())
    }
}
