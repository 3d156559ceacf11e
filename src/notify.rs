//! Outbound admin notification port.

use async_trait::async_trait;
use log::error;

use crate::errors::Result;

/// Delivery seam for operator alerts. Mail or chat transports live behind
/// this trait outside the core.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, body: &str) -> Result<()>;
}

/// Writes the alert into the run log; the default when no transport is
/// wired up.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<()> {
        error!("ADMIN ALERT {subject}: {body}");
        Ok(())
    }
}
