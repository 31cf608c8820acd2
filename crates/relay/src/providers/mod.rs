//! Delivery provider implementations.

pub mod google_chat;

use async_trait::async_trait;

use crate::alert::Alert;
use crate::error::ProviderError;

/// Trait for delivery backends (Google Chat, etc.).
///
/// A provider serves exactly one room. Register instances with
/// [`crate::Notifier`] to make them reachable.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Room this provider delivers to. Fixed at construction.
    fn room(&self) -> &str;

    /// Backend type tag used as the `provider` metric label.
    fn id(&self) -> &'static str;

    /// Deliver a batch of alerts.
    ///
    /// Per-alert failures are logged and counted, not returned.
    async fn push(&self, alerts: &[Alert]) -> Result<(), ProviderError>;

    /// Stop background work owned by this provider.
    fn shutdown(&self) {}
}
