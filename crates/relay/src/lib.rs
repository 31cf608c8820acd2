//! Alert thread registry and chat dispatch pipeline.
//!
//! This crate routes batches of Alertmanager alerts to chat rooms while
//! keeping a stable conversation thread per distinct alert, so updates for an
//! alert append to the same thread instead of creating new posts.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use relay::{Alert, DispatchMetrics, GoogleChatOptions, GoogleChatProvider, Notifier, Provider};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = Arc::new(DispatchMetrics::new());
//! let provider = GoogleChatProvider::new(
//!     GoogleChatOptions::new("https://chat.googleapis.com/v1/spaces/AAA/messages?key=k", "ops"),
//!     Arc::clone(&metrics),
//! )?;
//!
//! let providers: Vec<Arc<dyn Provider>> = vec![Arc::new(provider) as Arc<dyn Provider>];
//! let notifier = Notifier::new(providers);
//!
//! let alert = Alert::firing("8a5d2c").with_annotation("title", "API latency");
//! notifier.dispatch(&[alert], "ops").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`Notifier`] maps a room name to the [`Provider`] serving it
//! - [`Provider`] is the delivery backend interface
//! - [`GoogleChatProvider`] runs the per-alert dispatch pipeline
//! - [`ThreadRegistry`] maps fingerprints to thread identities with a TTL
//! - [`DispatchMetrics`] counts deliveries per provider and room

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod alert;
pub mod error;
pub mod metrics;
pub mod providers;
pub mod registry;

pub use alert::{Alert, AlertmanagerPayload};
pub use error::{FormatError, NotifyError, ProviderError};
pub use metrics::{DispatchMetrics, SeriesStats};
pub use providers::google_chat::{GoogleChatOptions, GoogleChatProvider};
pub use providers::Provider;
pub use registry::{ThreadEntry, ThreadRegistry};

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Routes alert batches to the provider registered for a room.
///
/// The room table is built once and never changes afterwards.
pub struct Notifier {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl Notifier {
    /// Create a notifier keyed by each provider's room.
    ///
    /// If two providers declare the same room, the later one wins.
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        let mut map: HashMap<String, Arc<dyn Provider>> = HashMap::with_capacity(providers.len());

        for provider in providers {
            let room = provider.room().to_string();
            if let Some(previous) = map.insert(room.clone(), provider) {
                warn!(
                    room = %room,
                    replaced = previous.id(),
                    "Duplicate room; later provider replaces the earlier one"
                );
            }
        }

        info!(room_count = map.len(), "Notifier initialized");

        Self { providers: map }
    }

    /// Send a batch of alerts to the provider serving `room`.
    ///
    /// Fails without contacting any provider if the room is unknown. A routed
    /// batch returns whatever the provider returns, which is normally `Ok`
    /// even when individual sends failed.
    pub async fn dispatch(&self, alerts: &[Alert], room: &str) -> Result<(), NotifyError> {
        info!(count = alerts.len(), room = %room, "Dispatching alerts");

        let Some(provider) = self.providers.get(room) else {
            warn!(room = %room, "No provider available for room");
            return Err(NotifyError::NoProvider(room.to_string()));
        };

        provider.push(alerts).await?;
        Ok(())
    }

    /// Check if a room has a provider.
    #[must_use]
    pub fn has_room(&self, room: &str) -> bool {
        self.providers.contains_key(room)
    }

    /// Configured room names, sorted.
    #[must_use]
    pub fn rooms(&self) -> Vec<&str> {
        let mut rooms: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        rooms.sort_unstable();
        rooms
    }

    /// Stop background work in every provider.
    pub fn shutdown(&self) {
        for provider in self.providers.values() {
            provider.shutdown();
        }
    }
}
