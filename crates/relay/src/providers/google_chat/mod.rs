//! Google Chat webhook provider.
//!
//! Each alert fingerprint is mapped to a thread through the provider's own
//! [`ThreadRegistry`]; the thread identity is sent as the `threadKey` query
//! parameter so Google Chat groups updates for the same alert together.

pub mod message;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::alert::Alert;
use crate::error::ProviderError;
use crate::metrics::DispatchMetrics;
use crate::registry::{ThreadRegistry, DEFAULT_PRUNE_INTERVAL};
use crate::Provider;

pub use message::{prepare_messages, ChatMessage};

/// Provider type tag.
pub const PROVIDER_ID: &str = "google_chat";

/// Query parameter carrying the thread identity.
const THREAD_KEY_PARAM: &str = "threadKey";

/// Upper bound for a single retry delay.
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// Options for a Google Chat provider instance.
#[derive(Debug, Clone)]
pub struct GoogleChatOptions {
    /// Incoming webhook URL of the space.
    pub endpoint: String,
    /// Room name this provider serves.
    pub room: String,
    /// Run the pipeline without sending anything.
    pub dry_run: bool,
    /// Idle pooled connections kept per host.
    pub max_idle_conns: usize,
    /// Timeout for each HTTP request.
    pub timeout: Duration,
    /// Optional HTTP(S) proxy for upstream requests.
    pub proxy_url: Option<String>,
    /// Idle time after which an alert's thread is forgotten.
    pub thread_ttl: Duration,
    /// Interval between thread eviction sweeps.
    pub prune_interval: Duration,
    /// Extra attempts for a failed send (0 disables retries).
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each further attempt.
    pub retry_backoff: Duration,
}

impl GoogleChatOptions {
    /// Options with defaults for everything but the endpoint and room.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            room: room.into(),
            dry_run: false,
            max_idle_conns: 50,
            timeout: Duration::from_secs(30),
            proxy_url: None,
            thread_ttl: Duration::from_secs(12 * 60 * 60),
            prune_interval: DEFAULT_PRUNE_INTERVAL,
            max_retries: 0,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Google Chat delivery provider.
pub struct GoogleChatProvider {
    room: String,
    endpoint: Url,
    client: reqwest::Client,
    threads: Arc<ThreadRegistry>,
    metrics: Arc<DispatchMetrics>,
    dry_run: bool,
    max_retries: u32,
    retry_backoff: Duration,
    cancel: CancellationToken,
}

impl GoogleChatProvider {
    /// Create a provider and start its thread eviction worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        options: GoogleChatOptions,
        metrics: Arc<DispatchMetrics>,
    ) -> Result<Self, ProviderError> {
        if options.room.trim().is_empty() {
            return Err(ProviderError::Config("room name cannot be empty".to_string()));
        }

        for (field, value) in [
            ("timeout", options.timeout),
            ("thread_ttl", options.thread_ttl),
            ("prune_interval", options.prune_interval),
        ] {
            if value.is_zero() {
                return Err(ProviderError::Config(format!(
                    "{field} for room {} must be greater than zero",
                    options.room
                )));
            }
        }

        let endpoint = Url::parse(&options.endpoint).map_err(|e| {
            ProviderError::Config(format!("invalid endpoint for room {}: {e}", options.room))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ProviderError::Config(format!(
                "endpoint for room {} must be http or https",
                options.room
            )));
        }

        let mut builder = reqwest::Client::builder()
            .timeout(options.timeout)
            .pool_max_idle_per_host(options.max_idle_conns);

        if let Some(proxy_url) = options.proxy_url.as_deref().filter(|p| !p.is_empty()) {
            let proxy = parse_proxy(proxy_url)?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| ProviderError::Config(format!("failed to build HTTP client: {e}")))?;

        let threads = Arc::new(ThreadRegistry::new(options.thread_ttl));
        let cancel = CancellationToken::new();
        threads.spawn_eviction(options.prune_interval, cancel.clone());

        info!(
            room = %options.room,
            dry_run = options.dry_run,
            thread_ttl_secs = options.thread_ttl.as_secs(),
            "Google Chat provider initialized"
        );

        Ok(Self {
            room: options.room,
            endpoint,
            client,
            threads,
            metrics,
            dry_run: options.dry_run,
            max_retries: options.max_retries,
            retry_backoff: options.retry_backoff,
            cancel,
        })
    }

    /// The provider's thread registry.
    #[must_use]
    pub fn threads(&self) -> &Arc<ThreadRegistry> {
        &self.threads
    }

    /// Webhook URL with `threadKey` set to the given thread.
    fn thread_url(&self, thread_id: Uuid) -> Url {
        let mut url = self.endpoint.clone();
        let retained: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != THREAD_KEY_PARAM)
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        url.query_pairs_mut()
            .clear()
            .extend_pairs(retained)
            .append_pair(THREAD_KEY_PARAM, &thread_id.to_string());
        url
    }

    /// Deliver one message, retrying transient failures.
    async fn deliver(&self, msg: &ChatMessage, thread_id: Uuid) -> Result<(), ProviderError> {
        let mut attempt = 0;
        loop {
            match self.send_message(msg, thread_id).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self
                        .retry_backoff
                        .saturating_mul(2u32.saturating_pow(attempt))
                        .min(MAX_RETRY_BACKOFF);
                    attempt += 1;
                    warn!(
                        room = %self.room,
                        attempt,
                        delay = ?delay,
                        error = %e,
                        "Retrying Google Chat message"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Push a single message to the Google Chat space.
    async fn send_message(&self, msg: &ChatMessage, thread_id: Uuid) -> Result<(), ProviderError> {
        let url = self.thread_url(thread_id);

        debug!(room = %self.room, thread = %thread_id, "Sending alert message");

        let response = self.client.post(url).json(msg).send().await?;

        if response.status().is_success() {
            debug!(room = %self.room, thread = %thread_id, "Alert message sent");
            Ok(())
        } else {
            let status = response.status();
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    debug!(room = %self.room, error = %e, "Failed to read error response body");
                    String::new()
                }
            };

            warn!(
                room = %self.room,
                status = %status,
                body = %body,
                "Google Chat webhook request failed"
            );

            Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

impl Drop for GoogleChatProvider {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl Provider for GoogleChatProvider {
    fn room(&self) -> &str {
        &self.room
    }

    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn push(&self, alerts: &[Alert]) -> Result<(), ProviderError> {
        info!(count = alerts.len(), room = %self.room, "Dispatching alerts to Google Chat");

        for alert in alerts {
            let thread_id = self.threads.observe(alert).await;

            let messages = match prepare_messages(alert) {
                Ok(messages) if messages.is_empty() => {
                    warn!(fingerprint = %alert.fingerprint, "No messages produced for alert");
                    continue;
                }
                Ok(messages) => messages,
                Err(e) => {
                    error!(fingerprint = %alert.fingerprint, error = %e, "Error preparing message");
                    continue;
                }
            };

            for msg in &messages {
                self.metrics.record_dispatched(PROVIDER_ID, &self.room);

                if self.dry_run {
                    info!(
                        room = %self.room,
                        fingerprint = %alert.fingerprint,
                        thread = %thread_id,
                        "dry_run is enabled for this room, skipping notification"
                    );
                    continue;
                }

                let started = Instant::now();
                let result = self.deliver(msg, thread_id).await;
                self.metrics
                    .record_duration(PROVIDER_ID, &self.room, started.elapsed());

                if let Err(e) = result {
                    self.metrics.record_error(PROVIDER_ID, &self.room);
                    error!(
                        room = %self.room,
                        fingerprint = %alert.fingerprint,
                        error = %e,
                        "Error sending message"
                    );
                }
            }
        }

        Ok(())
    }

    fn shutdown(&self) {
        self.cancel.cancel();
    }
}

fn parse_proxy(proxy_url: &str) -> Result<reqwest::Proxy, ProviderError> {
    let url = Url::parse(proxy_url)
        .map_err(|e| ProviderError::Config(format!("error parsing proxy URL: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ProviderError::Config(format!(
            "unsupported proxy scheme: {}",
            url.scheme()
        )));
    }

    reqwest::Proxy::all(url)
        .map_err(|e| ProviderError::Config(format!("error parsing proxy URL: {e}")))
}
