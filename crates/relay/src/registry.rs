//! Thread registry for alert conversations.
//!
//! Maps an alert fingerprint to the thread identity used by the chat backend,
//! so repeated notifications for the same alert land in the same thread.
//!
//! ```text
//!   fingerprint ──> ThreadEntry { thread_id, last_seen }
//!                        │
//!                        └── evicted once now - last_seen > ttl
//! ```
//!
//! Entries are created and refreshed by the dispatch pipeline and removed only
//! by [`ThreadRegistry::evict_expired`], normally driven by the background
//! worker from [`ThreadRegistry::spawn_eviction`]. A fingerprint that returns
//! after eviction gets a fresh thread identity.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::alert::Alert;

/// Default interval between eviction sweeps.
pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Thread metadata for one active fingerprint.
#[derive(Debug, Clone, Copy)]
pub struct ThreadEntry {
    /// Thread identity sent to the backend as `threadKey`.
    pub thread_id: Uuid,
    /// Last time the fingerprint was observed.
    pub last_seen: Instant,
}

impl ThreadEntry {
    fn new(now: Instant) -> Self {
        Self {
            thread_id: Uuid::new_v4(),
            last_seen: now,
        }
    }

    /// Check if this entry has outlived the TTL.
    #[must_use]
    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > ttl
    }
}

/// In-memory fingerprint to thread registry.
///
/// Every read, write and delete goes through the same mutex.
#[derive(Debug)]
pub struct ThreadRegistry {
    entries: Mutex<HashMap<String, ThreadEntry>>,
    ttl: Duration,
}

impl ThreadRegistry {
    /// Create an empty registry whose entries expire after `ttl` of inactivity.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Idle duration after which an entry is evicted.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get the thread identity for a fingerprint without modifying anything.
    pub async fn lookup(&self, fingerprint: &str) -> Option<Uuid> {
        let entries = self.entries.lock().await;
        entries.get(fingerprint).map(|entry| entry.thread_id)
    }

    /// Mint a thread for the alert's fingerprint.
    ///
    /// If an entry already exists its identity is kept and returned; the
    /// first writer wins.
    pub async fn add(&self, alert: &Alert) -> Uuid {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries
            .entry(alert.fingerprint.clone())
            .or_insert_with(|| {
                debug!(fingerprint = %alert.fingerprint, "Creating alert thread");
                ThreadEntry::new(now)
            })
            .thread_id
    }

    /// Refresh `last_seen` for a fingerprint. Returns false if no entry exists.
    pub async fn touch(&self, fingerprint: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get_mut(fingerprint) {
            Some(entry) => {
                entry.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Record an observation of the alert and return its thread identity.
    ///
    /// Lookup, creation and refresh happen under one lock acquisition.
    pub async fn observe(&self, alert: &Alert) -> Uuid {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let entry = entries
            .entry(alert.fingerprint.clone())
            .or_insert_with(|| {
                debug!(fingerprint = %alert.fingerprint, "Creating alert thread");
                ThreadEntry::new(now)
            });
        entry.last_seen = now;
        entry.thread_id
    }

    /// Remove every entry idle for longer than the TTL. Returns the count removed.
    pub async fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now, ttl));
        before - entries.len()
    }

    /// Number of active threads.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Check if the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Spawn the background eviction worker.
    ///
    /// The first sweep runs one `every` after spawning. The worker exits when
    /// `cancel` is cancelled.
    pub fn spawn_eviction(
        self: &Arc<Self>,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("Thread eviction worker stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = registry.evict_expired().await;
                        if evicted > 0 {
                            info!(evicted, ttl_secs = registry.ttl.as_secs(), "Evicted stale alert threads");
                        }
                    }
                }
            }
        })
    }
}
