//! Replay guard for message events
//!
//! The gateway can deliver the same message more than once (reconnects,
//! resumed sessions). This cache remembers recently processed message ids so
//! a replayed event is not submitted to the NAS twice. It is in-memory only
//! and forgets entries after the TTL.

use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Recently processed message ids
#[derive(Clone)]
pub struct ProcessedCache {
    /// Moka cache storing message_id -> () mappings with automatic TTL
    cache: Cache<u64, ()>,
    /// Number of replayed events that were skipped
    replays: Arc<AtomicU64>,
}

impl ProcessedCache {
    /// Creates a new `ProcessedCache`
    ///
    /// # Arguments
    ///
    /// * `ttl_secs` - How long a processed id is remembered
    /// * `max_capacity` - Maximum number of remembered ids
    ///
    /// # Examples
    ///
    /// ```
    /// use showcase_loader::bot::ProcessedCache;
    ///
    /// let cache = ProcessedCache::new(
    ///     86_400, // one day
    ///     10_000, // max 10k entries
    /// );
    /// ```
    #[must_use]
    pub fn new(ttl_secs: u64, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self {
            cache,
            replays: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records `message_id` and returns `true` if it had not been seen yet.
    ///
    /// Insert-and-check is a single atomic cache operation, so two concurrent
    /// deliveries of the same id cannot both return `true`.
    pub async fn first_sighting(&self, message_id: u64) -> bool {
        let entry = self.cache.entry(message_id).or_insert(()).await;
        if entry.is_fresh() {
            return true;
        }

        let count = self.replays.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(message_id, replays = count, "Skipping replayed message event");
        false
    }

    /// Returns the total number of skipped replays
    #[must_use]
    pub fn replay_count(&self) -> u64 {
        self.replays.load(Ordering::Relaxed)
    }
}
