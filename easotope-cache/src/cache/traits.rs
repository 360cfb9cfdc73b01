//! Type-erased cache seam and cache statistics.

use easotope_core::EasotopeResult;
use easotope_events::{Completion, Event};
use serde::{Deserialize, Serialize};

/// What the hub needs from an entity cache regardless of its plugin.
///
/// Every registered cache sees every push event. A completion is offered to
/// each cache until one claims it.
pub trait CacheSink: Send + Sync {
    /// Plugin name, for logs.
    fn name(&self) -> &'static str;

    /// Handle `completion` if this cache submitted the command.
    /// Returns `Ok(false)` when the correlation id is not ours.
    fn complete(&self, completion: &Completion) -> EasotopeResult<bool>;

    fn apply_event(&self, event: &Event) -> EasotopeResult<()>;

    fn stats(&self) -> EasotopeResult<CacheStats>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// `get` calls answered from a resolved entry.
    pub hits: u64,
    /// `get` calls that submitted a fetch.
    pub misses: u64,
    /// `get` calls that joined a fetch already in flight.
    pub deduplicated: u64,
    /// Fetch completions discarded because a newer fetch superseded them.
    pub stale_discarded: u64,
    /// Push events that touched at least one key.
    pub events_applied: u64,
    /// Callbacks queued for delivery.
    pub notifications: u64,
    /// Commands awaiting completion.
    pub pending: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0). Joined fetches count as misses.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.deduplicated;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
