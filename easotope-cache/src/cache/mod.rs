//! Generic push-updated entity cache.
//!
//! ```text
//! caller --get/save/delete--> EntityCache<P> --Command--> RemoteChannel
//!                                  |    ^
//!                       EntityPlugin    | Completion / Event
//!                                  v    |
//!                            EntryStore<P>  --callbacks--> subscribers
//! ```
//!
//! The plugin supplies everything entity specific: keys, commands,
//! decoding and push event classification. The cache supplies fetch
//! deduplication, the stale-response guard, waiter and listener bookkeeping,
//! and no-op update suppression.

mod entity_cache;
mod entry;
mod key;
mod plugin;
mod recording;
mod subscriber;
mod traits;

pub use entity_cache::EntityCache;
pub use entry::{CacheEntry, EntryStore, EntryView};
pub use key::CacheKey;
pub use plugin::{decode_error, Decoded, DecodedEntry, EntityPlugin, EventUpdate};
pub use recording::{Callback, RecordingListener};
pub use subscriber::{CacheListener, Capabilities, Subscriber};
pub use traits::{CacheSink, CacheStats};
