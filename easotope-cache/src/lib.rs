//! Easotope Cache - Push-Updated Client Object Cache
//!
//! Gives every consumer in one client context a consistent, deduplicated
//! view of server-held lab entities. Reads go through [`EntityCache::get`];
//! writes through `save` and `delete`; remote changes arrive as push
//! events and are applied through each plugin's event classification.
//!
//! # Layout
//!
//! - [`cache`]: the generic machinery (`EntityCache<P>`, `EntityPlugin`,
//!   subscribers, entry store)
//! - [`plugins`]: one plugin per lab entity kind
//! - [`Cache`]: per-context hub routing completions and events
//! - [`LabCaches`]: all lab caches over one hub
//! - [`logging`]: tracing subscriber setup

pub mod cache;
mod hub;
mod lab;
pub mod logging;
pub mod plugins;

pub use cache::{
    CacheListener, CacheSink, CacheStats, Capabilities, Decoded, DecodedEntry, EntityCache,
    EntityPlugin, EntryView, EventUpdate, RecordingListener, Subscriber,
};
pub use hub::Cache;
pub use lab::{CacheKind, ChangeListener, ChangeSubscription, LabCaches};
pub use logging::init_logging;
