//! Cache key marker.
//!
//! Each entity plugin defines its own key type. Keys are compared
//! structurally: two keys built from the same fetch parameters are equal
//! and hash identically, so a freshly built probe key finds the stored
//! entry.

use std::fmt::Debug;
use std::hash::Hash;

/// Marker for types usable as a cache key.
///
/// Keys are immutable once stored. Moving an entity under a different key
/// is modelled as a delete of the old key followed by an insert of the new.
pub trait CacheKey: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}
