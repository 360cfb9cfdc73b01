//! Identity types for Easotope entities

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Server-assigned entity identifier.
/// The remote authority hands out dense integer ids per entity table.
pub type EntityId = i32;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Identifier for one client-side cache context.
/// Only used to tell cache instances apart in logs.
pub type InstanceId = Uuid;

/// Sentinel used by the server for "no entity".
pub const NO_ENTITY: EntityId = -1;

/// Generate a new UUIDv7 InstanceId (timestamp-sortable).
pub fn new_instance_id() -> InstanceId {
    Uuid::now_v7()
}
