//! Entity Drivers
//!
//! In-memory storage and indexing for the entity graph. All drivers share the generic
//! [`MemoryEntityDriver`] lifecycle:
//!
//! - `publish` - upsert, gated by the driver's publish comparison
//! - `query` - per key `Ok` / `Empty` / `NotFound` / `BadRequest`
//! - `empty` - race-safe negative cache marks
//! - `subscribe` - bounded channel consumers filtered by key
//! - `delete`, `expire_by_update`, `expire_by_access`, `dispose`
//!
//! [`ObjectDriver`] adds tree adjacency and query-result caches; [`ContentDriver`]
//! adds latest/range/current lookups for content records.

pub mod consumer;
pub mod content;
pub mod memory;
pub mod object;
pub mod result;
pub mod retention;

pub use consumer::{ConsumerRegistry, EntityConsumer};
pub use content::{member_key, ContentDriver, ContentDrivers, ContentPolicy};
pub use memory::{fingerprint, DriverStats, EntityPolicy, MemoryEntityDriver};
pub use object::{ObjectDriver, ObjectIndexStats, ObjectIndexes, ObjectPolicy, PathResult};
pub use result::{EmptyRequest, EntityResult, PublishResult};
pub use retention::{spawn_retention, Expire, RetentionHandle};
