//! Data Models
//!
//! The entity graph is made of:
//!
//! - [`ObjectEntity`] - a node of the namespace tree, addressed by `namespace:path`
//! - [`ContentEntity`] - a typed value attached to an object (state, event, number, ...)
//! - [`EntityCollection`] - a local snapshot of both, with adjacency and index lookups
//!
//! Timestamps throughout are Unix nanoseconds, see [`time`].

pub mod collection;
pub mod content;
pub mod content_type;
pub mod object;
pub mod path;
pub mod request;
pub mod time;

pub use collection::{CollectionSnapshot, EntityCollection, IndexEntry};
pub use content::{
    AssignmentEntity, BlobEntity, BooleanEntity, ContentEntity, DurationEntity, Entity, EventEntity,
    GroupEntity, HashEntity, LogEntity, LogLevel, MessageEntity, NumberEntity, ObservationEntity,
    ReferenceEntity, SetEntity, StateEntity, StatisticEntity, StringEntity, TimeRangeEntity,
    TimestampEntity, VocabularyEntity,
};
pub use content_type::ContentType;
pub use object::ObjectEntity;
pub use request::{ObjectQueryRequest, ObjectQueryResult, ObjectQueryType, SortOrder, ROOT_KEY};
