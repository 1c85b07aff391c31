//! Content entities
//!
//! Typed values attached to Objects. Each record carries the owning object's uuid, its
//! payload, an optional source and a `created` write timestamp (Unix nanoseconds).
//!
//! Entity uuids are derived from the fields that make a record unique for its type, so
//! the same logical value always lands under the same key:
//!
//! | Type | Unique by |
//! |------|-----------|
//! | scalar types | owning object |
//! | Event, Log, State | object + timestamp |
//! | Observation | object + batch + sequence + timestamp |
//! | Statistic | object + time range |
//! | Assignment | assignee + member + add timestamp |
//! | Group | group + member |
//! | Hash | object + key |
//! | Set | object + value |

use crate::models::content_type::ContentType;
use crate::models::object::ObjectEntity;
use crate::models::path::hash_key;
use serde::{Deserialize, Serialize};

/// Common surface every stored entity exposes to the drivers
pub trait Entity: Clone + Send + Sync + Serialize + 'static {
    /// Natural key of the record
    fn entity_uuid(&self) -> String;

    /// Write timestamp
    fn created(&self) -> i64;
}

impl Entity for ObjectEntity {
    fn entity_uuid(&self) -> String {
        self.uuid.clone()
    }

    fn created(&self) -> i64 {
        self.created
    }
}

fn key_of(parts: &[&str]) -> String {
    hash_key(&parts.join(":"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentEntity {
    pub assignee_uuid: String,
    pub member_uuid: String,
    pub add_timestamp: i64,
    pub add_source_uuid: Option<String>,
    /// Values below 1 mean the assignment is still in force
    pub remove_timestamp: i64,
    pub remove_source_uuid: Option<String>,
    pub created: i64,
}

impl AssignmentEntity {
    pub fn new(assignee_uuid: impl Into<String>, member_uuid: impl Into<String>, add_timestamp: i64) -> Self {
        Self {
            assignee_uuid: assignee_uuid.into(),
            member_uuid: member_uuid.into(),
            add_timestamp,
            add_source_uuid: None,
            remove_timestamp: 0,
            remove_source_uuid: None,
            created: add_timestamp,
        }
    }

    pub fn removed_at(mut self, remove_timestamp: i64, created: i64) -> Self {
        self.remove_timestamp = remove_timestamp;
        self.created = created;
        self
    }

    pub fn is_current(&self) -> bool {
        self.remove_timestamp < 1
    }
}

impl Entity for AssignmentEntity {
    fn entity_uuid(&self) -> String {
        key_of(&[&self.assignee_uuid, &self.member_uuid, &self.add_timestamp.to_string()])
    }

    fn created(&self) -> i64 {
        self.created
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobEntity {
    pub object_uuid: String,
    pub blob_id: String,
    pub content_type: String,
    pub size: u64,
    pub source_uuid: Option<String>,
    pub created: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BooleanEntity {
    pub object_uuid: String,
    pub value: bool,
    pub source_uuid: Option<String>,
    pub created: i64,
}

impl BooleanEntity {
    pub fn new(object_uuid: impl Into<String>, value: bool, created: i64) -> Self {
        Self {
            object_uuid: object_uuid.into(),
            value,
            source_uuid: None,
            created,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationEntity {
    pub object_uuid: String,
    /// Nanoseconds
    pub value: u64,
    pub source_uuid: Option<String>,
    pub created: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEntity {
    pub object_uuid: String,
    pub target_uuid: String,
    pub timestamp: i64,
    pub source_uuid: Option<String>,
    pub created: i64,
}

impl EventEntity {
    pub fn new(object_uuid: impl Into<String>, target_uuid: impl Into<String>, timestamp: i64) -> Self {
        Self {
            object_uuid: object_uuid.into(),
            target_uuid: target_uuid.into(),
            timestamp,
            source_uuid: None,
            created: timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupEntity {
    pub group_uuid: String,
    pub member_uuid: String,
    pub source_uuid: Option<String>,
    pub created: i64,
}

impl GroupEntity {
    pub fn new(group_uuid: impl Into<String>, member_uuid: impl Into<String>, created: i64) -> Self {
        Self {
            group_uuid: group_uuid.into(),
            member_uuid: member_uuid.into(),
            source_uuid: None,
            created,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashEntity {
    pub object_uuid: String,
    pub key: String,
    pub value: String,
    pub source_uuid: Option<String>,
    pub created: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Information,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntity {
    pub object_uuid: String,
    pub log_level: LogLevel,
    pub message: String,
    pub code: Option<String>,
    pub timestamp: i64,
    pub source_uuid: Option<String>,
    pub created: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEntity {
    pub object_uuid: String,
    pub topic: String,
    pub content_type: String,
    pub retain: bool,
    pub qos: i32,
    pub source_uuid: Option<String>,
    pub created: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberEntity {
    pub object_uuid: String,
    pub value: f64,
    pub source_uuid: Option<String>,
    pub created: i64,
}

impl NumberEntity {
    pub fn new(object_uuid: impl Into<String>, value: f64, created: i64) -> Self {
        Self {
            object_uuid: object_uuid.into(),
            value,
            source_uuid: None,
            created,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationEntity {
    pub object_uuid: String,
    pub value: String,
    pub data_type: String,
    pub batch_id: u64,
    pub sequence: u64,
    pub timestamp: i64,
    pub source_uuid: Option<String>,
    pub created: i64,
}

impl ObservationEntity {
    pub fn new(object_uuid: impl Into<String>, value: impl Into<String>, timestamp: i64) -> Self {
        Self {
            object_uuid: object_uuid.into(),
            value: value.into(),
            data_type: "String".to_string(),
            batch_id: 0,
            sequence: 0,
            timestamp,
            source_uuid: None,
            created: timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceEntity {
    pub object_uuid: String,
    pub target_uuid: String,
    pub source_uuid: Option<String>,
    pub created: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetEntity {
    pub object_uuid: String,
    pub value: String,
    pub source_uuid: Option<String>,
    pub created: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateEntity {
    pub object_uuid: String,
    pub definition_uuid: String,
    pub ttl: u32,
    pub timestamp: i64,
    pub source_uuid: Option<String>,
    pub created: i64,
}

impl StateEntity {
    pub fn new(object_uuid: impl Into<String>, definition_uuid: impl Into<String>, timestamp: i64) -> Self {
        Self {
            object_uuid: object_uuid.into(),
            definition_uuid: definition_uuid.into(),
            ttl: 0,
            timestamp,
            source_uuid: None,
            created: timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticEntity {
    pub object_uuid: String,
    pub value: String,
    pub data_type: String,
    pub time_range_start: i64,
    pub time_range_end: i64,
    pub timestamp: i64,
    pub source_uuid: Option<String>,
    pub created: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StringEntity {
    pub object_uuid: String,
    pub value: String,
    pub source_uuid: Option<String>,
    pub created: i64,
}

impl StringEntity {
    pub fn new(object_uuid: impl Into<String>, value: impl Into<String>, created: i64) -> Self {
        Self {
            object_uuid: object_uuid.into(),
            value: value.into(),
            source_uuid: None,
            created,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRangeEntity {
    pub object_uuid: String,
    pub start: i64,
    pub end: i64,
    pub source_uuid: Option<String>,
    pub created: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimestampEntity {
    pub object_uuid: String,
    pub value: i64,
    pub source_uuid: Option<String>,
    pub created: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyEntity {
    pub object_uuid: String,
    pub definition_uuid: String,
    pub source_uuid: Option<String>,
    pub created: i64,
}

/// Any content record, tagged with its content type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentEntity {
    Assignment(AssignmentEntity),
    Blob(BlobEntity),
    Boolean(BooleanEntity),
    Duration(DurationEntity),
    Event(EventEntity),
    Group(GroupEntity),
    Hash(HashEntity),
    Log(LogEntity),
    Message(MessageEntity),
    Number(NumberEntity),
    Observation(ObservationEntity),
    Reference(ReferenceEntity),
    Set(SetEntity),
    State(StateEntity),
    Statistic(StatisticEntity),
    String(StringEntity),
    TimeRange(TimeRangeEntity),
    Timestamp(TimestampEntity),
    Vocabulary(VocabularyEntity),
}

impl ContentEntity {
    pub fn content_type(&self) -> ContentType {
        match self {
            ContentEntity::Assignment(_) => ContentType::Assignment,
            ContentEntity::Blob(_) => ContentType::Blob,
            ContentEntity::Boolean(_) => ContentType::Boolean,
            ContentEntity::Duration(_) => ContentType::Duration,
            ContentEntity::Event(_) => ContentType::Event,
            ContentEntity::Group(_) => ContentType::Group,
            ContentEntity::Hash(_) => ContentType::Hash,
            ContentEntity::Log(_) => ContentType::Log,
            ContentEntity::Message(_) => ContentType::Message,
            ContentEntity::Number(_) => ContentType::Number,
            ContentEntity::Observation(_) => ContentType::Observation,
            ContentEntity::Reference(_) => ContentType::Reference,
            ContentEntity::Set(_) => ContentType::Set,
            ContentEntity::State(_) => ContentType::State,
            ContentEntity::Statistic(_) => ContentType::Statistic,
            ContentEntity::String(_) => ContentType::String,
            ContentEntity::TimeRange(_) => ContentType::TimeRange,
            ContentEntity::Timestamp(_) => ContentType::Timestamp,
            ContentEntity::Vocabulary(_) => ContentType::Vocabulary,
        }
    }

    /// Uuid of the object that owns the record (assignee for assignments, group for groups)
    pub fn object_uuid(&self) -> &str {
        match self {
            ContentEntity::Assignment(e) => &e.assignee_uuid,
            ContentEntity::Blob(e) => &e.object_uuid,
            ContentEntity::Boolean(e) => &e.object_uuid,
            ContentEntity::Duration(e) => &e.object_uuid,
            ContentEntity::Event(e) => &e.object_uuid,
            ContentEntity::Group(e) => &e.group_uuid,
            ContentEntity::Hash(e) => &e.object_uuid,
            ContentEntity::Log(e) => &e.object_uuid,
            ContentEntity::Message(e) => &e.object_uuid,
            ContentEntity::Number(e) => &e.object_uuid,
            ContentEntity::Observation(e) => &e.object_uuid,
            ContentEntity::Reference(e) => &e.object_uuid,
            ContentEntity::Set(e) => &e.object_uuid,
            ContentEntity::State(e) => &e.object_uuid,
            ContentEntity::Statistic(e) => &e.object_uuid,
            ContentEntity::String(e) => &e.object_uuid,
            ContentEntity::TimeRange(e) => &e.object_uuid,
            ContentEntity::Timestamp(e) => &e.object_uuid,
            ContentEntity::Vocabulary(e) => &e.object_uuid,
        }
    }

    /// Object on the other side of a relation, if the record points at one
    pub fn related_object_uuid(&self) -> Option<&str> {
        match self {
            ContentEntity::Assignment(e) => Some(&e.member_uuid),
            ContentEntity::Event(e) => Some(&e.target_uuid),
            ContentEntity::Group(e) => Some(&e.member_uuid),
            ContentEntity::Reference(e) => Some(&e.target_uuid),
            _ => None,
        }
    }

    /// Time used for ordering and range filters
    pub fn timestamp(&self) -> i64 {
        match self {
            ContentEntity::Assignment(e) => e.add_timestamp,
            ContentEntity::Event(e) => e.timestamp,
            ContentEntity::Log(e) => e.timestamp,
            ContentEntity::Observation(e) => e.timestamp,
            ContentEntity::State(e) => e.timestamp,
            ContentEntity::Statistic(e) => e.timestamp,
            other => other.created(),
        }
    }
}

impl Entity for ContentEntity {
    fn entity_uuid(&self) -> String {
        match self {
            ContentEntity::Assignment(e) => e.entity_uuid(),
            ContentEntity::Event(e) => key_of(&[&e.object_uuid, &e.timestamp.to_string()]),
            ContentEntity::Group(e) => key_of(&[&e.group_uuid, &e.member_uuid]),
            ContentEntity::Hash(e) => key_of(&[&e.object_uuid, &e.key]),
            ContentEntity::Log(e) => key_of(&[&e.object_uuid, &e.timestamp.to_string(), &e.message]),
            ContentEntity::Observation(e) => key_of(&[
                &e.object_uuid,
                &e.batch_id.to_string(),
                &e.sequence.to_string(),
                &e.timestamp.to_string(),
            ]),
            ContentEntity::Set(e) => key_of(&[&e.object_uuid, &e.value]),
            ContentEntity::State(e) => key_of(&[&e.object_uuid, &e.timestamp.to_string()]),
            ContentEntity::Statistic(e) => key_of(&[
                &e.object_uuid,
                &e.time_range_start.to_string(),
                &e.time_range_end.to_string(),
            ]),
            ContentEntity::Message(e) => key_of(&[&e.object_uuid, &e.topic]),
            // one record per object for the remaining scalar types
            other => key_of(&[other.object_uuid(), other.content_type().as_str()]),
        }
    }

    fn created(&self) -> i64 {
        match self {
            ContentEntity::Assignment(e) => e.created,
            ContentEntity::Blob(e) => e.created,
            ContentEntity::Boolean(e) => e.created,
            ContentEntity::Duration(e) => e.created,
            ContentEntity::Event(e) => e.created,
            ContentEntity::Group(e) => e.created,
            ContentEntity::Hash(e) => e.created,
            ContentEntity::Log(e) => e.created,
            ContentEntity::Message(e) => e.created,
            ContentEntity::Number(e) => e.created,
            ContentEntity::Observation(e) => e.created,
            ContentEntity::Reference(e) => e.created,
            ContentEntity::Set(e) => e.created,
            ContentEntity::State(e) => e.created,
            ContentEntity::Statistic(e) => e.created,
            ContentEntity::String(e) => e.created,
            ContentEntity::TimeRange(e) => e.created,
            ContentEntity::Timestamp(e) => e.created,
            ContentEntity::Vocabulary(e) => e.created,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_uuid_is_per_object() {
        let a = ContentEntity::Boolean(BooleanEntity::new("obj", true, 1));
        let b = ContentEntity::Boolean(BooleanEntity::new("obj", false, 2));
        assert_eq!(a.entity_uuid(), b.entity_uuid());

        let c = ContentEntity::String(StringEntity::new("obj", "x", 1));
        assert_ne!(a.entity_uuid(), c.entity_uuid());
    }

    #[test]
    fn test_series_uuid_includes_timestamp() {
        let a = ContentEntity::State(StateEntity::new("obj", "RUNNING", 100));
        let b = ContentEntity::State(StateEntity::new("obj", "RUNNING", 200));
        assert_ne!(a.entity_uuid(), b.entity_uuid());
    }

    #[test]
    fn test_assignment_current_flag() {
        let assignment = AssignmentEntity::new("a", "b", 10);
        assert!(assignment.is_current());
        let removed = assignment.clone().removed_at(500, 600);
        assert!(!removed.is_current());
        assert_eq!(assignment.entity_uuid(), removed.entity_uuid());
    }

    #[test]
    fn test_related_and_owner() {
        let event = ContentEntity::Event(EventEntity::new("obj", "target", 5));
        assert_eq!(event.object_uuid(), "obj");
        assert_eq!(event.related_object_uuid(), Some("target"));
        assert_eq!(event.timestamp(), 5);

        let group = ContentEntity::Group(GroupEntity::new("g", "m", 1));
        assert_eq!(group.object_uuid(), "g");
        assert_eq!(group.related_object_uuid(), Some("m"));
    }

    #[test]
    fn test_tagged_serialization() {
        let entity = ContentEntity::Number(NumberEntity::new("obj", 4.5, 1));
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["type"], "number");
        assert_eq!(json["objectUuid"], "obj");
    }
}
