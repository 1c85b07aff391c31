//! Query results
//!
//! Columnar results with a stable schema string per shape:
//!
//! | Schema | Rows |
//! |--------|------|
//! | `trakhound.entities.objects.target` | target objects (`>>`) |
//! | `trakhound.entities.objects` | directory targets of `>` |
//! | `trakhound.entities.objects.<type>` | content records of `>` targets, one per record |
//! | `trakhound.entities.objects.content` | one row per target, one column per child (`*`) |
//!
//! Timestamps are Unix nanoseconds; missing values are `null`.

use crate::models::content::ContentEntity;
use crate::models::content_type::ContentType;
use crate::models::object::ObjectEntity;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const OBJECTS_SCHEMA: &str = "trakhound.entities.objects";
pub const TARGET_SCHEMA: &str = "trakhound.entities.objects.target";
pub const CONTENT_SCHEMA: &str = "trakhound.entities.objects.content";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnDataType {
    String,
    Number,
    Boolean,
    Timestamp,
    Duration,
    /// Uuid of another object
    Object,
    /// Uuid of a source record
    Source,
    /// Uuid of a definition
    Definition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryColumn {
    pub name: String,
    pub data_type: ColumnDataType,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub schema: String,
    pub columns: Vec<QueryColumn>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn new(schema: impl Into<String>, columns: Vec<QueryColumn>) -> Self {
        Self {
            schema: schema.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Cell of `row` in the named column
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }
}

fn columns(definitions: &[(&str, ColumnDataType)]) -> Vec<QueryColumn> {
    definitions
        .iter()
        .map(|(name, data_type)| QueryColumn {
            name: name.to_string(),
            data_type: *data_type,
        })
        .collect()
}

/// Schema of the per-type result of `>`
pub fn content_schema(content_type: ContentType) -> String {
    format!("{}.{}", OBJECTS_SCHEMA, content_type.schema_name())
}

// ===== Objects =====

pub fn objects_result(objects: &[ObjectEntity], target: bool) -> QueryResult {
    use ColumnDataType::*;

    let schema = if target { TARGET_SCHEMA } else { OBJECTS_SCHEMA };
    let mut result = QueryResult::new(
        schema,
        columns(&[
            ("Uuid", Object),
            ("Namespace", String),
            ("Path", String),
            ("ContentType", String),
            ("DefinitionUuid", Definition),
            ("Priority", Number),
            ("SourceUuid", Source),
            ("Created", Timestamp),
        ]),
    );

    result.rows = objects
        .iter()
        .map(|o| {
            vec![
                json!(o.uuid),
                json!(o.namespace),
                json!(o.path),
                json!(o.content_type.as_str()),
                json!(o.definition_uuid),
                json!(o.priority),
                json!(o.source_uuid),
                json!(o.created),
            ]
        })
        .collect();
    result
}

// ===== Content =====

/// Fixed columns of a content type's result; `None` for types without records
pub fn content_columns(content_type: ContentType) -> Option<Vec<QueryColumn>> {
    use ColumnDataType::*;

    let definitions: &[(&str, ColumnDataType)] = match content_type {
        ContentType::Assignment => &[
            ("AssigneeUuid", Object),
            ("MemberUuid", Object),
            ("AddTimestamp", Timestamp),
            ("AddSourceUuid", Source),
            ("RemoveTimestamp", Timestamp),
            ("RemoveSourceUuid", Source),
            ("Created", Timestamp),
        ],
        ContentType::Blob => &[
            ("ObjectUuid", Object),
            ("BlobId", String),
            ("ContentType", String),
            ("Size", Number),
            ("SourceUuid", Source),
            ("Created", Timestamp),
        ],
        ContentType::Boolean => &[("ObjectUuid", Object), ("Value", Boolean), ("SourceUuid", Source), ("Created", Timestamp)],
        ContentType::Duration => &[("ObjectUuid", Object), ("Value", Duration), ("SourceUuid", Source), ("Created", Timestamp)],
        ContentType::Number => &[("ObjectUuid", Object), ("Value", Number), ("SourceUuid", Source), ("Created", Timestamp)],
        ContentType::String => &[("ObjectUuid", Object), ("Value", String), ("SourceUuid", Source), ("Created", Timestamp)],
        ContentType::Timestamp => &[("ObjectUuid", Object), ("Value", Timestamp), ("SourceUuid", Source), ("Created", Timestamp)],
        ContentType::Event => &[
            ("ObjectUuid", Object),
            ("TargetUuid", Object),
            ("Timestamp", Timestamp),
            ("SourceUuid", Source),
            ("Created", Timestamp),
        ],
        ContentType::Group => &[("GroupUuid", Object), ("MemberUuid", Object), ("SourceUuid", Source), ("Created", Timestamp)],
        ContentType::Hash => &[
            ("ObjectUuid", Object),
            ("Key", String),
            ("Value", String),
            ("SourceUuid", Source),
            ("Created", Timestamp),
        ],
        ContentType::Log => &[
            ("ObjectUuid", Object),
            ("LogLevel", String),
            ("Message", String),
            ("Code", String),
            ("Timestamp", Timestamp),
            ("SourceUuid", Source),
            ("Created", Timestamp),
        ],
        ContentType::Message => &[
            ("ObjectUuid", Object),
            ("Topic", String),
            ("ContentType", String),
            ("Retain", Boolean),
            ("Qos", Number),
            ("SourceUuid", Source),
            ("Created", Timestamp),
        ],
        ContentType::Observation => &[
            ("ObjectUuid", Object),
            ("Value", String),
            ("DataType", String),
            ("BatchId", Number),
            ("Sequence", Number),
            ("Timestamp", Timestamp),
            ("SourceUuid", Source),
            ("Created", Timestamp),
        ],
        ContentType::Reference => &[("ObjectUuid", Object), ("TargetUuid", Object), ("SourceUuid", Source), ("Created", Timestamp)],
        ContentType::Set => &[("ObjectUuid", Object), ("Value", String), ("SourceUuid", Source), ("Created", Timestamp)],
        ContentType::State => &[
            ("ObjectUuid", Object),
            ("DefinitionUuid", Definition),
            ("TTL", Number),
            ("Timestamp", Timestamp),
            ("SourceUuid", Source),
            ("Created", Timestamp),
        ],
        ContentType::Statistic => &[
            ("ObjectUuid", Object),
            ("Value", String),
            ("DataType", String),
            ("TimeRangeStart", Timestamp),
            ("TimeRangeEnd", Timestamp),
            ("Timestamp", Timestamp),
            ("SourceUuid", Source),
            ("Created", Timestamp),
        ],
        ContentType::TimeRange => &[
            ("ObjectUuid", Object),
            ("Start", Timestamp),
            ("End", Timestamp),
            ("SourceUuid", Source),
            ("Created", Timestamp),
        ],
        ContentType::Vocabulary => &[
            ("ObjectUuid", Object),
            ("DefinitionUuid", Definition),
            ("SourceUuid", Source),
            ("Created", Timestamp),
        ],
        ContentType::Directory | ContentType::MessageQueue | ContentType::VocabularySet => return None,
    };
    Some(columns(definitions))
}

/// Cells of one record, in [`content_columns`] order
pub fn content_row(entity: &ContentEntity) -> Vec<Value> {
    match entity {
        ContentEntity::Assignment(e) => vec![
            json!(e.assignee_uuid),
            json!(e.member_uuid),
            json!(e.add_timestamp),
            json!(e.add_source_uuid),
            json!(e.remove_timestamp),
            json!(e.remove_source_uuid),
            json!(e.created),
        ],
        ContentEntity::Blob(e) => vec![
            json!(e.object_uuid),
            json!(e.blob_id),
            json!(e.content_type),
            json!(e.size),
            json!(e.source_uuid),
            json!(e.created),
        ],
        ContentEntity::Boolean(e) => vec![json!(e.object_uuid), json!(e.value), json!(e.source_uuid), json!(e.created)],
        ContentEntity::Duration(e) => vec![json!(e.object_uuid), json!(e.value), json!(e.source_uuid), json!(e.created)],
        ContentEntity::Number(e) => vec![json!(e.object_uuid), json!(e.value), json!(e.source_uuid), json!(e.created)],
        ContentEntity::String(e) => vec![json!(e.object_uuid), json!(e.value), json!(e.source_uuid), json!(e.created)],
        ContentEntity::Timestamp(e) => vec![json!(e.object_uuid), json!(e.value), json!(e.source_uuid), json!(e.created)],
        ContentEntity::Event(e) => vec![
            json!(e.object_uuid),
            json!(e.target_uuid),
            json!(e.timestamp),
            json!(e.source_uuid),
            json!(e.created),
        ],
        ContentEntity::Group(e) => vec![json!(e.group_uuid), json!(e.member_uuid), json!(e.source_uuid), json!(e.created)],
        ContentEntity::Hash(e) => vec![
            json!(e.object_uuid),
            json!(e.key),
            json!(e.value),
            json!(e.source_uuid),
            json!(e.created),
        ],
        ContentEntity::Log(e) => vec![
            json!(e.object_uuid),
            json!(format!("{:?}", e.log_level)),
            json!(e.message),
            json!(e.code),
            json!(e.timestamp),
            json!(e.source_uuid),
            json!(e.created),
        ],
        ContentEntity::Message(e) => vec![
            json!(e.object_uuid),
            json!(e.topic),
            json!(e.content_type),
            json!(e.retain),
            json!(e.qos),
            json!(e.source_uuid),
            json!(e.created),
        ],
        ContentEntity::Observation(e) => vec![
            json!(e.object_uuid),
            json!(e.value),
            json!(e.data_type),
            json!(e.batch_id),
            json!(e.sequence),
            json!(e.timestamp),
            json!(e.source_uuid),
            json!(e.created),
        ],
        ContentEntity::Reference(e) => vec![json!(e.object_uuid), json!(e.target_uuid), json!(e.source_uuid), json!(e.created)],
        ContentEntity::Set(e) => vec![json!(e.object_uuid), json!(e.value), json!(e.source_uuid), json!(e.created)],
        ContentEntity::State(e) => vec![
            json!(e.object_uuid),
            json!(e.definition_uuid),
            json!(e.ttl),
            json!(e.timestamp),
            json!(e.source_uuid),
            json!(e.created),
        ],
        ContentEntity::Statistic(e) => vec![
            json!(e.object_uuid),
            json!(e.value),
            json!(e.data_type),
            json!(e.time_range_start),
            json!(e.time_range_end),
            json!(e.timestamp),
            json!(e.source_uuid),
            json!(e.created),
        ],
        ContentEntity::TimeRange(e) => vec![
            json!(e.object_uuid),
            json!(e.start),
            json!(e.end),
            json!(e.source_uuid),
            json!(e.created),
        ],
        ContentEntity::Vocabulary(e) => vec![
            json!(e.object_uuid),
            json!(e.definition_uuid),
            json!(e.source_uuid),
            json!(e.created),
        ],
    }
}

/// One row per record, under the type's fixed schema
pub fn content_result(content_type: ContentType, entities: &[&ContentEntity]) -> Option<QueryResult> {
    let mut result = QueryResult::new(content_schema(content_type), content_columns(content_type)?);
    result.rows = entities
        .iter()
        .filter(|e| e.content_type() == content_type)
        .map(|e| content_row(e))
        .collect();
    Some(result)
}

// ===== Accessors =====

/// Column type of a content object's default value
pub fn value_data_type(content_type: ContentType) -> ColumnDataType {
    match content_type {
        ContentType::Boolean => ColumnDataType::Boolean,
        ContentType::Number => ColumnDataType::Number,
        ContentType::Timestamp | ContentType::TimeRange => ColumnDataType::Timestamp,
        ContentType::Duration => ColumnDataType::Duration,
        ContentType::State | ContentType::Vocabulary => ColumnDataType::Definition,
        ContentType::Assignment | ContentType::Event | ContentType::Group | ContentType::Reference => {
            ColumnDataType::Object
        }
        _ => ColumnDataType::String,
    }
}

/// The value a record stands for in conditions and content columns
pub fn default_value(entity: &ContentEntity) -> Value {
    match entity {
        ContentEntity::Boolean(e) => json!(e.value),
        ContentEntity::Number(e) => json!(e.value),
        ContentEntity::String(e) => json!(e.value),
        ContentEntity::Timestamp(e) => json!(e.value),
        ContentEntity::Duration(e) => json!(e.value),
        ContentEntity::State(e) => json!(e.definition_uuid),
        ContentEntity::Vocabulary(e) => json!(e.definition_uuid),
        ContentEntity::Observation(e) => json!(e.value),
        ContentEntity::Statistic(e) => json!(e.value),
        ContentEntity::Set(e) => json!(e.value),
        ContentEntity::Hash(e) => json!(e.value),
        ContentEntity::Event(e) => json!(e.target_uuid),
        ContentEntity::Reference(e) => json!(e.target_uuid),
        ContentEntity::Assignment(e) => json!(e.member_uuid),
        ContentEntity::Group(e) => json!(e.member_uuid),
        ContentEntity::TimeRange(e) => json!(e.start),
        ContentEntity::Log(e) => json!(e.message),
        ContentEntity::Message(e) => json!(e.topic),
        ContentEntity::Blob(e) => json!(e.blob_id),
    }
}

/// [`default_value`] as comparison text
pub fn default_text(entity: &ContentEntity) -> String {
    match default_value(entity) {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// A named field of a record, matched case-insensitively (`timestamp`, `TTL`, ...)
pub fn property_value(entity: &ContentEntity, property: &str) -> Option<Value> {
    let Ok(Value::Object(fields)) = serde_json::to_value(entity) else {
        return None;
    };
    let wanted: String = property.chars().filter(|c| *c != '_' && *c != '-').collect();
    fields
        .into_iter()
        .find(|(name, _)| name != "type" && name.eq_ignore_ascii_case(&wanted))
        .map(|(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content::{NumberEntity, StateEntity};

    #[test]
    fn test_every_content_type_row_matches_its_columns() {
        let state = ContentEntity::State(StateEntity::new("o", "RUNNING", 5));
        let number = ContentEntity::Number(NumberEntity::new("o", 2.5, 5));
        for entity in [&state, &number] {
            let columns = content_columns(entity.content_type()).unwrap();
            assert_eq!(columns.len(), content_row(entity).len());
        }
        assert!(content_columns(ContentType::Directory).is_none());
    }

    #[test]
    fn test_state_result() {
        let state = ContentEntity::State(StateEntity::new("o", "RUNNING", 5));
        let result = content_result(ContentType::State, &[&state]).unwrap();
        assert_eq!(result.schema, "trakhound.entities.objects.state");
        assert_eq!(result.value(0, "DefinitionUuid"), Some(&json!("RUNNING")));
        assert_eq!(result.value(0, "timestamp"), Some(&json!(5)));
    }

    #[test]
    fn test_accessors() {
        let state = ContentEntity::State(StateEntity::new("o", "RUNNING", 5));
        assert_eq!(default_text(&state), "RUNNING");
        assert_eq!(property_value(&state, "Timestamp"), Some(json!(5)));
        assert_eq!(property_value(&state, "definition_uuid"), Some(json!("RUNNING")));
        assert_eq!(property_value(&state, "type"), None);

        let number = ContentEntity::Number(NumberEntity::new("o", 3.0, 1));
        assert_eq!(default_text(&number), "3.0");
        assert_eq!(value_data_type(ContentType::Number), ColumnDataType::Number);
    }

    #[test]
    fn test_objects_result_schema() {
        let object = ObjectEntity::new("plant", "/a", ContentType::Directory, 1).unwrap();
        assert_eq!(objects_result(&[object.clone()], true).schema, TARGET_SCHEMA);
        let result = objects_result(&[object], false);
        assert_eq!(result.schema, OBJECTS_SCHEMA);
        assert_eq!(result.value(0, "Path"), Some(&json!("/a")));
    }
}
