//! Object content types
//!
//! Every Object in the tree is either a `Directory` or a typed leaf. The content type
//! decides which driver stores the leaf's value and which result schema the engine uses
//! when projecting it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum ContentType {
    #[default]
    Directory,
    Boolean,
    Number,
    String,
    Timestamp,
    Event,
    Observation,
    Assignment,
    Group,
    State,
    Statistic,
    Vocabulary,
    Message,
    Blob,
    Reference,
    Set,
    Log,
    Duration,
    TimeRange,
    MessageQueue,
    VocabularySet,
    Hash,
}

impl ContentType {
    pub const ALL: [ContentType; 22] = [
        ContentType::Directory,
        ContentType::Boolean,
        ContentType::Number,
        ContentType::String,
        ContentType::Timestamp,
        ContentType::Event,
        ContentType::Observation,
        ContentType::Assignment,
        ContentType::Group,
        ContentType::State,
        ContentType::Statistic,
        ContentType::Vocabulary,
        ContentType::Message,
        ContentType::Blob,
        ContentType::Reference,
        ContentType::Set,
        ContentType::Log,
        ContentType::Duration,
        ContentType::TimeRange,
        ContentType::MessageQueue,
        ContentType::VocabularySet,
        ContentType::Hash,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Directory => "Directory",
            ContentType::Boolean => "Boolean",
            ContentType::Number => "Number",
            ContentType::String => "String",
            ContentType::Timestamp => "Timestamp",
            ContentType::Event => "Event",
            ContentType::Observation => "Observation",
            ContentType::Assignment => "Assignment",
            ContentType::Group => "Group",
            ContentType::State => "State",
            ContentType::Statistic => "Statistic",
            ContentType::Vocabulary => "Vocabulary",
            ContentType::Message => "Message",
            ContentType::Blob => "Blob",
            ContentType::Reference => "Reference",
            ContentType::Set => "Set",
            ContentType::Log => "Log",
            ContentType::Duration => "Duration",
            ContentType::TimeRange => "TimeRange",
            ContentType::MessageQueue => "MessageQueue",
            ContentType::VocabularySet => "VocabularySet",
            ContentType::Hash => "Hash",
        }
    }

    /// Lower-case, hyphenated name used in result schemas (`time-range`)
    pub fn schema_name(&self) -> &'static str {
        match self {
            ContentType::Directory => "directory",
            ContentType::Boolean => "boolean",
            ContentType::Number => "number",
            ContentType::String => "string",
            ContentType::Timestamp => "timestamp",
            ContentType::Event => "event",
            ContentType::Observation => "observation",
            ContentType::Assignment => "assignment",
            ContentType::Group => "group",
            ContentType::State => "state",
            ContentType::Statistic => "statistic",
            ContentType::Vocabulary => "vocabulary",
            ContentType::Message => "message",
            ContentType::Blob => "blob",
            ContentType::Reference => "reference",
            ContentType::Set => "set",
            ContentType::Log => "log",
            ContentType::Duration => "duration",
            ContentType::TimeRange => "time-range",
            ContentType::MessageQueue => "message-queue",
            ContentType::VocabularySet => "vocabulary-set",
            ContentType::Hash => "hash",
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, ContentType::Directory)
    }

    /// Types whose history is kept and can be range-queried
    pub fn is_time_series(&self) -> bool {
        matches!(
            self,
            ContentType::Assignment
                | ContentType::Event
                | ContentType::Observation
                | ContentType::State
                | ContentType::Statistic
                | ContentType::Log
        )
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse failure for [`ContentType`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownContentType(pub String);

impl fmt::Display for UnknownContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown content type: {}", self.0)
    }
}

impl std::error::Error for UnknownContentType {}

impl FromStr for ContentType {
    type Err = UnknownContentType;

    /// Case-insensitive; accepts both `TimeRange` and `time-range`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();

        ContentType::ALL
            .iter()
            .find(|t| t.as_str().to_ascii_lowercase() == normalized)
            .copied()
            .ok_or_else(|| UnknownContentType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("boolean".parse::<ContentType>(), Ok(ContentType::Boolean));
        assert_eq!("TIME-RANGE".parse::<ContentType>(), Ok(ContentType::TimeRange));
        assert_eq!("VocabularySet".parse::<ContentType>(), Ok(ContentType::VocabularySet));
        assert!("widget".parse::<ContentType>().is_err());
    }

    #[test]
    fn test_schema_names_are_hyphenated() {
        assert_eq!(ContentType::TimeRange.schema_name(), "time-range");
        assert_eq!(ContentType::MessageQueue.schema_name(), "message-queue");
        assert_eq!(ContentType::State.schema_name(), "state");
    }

    #[test]
    fn test_serializes_as_pascal_case() {
        let json = serde_json::to_string(&ContentType::TimeRange).unwrap();
        assert_eq!(json, "\"TimeRange\"");
    }
}
