//! Per-key driver outcomes

use serde::{Deserialize, Serialize};

/// Outcome of one key of a driver query
///
/// `Empty` is a confirmed negative answer ("nothing exists here") and is distinct from
/// `NotFound` ("this driver has never resolved the key").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "content")]
pub enum EntityResult<T> {
    Ok(T),
    Empty,
    NotFound,
    BadRequest(String),
    InternalError(String),
}

impl<T> EntityResult<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, EntityResult::Ok(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, EntityResult::Empty)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EntityResult::NotFound)
    }

    /// Resolved either way (`Ok` or `Empty`); no upstream call needed
    pub fn is_resolved(&self) -> bool {
        self.is_ok() || self.is_empty()
    }

    pub fn ok(self) -> Option<T> {
        match self {
            EntityResult::Ok(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_ok(&self) -> Option<&T> {
        match self {
            EntityResult::Ok(value) => Some(value),
            _ => None,
        }
    }

    pub fn and_then<U>(self, f: impl FnOnce(T) -> EntityResult<U>) -> EntityResult<U> {
        match self {
            EntityResult::Ok(value) => f(value),
            EntityResult::Empty => EntityResult::Empty,
            EntityResult::NotFound => EntityResult::NotFound,
            EntityResult::BadRequest(msg) => EntityResult::BadRequest(msg),
            EntityResult::InternalError(msg) => EntityResult::InternalError(msg),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> EntityResult<U> {
        match self {
            EntityResult::Ok(value) => EntityResult::Ok(f(value)),
            EntityResult::Empty => EntityResult::Empty,
            EntityResult::NotFound => EntityResult::NotFound,
            EntityResult::BadRequest(msg) => EntityResult::BadRequest(msg),
            EntityResult::InternalError(msg) => EntityResult::InternalError(msg),
        }
    }
}

/// Request to mark a key as confirmed-empty as of `timestamp`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmptyRequest {
    pub key: String,
    pub timestamp: i64,
}

impl EmptyRequest {
    pub fn new(key: impl Into<String>, timestamp: i64) -> Self {
        Self {
            key: key.into(),
            timestamp,
        }
    }
}

/// Outcome of a publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishResult {
    /// Entity replaced the stored one (or was new)
    Stored,
    /// Entity lost the publish comparison against the stored one
    Dropped,
}

impl PublishResult {
    pub fn is_stored(&self) -> bool {
        matches!(self, PublishResult::Stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_states() {
        let ok: EntityResult<i32> = EntityResult::Ok(3);
        assert!(ok.is_ok() && ok.is_resolved());
        assert_eq!(ok.map(|v| v * 2).ok(), Some(6));

        let empty: EntityResult<i32> = EntityResult::Empty;
        assert!(empty.is_resolved());
        assert!(!EntityResult::<i32>::NotFound.is_resolved());
        assert!(!EntityResult::<i32>::BadRequest("blank".into()).is_resolved());
    }
}
