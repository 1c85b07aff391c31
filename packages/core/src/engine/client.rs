//! Entities client
//!
//! The engine's view of a remote entity store. Every call is batched, and an empty
//! vector means "nothing there". Failures are reported as [`ClientError`]; the engine
//! logs them and treats the affected step as having no data.

use crate::error::ClientError;
use crate::models::content::ContentEntity;
use crate::models::content_type::ContentType;
use crate::models::object::ObjectEntity;
use crate::models::request::{ObjectQueryRequest, SortOrder};
use crate::query::statement::Operator;
use async_trait::async_trait;

/// Bounds of a content range read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRequest {
    pub start: i64,
    pub stop: i64,
    pub skip: u64,
    pub take: u64,
    pub order: SortOrder,
}

#[async_trait]
pub trait EntitiesClient: Send + Sync {
    /// Objects matching a name/uuid/type query, optionally scoped to parents
    async fn query_objects(
        &self,
        request: &ObjectQueryRequest,
        skip: u64,
        take: u64,
        order: SortOrder,
    ) -> Result<Vec<ObjectEntity>, ClientError>;

    async fn read_objects(&self, uuids: &[String]) -> Result<Vec<ObjectEntity>, ClientError>;

    /// Direct children of each parent; `None` asks for the roots
    async fn query_by_parent_uuid(&self, parent_uuids: &[Option<String>]) -> Result<Vec<ObjectEntity>, ClientError>;

    /// Every object below each of the given objects
    async fn query_descendants(&self, uuids: &[String]) -> Result<Vec<ObjectEntity>, ClientError>;

    /// Parent of each child that has one
    async fn query_parents(&self, child_uuids: &[String]) -> Result<Vec<ObjectEntity>, ClientError>;

    async fn index_exists(&self, index_key: &str) -> Result<bool, ClientError>;

    /// Targets whose indexed value satisfies `operator value`
    async fn query_index(&self, index_key: &str, operator: Operator, value: &str) -> Result<Vec<String>, ClientError>;

    /// Current content of each object: the latest record, or every in-force relation
    async fn current(&self, content_type: ContentType, object_uuids: &[String]) -> Result<Vec<ContentEntity>, ClientError>;

    /// History of each object within a time window
    async fn range(
        &self,
        content_type: ContentType,
        object_uuids: &[String],
        range: RangeRequest,
    ) -> Result<Vec<ContentEntity>, ClientError>;
}
