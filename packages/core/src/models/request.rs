//! Object query requests and results
//!
//! Shared vocabulary between the execution engine (which issues object queries) and the
//! object indexing driver (which memoizes their results).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel parent key for root-level queries
pub const ROOT_KEY: &str = "$ROOT$";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    /// Numeric code used in composite cache keys
    pub fn code(&self) -> i32 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }
}

/// How the query text of an object request is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ObjectQueryType {
    /// Match by object name (`~` prefix: contains)
    #[default]
    Name,
    Uuid,
    ContentType,
    /// Match by definition (type) uuid
    DefinitionUuid,
}

impl fmt::Display for ObjectQueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectQueryType::Name => "Name",
            ObjectQueryType::Uuid => "Uuid",
            ObjectQueryType::ContentType => "ContentType",
            ObjectQueryType::DefinitionUuid => "DefinitionUuid",
        };
        f.write_str(name)
    }
}

/// Parent scope depth of an object query
///
/// `0` matches objects anywhere below the parents, `1` only direct children.
pub type ParentLevel = i32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ObjectQueryRequest {
    pub namespace: Option<String>,
    pub query_type: ObjectQueryType,
    pub queries: Vec<String>,
    pub parent_level: ParentLevel,
    /// `None` entries scope the query to roots
    pub parent_uuids: Vec<Option<String>>,
}

impl ObjectQueryRequest {
    pub fn new(query_type: ObjectQueryType, query: impl Into<String>) -> Self {
        Self {
            query_type,
            queries: vec![query.into()],
            ..Default::default()
        }
    }

    pub fn in_namespace(mut self, namespace: Option<&str>) -> Self {
        self.namespace = namespace.map(str::to_string);
        self
    }

    pub fn with_parents(mut self, parent_uuids: Vec<Option<String>>, parent_level: ParentLevel) -> Self {
        self.parent_uuids = parent_uuids;
        self.parent_level = parent_level;
        self
    }
}

/// One resolved (or confirmed empty) row of an object query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectQueryResult {
    pub query_type: ObjectQueryType,
    pub namespace: Option<String>,
    pub query: String,
    /// `None` records a confirmed-empty result for the query
    pub uuid: Option<String>,
    pub parent_level: ParentLevel,
    pub parent_uuid: Option<String>,
    pub requested_parent_uuid: Option<String>,
    pub is_root: bool,
    pub skip: u64,
    pub take: u64,
    pub sort_order: SortOrder,
}

impl ObjectQueryResult {
    /// Composite cache key of the query this row answers
    ///
    /// `ns::type::query::parentLevel::parentKey::skip::take::sort` when scoped to a parent
    /// (or the root), `ns::type::query::skip::take::sort` otherwise.
    pub fn query_key(&self) -> String {
        let requested = if self.is_root {
            Some(ROOT_KEY)
        } else {
            self.requested_parent_uuid.as_deref().filter(|p| !p.is_empty())
        };

        query_key(
            self.namespace.as_deref(),
            self.query_type,
            &self.query,
            requested.map(|parent_key| (self.parent_level, parent_key)),
            self.skip,
            self.take,
            self.sort_order,
        )
    }

    /// Row of an adjacency lookup: `query` is the uuid asked about (`None` for the
    /// root scope) and `uuid` the related object (`None` records "no relations")
    pub fn relation(query: Option<&str>, uuid: Option<String>) -> Self {
        Self {
            query_type: ObjectQueryType::Uuid,
            namespace: None,
            query: query.unwrap_or_default().to_string(),
            uuid,
            parent_level: 0,
            parent_uuid: None,
            requested_parent_uuid: None,
            is_root: query.is_none(),
            skip: 0,
            take: 0,
            sort_order: SortOrder::Ascending,
        }
    }

    /// Adjacency key of a relation row's `query`
    pub fn relation_key(&self) -> &str {
        if self.query.is_empty() {
            ROOT_KEY
        } else {
            &self.query
        }
    }

    /// Key under which the matched object's parent is tracked
    pub fn parent_key(&self) -> &str {
        self.parent_uuid.as_deref().unwrap_or(ROOT_KEY)
    }

    /// Key of the parent scope the query was issued for
    pub fn requested_parent_key(&self) -> &str {
        if self.is_root {
            ROOT_KEY
        } else {
            self.requested_parent_uuid.as_deref().unwrap_or(ROOT_KEY)
        }
    }
}

/// Build a composite query key
pub fn query_key(
    namespace: Option<&str>,
    query_type: ObjectQueryType,
    query: &str,
    scope: Option<(ParentLevel, &str)>,
    skip: u64,
    take: u64,
    sort_order: SortOrder,
) -> String {
    let ns = namespace.unwrap_or_default();
    match scope {
        Some((level, parent_key)) => format!(
            "{}::{}::{}::{}::{}::{}::{}::{}",
            ns,
            query_type,
            query,
            level,
            parent_key,
            skip,
            take,
            sort_order.code()
        ),
        None => format!(
            "{}::{}::{}::{}::{}::{}",
            ns,
            query_type,
            query,
            skip,
            take,
            sort_order.code()
        ),
    }
}
