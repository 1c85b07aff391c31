//! Object entity
//!
//! A node of the hierarchical namespace. Identity is derived from `(namespace, path)`
//! via [`crate::models::path::object_uuid`], so re-publishing the same path keeps the
//! same uuid and the parent uuid can always be recomputed from the path.

use crate::models::content_type::ContentType;
use crate::models::path;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectEntity {
    pub uuid: String,
    pub namespace: String,
    pub path: String,
    pub parent_uuid: Option<String>,
    pub content_type: ContentType,
    pub definition_uuid: Option<String>,
    pub source_uuid: Option<String>,
    pub priority: i32,
    pub created: i64,
}

impl ObjectEntity {
    /// Build an object for `ns:path`, deriving uuid and parent uuid from the path
    ///
    /// Returns `None` when the path has no segments.
    pub fn new(
        namespace: impl Into<String>,
        object_path: impl Into<String>,
        content_type: ContentType,
        created: i64,
    ) -> Option<Self> {
        let namespace = namespace.into();
        let object_path: String = object_path.into();
        let path = format!(
            "/{}",
            path::partial_path(&object_path).trim_matches(path::PATH_SEPARATOR)
        );

        let uuid = path::object_uuid(&namespace, &path)?;
        let parent_uuid = path::parent_path(&path).and_then(|p| path::object_uuid(&namespace, p));

        Some(Self {
            uuid,
            namespace,
            path,
            parent_uuid,
            content_type,
            definition_uuid: None,
            source_uuid: None,
            priority: 0,
            created,
        })
    }

    pub fn with_definition(mut self, definition_uuid: impl Into<String>) -> Self {
        self.definition_uuid = Some(definition_uuid.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_source(mut self, source_uuid: impl Into<String>) -> Self {
        self.source_uuid = Some(source_uuid.into());
        self
    }

    /// Last path segment
    pub fn name(&self) -> &str {
        path::object_name(&self.path)
    }

    /// `namespace:/path`
    pub fn absolute_path(&self) -> String {
        path::set_namespace(&self.namespace, &self.path)
    }

    pub fn is_root(&self) -> bool {
        self.parent_uuid.is_none()
    }

    /// Uuids of every ancestor, root first, excluding the object itself
    pub fn ancestor_uuids(&self) -> Vec<String> {
        let mut ancestors = path::ancestor_paths(&self.path);
        ancestors.pop();
        ancestors
            .iter()
            .filter_map(|p| path::object_uuid(&self.namespace, p))
            .collect()
    }

    /// Uuid of the topmost ancestor (self for roots)
    pub fn root_uuid(&self) -> Option<String> {
        let ancestors = path::ancestor_paths(&self.path);
        let root = ancestors.first()?;
        path::object_uuid(&self.namespace, root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_derives_identity() {
        let obj = ObjectEntity::new("plant", "/area1/machine", ContentType::Directory, 10).unwrap();
        let parent = ObjectEntity::new("plant", "/area1", ContentType::Directory, 10).unwrap();

        assert_eq!(obj.parent_uuid.as_deref(), Some(parent.uuid.as_str()));
        assert!(parent.is_root());
        assert_eq!(obj.name(), "machine");
        assert_eq!(obj.absolute_path(), "plant:/area1/machine");
        assert_eq!(obj.root_uuid(), Some(parent.uuid.clone()));
        assert_eq!(obj.ancestor_uuids(), vec![parent.uuid.clone()]);
        assert!(parent.ancestor_uuids().is_empty());
    }

    #[test]
    fn test_new_normalizes_path() {
        let a = ObjectEntity::new("plant", "area1/machine/", ContentType::Boolean, 1).unwrap();
        let b = ObjectEntity::new("plant", "plant:/area1/machine", ContentType::Boolean, 1).unwrap();
        assert_eq!(a.path, "/area1/machine");
        assert_eq!(a.uuid, b.uuid);
    }

    #[test]
    fn test_empty_path_is_rejected() {
        assert!(ObjectEntity::new("plant", "/", ContentType::Directory, 1).is_none());
    }

    #[test]
    fn test_serde_uses_camel_case() {
        let obj = ObjectEntity::new("plant", "/a", ContentType::Number, 5)
            .unwrap()
            .with_definition("machine");
        let json = serde_json::to_value(&obj).unwrap();
        assert_eq!(json["contentType"], "Number");
        assert_eq!(json["definitionUuid"], "machine");
        assert!(json["parentUuid"].is_null());
    }
}
