//! Entity Collection
//!
//! A local, fully materialized snapshot of objects, their content records and secondary
//! index entries. The execution engine merges remote fetches into a collection before
//! assembling results, and can run a whole statement against a collection without any
//! I/O.
//!
//! # Indexes
//!
//! The collection keeps three derived structures next to the raw maps:
//!
//! - `children`: parent uuid → child uuids (roots live under `None`)
//! - `content_by_object`: owning object uuid → content entity uuids
//! - `index_entries`: `hash_key(path)` → value/target pairs for indexed conditions
//!
//! Derived structures are rebuilt on deserialization, so snapshots only carry the
//! raw records.

use crate::models::content::{ContentEntity, Entity};
use crate::models::content_type::ContentType;
use crate::models::object::ObjectEntity;
use crate::models::path;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// One row of a secondary index: `value` observed on the object `target_uuid`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub target_uuid: String,
    pub value: String,
}

/// Serialized form of a collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSnapshot {
    #[serde(default)]
    pub objects: Vec<ObjectEntity>,
    #[serde(default)]
    pub content: Vec<ContentEntity>,
    /// Index path (as written in queries, e.g. `plant:/area/*/status`) → entries
    #[serde(default)]
    pub indexes: HashMap<String, Vec<IndexEntry>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "CollectionSnapshot", into = "CollectionSnapshot")]
pub struct EntityCollection {
    objects: HashMap<String, ObjectEntity>,
    children: HashMap<Option<String>, BTreeSet<String>>,
    content: HashMap<String, ContentEntity>,
    content_by_object: HashMap<String, BTreeSet<String>>,
    content_by_related: HashMap<String, BTreeSet<String>>,
    index_paths: HashMap<String, String>,
    index_entries: HashMap<String, Vec<IndexEntry>>,
}

impl EntityCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.content.is_empty()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn content_count(&self) -> usize {
        self.content.len()
    }

    // ===== Writes =====

    pub fn add_object(&mut self, object: ObjectEntity) {
        if let Some(previous) = self.objects.get(&object.uuid) {
            if let Some(siblings) = self.children.get_mut(&previous.parent_uuid) {
                siblings.remove(&previous.uuid);
            }
        }

        self.children
            .entry(object.parent_uuid.clone())
            .or_default()
            .insert(object.uuid.clone());
        self.objects.insert(object.uuid.clone(), object);
    }

    pub fn add_objects(&mut self, objects: impl IntoIterator<Item = ObjectEntity>) {
        for object in objects {
            self.add_object(object);
        }
    }

    pub fn add_content(&mut self, entity: ContentEntity) {
        let uuid = entity.entity_uuid();

        self.content_by_object
            .entry(entity.object_uuid().to_string())
            .or_default()
            .insert(uuid.clone());
        if let Some(related) = entity.related_object_uuid() {
            self.content_by_related
                .entry(related.to_string())
                .or_default()
                .insert(uuid.clone());
        }

        self.content.insert(uuid, entity);
    }

    pub fn add_contents(&mut self, entities: impl IntoIterator<Item = ContentEntity>) {
        for entity in entities {
            self.add_content(entity);
        }
    }

    /// Register index entries for an index path such as `plant:/area/*/status`
    pub fn add_index(&mut self, index_path: &str, entries: impl IntoIterator<Item = IndexEntry>) {
        let key = path::hash_key(index_path);
        self.index_paths.insert(key.clone(), index_path.to_string());
        self.index_entries.entry(key).or_default().extend(entries);
    }

    /// Merge another collection into this one; records in `other` win on conflict
    pub fn merge(&mut self, other: EntityCollection) {
        let snapshot: CollectionSnapshot = other.into();
        self.add_objects(snapshot.objects);
        self.add_contents(snapshot.content);
        for (index_path, entries) in snapshot.indexes {
            self.add_index(&index_path, entries);
        }
    }

    pub fn remove_object(&mut self, uuid: &str) -> Option<ObjectEntity> {
        let removed = self.objects.remove(uuid)?;
        if let Some(siblings) = self.children.get_mut(&removed.parent_uuid) {
            siblings.remove(uuid);
        }
        Some(removed)
    }

    // ===== Object reads =====

    pub fn object(&self, uuid: &str) -> Option<&ObjectEntity> {
        self.objects.get(uuid)
    }

    pub fn object_by_path(&self, namespace: &str, partial_path: &str) -> Option<&ObjectEntity> {
        path::object_uuid(namespace, partial_path).and_then(|uuid| self.objects.get(&uuid))
    }

    /// All objects sorted by namespace and path
    pub fn objects(&self) -> Vec<&ObjectEntity> {
        let mut objects: Vec<&ObjectEntity> = self.objects.values().collect();
        objects.sort_by(|a, b| (&a.namespace, &a.path).cmp(&(&b.namespace, &b.path)));
        objects
    }

    pub fn roots(&self, namespace: Option<&str>) -> Vec<&ObjectEntity> {
        self.children_of(None)
            .into_iter()
            .filter(|o| namespace.map_or(true, |ns| o.namespace.eq_ignore_ascii_case(ns)))
            .collect()
    }

    pub fn children(&self, parent_uuid: &str) -> Vec<&ObjectEntity> {
        self.children_of(Some(parent_uuid))
    }

    fn children_of(&self, parent_uuid: Option<&str>) -> Vec<&ObjectEntity> {
        let key = parent_uuid.map(str::to_string);
        let mut children: Vec<&ObjectEntity> = self
            .children
            .get(&key)
            .map(|uuids| uuids.iter().filter_map(|u| self.objects.get(u)).collect())
            .unwrap_or_default();
        children.sort_by(|a, b| a.path.cmp(&b.path));
        children
    }

    /// Every object below `root_uuid`, depth first, excluding the root itself
    pub fn descendants(&self, root_uuid: &str) -> Vec<&ObjectEntity> {
        let mut found = Vec::new();
        let mut stack = vec![root_uuid.to_string()];

        while let Some(current) = stack.pop() {
            for child in self.children(&current) {
                stack.push(child.uuid.clone());
                found.push(child);
            }
        }

        found.sort_by(|a, b| a.path.cmp(&b.path));
        found
    }

    pub fn parent(&self, uuid: &str) -> Option<&ObjectEntity> {
        let parent_uuid = self.objects.get(uuid)?.parent_uuid.as_deref()?;
        self.objects.get(parent_uuid)
    }

    // ===== Content reads =====

    pub fn content(&self, entity_uuid: &str) -> Option<&ContentEntity> {
        self.content.get(entity_uuid)
    }

    /// All content owned by `object_uuid`, ordered by timestamp
    pub fn content_for(&self, object_uuid: &str) -> Vec<&ContentEntity> {
        let mut records: Vec<&ContentEntity> = self
            .content_by_object
            .get(object_uuid)
            .map(|uuids| uuids.iter().filter_map(|u| self.content.get(u)).collect())
            .unwrap_or_default();
        records.sort_by_key(|e| e.timestamp());
        records
    }

    pub fn content_of_type(&self, object_uuid: &str, content_type: ContentType) -> Vec<&ContentEntity> {
        self.content_for(object_uuid)
            .into_iter()
            .filter(|e| e.content_type() == content_type)
            .collect()
    }

    /// Content pointing at `object_uuid` from the other side of a relation
    pub fn content_by_related(&self, object_uuid: &str) -> Vec<&ContentEntity> {
        self.content_by_related
            .get(object_uuid)
            .map(|uuids| uuids.iter().filter_map(|u| self.content.get(u)).collect())
            .unwrap_or_default()
    }

    /// Most recent record of `content_type` owned by the object
    pub fn latest(&self, object_uuid: &str, content_type: ContentType) -> Option<&ContentEntity> {
        self.content_of_type(object_uuid, content_type)
            .into_iter()
            .max_by_key(|e| (e.timestamp(), e.created()))
    }

    /// Current view of an object's content: every in-force relation for
    /// Assignment/Group/Set/Hash, otherwise the latest record
    pub fn current(&self, object_uuid: &str, content_type: ContentType) -> Vec<&ContentEntity> {
        match content_type {
            ContentType::Assignment => self
                .content_of_type(object_uuid, content_type)
                .into_iter()
                .filter(|e| matches!(e, ContentEntity::Assignment(a) if a.is_current()))
                .collect(),
            ContentType::Group | ContentType::Set | ContentType::Hash => {
                self.content_of_type(object_uuid, content_type)
            }
            _ => self.latest(object_uuid, content_type).into_iter().collect(),
        }
    }

    /// Records of `content_type` with `start <= timestamp < stop`
    pub fn range(
        &self,
        object_uuid: &str,
        content_type: ContentType,
        start: i64,
        stop: i64,
    ) -> Vec<&ContentEntity> {
        self.content_of_type(object_uuid, content_type)
            .into_iter()
            .filter(|e| e.timestamp() >= start && e.timestamp() < stop)
            .collect()
    }

    // ===== Index reads =====

    pub fn index_exists(&self, index_key: &str) -> bool {
        self.index_entries.contains_key(index_key)
    }

    pub fn index_entries(&self, index_key: &str) -> &[IndexEntry] {
        self.index_entries
            .get(index_key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl From<CollectionSnapshot> for EntityCollection {
    fn from(snapshot: CollectionSnapshot) -> Self {
        let mut collection = EntityCollection::new();
        collection.add_objects(snapshot.objects);
        collection.add_contents(snapshot.content);
        for (index_path, entries) in snapshot.indexes {
            collection.add_index(&index_path, entries);
        }
        collection
    }
}

impl From<EntityCollection> for CollectionSnapshot {
    fn from(collection: EntityCollection) -> Self {
        let EntityCollection {
            objects,
            content,
            index_paths,
            index_entries,
            ..
        } = collection;

        let indexes = index_entries
            .into_iter()
            .filter_map(|(key, entries)| index_paths.get(&key).map(|p| (p.clone(), entries)))
            .collect();

        CollectionSnapshot {
            objects: objects.into_values().collect(),
            content: content.into_values().collect(),
            indexes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content::{AssignmentEntity, StateEntity};

    fn object(path: &str, content_type: ContentType) -> ObjectEntity {
        ObjectEntity::new("plant", path, content_type, 1).unwrap()
    }

    fn sample() -> EntityCollection {
        let mut collection = EntityCollection::new();
        collection.add_objects([
            object("/area", ContentType::Directory),
            object("/area/m1", ContentType::Directory),
            object("/area/m1/state", ContentType::State),
            object("/area/m2", ContentType::Directory),
        ]);
        collection
    }

    #[test]
    fn test_children_and_descendants() {
        let collection = sample();
        let area = collection.object_by_path("plant", "/area").unwrap();

        let children: Vec<&str> = collection.children(&area.uuid).iter().map(|o| o.path.as_str()).collect();
        assert_eq!(children, vec!["/area/m1", "/area/m2"]);

        let all: Vec<&str> = collection.descendants(&area.uuid).iter().map(|o| o.path.as_str()).collect();
        assert_eq!(all, vec!["/area/m1", "/area/m1/state", "/area/m2"]);

        assert_eq!(collection.roots(Some("PLANT")).len(), 1);
        assert!(collection.roots(Some("other")).is_empty());
    }

    #[test]
    fn test_latest_picks_highest_timestamp() {
        let mut collection = sample();
        let state = collection.object_by_path("plant", "/area/m1/state").unwrap().uuid.clone();
        collection.add_content(ContentEntity::State(StateEntity::new(&state, "IDLE", 100)));
        collection.add_content(ContentEntity::State(StateEntity::new(&state, "RUNNING", 200)));

        match collection.latest(&state, ContentType::State) {
            Some(ContentEntity::State(s)) => assert_eq!(s.definition_uuid, "RUNNING"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(collection.range(&state, ContentType::State, 0, 150).len(), 1);
    }

    #[test]
    fn test_current_assignments_exclude_removed() {
        let mut collection = EntityCollection::new();
        collection.add_content(ContentEntity::Assignment(AssignmentEntity::new("a", "b", 1)));
        collection.add_content(ContentEntity::Assignment(
            AssignmentEntity::new("a", "c", 2).removed_at(5, 5),
        ));

        assert_eq!(collection.current("a", ContentType::Assignment).len(), 1);
        assert_eq!(collection.content_by_related("c").len(), 1);
    }

    #[test]
    fn test_reparenting_updates_children() {
        let mut collection = sample();
        let m1 = collection.object_by_path("plant", "/area/m1").unwrap().clone();
        let area_uuid = m1.parent_uuid.clone().unwrap();

        let mut moved = m1.clone();
        moved.parent_uuid = None;
        collection.add_object(moved);

        assert_eq!(collection.children(&area_uuid).len(), 1);
        assert_eq!(collection.roots(None).len(), 2);
    }

    #[test]
    fn test_snapshot_round_trip_rebuilds_indexes() {
        let mut collection = sample();
        collection.add_index(
            "plant:/area/*/status",
            [IndexEntry {
                target_uuid: "t".to_string(),
                value: "ok".to_string(),
            }],
        );

        let json = serde_json::to_string(&collection).unwrap();
        let restored: EntityCollection = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.object_count(), 4);
        assert!(restored.index_exists(&path::hash_key("PLANT:/area/*/status")));
        let area = restored.object_by_path("plant", "/area").unwrap();
        assert_eq!(restored.children(&area.uuid).len(), 2);
    }
}
