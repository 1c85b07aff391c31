//! Object indexing driver
//!
//! Stores Object entities and memoizes the tree lookups an upstream resolver answered:
//!
//! - `parent_children`: parent uuid (or `$ROOT$`) → child uuids
//! - `root_children`: root uuid → descendant uuids
//! - `child_roots`: child uuid → root uuids
//! - `query_results`: composite query key → matched `(uuid, parent)` rows
//!
//! plus a negative mark set for each of them and a path → uuid memo.
//!
//! # Invalidation
//!
//! Every incoming Object (before the publish comparison) and every deleted Object runs
//! [`ObjectIndexes::clear_entity`]. Clearing is deliberately broad: any cached answer
//! the object could appear in, as subject, parent, ancestor or root, is dropped, so the
//! next lookup falls through to the resolver instead of returning a stale tree.

use crate::config::DriverConfig;
use crate::drivers::memory::{EntityPolicy, MemoryEntityDriver};
use crate::drivers::result::EntityResult;
use crate::error::DriverError;
use crate::models::object::ObjectEntity;
use crate::models::request::{
    query_key, ObjectQueryRequest, ObjectQueryResult, ObjectQueryType, SortOrder, ROOT_KEY,
};
use std::collections::{HashMap, HashSet};
use std::ops::Deref;

#[derive(Debug, Clone, PartialEq)]
struct CachedRow {
    uuid: String,
    parent_key: String,
}

/// Tree adjacency and query-result caches of the object driver
#[derive(Debug, Default)]
pub struct ObjectIndexes {
    parent_children: HashMap<String, Vec<String>>,
    root_children: HashMap<String, Vec<String>>,
    child_roots: HashMap<String, Vec<String>>,
    empty_parent: HashSet<String>,
    empty_root: HashSet<String>,
    empty_child: HashSet<String>,

    query_results: HashMap<String, Vec<CachedRow>>,
    query_reverse: HashMap<String, HashSet<String>>,
    query_parent_reverse: HashMap<String, HashSet<String>>,
    query_definition_reverse: HashMap<String, HashSet<String>>,
    empty_queries: HashMap<String, HashSet<String>>,

    paths: HashMap<String, Vec<String>>,
    path_reverse: HashMap<String, String>,
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

impl ObjectIndexes {
    /// Drop every cached answer `entity` could take part in
    pub fn clear_entity(&mut self, entity: &ObjectEntity) {
        if entity.uuid.is_empty() {
            return;
        }

        let uuid = entity.uuid.as_str();
        let parent_key = entity.parent_uuid.as_deref().unwrap_or(ROOT_KEY);
        let ancestors = entity.ancestor_uuids();
        let root = entity.root_uuid();

        // adjacency (as parent, as child of its parent, as descendant of its root)
        self.parent_children.remove(uuid);
        self.parent_children.remove(parent_key);
        self.root_children.remove(uuid);
        self.root_children.remove(parent_key);
        self.child_roots.remove(uuid);
        if let Some(root) = &root {
            self.root_children.remove(root);
            self.empty_root.remove(root);
        }

        if let Some(definition) = entity.definition_uuid.as_deref() {
            if let Some(keys) = self.query_definition_reverse.remove(definition) {
                self.remove_queries(keys);
            }
        }

        for key in [uuid, parent_key, ROOT_KEY] {
            if let Some(keys) = self.query_reverse.remove(key) {
                self.remove_queries(keys);
            }
            if let Some(keys) = self.query_parent_reverse.remove(key) {
                self.remove_queries(keys);
            }
        }

        self.empty_parent.remove(uuid);
        self.empty_parent.remove(parent_key);
        self.empty_root.remove(uuid);
        self.empty_root.remove(parent_key);
        self.empty_child.remove(uuid);

        // negative query marks scoped to the object, its parent, any ancestor or the root
        self.empty_queries.remove(uuid);
        self.empty_queries.remove(parent_key);
        self.empty_queries.remove(ROOT_KEY);
        for ancestor in &ancestors {
            self.empty_queries.remove(ancestor);
            if let Some(keys) = self.query_parent_reverse.get(ancestor).cloned() {
                self.remove_queries(keys);
            }
        }

        self.forget_path(uuid);
    }

    /// Remove `uuid` from every adjacency list and cached result, whether or not the
    /// object itself was ever stored
    pub fn purge_uuid(&mut self, uuid: &str) {
        self.parent_children.remove(uuid);
        self.root_children.remove(uuid);
        self.child_roots.remove(uuid);

        for lists in [
            &mut self.parent_children,
            &mut self.root_children,
            &mut self.child_roots,
        ] {
            lists.retain(|_, children| {
                children.retain(|c| c != uuid);
                !children.is_empty()
            });
        }

        self.empty_parent.remove(uuid);
        self.empty_root.remove(uuid);
        self.empty_child.remove(uuid);
        self.empty_queries.remove(uuid);

        if let Some(keys) = self.query_reverse.remove(uuid) {
            self.remove_queries(keys);
        }
        if let Some(keys) = self.query_parent_reverse.remove(uuid) {
            self.remove_queries(keys);
        }
        self.forget_path(uuid);
    }

    fn remove_queries(&mut self, keys: impl IntoIterator<Item = String>) {
        for key in keys {
            self.query_results.remove(&key);
        }
    }

    fn forget_path(&mut self, uuid: &str) {
        if let Some(path) = self.path_reverse.remove(uuid) {
            self.paths.remove(&path);
        }
    }

    fn counts(&self) -> ObjectIndexStats {
        ObjectIndexStats {
            parents: self.parent_children.len(),
            roots: self.root_children.len(),
            children: self.child_roots.len(),
            queries: self.query_results.len(),
            empty_queries: self.empty_queries.values().map(HashSet::len).sum(),
            paths: self.paths.len(),
        }
    }
}

pub struct ObjectPolicy;

impl EntityPolicy<ObjectEntity> for ObjectPolicy {
    type Index = ObjectIndexes;

    fn name(&self) -> &str {
        "objects"
    }

    fn identity(&self, entity: &ObjectEntity) -> String {
        entity.uuid.clone()
    }

    fn keys(&self, entity: &ObjectEntity) -> Vec<String> {
        vec![entity.uuid.clone()]
    }

    fn publish_compare(&self, new: &ObjectEntity, existing: &ObjectEntity) -> bool {
        new.priority >= existing.priority && new.created > existing.created
    }

    fn before_publish(&self, index: &mut ObjectIndexes, _existing: Option<&ObjectEntity>, entity: &ObjectEntity) {
        index.clear_entity(entity);
    }

    fn before_remove(&self, index: &mut ObjectIndexes, entity: &ObjectEntity) {
        index.clear_entity(entity);
    }
}

/// Sizes of the object driver's caches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectIndexStats {
    pub parents: usize,
    pub roots: usize,
    pub children: usize,
    pub queries: usize,
    pub empty_queries: usize,
    pub paths: usize,
}

/// A path memo: the absolute path and the uuids it resolved to
#[derive(Debug, Clone, PartialEq)]
pub struct PathResult {
    pub path: String,
    pub uuids: Vec<String>,
}

pub struct ObjectDriver {
    driver: MemoryEntityDriver<ObjectEntity, ObjectPolicy>,
}

impl Deref for ObjectDriver {
    type Target = MemoryEntityDriver<ObjectEntity, ObjectPolicy>;

    fn deref(&self) -> &Self::Target {
        &self.driver
    }
}

impl ObjectDriver {
    pub fn new(config: DriverConfig) -> Self {
        Self {
            driver: MemoryEntityDriver::new(ObjectPolicy, config),
        }
    }

    pub fn from_driver(driver: MemoryEntityDriver<ObjectEntity, ObjectPolicy>) -> Self {
        Self { driver }
    }

    /// Delete objects and purge them from every cache, stored or not
    pub async fn delete(&self, uuids: &[String]) -> Result<Vec<EntityResult<Vec<ObjectEntity>>>, DriverError> {
        let results = self.driver.delete(uuids).await?;
        self.driver
            .with_state(|state| {
                for uuid in uuids.iter().filter(|u| !u.is_empty()) {
                    state.index.purge_uuid(uuid);
                }
            })
            .await?;
        Ok(results)
    }

    /// Memoized results of an object query, one entry per (query, parent scope)
    pub async fn query_objects(
        &self,
        request: &ObjectQueryRequest,
        skip: u64,
        take: u64,
        sort_order: SortOrder,
    ) -> Result<Vec<EntityResult<Vec<ObjectQueryResult>>>, DriverError> {
        if request.queries.is_empty() {
            return Ok(vec![EntityResult::NotFound]);
        }

        self.driver
            .with_state(|state| {
                let index = &state.index;
                let mut results = Vec::new();

                for query in &request.queries {
                    if request.parent_uuids.is_empty() {
                        let key = query_key(
                            request.namespace.as_deref(),
                            request.query_type,
                            query,
                            None,
                            skip,
                            take,
                            sort_order,
                        );
                        results.push(lookup(index, &key, ROOT_KEY, |row| ObjectQueryResult {
                            query_type: request.query_type,
                            namespace: request.namespace.clone(),
                            query: query.clone(),
                            uuid: Some(row.uuid.clone()),
                            parent_level: request.parent_level,
                            parent_uuid: parent_of(row),
                            requested_parent_uuid: None,
                            is_root: false,
                            skip,
                            take,
                            sort_order,
                        }));
                        continue;
                    }

                    for requested in &request.parent_uuids {
                        let parent_key = requested.as_deref().unwrap_or(ROOT_KEY);
                        let key = query_key(
                            request.namespace.as_deref(),
                            request.query_type,
                            query,
                            Some((request.parent_level, parent_key)),
                            skip,
                            take,
                            sort_order,
                        );
                        results.push(lookup(index, &key, parent_key, |row| ObjectQueryResult {
                            query_type: request.query_type,
                            namespace: request.namespace.clone(),
                            query: query.clone(),
                            uuid: Some(row.uuid.clone()),
                            parent_level: request.parent_level,
                            parent_uuid: parent_of(row),
                            requested_parent_uuid: requested.clone(),
                            is_root: requested.is_none(),
                            skip,
                            take,
                            sort_order,
                        }));
                    }
                }
                results
            })
            .await
    }

    /// Children of each parent (`None` for roots)
    pub async fn query_by_parent_uuid(
        &self,
        parent_uuids: &[Option<String>],
    ) -> Result<Vec<EntityResult<Vec<ObjectQueryResult>>>, DriverError> {
        self.driver
            .with_state(|state| {
                parent_uuids
                    .iter()
                    .map(|parent| {
                        let key = parent.as_deref().unwrap_or(ROOT_KEY);
                        adjacency(&state.index.parent_children, &state.index.empty_parent, key, parent.as_deref())
                    })
                    .collect()
            })
            .await
    }

    /// Descendants of each root
    pub async fn query_children_by_root_uuid(
        &self,
        root_uuids: &[Option<String>],
    ) -> Result<Vec<EntityResult<Vec<ObjectQueryResult>>>, DriverError> {
        self.driver
            .with_state(|state| {
                root_uuids
                    .iter()
                    .map(|root| {
                        let key = root.as_deref().unwrap_or(ROOT_KEY);
                        adjacency(&state.index.root_children, &state.index.empty_root, key, root.as_deref())
                    })
                    .collect()
            })
            .await
    }

    /// Roots of each child
    pub async fn query_root_by_child_uuid(
        &self,
        child_uuids: &[String],
    ) -> Result<Vec<EntityResult<Vec<ObjectQueryResult>>>, DriverError> {
        self.driver
            .with_state(|state| {
                child_uuids
                    .iter()
                    .map(|child| {
                        adjacency(&state.index.child_roots, &state.index.empty_child, child, Some(child.as_str()))
                    })
                    .collect()
            })
            .await
    }

    /// Parent of each stored child; the row's `uuid` is `None` for roots
    pub async fn query_by_child_uuid(
        &self,
        child_uuids: &[String],
    ) -> Result<Vec<EntityResult<ObjectQueryResult>>, DriverError> {
        self.driver
            .with_state(|state| {
                child_uuids
                    .iter()
                    .map(|child| {
                        if child.is_empty() {
                            return EntityResult::BadRequest("child uuid is empty".to_string());
                        }
                        match state.entities.get(child) {
                            Some(object) => EntityResult::Ok(ObjectQueryResult::relation(
                                Some(child.as_str()),
                                object.parent_uuid.clone(),
                            )),
                            None if state.index.empty_child.contains(child) => EntityResult::Empty,
                            None => EntityResult::NotFound,
                        }
                    })
                    .collect()
            })
            .await
    }

    /// Record children-of-parent rows; a row without `uuid` marks the parent empty
    pub async fn store_parents(&self, rows: &[ObjectQueryResult]) -> Result<usize, DriverError> {
        self.store_relations(rows, |index, key, uuid| match uuid {
            Some(uuid) => push_unique(index.parent_children.entry(key.to_string()).or_default(), uuid),
            None => {
                index.empty_parent.insert(key.to_string());
            }
        })
        .await
    }

    /// Record descendants-of-root rows
    pub async fn store_children_by_roots(&self, rows: &[ObjectQueryResult]) -> Result<usize, DriverError> {
        self.store_relations(rows, |index, key, uuid| match uuid {
            Some(uuid) => push_unique(index.root_children.entry(key.to_string()).or_default(), uuid),
            None => {
                index.empty_root.insert(key.to_string());
            }
        })
        .await
    }

    /// Record roots-of-child rows
    pub async fn store_roots_by_children(&self, rows: &[ObjectQueryResult]) -> Result<usize, DriverError> {
        self.store_relations(rows, |index, key, uuid| match uuid {
            Some(uuid) => push_unique(index.child_roots.entry(key.to_string()).or_default(), uuid),
            None => {
                index.empty_child.insert(key.to_string());
            }
        })
        .await
    }

    async fn store_relations(
        &self,
        rows: &[ObjectQueryResult],
        store: impl Fn(&mut ObjectIndexes, &str, Option<&str>),
    ) -> Result<usize, DriverError> {
        self.driver
            .with_state(|state| {
                for row in rows {
                    store(&mut state.index, row.relation_key(), row.uuid.as_deref());
                }
                rows.len()
            })
            .await
    }

    /// Memoize object query rows under their composite key
    ///
    /// Rows without `uuid` mark the query empty for its requested parent scope.
    pub async fn store_results(&self, rows: &[ObjectQueryResult]) -> Result<usize, DriverError> {
        self.driver
            .with_state(|state| {
                let index = &mut state.index;
                for row in rows {
                    let key = row.query_key();

                    if row.query_type == ObjectQueryType::DefinitionUuid {
                        index
                            .query_definition_reverse
                            .entry(row.query.clone())
                            .or_default()
                            .insert(key.clone());
                    }

                    match &row.uuid {
                        Some(uuid) => {
                            let parent_key = row.parent_key().to_string();
                            let cached = index.query_results.entry(key.clone()).or_default();
                            if !cached.iter().any(|c| &c.uuid == uuid) {
                                cached.push(CachedRow {
                                    uuid: uuid.clone(),
                                    parent_key: parent_key.clone(),
                                });
                            }
                            index.query_reverse.entry(uuid.clone()).or_default().insert(key.clone());
                            index.query_parent_reverse.entry(parent_key).or_default().insert(key);
                        }
                        None => {
                            index
                                .empty_queries
                                .entry(row.requested_parent_key().to_string())
                                .or_default()
                                .insert(key);
                        }
                    }
                }

                tracing::debug!("objects: stored {} query result row(s)", rows.len());
                rows.len()
            })
            .await
    }

    /// Memoize path → uuid resolutions, replacing any previous entry for the path
    pub async fn store_path(&self, results: &[PathResult]) -> Result<usize, DriverError> {
        self.driver
            .with_state(|state| {
                let index = &mut state.index;
                for result in results {
                    for uuid in &result.uuids {
                        if let Some(old_path) = index.path_reverse.insert(uuid.clone(), result.path.clone()) {
                            if old_path != result.path {
                                index.paths.remove(&old_path);
                            }
                        }
                    }
                    index.paths.insert(result.path.clone(), result.uuids.clone());
                }
                results.len()
            })
            .await
    }

    pub async fn query_by_path(&self, paths: &[String]) -> Result<Vec<EntityResult<Vec<String>>>, DriverError> {
        self.driver
            .with_state(|state| {
                paths
                    .iter()
                    .map(|path| match state.index.paths.get(path) {
                        _ if path.is_empty() => EntityResult::BadRequest("path is empty".to_string()),
                        Some(uuids) if !uuids.is_empty() => EntityResult::Ok(uuids.clone()),
                        _ => EntityResult::NotFound,
                    })
                    .collect()
            })
            .await
    }

    pub async fn index_stats(&self) -> Result<ObjectIndexStats, DriverError> {
        self.driver.with_state(|state| state.index.counts()).await
    }
}

fn parent_of(row: &CachedRow) -> Option<String> {
    if row.parent_key == ROOT_KEY {
        None
    } else {
        Some(row.parent_key.clone())
    }
}

fn lookup(
    index: &ObjectIndexes,
    key: &str,
    empty_scope: &str,
    to_result: impl Fn(&CachedRow) -> ObjectQueryResult,
) -> EntityResult<Vec<ObjectQueryResult>> {
    match index.query_results.get(key) {
        Some(rows) if !rows.is_empty() => EntityResult::Ok(rows.iter().map(to_result).collect()),
        _ => {
            let marked = index
                .empty_queries
                .get(empty_scope)
                .map(|keys| keys.contains(key))
                .unwrap_or(false);
            if marked {
                EntityResult::Empty
            } else {
                EntityResult::NotFound
            }
        }
    }
}

fn adjacency(
    lists: &HashMap<String, Vec<String>>,
    empty: &HashSet<String>,
    key: &str,
    query: Option<&str>,
) -> EntityResult<Vec<ObjectQueryResult>> {
    if key.is_empty() {
        return EntityResult::BadRequest("uuid is empty".to_string());
    }
    match lists.get(key) {
        Some(related) if !related.is_empty() => EntityResult::Ok(
            related
                .iter()
                .map(|uuid| ObjectQueryResult::relation(query, Some(uuid.clone())))
                .collect(),
        ),
        _ if empty.contains(key) => EntityResult::Empty,
        _ => EntityResult::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content_type::ContentType;

    fn object(path: &str, created: i64) -> ObjectEntity {
        ObjectEntity::new("plant", path, ContentType::Directory, created).unwrap()
    }

    fn row(request: &ObjectQueryRequest, query: &str, uuid: Option<&str>, parent: Option<&str>, requested: Option<&str>) -> ObjectQueryResult {
        ObjectQueryResult {
            query_type: request.query_type,
            namespace: request.namespace.clone(),
            query: query.to_string(),
            uuid: uuid.map(str::to_string),
            parent_level: request.parent_level,
            parent_uuid: parent.map(str::to_string),
            requested_parent_uuid: requested.map(str::to_string),
            is_root: requested.is_none(),
            skip: 0,
            take: 1000,
            sort_order: SortOrder::Ascending,
        }
    }

    #[tokio::test]
    async fn test_priority_and_created_compare() {
        let driver = ObjectDriver::new(DriverConfig::default());
        let base = object("/a", 100).with_priority(5);
        assert!(driver.publish(vec![base.clone()]).await.unwrap()[0].is_stored());

        let lower = object("/a", 200).with_priority(1);
        let same_time = object("/a", 100).with_priority(9);
        let newer = object("/a", 300).with_priority(5).with_definition("machine");
        let results = driver.publish(vec![lower, same_time, newer]).await.unwrap();
        assert_eq!(
            results.iter().map(|r| r.is_stored()).collect::<Vec<_>>(),
            vec![false, false, true]
        );
    }

    #[tokio::test]
    async fn test_adjacency_and_empty_marks() {
        let driver = ObjectDriver::new(DriverConfig::default());
        let area = object("/area", 1);
        let machine = object("/area/machine", 1);

        driver
            .store_parents(&[
                ObjectQueryResult::relation(Some(area.uuid.as_str()), Some(machine.uuid.clone())),
                ObjectQueryResult::relation(Some(machine.uuid.as_str()), None),
            ])
            .await
            .unwrap();

        let results = driver
            .query_by_parent_uuid(&[Some(area.uuid.clone()), Some(machine.uuid.clone()), Some("other".into())])
            .await
            .unwrap();
        assert_eq!(results[0].as_ok().unwrap()[0].uuid.as_deref(), Some(machine.uuid.as_str()));
        assert!(results[1].is_empty());
        assert!(results[2].is_not_found());

        // publishing a new child of `machine` clears its empty mark
        driver.publish(vec![object("/area/machine/axis", 2)]).await.unwrap();
        let results = driver.query_by_parent_uuid(&[Some(machine.uuid.clone())]).await.unwrap();
        assert!(results[0].is_not_found());
    }

    #[tokio::test]
    async fn test_query_results_cached_and_invalidated() {
        let driver = ObjectDriver::new(DriverConfig::default());
        let area = object("/area", 1);
        let machine = object("/area/machine", 1);
        let request = ObjectQueryRequest::new(ObjectQueryType::Name, "machine")
            .in_namespace(Some("plant"))
            .with_parents(vec![Some(area.uuid.clone())], 1);

        driver
            .store_results(&[row(&request, "machine", Some(machine.uuid.as_str()), Some(area.uuid.as_str()), Some(area.uuid.as_str()))])
            .await
            .unwrap();

        let cached = driver.query_objects(&request, 0, 1000, SortOrder::Ascending).await.unwrap();
        let rows = cached[0].as_ok().unwrap();
        assert_eq!(rows[0].uuid.as_deref(), Some(machine.uuid.as_str()));
        assert_eq!(rows[0].requested_parent_uuid.as_deref(), Some(area.uuid.as_str()));

        // a different page is a different key
        let other_page = driver.query_objects(&request, 10, 1000, SortOrder::Ascending).await.unwrap();
        assert!(other_page[0].is_not_found());

        driver.publish(vec![machine.clone()]).await.unwrap();
        let after = driver.query_objects(&request, 0, 1000, SortOrder::Ascending).await.unwrap();
        assert!(after[0].is_not_found());
    }

    #[tokio::test]
    async fn test_empty_query_cleared_by_new_descendant() {
        let driver = ObjectDriver::new(DriverConfig::default());
        let area = object("/area", 1);
        let request = ObjectQueryRequest::new(ObjectQueryType::Name, "axis")
            .in_namespace(Some("plant"))
            .with_parents(vec![Some(area.uuid.clone())], 0);

        driver
            .store_results(&[row(&request, "axis", None, None, Some(area.uuid.as_str()))])
            .await
            .unwrap();
        let results = driver.query_objects(&request, 0, 1000, SortOrder::Ascending).await.unwrap();
        assert!(results[0].is_empty());

        driver.publish(vec![object("/area/machine/axis", 5)]).await.unwrap();
        let results = driver.query_objects(&request, 0, 1000, SortOrder::Ascending).await.unwrap();
        assert!(results[0].is_not_found());
    }

    #[tokio::test]
    async fn test_definition_results_cleared() {
        let driver = ObjectDriver::new(DriverConfig::default());
        let machine = object("/area/machine", 1).with_definition("cnc");
        let request = ObjectQueryRequest::new(ObjectQueryType::DefinitionUuid, "cnc");

        let mut stored = row(&request, "cnc", Some("elsewhere"), Some("p"), None);
        stored.is_root = false;
        driver.store_results(&[stored]).await.unwrap();
        assert!(driver.query_objects(&request, 0, 1000, SortOrder::Ascending).await.unwrap()[0].is_ok());

        driver.publish(vec![machine]).await.unwrap();
        assert!(driver.query_objects(&request, 0, 1000, SortOrder::Ascending).await.unwrap()[0].is_not_found());
    }

    #[tokio::test]
    async fn test_delete_purges_adjacency() {
        let driver = ObjectDriver::new(DriverConfig::default());
        let area = object("/area", 1);
        let machine = object("/area/machine", 1);
        driver.publish(vec![area.clone(), machine.clone()]).await.unwrap();

        driver
            .store_parents(&[ObjectQueryResult::relation(Some(area.uuid.as_str()), Some(machine.uuid.clone()))])
            .await
            .unwrap();
        driver
            .store_children_by_roots(&[ObjectQueryResult::relation(Some(area.uuid.as_str()), Some(machine.uuid.clone()))])
            .await
            .unwrap();
        driver
            .store_roots_by_children(&[ObjectQueryResult::relation(Some(machine.uuid.as_str()), Some(area.uuid.clone()))])
            .await
            .unwrap();

        driver.delete(&[machine.uuid.clone()]).await.unwrap();

        let parents = driver.query_by_parent_uuid(&[Some(area.uuid.clone())]).await.unwrap();
        assert!(!parents[0].is_ok());
        let roots = driver.query_children_by_root_uuid(&[Some(area.uuid.clone())]).await.unwrap();
        assert!(!roots[0].is_ok());
        let child_roots = driver.query_root_by_child_uuid(&[machine.uuid.clone()]).await.unwrap();
        assert!(child_roots[0].is_not_found());
        let parent = driver.query_by_child_uuid(&[machine.uuid.clone()]).await.unwrap();
        assert!(parent[0].is_not_found());
    }

    #[tokio::test]
    async fn test_query_by_child_uuid_returns_parent() {
        let driver = ObjectDriver::new(DriverConfig::default());
        let area = object("/area", 1);
        let machine = object("/area/machine", 1);
        driver.publish(vec![area.clone(), machine.clone()]).await.unwrap();

        let results = driver.query_by_child_uuid(&[machine.uuid.clone(), area.uuid.clone()]).await.unwrap();
        assert_eq!(results[0].as_ok().unwrap().uuid.as_deref(), Some(area.uuid.as_str()));
        assert_eq!(results[1].as_ok().unwrap().uuid, None);
    }

    #[tokio::test]
    async fn test_path_memo() {
        let driver = ObjectDriver::new(DriverConfig::default());
        let machine = object("/area/machine", 1);
        driver
            .store_path(&[PathResult {
                path: "plant:/area/machine".to_string(),
                uuids: vec![machine.uuid.clone()],
            }])
            .await
            .unwrap();

        let found = driver.query_by_path(&["plant:/area/machine".to_string()]).await.unwrap();
        assert_eq!(found[0].as_ok().unwrap(), &vec![machine.uuid.clone()]);

        driver.publish(vec![machine]).await.unwrap();
        let found = driver.query_by_path(&["plant:/area/machine".to_string()]).await.unwrap();
        assert!(found[0].is_not_found());
        assert_eq!(driver.index_stats().await.unwrap().paths, 0);
    }
}
