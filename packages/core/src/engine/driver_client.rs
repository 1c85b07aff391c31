//! [`EntitiesClient`] served from the memory drivers
//!
//! Every read asks the drivers first. A `NotFound` key is resolved from the backing
//! [`EntityCollection`] and written back, either as entities and relation rows or as an
//! `Empty` mark, so the next read of the same key never reaches the store.

use crate::drivers::{ContentDrivers, EmptyRequest, EntityResult, ObjectDriver};
use crate::engine::client::{EntitiesClient, RangeRequest};
use crate::engine::operators;
use crate::error::ClientError;
use crate::models::collection::EntityCollection;
use crate::models::content::ContentEntity;
use crate::models::content_type::ContentType;
use crate::models::object::ObjectEntity;
use crate::models::request::{ObjectQueryRequest, ObjectQueryResult, ObjectQueryType, SortOrder};
use crate::query::statement::Operator;
use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::RwLock;

pub struct DriverClient {
    objects: ObjectDriver,
    contents: ContentDrivers,
    store: RwLock<EntityCollection>,
}

impl DriverClient {
    pub fn new(objects: ObjectDriver, contents: ContentDrivers, store: EntityCollection) -> Self {
        Self {
            objects,
            contents,
            store: RwLock::new(store),
        }
    }

    pub fn objects(&self) -> &ObjectDriver {
        &self.objects
    }

    pub fn contents(&self) -> &ContentDrivers {
        &self.contents
    }

    /// Add entities to the backing store and publish them to the drivers
    pub async fn upsert(&self, collection: EntityCollection) -> Result<(), ClientError> {
        let objects: Vec<ObjectEntity> = collection.objects().into_iter().cloned().collect();
        let content: Vec<ContentEntity> = objects
            .iter()
            .flat_map(|o| collection.content_for(&o.uuid))
            .cloned()
            .collect();

        self.store.write().await.merge(collection);
        self.objects.publish(objects).await?;
        self.contents.publish(content).await?;
        Ok(())
    }

    /// Remove objects from the store and every driver cache
    pub async fn delete_objects(&self, uuids: &[String]) -> Result<(), ClientError> {
        {
            let mut store = self.store.write().await;
            for uuid in uuids {
                store.remove_object(uuid);
            }
        }
        self.objects.delete(uuids).await?;
        tracing::debug!("driver client: deleted {} object(s)", uuids.len());
        Ok(())
    }

    /// Mark keys empty as of `observed`, the time taken before the store was read
    async fn mark_empty(&self, keys: Vec<String>, observed: i64) -> Result<(), ClientError> {
        if keys.is_empty() {
            return Ok(());
        }
        let requests: Vec<EmptyRequest> = keys.into_iter().map(|k| EmptyRequest::new(k, observed)).collect();
        self.objects.empty(&requests).await?;
        Ok(())
    }

    /// Objects from the store for a query that the driver has not memoized
    async fn resolve_query(
        &self,
        request: &ObjectQueryRequest,
        query: &str,
        requested: Option<&Option<String>>,
        skip: u64,
        take: u64,
        order: SortOrder,
    ) -> Result<Vec<ObjectEntity>, ClientError> {
        let mut found: Vec<ObjectEntity> = {
            let store = self.store.read().await;
            store
                .objects()
                .into_iter()
                .filter(|o| {
                    request
                        .namespace
                        .as_deref()
                        .map_or(true, |ns| o.namespace.eq_ignore_ascii_case(ns))
                })
                .filter(|o| query_matches(request.query_type, query, o))
                .filter(|o| match requested {
                    None => true,
                    Some(parent) if request.parent_level == 1 => &o.parent_uuid == parent,
                    Some(None) => true,
                    Some(Some(parent)) => o.ancestor_uuids().contains(parent),
                })
                .cloned()
                .collect()
        };

        found.sort_by(|a, b| a.path.cmp(&b.path));
        if order == SortOrder::Descending {
            found.reverse();
        }
        let found: Vec<ObjectEntity> = found
            .into_iter()
            .skip(usize::try_from(skip).unwrap_or(usize::MAX))
            .take(usize::try_from(take).unwrap_or(usize::MAX))
            .collect();

        let row = |uuid: Option<String>, parent_uuid: Option<String>| ObjectQueryResult {
            query_type: request.query_type,
            namespace: request.namespace.clone(),
            query: query.to_string(),
            uuid,
            parent_level: request.parent_level,
            parent_uuid,
            requested_parent_uuid: requested.cloned().flatten(),
            is_root: matches!(requested, Some(None)),
            skip,
            take,
            sort_order: order,
        };
        let rows: Vec<ObjectQueryResult> = if found.is_empty() {
            vec![row(None, None)]
        } else {
            found
                .iter()
                .map(|o| row(Some(o.uuid.clone()), o.parent_uuid.clone()))
                .collect()
        };

        self.objects.publish(found.clone()).await?;
        self.objects.store_results(&rows).await?;
        Ok(found)
    }

    /// Content records from the store for keys the content driver has never seen
    async fn resolve_content(&self, content_type: ContentType, keys: &[String]) -> Result<(), ClientError> {
        let Some(driver) = self.contents.get(content_type) else {
            return Ok(());
        };

        // taken before the read so a record published meanwhile outranks the mark
        let observed = driver.now();
        let (records, missing) = {
            let store = self.store.read().await;
            let mut records = Vec::new();
            let mut missing = Vec::new();
            for key in keys {
                let history: Vec<ContentEntity> =
                    store.content_of_type(key, content_type).into_iter().cloned().collect();
                if history.is_empty() {
                    missing.push(key.clone());
                }
                records.extend(history);
            }
            (records, missing)
        };

        if !records.is_empty() {
            driver.publish(records).await?;
        }
        if !missing.is_empty() {
            let requests: Vec<EmptyRequest> = missing
                .into_iter()
                .map(|k| EmptyRequest::new(k, observed))
                .collect();
            driver.empty(&requests).await?;
        }
        Ok(())
    }

    /// Keys the driver reports as `NotFound`
    fn unresolved<T>(keys: &[String], results: &[EntityResult<T>]) -> Vec<String> {
        keys.iter()
            .zip(results)
            .filter(|(_, r)| r.is_not_found())
            .map(|(k, _)| k.clone())
            .collect()
    }
}

fn query_matches(query_type: ObjectQueryType, query: &str, object: &ObjectEntity) -> bool {
    match query_type {
        ObjectQueryType::Name => match query.strip_prefix('~') {
            Some(part) => object.name().to_lowercase().contains(&part.to_lowercase()),
            None => object.name().eq_ignore_ascii_case(query),
        },
        ObjectQueryType::Uuid => object.uuid == query,
        ObjectQueryType::ContentType => object.content_type.as_str().eq_ignore_ascii_case(query),
        ObjectQueryType::DefinitionUuid => object.definition_uuid.as_deref() == Some(query),
    }
}

#[async_trait]
impl EntitiesClient for DriverClient {
    async fn query_objects(
        &self,
        request: &ObjectQueryRequest,
        skip: u64,
        take: u64,
        order: SortOrder,
    ) -> Result<Vec<ObjectEntity>, ClientError> {
        let cached = self.objects.query_objects(request, skip, take, order).await?;

        // driver results are one per query, or one per (query, parent) when scoped
        let scopes: Vec<(&String, Option<&Option<String>>)> = if request.parent_uuids.is_empty() {
            request.queries.iter().map(|q| (q, None)).collect()
        } else {
            request
                .queries
                .iter()
                .flat_map(|q| request.parent_uuids.iter().map(move |p| (q, Some(p))))
                .collect()
        };

        let mut uuids = Vec::new();
        let mut found = Vec::new();
        for ((query, requested), result) in scopes.into_iter().zip(cached) {
            match result {
                EntityResult::Ok(rows) => uuids.extend(rows.into_iter().filter_map(|r| r.uuid)),
                EntityResult::NotFound => {
                    found.extend(self.resolve_query(request, query, requested, skip, take, order).await?)
                }
                _ => {}
            }
        }

        found.extend(self.read_objects(&uuids).await?);
        Ok(found)
    }

    async fn read_objects(&self, uuids: &[String]) -> Result<Vec<ObjectEntity>, ClientError> {
        if uuids.is_empty() {
            return Ok(Vec::new());
        }

        let cached = self.objects.query(uuids).await?;
        let missing = Self::unresolved(uuids, &cached);
        let mut found: Vec<ObjectEntity> = cached.into_iter().filter_map(EntityResult::ok).flatten().collect();

        if !missing.is_empty() {
            let observed = self.objects.now();
            let (resolved, empty): (Vec<ObjectEntity>, Vec<String>) = {
                let store = self.store.read().await;
                let resolved: Vec<ObjectEntity> = missing.iter().filter_map(|u| store.object(u).cloned()).collect();
                let empty = missing.iter().filter(|u| store.object(u).is_none()).cloned().collect();
                (resolved, empty)
            };
            self.objects.publish(resolved.clone()).await?;
            self.mark_empty(empty, observed).await?;
            found.extend(resolved);
        }
        Ok(found)
    }

    async fn query_by_parent_uuid(&self, parent_uuids: &[Option<String>]) -> Result<Vec<ObjectEntity>, ClientError> {
        let cached = self.objects.query_by_parent_uuid(parent_uuids).await?;

        let mut uuids = Vec::new();
        let mut found = Vec::new();
        for (parent, result) in parent_uuids.iter().zip(cached) {
            match result {
                EntityResult::Ok(rows) => uuids.extend(rows.into_iter().filter_map(|r| r.uuid)),
                EntityResult::NotFound => {
                    let children: Vec<ObjectEntity> = {
                        let store = self.store.read().await;
                        let children = match parent {
                            Some(parent) => store.children(parent),
                            None => store.roots(None),
                        };
                        children.into_iter().cloned().collect()
                    };

                    let rows: Vec<ObjectQueryResult> = if children.is_empty() {
                        vec![ObjectQueryResult::relation(parent.as_deref(), None)]
                    } else {
                        children
                            .iter()
                            .map(|c| ObjectQueryResult::relation(parent.as_deref(), Some(c.uuid.clone())))
                            .collect()
                    };
                    self.objects.publish(children.clone()).await?;
                    self.objects.store_parents(&rows).await?;
                    found.extend(children);
                }
                _ => {}
            }
        }

        found.extend(self.read_objects(&uuids).await?);
        Ok(found)
    }

    async fn query_descendants(&self, uuids: &[String]) -> Result<Vec<ObjectEntity>, ClientError> {
        let objects = self.read_objects(uuids).await?;
        let (roots, inner): (Vec<&ObjectEntity>, Vec<&ObjectEntity>) = objects.iter().partition(|o| o.is_root());

        let mut found = Vec::new();

        // only root → descendants is memoized
        let root_keys: Vec<Option<String>> = roots.iter().map(|o| Some(o.uuid.clone())).collect();
        if !root_keys.is_empty() {
            let cached = self.objects.query_children_by_root_uuid(&root_keys).await?;
            let mut cached_uuids = Vec::new();
            for (root, result) in roots.iter().zip(cached) {
                match result {
                    EntityResult::Ok(rows) => cached_uuids.extend(rows.into_iter().filter_map(|r| r.uuid)),
                    EntityResult::NotFound => {
                        let below: Vec<ObjectEntity> = {
                            let store = self.store.read().await;
                            store.descendants(&root.uuid).into_iter().cloned().collect()
                        };
                        let rows: Vec<ObjectQueryResult> = if below.is_empty() {
                            vec![ObjectQueryResult::relation(Some(root.uuid.as_str()), None)]
                        } else {
                            below
                                .iter()
                                .map(|o| ObjectQueryResult::relation(Some(root.uuid.as_str()), Some(o.uuid.clone())))
                                .collect()
                        };
                        self.objects.publish(below.clone()).await?;
                        self.objects.store_children_by_roots(&rows).await?;
                        found.extend(below);
                    }
                    _ => {}
                }
            }
            found.extend(self.read_objects(&cached_uuids).await?);
        }

        if !inner.is_empty() {
            let below: Vec<ObjectEntity> = {
                let store = self.store.read().await;
                inner
                    .iter()
                    .flat_map(|o| store.descendants(&o.uuid))
                    .cloned()
                    .collect()
            };
            self.objects.publish(below.clone()).await?;
            found.extend(below);
        }

        let mut seen = HashSet::new();
        found.retain(|o| seen.insert(o.uuid.clone()));
        Ok(found)
    }

    async fn query_parents(&self, child_uuids: &[String]) -> Result<Vec<ObjectEntity>, ClientError> {
        if child_uuids.is_empty() {
            return Ok(Vec::new());
        }

        let cached = self.objects.query_by_child_uuid(child_uuids).await?;
        let missing = Self::unresolved(child_uuids, &cached);
        let mut parent_uuids: Vec<String> = cached
            .into_iter()
            .filter_map(EntityResult::ok)
            .filter_map(|row| row.uuid)
            .collect();

        if !missing.is_empty() {
            // reading the children caches them, which answers the next parent lookup
            let children = self.read_objects(&missing).await?;
            parent_uuids.extend(children.into_iter().filter_map(|c| c.parent_uuid));
        }

        parent_uuids.sort();
        parent_uuids.dedup();
        self.read_objects(&parent_uuids).await
    }

    async fn index_exists(&self, index_key: &str) -> Result<bool, ClientError> {
        Ok(self.store.read().await.index_exists(index_key))
    }

    async fn query_index(&self, index_key: &str, operator: Operator, value: &str) -> Result<Vec<String>, ClientError> {
        let store = self.store.read().await;
        Ok(store
            .index_entries(index_key)
            .iter()
            .filter(|e| operators::compare(operator, &e.value, value))
            .map(|e| e.target_uuid.clone())
            .collect())
    }

    async fn current(&self, content_type: ContentType, object_uuids: &[String]) -> Result<Vec<ContentEntity>, ClientError> {
        let Some(driver) = self.contents.get(content_type) else {
            return Ok(Vec::new());
        };
        if object_uuids.is_empty() {
            return Ok(Vec::new());
        }

        let cached = driver.query(object_uuids).await?;
        let missing = Self::unresolved(object_uuids, &cached);
        self.resolve_content(content_type, &missing).await?;

        let found = match content_type {
            ContentType::Assignment | ContentType::Group | ContentType::Set | ContentType::Hash => driver
                .current_by_assignee(object_uuids)
                .await?
                .into_iter()
                .filter_map(EntityResult::ok)
                .flatten()
                .collect(),
            _ => driver
                .latest(object_uuids)
                .await?
                .into_iter()
                .filter_map(EntityResult::ok)
                .collect(),
        };
        Ok(found)
    }

    async fn range(
        &self,
        content_type: ContentType,
        object_uuids: &[String],
        range: RangeRequest,
    ) -> Result<Vec<ContentEntity>, ClientError> {
        let Some(driver) = self.contents.get(content_type) else {
            return Ok(Vec::new());
        };
        if object_uuids.is_empty() {
            return Ok(Vec::new());
        }

        let cached = driver.query(object_uuids).await?;
        let missing = Self::unresolved(object_uuids, &cached);
        self.resolve_content(content_type, &missing).await?;

        Ok(driver
            .query_range(object_uuids, range.start, range.stop, range.skip, range.take, range.order)
            .await?
            .into_iter()
            .filter_map(EntityResult::ok)
            .flatten()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::models::content::StateEntity;

    fn object(path: &str, content_type: ContentType) -> ObjectEntity {
        ObjectEntity::new("plant", path, content_type, 1).unwrap()
    }

    fn client() -> (DriverClient, ObjectEntity, ObjectEntity) {
        let area = object("/area1", ContentType::Directory);
        let state = object("/area1/state", ContentType::State);
        let mut store = EntityCollection::new();
        store.add_objects([area.clone(), state.clone()]);
        store.add_content(ContentEntity::State(StateEntity::new(&state.uuid, "RUNNING", 10)));

        let config = DriverConfig::default();
        let client = DriverClient::new(ObjectDriver::new(config.clone()), ContentDrivers::new(config), store);
        (client, area, state)
    }

    #[tokio::test]
    async fn test_children_are_memoized_after_first_read() {
        let (client, area, state) = client();

        let first = client.query_by_parent_uuid(&[Some(area.uuid.clone())]).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].uuid, state.uuid);

        let cached = client.objects().query_by_parent_uuid(&[Some(area.uuid.clone())]).await.unwrap();
        assert!(cached[0].is_ok());

        let second = client.query_by_parent_uuid(&[Some(area.uuid.clone())]).await.unwrap();
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn test_missing_object_is_marked_empty() {
        let (client, _, _) = client();
        let found = client.read_objects(&["nope".to_string()]).await.unwrap();
        assert!(found.is_empty());

        let cached = client.objects().query(&["nope".to_string()]).await.unwrap();
        assert!(cached[0].is_empty());
    }

    #[tokio::test]
    async fn test_empty_mark_does_not_hide_publish_during_store_read() {
        use crate::drivers::{MemoryEntityDriver, ObjectPolicy};
        use crate::models::time::ManualClock;
        use std::sync::Arc;

        let clock = Arc::new(ManualClock::new(100));
        let config = DriverConfig::default();
        let objects = ObjectDriver::from_driver(MemoryEntityDriver::with_clock(ObjectPolicy, config.clone(), clock.clone()));
        let client = DriverClient::new(objects, ContentDrivers::new(config), EntityCollection::new());

        let late = ObjectEntity::new("plant", "/late", ContentType::Directory, 150).unwrap();
        let keys = vec![late.uuid.clone()];

        // the store read blocks while a publish lands in the driver
        let guard = client.store.write().await;
        let read = client.read_objects(&keys);
        tokio::pin!(read);
        assert!(futures::poll!(&mut read).is_pending());

        clock.set(200);
        client.objects().publish(vec![late.clone()]).await.unwrap();
        drop(guard);

        assert!(read.await.unwrap().is_empty());
        let cached = client.objects().query(&keys).await.unwrap();
        assert_eq!(cached[0].clone().ok(), Some(vec![late]));
    }

    #[tokio::test]
    async fn test_current_content_is_cached() {
        let (client, _, state) = client();
        let current = client.current(ContentType::State, &[state.uuid.clone()]).await.unwrap();
        assert_eq!(current.len(), 1);

        let driver = client.contents().get(ContentType::State).unwrap();
        let cached = driver.latest(&[state.uuid.clone()]).await.unwrap();
        assert!(cached[0].is_ok());
    }

    #[tokio::test]
    async fn test_parents_resolve_through_children() {
        let (client, area, state) = client();
        let parents = client.query_parents(&[state.uuid.clone()]).await.unwrap();
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].uuid, area.uuid);
    }
}
