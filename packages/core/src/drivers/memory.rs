//! Generic in-memory entity driver
//!
//! Every concrete driver (objects, one per content type) is a [`MemoryEntityDriver`]
//! parameterized by an [`EntityPolicy`] describing how its entities are keyed, compared
//! and indexed.
//!
//! # State
//!
//! All index state lives behind one `tokio::sync::Mutex`. The lock is never held across
//! an await point: callers that need data from a slower store query first, release, and
//! publish the results afterwards.
//!
//! Each query key is in exactly one of three states:
//!
//! - **present**: one or more entities are stored under it
//! - **empty**: a negative mark confirms nothing exists
//! - **unknown**: neither, the caller should fall through to its backing store
//!
//! # Negative cache races
//!
//! An `Empty` request carries the time the caller observed the absence. It is rejected
//! when a write with a newer (or equal) freshness already landed for the key, so a late
//! Empty can never hide data published concurrently.

use crate::config::DriverConfig;
use crate::drivers::consumer::{ConsumerRegistry, EntityConsumer, SharedRegistry, Unsubscribe};
use crate::drivers::result::{EmptyRequest, EntityResult, PublishResult};
use crate::drivers::retention::{spawn_retention, Expire, RetentionHandle};
use crate::error::DriverError;
use crate::models::content::Entity;
use crate::models::time::{Clock, SystemClock};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;

/// Describes how a driver keys, compares and indexes its entities
pub trait EntityPolicy<T: Entity>: Send + Sync + 'static {
    /// Extra index state maintained alongside the stored entities
    type Index: Default + Send + 'static;

    fn name(&self) -> &str;

    /// Storage identity; publishing an entity with the same identity replaces the old one
    fn identity(&self, entity: &T) -> String {
        entity.entity_uuid()
    }

    /// Query keys the entity is reachable under (also used for subscription filtering)
    fn keys(&self, entity: &T) -> Vec<String>;

    /// Whether `new` should replace `existing`
    fn publish_compare(&self, new: &T, existing: &T) -> bool {
        fingerprint(new) != fingerprint(existing) && new.created() >= existing.created()
    }

    /// Timestamp an Empty request must beat to be accepted
    fn freshness(&self, entity: &T) -> i64 {
        entity.created()
    }

    /// Called for every incoming entity before the publish comparison runs
    fn before_publish(&self, _index: &mut Self::Index, _existing: Option<&T>, _entity: &T) {}

    /// Called before a stored entity is removed (delete, expiry or an accepted Empty)
    fn before_remove(&self, _index: &mut Self::Index, _entity: &T) {}
}

/// Serialized form used to detect no-op republishes
pub fn fingerprint<T: Entity>(entity: &T) -> String {
    serde_json::to_string(entity).unwrap_or_default()
}

pub(crate) struct DriverState<T, I> {
    pub(crate) entities: HashMap<String, T>,
    pub(crate) by_key: HashMap<String, BTreeSet<String>>,
    pub(crate) empty: HashSet<String>,
    pub(crate) updated: HashMap<String, i64>,
    pub(crate) accessed: HashMap<String, i64>,
    pub(crate) index: I,
    disposed: bool,
}

impl<T: Entity, I: Default> DriverState<T, I> {
    fn new() -> Self {
        Self {
            entities: HashMap::new(),
            by_key: HashMap::new(),
            empty: HashSet::new(),
            updated: HashMap::new(),
            accessed: HashMap::new(),
            index: I::default(),
            disposed: false,
        }
    }

    /// Entities stored under `key`, in identity order
    pub(crate) fn entities_for(&self, key: &str) -> Vec<&T> {
        self.by_key
            .get(key)
            .map(|ids| ids.iter().filter_map(|id| self.entities.get(id)).collect())
            .unwrap_or_default()
    }

    fn remove_identity<P: EntityPolicy<T, Index = I>>(&mut self, policy: &P, identity: &str) -> Option<T> {
        let entity = self.entities.remove(identity)?;
        policy.before_remove(&mut self.index, &entity);
        for key in policy.keys(&entity) {
            if let Some(ids) = self.by_key.get_mut(&key) {
                ids.remove(identity);
                if ids.is_empty() {
                    self.by_key.remove(&key);
                }
            }
        }
        Some(entity)
    }

    fn remove_key<P: EntityPolicy<T, Index = I>>(&mut self, policy: &P, key: &str) -> Vec<T> {
        let identities: Vec<String> = self
            .by_key
            .get(key)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();

        identities
            .iter()
            .filter_map(|id| self.remove_identity(policy, id))
            .collect()
    }

    /// Drop the entities under `key` that rank lowest by `rank` until at most `limit`
    /// remain; returns how many were dropped
    pub(crate) fn trim_key<P: EntityPolicy<T, Index = I>>(
        &mut self,
        policy: &P,
        key: &str,
        limit: usize,
        rank: impl Fn(&T) -> i64,
    ) -> usize {
        let mut ranked: Vec<(i64, String)> = self
            .by_key
            .get(key)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.entities.get(id).map(|e| (rank(e), id.clone())))
                    .collect()
            })
            .unwrap_or_default();
        if ranked.len() <= limit {
            return 0;
        }

        ranked.sort();
        let excess = ranked.len() - limit;
        ranked
            .into_iter()
            .take(excess)
            .filter(|(_, id)| self.remove_identity(policy, id).is_some())
            .count()
    }

    /// Latest read or write of `key`
    fn last_touch(&self, key: &str) -> i64 {
        let accessed = self.accessed.get(key).copied().unwrap_or(i64::MIN);
        let updated = self.updated.get(key).copied().unwrap_or(i64::MIN);
        accessed.max(updated)
    }

    fn expire_where<P: EntityPolicy<T, Index = I>>(
        &mut self,
        policy: &P,
        stale: impl Fn(&Self, &str) -> bool,
    ) -> usize {
        let view: &Self = self;
        let candidates: HashSet<String> = view
            .by_key
            .keys()
            .chain(view.empty.iter())
            .filter(|key| stale(view, key.as_str()))
            .cloned()
            .collect();

        for key in &candidates {
            self.remove_key(policy, key);
            self.forget_key(key);
        }
        candidates.len()
    }

    fn forget_key(&mut self, key: &str) {
        self.empty.remove(key);
        self.updated.remove(key);
        self.accessed.remove(key);
    }
}

/// Counts reported by [`MemoryEntityDriver::stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub entities: usize,
    pub keys: usize,
    pub empty_keys: usize,
    pub consumers: usize,
}

struct DriverInner<T: Entity, P: EntityPolicy<T>> {
    policy: P,
    config: DriverConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<DriverState<T, P::Index>>,
    consumers: SharedRegistry<T>,
}

/// In-memory driver over entities of type `T`
pub struct MemoryEntityDriver<T: Entity, P: EntityPolicy<T>> {
    inner: Arc<DriverInner<T, P>>,
    retention: Arc<std::sync::Mutex<Option<RetentionHandle>>>,
}

impl<T: Entity, P: EntityPolicy<T>> Clone for MemoryEntityDriver<T, P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            retention: self.retention.clone(),
        }
    }
}

impl<T: Entity, P: EntityPolicy<T>> MemoryEntityDriver<T, P> {
    pub fn new(policy: P, config: DriverConfig) -> Self {
        Self::with_clock(policy, config, Arc::new(SystemClock))
    }

    /// Construct with an explicit clock (retention and access bookkeeping use it)
    pub fn with_clock(policy: P, config: DriverConfig, clock: Arc<dyn Clock>) -> Self {
        let consumers = Arc::new(std::sync::Mutex::new(ConsumerRegistry::new(
            policy.name(),
            config.consumer_capacity,
        )));

        let driver = Self {
            inner: Arc::new(DriverInner {
                policy,
                config,
                clock,
                state: Mutex::new(DriverState::new()),
                consumers,
            }),
            retention: Arc::new(std::sync::Mutex::new(None)),
        };

        if driver.inner.config.retention_enabled {
            driver.start_retention();
        }
        driver
    }

    pub fn name(&self) -> &str {
        self.inner.policy.name()
    }

    pub fn policy(&self) -> &P {
        &self.inner.policy
    }

    pub fn config(&self) -> &DriverConfig {
        &self.inner.config
    }

    pub fn now(&self) -> i64 {
        self.inner.clock.now_nanos()
    }

    /// Start the background access-retention sweep
    ///
    /// Requires a running tokio runtime; without one the sweep is skipped with a warning.
    pub fn start_retention(&self) {
        let Ok(mut slot) = self.retention.lock() else {
            return;
        };
        if slot.is_some() {
            return;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::warn!("{}: no tokio runtime, retention sweep not started", self.name());
            return;
        }

        let target: Arc<dyn Expire> = self.inner.clone();
        let weak: Weak<dyn Expire> = Arc::downgrade(&target);
        *slot = Some(spawn_retention(
            weak,
            self.inner.config.retention_interval(),
        ));
    }

    /// Store entities that win the publish comparison; returns one outcome per entity
    pub async fn publish(&self, entities: Vec<T>) -> Result<Vec<PublishResult>, DriverError> {
        let policy = &self.inner.policy;
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        self.ensure_live(state)?;

        let mut results = Vec::with_capacity(entities.len());
        for entity in entities {
            let identity = policy.identity(&entity);
            if identity.is_empty() {
                tracing::warn!("{}: dropping entity without identity", self.name());
                results.push(PublishResult::Dropped);
                continue;
            }

            let existing = state.entities.get(&identity).cloned();
            policy.before_publish(&mut state.index, existing.as_ref(), &entity);

            if let Some(existing) = &existing {
                if !policy.publish_compare(&entity, existing) {
                    results.push(PublishResult::Dropped);
                    continue;
                }
            }

            if let Some(existing) = &existing {
                for key in policy.keys(existing) {
                    if let Some(ids) = state.by_key.get_mut(&key) {
                        ids.remove(&identity);
                        if ids.is_empty() {
                            state.by_key.remove(&key);
                        }
                    }
                }
            }

            let keys = policy.keys(&entity);
            let freshness = policy.freshness(&entity);
            for key in &keys {
                state
                    .by_key
                    .entry(key.clone())
                    .or_default()
                    .insert(identity.clone());
                state.empty.remove(key);
                let updated = state.updated.entry(key.clone()).or_insert(freshness);
                *updated = (*updated).max(freshness);
            }

            if let Ok(mut consumers) = self.inner.consumers.lock() {
                consumers.dispatch(&keys, &entity);
            }
            state.entities.insert(identity, entity);
            results.push(PublishResult::Stored);
        }

        let stored = results.iter().filter(|r| r.is_stored()).count();
        tracing::debug!(
            "{}: published {} of {} entities",
            self.name(),
            stored,
            results.len()
        );
        Ok(results)
    }

    /// Look up each key; results are parallel to `keys`
    pub async fn query(&self, keys: &[String]) -> Result<Vec<EntityResult<Vec<T>>>, DriverError> {
        let now = self.now();
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        self.ensure_live(state)?;

        let results = keys
            .iter()
            .map(|key| {
                if key.is_empty() {
                    return EntityResult::BadRequest("key is empty".to_string());
                }
                if state.empty.contains(key) {
                    state.accessed.insert(key.clone(), now);
                    return EntityResult::Empty;
                }
                let found: Vec<T> = state.entities_for(key).into_iter().cloned().collect();
                if found.is_empty() {
                    EntityResult::NotFound
                } else {
                    state.accessed.insert(key.clone(), now);
                    EntityResult::Ok(found)
                }
            })
            .collect();

        Ok(results)
    }

    /// Record confirmed absences; returns whether each mark was accepted
    ///
    /// A mark is rejected for a blank key, a key already marked, or when the key saw a
    /// write at or after the request's timestamp. An accepted mark removes whatever was
    /// stored under the key.
    pub async fn empty(&self, requests: &[EmptyRequest]) -> Result<Vec<bool>, DriverError> {
        let policy = &self.inner.policy;
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        self.ensure_live(state)?;

        let accepted = requests
            .iter()
            .map(|request| {
                if request.key.is_empty() || state.empty.contains(&request.key) {
                    return false;
                }
                if let Some(updated) = state.updated.get(&request.key) {
                    if request.timestamp <= *updated {
                        tracing::debug!(
                            "{}: rejected stale empty mark for {} ({} <= {})",
                            self.name(),
                            request.key,
                            request.timestamp,
                            updated
                        );
                        return false;
                    }
                }

                state.remove_key(policy, &request.key);
                state.empty.insert(request.key.clone());
                state.updated.insert(request.key.clone(), request.timestamp);
                true
            })
            .collect();

        Ok(accepted)
    }

    /// Remove everything stored under each key along with its marks
    pub async fn delete(&self, keys: &[String]) -> Result<Vec<EntityResult<Vec<T>>>, DriverError> {
        let policy = &self.inner.policy;
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;
        self.ensure_live(state)?;

        let results = keys
            .iter()
            .map(|key| {
                if key.is_empty() {
                    return EntityResult::BadRequest("key is empty".to_string());
                }
                let removed = state.remove_key(policy, key);
                state.forget_key(key);
                if removed.is_empty() {
                    EntityResult::NotFound
                } else {
                    EntityResult::Ok(removed)
                }
            })
            .collect();

        Ok(results)
    }

    /// Subscribe to publishes under `keys` (all keys when empty)
    pub async fn subscribe(&self, keys: Vec<String>) -> Result<EntityConsumer<T>, DriverError> {
        {
            let state = self.inner.state.lock().await;
            self.ensure_live(&state)?;
        }

        let owner: Arc<dyn Unsubscribe> = self.inner.consumers.clone();
        let owner = Arc::downgrade(&owner);
        self.inner
            .consumers
            .lock()
            .map(|mut consumers| consumers.subscribe(keys, Some(owner)))
            .map_err(|_| DriverError::internal("consumer registry poisoned"))
    }

    /// Evict keys whose latest write is older than `before`
    pub async fn expire_by_update(&self, before: i64) -> usize {
        self.expire(|state, key| state.updated.get(key).copied().unwrap_or(i64::MIN) < before)
            .await
    }

    /// Evict keys not read or written since `before`
    pub async fn expire_by_access(&self, before: i64) -> usize {
        self.expire(|state, key| state.last_touch(key) < before).await
    }

    async fn expire(&self, stale: impl Fn(&DriverState<T, P::Index>, &str) -> bool) -> usize {
        let mut guard = self.inner.state.lock().await;
        if guard.disposed {
            return 0;
        }
        let expired = guard.expire_where(&self.inner.policy, stale);
        if expired > 0 {
            tracing::debug!("{}: expired {} key(s)", self.name(), expired);
        }
        expired
    }

    /// Stop the driver: consumers are dropped and further calls fail
    pub async fn dispose(&self) {
        let mut state = self.inner.state.lock().await;
        state.disposed = true;
        if let Ok(mut consumers) = self.inner.consumers.lock() {
            consumers.clear();
        }
        if let Ok(mut retention) = self.retention.lock() {
            if let Some(handle) = retention.take() {
                handle.stop();
            }
        }
        tracing::info!("{}: disposed", self.name());
    }

    pub async fn stats(&self) -> DriverStats {
        let state = self.inner.state.lock().await;
        DriverStats {
            entities: state.entities.len(),
            keys: state.by_key.len(),
            empty_keys: state.empty.len(),
            consumers: self.inner.consumers.lock().map(|c| c.len()).unwrap_or(0),
        }
    }

    /// Run `f` against the locked state
    pub(crate) async fn with_state<R>(
        &self,
        f: impl FnOnce(&mut DriverState<T, P::Index>) -> R,
    ) -> Result<R, DriverError> {
        let mut guard = self.inner.state.lock().await;
        self.ensure_live(&guard)?;
        Ok(f(&mut guard))
    }

    fn ensure_live(&self, state: &DriverState<T, P::Index>) -> Result<(), DriverError> {
        if state.disposed {
            Err(DriverError::disposed(self.name()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<T: Entity, P: EntityPolicy<T>> Expire for DriverInner<T, P> {
    fn name(&self) -> String {
        self.policy.name().to_string()
    }

    async fn sweep(&self) -> usize {
        let ttl = i64::try_from(self.config.retention_ttl().as_nanos()).unwrap_or(i64::MAX);
        let before = self.clock.now_nanos().saturating_sub(ttl);

        let mut guard = self.state.lock().await;
        if guard.disposed {
            return 0;
        }
        guard.expire_where(&self.policy, |state, key| state.last_touch(key) < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::time::ManualClock;
    use serde::Serialize;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Reading {
        id: String,
        owner: String,
        value: i32,
        created: i64,
    }

    impl Entity for Reading {
        fn entity_uuid(&self) -> String {
            self.id.clone()
        }

        fn created(&self) -> i64 {
            self.created
        }
    }

    struct ReadingPolicy;

    impl EntityPolicy<Reading> for ReadingPolicy {
        type Index = ();

        fn name(&self) -> &str {
            "readings"
        }

        fn keys(&self, entity: &Reading) -> Vec<String> {
            vec![entity.owner.clone()]
        }
    }

    fn reading(id: &str, owner: &str, value: i32, created: i64) -> Reading {
        Reading {
            id: id.to_string(),
            owner: owner.to_string(),
            value,
            created,
        }
    }

    fn driver() -> MemoryEntityDriver<Reading, ReadingPolicy> {
        MemoryEntityDriver::new(ReadingPolicy, DriverConfig::default())
    }

    fn keys(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_publish_compare_drops_older_and_identical() {
        let driver = driver();
        let first = driver.publish(vec![reading("r1", "o", 1, 10)]).await.unwrap();
        assert_eq!(first, vec![PublishResult::Stored]);

        let again = driver
            .publish(vec![reading("r1", "o", 1, 10), reading("r1", "o", 2, 5)])
            .await
            .unwrap();
        assert_eq!(again, vec![PublishResult::Dropped, PublishResult::Dropped]);

        let newer = driver.publish(vec![reading("r1", "o", 3, 20)]).await.unwrap();
        assert_eq!(newer, vec![PublishResult::Stored]);

        let results = driver.query(&keys(&["o"])).await.unwrap();
        assert_eq!(results[0].as_ok().unwrap()[0].value, 3);
    }

    #[tokio::test]
    async fn test_query_states() {
        let driver = driver();
        driver.publish(vec![reading("r1", "o", 1, 10)]).await.unwrap();
        driver.empty(&[EmptyRequest::new("e", 5)]).await.unwrap();

        let results = driver.query(&keys(&["o", "e", "unknown", ""])).await.unwrap();
        assert!(results[0].is_ok());
        assert!(results[1].is_empty());
        assert!(results[2].is_not_found());
        assert!(matches!(results[3], EntityResult::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_stale_empty_rejected() {
        let driver = driver();
        assert_eq!(driver.empty(&[EmptyRequest::new("x", 100)]).await.unwrap(), vec![true]);
        driver.publish(vec![reading("r1", "x", 1, 150)]).await.unwrap();
        assert_eq!(driver.empty(&[EmptyRequest::new("x", 120)]).await.unwrap(), vec![false]);

        let results = driver.query(&keys(&["x"])).await.unwrap();
        assert!(results[0].is_ok());

        // a newer absence wins
        assert_eq!(driver.empty(&[EmptyRequest::new("x", 200)]).await.unwrap(), vec![true]);
        assert!(driver.query(&keys(&["x"])).await.unwrap()[0].is_empty());
    }

    #[tokio::test]
    async fn test_delete_forgets_key() {
        let driver = driver();
        driver
            .publish(vec![reading("r1", "o", 1, 10), reading("r2", "o", 2, 10)])
            .await
            .unwrap();

        let deleted = driver.delete(&keys(&["o", "missing"])).await.unwrap();
        assert_eq!(deleted[0].as_ok().map(|v| v.len()), Some(2));
        assert!(deleted[1].is_not_found());
        assert!(driver.query(&keys(&["o"])).await.unwrap()[0].is_not_found());

        // a fresh empty mark is accepted after delete
        assert_eq!(driver.empty(&[EmptyRequest::new("o", 1)]).await.unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn test_subscribe_receives_matching_publishes() {
        let driver = driver();
        let mut consumer = driver.subscribe(keys(&["a"])).await.unwrap();

        driver
            .publish(vec![reading("r1", "b", 1, 1), reading("r2", "a", 2, 1)])
            .await
            .unwrap();

        assert_eq!(consumer.recv().await.map(|r| r.id), Some("r2".to_string()));
        assert!(consumer.try_recv().is_none());

        consumer.unsubscribe();
        assert_eq!(driver.stats().await.consumers, 0);
    }

    #[tokio::test]
    async fn test_expire_by_access_uses_clock() {
        let clock = Arc::new(ManualClock::new(1_000));
        let driver = MemoryEntityDriver::with_clock(ReadingPolicy, DriverConfig::default(), clock.clone());
        driver
            .publish(vec![reading("r1", "old", 1, 10), reading("r2", "hot", 1, 10)])
            .await
            .unwrap();

        clock.set(5_000);
        driver.query(&keys(&["hot"])).await.unwrap();

        assert_eq!(driver.expire_by_access(4_000).await, 1);
        let results = driver.query(&keys(&["old", "hot"])).await.unwrap();
        assert!(results[0].is_not_found());
        assert!(results[1].is_ok());
    }

    #[tokio::test]
    async fn test_expire_by_update() {
        let driver = driver();
        driver
            .publish(vec![reading("r1", "a", 1, 10), reading("r2", "b", 1, 50)])
            .await
            .unwrap();
        assert_eq!(driver.expire_by_update(20).await, 1);
        assert_eq!(driver.stats().await.entities, 1);
    }

    #[tokio::test]
    async fn test_disposed_driver_rejects_calls() {
        let driver = driver();
        let _consumer = driver.subscribe(vec![]).await.unwrap();
        driver.dispose().await;

        assert!(matches!(
            driver.publish(vec![reading("r1", "o", 1, 1)]).await,
            Err(DriverError::Disposed { .. })
        ));
        assert!(driver.query(&keys(&["o"])).await.is_err());
        assert_eq!(driver.stats().await.consumers, 0);
    }
}
