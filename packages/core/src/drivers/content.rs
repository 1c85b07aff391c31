//! Content drivers
//!
//! One [`ContentDriver`] per [`ContentType`]. They share the generic memory driver and
//! differ only in their [`ContentPolicy`]:
//!
//! | Kind | Identity | Keys | Replaces when |
//! |------|----------|------|---------------|
//! | scalar (Boolean, Number, ...) | owning object | object | `created` is newer |
//! | series (Event, Observation, State, ...) | object + timestamp | object | `timestamp` is newer |
//! | Assignment | (assignee, member) pair | assignee, `member:` + member | record changed, `created` not older |
//! | Group | (group, member) pair | group, `member:` + member | record changed, `created` not older |
//!
//! Number records also replace on an equal `created`. Series types keep their history,
//! at most [`DriverConfig::history_limit`] records per object, and answer range
//! queries; everything else is latest only. An Assignment pair is stored once:
//! republishing the pair (for example with a remove timestamp) replaces the previous
//! record instead of appending.

use crate::config::DriverConfig;
use crate::drivers::memory::{fingerprint, EntityPolicy, MemoryEntityDriver};
use crate::drivers::result::{EntityResult, PublishResult};
use crate::error::DriverError;
use crate::models::content::{ContentEntity, Entity};
use crate::models::content_type::ContentType;
use crate::models::path::hash_key;
use crate::models::request::SortOrder;
use std::collections::{BTreeSet, HashMap};
use std::ops::Deref;

const MEMBER_KEY_PREFIX: &str = "member:";

/// Key under which relations are reachable from their member side
pub fn member_key(member_uuid: &str) -> String {
    format!("{}{}", MEMBER_KEY_PREFIX, member_uuid)
}

pub struct ContentPolicy {
    content_type: ContentType,
    name: String,
}

impl ContentPolicy {
    pub fn new(content_type: ContentType) -> Self {
        Self {
            content_type,
            name: format!("content.{}", content_type.schema_name()),
        }
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    fn is_relation(&self) -> bool {
        matches!(self.content_type, ContentType::Assignment | ContentType::Group)
    }

    /// Series types keep one record per timestamp
    pub fn keeps_history(&self) -> bool {
        self.content_type.is_time_series() && !self.is_relation()
    }
}

impl EntityPolicy<ContentEntity> for ContentPolicy {
    type Index = ();

    fn name(&self) -> &str {
        &self.name
    }

    fn identity(&self, entity: &ContentEntity) -> String {
        match entity {
            ContentEntity::Assignment(a) => hash_key(&format!("{}:{}", a.assignee_uuid, a.member_uuid)),
            other => other.entity_uuid(),
        }
    }

    fn keys(&self, entity: &ContentEntity) -> Vec<String> {
        let mut keys = vec![entity.object_uuid().to_string()];
        if self.is_relation() {
            if let Some(member) = entity.related_object_uuid() {
                keys.push(member_key(member));
            }
        }
        keys
    }

    fn publish_compare(&self, new: &ContentEntity, existing: &ContentEntity) -> bool {
        match self.content_type {
            ContentType::Event | ContentType::Observation | ContentType::State => {
                new.timestamp() > existing.timestamp()
            }
            ContentType::Number => new.created() >= existing.created(),
            // a removal may carry the add record's `created`; any change at the same
            // time still lands
            ContentType::Assignment | ContentType::Group => {
                fingerprint(new) != fingerprint(existing) && new.created() >= existing.created()
            }
            _ => new.created() > existing.created(),
        }
    }

    fn freshness(&self, entity: &ContentEntity) -> i64 {
        if self.content_type.is_time_series() {
            entity.timestamp().max(entity.created())
        } else {
            entity.created()
        }
    }
}

/// Driver for a single content type
pub struct ContentDriver {
    driver: MemoryEntityDriver<ContentEntity, ContentPolicy>,
}

impl Deref for ContentDriver {
    type Target = MemoryEntityDriver<ContentEntity, ContentPolicy>;

    fn deref(&self) -> &Self::Target {
        &self.driver
    }
}

impl ContentDriver {
    pub fn new(content_type: ContentType, config: DriverConfig) -> Self {
        Self {
            driver: MemoryEntityDriver::new(ContentPolicy::new(content_type), config),
        }
    }

    pub fn from_driver(driver: MemoryEntityDriver<ContentEntity, ContentPolicy>) -> Self {
        Self { driver }
    }

    pub fn content_type(&self) -> ContentType {
        self.driver.policy().content_type()
    }

    /// Publish, dropping records of another content type
    pub async fn publish(&self, entities: Vec<ContentEntity>) -> Result<Vec<PublishResult>, DriverError> {
        let content_type = self.content_type();
        let total = entities.len();
        let (matching, positions): (Vec<_>, Vec<_>) = entities
            .into_iter()
            .enumerate()
            .filter_map(|(i, e)| {
                if e.content_type() == content_type {
                    Some((e, i))
                } else {
                    tracing::warn!(
                        "{}: dropping {} record",
                        self.driver.name(),
                        e.content_type()
                    );
                    None
                }
            })
            .unzip();

        let policy = self.driver.policy();
        let touched: BTreeSet<String> = if policy.keeps_history() {
            matching.iter().map(|e| e.object_uuid().to_string()).collect()
        } else {
            BTreeSet::new()
        };

        let stored = self.driver.publish(matching).await?;

        if !touched.is_empty() {
            let limit = self.driver.config().history_limit;
            let evicted: usize = self
                .driver
                .with_state(|state| {
                    touched
                        .iter()
                        .map(|key| state.trim_key(policy, key, limit, |e| e.timestamp()))
                        .sum()
                })
                .await?;
            if evicted > 0 {
                tracing::debug!("{}: evicted {} record(s) past the history limit", self.driver.name(), evicted);
            }
        }

        let mut results = vec![PublishResult::Dropped; total];
        for (position, result) in positions.into_iter().zip(stored) {
            results[position] = result;
        }
        Ok(results)
    }

    /// Newest record per object key
    pub async fn latest(&self, keys: &[String]) -> Result<Vec<EntityResult<ContentEntity>>, DriverError> {
        let results = self.driver.query(keys).await?;
        Ok(results
            .into_iter()
            .zip(keys)
            .map(|(result, key)| {
                result.and_then(|entities| {
                    entities
                        .into_iter()
                        .filter(|e| e.object_uuid() == key)
                        .max_by_key(|e| (e.timestamp(), e.created()))
                        .map(EntityResult::Ok)
                        .unwrap_or(EntityResult::NotFound)
                })
            })
            .collect())
    }

    /// Records per key with `start <= timestamp < stop`, ordered and paged
    pub async fn query_range(
        &self,
        keys: &[String],
        start: i64,
        stop: i64,
        skip: u64,
        take: u64,
        order: SortOrder,
    ) -> Result<Vec<EntityResult<Vec<ContentEntity>>>, DriverError> {
        let results = self.driver.query(keys).await?;
        Ok(results
            .into_iter()
            .zip(keys)
            .map(|(result, key)| {
                result.map(|entities| {
                    let mut in_range: Vec<ContentEntity> = entities
                        .into_iter()
                        .filter(|e| e.object_uuid() == key)
                        .filter(|e| e.timestamp() >= start && e.timestamp() < stop)
                        .collect();
                    in_range.sort_by_key(|e| e.timestamp());
                    if order == SortOrder::Descending {
                        in_range.reverse();
                    }
                    in_range
                        .into_iter()
                        .skip(usize::try_from(skip).unwrap_or(usize::MAX))
                        .take(usize::try_from(take).unwrap_or(usize::MAX))
                        .collect()
                })
            })
            .collect())
    }

    /// In-force relations owned by each assignee (or group)
    pub async fn current_by_assignee(
        &self,
        assignee_uuids: &[String],
    ) -> Result<Vec<EntityResult<Vec<ContentEntity>>>, DriverError> {
        let results = self.driver.query(assignee_uuids).await?;
        Ok(results
            .into_iter()
            .zip(assignee_uuids)
            .map(|(result, key)| {
                result.map(|entities| {
                    entities
                        .into_iter()
                        .filter(|e| e.object_uuid() == key && is_in_force(e))
                        .collect()
                })
            })
            .collect())
    }

    /// In-force relations naming each uuid as member
    pub async fn current_by_member(
        &self,
        member_uuids: &[String],
    ) -> Result<Vec<EntityResult<Vec<ContentEntity>>>, DriverError> {
        let keys: Vec<String> = member_uuids.iter().map(|m| member_key(m)).collect();
        let results = self.driver.query(&keys).await?;
        Ok(results
            .into_iter()
            .zip(member_uuids)
            .map(|(result, member)| {
                result.map(|entities| {
                    entities
                        .into_iter()
                        .filter(|e| e.related_object_uuid() == Some(member.as_str()) && is_in_force(e))
                        .collect()
                })
            })
            .collect())
    }
}

fn is_in_force(entity: &ContentEntity) -> bool {
    match entity {
        ContentEntity::Assignment(a) => a.is_current(),
        _ => true,
    }
}

/// One driver per non-directory content type
pub struct ContentDrivers {
    drivers: HashMap<ContentType, ContentDriver>,
}

impl ContentDrivers {
    pub fn new(config: DriverConfig) -> Self {
        let drivers = ContentType::ALL
            .iter()
            .filter(|ct| !ct.is_directory())
            .map(|ct| (*ct, ContentDriver::new(*ct, config.clone())))
            .collect();
        Self { drivers }
    }

    pub fn get(&self, content_type: ContentType) -> Option<&ContentDriver> {
        self.drivers.get(&content_type)
    }

    /// Route records to their type's driver; outcomes are parallel to `entities`
    pub async fn publish(&self, entities: Vec<ContentEntity>) -> Result<Vec<PublishResult>, DriverError> {
        let mut grouped: HashMap<ContentType, (Vec<usize>, Vec<ContentEntity>)> = HashMap::new();
        let total = entities.len();
        for (position, entity) in entities.into_iter().enumerate() {
            let slot = grouped.entry(entity.content_type()).or_default();
            slot.0.push(position);
            slot.1.push(entity);
        }

        let mut results = vec![PublishResult::Dropped; total];
        for (content_type, (positions, batch)) in grouped {
            let Some(driver) = self.get(content_type) else {
                continue;
            };
            let stored = driver.publish(batch).await?;
            for (position, result) in positions.into_iter().zip(stored) {
                results[position] = result;
            }
        }
        Ok(results)
    }

    pub async fn dispose(&self) {
        for driver in self.drivers.values() {
            driver.dispose().await;
        }
    }
}
