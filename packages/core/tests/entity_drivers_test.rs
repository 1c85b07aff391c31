//! Integration tests for the memory entity drivers
//!
//! Tests cover:
//! - Publish comparison for objects and series content
//! - Negative cache marks racing with publishes
//! - Assignment history vs current views
//! - Series history limits
//! - Object adjacency invalidation on delete
//! - Configuration files

use anyhow::Result;
use std::io::Write;
use tempfile::NamedTempFile;
use trakhound_core::drivers::{ContentDrivers, EmptyRequest, ObjectDriver, PublishResult};
use trakhound_core::{
    AssignmentEntity, ContentEntity, ContentType, DriverConfig, ObjectEntity, ObjectQueryResult, StateEntity,
    TrakHoundConfig,
};

fn object(path: &str, content_type: ContentType, created: i64) -> ObjectEntity {
    ObjectEntity::new("plant", path, content_type, created).unwrap()
}

fn keys(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

// =========================================================================
// Publish Comparison Tests
// =========================================================================

#[tokio::test]
async fn test_object_republish_needs_newer_created_and_priority() -> Result<()> {
    let driver = ObjectDriver::new(DriverConfig::default());
    let original = object("/area1", ContentType::Directory, 100).with_priority(5);

    assert_eq!(driver.publish(vec![original.clone()]).await?, vec![PublishResult::Stored]);

    let lower_priority = object("/area1", ContentType::Directory, 200).with_priority(1);
    let same_created = object("/area1", ContentType::Directory, 100).with_priority(9);
    let results = driver.publish(vec![lower_priority, same_created]).await?;
    assert_eq!(results, vec![PublishResult::Dropped, PublishResult::Dropped]);

    let stored = driver.query(&[original.uuid.clone()]).await?;
    assert_eq!(stored[0].as_ok(), Some(&vec![original]));
    Ok(())
}

#[tokio::test]
async fn test_state_history_is_kept_per_timestamp() -> Result<()> {
    let drivers = ContentDrivers::new(DriverConfig::default());
    drivers
        .publish(vec![
            ContentEntity::State(StateEntity::new("m1", "IDLE", 50)),
            ContentEntity::State(StateEntity::new("m1", "RUNNING", 100)),
        ])
        .await?;

    let Some(states) = drivers.get(ContentType::State) else {
        anyhow::bail!("state driver missing");
    };
    let latest = states.latest(&keys(&["m1"])).await?;
    match latest[0].as_ok() {
        Some(ContentEntity::State(state)) => assert_eq!(state.definition_uuid, "RUNNING"),
        other => panic!("unexpected {:?}", other),
    }

    let history = states
        .query_range(&keys(&["m1"]), 0, 75, 0, 10, Default::default())
        .await?;
    assert_eq!(history[0].as_ok().map(Vec::len), Some(1));
    Ok(())
}

// =========================================================================
// Negative Cache Tests
// =========================================================================

#[tokio::test]
async fn test_stale_empty_mark_loses_to_publish() -> Result<()> {
    let driver = ObjectDriver::new(DriverConfig::default());
    let area = object("/area1", ContentType::Directory, 150);

    assert_eq!(driver.empty(&[EmptyRequest::new(area.uuid.clone(), 100)]).await?, vec![true]);
    assert!(driver.query(&[area.uuid.clone()]).await?[0].is_empty());

    driver.publish(vec![area.clone()]).await?;
    assert_eq!(driver.empty(&[EmptyRequest::new(area.uuid.clone(), 120)]).await?, vec![false]);
    assert!(driver.query(&[area.uuid.clone()]).await?[0].is_ok());
    Ok(())
}

// =========================================================================
// Assignment Tests
// =========================================================================

#[tokio::test]
async fn test_removed_assignment_leaves_history_only() -> Result<()> {
    let drivers = ContentDrivers::new(DriverConfig::default());
    let added = AssignmentEntity::new("A", "B", 100);
    let removed = added.clone().removed_at(500, 500);

    drivers.publish(vec![ContentEntity::Assignment(added)]).await?;
    drivers.publish(vec![ContentEntity::Assignment(removed)]).await?;

    let Some(assignments) = drivers.get(ContentType::Assignment) else {
        anyhow::bail!("assignment driver missing");
    };
    let bucket = assignments.query(&keys(&["A"])).await?;
    assert_eq!(bucket[0].as_ok().map(Vec::len), Some(1));

    let current = assignments.current_by_assignee(&keys(&["A"])).await?;
    assert_eq!(current[0].as_ok().map(Vec::len), Some(0));
    let by_member = assignments.current_by_member(&keys(&["B"])).await?;
    assert_eq!(by_member[0].as_ok().map(Vec::len), Some(0));
    Ok(())
}

#[tokio::test]
async fn test_assignment_removed_with_same_created() -> Result<()> {
    let drivers = ContentDrivers::new(DriverConfig::default());
    let added = AssignmentEntity::new("A", "B", 100);
    let mut removed = added.clone();
    removed.remove_timestamp = 500;

    drivers.publish(vec![ContentEntity::Assignment(added)]).await?;
    let results = drivers.publish(vec![ContentEntity::Assignment(removed)]).await?;
    assert_eq!(results, vec![PublishResult::Stored]);

    let Some(assignments) = drivers.get(ContentType::Assignment) else {
        anyhow::bail!("assignment driver missing");
    };
    let current = assignments.current_by_assignee(&keys(&["A"])).await?;
    assert_eq!(current[0].as_ok().map(Vec::len), Some(0));
    Ok(())
}

// =========================================================================
// History Limit Tests
// =========================================================================

#[tokio::test]
async fn test_series_history_is_capped() -> Result<()> {
    let config = DriverConfig {
        history_limit: 2,
        ..Default::default()
    };
    let drivers = ContentDrivers::new(config);
    for timestamp in [100, 200, 300] {
        drivers
            .publish(vec![ContentEntity::State(StateEntity::new("m1", "RUNNING", timestamp))])
            .await?;
    }

    let Some(states) = drivers.get(ContentType::State) else {
        anyhow::bail!("state driver missing");
    };
    let history = states
        .query_range(&keys(&["m1"]), 0, 1_000, 0, 10, Default::default())
        .await?;
    let timestamps: Vec<i64> = history[0]
        .as_ok()
        .map(|rows| rows.iter().map(|e| e.timestamp()).collect())
        .unwrap_or_default();
    assert_eq!(timestamps.len(), 2);
    assert!(!timestamps.contains(&100));
    Ok(())
}

// =========================================================================
// Object Index Tests
// =========================================================================

#[tokio::test]
async fn test_deleted_object_leaves_no_adjacency() -> Result<()> {
    let driver = ObjectDriver::new(DriverConfig::default());
    let area = object("/area1", ContentType::Directory, 1);
    let m1 = object("/area1/m1", ContentType::State, 1);
    let m2 = object("/area1/m2", ContentType::State, 1);

    driver.publish(vec![area.clone(), m1.clone(), m2.clone()]).await?;
    driver
        .store_parents(&[
            ObjectQueryResult::relation(Some(area.uuid.as_str()), Some(m1.uuid.clone())),
            ObjectQueryResult::relation(Some(area.uuid.as_str()), Some(m2.uuid.clone())),
        ])
        .await?;

    driver.delete(&[m2.uuid.clone()]).await?;

    let children = driver.query_by_parent_uuid(&[Some(area.uuid.clone())]).await?;
    let uuids: Vec<String> = children[0]
        .as_ok()
        .map(|rows| rows.iter().filter_map(|r| r.uuid.clone()).collect())
        .unwrap_or_default();
    assert!(!uuids.contains(&m2.uuid));
    Ok(())
}

// =========================================================================
// Configuration Tests
// =========================================================================

#[tokio::test]
async fn test_config_file_with_partial_fields() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, r#"{{ "engine": {{ "maxConcurrentFetches": 2 }} }}"#)?;

    let config = TrakHoundConfig::from_json_file(file.path())?;
    assert_eq!(config.engine.max_concurrent_fetches, 2);
    assert_eq!(config.engine.default_take, 1000);
    assert_eq!(config.driver, DriverConfig::default());
    Ok(())
}

#[tokio::test]
async fn test_invalid_config_file_is_rejected() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, r#"{{ "engine": {{ "defaultTake": 0 }} }}"#)?;

    assert!(TrakHoundConfig::from_json_file(file.path()).is_err());
    Ok(())
}
