//! Remote execution through an [`EntitiesClient`]
//!
//! Content is fetched per content type, with at most
//! [`EngineConfig::max_concurrent_fetches`] requests in flight. A failed client call is
//! logged and read as "no data"; cancellation aborts the statement with no results.

use crate::config::EngineConfig;
use crate::engine::assembly::{self, Cell, Leaf, LeafResults};
use crate::engine::client::{EntitiesClient, RangeRequest};
use crate::engine::expression::{evaluate_remote, parse_expressions, PathExpression};
use crate::engine::local::MAX_SUB_QUERY_DEPTH;
use crate::engine::results::{objects_result, QueryResult};
use crate::error::ClientError;
use crate::models::collection::EntityCollection;
use crate::models::content::ContentEntity;
use crate::models::content_type::ContentType;
use crate::models::object::ObjectEntity;
use crate::models::time::Clock;
use crate::query::scope::{QueryScope, VariableKind};
use crate::query::statement::{SelectType, Statement};
use futures::future::BoxFuture;
use futures::{stream, FutureExt, StreamExt, TryStreamExt};
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub struct RemoteExecutor<'a> {
    config: &'a EngineConfig,
    clock: &'a dyn Clock,
    scope: &'a QueryScope,
    client: &'a dyn EntitiesClient,
    cancel: CancellationToken,
    execution_id: Uuid,
}

impl<'a> RemoteExecutor<'a> {
    pub fn new(
        config: &'a EngineConfig,
        clock: &'a dyn Clock,
        scope: &'a QueryScope,
        client: &'a dyn EntitiesClient,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            clock,
            scope,
            client,
            cancel,
            execution_id: Uuid::new_v4(),
        }
    }

    pub async fn execute(&self, statement: &Statement) -> Vec<QueryResult> {
        self.execute_with_entities(statement).await.0
    }

    /// Results plus every object and content record fetched to build them
    pub async fn execute_with_entities(&self, statement: &Statement) -> (Vec<QueryResult>, EntityCollection) {
        if statement.target.is_none() {
            return (Vec::new(), EntityCollection::new());
        }
        tracing::debug!("{}: executing '{}' statement", self.execution_id, statement.command);

        match self.run(statement).await {
            Ok(output) => output,
            Err(ClientError::Cancelled) => {
                tracing::info!("{}: execution cancelled", self.execution_id);
                (Vec::new(), EntityCollection::new())
            }
            Err(err) => {
                tracing::warn!("{}: execution failed: {}", self.execution_id, err);
                (Vec::new(), EntityCollection::new())
            }
        }
    }

    /// Await a client call unless cancelled; failures become `T::default()`
    async fn call<T: Default>(
        &self,
        operation: &str,
        future: impl Future<Output = Result<T, ClientError>>,
    ) -> Result<T, ClientError> {
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ClientError::Cancelled),
            result = future => result,
        };

        match result {
            Ok(value) => Ok(value),
            Err(ClientError::Cancelled) => Err(ClientError::Cancelled),
            Err(err) => {
                tracing::warn!("{}: {} failed, treating as no data: {}", self.execution_id, operation, err);
                Ok(T::default())
            }
        }
    }

    async fn run(&self, statement: &Statement) -> Result<(Vec<QueryResult>, EntityCollection), ClientError> {
        let targets = self.targets(statement, 0).await?;
        tracing::debug!("{}: {} targets", self.execution_id, targets.len());

        let window = statement.time_window(self.clock);
        let mut entities = EntityCollection::new();
        entities.add_objects(targets.iter().cloned());

        let results = match statement.select_type() {
            SelectType::TargetObject => vec![objects_result(&targets, true)],
            SelectType::Target => {
                let plan = assembly::fetch_plan(targets.iter().map(|t| (t, None)));
                self.fetch(&mut entities, plan, window, statement).await?;
                assembly::target_results(&targets, &entities, window, statement)
            }
            SelectType::Content | SelectType::Property => {
                let specs = assembly::select_specs(statement, self.scope);
                let mut target_cells: Vec<Vec<Cell>> = Vec::with_capacity(targets.len());
                for target in &targets {
                    let mut cells = Vec::new();
                    for spec in &specs {
                        let matched = if spec.is_wildcard() {
                            self.call(
                                "objects.children",
                                self.client.query_by_parent_uuid(&[Some(target.uuid.clone())]),
                            )
                            .await?
                        } else {
                            self.evaluate(&parse_expressions(&spec.expression), std::slice::from_ref(target))
                                .await?
                        };
                        cells.extend(assembly::cells(spec, &matched));
                    }
                    target_cells.push(cells);
                }

                entities.add_objects(target_cells.iter().flatten().map(|c| c.object.clone()));
                let plan = assembly::fetch_plan(target_cells.iter().flatten().map(|c| (&c.object, None)));
                self.fetch(&mut entities, plan, window, statement).await?;
                vec![assembly::content_table(&targets, &target_cells, &entities, window, statement)]
            }
        };
        Ok((results, entities))
    }

    async fn evaluate(
        &self,
        expressions: &[PathExpression],
        parents: &[ObjectEntity],
    ) -> Result<Vec<ObjectEntity>, ClientError> {
        self.call(
            "objects.evaluate",
            evaluate_remote(self.client, expressions, parents, self.config.default_take),
        )
        .await
    }

    fn targets<'s>(
        &'s self,
        statement: &'s Statement,
        depth: usize,
    ) -> BoxFuture<'s, Result<Vec<ObjectEntity>, ClientError>> {
        async move {
            let Some(target) = statement.target.as_deref() else {
                return Ok(Vec::new());
            };

            let (candidates, target_expression) = match self.scope.variable(target).map(|v| v.kind) {
                Some(VariableKind::Query) => match self.scope.sub_query(target) {
                    Some(inner) if depth < MAX_SUB_QUERY_DEPTH => (self.targets(inner, depth + 1).await?, None),
                    _ => return Ok(Vec::new()),
                },
                _ => match self.scope.value_of(target, VariableKind::Expression) {
                    Some(text) => (self.evaluate(&parse_expressions(text), &[]).await?, Some(text)),
                    None => return Ok(Vec::new()),
                },
            };

            let leaves = assembly::leaves(statement, self.scope);
            let candidates = if assembly::reads_target_itself(&leaves) {
                let directories: Vec<Option<String>> = candidates
                    .iter()
                    .filter(|c| c.content_type.is_directory())
                    .map(|c| Some(c.uuid.clone()))
                    .collect();
                let children = if directories.is_empty() {
                    Vec::new()
                } else {
                    self.call("objects.children", self.client.query_by_parent_uuid(&directories))
                        .await?
                };
                assembly::expand_directories(candidates, &children)
            } else {
                candidates
            };

            let matches = self
                .condition_matches(statement, &leaves, &candidates, target_expression)
                .await?;
            Ok(assembly::filter_targets(candidates, matches.as_ref(), statement))
        }
        .boxed()
    }

    async fn condition_matches(
        &self,
        statement: &Statement,
        leaves: &[Leaf],
        targets: &[ObjectEntity],
        target_expression: Option<&str>,
    ) -> Result<Option<HashSet<String>>, ClientError> {
        let mut results = LeafResults::new();
        let mut scans = Vec::new();

        for leaf in leaves {
            if let Some(text) = target_expression.filter(|_| self.config.index_lookup) {
                let key = assembly::index_key(text, leaf);
                if self.call("index.exists", self.client.index_exists(&key)).await? {
                    let matched = self
                        .call(
                            "index.query",
                            self.client.query_index(&key, leaf.operator, &leaf.operand),
                        )
                        .await?;
                    results.insert((leaf.group_id.clone(), leaf.index), matched.into_iter().collect());
                    continue;
                }
            }

            let expressions = parse_expressions(&leaf.path);
            let mut fetches = Vec::with_capacity(targets.len());
            for target in targets {
                let expressions = &expressions;
                fetches.push(async move {
                    let objects = self.evaluate(expressions, std::slice::from_ref(target)).await?;
                    Ok::<_, ClientError>((target.uuid.clone(), objects))
                });
            }
            let condition_objects: Vec<(String, Vec<ObjectEntity>)> = stream::iter(fetches)
                .buffered(self.config.max_concurrent_fetches.max(1))
                .try_collect()
                .await?;
            scans.push((leaf, condition_objects));
        }

        if !scans.is_empty() {
            // one batch per content type across every scanned condition
            let plan = assembly::fetch_plan(scans.iter().flat_map(|(leaf, per_target)| {
                per_target
                    .iter()
                    .flat_map(|(_, objects)| objects.iter())
                    .map(move |o| (o, leaf.content_type))
            }));
            let mut collection = EntityCollection::new();
            self.fetch_current(&mut collection, plan).await?;

            for (leaf, per_target) in &scans {
                results.insert(
                    (leaf.group_id.clone(), leaf.index),
                    assembly::scan_matches(leaf, per_target, &collection),
                );
            }
        }
        Ok(assembly::combine_groups(statement, &results))
    }

    async fn fetch_current(
        &self,
        collection: &mut EntityCollection,
        plan: BTreeMap<ContentType, Vec<String>>,
    ) -> Result<(), ClientError> {
        let batches: Vec<Vec<ContentEntity>> = stream::iter(plan)
            .map(|(content_type, uuids)| async move {
                self.call("content.current", self.client.current(content_type, &uuids))
                    .await
            })
            .buffer_unordered(self.config.max_concurrent_fetches.max(1))
            .try_collect()
            .await?;
        collection.add_contents(batches.into_iter().flatten());
        Ok(())
    }

    /// Content for result rows, plus the objects on the other side of relations
    async fn fetch(
        &self,
        collection: &mut EntityCollection,
        plan: BTreeMap<ContentType, Vec<String>>,
        window: Option<(i64, i64)>,
        statement: &Statement,
    ) -> Result<(), ClientError> {
        let batches: Vec<Vec<ContentEntity>> = stream::iter(plan)
            .map(|(content_type, uuids)| async move {
                match window {
                    Some((start, stop)) if content_type.is_time_series() => {
                        let range = RangeRequest {
                            start,
                            stop,
                            skip: 0,
                            take: statement.take,
                            order: statement.order,
                        };
                        self.call("content.range", self.client.range(content_type, &uuids, range))
                            .await
                    }
                    _ => {
                        self.call("content.current", self.client.current(content_type, &uuids))
                            .await
                    }
                }
            })
            .buffer_unordered(self.config.max_concurrent_fetches.max(1))
            .try_collect()
            .await?;

        let related: Vec<String> = batches
            .iter()
            .flatten()
            .filter(|e| {
                matches!(
                    e.content_type(),
                    ContentType::Assignment | ContentType::Event | ContentType::Group | ContentType::Reference
                )
            })
            .filter_map(ContentEntity::related_object_uuid)
            .filter(|uuid| collection.object(uuid).is_none())
            .map(str::to_string)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        collection.add_contents(batches.into_iter().flatten());
        if !related.is_empty() {
            let objects = self.call("objects.read", self.client.read_objects(&related)).await?;
            collection.add_objects(objects);
        }
        Ok(())
    }
}
