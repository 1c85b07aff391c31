//! Local execution against an [`EntityCollection`] snapshot

use crate::config::EngineConfig;
use crate::engine::assembly::{self, Cell, Leaf, LeafResults};
use crate::engine::expression::{evaluate_local, parse_expressions};
use crate::engine::results::{objects_result, QueryResult};
use crate::models::collection::EntityCollection;
use crate::models::object::ObjectEntity;
use crate::models::time::Clock;
use crate::query::scope::{QueryScope, VariableKind};
use crate::query::statement::{SelectType, Statement};
use tracing::debug;

/// Runs statements of one scope over a snapshot
pub struct LocalExecutor<'a> {
    config: &'a EngineConfig,
    clock: &'a dyn Clock,
    scope: &'a QueryScope,
    collection: &'a EntityCollection,
}

impl<'a> LocalExecutor<'a> {
    pub fn new(
        config: &'a EngineConfig,
        clock: &'a dyn Clock,
        scope: &'a QueryScope,
        collection: &'a EntityCollection,
    ) -> Self {
        Self {
            config,
            clock,
            scope,
            collection,
        }
    }

    pub fn execute(&self, statement: &Statement) -> Vec<QueryResult> {
        if statement.target.is_none() {
            return Vec::new();
        }
        let targets = self.targets(statement, 0);
        debug!("Local statement matched {} targets", targets.len());

        let window = statement.time_window(self.clock);
        match statement.select_type() {
            SelectType::TargetObject => vec![objects_result(&targets, true)],
            SelectType::Target => assembly::target_results(&targets, self.collection, window, statement),
            SelectType::Content | SelectType::Property => {
                let specs = assembly::select_specs(statement, self.scope);
                let cells: Vec<Vec<Cell>> = targets
                    .iter()
                    .map(|target| {
                        specs
                            .iter()
                            .flat_map(|spec| {
                                let matched = if spec.is_wildcard() {
                                    self.collection.children(&target.uuid).into_iter().cloned().collect()
                                } else {
                                    evaluate_local(
                                        self.collection,
                                        &parse_expressions(&spec.expression),
                                        std::slice::from_ref(target),
                                    )
                                };
                                assembly::cells(spec, &matched)
                            })
                            .collect()
                    })
                    .collect();
                vec![assembly::content_table(&targets, &cells, self.collection, window, statement)]
            }
        }
    }

    /// Filtered and paged targets of a statement; sub-queries resolve recursively
    fn targets(&self, statement: &Statement, depth: usize) -> Vec<ObjectEntity> {
        let Some(target) = statement.target.as_deref() else {
            return Vec::new();
        };

        let (candidates, target_expression) = match self.scope.variable(target).map(|v| v.kind) {
            Some(VariableKind::Query) => match self.scope.sub_query(target) {
                Some(inner) if depth < MAX_SUB_QUERY_DEPTH => (self.targets(inner, depth + 1), None),
                _ => return Vec::new(),
            },
            _ => match self.scope.value_of(target, VariableKind::Expression) {
                Some(text) => (
                    evaluate_local(self.collection, &parse_expressions(text), &[]),
                    Some(text),
                ),
                None => return Vec::new(),
            },
        };

        let leaves = assembly::leaves(statement, self.scope);
        let candidates = if assembly::reads_target_itself(&leaves) {
            let children: Vec<ObjectEntity> = candidates
                .iter()
                .filter(|c| c.content_type.is_directory())
                .flat_map(|c| self.collection.children(&c.uuid))
                .cloned()
                .collect();
            assembly::expand_directories(candidates, &children)
        } else {
            candidates
        };

        let matches = self.condition_matches(statement, &leaves, &candidates, target_expression);
        assembly::filter_targets(candidates, matches.as_ref(), statement)
    }

    fn condition_matches(
        &self,
        statement: &Statement,
        leaves: &[Leaf],
        targets: &[ObjectEntity],
        target_expression: Option<&str>,
    ) -> Option<std::collections::HashSet<String>> {
        let mut results = LeafResults::new();
        for leaf in leaves {
            let indexed = target_expression
                .filter(|_| self.config.index_lookup)
                .map(|text| assembly::index_key(text, leaf))
                .filter(|key| self.collection.index_exists(key));

            let matched = match indexed {
                Some(key) => assembly::index_matches(leaf, self.collection.index_entries(&key)),
                None => {
                    let expressions = parse_expressions(&leaf.path);
                    let condition_objects: Vec<(String, Vec<ObjectEntity>)> = targets
                        .iter()
                        .map(|t| {
                            (
                                t.uuid.clone(),
                                evaluate_local(self.collection, &expressions, std::slice::from_ref(t)),
                            )
                        })
                        .collect();
                    assembly::scan_matches(leaf, &condition_objects, self.collection)
                }
            };
            results.insert((leaf.group_id.clone(), leaf.index), matched);
        }
        assembly::combine_groups(statement, &results)
    }
}

/// Nesting limit for `from (select ...)` targets
pub(crate) const MAX_SUB_QUERY_DEPTH: usize = 8;
