//! Query Execution Engine
//!
//! A statement runs against a [`Source`]: a remote [`EntitiesClient`] (async, content
//! fetched per type concurrently) or a local [`EntityCollection`] snapshot (sync).
//! Both paths share target filtering, condition combination and result assembly, so
//! they return the same results for the same data.
//!
//! ```ignore
//! let engine = QueryEngine::new(EngineConfig::default());
//! let results = engine.query_local("select > from [plant:/area1/*]", &snapshot);
//! ```

mod assembly;
pub mod client;
pub mod driver_client;
pub mod expression;
pub mod local;
pub mod operators;
pub mod remote;
pub mod results;

pub use client::{EntitiesClient, RangeRequest};
pub use driver_client::DriverClient;
pub use expression::{parse_expressions, PathExpression};
pub use local::LocalExecutor;
pub use remote::RemoteExecutor;
pub use results::{ColumnDataType, QueryColumn, QueryResult};

use crate::config::EngineConfig;
use crate::models::collection::EntityCollection;
use crate::models::time::{Clock, SystemClock};
use crate::query::scope::{QueryScope, VariableKind};
use crate::query::statement::Statement;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Where a statement reads its entities from
#[derive(Clone, Copy)]
pub enum Source<'a> {
    Remote(&'a dyn EntitiesClient),
    Local(&'a EntityCollection),
}

pub struct QueryEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
}

impl QueryEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Engine whose relative time bounds resolve against `clock`
    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute one statement of `scope`
    pub async fn execute(
        &self,
        scope: &QueryScope,
        statement: &Statement,
        source: Source<'_>,
        cancel: CancellationToken,
    ) -> Vec<QueryResult> {
        match source {
            Source::Local(collection) => self.execute_local(scope, statement, collection),
            Source::Remote(client) => {
                RemoteExecutor::new(&self.config, self.clock.as_ref(), scope, client, cancel)
                    .execute(statement)
                    .await
            }
        }
    }

    pub fn execute_local(
        &self,
        scope: &QueryScope,
        statement: &Statement,
        collection: &EntityCollection,
    ) -> Vec<QueryResult> {
        LocalExecutor::new(&self.config, self.clock.as_ref(), scope, collection).execute(statement)
    }

    /// Parse `text` and run every statement against a snapshot, results in order
    pub fn query_local(&self, text: &str, collection: &EntityCollection) -> Vec<QueryResult> {
        let scope = QueryScope::create(text);
        let executor = LocalExecutor::new(&self.config, self.clock.as_ref(), &scope, collection);
        let results: Vec<QueryResult> = scope
            .statements()
            .iter()
            .flat_map(|statement| executor.execute(statement))
            .collect();

        tracing::info!(
            "Executed {} statement(s) locally: {} result(s)",
            scope.statements().len(),
            results.len()
        );
        results
    }

    /// Parse `text` and run every statement through a client, results in order
    pub async fn query_remote(
        &self,
        text: &str,
        client: &dyn EntitiesClient,
        cancel: CancellationToken,
    ) -> Vec<QueryResult> {
        let scope = QueryScope::create(text);
        let executor = RemoteExecutor::new(&self.config, self.clock.as_ref(), &scope, client, cancel);

        let mut results = Vec::new();
        for statement in scope.statements() {
            results.extend(executor.execute(statement).await);
        }

        tracing::info!(
            "Executed {} statement(s) remotely: {} result(s)",
            scope.statements().len(),
            results.len()
        );
        results
    }
}

/// Absolute paths the statements of `scope` read from
///
/// Relative select and condition paths are resolved under their statement's target;
/// sub-query targets contribute the paths of the inner statement.
pub fn subscription_expressions(scope: &QueryScope) -> Vec<String> {
    let mut found = BTreeSet::new();
    for statement in scope.statements() {
        collect_expressions(scope, statement, &mut found, 0);
    }
    found.into_iter().collect()
}

fn collect_expressions(scope: &QueryScope, statement: &Statement, found: &mut BTreeSet<String>, depth: usize) {
    let Some(target) = statement.target.as_deref() else {
        return;
    };

    if let Some(inner) = scope.sub_query(target) {
        if depth < local::MAX_SUB_QUERY_DEPTH {
            collect_expressions(scope, inner, found, depth + 1);
        }
        return;
    }

    let Some(target_text) = scope.value_of(target, VariableKind::Expression) else {
        return;
    };

    let mut relative: Vec<String> = assembly::select_specs(statement, scope)
        .into_iter()
        .filter(|s| !s.is_wildcard())
        .map(|s| s.expression)
        .collect();
    relative.extend(assembly::leaves(statement, scope).into_iter().map(|l| l.path));

    for target_expression in target_text.split(';').map(str::trim).filter(|t| !t.is_empty()) {
        found.insert(target_expression.to_string());
        for expression in &relative {
            let combined = if PathExpression::parse(expression).anchored {
                expression.clone()
            } else {
                expression::combine(target_expression, expression)
            };
            found.insert(combined);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_expressions() {
        let scope = QueryScope::create(
            "select [status], [plant:/meta/version] from [plant:/area1/*] where state(.) = 'RUNNING'",
        );
        let expressions = subscription_expressions(&scope);
        assert_eq!(
            expressions,
            vec![
                "plant:/area1/*".to_string(),
                "plant:/area1/*/status".to_string(),
                "plant:/meta/version".to_string(),
            ]
        );
    }

    #[test]
    fn test_subscription_expressions_follow_sub_queries() {
        let scope = QueryScope::create("select > from (select >> from [plant:/area1/*] where [speed] > 5)");
        assert_eq!(
            subscription_expressions(&scope),
            vec!["plant:/area1/*".to_string(), "plant:/area1/*/speed".to_string()]
        );
    }
}
