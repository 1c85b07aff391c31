//! Statement pieces shared by local and remote execution
//!
//! Both executors gather data their own way (snapshot lookups or client calls) and then
//! hand it to the functions here, so condition logic and result shapes cannot drift
//! between the two paths.

use crate::engine::expression;
use crate::engine::operators;
use crate::engine::results::{
    content_result, default_text, default_value, objects_result, property_value, value_data_type,
    ColumnDataType, QueryColumn, QueryResult, CONTENT_SCHEMA,
};
use crate::models::collection::{EntityCollection, IndexEntry};
use crate::models::content::ContentEntity;
use crate::models::content_type::ContentType;
use crate::models::object::ObjectEntity;
use crate::models::path;
use crate::models::request::SortOrder;
use crate::query::functions;
use crate::query::scope::{QueryScope, VariableKind};
use crate::query::statement::{GroupOperator, Operator, SelectType, Statement};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Uuid sets keyed by `(group id, condition index)`
pub(crate) type LeafResults = HashMap<(String, usize), HashSet<String>>;

/// One non-group condition, with its operands resolved from the scope
#[derive(Debug, Clone)]
pub(crate) struct Leaf {
    pub group_id: String,
    pub index: usize,
    /// Condition path relative to each target (`.` is the target itself)
    pub path: String,
    /// Content type named by a function wrapper (`state(.)`)
    pub content_type: Option<ContentType>,
    pub property: Option<String>,
    pub operator: Operator,
    pub operand: String,
}

pub(crate) fn leaves(statement: &Statement, scope: &QueryScope) -> Vec<Leaf> {
    let mut leaves = Vec::new();
    for group in &statement.condition_groups {
        for (index, condition) in group.conditions.iter().enumerate() {
            if statement.group(&condition.variable).is_some() {
                continue;
            }
            let Some(expression) = scope.value(&condition.variable) else {
                continue;
            };

            let target = functions::function_target(expression);
            let target = target.trim_matches(|c| c == '[' || c == ']').trim();
            leaves.push(Leaf {
                group_id: group.id.clone(),
                index,
                path: if target.is_empty() { ".".to_string() } else { target.to_string() },
                content_type: functions::content_function(expression),
                property: condition
                    .property
                    .as_deref()
                    .and_then(|p| scope.value(p))
                    .map(str::to_string),
                operator: condition.operator,
                operand: operators::prepare_operand(scope.value(&condition.value).unwrap_or_default()),
            });
        }
    }
    leaves
}

/// Whether a condition reads the target itself (`.`)
pub(crate) fn reads_target_itself(leaves: &[Leaf]) -> bool {
    leaves.iter().any(|leaf| leaf.path == ".")
}

/// Replace directory candidates with their children, keeping candidate order
///
/// A directory carries no content, so a condition on the target itself (`state(.)`)
/// over a bare container reads the objects directly below it. `children` holds the
/// children of every directory candidate.
pub(crate) fn expand_directories(candidates: Vec<ObjectEntity>, children: &[ObjectEntity]) -> Vec<ObjectEntity> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .flat_map(|candidate| {
            if !candidate.content_type.is_directory() {
                return vec![candidate];
            }
            let mut below: Vec<ObjectEntity> = children
                .iter()
                .filter(|c| c.parent_uuid.as_deref() == Some(candidate.uuid.as_str()))
                .cloned()
                .collect();
            below.sort_by(|a, b| a.path.cmp(&b.path));
            below
        })
        .filter(|object| seen.insert(object.uuid.clone()))
        .collect()
}

/// Secondary index key of a condition path under a target expression
pub(crate) fn index_key(target_expression: &str, leaf: &Leaf) -> String {
    path::hash_key(&expression::combine(target_expression, &leaf.path))
}

/// Targets whose index entries satisfy the leaf
pub(crate) fn index_matches(leaf: &Leaf, entries: &[IndexEntry]) -> HashSet<String> {
    entries
        .iter()
        .filter(|e| operators::compare(leaf.operator, &e.value, &leaf.operand))
        .map(|e| e.target_uuid.clone())
        .collect()
}

/// Content records a condition reads from an object
pub(crate) fn condition_records<'c>(
    collection: &'c EntityCollection,
    leaf: &Leaf,
    object: &ObjectEntity,
) -> Vec<&'c ContentEntity> {
    let content_type = leaf.content_type.unwrap_or(object.content_type);
    if content_type.is_directory() {
        return Vec::new();
    }
    collection.current(&object.uuid, content_type)
}

fn value_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

/// Targets whose condition objects carry a matching value
pub(crate) fn scan_matches(
    leaf: &Leaf,
    condition_objects: &[(String, Vec<ObjectEntity>)],
    collection: &EntityCollection,
) -> HashSet<String> {
    condition_objects
        .iter()
        .filter(|(_, objects)| {
            let values: Vec<String> = objects
                .iter()
                .flat_map(|o| condition_records(collection, leaf, o))
                .filter_map(|record| match &leaf.property {
                    Some(property) => property_value(record, property).and_then(value_text),
                    None => Some(default_text(record)),
                })
                .collect();
            operators::matches(leaf.operator, &values, &leaf.operand)
        })
        .map(|(target, _)| target.clone())
        .collect()
}

/// Fold condition results into the matching target uuids; `None` when the statement
/// has no conditions
///
/// Groups compose left to right in declaration order as one flat chain: every leaf
/// condition is folded into the running set with its own group's operator, `And`
/// intersecting and `Or` taking the union. Group references add nothing themselves,
/// the referenced group's leaves were already folded where that group was declared. An
/// empty result under `And` means no target matches the statement.
pub(crate) fn combine_groups(statement: &Statement, results: &LeafResults) -> Option<HashSet<String>> {
    if !statement.has_conditions() {
        return None;
    }

    let mut running: Option<HashSet<String>> = None;
    for group in &statement.condition_groups {
        for (index, condition) in group.conditions.iter().enumerate() {
            if statement.group(&condition.variable).is_some() {
                continue;
            }

            let matched = results
                .get(&(group.id.clone(), index))
                .cloned()
                .unwrap_or_default();
            if matched.is_empty() {
                if group.operator == GroupOperator::And {
                    return Some(HashSet::new());
                }
                continue;
            }

            running = Some(match (group.operator, running) {
                (_, None) => matched,
                (GroupOperator::And, Some(acc)) => acc.intersection(&matched).cloned().collect(),
                (GroupOperator::Or, Some(acc)) => acc.union(&matched).cloned().collect(),
            });
        }
    }
    Some(running.unwrap_or_default())
}

/// Apply condition matches, then skip/take
pub(crate) fn filter_targets(
    targets: Vec<ObjectEntity>,
    matches: Option<&HashSet<String>>,
    statement: &Statement,
) -> Vec<ObjectEntity> {
    targets
        .into_iter()
        .filter(|t| matches.map_or(true, |m| m.contains(&t.uuid)))
        .skip(usize::try_from(statement.skip).unwrap_or(usize::MAX))
        .take(usize::try_from(statement.take).unwrap_or(usize::MAX))
        .collect()
}

// ===== Selects =====

/// A `*`, expression or property select item with its text resolved
#[derive(Debug, Clone)]
pub(crate) struct SelectSpec {
    pub expression: String,
    pub property: Option<String>,
    pub alias: Option<String>,
}

impl SelectSpec {
    pub fn is_wildcard(&self) -> bool {
        self.expression == "*"
    }
}

pub(crate) fn select_specs(statement: &Statement, scope: &QueryScope) -> Vec<SelectSpec> {
    let specs: Vec<SelectSpec> = statement
        .selects
        .iter()
        .filter(|s| matches!(s.select_type, SelectType::Content | SelectType::Property))
        .filter_map(|s| {
            Some(SelectSpec {
                expression: scope.value_of(&s.expression, VariableKind::Expression)?.to_string(),
                property: s.property.as_deref().and_then(|p| scope.value(p)).map(str::to_string),
                alias: s.alias.as_deref().and_then(|a| scope.value(a)).map(str::to_string),
            })
        })
        .collect();

    if specs.is_empty() {
        vec![SelectSpec {
            expression: "*".to_string(),
            property: None,
            alias: None,
        }]
    } else {
        specs
    }
}

/// One column of one target row
#[derive(Debug, Clone)]
pub(crate) struct Cell {
    pub column: String,
    pub data_type: ColumnDataType,
    pub object: ObjectEntity,
    pub property: Option<String>,
}

/// Cells a select contributes for one target, given the objects it matched
pub(crate) fn cells(spec: &SelectSpec, matched: &[ObjectEntity]) -> Vec<Cell> {
    let leaves: Vec<&ObjectEntity> = matched.iter().filter(|o| !o.content_type.is_directory()).collect();
    let single = leaves.len() == 1;

    leaves
        .into_iter()
        .map(|object| {
            let column = match (&spec.alias, &spec.property) {
                (Some(alias), _) if single => alias.clone(),
                (_, Some(property)) => format!("{}.{}", object.name(), property),
                _ => object.name().to_string(),
            };
            let data_type = match spec.property {
                Some(_) => ColumnDataType::String,
                None => value_data_type(object.content_type),
            };
            Cell {
                column,
                data_type,
                object: object.clone(),
                property: spec.property.clone(),
            }
        })
        .collect()
}

/// Records of one object for a result: the window's history or the current view
pub(crate) fn window_records<'c>(
    collection: &'c EntityCollection,
    object_uuid: &str,
    content_type: ContentType,
    window: Option<(i64, i64)>,
    statement: &Statement,
) -> Vec<&'c ContentEntity> {
    match window {
        Some((start, stop)) if content_type.is_time_series() => {
            let mut records = collection.range(object_uuid, content_type, start, stop);
            records.sort_by_key(|e| e.timestamp());
            if statement.order == SortOrder::Descending {
                records.reverse();
            }
            records.truncate(usize::try_from(statement.take).unwrap_or(usize::MAX));
            records
        }
        _ => collection.current(object_uuid, content_type),
    }
}

fn cell_value(
    collection: &EntityCollection,
    cell: &Cell,
    window: Option<(i64, i64)>,
    statement: &Statement,
) -> Value {
    let record = window_records(collection, &cell.object.uuid, cell.object.content_type, window, statement)
        .into_iter()
        .max_by_key(|e| e.timestamp());
    match (record, &cell.property) {
        (Some(record), Some(property)) => property_value(record, property).unwrap_or(Value::Null),
        (Some(record), None) => default_value(record),
        (None, _) => Value::Null,
    }
}

/// `*` / expression / property result: a row per target, a column per selected child
pub(crate) fn content_table(
    targets: &[ObjectEntity],
    target_cells: &[Vec<Cell>],
    collection: &EntityCollection,
    window: Option<(i64, i64)>,
    statement: &Statement,
) -> QueryResult {
    let mut columns: Vec<QueryColumn> = Vec::new();
    for cell in target_cells.iter().flatten() {
        if !columns.iter().any(|c| c.name == cell.column) {
            columns.push(QueryColumn {
                name: cell.column.clone(),
                data_type: cell.data_type,
            });
        }
    }

    let mut result = QueryResult::new(CONTENT_SCHEMA, columns);
    result.rows = targets
        .iter()
        .zip(target_cells)
        .map(|(_, cells)| {
            result
                .columns
                .iter()
                .map(|column| {
                    cells
                        .iter()
                        .find(|c| c.column == column.name)
                        .map(|c| cell_value(collection, c, window, statement))
                        .unwrap_or(Value::Null)
                })
                .collect()
        })
        .collect();
    result
}

/// `>` result: directories as objects, every other content type under its own schema
pub(crate) fn target_results(
    targets: &[ObjectEntity],
    collection: &EntityCollection,
    window: Option<(i64, i64)>,
    statement: &Statement,
) -> Vec<QueryResult> {
    let mut by_type: BTreeMap<ContentType, Vec<&ObjectEntity>> = BTreeMap::new();
    for target in targets {
        by_type.entry(target.content_type).or_default().push(target);
    }

    let mut results = Vec::new();
    for (content_type, objects) in by_type {
        if content_type.is_directory() {
            let objects: Vec<ObjectEntity> = objects.into_iter().cloned().collect();
            results.push(objects_result(&objects, false));
            continue;
        }
        let records: Vec<&ContentEntity> = objects
            .iter()
            .flat_map(|o| window_records(collection, &o.uuid, content_type, window, statement))
            .collect();
        if let Some(result) = content_result(content_type, &records) {
            results.push(result);
        }
    }
    results
}

/// Objects grouped by the content type to fetch for them
pub(crate) fn fetch_plan<'o>(
    objects: impl IntoIterator<Item = (&'o ObjectEntity, Option<ContentType>)>,
) -> BTreeMap<ContentType, Vec<String>> {
    let mut plan: BTreeMap<ContentType, Vec<String>> = BTreeMap::new();
    for (object, hint) in objects {
        let content_type = hint.unwrap_or(object.content_type);
        if content_type.is_directory() {
            continue;
        }
        let uuids = plan.entry(content_type).or_default();
        if !uuids.contains(&object.uuid) {
            uuids.push(object.uuid.clone());
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse;

    fn results(pairs: &[(&str, usize, &[&str])]) -> LeafResults {
        pairs
            .iter()
            .map(|(group, index, uuids)| {
                (
                    (group.to_string(), *index),
                    uuids.iter().map(|u| u.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_and_or_combination() {
        // g1 = AND[a, b], g2 = OR[c], g3 = OR[g1, g2]
        let scope = parse("select * from [p:/x] where [a] = 1 and [b] = 2 or [c] = 3");
        let statement = &scope.statements()[0];
        let ids: Vec<&str> = statement.condition_groups.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["g1", "g2", "g3"]);

        let leaf_results = results(&[
            ("g1", 0, &["t1", "t2"]),
            ("g1", 1, &["t2", "t3"]),
            ("g2", 0, &["t4"]),
        ]);
        let matched = combine_groups(statement, &leaf_results).unwrap();
        let mut matched: Vec<&str> = matched.iter().map(String::as_str).collect();
        matched.sort();
        assert_eq!(matched, vec!["t2", "t4"]);
    }

    #[test]
    fn test_empty_and_branch_short_circuits() {
        let scope = parse("select * from [p:/x] where [a] = 1 and [b] = 2");
        let statement = &scope.statements()[0];
        let leaf_results = results(&[("g1", 1, &["t1"])]);
        assert!(combine_groups(statement, &leaf_results).unwrap().is_empty());
    }

    #[test]
    fn test_groups_fold_left_to_right() {
        // g1 = OR[a], g2 = AND[b, c], g3 = OR[g1, g2]
        let scope = parse("select * from [p:/x] where [a] = 1 or [b] = 2 and [c] = 3");
        let statement = &scope.statements()[0];

        // `b` and `c` fold into the running set with their own group's `and`
        let leaf_results = results(&[
            ("g1", 0, &["t1", "t3"]),
            ("g2", 0, &["t2", "t3"]),
            ("g2", 1, &["t1", "t3"]),
        ]);
        let matched = combine_groups(statement, &leaf_results).unwrap();
        let matched: Vec<&str> = matched.iter().map(String::as_str).collect();
        assert_eq!(matched, vec!["t3"]);

        // an empty `and` operand empties the statement even though `a` matched
        let leaf_results = results(&[("g1", 0, &["t1"]), ("g2", 0, &["t1"])]);
        assert!(combine_groups(statement, &leaf_results).unwrap().is_empty());
    }

    #[test]
    fn test_empty_or_operand_is_skipped() {
        let scope = parse("select * from [p:/x] where [a] = 1 or [b] = 2");
        let statement = &scope.statements()[0];
        let leaf_results = results(&[("g2", 0, &["t2"])]);
        let matched = combine_groups(statement, &leaf_results).unwrap();
        assert_eq!(matched.len(), 1);
        assert!(matched.contains("t2"));
    }

    #[test]
    fn test_no_conditions_means_no_filter() {
        let scope = parse("select * from [p:/x]");
        assert!(combine_groups(&scope.statements()[0], &LeafResults::new()).is_none());
    }

    #[test]
    fn test_leaves_resolve_paths_and_hints() {
        let scope = parse("select > from [p:/x/*] where state(.) = 'RUNNING' and [speed].[value] > 5");
        let leaves = leaves(&scope.statements()[0], &scope);
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].path, ".");
        assert_eq!(leaves[0].content_type, Some(ContentType::State));
        assert_eq!(leaves[1].path, "speed");
        assert_eq!(leaves[1].property.as_deref(), Some("value"));
        assert_eq!(leaves[1].operand, "5");
        assert_eq!(
            index_key("p:/x/*", &leaves[1]),
            path::hash_key("p:/x/*/speed")
        );
    }

    #[test]
    fn test_select_specs_default_to_wildcard() {
        let scope = parse("select from [p:/x]");
        let specs = select_specs(&scope.statements()[0], &scope);
        assert_eq!(specs.len(), 1);
        assert!(specs[0].is_wildcard());
    }
}
