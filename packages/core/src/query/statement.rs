//! Parsed statement AST
//!
//! Statements never hold fragment text directly: targets, select expressions, condition
//! operands and group references are variable names resolved through the owning
//! [`crate::query::QueryScope`].

use crate::models::request::SortOrder;
use crate::models::time::{self, Clock};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a select list projects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SelectType {
    /// `>>`: the target objects themselves
    TargetObject,
    /// `>`: the target objects' own content, one result per content type
    Target,
    /// `*` or a child expression: a column per non-directory child
    #[default]
    Content,
    /// `[child].[field]`: one field of a child's content
    Property,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySelect {
    pub index: usize,
    pub select_type: SelectType,
    pub expression: String,
    pub property: Option<String>,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    #[default]
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    HasMember,
    MemberOf,
}

impl Operator {
    /// Map operator text; anything unrecognized (`=`, `EQUALS`, ...) is `Equals`
    pub fn parse(text: &str) -> Self {
        match text.to_ascii_lowercase().as_str() {
            "<>" | "!=" | "not_equals" => Operator::NotEquals,
            ">" => Operator::GreaterThan,
            ">=" => Operator::GreaterThanOrEqual,
            "<" => Operator::LessThan,
            "<=" => Operator::LessThanOrEqual,
            "like" => Operator::Like,
            "<-" => Operator::HasMember,
            "->" => Operator::MemberOf,
            _ => Operator::Equals,
        }
    }

    /// Whether `text` reads as an operator token in a condition
    pub fn is_operator(text: &str) -> bool {
        matches!(
            text.to_ascii_lowercase().as_str(),
            "=" | "==" | "equals" | "<>" | "!=" | "not_equals" | ">" | ">=" | "<" | "<=" | "like" | "<-" | "->"
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Operator::Equals => "EQUALS",
            Operator::NotEquals => "NOT_EQUALS",
            Operator::GreaterThan => "GREATER_THAN",
            Operator::GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
            Operator::LessThan => "LESS_THAN",
            Operator::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
            Operator::Like => "LIKE",
            Operator::HasMember => "HAS_MEMBER",
            Operator::MemberOf => "MEMBER_OF",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupOperator {
    And,
    Or,
}

/// `variable <operator> value`, or a reference to a nested group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub variable: String,
    pub value: String,
    pub property: Option<String>,
    pub operator: Operator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionGroup {
    pub id: String,
    pub operator: GroupOperator,
    /// Nesting level, innermost groups first (0)
    pub order: u32,
    pub conditions: Vec<Condition>,
    pub group_by: Vec<String>,
}

/// A point in time as written in a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeBound {
    /// Unix nanoseconds
    Absolute(i64),
    /// Offset from the execution time (`-1h`, `now`)
    Relative(i64),
}

impl TimeBound {
    pub fn resolve(&self, now: i64) -> i64 {
        match self {
            TimeBound::Absolute(nanos) => *nanos,
            TimeBound::Relative(offset) => now.saturating_add(*offset),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    pub command: String,
    /// Variable naming the `from` expression or sub-query
    pub target: Option<String>,
    pub selects: Vec<QuerySelect>,
    pub condition_groups: Vec<ConditionGroup>,
    pub start: Option<TimeBound>,
    pub stop: Option<TimeBound>,
    /// Duration (nanoseconds) ending at `stop` or now
    pub range: Option<i64>,
    /// Aggregation window (nanoseconds)
    pub span: Option<i64>,
    pub skip: u64,
    pub take: u64,
    pub order: SortOrder,
    pub group_by: Vec<String>,
}

pub const DEFAULT_TAKE: u64 = crate::config::DEFAULT_TAKE;

impl Statement {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            target: None,
            selects: Vec::new(),
            condition_groups: Vec::new(),
            start: None,
            stop: None,
            range: None,
            span: None,
            skip: 0,
            take: DEFAULT_TAKE,
            order: SortOrder::Ascending,
            group_by: Vec::new(),
        }
    }

    /// Projection of the statement, decided by its first select item
    pub fn select_type(&self) -> SelectType {
        self.selects
            .first()
            .map(|s| s.select_type)
            .unwrap_or_default()
    }

    pub fn has_conditions(&self) -> bool {
        self.condition_groups.iter().any(|g| !g.conditions.is_empty())
    }

    pub fn has_time_window(&self) -> bool {
        self.start.is_some() || self.stop.is_some() || self.range.is_some()
    }

    /// `[start, stop)` in nanoseconds, if the statement bounds time at all
    pub fn time_window(&self, clock: &dyn Clock) -> Option<(i64, i64)> {
        if !self.has_time_window() {
            return None;
        }
        let now = clock.now_nanos();
        let stop = self.stop.map_or(i64::MAX, |s| s.resolve(now));

        let start = match (self.start, self.range) {
            (Some(start), _) => start.resolve(now),
            (None, Some(range)) => {
                let end = if self.stop.is_some() { stop } else { now };
                end.saturating_sub(range)
            }
            (None, None) => 0,
        };
        Some((start, stop))
    }

    pub fn group(&self, id: &str) -> Option<&ConditionGroup> {
        self.condition_groups.iter().find(|g| g.id == id)
    }
}

/// Parse a `start`/`stop` operand: timestamps, `now`, or a signed offset like `-1h`
pub fn parse_time_bound(text: &str) -> Option<TimeBound> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("now") {
        return Some(TimeBound::Relative(0));
    }
    if let Some(offset) = text.strip_prefix('-') {
        if let Some(nanos) = time::parse_duration(offset) {
            return Some(TimeBound::Relative(-nanos));
        }
    }
    if let Some(offset) = text.strip_prefix('+') {
        if let Some(nanos) = time::parse_duration(offset) {
            return Some(TimeBound::Relative(nanos));
        }
    }
    time::parse_timestamp(text).map(TimeBound::Absolute)
}
