//! Condition operators
//!
//! Values are compared numerically when both sides parse as numbers, as booleans when
//! both sides are `true`/`false`, and as case-sensitive strings otherwise. `LIKE` turns
//! `%` and `_` into a case-insensitive pattern. The membership operators work on lists:
//! `<-` holds when the object's values contain the operand, `->` when the
//! comma-separated operand list contains one of the values.

use crate::query::functions;
use crate::query::statement::Operator;
use regex::Regex;
use std::cmp::Ordering;

/// Operand text as compared: functions applied, datetimes converted to nanoseconds
pub fn prepare_operand(raw: &str) -> String {
    functions::format_value(&functions::process(raw))
}

/// Case-insensitive regex for a SQL-style `LIKE` pattern
pub fn like_regex(pattern: &str) -> Option<Regex> {
    let mut expression = String::from("(?is)^");
    for c in pattern.chars() {
        match c {
            '%' => expression.push_str(".*"),
            '_' => expression.push('.'),
            other => expression.push_str(&regex::escape(&other.to_string())),
        }
    }
    expression.push('$');
    Regex::new(&expression).ok()
}

fn ordering(value: &str, operand: &str) -> Ordering {
    match (value.trim().parse::<f64>(), operand.trim().parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => match (
            value.to_ascii_lowercase().parse::<bool>(),
            operand.to_ascii_lowercase().parse::<bool>(),
        ) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            _ => value.cmp(operand),
        },
    }
}

/// Compare a single value against an operand
pub fn compare(operator: Operator, value: &str, operand: &str) -> bool {
    match operator {
        Operator::Equals => ordering(value, operand) == Ordering::Equal,
        Operator::NotEquals => ordering(value, operand) != Ordering::Equal,
        Operator::GreaterThan => ordering(value, operand) == Ordering::Greater,
        Operator::GreaterThanOrEqual => ordering(value, operand) != Ordering::Less,
        Operator::LessThan => ordering(value, operand) == Ordering::Less,
        Operator::LessThanOrEqual => ordering(value, operand) != Ordering::Greater,
        Operator::Like => like_regex(operand).map_or(false, |re| re.is_match(value)),
        Operator::HasMember => ordering(value, operand) == Ordering::Equal,
        Operator::MemberOf => operand
            .split(',')
            .any(|member| ordering(value, member.trim()) == Ordering::Equal),
    }
}

/// Whether an object's values satisfy the condition
///
/// An object without values never matches. `NOT_EQUALS` requires every value to differ;
/// every other operator needs one matching value.
pub fn matches<S: AsRef<str>>(operator: Operator, values: &[S], operand: &str) -> bool {
    if values.is_empty() {
        return false;
    }
    match operator {
        Operator::NotEquals => values.iter().all(|v| compare(operator, v.as_ref(), operand)),
        _ => values.iter().any(|v| compare(operator, v.as_ref(), operand)),
    }
}
