//! Query functions
//!
//! Two kinds of `name(arg)` forms appear in queries:
//!
//! - value functions applied to literals: `lower()`, `upper()`, `local()`, `datetime()`
//! - content functions wrapping a condition path, e.g. `state(.)`, naming the
//!   [`ContentType`] whose value the condition reads
//!
//! Function targets unwrap recursively, so `lower(state([status]))` targets `[status]`.

use crate::models::content_type::ContentType;
use crate::models::time;
use chrono::{Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};

const VALUE_FUNCTIONS: [&str; 4] = ["local", "lower", "upper", "datetime"];

/// Argument of the first `name(...)` call in `input`, quotes stripped
fn call_argument<'a>(input: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("{}(", name);
    let start = input.find(&open)? + open.len();
    let rest = &input[start..];
    let end = rest.find(')')?;
    let argument = rest[..end].trim_matches('\'');
    if argument.is_empty() {
        None
    } else {
        Some(argument)
    }
}

fn parse_local(text: &str) -> Option<String> {
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            let local = Local.from_local_datetime(&naive).earliest()?;
            return Some(
                local
                    .with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true),
            );
        }
    }
    // already zoned input (or a bare date) is taken as is
    time::parse_timestamp(text)
        .map(|nanos| time::from_nanos(nanos).to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// Apply value functions; input without a function call is returned unchanged
pub fn process(input: &str) -> String {
    let mut output = input.to_string();

    for name in VALUE_FUNCTIONS {
        let Some(argument) = call_argument(input, name) else {
            continue;
        };
        let replaced = match name {
            "lower" => Some(argument.to_lowercase()),
            "upper" => Some(argument.to_uppercase()),
            "local" => parse_local(argument),
            _ => time::parse_timestamp(argument)
                .map(|nanos| time::from_nanos(nanos).to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        };
        if let Some(replaced) = replaced {
            output = replaced;
        }
    }

    output
}

/// Innermost argument of nested calls; non-call input is returned as is
pub fn function_target(expression: &str) -> &str {
    let mut current = expression.trim();
    loop {
        let (Some(open), Some(close)) = (current.find('('), current.rfind(')')) else {
            return current;
        };
        if open == 0 || close < open {
            return current;
        }
        current = current[open + 1..close].trim();
    }
}

/// Replace the innermost call argument with `value`
pub fn replace_function_target(expression: &str, value: &str) -> String {
    let target = function_target(expression);
    if target.len() == expression.trim().len() {
        return value.to_string();
    }
    match expression.find(target) {
        Some(i) => format!("{}{}{}", &expression[..i], value, &expression[i + target.len()..]),
        None => value.to_string(),
    }
}

/// Name of the outermost call, if the expression is one
pub fn function_name(expression: &str) -> Option<&str> {
    let expression = expression.trim();
    let open = expression.find('(')?;
    if open == 0 || !expression.ends_with(')') {
        return None;
    }
    Some(expression[..open].trim())
}

/// Content type named by the outermost call (`state(.)` → State)
pub fn content_function(expression: &str) -> Option<ContentType> {
    function_name(expression).and_then(|name| name.parse().ok())
}

/// Normalize a comparison operand: timestamps become nanoseconds, everything else is kept
pub fn format_value(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() || value.parse::<f64>().is_ok() {
        return value.to_string();
    }
    match time::parse_timestamp(value) {
        Some(nanos) if looks_like_datetime(value) => nanos.to_string(),
        _ => value.to_string(),
    }
}

fn looks_like_datetime(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() >= 10 && bytes[..4].iter().all(u8::is_ascii_digit) && bytes[4] == b'-'
}
