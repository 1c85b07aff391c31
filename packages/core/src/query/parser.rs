//! Statement parser
//!
//! `chumsky` combinators over [`lexer`] tokens. A statement is cut into clauses at
//! top-level keywords (`select`, `from`, `where`, `start`, `stop`, `range`, `span`,
//! `skip`, `take`, `order`, `group by`); each clause is parsed on its own and any
//! clause that does not make sense is left at its default. Parsing never fails: the
//! clause combinators accept any token sequence and a clause whose parse errors out
//! is logged and skipped.
//!
//! A where clause parses into a condition tree (`and` binds tighter than `or`,
//! parentheses nest) that is lowered into flat condition groups, innermost first.

use crate::models::request::SortOrder;
use crate::models::time;
use crate::query::functions;
use crate::query::lexer::{self, Span, Token, TokenKind};
use crate::query::scope::{QueryScope, VariableKind};
use crate::query::statement::{
    parse_time_bound, Condition, ConditionGroup, GroupOperator, Operator, QuerySelect, SelectType,
    Statement, TimeBound,
};
use chumsky::prelude::*;
use chumsky::Stream;
use tracing::debug;

type TokenError = Simple<Token>;

const CLAUSES: [&str; 11] = [
    "select", "from", "where", "start", "stop", "range", "span", "skip", "take", "order", "group",
];

/// Parse a whole query text
pub fn parse(text: &str) -> QueryScope {
    QueryScope::create(text)
}

/// `declare name = 'value'` → (name, value)
pub(crate) fn parse_declare(text: &str) -> Option<(String, String)> {
    run(declaration(), &lexer::tokenize(text))
}

pub(crate) fn parse_statement(scope: &mut QueryScope, text: &str) -> Statement {
    let tokens = lexer::tokenize(text);
    let command = tokens
        .first()
        .map(|t| t.text.to_ascii_lowercase())
        .unwrap_or_default();

    let mut builder = StatementBuilder {
        text,
        scope,
        groups: Vec::new(),
    };
    let mut statement = Statement::new(command);

    for (keyword, mut clause) in run(clauses(), &tokens).unwrap_or_default() {
        if (keyword == "group" || keyword == "order") && clause.first().map_or(false, |t| t.is_word("by")) {
            clause.remove(0);
        }
        let clause = clause.as_slice();

        match keyword.as_str() {
            "select" => statement.selects = builder.selects(clause),
            "from" => statement.target = builder.target(clause),
            "where" => {
                if let Some(node) = run(where_clause(), clause) {
                    builder.lower(&node);
                }
            }
            "start" => statement.start = time_operand(builder.text, clause),
            "stop" => statement.stop = time_operand(builder.text, clause),
            "range" => statement.range = time::parse_duration(&builder.operand(clause)),
            "span" => statement.span = time::parse_duration(&builder.operand(clause)),
            "skip" => {
                if let Ok(skip) = builder.operand(clause).parse() {
                    statement.skip = skip;
                }
            }
            "take" => {
                if let Ok(take) = builder.operand(clause).parse() {
                    statement.take = take;
                }
            }
            "order" => statement.order = sort_order(clause),
            "group" => statement.group_by = group_by(clause),
            _ => {}
        }
    }

    statement.condition_groups = builder.groups;
    if !statement.group_by.is_empty() {
        // the outermost group is created last
        if let Some(root) = statement.condition_groups.last_mut() {
            root.group_by = statement.group_by.clone();
        }
    }
    statement
}

/// Run a token parser over a whole clause; a failed parse is logged and yields `None`
fn run<O>(parser: impl Parser<Token, O, Error = TokenError>, tokens: &[Token]) -> Option<O> {
    let eoi = tokens.last().map_or(0..0, |t| t.span.end..t.span.end);
    let stream = Stream::from_iter(eoi, tokens.iter().map(|t| (t.clone(), t.span.clone())));

    let (output, errors) = parser.then_ignore(end()).parse_recovery(stream);
    for error in &errors {
        debug!("query clause not understood: {:?}", error);
    }
    output
}

// ===== Token predicates =====

fn is_clause(token: &Token) -> bool {
    token.kind == TokenKind::Word && CLAUSES.iter().any(|c| token.text.eq_ignore_ascii_case(c))
}

fn is_close(token: &Token) -> bool {
    token.kind == TokenKind::Close
}

fn is_comma(token: &Token) -> bool {
    token.kind == TokenKind::Comma
}

/// `as` only introduces an alias after whitespace, so `[alias]` paths stay intact
fn is_alias(token: &Token) -> bool {
    token.is_word("as") && token.spaced
}

fn ends_condition(token: &Token) -> bool {
    token.is_word("and") || token.is_word("or") || is_close(token)
}

fn never(_: &Token) -> bool {
    false
}

/// Operator a word reads as, with any value glued to it (`='x'`, `>=5`)
fn operator_of(token: &Token) -> Option<(Operator, Option<String>)> {
    if token.kind != TokenKind::Word {
        return None;
    }
    if Operator::is_operator(&token.text) {
        return Some((Operator::parse(&token.text), None));
    }
    let symbols: String = token
        .text
        .chars()
        .take_while(|c| matches!(c, '<' | '>' | '=' | '!' | '-'))
        .collect();
    let prefix = (1..=symbols.len())
        .rev()
        .map(|n| &symbols[..n])
        .find(|s| Operator::is_operator(s))?;
    Some((Operator::parse(prefix), Some(token.text[prefix.len()..].to_string())))
}

// ===== Combinators =====

fn word(keyword: &'static str) -> impl Parser<Token, Token, Error = TokenError> + Clone {
    filter(move |t: &Token| t.is_word(keyword))
}

/// `( ... )` with everything inside it; an unclosed group runs to the end
fn group() -> impl Parser<Token, Vec<Token>, Error = TokenError> + Clone {
    recursive(|group| {
        let inner = group.or(filter(|t: &Token| !t.is_open() && !is_close(t)).map(|t| vec![t]));

        filter(Token::is_open)
            .then(inner.repeated())
            .then(filter(is_close).or_not())
            .map(|((open, inner), close): ((Token, Vec<Vec<Token>>), Option<Token>)| {
                std::iter::once(open)
                    .chain(inner.into_iter().flatten())
                    .chain(close)
                    .collect::<Vec<Token>>()
            })
    })
}

/// One balanced item: a whole parenthesized group, or a single token `stop` rejects
fn item<F>(stop: F) -> impl Parser<Token, Vec<Token>, Error = TokenError> + Clone
where
    F: Fn(&Token) -> bool + Clone,
{
    group().or(filter(move |t: &Token| !t.is_open() && !stop(t)).map(|t| vec![t]))
}

/// Balanced items up to the first top-level token `stop` accepts
fn items<F>(stop: F) -> impl Parser<Token, Vec<Token>, Error = TokenError> + Clone
where
    F: Fn(&Token) -> bool + Clone,
{
    item(stop)
        .repeated()
        .map(|items: Vec<Vec<Token>>| items.into_iter().flatten().collect::<Vec<Token>>())
}

/// `(keyword, body)` per top-level clause keyword; tokens before the first are dropped
fn clauses() -> impl Parser<Token, Vec<(String, Vec<Token>)>, Error = TokenError> {
    let keyword = filter(is_clause).map(|t: Token| t.text.to_ascii_lowercase());

    items(is_clause).ignore_then(keyword.then(items(is_clause)).repeated())
}

/// Comma separated items; empty items are dropped
fn comma_list() -> impl Parser<Token, Vec<Vec<Token>>, Error = TokenError> {
    items(is_comma)
        .separated_by(filter(is_comma))
        .map(|pieces: Vec<Vec<Token>>| pieces.into_iter().filter(|p| !p.is_empty()).collect::<Vec<_>>())
}

/// `term [as alias]`
fn select_item() -> impl Parser<Token, (Vec<Token>, Option<Vec<Token>>), Error = TokenError> {
    items(is_alias).then(filter(is_alias).ignore_then(items(never)).or_not())
}

fn declaration() -> impl Parser<Token, (String, String), Error = TokenError> {
    word("declare")
        .ignore_then(any())
        .then(word("=").or_not().ignore_then(any().or_not()))
        .then_ignore(any().repeated())
        .map(|(name, value): (Token, Option<Token>)| {
            (name.text, value.map(|t| t.text).unwrap_or_default())
        })
}

enum Source {
    /// `(select ...)`: the inner statement tokens
    Query(Vec<Token>),
    Expression(Vec<Token>),
}

fn source() -> impl Parser<Token, Source, Error = TokenError> {
    let sub_query = filter(Token::is_open)
        .ignore_then(word("select").rewind())
        .ignore_then(items(is_close))
        .then_ignore(filter(is_close).or_not())
        .then_ignore(end())
        .map(Source::Query);

    sub_query.or(items(never).map(Source::Expression))
}

#[derive(Debug, Clone)]
enum ConditionNode {
    /// `a or b ...`
    Any(Vec<ConditionNode>, Span),
    /// `a and b ...`
    All(Vec<ConditionNode>, Span),
    Nested(Box<ConditionNode>),
    Leaf(Leaf),
}

/// `<target> [<operator> <value>]`
#[derive(Debug, Clone)]
struct Leaf {
    target: Vec<Token>,
    operator: Option<(Operator, Option<String>)>,
    value: Vec<Token>,
    span: Span,
}

fn conditions() -> impl Parser<Token, ConditionNode, Error = TokenError> + Clone {
    recursive(|conditions| {
        // a group only counts as nested conditions when nothing but a junction follows;
        // `(a) = 1` is a leaf whose target is parenthesized
        let nested = filter(Token::is_open)
            .ignore_then(conditions)
            .then_ignore(filter(is_close).or_not())
            .then_ignore(filter(ends_condition).ignored().or(end()).rewind())
            .map(|inner| ConditionNode::Nested(Box::new(inner)));

        let target = item(ends_condition)
            .then(item(|t: &Token| ends_condition(t) || operator_of(t).is_some()).repeated())
            .map(|(first, rest): (Vec<Token>, Vec<Vec<Token>>)| {
                first.into_iter().chain(rest.into_iter().flatten()).collect::<Vec<Token>>()
            });

        let operator = filter_map(|span: Span, token: Token| {
            operator_of(&token).ok_or_else(|| TokenError::custom(span, format!("`{}` is not an operator", token)))
        });

        let leaf = target
            .then(operator.then(items(ends_condition)).or_not())
            .map_with_span(
                |(target, operation): (Vec<Token>, Option<((Operator, Option<String>), Vec<Token>)>), span: Span| {
                    let (operator, value) = match operation {
                        Some((operator, value)) => (Some(operator), value),
                        None => (None, Vec::new()),
                    };
                    ConditionNode::Leaf(Leaf {
                        target,
                        operator,
                        value,
                        span,
                    })
                },
            );

        nested
            .or(leaf)
            .separated_by(word("and"))
            .at_least(1)
            .map_with_span(ConditionNode::All)
            .separated_by(word("or"))
            .at_least(1)
            .map_with_span(ConditionNode::Any)
    })
}

/// Conditions up to the first token that cannot continue them; the rest is ignored
fn where_clause() -> impl Parser<Token, ConditionNode, Error = TokenError> {
    conditions().then_ignore(any().repeated())
}

// ===== Clause helpers =====

fn strip_brackets(text: &str) -> &str {
    let text = text.trim();
    text.strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .unwrap_or(text)
}

/// Split `path.property` forms: `[a].[b]`, `a.b`, or inside a call `f([a].[b])`
fn split_property(term: &str) -> (String, Option<String>) {
    if let Some(i) = term.find("].") {
        let path = strip_brackets(&term[..=i]).to_string();
        let property = strip_brackets(&term[i + 2..]).to_string();
        return (path, Some(property).filter(|p| !p.is_empty()));
    }
    if term.starts_with('[') {
        return (strip_brackets(term).to_string(), None);
    }
    match term.find('.') {
        Some(i) if i > 0 && !term.contains("..") && !term.contains('/') => (
            term[..i].to_string(),
            Some(term[i + 1..].to_string()).filter(|p| !p.is_empty()),
        ),
        _ => (term.to_string(), None),
    }
}

fn sort_order(tokens: &[Token]) -> SortOrder {
    match tokens.first().map(|t| t.text.to_ascii_lowercase()) {
        Some(order) if order.starts_with("desc") => SortOrder::Descending,
        _ => SortOrder::Ascending,
    }
}

fn group_by(tokens: &[Token]) -> Vec<String> {
    run(comma_list(), tokens)
        .unwrap_or_default()
        .into_iter()
        .map(|item| item.iter().map(|t| t.text.as_str()).collect::<String>())
        .filter(|column| !column.is_empty())
        .collect()
}

fn time_operand(text: &str, tokens: &[Token]) -> Option<TimeBound> {
    let operand = functions::process(&token_text(text, tokens));
    parse_time_bound(&operand)
}

/// Source text between the first and last token
fn source_slice(text: &str, tokens: &[Token]) -> String {
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => text
            .get(first.span.start..last.span.end)
            .unwrap_or_default()
            .trim()
            .to_string(),
        _ => String::new(),
    }
}

/// Text of a clause operand: a lone literal token's inner text, else the source slice
fn token_text(text: &str, tokens: &[Token]) -> String {
    match tokens {
        [single] if single.kind == TokenKind::Variable => single.to_string(),
        [single] => single.text.clone(),
        _ => source_slice(text, tokens),
    }
}

struct StatementBuilder<'a> {
    text: &'a str,
    scope: &'a mut QueryScope,
    groups: Vec<ConditionGroup>,
}

impl<'a> StatementBuilder<'a> {
    fn operand(&self, tokens: &[Token]) -> String {
        token_text(self.text, tokens)
    }

    fn slice(&self, tokens: &[Token]) -> String {
        source_slice(self.text, tokens)
    }

    // ===== Select =====

    fn selects(&mut self, tokens: &[Token]) -> Vec<QuerySelect> {
        run(comma_list(), tokens)
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(index, item)| self.select(index, item))
            .collect()
    }

    fn select(&mut self, index: usize, item: &[Token]) -> QuerySelect {
        let (term, alias) = run(select_item(), item).unwrap_or_else(|| (item.to_vec(), None));
        let alias = alias.map(|tokens| self.operand(&tokens));
        let text = self.slice(&term);

        let (select_type, expression, property) = match text.as_str() {
            ">>" => (SelectType::TargetObject, text.clone(), None),
            ">" => (SelectType::Target, text.clone(), None),
            _ => {
                let (expression, property) = split_property(&text);
                let select_type = if property.is_some() {
                    SelectType::Property
                } else {
                    SelectType::Content
                };
                (select_type, expression, property)
            }
        };

        QuerySelect {
            index,
            select_type,
            expression: self.scope.add(VariableKind::Expression, expression),
            property: property.map(|p| self.scope.add(VariableKind::Property, p)),
            alias: alias
                .filter(|a| !a.is_empty())
                .map(|a| self.scope.add(VariableKind::Scalar, a)),
        }
    }

    // ===== From =====

    fn target(&mut self, tokens: &[Token]) -> Option<String> {
        match run(source(), tokens)? {
            Source::Query(inner) => {
                let text = self.slice(&inner);
                let statement = parse_statement(self.scope, &text);
                Some(self.scope.add_query(&text, statement))
            }
            Source::Expression(tokens) => {
                let expression = match tokens.as_slice() {
                    [] => return None,
                    [single] => single.text.clone(),
                    many => strip_brackets(&self.slice(many)).to_string(),
                };
                Some(self.scope.add(VariableKind::Expression, expression))
            }
        }
    }

    // ===== Where =====

    /// Lower a condition tree into groups, children before parents; returns the group id
    fn lower(&mut self, node: &ConditionNode) -> String {
        match node {
            ConditionNode::Any(pieces, span) => match pieces.as_slice() {
                [single] => self.lower(single),
                _ => {
                    let conditions = pieces
                        .iter()
                        .map(|piece| {
                            let id = self.lower(piece);
                            self.reference(id)
                        })
                        .collect();
                    self.push_group(GroupOperator::Or, conditions, span)
                }
            },
            ConditionNode::All(pieces, span) => match pieces.as_slice() {
                [single] => self.lower(single),
                _ => {
                    let conditions = pieces
                        .iter()
                        .map(|piece| match piece {
                            ConditionNode::Leaf(leaf) => self.condition(leaf),
                            nested => {
                                let id = self.lower(nested);
                                self.reference(id)
                            }
                        })
                        .collect();
                    self.push_group(GroupOperator::And, conditions, span)
                }
            },
            ConditionNode::Nested(inner) => self.lower(inner),
            ConditionNode::Leaf(leaf) => {
                let condition = self.condition(leaf);
                self.push_group(GroupOperator::Or, vec![condition], &leaf.span)
            }
        }
    }

    fn reference(&self, group_id: String) -> Condition {
        Condition {
            variable: group_id,
            value: String::new(),
            property: None,
            operator: Operator::Equals,
        }
    }

    fn push_group(&mut self, operator: GroupOperator, conditions: Vec<Condition>, span: &Span) -> String {
        let order = conditions
            .iter()
            .filter_map(|c| self.groups.iter().find(|g| g.id == c.variable))
            .map(|g| g.order + 1)
            .max()
            .unwrap_or(0);

        let text = self.text.get(span.clone()).unwrap_or_default().trim().to_string();
        let id = self.scope.add(VariableKind::ConditionGroup, text);
        self.groups.push(ConditionGroup {
            id: id.clone(),
            operator,
            order,
            conditions,
            group_by: Vec::new(),
        });
        id
    }

    /// `<target> <operator> <value>`; a bare target means `= true`
    fn condition(&mut self, leaf: &Leaf) -> Condition {
        let (operator, value) = match &leaf.operator {
            Some((operator, Some(inline))) => (*operator, inline.clone()),
            Some((operator, None)) => (*operator, self.value(&leaf.value)),
            None => (Operator::Equals, "true".to_string()),
        };

        let (expression, property) = self.condition_target(&leaf.target);
        Condition {
            variable: self.scope.add(VariableKind::Expression, expression),
            value: self.scope.add(VariableKind::Scalar, value),
            property: property.map(|p| self.scope.add(VariableKind::Property, p)),
            operator,
        }
    }

    fn condition_target(&self, tokens: &[Token]) -> (String, Option<String>) {
        let text = self.slice(tokens);
        match functions::function_name(&text) {
            Some(_) => {
                let inner = functions::function_target(&text);
                let (path, property) = split_property(inner);
                (functions::replace_function_target(&text, &path), property)
            }
            None => split_property(&text),
        }
    }

    fn value(&self, tokens: &[Token]) -> String {
        match tokens {
            [single] if single.kind == TokenKind::Variable => self
                .scope
                .value(&single.text)
                .map(str::to_string)
                .unwrap_or_else(|| single.to_string()),
            _ => self.operand(tokens),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(text: &str) -> (QueryScope, Statement) {
        let scope = parse(text);
        let statement = scope.statements()[0].clone();
        (scope, statement)
    }

    fn leaf_text(scope: &QueryScope, condition: &Condition) -> String {
        format!(
            "{} {} {}",
            scope.value(&condition.variable).unwrap_or_default(),
            condition.operator,
            scope.value(&condition.value).unwrap_or_default()
        )
    }

    #[test]
    fn test_parse_target_select_and_condition() {
        let (scope, statement) =
            single("select > from [MyNs:/area1/*] where (state(.) EQUALS 'RUNNING') take 10");

        assert_eq!(statement.command, "select");
        assert_eq!(statement.select_type(), SelectType::Target);
        assert_eq!(statement.take, 10);
        assert_eq!(statement.skip, 0);
        assert_eq!(scope.value(statement.target.as_deref().unwrap()), Some("MyNs:/area1/*"));

        assert_eq!(statement.condition_groups.len(), 1);
        let group = &statement.condition_groups[0];
        assert_eq!(group.operator, GroupOperator::Or);
        assert_eq!(group.order, 0);
        assert_eq!(leaf_text(&scope, &group.conditions[0]), "state(.) EQUALS RUNNING");
    }

    #[test]
    fn test_defaults_for_missing_clauses() {
        let (_, statement) = single("select * from [a:/x]");
        assert_eq!(statement.take, crate::config::DEFAULT_TAKE);
        assert_eq!(statement.order, SortOrder::Ascending);
        assert!(statement.span.is_none());
        assert!(!statement.has_conditions());
        assert_eq!(statement.select_type(), SelectType::Content);
    }

    #[test]
    fn test_malformed_text_yields_default_statement() {
        let (scope, statement) = single("take take ( where");
        assert_eq!(statement.take, crate::config::DEFAULT_TAKE);
        assert!(statement.target.is_none());
        assert!(statement.selects.is_empty());
        assert_eq!(scope.statements().len(), 1);
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let (scope, statement) =
            single("select * from [a:/x] where [a] = 1 and [b] = 2 or [c] = 3");
        let groups = &statement.condition_groups;

        let root = groups.last().unwrap();
        assert_eq!(root.operator, GroupOperator::Or);
        assert_eq!(root.order, 1);
        assert_eq!(root.conditions.len(), 2);

        let left = statement.group(&root.conditions[0].variable).unwrap();
        assert_eq!(left.operator, GroupOperator::And);
        let leaves: Vec<String> = left.conditions.iter().map(|c| leaf_text(&scope, c)).collect();
        assert_eq!(leaves, vec!["a EQUALS 1", "b EQUALS 2"]);

        let right = statement.group(&root.conditions[1].variable).unwrap();
        assert_eq!(right.operator, GroupOperator::Or);
        assert_eq!(leaf_text(&scope, &right.conditions[0]), "c EQUALS 3");
    }

    #[test]
    fn test_or_then_and_declares_groups_in_order() {
        let (scope, statement) =
            single("select * from [a:/x] where [a] = 1 or [b] = 2 and [c] = 3");
        let groups = &statement.condition_groups;
        assert_eq!(groups.len(), 3);

        assert_eq!(groups[0].operator, GroupOperator::Or);
        assert_eq!(leaf_text(&scope, &groups[0].conditions[0]), "a EQUALS 1");

        assert_eq!(groups[1].operator, GroupOperator::And);
        let leaves: Vec<String> = groups[1].conditions.iter().map(|c| leaf_text(&scope, c)).collect();
        assert_eq!(leaves, vec!["b EQUALS 2", "c EQUALS 3"]);

        let root = &groups[2];
        assert_eq!(root.operator, GroupOperator::Or);
        assert_eq!(root.conditions[0].variable, groups[0].id);
        assert_eq!(root.conditions[1].variable, groups[1].id);
        assert_eq!(scope.value(&groups[1].id), Some("[b] = 2 and [c] = 3"));
    }

    #[test]
    fn test_dangling_junction_keeps_parsed_conditions() {
        let (scope, statement) = single("select * from [a:/x] where [a] = 1 and");
        assert_eq!(statement.condition_groups.len(), 1);
        let leaf = &statement.condition_groups[0].conditions[0];
        assert_eq!(leaf_text(&scope, leaf), "a EQUALS 1");
    }

    #[test]
    fn test_unclosed_group_runs_to_end() {
        let (scope, statement) = single("select * from [a:/x] where ([a] = 1 or [b] = 2");
        let root = statement.condition_groups.last().unwrap();
        assert_eq!(root.operator, GroupOperator::Or);
        assert_eq!(root.conditions.len(), 2);

        let right = statement.group(&root.conditions[1].variable).unwrap();
        assert_eq!(leaf_text(&scope, &right.conditions[0]), "b EQUALS 2");
    }

    #[test]
    fn test_parenthesized_target_is_not_a_group() {
        let (scope, statement) = single("select * from [a:/x] where ([a]) = 1");
        assert_eq!(statement.condition_groups.len(), 1);
        let leaf = &statement.condition_groups[0].conditions[0];
        assert_eq!(scope.value(&leaf.variable), Some("([a])"));
        assert_eq!(scope.value(&leaf.value), Some("1"));
    }

    #[test]
    fn test_declaration() {
        assert_eq!(parse_declare("declare v = 'a;b'"), Some(("v".into(), "a;b".into())));
        assert_eq!(parse_declare("DECLARE w 5"), Some(("w".into(), "5".into())));
        assert_eq!(parse_declare("select * from [a:/x]"), None);
    }

    #[test]
    fn test_parenthesized_group_inside_and() {
        let (scope, statement) =
            single("select * from [a:/x] where [a] > 5 and ([b] like 'x%' or [c] <> 'y')");
        let root = statement.condition_groups.last().unwrap();
        assert_eq!(root.operator, GroupOperator::And);
        assert_eq!(leaf_text(&scope, &root.conditions[0]), "a GREATER_THAN 5");

        let nested = statement.group(&root.conditions[1].variable).unwrap();
        assert_eq!(nested.operator, GroupOperator::Or);
        assert!(root.order > nested.order);
    }

    #[test]
    fn test_property_and_alias_selects() {
        let (scope, statement) = single("select [status].[timestamp] as ts, [speed] from [a:/m]");
        assert_eq!(statement.selects.len(), 2);

        let first = &statement.selects[0];
        assert_eq!(first.select_type, SelectType::Property);
        assert_eq!(scope.value(&first.expression), Some("status"));
        assert_eq!(scope.value(first.property.as_deref().unwrap()), Some("timestamp"));
        assert_eq!(scope.value(first.alias.as_deref().unwrap()), Some("ts"));

        let second = &statement.selects[1];
        assert_eq!(second.select_type, SelectType::Content);
        assert_eq!(second.index, 1);
        assert_eq!(scope.value(&second.expression), Some("speed"));
    }

    #[test]
    fn test_condition_without_operator_is_equals_true() {
        let (scope, statement) = single("select * from [a:/x] where [enabled]");
        let leaf = &statement.condition_groups[0].conditions[0];
        assert_eq!(leaf_text(&scope, leaf), "enabled EQUALS true");
    }

    #[test]
    fn test_glued_operator_and_function_property() {
        let (scope, statement) = single("select * from [a:/x] where state([s].[definitionUuid])='RUN'");
        let leaf = &statement.condition_groups[0].conditions[0];
        assert_eq!(scope.value(&leaf.variable), Some("state(s)"));
        assert_eq!(scope.value(leaf.property.as_deref().unwrap()), Some("definitionUuid"));
        assert_eq!(scope.value(&leaf.value), Some("RUN"));

        let (scope, statement) = single("select * from [a:/x] where [speed]>=5");
        let leaf = &statement.condition_groups[0].conditions[0];
        assert_eq!(leaf_text(&scope, leaf), "speed GREATER_THAN_OR_EQUAL 5");
    }

    #[test]
    fn test_time_paging_and_order() {
        let (_, statement) = single(
            "select * from [a:/x] start '1970-01-01T00:00:01Z' stop now range 1h span 5m \
             skip 5 take 20 order desc group by [a], [b]",
        );
        assert_eq!(
            statement.start,
            Some(crate::query::statement::TimeBound::Absolute(1_000_000_000))
        );
        assert_eq!(statement.stop, Some(crate::query::statement::TimeBound::Relative(0)));
        assert_eq!(statement.range, Some(3_600_000_000_000));
        assert_eq!(statement.span, Some(300_000_000_000));
        assert_eq!((statement.skip, statement.take), (5, 20));
        assert_eq!(statement.order, SortOrder::Descending);
        assert_eq!(statement.group_by, vec!["a", "b"]);
    }

    #[test]
    fn test_sub_query_target() {
        let (scope, statement) = single("select * from (select >> from [a:/area/*] where [on]) take 5");
        let target = statement.target.as_deref().unwrap();
        assert_eq!(scope.variable(target).unwrap().kind, VariableKind::Query);

        let inner = scope.sub_query(target).unwrap();
        assert_eq!(inner.select_type(), SelectType::TargetObject);
        assert_eq!(scope.value(inner.target.as_deref().unwrap()), Some("a:/area/*"));
        assert!(inner.has_conditions());
        assert_eq!(statement.take, 5);
    }

    #[test]
    fn test_parse_is_idempotent() {
        let text = "select > from [MyNs:/area1/*] where (state(.) EQUALS 'RUNNING' or [x] < 4) take 10";
        let first = parse(text);
        let second = parse(text);
        assert_eq!(first.statements(), second.statements());
        assert_eq!(first.variables(), second.variables());
    }

    #[test]
    fn test_multiple_statements() {
        let scope = parse("select > from [a:/x]; -- first\nselect >> from [a:/y];");
        assert_eq!(scope.statements().len(), 2);
    }
}
