//! Query Scope
//!
//! A scope owns the statements parsed from one query text and the flat variable table
//! they reference. Every fragment (target expression, select item, condition operand,
//! condition group, sub-query) is registered once under a generated name; `declare`
//! adds user-named scalars that later statements of the same scope can use as `{name}`.

use crate::query::lexer;
use crate::query::parser;
use crate::query::statement::Statement;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableKind {
    Scalar,
    Expression,
    Property,
    Query,
    ConditionGroup,
}

impl VariableKind {
    fn prefix(&self) -> &'static str {
        match self {
            VariableKind::Scalar => "v",
            VariableKind::Expression => "e",
            VariableKind::Property => "p",
            VariableKind::Query => "q",
            VariableKind::ConditionGroup => "g",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value: String,
    pub kind: VariableKind,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryScope {
    statements: Vec<Statement>,
    variables: Vec<Variable>,
    #[serde(skip)]
    lookup: HashMap<String, usize>,
    /// Statements of sub-queries, by their `Query` variable name
    queries: HashMap<String, Statement>,
    #[serde(skip)]
    counters: HashMap<VariableKind, u32>,
}

impl QueryScope {
    /// Parse query text into a scope; never fails
    pub fn create(text: &str) -> Self {
        let mut scope = QueryScope::default();

        for raw in lexer::split_statements(text) {
            let text = scope.replace_variables(&raw);
            if let Some((name, value)) = parser::parse_declare(&text) {
                scope.declare(&name, &value);
                continue;
            }
            let statement = parser::parse_statement(&mut scope, &text);
            scope.statements.push(statement);
        }

        debug!(
            statements = scope.statements.len(),
            variables = scope.variables.len(),
            "query parsed"
        );
        scope
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.lookup.get(name).map(|&i| &self.variables[i])
    }

    /// Value of a variable, if registered
    pub fn value(&self, name: &str) -> Option<&str> {
        self.variable(name).map(|v| v.value.as_str())
    }

    /// Value of a variable of the given kind
    pub fn value_of(&self, name: &str, kind: VariableKind) -> Option<&str> {
        self.variable(name)
            .filter(|v| v.kind == kind)
            .map(|v| v.value.as_str())
    }

    /// Parsed statement of a sub-query variable
    pub fn sub_query(&self, name: &str) -> Option<&Statement> {
        self.queries.get(name)
    }

    /// Substitute `{name}` with the value of each registered variable
    pub fn replace_variables(&self, text: &str) -> String {
        if !text.contains('{') {
            return text.to_string();
        }
        let mut output = text.to_string();
        for variable in &self.variables {
            let pattern = format!("{{{}}}", variable.name);
            if output.contains(&pattern) {
                output = output.replace(&pattern, &variable.value);
            }
        }
        output
    }

    /// Register a fragment under a fresh generated name
    pub(crate) fn add(&mut self, kind: VariableKind, value: impl Into<String>) -> String {
        let counter = self.counters.entry(kind).or_insert(0);
        *counter += 1;
        let mut name = format!("{}{}", kind.prefix(), counter);
        while self.lookup.contains_key(&name) {
            *counter += 1;
            name = format!("{}{}", kind.prefix(), counter);
        }
        self.insert(Variable {
            name: name.clone(),
            value: value.into(),
            kind,
        });
        name
    }

    pub(crate) fn add_query(&mut self, text: &str, statement: Statement) -> String {
        let name = self.add(VariableKind::Query, text.trim());
        self.queries.insert(name.clone(), statement);
        name
    }

    /// `declare name = 'value'`; redeclaring replaces the value
    pub(crate) fn declare(&mut self, name: &str, value: &str) {
        self.insert(Variable {
            name: name.to_string(),
            value: value.to_string(),
            kind: VariableKind::Scalar,
        });
    }

    fn insert(&mut self, variable: Variable) {
        match self.lookup.get(&variable.name) {
            Some(&i) => self.variables[i] = variable,
            None => {
                self.lookup.insert(variable.name.clone(), self.variables.len());
                self.variables.push(variable);
            }
        }
    }
}
