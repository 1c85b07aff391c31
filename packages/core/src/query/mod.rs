//! Query Language
//!
//! ```text
//! select > from [plant:/area1/*] where (state(.) = 'RUNNING') take 10
//! ```
//!
//! Query text is tokenized ([`lexer`]), parsed into [`Statement`]s ([`parser`]) and
//! collected with their variable table in a [`QueryScope`]. Parsing never fails; the
//! engine decides what a partially parsed statement means at execution time.

pub mod functions;
pub mod lexer;
pub mod parser;
pub mod scope;
pub mod statement;

pub use parser::parse;
pub use scope::{QueryScope, Variable, VariableKind};
pub use statement::{
    Condition, ConditionGroup, GroupOperator, Operator, QuerySelect, SelectType, Statement, TimeBound,
};
