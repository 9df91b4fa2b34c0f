//! Read-only SQL dialect.
//!
//! Statements are recognized with regular expressions rather than a full
//! grammar; the dialect covers what clients and GUI tools send against a
//! read-only, schema-less record store (see [`Statement`]).

mod error;
mod split;
mod statement;

pub use error::ParseError;
pub use split::{split_statements, strip_comments};
pub use statement::{
    CompareOp, Condition, Function, Literal, OrderBy, Projection, ProjectionItem, Select,
    SelectItem, Statement, ValueExpr, parse,
};
