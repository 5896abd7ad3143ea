//! SQL generation module.
//!
//! A type-safe SQL builder that renders multi-dialect SELECT statements:
//!
//! - [`query`] - SELECT query builder
//! - [`expr`] - Expression AST and builder DSL
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - SQL dialect implementations

pub mod dialect;
pub mod expr;
pub mod query;
pub mod token;

#[doc(hidden)]
pub mod test_utils;

pub use dialect::{Dialect, SqlDialect};
pub use expr::{
    all_of, any_of, col, count_distinct, count_star, exists, lit_bool, lit_float, lit_int,
    lit_null, lit_str, not_exists, raw_sql, star, table_col, BinaryOperator, Expr, ExprExt,
    Literal, UnaryOperator,
};
pub use query::{Join, JoinType, LimitOffset, OrderByExpr, Query, SelectExpr, SortDir, TableRef};
pub use token::{Token, TokenStream};
