//! Error types for query resolution and execution.

use thiserror::Error;

/// Result type for resolution and assembly.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Result type for executing queries.
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors raised while resolving columns, relations and filters.
///
/// Resolution is all-or-nothing: any of these aborts the statement
/// before it reaches the connection.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    /// Column unknown on the resolved target model.
    #[error("Can't resolve column '{column}' on model '{model}'")]
    ColumnNotFound { model: String, column: String },

    /// Unknown relation segment in a dotted path.
    #[error("Can't resolve relation '{relation}' on model '{model}'")]
    RelationNotFound { model: String, relation: String },

    /// An alias was requested for a path that was never resolved.
    ///
    /// This is a programming error, never caused by user input.
    #[error("No alias registered for '{0}'")]
    AliasNotRegistered(String),

    /// A model name is not part of the schema.
    #[error("Unknown model '{0}'")]
    UnknownModel(String),

    /// Path rewrites or nesting went deeper than allowed.
    #[error("Relation path '{path}' exceeds the maximum depth of {max}")]
    RelationDepthExceeded { path: String, max: usize },

    /// Candidate and foreign key lists differ in length.
    #[error("Relation '{relation}' has {candidate} candidate key(s) but {foreign} foreign key(s)")]
    KeyMismatch {
        relation: String,
        candidate: usize,
        foreign: usize,
    },

    /// Two different columns would be selected under one result alias.
    #[error("Result alias '{alias}' is claimed by both '{first}' and '{second}'")]
    DuplicateAlias {
        alias: String,
        first: String,
        second: String,
    },

    /// A concrete instance lacks the key value a sub-query is bound to.
    #[error("Instance of '{model}' has no value for key column '{column}'")]
    MissingKeyValue { model: String, column: String },
}

/// Errors raised by the connection layer.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Unsupported column type in '{column}'")]
    UnsupportedType { column: String },
}

/// Errors raised while executing a query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The result set was opened in single-pass mode.
    #[error("Result set is not cached and can't be rewound")]
    NotRewindable,

    /// COUNT(*) did not return an integer.
    #[error("Unexpected count result: {0}")]
    InvalidCount(String),
}
