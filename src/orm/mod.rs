//! Query resolution, filter compilation and hydration.
//!
//! - [`resolver`] - relation paths, aliases and columns of one query
//! - [`filter`] - filter trees
//! - [`filter_processor`] - filter resolution and subquery extraction
//! - [`query`] - query assembly and execution
//! - [`hydrator`] - rows back into instances
//! - [`connection`] - statement execution

pub mod connection;
pub mod error;
pub mod filter;
pub mod filter_processor;
pub mod hydrator;
pub mod instance;
pub mod query;
pub mod query_spec;
pub mod resolver;
pub mod result;

#[cfg(test)]
pub(crate) mod fixtures;

pub use connection::{Connection, RowIter, SqliteConnection};
pub use error::{ConnectionError, QueryError, QueryResult, ResolveError, ResolveResult};
pub use filter::{Chain, ChainKind, Condition, Filter, FilterValue, Operator};
pub use filter_processor::{CompiledFilter, FilterProcessor};
pub use hydrator::Hydrator;
pub use instance::{Deferred, Instance};
pub use query::{Query, QueryOptions, Select, SubQuerySource};
pub use query_spec::{ColumnSpec, FilterSpec, QuerySpec, QuerySpecError, ValueSpec};
pub use resolver::{qualify_column, ColumnRef, ColumnTarget, ResolvedRelation, Resolver};
pub use result::ResultSet;
