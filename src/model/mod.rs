//! Model descriptors.
//!
//! A model describes one queryable entity: its table, keys, selectable
//! columns, relations, behaviors and defaults. Relations, behaviors and
//! defaults are produced by factory methods so that they are only built
//! when a query actually needs them.

pub mod behavior;
pub mod defaults;
pub mod loader;
pub mod relation;
pub mod schema;
pub mod types;

pub use behavior::{
    Behavior, Behaviors, BoolCast, ColumnRewrite, PersistHook, ReRoute, Rename, RetrieveHook,
    RewriteColumnHook, RewriteConditionHook, RewritePathHook, ValueConversionError,
};
pub use defaults::{DefaultValue, Defaults};
pub use loader::{BehaviorSpec, JoinSpec, ModelSpec, RelationSpec, SchemaError};
pub use relation::{Cardinality, Hop, Relation, RelationKind, Relations, Through};
pub use schema::{RelationEdge, RelationGraph, Schema};
pub use types::{Row, Value};

use std::fmt;

use crate::sql::SortDir;

/// One entry of a sort order.
#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    /// Column path, relative to the model or qualified with its alias.
    pub column: String,
    pub dir: SortDir,
}

impl SortSpec {
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.into(),
            dir: SortDir::Asc,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            column: column.into(),
            dir: SortDir::Desc,
        }
    }

    /// Parse `"column"`, `"column asc"` or `"column desc"`.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split_whitespace();
        let column = parts.next()?;
        let dir = match parts.next().map(|d| d.to_ascii_lowercase()) {
            None => SortDir::Asc,
            Some(d) if d == "asc" => SortDir::Asc,
            Some(d) if d == "desc" => SortDir::Desc,
            Some(_) => return None,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            column: column.into(),
            dir,
        })
    }
}

/// Static schema descriptor of a queryable entity.
///
/// Implementations are immutable and shared by reference between queries.
pub trait ModelDef: fmt::Debug {
    /// Name other models use to reference this one in relations.
    fn name(&self) -> &str;

    fn table_name(&self) -> &str;

    /// Alias of the table when this model is the base of a query.
    fn table_alias(&self) -> &str {
        self.table_name()
    }

    /// Primary key column(s).
    fn key_name(&self) -> Vec<String> {
        vec!["id".to_string()]
    }

    /// Selectable columns.
    fn columns(&self) -> Vec<String>;

    fn has_column(&self, column: &str) -> bool {
        self.columns().iter().any(|c| c == column)
    }

    /// Sort applied when a query does not specify one.
    fn default_sort(&self) -> Vec<SortSpec> {
        Vec::new()
    }

    fn create_relations(&self, _relations: &mut Relations) {}

    fn create_behaviors(&self, _behaviors: &mut Behaviors) {}

    fn create_defaults(&self, _defaults: &mut Defaults) {}
}
