//! # relorm
//!
//! Relation-aware query resolution and filter compilation for model graphs
//! over SQL.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          Models (ModelDef, Relations, Behaviors)         │
//! │          declared in Rust or loaded from TOML            │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [resolver]
//! ┌─────────────────────────────────────────────────────────┐
//! │       Relation paths -> aliases, joins, columns          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [filter processor]
//! ┌─────────────────────────────────────────────────────────┐
//! │   Filter tree -> WHERE, to-many filters -> (NOT) EXISTS  │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [sql]
//! ┌─────────────────────────────────────────────────────────┐
//! │                 SELECT for one dialect                   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [hydrator]
//! ┌─────────────────────────────────────────────────────────┐
//! │                  Nested model instances                  │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod model;
pub mod orm;
pub mod sql;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::model::{ModelDef, ModelSpec, RelationKind, RelationSpec, Row, Schema, Value};
    pub use crate::orm::{
        Connection, Filter, FilterValue, Instance, Operator, Query, QueryOptions, ResultSet,
        SqliteConnection,
    };
    pub use crate::sql::{Dialect, SortDir};
}

pub use orm::{Filter, Instance, Query};
pub use sql::Dialect;
