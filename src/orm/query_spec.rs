//! Queries declared in TOML.
//!
//! ```toml
//! model = "host"
//! columns = ["name", { column = "services.name", alias = "service" }]
//! order_by = ["name desc"]
//! limit = 25
//!
//! [filter]
//! all = [
//!     { column = "services.name", op = "~", value = "http*" },
//!     { none = [{ column = "state", value = [1, 2] }] },
//! ]
//! ```

use std::fs;
use std::path::Path;
use std::rc::Rc;

use serde::Deserialize;
use thiserror::Error;

use super::error::ResolveError;
use super::filter::{Filter, FilterValue, Operator};
use super::query::{Query, QueryOptions};
use crate::model::{Schema, SortSpec, Value};

/// Errors that can occur when loading a query file.
#[derive(Debug, Error)]
pub enum QuerySpecError {
    #[error("Failed to read query file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse query file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown filter operator '{0}'")]
    UnknownOperator(String),

    #[error("Invalid sort '{0}', expected '<column> [asc|desc]'")]
    InvalidSort(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

fn default_operator() -> String {
    "=".to_string()
}

/// Value side of a declared condition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ValueSpec {
    List(Vec<Value>),
    Single(Value),
}

/// A selected column, optionally under an explicit result alias.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ColumnSpec {
    Plain(String),
    Aliased { column: String, alias: String },
}

/// A declared filter rule.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FilterSpec {
    All {
        all: Vec<FilterSpec>,
    },
    Any {
        any: Vec<FilterSpec>,
    },
    None {
        none: Vec<FilterSpec>,
    },
    Condition {
        column: String,
        #[serde(default = "default_operator")]
        op: String,
        value: ValueSpec,
    },
}

impl FilterSpec {
    pub fn to_filter(&self) -> Result<Filter, QuerySpecError> {
        let rules = |specs: &[FilterSpec]| -> Result<Vec<Filter>, QuerySpecError> {
            specs.iter().map(FilterSpec::to_filter).collect()
        };
        Ok(match self {
            FilterSpec::All { all } => Filter::all(rules(all)?),
            FilterSpec::Any { any } => Filter::any(rules(any)?),
            FilterSpec::None { none } => Filter::none(rules(none)?),
            FilterSpec::Condition { column, op, value } => {
                let operator = Operator::from_symbol(op)
                    .ok_or_else(|| QuerySpecError::UnknownOperator(op.clone()))?;
                let value = match value {
                    ValueSpec::List(values) => FilterValue::List(values.clone()),
                    ValueSpec::Single(value) => FilterValue::Single(value.clone()),
                };
                Filter::condition(column, operator, value)
            }
        })
    }
}

/// A declared query.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuerySpec {
    pub model: String,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub with: Vec<String>,
    #[serde(default)]
    pub utilize: Vec<String>,
    #[serde(default)]
    pub filter: Option<FilterSpec>,
    #[serde(default)]
    pub order_by: Vec<String>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

impl QuerySpec {
    pub fn from_toml(content: &str) -> Result<Self, QuerySpecError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, QuerySpecError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Build the query against `schema`.
    pub fn to_query(&self, schema: Rc<Schema>, options: QueryOptions) -> Result<Query, QuerySpecError> {
        let mut query = Query::new(schema, &self.model)?.options(options);
        for column in &self.columns {
            query = match column {
                ColumnSpec::Plain(column) => query.columns(&[column.as_str()]),
                ColumnSpec::Aliased { column, alias } => {
                    query.columns_aliased(&[(column.as_str(), alias.as_str())])
                }
            };
        }
        for path in &self.with {
            query = query.with_relation(path);
        }
        for path in &self.utilize {
            query = query.utilize(path);
        }
        if let Some(filter) = &self.filter {
            query = query.filter(filter.to_filter()?);
        }
        for sort in &self.order_by {
            let spec =
                SortSpec::parse(sort).ok_or_else(|| QuerySpecError::InvalidSort(sort.clone()))?;
            query = query.order_by(&spec.column, spec.dir);
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        if let Some(offset) = self.offset {
            query = query.offset(offset);
        }
        Ok(query)
    }
}
