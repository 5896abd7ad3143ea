//! Behaviors: pluggable hooks attached to a model.
//!
//! A behavior exposes any subset of the hook capabilities below. The
//! [`Behaviors`] collection invokes them in registration order. Hooks are
//! pure functions of their input; side state belongs in the condition's
//! metadata.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use super::Value;
use crate::orm::filter::{Condition, Filter};

/// A behavior could not convert a value for persistence.
///
/// Filter compilation tolerates this and keeps the original literal.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Can't convert '{value}' for column '{column}': {reason}")]
pub struct ValueConversionError {
    pub column: String,
    pub value: String,
    pub reason: String,
}

/// What a column rewrite turns a column into.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnRewrite {
    /// Another selectable column of the same model.
    Renamed(String),
    /// A raw SQL expression, used verbatim.
    Expression(String),
}

/// Converts stored values into their property representation.
pub trait RetrieveHook {
    fn retrieve_property(&self, value: Value, key: &str) -> Value;
}

/// Converts property values into their stored representation.
pub trait PersistHook {
    fn persist_property(&self, value: Value, key: &str) -> Result<Value, ValueConversionError>;
}

/// Replaces a whole filter condition.
///
/// `relation_prefix` is the relation path of the model owning the behavior,
/// followed by a dot. The condition's `column_name` metadata holds the
/// column path relative to that model.
pub trait RewriteConditionHook {
    fn rewrite_condition(&self, condition: &Condition, relation_prefix: &str) -> Option<Filter>;
}

/// Replaces a relation path relative to the owning model.
pub trait RewritePathHook {
    fn rewrite_path(&self, path: &str, relation_prefix: &str) -> Option<String>;
}

/// Replaces a column of the owning model.
pub trait RewriteColumnHook {
    fn rewrite_column(&self, column: &str, relation_prefix: &str) -> Option<ColumnRewrite>;
}

/// A behavior, described by the hook capabilities it offers.
pub trait Behavior: fmt::Debug {
    fn retrieve_hook(&self) -> Option<&dyn RetrieveHook> {
        None
    }

    fn persist_hook(&self) -> Option<&dyn PersistHook> {
        None
    }

    fn condition_hook(&self) -> Option<&dyn RewriteConditionHook> {
        None
    }

    fn path_hook(&self) -> Option<&dyn RewritePathHook> {
        None
    }

    fn column_hook(&self) -> Option<&dyn RewriteColumnHook> {
        None
    }
}

/// Ordered behaviors of one model.
#[derive(Debug, Default)]
pub struct Behaviors {
    behaviors: Vec<Box<dyn Behavior>>,
}

impl Behaviors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, behavior: impl Behavior + 'static) -> &mut Self {
        self.behaviors.push(Box::new(behavior));
        self
    }

    pub fn add_boxed(&mut self, behavior: Box<dyn Behavior>) -> &mut Self {
        self.behaviors.push(behavior);
        self
    }

    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }

    /// Run every retrieve hook, each on the previous one's output.
    pub fn retrieve_property(&self, value: Value, key: &str) -> Value {
        self.behaviors
            .iter()
            .filter_map(|b| b.retrieve_hook())
            .fold(value, |v, hook| hook.retrieve_property(v, key))
    }

    /// Run every persist hook, each on the previous one's output.
    pub fn persist_property(&self, value: Value, key: &str) -> Result<Value, ValueConversionError> {
        self.behaviors
            .iter()
            .filter_map(|b| b.persist_hook())
            .try_fold(value, |v, hook| hook.persist_property(v, key))
    }

    /// The first condition rewrite offered, if any.
    pub fn rewrite_condition(&self, condition: &Condition, relation_prefix: &str) -> Option<Filter> {
        self.behaviors
            .iter()
            .filter_map(|b| b.condition_hook())
            .find_map(|hook| hook.rewrite_condition(condition, relation_prefix))
    }

    /// The first path rewrite offered, if any.
    pub fn rewrite_path(&self, path: &str, relation_prefix: &str) -> Option<String> {
        self.behaviors
            .iter()
            .filter_map(|b| b.path_hook())
            .find_map(|hook| hook.rewrite_path(path, relation_prefix))
    }

    /// The first column rewrite offered, if any.
    pub fn rewrite_column(&self, column: &str, relation_prefix: &str) -> Option<ColumnRewrite> {
        self.behaviors
            .iter()
            .filter_map(|b| b.column_hook())
            .find_map(|hook| hook.rewrite_column(column, relation_prefix))
    }
}

// =============================================================================
// Built-in behaviors
// =============================================================================

/// Maps stored flag literals (`y`/`n` by default) to booleans and back.
#[derive(Debug, Clone)]
pub struct BoolCast {
    columns: Vec<String>,
    true_value: Value,
    false_value: Value,
}

impl BoolCast {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            true_value: Value::from("y"),
            false_value: Value::from("n"),
        }
    }

    pub fn with_literals(mut self, true_value: Value, false_value: Value) -> Self {
        self.true_value = true_value;
        self.false_value = false_value;
        self
    }

    fn applies_to(&self, key: &str) -> bool {
        self.columns.iter().any(|c| c == key)
    }
}

impl Behavior for BoolCast {
    fn retrieve_hook(&self) -> Option<&dyn RetrieveHook> {
        Some(self)
    }

    fn persist_hook(&self) -> Option<&dyn PersistHook> {
        Some(self)
    }
}

impl RetrieveHook for BoolCast {
    fn retrieve_property(&self, value: Value, key: &str) -> Value {
        if !self.applies_to(key) {
            return value;
        }
        if value == self.true_value {
            Value::Bool(true)
        } else if value == self.false_value {
            Value::Bool(false)
        } else {
            value
        }
    }
}

impl PersistHook for BoolCast {
    fn persist_property(&self, value: Value, key: &str) -> Result<Value, ValueConversionError> {
        if !self.applies_to(key) || value.is_null() {
            return Ok(value);
        }
        if value == self.true_value || value == self.false_value {
            return Ok(value);
        }

        let flag = match &value {
            Value::Bool(b) => Some(*b),
            Value::Int(1) => Some(true),
            Value::Int(0) => Some(false),
            Value::Text(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" | "y" | "yes" => Some(true),
                "false" | "0" | "n" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        };

        match flag {
            Some(true) => Ok(self.true_value.clone()),
            Some(false) => Ok(self.false_value.clone()),
            None => Err(ValueConversionError {
                column: key.to_string(),
                value: value.to_string(),
                reason: "not a boolean".to_string(),
            }),
        }
    }
}

/// Re-routes relation paths, e.g. `hostgroup` to `host.hostgroup`.
#[derive(Debug, Clone, Default)]
pub struct ReRoute {
    routes: BTreeMap<String, String>,
}

impl ReRoute {
    pub fn new(routes: &[(&str, &str)]) -> Self {
        Self {
            routes: routes
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        }
    }
}

impl Behavior for ReRoute {
    fn condition_hook(&self) -> Option<&dyn RewriteConditionHook> {
        Some(self)
    }

    fn path_hook(&self) -> Option<&dyn RewritePathHook> {
        Some(self)
    }
}

impl RewritePathHook for ReRoute {
    fn rewrite_path(&self, path: &str, _relation_prefix: &str) -> Option<String> {
        let (first, rest) = match path.split_once('.') {
            Some((first, rest)) => (first, Some(rest)),
            None => (path, None),
        };
        let target = self.routes.get(first)?;
        Some(match rest {
            Some(rest) => format!("{}.{}", target, rest),
            None => target.clone(),
        })
    }
}

impl RewriteConditionHook for ReRoute {
    fn rewrite_condition(&self, condition: &Condition, relation_prefix: &str) -> Option<Filter> {
        let remaining = condition.column_name()?;
        let (path, column) = remaining.rsplit_once('.')?;
        let rerouted = self.rewrite_path(path, relation_prefix)?;
        let column = format!("{}{}.{}", relation_prefix, rerouted, column);
        Some(Filter::Condition(condition.with_column(column)))
    }
}

/// Maps legacy column names to real ones.
#[derive(Debug, Clone, Default)]
pub struct Rename {
    columns: BTreeMap<String, String>,
}

impl Rename {
    pub fn new(columns: &[(&str, &str)]) -> Self {
        Self {
            columns: columns
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        }
    }
}

impl Behavior for Rename {
    fn column_hook(&self) -> Option<&dyn RewriteColumnHook> {
        Some(self)
    }
}

impl RewriteColumnHook for Rename {
    fn rewrite_column(&self, column: &str, _relation_prefix: &str) -> Option<ColumnRewrite> {
        self.columns
            .get(column)
            .map(|real| ColumnRewrite::Renamed(real.clone()))
    }
}
