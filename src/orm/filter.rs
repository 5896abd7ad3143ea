//! Filter trees.
//!
//! A filter is either a [`Condition`] leaf comparing a column to a value or
//! a [`Chain`] combining child rules with `All`/`Any`/`None` semantics.
//! Compiled filters may also contain [`Filter::Exists`] nodes carrying the
//! correlated subqueries the optimizer extracted.

use std::collections::BTreeMap;
use std::fmt;

use crate::model::Value;
use crate::sql;

/// Metadata key: column name relative to the model the condition is evaluated on.
pub const META_COLUMN_NAME: &str = "column_name";
/// Metadata key: resolved relation path of the condition's column.
pub const META_RELATION_PATH: &str = "relation_path";
/// Metadata key: raw SQL replacing the column (set by column rewrites).
pub const META_COLUMN_EXPRESSION: &str = "column_expression";

/// Comparison operator of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equal,
    Unequal,
    Like,
    Unlike,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl Operator {
    /// Parse the textual operator used in query files and URLs.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "=" => Operator::Equal,
            "!=" => Operator::Unequal,
            "~" => Operator::Like,
            "!~" => Operator::Unlike,
            "<" => Operator::LessThan,
            "<=" => Operator::LessThanOrEqual,
            ">" => Operator::GreaterThan,
            ">=" => Operator::GreaterThanOrEqual,
            _ => return None,
        })
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::Unequal => "!=",
            Operator::Like => "~",
            Operator::Unlike => "!~",
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
        }
    }

    /// True for operators that exclude matches rather than require them.
    pub fn is_negative(&self) -> bool {
        matches!(self, Operator::Unequal | Operator::Unlike)
    }

    /// The positive counterpart of a negative operator.
    pub fn positive(&self) -> Self {
        match self {
            Operator::Unequal => Operator::Equal,
            Operator::Unlike => Operator::Like,
            other => *other,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Value side of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Single(Value),
    List(Vec<Value>),
}

impl FilterValue {
    /// Apply `f` to every contained value, stopping at the first error.
    pub fn try_map<E>(self, mut f: impl FnMut(Value) -> Result<Value, E>) -> Result<Self, E> {
        Ok(match self {
            FilterValue::Single(v) => FilterValue::Single(f(v)?),
            FilterValue::List(vs) => {
                FilterValue::List(vs.into_iter().map(f).collect::<Result<_, _>>()?)
            }
        })
    }
}

macro_rules! single_filter_value {
    ($($t:ty),*) => {
        $(
            impl From<$t> for FilterValue {
                fn from(v: $t) -> Self {
                    FilterValue::Single(v.into())
                }
            }
        )*
    };
}

single_filter_value!(Value, &str, String, i64, i32, f64, bool);

impl From<Vec<Value>> for FilterValue {
    fn from(values: Vec<Value>) -> Self {
        FilterValue::List(values)
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Single(v) => write!(f, "{}", v),
            FilterValue::List(vs) => {
                let parts: Vec<String> = vs.iter().map(|v| v.to_string()).collect();
                write!(f, "({})", parts.join(", "))
            }
        }
    }
}

/// Leaf comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub operator: Operator,
    pub value: FilterValue,
    /// Side state of resolution and behaviors.
    pub meta: BTreeMap<String, String>,
}

impl Condition {
    pub fn new(column: &str, operator: Operator, value: impl Into<FilterValue>) -> Self {
        Self {
            column: column.into(),
            operator,
            value: value.into(),
            meta: BTreeMap::new(),
        }
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }

    pub fn set_meta(&mut self, key: &str, value: impl Into<String>) {
        self.meta.insert(key.into(), value.into());
    }

    /// Column name relative to the model currently looking at the condition.
    pub fn column_name(&self) -> Option<&str> {
        self.meta(META_COLUMN_NAME)
    }

    pub fn relation_path(&self) -> Option<&str> {
        self.meta(META_RELATION_PATH)
    }

    /// Same comparison on another column, without metadata.
    pub fn with_column(&self, column: String) -> Self {
        Self {
            column,
            operator: self.operator,
            value: self.value.clone(),
            meta: BTreeMap::new(),
        }
    }
}

/// Boolean combination of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainKind {
    /// Every rule must match (AND).
    All,
    /// At least one rule must match (OR).
    Any,
    /// No rule may match (NOT (a OR b)).
    None,
}

/// Composite rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    pub kind: ChainKind,
    pub rules: Vec<Filter>,
}

impl Chain {
    pub fn new(kind: ChainKind, rules: Vec<Filter>) -> Self {
        Self { kind, rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// A filter rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Condition(Condition),
    Chain(Chain),
    /// Correlated (NOT) EXISTS produced by the filter optimizer.
    Exists {
        subquery: Box<sql::Query>,
        negated: bool,
    },
}

impl Filter {
    pub fn all(rules: Vec<Filter>) -> Self {
        Filter::Chain(Chain::new(ChainKind::All, rules))
    }

    pub fn any(rules: Vec<Filter>) -> Self {
        Filter::Chain(Chain::new(ChainKind::Any, rules))
    }

    pub fn none(rules: Vec<Filter>) -> Self {
        Filter::Chain(Chain::new(ChainKind::None, rules))
    }

    pub fn condition(column: &str, operator: Operator, value: impl Into<FilterValue>) -> Self {
        Filter::Condition(Condition::new(column, operator, value))
    }

    pub fn equal(column: &str, value: impl Into<FilterValue>) -> Self {
        Self::condition(column, Operator::Equal, value)
    }

    pub fn unequal(column: &str, value: impl Into<FilterValue>) -> Self {
        Self::condition(column, Operator::Unequal, value)
    }

    pub fn like(column: &str, value: impl Into<FilterValue>) -> Self {
        Self::condition(column, Operator::Like, value)
    }

    pub fn unlike(column: &str, value: impl Into<FilterValue>) -> Self {
        Self::condition(column, Operator::Unlike, value)
    }

    pub fn less_than(column: &str, value: impl Into<FilterValue>) -> Self {
        Self::condition(column, Operator::LessThan, value)
    }

    pub fn less_than_or_equal(column: &str, value: impl Into<FilterValue>) -> Self {
        Self::condition(column, Operator::LessThanOrEqual, value)
    }

    pub fn greater_than(column: &str, value: impl Into<FilterValue>) -> Self {
        Self::condition(column, Operator::GreaterThan, value)
    }

    pub fn greater_than_or_equal(column: &str, value: impl Into<FilterValue>) -> Self {
        Self::condition(column, Operator::GreaterThanOrEqual, value)
    }

    /// Match any of the given values (`IN`).
    pub fn one_of(column: &str, values: Vec<Value>) -> Self {
        Self::condition(column, Operator::Equal, FilterValue::List(values))
    }

    /// AND two rules, flattening into an existing `All` chain.
    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::Chain(Chain {
                kind: ChainKind::All,
                mut rules,
            }) => {
                rules.push(other);
                Filter::all(rules)
            }
            rule => Filter::all(vec![rule, other]),
        }
    }

    /// Visit every condition, depth first.
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        self.collect_conditions(&mut out);
        out
    }

    fn collect_conditions<'a>(&'a self, out: &mut Vec<&'a Condition>) {
        match self {
            Filter::Condition(c) => out.push(c),
            Filter::Chain(chain) => {
                for rule in &chain.rules {
                    rule.collect_conditions(out);
                }
            }
            Filter::Exists { .. } => {}
        }
    }

    /// Count EXISTS nodes (negated or not), for diagnostics.
    pub fn subquery_count(&self) -> usize {
        match self {
            Filter::Condition(_) => 0,
            Filter::Exists { .. } => 1,
            Filter::Chain(chain) => chain.rules.iter().map(Filter::subquery_count).sum(),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Condition(c) => write!(f, "{}{}{}", c.column, c.operator, c.value),
            Filter::Chain(chain) => {
                let keyword = match chain.kind {
                    ChainKind::All => "all",
                    ChainKind::Any => "any",
                    ChainKind::None => "none",
                };
                write!(f, "{}(", keyword)?;
                for (i, rule) in chain.rules.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", rule)?;
                }
                write!(f, ")")
            }
            Filter::Exists { negated, .. } => {
                write!(f, "{}", if *negated { "not exists(..)" } else { "exists(..)" })
            }
        }
    }
}
