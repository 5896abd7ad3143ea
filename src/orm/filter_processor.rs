//! Filter compilation.
//!
//! [`FilterProcessor`] turns a caller's [`Filter`] tree into a resolved tree
//! and finally into a WHERE expression. Resolution happens on a copy; the
//! caller's tree is never touched.
//!
//! # Subquery extraction
//!
//! A join on a to-many relation multiplies base rows, so two conditions on
//! the same related column can be satisfied by two different related rows,
//! and a negated condition only excludes the joined row instead of the base
//! row. Within every chain the processor therefore:
//!
//! 1. moves each negated condition (`!=`, `!~`) on a relation into its own
//!    `NOT EXISTS` with the positive comparison,
//! 2. groups the remaining relation conditions by `(path, column)` and moves
//!    every group of two or more into an `EXISTS`. Per path the largest group
//!    drives and is emitted first; ties go to the group encountered first.
//!    Inside an `All` chain the subquery also requires
//!    `COUNT(DISTINCT key) >= N`.
//!
//! `COUNT(DISTINCT key)` counts matching related rows, not matched values. It
//! only stands for "all N conditions hold" when every condition is an
//! equality with its own single value. Any other group in an `All` chain
//! gets one `EXISTS` per condition instead.
//!
//! Paths that are eager loaded, or only cross to-one relations, stay joined.

use std::collections::HashSet;
use std::rc::Rc;

use tracing::{debug, trace};

use super::error::{ResolveError, ResolveResult};
use super::filter::{
    Chain, ChainKind, Condition, Filter, FilterValue, Operator, META_COLUMN_EXPRESSION,
    META_COLUMN_NAME, META_RELATION_PATH,
};
use super::query::{Query, SubQuerySource};
use super::resolver::{ColumnTarget, ResolvedRelation, Resolver};
use crate::model::{ModelDef, Value};
use crate::sql::{
    all_of, any_of, count_distinct, lit_bool, lit_int, lit_str, raw_sql, table_col, Expr, ExprExt,
};

/// Result of [`FilterProcessor::resolve`].
#[derive(Debug, Clone, Default)]
pub struct CompiledFilter {
    /// Resolved tree; `None` if nothing is left to filter on.
    pub filter: Option<Filter>,
    /// Canonical relation paths the remaining plain conditions need joined.
    pub required_paths: Vec<String>,
}

/// A resolved condition.
#[derive(Debug)]
struct Leaf {
    /// Condition after rewrites on its canonical column path, value unconverted.
    source: Condition,
    /// Condition with persisted value and resolution metadata.
    resolved: Condition,
    path: String,
    column: String,
    to_many: bool,
}

#[derive(Debug)]
enum Node {
    Leaf(Leaf),
    Compiled(Filter),
}

impl Node {
    fn into_filter(self) -> Filter {
        match self {
            Node::Leaf(leaf) => Filter::Condition(leaf.resolved),
            Node::Compiled(filter) => filter,
        }
    }
}

/// Conditions sharing a relation path and column.
struct Group {
    path: String,
    column: String,
    members: Vec<usize>,
}

/// Compiles filters against one query's resolver.
pub struct FilterProcessor<'a> {
    query: &'a Query,
    resolver: &'a mut Resolver,
    eager: &'a [String],
    optimize: bool,
}

impl<'a> FilterProcessor<'a> {
    /// `eager` lists the canonical paths the query joins for eager loading.
    pub fn new(query: &'a Query, resolver: &'a mut Resolver, eager: &'a [String]) -> Self {
        Self {
            query,
            resolver,
            eager,
            optimize: true,
        }
    }

    /// Enable or disable subquery extraction.
    pub fn optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    /// Resolve and optimize a filter tree.
    pub fn resolve(&mut self, filter: &Filter) -> ResolveResult<CompiledFilter> {
        let chain = match filter {
            Filter::Chain(chain) => chain.clone(),
            rule => Chain::new(ChainKind::All, vec![rule.clone()]),
        };
        let filter = self.compile_chain(chain, 0)?;

        let mut required_paths = Vec::new();
        if let Some(filter) = &filter {
            for condition in filter.conditions() {
                if let Some(path) = condition.relation_path() {
                    if !self.resolver.is_base(path) && !required_paths.iter().any(|p| p == path) {
                        required_paths.push(path.to_string());
                    }
                }
            }
        }
        trace!(?required_paths, "Compiled filter");
        Ok(CompiledFilter {
            filter,
            required_paths,
        })
    }

    /// Render a resolved tree as a WHERE expression.
    pub fn assemble(&mut self, filter: &Filter) -> ResolveResult<Option<Expr>> {
        match filter {
            Filter::Condition(condition) => self.condition_expr(condition).map(Some),
            Filter::Exists { subquery, negated } => Ok(Some(Expr::Exists {
                subquery: subquery.clone(),
                negated: *negated,
            })),
            Filter::Chain(chain) => {
                let mut parts = Vec::with_capacity(chain.rules.len());
                for rule in &chain.rules {
                    if let Some(expr) = self.assemble(rule)? {
                        parts.push(expr);
                    }
                }
                Ok(match chain.kind {
                    ChainKind::All => all_of(parts),
                    ChainKind::Any => any_of(parts),
                    ChainKind::None => any_of(parts).map(|expr| match expr {
                        paren @ Expr::Paren(_) => paren.not(),
                        other => other.paren().not(),
                    }),
                })
            }
        }
    }

    fn compile_chain(&mut self, chain: Chain, depth: usize) -> ResolveResult<Option<Filter>> {
        let mut nodes = Vec::with_capacity(chain.rules.len());
        for rule in chain.rules {
            if let Some(node) = self.resolve_rule(rule, depth)? {
                nodes.push(node);
            }
        }
        if nodes.is_empty() {
            return Ok(None);
        }

        let rules = if self.optimize {
            self.optimize_chain(chain.kind, nodes)?
        } else {
            nodes.into_iter().map(Node::into_filter).collect()
        };
        Ok(Some(Filter::Chain(Chain::new(chain.kind, rules))))
    }

    fn resolve_rule(&mut self, rule: Filter, depth: usize) -> ResolveResult<Option<Node>> {
        match rule {
            Filter::Condition(condition) => self.resolve_condition(condition, depth),
            Filter::Chain(chain) => Ok(self.compile_chain(chain, depth)?.map(Node::Compiled)),
            exists @ Filter::Exists { .. } => Ok(Some(Node::Compiled(exists))),
        }
    }

    fn resolve_condition(
        &mut self,
        condition: Condition,
        depth: usize,
    ) -> ResolveResult<Option<Node>> {
        let max = self.resolver.max_relation_depth();
        if depth > max {
            return Err(ResolveError::RelationDepthExceeded {
                path: condition.column,
                max,
            });
        }

        if let Some(replacement) = self.rewrite_condition(&condition)? {
            trace!(from = %condition.column, to = %replacement, "Rewrote condition");
            return self.resolve_rule(replacement, depth + 1);
        }

        let column = self.resolver.resolve_column(&condition.column)?;
        let to_many = self
            .resolver
            .resolve_relations(&column.path)?
            .iter()
            .any(|r| r.is_many());

        let mut source = condition;
        source.column = format!("{}.{}", column.path, column.column);

        let behaviors = self.resolver.behaviors_of(&column.model);
        let value = match source
            .value
            .clone()
            .try_map(|v| behaviors.persist_property(v, &column.column))
        {
            Ok(value) => value,
            Err(err) => {
                debug!(column = %source.column, error = %err, "Keeping filter value unconverted");
                source.value.clone()
            }
        };

        let mut resolved = Condition {
            column: source.column.clone(),
            operator: source.operator,
            value,
            meta: source.meta.clone(),
        };
        resolved.set_meta(META_RELATION_PATH, column.path.as_str());
        resolved.set_meta(META_COLUMN_NAME, column.column.as_str());
        if let ColumnTarget::Expression(sql) = &column.target {
            resolved.set_meta(META_COLUMN_EXPRESSION, sql.as_str());
        }

        Ok(Some(Node::Leaf(Leaf {
            source,
            resolved,
            path: column.path,
            column: column.column,
            to_many,
        })))
    }

    /// Offer the condition to the condition hooks of the base model, then of
    /// every model along its relation path.
    fn rewrite_condition(&mut self, condition: &Condition) -> ResolveResult<Option<Filter>> {
        let (path, name) = self.resolver.split_column(&condition.column);
        let base = self.resolver.base().clone();
        let base_alias = self.resolver.base_alias().to_string();
        if let Some(rule) = self.try_hook(&base, &base_alias, condition, &path, &name) {
            return Ok(Some(rule));
        }

        let chain = self.resolver.resolve_relations(&path)?;
        let canonical = chain
            .last()
            .map(|r| r.path.clone())
            .unwrap_or_else(|| base_alias.clone());
        for resolved in &chain {
            if let Some(rule) =
                self.try_hook(&resolved.target, &resolved.path, condition, &canonical, &name)
            {
                return Ok(Some(rule));
            }
        }
        Ok(None)
    }

    fn try_hook(
        &mut self,
        model: &Rc<dyn ModelDef>,
        model_path: &str,
        condition: &Condition,
        path: &str,
        name: &str,
    ) -> Option<Filter> {
        let relative = match path.strip_prefix(model_path) {
            Some("") => name.to_string(),
            Some(rest) => format!("{}.{}", rest.trim_start_matches('.'), name),
            None => return None,
        };
        let mut probe = condition.clone();
        probe.set_meta(META_COLUMN_NAME, relative);
        self.resolver
            .behaviors_of(model)
            .rewrite_condition(&probe, &format!("{}.", model_path))
    }

    fn optimize_chain(&mut self, kind: ChainKind, nodes: Vec<Node>) -> ResolveResult<Vec<Filter>> {
        let mut groups: Vec<Group> = Vec::new();
        for (i, node) in nodes.iter().enumerate() {
            let Node::Leaf(leaf) = node else { continue };
            if !self.is_candidate(leaf) || leaf.source.operator.is_negative() {
                continue;
            }
            match groups
                .iter_mut()
                .find(|g| g.path == leaf.path && g.column == leaf.column)
            {
                Some(group) => group.members.push(i),
                None => groups.push(Group {
                    path: leaf.path.clone(),
                    column: leaf.column.clone(),
                    members: vec![i],
                }),
            }
        }

        // Repeated groups per path, driving group first.
        let mut by_path: Vec<(&str, Vec<usize>)> = Vec::new();
        for (gi, group) in groups.iter().enumerate() {
            if group.members.len() < 2 {
                continue;
            }
            match by_path.iter_mut().find(|(path, _)| *path == group.path) {
                Some((_, repeated)) => repeated.push(gi),
                None => by_path.push((group.path.as_str(), vec![gi])),
            }
        }
        let mut extracted: Vec<Option<usize>> = vec![None; nodes.len()];
        for (pi, (_, repeated)) in by_path.iter_mut().enumerate() {
            // Stable, so ties keep filter order.
            repeated.sort_by(|a, b| groups[*b].members.len().cmp(&groups[*a].members.len()));
            for &gi in repeated.iter() {
                for &member in &groups[gi].members {
                    extracted[member] = Some(pi);
                }
            }
        }

        let mut slots: Vec<Option<Node>> = nodes.into_iter().map(Some).collect();
        let mut emitted = HashSet::new();
        let mut rules = Vec::with_capacity(slots.len());
        for i in 0..slots.len() {
            if let Some(pi) = extracted[i] {
                if emitted.insert(pi) {
                    for &gi in &by_path[pi].1 {
                        let leaves: Vec<Leaf> = groups[gi]
                            .members
                            .iter()
                            .filter_map(|&m| match slots[m].take() {
                                Some(Node::Leaf(leaf)) => Some(leaf),
                                _ => None,
                            })
                            .collect();
                        self.extract_group(leaves, kind, &mut rules)?;
                    }
                }
                continue;
            }

            match slots[i].take() {
                Some(Node::Leaf(leaf))
                    if leaf.source.operator.is_negative() && !self.resolver.is_base(&leaf.path) =>
                {
                    rules.push(self.extract(vec![leaf], false, true)?);
                }
                Some(node) => rules.push(node.into_filter()),
                None => {}
            }
        }
        Ok(rules)
    }

    /// Emit the subquery (or subqueries) of one repeated-column group.
    fn extract_group(
        &mut self,
        leaves: Vec<Leaf>,
        kind: ChainKind,
        rules: &mut Vec<Filter>,
    ) -> ResolveResult<()> {
        if kind != ChainKind::All || counts_distinct_values(&leaves) {
            rules.push(self.extract(leaves, kind == ChainKind::All, false)?);
            return Ok(());
        }
        trace!(conditions = leaves.len(), "Group can't be counted, one subquery per condition");
        for leaf in leaves {
            rules.push(self.extract(vec![leaf], false, false)?);
        }
        Ok(())
    }

    /// True if joining the leaf's path could multiply base rows.
    fn is_candidate(&self, leaf: &Leaf) -> bool {
        leaf.to_many && !self.resolver.is_base(&leaf.path) && !self.eager.contains(&leaf.path)
    }

    /// Move conditions on one relation path into a correlated subquery.
    fn extract(&mut self, leaves: Vec<Leaf>, require_all: bool, negated: bool) -> ResolveResult<Filter> {
        let path = leaves
            .first()
            .map(|l| l.path.clone())
            .ok_or_else(|| ResolveError::AliasNotRegistered(String::new()))?;
        let chain = self.resolver.resolve_relations(&path)?;
        let head: Rc<ResolvedRelation> = chain
            .first()
            .cloned()
            .ok_or_else(|| ResolveError::AliasNotRegistered(path.clone()))?;

        let mut rules: Vec<Filter> = leaves
            .iter()
            .map(|leaf| {
                let mut condition = leaf.source.clone();
                condition.column = relative_to(&condition.column, &head.path);
                if negated {
                    condition.operator = condition.operator.positive();
                }
                condition.meta.clear();
                Filter::Condition(condition)
            })
            .collect();
        let inner = if rules.len() == 1 {
            rules.remove(0)
        } else {
            Filter::any(rules)
        };

        let count = leaves.len();
        let sub = self
            .query
            .derive_correlated(self.resolver, &head, SubQuerySource::Outer)?
            .filter(inner);
        let select = sub.assemble_exists()?;
        let mut statement = select.statement;
        if require_all && count > 1 {
            let relative = relative_to(&path, &head.path);
            let target = select.resolver.target_of(&select.resolver.qualify_path(&relative))?;
            let alias = select.resolver.get_alias(&relative)?;
            let key = target
                .key_name()
                .into_iter()
                .next()
                .ok_or_else(|| ResolveError::MissingKeyValue {
                    model: target.name().to_string(),
                    column: String::new(),
                })?;
            statement = statement
                .group_by(sub.correlation_columns().to_vec())
                .having(count_distinct(table_col(alias, &key)).gte(lit_int(count as i64)));
        }

        debug!(
            path = %path,
            conditions = count,
            negated,
            "Extracted relation filter into subquery"
        );
        Ok(Filter::Exists {
            subquery: Box::new(statement),
            negated,
        })
    }

    fn condition_expr(&mut self, condition: &Condition) -> ResolveResult<Expr> {
        let column = match condition.meta(META_COLUMN_EXPRESSION) {
            Some(sql) => raw_sql(sql),
            None => self.resolver.resolve_column(&condition.column)?.to_expr(),
        };
        let null_safe = condition
            .relation_path()
            .map_or(true, |path| self.resolver.is_base(path));
        Ok(comparison(column, condition.operator, &condition.value, null_safe))
    }
}

/// True if every leaf is an equality with its own single, non-NULL value,
/// so that N matching related rows mean N satisfied conditions.
fn counts_distinct_values(leaves: &[Leaf]) -> bool {
    let mut values: Vec<&Value> = Vec::with_capacity(leaves.len());
    for leaf in leaves {
        match (&leaf.resolved.operator, &leaf.resolved.value) {
            (Operator::Equal, FilterValue::Single(value)) if !value.is_null() => {
                if values.contains(&value) {
                    return false;
                }
                values.push(value);
            }
            _ => return false,
        }
    }
    true
}

/// Strip a relation path prefix from a column or relation path.
fn relative_to(path: &str, prefix: &str) -> String {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.trim_start_matches('.').to_string(),
        None => path.to_string(),
    }
}

fn like_pattern(value: &Value) -> Expr {
    match value {
        Value::Text(s) => lit_str(&s.replace('*', "%")),
        other => other.to_expr(),
    }
}

/// Render one comparison.
///
/// With `null_safe`, negated comparisons also match NULL, so that `!=` and
/// `!~` return every row the positive form would not.
fn comparison(column: Expr, operator: Operator, value: &FilterValue, null_safe: bool) -> Expr {
    let or_null = |expr: Expr, column: Expr| {
        if null_safe {
            expr.or(column.is_null()).paren()
        } else {
            expr
        }
    };

    match (operator, value) {
        (Operator::Equal, FilterValue::Single(Value::Null)) => column.is_null(),
        (Operator::Unequal, FilterValue::Single(Value::Null)) => column.is_not_null(),
        (Operator::Equal, FilterValue::Single(v)) => column.eq(v.to_expr()),
        (Operator::Equal, FilterValue::List(vs)) => {
            column.in_list(vs.iter().map(Value::to_expr).collect())
        }
        (Operator::Unequal, FilterValue::Single(v)) => or_null(column.clone().ne(v.to_expr()), column),
        (Operator::Unequal, FilterValue::List(vs)) => or_null(
            column.clone().not_in_list(vs.iter().map(Value::to_expr).collect()),
            column,
        ),
        (Operator::Like, FilterValue::Single(v)) => column.like(like_pattern(v)),
        (Operator::Like, FilterValue::List(vs)) => any_of(
            vs.iter()
                .map(|v| column.clone().like(like_pattern(v)))
                .collect(),
        )
        .unwrap_or_else(|| lit_bool(false)),
        (Operator::Unlike, FilterValue::Single(v)) => {
            or_null(column.clone().not_like(like_pattern(v)), column)
        }
        (Operator::Unlike, FilterValue::List(vs)) => {
            let parts = vs
                .iter()
                .map(|v| column.clone().not_like(like_pattern(v)))
                .collect();
            match all_of(parts) {
                Some(expr) => or_null(expr, column),
                None => lit_bool(true),
            }
        }
        (op, FilterValue::Single(v)) => ordering(column, op, v.to_expr()),
        (op, FilterValue::List(vs)) => any_of(
            vs.iter()
                .map(|v| ordering(column.clone(), op, v.to_expr()))
                .collect(),
        )
        .unwrap_or_else(|| lit_bool(false)),
    }
}

fn ordering(column: Expr, operator: Operator, value: Expr) -> Expr {
    match operator {
        Operator::LessThan => column.lt(value),
        Operator::LessThanOrEqual => column.lte(value),
        Operator::GreaterThan => column.gt(value),
        Operator::GreaterThanOrEqual => column.gte(value),
        Operator::Equal => column.eq(value),
        Operator::Unequal => column.ne(value),
        Operator::Like => column.like(value),
        Operator::Unlike => column.not_like(value),
    }
}
