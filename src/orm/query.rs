//! Model queries.
//!
//! A [`Query`] collects what the caller wants (columns, eager relations,
//! filter, order, paging) and assembles it into a [`sql::Query`] on demand.
//! Assembly works on a copy of the query's [`Resolver`], so a query can be
//! assembled any number of times, and clones never share aliases.

use std::rc::Rc;

use tracing::debug;

use super::connection::Connection;
use super::error::{QueryError, QueryResult, ResolveError, ResolveResult};
use super::filter::Filter;
use super::filter_processor::FilterProcessor;
use super::hydrator::Hydrator;
use super::instance::Instance;
use super::resolver::{ColumnRef, ResolvedRelation, Resolver};
use super::result::ResultSet;
use crate::config::Settings;
use crate::model::{ModelDef, Schema, SortSpec};
use crate::sql::{
    self, all_of, count_distinct, count_star, lit_int, raw_sql, table_col, Dialect, Expr,
    ExprExt, Join, JoinType, OrderByExpr, SortDir, TableRef,
};

/// Knobs carried from [`Settings`] into queries.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub dialect: Dialect,
    /// Fetch one row beyond the limit to tell whether more rows exist.
    pub peek_ahead: bool,
    pub max_relation_depth: usize,
    pub subquery_alias_prefix: String,
    /// Keep hydrated instances so result sets can be rewound.
    pub cache_results: bool,
    /// Attach deferred loaders for relations that were not eager loaded.
    pub defer_relations: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            peek_ahead: false,
            max_relation_depth: super::resolver::DEFAULT_MAX_DEPTH,
            subquery_alias_prefix: "sub_".to_string(),
            cache_results: true,
            defer_relations: true,
        }
    }
}

impl From<&Settings> for QueryOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            dialect: settings.query.dialect,
            peek_ahead: settings.query.peek_ahead,
            max_relation_depth: settings.query.max_relation_depth,
            subquery_alias_prefix: settings.query.subquery_alias_prefix.clone(),
            cache_results: settings.result.cache,
            ..Self::default()
        }
    }
}

/// What a derived query is correlated with.
#[derive(Debug, Clone, Copy)]
pub enum SubQuerySource<'a> {
    /// Columns of the enclosing statement.
    Outer,
    /// Key values of a hydrated instance.
    Instance(&'a Instance),
}

/// An assembled statement plus the resolution state that produced it.
#[derive(Debug, Clone)]
pub struct Select {
    pub statement: sql::Query,
    pub resolver: Resolver,
    /// Resolved columns, in SELECT order.
    pub columns: Vec<ColumnRef>,
    /// Aliases of raw expressions in the SELECT list.
    pub expressions: Vec<String>,
    /// Canonical eager loaded paths, prefixes first.
    pub eager: Vec<String>,
    /// Requested limit when the statement fetches an extra row.
    pub peek_limit: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Shape {
    Rows,
    Count,
    Exists,
}

/// A query over one model.
#[derive(Debug, Clone)]
#[must_use = "Query has no effect until assembled or executed"]
pub struct Query {
    schema: Rc<Schema>,
    model: Rc<dyn ModelDef>,
    resolver: Resolver,
    options: QueryOptions,
    /// Requested column paths with their explicit result alias, if any.
    columns: Vec<(String, Option<String>)>,
    expressions: Vec<(String, String)>,
    with: Vec<String>,
    utilize: Vec<String>,
    filter: Option<Filter>,
    order_by: Vec<SortSpec>,
    limit: Option<u64>,
    offset: Option<u64>,
    correlation: Vec<Expr>,
    correlation_columns: Vec<Expr>,
    junctions: Vec<Join>,
    optimize_filter: bool,
}

impl Query {
    /// Query the model registered under `model`.
    pub fn new(schema: Rc<Schema>, model: &str) -> ResolveResult<Self> {
        let model = schema.get(model)?;
        Ok(Self::for_model(schema, model))
    }

    pub fn for_model(schema: Rc<Schema>, model: Rc<dyn ModelDef>) -> Self {
        let resolver = Resolver::new(schema.clone(), model.clone());
        Self::with_resolver(schema, model, resolver)
    }

    fn with_resolver(schema: Rc<Schema>, model: Rc<dyn ModelDef>, resolver: Resolver) -> Self {
        Self {
            schema,
            model,
            resolver,
            options: QueryOptions::default(),
            columns: Vec::new(),
            expressions: Vec::new(),
            with: Vec::new(),
            utilize: Vec::new(),
            filter: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            correlation: Vec::new(),
            correlation_columns: Vec::new(),
            junctions: Vec::new(),
            optimize_filter: true,
        }
    }

    pub fn options(mut self, options: QueryOptions) -> Self {
        self.resolver = self.resolver.max_depth(options.max_relation_depth);
        self.options = options;
        self
    }

    pub fn schema(&self) -> &Rc<Schema> {
        &self.schema
    }

    pub fn model(&self) -> &Rc<dyn ModelDef> {
        &self.model
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn query_options(&self) -> &QueryOptions {
        &self.options
    }

    /// Inner columns the correlation of a derived query binds.
    pub fn correlation_columns(&self) -> &[Expr] {
        &self.correlation_columns
    }

    /// Select these columns instead of the model's full column set.
    ///
    /// Columns on relations (`services.name`) load those relations eagerly.
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns.extend(columns.iter().map(|c| (c.to_string(), None)));
        self
    }

    /// Select columns under explicit result aliases, given as `(column, alias)`.
    ///
    /// The alias replaces `<tableAlias>_<column>` and is also the property
    /// name the value is hydrated under.
    pub fn columns_aliased(mut self, columns: &[(&str, &str)]) -> Self {
        self.columns.extend(
            columns
                .iter()
                .map(|(column, alias)| (column.to_string(), Some(alias.to_string()))),
        );
        self
    }

    /// Select a raw SQL expression under `alias`.
    pub fn with_expression(mut self, alias: &str, sql: &str) -> Self {
        self.expressions.push((alias.to_string(), sql.to_string()));
        self
    }

    /// Join and select a relation.
    pub fn with_relation(mut self, path: &str) -> Self {
        self.with.push(path.to_string());
        self
    }

    /// Join a relation without selecting it.
    pub fn utilize(mut self, path: &str) -> Self {
        self.utilize.push(path.to_string());
        self
    }

    /// Add a filter rule, ANDed with any existing one.
    pub fn filter(mut self, rule: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(rule),
            None => rule,
        });
        self
    }

    pub fn order_by(mut self, column: &str, dir: SortDir) -> Self {
        self.order_by.push(SortSpec {
            column: column.to_string(),
            dir,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn peek_ahead(mut self, peek_ahead: bool) -> Self {
        self.options.peek_ahead = peek_ahead;
        self
    }

    /// Enable or disable subquery extraction for the filter.
    pub fn optimize(mut self, optimize: bool) -> Self {
        self.optimize_filter = optimize;
        self
    }

    /// The statement selecting rows.
    pub fn assemble(&self) -> ResolveResult<Select> {
        self.build(Shape::Rows)
    }

    /// The statement counting rows.
    pub fn assemble_count(&self) -> ResolveResult<Select> {
        self.build(Shape::Count)
    }

    /// The statement body of an EXISTS subquery.
    pub fn assemble_exists(&self) -> ResolveResult<Select> {
        self.build(Shape::Exists)
    }

    pub fn to_sql(&self, dialect: Dialect) -> ResolveResult<String> {
        Ok(self.assemble()?.statement.to_sql(dialect))
    }

    pub fn count_sql(&self, dialect: Dialect) -> ResolveResult<String> {
        Ok(self.assemble_count()?.statement.to_sql(dialect))
    }

    /// Run the query.
    pub fn execute<'c>(&self, conn: &'c dyn Connection) -> QueryResult<ResultSet<'c>> {
        let select = self.assemble()?;
        let sql = select.statement.to_sql(conn.dialect());
        debug!(model = %self.model.name(), %sql, "Executing query");
        let rows = conn.query(&sql)?;
        let peek_limit = select.peek_limit;
        let hydrator = Hydrator::from_select(select, self.options.clone())?;
        Ok(ResultSet::new(rows, hydrator, self.options.cache_results, peek_limit))
    }

    /// The first matching instance.
    pub fn first(&self, conn: &dyn Connection) -> QueryResult<Option<Instance>> {
        let mut query = self.clone().limit(1);
        query.options.peek_ahead = false;
        query.execute(conn)?.next().transpose()
    }

    /// Number of matching base rows, ignoring paging.
    pub fn count(&self, conn: &dyn Connection) -> QueryResult<u64> {
        let sql = self.count_sql(conn.dialect())?;
        debug!(model = %self.model.name(), %sql, "Counting");
        let row = match conn.query(&sql)?.next() {
            Some(row) => row?,
            None => return Err(QueryError::InvalidCount("no rows".into())),
        };
        let value = row.iter().next().map(|(_, v)| v.clone());
        match value.as_ref().and_then(|v| v.as_i64()) {
            Some(n) if n >= 0 => Ok(n as u64),
            _ => Err(QueryError::InvalidCount(format!("{:?}", value))),
        }
    }

    /// A query over the first relation of `path`, correlated with this
    /// query's base or with a concrete instance of it.
    pub fn derive_sub_query(&self, path: &str, source: SubQuerySource<'_>) -> ResolveResult<Query> {
        let mut resolver = self.resolver.clone();
        let head = resolver
            .resolve_relations(path)?
            .into_iter()
            .next()
            .ok_or_else(|| ResolveError::RelationNotFound {
                model: self.model.name().to_string(),
                relation: path.to_string(),
            })?;
        self.derive_correlated(&resolver, &head, source)
    }

    /// Derive a query over `head`, a relation of the base model resolved by `resolver`.
    pub(crate) fn derive_correlated(
        &self,
        resolver: &Resolver,
        head: &ResolvedRelation,
        source: SubQuerySource<'_>,
    ) -> ResolveResult<Query> {
        let outer_alias = resolver.base_alias();
        let alias = match source {
            SubQuerySource::Outer => format!(
                "{}{}",
                self.options.subquery_alias_prefix,
                resolver.get_alias(&head.path)?
            ),
            SubQuerySource::Instance(_) => head.target.table_alias().to_string(),
        };

        let outer = |column: &str| -> ResolveResult<Expr> {
            match source {
                SubQuerySource::Outer => Ok(table_col(outer_alias, column)),
                SubQuerySource::Instance(instance) => instance
                    .value(column)
                    .filter(|v| !v.is_null())
                    .map(|v| v.to_expr())
                    .ok_or_else(|| ResolveError::MissingKeyValue {
                        model: head.source.name().to_string(),
                        column: column.to_string(),
                    }),
            }
        };

        let resolver = Resolver::with_base_alias(self.schema.clone(), head.target.clone(), &alias)
            .max_depth(self.options.max_relation_depth);
        let mut sub = Query::with_resolver(self.schema.clone(), head.target.clone(), resolver);
        sub.options = self.options.clone();
        sub.options.peek_ahead = false;
        sub.optimize_filter = matches!(source, SubQuerySource::Instance(_));

        match head.hops.as_slice() {
            [hop] => {
                for (prev, this) in &hop.keys {
                    let inner = table_col(&alias, this);
                    sub.correlation.push(inner.clone().eq(outer(prev)?));
                    sub.correlation_columns.push(inner);
                }
            }
            [junction, target] => {
                let junction_alias = format!("{}_through", alias);
                let on = all_of(
                    target
                        .keys
                        .iter()
                        .map(|(prev, this)| {
                            table_col(&junction_alias, prev).eq(table_col(&alias, this))
                        })
                        .collect(),
                )
                .ok_or_else(|| ResolveError::KeyMismatch {
                    relation: head.relation.name().to_string(),
                    candidate: 0,
                    foreign: 0,
                })?;
                sub.junctions.push(Join {
                    join_type: JoinType::Inner,
                    table: TableRef::new(&junction.table).with_alias(&junction_alias),
                    on,
                });
                for (prev, this) in &junction.keys {
                    let inner = table_col(&junction_alias, this);
                    sub.correlation.push(inner.clone().eq(outer(prev)?));
                    sub.correlation_columns.push(inner);
                }
            }
            _ => {
                return Err(ResolveError::KeyMismatch {
                    relation: head.relation.name().to_string(),
                    candidate: 0,
                    foreign: 0,
                })
            }
        }

        Ok(sub)
    }

    fn build(&self, shape: Shape) -> ResolveResult<Select> {
        let mut resolver = self.resolver.clone();
        let base_alias = resolver.base_alias().to_string();
        let mut joined: Vec<String> = Vec::new();
        let mut eager: Vec<String> = Vec::new();
        let mut columns: Vec<ColumnRef> = Vec::new();
        let mut select: Vec<sql::SelectExpr> = Vec::new();
        let mut expressions = Vec::new();
        let mut order_by = Vec::new();

        // Counting joins exactly what the row statement joins, so both see
        // the same base rows.
        if shape != Shape::Exists {
            let mut loaded = Vec::new();
            for path in &self.with {
                for relation in resolver.resolve_relations(path)? {
                    push_unique(&mut loaded, &relation.path);
                }
            }
            eager.clone_from(&loaded);

            let requested: Vec<(String, Option<String>)> = if self.columns.is_empty() {
                resolver
                    .all_columns_of(&base_alias)?
                    .into_iter()
                    .map(|c| (c, None))
                    .collect()
            } else {
                self.columns.clone()
            };
            let paths: Vec<&str> = requested.iter().map(|(c, _)| c.as_str()).collect();
            let resolved = resolver.require_and_resolve_columns(&paths)?;
            for (column, (_, alias)) in resolved.into_iter().zip(&requested) {
                let column = match alias {
                    Some(alias) => column.aliased(alias),
                    None => column,
                };
                for relation in resolver.resolve_relations(&column.path)? {
                    push_unique(&mut eager, &relation.path);
                }
                push_column(&mut columns, column)?;
            }
            for path in &loaded {
                if !columns.iter().any(|c| &c.path == path) {
                    for column in resolver.all_columns_of(path)? {
                        let column = resolver.resolve_column(&column)?;
                        push_column(&mut columns, column)?;
                    }
                }
            }
            for path in &eager {
                push_unique(&mut joined, path);
            }

            select.extend(columns.iter().map(|c| c.to_expr().alias(&c.alias)));
            for (alias, sql) in &self.expressions {
                if let Some(column) = columns.iter().find(|c| c.alias == *alias) {
                    return Err(ResolveError::DuplicateAlias {
                        alias: alias.clone(),
                        first: format!("{}.{}", column.path, column.column),
                        second: sql.clone(),
                    });
                }
                select.push(raw_sql(sql).alias(alias));
                expressions.push(alias.clone());
            }

            let sorts = if self.order_by.is_empty() {
                self.model.default_sort()
            } else {
                self.order_by.clone()
            };
            for sort in sorts {
                let column = resolver.resolve_column(&sort.column)?;
                for relation in resolver.resolve_relations(&column.path)? {
                    push_unique(&mut joined, &relation.path);
                }
                order_by.push(match sort.dir {
                    SortDir::Asc => OrderByExpr::asc(column.to_expr()),
                    SortDir::Desc => OrderByExpr::desc(column.to_expr()),
                });
            }
        }

        for path in &self.utilize {
            for relation in resolver.resolve_relations(path)? {
                push_unique(&mut joined, &relation.path);
            }
        }

        let mut conditions = self.correlation.clone();
        if let Some(filter) = &self.filter {
            let mut processor =
                FilterProcessor::new(self, &mut resolver, &eager).optimize(self.optimize_filter);
            let compiled = processor.resolve(filter)?;
            if let Some(filter) = &compiled.filter {
                if let Some(expr) = processor.assemble(filter)? {
                    conditions.push(expr);
                }
            }
            for path in &compiled.required_paths {
                for relation in resolver.resolve_relations(path)? {
                    push_unique(&mut joined, &relation.path);
                }
            }
        }

        let mut joins = self.junctions.clone();
        let mut fans_out = false;
        for path in &joined {
            let relation = resolver
                .resolved(path)
                .ok_or_else(|| ResolveError::AliasNotRegistered(path.clone()))?;
            fans_out |= relation.is_many();
            joins.extend(self.joins_for(&resolver, &relation)?);
        }

        match shape {
            Shape::Rows => {}
            Shape::Count => {
                let key = self.model.key_name();
                select = vec![match key.as_slice() {
                    [key] if fans_out => count_distinct(table_col(&base_alias, key)).alias("count"),
                    _ => count_star().alias("count"),
                }];
            }
            Shape::Exists => select = vec![lit_int(1).into()],
        }

        let mut statement = sql::Query::new()
            .select(select)
            .from(TableRef::new(self.model.table_name()).with_alias(&base_alias))
            .joins(joins);
        for condition in conditions {
            statement = statement.filter(condition);
        }

        let mut peek_limit = None;
        if shape == Shape::Rows {
            statement = statement.order_by(order_by);
            if let Some(limit) = self.limit {
                if self.options.peek_ahead {
                    peek_limit = Some(limit);
                    statement = statement.limit(limit.saturating_add(1));
                } else {
                    statement = statement.limit(limit);
                }
            }
            if let Some(offset) = self.offset {
                statement = statement.offset(offset);
            }
        }

        debug!(
            model = %self.model.name(),
            joins = statement.joins.len(),
            ?shape,
            "Assembled query"
        );
        Ok(Select {
            statement,
            resolver,
            columns,
            expressions,
            eager,
            peek_limit,
        })
    }

    /// Join clauses for one resolved path: one per hop.
    fn joins_for(&self, resolver: &Resolver, relation: &ResolvedRelation) -> ResolveResult<Vec<Join>> {
        let join_type = relation.relation.join_type();
        let mut previous = resolver.get_alias(&relation.source_path)?.to_string();
        let alias = resolver.get_alias(&relation.path)?.to_string();
        let last = relation.hops.len().saturating_sub(1);

        let mut joins = Vec::with_capacity(relation.hops.len());
        for (i, hop) in relation.hops.iter().enumerate() {
            let hop_alias = if i == last {
                alias.clone()
            } else {
                format!("{}_through", alias)
            };
            let on = all_of(
                hop.keys
                    .iter()
                    .map(|(prev, this)| table_col(&previous, prev).eq(table_col(&hop_alias, this)))
                    .collect(),
            )
            .ok_or_else(|| ResolveError::KeyMismatch {
                relation: relation.relation.name().to_string(),
                candidate: 0,
                foreign: 0,
            })?;
            joins.push(Join {
                join_type,
                table: TableRef::new(&hop.table).with_alias(&hop_alias),
                on,
            });
            previous = hop_alias;
        }
        Ok(joins)
    }
}

fn push_unique(paths: &mut Vec<String>, path: &str) {
    if !paths.iter().any(|p| p == path) {
        paths.push(path.to_string());
    }
}

/// Add a column unless it is already selected. Two different columns under
/// one result alias are an error, never a silent drop.
fn push_column(columns: &mut Vec<ColumnRef>, column: ColumnRef) -> ResolveResult<()> {
    match columns.iter().find(|c| c.alias == column.alias) {
        None => {
            columns.push(column);
            Ok(())
        }
        Some(existing) if existing.path == column.path && existing.column == column.column => Ok(()),
        Some(existing) => Err(ResolveError::DuplicateAlias {
            alias: column.alias.clone(),
            first: format!("{}.{}", existing.path, existing.column),
            second: format!("{}.{}", column.path, column.column),
        }),
    }
}
