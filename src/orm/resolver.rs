//! Relation path and column resolution.
//!
//! A [`Resolver`] is bound to one query. It resolves dotted relation paths
//! (`host.services.notes`) against the relation registries of the models
//! involved, assigns every resolved path a table alias unique within the
//! query, and qualifies columns against those aliases.
//!
//! All memoization (relation registries, behaviors, resolved paths, aliases)
//! lives in the resolver itself. Cloning a resolver clones that state, so a
//! cloned or derived query never shares aliases with its origin.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::{debug, trace};

use super::error::{ResolveError, ResolveResult};
use crate::model::{
    Behaviors, ColumnRewrite, Defaults, Hop, ModelDef, Relation, Relations, Schema,
};
use crate::sql::{raw_sql, table_col, Expr};

/// Default limit for path nesting and path rewrites.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// One resolved segment of a relation path.
#[derive(Debug)]
pub struct ResolvedRelation {
    /// Canonical path up to and including this segment.
    pub path: String,
    /// Canonical path of the segment's source.
    pub source_path: String,
    pub relation: Rc<Relation>,
    pub source: Rc<dyn ModelDef>,
    pub target: Rc<dyn ModelDef>,
    /// Tables joined from source to target.
    pub hops: Vec<Hop>,
}

impl ResolvedRelation {
    /// True if the relation can multiply source rows.
    pub fn is_many(&self) -> bool {
        !self.relation.is_one()
    }
}

/// What a resolved column reads from.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnTarget {
    Column(String),
    Expression(String),
}

/// A fully resolved column.
#[derive(Debug, Clone)]
pub struct ColumnRef {
    /// Canonical relation path owning the column (the base alias for base columns).
    pub path: String,
    pub model: Rc<dyn ModelDef>,
    pub table_alias: String,
    /// Column name as requested, before rewrites.
    pub column: String,
    pub target: ColumnTarget,
    /// Result column alias.
    pub alias: String,
    /// Property the value is hydrated under.
    pub property: String,
}

impl ColumnRef {
    /// Use an explicit result alias, which also names the property.
    pub fn aliased(mut self, alias: &str) -> Self {
        self.alias = alias.to_string();
        self.property = alias.to_string();
        self
    }

    pub fn to_expr(&self) -> Expr {
        match &self.target {
            ColumnTarget::Column(name) => table_col(&self.table_alias, name),
            ColumnTarget::Expression(sql) => raw_sql(sql),
        }
    }

    /// Qualified SQL name, `alias.column`, or the raw expression.
    pub fn qualified(&self) -> String {
        match &self.target {
            ColumnTarget::Column(name) => qualify_column(name, &self.table_alias),
            ColumnTarget::Expression(sql) => sql.clone(),
        }
    }
}

/// Per-query resolution state.
#[derive(Debug, Clone)]
pub struct Resolver {
    schema: Rc<Schema>,
    base: Rc<dyn ModelDef>,
    base_alias: String,
    max_depth: usize,
    relations: HashMap<String, Rc<Relations>>,
    behaviors: HashMap<String, Rc<Behaviors>>,
    defaults: HashMap<String, Rc<Defaults>>,
    resolved: HashMap<String, Rc<ResolvedRelation>>,
    /// Requested path -> canonical path, for paths reached through rewrites.
    rewritten: HashMap<String, String>,
    aliases: HashMap<String, String>,
    taken: HashSet<String>,
}

impl Resolver {
    /// Create a resolver whose base path is the model's table alias.
    pub fn new(schema: Rc<Schema>, base: Rc<dyn ModelDef>) -> Self {
        let base_alias = base.table_alias().to_string();
        Self::with_base_alias(schema, base, &base_alias)
    }

    /// Create a resolver with an explicit base alias (derived queries).
    pub fn with_base_alias(schema: Rc<Schema>, base: Rc<dyn ModelDef>, base_alias: &str) -> Self {
        let mut resolver = Self {
            schema,
            base,
            base_alias: base_alias.to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
            relations: HashMap::new(),
            behaviors: HashMap::new(),
            defaults: HashMap::new(),
            resolved: HashMap::new(),
            rewritten: HashMap::new(),
            aliases: HashMap::new(),
            taken: HashSet::new(),
        };
        resolver.aliases.insert(base_alias.to_string(), base_alias.to_string());
        resolver.taken.insert(base_alias.to_string());
        resolver
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn schema(&self) -> &Rc<Schema> {
        &self.schema
    }

    pub fn base(&self) -> &Rc<dyn ModelDef> {
        &self.base
    }

    pub fn base_alias(&self) -> &str {
        &self.base_alias
    }

    pub fn max_relation_depth(&self) -> usize {
        self.max_depth
    }

    /// True if `path` denotes the base model.
    pub fn is_base(&self, path: &str) -> bool {
        path == self.base_alias
    }

    /// The model's relation registry, built once per resolver.
    pub fn relations_of(&mut self, model: &Rc<dyn ModelDef>) -> Rc<Relations> {
        self.relations
            .entry(model.name().to_string())
            .or_insert_with(|| {
                let mut relations = Relations::new();
                model.create_relations(&mut relations);
                Rc::new(relations)
            })
            .clone()
    }

    pub fn behaviors_of(&mut self, model: &Rc<dyn ModelDef>) -> Rc<Behaviors> {
        self.behaviors
            .entry(model.name().to_string())
            .or_insert_with(|| {
                let mut behaviors = Behaviors::new();
                model.create_behaviors(&mut behaviors);
                Rc::new(behaviors)
            })
            .clone()
    }

    pub fn defaults_of(&mut self, model: &Rc<dyn ModelDef>) -> Rc<Defaults> {
        self.defaults
            .entry(model.name().to_string())
            .or_insert_with(|| {
                let mut defaults = Defaults::new();
                model.create_defaults(&mut defaults);
                Rc::new(defaults)
            })
            .clone()
    }

    /// Prefix a relation path with the base alias unless it already starts with it.
    pub fn qualify_path(&self, path: &str) -> String {
        if path.is_empty() {
            return self.base_alias.clone();
        }
        if path == self.base_alias || path.starts_with(&format!("{}.", self.base_alias)) {
            path.to_string()
        } else {
            format!("{}.{}", self.base_alias, path)
        }
    }

    /// Split a column path into its qualified relation path and column name.
    pub fn split_column(&self, column: &str) -> (String, String) {
        let qualified = if column.starts_with(&format!("{}.", self.base_alias)) {
            column.to_string()
        } else {
            format!("{}.{}", self.base_alias, column)
        };
        match qualified.rsplit_once('.') {
            Some((path, name)) => (path.to_string(), name.to_string()),
            None => (self.base_alias.clone(), qualified),
        }
    }

    /// Resolve every segment of `path`, in order.
    ///
    /// The base path yields an empty chain. Unknown segments are offered to
    /// the subject's path rewrite hooks before failing.
    pub fn resolve_relations(&mut self, path: &str) -> ResolveResult<Vec<Rc<ResolvedRelation>>> {
        let path = self.qualify_path(path);
        if self.is_base(&path) {
            return Ok(Vec::new());
        }
        if let Some(canonical) = self.rewritten.get(&path).cloned() {
            return self.chain_of(&canonical);
        }
        if self.resolved.contains_key(&path) {
            return self.chain_of(&path);
        }

        let relative = &path[self.base_alias.len() + 1..];
        let mut segments: Vec<String> = relative.split('.').rev().map(String::from).collect();
        let mut subject = self.base.clone();
        let mut current = self.base_alias.clone();
        let mut chain = Vec::new();
        let mut rewrites = 0;

        while let Some(segment) = segments.pop() {
            let candidate = format!("{}.{}", current, segment);
            if let Some(resolved) = self.resolved.get(&candidate).cloned() {
                subject = resolved.target.clone();
                current = candidate;
                chain.push(resolved);
            } else if let Some(relation) = self.relations_of(&subject).get(&segment) {
                let resolved = self.register(&subject, &current, relation, &candidate)?;
                subject = resolved.target.clone();
                current = candidate;
                chain.push(resolved);
            } else {
                let mut rest: Vec<&str> = vec![segment.as_str()];
                rest.extend(segments.iter().rev().map(String::as_str));
                let remaining = rest.join(".");
                let prefix = format!("{}.", current);
                let behaviors = self.behaviors_of(&subject);
                match behaviors.rewrite_path(&remaining, &prefix) {
                    Some(_) if rewrites >= self.max_depth => {
                        return Err(ResolveError::RelationDepthExceeded {
                            path,
                            max: self.max_depth,
                        });
                    }
                    Some(replacement) => {
                        trace!(from = %remaining, to = %replacement, "Rewrote relation path");
                        rewrites += 1;
                        segments = replacement.split('.').rev().map(String::from).collect();
                    }
                    None => {
                        return Err(ResolveError::RelationNotFound {
                            model: subject.name().to_string(),
                            relation: segment,
                        });
                    }
                }
            }

            if chain.len() > self.max_depth {
                return Err(ResolveError::RelationDepthExceeded {
                    path,
                    max: self.max_depth,
                });
            }
        }

        if current != path {
            self.rewritten.insert(path, current);
        }
        Ok(chain)
    }

    /// Resolve `path` and return its last segment.
    pub fn resolve_relation(&mut self, path: &str) -> ResolveResult<Rc<ResolvedRelation>> {
        self.resolve_relations(path)?
            .pop()
            .ok_or_else(|| ResolveError::RelationNotFound {
                model: self.base.name().to_string(),
                relation: path.to_string(),
            })
    }

    /// Resolve `path` relative to `subject`, a relation path of this query.
    pub fn resolve_relations_from(
        &mut self,
        subject: &str,
        path: &str,
    ) -> ResolveResult<Vec<Rc<ResolvedRelation>>> {
        let path = self.path_from(subject, path)?;
        self.resolve_relations(&path)
    }

    pub fn resolve_relation_from(
        &mut self,
        subject: &str,
        path: &str,
    ) -> ResolveResult<Rc<ResolvedRelation>> {
        let path = self.path_from(subject, path)?;
        self.resolve_relation(&path)
    }

    fn path_from(&mut self, subject: &str, path: &str) -> ResolveResult<String> {
        let subject = self.canonical_path(subject)?;
        Ok(if path.is_empty() {
            subject
        } else {
            format!("{}.{}", subject, path)
        })
    }

    /// Canonical form of a relation path, after rewrites.
    pub fn canonical_path(&mut self, path: &str) -> ResolveResult<String> {
        Ok(self
            .resolve_relations(path)?
            .last()
            .map(|r| r.path.clone())
            .unwrap_or_else(|| self.base_alias.clone()))
    }

    /// Model reached by a canonical path.
    pub fn target_of(&self, canonical: &str) -> ResolveResult<Rc<dyn ModelDef>> {
        if self.is_base(canonical) {
            return Ok(self.base.clone());
        }
        self.resolved
            .get(canonical)
            .map(|r| r.target.clone())
            .ok_or_else(|| ResolveError::AliasNotRegistered(canonical.to_string()))
    }

    /// A previously resolved segment.
    pub fn resolved(&self, canonical: &str) -> Option<Rc<ResolvedRelation>> {
        self.resolved.get(canonical).cloned()
    }

    /// Table alias of a resolved path.
    pub fn get_alias(&self, path: &str) -> ResolveResult<&str> {
        let path = self.qualify_path(path);
        let canonical = self.rewritten.get(&path).unwrap_or(&path);
        self.aliases
            .get(canonical)
            .map(String::as_str)
            .ok_or_else(|| ResolveError::AliasNotRegistered(path.clone()))
    }

    /// Result alias for a column: `<tableAlias>_<column>`.
    pub fn qualify_column_alias(&self, column: &str, table_alias: &str) -> String {
        format!("{}_{}", table_alias, column)
    }

    /// Resolve one column path against its target model.
    pub fn resolve_column(&mut self, column: &str) -> ResolveResult<ColumnRef> {
        let (path, name) = self.split_column(column);
        let canonical = self.canonical_path(&path)?;
        let model = self.target_of(&canonical)?;
        let table_alias = self.get_alias(&canonical)?.to_string();

        let prefix = format!("{}.", canonical);
        let target = match self.behaviors_of(&model).rewrite_column(&name, &prefix) {
            Some(ColumnRewrite::Renamed(real)) => ColumnTarget::Column(real),
            Some(ColumnRewrite::Expression(sql)) => ColumnTarget::Expression(sql),
            None => ColumnTarget::Column(name.clone()),
        };
        if let ColumnTarget::Column(real) = &target {
            if !model.has_column(real) {
                return Err(ResolveError::ColumnNotFound {
                    model: model.name().to_string(),
                    column: name,
                });
            }
        }

        let alias = self.qualify_column_alias(&name, &table_alias);
        Ok(ColumnRef {
            path: canonical,
            model,
            table_alias,
            property: name.clone(),
            column: name,
            target,
            alias,
        })
    }

    /// Resolve a list of column paths, failing on the first unknown one.
    pub fn require_and_resolve_columns<S: AsRef<str>>(
        &mut self,
        columns: &[S],
    ) -> ResolveResult<Vec<ColumnRef>> {
        columns
            .iter()
            .map(|c| self.resolve_column(c.as_ref()))
            .collect()
    }

    /// Resolve column paths relative to the model at `subject`.
    pub fn require_and_resolve_columns_from<S: AsRef<str>>(
        &mut self,
        subject: &str,
        columns: &[S],
    ) -> ResolveResult<Vec<ColumnRef>> {
        let subject = self.canonical_path(subject)?;
        columns
            .iter()
            .map(|c| {
                let column = format!("{}.{}", subject, c.as_ref());
                self.resolve_column(&column)
            })
            .collect()
    }

    /// Selectable columns of the model at a canonical path, as column paths.
    pub fn all_columns_of(&self, canonical: &str) -> ResolveResult<Vec<String>> {
        let model = self.target_of(canonical)?;
        Ok(model
            .columns()
            .into_iter()
            .map(|c| format!("{}.{}", canonical, c))
            .collect())
    }

    fn register(
        &mut self,
        subject: &Rc<dyn ModelDef>,
        source_path: &str,
        relation: Rc<Relation>,
        path: &str,
    ) -> ResolveResult<Rc<ResolvedRelation>> {
        let target = self.schema.get(relation.target())?;
        let hops = relation.hops(subject.as_ref(), target.as_ref())?;
        let resolved = Rc::new(ResolvedRelation {
            path: path.to_string(),
            source_path: source_path.to_string(),
            relation,
            source: subject.clone(),
            target,
            hops,
        });

        let alias = self.unique_alias(&path.replace('.', "_"));
        debug!(path = %path, alias = %alias, "Resolved relation");
        self.aliases.insert(path.to_string(), alias);
        self.resolved.insert(path.to_string(), resolved.clone());
        Ok(resolved)
    }

    fn unique_alias(&mut self, wanted: &str) -> String {
        let mut alias = wanted.to_string();
        let mut n = 2;
        while self.taken.contains(&alias) {
            alias = format!("{}_{}", wanted, n);
            n += 1;
        }
        self.taken.insert(alias.clone());
        alias
    }

    fn chain_of(&self, canonical: &str) -> ResolveResult<Vec<Rc<ResolvedRelation>>> {
        let mut chain = Vec::new();
        let mut path = canonical.to_string();
        while !self.is_base(&path) {
            let resolved = self
                .resolved
                .get(&path)
                .cloned()
                .ok_or_else(|| ResolveError::AliasNotRegistered(path.clone()))?;
            path = resolved.source_path.clone();
            chain.push(resolved);
        }
        chain.reverse();
        Ok(chain)
    }
}

/// `<alias>.<column>`, unless `column` is already qualified.
pub fn qualify_column(column: &str, alias: &str) -> String {
    if column.contains('.') {
        column.to_string()
    } else {
        format!("{}.{}", alias, column)
    }
}
