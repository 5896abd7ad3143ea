//! Row hydration.
//!
//! The hydrator maps a flat result row back into nested [`Instance`]s,
//! using the result aliases the resolver assigned during assembly.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use super::error::ResolveResult;
use super::instance::{Deferred, Instance};
use super::query::{Query, QueryOptions, Select, SubQuerySource};
use super::resolver::{ColumnRef, Resolver};
use crate::model::{Behaviors, Row};

/// Hydration rule of one relation path.
#[derive(Debug)]
struct PathRule {
    path: String,
    /// Table alias, also the prefix of the path's result aliases.
    alias: String,
    /// (relation name, model name) from the base to the path.
    segments: Vec<(String, String)>,
    behaviors: Rc<Behaviors>,
    /// (result alias, column, property)
    columns: Vec<(String, String, String)>,
}

/// Builds instances from rows.
#[derive(Debug)]
pub struct Hydrator {
    resolver: Resolver,
    options: QueryOptions,
    rules: Vec<PathRule>,
    /// Rule indices ordered by alias length, longest first.
    prefixes: Vec<usize>,
}

impl Hydrator {
    /// A hydrator with a rule for the base model only.
    pub fn new(mut resolver: Resolver, options: QueryOptions) -> Self {
        let base = resolver.base().clone();
        let alias = resolver.base_alias().to_string();
        let behaviors = resolver.behaviors_of(&base);
        Self {
            resolver,
            options,
            rules: vec![PathRule {
                path: alias.clone(),
                alias,
                segments: Vec::new(),
                behaviors,
                columns: Vec::new(),
            }],
            prefixes: vec![0],
        }
    }

    /// A hydrator for the columns of an assembled statement.
    pub fn from_select(select: Select, options: QueryOptions) -> ResolveResult<Self> {
        let mut hydrator = Self::new(select.resolver, options);
        for path in &select.eager {
            hydrator.add_path(path, &[])?;
        }
        let mut by_path: Vec<(String, Vec<ColumnRef>)> = Vec::new();
        for column in select.columns {
            match by_path.iter_mut().find(|(path, _)| *path == column.path) {
                Some((_, columns)) => columns.push(column),
                None => by_path.push((column.path.clone(), vec![column])),
            }
        }
        for (path, columns) in by_path {
            hydrator.add_path(&path, &columns)?;
        }
        Ok(hydrator)
    }

    /// Register the hydration rule for `path` and the columns it extracts.
    ///
    /// Registering a path again only adds columns.
    pub fn add_path(&mut self, path: &str, columns: &[ColumnRef]) -> ResolveResult<()> {
        let canonical = self.resolver.canonical_path(path)?;
        let index = match self.rules.iter().position(|r| r.path == canonical) {
            Some(index) => index,
            None => {
                let chain = self.resolver.resolve_relations(&canonical)?;
                let segments = chain
                    .iter()
                    .map(|r| (r.relation.name().to_string(), r.target.name().to_string()))
                    .collect();
                let model = self.resolver.target_of(&canonical)?;
                let behaviors = self.resolver.behaviors_of(&model);
                let alias = self.resolver.get_alias(&canonical)?.to_string();
                self.rules.push(PathRule {
                    path: canonical,
                    alias,
                    segments,
                    behaviors,
                    columns: Vec::new(),
                });
                let index = self.rules.len() - 1;
                self.prefixes.push(index);
                let rules = &self.rules;
                self.prefixes
                    .sort_by(|a, b| rules[*b].alias.len().cmp(&rules[*a].alias.len()));
                index
            }
        };

        let rule = &mut self.rules[index];
        for column in columns {
            if !rule.columns.iter().any(|(alias, _, _)| *alias == column.alias) {
                rule.columns.push((
                    column.alias.clone(),
                    column.column.clone(),
                    column.property.clone(),
                ));
            }
        }
        Ok(())
    }

    /// Build the instance graph of one row.
    pub fn hydrate(&mut self, row: Row) -> Instance {
        let mut root = Instance::new(self.resolver.base().name());
        let index: HashMap<&str, usize> = row
            .iter()
            .enumerate()
            .map(|(i, (column, _))| (column, i))
            .collect();
        let values: Vec<_> = row.iter().map(|(_, v)| v).collect();
        let mut claimed = vec![false; values.len()];

        for rule in &self.rules {
            let mut extracted = Vec::with_capacity(rule.columns.len());
            for (alias, column, property) in &rule.columns {
                if let Some(&i) = index.get(alias.as_str()) {
                    claimed[i] = true;
                    extracted.push((column, property, values[i].clone()));
                }
            }
            // An outer join without a match
            if !rule.segments.is_empty() && extracted.iter().all(|(_, _, v)| v.is_null()) {
                continue;
            }

            let target = walk(&mut root, &rule.segments);
            for (column, property, value) in extracted {
                let value = rule.behaviors.retrieve_property(value, column);
                target.set(property, value);
            }
        }

        for (i, (column, value)) in row.iter().enumerate() {
            if claimed[i] {
                continue;
            }
            let owner = self.prefixes.iter().map(|&i| &self.rules[i]).find(|rule| {
                column.len() > rule.alias.len() + 1
                    && column.starts_with(rule.alias.as_str())
                    && column.as_bytes()[rule.alias.len()] == b'_'
            });
            match owner {
                Some(rule) => {
                    let property = &column[rule.alias.len() + 1..];
                    trace!(column, path = %rule.path, "Propagating unclaimed column");
                    let value = rule.behaviors.retrieve_property(value.clone(), property);
                    walk(&mut root, &rule.segments).set(property, value);
                }
                None => root.set(column, value.clone()),
            }
        }

        self.apply_defaults(&mut root);
        root
    }

    /// Fill in declared defaults and deferred relation loaders, depth first.
    fn apply_defaults(&mut self, instance: &mut Instance) {
        let model = match self.resolver.schema().get(instance.model()) {
            Ok(model) => model,
            Err(_) => return,
        };
        for (_, related) in instance.relations_mut() {
            self.apply_defaults(related);
        }

        let defaults = self.resolver.defaults_of(&model);
        for (property, default) in defaults.iter() {
            if !instance.has(property) {
                let value = default.resolve(instance);
                instance.set(property, value);
            }
        }

        if !self.options.defer_relations {
            return;
        }
        let relations = self.resolver.relations_of(&model);
        let query = Query::for_model(self.resolver.schema().clone(), model)
            .options(self.options.clone());
        for relation in relations.iter() {
            if instance.has(relation.name()) {
                continue;
            }
            match query.derive_sub_query(relation.name(), SubQuerySource::Instance(instance)) {
                Ok(sub) => instance.set_deferred(relation.name(), Deferred::new(sub)),
                Err(err) => trace!(relation = relation.name(), %err, "No deferred loader"),
            }
        }
    }
}

fn walk<'i>(root: &'i mut Instance, segments: &[(String, String)]) -> &'i mut Instance {
    segments
        .iter()
        .fold(root, |instance, (name, model)| instance.relation_mut(name, model))
}
