//! Model arena.
//!
//! Relations reference their targets by model name; the schema maps names
//! to shared model descriptors. Relation graphs may contain cycles (e.g.
//! self-referencing relations) because nothing here holds back-pointers.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use petgraph::algo::is_cyclic_directed;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use tracing::debug;

use super::loader::SchemaError;
use super::{ModelDef, RelationKind, Relations};
use crate::orm::error::{ResolveError, ResolveResult};
use crate::sql::JoinType;

/// Registered models, by name.
#[derive(Debug, Default)]
pub struct Schema {
    models: Vec<Rc<dyn ModelDef>>,
    index: HashMap<String, usize>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model. A model with the same name replaces the earlier one.
    pub fn add(&mut self, model: impl ModelDef + 'static) -> &mut Self {
        self.add_shared(Rc::new(model))
    }

    pub fn add_shared(&mut self, model: Rc<dyn ModelDef>) -> &mut Self {
        match self.index.get(model.name()) {
            Some(&i) => self.models[i] = model,
            None => {
                self.index.insert(model.name().to_string(), self.models.len());
                self.models.push(model);
            }
        }
        self
    }

    pub fn get(&self, name: &str) -> ResolveResult<Rc<dyn ModelDef>> {
        self.index
            .get(name)
            .map(|&i| Rc::clone(&self.models[i]))
            .ok_or_else(|| ResolveError::UnknownModel(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Models in registration order.
    pub fn models(&self) -> impl Iterator<Item = &Rc<dyn ModelDef>> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Build the graph of all declared relations.
    ///
    /// Fails if a relation targets an unknown model or its keys can't be
    /// derived.
    pub fn relation_graph(&self) -> Result<RelationGraph, SchemaError> {
        let mut graph = RelationGraph::default();
        for model in &self.models {
            graph.add_node(model.name());
        }

        for model in &self.models {
            let mut relations = Relations::new();
            model.create_relations(&mut relations);

            for relation in relations.iter() {
                let target = self.get(relation.target()).map_err(|_| {
                    SchemaError::UnknownTarget {
                        model: model.name().to_string(),
                        relation: relation.name().to_string(),
                        target: relation.target().to_string(),
                    }
                })?;
                relation
                    .hops(model.as_ref(), target.as_ref())
                    .map_err(|e| SchemaError::InvalidRelation {
                        model: model.name().to_string(),
                        relation: relation.name().to_string(),
                        message: e.to_string(),
                    })?;

                graph.add_edge(
                    model.name(),
                    relation.target(),
                    RelationEdge {
                        name: relation.name().to_string(),
                        kind: relation.kind(),
                        join_type: relation.join_type(),
                    },
                );
            }
        }

        debug!(
            models = graph.graph.node_count(),
            relations = graph.graph.edge_count(),
            "built relation graph"
        );
        Ok(graph)
    }
}

/// Edge data: one declared relation.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationEdge {
    pub name: String,
    pub kind: RelationKind,
    pub join_type: JoinType,
}

impl fmt::Display for RelationEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            RelationKind::HasOne => "has_one",
            RelationKind::HasMany => "has_many",
            RelationKind::BelongsTo => "belongs_to",
            RelationKind::BelongsToMany => "belongs_to_many",
        };
        write!(f, "{} ({})", self.name, kind)
    }
}

/// Directed graph of models (nodes) and relations (edges).
#[derive(Debug, Clone, Default)]
pub struct RelationGraph {
    graph: DiGraph<String, RelationEdge>,
    index: HashMap<String, NodeIndex>,
}

impl RelationGraph {
    fn add_node(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.index.insert(name.to_string(), idx);
        idx
    }

    fn add_edge(&mut self, from: &str, to: &str, edge: RelationEdge) {
        let from = self.add_node(from);
        let to = self.add_node(to);
        self.graph.add_edge(from, to, edge);
    }

    pub fn model_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn relation_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Relations declared on `model`, as (relation, target model).
    pub fn relations_of(&self, model: &str) -> Vec<(&RelationEdge, &str)> {
        let Some(&idx) = self.index.get(model) else {
            return Vec::new();
        };
        let mut out: Vec<_> = self
            .graph
            .edges(idx)
            .map(|e| (e.weight(), self.graph[e.target()].as_str()))
            .collect();
        // petgraph yields edges newest first
        out.reverse();
        out
    }

    /// True if some relation path can revisit a model.
    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Render in Graphviz DOT format.
    pub fn to_dot(&self) -> String {
        format!(
            "digraph relations {{\n{}}}\n",
            Dot::with_config(&self.graph, &[Config::GraphContentOnly])
        )
    }
}
