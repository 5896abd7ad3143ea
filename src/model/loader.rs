//! Data-driven models loaded from TOML.
//!
//! # Example
//!
//! ```toml
//! [[model]]
//! name = "host"
//! table = "host"
//! columns = ["id", "name", "active"]
//! default_sort = ["name"]
//!
//! [[model.relation]]
//! name = "services"
//! kind = "has_many"
//! target = "service"
//!
//! [[model.behavior]]
//! kind = "bool_cast"
//! columns = ["active"]
//!
//! [model.defaults]
//! state = 0
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    Behaviors, BoolCast, Defaults, ModelDef, ReRoute, Relation, RelationKind, Relations, Rename,
    Schema, SortSpec, Value,
};
use crate::sql::JoinType;

/// Errors that can occur when loading a schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// IO error reading file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML syntax or shape error
    #[error("Failed to parse schema: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Model '{0}' is declared more than once")]
    DuplicateModel(String),

    #[error("Relation '{relation}' of model '{model}' targets unknown model '{target}'")]
    UnknownTarget {
        model: String,
        relation: String,
        target: String,
    },

    #[error("Invalid relation '{relation}' on model '{model}': {message}")]
    InvalidRelation {
        model: String,
        relation: String,
        message: String,
    },

    #[error("Invalid default sort '{value}' on model '{model}'")]
    InvalidSort { model: String, value: String },
}

/// Join type as written in schema files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinSpec {
    #[default]
    Inner,
    Left,
    Right,
}

impl From<JoinSpec> for JoinType {
    fn from(join: JoinSpec) -> Self {
        match join {
            JoinSpec::Inner => JoinType::Inner,
            JoinSpec::Left => JoinType::Left,
            JoinSpec::Right => JoinType::Right,
        }
    }
}

/// A relation declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationSpec {
    pub name: String,
    pub kind: RelationKind,
    pub target: String,
    #[serde(default)]
    pub join: JoinSpec,
    #[serde(default)]
    pub candidate_key: Option<Vec<String>>,
    #[serde(default)]
    pub foreign_key: Option<Vec<String>>,
    /// Junction table (belongs_to_many only).
    #[serde(default)]
    pub through: Option<String>,
    /// Junction columns referencing the target.
    #[serde(default)]
    pub through_foreign_key: Option<Vec<String>>,
    /// Target columns referenced by the junction.
    #[serde(default)]
    pub through_candidate_key: Option<Vec<String>>,
}

impl RelationSpec {
    pub fn new(name: &str, kind: RelationKind, target: &str) -> Self {
        Self {
            name: name.into(),
            kind,
            target: target.into(),
            join: JoinSpec::Inner,
            candidate_key: None,
            foreign_key: None,
            through: None,
            through_foreign_key: None,
            through_candidate_key: None,
        }
    }

    pub fn with_join(mut self, join: JoinSpec) -> Self {
        self.join = join;
        self
    }

    pub fn with_through(mut self, table: &str) -> Self {
        self.through = Some(table.into());
        self
    }

    pub fn with_foreign_key(mut self, columns: &[&str]) -> Self {
        self.foreign_key = Some(owned(columns));
        self
    }

    pub fn with_candidate_key(mut self, columns: &[&str]) -> Self {
        self.candidate_key = Some(owned(columns));
        self
    }

    /// Build the relation. Fails for a many-to-many relation without junction.
    pub fn to_relation(&self) -> Result<Relation, String> {
        let mut relation = match self.kind {
            RelationKind::HasOne => Relation::has_one(&self.name, &self.target),
            RelationKind::HasMany => Relation::has_many(&self.name, &self.target),
            RelationKind::BelongsTo => Relation::belongs_to(&self.name, &self.target),
            RelationKind::BelongsToMany => {
                let through = self
                    .through
                    .as_deref()
                    .ok_or_else(|| "belongs_to_many requires 'through'".to_string())?;
                let mut relation = Relation::belongs_to_many(&self.name, &self.target, through);
                if let (Some(fk), Some(ck)) =
                    (&self.through_foreign_key, &self.through_candidate_key)
                {
                    relation = relation.with_through_keys(&borrowed(fk), &borrowed(ck));
                } else if self.through_foreign_key.is_some()
                    || self.through_candidate_key.is_some()
                {
                    return Err(
                        "through_foreign_key and through_candidate_key go together".to_string()
                    );
                }
                relation
            }
        };
        if self.kind != RelationKind::BelongsToMany
            && (self.through.is_some() || self.through_foreign_key.is_some())
        {
            return Err("'through' is only valid for belongs_to_many".to_string());
        }

        relation = relation.with_join_type(self.join.into());
        if let Some(keys) = &self.candidate_key {
            relation = relation.with_candidate_key(&borrowed(keys));
        }
        if let Some(keys) = &self.foreign_key {
            relation = relation.with_foreign_key(&borrowed(keys));
        }
        Ok(relation)
    }
}

/// A behavior declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BehaviorSpec {
    BoolCast {
        columns: Vec<String>,
        #[serde(default = "default_true_literal")]
        true_value: Value,
        #[serde(default = "default_false_literal")]
        false_value: Value,
    },
    ReRoute {
        routes: BTreeMap<String, String>,
    },
    Rename {
        columns: BTreeMap<String, String>,
    },
}

fn default_true_literal() -> Value {
    Value::from("y")
}

fn default_false_literal() -> Value {
    Value::from("n")
}

impl BehaviorSpec {
    fn install(&self, behaviors: &mut Behaviors) {
        match self {
            BehaviorSpec::BoolCast {
                columns,
                true_value,
                false_value,
            } => {
                behaviors.add(
                    BoolCast::new(&borrowed(columns))
                        .with_literals(true_value.clone(), false_value.clone()),
                );
            }
            BehaviorSpec::ReRoute { routes } => {
                let pairs: Vec<(&str, &str)> =
                    routes.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
                behaviors.add(ReRoute::new(&pairs));
            }
            BehaviorSpec::Rename { columns } => {
                let pairs: Vec<(&str, &str)> =
                    columns.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
                behaviors.add(Rename::new(&pairs));
            }
        }
    }
}

fn default_key() -> Vec<String> {
    vec!["id".to_string()]
}

/// A model declared as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub table: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default = "default_key")]
    pub key: Vec<String>,
    pub columns: Vec<String>,
    #[serde(default)]
    pub default_sort: Vec<String>,
    #[serde(default, rename = "relation")]
    pub relations: Vec<RelationSpec>,
    #[serde(default, rename = "behavior")]
    pub behaviors: Vec<BehaviorSpec>,
    #[serde(default)]
    pub defaults: BTreeMap<String, Value>,
}

impl ModelSpec {
    pub fn new(name: &str, table: &str) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            alias: None,
            key: default_key(),
            columns: Vec::new(),
            default_sort: Vec::new(),
            relations: Vec::new(),
            behaviors: Vec::new(),
            defaults: BTreeMap::new(),
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_key(mut self, columns: &[&str]) -> Self {
        self.key = owned(columns);
        self
    }

    pub fn with_columns(mut self, columns: &[&str]) -> Self {
        self.columns = owned(columns);
        self
    }

    pub fn with_default_sort(mut self, sort: &str) -> Self {
        self.default_sort.push(sort.into());
        self
    }

    pub fn with_relation(mut self, relation: RelationSpec) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn with_behavior(mut self, behavior: BehaviorSpec) -> Self {
        self.behaviors.push(behavior);
        self
    }

    pub fn with_default(mut self, property: &str, value: impl Into<Value>) -> Self {
        self.defaults.insert(property.into(), value.into());
        self
    }

    fn validate(&self) -> Result<(), SchemaError> {
        for relation in &self.relations {
            relation
                .to_relation()
                .map_err(|message| SchemaError::InvalidRelation {
                    model: self.name.clone(),
                    relation: relation.name.clone(),
                    message,
                })?;
        }
        for sort in &self.default_sort {
            if SortSpec::parse(sort).is_none() {
                return Err(SchemaError::InvalidSort {
                    model: self.name.clone(),
                    value: sort.clone(),
                });
            }
        }
        Ok(())
    }
}

impl ModelDef for ModelSpec {
    fn name(&self) -> &str {
        &self.name
    }

    fn table_name(&self) -> &str {
        &self.table
    }

    fn table_alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    fn key_name(&self) -> Vec<String> {
        self.key.clone()
    }

    fn columns(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn default_sort(&self) -> Vec<SortSpec> {
        self.default_sort
            .iter()
            .filter_map(|s| SortSpec::parse(s))
            .collect()
    }

    fn create_relations(&self, relations: &mut Relations) {
        // validated on load
        for relation in self.relations.iter().filter_map(|r| r.to_relation().ok()) {
            relations.add(relation);
        }
    }

    fn create_behaviors(&self, behaviors: &mut Behaviors) {
        for behavior in &self.behaviors {
            behavior.install(behaviors);
        }
    }

    fn create_defaults(&self, defaults: &mut Defaults) {
        for (property, value) in &self.defaults {
            defaults.add(property, value.clone());
        }
    }
}

#[derive(Debug, Deserialize)]
struct SchemaFile {
    #[serde(default, rename = "model")]
    models: Vec<ModelSpec>,
}

impl Schema {
    /// Load a schema from TOML source and validate its relations.
    pub fn from_toml(content: &str) -> Result<Self, SchemaError> {
        let file: SchemaFile = toml::from_str(content)?;

        let mut seen = HashSet::new();
        let mut schema = Schema::new();
        for model in file.models {
            if !seen.insert(model.name.clone()) {
                return Err(SchemaError::DuplicateModel(model.name));
            }
            model.validate()?;
            schema.add(model);
        }

        schema.relation_graph()?;
        Ok(schema)
    }

    /// Load a schema from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SchemaError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

fn owned(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

fn borrowed(columns: &[String]) -> Vec<&str> {
    columns.iter().map(String::as_str).collect()
}
