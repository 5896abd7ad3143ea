//! Relations between models.
//!
//! A [`Relation`] names a link from the model that declares it to a target
//! model (by name). Keys are optional; missing ones are derived from the
//! models' tables and primary keys when the relation is resolved.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::ModelDef;
use crate::orm::error::{ResolveError, ResolveResult};
use crate::sql::JoinType;

/// Kind of relation, as declared on the source model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    HasOne,
    HasMany,
    BelongsTo,
    BelongsToMany,
}

/// Cardinality of a relation seen from its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl Cardinality {
    /// Returns true if joining along this relation can multiply source rows.
    pub fn causes_fanout(&self) -> bool {
        matches!(self, Cardinality::OneToMany | Cardinality::ManyToMany)
    }
}

impl RelationKind {
    pub fn cardinality(&self) -> Cardinality {
        match self {
            RelationKind::HasOne => Cardinality::OneToOne,
            RelationKind::HasMany => Cardinality::OneToMany,
            RelationKind::BelongsTo => Cardinality::ManyToOne,
            RelationKind::BelongsToMany => Cardinality::ManyToMany,
        }
    }
}

/// Junction table of a many-to-many relation.
#[derive(Debug, Clone, PartialEq)]
pub struct Through {
    pub table: String,
    /// Junction columns referencing the target.
    pub target_foreign_key: Option<Vec<String>>,
    /// Target columns referenced by the junction.
    pub target_candidate_key: Option<Vec<String>>,
}

/// One table joined while walking a relation.
///
/// `keys` pairs a column of the previous table with a column of this one.
#[derive(Debug, Clone, PartialEq)]
pub struct Hop {
    pub table: String,
    pub keys: Vec<(String, String)>,
}

/// A typed link between two models.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    name: String,
    kind: RelationKind,
    target: String,
    join_type: JoinType,
    candidate_key: Option<Vec<String>>,
    foreign_key: Option<Vec<String>>,
    through: Option<Through>,
}

impl Relation {
    fn new(name: &str, kind: RelationKind, target: &str) -> Self {
        Self {
            name: name.into(),
            kind,
            target: target.into(),
            join_type: JoinType::Inner,
            candidate_key: None,
            foreign_key: None,
            through: None,
        }
    }

    pub fn has_one(name: &str, target: &str) -> Self {
        Self::new(name, RelationKind::HasOne, target)
    }

    pub fn has_many(name: &str, target: &str) -> Self {
        Self::new(name, RelationKind::HasMany, target)
    }

    pub fn belongs_to(name: &str, target: &str) -> Self {
        Self::new(name, RelationKind::BelongsTo, target)
    }

    pub fn belongs_to_many(name: &str, target: &str, through: &str) -> Self {
        let mut relation = Self::new(name, RelationKind::BelongsToMany, target);
        relation.through = Some(Through {
            table: through.into(),
            target_foreign_key: None,
            target_candidate_key: None,
        });
        relation
    }

    pub fn with_join_type(mut self, join_type: JoinType) -> Self {
        self.join_type = join_type;
        self
    }

    pub fn with_candidate_key(mut self, columns: &[&str]) -> Self {
        self.candidate_key = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn with_foreign_key(mut self, columns: &[&str]) -> Self {
        self.foreign_key = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Junction keys of a many-to-many relation; ignored for other kinds.
    pub fn with_through_keys(mut self, target_foreign: &[&str], target_candidate: &[&str]) -> Self {
        if let Some(through) = &mut self.through {
            through.target_foreign_key =
                Some(target_foreign.iter().map(|c| c.to_string()).collect());
            through.target_candidate_key =
                Some(target_candidate.iter().map(|c| c.to_string()).collect());
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// Name of the target model.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    pub fn through(&self) -> Option<&Through> {
        self.through.as_ref()
    }

    pub fn cardinality(&self) -> Cardinality {
        self.kind.cardinality()
    }

    /// True for relations yielding at most one target per source row.
    pub fn is_one(&self) -> bool {
        !self.cardinality().causes_fanout()
    }

    /// Tables joined to get from `source` to `target`, in join order.
    ///
    /// Many-to-many relations yield the junction table first.
    pub fn hops(&self, source: &dyn ModelDef, target: &dyn ModelDef) -> ResolveResult<Vec<Hop>> {
        match self.kind {
            RelationKind::HasOne | RelationKind::HasMany => {
                let candidate = self
                    .candidate_key
                    .clone()
                    .unwrap_or_else(|| source.key_name());
                let foreign = self
                    .foreign_key
                    .clone()
                    .unwrap_or_else(|| default_foreign_key(source, &candidate));
                Ok(vec![Hop {
                    table: target.table_name().to_string(),
                    keys: self.pair(candidate, foreign)?,
                }])
            }
            RelationKind::BelongsTo => {
                let candidate = self
                    .candidate_key
                    .clone()
                    .unwrap_or_else(|| target.key_name());
                let foreign = self
                    .foreign_key
                    .clone()
                    .unwrap_or_else(|| default_foreign_key(target, &candidate));
                // The foreign key lives on the source here
                Ok(vec![Hop {
                    table: target.table_name().to_string(),
                    keys: self.pair(foreign, candidate)?,
                }])
            }
            RelationKind::BelongsToMany => {
                let through = self.through.as_ref().ok_or_else(|| ResolveError::KeyMismatch {
                    relation: self.name.clone(),
                    candidate: 0,
                    foreign: 0,
                })?;
                let candidate = self
                    .candidate_key
                    .clone()
                    .unwrap_or_else(|| source.key_name());
                let foreign = self
                    .foreign_key
                    .clone()
                    .unwrap_or_else(|| default_foreign_key(source, &candidate));
                let target_candidate = through
                    .target_candidate_key
                    .clone()
                    .unwrap_or_else(|| target.key_name());
                let target_foreign = through
                    .target_foreign_key
                    .clone()
                    .unwrap_or_else(|| default_foreign_key(target, &target_candidate));
                Ok(vec![
                    Hop {
                        table: through.table.clone(),
                        keys: self.pair(candidate, foreign)?,
                    },
                    Hop {
                        table: target.table_name().to_string(),
                        keys: self.pair(target_foreign, target_candidate)?,
                    },
                ])
            }
        }
    }

    fn pair(&self, left: Vec<String>, right: Vec<String>) -> ResolveResult<Vec<(String, String)>> {
        if left.len() != right.len() || left.is_empty() {
            return Err(ResolveError::KeyMismatch {
                relation: self.name.clone(),
                candidate: left.len(),
                foreign: right.len(),
            });
        }
        Ok(left.into_iter().zip(right).collect())
    }
}

/// `<table>_<key>` for each key column.
fn default_foreign_key(model: &dyn ModelDef, keys: &[String]) -> Vec<String> {
    keys.iter()
        .map(|k| format!("{}_{}", model.table_name(), k))
        .collect()
}

/// Per-model registry of named relations, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Relations {
    relations: Vec<Rc<Relation>>,
}

impl Relations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relation. A later relation with the same name replaces the earlier one.
    pub fn add(&mut self, relation: Relation) -> &mut Self {
        self.relations.retain(|r| r.name() != relation.name());
        self.relations.push(Rc::new(relation));
        self
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Rc<Relation>> {
        self.relations.iter().find(|r| r.name() == name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<Relation>> {
        self.relations.iter()
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelSpec;

    fn host() -> ModelSpec {
        ModelSpec::new("host", "host").with_columns(&["id", "name"])
    }

    fn service() -> ModelSpec {
        ModelSpec::new("service", "service").with_columns(&["id", "host_id", "name"])
    }

    #[test]
    fn test_has_many_default_keys() {
        let rel = Relation::has_many("services", "service");
        let hops = rel.hops(&host(), &service()).unwrap();
        assert_eq!(hops.len(), 1);
        assert_eq!(hops[0].table, "service");
        assert_eq!(hops[0].keys, vec![("id".to_string(), "host_id".to_string())]);
        assert!(!rel.is_one());
    }

    #[test]
    fn test_belongs_to_inverts_keys() {
        let rel = Relation::belongs_to("host", "host");
        let hops = rel.hops(&service(), &host()).unwrap();
        assert_eq!(hops[0].keys, vec![("host_id".to_string(), "id".to_string())]);
        assert!(rel.is_one());
    }

    #[test]
    fn test_belongs_to_many_goes_through_junction() {
        let group = ModelSpec::new("hostgroup", "hostgroup").with_columns(&["id", "name"]);
        let rel = Relation::belongs_to_many("hostgroups", "hostgroup", "hostgroup_member");
        let hops = rel.hops(&host(), &group).unwrap();
        assert_eq!(hops[0].table, "hostgroup_member");
        assert_eq!(hops[0].keys, vec![("id".to_string(), "host_id".to_string())]);
        assert_eq!(hops[1].table, "hostgroup");
        assert_eq!(
            hops[1].keys,
            vec![("hostgroup_id".to_string(), "id".to_string())]
        );
        assert_eq!(rel.cardinality(), Cardinality::ManyToMany);
    }

    #[test]
    fn test_key_count_mismatch() {
        let rel = Relation::has_many("services", "service")
            .with_candidate_key(&["id", "env"])
            .with_foreign_key(&["host_id"]);
        let err = rel.hops(&host(), &service()).unwrap_err();
        assert!(matches!(err, ResolveError::KeyMismatch { candidate: 2, foreign: 1, .. }));
    }

    #[test]
    fn test_registry_replaces_by_name() {
        let mut relations = Relations::new();
        relations
            .add(Relation::has_many("services", "service"))
            .add(Relation::has_many("services", "service").with_join_type(JoinType::Left));
        assert_eq!(relations.len(), 1);
        assert_eq!(relations.get("services").unwrap().join_type(), JoinType::Left);
        assert!(!relations.has("hostgroups"));
    }
}
