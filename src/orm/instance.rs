//! Hydrated model instances.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};

use super::connection::Connection;
use super::error::QueryResult;
use super::query::Query;
use crate::model::Value;

/// A relation loaded on demand.
///
/// Holds a query derived from the owning instance's key values.
#[derive(Clone)]
pub struct Deferred {
    query: Query,
}

impl Deferred {
    pub fn new(query: Query) -> Self {
        Self { query }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Run the relation query.
    pub fn fetch(&self, conn: &dyn Connection) -> QueryResult<Vec<Instance>> {
        self.query.execute(conn)?.collect()
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("model", &self.query.model().name())
            .finish()
    }
}

/// A model instance reconstructed from a result row.
///
/// A property name holds exactly one of a value, a related instance or a
/// deferred relation loader.
#[derive(Debug, Clone)]
pub struct Instance {
    model: String,
    values: BTreeMap<String, Value>,
    relations: BTreeMap<String, Instance>,
    deferred: BTreeMap<String, Deferred>,
}

impl Instance {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            values: BTreeMap::new(),
            relations: BTreeMap::new(),
            deferred: BTreeMap::new(),
        }
    }

    /// Name of the model this is an instance of.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn has(&self, property: &str) -> bool {
        self.values.contains_key(property)
            || self.relations.contains_key(property)
            || self.deferred.contains_key(property)
    }

    pub fn value(&self, property: &str) -> Option<&Value> {
        self.values.get(property)
    }

    pub fn relation(&self, name: &str) -> Option<&Instance> {
        self.relations.get(name)
    }

    pub fn deferred(&self, name: &str) -> Option<&Deferred> {
        self.deferred.get(name)
    }

    /// Follow a dotted relation path (`services.host`).
    pub fn lookup(&self, path: &str) -> Option<&Instance> {
        path.split('.')
            .try_fold(self, |instance, name| instance.relation(name))
    }

    pub fn set(&mut self, property: &str, value: impl Into<Value>) {
        self.relations.remove(property);
        self.deferred.remove(property);
        self.values.insert(property.to_string(), value.into());
    }

    pub fn set_relation(&mut self, name: &str, instance: Instance) {
        self.values.remove(name);
        self.deferred.remove(name);
        self.relations.insert(name.to_string(), instance);
    }

    pub fn set_deferred(&mut self, name: &str, deferred: Deferred) {
        self.values.remove(name);
        self.relations.remove(name);
        self.deferred.insert(name.to_string(), deferred);
    }

    /// The related instance `name`, created empty if missing.
    pub fn relation_mut(&mut self, name: &str, model: &str) -> &mut Instance {
        self.values.remove(name);
        self.deferred.remove(name);
        self.relations
            .entry(name.to_string())
            .or_insert_with(|| Instance::new(model))
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn relations(&self) -> impl Iterator<Item = (&str, &Instance)> {
        self.relations.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn relations_mut(&mut self) -> impl Iterator<Item = (&str, &mut Instance)> {
        self.relations.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of properties, deferred loaders included.
    pub fn len(&self) -> usize {
        self.values.len() + self.relations.len() + self.deferred.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Values and loaded relations; deferred loaders are skipped.
impl Serialize for Instance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len() + self.relations.len()))?;
        for (key, value) in &self.values {
            map.serialize_entry(key, value)?;
        }
        for (key, instance) in &self.relations {
            map.serialize_entry(key, instance)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_relations() {
        let mut host = Instance::new("host");
        host.set("name", "web01");
        host.relation_mut("services", "service").set("name", "http");
        host.relation_mut("services", "service")
            .relation_mut("host", "host")
            .set("name", "web01");

        assert_eq!(host.value("name"), Some(&Value::from("web01")));
        assert_eq!(host.lookup("services").unwrap().model(), "service");
        assert_eq!(
            host.lookup("services.host").unwrap().value("name"),
            Some(&Value::from("web01"))
        );
        assert!(host.lookup("services.nope").is_none());
    }

    #[test]
    fn test_relation_replaces_value() {
        let mut host = Instance::new("host");
        host.set("status", Value::Null);
        host.relation_mut("status", "host_status").set("output", "OK");
        assert_eq!(host.relation("status").unwrap().len(), 1);
    }

    #[test]
    fn test_serialize() {
        let mut host = Instance::new("host");
        host.set("id", 1);
        host.set("active", true);
        host.relation_mut("status", "host_status").set("output", "OK");

        let json = serde_json::to_value(&host).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"active": true, "id": 1, "status": {"output": "OK"}})
        );
    }
}
