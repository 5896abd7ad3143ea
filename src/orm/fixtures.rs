//! Monitoring schema shared by unit tests.

use std::rc::Rc;

use crate::model::{
    BehaviorSpec, JoinSpec, ModelSpec, RelationKind, RelationSpec, Schema, Value,
};

pub(crate) fn host() -> ModelSpec {
    ModelSpec::new("host", "host")
        .with_columns(&["id", "name", "address", "active", "state"])
        .with_default_sort("name")
        .with_relation(RelationSpec::new("services", RelationKind::HasMany, "service"))
        .with_relation(
            RelationSpec::new("hostgroups", RelationKind::BelongsToMany, "hostgroup")
                .with_through("hostgroup_member"),
        )
        .with_relation(
            RelationSpec::new("status", RelationKind::HasOne, "host_status")
                .with_join(JoinSpec::Left),
        )
        .with_behavior(BehaviorSpec::BoolCast {
            columns: vec!["active".into()],
            true_value: Value::from("y"),
            false_value: Value::from("n"),
        })
        .with_behavior(BehaviorSpec::Rename {
            columns: [("host_name".to_string(), "name".to_string())].into(),
        })
}

pub(crate) fn service() -> ModelSpec {
    ModelSpec::new("service", "service")
        .with_columns(&["id", "host_id", "name", "state"])
        .with_relation(RelationSpec::new("host", RelationKind::BelongsTo, "host"))
        .with_behavior(BehaviorSpec::ReRoute {
            routes: [("hostgroups".to_string(), "host.hostgroups".to_string())].into(),
        })
}

pub(crate) fn hostgroup() -> ModelSpec {
    ModelSpec::new("hostgroup", "hostgroup")
        .with_columns(&["id", "name"])
        .with_relation(
            RelationSpec::new("hosts", RelationKind::BelongsToMany, "host")
                .with_through("hostgroup_member"),
        )
}

pub(crate) fn host_status() -> ModelSpec {
    ModelSpec::new("host_status", "host_status").with_columns(&["id", "host_id", "output", "severity"])
}

pub(crate) fn schema() -> Rc<Schema> {
    let mut schema = Schema::new();
    schema
        .add(host())
        .add(service())
        .add(hostgroup())
        .add(host_status());
    Rc::new(schema)
}
