//! Hydration tests: flat rows back into instance graphs.

#[path = "../common/mod.rs"]
mod common;

use relorm::model::{Row, Value};
use relorm::orm::{Hydrator, Query};

fn hydrator(query: Query) -> Hydrator {
    let options = query.query_options().clone();
    Hydrator::from_select(query.assemble().unwrap(), options).unwrap()
}

#[test]
fn test_hydrates_through_junction_path() {
    let query = Query::new(common::schema(), "host")
        .unwrap()
        .columns(&["id", "name", "hostgroups.name"]);
    let mut hydrator = hydrator(query);

    let host = hydrator.hydrate(
        Row::new()
            .with("host_id", 1)
            .with("host_name", "web01")
            .with("host_hostgroups_name", "web"),
    );

    let group = host.relation("hostgroups").unwrap();
    assert_eq!(group.model(), "hostgroup");
    assert_eq!(group.value("name"), Some(&Value::from("web")));
    assert!(host.deferred("hostgroups").is_none());
    assert!(host.deferred("services").is_some());
}

#[test]
fn test_nested_path_builds_intermediate_instances() {
    let query = Query::new(common::schema(), "service")
        .unwrap()
        .columns(&["name", "host.name", "host.status.output"]);
    let mut hydrator = hydrator(query);

    let service = hydrator.hydrate(
        Row::new()
            .with("service_name", "http")
            .with("service_host_name", "web01")
            .with("service_host_status_output", "UP"),
    );

    assert_eq!(
        service.lookup("host").unwrap().value("name"),
        Some(&Value::from("web01"))
    );
    assert_eq!(
        service.lookup("host.status").unwrap().value("output"),
        Some(&Value::from("UP"))
    );
}

#[test]
fn test_defaults_fill_missing_properties() {
    let query = Query::new(common::schema(), "service")
        .unwrap()
        .columns(&["name"]);
    let mut hydrator = hydrator(query);

    let service = hydrator.hydrate(Row::new().with("service_name", "http"));
    assert_eq!(service.value("acknowledged"), Some(&Value::Bool(false)));
}

#[test]
fn test_defaults_apply_to_related_instances() {
    let query = Query::new(common::schema(), "host")
        .unwrap()
        .columns(&["name", "services.name"]);
    let mut hydrator = hydrator(query);

    let host = hydrator.hydrate(
        Row::new()
            .with("host_name", "web01")
            .with("host_services_name", "http"),
    );
    let service = host.relation("services").unwrap();
    assert_eq!(service.value("acknowledged"), Some(&Value::Bool(false)));
    assert!(!host.has("acknowledged"));
}

#[test]
fn test_retrieve_behaviors_keep_unknown_literals() {
    let query = Query::new(common::schema(), "host")
        .unwrap()
        .columns(&["name", "active"]);
    let mut hydrator = hydrator(query);

    let host = hydrator.hydrate(
        Row::new()
            .with("host_name", "web01")
            .with("host_active", "maybe"),
    );
    assert_eq!(host.value("active"), Some(&Value::from("maybe")));
}

#[test]
fn test_serialized_instance() {
    let query = Query::new(common::schema(), "host")
        .unwrap()
        .columns(&["id", "name", "active", "status.output"]);
    let mut hydrator = hydrator(query);

    let host = hydrator.hydrate(
        Row::new()
            .with("host_id", 1)
            .with("host_name", "web01")
            .with("host_active", "y")
            .with("host_status_output", "UP"),
    );
    let json = serde_json::to_value(&host).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "active": true,
            "id": 1,
            "name": "web01",
            "status": {"output": "UP"}
        })
    );
}
