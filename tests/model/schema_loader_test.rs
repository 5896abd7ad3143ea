//! Schema file loading and validation tests.

#[path = "../common/mod.rs"]
mod common;

use relorm::model::{ModelDef, Relations, RelationKind, Schema, SchemaError};
use relorm::sql::JoinType;

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_load_monitoring_schema() {
    let schema = common::schema();
    assert_eq!(schema.len(), 4);

    let host = schema.get("host").unwrap();
    assert_eq!(host.table_name(), "host");
    assert_eq!(host.table_alias(), "host");
    assert_eq!(host.key_name(), vec!["id"]);
    assert!(host.has_column("address"));
    assert_eq!(host.default_sort().len(), 1);

    let mut relations = Relations::new();
    host.create_relations(&mut relations);
    assert_eq!(relations.len(), 3);
    let status = relations.get("status").unwrap();
    assert_eq!(status.kind(), RelationKind::HasOne);
    assert_eq!(status.join_type(), JoinType::Left);
    assert!(relations.get("hostgroups").unwrap().through().is_some());
}

#[test]
fn test_relation_graph_of_loaded_schema() {
    let graph = common::schema().relation_graph().unwrap();
    assert_eq!(graph.model_count(), 4);
    assert_eq!(graph.relation_count(), 5);
    assert!(graph.has_cycles());

    let targets: Vec<&str> = graph.relations_of("host").iter().map(|(_, t)| *t).collect();
    assert_eq!(targets, vec!["service", "hostgroup", "host_status"]);
    assert!(graph.to_dot().contains("hostgroups (belongs_to_many)"));
}

#[test]
fn test_table_alias_and_explicit_keys() {
    let schema = Schema::from_toml(
        r#"
[[model]]
name = "contact"
table = "icinga_contact"
alias = "c"
key = ["contact_id"]
columns = ["contact_id", "name"]

[[model.relation]]
name = "notifications"
kind = "has_many"
target = "notification"
foreign_key = ["recipient_id"]

[[model]]
name = "notification"
table = "icinga_notification"
columns = ["id", "recipient_id", "sent"]
"#,
    )
    .unwrap();

    let contact = schema.get("contact").unwrap();
    assert_eq!(contact.table_alias(), "c");
    assert_eq!(contact.key_name(), vec!["contact_id"]);

    let mut relations = Relations::new();
    contact.create_relations(&mut relations);
    let notification = schema.get("notification").unwrap();
    let hops = relations
        .get("notifications")
        .unwrap()
        .hops(contact.as_ref(), notification.as_ref())
        .unwrap();
    assert_eq!(hops.len(), 1);
    assert_eq!(
        hops[0].keys,
        vec![("contact_id".to_string(), "recipient_id".to_string())]
    );
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_duplicate_model() {
    let err = Schema::from_toml(
        r#"
[[model]]
name = "host"
table = "host"
columns = ["id"]

[[model]]
name = "host"
table = "host2"
columns = ["id"]
"#,
    )
    .unwrap_err();
    assert!(matches!(err, SchemaError::DuplicateModel(name) if name == "host"));
}

#[test]
fn test_many_to_many_needs_junction() {
    let err = Schema::from_toml(
        r#"
[[model]]
name = "host"
table = "host"
columns = ["id"]

[[model.relation]]
name = "hostgroups"
kind = "belongs_to_many"
target = "host"
"#,
    )
    .unwrap_err();
    assert!(matches!(err, SchemaError::InvalidRelation { ref relation, .. } if relation == "hostgroups"));
}

#[test]
fn test_unknown_target() {
    let err = Schema::from_toml(
        r#"
[[model]]
name = "service"
table = "service"
columns = ["id", "host_id"]

[[model.relation]]
name = "host"
kind = "belongs_to"
target = "host"
"#,
    )
    .unwrap_err();
    assert!(matches!(err, SchemaError::UnknownTarget { ref target, .. } if target == "host"));
}

#[test]
fn test_mismatched_keys() {
    let err = Schema::from_toml(
        r#"
[[model]]
name = "host"
table = "host"
columns = ["id", "env"]

[[model.relation]]
name = "services"
kind = "has_many"
target = "service"
candidate_key = ["id", "env"]
foreign_key = ["host_id"]

[[model]]
name = "service"
table = "service"
columns = ["id", "host_id"]
"#,
    )
    .unwrap_err();
    assert!(matches!(err, SchemaError::InvalidRelation { ref relation, .. } if relation == "services"));
}

#[test]
fn test_invalid_default_sort() {
    let err = Schema::from_toml(
        r#"
[[model]]
name = "host"
table = "host"
columns = ["id", "name"]
default_sort = ["name upwards"]
"#,
    )
    .unwrap_err();
    assert!(matches!(err, SchemaError::InvalidSort { ref value, .. } if value == "name upwards"));
}

#[test]
fn test_unknown_behavior_kind() {
    let err = Schema::from_toml(
        r#"
[[model]]
name = "host"
table = "host"
columns = ["id"]

[[model.behavior]]
kind = "uppercase"
columns = ["id"]
"#,
    )
    .unwrap_err();
    assert!(matches!(err, SchemaError::Parse(_)));
}
