//! Resolver tests against a schema loaded from TOML.

#[path = "../common/mod.rs"]
mod common;

use std::rc::Rc;

use relorm::model::Schema;
use relorm::orm::{ColumnTarget, ResolveError, Resolver};

fn resolver(model: &str) -> Resolver {
    let schema: Rc<Schema> = common::schema();
    let base = schema.get(model).unwrap();
    Resolver::new(schema, base)
}

// ============================================================================
// Relation Paths
// ============================================================================

#[test]
fn test_paths_with_and_without_base_prefix_are_the_same() {
    let mut resolver = resolver("host");
    let short = resolver.resolve_relation("services").unwrap();
    let long = resolver.resolve_relation("host.services").unwrap();

    assert!(Rc::ptr_eq(&short, &long));
    assert_eq!(resolver.get_alias("services").unwrap(), "host_services");
}

#[test]
fn test_nested_path_resolves_each_segment() {
    let mut resolver = resolver("host");
    let chain = resolver.resolve_relations("services.host.hostgroups").unwrap();

    let paths: Vec<&str> = chain.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "host.services",
            "host.services.host",
            "host.services.host.hostgroups"
        ]
    );
    assert_eq!(
        resolver.get_alias("services.host.hostgroups").unwrap(),
        "host_services_host_hostgroups"
    );
    assert!(chain[0].is_many());
    assert!(!chain[1].is_many());
    assert_eq!(chain[2].hops.len(), 2);
}

#[test]
fn test_rerouted_path_shares_alias_with_its_canonical_form() {
    let mut resolver = resolver("service");
    let rerouted = resolver.resolve_relation("hostgroups").unwrap();
    let direct = resolver.resolve_relation("host.hostgroups").unwrap();

    assert!(Rc::ptr_eq(&rerouted, &direct));
    assert_eq!(rerouted.path, "service.host.hostgroups");
    assert_eq!(
        resolver.get_alias("hostgroups").unwrap(),
        resolver.get_alias("host.hostgroups").unwrap()
    );
}

#[test]
fn test_unknown_relation_names_the_model() {
    let mut resolver = resolver("host");
    let err = resolver.resolve_relations("services.comments").unwrap_err();
    assert_eq!(
        err,
        ResolveError::RelationNotFound {
            model: "service".into(),
            relation: "comments".into()
        }
    );
}

#[test]
fn test_depth_limit() {
    let mut resolver = resolver("host").max_depth(2);
    assert!(resolver.resolve_relations("services.host").is_ok());
    let err = resolver
        .resolve_relations("services.host.services.host")
        .unwrap_err();
    assert!(matches!(err, ResolveError::RelationDepthExceeded { max: 2, .. }));
}

#[test]
fn test_alias_requires_resolution() {
    let resolver = resolver("host");
    assert_eq!(resolver.get_alias("host").unwrap(), "host");
    assert!(matches!(
        resolver.get_alias("services"),
        Err(ResolveError::AliasNotRegistered(_))
    ));
}

// ============================================================================
// Columns
// ============================================================================

#[test]
fn test_resolve_related_column() {
    let mut resolver = resolver("host");
    let column = resolver.resolve_column("services.state").unwrap();

    assert_eq!(column.path, "host.services");
    assert_eq!(column.table_alias, "host_services");
    assert_eq!(column.alias, "host_services_state");
    assert_eq!(column.qualified(), "host_services.state");
    assert_eq!(column.model.name(), "service");
}

#[test]
fn test_renamed_column_keeps_requested_name() {
    let mut resolver = resolver("host");
    let column = resolver.resolve_column("host_name").unwrap();

    assert_eq!(column.column, "host_name");
    assert_eq!(column.target, ColumnTarget::Column("name".into()));
    assert_eq!(column.qualified(), "host.name");
}

#[test]
fn test_unknown_column_fails() {
    let mut resolver = resolver("host");
    let err = resolver.resolve_column("status.colour").unwrap_err();
    assert_eq!(
        err,
        ResolveError::ColumnNotFound {
            model: "host_status".into(),
            column: "colour".into()
        }
    );
}

#[test]
fn test_require_and_resolve_columns_is_all_or_nothing() {
    let mut resolver = resolver("host");
    assert!(resolver
        .require_and_resolve_columns(&["name", "services.name", "nope"])
        .is_err());

    let columns = resolver
        .require_and_resolve_columns(&["name", "services.name"])
        .unwrap();
    assert_eq!(columns.len(), 2);
}

#[test]
fn test_cloned_resolver_is_independent() {
    let original = resolver("host");
    let mut copy = original.clone();
    copy.resolve_relations("services").unwrap();

    assert!(copy.get_alias("services").is_ok());
    assert!(original.get_alias("services").is_err());
}
