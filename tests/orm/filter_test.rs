//! Filter compilation tests: resolution, behaviors and subquery extraction.

#[path = "../common/mod.rs"]
mod common;

use relorm::model::Value;
use relorm::orm::{
    CompiledFilter, Filter, FilterProcessor, FilterValue, Query, ResolveError,
};
use relorm::sql::test_utils::validate_sql;
use relorm::sql::Dialect;

fn compile(model: &str, filter: Filter) -> (CompiledFilter, Option<String>) {
    let query = Query::new(common::schema(), model).unwrap();
    let mut resolver = query.resolver().clone();
    let mut processor = FilterProcessor::new(&query, &mut resolver, &[]);
    let compiled = processor.resolve(&filter).unwrap();
    let sql = compiled
        .filter
        .as_ref()
        .and_then(|f| processor.assemble(f).unwrap())
        .map(|e| e.to_sql(Dialect::Postgres));
    (compiled, sql)
}

// ============================================================================
// Filter Trees
// ============================================================================

#[test]
fn test_filter_display() {
    let filter = Filter::all(vec![
        Filter::like("services.name", "http*"),
        Filter::any(vec![Filter::equal("state", 1), Filter::greater_than("state", 2)]),
    ]);
    assert_eq!(filter.to_string(), "all(services.name~http*, any(state=1, state>2))");
}

#[test]
fn test_and_extends_all_chain() {
    let filter = Filter::equal("state", 1)
        .and(Filter::equal("active", true))
        .and(Filter::equal("name", "web01"));
    assert_eq!(filter.conditions().len(), 3);
    assert_eq!(filter.to_string(), "all(state=1, active=true, name=web01)");
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn test_empty_chain_compiles_to_nothing() {
    let (compiled, sql) = compile("host", Filter::all(vec![Filter::any(vec![])]));
    assert!(compiled.filter.is_none());
    assert!(sql.is_none());
}

#[test]
fn test_renamed_column_in_filter() {
    let (_, sql) = compile("host", Filter::equal("host_name", "db01"));
    assert_eq!(sql.unwrap(), r#""host"."name" = 'db01'"#);
}

#[test]
fn test_rerouted_condition_targets_canonical_path() {
    let (compiled, sql) = compile("service", Filter::equal("hostgroups.name", "web"));

    let filter = compiled.filter.unwrap();
    let condition = filter.conditions()[0];
    assert_eq!(condition.column, "service.host.hostgroups.name");
    assert_eq!(condition.relation_path(), Some("service.host.hostgroups"));
    assert_eq!(compiled.required_paths, vec!["service.host.hostgroups"]);
    assert_eq!(sql.unwrap(), r#""service_host_hostgroups"."name" = 'web'"#);
}

#[test]
fn test_value_list_converts_each_value() {
    let (compiled, sql) = compile(
        "host",
        Filter::one_of("active", vec![Value::Bool(true), Value::from("no")]),
    );
    let filter = compiled.filter.unwrap();
    assert_eq!(
        filter.conditions()[0].value,
        FilterValue::List(vec![Value::from("y"), Value::from("n")])
    );
    assert_eq!(sql.unwrap(), r#""host"."active" IN ('y', 'n')"#);
}

#[test]
fn test_unknown_relation_rejects_filter() {
    let query = Query::new(common::schema(), "host").unwrap();
    let mut resolver = query.resolver().clone();
    let mut processor = FilterProcessor::new(&query, &mut resolver, &[]);
    let err = processor
        .resolve(&Filter::equal("comments.text", "x"))
        .unwrap_err();
    assert!(matches!(err, ResolveError::RelationNotFound { .. }));
}

// ============================================================================
// Comparisons
// ============================================================================

#[test]
fn test_like_lists() {
    let (_, sql) = compile("host", Filter::like("name", vec![Value::from("web*"), Value::from("db*")]));
    assert_eq!(
        sql.unwrap(),
        r#"("host"."name" LIKE 'web%' OR "host"."name" LIKE 'db%')"#
    );

    let (_, sql) = compile("host", Filter::unlike("name", vec![Value::from("web*"), Value::from("db*")]));
    assert_eq!(
        sql.unwrap(),
        r#"(("host"."name" NOT LIKE 'web%' AND "host"."name" NOT LIKE 'db%') OR "host"."name" IS NULL)"#
    );
}

#[test]
fn test_unequal_null_is_not_null() {
    let (_, sql) = compile("host", Filter::unequal("address", Value::Null));
    assert_eq!(sql.unwrap(), r#""host"."address" IS NOT NULL"#);
}

#[test]
fn test_ordering_comparisons() {
    let (_, sql) = compile(
        "host",
        Filter::all(vec![
            Filter::greater_than_or_equal("state", 1),
            Filter::less_than("state", 3),
        ]),
    );
    assert_eq!(
        sql.unwrap(),
        r#"("host"."state" >= 1 AND "host"."state" < 3)"#
    );
}

// ============================================================================
// Subquery Extraction
// ============================================================================

#[test]
fn test_to_one_path_is_never_extracted() {
    let (compiled, _) = compile(
        "service",
        Filter::all(vec![
            Filter::equal("host.name", "web01"),
            Filter::equal("host.name", "web02"),
            Filter::unequal("host.state", 2),
        ]),
    );
    let filter = compiled.filter.unwrap();
    // the negated condition still moves into NOT EXISTS
    assert_eq!(filter.subquery_count(), 1);
    assert_eq!(compiled.required_paths, vec!["service.host"]);
}

#[test]
fn test_each_path_gets_its_own_subquery() {
    let (compiled, sql) = compile(
        "host",
        Filter::all(vec![
            Filter::equal("services.name", "http"),
            Filter::equal("hostgroups.name", "web"),
            Filter::equal("services.name", "ssh"),
            Filter::equal("hostgroups.name", "db"),
        ]),
    );
    assert_eq!(compiled.filter.unwrap().subquery_count(), 2);
    assert!(compiled.required_paths.is_empty());
    let sql = sql.unwrap();
    assert!(sql.contains(r#"FROM "service" AS "sub_host_services""#), "{}", sql);
    assert!(sql.contains(r#"FROM "hostgroup" AS "sub_host_hostgroups""#), "{}", sql);
    assert!(
        sql.contains(r#""sub_host_hostgroups_through"."host_id" = "host"."id""#),
        "{}",
        sql
    );
}

#[test]
fn test_extraction_through_to_one_head() {
    let (compiled, sql) = compile(
        "service",
        Filter::all(vec![
            Filter::equal("hostgroups.name", "web"),
            Filter::equal("hostgroups.name", "db"),
        ]),
    );
    assert_eq!(compiled.filter.unwrap().subquery_count(), 1);
    let sql = sql.unwrap();
    assert!(sql.contains(r#"FROM "host" AS "sub_service_host""#), "{}", sql);
    assert!(sql.contains(r#""sub_service_host"."id" = "service"."host_id""#), "{}", sql);
    assert!(
        sql.contains(r#"HAVING COUNT(DISTINCT "sub_service_host_hostgroups"."id") >= 2"#),
        "{}",
        sql
    );
}

#[test]
fn test_nested_chains_are_optimized_independently() {
    let (compiled, _) = compile(
        "host",
        Filter::all(vec![
            Filter::equal("services.name", "http"),
            Filter::any(vec![
                Filter::equal("services.state", 1),
                Filter::equal("services.state", 2),
            ]),
        ]),
    );
    assert_eq!(compiled.filter.unwrap().subquery_count(), 1);
    assert_eq!(compiled.required_paths, vec!["host.services"]);
}

#[test]
fn test_extracted_sql_is_valid() {
    let query = Query::new(common::schema(), "host")
        .unwrap()
        .columns(&["name"])
        .filter(Filter::all(vec![
            Filter::like("services.name", "http*"),
            Filter::like("services.name", "ssh*"),
            Filter::unequal("hostgroups.name", "db"),
        ]));
    for dialect in [Dialect::Postgres, Dialect::Sqlite, Dialect::MySql] {
        let sql = query.to_sql(dialect).unwrap();
        validate_sql(&sql, dialect).unwrap_or_else(|e| panic!("{:?}: {}\n{}", dialect, e, sql));
    }
}
