//! Query assembly tests: the SQL a query renders to, across dialects.

#[path = "../common/mod.rs"]
mod common;

use relorm::orm::{Filter, Instance, Query, QueryOptions, ResolveError, SubQuerySource};
use relorm::sql::test_utils::validate_sql;
use relorm::sql::{Dialect, SortDir};

fn query(model: &str) -> Query {
    Query::new(common::schema(), model).unwrap()
}

const DIALECTS: [Dialect; 5] = [
    Dialect::Postgres,
    Dialect::MySql,
    Dialect::TSql,
    Dialect::DuckDb,
    Dialect::Sqlite,
];

// ============================================================================
// Column Selection
// ============================================================================

#[test]
fn test_selected_columns() {
    let sql = query("host")
        .columns(&["name", "address"])
        .to_sql(Dialect::Postgres)
        .unwrap();
    insta::assert_snapshot!(sql, @r#"
    SELECT
      "host"."name" AS "host_name",
      "host"."address" AS "host_address"
    FROM "host" AS "host"
    ORDER BY "host"."name" ASC
    "#);
}

#[test]
fn test_with_relation_selects_all_of_its_columns() {
    let select = query("host")
        .columns(&["name"])
        .with_relation("status")
        .assemble()
        .unwrap();

    let aliases: Vec<&str> = select.columns.iter().map(|c| c.alias.as_str()).collect();
    assert_eq!(
        aliases,
        vec![
            "host_name",
            "host_status_id",
            "host_status_host_id",
            "host_status_output",
            "host_status_severity"
        ]
    );
    assert_eq!(select.eager, vec!["host.status"]);
}

#[test]
fn test_utilize_joins_without_selecting() {
    let select = query("host")
        .columns(&["name"])
        .utilize("hostgroups")
        .order_by("hostgroups.name", SortDir::Asc)
        .assemble()
        .unwrap();

    assert_eq!(select.columns.len(), 1);
    assert!(select.eager.is_empty());
    assert_eq!(select.statement.joins.len(), 2);
    let sql = select.statement.to_sql(Dialect::Postgres);
    assert!(sql.contains(r#"ORDER BY "host_hostgroups"."name" ASC"#), "{}", sql);
}

#[test]
fn test_unknown_column_aborts_assembly() {
    let err = query("host")
        .columns(&["name", "services.colour"])
        .assemble()
        .unwrap_err();
    assert!(matches!(err, ResolveError::ColumnNotFound { .. }));
}

// ============================================================================
// Filters
// ============================================================================

#[test]
fn test_all_on_repeated_column_renders_exists() {
    let sql = query("host")
        .columns(&["name"])
        .filter(Filter::all(vec![
            Filter::equal("services.name", "http"),
            Filter::equal("services.name", "ssh"),
        ]))
        .to_sql(Dialect::Postgres)
        .unwrap();

    assert!(sql.contains("WHERE EXISTS ("), "{}", sql);
    assert!(sql.contains(r#"GROUP BY "sub_host_services"."host_id""#), "{}", sql);
    assert!(
        sql.contains(r#"HAVING COUNT(DISTINCT "sub_host_services"."id") >= 2"#),
        "{}",
        sql
    );
    assert!(!sql.contains("JOIN"), "{}", sql);
    validate_sql(&sql, Dialect::Postgres).unwrap();
}

#[test]
fn test_negated_condition_renders_not_exists() {
    let sql = query("host")
        .columns(&["name"])
        .filter(Filter::unlike("services.name", "http*"))
        .to_sql(Dialect::Postgres)
        .unwrap();

    assert!(sql.contains("WHERE NOT EXISTS ("), "{}", sql);
    assert!(sql.contains(r#""sub_host_services"."name" LIKE 'http%'"#), "{}", sql);
    validate_sql(&sql, Dialect::Postgres).unwrap();
}

#[test]
fn test_rerouted_filter_joins_canonical_path() {
    let sql = query("service")
        .columns(&["name"])
        .filter(Filter::equal("hostgroups.name", "web"))
        .to_sql(Dialect::Postgres)
        .unwrap();

    assert!(
        sql.contains(r#"INNER JOIN "host" AS "service_host" ON "service"."host_id" = "service_host"."id""#),
        "{}",
        sql
    );
    assert!(
        sql.contains(r#"WHERE "service_host_hostgroups"."name" = 'web'"#),
        "{}",
        sql
    );
}

#[test]
fn test_filter_without_optimization_stays_joined() {
    let sql = query("host")
        .columns(&["name"])
        .filter(Filter::all(vec![
            Filter::equal("services.name", "http"),
            Filter::equal("services.name", "ssh"),
        ]))
        .optimize(false)
        .to_sql(Dialect::Postgres)
        .unwrap();

    assert!(!sql.contains("EXISTS"), "{}", sql);
    assert!(
        sql.contains(r#"("host_services"."name" = 'http' AND "host_services"."name" = 'ssh')"#),
        "{}",
        sql
    );
}

#[test]
fn test_filters_accumulate() {
    let sql = query("host")
        .columns(&["name"])
        .filter(Filter::equal("state", 0))
        .filter(Filter::equal("active", true))
        .to_sql(Dialect::Postgres)
        .unwrap();
    assert!(
        sql.contains(r#"("host"."state" = 0 AND "host"."active" = 'y')"#),
        "{}",
        sql
    );
}

// ============================================================================
// Paging, Counting and Dialects
// ============================================================================

#[test]
fn test_count_ignores_paging_and_order() {
    let sql = query("host")
        .filter(Filter::equal("state", 0))
        .limit(10)
        .offset(10)
        .count_sql(Dialect::Postgres)
        .unwrap();
    insta::assert_snapshot!(sql, @r#"
    SELECT
      COUNT(*) AS "count"
    FROM "host" AS "host"
    WHERE "host"."state" = 0
    "#);
}

#[test]
fn test_peek_ahead_from_options() {
    let options = QueryOptions {
        peek_ahead: true,
        ..QueryOptions::default()
    };
    let select = query("host").options(options).limit(5).assemble().unwrap();
    assert_eq!(select.peek_limit, Some(5));
}

#[test]
fn test_every_dialect_renders_valid_sql() {
    let query = query("host")
        .columns(&["name", "hostgroups.name"])
        .filter(Filter::any(vec![
            Filter::like("services.name", "http*"),
            Filter::like("services.name", "ssh*"),
        ]))
        .filter(Filter::unequal("address", "10.0.0.1"));

    for dialect in DIALECTS {
        let sql = query.to_sql(dialect).unwrap();
        validate_sql(&sql, dialect).unwrap_or_else(|e| panic!("{:?}: {}\n{}", dialect, e, sql));
    }
}

// ============================================================================
// Derived Queries
// ============================================================================

#[test]
fn test_derived_query_through_junction() {
    let mut host = Instance::new("host");
    host.set("id", 3);
    let sql = query("host")
        .derive_sub_query("hostgroups", SubQuerySource::Instance(&host))
        .unwrap()
        .columns(&["name"])
        .to_sql(Dialect::Postgres)
        .unwrap();

    assert!(
        sql.contains(r#"INNER JOIN "hostgroup_member" AS "hostgroup_through" ON "hostgroup_through"."hostgroup_id" = "hostgroup"."id""#),
        "{}",
        sql
    );
    assert!(sql.contains(r#"WHERE "hostgroup_through"."host_id" = 3"#), "{}", sql);
}

#[test]
fn test_derived_query_takes_filters() {
    let mut host = Instance::new("host");
    host.set("id", 1);
    let sql = query("host")
        .derive_sub_query("services", SubQuerySource::Instance(&host))
        .unwrap()
        .columns(&["name"])
        .filter(Filter::equal("state", 2))
        .to_sql(Dialect::Postgres)
        .unwrap();
    assert!(
        sql.contains(r#"WHERE "service"."host_id" = 1 AND "service"."state" = 2"#),
        "{}",
        sql
    );
}

#[test]
fn test_unknown_model() {
    let err = Query::new(common::schema(), "comment").unwrap_err();
    assert_eq!(err, ResolveError::UnknownModel("comment".into()));
}
