//! End-to-end tests: queries executed against an in-memory SQLite database.

#[path = "../common/mod.rs"]
mod common;

use relorm::model::Value;
use relorm::orm::{Filter, Instance, Query, QueryError, QueryOptions, QuerySpec};
use relorm::sql::SortDir;

fn host_query() -> Query {
    Query::new(common::schema(), "host").unwrap()
}

fn names(query: &Query) -> Vec<String> {
    let conn = common::database();
    query
        .execute(&conn)
        .unwrap()
        .map(|host| {
            host.unwrap()
                .value("name")
                .and_then(|v| v.as_str())
                .unwrap()
                .to_string()
        })
        .collect()
}

// ============================================================================
// Filters
// ============================================================================

#[test]
fn test_all_on_same_related_column_needs_every_value() {
    let query = host_query().columns(&["name"]).filter(Filter::all(vec![
        Filter::equal("services.name", "http"),
        Filter::equal("services.name", "ssh"),
    ]));
    assert_eq!(names(&query), vec!["web01"]);
}

#[test]
fn test_any_on_same_related_column() {
    let query = host_query().columns(&["name"]).filter(Filter::any(vec![
        Filter::equal("services.name", "http"),
        Filter::equal("services.name", "ssh"),
    ]));
    assert_eq!(names(&query), vec!["db01", "web01", "web02"]);
}

#[test]
fn test_unequal_on_relation_excludes_base_rows() {
    let query = host_query()
        .columns(&["name"])
        .filter(Filter::unequal("services.name", "http"));
    // hosts without any http service, including hosts without services
    assert_eq!(names(&query), vec!["backup", "db01"]);
}

#[test]
fn test_unequal_on_base_matches_null() {
    let query = host_query()
        .columns(&["name"])
        .filter(Filter::unequal("address", "10.0.0.1"));
    assert_eq!(names(&query), vec!["backup", "db01", "web02"]);
}

#[test]
fn test_unlike_on_base_matches_null() {
    let query = host_query()
        .columns(&["name"])
        .filter(Filter::unlike("address", "10.0.0.*"));
    assert_eq!(names(&query), vec!["backup", "db01"]);
}

#[test]
fn test_single_related_conditions_share_one_row() {
    let query = host_query().columns(&["name"]).filter(Filter::all(vec![
        Filter::equal("services.name", "http"),
        Filter::equal("services.state", 2),
    ]));
    assert_eq!(names(&query), vec!["web02"]);
}

#[test]
fn test_two_repeated_columns_on_one_relation() {
    // db01 runs ssh in state 0 and postgres in state 2
    let query = host_query().columns(&["name"]).filter(Filter::all(vec![
        Filter::equal("services.name", "ssh"),
        Filter::equal("services.state", 0),
        Filter::equal("services.name", "postgres"),
        Filter::equal("services.state", 2),
    ]));
    assert_eq!(names(&query), vec!["db01"]);
}

#[test]
fn test_all_with_value_list_needs_every_condition() {
    // web01 runs http and ssh, but no postgres
    let query = host_query().columns(&["name"]).filter(Filter::all(vec![
        Filter::one_of("services.name", vec![Value::from("http"), Value::from("ssh")]),
        Filter::equal("services.name", "postgres"),
    ]));
    assert_eq!(names(&query), vec!["db01"]);
}

#[test]
fn test_all_with_like_patterns_needs_every_pattern() {
    let query = host_query().columns(&["name"]).filter(Filter::all(vec![
        Filter::like("services.name", "*s*"),
        Filter::like("services.name", "*h*"),
    ]));
    // ssh alone satisfies both patterns
    assert_eq!(names(&query), vec!["db01", "web01"]);
}

#[test]
fn test_filter_value_is_persisted_and_retrieved() {
    let conn = common::database();
    let hosts: Vec<Instance> = host_query()
        .columns(&["name", "active"])
        .filter(Filter::equal("active", true))
        .execute(&conn)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(hosts.len(), 3);
    assert!(hosts
        .iter()
        .all(|h| h.value("active") == Some(&Value::Bool(true))));
}

#[test]
fn test_rerouted_filter() {
    let conn = common::database();
    let count = Query::new(common::schema(), "service")
        .unwrap()
        .filter(Filter::equal("hostgroups.name", "web"))
        .count(&conn)
        .unwrap();
    assert_eq!(count, 3);
}

#[test]
fn test_none_chain() {
    let query = host_query()
        .columns(&["name"])
        .filter(Filter::none(vec![
            Filter::equal("state", 0),
            Filter::equal("name", "db01"),
        ]));
    assert_eq!(names(&query), vec!["web02"]);
}

// ============================================================================
// Counting and Paging
// ============================================================================

#[test]
fn test_count_is_distinct_over_joins() {
    let conn = common::database();
    let count = host_query()
        .filter(Filter::equal("services.state", vec![Value::Int(0), Value::Int(2)]))
        .count(&conn)
        .unwrap();
    assert_eq!(count, 3);
    assert_eq!(host_query().count(&conn).unwrap(), 4);
}

#[test]
fn test_count_matches_rows_of_eager_relation() {
    let conn = common::database();
    let distinct = |query: &Query| {
        let mut hosts = names(query);
        hosts.dedup();
        hosts.len() as u64
    };

    // backup has no services, the inner join drops it
    let query = host_query().with_relation("services");
    assert_eq!(distinct(&query), 3);
    assert_eq!(query.count(&conn).unwrap(), 3);

    let query = host_query()
        .columns(&["name", "services.name"])
        .filter(Filter::all(vec![
            Filter::equal("services.name", "http"),
            Filter::equal("services.name", "ssh"),
        ]));
    assert_eq!(distinct(&query), 0);
    assert_eq!(query.count(&conn).unwrap(), 0);
}

#[test]
fn test_explicit_aliases_name_properties() {
    let conn = common::database();
    let host = host_query()
        .columns_aliased(&[("name", "label"), ("active", "enabled")])
        .filter(Filter::equal("name", "db01"))
        .first(&conn)
        .unwrap()
        .unwrap();
    assert_eq!(host.value("label"), Some(&Value::from("db01")));
    assert_eq!(host.value("enabled"), Some(&Value::Bool(false)));
}

#[test]
fn test_peek_ahead_reports_more_rows() {
    let conn = common::database();
    let mut page = host_query()
        .columns(&["name"])
        .limit(2)
        .peek_ahead(true)
        .execute(&conn)
        .unwrap();
    let first: Vec<Instance> = page.by_ref().collect::<Result<_, _>>().unwrap();
    assert_eq!(first.len(), 2);
    assert!(page.has_more());

    let mut page = host_query()
        .columns(&["name"])
        .limit(2)
        .offset(2)
        .peek_ahead(true)
        .execute(&conn)
        .unwrap();
    let last: Vec<Instance> = page.by_ref().collect::<Result<_, _>>().unwrap();
    assert_eq!(last.len(), 2);
    assert!(!page.has_more());
}

#[test]
fn test_uncached_results_are_single_pass() {
    let conn = common::database();
    let options = QueryOptions {
        cache_results: false,
        ..QueryOptions::default()
    };
    let mut results = host_query().options(options).execute(&conn).unwrap();
    assert_eq!(results.by_ref().count(), 4);
    assert!(matches!(results.rewind(), Err(QueryError::NotRewindable)));
}

#[test]
fn test_first() {
    let conn = common::database();
    let host = host_query()
        .order_by("name", SortDir::Desc)
        .first(&conn)
        .unwrap()
        .unwrap();
    assert_eq!(host.value("name"), Some(&Value::from("web02")));

    let none = host_query()
        .filter(Filter::equal("name", "mail01"))
        .first(&conn)
        .unwrap();
    assert!(none.is_none());
}

// ============================================================================
// Relations
// ============================================================================

#[test]
fn test_left_join_without_match() {
    let conn = common::database();
    let hosts: Vec<Instance> = host_query()
        .columns(&["id", "name", "status.output"])
        .execute(&conn)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(hosts.len(), 4);
    let backup = &hosts[0];
    assert_eq!(backup.value("name"), Some(&Value::from("backup")));
    assert!(backup.relation("status").is_none());
    assert!(backup.deferred("status").is_some());

    let db = &hosts[1];
    assert_eq!(
        db.lookup("status").unwrap().value("output"),
        Some(&Value::from("DOWN"))
    );
}

#[test]
fn test_deferred_relation_fetch() {
    let conn = common::database();
    let host = host_query()
        .columns(&["id", "name"])
        .filter(Filter::equal("name", "db01"))
        .first(&conn)
        .unwrap()
        .unwrap();

    let services = host.deferred("services").unwrap().fetch(&conn).unwrap();
    let mut names: Vec<&str> = services
        .iter()
        .filter_map(|s| s.value("name").and_then(|v| v.as_str()))
        .collect();
    names.sort();
    assert_eq!(names, vec!["postgres", "ssh"]);

    let groups = host.deferred("hostgroups").unwrap().fetch(&conn).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].value("name"), Some(&Value::from("db")));
}

#[test]
fn test_eager_relation_rows() {
    let conn = common::database();
    let rows: Vec<Instance> = host_query()
        .columns(&["name"])
        .with_relation("services")
        .filter(Filter::equal("name", "web01"))
        .execute(&conn)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    let mut services: Vec<&str> = rows
        .iter()
        .filter_map(|h| h.lookup("services"))
        .filter_map(|s| s.value("name").and_then(|v| v.as_str()))
        .collect();
    services.sort();
    assert_eq!(services, vec!["http", "ssh"]);
}

// ============================================================================
// Query Files
// ============================================================================

#[test]
fn test_query_file_to_json() {
    let conn = common::database();
    let spec = QuerySpec::from_toml(
        r#"
model = "host"
columns = ["name", "active"]
order_by = ["name desc"]
limit = 1

[filter]
all = [
    { column = "services.name", value = "http" },
    { column = "services.name", value = "ssh" },
]
"#,
    )
    .unwrap();
    let query = spec.to_query(common::schema(), QueryOptions::default()).unwrap();
    let hosts: Vec<Instance> = query
        .execute(&conn)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    let json = serde_json::to_value(&hosts).unwrap();
    assert_eq!(json, serde_json::json!([{"active": true, "name": "web01"}]));
}
