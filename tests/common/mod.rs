//! Shared monitoring schema and database for integration tests.

#![allow(dead_code)]

use std::rc::Rc;

use relorm::model::Schema;
use relorm::orm::SqliteConnection;

pub const SCHEMA: &str = r#"
[[model]]
name = "host"
table = "host"
columns = ["id", "name", "address", "active", "state"]
default_sort = ["name"]

[[model.relation]]
name = "services"
kind = "has_many"
target = "service"

[[model.relation]]
name = "hostgroups"
kind = "belongs_to_many"
target = "hostgroup"
through = "hostgroup_member"

[[model.relation]]
name = "status"
kind = "has_one"
target = "host_status"
join = "left"

[[model.behavior]]
kind = "bool_cast"
columns = ["active"]

[[model.behavior]]
kind = "rename"
columns = { host_name = "name" }

[[model]]
name = "service"
table = "service"
columns = ["id", "host_id", "name", "state"]
default_sort = ["name"]

[[model.relation]]
name = "host"
kind = "belongs_to"
target = "host"

[[model.behavior]]
kind = "re_route"
routes = { hostgroups = "host.hostgroups" }

[model.defaults]
acknowledged = false

[[model]]
name = "hostgroup"
table = "hostgroup"
columns = ["id", "name"]

[[model.relation]]
name = "hosts"
kind = "belongs_to_many"
target = "host"
through = "hostgroup_member"

[[model]]
name = "host_status"
table = "host_status"
columns = ["id", "host_id", "output", "severity"]
"#;

const SETUP: &str = r#"
CREATE TABLE host (id INTEGER PRIMARY KEY, name TEXT NOT NULL, address TEXT, active TEXT NOT NULL, state INTEGER NOT NULL);
CREATE TABLE service (id INTEGER PRIMARY KEY, host_id INTEGER NOT NULL, name TEXT NOT NULL, state INTEGER NOT NULL);
CREATE TABLE hostgroup (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
CREATE TABLE hostgroup_member (host_id INTEGER NOT NULL, hostgroup_id INTEGER NOT NULL);
CREATE TABLE host_status (id INTEGER PRIMARY KEY, host_id INTEGER NOT NULL, output TEXT, severity INTEGER);

INSERT INTO host VALUES
    (1, 'web01', '10.0.0.1', 'y', 0),
    (2, 'web02', '10.0.0.2', 'y', 1),
    (3, 'db01', '10.0.1.1', 'n', 2),
    (4, 'backup', NULL, 'y', 0);

INSERT INTO service VALUES
    (1, 1, 'http', 0),
    (2, 1, 'ssh', 0),
    (3, 2, 'http', 2),
    (4, 3, 'ssh', 0),
    (5, 3, 'postgres', 2);

INSERT INTO hostgroup VALUES (1, 'web'), (2, 'db');
INSERT INTO hostgroup_member VALUES (1, 1), (2, 1), (3, 2);

INSERT INTO host_status VALUES (1, 1, 'UP', 0), (2, 3, 'DOWN', 2);
"#;

pub fn schema() -> Rc<Schema> {
    Rc::new(Schema::from_toml(SCHEMA).expect("test schema should load"))
}

pub fn database() -> SqliteConnection {
    let conn = SqliteConnection::open_in_memory().expect("in-memory database");
    conn.execute_batch(SETUP).expect("fixture data");
    conn
}
