// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Runs against a live node named by `SCYLLA_RDBC_NODE`, e.g.
//! `SCYLLA_RDBC_NODE=172.17.0.2:9042 cargo test -- --ignored`.

use scylla_rdbc::prelude::*;

fn connect() -> Connection {
    let _ = env_logger::builder().is_test(true).try_init();
    let node = std::env::var("SCYLLA_RDBC_NODE").unwrap_or_else(|_| "172.17.0.2:9042".to_owned());
    let config: ConnectionConfig = format!("cassandra://{}?localdatacenter=datacenter1", node)
        .parse()
        .unwrap();
    Connection::open(&config).unwrap()
}

#[test]
#[ignore]
fn establish_connection() {
    let connection = connect();
    assert!(!connection.catalog().is_empty());
    assert!(!connection.server_version().is_empty());
    connection.close().unwrap();
}

#[test]
#[ignore]
fn prepared_round_trip() {
    let connection = connect();
    let statement = connection.create_statement().unwrap();
    statement
        .execute_update(
            "CREATE KEYSPACE IF NOT EXISTS rdbc_test WITH replication = {'class': 'SimpleStrategy', 'replication_factor': 1}",
        )
        .unwrap();
    statement
        .execute_update("CREATE TABLE IF NOT EXISTS rdbc_test.cf_test (keyname text PRIMARY KEY, t1bvalue boolean, t1ivalue int)")
        .unwrap();
    connection.set_keyspace("rdbc_test").unwrap();

    let insert = connection
        .prepare_statement("INSERT INTO cf_test (keyname, t1bvalue, t1ivalue) VALUES (?, ?, ?)")
        .unwrap();
    insert.set_string(1, "key1").unwrap();
    insert.set_bool(2, true).unwrap();
    insert.set_i32(3, 0).unwrap();
    insert.execute_update().unwrap();

    let select = connection
        .prepare_statement("SELECT keyname AS resKeyname FROM cf_test WHERE keyname = ?")
        .unwrap();
    let parameters = select.parameter_metadata().unwrap();
    assert_eq!(parameters.parameter(1).unwrap().relational_type(), RelationalType::Varchar);
    select.set_string(1, "key1").unwrap();
    let cursor = select.execute_query().unwrap();
    assert!(cursor.next().unwrap());
    assert_eq!(cursor.get_string("resKeyname").unwrap(), Some("key1".to_owned()));
    assert_eq!(cursor.metadata().column(1).unwrap().table(), "cf_test");
    cursor.close();
    assert!(cursor.next().is_err());
    connection.close().unwrap();
}
