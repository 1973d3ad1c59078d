// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use scylla_rdbc::{
    connection::DEFAULT_FETCH_SIZE,
    prelude::*,
    session::{
        QueryResult,
        ScriptedSession,
    },
    Error,
};
use std::sync::Arc;

fn scripted() -> (Arc<ScriptedSession>, Connection) {
    let _ = env_logger::builder().is_test(true).try_init();
    let session = Arc::new(ScriptedSession::with_cluster("Test Cluster", "3.11.4"));
    let connection = Connection::with_session(session.clone(), Some("ks"), Consistency::One).unwrap();
    (session, connection)
}

#[test]
fn secure_bundles_are_rejected_before_connecting() {
    let config: ConnectionConfig = "jdbc:cassandra://?secureconnectbundle=/tmp/bundle.zip".parse().unwrap();
    assert!(matches!(Connection::open(&config), Err(Error::InvalidConfig { .. })));
}

#[test]
fn unreachable_contact_points_fail_to_open() {
    let config = ConnectionConfig::builder()
        .contact_points(vec!["127.0.0.1:1".to_owned()])
        .request_timeout_ms(500u64)
        .build()
        .unwrap();
    assert!(Connection::open(&config).is_err());
}

#[test]
fn use_statements_move_the_connection_keyspace() {
    let (session, connection) = scripted();
    session.on_execute("USE other", QueryResult::SetKeyspace("other".into()));
    let statement = connection.create_statement().unwrap();
    assert_eq!(statement.execute("USE other").unwrap().update_count(), Some(0));
    assert_eq!(connection.keyspace(), Some("other".to_owned()));
}

#[test]
fn statements_inherit_connection_defaults() {
    let (_, connection) = scripted();
    let statement = connection.create_statement().unwrap();
    assert_eq!(statement.consistency().unwrap(), Consistency::One);
    assert_eq!(statement.fetch_size().unwrap(), DEFAULT_FETCH_SIZE);
    assert!(!statement.is_scrollable().unwrap());
    assert_eq!(statement.serial_consistency().unwrap(), None);
}

#[test]
fn statements_fail_once_the_connection_closes() {
    let (session, connection) = scripted();
    session.on_execute("SELECT now() FROM system.local", QueryResult::Void);
    let statement = connection.create_statement().unwrap();
    connection.close().unwrap();
    assert!(matches!(
        statement.execute("SELECT now() FROM system.local"),
        Err(Error::ConnectionClosed)
    ));
    assert!(matches!(connection.set_keyspace("ks"), Err(Error::ConnectionClosed)));
}

#[test]
fn update_queries_must_not_return_rows() {
    let (session, connection) = scripted();
    let query = "SELECT cluster_name, release_version FROM system.local";
    session.on_execute("DELETE FROM ks.t WHERE id = 1", QueryResult::Void);
    let statement = connection.create_statement().unwrap();
    assert_eq!(statement.execute_update("DELETE FROM ks.t WHERE id = 1").unwrap(), 0);
    assert!(matches!(
        statement.execute_update(query),
        Err(Error::UnexpectedResult { expected: "an update count", .. })
    ));
    assert!(matches!(
        statement.execute_query("DELETE FROM ks.t WHERE id = 1"),
        Err(Error::UnexpectedResult { expected: "a result set", .. })
    ));
}
