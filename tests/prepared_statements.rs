// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use scylla_rdbc::{
    metadata::ParameterSource,
    prelude::*,
    session::{
        Cell,
        ColumnSpec,
        QueryResult,
        RawRow,
        ScriptedSession,
    },
    Error,
};
use std::{
    net::IpAddr,
    sync::{
        Arc,
        Mutex,
    },
};
use uuid::Uuid;

const SELECT_BY_FLAGS: &str = "SELECT keyname FROM cf_test WHERE t1bValue = ? AND t1iValue = ?";
const INSERT_ROW: &str = "INSERT INTO cf_test (keyname, t1tuple, t1inet, t1duration, t1uuid) VALUES (?,?,?,?,?)";
const SELECT_ROW: &str = "SELECT keyname, t1tuple, t1inet, t1duration, t1uuid FROM cf_test WHERE keyname = ?";

fn column(name: &str, ty: &str) -> ColumnSpec {
    ColumnSpec::new("ks", "cf_test", name, ty.parse().unwrap())
}

fn connect(session: &Arc<ScriptedSession>) -> Connection {
    let _ = env_logger::builder().is_test(true).try_init();
    Connection::with_session(session.clone(), Some("ks"), Consistency::One).unwrap()
}

fn row_columns() -> Vec<ColumnSpec> {
    vec![
        column("keyname", "text"),
        column("t1tuple", "tuple<int, text>"),
        column("t1inet", "inet"),
        column("t1duration", "duration"),
        column("t1uuid", "uuid"),
    ]
}

#[test]
fn parameter_metadata_follows_declared_markers() {
    let session = Arc::new(ScriptedSession::with_cluster("Test Cluster", "4.0.0"));
    session.on_prepare(
        SELECT_BY_FLAGS,
        Some(vec![column("t1bvalue", "boolean"), column("t1ivalue", "int")]),
        Some(vec![column("keyname", "text")]),
    );
    let connection = connect(&session);
    let statement = connection.prepare_statement(SELECT_BY_FLAGS).unwrap();
    statement.set_object(1, true, None).unwrap();
    statement.set_object(2, 0, None).unwrap();

    let parameters = statement.parameter_metadata().unwrap();
    assert!(!parameters.is_degraded());
    assert_eq!(parameters.parameter_count(), 2);
    let types = parameters
        .parameters()
        .iter()
        .map(|p| p.relational_type())
        .collect::<Vec<_>>();
    assert_eq!(types, vec![RelationalType::Boolean, RelationalType::Integer]);
    assert_eq!(parameters.parameter(1).unwrap().name(), "t1bvalue");
    assert!(matches!(parameters.parameter(3), Err(Error::ParameterOutOfRange { .. })));
}

#[test]
fn parameter_metadata_degrades_without_driver_metadata() {
    let session = Arc::new(ScriptedSession::with_cluster("Test Cluster", "4.0.0"));
    let connection = connect(&session);
    let statement = connection.prepare_statement(SELECT_BY_FLAGS).unwrap();
    assert_eq!(statement.parameter_count(), 2);
    statement.set_object(1, true, None).unwrap();
    statement.set_object(2, 0, None).unwrap();

    let parameters = statement.parameter_metadata().unwrap();
    assert!(parameters.is_degraded());
    let types = parameters
        .parameters()
        .iter()
        .map(|p| p.relational_type())
        .collect::<Vec<_>>();
    assert_eq!(types, vec![RelationalType::Boolean, RelationalType::Integer]);
    assert_eq!(parameters.parameter(2).unwrap().nullable(), Nullability::Unknown);
}

#[test]
fn typed_nulls_describe_undeclared_markers() {
    let session = Arc::new(ScriptedSession::with_cluster("Test Cluster", "4.0.0"));
    let connection = connect(&session);
    let statement = connection.prepare_statement(SELECT_BY_FLAGS).unwrap();
    statement.set_null(1, Some(RelationalType::Boolean)).unwrap();
    statement.set_null(2, None).unwrap();

    let parameters = statement.parameter_metadata().unwrap();
    assert!(parameters.is_degraded());
    let first = parameters.parameter(1).unwrap();
    assert_eq!(first.relational_type(), RelationalType::Boolean);
    assert_eq!(first.source(), ParameterSource::Inferred);
    let second = parameters.parameter(2).unwrap();
    assert_eq!(second.relational_type(), RelationalType::Varchar);
    assert_eq!(second.source(), ParameterSource::Unknown);
}

#[test]
fn bound_objects_read_back_equal() {
    let session = Arc::new(ScriptedSession::with_cluster("Test Cluster", "4.0.0"));
    let columns = row_columns();
    session.on_prepare(INSERT_ROW, Some(columns.clone()), None);
    session.on_prepare(SELECT_ROW, Some(vec![column("keyname", "text")]), Some(columns.clone()));

    let stored = Arc::new(Mutex::new(None::<RawRow>));
    let insert_into = stored.clone();
    session.on_execute_with(INSERT_ROW, move |request| {
        let row = request
            .values
            .iter()
            .map(|cell| match cell {
                Cell::Set(body) => Some(body.clone()),
                _ => None,
            })
            .collect();
        *insert_into.lock().unwrap() = Some(row);
        Ok(QueryResult::Void)
    });
    let select_from = stored.clone();
    session.on_execute_with(SELECT_ROW, move |_| {
        Ok(QueryResult::Rows(scylla_rdbc::session::Page {
            columns: row_columns(),
            rows: select_from.lock().unwrap().clone().into_iter().collect(),
            paging_state: None,
        }))
    });
    let connection = connect(&session);

    let tuple = Value::Tuple(vec![Value::Int(7), "seven".into()]);
    let inet: IpAddr = "192.168.0.17".parse().unwrap();
    let duration: CqlDuration = "1mo2d3h".parse().unwrap();
    let uuid = Uuid::new_v4();

    let insert = connection.prepare_statement(INSERT_ROW).unwrap();
    insert.set_object(1, "key1", None).unwrap();
    insert.set_object(2, tuple.clone(), None).unwrap();
    insert.set_object(3, inet, None).unwrap();
    insert.set_object(4, duration.clone(), None).unwrap();
    insert.set_object(5, uuid, None).unwrap();
    assert_eq!(insert.execute_update().unwrap(), 0);

    let select = connection.prepare_statement(SELECT_ROW).unwrap();
    select.set_string(1, "key1").unwrap();
    let cursor = select.execute_query().unwrap();
    assert!(cursor.next().unwrap());
    assert_eq!(cursor.get_string("keyname").unwrap(), Some("key1".to_owned()));
    assert_eq!(cursor.get_object("t1tuple").unwrap(), tuple);
    assert_eq!(cursor.get_inet("t1inet").unwrap(), Some(inet));
    assert_eq!(cursor.get_duration("t1duration").unwrap(), Some(duration));
    assert_eq!(cursor.get_uuid("t1uuid").unwrap(), Some(uuid));
    assert!(!cursor.next().unwrap());
}

#[test]
fn text_binds_to_uuid_markers_with_an_explicit_type() {
    let session = Arc::new(ScriptedSession::with_cluster("Test Cluster", "4.0.0"));
    session.on_prepare(INSERT_ROW, Some(row_columns()), None);
    let connection = connect(&session);
    let insert = connection.prepare_statement(INSERT_ROW).unwrap();
    let uuid = Uuid::new_v4();
    insert
        .set_object(5, uuid.to_string(), Some(RelationalType::Varchar))
        .unwrap();
    assert!(matches!(
        insert.set_object(3, "not an address", Some(RelationalType::Varchar)),
        Err(Error::TypeMismatch { .. })
    ));
    assert!(matches!(insert.set_object(6, 1, None), Err(Error::ParameterOutOfRange { position: 6, count: 5, .. })));
    assert!(matches!(insert.execute_update(), Err(Error::UnboundParameter { position: 1, .. })));
}

#[test]
fn aliased_columns_keep_their_source_table() {
    let session = Arc::new(ScriptedSession::with_cluster("Test Cluster", "4.0.0"));
    let query = "SELECT keyname AS resKeyname FROM cf_test";
    session.on_execute_pages(
        query,
        vec![column("reskeyname", "text")],
        vec![vec![vec![Some(b"key1".to_vec())]]],
    );
    let connection = connect(&session);
    let cursor = connection.create_statement().unwrap().execute_query(query).unwrap();

    let metadata = cursor.metadata();
    let described = metadata.column(1).unwrap();
    assert_eq!(described.name(), "reskeyname");
    assert_eq!(described.label(), "reskeyname");
    assert_eq!(described.table(), "cf_test");
    assert_eq!(described.schema(), "ks");
    assert_eq!(described.catalog(), "Test Cluster");
    assert_eq!(cursor.find_column("resKeyname").unwrap(), 1);
}

#[test]
fn closed_cursors_refuse_to_move() {
    let session = Arc::new(ScriptedSession::with_cluster("Test Cluster", "4.0.0"));
    session.on_execute_pages(
        "SELECT keyname FROM cf_test",
        vec![column("keyname", "text")],
        vec![vec![vec![Some(b"a".to_vec())], vec![Some(b"b".to_vec())]]],
    );
    let connection = connect(&session);
    let cursor = connection
        .create_statement()
        .unwrap()
        .execute_query("SELECT keyname FROM cf_test")
        .unwrap();
    assert!(cursor.next().unwrap());
    cursor.close();
    assert!(cursor.is_closed());
    assert!(matches!(cursor.next(), Err(Error::CursorClosed)));
    assert!(matches!(cursor.get_string(1), Err(Error::CursorClosed)));
}

#[test]
fn batches_run_every_parameter_set() {
    let session = Arc::new(ScriptedSession::with_cluster("Test Cluster", "4.0.0"));
    let query = "UPDATE cf_test SET t1ivalue = ? WHERE keyname = ?";
    session.on_prepare(query, Some(vec![column("t1ivalue", "int"), column("keyname", "text")]), None);
    session.on_execute(query, QueryResult::Void);
    let connection = connect(&session);
    let statement = connection.prepare_statement(query).unwrap();
    for (value, key) in vec![(1, "a"), (2, "b"), (3, "c")] {
        statement.set_i32(1, value).unwrap();
        statement.set_string(2, key).unwrap();
        statement.add_batch().unwrap();
    }
    assert_eq!(statement.execute_batch().unwrap(), vec![0, 0, 0]);
    assert!(statement.execute_batch().unwrap().is_empty());
    let executed = session
        .requests()
        .into_iter()
        .filter(|(request, _)| request.query() == query)
        .count();
    assert_eq!(executed, 3);
}

#[test]
fn conditional_updates_report_whether_they_applied() {
    let session = Arc::new(ScriptedSession::with_cluster("Test Cluster", "4.0.0"));
    let query = "INSERT INTO cf_test (keyname) VALUES ('a') IF NOT EXISTS";
    session.on_execute_pages(
        query,
        vec![column("[applied]", "boolean")],
        vec![vec![vec![Some(vec![1])]]],
    );
    let connection = connect(&session);
    let statement = connection.create_statement().unwrap();
    assert_eq!(statement.execute_update(query).unwrap(), 1);
}

#[test]
fn closed_statements_fail() {
    let session = Arc::new(ScriptedSession::with_cluster("Test Cluster", "4.0.0"));
    let connection = connect(&session);
    let statement = connection.prepare_statement("SELECT keyname FROM cf_test").unwrap();
    statement.close().unwrap();
    statement.close().unwrap();
    assert!(statement.is_closed());
    assert!(matches!(statement.execute(), Err(Error::StatementClosed)));
}
