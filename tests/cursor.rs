// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use maplit::hashmap;
use scylla_rdbc::{
    prelude::*,
    session::{
        ColumnSpec,
        RawRow,
        ScriptedSession,
    },
    Error,
};
use std::{
    sync::Arc,
    thread,
    time::{
        Duration,
        Instant,
    },
};

const QUERY: &str = "SELECT id, name FROM ks.users";

fn row(id: i32, name: Option<&str>) -> RawRow {
    vec![Some(id.to_be_bytes().to_vec()), name.map(|n| n.as_bytes().to_vec())]
}

fn scripted(pages: Vec<Vec<RawRow>>) -> (Arc<ScriptedSession>, Connection) {
    let _ = env_logger::builder().is_test(true).try_init();
    let session = Arc::new(ScriptedSession::with_cluster("Test Cluster", "4.0.0"));
    session.on_execute_pages(
        QUERY,
        vec![
            ColumnSpec::new("ks", "users", "id", NativeType::Int.into()),
            ColumnSpec::new("ks", "users", "name", NativeType::Text.into()),
        ],
        pages,
    );
    let connection = Connection::with_session(session.clone(), Some("ks"), Consistency::LocalQuorum).unwrap();
    (session, connection)
}

#[test]
fn pages_are_fetched_only_when_reached() {
    let (session, connection) = scripted(vec![
        vec![row(1, Some("ann")), row(2, None)],
        vec![row(3, Some("carl"))],
        vec![],
    ]);
    let statement = connection.create_statement().unwrap();
    statement.set_fetch_size(2).unwrap();
    let cursor = statement.execute_query(QUERY).unwrap();
    let fetched = || session.requests().iter().filter(|(r, _)| r.query() == QUERY).count();
    assert_eq!(fetched(), 1);

    let mut names = hashmap! {};
    while cursor.next().unwrap() {
        let id = cursor.get_i32("id").unwrap();
        names.insert(id, cursor.get_string("name").unwrap());
        if id == 2 {
            assert!(cursor.was_null().unwrap());
        }
    }
    assert_eq!(
        names,
        hashmap! { 1 => Some("ann".to_owned()), 2 => None, 3 => Some("carl".to_owned()) }
    );
    assert_eq!(fetched(), 3);
    assert!(cursor.is_after_last().unwrap());

    let requests = session.requests();
    let (first, _) = requests.iter().find(|(r, _)| r.query() == QUERY).unwrap();
    assert_eq!(first.page_size, Some(2));
    assert_eq!(first.consistency, Consistency::LocalQuorum);
}

#[test]
fn scrollable_cursors_revisit_rows() {
    let (_, connection) = scripted(vec![vec![row(1, Some("a")), row(2, Some("b"))], vec![row(3, Some("c"))]]);
    let statement = connection.create_statement().unwrap();
    statement.set_scrollable(true).unwrap();
    let cursor = statement.execute_query(QUERY).unwrap();
    assert!(cursor.is_scrollable());

    assert!(cursor.last().unwrap());
    assert_eq!(cursor.row_number().unwrap(), 3);
    assert!(cursor.absolute(1).unwrap());
    assert_eq!(cursor.get_string(2).unwrap(), Some("a".to_owned()));
    assert!(cursor.relative(1).unwrap());
    assert!(cursor.is_first().map(|first| !first).unwrap());
    assert!(cursor.absolute(-1).unwrap());
    assert_eq!(cursor.get_i32(1).unwrap(), 3);
    assert!(!cursor.relative(5).unwrap());
    assert!(cursor.is_after_last().unwrap());
    assert!(cursor.previous().unwrap());
    assert_eq!(cursor.get_i32(1).unwrap(), 3);
}

#[test]
fn forward_only_cursors_refuse_to_scroll() {
    let (_, connection) = scripted(vec![vec![row(1, Some("a")), row(2, Some("b"))]]);
    let cursor = connection.create_statement().unwrap().execute_query(QUERY).unwrap();
    assert!(cursor.next().unwrap());
    assert!(matches!(cursor.previous(), Err(Error::ForwardOnly { .. })));
    assert!(matches!(cursor.absolute(1), Err(Error::ForwardOnly { .. })));
    assert!(cursor.next().unwrap());
    assert!(cursor.is_last().unwrap());
    assert!(!cursor.next().unwrap());
}

#[test]
fn executing_again_closes_the_previous_cursor() {
    let (_, connection) = scripted(vec![vec![row(1, Some("a"))], vec![row(2, Some("b"))]]);
    let statement = connection.create_statement().unwrap();
    let first = statement.execute_query(QUERY).unwrap();
    let second = statement.execute_query(QUERY).unwrap();
    assert!(first.is_closed());
    assert!(matches!(first.next(), Err(Error::CursorClosed)));
    assert!(second.next().unwrap());

    statement.close().unwrap();
    assert!(second.is_closed());
}

#[test]
fn getters_reject_unknown_columns() {
    let (_, connection) = scripted(vec![vec![row(1, Some("a"))]]);
    let cursor = connection.create_statement().unwrap().execute_query(QUERY).unwrap();
    assert!(matches!(cursor.get_i32(1), Err(Error::NoCurrentRow)));
    assert!(cursor.next().unwrap());
    assert!(matches!(cursor.get_i32("missing"), Err(Error::ColumnNotFound { .. })));
    assert!(matches!(cursor.get_i32(0), Err(Error::ColumnNotFound { .. })));
    assert_eq!(cursor.get_row().unwrap(), vec![Value::Int(1), Value::Text("a".into())]);
    assert_eq!(cursor.find_column("NAME").unwrap(), 2);
}

#[test]
fn closing_from_another_thread_abandons_the_execution() {
    let _ = env_logger::builder().is_test(true).try_init();
    let session = Arc::new(ScriptedSession::with_cluster("Test Cluster", "4.0.0"));
    let slow = "SELECT id FROM ks.slow";
    session.on_execute_hang(slow, Duration::from_secs(10));
    let connection = Connection::with_session(session, None, Consistency::One).unwrap();
    let statement = Arc::new(connection.create_statement().unwrap());

    let closer = statement.clone();
    let started = Instant::now();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        closer.close()
    });
    assert!(matches!(statement.execute(slow), Err(Error::StatementClosed)));
    assert!(started.elapsed() < Duration::from_secs(10));
    handle.join().unwrap().unwrap();
    assert!(statement.is_closed());
}

#[test]
fn float_vectors_and_similarity_scores_read_back() {
    let _ = env_logger::builder().is_test(true).try_init();
    let session = Arc::new(ScriptedSession::with_cluster("Test Cluster", "4.0.0"));
    let query = "SELECT embedding, similarity_cosine(embedding, ?) AS similarity FROM ks.docs";
    let embedding = (0..14).map(|i| i as f32 * 0.5).collect::<Vec<f32>>();
    let similarity = 0.875f32;
    session.on_execute_pages(
        query,
        vec![
            ColumnSpec::new("ks", "docs", "embedding", "vector<float, 14>".parse().unwrap()),
            ColumnSpec::new("ks", "docs", "similarity", NativeType::Float.into()),
        ],
        vec![vec![vec![
            Some(embedding.iter().flat_map(|f| f.to_be_bytes().to_vec()).collect()),
            Some(similarity.to_be_bytes().to_vec()),
        ]]],
    );
    let connection = Connection::with_session(session, Some("ks"), Consistency::One).unwrap();
    let cursor = connection.create_statement().unwrap().execute_query(query).unwrap();
    assert!(cursor.next().unwrap());
    assert_eq!(cursor.get_object("embedding").unwrap(), Value::Vector(embedding.clone()));
    assert_eq!(cursor.get_vector(1).unwrap(), Some(embedding));
    assert_eq!(cursor.get_f64("similarity").unwrap(), 0.875);
    assert_eq!(cursor.get_f32(2).unwrap(), similarity);
    assert!(!cursor.next().unwrap());
}
