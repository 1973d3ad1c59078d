// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! A deterministic in-process session.
//!
//! Answers are registered per query text. The session records every request
//! it serves, which makes it the harness for exercising statements and
//! cursors without a cluster.

use super::{
    Cancellation,
    ColumnSpec,
    Page,
    PreparedInfo,
    QueryResult,
    RawRow,
    Request,
    Session,
};
use crate::{
    Error,
    Result,
};
use anyhow::anyhow;
use std::{
    collections::HashMap,
    convert::TryInto,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
    time::{
        Duration,
        Instant,
    },
};

/// The code of the store's `Invalid` error.
const INVALID: i32 = 0x2200;

type Handler = Arc<dyn Fn(&Request) -> Result<QueryResult> + Send + Sync>;

#[derive(Clone)]
enum Answer {
    Fixed(QueryResult),
    Pages { columns: Vec<ColumnSpec>, pages: Vec<Vec<RawRow>> },
    Dynamic(Handler),
    Hang(Duration),
}

#[derive(Default)]
struct State {
    prepared: HashMap<String, PreparedInfo>,
    answers: HashMap<String, Answer>,
    requests: Vec<(Request, Option<Vec<u8>>)>,
    prepare_calls: Vec<String>,
    closed: bool,
}

/// A [`Session`] that answers from a script.
#[derive(Default)]
pub struct ScriptedSession {
    state: Mutex<State>,
}

impl ScriptedSession {
    /// Create an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a script that also answers the cluster identity query.
    pub fn with_cluster(cluster_name: &str, release_version: &str) -> Self {
        let session = Self::new();
        session.on_execute_pages(
            crate::connection::CLUSTER_IDENTITY_QUERY,
            vec![
                ColumnSpec::new("system", "local", "cluster_name", crate::types::NativeType::Text.into()),
                ColumnSpec::new("system", "local", "release_version", crate::types::NativeType::Text.into()),
            ],
            vec![vec![vec![
                Some(cluster_name.as_bytes().to_vec()),
                Some(release_version.as_bytes().to_vec()),
            ]]],
        );
        session
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Protocol(anyhow!("Scripted session state poisoned")))
    }

    fn update(&self, f: impl FnOnce(&mut State)) -> &Self {
        if let Ok(mut state) = self.state.lock() {
            f(&mut state);
        }
        self
    }

    /// Describe what preparing `query` returns. Unscripted queries prepare
    /// without any metadata.
    pub fn on_prepare(
        &self,
        query: &str,
        variables: Option<Vec<ColumnSpec>>,
        result_columns: Option<Vec<ColumnSpec>>,
    ) -> &Self {
        self.on_prepare_with_keys(query, variables, Vec::new(), result_columns)
    }

    /// Like [`on_prepare`](Self::on_prepare), also declaring partition key bind markers.
    pub fn on_prepare_with_keys(
        &self,
        query: &str,
        variables: Option<Vec<ColumnSpec>>,
        pk_indexes: Vec<u16>,
        result_columns: Option<Vec<ColumnSpec>>,
    ) -> &Self {
        let info = PreparedInfo {
            id: prepared_id(query),
            variables,
            pk_indexes,
            result_columns,
        };
        self.update(|state| {
            state.prepared.insert(query.to_owned(), info);
        })
    }

    /// Answer `query` with a fixed result.
    pub fn on_execute(&self, query: &str, result: QueryResult) -> &Self {
        self.update(|state| {
            state.answers.insert(query.to_owned(), Answer::Fixed(result));
        })
    }

    /// Answer `query` with rows split into the given pages.
    pub fn on_execute_pages(&self, query: &str, columns: Vec<ColumnSpec>, pages: Vec<Vec<RawRow>>) -> &Self {
        self.update(|state| {
            state.answers.insert(query.to_owned(), Answer::Pages { columns, pages });
        })
    }

    /// Answer `query` by calling `handler` with each request.
    pub fn on_execute_with<F>(&self, query: &str, handler: F) -> &Self
    where
        F: Fn(&Request) -> Result<QueryResult> + Send + Sync + 'static,
    {
        self.update(|state| {
            state.answers.insert(query.to_owned(), Answer::Dynamic(Arc::new(handler)));
        })
    }

    /// Never answer `query`: block until cancelled, or time out after `limit`.
    pub fn on_execute_hang(&self, query: &str, limit: Duration) -> &Self {
        self.update(|state| {
            state.answers.insert(query.to_owned(), Answer::Hang(limit));
        })
    }

    /// Every executed request with the paging state it started from, in order.
    pub fn requests(&self) -> Vec<(Request, Option<Vec<u8>>)> {
        self.state().map(|s| s.requests.clone()).unwrap_or_default()
    }

    /// Every prepared query text, in order.
    pub fn prepare_calls(&self) -> Vec<String> {
        self.state().map(|s| s.prepare_calls.clone()).unwrap_or_default()
    }

    /// Whether [`Session::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.state().map(|s| s.closed).unwrap_or(true)
    }
}

fn prepared_id(query: &str) -> Vec<u8> {
    md5::compute(query.as_bytes()).0.to_vec()
}

fn page_index(paging_state: Option<&[u8]>) -> Result<usize> {
    match paging_state {
        None => Ok(0),
        Some(bytes) => {
            let index: [u8; 4] = bytes
                .try_into()
                .map_err(|_| Error::Protocol(anyhow!("Invalid scripted paging state")))?;
            Ok(u32::from_be_bytes(index) as usize)
        }
    }
}

impl Session for ScriptedSession {
    fn prepare(&self, query: &str) -> Result<PreparedInfo> {
        let mut state = self.state()?;
        if state.closed {
            return Err(Error::ConnectionClosed);
        }
        state.prepare_calls.push(query.to_owned());
        Ok(state.prepared.get(query).cloned().unwrap_or_else(|| PreparedInfo {
            id: prepared_id(query),
            variables: None,
            pk_indexes: Vec::new(),
            result_columns: None,
        }))
    }

    fn execute(&self, request: &Request, paging_state: Option<&[u8]>, cancellation: &Cancellation) -> Result<QueryResult> {
        let answer = {
            let mut state = self.state()?;
            if state.closed {
                return Err(Error::ConnectionClosed);
            }
            state
                .requests
                .push((request.clone(), paging_state.map(<[u8]>::to_vec)));
            state.answers.get(request.query()).cloned()
        };
        if cancellation.is_cancelled() {
            return Err(Error::CursorClosed);
        }
        match answer {
            None => Err(Error::Server {
                code: INVALID,
                message: "unconfigured query".into(),
                query: request.query().to_owned(),
            }),
            Some(Answer::Fixed(result)) => Ok(result),
            Some(Answer::Dynamic(handler)) => handler(request),
            Some(Answer::Pages { columns, mut pages }) => {
                let index = page_index(paging_state)?;
                if index >= pages.len() {
                    return Ok(QueryResult::Rows(Page {
                        columns,
                        ..Default::default()
                    }));
                }
                let next = if index + 1 < pages.len() {
                    Some((index as u32 + 1).to_be_bytes().to_vec())
                } else {
                    None
                };
                Ok(QueryResult::Rows(Page {
                    columns,
                    rows: pages.swap_remove(index),
                    paging_state: next,
                }))
            }
            Some(Answer::Hang(limit)) => {
                let deadline = Instant::now() + limit;
                while Instant::now() < deadline {
                    if cancellation.is_cancelled() {
                        return Err(Error::CursorClosed);
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(Error::ExecutionTimeout {
                    query: request.query().to_owned(),
                })
            }
        }
    }

    fn close(&self) -> Result<()> {
        self.state()?.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        session::Target,
        types::NativeType,
    };

    fn request(query: &str) -> Request {
        Request::builder(Target::Simple(query.into())).build().unwrap()
    }

    fn int_row(i: i32) -> RawRow {
        vec![Some(i.to_be_bytes().to_vec())]
    }

    #[test]
    fn serves_pages_in_order() {
        let session = ScriptedSession::new();
        let columns = vec![ColumnSpec::new("ks", "t", "v", NativeType::Int.into())];
        session.on_execute_pages("SELECT v FROM t", columns, vec![vec![int_row(1)], vec![int_row(2)]]);

        let cancellation = Cancellation::new();
        let first = match session.execute(&request("SELECT v FROM t"), None, &cancellation).unwrap() {
            QueryResult::Rows(page) => page,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(first.rows, vec![int_row(1)]);
        let state = first.paging_state.unwrap();
        let second = match session
            .execute(&request("SELECT v FROM t"), Some(&state), &cancellation)
            .unwrap()
        {
            QueryResult::Rows(page) => page,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(second.rows, vec![int_row(2)]);
        assert!(!second.has_more_pages());
        assert_eq!(session.requests().len(), 2);
    }

    #[test]
    fn unscripted_queries_fail_like_the_store() {
        let session = ScriptedSession::new();
        let err = session
            .execute(&request("SELECT nope"), None, &Cancellation::new())
            .unwrap_err();
        assert!(matches!(err, Error::Server { code: INVALID, .. }));
        let info = session.prepare("SELECT nope").unwrap();
        assert_eq!(info.variables, None);
    }

    #[test]
    fn closed_sessions_refuse_work() {
        let session = ScriptedSession::new();
        session.close().unwrap();
        assert!(session.is_closed());
        assert!(matches!(session.prepare("SELECT 1"), Err(Error::ConnectionClosed)));
    }

    #[test]
    fn hanging_requests_observe_cancellation() {
        let session = Arc::new(ScriptedSession::new());
        session.on_execute_hang("SELECT slow", Duration::from_secs(5));
        let cancellation = Cancellation::new();
        let trip = cancellation.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            trip.cancel();
        });
        let started = Instant::now();
        let err = session
            .execute(&request("SELECT slow"), None, &cancellation)
            .unwrap_err();
        canceller.join().unwrap();
        assert!(matches!(err, Error::CursorClosed));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
