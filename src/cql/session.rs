// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use super::{
    connection::{
        Cql,
        Handshake,
    },
    frame::{
        ExecuteFrameBuilder,
        PasswordAuth,
        PrepareFrameBuilder,
        QueryFrameBuilder,
        QueryParameters,
        RequestBody,
        ResponseBody,
        ResultFrame,
    },
    Compression,
};
use crate::{
    connection::{
        use_statement,
        ConnectionConfig,
    },
    session::{
        Cancellation,
        PreparedInfo,
        QueryResult,
        Request,
        Session,
        Target,
    },
    Error,
    Result,
};
use anyhow::anyhow;
use arc_swap::ArcSwapOption;
use rand::seq::SliceRandom;
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
        Mutex,
    },
    time::Duration,
};
use tokio::runtime::Runtime;

/// A [`Session`] speaking the native protocol over a single connection.
///
/// The session owns a small tokio runtime and blocks the calling thread for
/// every request, so it must not be used from within an async context.
pub struct CqlSession {
    runtime: Runtime,
    connection: tokio::sync::Mutex<Option<Cql>>,
    contact_points: Vec<String>,
    handshake: Handshake,
    request_timeout: Duration,
    keyspace: ArcSwapOption<String>,
    prepared: Mutex<HashMap<[u8; 16], PreparedInfo>>,
    closed: AtomicBool,
}

enum Outcome<T> {
    Done(T),
    Cancelled,
}

impl CqlSession {
    /// Connect to the first reachable contact point of `config`.
    pub fn connect(config: &ConnectionConfig) -> Result<Self> {
        if let Some(bundle) = config.secure_connect_bundle() {
            return Err(Error::invalid_config(format!(
                "secure connect bundle {} requires cloud bootstrapping, which this session does not perform",
                bundle.display()
            )));
        }
        if config.contact_points().is_empty() {
            return Err(Error::invalid_config("no contact point"));
        }
        let credentials = match (config.user(), config.password()) {
            (Some(user), Some(password)) => Some(PasswordAuth::new(user, password)),
            (Some(user), None) => Some(PasswordAuth::new(user, "")),
            _ => None,
        };
        if let Some(dc) = config.local_datacenter() {
            log::debug!("Local datacenter hint {} noted for a single connection session", dc);
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("scylla-rdbc")
            .enable_all()
            .build()?;
        let session = Self {
            runtime,
            connection: tokio::sync::Mutex::new(None),
            contact_points: config.addresses(),
            handshake: Handshake {
                cql_version: config.version().to_owned(),
                compression: config.compression(),
                credentials,
            },
            request_timeout: config.request_timeout(),
            keyspace: ArcSwapOption::from(None),
            prepared: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        };
        session.runtime.block_on(async {
            let mut connection = session.connection.lock().await;
            session.reconnect(&mut connection).await
        })?;
        if let Some(keyspace) = config.keyspace() {
            let request = Request::builder(Target::Simple(use_statement(keyspace)))
                .consistency(config.consistency())
                .build()
                .map_err(|e| Error::Protocol(anyhow!(e)))?;
            session.execute(&request, None, &Cancellation::new())?;
        }
        Ok(session)
    }

    /// The compression negotiated with the connected node.
    pub fn compression(&self) -> Compression {
        self.runtime.block_on(async {
            self.connection
                .lock()
                .await
                .as_ref()
                .map(Cql::compression)
                .unwrap_or_default()
        })
    }

    /// The address of the connected node.
    pub fn node(&self) -> Option<SocketAddr> {
        self.runtime
            .block_on(async { self.connection.lock().await.as_ref().and_then(Cql::address) })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    /// Open a connection to a contact point, trying them in random order.
    async fn reconnect(&self, connection: &mut Option<Cql>) -> Result<()> {
        let mut contact_points = self.contact_points.clone();
        contact_points.shuffle(&mut rand::thread_rng());
        let mut failures = Vec::new();
        for contact_point in contact_points {
            match self.connect_to(&contact_point).await {
                Ok(mut cql) => {
                    if let Some(keyspace) = self.keyspace.load_full() {
                        use_keyspace(&mut cql, &keyspace).await?;
                    }
                    log::debug!("Connected to {}", contact_point);
                    connection.replace(cql);
                    return Ok(());
                }
                Err(e) => {
                    log::error!("Failed to connect to {}: {:#}", contact_point, e);
                    failures.push(format!("{}: {}", contact_point, e));
                }
            }
        }
        Err(Error::Protocol(anyhow!(
            "No contact point reachable ({})",
            failures.join("; ")
        )))
    }

    async fn connect_to(&self, contact_point: &str) -> anyhow::Result<Cql> {
        let mut last = None;
        for address in tokio::net::lookup_host(contact_point).await? {
            match Cql::connect(address, &self.handshake).await {
                Ok(cql) => return Ok(cql),
                Err(e) => last = Some(e),
            }
        }
        Err(last.unwrap_or_else(|| anyhow!("{} did not resolve", contact_point)))
    }

    /// Send one request and wait for the response. A timeout, a cancellation
    /// or a transport failure drops the connection; the next request reconnects.
    fn round_trip(&self, body: RequestBody, query: &str, cancellation: Option<&Cancellation>) -> Result<ResponseBody> {
        self.ensure_open()?;
        self.runtime.block_on(async {
            let mut connection = self.connection.lock().await;
            if connection.is_none() {
                self.reconnect(&mut connection).await?;
            }
            let outcome = match connection.as_mut() {
                Some(cql) => {
                    let request = tokio::time::timeout(self.request_timeout, cql.request(body));
                    match cancellation {
                        Some(cancellation) => tokio::select! {
                            _ = cancellation.cancelled() => Outcome::Cancelled,
                            response = request => Outcome::Done(response),
                        },
                        None => Outcome::Done(request.await),
                    }
                }
                None => return Err(Error::ConnectionClosed),
            };
            match outcome {
                Outcome::Done(Ok(Ok(response))) => Ok(response),
                Outcome::Done(Ok(Err(e))) => {
                    log::error!("Request failed, dropping the connection: {:#}", e);
                    connection.take();
                    Err(Error::Protocol(e))
                }
                Outcome::Done(Err(_)) => {
                    connection.take();
                    Err(Error::ExecutionTimeout { query: query.to_owned() })
                }
                Outcome::Cancelled => {
                    log::debug!("Request abandoned: {}", query);
                    connection.take();
                    Err(Error::CursorClosed)
                }
            }
        })
    }

    fn prepare_uncached(&self, query: &str) -> Result<PreparedInfo> {
        let frame = PrepareFrameBuilder::default().statement(query).build().map_err(|e| anyhow!(e))?;
        match self.round_trip(RequestBody::Prepare(frame), query, None)? {
            ResponseBody::Result(ResultFrame::Prepared(info)) => Ok(info),
            ResponseBody::Error(error) => Err(error.into_error(query)),
            other => Err(Error::Protocol(anyhow!("Expected PREPARED, got {:?}", other))),
        }
    }

    fn send(&self, request: &Request, id: Option<&[u8]>, paging_state: Option<&[u8]>, cancellation: &Cancellation) -> Result<ResponseBody> {
        let parameters = QueryParameters::from_request(request, paging_state);
        let body = match id {
            Some(id) => RequestBody::Execute(
                ExecuteFrameBuilder::default()
                    .id(id.to_vec())
                    .parameters(parameters)
                    .build()
                    .map_err(|e| anyhow!(e))?,
            ),
            None => RequestBody::Query(
                QueryFrameBuilder::default()
                    .statement(request.query().to_owned())
                    .parameters(parameters)
                    .build()
                    .map_err(|e| anyhow!(e))?,
            ),
        };
        self.round_trip(body, request.query(), Some(cancellation))
    }
}

async fn use_keyspace(cql: &mut Cql, keyspace: &str) -> Result<()> {
    let statement = use_statement(keyspace);
    let frame = QueryFrameBuilder::default()
        .statement(statement.clone())
        .build()
        .map_err(|e| anyhow!(e))?;
    match cql.request(RequestBody::Query(frame)).await? {
        ResponseBody::Result(ResultFrame::SetKeyspace(_)) => Ok(()),
        ResponseBody::Error(error) => Err(error.into_error(&statement)),
        other => Err(Error::Protocol(anyhow!("Expected SET_KEYSPACE, got {:?}", other))),
    }
}

fn cache_key(query: &str) -> [u8; 16] {
    md5::compute(query.as_bytes()).0
}

impl Session for CqlSession {
    fn prepare(&self, query: &str) -> Result<PreparedInfo> {
        self.ensure_open()?;
        let key = cache_key(query);
        if let Some(info) = self.prepared.lock().ok().and_then(|cache| cache.get(&key).cloned()) {
            return Ok(info);
        }
        log::debug!("Preparing {}", query);
        let info = self.prepare_uncached(query)?;
        if let Ok(mut cache) = self.prepared.lock() {
            cache.insert(key, info.clone());
        }
        Ok(info)
    }

    fn execute(&self, request: &Request, paging_state: Option<&[u8]>, cancellation: &Cancellation) -> Result<QueryResult> {
        if cancellation.is_cancelled() {
            return Err(Error::CursorClosed);
        }
        let id = match &request.target {
            Target::Simple(_) => None,
            Target::Prepared { id, .. } => Some(id.as_slice()),
        };
        log::debug!("Executing {} (paging state: {})", request.query(), paging_state.is_some());
        let response = match self.send(request, id, paging_state, cancellation)? {
            ResponseBody::Error(error) if error.is_unprepared() && id.is_some() => {
                log::debug!("Statement no longer prepared on the node, preparing again: {}", request.query());
                if let Ok(mut cache) = self.prepared.lock() {
                    cache.remove(&cache_key(request.query()));
                }
                let info = self.prepare(request.query())?;
                self.send(request, Some(&info.id), paging_state, cancellation)?
            }
            response => response,
        };
        match response {
            ResponseBody::Result(result) => {
                let result = result.into_query_result()?;
                if let QueryResult::SetKeyspace(keyspace) = &result {
                    self.keyspace.store(Some(Arc::new(keyspace.clone())));
                }
                Ok(result)
            }
            ResponseBody::Error(error) => Err(error.into_error(request.query())),
            other => Err(Error::Protocol(anyhow!("Expected RESULT, got {:?}", other))),
        }
    }

    fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.runtime.block_on(async {
                self.connection.lock().await.take();
            });
            log::debug!("Session closed");
        }
        Ok(())
    }
}
