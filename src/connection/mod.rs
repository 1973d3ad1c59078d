// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The connection facade: one driver session, the keyspace and catalog
//! context, and the factory for statements.
//!
//! The store has no multi-statement transactions. Commit, rollback and
//! autocommit toggles are accepted and do nothing (each logs a warning);
//! asking for any isolation level other than [`IsolationLevel::None`] fails.

mod config;

pub use config::{
    ConnectionConfig,
    ConnectionConfigBuilder,
    ConnectionConfigBuilderError,
    DEFAULT_FETCH_SIZE,
    DEFAULT_PORT,
    DEFAULT_REQUEST_TIMEOUT_MS,
    DEFAULT_VERSION,
};

use crate::{
    codec::{
        self,
        Value,
    },
    cql::{
        Consistency,
        CqlSession,
    },
    metadata::ResultMetadata,
    session::{
        Cancellation,
        ColumnSpec,
        QueryResult,
        Request,
        Session,
        Target,
    },
    statement::{
        PreparedStatement,
        Statement,
    },
    types::TypeRegistry,
    Error,
    Result,
};
use anyhow::anyhow;
use arc_swap::ArcSwapOption;
use derive_more::Display;
use std::sync::{
    atomic::{
        AtomicBool,
        Ordering,
    },
    Arc,
};

/// Reads the cluster name and server version when a connection opens.
pub const CLUSTER_IDENTITY_QUERY: &str = "SELECT cluster_name, release_version FROM system.local";

/// Transaction isolation levels of the relational protocol.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum IsolationLevel {
    #[display(fmt = "NONE")]
    None,
    #[display(fmt = "READ_UNCOMMITTED")]
    ReadUncommitted,
    #[display(fmt = "READ_COMMITTED")]
    ReadCommitted,
    #[display(fmt = "REPEATABLE_READ")]
    RepeatableRead,
    #[display(fmt = "SERIALIZABLE")]
    Serializable,
}

/// What statements share with their connection.
pub(crate) struct Shared {
    pub(crate) session: Arc<dyn Session>,
    pub(crate) registry: &'static TypeRegistry,
    pub(crate) consistency: Consistency,
    pub(crate) fetch_size: i32,
    keyspace: ArcSwapOption<String>,
    catalog: String,
    server_version: String,
    closed: AtomicBool,
}

impl Shared {
    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    /// Execute the first page of `request`, tracking keyspace changes.
    pub(crate) fn execute(&self, request: &Request, cancellation: &Cancellation) -> Result<QueryResult> {
        self.ensure_open()?;
        log::debug!("Executing `{}`", request.query());
        let result = self.session.execute(request, None, cancellation)?;
        if let QueryResult::SetKeyspace(keyspace) = &result {
            self.keyspace.store(Some(Arc::new(keyspace.clone())));
        }
        Ok(result)
    }

    /// Describe result columns of this cluster.
    pub(crate) fn describe(&self, columns: &[ColumnSpec]) -> Result<ResultMetadata> {
        ResultMetadata::from_specs(columns, &self.catalog, self.registry)
    }
}

/// A connection to a cluster.
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Connect with the native protocol session.
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        let session = CqlSession::connect(config)?;
        Self::from_parts(
            Arc::new(session),
            config.keyspace(),
            config.consistency(),
            config.fetch_size(),
        )
    }

    /// Wrap an existing session. `keyspace` records the keyspace the session
    /// already uses; no `USE` is issued.
    pub fn with_session(session: Arc<dyn Session>, keyspace: Option<&str>, consistency: Consistency) -> Result<Self> {
        Self::from_parts(session, keyspace, consistency, DEFAULT_FETCH_SIZE)
    }

    fn from_parts(
        session: Arc<dyn Session>,
        keyspace: Option<&str>,
        consistency: Consistency,
        fetch_size: i32,
    ) -> Result<Self> {
        let (catalog, server_version) = identify(session.as_ref(), consistency)?;
        log::debug!("Connected to cluster `{}` running {}", catalog, server_version);
        Ok(Self {
            shared: Arc::new(Shared {
                session,
                registry: TypeRegistry::global(),
                consistency,
                fetch_size,
                keyspace: ArcSwapOption::from(keyspace.map(|k| Arc::new(k.to_owned()))),
                catalog,
                server_version,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// The keyspace unqualified table names resolve in.
    pub fn keyspace(&self) -> Option<String> {
        self.shared.keyspace.load_full().map(|k| k.as_ref().clone())
    }

    /// Switch keyspace with `USE`.
    pub fn set_keyspace(&self, keyspace: &str) -> Result<()> {
        let request = Request::builder(Target::Simple(use_statement(keyspace)))
            .consistency(self.shared.consistency)
            .build()
            .map_err(|e| Error::Protocol(anyhow!(e)))?;
        match self.shared.execute(&request, &Cancellation::new())? {
            QueryResult::SetKeyspace(_) => (),
            _ => self.shared.keyspace.store(Some(Arc::new(keyspace.to_owned()))),
        }
        Ok(())
    }

    /// The cluster name, reported as the catalog of every column.
    pub fn catalog(&self) -> &str {
        &self.shared.catalog
    }

    /// The release version of the connected node.
    pub fn server_version(&self) -> &str {
        &self.shared.server_version
    }

    /// The default consistency of new statements.
    pub fn consistency(&self) -> Consistency {
        self.shared.consistency
    }

    pub fn fetch_size(&self) -> i32 {
        self.shared.fetch_size
    }

    pub fn registry(&self) -> &'static TypeRegistry {
        self.shared.registry
    }

    pub fn create_statement(&self) -> Result<Statement> {
        Statement::new(self.shared.clone())
    }

    /// Prepare `query`. Parameter and result metadata are available from the
    /// returned statement before it is executed.
    pub fn prepare_statement(&self, query: &str) -> Result<PreparedStatement> {
        PreparedStatement::new(self.shared.clone(), query)
    }

    /// Always true: every statement commits on its own.
    pub fn auto_commit(&self) -> bool {
        true
    }

    /// Accepted and ignored.
    pub fn set_auto_commit(&self, auto_commit: bool) -> Result<()> {
        self.shared.ensure_open()?;
        if !auto_commit {
            log::warn!("Transactions are not supported, statements keep committing on their own");
        }
        Ok(())
    }

    /// Does nothing; every statement is already applied.
    pub fn commit(&self) -> Result<()> {
        self.shared.ensure_open()?;
        log::warn!("Commit ignored, transactions are not supported");
        Ok(())
    }

    /// Does nothing; applied statements cannot be undone.
    pub fn rollback(&self) -> Result<()> {
        self.shared.ensure_open()?;
        log::warn!("Rollback ignored, transactions are not supported: applied statements stay applied");
        Ok(())
    }

    pub fn transaction_isolation(&self) -> IsolationLevel {
        IsolationLevel::None
    }

    /// Only [`IsolationLevel::None`] is accepted.
    pub fn set_transaction_isolation(&self, level: IsolationLevel) -> Result<()> {
        self.shared.ensure_open()?;
        match level {
            IsolationLevel::None => Ok(()),
            requested => Err(Error::UnsupportedIsolation {
                requested: requested.to_string(),
            }),
        }
    }

    pub fn supports_transactions(&self) -> bool {
        false
    }

    /// Close the session. Statements created from this connection fail with
    /// [`Error::ConnectionClosed`] afterwards. Idempotent.
    pub fn close(&self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        log::debug!("Closing the connection to `{}`", self.shared.catalog);
        self.shared.session.close()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

/// Read the cluster name and release version. A node that cannot answer is
/// still usable, with an empty catalog.
fn identify(session: &dyn Session, consistency: Consistency) -> Result<(String, String)> {
    let request = Request::builder(Target::Simple(CLUSTER_IDENTITY_QUERY.to_owned()))
        .consistency(consistency)
        .build()
        .map_err(|e| Error::Protocol(anyhow!(e)))?;
    let page = match session.execute(&request, None, &Cancellation::new()) {
        Ok(QueryResult::Rows(page)) => page,
        Ok(other) => {
            log::warn!("Unexpected cluster identity result {:?}", other);
            return Ok(Default::default());
        }
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            log::warn!("Cannot read the cluster identity: {}", e);
            return Ok(Default::default());
        }
    };
    let text = |index: usize| -> Result<String> {
        let cell = page.rows.first().and_then(|row| row.get(index)).and_then(Option::as_deref);
        match (page.columns.get(index), cell) {
            (Some(column), Some(_)) => match codec::decode(cell, &column.ty)? {
                Value::Text(text) => Ok(text),
                _ => Ok(String::new()),
            },
            _ => Ok(String::new()),
        }
    };
    Ok((text(0)?, text(1)?))
}

/// Quote `name` unless it is a plain lowercase identifier.
/// The `USE` statement switching to `keyspace`.
pub(crate) fn use_statement(keyspace: &str) -> String {
    format!("USE {}", quote_identifier(keyspace))
}

fn quote_identifier(name: &str) -> String {
    let plain = name.chars().next().map(|c| c.is_ascii_lowercase() || c == '_').unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if plain {
        name.to_owned()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}
