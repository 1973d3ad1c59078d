// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The boundary to the underlying cluster driver.
//!
//! The relational layer only needs three things from a driver: prepare a
//! query, execute a request one page at a time, and close. Everything at this
//! boundary is synchronous; drivers that are asynchronous internally block
//! the calling thread until the page is available.

mod scripted;

pub use scripted::ScriptedSession;

use crate::{
    cql::Consistency,
    types::CqlType,
    Result,
};
use derive_builder::Builder;
use std::sync::{
    atomic::{
        AtomicBool,
        Ordering,
    },
    Arc,
};
use tokio::sync::Notify;

/// A column (or bind marker) as described by the store.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSpec {
    pub keyspace: String,
    pub table: String,
    pub name: String,
    pub ty: CqlType,
}

impl ColumnSpec {
    /// Describe a column of `keyspace.table`.
    pub fn new(keyspace: impl Into<String>, table: impl Into<String>, name: impl Into<String>, ty: CqlType) -> Self {
        Self {
            keyspace: keyspace.into(),
            table: table.into(),
            name: name.into(),
            ty,
        }
    }
}

/// What the driver learned when preparing a query.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedInfo {
    pub id: Vec<u8>,
    /// Bind markers, or `None` when the driver could not describe them.
    pub variables: Option<Vec<ColumnSpec>>,
    /// Positions (0-based) of bind markers that are partition key components.
    pub pk_indexes: Vec<u16>,
    /// Result columns, or `None` when they are only known after execution.
    pub result_columns: Option<Vec<ColumnSpec>>,
}

/// What to execute.
#[derive(Clone, Debug, PartialEq)]
pub enum Target {
    Simple(String),
    Prepared { id: Vec<u8>, query: String },
}

impl Target {
    /// The query text, for diagnostics.
    pub fn query(&self) -> &str {
        match self {
            Target::Simple(query) => query,
            Target::Prepared { query, .. } => query,
        }
    }
}

/// A bound value on the wire.
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Set(Vec<u8>),
    Null,
    Unset,
}

impl From<Option<Vec<u8>>> for Cell {
    fn from(body: Option<Vec<u8>>) -> Self {
        body.map(Cell::Set).unwrap_or(Cell::Null)
    }
}

/// A request for one page of results.
#[derive(Builder, Clone, Debug, PartialEq)]
#[builder(pattern = "owned", setter(strip_option))]
pub struct Request {
    pub target: Target,
    #[builder(default)]
    pub values: Vec<Cell>,
    #[builder(default = "Consistency::LocalOne")]
    pub consistency: Consistency,
    #[builder(default)]
    pub serial_consistency: Option<Consistency>,
    #[builder(default)]
    pub page_size: Option<i32>,
    #[builder(default)]
    pub timestamp: Option<i64>,
}

impl Request {
    /// Start building a request.
    pub fn builder(target: Target) -> RequestBuilder {
        RequestBuilder::default().target(target)
    }

    /// The query text, for diagnostics.
    pub fn query(&self) -> &str {
        self.target.query()
    }
}

/// One raw row: a cell per column, `None` for null.
pub type RawRow = Vec<Option<Vec<u8>>>;

/// One page of a rows result.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Page {
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<RawRow>,
    /// Where the next page starts, when there is one.
    pub paging_state: Option<Vec<u8>>,
}

impl Page {
    /// Whether the store announced more pages.
    pub fn has_more_pages(&self) -> bool {
        self.paging_state.is_some()
    }
}

/// The outcome of executing a request.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryResult {
    Void,
    Rows(Page),
    SetKeyspace(String),
    SchemaChange(String),
}

/// Shared cancellation signal for in-flight requests.
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Cancellation {
    /// Create an untripped cancellation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the cancellation. Idempotent.
    pub fn cancel(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            // a permit is stored when nothing waits yet
            self.notify.notify_one();
        }
    }

    /// Whether the cancellation has been tripped.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once the cancellation is tripped.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.notify.notified().await;
        }
    }
}

/// A driver session.
pub trait Session: Send + Sync {
    /// Prepare a query.
    fn prepare(&self, query: &str) -> Result<PreparedInfo>;

    /// Execute a request, starting at `paging_state` when given.
    ///
    /// Returns [`Error::CursorClosed`](crate::Error::CursorClosed) promptly
    /// once `cancellation` is tripped.
    fn execute(&self, request: &Request, paging_state: Option<&[u8]>, cancellation: &Cancellation)
        -> Result<QueryResult>;

    /// Close the session. Further calls fail with
    /// [`Error::ConnectionClosed`](crate::Error::ConnectionClosed).
    fn close(&self) -> Result<()>;
}
