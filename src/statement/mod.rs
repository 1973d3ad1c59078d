// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Simple and prepared statements.
//!
//! A statement owns the cursor of its last execution: executing again, or
//! closing the statement, closes that cursor. Statements are not meant to be
//! shared between threads; overlapping calls fail with
//! [`Error::ConcurrentUse`] instead of blocking. Closing is the exception: it
//! may come from any thread and abandons an execution in flight.

mod parameter;

use self::parameter::Binding;
use crate::{
    codec::{
        self,
        CqlDuration,
        Decimal,
        Value,
    },
    connection::Shared,
    cql::Consistency,
    cursor::{
        exclusive,
        RowCursor,
    },
    metadata::{
        ParameterMetadata,
        ResultMetadata,
    },
    session::{
        Cancellation,
        Cell,
        Page,
        PreparedInfo,
        QueryResult,
        Request,
        Target,
    },
    types::RelationalType,
    Error,
    Result,
};
use anyhow::anyhow;
use arc_swap::ArcSwapOption;
use chrono::{
    DateTime,
    NaiveDate,
    NaiveTime,
    Utc,
};
use derive_more::From;
use std::{
    net::IpAddr,
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
        Mutex,
        MutexGuard,
    },
};
use uuid::Uuid;

/// The column lightweight transactions report their outcome in.
const APPLIED: &str = "[applied]";

/// What executing a statement produced.
#[derive(Debug, From)]
pub enum Execution {
    /// A result set.
    Rows(RowCursor),
    /// An update count. The store does not report affected rows, so this is 0
    /// except for conditional updates, which report 1 when applied.
    Update(u64),
}

impl Execution {
    pub fn into_cursor(self) -> Option<RowCursor> {
        match self {
            Execution::Rows(cursor) => Some(cursor),
            Execution::Update(_) => None,
        }
    }

    pub fn update_count(&self) -> Option<u64> {
        match self {
            Execution::Rows(_) => None,
            Execution::Update(count) => Some(*count),
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct Options {
    consistency: Consistency,
    serial_consistency: Option<Consistency>,
    fetch_size: i32,
    scrollable: bool,
}

impl Options {
    fn inherit(shared: &Shared) -> Self {
        Self {
            consistency: shared.consistency,
            serial_consistency: None,
            fetch_size: shared.fetch_size,
            scrollable: false,
        }
    }

    fn request(&self, target: Target, values: Vec<Cell>) -> Result<Request> {
        let mut builder = Request::builder(target)
            .values(values)
            .consistency(self.consistency);
        if self.fetch_size > 0 {
            builder = builder.page_size(self.fetch_size);
        }
        if let Some(serial) = self.serial_consistency {
            builder = builder.serial_consistency(serial);
        }
        builder.build().map_err(|e| Error::Protocol(anyhow!(e)))
    }
}

/// A started execution: the request, its first result and the cancellation
/// shared with the cursor built from it.
struct Started {
    request: Request,
    result: QueryResult,
    cancellation: Cancellation,
}

/// Whether a statement is closed, and the cancellation of its latest
/// execution. Kept outside the statement lock so closing never waits for an
/// execution in flight.
#[derive(Default)]
struct Lifecycle {
    closed: AtomicBool,
    current: ArcSwapOption<Cancellation>,
}

impl Lifecycle {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::StatementClosed)
        } else {
            Ok(())
        }
    }

    /// Execute `request`, closing the cursor of the previous execution first.
    fn start(&self, shared: &Shared, request: Request) -> Result<Started> {
        let cancellation = Cancellation::new();
        if let Some(previous) = self.current.swap(Some(Arc::new(cancellation.clone()))) {
            previous.cancel();
        }
        if self.closed.load(Ordering::SeqCst) {
            cancellation.cancel();
            return Err(Error::StatementClosed);
        }
        let result = shared.execute(&request, &cancellation).map_err(|e| {
            if cancellation.is_cancelled() {
                Error::StatementClosed
            } else {
                e
            }
        })?;
        Ok(Started {
            request,
            result,
            cancellation,
        })
    }

    /// Close, abandoning an execution in flight and the latest cursor.
    /// Returns whether this call closed it.
    fn close(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::SeqCst);
        if let Some(current) = self.current.swap(None) {
            current.cancel();
        }
        first
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// The outcome reported in the `[applied]` column of a conditional update.
fn applied(page: &Page) -> Option<Result<u64>> {
    let column = page.columns.first().filter(|c| c.name == APPLIED)?;
    let cell = page.rows.first().and_then(|row| row.first()).and_then(Option::as_deref);
    Some(match codec::decode(cell, &column.ty) {
        Ok(Value::Boolean(true)) => Ok(1),
        Ok(_) => Ok(0),
        Err(e) => Err(e),
    })
}

fn update_count(started: Started) -> Result<u64> {
    let Started { request, result, .. } = started;
    match result {
        QueryResult::Rows(page) => applied(&page).unwrap_or_else(|| {
            Err(Error::UnexpectedResult {
                query: request.query().to_owned(),
                expected: "an update count",
            })
        }),
        _ => Ok(0),
    }
}

fn execution(
    shared: &Shared,
    started: Started,
    metadata: Option<Arc<ResultMetadata>>,
    scrollable: bool,
) -> Result<(Execution, Option<Arc<ResultMetadata>>)> {
    match started.result {
        QueryResult::Rows(page) => {
            let metadata = match metadata {
                Some(metadata) => metadata,
                None => Arc::new(shared.describe(&page.columns)?),
            };
            let cursor = RowCursor::new(
                shared.session.clone(),
                started.request,
                page,
                metadata.clone(),
                scrollable,
                started.cancellation,
            );
            Ok((Execution::Rows(cursor), Some(metadata)))
        }
        _ => Ok((Execution::Update(0), None)),
    }
}

fn expect_rows(execution: Execution, query: &str) -> Result<RowCursor> {
    execution.into_cursor().ok_or_else(|| Error::UnexpectedResult {
        query: query.to_owned(),
        expected: "a result set",
    })
}

/// Executes query text directly, without preparing it.
pub struct Statement {
    shared: Arc<Shared>,
    lifecycle: Lifecycle,
    options: Mutex<Options>,
}

impl Statement {
    pub(crate) fn new(shared: Arc<Shared>) -> Result<Self> {
        shared.ensure_open()?;
        let options = Options::inherit(&shared);
        Ok(Self {
            shared,
            lifecycle: Lifecycle::default(),
            options: Mutex::new(options),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Options>> {
        self.lifecycle.ensure_open()?;
        exclusive(&self.options, "statement")
    }

    /// Execute `query`, which may or may not produce rows.
    pub fn execute(&self, query: &str) -> Result<Execution> {
        let options = self.lock()?;
        let request = options.request(Target::Simple(query.to_owned()), Vec::new())?;
        let started = self.lifecycle.start(&self.shared, request)?;
        execution(&self.shared, started, None, options.scrollable).map(|(execution, _)| execution)
    }

    /// Execute `query`, which must produce rows.
    pub fn execute_query(&self, query: &str) -> Result<RowCursor> {
        expect_rows(self.execute(query)?, query)
    }

    /// Execute `query`, which must not produce rows (conditional updates aside).
    pub fn execute_update(&self, query: &str) -> Result<u64> {
        let options = self.lock()?;
        let request = options.request(Target::Simple(query.to_owned()), Vec::new())?;
        update_count(self.lifecycle.start(&self.shared, request)?)
    }

    pub fn consistency(&self) -> Result<Consistency> {
        Ok(self.lock()?.consistency)
    }

    pub fn set_consistency(&self, consistency: Consistency) -> Result<()> {
        self.lock()?.consistency = consistency;
        Ok(())
    }

    /// The serial consistency of conditional updates, if set.
    pub fn serial_consistency(&self) -> Result<Option<Consistency>> {
        Ok(self.lock()?.serial_consistency)
    }

    pub fn set_serial_consistency(&self, consistency: Option<Consistency>) -> Result<()> {
        self.lock()?.serial_consistency = consistency;
        Ok(())
    }

    /// Rows fetched per page.
    pub fn fetch_size(&self) -> Result<i32> {
        Ok(self.lock()?.fetch_size)
    }

    pub fn set_fetch_size(&self, rows: i32) -> Result<()> {
        self.lock()?.fetch_size = rows;
        Ok(())
    }

    pub fn is_scrollable(&self) -> Result<bool> {
        Ok(self.lock()?.scrollable)
    }

    /// Whether cursors created from now on keep every row for scrolling back.
    pub fn set_scrollable(&self, scrollable: bool) -> Result<()> {
        self.lock()?.scrollable = scrollable;
        Ok(())
    }

    /// Close the statement and its cursor, abandoning an execution in
    /// flight. Idempotent.
    pub fn close(&self) -> Result<()> {
        if self.lifecycle.close() {
            log::debug!("Statement closed");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }
}

struct PreparedState {
    options: Options,
    bindings: Vec<Option<Binding>>,
    batch: Vec<Vec<Cell>>,
    result_metadata: Option<Arc<ResultMetadata>>,
}

/// A query prepared once and executed with bound parameters.
pub struct PreparedStatement {
    shared: Arc<Shared>,
    query: String,
    info: PreparedInfo,
    lifecycle: Lifecycle,
    state: Mutex<PreparedState>,
}

impl std::fmt::Debug for PreparedStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedStatement").field("query", &self.query).finish()
    }
}

impl PreparedStatement {
    pub(crate) fn new(shared: Arc<Shared>, query: &str) -> Result<Self> {
        shared.ensure_open()?;
        log::debug!("Preparing `{}`", query);
        let info = shared.session.prepare(query)?;
        let count = match &info.variables {
            Some(variables) => variables.len(),
            None => {
                log::warn!("The driver did not describe the bind markers of `{}`", query);
                bind_marker_count(query)
            }
        };
        let result_metadata = match &info.result_columns {
            Some(columns) => Some(Arc::new(shared.describe(columns)?)),
            None => None,
        };
        let options = Options::inherit(&shared);
        Ok(Self {
            shared,
            query: query.to_owned(),
            info,
            lifecycle: Lifecycle::default(),
            state: Mutex::new(PreparedState {
                options,
                bindings: vec![None; count],
                batch: Vec::new(),
                result_metadata,
            }),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, PreparedState>> {
        self.lifecycle.ensure_open()?;
        exclusive(&self.state, "prepared statement")
    }

    /// The query text.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// The number of bind markers.
    pub fn parameter_count(&self) -> usize {
        match &self.info.variables {
            Some(variables) => variables.len(),
            None => bind_marker_count(&self.query),
        }
    }

    fn target(&self) -> Target {
        Target::Prepared {
            id: self.info.id.clone(),
            query: self.query.clone(),
        }
    }

    /// Bind `value` at 1-based `position`. With an explicit relational type the
    /// value is converted to that type first; otherwise it binds as is, to the
    /// marker's declared type or to the type inferred from the value.
    ///
    /// A value the marker cannot hold fails with [`Error::TypeMismatch`] and
    /// leaves every bound parameter unchanged.
    pub fn set_object(&self, position: usize, value: impl Into<Value>, relational_type: Option<RelationalType>) -> Result<()> {
        let mut state = self.lock()?;
        let count = state.bindings.len();
        let index = position
            .checked_sub(1)
            .filter(|&i| i < count)
            .ok_or_else(|| Error::ParameterOutOfRange {
                position,
                count,
                query: self.query.clone(),
            })?;
        let declared = self.info.variables.as_ref().map(|variables| &variables[index].ty);
        let binding = Binding::new(value.into(), relational_type, declared)?;
        state.bindings[index] = Some(binding);
        Ok(())
    }

    /// Bind null. When the store did not declare the marker's type, the null is
    /// typed as `relational_type`'s store type, or as text without one.
    pub fn set_null(&self, position: usize, relational_type: Option<RelationalType>) -> Result<()> {
        self.set_object(position, Value::Null, relational_type)
    }

    pub fn set_bool(&self, position: usize, value: bool) -> Result<()> {
        self.set_object(position, value, None)
    }

    pub fn set_i8(&self, position: usize, value: i8) -> Result<()> {
        self.set_object(position, value, None)
    }

    pub fn set_i16(&self, position: usize, value: i16) -> Result<()> {
        self.set_object(position, value, None)
    }

    pub fn set_i32(&self, position: usize, value: i32) -> Result<()> {
        self.set_object(position, value, None)
    }

    pub fn set_i64(&self, position: usize, value: i64) -> Result<()> {
        self.set_object(position, value, None)
    }

    pub fn set_f32(&self, position: usize, value: f32) -> Result<()> {
        self.set_object(position, value, None)
    }

    pub fn set_f64(&self, position: usize, value: f64) -> Result<()> {
        self.set_object(position, value, None)
    }

    pub fn set_string(&self, position: usize, value: impl Into<String>) -> Result<()> {
        self.set_object(position, value.into(), None)
    }

    pub fn set_bytes(&self, position: usize, value: impl Into<Vec<u8>>) -> Result<()> {
        self.set_object(position, value.into(), None)
    }

    pub fn set_decimal(&self, position: usize, value: Decimal) -> Result<()> {
        self.set_object(position, value, None)
    }

    pub fn set_uuid(&self, position: usize, value: Uuid) -> Result<()> {
        self.set_object(position, value, None)
    }

    pub fn set_date(&self, position: usize, value: NaiveDate) -> Result<()> {
        self.set_object(position, value, None)
    }

    pub fn set_time(&self, position: usize, value: NaiveTime) -> Result<()> {
        self.set_object(position, value, None)
    }

    pub fn set_timestamp(&self, position: usize, value: DateTime<Utc>) -> Result<()> {
        self.set_object(position, value, None)
    }

    pub fn set_inet(&self, position: usize, value: IpAddr) -> Result<()> {
        self.set_object(position, value, None)
    }

    pub fn set_duration(&self, position: usize, value: CqlDuration) -> Result<()> {
        self.set_object(position, value, None)
    }

    /// Unbind every parameter.
    pub fn clear_parameters(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.bindings.iter_mut().for_each(|binding| *binding = None);
        Ok(())
    }

    /// Describe the bind markers. When the driver could not, the result is
    /// flagged [degraded](ParameterMetadata::is_degraded).
    pub fn parameter_metadata(&self) -> Result<ParameterMetadata> {
        let state = self.lock()?;
        match &self.info.variables {
            Some(variables) => {
                ParameterMetadata::from_prepared(&self.query, variables, &self.info.pk_indexes, self.shared.registry)
            }
            None => {
                let bound = state
                    .bindings
                    .iter()
                    .map(|binding| binding.as_ref().filter(|b| b.typed).map(|b| &b.ty))
                    .collect::<Vec<_>>();
                ParameterMetadata::fallback(&self.query, &bound, self.shared.registry)
            }
        }
    }

    /// Describe the result columns: from the prepare step when the driver
    /// reported them, otherwise from the first execution. `None` until known.
    pub fn metadata(&self) -> Result<Option<Arc<ResultMetadata>>> {
        Ok(self.lock()?.result_metadata.clone())
    }

    fn values(&self, state: &PreparedState) -> Result<Vec<Cell>> {
        state
            .bindings
            .iter()
            .enumerate()
            .map(|(i, binding)| {
                binding
                    .as_ref()
                    .map(|b| b.cell.clone())
                    .ok_or_else(|| Error::UnboundParameter {
                        position: i + 1,
                        query: self.query.clone(),
                    })
            })
            .collect()
    }

    /// Execute with the bound parameters.
    pub fn execute(&self) -> Result<Execution> {
        let mut state = self.lock()?;
        let request = state.options.request(self.target(), self.values(&state)?)?;
        let started = self.lifecycle.start(&self.shared, request)?;
        let scrollable = state.options.scrollable;
        let (execution, metadata) = execution(&self.shared, started, state.result_metadata.clone(), scrollable)?;
        if state.result_metadata.is_none() {
            state.result_metadata = metadata;
        }
        Ok(execution)
    }

    /// Execute with the bound parameters; the query must produce rows.
    pub fn execute_query(&self) -> Result<RowCursor> {
        expect_rows(self.execute()?, &self.query)
    }

    /// Execute with the bound parameters; the query must not produce rows.
    pub fn execute_update(&self) -> Result<u64> {
        let state = self.lock()?;
        let request = state.options.request(self.target(), self.values(&state)?)?;
        update_count(self.lifecycle.start(&self.shared, request)?)
    }

    /// Queue the bound parameters for [`execute_batch`](Self::execute_batch).
    pub fn add_batch(&self) -> Result<()> {
        let mut state = self.lock()?;
        let values = self.values(&state)?;
        state.batch.push(values);
        Ok(())
    }

    /// Execute every queued parameter set in order and return their update
    /// counts. The queue is emptied even when a set fails; the sets before
    /// the failing one stay applied.
    pub fn execute_batch(&self) -> Result<Vec<u64>> {
        let mut state = self.lock()?;
        let batch = std::mem::take(&mut state.batch);
        let options = state.options;
        log::debug!("Executing {} parameter sets of `{}`", batch.len(), self.query);
        batch
            .into_iter()
            .map(|values| update_count(self.lifecycle.start(&self.shared, options.request(self.target(), values)?)?))
            .collect()
    }

    pub fn consistency(&self) -> Result<Consistency> {
        Ok(self.lock()?.options.consistency)
    }

    pub fn set_consistency(&self, consistency: Consistency) -> Result<()> {
        self.lock()?.options.consistency = consistency;
        Ok(())
    }

    pub fn set_serial_consistency(&self, consistency: Option<Consistency>) -> Result<()> {
        self.lock()?.options.serial_consistency = consistency;
        Ok(())
    }

    pub fn fetch_size(&self) -> Result<i32> {
        Ok(self.lock()?.options.fetch_size)
    }

    pub fn set_fetch_size(&self, rows: i32) -> Result<()> {
        self.lock()?.options.fetch_size = rows;
        Ok(())
    }

    pub fn set_scrollable(&self, scrollable: bool) -> Result<()> {
        self.lock()?.options.scrollable = scrollable;
        Ok(())
    }

    /// Close the statement and its cursor, abandoning an execution in
    /// flight. Idempotent.
    pub fn close(&self) -> Result<()> {
        if self.lifecycle.close() {
            log::debug!("Prepared statement `{}` closed", self.query);
        }
        if let Ok(mut state) = self.state.try_lock() {
            state.batch.clear();
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }
}

/// Count the `?` markers of `query`, ignoring string literals, quoted
/// identifiers and comments. Used only when the driver does not describe the
/// markers.
fn bind_marker_count(query: &str) -> usize {
    let mut count = 0;
    let mut chars = query.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '?' => count += 1,
            '\'' | '"' => {
                // doubled quotes escape themselves and need no special case
                for d in chars.by_ref() {
                    if d == c {
                        break;
                    }
                }
            }
            '$' if chars.peek() == Some(&'$') => {
                chars.next();
                let mut previous = None;
                for d in chars.by_ref() {
                    if previous == Some('$') && d == '$' {
                        break;
                    }
                    previous = Some(d);
                }
            }
            '-' | '/' if chars.peek() == Some(&c) => {
                for d in chars.by_ref() {
                    if d == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut previous = None;
                for d in chars.by_ref() {
                    if previous == Some('*') && d == '/' {
                        break;
                    }
                    previous = Some(d);
                }
            }
            _ => (),
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_in_literals_and_comments_are_ignored() {
        assert_eq!(bind_marker_count("SELECT * FROM t WHERE a = ? AND b = ?"), 2);
        assert_eq!(bind_marker_count("INSERT INTO t (a, b) VALUES ('?', ?)"), 1);
        assert_eq!(bind_marker_count("SELECT \"what?\" FROM t WHERE a = ? -- why?\n AND b = ?"), 2);
        assert_eq!(bind_marker_count("SELECT * FROM t /* ? */ WHERE a = $$it's ?$$ AND b = ?"), 1);
        assert_eq!(bind_marker_count("SELECT 'it''s' FROM t WHERE a = ? // ?"), 1);
    }
}
