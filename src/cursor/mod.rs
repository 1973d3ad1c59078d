// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Paged row cursors.
//!
//! A cursor starts before the first row and materializes pages lazily: the
//! next page is fetched, blocking the caller, when navigation moves past the
//! rows already held. Forward-only cursors keep only the current row and what
//! follows it; scrollable cursors keep every fetched row so they can move
//! back. Closing a cursor trips its [`Cancellation`], which makes an in-flight
//! page fetch on another thread return [`Error::CursorClosed`] promptly.

use crate::{
    codec::{
        self,
        CqlDuration,
        Decimal,
        FromValue,
        Value,
    },
    metadata::{
        ResultMetadata,
        TypedDescriptor,
    },
    session::{
        Cancellation,
        Page,
        QueryResult,
        RawRow,
        Request,
        Session,
    },
    Error,
    Result,
};
use chrono::{
    DateTime,
    NaiveDate,
    NaiveTime,
    Utc,
};
use std::{
    net::IpAddr,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        TryLockError,
    },
};
use uuid::Uuid;

/// Lock `mutex` for the calling thread, or fail if another thread holds it.
pub(crate) fn exclusive<'a, T>(mutex: &'a Mutex<T>, object: &'static str) -> Result<MutexGuard<'a, T>> {
    match mutex.try_lock() {
        Ok(guard) => Ok(guard),
        // a panicking caller leaves the state consistent between calls
        Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
        Err(TryLockError::WouldBlock) => Err(Error::ConcurrentUse { object }),
    }
}

/// A column reference: a 1-based index or a label.
pub trait ColumnIndex {
    /// The 1-based index of the column in `metadata`.
    fn resolve(&self, metadata: &ResultMetadata) -> Result<usize>;
}

impl ColumnIndex for usize {
    fn resolve(&self, metadata: &ResultMetadata) -> Result<usize> {
        metadata.column(*self).map(|_| *self)
    }
}

impl ColumnIndex for &str {
    fn resolve(&self, metadata: &ResultMetadata) -> Result<usize> {
        metadata.find_column(self)
    }
}

impl ColumnIndex for String {
    fn resolve(&self, metadata: &ResultMetadata) -> Result<usize> {
        metadata.find_column(self)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Position {
    BeforeFirst,
    /// On the row with this 0-based logical index.
    On(usize),
    AfterLast,
}

struct CursorState {
    request: Request,
    /// Materialized rows; `rows[0]` has logical index `offset`.
    rows: Vec<RawRow>,
    offset: usize,
    paging_state: Option<Vec<u8>>,
    position: Position,
    was_null: bool,
}

impl CursorState {
    fn available(&self) -> usize {
        self.offset + self.rows.len()
    }

    fn current_row(&self) -> Result<&RawRow> {
        match self.position {
            Position::On(i) if i >= self.offset => self.rows.get(i - self.offset).ok_or(Error::NoCurrentRow),
            _ => Err(Error::NoCurrentRow),
        }
    }
}

/// A cursor over the rows of a result.
pub struct RowCursor {
    session: Arc<dyn Session>,
    metadata: Arc<ResultMetadata>,
    cancellation: Cancellation,
    scrollable: bool,
    state: Mutex<CursorState>,
}

impl std::fmt::Debug for RowCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowCursor")
            .field("columns", &self.metadata.column_count())
            .field("scrollable", &self.scrollable)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl RowCursor {
    pub(crate) fn new(
        session: Arc<dyn Session>,
        request: Request,
        first: Page,
        metadata: Arc<ResultMetadata>,
        scrollable: bool,
        cancellation: Cancellation,
    ) -> Self {
        Self {
            session,
            metadata,
            cancellation,
            scrollable,
            state: Mutex::new(CursorState {
                request,
                rows: first.rows,
                offset: 0,
                paging_state: first.paging_state,
                position: Position::BeforeFirst,
                was_null: false,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, CursorState>> {
        if self.is_closed() {
            return Err(Error::CursorClosed);
        }
        exclusive(&self.state, "cursor")
    }

    fn require_scrollable(&self, operation: &'static str) -> Result<()> {
        if self.scrollable {
            Ok(())
        } else {
            Err(Error::ForwardOnly { operation })
        }
    }

    /// Fetch the next page into `state`. Returns false once the result is exhausted.
    fn fetch_next_page(&self, state: &mut CursorState) -> Result<bool> {
        let paging_state = match state.paging_state.take() {
            Some(paging_state) => paging_state,
            None => return Ok(false),
        };
        log::debug!(
            "Fetching the page after row {} of `{}`",
            state.available(),
            state.request.query()
        );
        let result = self
            .session
            .execute(&state.request, Some(&paging_state), &self.cancellation);
        let page = match result {
            Ok(QueryResult::Rows(page)) => page,
            Ok(_) => {
                state.paging_state = Some(paging_state);
                return Err(Error::UnexpectedResult {
                    query: state.request.query().to_owned(),
                    expected: "a page of rows",
                });
            }
            Err(_) if self.cancellation.is_cancelled() => return Err(Error::CursorClosed),
            Err(e) => {
                // keep the paging state so the caller may retry the move
                state.paging_state = Some(paging_state);
                return Err(e);
            }
        };
        if !self.scrollable {
            if let Position::On(current) = state.position {
                let passed = current.saturating_sub(state.offset).min(state.rows.len());
                state.rows.drain(..passed);
                state.offset += passed;
            }
        }
        state.rows.extend(page.rows);
        state.paging_state = page.paging_state;
        Ok(true)
    }

    /// Make the row with logical index `target` available. Returns false when
    /// the result has fewer rows.
    fn ensure_row(&self, state: &mut CursorState, target: usize) -> Result<bool> {
        while target >= state.available() {
            if !self.fetch_next_page(state)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn fetch_all(&self, state: &mut CursorState) -> Result<usize> {
        while self.fetch_next_page(state)? {}
        Ok(state.available())
    }

    fn move_to(&self, state: &mut CursorState, target: usize) -> Result<bool> {
        state.was_null = false;
        if self.ensure_row(state, target)? {
            state.position = Position::On(target);
            Ok(true)
        } else {
            state.position = Position::AfterLast;
            Ok(false)
        }
    }

    /// Move to the next row. Returns false once past the last row, and keeps
    /// returning false after that.
    pub fn next(&self) -> Result<bool> {
        let mut state = self.lock()?;
        let target = match state.position {
            Position::BeforeFirst => 0,
            Position::On(i) => i + 1,
            Position::AfterLast => return Ok(false),
        };
        self.move_to(&mut state, target)
    }

    /// Move to the previous row.
    pub fn previous(&self) -> Result<bool> {
        self.require_scrollable("previous")?;
        let mut state = self.lock()?;
        state.was_null = false;
        match state.position {
            Position::BeforeFirst => Ok(false),
            Position::On(0) => {
                state.position = Position::BeforeFirst;
                Ok(false)
            }
            Position::On(i) => {
                state.position = Position::On(i - 1);
                Ok(true)
            }
            Position::AfterLast => match self.fetch_all(&mut state)? {
                0 => {
                    state.position = Position::BeforeFirst;
                    Ok(false)
                }
                total => {
                    state.position = Position::On(total - 1);
                    Ok(true)
                }
            },
        }
    }

    /// Move to the first row.
    pub fn first(&self) -> Result<bool> {
        self.require_scrollable("first")?;
        let mut state = self.lock()?;
        self.move_to(&mut state, 0)
    }

    /// Move to the last row, fetching every remaining page.
    pub fn last(&self) -> Result<bool> {
        self.require_scrollable("last")?;
        let mut state = self.lock()?;
        state.was_null = false;
        match self.fetch_all(&mut state)? {
            0 => {
                state.position = Position::AfterLast;
                Ok(false)
            }
            total => {
                state.position = Position::On(total - 1);
                Ok(true)
            }
        }
    }

    pub fn before_first(&self) -> Result<()> {
        self.require_scrollable("before_first")?;
        let mut state = self.lock()?;
        state.was_null = false;
        state.position = Position::BeforeFirst;
        Ok(())
    }

    /// Move past the last row, fetching every remaining page.
    pub fn after_last(&self) -> Result<()> {
        self.require_scrollable("after_last")?;
        let mut state = self.lock()?;
        state.was_null = false;
        self.fetch_all(&mut state)?;
        state.position = Position::AfterLast;
        Ok(())
    }

    /// Move to the 1-based row `row`; negative rows count back from the end
    /// (`-1` is the last row) and 0 moves before the first row.
    pub fn absolute(&self, row: i64) -> Result<bool> {
        self.require_scrollable("absolute")?;
        let mut state = self.lock()?;
        if row > 0 {
            return self.move_to(&mut state, (row - 1) as usize);
        }
        state.was_null = false;
        let total = if row < 0 { self.fetch_all(&mut state)? as i64 } else { 0 };
        match total + row {
            index if row < 0 && index >= 0 => {
                state.position = Position::On(index as usize);
                Ok(true)
            }
            _ => {
                state.position = Position::BeforeFirst;
                Ok(false)
            }
        }
    }

    /// Move `rows` rows from the current one. Only scrollable cursors move back.
    pub fn relative(&self, rows: i64) -> Result<bool> {
        if rows < 0 {
            self.require_scrollable("relative")?;
        }
        let mut state = self.lock()?;
        let current = match state.position {
            Position::BeforeFirst => -1,
            Position::On(i) => i as i64,
            Position::AfterLast if rows >= 0 => return Ok(false),
            Position::AfterLast => self.fetch_all(&mut state)? as i64,
        };
        match current.checked_add(rows) {
            Some(target) if target >= 0 => self.move_to(&mut state, target as usize),
            // past any row the result can hold
            None if rows > 0 => self.move_to(&mut state, usize::MAX),
            _ => {
                state.was_null = false;
                state.position = Position::BeforeFirst;
                Ok(false)
            }
        }
    }

    /// Whether the cursor is before the first row of a non-empty result.
    pub fn is_before_first(&self) -> Result<bool> {
        let mut state = self.lock()?;
        Ok(state.position == Position::BeforeFirst && self.ensure_row(&mut state, 0)?)
    }

    /// Whether the cursor is past the last row of a non-empty result.
    pub fn is_after_last(&self) -> Result<bool> {
        let state = self.lock()?;
        Ok(state.position == Position::AfterLast && state.available() > 0)
    }

    pub fn is_first(&self) -> Result<bool> {
        Ok(self.lock()?.position == Position::On(0))
    }

    /// Whether the cursor is on the last row. May fetch the next page.
    pub fn is_last(&self) -> Result<bool> {
        let mut state = self.lock()?;
        match state.position {
            Position::On(i) => Ok(!self.ensure_row(&mut state, i + 1)?),
            _ => Ok(false),
        }
    }

    /// The 1-based number of the current row, 0 when not on a row.
    pub fn row_number(&self) -> Result<usize> {
        Ok(match self.lock()?.position {
            Position::On(i) => i + 1,
            _ => 0,
        })
    }

    /// Whether the last getter read a null column.
    pub fn was_null(&self) -> Result<bool> {
        Ok(self.lock()?.was_null)
    }

    /// The 1-based index of the column labelled `label`, ignoring case.
    pub fn find_column(&self, label: &str) -> Result<usize> {
        if self.is_closed() {
            return Err(Error::CursorClosed);
        }
        self.metadata.find_column(label)
    }

    pub fn metadata(&self) -> &ResultMetadata {
        &self.metadata
    }

    pub fn is_scrollable(&self) -> bool {
        self.scrollable
    }

    /// Rows requested per page.
    pub fn fetch_size(&self) -> Result<i32> {
        Ok(self.lock()?.request.page_size.unwrap_or(0))
    }

    /// Change the page size of the pages fetched from now on.
    pub fn set_fetch_size(&self, rows: i32) -> Result<()> {
        self.lock()?.request.page_size = if rows > 0 { Some(rows) } else { None };
        Ok(())
    }

    /// Close the cursor and abandon any page fetch in flight. Idempotent.
    pub fn close(&self) {
        if self.is_closed() {
            return;
        }
        self.cancellation.cancel();
        // a fetch in flight on another thread releases the buffer on drop
        if let Ok(mut state) = self.state.try_lock() {
            state.rows = Vec::new();
            state.paging_state = None;
        }
        log::debug!("Cursor closed");
    }

    pub fn is_closed(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Decode the value of `column` in the current row.
    pub fn get_object<C: ColumnIndex>(&self, column: C) -> Result<Value> {
        let mut state = self.lock()?;
        let index = column.resolve(&self.metadata)?;
        let descriptor = self.metadata.column(index)?;
        let cell = state
            .current_row()?
            .get(index - 1)
            .ok_or_else(|| Error::ColumnNotFound {
                column: index.to_string(),
                count: self.metadata.column_count(),
            })?;
        let value = codec::decode(cell.as_deref(), descriptor.native_type())?;
        state.was_null = value.is_null();
        Ok(value)
    }

    /// Decode every column of the current row.
    pub fn get_row(&self) -> Result<Vec<Value>> {
        (1..=self.metadata.column_count())
            .map(|index| self.get_object(index))
            .collect()
    }

    /// Read `column` as `T`; `None` when the column is null.
    pub fn get<T: FromValue, C: ColumnIndex>(&self, column: C) -> Result<Option<T>> {
        match self.get_object(column)? {
            Value::Null => Ok(None),
            value => T::from_value(value).map(Some),
        }
    }

    fn get_or_default<T: FromValue + Default, C: ColumnIndex>(&self, column: C) -> Result<T> {
        self.get(column).map(Option::unwrap_or_default)
    }

    fn get_matching<T, C: ColumnIndex>(
        &self,
        column: C,
        expected: &'static str,
        f: impl FnOnce(Value) -> std::result::Result<T, Value>,
    ) -> Result<Option<T>> {
        match self.get_object(column)? {
            Value::Null => Ok(None),
            value => f(value)
                .map(Some)
                .map_err(|value| Error::type_mismatch(expected, &value, format!("a {} value", value.kind()))),
        }
    }

    /// The column rendered as text, `None` when null.
    pub fn get_string<C: ColumnIndex>(&self, column: C) -> Result<Option<String>> {
        self.get(column)
    }

    /// The column as a boolean, false when null.
    pub fn get_bool<C: ColumnIndex>(&self, column: C) -> Result<bool> {
        self.get_or_default(column)
    }

    /// The column as an `i8`, 0 when null.
    pub fn get_i8<C: ColumnIndex>(&self, column: C) -> Result<i8> {
        self.get_or_default(column)
    }

    pub fn get_i16<C: ColumnIndex>(&self, column: C) -> Result<i16> {
        self.get_or_default(column)
    }

    pub fn get_i32<C: ColumnIndex>(&self, column: C) -> Result<i32> {
        self.get_or_default(column)
    }

    pub fn get_i64<C: ColumnIndex>(&self, column: C) -> Result<i64> {
        self.get_or_default(column)
    }

    pub fn get_f32<C: ColumnIndex>(&self, column: C) -> Result<f32> {
        self.get_or_default(column)
    }

    pub fn get_f64<C: ColumnIndex>(&self, column: C) -> Result<f64> {
        self.get_or_default(column)
    }

    pub fn get_decimal<C: ColumnIndex>(&self, column: C) -> Result<Option<Decimal>> {
        self.get(column)
    }

    pub fn get_bytes<C: ColumnIndex>(&self, column: C) -> Result<Option<Vec<u8>>> {
        self.get(column)
    }

    pub fn get_uuid<C: ColumnIndex>(&self, column: C) -> Result<Option<Uuid>> {
        self.get(column)
    }

    pub fn get_date<C: ColumnIndex>(&self, column: C) -> Result<Option<NaiveDate>> {
        self.get(column)
    }

    pub fn get_time<C: ColumnIndex>(&self, column: C) -> Result<Option<NaiveTime>> {
        self.get(column)
    }

    pub fn get_timestamp<C: ColumnIndex>(&self, column: C) -> Result<Option<DateTime<Utc>>> {
        self.get(column)
    }

    pub fn get_inet<C: ColumnIndex>(&self, column: C) -> Result<Option<IpAddr>> {
        self.get(column)
    }

    pub fn get_duration<C: ColumnIndex>(&self, column: C) -> Result<Option<CqlDuration>> {
        self.get(column)
    }

    /// The elements of a list column.
    pub fn get_list<C: ColumnIndex>(&self, column: C) -> Result<Option<Vec<Value>>> {
        self.get_matching(column, "list", |value| match value {
            Value::List(items) => Ok(items),
            other => Err(other),
        })
    }

    /// The elements of a set column, in decoded order.
    pub fn get_set<C: ColumnIndex>(&self, column: C) -> Result<Option<Vec<Value>>> {
        self.get_matching(column, "set", |value| match value {
            Value::Set(items) => Ok(items),
            other => Err(other),
        })
    }

    /// The entries of a map column, in decoded order.
    pub fn get_map<C: ColumnIndex>(&self, column: C) -> Result<Option<Vec<(Value, Value)>>> {
        self.get_matching(column, "map", |value| match value {
            Value::Map(entries) => Ok(entries),
            other => Err(other),
        })
    }

    /// The components of a tuple column; null components stay `Value::Null`.
    pub fn get_tuple<C: ColumnIndex>(&self, column: C) -> Result<Option<Vec<Value>>> {
        self.get_matching(column, "tuple", |value| match value {
            Value::Tuple(items) => Ok(items),
            other => Err(other),
        })
    }

    pub fn get_vector<C: ColumnIndex>(&self, column: C) -> Result<Option<Vec<f32>>> {
        self.get_matching(column, "vector", |value| match value {
            Value::Vector(items) => Ok(items),
            other => Err(other),
        })
    }
}
