// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Error types shared by every layer of the crate.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to callers of the relational layer.
#[derive(Error, Debug)]
pub enum Error {
    /// A native type has no registered mapping. Indicates that the store's
    /// schema uses a type this layer does not know; never retried.
    #[error("Unknown native type: {type_name}")]
    UnknownType { type_name: String },

    /// A host value cannot be encoded for the target native type.
    #[error("Cannot encode {value} as {native_type}: {reason}")]
    TypeMismatch {
        native_type: String,
        value: String,
        reason: String,
    },

    /// The underlying driver gave up waiting for the request.
    #[error("Execution timed out: {query}")]
    ExecutionTimeout { query: String },

    /// The cursor was closed before or during the call.
    #[error("Cursor is closed")]
    CursorClosed,

    /// The statement was closed before the call.
    #[error("Statement is closed")]
    StatementClosed,

    /// The connection was closed before the call.
    #[error("Connection is closed")]
    ConnectionClosed,

    /// Another thread is using the same statement or cursor.
    #[error("Concurrent use of {object} rejected")]
    ConcurrentUse { object: &'static str },

    /// A column index or label does not exist in the result.
    #[error("Column not found: {column} (columns: {count})")]
    ColumnNotFound { column: String, count: usize },

    /// A bind position is outside the declared parameter range.
    #[error("Parameter {position} out of range (parameters: {count}) in `{query}`")]
    ParameterOutOfRange {
        position: usize,
        count: usize,
        query: String,
    },

    /// A declared parameter was not bound before execution.
    #[error("Parameter {position} is not bound in `{query}`")]
    UnboundParameter { position: usize, query: String },

    /// A backwards or absolute move was requested on a forward-only cursor.
    #[error("Cursor is forward-only, `{operation}` requires a scrollable cursor")]
    ForwardOnly { operation: &'static str },

    /// A getter was called while the cursor is not positioned on a row.
    #[error("Cursor is not positioned on a row")]
    NoCurrentRow,

    /// The statement produced a different kind of result than the call expects.
    #[error("Expected {expected} from `{query}`")]
    UnexpectedResult { query: String, expected: &'static str },

    /// The store has no multi-statement transactions.
    #[error("Transaction isolation level {requested} is not supported")]
    UnsupportedIsolation { requested: String },

    /// Connection configuration could not be understood.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The store rejected the request.
    #[error("Server error {code:#06x}: {message} (query: `{query}`)")]
    Server { code: i32, message: String, query: String },

    /// Malformed frames or driver level failures.
    #[error("Protocol error: {0}")]
    Protocol(#[from] anyhow::Error),

    /// I/O error during network communication.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a type mismatch error for a value rendered with `Debug`.
    pub fn type_mismatch(native_type: impl ToString, value: impl std::fmt::Debug, reason: impl Into<String>) -> Self {
        Self::TypeMismatch {
            native_type: native_type.to_string(),
            value: format!("{:?}", value),
            reason: reason.into(),
        }
    }

    /// Create an unknown type error.
    pub fn unknown_type(type_name: impl Into<String>) -> Self {
        Self::UnknownType {
            type_name: type_name.into(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Whether the error is a contract violation that ends the call for good.
    /// Type mismatches and timeouts leave the statement usable for a retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnknownType { .. }
                | Self::CursorClosed
                | Self::StatementClosed
                | Self::ConnectionClosed
                | Self::ConcurrentUse { .. }
                | Self::ColumnNotFound { .. }
                | Self::ParameterOutOfRange { .. }
        )
    }
}
