// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Relational connectivity over ScyllaDB/Cassandra.
//!
//! A [`Connection`](connection::Connection) wraps a driver
//! [`Session`](session::Session) and hands out
//! [`Statement`](statement::Statement)s and
//! [`PreparedStatement`](statement::PreparedStatement)s. Queries produce
//! [`RowCursor`](cursor::RowCursor)s that page through results lazily and
//! read cells through typed getters. Column and parameter metadata come from
//! the [`TypeRegistry`](types::TypeRegistry), which maps every native type
//! onto a relational type code.
//!
//! ```no_run
//! use scylla_rdbc::prelude::*;
//!
//! # fn main() -> scylla_rdbc::Result<()> {
//! let config: ConnectionConfig = "jdbc:cassandra://127.0.0.1:9042/my_ks?localdatacenter=dc1".parse()?;
//! let connection = Connection::open(&config)?;
//! let statement = connection.prepare_statement("SELECT name FROM users WHERE id = ?")?;
//! statement.set_object(1, 42, None)?;
//! let cursor = statement.execute_query()?;
//! while cursor.next()? {
//!     println!("{:?}", cursor.get_string(1)?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod connection;
pub mod cql;
pub mod cursor;
pub mod error;
pub mod metadata;
pub mod session;
pub mod statement;
pub mod types;

pub use error::{
    Error,
    Result,
};

/// The types most callers need.
pub mod prelude {
    pub use crate::{
        codec::{
            CqlDuration,
            Decimal,
            FromValue,
            Value,
        },
        connection::{
            Connection,
            ConnectionConfig,
            ConnectionConfigBuilder,
            IsolationLevel,
        },
        cql::{
            Compression,
            Consistency,
        },
        cursor::{
            ColumnIndex,
            RowCursor,
        },
        metadata::{
            ColumnDescriptor,
            Nullability,
            ParameterDescriptor,
            ParameterMetadata,
            ResultMetadata,
            TypedDescriptor,
        },
        statement::{
            Execution,
            PreparedStatement,
            Statement,
        },
        types::{
            CqlType,
            NativeType,
            RelationalType,
            TypeRegistry,
        },
        Error,
        Result,
    };
}
