// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the RESULT frame.

use super::{
    read_bytes,
    read_int,
    read_short,
    read_short_bytes,
    read_string,
    read_string_list,
    FromPayload,
};
use crate::{
    session::{
        ColumnSpec,
        Page,
        PreparedInfo,
        QueryResult,
    },
    types::{
        CqlType,
        NativeType,
        UserDefinedType,
    },
};
use anyhow::{
    bail,
    ensure,
};

pub(crate) const VOID: i32 = 0x0001;
pub(crate) const ROWS: i32 = 0x0002;
pub(crate) const SET_KEYSPACE: i32 = 0x0003;
pub(crate) const PREPARED: i32 = 0x0004;
pub(crate) const SCHEMA_CHANGE: i32 = 0x0005;

#[derive(Copy, Clone, Debug)]
pub(crate) struct ResultFlags(i32);

impl ResultFlags {
    pub(crate) fn global_tables_spec(&self) -> bool {
        self.0 & 0x0001 != 0
    }

    pub(crate) fn has_more_pages(&self) -> bool {
        self.0 & 0x0002 != 0
    }

    pub(crate) fn no_metadata(&self) -> bool {
        self.0 & 0x0004 != 0
    }
}

/// The RESULT frame, decoded into the session boundary types.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ResultFrame {
    Void,
    Rows(Page),
    SetKeyspace(String),
    Prepared(PreparedInfo),
    SchemaChange(String),
}

impl ResultFrame {
    /// The outcome of a QUERY or EXECUTE. A PREPARED result is never one.
    pub(crate) fn into_query_result(self) -> anyhow::Result<QueryResult> {
        Ok(match self {
            Self::Void => QueryResult::Void,
            Self::Rows(page) => QueryResult::Rows(page),
            Self::SetKeyspace(keyspace) => QueryResult::SetKeyspace(keyspace),
            Self::SchemaChange(change) => QueryResult::SchemaChange(change),
            Self::Prepared(_) => bail!("Unexpected PREPARED result to a query"),
        })
    }
}

impl FromPayload for ResultFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(match read_int(start, payload)? {
            VOID => Self::Void,
            ROWS => Self::Rows(read_rows(start, payload)?),
            SET_KEYSPACE => Self::SetKeyspace(read_string(start, payload)?),
            PREPARED => Self::Prepared(read_prepared(start, payload)?),
            SCHEMA_CHANGE => Self::SchemaChange(read_schema_change(start, payload)?),
            kind => bail!("Unknown result kind: {:#x}", kind),
        })
    }
}

/// Rows metadata: `<flags><columns_count>[<paging_state>][<global_table_spec>?<col_spec_1>...<col_spec_n>]`.
struct RowsMetadata {
    flags: ResultFlags,
    columns_count: i32,
    paging_state: Option<Vec<u8>>,
    columns: Option<Vec<ColumnSpec>>,
}

fn read_rows_metadata(start: &mut usize, payload: &[u8]) -> anyhow::Result<RowsMetadata> {
    let flags = ResultFlags(read_int(start, payload)?);
    let columns_count = read_int(start, payload)?;
    ensure!(columns_count >= 0, "Negative column count {}", columns_count);
    let paging_state = if flags.has_more_pages() {
        read_bytes(start, payload)?.map(<[u8]>::to_vec)
    } else {
        None
    };
    let columns = if flags.no_metadata() {
        None
    } else {
        Some(read_column_specs(start, payload, flags, columns_count)?)
    };
    Ok(RowsMetadata {
        flags,
        columns_count,
        paging_state,
        columns,
    })
}

fn read_column_specs(
    start: &mut usize,
    payload: &[u8],
    flags: ResultFlags,
    columns_count: i32,
) -> anyhow::Result<Vec<ColumnSpec>> {
    let global = if flags.global_tables_spec() {
        Some((read_string(start, payload)?, read_string(start, payload)?))
    } else {
        None
    };
    // a column spec is at least a name and a type id
    let mut columns = Vec::with_capacity(capacity_for(columns_count, payload.len().saturating_sub(*start), 4));
    for _ in 0..columns_count {
        let (keyspace, table) = match &global {
            Some((keyspace, table)) => (keyspace.clone(), table.clone()),
            None => (read_string(start, payload)?, read_string(start, payload)?),
        };
        let name = read_string(start, payload)?;
        let ty = read_cql_type(start, payload)?;
        columns.push(ColumnSpec::new(keyspace, table, name, ty));
    }
    Ok(columns)
}

fn read_rows(start: &mut usize, payload: &[u8]) -> anyhow::Result<Page> {
    let metadata = read_rows_metadata(start, payload)?;
    let rows_count = read_int(start, payload)?;
    ensure!(rows_count >= 0, "Negative row count {}", rows_count);
    ensure!(
        rows_count == 0 || metadata.columns_count > 0,
        "{} rows without columns",
        rows_count
    );
    let row_len = 4 * metadata.columns_count as usize;
    let mut rows = Vec::with_capacity(capacity_for(rows_count, payload.len().saturating_sub(*start), row_len));
    for _ in 0..rows_count {
        let mut row = Vec::with_capacity(capacity_for(metadata.columns_count, payload.len().saturating_sub(*start), 4));
        for _ in 0..metadata.columns_count {
            row.push(read_bytes(start, payload)?.map(<[u8]>::to_vec));
        }
        rows.push(row);
    }
    log::trace!(
        "Decoded {} rows of {} columns (more pages: {})",
        rows_count,
        metadata.columns_count,
        metadata.flags.has_more_pages()
    );
    Ok(Page {
        columns: metadata.columns.unwrap_or_default(),
        rows,
        paging_state: metadata.paging_state,
    })
}

/// `<id><metadata><result_metadata>` where the bind marker metadata also lists
/// the partition key indexes.
fn read_prepared(start: &mut usize, payload: &[u8]) -> anyhow::Result<PreparedInfo> {
    let id = read_short_bytes(start, payload)?.to_vec();
    let flags = ResultFlags(read_int(start, payload)?);
    let columns_count = read_int(start, payload)?;
    ensure!(columns_count >= 0, "Negative bind marker count {}", columns_count);
    let pk_count = read_int(start, payload)?;
    ensure!(pk_count >= 0, "Negative partition key count {}", pk_count);
    let mut pk_indexes = Vec::with_capacity(capacity_for(pk_count, payload.len().saturating_sub(*start), 2));
    for _ in 0..pk_count {
        pk_indexes.push(read_short(start, payload)?);
    }
    let variables = read_column_specs(start, payload, flags, columns_count)?;
    let result = read_rows_metadata(start, payload)?;
    Ok(PreparedInfo {
        id,
        variables: Some(variables),
        pk_indexes,
        result_columns: result.columns,
    })
}

/// `<change_type><target><options>`, rendered as e.g. `CREATED TABLE ks.t`.
fn read_schema_change(start: &mut usize, payload: &[u8]) -> anyhow::Result<String> {
    let change_type = read_string(start, payload)?;
    let target = read_string(start, payload)?;
    let keyspace = read_string(start, payload)?;
    let subject = match target.as_str() {
        "KEYSPACE" => keyspace,
        "TABLE" | "TYPE" => format!("{}.{}", keyspace, read_string(start, payload)?),
        "FUNCTION" | "AGGREGATE" => {
            let name = read_string(start, payload)?;
            let arguments = read_string_list(start, payload)?;
            format!("{}.{}({})", keyspace, name, arguments.join(", "))
        }
        other => bail!("Unknown schema change target {}", other),
    };
    Ok(format!("{} {} {}", change_type, target, subject))
}

/// Capacity for `count` wire items of at least `min_len` bytes each, bounded by the bytes left.
fn capacity_for(count: i32, remaining: usize, min_len: usize) -> usize {
    (count.max(0) as usize).min(remaining / min_len.max(1))
}

/// Read a column type `[option]`.
pub(crate) fn read_cql_type(start: &mut usize, payload: &[u8]) -> anyhow::Result<CqlType> {
    let id = read_short(start, payload)?;
    Ok(match id {
        0x0000 => CqlType::from_custom_class(&read_string(start, payload)?),
        0x0001 => NativeType::Ascii.into(),
        0x0002 => NativeType::Bigint.into(),
        0x0003 => NativeType::Blob.into(),
        0x0004 => NativeType::Boolean.into(),
        0x0005 => NativeType::Counter.into(),
        0x0006 => NativeType::Decimal.into(),
        0x0007 => NativeType::Double.into(),
        0x0008 => NativeType::Float.into(),
        0x0009 => NativeType::Int.into(),
        0x000B => NativeType::Timestamp.into(),
        0x000C => NativeType::Uuid.into(),
        0x000D => NativeType::Text.into(),
        0x000E => NativeType::Varint.into(),
        0x000F => NativeType::Timeuuid.into(),
        0x0010 => NativeType::Inet.into(),
        0x0011 => NativeType::Date.into(),
        0x0012 => NativeType::Time.into(),
        0x0013 => NativeType::Smallint.into(),
        0x0014 => NativeType::Tinyint.into(),
        0x0015 => NativeType::Duration.into(),
        0x0020 => CqlType::List(Box::new(read_cql_type(start, payload)?)),
        0x0021 => {
            let key = read_cql_type(start, payload)?;
            CqlType::Map(Box::new(key), Box::new(read_cql_type(start, payload)?))
        }
        0x0022 => CqlType::Set(Box::new(read_cql_type(start, payload)?)),
        0x0030 => {
            let keyspace = read_string(start, payload)?;
            let name = read_string(start, payload)?;
            let n = read_short(start, payload)?;
            let mut fields = Vec::with_capacity(n as usize);
            for _ in 0..n {
                let field = read_string(start, payload)?;
                fields.push((field, read_cql_type(start, payload)?));
            }
            CqlType::UserDefined(UserDefinedType { keyspace, name, fields })
        }
        0x0031 => {
            let n = read_short(start, payload)?;
            let mut types = Vec::with_capacity(n as usize);
            for _ in 0..n {
                types.push(read_cql_type(start, payload)?);
            }
            CqlType::Tuple(types)
        }
        _ => bail!("Unknown CQL type id {:#06x}", id),
    })
}
