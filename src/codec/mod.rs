// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Conversion between host values and the store's wire representation.
//!
//! Encoding is always driven by a target [`CqlType`]. Host values that the type
//! can represent without loss are accepted (integers of any width within
//! range, `f32` into `double`, text into `ascii` when it is ASCII, version 1
//! uuids into `timeuuid`); anything else is a [`Error::TypeMismatch`].
//! Decoding is driven by the column's own type and never guesses.
//!
//! Documented precision loss: `timestamp` keeps milliseconds, so sub-millisecond
//! parts of a bound [`chrono::DateTime`] are truncated.

mod decoder;
mod encoder;
mod value;

pub use decoder::ColumnDecoder;
pub(crate) use decoder::CellReader;
pub use encoder::{
    ColumnEncoder,
    BE_NULL_BYTES_LEN,
    BE_UNSET_BYTES_LEN,
};
pub(crate) use encoder::write_cell;
pub use value::{
    CqlDuration,
    Decimal,
    FromValue,
    Value,
};

use crate::{
    types::CqlType,
    Error,
    Result,
};

/// Encode a host value for a cell of type `ty`. `Null` encodes to `None`.
pub fn encode(value: &Value, ty: &CqlType) -> Result<Option<Vec<u8>>> {
    if value.is_null() {
        return Ok(None);
    }
    let mut buffer = Vec::new();
    encoder::encode_body(value, ty, &mut buffer)?;
    Ok(Some(buffer))
}

/// Decode a cell of type `ty`. An absent cell decodes to `Null`.
pub fn decode(cell: Option<&[u8]>, ty: &CqlType) -> Result<Value> {
    match cell {
        Some(body) => decoder::decode_body(body, ty).map_err(|e| {
            Error::Protocol(e.context(format!("Failed to decode a {} cell", ty)))
        }),
        None => Ok(Value::Null),
    }
}
