// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Wire cell to host value decoding.

use super::{
    encoder::fixed_width,
    value::{
        CqlDuration,
        Decimal,
        Value,
    },
};
use crate::types::{
    CqlType,
    NativeType,
};
use anyhow::{
    anyhow,
    bail,
    ensure,
};
use chrono::{
    DateTime,
    NaiveDate,
    NaiveDateTime,
    NaiveTime,
    Utc,
};
use num_bigint::BigInt;
use std::{
    convert::{
        TryFrom,
        TryInto,
    },
    net::{
        IpAddr,
        Ipv4Addr,
        Ipv6Addr,
    },
};
use uuid::Uuid;

/// The column decoder trait for values with a fixed host type.
pub trait ColumnDecoder {
    /// Decode the column.
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self>
    where
        Self: Sized;
}

macro_rules! impl_simple_decoder {
    ($t:ty) => {
        impl ColumnDecoder for $t {
            fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
                Ok(<$t>::from_be_bytes(slice.try_into()?))
            }
        }
    };
}

impl_simple_decoder!(i64);
impl_simple_decoder!(i32);
impl_simple_decoder!(i16);
impl_simple_decoder!(i8);
impl_simple_decoder!(f64);
impl_simple_decoder!(f32);

impl ColumnDecoder for bool {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        ensure!(slice.len() == 1, "Invalid boolean length: {}", slice.len());
        Ok(slice[0] != 0)
    }
}

impl ColumnDecoder for String {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        Ok(String::from_utf8(slice.to_vec())?)
    }
}

impl ColumnDecoder for Vec<u8> {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        Ok(slice.to_vec())
    }
}

impl ColumnDecoder for IpAddr {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        Ok(match slice.len() {
            4 => IpAddr::V4(Ipv4Addr::from(<[u8; 4]>::try_from(slice)?)),
            16 => IpAddr::V6(Ipv6Addr::from(<[u8; 16]>::try_from(slice)?)),
            len => bail!("Invalid inet length: {}", len),
        })
    }
}

impl ColumnDecoder for NaiveDate {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        let num_days = u32::from_be_bytes(slice.try_into()?) as i64 - (1i64 << 31);
        NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(num_days)))
            .ok_or_else(|| anyhow!("Overflowed epoch + duration::days"))
    }
}

impl ColumnDecoder for NaiveTime {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        let nanos = i64::from_be_bytes(slice.try_into()?);
        ensure!((0..86_400_000_000_000).contains(&nanos), "Time out of range: {}", nanos);
        let (secs, nanos) = (nanos / 1_000_000_000, nanos % 1_000_000_000);
        NaiveTime::from_num_seconds_from_midnight_opt(secs as u32, nanos as u32)
            .ok_or_else(|| anyhow!("Invalid time of day"))
    }
}

impl ColumnDecoder for DateTime<Utc> {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        let millis = i64::from_be_bytes(slice.try_into()?);
        let (secs, nanos) = (millis.div_euclid(1_000), millis.rem_euclid(1_000) * 1_000_000);
        NaiveDateTime::from_timestamp_opt(secs, nanos as u32)
            .map(|naive| DateTime::from_utc(naive, Utc))
            .ok_or_else(|| anyhow!("Timestamp out of range: {}", millis))
    }
}

impl ColumnDecoder for Uuid {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        Ok(Uuid::from_slice(slice)?)
    }
}

impl ColumnDecoder for BigInt {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        ensure!(!slice.is_empty(), "Empty varint");
        Ok(BigInt::from_signed_bytes_be(slice))
    }
}

impl ColumnDecoder for Decimal {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        ensure!(slice.len() > 4, "Decimal too short: {} bytes", slice.len());
        let scale = i32::try_decode_column(&slice[..4])?;
        Ok(Decimal::new(BigInt::try_decode_column(&slice[4..])?, scale))
    }
}

impl ColumnDecoder for CqlDuration {
    fn try_decode_column(slice: &[u8]) -> anyhow::Result<Self> {
        let mut reader = CellReader::new(slice);
        let months = i32::try_from(reader.read_vint()?)?;
        let days = i32::try_from(reader.read_vint()?)?;
        let nanos = reader.read_vint()?;
        ensure!(reader.is_empty(), "Trailing bytes after duration");
        Ok(CqlDuration { months, days, nanos })
    }
}

/// Sequential reader over the body of a composite cell.
pub(crate) struct CellReader<'a> {
    slice: &'a [u8],
}

impl<'a> CellReader<'a> {
    pub(crate) fn new(slice: &'a [u8]) -> Self {
        Self { slice }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slice.is_empty()
    }

    /// Capacity for `count` items of at least `min_len` bytes each, bounded by what is left.
    pub(crate) fn capacity_for(&self, count: usize, min_len: usize) -> usize {
        count.min(self.slice.len() / min_len.max(1))
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> anyhow::Result<&'a [u8]> {
        ensure!(self.slice.len() >= len, "Expected {} bytes, {} left", len, self.slice.len());
        let (head, tail) = self.slice.split_at(len);
        self.slice = tail;
        Ok(head)
    }

    pub(crate) fn read_int(&mut self) -> anyhow::Result<i32> {
        i32::try_decode_column(self.read_bytes(4)?)
    }

    /// Read an `[bytes]` cell; negative lengths are null.
    pub(crate) fn read_cell(&mut self) -> anyhow::Result<Option<&'a [u8]>> {
        let len = self.read_int()?;
        if len < 0 {
            Ok(None)
        } else {
            self.read_bytes(len as usize).map(Some)
        }
    }

    pub(crate) fn read_unsigned_vint(&mut self) -> anyhow::Result<u64> {
        let first = self.read_bytes(1)?[0];
        let extra = first.leading_ones() as usize;
        let mut value = if extra >= 8 { 0 } else { (first & (0xff >> extra)) as u64 };
        for b in self.read_bytes(extra)? {
            value = (value << 8) | *b as u64;
        }
        Ok(value)
    }

    pub(crate) fn read_vint(&mut self) -> anyhow::Result<i64> {
        let zigzag = self.read_unsigned_vint()?;
        Ok((zigzag >> 1) as i64 ^ -((zigzag & 1) as i64))
    }
}

/// Decode the body of a non-null cell of type `ty`.
pub(crate) fn decode_body(slice: &[u8], ty: &CqlType) -> anyhow::Result<Value> {
    Ok(match ty {
        CqlType::Native(native) => return decode_native(slice, *native),
        CqlType::List(element) => Value::List(decode_collection(slice, element)?),
        CqlType::Set(element) => Value::Set(decode_collection(slice, element)?),
        CqlType::Map(key_type, value_type) => {
            let mut reader = CellReader::new(slice);
            let len = reader.read_int()?;
            ensure!(len >= 0, "Negative map length {}", len);
            // every entry carries two int length prefixes
            let mut entries = Vec::with_capacity(reader.capacity_for(len as usize, 8));
            for _ in 0..len {
                let k = decode_field(reader.read_cell()?, key_type)?;
                let v = decode_field(reader.read_cell()?, value_type)?;
                entries.push((k, v));
            }
            Value::Map(entries)
        }
        CqlType::Tuple(types) => {
            let mut reader = CellReader::new(slice);
            let mut items = Vec::with_capacity(types.len());
            for item_type in types {
                // missing trailing components read as null
                let cell = if reader.is_empty() { None } else { reader.read_cell()? };
                items.push(decode_field(cell, item_type)?);
            }
            Value::Tuple(items)
        }
        CqlType::UserDefined(udt) => {
            let mut reader = CellReader::new(slice);
            let mut fields = Vec::with_capacity(udt.fields.len());
            for (name, field_type) in udt.fields.iter() {
                let cell = if reader.is_empty() { None } else { reader.read_cell()? };
                fields.push((name.clone(), decode_field(cell, field_type)?));
            }
            Value::Udt(fields)
        }
        CqlType::Vector(element, dimension) => {
            let mut reader = CellReader::new(slice);
            let width = fixed_width(element);
            let mut items = Vec::with_capacity(reader.capacity_for(*dimension as usize, width.unwrap_or(1)));
            for _ in 0..*dimension {
                let len = match width {
                    Some(width) => width,
                    None => reader.read_unsigned_vint()? as usize,
                };
                items.push(decode_body(reader.read_bytes(len)?, element)?);
            }
            ensure!(reader.is_empty(), "Trailing bytes after {}", ty);
            if element.native() == Some(NativeType::Float) {
                Value::Vector(
                    items
                        .into_iter()
                        .map(|v| match v {
                            Value::Float(f) => f,
                            _ => f32::NAN,
                        })
                        .collect(),
                )
            } else {
                Value::List(items)
            }
        }
        CqlType::Custom(_) => Value::Bytes(slice.to_vec()),
    })
}

fn decode_collection(slice: &[u8], element: &CqlType) -> anyhow::Result<Vec<Value>> {
    let mut reader = CellReader::new(slice);
    let len = reader.read_int()?;
    ensure!(len >= 0, "Negative collection length {}", len);
    let mut items = Vec::with_capacity(reader.capacity_for(len as usize, 4));
    for _ in 0..len {
        items.push(decode_field(reader.read_cell()?, element)?);
    }
    Ok(items)
}

fn decode_field(cell: Option<&[u8]>, ty: &CqlType) -> anyhow::Result<Value> {
    match cell {
        Some(body) => decode_body(body, ty),
        None => Ok(Value::Null),
    }
}

fn decode_native(slice: &[u8], native: NativeType) -> anyhow::Result<Value> {
    // an empty body of a fixed width type is the store's "empty" value
    if slice.is_empty() && !matches!(native, NativeType::Text | NativeType::Ascii | NativeType::Blob) {
        return Ok(Value::Null);
    }
    Ok(match native {
        NativeType::Ascii | NativeType::Text => Value::Text(String::try_decode_column(slice)?),
        NativeType::Bigint | NativeType::Counter => Value::BigInt(i64::try_decode_column(slice)?),
        NativeType::Blob => Value::Bytes(Vec::<u8>::try_decode_column(slice)?),
        NativeType::Boolean => Value::Boolean(bool::try_decode_column(slice)?),
        NativeType::Date => Value::Date(NaiveDate::try_decode_column(slice)?),
        NativeType::Decimal => Value::Decimal(Decimal::try_decode_column(slice)?),
        NativeType::Double => Value::Double(f64::try_decode_column(slice)?),
        NativeType::Duration => Value::Duration(CqlDuration::try_decode_column(slice)?),
        NativeType::Float => Value::Float(f32::try_decode_column(slice)?),
        NativeType::Inet => Value::Inet(IpAddr::try_decode_column(slice)?),
        NativeType::Int => Value::Int(i32::try_decode_column(slice)?),
        NativeType::Smallint => Value::SmallInt(i16::try_decode_column(slice)?),
        NativeType::Time => Value::Time(NaiveTime::try_decode_column(slice)?),
        NativeType::Timestamp => Value::Timestamp(DateTime::<Utc>::try_decode_column(slice)?),
        NativeType::Timeuuid | NativeType::Uuid => Value::Uuid(Uuid::try_decode_column(slice)?),
        NativeType::Tinyint => Value::TinyInt(i8::try_decode_column(slice)?),
        NativeType::Varint => Value::Varint(BigInt::try_decode_column(slice)?),
    })
}
