// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Host value to wire cell encoding.

use super::value::{
    CqlDuration,
    Decimal,
    Value,
};
use crate::{
    types::{
        CqlType,
        NativeType,
        UserDefinedType,
    },
    Error,
    Result,
};
use chrono::{
    DateTime,
    NaiveDate,
    NaiveTime,
    Timelike,
    Utc,
};
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use std::net::IpAddr;
use uuid::Uuid;

/// The NULL body length.
pub const BE_NULL_BYTES_LEN: [u8; 4] = [255, 255, 255, 255]; // -1 length
/// The UNSET body length.
pub const BE_UNSET_BYTES_LEN: [u8; 4] = [255, 255, 255, 254]; // -2 length

/// The column encoder for values with a fixed host type.
pub trait ColumnEncoder {
    /// Encode the column body into the buffer.
    fn encode(&self, buffer: &mut Vec<u8>);

    /// Encode this value to a new buffer
    fn encode_new(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

impl<E: ColumnEncoder + ?Sized> ColumnEncoder for &E {
    fn encode(&self, buffer: &mut Vec<u8>) {
        E::encode(*self, buffer)
    }
}

macro_rules! impl_simple_encoder {
    ($t:ty) => {
        impl ColumnEncoder for $t {
            fn encode(&self, buffer: &mut Vec<u8>) {
                buffer.extend(&<$t>::to_be_bytes(*self));
            }
        }
    };
}

impl_simple_encoder!(i64);
impl_simple_encoder!(i32);
impl_simple_encoder!(i16);
impl_simple_encoder!(i8);
impl_simple_encoder!(f64);
impl_simple_encoder!(f32);

impl ColumnEncoder for bool {
    fn encode(&self, buffer: &mut Vec<u8>) {
        buffer.push(*self as u8);
    }
}

impl ColumnEncoder for str {
    fn encode(&self, buffer: &mut Vec<u8>) {
        buffer.extend(self.bytes());
    }
}

impl ColumnEncoder for [u8] {
    fn encode(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(self);
    }
}

impl ColumnEncoder for IpAddr {
    fn encode(&self, buffer: &mut Vec<u8>) {
        match self {
            IpAddr::V4(addr) => buffer.extend(&addr.octets()),
            IpAddr::V6(addr) => buffer.extend(&addr.octets()),
        }
    }
}

impl ColumnEncoder for NaiveDate {
    fn encode(&self, buffer: &mut Vec<u8>) {
        let days = self.signed_duration_since(NaiveDate::from_ymd(1970, 1, 1)).num_days();
        buffer.extend(&u32::to_be_bytes((days + (1i64 << 31)) as u32));
    }
}

impl ColumnEncoder for NaiveTime {
    fn encode(&self, buffer: &mut Vec<u8>) {
        let nanos = self.num_seconds_from_midnight() as i64 * 1_000_000_000 + self.nanosecond() as i64;
        buffer.extend(&i64::to_be_bytes(nanos));
    }
}

impl ColumnEncoder for DateTime<Utc> {
    fn encode(&self, buffer: &mut Vec<u8>) {
        buffer.extend(&i64::to_be_bytes(self.timestamp_millis()));
    }
}

impl ColumnEncoder for Uuid {
    fn encode(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(self.as_bytes());
    }
}

impl ColumnEncoder for BigInt {
    fn encode(&self, buffer: &mut Vec<u8>) {
        buffer.extend(self.to_signed_bytes_be());
    }
}

impl ColumnEncoder for Decimal {
    fn encode(&self, buffer: &mut Vec<u8>) {
        self.scale().encode(buffer);
        self.unscaled().encode(buffer);
    }
}

impl ColumnEncoder for CqlDuration {
    fn encode(&self, buffer: &mut Vec<u8>) {
        write_vint(self.months as i64, buffer);
        write_vint(self.days as i64, buffer);
        write_vint(self.nanos, buffer);
    }
}

/// Write an unsigned variable length integer: the count of leading one bits
/// in the first byte is the number of bytes that follow.
pub(crate) fn write_unsigned_vint(value: u64, buffer: &mut Vec<u8>) {
    let size = ((639 - (value | 1).leading_zeros() * 9) >> 6) as usize;
    if size == 1 {
        buffer.push(value as u8);
        return;
    }
    let extra = size - 1;
    if extra == 8 {
        buffer.push(0xff);
        buffer.extend(&value.to_be_bytes());
        return;
    }
    let bytes = value.to_be_bytes();
    let mut encoded = bytes[8 - size..].to_vec();
    encoded[0] |= !(0xffu8 >> extra);
    buffer.extend(encoded);
}

/// Write a zigzag encoded signed variable length integer.
pub(crate) fn write_vint(value: i64, buffer: &mut Vec<u8>) {
    write_unsigned_vint(((value << 1) ^ (value >> 63)) as u64, buffer)
}

/// Write a `[bytes]` cell: an i32 length followed by the body, or -1 for null.
pub(crate) fn write_cell(cell: Option<&[u8]>, buffer: &mut Vec<u8>) {
    match cell {
        Some(body) => {
            buffer.extend(&(body.len() as i32).to_be_bytes());
            buffer.extend_from_slice(body);
        }
        None => buffer.extend(&BE_NULL_BYTES_LEN),
    }
}

/// Wire width of types encoded without a length prefix inside vectors.
pub(crate) fn fixed_width(ty: &CqlType) -> Option<usize> {
    Some(match ty.native()? {
        NativeType::Boolean | NativeType::Tinyint => 1,
        NativeType::Smallint => 2,
        NativeType::Int | NativeType::Float | NativeType::Date => 4,
        NativeType::Bigint | NativeType::Counter | NativeType::Double | NativeType::Time | NativeType::Timestamp => 8,
        NativeType::Uuid | NativeType::Timeuuid => 16,
        _ => return None,
    })
}

/// Encode a non-null value into the body of a cell of type `ty`.
pub(crate) fn encode_body(value: &Value, ty: &CqlType, buffer: &mut Vec<u8>) -> Result<()> {
    match ty {
        CqlType::Native(native) => encode_native(value, *native, buffer),
        CqlType::List(element) | CqlType::Set(element) => match value {
            Value::List(items) | Value::Set(items) => encode_collection(items.iter(), items.len(), element, ty, buffer),
            Value::Vector(items) => {
                let items = items.iter().map(|f| Value::Float(*f)).collect::<Vec<_>>();
                encode_collection(items.iter(), items.len(), element, ty, buffer)
            }
            other => Err(Error::type_mismatch(ty, other, "expected a list or set")),
        },
        CqlType::Map(key_type, value_type) => match value {
            Value::Map(entries) => {
                (entries.len() as i32).encode(buffer);
                for (k, v) in entries {
                    encode_element(k, key_type, ty, buffer)?;
                    encode_element(v, value_type, ty, buffer)?;
                }
                Ok(())
            }
            other => Err(Error::type_mismatch(ty, other, "expected a map")),
        },
        CqlType::Tuple(types) => match value {
            Value::Tuple(items) if items.len() == types.len() => {
                for (item, item_type) in items.iter().zip(types) {
                    encode_field(item, item_type, buffer)?;
                }
                Ok(())
            }
            Value::Tuple(items) => Err(Error::type_mismatch(
                ty,
                value,
                format!("expected {} components, got {}", types.len(), items.len()),
            )),
            other => Err(Error::type_mismatch(ty, other, "expected a tuple")),
        },
        CqlType::UserDefined(udt) => encode_udt(value, udt, ty, buffer),
        CqlType::Vector(element, dimension) => {
            let items = match value {
                Value::Vector(items) => items.iter().map(|f| Value::Float(*f)).collect::<Vec<_>>(),
                Value::List(items) => items.clone(),
                other => return Err(Error::type_mismatch(ty, other, "expected a vector")),
            };
            if items.len() != *dimension as usize {
                return Err(Error::type_mismatch(
                    ty,
                    value,
                    format!("expected dimension {}, got {}", dimension, items.len()),
                ));
            }
            let fixed = fixed_width(element).is_some();
            for item in items.iter() {
                if item.is_null() {
                    return Err(Error::type_mismatch(ty, value, "vectors cannot contain null"));
                }
                let mut body = Vec::new();
                encode_body(item, element, &mut body)?;
                if !fixed {
                    write_unsigned_vint(body.len() as u64, buffer);
                }
                buffer.extend(body);
            }
            Ok(())
        }
        CqlType::Custom(_) => match value {
            Value::Bytes(bytes) => {
                bytes.encode(buffer);
                Ok(())
            }
            other => Err(Error::type_mismatch(ty, other, "custom types accept raw bytes only")),
        },
    }
}

fn encode_collection<'a>(
    items: impl Iterator<Item = &'a Value>,
    len: usize,
    element: &CqlType,
    collection: &CqlType,
    buffer: &mut Vec<u8>,
) -> Result<()> {
    (len as i32).encode(buffer);
    for item in items {
        encode_element(item, element, collection, buffer)?;
    }
    Ok(())
}

fn encode_element(item: &Value, element: &CqlType, collection: &CqlType, buffer: &mut Vec<u8>) -> Result<()> {
    if item.is_null() {
        return Err(Error::type_mismatch(collection, item, "collections cannot contain null"));
    }
    encode_field(item, element, buffer)
}

fn encode_field(item: &Value, ty: &CqlType, buffer: &mut Vec<u8>) -> Result<()> {
    if item.is_null() {
        write_cell(None, buffer);
        return Ok(());
    }
    let mut body = Vec::new();
    encode_body(item, ty, &mut body)?;
    write_cell(Some(&body), buffer);
    Ok(())
}

fn encode_udt(value: &Value, udt: &UserDefinedType, ty: &CqlType, buffer: &mut Vec<u8>) -> Result<()> {
    if udt.fields.is_empty() {
        return Err(Error::type_mismatch(ty, value, "field definitions are unknown"));
    }
    match value {
        Value::Udt(given) => {
            let null = Value::Null;
            if let Some((unknown, _)) = given
                .iter()
                .find(|(name, _)| !udt.fields.iter().any(|(f, _)| f.eq_ignore_ascii_case(name)))
            {
                return Err(Error::type_mismatch(ty, value, format!("no field named `{}`", unknown)));
            }
            for (field, field_type) in udt.fields.iter() {
                let item = given
                    .iter()
                    .find(|(name, _)| name == field)
                    .or_else(|| given.iter().find(|(name, _)| name.eq_ignore_ascii_case(field)))
                    .map(|(_, v)| v)
                    .unwrap_or(&null);
                encode_field(item, field_type, buffer)?;
            }
            Ok(())
        }
        Value::Tuple(items) if items.len() <= udt.fields.len() => {
            for (item, (_, field_type)) in items.iter().zip(udt.fields.iter()) {
                encode_field(item, field_type, buffer)?;
            }
            Ok(())
        }
        other => Err(Error::type_mismatch(ty, other, "expected a user-defined type value")),
    }
}

fn encode_native(value: &Value, native: NativeType, buffer: &mut Vec<u8>) -> Result<()> {
    let mismatch = |reason: &str| Error::type_mismatch(native, value, reason);
    let integer = || value.as_integer().ok_or_else(|| mismatch("expected an integer"));
    let out_of_range = || mismatch("out of range");
    match (native, value) {
        (NativeType::Boolean, Value::Boolean(b)) => b.encode(buffer),
        (NativeType::Tinyint, _) => integer()?.to_i8().ok_or_else(out_of_range)?.encode(buffer),
        (NativeType::Smallint, _) => integer()?.to_i16().ok_or_else(out_of_range)?.encode(buffer),
        (NativeType::Int, _) => integer()?.to_i32().ok_or_else(out_of_range)?.encode(buffer),
        (NativeType::Bigint, _) | (NativeType::Counter, _) => {
            integer()?.to_i64().ok_or_else(out_of_range)?.encode(buffer)
        }
        (NativeType::Varint, _) => integer()?.encode(buffer),
        (NativeType::Decimal, Value::Decimal(d)) => d.encode(buffer),
        (NativeType::Decimal, Value::Float(f)) => Decimal::from_f64(*f as f64)
            .ok_or_else(|| mismatch("not a finite number"))?
            .encode(buffer),
        (NativeType::Decimal, Value::Double(f)) => Decimal::from_f64(*f)
            .ok_or_else(|| mismatch("not a finite number"))?
            .encode(buffer),
        (NativeType::Decimal, _) => Decimal::from(integer()?).encode(buffer),
        (NativeType::Float, Value::Float(f)) => f.encode(buffer),
        (NativeType::Float, Value::TinyInt(i)) => (*i as f32).encode(buffer),
        (NativeType::Float, Value::SmallInt(i)) => (*i as f32).encode(buffer),
        (NativeType::Double, Value::Double(f)) => f.encode(buffer),
        (NativeType::Double, Value::Float(f)) => (*f as f64).encode(buffer),
        (NativeType::Double, Value::TinyInt(i)) => (*i as f64).encode(buffer),
        (NativeType::Double, Value::SmallInt(i)) => (*i as f64).encode(buffer),
        (NativeType::Double, Value::Int(i)) => (*i as f64).encode(buffer),
        (NativeType::Text, Value::Text(s)) => s.encode(buffer),
        (NativeType::Ascii, Value::Text(s)) if s.is_ascii() => s.encode(buffer),
        (NativeType::Ascii, Value::Text(_)) => return Err(mismatch("contains non-ASCII characters")),
        (NativeType::Blob, Value::Bytes(b)) => b.encode(buffer),
        (NativeType::Date, Value::Date(d)) => d.encode(buffer),
        (NativeType::Time, Value::Time(t)) => t.encode(buffer),
        (NativeType::Timestamp, Value::Timestamp(t)) => t.encode(buffer),
        (NativeType::Timestamp, Value::Date(d)) => DateTime::<Utc>::from_utc(d.and_hms(0, 0, 0), Utc).encode(buffer),
        (NativeType::Uuid, Value::Uuid(u)) => u.encode(buffer),
        (NativeType::Timeuuid, Value::Uuid(u)) if u.get_version_num() == 1 => u.encode(buffer),
        (NativeType::Timeuuid, Value::Uuid(_)) => return Err(mismatch("not a time-based (version 1) uuid")),
        (NativeType::Inet, Value::Inet(addr)) => addr.encode(buffer),
        (NativeType::Duration, Value::Duration(d)) => d.encode(buffer),
        _ => return Err(mismatch("incompatible host type")),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vints_use_leading_ones_for_length() {
        let mut buf = Vec::new();
        write_unsigned_vint(0x7f, &mut buf);
        assert_eq!(buf, vec![0x7f]);

        let mut buf = Vec::new();
        write_unsigned_vint(0x80, &mut buf);
        assert_eq!(buf, vec![0x80, 0x80]);

        let mut buf = Vec::new();
        write_unsigned_vint(u64::MAX, &mut buf);
        assert_eq!(buf.len(), 9);
        assert_eq!(buf[0], 0xff);

        let mut buf = Vec::new();
        write_vint(-1, &mut buf);
        assert_eq!(buf, vec![0x01]);
    }

    #[test]
    fn dates_are_offset_from_the_epoch() {
        assert_eq!(NaiveDate::from_ymd(1970, 1, 1).encode_new(), vec![0x80, 0, 0, 0]);
        assert_eq!(NaiveDate::from_ymd(1969, 12, 31).encode_new(), vec![0x7f, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn integers_are_range_checked() {
        let mut buf = Vec::new();
        assert!(encode_native(&Value::BigInt(42), NativeType::Int, &mut buf).is_ok());
        assert_eq!(buf, vec![0, 0, 0, 42]);
        let err = encode_native(&Value::BigInt(3_000_000_000), NativeType::Int, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { ref native_type, .. } if native_type == "int"));
    }

    #[test]
    fn vectors_validate_dimension() {
        let ty = CqlType::vector(NativeType::Float, 3);
        let mut buf = Vec::new();
        encode_body(&Value::Vector(vec![1.0, 2.0, 3.0]), &ty, &mut buf).unwrap();
        assert_eq!(buf.len(), 12);
        assert!(encode_body(&Value::Vector(vec![1.0, 2.0]), &ty, &mut Vec::new()).is_err());
    }

    #[test]
    fn timeuuid_requires_version_one() {
        let err = encode_native(&Value::Uuid(Uuid::new_v4()), NativeType::Timeuuid, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }
}
