// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Bound parameters and the coercions applied when a caller names a
//! relational type explicitly.

use crate::{
    codec::{
        self,
        CqlDuration,
        Decimal,
        Value,
    },
    session::Cell,
    types::{
        CqlType,
        NativeType,
        RelationalType,
    },
    Error,
    Result,
};
use chrono::{
    DateTime,
    NaiveDate,
    NaiveDateTime,
    NaiveTime,
    Utc,
};
use num_bigint::BigInt;
use num_traits::{
    ToPrimitive,
    Zero,
};
use std::net::IpAddr;
use uuid::Uuid;

/// A value bound to one marker, already encoded for the wire.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Binding {
    pub(crate) value: Value,
    pub(crate) ty: CqlType,
    pub(crate) cell: Cell,
    /// Whether `ty` says more than an untyped null would.
    pub(crate) typed: bool,
}

impl Binding {
    /// Bind `value` to a marker of type `declared`, or of the value's inferred
    /// type when the marker's type is unknown. An explicit relational type
    /// converts the value first, and types a null bound to an undeclared marker.
    pub(crate) fn new(value: Value, explicit: Option<RelationalType>, declared: Option<&CqlType>) -> Result<Self> {
        let null_type = explicit
            .filter(|_| value.is_null())
            .and_then(|code| code.native_type())
            .map(CqlType::from);
        let value = match explicit {
            Some(code) => {
                let value = coerce(value, code)?;
                match declared {
                    Some(ty) => adapt(value, ty)?,
                    None => value,
                }
            }
            None => value,
        };
        let typed = declared.is_some() || null_type.is_some() || !value.is_null();
        let ty = declared
            .cloned()
            .or(null_type)
            .unwrap_or_else(|| value.inferred_type());
        let cell = codec::encode(&value, &ty)?.into();
        Ok(Self { value, ty, cell, typed })
    }
}

fn mismatch(code: RelationalType, value: &Value, reason: &str) -> Error {
    Error::type_mismatch(code, value, reason)
}

fn parse<T: std::str::FromStr>(code: RelationalType, value: &Value, text: &str) -> Result<T> {
    text.trim()
        .parse()
        .map_err(|_| mismatch(code, value, "cannot be parsed"))
}

/// Largest power of ten an integral decimal may carry before conversion.
const MAX_DECIMAL_EXPONENT: u32 = 1_024;

fn integer(code: RelationalType, value: &Value) -> Result<BigInt> {
    match value {
        Value::Boolean(b) => Ok(BigInt::from(*b as u8)),
        Value::Text(s) => parse(code, value, s),
        Value::Float(_) | Value::Double(_) => match double(code, value)? {
            f if f.fract() == 0.0 && f.abs() < i128::MAX as f64 => Ok(BigInt::from(f as i128)),
            _ => Err(mismatch(code, value, "not an integral number")),
        },
        Value::Decimal(d) if d.scale() <= 0 => {
            if d.unscaled().is_zero() {
                return Ok(BigInt::zero());
            }
            match d.scale().unsigned_abs() {
                exponent if exponent <= MAX_DECIMAL_EXPONENT => Ok(d.unscaled() * BigInt::from(10).pow(exponent)),
                _ => Err(mismatch(code, value, "out of range")),
            }
        }
        other => other
            .as_integer()
            .ok_or_else(|| mismatch(code, value, "not an integral number")),
    }
}

fn double(code: RelationalType, value: &Value) -> Result<f64> {
    match value {
        Value::Float(f) => Ok(*f as f64),
        Value::Double(f) => Ok(*f),
        Value::Decimal(d) => match parse::<f64>(code, value, &d.to_string())? {
            f if f.is_finite() => Ok(f),
            _ => Err(mismatch(code, value, "out of range")),
        },
        Value::Text(s) => parse(code, value, s),
        other => other
            .as_integer()
            .and_then(|i| i.to_f64())
            .ok_or_else(|| mismatch(code, value, "not a number")),
    }
}

fn decimal(code: RelationalType, value: &Value) -> Result<Decimal> {
    match value {
        Value::Decimal(d) => Ok(d.clone()),
        Value::Float(f) => Decimal::from_f64(*f as f64).ok_or_else(|| mismatch(code, value, "not a finite number")),
        Value::Double(f) => Decimal::from_f64(*f).ok_or_else(|| mismatch(code, value, "not a finite number")),
        Value::Text(s) => parse(code, value, s),
        other => integer(code, other).map(Decimal::from),
    }
}

macro_rules! narrow {
    ($code:expr, $value:expr, $to:ident, $variant:ident) => {
        integer($code, &$value)?
            .$to()
            .map(Value::$variant)
            .ok_or_else(|| mismatch($code, &$value, "out of range"))
    };
}

/// Convert `value` to the host value the relational type `code` stands for.
pub(crate) fn coerce(value: Value, code: RelationalType) -> Result<Value> {
    use RelationalType as R;
    if value.is_null() {
        return Ok(Value::Null);
    }
    match code {
        R::Bit | R::Boolean => match &value {
            Value::Boolean(_) => Ok(value),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Boolean(true)),
                "false" | "0" => Ok(Value::Boolean(false)),
                _ => Err(mismatch(code, &value, "not a boolean")),
            },
            other => integer(code, other).map(|i| Value::Boolean(!i.is_zero())),
        },
        R::TinyInt => narrow!(code, value, to_i8, TinyInt),
        R::SmallInt => narrow!(code, value, to_i16, SmallInt),
        R::Integer => narrow!(code, value, to_i32, Int),
        R::BigInt => narrow!(code, value, to_i64, BigInt),
        R::Float | R::Real => {
            let f = double(code, &value)?;
            if f.is_finite() && f.abs() > f32::MAX as f64 {
                Err(mismatch(code, &value, "out of range"))
            } else {
                Ok(Value::Float(f as f32))
            }
        }
        R::Double => double(code, &value).map(Value::Double),
        R::Numeric => match &value {
            Value::Varint(_) | Value::Decimal(_) => Ok(value),
            Value::Float(_) | Value::Double(_) => decimal(code, &value).map(Value::Decimal),
            Value::Text(s) => match s.trim().parse::<BigInt>() {
                Ok(i) => Ok(Value::Varint(i)),
                Err(_) => decimal(code, &value).map(Value::Decimal),
            },
            other => integer(code, other).map(Value::Varint),
        },
        R::Decimal => decimal(code, &value).map(Value::Decimal),
        R::Char | R::Varchar | R::LongVarchar | R::Nvarchar => match value {
            Value::Text(_) => Ok(value),
            Value::List(_) | Value::Set(_) | Value::Map(_) | Value::Tuple(_) | Value::Udt(_) | Value::Vector(_) | Value::Bytes(_) => {
                Err(mismatch(code, &value, "only scalar values render as text"))
            }
            scalar => Ok(Value::Text(scalar.to_string())),
        },
        R::Date => match &value {
            Value::Date(_) => Ok(value),
            Value::Timestamp(t) => Ok(Value::Date(t.naive_utc().date())),
            Value::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| mismatch(code, &value, "not a yyyy-mm-dd date")),
            _ => Err(mismatch(code, &value, "not a date")),
        },
        R::Time => match &value {
            Value::Time(_) => Ok(value),
            Value::Timestamp(t) => Ok(Value::Time(t.naive_utc().time())),
            Value::Text(s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
                .map(Value::Time)
                .map_err(|_| mismatch(code, &value, "not a hh:mm:ss time")),
            _ => Err(mismatch(code, &value, "not a time")),
        },
        R::Timestamp => match &value {
            Value::Timestamp(_) => Ok(value),
            Value::Date(d) => Ok(Value::Timestamp(DateTime::<Utc>::from_utc(d.and_hms(0, 0, 0), Utc))),
            Value::BigInt(millis) => {
                NaiveDateTime::from_timestamp_opt(millis.div_euclid(1000), (millis.rem_euclid(1000) * 1_000_000) as u32)
                    .map(|naive| Value::Timestamp(DateTime::<Utc>::from_utc(naive, Utc)))
                    .ok_or_else(|| mismatch(code, &value, "out of range"))
            }
            Value::Text(s) => parse_timestamp(s)
                .map(Value::Timestamp)
                .ok_or_else(|| mismatch(code, &value, "not an RFC 3339 timestamp")),
            _ => Err(mismatch(code, &value, "not a timestamp")),
        },
        R::Binary | R::Varbinary | R::LongVarbinary | R::Blob => match value {
            Value::Bytes(_) => Ok(value),
            other => Err(mismatch(code, &other, "not a byte sequence")),
        },
        R::Array => match value {
            Value::List(_) | Value::Set(_) | Value::Vector(_) => Ok(value),
            other => Err(mismatch(code, &other, "not a list, set or vector")),
        },
        R::Struct => match value {
            Value::Tuple(_) | Value::Udt(_) => Ok(value),
            other => Err(mismatch(code, &other, "not a tuple or user-defined value")),
        },
        R::Other | R::JavaObject => Ok(value),
        R::Null => Ok(Value::Null),
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|t| DateTime::from_utc(t, Utc))
        })
}

/// Parse text for the opaque native types the relational codes cannot name.
fn adapt(value: Value, ty: &CqlType) -> Result<Value> {
    let text = match &value {
        Value::Text(s) => s.trim(),
        _ => return Ok(value),
    };
    let parsed = match ty.native() {
        Some(NativeType::Uuid) | Some(NativeType::Timeuuid) => text.parse::<Uuid>().map(Value::Uuid).ok(),
        Some(NativeType::Inet) => text.parse::<IpAddr>().map(Value::Inet).ok(),
        Some(NativeType::Duration) => text.parse::<CqlDuration>().map(Value::Duration).ok(),
        _ => return Ok(value),
    };
    parsed.ok_or_else(|| Error::type_mismatch(ty, &value, "cannot be parsed"))
}
