// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Host representation of store values.

use crate::{
    types::{
        CqlType,
        NativeType,
        UserDefinedType,
    },
    Error,
    Result,
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
use num_traits::{
    Signed,
    ToPrimitive,
    Zero,
};
use std::{
    collections::HashMap,
    convert::TryFrom,
    fmt::Display,
    hash::Hash,
    net::{
        IpAddr,
        Ipv4Addr,
        Ipv6Addr,
    },
    str::FromStr,
};
use uuid::Uuid;

/// An arbitrary precision decimal: `unscaled * 10^-scale`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Decimal {
    unscaled: BigInt,
    scale: i32,
}

impl Decimal {
    /// Create a decimal from its unscaled value and scale.
    pub fn new(unscaled: impl Into<BigInt>, scale: i32) -> Self {
        Self {
            unscaled: unscaled.into(),
            scale,
        }
    }

    /// The unscaled integer value.
    pub fn unscaled(&self) -> &BigInt {
        &self.unscaled
    }

    /// Number of digits right of the decimal point.
    pub fn scale(&self) -> i32 {
        self.scale
    }

    /// Number of significant digits of the unscaled value.
    pub fn precision(&self) -> i32 {
        self.unscaled.magnitude().to_str_radix(10).len() as i32
    }

    pub(crate) fn from_f64(value: f64) -> Option<Self> {
        if value.is_finite() {
            value.to_string().parse().ok()
        } else {
            None
        }
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Decimal::new(value, 0)
    }
}

impl From<BigInt> for Decimal {
    fn from(value: BigInt) -> Self {
        Decimal::new(value, 0)
    }
}

impl FromStr for Decimal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let s = s.trim();
        let (mantissa, exponent) = match s.find(|c: char| c == 'e' || c == 'E') {
            Some(i) => (&s[..i], s[i + 1..].parse::<i64>()?),
            None => (s, 0),
        };
        let (int_part, frac_part) = match mantissa.split_once('.') {
            Some((i, f)) => (i, f),
            None => (mantissa, ""),
        };
        let digits = format!("{}{}", int_part, frac_part);
        ensure!(
            digits.trim_start_matches(|c: char| c == '-' || c == '+').chars().all(|c| c.is_ascii_digit())
                && digits.chars().any(|c| c.is_ascii_digit()),
            "Invalid decimal: {}",
            s
        );
        let unscaled = digits.parse::<BigInt>()?;
        let scale = i64::try_from(frac_part.len())?
            .checked_sub(exponent)
            .and_then(|scale| i32::try_from(scale).ok())
            .ok_or_else(|| anyhow!("Decimal scale overflow: {}", s))?;
        Ok(Decimal { unscaled, scale })
    }
}

/// Most zeros written out before a decimal switches to exponent notation.
const PLAIN_ZEROS: usize = 64;

impl Display for Decimal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.unscaled.is_negative() { "-" } else { "" };
        let digits = self.unscaled.magnitude().to_str_radix(10);
        let zeros = self.scale.unsigned_abs() as usize;
        let plain = if self.scale <= 0 {
            zeros <= PLAIN_ZEROS
        } else {
            zeros <= digits.len() + PLAIN_ZEROS
        };
        if !plain {
            write!(f, "{}{}E{:+}", sign, digits, -(self.scale as i64))
        } else if self.scale <= 0 {
            let zeros = if self.unscaled.is_zero() { 0 } else { zeros };
            write!(f, "{}{}{}", sign, digits, "0".repeat(zeros))
        } else {
            let scale = self.scale as usize;
            let padded = if digits.len() <= scale {
                format!("{}{}", "0".repeat(scale + 1 - digits.len()), digits)
            } else {
                digits
            };
            let (int_part, frac_part) = padded.split_at(padded.len() - scale);
            write!(f, "{}{}.{}", sign, int_part, frac_part)
        }
    }
}

/// A store duration: months, days and nanoseconds, each signed and kept apart
/// because their lengths vary.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct CqlDuration {
    pub months: i32,
    pub days: i32,
    pub nanos: i64,
}

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_MINUTE: i64 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MINUTE;

impl CqlDuration {
    /// Create a duration from its components.
    pub fn new(months: i32, days: i32, nanos: i64) -> Self {
        Self { months, days, nanos }
    }
}

impl FromStr for CqlDuration {
    type Err = anyhow::Error;

    /// Parse the unit format accepted by the store, e.g. `15s`, `1h30m` or `-2mo3d`.
    fn from_str(s: &str) -> anyhow::Result<Self> {
        let s = s.trim();
        let (negative, mut rest) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        ensure!(!rest.is_empty(), "Empty duration: {}", s);
        let (mut months, mut days, mut nanos) = (0i64, 0i64, 0i64);
        while !rest.is_empty() {
            let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            ensure!(digits > 0, "Expected a number in duration: {}", s);
            let amount = rest[..digits].parse::<i64>()?;
            rest = &rest[digits..];
            let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
            let unit = rest[..unit_len].to_ascii_lowercase();
            rest = &rest[unit_len..];
            let overflow = || anyhow!("Duration overflow: {}", s);
            match unit.as_str() {
                "y" => months = amount.checked_mul(12).and_then(|m| months.checked_add(m)).ok_or_else(overflow)?,
                "mo" => months = months.checked_add(amount).ok_or_else(overflow)?,
                "w" => days = amount.checked_mul(7).and_then(|d| days.checked_add(d)).ok_or_else(overflow)?,
                "d" => days = days.checked_add(amount).ok_or_else(overflow)?,
                unit => {
                    let factor = match unit {
                        "h" => NANOS_PER_HOUR,
                        "m" => NANOS_PER_MINUTE,
                        "s" => NANOS_PER_SECOND,
                        "ms" => NANOS_PER_MILLI,
                        "us" | "µs" => NANOS_PER_MICRO,
                        "ns" => 1,
                        _ => bail!("Unknown duration unit `{}` in {}", unit, s),
                    };
                    nanos = amount
                        .checked_mul(factor)
                        .and_then(|n| nanos.checked_add(n))
                        .ok_or_else(overflow)?;
                }
            }
        }
        let sign = if negative { -1 } else { 1 };
        Ok(CqlDuration {
            months: i32::try_from(months * sign)?,
            days: i32::try_from(days * sign)?,
            nanos: nanos * sign,
        })
    }
}

impl Display for CqlDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.months == 0 && self.days == 0 && self.nanos == 0 {
            return f.write_str("0s");
        }
        if self.months < 0 || self.days < 0 || self.nanos < 0 {
            f.write_str("-")?;
        }
        let months = self.months.unsigned_abs();
        let mut nanos = self.nanos.unsigned_abs();
        let parts = [
            (months / 12, "y"),
            (months % 12, "mo"),
            (self.days.unsigned_abs(), "d"),
        ];
        for (amount, unit) in parts.iter() {
            if *amount != 0 {
                write!(f, "{}{}", amount, unit)?;
            }
        }
        for (factor, unit) in [
            (NANOS_PER_HOUR, "h"),
            (NANOS_PER_MINUTE, "m"),
            (NANOS_PER_SECOND, "s"),
            (NANOS_PER_MILLI, "ms"),
            (NANOS_PER_MICRO, "us"),
            (1, "ns"),
        ]
        .iter()
        {
            let factor = *factor as u64;
            if nanos >= factor {
                write!(f, "{}{}", nanos / factor, unit)?;
                nanos %= factor;
            }
        }
        Ok(())
    }
}

/// A host value, tagged by its host type.
///
/// `Set` and `Map` keep their entries in the order they were built or decoded;
/// equality compares in that order.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    Varint(BigInt),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
    Inet(IpAddr),
    Duration(CqlDuration),
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Tuple(Vec<Value>),
    Udt(Vec<(String, Value)>),
    Vector(Vec<f32>),
}

impl Value {
    /// Whether this is the null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the host type, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "bool",
            Value::TinyInt(_) => "i8",
            Value::SmallInt(_) => "i16",
            Value::Int(_) => "i32",
            Value::BigInt(_) => "i64",
            Value::Float(_) => "f32",
            Value::Double(_) => "f64",
            Value::Decimal(_) => "Decimal",
            Value::Varint(_) => "BigInt",
            Value::Text(_) => "String",
            Value::Bytes(_) => "bytes",
            Value::Date(_) => "NaiveDate",
            Value::Time(_) => "NaiveTime",
            Value::Timestamp(_) => "DateTime<Utc>",
            Value::Uuid(_) => "Uuid",
            Value::Inet(_) => "IpAddr",
            Value::Duration(_) => "CqlDuration",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Tuple(_) => "tuple",
            Value::Udt(_) => "udt",
            Value::Vector(_) => "vector",
        }
    }

    /// The value as an integer, if it is one.
    pub(crate) fn as_integer(&self) -> Option<BigInt> {
        Some(match self {
            Value::TinyInt(v) => (*v).into(),
            Value::SmallInt(v) => (*v).into(),
            Value::Int(v) => (*v).into(),
            Value::BigInt(v) => (*v).into(),
            Value::Varint(v) => v.clone(),
            _ => return None,
        })
    }

    /// The native type this value binds as when nothing declares one.
    ///
    /// Scalars map to their exact native type. Collections unify their element
    /// types: identical types stay, mixed numbers widen to the widest numeric
    /// type able to hold them all, and anything else falls back to text.
    pub fn inferred_type(&self) -> CqlType {
        match self {
            Value::Null | Value::Text(_) => NativeType::Text.into(),
            Value::Boolean(_) => NativeType::Boolean.into(),
            Value::TinyInt(_) => NativeType::Tinyint.into(),
            Value::SmallInt(_) => NativeType::Smallint.into(),
            Value::Int(_) => NativeType::Int.into(),
            Value::BigInt(_) => NativeType::Bigint.into(),
            Value::Float(_) => NativeType::Float.into(),
            Value::Double(_) => NativeType::Double.into(),
            Value::Decimal(_) => NativeType::Decimal.into(),
            Value::Varint(_) => NativeType::Varint.into(),
            Value::Bytes(_) => NativeType::Blob.into(),
            Value::Date(_) => NativeType::Date.into(),
            Value::Time(_) => NativeType::Time.into(),
            Value::Timestamp(_) => NativeType::Timestamp.into(),
            Value::Uuid(_) => NativeType::Uuid.into(),
            Value::Inet(_) => NativeType::Inet.into(),
            Value::Duration(_) => NativeType::Duration.into(),
            Value::List(items) => CqlType::list(unify(items.iter())),
            Value::Set(items) => CqlType::set(unify(items.iter())),
            Value::Map(entries) => CqlType::map(
                unify(entries.iter().map(|(k, _)| k)),
                unify(entries.iter().map(|(_, v)| v)),
            ),
            Value::Tuple(items) => CqlType::Tuple(items.iter().map(Value::inferred_type).collect()),
            Value::Udt(fields) => CqlType::UserDefined(UserDefinedType {
                keyspace: String::new(),
                name: String::new(),
                fields: fields.iter().map(|(n, v)| (n.clone(), v.inferred_type())).collect(),
            }),
            Value::Vector(items) => CqlType::vector(NativeType::Float, items.len() as u32),
        }
    }
}

fn numeric_rank(native: NativeType) -> Option<u8> {
    Some(match native {
        NativeType::Tinyint => 0,
        NativeType::Smallint => 1,
        NativeType::Int => 2,
        NativeType::Bigint => 3,
        NativeType::Varint => 4,
        NativeType::Float => 5,
        NativeType::Double => 6,
        NativeType::Decimal => 7,
        _ => return None,
    })
}

fn widen(a: NativeType, b: NativeType) -> Option<NativeType> {
    let (ra, rb) = (numeric_rank(a)?, numeric_rank(b)?);
    let (lo, hi) = if ra <= rb { (a, b) } else { (b, a) };
    Some(match (lo, hi) {
        // integers wider than float's mantissa need double or decimal
        (NativeType::Int, NativeType::Float) | (NativeType::Bigint, NativeType::Float) => NativeType::Double,
        (NativeType::Bigint, NativeType::Double) | (NativeType::Varint, _) if hi != NativeType::Varint => {
            NativeType::Decimal
        }
        _ => hi,
    })
}

fn unify<'a>(values: impl Iterator<Item = &'a Value>) -> CqlType {
    let mut unified: Option<CqlType> = None;
    for value in values.filter(|v| !v.is_null()) {
        let ty = value.inferred_type();
        unified = Some(match unified {
            None => ty,
            Some(current) if current == ty => current,
            Some(current) => match (current.native(), ty.native()) {
                (Some(a), Some(b)) => match widen(a, b) {
                    Some(wide) => wide.into(),
                    None => return NativeType::Text.into(),
                },
                _ => return NativeType::Text.into(),
            },
        });
    }
    unified.unwrap_or_else(|| NativeType::Text.into())
}

fn write_joined<T, I: Iterator<Item = T>>(
    f: &mut std::fmt::Formatter<'_>,
    items: I,
    mut write: impl FnMut(&mut std::fmt::Formatter<'_>, T) -> std::fmt::Result,
) -> std::fmt::Result {
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write(f, item)?;
    }
    Ok(())
}

impl Value {
    fn fmt_nested(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            other => write!(f, "{}", other),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::TinyInt(v) => write!(f, "{}", v),
            Value::SmallInt(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::Varint(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
            Value::Bytes(v) => {
                f.write_str("0x")?;
                v.iter().try_for_each(|b| write!(f, "{:02x}", b))
            }
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Value::Time(v) => write!(f, "{}", v.format("%H:%M:%S%.f")),
            Value::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%dT%H:%M:%S%.3fZ")),
            Value::Uuid(v) => write!(f, "{}", v.to_hyphenated_ref()),
            Value::Inet(v) => write!(f, "{}", v),
            Value::Duration(v) => write!(f, "{}", v),
            Value::List(items) => {
                f.write_str("[")?;
                write_joined(f, items.iter(), |f, v| v.fmt_nested(f))?;
                f.write_str("]")
            }
            Value::Set(items) => {
                f.write_str("{")?;
                write_joined(f, items.iter(), |f, v| v.fmt_nested(f))?;
                f.write_str("}")
            }
            Value::Map(entries) => {
                f.write_str("{")?;
                write_joined(f, entries.iter(), |f, (k, v)| {
                    k.fmt_nested(f)?;
                    f.write_str(": ")?;
                    v.fmt_nested(f)
                })?;
                f.write_str("}")
            }
            Value::Tuple(items) => {
                f.write_str("(")?;
                write_joined(f, items.iter(), |f, v| v.fmt_nested(f))?;
                f.write_str(")")
            }
            Value::Udt(fields) => {
                f.write_str("{")?;
                write_joined(f, fields.iter(), |f, (name, v)| {
                    write!(f, "{}: ", name)?;
                    v.fmt_nested(f)
                })?;
                f.write_str("}")
            }
            Value::Vector(items) => {
                f.write_str("[")?;
                write_joined(f, items.iter(), |f, v| write!(f, "{}", v))?;
                f.write_str("]")
            }
        }
    }
}

macro_rules! impl_from_host {
    ($t:ty, $variant:ident) => {
        impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(v)
            }
        }
    };
}

impl_from_host!(bool, Boolean);
impl_from_host!(i8, TinyInt);
impl_from_host!(i16, SmallInt);
impl_from_host!(i32, Int);
impl_from_host!(i64, BigInt);
impl_from_host!(f32, Float);
impl_from_host!(f64, Double);
impl_from_host!(Decimal, Decimal);
impl_from_host!(BigInt, Varint);
impl_from_host!(String, Text);
impl_from_host!(Vec<u8>, Bytes);
impl_from_host!(NaiveDate, Date);
impl_from_host!(NaiveTime, Time);
impl_from_host!(DateTime<Utc>, Timestamp);
impl_from_host!(Uuid, Uuid);
impl_from_host!(IpAddr, Inet);
impl_from_host!(CqlDuration, Duration);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(DateTime::from_utc(v, Utc))
    }
}

impl From<Ipv4Addr> for Value {
    fn from(v: Ipv4Addr) -> Self {
        Value::Inet(v.into())
    }
}

impl From<Ipv6Addr> for Value {
    fn from(v: Ipv6Addr) -> Self {
        Value::Inet(v.into())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Conversion out of a decoded [`Value`].
pub trait FromValue: Sized {
    /// Convert a non-null value.
    fn from_value(value: Value) -> Result<Self>;
}

fn unreadable<T>(target: &'static str, value: &Value) -> Result<T> {
    Err(Error::type_mismatch(target, value, format!("a {} value cannot be read as {}", value.kind(), target)))
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s),
            Value::Null => unreadable("String", &value),
            other => Ok(other.to_string()),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match &value {
            Value::Boolean(b) => Ok(*b),
            Value::Text(s) if s.eq_ignore_ascii_case("true") => Ok(true),
            Value::Text(s) if s.eq_ignore_ascii_case("false") => Ok(false),
            other => match other.as_integer() {
                Some(i) => Ok(!i.is_zero()),
                None => unreadable("bool", &value),
            },
        }
    }
}

macro_rules! impl_from_value_integer {
    ($t:ty, $to:ident) => {
        impl FromValue for $t {
            fn from_value(value: Value) -> Result<Self> {
                let integer = match &value {
                    Value::Text(s) => s.trim().parse::<BigInt>().ok(),
                    other => other.as_integer(),
                };
                match integer {
                    Some(i) => i
                        .$to()
                        .ok_or_else(|| Error::type_mismatch(stringify!($t), &value, "out of range")),
                    None => unreadable(stringify!($t), &value),
                }
            }
        }
    };
}

impl_from_value_integer!(i8, to_i8);
impl_from_value_integer!(i16, to_i16);
impl_from_value_integer!(i32, to_i32);
impl_from_value_integer!(i64, to_i64);

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float(v) => Ok(v),
            Value::TinyInt(v) => Ok(v.into()),
            Value::SmallInt(v) => Ok(v.into()),
            Value::Text(ref s) => s.trim().parse().or_else(|_| unreadable("f32", &value)),
            other => unreadable("f32", &other),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Double(v) => Ok(v),
            Value::Float(v) => Ok(v.into()),
            Value::TinyInt(v) => Ok(v.into()),
            Value::SmallInt(v) => Ok(v.into()),
            Value::Int(v) => Ok(v.into()),
            Value::Text(ref s) => s.trim().parse().or_else(|_| unreadable("f64", &value)),
            other => unreadable("f64", &other),
        }
    }
}

impl FromValue for Decimal {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Decimal(d) => Ok(d),
            Value::Float(v) => Decimal::from_f64(v.into()).map_or_else(|| unreadable("Decimal", &value), Ok),
            Value::Double(v) => Decimal::from_f64(v).map_or_else(|| unreadable("Decimal", &value), Ok),
            Value::Text(ref s) => s.parse().or_else(|_| unreadable("Decimal", &value)),
            other => match other.as_integer() {
                Some(i) => Ok(i.into()),
                None => unreadable("Decimal", &other),
            },
        }
    }
}

impl FromValue for BigInt {
    fn from_value(value: Value) -> Result<Self> {
        match value.as_integer() {
            Some(i) => Ok(i),
            None => unreadable("BigInt", &value),
        }
    }
}

macro_rules! impl_from_value_exact {
    ($t:ty, $variant:ident) => {
        impl FromValue for $t {
            fn from_value(value: Value) -> Result<Self> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => unreadable(stringify!($t), &other),
                }
            }
        }
    };
}

impl_from_value_exact!(NaiveDate, Date);
impl_from_value_exact!(NaiveTime, Time);
impl_from_value_exact!(IpAddr, Inet);
impl_from_value_exact!(CqlDuration, Duration);

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bytes(v) => Ok(v),
            other => unreadable("Vec<u8>", &other),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Uuid(v) => Ok(v),
            Value::Text(ref s) => Uuid::parse_str(s.trim()).or_else(|_| unreadable("Uuid", &value)),
            other => unreadable("Uuid", &other),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Timestamp(v) => Ok(v),
            Value::Date(d) => Ok(DateTime::from_utc(d.and_hms(0, 0, 0), Utc)),
            other => unreadable("DateTime<Utc>", &other),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            // nulls reach `T`, so only `Vec<Option<_>>` reads them
            Value::List(items) | Value::Set(items) | Value::Tuple(items) => items.into_iter().map(T::from_value).collect(),
            Value::Vector(items) => items.into_iter().map(|v| T::from_value(Value::Float(v))).collect(),
            other => unreadable("Vec", &other),
        }
    }
}

impl<K, V> FromValue for HashMap<K, V>
where
    K: FromValue + Eq + Hash,
    V: FromValue,
{
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
                .collect(),
            other => unreadable("HashMap", &other),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}
