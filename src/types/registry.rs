// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The process-wide registry of type descriptors.
//!
//! Registration happens once, when [`TypeRegistry::global`] is first touched
//! (or when a caller builds its own registry from a static descriptor table).
//! After that the registry is immutable, so it is shared between threads
//! without locking and every lookup returns a `&'static` descriptor.

use super::{
    CqlType,
    RelationalType,
};
use crate::{
    codec::Value,
    Error,
    Result,
};
use lazy_static::lazy_static;
use std::collections::HashMap;

/// Sentinel precision reported for types without a meaningful bound.
pub const UNBOUNDED_PRECISION: i32 = i32::MAX;

/// How a type reports precision and scale.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PrecisionRule {
    /// Constant precision and scale, whatever the value.
    Fixed { precision: i32, scale: i32 },
    /// No meaningful bound: [`UNBOUNDED_PRECISION`] and scale 0.
    Unbounded,
    /// Computed from the value when one is supplied.
    FromValue { default_precision: i32, default_scale: i32 },
}

/// Everything the relational protocol needs to know about one native type.
#[derive(Debug, PartialEq, Eq)]
pub struct TypeDescriptor {
    name: &'static str,
    label: &'static str,
    relational: RelationalType,
    host_type: &'static str,
    rule: PrecisionRule,
    display_size: i32,
    case_sensitive: bool,
    signed: bool,
}

impl TypeDescriptor {
    /// Describe a type. Meant for building static descriptor tables.
    pub const fn new(
        name: &'static str,
        label: &'static str,
        relational: RelationalType,
        host_type: &'static str,
        rule: PrecisionRule,
        display_size: i32,
        case_sensitive: bool,
        signed: bool,
    ) -> Self {
        Self {
            name,
            label,
            relational,
            host_type,
            rule,
            display_size,
            case_sensitive,
            signed,
        }
    }

    /// The lowercase native type name (`int`, `text`, `list`, ...).
    pub fn native_name(&self) -> &'static str {
        self.name
    }

    /// The uppercase type name (`INT`, `TEXT`, ...).
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// The relational type code this native type maps to.
    pub fn relational_type(&self) -> RelationalType {
        self.relational
    }

    /// The name of the host type values of this type decode into.
    pub fn host_type_name(&self) -> &'static str {
        self.host_type
    }

    /// The precision rule of this type.
    pub fn precision_rule(&self) -> PrecisionRule {
        self.rule
    }

    /// Precision, computed from `value` when the rule depends on it.
    pub fn precision(&self, value: Option<&Value>) -> i32 {
        match self.rule {
            PrecisionRule::Fixed { precision, .. } => precision,
            PrecisionRule::Unbounded => UNBOUNDED_PRECISION,
            PrecisionRule::FromValue { default_precision, .. } => match value {
                Some(Value::Decimal(d)) => d.precision(),
                Some(Value::Varint(v)) => digit_count(v),
                _ => default_precision,
            },
        }
    }

    /// Scale, computed from `value` when the rule depends on it.
    pub fn scale(&self, value: Option<&Value>) -> i32 {
        match self.rule {
            PrecisionRule::Fixed { scale, .. } => scale,
            PrecisionRule::Unbounded => 0,
            PrecisionRule::FromValue { default_scale, .. } => match value {
                Some(Value::Decimal(d)) => d.scale(),
                Some(Value::Varint(_)) => 0,
                _ => default_scale,
            },
        }
    }

    /// Maximum width in characters of a rendered value.
    pub fn display_size(&self) -> i32 {
        self.display_size
    }

    /// Whether comparisons of this type are case sensitive.
    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Whether values of this type are signed numbers.
    pub fn is_signed(&self) -> bool {
        self.signed
    }
}

fn digit_count(v: &num_bigint::BigInt) -> i32 {
    v.magnitude().to_str_radix(10).len() as i32
}

const fn fixed(precision: i32, scale: i32) -> PrecisionRule {
    PrecisionRule::Fixed { precision, scale }
}

use PrecisionRule::Unbounded;
use RelationalType as R;

/// The standard descriptor table, one entry per native and composite type.
pub static STANDARD_TYPES: [TypeDescriptor; 26] = [
    TypeDescriptor::new("ascii", "ASCII", R::Varchar, "String", Unbounded, UNBOUNDED_PRECISION, true, false),
    TypeDescriptor::new("bigint", "BIGINT", R::BigInt, "i64", fixed(19, 0), 19, false, true),
    TypeDescriptor::new("blob", "BLOB", R::LongVarbinary, "Vec<u8>", Unbounded, UNBOUNDED_PRECISION, false, false),
    TypeDescriptor::new("boolean", "BOOLEAN", R::Boolean, "bool", fixed(1, 0), 5, false, false),
    TypeDescriptor::new("counter", "COUNTER", R::BigInt, "i64", fixed(19, 0), 19, false, true),
    TypeDescriptor::new("date", "DATE", R::Date, "chrono::NaiveDate", fixed(10, 0), 10, false, false),
    TypeDescriptor::new(
        "decimal",
        "DECIMAL",
        R::Decimal,
        "scylla_rdbc::Decimal",
        PrecisionRule::FromValue {
            default_precision: 0,
            default_scale: 0,
        },
        UNBOUNDED_PRECISION,
        false,
        true,
    ),
    TypeDescriptor::new("double", "DOUBLE", R::Double, "f64", fixed(15, 15), 24, false, true),
    TypeDescriptor::new("duration", "DURATION", R::Other, "scylla_rdbc::CqlDuration", Unbounded, UNBOUNDED_PRECISION, false, false),
    TypeDescriptor::new("float", "FLOAT", R::Float, "f32", fixed(7, 7), 15, false, true),
    TypeDescriptor::new("inet", "INET", R::Other, "std::net::IpAddr", fixed(39, 0), 39, false, false),
    TypeDescriptor::new("int", "INT", R::Integer, "i32", fixed(10, 0), 10, false, true),
    TypeDescriptor::new("smallint", "SMALLINT", R::SmallInt, "i16", fixed(5, 0), 5, false, true),
    TypeDescriptor::new("text", "TEXT", R::Varchar, "String", Unbounded, UNBOUNDED_PRECISION, true, false),
    TypeDescriptor::new("time", "TIME", R::Time, "chrono::NaiveTime", fixed(18, 9), 18, false, false),
    TypeDescriptor::new("timestamp", "TIMESTAMP", R::Timestamp, "chrono::DateTime<Utc>", fixed(24, 3), 24, false, false),
    TypeDescriptor::new("timeuuid", "TIMEUUID", R::Other, "uuid::Uuid", fixed(36, 0), 36, false, false),
    TypeDescriptor::new("tinyint", "TINYINT", R::TinyInt, "i8", fixed(3, 0), 3, false, true),
    TypeDescriptor::new("uuid", "UUID", R::Other, "uuid::Uuid", fixed(36, 0), 36, false, false),
    TypeDescriptor::new(
        "varint",
        "VARINT",
        R::Numeric,
        "num_bigint::BigInt",
        PrecisionRule::FromValue {
            default_precision: UNBOUNDED_PRECISION,
            default_scale: 0,
        },
        UNBOUNDED_PRECISION,
        false,
        true,
    ),
    TypeDescriptor::new("list", "LIST", R::Array, "Vec<Value>", Unbounded, UNBOUNDED_PRECISION, false, false),
    TypeDescriptor::new("set", "SET", R::Array, "Vec<Value>", Unbounded, UNBOUNDED_PRECISION, false, false),
    TypeDescriptor::new("map", "MAP", R::JavaObject, "Vec<(Value, Value)>", Unbounded, UNBOUNDED_PRECISION, false, false),
    TypeDescriptor::new("tuple", "TUPLE", R::Other, "Vec<Value>", Unbounded, UNBOUNDED_PRECISION, false, false),
    TypeDescriptor::new("udt", "UDT", R::Other, "Vec<(String, Value)>", Unbounded, UNBOUNDED_PRECISION, false, false),
    TypeDescriptor::new("vector", "VECTOR", R::Array, "Vec<f32>", Unbounded, UNBOUNDED_PRECISION, false, false),
];

lazy_static! {
    static ref GLOBAL: TypeRegistry = TypeRegistry::from_descriptors(&STANDARD_TYPES);
}

/// Bidirectional lookup between native type names and their descriptors.
#[derive(Debug)]
pub struct TypeRegistry {
    descriptors: &'static [TypeDescriptor],
    by_name: HashMap<&'static str, &'static TypeDescriptor>,
}

impl TypeRegistry {
    /// The standard registry, initialized on first use.
    pub fn global() -> &'static TypeRegistry {
        &GLOBAL
    }

    /// Build a registry from a static descriptor table. Later entries with the
    /// same name are ignored, so there is exactly one descriptor per name.
    pub fn from_descriptors(descriptors: &'static [TypeDescriptor]) -> Self {
        let mut by_name = HashMap::with_capacity(descriptors.len() + 1);
        for descriptor in descriptors {
            by_name.entry(descriptor.name).or_insert(descriptor);
        }
        if let Some(text) = by_name.get("text").copied() {
            by_name.entry("varchar").or_insert(text);
        }
        Self { descriptors, by_name }
    }

    /// Resolve a native type name. Matching is case-insensitive.
    pub fn resolve(&self, native_type_name: &str) -> Result<&'static TypeDescriptor> {
        if let Some(descriptor) = self.by_name.get(native_type_name) {
            return Ok(*descriptor);
        }
        self.by_name
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(native_type_name))
            .map(|(_, descriptor)| *descriptor)
            .ok_or_else(|| Error::unknown_type(native_type_name))
    }

    /// Resolve the descriptor of a full store type.
    pub fn describe(&self, ty: &CqlType) -> Result<&'static TypeDescriptor> {
        self.resolve(ty.registry_name())
    }

    /// The relational type code of a native type.
    pub fn relational_code_for(&self, native_type_name: &str) -> Result<RelationalType> {
        self.resolve(native_type_name).map(TypeDescriptor::relational_type)
    }

    /// The host type name of a native type.
    pub fn host_type_for(&self, native_type_name: &str) -> Result<&'static str> {
        self.resolve(native_type_name).map(TypeDescriptor::host_type_name)
    }

    /// All registered descriptors.
    pub fn descriptors(&self) -> impl Iterator<Item = &'static TypeDescriptor> {
        self.descriptors.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::Decimal,
        types::NativeType,
    };

    #[test]
    fn resolve_is_idempotent() {
        let registry = TypeRegistry::global();
        for descriptor in registry.descriptors() {
            let first = registry.resolve(descriptor.native_name()).unwrap();
            let second = registry.resolve(descriptor.native_name()).unwrap();
            assert!(std::ptr::eq(first, second));
            assert!(std::ptr::eq(first, descriptor));
        }
    }

    #[test]
    fn every_native_type_is_registered() {
        let registry = TypeRegistry::global();
        for native in NativeType::ALL.iter() {
            assert_eq!(registry.resolve(native.cql_name()).unwrap().native_name(), native.cql_name());
        }
    }

    #[test]
    fn unknown_types_fail() {
        let err = TypeRegistry::global().resolve("geometry").unwrap_err();
        assert!(matches!(err, Error::UnknownType { type_name } if type_name == "geometry"));
        let err = TypeRegistry::global()
            .describe(&CqlType::Custom("com.example.PointType".into()))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownType { .. }));
    }

    #[test]
    fn text_like_types_share_varchar() {
        let registry = TypeRegistry::global();
        assert_eq!(registry.relational_code_for("text").unwrap(), RelationalType::Varchar);
        assert_eq!(registry.relational_code_for("ascii").unwrap(), RelationalType::Varchar);
        assert!(std::ptr::eq(
            registry.resolve("varchar").unwrap(),
            registry.resolve("text").unwrap()
        ));
        assert!(std::ptr::eq(registry.resolve("INT").unwrap(), registry.resolve("int").unwrap()));
    }

    #[test]
    fn integer_precision_is_the_digit_count() {
        let registry = TypeRegistry::global();
        let expected = [("tinyint", 3), ("smallint", 5), ("int", 10), ("bigint", 19)];
        for (name, digits) in expected.iter() {
            let descriptor = registry.resolve(name).unwrap();
            assert_eq!(descriptor.precision(None), *digits);
            assert_eq!(descriptor.precision(Some(&Value::Int(7))), *digits);
            assert_eq!(descriptor.scale(None), 0);
        }
    }

    #[test]
    fn unbounded_types_report_sentinel() {
        let registry = TypeRegistry::global();
        for name in ["text", "ascii", "blob"].iter() {
            assert_eq!(registry.resolve(name).unwrap().precision(None), UNBOUNDED_PRECISION);
            assert_eq!(registry.resolve(name).unwrap().scale(None), 0);
        }
    }

    #[test]
    fn decimal_precision_follows_the_value() {
        let decimal = TypeRegistry::global().resolve("decimal").unwrap();
        let value = Value::Decimal("-123.4500".parse::<Decimal>().unwrap());
        assert_eq!(decimal.precision(Some(&value)), 7);
        assert_eq!(decimal.scale(Some(&value)), 4);
        assert_eq!(decimal.precision(None), 0);
        assert_eq!(decimal.scale(None), 0);

        let varint = TypeRegistry::global().resolve("varint").unwrap();
        assert_eq!(varint.precision(Some(&Value::Varint((-12345).into()))), 5);
    }
}
