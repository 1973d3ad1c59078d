// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The store's type system and its mapping onto relational type codes.

mod registry;

pub use registry::{
    PrecisionRule,
    TypeDescriptor,
    TypeRegistry,
    UNBOUNDED_PRECISION,
};

use anyhow::{
    anyhow,
    bail,
};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::{
    fmt::Display,
    str::FromStr,
};

/// The prefix of the fully qualified marshal classes reported for custom types.
const MARSHAL_PREFIX: &str = "org.apache.cassandra.db.marshal.";

/// Scalar types of the wide-column store.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NativeType {
    Ascii,
    Bigint,
    Blob,
    Boolean,
    Counter,
    Date,
    Decimal,
    Double,
    Duration,
    Float,
    Inet,
    Int,
    Smallint,
    Text,
    Time,
    Timestamp,
    Timeuuid,
    Tinyint,
    Uuid,
    Varint,
}

impl NativeType {
    /// Every native type, in registration order.
    pub const ALL: [NativeType; 20] = [
        NativeType::Ascii,
        NativeType::Bigint,
        NativeType::Blob,
        NativeType::Boolean,
        NativeType::Counter,
        NativeType::Date,
        NativeType::Decimal,
        NativeType::Double,
        NativeType::Duration,
        NativeType::Float,
        NativeType::Inet,
        NativeType::Int,
        NativeType::Smallint,
        NativeType::Text,
        NativeType::Time,
        NativeType::Timestamp,
        NativeType::Timeuuid,
        NativeType::Tinyint,
        NativeType::Uuid,
        NativeType::Varint,
    ];

    /// The lowercase CQL spelling of this type.
    pub fn cql_name(&self) -> &'static str {
        match self {
            NativeType::Ascii => "ascii",
            NativeType::Bigint => "bigint",
            NativeType::Blob => "blob",
            NativeType::Boolean => "boolean",
            NativeType::Counter => "counter",
            NativeType::Date => "date",
            NativeType::Decimal => "decimal",
            NativeType::Double => "double",
            NativeType::Duration => "duration",
            NativeType::Float => "float",
            NativeType::Inet => "inet",
            NativeType::Int => "int",
            NativeType::Smallint => "smallint",
            NativeType::Text => "text",
            NativeType::Time => "time",
            NativeType::Timestamp => "timestamp",
            NativeType::Timeuuid => "timeuuid",
            NativeType::Tinyint => "tinyint",
            NativeType::Uuid => "uuid",
            NativeType::Varint => "varint",
        }
    }

    /// Map a marshal class simple name (`Int32Type`, `UTF8Type`, ...) to a native type.
    fn from_marshal(class: &str) -> Option<Self> {
        Some(match class {
            "AsciiType" => NativeType::Ascii,
            "LongType" => NativeType::Bigint,
            "BytesType" => NativeType::Blob,
            "BooleanType" => NativeType::Boolean,
            "CounterColumnType" => NativeType::Counter,
            "SimpleDateType" => NativeType::Date,
            "DecimalType" => NativeType::Decimal,
            "DoubleType" => NativeType::Double,
            "DurationType" => NativeType::Duration,
            "FloatType" => NativeType::Float,
            "InetAddressType" => NativeType::Inet,
            "Int32Type" => NativeType::Int,
            "ShortType" => NativeType::Smallint,
            "UTF8Type" => NativeType::Text,
            "TimeType" => NativeType::Time,
            "TimestampType" | "DateType" => NativeType::Timestamp,
            "TimeUUIDType" => NativeType::Timeuuid,
            "ByteType" => NativeType::Tinyint,
            "UUIDType" => NativeType::Uuid,
            "IntegerType" => NativeType::Varint,
            _ => return None,
        })
    }
}

impl Display for NativeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.cql_name())
    }
}

impl FromStr for NativeType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "ASCII" => NativeType::Ascii,
            "BIGINT" => NativeType::Bigint,
            "BLOB" => NativeType::Blob,
            "BOOLEAN" => NativeType::Boolean,
            "COUNTER" => NativeType::Counter,
            "DATE" => NativeType::Date,
            "DECIMAL" => NativeType::Decimal,
            "DOUBLE" => NativeType::Double,
            "DURATION" => NativeType::Duration,
            "FLOAT" => NativeType::Float,
            "INET" => NativeType::Inet,
            "INT" => NativeType::Int,
            "SMALLINT" => NativeType::Smallint,
            // varchar is an alias of text in CQL 3
            "TEXT" | "VARCHAR" => NativeType::Text,
            "TIME" => NativeType::Time,
            "TIMESTAMP" => NativeType::Timestamp,
            "TIMEUUID" => NativeType::Timeuuid,
            "TINYINT" => NativeType::Tinyint,
            "UUID" => NativeType::Uuid,
            "VARINT" => NativeType::Varint,
            _ => bail!("Invalid native type: {}", s),
        })
    }
}

/// A user-defined type: its qualified name and ordered fields.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UserDefinedType {
    pub keyspace: String,
    pub name: String,
    pub fields: Vec<(String, CqlType)>,
}

/// A full store type, including composites.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CqlType {
    Native(NativeType),
    List(Box<CqlType>),
    Set(Box<CqlType>),
    Map(Box<CqlType>, Box<CqlType>),
    Tuple(Vec<CqlType>),
    UserDefined(UserDefinedType),
    /// Fixed-dimension vector of elements.
    Vector(Box<CqlType>, u32),
    /// A custom marshal class this layer cannot interpret.
    Custom(String),
}

impl From<NativeType> for CqlType {
    fn from(native: NativeType) -> Self {
        CqlType::Native(native)
    }
}

impl CqlType {
    /// Shorthand for a list type.
    pub fn list(element: impl Into<CqlType>) -> Self {
        CqlType::List(Box::new(element.into()))
    }

    /// Shorthand for a set type.
    pub fn set(element: impl Into<CqlType>) -> Self {
        CqlType::Set(Box::new(element.into()))
    }

    /// Shorthand for a map type.
    pub fn map(key: impl Into<CqlType>, value: impl Into<CqlType>) -> Self {
        CqlType::Map(Box::new(key.into()), Box::new(value.into()))
    }

    /// Shorthand for a vector type.
    pub fn vector(element: impl Into<CqlType>, dimension: u32) -> Self {
        CqlType::Vector(Box::new(element.into()), dimension)
    }

    /// The name this type is registered under in the [`TypeRegistry`].
    pub fn registry_name(&self) -> &str {
        match self {
            CqlType::Native(n) => n.cql_name(),
            CqlType::List(_) => "list",
            CqlType::Set(_) => "set",
            CqlType::Map(_, _) => "map",
            CqlType::Tuple(_) => "tuple",
            CqlType::UserDefined(_) => "udt",
            CqlType::Vector(_, _) => "vector",
            CqlType::Custom(class) => class.as_str(),
        }
    }

    /// The native scalar, if this is one.
    pub fn native(&self) -> Option<NativeType> {
        match self {
            CqlType::Native(n) => Some(*n),
            _ => None,
        }
    }

    /// Interpret a custom type class name as reported by the store.
    ///
    /// Newer stores describe some types (vectors, durations on older protocol
    /// versions) through marshal class names instead of dedicated type ids.
    pub fn from_custom_class(class: &str) -> Self {
        let class = class.trim();
        let simple = class.strip_prefix(MARSHAL_PREFIX).unwrap_or(class);
        if let Some(native) = NativeType::from_marshal(simple) {
            return CqlType::Native(native);
        }
        if let Some(args) = simple.strip_prefix("VectorType(").and_then(|s| s.strip_suffix(')')) {
            if let Some((element, dimension)) = args.rsplit_once(',') {
                if let Ok(dimension) = dimension.trim().parse::<u32>() {
                    return CqlType::vector(CqlType::from_custom_class(element), dimension);
                }
            }
        }
        if let Some(args) = simple.strip_prefix("ListType(").and_then(|s| s.strip_suffix(')')) {
            return CqlType::list(CqlType::from_custom_class(args));
        }
        if let Some(args) = simple.strip_prefix("SetType(").and_then(|s| s.strip_suffix(')')) {
            return CqlType::set(CqlType::from_custom_class(args));
        }
        CqlType::Custom(class.to_owned())
    }
}

impl Display for CqlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CqlType::Native(n) => write!(f, "{}", n),
            CqlType::List(e) => write!(f, "list<{}>", e),
            CqlType::Set(e) => write!(f, "set<{}>", e),
            CqlType::Map(k, v) => write!(f, "map<{}, {}>", k, v),
            CqlType::Tuple(types) => {
                f.write_str("tuple<")?;
                for (i, t) in types.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                f.write_str(">")
            }
            CqlType::UserDefined(udt) => write!(f, "{}.{}", udt.keyspace, udt.name),
            CqlType::Vector(e, dimension) => write!(f, "vector<{}, {}>", e, dimension),
            CqlType::Custom(class) => write!(f, "'{}'", class),
        }
    }
}

impl FromStr for CqlType {
    type Err = anyhow::Error;

    /// Parse a CQL type expression such as `map<text, frozen<list<int>>>`.
    /// User-defined types parse without field definitions.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (head, args) = match s.find('<') {
            Some(open) => {
                anyhow::ensure!(s.ends_with('>'), "Unbalanced type expression: {}", s);
                (&s[..open], Some(&s[open + 1..s.len() - 1]))
            }
            None => (s, None),
        };
        let head = head.trim().to_ascii_lowercase();
        match (head.as_str(), args) {
            ("frozen", Some(inner)) => inner.parse(),
            ("list", Some(inner)) => Ok(CqlType::list(inner.parse::<CqlType>()?)),
            ("set", Some(inner)) => Ok(CqlType::set(inner.parse::<CqlType>()?)),
            ("map", Some(inner)) => match split_type_args(inner)?.as_slice() {
                [k, v] => Ok(CqlType::map(k.parse::<CqlType>()?, v.parse::<CqlType>()?)),
                _ => bail!("Map type requires two arguments: {}", s),
            },
            ("tuple", Some(inner)) => Ok(CqlType::Tuple(
                split_type_args(inner)?
                    .into_iter()
                    .map(str::parse)
                    .collect::<anyhow::Result<_>>()?,
            )),
            ("vector", Some(inner)) => match split_type_args(inner)?.as_slice() {
                [e, d] => Ok(CqlType::vector(e.parse::<CqlType>()?, d.trim().parse()?)),
                _ => bail!("Vector type requires an element type and a dimension: {}", s),
            },
            (_, Some(_)) => bail!("Unknown parameterized type: {}", s),
            (name, None) => {
                if let Ok(native) = name.parse::<NativeType>() {
                    Ok(CqlType::Native(native))
                } else if let Some(class) = s.strip_prefix('\'').and_then(|c| c.strip_suffix('\'')) {
                    Ok(CqlType::from_custom_class(class))
                } else if let Some((keyspace, name)) = s.split_once('.') {
                    Ok(CqlType::UserDefined(UserDefinedType {
                        keyspace: keyspace.to_owned(),
                        name: name.to_owned(),
                        fields: Vec::new(),
                    }))
                } else {
                    Err(anyhow!("Unknown type: {}", s))
                }
            }
        }
    }
}

/// Split comma separated type arguments, respecting nested angle brackets.
fn split_type_args(s: &str) -> anyhow::Result<Vec<&str>> {
    let mut depth = 0usize;
    let mut start = 0;
    let mut args = Vec::new();
    for (i, c) in s.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| anyhow!("Unbalanced type arguments: {}", s))?
            }
            ',' if depth == 0 => {
                args.push(s[start..i].trim());
                start = i + 1;
            }
            _ => (),
        }
    }
    args.push(s[start..].trim());
    Ok(args)
}

/// Relational protocol type codes (the JDBC `java.sql.Types` numbering).
#[allow(missing_docs)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(i32)]
pub enum RelationalType {
    Bit = -7,
    TinyInt = -6,
    SmallInt = 5,
    Integer = 4,
    BigInt = -5,
    Float = 6,
    Real = 7,
    Double = 8,
    Numeric = 2,
    Decimal = 3,
    Char = 1,
    Varchar = 12,
    LongVarchar = -1,
    Date = 91,
    Time = 92,
    Timestamp = 93,
    Binary = -2,
    Varbinary = -3,
    LongVarbinary = -4,
    Null = 0,
    Other = 1111,
    JavaObject = 2000,
    Struct = 2002,
    Array = 2003,
    Blob = 2004,
    Boolean = 16,
    Nvarchar = -9,
}

impl RelationalType {
    /// The numeric code sent over the relational protocol.
    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// Look up a code.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::from_i32(code)
    }

    /// The protocol's name for this code.
    pub fn name(&self) -> &'static str {
        match self {
            RelationalType::Bit => "BIT",
            RelationalType::TinyInt => "TINYINT",
            RelationalType::SmallInt => "SMALLINT",
            RelationalType::Integer => "INTEGER",
            RelationalType::BigInt => "BIGINT",
            RelationalType::Float => "FLOAT",
            RelationalType::Real => "REAL",
            RelationalType::Double => "DOUBLE",
            RelationalType::Numeric => "NUMERIC",
            RelationalType::Decimal => "DECIMAL",
            RelationalType::Char => "CHAR",
            RelationalType::Varchar => "VARCHAR",
            RelationalType::LongVarchar => "LONGVARCHAR",
            RelationalType::Date => "DATE",
            RelationalType::Time => "TIME",
            RelationalType::Timestamp => "TIMESTAMP",
            RelationalType::Binary => "BINARY",
            RelationalType::Varbinary => "VARBINARY",
            RelationalType::LongVarbinary => "LONGVARBINARY",
            RelationalType::Null => "NULL",
            RelationalType::Other => "OTHER",
            RelationalType::JavaObject => "JAVA_OBJECT",
            RelationalType::Struct => "STRUCT",
            RelationalType::Array => "ARRAY",
            RelationalType::Blob => "BLOB",
            RelationalType::Boolean => "BOOLEAN",
            RelationalType::Nvarchar => "NVARCHAR",
        }
    }

    /// The store type a value of this relational type is bound as when
    /// nothing else is known, if there is one.
    pub fn native_type(&self) -> Option<NativeType> {
        use RelationalType as R;
        Some(match self {
            R::Bit | R::Boolean => NativeType::Boolean,
            R::TinyInt => NativeType::Tinyint,
            R::SmallInt => NativeType::Smallint,
            R::Integer => NativeType::Int,
            R::BigInt => NativeType::Bigint,
            R::Float | R::Real => NativeType::Float,
            R::Double => NativeType::Double,
            R::Numeric => NativeType::Varint,
            R::Decimal => NativeType::Decimal,
            R::Char | R::Varchar | R::LongVarchar | R::Nvarchar => NativeType::Text,
            R::Date => NativeType::Date,
            R::Time => NativeType::Time,
            R::Timestamp => NativeType::Timestamp,
            R::Binary | R::Varbinary | R::LongVarbinary | R::Blob => NativeType::Blob,
            R::Null | R::Other | R::JavaObject | R::Struct | R::Array => return None,
        })
    }
}

impl Display for RelationalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
