// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Column and parameter descriptors.
//!
//! Descriptors are derived once, from the store's column specs, and never
//! change afterwards. Column names are reported exactly as the store declared
//! them: quoted identifiers keep their case, everything else arrives lowercase.

use crate::{
    codec::Value,
    session::ColumnSpec,
    types::{
        CqlType,
        NativeType,
        RelationalType,
        TypeDescriptor,
        TypeRegistry,
    },
    Error,
    Result,
};
use std::collections::HashMap;

/// Whether a column or parameter may hold null.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Nullability {
    NoNulls,
    Nullable,
    Unknown,
}

impl Nullability {
    /// The relational protocol's numbering (`columnNoNulls` = 0, ...).
    pub fn code(&self) -> i32 {
        match self {
            Nullability::NoNulls => 0,
            Nullability::Nullable => 1,
            Nullability::Unknown => 2,
        }
    }
}

/// The capability shared by column and parameter descriptors.
pub trait TypedDescriptor {
    /// The column or parameter name.
    fn name(&self) -> &str;

    /// The native type.
    fn native_type(&self) -> &CqlType;

    /// The registry entry of the native type.
    fn descriptor(&self) -> &'static TypeDescriptor;

    /// The relational type code.
    fn relational_type(&self) -> RelationalType {
        self.descriptor().relational_type()
    }

    /// The full native type name, `list<int>` rather than `list`.
    fn type_name(&self) -> String {
        self.native_type().to_string()
    }

    /// The host type values decode into.
    fn host_type_name(&self) -> &'static str {
        self.descriptor().host_type_name()
    }

    /// The type's default precision.
    fn precision(&self) -> i32 {
        self.descriptor().precision(None)
    }

    /// The type's default scale.
    fn scale(&self) -> i32 {
        self.descriptor().scale(None)
    }

    /// Precision of a concrete value of this type.
    fn precision_of(&self, value: &Value) -> i32 {
        self.descriptor().precision(Some(value))
    }

    /// Scale of a concrete value of this type.
    fn scale_of(&self, value: &Value) -> i32 {
        self.descriptor().scale(Some(value))
    }

    fn is_signed(&self) -> bool {
        self.descriptor().is_signed()
    }

    fn is_case_sensitive(&self) -> bool {
        self.descriptor().is_case_sensitive()
    }

    fn nullable(&self) -> Nullability;
}

/// Describes one result column.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDescriptor {
    name: String,
    label: String,
    ty: CqlType,
    descriptor: &'static TypeDescriptor,
    nullable: Nullability,
    table: String,
    schema: String,
    catalog: String,
}

impl ColumnDescriptor {
    /// Describe `spec`, a column of a result produced by the cluster `catalog`.
    pub fn from_spec(spec: &ColumnSpec, catalog: &str, registry: &TypeRegistry) -> Result<Self> {
        Ok(Self {
            name: spec.name.clone(),
            label: spec.name.clone(),
            ty: spec.ty.clone(),
            descriptor: registry.describe(&spec.ty)?,
            nullable: Nullability::Nullable,
            table: spec.table.clone(),
            schema: spec.keyspace.clone(),
            catalog: catalog.to_owned(),
        })
    }

    /// The label. An alias is both the name and the label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The table the column is read from.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The keyspace of the table.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// The cluster name.
    pub fn catalog(&self) -> &str {
        &self.catalog
    }

    pub fn display_size(&self) -> i32 {
        self.descriptor.display_size()
    }
}

impl TypedDescriptor for ColumnDescriptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn native_type(&self) -> &CqlType {
        &self.ty
    }

    fn descriptor(&self) -> &'static TypeDescriptor {
        self.descriptor
    }

    fn nullable(&self) -> Nullability {
        self.nullable
    }
}

/// Where a parameter's type came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParameterSource {
    /// Declared by the store when the query was prepared.
    Prepared,
    /// Inferred from the value bound at that position.
    Inferred,
    /// Nothing is known; reported as text.
    Unknown,
}

/// Describes one bind marker.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterDescriptor {
    position: usize,
    name: String,
    ty: CqlType,
    descriptor: &'static TypeDescriptor,
    nullable: Nullability,
    source: ParameterSource,
}

impl ParameterDescriptor {
    /// The 1-based position of the marker.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn source(&self) -> ParameterSource {
        self.source
    }
}

impl TypedDescriptor for ParameterDescriptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn native_type(&self) -> &CqlType {
        &self.ty
    }

    fn descriptor(&self) -> &'static TypeDescriptor {
        self.descriptor
    }

    fn nullable(&self) -> Nullability {
        self.nullable
    }
}

/// Find a column by label: an exact match wins, then the first
/// case-insensitive one.
fn position_of(labels: &HashMap<String, Vec<usize>>, columns: &[ColumnDescriptor], label: &str) -> Option<usize> {
    let candidates = labels.get(&label.to_lowercase())?;
    candidates
        .iter()
        .find(|&&i| columns[i].label == label)
        .or_else(|| candidates.first())
        .copied()
}

/// The columns of a result.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultMetadata {
    columns: Vec<ColumnDescriptor>,
    labels: HashMap<String, Vec<usize>>,
}

impl ResultMetadata {
    /// Describe the columns of a result produced by the cluster `catalog`.
    pub fn from_specs(specs: &[ColumnSpec], catalog: &str, registry: &TypeRegistry) -> Result<Self> {
        let columns = specs
            .iter()
            .map(|spec| ColumnDescriptor::from_spec(spec, catalog, registry))
            .collect::<Result<Vec<_>>>()?;
        let mut labels: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, column) in columns.iter().enumerate() {
            labels.entry(column.label.to_lowercase()).or_default().push(i);
        }
        Ok(Self { columns, labels })
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// The column at 1-based `index`.
    pub fn column(&self, index: usize) -> Result<&ColumnDescriptor> {
        index
            .checked_sub(1)
            .and_then(|i| self.columns.get(i))
            .ok_or_else(|| Error::ColumnNotFound {
                column: index.to_string(),
                count: self.columns.len(),
            })
    }

    /// The 1-based index of the column labelled `label`, ignoring case.
    pub fn find_column(&self, label: &str) -> Result<usize> {
        position_of(&self.labels, &self.columns, label)
            .map(|i| i + 1)
            .ok_or_else(|| Error::ColumnNotFound {
                column: label.to_owned(),
                count: self.columns.len(),
            })
    }
}

/// The bind markers of a prepared query.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterMetadata {
    query: String,
    parameters: Vec<ParameterDescriptor>,
    degraded: bool,
}

impl ParameterMetadata {
    /// Describe the markers the store declared when preparing `query`.
    pub fn from_prepared(
        query: &str,
        variables: &[ColumnSpec],
        pk_indexes: &[u16],
        registry: &TypeRegistry,
    ) -> Result<Self> {
        let parameters = variables
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                Ok(ParameterDescriptor {
                    position: i + 1,
                    name: spec.name.clone(),
                    ty: spec.ty.clone(),
                    descriptor: registry.describe(&spec.ty)?,
                    // partition key components can never be null
                    nullable: if pk_indexes.contains(&(i as u16)) {
                        Nullability::NoNulls
                    } else {
                        Nullability::Nullable
                    },
                    source: ParameterSource::Prepared,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            query: query.to_owned(),
            parameters,
            degraded: false,
        })
    }

    /// Describe markers the store did not declare. Positions with a typed
    /// binding take the binding's type, all others are reported as text.
    pub fn fallback(query: &str, bound: &[Option<&CqlType>], registry: &TypeRegistry) -> Result<Self> {
        log::warn!(
            "Parameter types of `{}` are unknown, reporting inferred or text types",
            query
        );
        let parameters = bound
            .iter()
            .enumerate()
            .map(|(i, bound)| {
                let (ty, source) = match bound {
                    Some(ty) => ((*ty).clone(), ParameterSource::Inferred),
                    None => (CqlType::from(NativeType::Text), ParameterSource::Unknown),
                };
                Ok(ParameterDescriptor {
                    position: i + 1,
                    name: format!("?{}", i + 1),
                    descriptor: registry.describe(&ty)?,
                    ty,
                    nullable: Nullability::Unknown,
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            query: query.to_owned(),
            parameters,
            degraded: true,
        })
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    /// The parameter at 1-based `position`.
    pub fn parameter(&self, position: usize) -> Result<&ParameterDescriptor> {
        position
            .checked_sub(1)
            .and_then(|i| self.parameters.get(i))
            .ok_or_else(|| Error::ParameterOutOfRange {
                position,
                count: self.parameters.len(),
                query: self.query.clone(),
            })
    }

    /// Whether the types were guessed rather than declared by the store.
    /// Degraded metadata reports [`ParameterSource::Inferred`] or
    /// [`ParameterSource::Unknown`] for every parameter.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, native: NativeType) -> ColumnSpec {
        ColumnSpec::new("ks", "cf_test", name, native.into())
    }

    #[test]
    fn columns_carry_source_identity() {
        let metadata = ResultMetadata::from_specs(
            &[spec("resKeyname", NativeType::Text), spec("t1iValue", NativeType::Int)],
            "Test Cluster",
            TypeRegistry::global(),
        )
        .unwrap();
        assert_eq!(metadata.column_count(), 2);
        let column = metadata.column(1).unwrap();
        assert_eq!(column.name(), "resKeyname");
        assert_eq!(column.label(), "resKeyname");
        assert_eq!(column.table(), "cf_test");
        assert_eq!(column.schema(), "ks");
        assert_eq!(column.catalog(), "Test Cluster");
        assert_eq!(column.relational_type(), RelationalType::Varchar);
        assert_eq!(metadata.column(2).unwrap().relational_type(), RelationalType::Integer);
        assert_eq!(metadata.column(2).unwrap().precision(), 10);
        assert!(matches!(metadata.column(0), Err(Error::ColumnNotFound { .. })));
        assert!(matches!(metadata.column(3), Err(Error::ColumnNotFound { count: 2, .. })));
    }

    #[test]
    fn labels_match_ignoring_case_preferring_exact() {
        let metadata = ResultMetadata::from_specs(
            &[spec("value", NativeType::Int), spec("Value", NativeType::Text)],
            "",
            TypeRegistry::global(),
        )
        .unwrap();
        assert_eq!(metadata.find_column("Value").unwrap(), 2);
        assert_eq!(metadata.find_column("value").unwrap(), 1);
        assert_eq!(metadata.find_column("VALUE").unwrap(), 1);
        assert!(matches!(
            metadata.find_column("missing"),
            Err(Error::ColumnNotFound { ref column, .. }) if column == "missing"
        ));
    }

    #[test]
    fn unknown_custom_types_fail() {
        let column = ColumnSpec::new("ks", "t", "c", CqlType::Custom("org.example.Mystery".into()));
        assert!(matches!(
            ResultMetadata::from_specs(&[column], "", TypeRegistry::global()),
            Err(Error::UnknownType { .. })
        ));
    }

    #[test]
    fn prepared_parameters_keep_declared_order() {
        let metadata = ParameterMetadata::from_prepared(
            "SELECT keyname FROM cf_test WHERE t1bValue = ? AND t1iValue = ?",
            &[spec("t1bvalue", NativeType::Boolean), spec("t1ivalue", NativeType::Int)],
            &[1],
            TypeRegistry::global(),
        )
        .unwrap();
        assert!(!metadata.is_degraded());
        assert_eq!(metadata.parameter_count(), 2);
        assert_eq!(metadata.parameter(1).unwrap().relational_type(), RelationalType::Boolean);
        assert_eq!(metadata.parameter(2).unwrap().relational_type(), RelationalType::Integer);
        assert_eq!(metadata.parameter(1).unwrap().nullable(), Nullability::Nullable);
        assert_eq!(metadata.parameter(2).unwrap().nullable(), Nullability::NoNulls);
        assert!(matches!(
            metadata.parameter(3),
            Err(Error::ParameterOutOfRange { position: 3, count: 2, .. })
        ));
    }

    #[test]
    fn fallback_is_flagged_and_text_like() {
        let bound = Value::BigInt(7).inferred_type();
        let metadata =
            ParameterMetadata::fallback("SELECT * FROM t WHERE a = ? AND b = ?", &[Some(&bound), None], TypeRegistry::global())
                .unwrap();
        assert!(metadata.is_degraded());
        let first = metadata.parameter(1).unwrap();
        assert_eq!(first.source(), ParameterSource::Inferred);
        assert_eq!(first.relational_type(), RelationalType::BigInt);
        let second = metadata.parameter(2).unwrap();
        assert_eq!(second.source(), ParameterSource::Unknown);
        assert_eq!(second.relational_type(), RelationalType::Varchar);
        assert_eq!(second.nullable(), Nullability::Unknown);
    }

    #[test]
    fn decimal_precision_follows_the_value() {
        let metadata =
            ResultMetadata::from_specs(&[spec("d", NativeType::Decimal)], "", TypeRegistry::global()).unwrap();
        let column = metadata.column(1).unwrap();
        let value = Value::Decimal("-123.4500".parse().unwrap());
        assert_eq!(column.precision_of(&value), 7);
        assert_eq!(column.scale_of(&value), 4);
    }
}
