//! Columns and rows of a result.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::protocol::backend::{self, DataRow, FieldDescription};
use crate::protocol::types::{FormatCode, Oid};
use crate::types::{DataType, TypeRegistry, Value};

/// Metadata of one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    table_oid: Option<Oid>,
    attribute_number: Option<i16>,
    data_type: DataType,
    size: i16,
    modifier: i32,
    format: FormatCode,
}

impl Column {
    /// Build from a RowDescription field, resolving its type.
    pub fn from_field(field: &FieldDescription<'_>, registry: &TypeRegistry) -> Result<Self> {
        Ok(Self {
            name: field.name.to_string(),
            table_oid: Some(field.table_oid()).filter(|oid| *oid != 0),
            attribute_number: Some(field.attribute_number()).filter(|n| *n != 0),
            data_type: registry.lookup(field.type_oid())?.clone(),
            size: field.type_size(),
            modifier: field.type_modifier(),
            format: field.format(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// OID of the source table, `None` for computed columns.
    pub fn table_oid(&self) -> Option<Oid> {
        self.table_oid
    }

    /// Attribute number in the source table, `None` for computed columns.
    pub fn attribute_number(&self) -> Option<i16> {
        self.attribute_number
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn size(&self) -> i16 {
        self.size
    }

    pub fn modifier(&self) -> i32 {
        self.modifier
    }

    pub fn format(&self) -> FormatCode {
        self.format
    }

    /// Convert a raw field of this column.
    pub fn deserialize(&self, bytes: Option<&[u8]>) -> Result<Value> {
        self.data_type.deserialize(self.format, bytes)
    }
}

/// Ordered column list shared by every row of a result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowDescription {
    columns: Vec<Column>,
}

impl RowDescription {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Build from a RowDescription message.
    pub fn from_message(
        message: &backend::RowDescription<'_>,
        registry: &TypeRegistry,
    ) -> Result<Self> {
        let columns = message
            .fields()
            .iter()
            .map(|field| Column::from_field(field, registry))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Column> {
        self.columns.iter()
    }

    /// Look up a column by position or name.
    pub fn column<I: ColumnIndex>(&self, index: I) -> Result<&Column> {
        let position = index.position_in(self)?;
        self.columns
            .get(position)
            .ok_or_else(|| Error::NotFound(format!("column {position}")))
    }

    /// Position of the column with this name.
    ///
    /// Fails with [`Error::DuplicateColumnName`] when several columns share it.
    pub fn position(&self, name: &str) -> Result<usize> {
        let mut matches = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.name == name)
            .map(|(position, _)| position);
        let first = matches
            .next()
            .ok_or_else(|| Error::NotFound(format!("column {name:?}")))?;
        if matches.next().is_some() {
            return Err(Error::DuplicateColumnName(name.to_string()));
        }
        Ok(first)
    }

    /// Columns keyed by name.
    pub fn to_map(&self) -> Result<HashMap<&str, &Column>> {
        let mut map = HashMap::with_capacity(self.columns.len());
        for column in &self.columns {
            match map.entry(column.name()) {
                Entry::Occupied(_) => return Err(Error::DuplicateColumnName(column.name.clone())),
                Entry::Vacant(slot) => {
                    slot.insert(column);
                }
            }
        }
        Ok(map)
    }
}

impl<'a> IntoIterator for &'a RowDescription {
    type Item = &'a Column;
    type IntoIter = std::slice::Iter<'a, Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

mod private {
    pub trait Sealed {}
    impl Sealed for usize {}
    impl Sealed for str {}
    impl Sealed for String {}
    impl<T: Sealed + ?Sized> Sealed for &T {}
}

/// Column position or name.
///
/// Implemented for `usize`, `str` and `String`.
pub trait ColumnIndex: private::Sealed {
    fn position_in(&self, description: &RowDescription) -> Result<usize>;
}

impl ColumnIndex for usize {
    fn position_in(&self, description: &RowDescription) -> Result<usize> {
        if *self < description.len() {
            Ok(*self)
        } else {
            Err(Error::NotFound(format!(
                "column {self} (row has {} columns)",
                description.len()
            )))
        }
    }
}

impl ColumnIndex for str {
    fn position_in(&self, description: &RowDescription) -> Result<usize> {
        description.position(self)
    }
}

impl ColumnIndex for String {
    fn position_in(&self, description: &RowDescription) -> Result<usize> {
        description.position(self)
    }
}

impl<T: ColumnIndex + ?Sized> ColumnIndex for &T {
    fn position_in(&self, description: &RowDescription) -> Result<usize> {
        (**self).position_in(description)
    }
}

/// A converted row bound to the description that shaped it.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    description: Arc<RowDescription>,
    values: Vec<Value>,
}

impl Row {
    /// Create a row. `values` must match the description column for column.
    pub fn new(description: Arc<RowDescription>, values: Vec<Value>) -> Result<Self> {
        if values.len() != description.len() {
            return Err(Error::Message(format!(
                "row has {} values but {} columns",
                values.len(),
                description.len()
            )));
        }
        Ok(Self {
            description,
            values,
        })
    }

    /// Convert a DataRow using each column's deserializer.
    pub fn from_data_row(description: &Arc<RowDescription>, data_row: &DataRow<'_>) -> Result<Self> {
        if data_row.len() != description.len() {
            return Err(Error::Message(format!(
                "DataRow has {} fields but RowDescription has {} columns",
                data_row.len(),
                description.len()
            )));
        }
        let values = description
            .iter()
            .zip(data_row.values())
            .map(|(column, bytes)| column.deserialize(*bytes))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            description: Arc::clone(description),
            values,
        })
    }

    /// Get a value by position or column name.
    pub fn get<I: ColumnIndex>(&self, index: I) -> Result<&Value> {
        let position = index.position_in(&self.description)?;
        self.values
            .get(position)
            .ok_or_else(|| Error::NotFound(format!("column {position}")))
    }

    pub fn description(&self) -> &Arc<RowDescription> {
        &self.description
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values keyed by column name.
    pub fn to_map(&self) -> Result<HashMap<&str, &Value>> {
        let mut map = HashMap::with_capacity(self.values.len());
        for (column, value) in self.description.iter().zip(&self.values) {
            if map.insert(column.name(), value).is_some() {
                return Err(Error::DuplicateColumnName(column.name().to_string()));
            }
        }
        Ok(map)
    }
}
