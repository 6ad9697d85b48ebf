//! Entity columns.

use crate::error::TransformError;
use crate::metadata::ColumnInfo;
use crate::transform::Transform;
use crate::value::{Value, ValueType};

/// A column of an entity, with the value transforms applied when reading
/// from and writing to the database.
#[derive(Debug, Clone)]
pub struct Column {
    /// Logical (attribute) name.
    pub name: String,
    pub sql_name: String,
    pub type_name: String,
    pub size: Option<u32>,
    pub generated: bool,
    index: usize,
    key_column: bool,
    read_filter: Transform<Value>,
    write_filter: Transform<Value>,
    enum_values: Option<Vec<String>>,
}

impl Column {
    pub fn new(name: impl Into<String>, info: &ColumnInfo) -> Self {
        Self {
            name: name.into(),
            sql_name: info.sql_name.clone(),
            type_name: info.type_name.clone(),
            size: info.size,
            generated: info.generated,
            index: 0,
            key_column: false,
            read_filter: Transform::identity(),
            write_filter: Transform::identity(),
            enum_values: None,
        }
    }

    pub fn with_filters(mut self, read: Transform<Value>, write: Transform<Value>) -> Self {
        self.read_filter = read;
        self.write_filter = write;
        self
    }

    /// Ordinal position within the entity.
    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    pub fn is_key_column(&self) -> bool {
        self.key_column
    }

    pub(crate) fn set_key_column(&mut self) {
        self.key_column = true;
    }

    pub fn value_type(&self) -> ValueType {
        crate::metadata::sql_value_type(&self.type_name)
    }

    pub fn enum_values(&self) -> Option<&[String]> {
        self.enum_values.as_deref()
    }

    pub(crate) fn set_enum_values(&mut self, values: Vec<String>) {
        self.enum_values = Some(values);
    }

    pub fn read_filter(&self) -> &Transform<Value> {
        &self.read_filter
    }

    pub fn write_filter(&self) -> &Transform<Value> {
        &self.write_filter
    }

    /// Value read from the database, after the column read transform.
    pub fn read(&self, value: Value) -> Result<Value, TransformError> {
        self.read_filter.apply(value)
    }

    /// Value to write to the database, after the column write transform.
    pub fn write(&self, value: Value) -> Result<Value, TransformError> {
        self.write_filter.apply(value)
    }
}
