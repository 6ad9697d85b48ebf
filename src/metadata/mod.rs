//! Schema metadata access.
//!
//! Reverse engineering reads the live schema exclusively through
//! [`MetadataProvider`]. The `db` module implements it over
//! `information_schema`; [`InMemoryMetadata`] serves declared schemas.

pub mod memory;

pub use memory::InMemoryMetadata;

use crate::error::ModelError;
use crate::value::ValueType;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};

/// Column description as reported by the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub sql_name: String,
    /// Vendor type name (`int4`, `varchar`, `serial`, ...).
    pub type_name: String,
    pub size: Option<u32>,
    /// Value generated by the database (serial, identity, auto increment).
    pub generated: bool,
    /// Column of an enumerated type, whose values `describe_enum` lists.
    pub is_enum: bool,
}

impl ColumnInfo {
    pub fn new(sql_name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            sql_name: sql_name.into(),
            type_name: type_name.into(),
            size: None,
            generated: false,
            is_enum: false,
        }
    }

    pub fn generated(mut self) -> Self {
        self.generated = true;
        self
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn enumeration(mut self) -> Self {
        self.is_enum = true;
        self
    }

    /// Value type of the column's values, from its vendor type name.
    pub fn value_type(&self) -> ValueType {
        sql_value_type(&self.type_name)
    }
}

/// Value type corresponding to a vendor SQL type name.
pub fn sql_value_type(type_name: &str) -> ValueType {
    let lower = type_name.to_ascii_lowercase();
    let base = lower.split('(').next().unwrap_or("").trim();
    match base {
        "bool" | "boolean" | "bit" => ValueType::Boolean,
        "int" | "int2" | "int4" | "int8" | "integer" | "smallint" | "bigint" | "tinyint"
        | "mediumint" | "serial" | "serial4" | "bigserial" | "serial8" | "smallserial" => {
            ValueType::Integer
        }
        "float" | "float4" | "float8" | "real" | "double" | "double precision" => ValueType::Float,
        "numeric" | "decimal" | "money" => ValueType::Number,
        "date" => ValueType::Date,
        "timestamp" | "timestamptz" | "datetime" | "timestamp without time zone"
        | "timestamp with time zone" => ValueType::Timestamp,
        "time" | "timetz" | "interval" => ValueType::Temporal,
        "bytea" | "blob" | "binary" | "varbinary" | "longblob" | "mediumblob" => ValueType::Bytes,
        "char" | "varchar" | "character varying" | "character" | "text" | "bpchar" | "name"
        | "longtext" | "mediumtext" | "tinytext" | "uuid" | "json" | "jsonb" | "xml" | "enum" => {
            ValueType::Text
        }
        _ => ValueType::Any,
    }
}

/// A foreign key referencing some table's primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Table holding the foreign key.
    pub fk_table: String,
    /// Foreign key columns, in the order of the referenced primary key.
    pub fk_columns: Vec<String>,
}

impl ForeignKey {
    pub fn new(fk_table: impl Into<String>, fk_columns: &[&str]) -> Self {
        Self {
            fk_table: fk_table.into(),
            fk_columns: fk_columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Accessor to the live database schema.
pub trait MetadataProvider {
    /// Names of all tables and views.
    fn list_tables(&mut self) -> Result<Vec<String>, ModelError>;

    /// Columns of `table` in ordinal order; empty when the table does not
    /// exist.
    fn list_columns(&mut self, table: &str) -> Result<Vec<ColumnInfo>, ModelError>;

    /// Primary key columns of `table`, empty when it has none.
    fn primary_key(&mut self, table: &str) -> Result<Vec<String>, ModelError>;

    /// Every foreign key referencing the primary key of `pk_table`.
    fn foreign_keys(&mut self, pk_table: &str) -> Result<Vec<ForeignKey>, ModelError>;

    /// Allowed values of an enumerated column, when the driver knows them.
    fn describe_enum(&mut self, _table: &str, _column: &str) -> Result<Option<Vec<String>>, ModelError> {
        Ok(None)
    }

    /// Mark the underlying connection busy for a multi-step pass.
    fn enter_busy(&mut self) {}

    fn leave_busy(&mut self) {}
}

/// Keeps a provider in its busy state for the guard's lifetime. Leaving the
/// busy state happens on drop, on every exit path.
pub struct BusyGuard<'a, P: MetadataProvider + ?Sized> {
    provider: &'a mut P,
}

impl<'a, P: MetadataProvider + ?Sized> BusyGuard<'a, P> {
    pub fn new(provider: &'a mut P) -> Self {
        provider.enter_busy();
        Self { provider }
    }
}

impl<P: MetadataProvider + ?Sized> Deref for BusyGuard<'_, P> {
    type Target = P;

    fn deref(&self) -> &P {
        self.provider
    }
}

impl<P: MetadataProvider + ?Sized> DerefMut for BusyGuard<'_, P> {
    fn deref_mut(&mut self) -> &mut P {
        self.provider
    }
}

impl<P: MetadataProvider + ?Sized> Drop for BusyGuard<'_, P> {
    fn drop(&mut self) {
        self.provider.leave_busy();
    }
}
