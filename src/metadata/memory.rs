//! Metadata provider over a schema declared in code.

use crate::error::ModelError;
use crate::metadata::{ColumnInfo, ForeignKey, MetadataProvider};
use indexmap::IndexMap;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
struct TableDef {
    columns: Vec<ColumnInfo>,
    primary_key: Vec<String>,
}

/// In-memory schema, built with chained calls.
///
/// # Example
///
/// ```
/// use relmodel::metadata::{ColumnInfo, InMemoryMetadata, MetadataProvider};
///
/// let mut schema = InMemoryMetadata::new()
///     .table("publisher", vec![ColumnInfo::new("publisher_id", "serial").generated()])
///     .primary_key("publisher", &["publisher_id"]);
/// assert_eq!(schema.list_tables().unwrap(), vec!["publisher".to_string()]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetadata {
    tables: IndexMap<String, TableDef>,
    foreign_keys: IndexMap<String, Vec<ForeignKey>>,
    enums: HashMap<(String, String), Vec<String>>,
    failing_table: Option<String>,
    busy_depth: usize,
    busy_passes: usize,
    calls: usize,
    idle_calls: usize,
}

impl InMemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a table with its columns.
    pub fn table(mut self, name: &str, columns: Vec<ColumnInfo>) -> Self {
        self.tables.entry(name.to_string()).or_default().columns = columns;
        self
    }

    pub fn primary_key(mut self, table: &str, columns: &[&str]) -> Self {
        self.tables.entry(table.to_string()).or_default().primary_key =
            columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Declare that `fk_columns` of `fk_table` reference the primary key of
    /// `pk_table`.
    pub fn foreign_key(mut self, fk_table: &str, fk_columns: &[&str], pk_table: &str) -> Self {
        self.foreign_keys
            .entry(pk_table.to_string())
            .or_default()
            .push(ForeignKey::new(fk_table, fk_columns));
        self
    }

    pub fn enum_values(mut self, table: &str, column: &str, values: &[&str]) -> Self {
        self.enums.insert(
            (table.to_string(), column.to_string()),
            values.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    /// Make every metadata call about `table` fail.
    pub fn failing_on(mut self, table: &str) -> Self {
        self.failing_table = Some(table.to_string());
        self
    }

    pub fn is_busy(&self) -> bool {
        self.busy_depth > 0
    }

    /// Number of completed busy passes.
    pub fn busy_passes(&self) -> usize {
        self.busy_passes
    }

    /// Total number of metadata calls.
    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Metadata calls made outside of a busy pass.
    pub fn idle_calls(&self) -> usize {
        self.idle_calls
    }

    fn record(&mut self, table: Option<&str>) -> Result<(), ModelError> {
        self.calls += 1;
        if self.busy_depth == 0 {
            self.idle_calls += 1;
        }
        match (table, &self.failing_table) {
            (Some(table), Some(failing)) if table == failing => {
                Err(ModelError::Metadata(format!("cannot read metadata of table {}", table)))
            }
            _ => Ok(()),
        }
    }
}

impl MetadataProvider for InMemoryMetadata {
    fn list_tables(&mut self) -> Result<Vec<String>, ModelError> {
        self.record(None)?;
        Ok(self.tables.keys().cloned().collect())
    }

    fn list_columns(&mut self, table: &str) -> Result<Vec<ColumnInfo>, ModelError> {
        self.record(Some(table))?;
        Ok(self
            .tables
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    fn primary_key(&mut self, table: &str) -> Result<Vec<String>, ModelError> {
        self.record(Some(table))?;
        Ok(self
            .tables
            .get(table)
            .map(|t| t.primary_key.clone())
            .unwrap_or_default())
    }

    fn foreign_keys(&mut self, pk_table: &str) -> Result<Vec<ForeignKey>, ModelError> {
        self.record(Some(pk_table))?;
        Ok(self.foreign_keys.get(pk_table).cloned().unwrap_or_default())
    }

    fn describe_enum(&mut self, table: &str, column: &str) -> Result<Option<Vec<String>>, ModelError> {
        self.record(Some(table))?;
        Ok(self.enums.get(&(table.to_string(), column.to_string())).cloned())
    }

    fn enter_busy(&mut self) {
        self.busy_depth += 1;
    }

    fn leave_busy(&mut self) {
        if self.busy_depth > 0 {
            self.busy_depth -= 1;
            if self.busy_depth == 0 {
                self.busy_passes += 1;
            }
        }
    }
}
