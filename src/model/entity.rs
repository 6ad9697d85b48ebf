//! Entities: a table (or none), its columns, its key and its attributes.

use crate::error::{ConfigError, ModelError};
use crate::model::attribute::{Attribute, AttributeKind, AttributeOrigin, Query};
use crate::model::column::Column;
use crate::model::driver::DriverInfo;
use crate::transform::Transform;
use dashmap::DashMap;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Set of column indices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ColumnMask {
    bits: Vec<u64>,
}

impl ColumnMask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_indices<I: IntoIterator<Item = usize>>(indices: I) -> Self {
        let mut mask = Self::new();
        for index in indices {
            mask.set(index);
        }
        mask
    }

    pub fn set(&mut self, index: usize) {
        let word = index / 64;
        if self.bits.len() <= word {
            self.bits.resize(word + 1, 0);
        }
        self.bits[word] |= 1 << (index % 64);
    }

    pub fn contains(&self, index: usize) -> bool {
        self.bits
            .get(index / 64)
            .map(|w| w & (1 << (index % 64)) != 0)
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|w| *w == 0)
    }

    /// Set indices, ascending.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter().enumerate().flat_map(|(word, bits)| {
            (0..64).filter_map(move |bit| (bits & (1 << bit) != 0).then_some(word * 64 + bit))
        })
    }
}

/// Resolution state of an entity's primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyState {
    /// No key declared or discovered.
    Absent,
    /// Key declared, but some of its columns do not exist.
    Unresolved,
    /// Column indices of the key, in key order.
    Resolved(Vec<usize>),
}

#[derive(Debug, Clone, Default)]
struct Crud {
    iterate: Option<Arc<Attribute>>,
    count: Option<Arc<Attribute>>,
    fetch: Option<Arc<Attribute>>,
    delete: Option<Arc<Attribute>>,
    update: Option<Arc<Attribute>>,
}

#[derive(Debug)]
pub struct Entity {
    name: String,
    table: Option<String>,
    explicit_table: bool,
    sql_primary_key: Option<Vec<String>>,
    key: KeyState,
    columns: IndexMap<String, Column>,
    /// SQL column name to logical name.
    columns_mapping: HashMap<String, String>,
    attributes: IndexMap<String, Arc<Attribute>>,
    crud: Crud,
    insert_cache: DashMap<ColumnMask, Arc<Attribute>>,
    driver: Arc<DriverInfo>,
    default_column_filter: Transform<String>,
}

impl Entity {
    pub fn new(name: impl Into<String>, driver: Arc<DriverInfo>) -> Self {
        Self {
            name: name.into(),
            table: None,
            explicit_table: false,
            sql_primary_key: None,
            key: KeyState::Absent,
            columns: IndexMap::new(),
            columns_mapping: HashMap::new(),
            attributes: IndexMap::new(),
            crud: Crud::default(),
            insert_cache: DashMap::new(),
            driver,
            default_column_filter: Transform::identity(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bound table, `None` for a virtual entity.
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Whether the table was set by configuration rather than discovered.
    pub fn has_explicit_table(&self) -> bool {
        self.explicit_table
    }

    pub fn set_table(&mut self, table: Option<String>, explicit: bool) {
        self.table = table;
        self.explicit_table = explicit && self.table.is_some();
    }

    pub fn sql_primary_key(&self) -> Option<&[String]> {
        self.sql_primary_key.as_deref()
    }

    pub fn set_sql_primary_key(&mut self, key: Vec<String>) {
        self.sql_primary_key = if key.is_empty() { None } else { Some(key) };
    }

    pub fn key_state(&self) -> &KeyState {
        &self.key
    }

    pub(crate) fn set_default_column_filter(&mut self, filter: Transform<String>) {
        self.default_column_filter = filter;
    }

    /// Primary key columns in key order.
    ///
    /// # Returns
    /// * `Ok(columns)` - the key columns, empty when the entity has no key
    /// * `Err(ConfigError::UnresolvedPrimaryKey)` - a key is declared but not
    ///   backed by the entity's columns
    pub fn primary_key(&self) -> Result<Vec<&Column>, ConfigError> {
        match &self.key {
            KeyState::Absent => Ok(Vec::new()),
            KeyState::Unresolved => Err(self.unresolved_key()),
            KeyState::Resolved(indices) => indices
                .iter()
                .map(|i| self.column_by_index(*i).ok_or_else(|| self.unresolved_key()))
                .collect(),
        }
    }

    fn unresolved_key(&self) -> ConfigError {
        ConfigError::UnresolvedPrimaryKey {
            entity: self.name.clone(),
            table: self.table.clone(),
        }
    }

    /// Add a column; its index is its position.
    pub fn add_column(&mut self, mut column: Column) -> Result<(), ConfigError> {
        if let Some(existing) = self.columns.get(&column.name) {
            let table = self.table.as_deref().unwrap_or(&self.name);
            return Err(ConfigError::ColumnCollision {
                entity: self.name.clone(),
                column: column.name.clone(),
                first: format!("{}.{}", table, existing.sql_name),
                second: format!("{}.{}", table, column.sql_name),
            });
        }
        column.set_index(self.columns.len());
        self.columns_mapping
            .insert(column.sql_name.clone(), column.name.clone());
        self.columns.insert(column.name.clone(), column);
        Ok(())
    }

    pub fn clear_columns(&mut self) {
        self.columns.clear();
        self.columns_mapping.clear();
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.values()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Column by logical name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column_by_sql_name(&self, sql_name: &str) -> Option<&Column> {
        self.columns_mapping
            .get(sql_name)
            .and_then(|name| self.columns.get(name))
    }

    pub fn column_by_index(&self, index: usize) -> Option<&Column> {
        self.columns.get_index(index).map(|(_, c)| c)
    }

    /// Logical name of a SQL column: the mapped name of a known column,
    /// otherwise the default column filter applied to it.
    pub fn translate_column_name(&self, sql_name: &str) -> Result<String, ModelError> {
        match self.columns_mapping.get(sql_name) {
            Some(name) => Ok(name.clone()),
            None => Ok(self.default_column_filter.apply(sql_name.to_string())?),
        }
    }

    /// Mask of the primary key columns.
    pub fn key_mask(&self) -> ColumnMask {
        match &self.key {
            KeyState::Resolved(indices) => ColumnMask::from_indices(indices.iter().copied()),
            _ => ColumnMask::new(),
        }
    }

    /// Mask of every column outside of the primary key.
    pub fn non_key_mask(&self) -> ColumnMask {
        ColumnMask::from_indices(
            self.columns
                .values()
                .filter(|c| !c.is_key_column())
                .map(Column::index),
        )
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Arc<Attribute>> {
        self.attributes.values()
    }

    pub fn attribute(&self, name: &str) -> Option<&Arc<Attribute>> {
        self.attributes.get(name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Add an attribute, replacing any attribute of the same name.
    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.attributes
            .insert(attribute.name.clone(), Arc::new(attribute));
    }

    pub fn iterate_attribute(&self) -> Option<&Arc<Attribute>> {
        self.crud.iterate.as_ref()
    }

    pub fn count_attribute(&self) -> Option<&Arc<Attribute>> {
        self.crud.count.as_ref()
    }

    pub fn fetch_attribute(&self) -> Option<&Arc<Attribute>> {
        self.crud.fetch.as_ref()
    }

    pub fn delete_attribute(&self) -> Option<&Arc<Attribute>> {
        self.crud.delete.as_ref()
    }

    pub fn update_attribute(&self) -> Option<&Arc<Attribute>> {
        self.crud.update.as_ref()
    }

    fn quote(&self, id: &str) -> String {
        self.driver.quote_identifier(id)
    }

    /// Resolve the primary key and build the generated CRUD attributes.
    /// Entities without a table are left as they are.
    pub fn initialize(&mut self) {
        let table = match &self.table {
            Some(table) => self.quote(table),
            None => return,
        };
        self.crud = Crud::default();
        self.insert_cache.clear();

        let mut iterate = Query::new();
        iterate.push_text(&format!("SELECT * FROM {}", table));
        self.crud.iterate = Some(Arc::new(
            Attribute::new("iterate", AttributeKind::Rowset, iterate, AttributeOrigin::Generated)
                .returning(self.name.clone()),
        ));

        let mut count = Query::new();
        count.push_text(&format!("SELECT COUNT(*) FROM {}", table));
        self.crud.count = Some(Arc::new(Attribute::new(
            "count",
            AttributeKind::Scalar,
            count,
            AttributeOrigin::Generated,
        )));

        self.key = self.resolve_key();
        if !matches!(self.key, KeyState::Resolved(_)) {
            return;
        }

        let mut fetch = Query::new();
        fetch.push_text(&format!("SELECT * FROM {} WHERE ", table));
        self.push_key_predicate(&mut fetch);
        self.crud.fetch = Some(Arc::new(
            Attribute::new("fetch", AttributeKind::Row, fetch, AttributeOrigin::Generated)
                .returning(self.name.clone()),
        ));

        let mut delete = Query::new();
        delete.push_text(&format!("DELETE FROM {} WHERE ", table));
        self.push_key_predicate(&mut delete);
        self.crud.delete = Some(Arc::new(Attribute::new(
            "delete",
            AttributeKind::Action,
            delete,
            AttributeOrigin::Generated,
        )));

        let mut update = Query::new();
        update
            .push_text(&format!("UPDATE {} SET ", table))
            .push_dynamic()
            .push_text(" WHERE ");
        self.push_key_predicate(&mut update);
        self.crud.update = Some(Arc::new(Attribute::new(
            "update",
            AttributeKind::Action,
            update,
            AttributeOrigin::Generated,
        )));
    }

    fn resolve_key(&mut self) -> KeyState {
        let sql_key = match &self.sql_primary_key {
            Some(key) if !key.is_empty() => key.clone(),
            _ => return KeyState::Absent,
        };
        let mut indices = Vec::with_capacity(sql_key.len());
        for sql in &sql_key {
            match self.column_by_sql_name(sql) {
                Some(column) => indices.push(column.index()),
                None => {
                    tracing::error!(
                        "entity {} has invalid primary key configuration: column {} is missing",
                        self.name,
                        sql
                    );
                    return KeyState::Unresolved;
                }
            }
        }
        for column in self.columns.values_mut() {
            if indices.contains(&column.index()) {
                column.set_key_column();
            }
        }
        KeyState::Resolved(indices)
    }

    fn push_key_predicate(&self, query: &mut Query) {
        let markers = self.driver.uses_column_markers();
        let KeyState::Resolved(indices) = &self.key else {
            return;
        };
        for (i, column) in indices.iter().filter_map(|i| self.column_by_index(*i)).enumerate() {
            if i > 0 {
                query.push_text(" AND ");
            }
            query
                .push_text(&format!("{} = ", self.quote(&column.sql_name)))
                .push_param(&column.name);
            if markers && column.type_name != "serial" {
                query.push_text(&format!("::{}", column.type_name));
            }
        }
    }

    /// Insert action for the columns of `mask`, built once per mask.
    ///
    /// # Returns
    /// * `None` - the entity has no table, or the mask selects no column
    pub fn insert_attribute(&self, mask: &ColumnMask) -> Option<Arc<Attribute>> {
        let table = self.table.as_ref()?;
        if let Some(cached) = self.insert_cache.get(mask) {
            return Some(Arc::clone(cached.value()));
        }
        let columns: Vec<&Column> = mask.iter().filter_map(|i| self.column_by_index(i)).collect();
        if columns.is_empty() {
            return None;
        }

        let mut query = Query::new();
        let names: Vec<String> = columns.iter().map(|c| self.quote(&c.sql_name)).collect();
        query.push_text(&format!(
            "INSERT INTO {}({}) VALUES (",
            self.quote(table),
            names.join(", ")
        ));
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                query.push_text(", ");
            }
            query.push_param(&column.name);
        }
        query.push_text(")");

        let mut insert = Attribute::new("insert", AttributeKind::Action, query, AttributeOrigin::Generated);
        if let Ok(key) = self.primary_key() {
            if let [column] = key.as_slice() {
                if column.generated {
                    insert.generated_key_column = Some(column.sql_name.clone());
                }
            }
        }
        let insert = Arc::new(insert);
        self.insert_cache.insert(mask.clone(), Arc::clone(&insert));
        Some(insert)
    }

    /// Row attribute on this (referencing) entity toward the row of
    /// `pk_entity` its foreign key points to.
    ///
    /// # Returns
    /// * `Ok(None)` - the referenced entity lacks a key or a table
    pub fn upstream_join(
        &self,
        name: &str,
        pk_entity: &Entity,
        fk_columns: &[String],
    ) -> Result<Option<Attribute>, ModelError> {
        let (pk_columns, pk_table) = match (pk_entity.sql_primary_key(), pk_entity.table()) {
            (Some(key), Some(table)) => (key, table),
            (None, _) => {
                tracing::warn!(
                    "cannot declare upstream join {}.{}: target entity {} has no primary key",
                    self.name,
                    name,
                    pk_entity.name
                );
                return Ok(None);
            }
            (_, None) => {
                tracing::warn!(
                    "cannot declare upstream join {}.{}: target entity {} has no table",
                    self.name,
                    name,
                    pk_entity.name
                );
                return Ok(None);
            }
        };
        let mut query = Query::new();
        query.push_text(&format!("SELECT * FROM {} WHERE ", self.quote(pk_table)));
        for (i, (pk, fk)) in pk_columns.iter().zip(fk_columns).enumerate() {
            if i > 0 {
                query.push_text(" AND ");
            }
            query
                .push_text(&format!("{} = ", self.quote(pk)))
                .push_param(&self.translate_column_name(fk)?);
        }
        Ok(Some(
            Attribute::new(name, AttributeKind::Row, query, AttributeOrigin::Upstream)
                .returning(pk_entity.name.clone()),
        ))
    }

    /// Rowset attribute on this (referenced) entity toward every row of
    /// `fk_entity` referencing it.
    ///
    /// # Returns
    /// * `Ok(None)` - this entity lacks a key, or the referencing one a table
    pub fn downstream_join(
        &self,
        name: &str,
        fk_entity: &Entity,
        fk_columns: &[String],
    ) -> Result<Option<Attribute>, ModelError> {
        let pk_columns = match self.sql_primary_key() {
            Some(key) => key,
            None => {
                tracing::warn!(
                    "cannot declare downstream join {}.{}: source entity has no primary key",
                    self.name,
                    name
                );
                return Ok(None);
            }
        };
        let Some(fk_table) = fk_entity.table() else {
            tracing::warn!(
                "cannot declare downstream join {}.{}: target entity {} has no table",
                self.name,
                name,
                fk_entity.name
            );
            return Ok(None);
        };
        let mut query = Query::new();
        query.push_text(&format!("SELECT * FROM {} WHERE ", self.quote(fk_table)));
        for (i, (pk, fk)) in pk_columns.iter().zip(fk_columns).enumerate() {
            if i > 0 {
                query.push_text(" AND ");
            }
            query
                .push_text(&format!("{} = ", self.quote(fk)))
                .push_param(&self.translate_column_name(pk)?);
        }
        Ok(Some(
            Attribute::new(name, AttributeKind::Rowset, query, AttributeOrigin::Downstream)
                .returning(fk_entity.name.clone()),
        ))
    }

    /// Rowset attribute on this entity toward the rows of `right` linked to
    /// it through the junction entity `join`.
    pub fn extended_join(
        &self,
        name: &str,
        left_fk: &[String],
        join: &Entity,
        right_fk: &[String],
        right: &Entity,
    ) -> Result<Option<Attribute>, ModelError> {
        let (Some(left_pk), Some(right_pk)) = (self.sql_primary_key(), right.sql_primary_key()) else {
            tracing::warn!(
                "cannot declare extended join {}.{}: {} or {} has no primary key",
                self.name,
                name,
                self.name,
                right.name
            );
            return Ok(None);
        };
        let (Some(join_table), Some(right_table)) = (join.table(), right.table()) else {
            tracing::warn!(
                "cannot declare extended join {}.{}: join or right entity has no table",
                self.name,
                name
            );
            return Ok(None);
        };
        let join_table = self.quote(join_table);
        let right_table = self.quote(right_table);
        let mut query = Query::new();
        query.push_text(&format!(
            "SELECT {}.* FROM {} JOIN {} ON ",
            right_table, join_table, right_table
        ));
        for (i, (pk, fk)) in right_pk.iter().zip(right_fk).enumerate() {
            if i > 0 {
                query.push_text(" AND ");
            }
            query.push_text(&format!(
                "{}.{} = {}.{}",
                right_table,
                self.quote(pk),
                join_table,
                self.quote(fk)
            ));
        }
        query.push_text(" WHERE ");
        for (i, (pk, fk)) in left_pk.iter().zip(left_fk).enumerate() {
            if i > 0 {
                query.push_text(" AND ");
            }
            query
                .push_text(&format!("{} = ", self.quote(fk)))
                .push_param(&self.translate_column_name(pk)?);
        }
        Ok(Some(
            Attribute::new(name, AttributeKind::Rowset, query, AttributeOrigin::ExtendedJoin)
                .returning(right.name.clone()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ColumnInfo;
    use crate::model::driver::PlaceholderStyle;
    use pretty_assertions::assert_eq;

    fn book(driver: DriverInfo) -> Entity {
        let mut entity = Entity::new("book", Arc::new(driver));
        entity.set_table(Some("book".to_string()), true);
        entity
            .add_column(Column::new("bookId", &ColumnInfo::new("book_id", "serial").generated()))
            .unwrap();
        entity
            .add_column(Column::new("title", &ColumnInfo::new("title", "varchar")))
            .unwrap();
        entity
            .add_column(Column::new("publisherId", &ColumnInfo::new("publisher_id", "int4")))
            .unwrap();
        entity.set_sql_primary_key(vec!["book_id".to_string()]);
        entity
    }

    #[test]
    fn test_column_mask() {
        let mask = ColumnMask::from_indices([0, 2, 70]);
        assert!(mask.contains(70));
        assert!(!mask.contains(1));
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![0, 2, 70]);
        assert!(ColumnMask::new().is_empty());
    }

    #[test]
    fn test_generated_crud() {
        let mut entity = book(DriverInfo::for_tag("postgresql"));
        entity.initialize();
        let q = PlaceholderStyle::Question;
        assert_eq!(
            entity.iterate_attribute().unwrap().query.render(q),
            "SELECT * FROM \"book\""
        );
        assert_eq!(
            entity.count_attribute().unwrap().query.render(q),
            "SELECT COUNT(*) FROM \"book\""
        );
        assert_eq!(
            entity.fetch_attribute().unwrap().query.to_string(),
            "SELECT * FROM \"book\" WHERE \"book_id\" = <bookId>"
        );
        assert_eq!(
            entity.delete_attribute().unwrap().query.render(PlaceholderStyle::Numbered),
            "DELETE FROM \"book\" WHERE \"book_id\" = $1"
        );
        assert_eq!(
            entity.update_attribute().unwrap().query.to_string(),
            "UPDATE \"book\" SET {set} WHERE \"book_id\" = <bookId>"
        );
        assert!(entity.column("bookId").unwrap().is_key_column());
        assert_eq!(entity.key_mask(), ColumnMask::from_indices([0]));
        assert_eq!(entity.non_key_mask(), ColumnMask::from_indices([1, 2]));
    }

    #[test]
    fn test_column_markers() {
        let driver = DriverInfo {
            strict_column_types: true,
            column_markers: true,
            ..DriverInfo::for_tag("postgresql")
        };
        let mut entity = Entity::new("tag", Arc::new(driver));
        entity.set_table(Some("tag".to_string()), false);
        entity
            .add_column(Column::new("code", &ColumnInfo::new("code", "varchar")))
            .unwrap();
        entity.set_sql_primary_key(vec!["code".to_string()]);
        entity.initialize();
        assert_eq!(
            entity.fetch_attribute().unwrap().query.to_string(),
            "SELECT * FROM \"tag\" WHERE \"code\" = <code>::varchar"
        );
    }

    #[test]
    fn test_insert_is_cached_per_mask() {
        let mut entity = book(DriverInfo::for_tag("postgresql"));
        entity.initialize();
        let mask = entity.non_key_mask();
        let insert = entity.insert_attribute(&mask).unwrap();
        assert_eq!(
            insert.query.to_string(),
            "INSERT INTO \"book\"(\"title\", \"publisher_id\") VALUES (<title>, <publisherId>)"
        );
        assert_eq!(insert.generated_key_column.as_deref(), Some("book_id"));
        let again = entity.insert_attribute(&mask).unwrap();
        assert!(Arc::ptr_eq(&insert, &again));
        assert!(entity.insert_attribute(&ColumnMask::new()).is_none());
    }

    #[test]
    fn test_unresolved_primary_key() {
        let mut entity = book(DriverInfo::default());
        entity.set_sql_primary_key(vec!["isbn".to_string()]);
        entity.initialize();
        assert_eq!(entity.key_state(), &KeyState::Unresolved);
        assert!(entity.fetch_attribute().is_none());
        assert_eq!(
            entity.primary_key().unwrap_err(),
            ConfigError::UnresolvedPrimaryKey {
                entity: "book".to_string(),
                table: Some("book".to_string()),
            }
        );
    }

    #[test]
    fn test_column_collision() {
        let mut entity = book(DriverInfo::default());
        let err = entity
            .add_column(Column::new("title", &ColumnInfo::new("TITLE", "varchar")))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::ColumnCollision {
                entity: "book".to_string(),
                column: "title".to_string(),
                first: "book.title".to_string(),
                second: "book.TITLE".to_string(),
            }
        );
    }

    #[test]
    fn test_translate_column_name() {
        let mut entity = book(DriverInfo::default());
        entity.set_default_column_filter(Transform::new("upper", |s: String| Ok(s.to_uppercase())));
        assert_eq!(entity.translate_column_name("publisher_id").unwrap(), "publisherId");
        assert_eq!(entity.translate_column_name("isbn").unwrap(), "ISBN");
    }
}
