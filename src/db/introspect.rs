//! Schema metadata read from `information_schema` through diesel.

use crate::db::database::PooledConnection;
use crate::error::ModelError;
use crate::metadata::{ColumnInfo, ForeignKey, MetadataProvider};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Nullable, Text};
use indexmap::IndexMap;

#[cfg(feature = "postgres")]
mod sql {
    pub const DEFAULT_SCHEMA: &str = "SELECT current_schema()::text AS name";

    pub const LIST_TABLES: &str = "SELECT table_name::text AS name \
        FROM information_schema.tables \
        WHERE table_schema = $1 \
        ORDER BY table_name";

    pub const LIST_COLUMNS: &str = "SELECT column_name::text AS column_name, \
        udt_name::text AS type_name, \
        character_maximum_length::bigint AS size, \
        CASE WHEN is_identity = 'YES' OR column_default LIKE 'nextval(%' THEN 'YES' ELSE 'NO' END AS generated, \
        CASE WHEN data_type = 'USER-DEFINED' THEN 'YES' ELSE 'NO' END AS is_enum \
        FROM information_schema.columns \
        WHERE table_schema = $1 AND table_name = $2 \
        ORDER BY ordinal_position";

    pub const PRIMARY_KEY: &str = "SELECT kcu.column_name::text AS name \
        FROM information_schema.table_constraints tc \
        JOIN information_schema.key_column_usage kcu \
          ON kcu.constraint_schema = tc.constraint_schema AND kcu.constraint_name = tc.constraint_name \
        WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = $1 AND tc.table_name = $2 \
        ORDER BY kcu.ordinal_position";

    pub const FOREIGN_KEYS: &str = "SELECT kcu.table_name::text AS fk_table, \
        kcu.column_name::text AS fk_column, \
        kcu.constraint_name::text AS constraint_name \
        FROM information_schema.referential_constraints rc \
        JOIN information_schema.key_column_usage kcu \
          ON kcu.constraint_schema = rc.constraint_schema AND kcu.constraint_name = rc.constraint_name \
        JOIN information_schema.table_constraints pk \
          ON pk.constraint_schema = rc.unique_constraint_schema AND pk.constraint_name = rc.unique_constraint_name \
        WHERE pk.constraint_type = 'PRIMARY KEY' AND pk.table_schema = $1 AND pk.table_name = $2 \
        ORDER BY kcu.table_name, kcu.constraint_name, kcu.position_in_unique_constraint";

    pub const DESCRIBE_ENUM: &str = "SELECT e.enumlabel::text AS name \
        FROM pg_catalog.pg_enum e \
        JOIN pg_catalog.pg_type t ON t.oid = e.enumtypid \
        JOIN information_schema.columns c ON c.udt_name = t.typname \
        WHERE c.table_schema = $1 AND c.table_name = $2 AND c.column_name = $3 \
        ORDER BY e.enumsortorder";
}

#[cfg(feature = "mysql")]
mod sql {
    pub const DEFAULT_SCHEMA: &str = "SELECT DATABASE() AS name";

    pub const LIST_TABLES: &str = "SELECT table_name AS name \
        FROM information_schema.tables \
        WHERE table_schema = ? \
        ORDER BY table_name";

    pub const LIST_COLUMNS: &str = "SELECT column_name AS column_name, \
        data_type AS type_name, \
        CAST(character_maximum_length AS SIGNED) AS size, \
        CASE WHEN extra LIKE '%auto_increment%' THEN 'YES' ELSE 'NO' END AS generated, \
        CASE WHEN data_type = 'enum' THEN 'YES' ELSE 'NO' END AS is_enum \
        FROM information_schema.columns \
        WHERE table_schema = ? AND table_name = ? \
        ORDER BY ordinal_position";

    pub const PRIMARY_KEY: &str = "SELECT column_name AS name \
        FROM information_schema.key_column_usage \
        WHERE constraint_name = 'PRIMARY' AND table_schema = ? AND table_name = ? \
        ORDER BY ordinal_position";

    pub const FOREIGN_KEYS: &str = "SELECT table_name AS fk_table, \
        column_name AS fk_column, \
        constraint_name AS constraint_name \
        FROM information_schema.key_column_usage \
        WHERE referenced_table_schema = ? AND referenced_table_name = ? \
        ORDER BY table_name, constraint_name, position_in_unique_constraint";

    pub const DESCRIBE_ENUM: &str = "SELECT column_type AS name \
        FROM information_schema.columns \
        WHERE table_schema = ? AND table_name = ? AND column_name = ?";
}

#[derive(QueryableByName)]
struct NameRow {
    #[diesel(sql_type = Text)]
    name: String,
}

#[derive(QueryableByName)]
struct ColumnRow {
    #[diesel(sql_type = Text)]
    column_name: String,
    #[diesel(sql_type = Text)]
    type_name: String,
    #[diesel(sql_type = Nullable<BigInt>)]
    size: Option<i64>,
    #[diesel(sql_type = Text)]
    generated: String,
    #[diesel(sql_type = Text)]
    is_enum: String,
}

#[derive(QueryableByName)]
struct ForeignKeyRow {
    #[diesel(sql_type = Text)]
    fk_table: String,
    #[diesel(sql_type = Text)]
    fk_column: String,
    #[diesel(sql_type = Text)]
    constraint_name: String,
}

/// Metadata provider over one pooled connection.
///
/// The connection is held for the provider's lifetime, so a reverse
/// engineering pass runs entirely on it.
pub struct DieselMetadata {
    conn: PooledConnection,
    schema: String,
    busy: bool,
}

impl DieselMetadata {
    /// # Arguments
    /// * `conn` - connection taken from [`Database::get_connection`]
    /// * `schema` - schema to inspect, the connection's current one when `None`
    ///
    /// [`Database::get_connection`]: crate::db::Database::get_connection
    pub fn new(mut conn: PooledConnection, schema: Option<String>) -> Result<Self, ModelError> {
        let schema = match schema {
            Some(schema) => schema,
            None => diesel::sql_query(sql::DEFAULT_SCHEMA)
                .get_result::<NameRow>(&mut conn)?
                .name,
        };
        tracing::debug!("inspecting schema {}", schema);
        Ok(Self {
            conn,
            schema,
            busy: false,
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }
}

impl MetadataProvider for DieselMetadata {
    fn list_tables(&mut self) -> Result<Vec<String>, ModelError> {
        let rows = diesel::sql_query(sql::LIST_TABLES)
            .bind::<Text, _>(&self.schema)
            .load::<NameRow>(&mut self.conn)?;
        Ok(rows.into_iter().map(|r| r.name).collect())
    }

    fn list_columns(&mut self, table: &str) -> Result<Vec<ColumnInfo>, ModelError> {
        let rows = diesel::sql_query(sql::LIST_COLUMNS)
            .bind::<Text, _>(&self.schema)
            .bind::<Text, _>(table)
            .load::<ColumnRow>(&mut self.conn)?;
        Ok(rows
            .into_iter()
            .map(|r| ColumnInfo {
                sql_name: r.column_name,
                type_name: r.type_name,
                size: r.size.and_then(|s| u32::try_from(s).ok()),
                generated: r.generated == "YES",
                is_enum: r.is_enum == "YES",
            })
            .collect())
    }

    fn primary_key(&mut self, table: &str) -> Result<Vec<String>, ModelError> {
        let rows = diesel::sql_query(sql::PRIMARY_KEY)
            .bind::<Text, _>(&self.schema)
            .bind::<Text, _>(table)
            .load::<NameRow>(&mut self.conn)?;
        Ok(rows.into_iter().map(|r| r.name).collect())
    }

    fn foreign_keys(&mut self, pk_table: &str) -> Result<Vec<ForeignKey>, ModelError> {
        let rows = diesel::sql_query(sql::FOREIGN_KEYS)
            .bind::<Text, _>(&self.schema)
            .bind::<Text, _>(pk_table)
            .load::<ForeignKeyRow>(&mut self.conn)?;
        let mut grouped: IndexMap<(String, String), Vec<String>> = IndexMap::new();
        for row in rows {
            grouped
                .entry((row.fk_table, row.constraint_name))
                .or_default()
                .push(row.fk_column);
        }
        Ok(grouped
            .into_iter()
            .map(|((fk_table, _), fk_columns)| ForeignKey { fk_table, fk_columns })
            .collect())
    }

    fn describe_enum(&mut self, table: &str, column: &str) -> Result<Option<Vec<String>>, ModelError> {
        let rows = diesel::sql_query(sql::DESCRIBE_ENUM)
            .bind::<Text, _>(&self.schema)
            .bind::<Text, _>(table)
            .bind::<Text, _>(column)
            .load::<NameRow>(&mut self.conn)?;
        let values: Vec<String> = if cfg!(feature = "mysql") {
            rows.first()
                .map(|r| parse_enum_type(&r.name))
                .unwrap_or_default()
        } else {
            rows.into_iter().map(|r| r.name).collect()
        };
        Ok(if values.is_empty() { None } else { Some(values) })
    }

    fn enter_busy(&mut self) {
        tracing::debug!("metadata connection busy");
        self.busy = true;
    }

    fn leave_busy(&mut self) {
        tracing::debug!("metadata connection released");
        self.busy = false;
    }
}

/// Values of a MySQL `enum('a','b')` column type.
pub fn parse_enum_type(column_type: &str) -> Vec<String> {
    let inner = column_type
        .trim()
        .strip_prefix("enum(")
        .and_then(|s| s.strip_suffix(')'));
    let Some(inner) = inner else {
        return Vec::new();
    };
    let mut values = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('\'', false) => quoted = true,
            ('\'', true) if chars.peek() == Some(&'\'') => {
                current.push('\'');
                chars.next();
            }
            ('\'', true) => {
                quoted = false;
                values.push(std::mem::take(&mut current));
            }
            (c, true) => current.push(c),
            _ => {}
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_enum_type() {
        assert_eq!(parse_enum_type("enum('draft','published')"), vec!["draft", "published"]);
        assert_eq!(parse_enum_type("enum('it''s','a, b')"), vec!["it's", "a, b"]);
        assert!(parse_enum_type("varchar(20)").is_empty());
    }
}
