//! Error types for configuration, transform application and model initialization.
//!
//! Every error is `Clone`: a model whose initialization failed keeps the
//! original error and hands a copy back on every later use.

use thiserror::Error;

/// Fatal configuration problem, raised while building filters or while
/// reverse-engineering the schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A glob pattern could not be compiled.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A mapping key contained more than one dot.
    #[error("invalid configuration key: {prefix}.{key}")]
    InvalidMappingKey { prefix: String, key: String },

    /// A transform token resolved to nothing known.
    #[error("{prefix}: cannot find stock filter for value: {token}")]
    UnknownTransform { prefix: String, token: String },

    /// A `/search/replace/` token was malformed.
    #[error("invalid regex replacement rule, expecting /search/replace/: {rule} ({reason})")]
    InvalidRegexRule { rule: String, reason: String },

    /// A `type:<name>` key named no known value type.
    #[error("{prefix}: unknown value type in key '{key}'")]
    UnknownValueType { prefix: String, key: String },

    #[error("invalid inflector: {0}")]
    Inflector(String),

    #[error("cryptograph error: {0}")]
    Cryptograph(String),

    /// Two SQL columns translate to the same logical column name.
    #[error("column name collision: {entity}.{column} mapped on {first} and on {second}")]
    ColumnCollision {
        entity: String,
        column: String,
        first: String,
        second: String,
    },

    /// An entity explicitly references a table absent from the database.
    #[error("entity {entity}: table or view '{table}' does not exist")]
    MissingTable { entity: String, table: String },

    /// Two declared entities reference the same table.
    #[error("entity table name collision: entities {first} and {second} both reference table {table}")]
    SharedTable {
        first: String,
        second: String,
        table: String,
    },

    /// One entity would map two distinct tables.
    #[error("entity table name collision: entity {entity} maps both tables {bound} and {table}")]
    TableRebind {
        entity: String,
        bound: String,
        table: String,
    },

    /// A primary key is declared but its columns could not be resolved.
    #[error("entity {entity}: primary key declared but not backed by columns of table {}", .table.as_deref().unwrap_or("<none>"))]
    UnresolvedPrimaryKey {
        entity: String,
        table: Option<String>,
    },

    #[error("entity {0} is declared twice")]
    DuplicateEntity(String),

    #[error("{0}")]
    Invalid(String),
}

/// Failure while applying a transform to a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("cipher error: {0}")]
    Cipher(String),

    #[error("decoding error: {0}")]
    Decode(String),

    #[error("no cryptograph configured for transform {0}")]
    MissingCryptograph(String),

    /// Error reported by a user-registered transform or lookup.
    #[error("transform {name} failed: {reason}")]
    Failed { name: String, reason: String },
}

/// Top-level error surfaced by the model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("data error: {0}")]
    Transform(#[from] TransformError),

    /// Database metadata could not be read.
    #[error("metadata error: {0}")]
    Metadata(String),

    #[error("model is not initialized")]
    NotInitialized,
}

impl ModelError {
    /// Whether this error aborts model initialization (as opposed to a
    /// data error the caller may retry).
    pub fn is_configuration(&self) -> bool {
        matches!(self, ModelError::Config(_))
    }
}

impl From<diesel::result::Error> for ModelError {
    fn from(err: diesel::result::Error) -> Self {
        ModelError::Metadata(err.to_string())
    }
}

impl From<r2d2::Error> for ModelError {
    fn from(err: r2d2::Error) -> Self {
        ModelError::Metadata(format!("connection pool: {}", err))
    }
}
