//! # relmodel: relational schema reverse engineering
//!
//! relmodel turns a live relational schema into entities, columns and
//! navigation attributes, translating SQL names and values through filters
//! configured with glob patterns.
//!
//! ## Features
//!
//! - **Pattern-keyed filters**: map `table` and `table.column` globs to chains of
//!   transforms, folded from the broadest to the most specific pattern
//! - **Identifier filters**: entity and attribute names from SQL names
//!   (`lowercase`, `snake_to_camel`, `/search/replace/`, plugins, lookups)
//! - **Value filters**: read and write transforms per column and per value type,
//!   including obfuscation through an AES-GCM cryptograph
//! - **Reverse engineering**: tables, columns, keys, upstream and downstream joins,
//!   and many-to-many joins through junction tables
//!
//! ## Example
//!
//! ```yaml
//! model_id: bookshelf
//! reverse: extended
//! identifiers:
//!   mapping: { "*": "lowercase", "*.*": "snake_to_camel" }
//! filters:
//!   read: { "user.password": "mask" }
//!   write: { "type:text": "no_html" }
//! ```
//!
//! ```
//! use relmodel::metadata::{ColumnInfo, InMemoryMetadata};
//! use relmodel::model::{Model, ReverseMode};
//!
//! let mut model = Model::new("bookshelf");
//! model.set_reverse_mode(ReverseMode::Full);
//!
//! let mut metadata = InMemoryMetadata::new()
//!     .table("publisher", vec![ColumnInfo::new("publisher_id", "serial").generated()])
//!     .primary_key("publisher", &["publisher_id"])
//!     .table("book", vec![
//!         ColumnInfo::new("book_id", "serial").generated(),
//!         ColumnInfo::new("publisher_id", "int4"),
//!     ])
//!     .primary_key("book", &["book_id"])
//!     .foreign_key("book", &["publisher_id"], "publisher");
//!
//! let schema = model.initialize(&mut metadata).unwrap();
//! assert!(schema.entity("book").unwrap().has_attribute("publisher"));
//! assert!(schema.entity("publisher").unwrap().has_attribute("books"));
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod filters;
pub mod metadata;
pub mod model;
pub mod pattern;
pub mod transform;
pub mod value;

pub use config::{EntityDecl, ModelConfig};
pub use error::{ConfigError, ModelError, TransformError};
pub use filters::{ConfigurableFilters, Filters, FiltersSet, IdentifiersFilters, ValueFilters};
pub use metadata::{ColumnInfo, ForeignKey, InMemoryMetadata, MetadataProvider};
pub use model::{Entity, Model, ReverseMode, Schema};
pub use pattern::Pattern;
pub use transform::{Filterable, Transform};
pub use value::{Value, ValueType};
