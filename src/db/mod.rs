//! Database access: the connection pool and the `information_schema`
//! metadata provider.

pub mod database;
pub mod introspect;

pub use database::{Database, DbConnection, Pool, PoolSettings, PooledConnection};
pub use introspect::DieselMetadata;
