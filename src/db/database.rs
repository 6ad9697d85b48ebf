//! Pooled connections to the inspected database.

use crate::db::introspect::DieselMetadata;
use crate::error::ModelError;
use crate::model::DriverInfo;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "postgres")]
use diesel::pg::PgConnection;
#[cfg(feature = "postgres")]
pub type DbConnection = PgConnection;

#[cfg(feature = "mysql")]
use diesel::mysql::MysqlConnection;
#[cfg(feature = "mysql")]
pub type DbConnection = MysqlConnection;

pub type Pool = r2d2::Pool<ConnectionManager<DbConnection>>;
pub type PooledConnection = r2d2::PooledConnection<ConnectionManager<DbConnection>>;

/// Whether the compiled-in backend can talk to a database of driver `tag`.
#[cfg(feature = "postgres")]
fn backend_accepts(tag: &str) -> bool {
    tag == "postgresql"
}

#[cfg(feature = "mysql")]
fn backend_accepts(tag: &str) -> bool {
    matches!(tag, "mysql" | "mariadb")
}

/// Connection pool settings, the `pool` section of a model configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub min_idle: u32,
    pub connection_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        PoolSettings {
            max_connections: 2,           // metadata pass + connectivity check
            min_idle: 0,
            connection_timeout_secs: 30,
            idle_timeout_secs: 600,       // 10 min
            max_lifetime_secs: 1800,      // 30 min
        }
    }
}

/// Pool of connections to the database being reverse engineered.
#[derive(Clone)]
pub struct Database {
    pool: Arc<Pool>,
    driver: Arc<DriverInfo>,
}

impl Database {
    /// Open a pool on `database_url`.
    ///
    /// # Arguments
    /// * `database_url` - `postgres://...` or `mysql://...`, matching the
    ///   backend the crate was built with
    /// * `settings` - pool sizing and timeouts
    ///
    /// # Example
    /// ```ignore
    /// let db = Database::connect("postgres://localhost/bookshelf", &PoolSettings::default())?;
    /// let mut metadata = db.metadata(Some("public".to_string()))?;
    /// let schema = model.initialize(&mut metadata)?;
    /// ```
    pub fn connect(database_url: &str, settings: &PoolSettings) -> Result<Self, ModelError> {
        let driver = DriverInfo::from_url(database_url);
        if !backend_accepts(&driver.tag) {
            return Err(ModelError::Metadata(format!(
                "cannot open a {} database: relmodel was built for another backend",
                driver.tag
            )));
        }

        let pool = r2d2::Pool::builder()
            .max_size(settings.max_connections)
            .min_idle(Some(settings.min_idle))
            .connection_timeout(Duration::from_secs(settings.connection_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(settings.idle_timeout_secs)))
            .max_lifetime(Some(Duration::from_secs(settings.max_lifetime_secs)))
            .build(ConnectionManager::<DbConnection>::new(database_url))?;

        tracing::info!(
            "opened {} connection pool (max {} connections)",
            driver.tag,
            settings.max_connections
        );
        Ok(Database {
            pool: Arc::new(pool),
            driver: Arc::new(driver),
        })
    }

    /// Dialect settings guessed from the connection URL.
    pub fn driver(&self) -> &DriverInfo {
        &self.driver
    }

    pub fn get_connection(&self) -> Result<PooledConnection, ModelError> {
        Ok(self.pool.get()?)
    }

    /// Round-trip a trivial query.
    pub fn ping(&self) -> Result<(), ModelError> {
        let mut conn = self.get_connection()?;
        diesel::sql_query("SELECT 1").execute(&mut conn)?;
        Ok(())
    }

    /// Metadata provider holding one pooled connection for a whole reverse
    /// engineering pass.
    ///
    /// # Arguments
    /// * `schema` - schema to inspect, the connection's current one when `None`
    pub fn metadata(&self, schema: Option<String>) -> Result<DieselMetadata, ModelError> {
        DieselMetadata::new(self.get_connection()?, schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_settings_from_yaml() {
        let settings: PoolSettings = serde_yaml::from_str("max_connections: 8").unwrap();
        assert_eq!(settings.max_connections, 8);
        assert_eq!(settings.connection_timeout_secs, 30);
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn test_backend_mismatch() {
        assert!(backend_accepts(&DriverInfo::from_url("postgres://localhost/db").tag));
        assert!(!backend_accepts(&DriverInfo::from_url("mysql://localhost/db").tag));
        assert!(matches!(
            Database::connect("mysql://localhost/db", &PoolSettings::default()),
            Err(ModelError::Metadata(_))
        ));
    }
}
