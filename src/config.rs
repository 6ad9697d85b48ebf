//! YAML model configuration.
//!
//! ```yaml
//! model_id: bookshelf
//! reverse: extended
//! identifiers:
//!   mapping: { "*": "lowercase", "*.*": "snake_to_camel" }
//! filters:
//!   read: { "user.password": "mask" }
//! entities:
//!   - name: book
//!     primary_key: [book_id]
//! ```

use crate::db::PoolSettings;
use crate::error::ConfigError;
use crate::filters::crypto::cryptograph_by_name;
use crate::filters::Mappings;
use crate::model::{AttributeKind, DriverInfo, Model, ReverseMode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Attribute declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDecl {
    pub name: String,
    pub kind: AttributeKind,
    /// Entity of the returned rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// SQL with `<param>` markers.
    pub query: String,
}

/// Entity declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDecl {
    pub name: String,
    /// Explicit table. Reverse engineering fails when it does not exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<AttributeDecl>,
}

impl EntityDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            primary_key: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn attribute(mut self, name: &str, kind: AttributeKind, result: Option<&str>, query: &str) -> Self {
        self.attributes.push(AttributeDecl {
            name: name.to_string(),
            kind,
            result: result.map(str::to_string),
            query: query.to_string(),
        });
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifiersConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<Mappings>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiltersConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<Mappings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write: Option<Mappings>,
    /// Cryptograph name, such as `aes-gcm`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cryptograph: Option<String>,
    /// Base64 key of the cryptograph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

/// Model configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Connection pool used by `relmodel inspect`.
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub reverse: ReverseMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inflector: Option<String>,
    #[serde(default)]
    pub identifiers: IdentifiersConfig,
    #[serde(default)]
    pub filters: FiltersConfig,
    /// Driver settings; guessed from `database_url` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<DriverInfo>,
    #[serde(default)]
    pub entities: Vec<EntityDecl>,
}

impl ModelConfig {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            database_url: None,
            schema: None,
            pool: PoolSettings::default(),
            reverse: ReverseMode::default(),
            inflector: None,
            identifiers: IdentifiersConfig::default(),
            filters: FiltersConfig::default(),
            driver: None,
            entities: Vec::new(),
        }
    }

    /// Load a model configuration from a YAML file.
    ///
    /// # Arguments
    /// * `path` - Path to the YAML file
    ///
    /// # Errors
    /// `ConfigError::Invalid` when the file cannot be read or parsed
    ///
    /// # Example
    /// ```ignore
    /// use relmodel::config::ModelConfig;
    ///
    /// let config = ModelConfig::load_from_file("config/bookshelf.yaml")?;
    /// let model = config.build_model()?;
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            ConfigError::Invalid(format!("failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&contents)
            .map_err(|e| ConfigError::Invalid(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(contents)
            .map_err(|e| ConfigError::Invalid(format!("failed to parse YAML: {}", e)))
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Driver settings: the configured ones, else guessed from the URL.
    pub fn driver_info(&self) -> DriverInfo {
        match (&self.driver, &self.database_url) {
            (Some(driver), _) => driver.clone(),
            (None, Some(url)) => DriverInfo::from_url(url),
            (None, None) => DriverInfo::default(),
        }
    }

    /// Build the model: filters, inflector, cryptograph and declared
    /// entities. Every configuration error surfaces here.
    pub fn build_model(&self) -> Result<Model, ConfigError> {
        let mut model = Model::new(self.model_id.clone());
        model.set_reverse_mode(self.reverse);
        model.set_driver(self.driver_info());
        model.driver().ignore_pattern()?;

        let identifiers = model.identifiers_mut();
        if let Some(inflector) = &self.inflector {
            identifiers.set_inflector(inflector)?;
        }
        if let Some(mapping) = &self.identifiers.mapping {
            identifiers.set_mapping(mapping)?;
        }

        let filters = model.filters_mut();
        if let Some(read) = &self.filters.read {
            filters.read.add_mappings(read)?;
        }
        if let Some(write) = &self.filters.write {
            filters.write.add_mappings(write)?;
        }
        if let Some(cryptograph) = &self.filters.cryptograph {
            filters.set_cryptograph(cryptograph_by_name(cryptograph, self.filters.secret.as_deref())?);
        }

        for decl in &self.entities {
            model.declare_entity(decl.clone())?;
        }
        Ok(model)
    }
}
