//! The model: configured filters, declared entities and the schema they
//! resolve to once reverse engineering ran.
//!
//! A [`Model`] is configured through `&mut self` methods, then initialized
//! once through [`Model::initialize`]. Initialization is guarded by a mutex:
//! the first call runs the reverse engineering pass, later calls return the
//! same schema, or the same error when the pass failed.

pub mod attribute;
pub mod column;
pub mod driver;
pub mod entity;
pub mod reverse;
pub mod schema;

pub use attribute::{Attribute, AttributeKind, AttributeOrigin, Query, QueryPart};
pub use column::Column;
pub use driver::{CaseSensitivity, DriverInfo, PlaceholderStyle};
pub use entity::{ColumnMask, Entity, KeyState};
pub use reverse::{Phase, ReverseEngineer, ReverseMode};
pub use schema::{AttributeSummary, ColumnSummary, EntitySummary, Schema, SchemaSummary};

use crate::config::EntityDecl;
use crate::error::{ConfigError, ModelError};
use crate::filters::{FiltersSet, IdentifiersFilters};
use crate::metadata::MetadataProvider;
use crate::value::Value;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
enum InitState {
    Unconfigured,
    Ready(Arc<Schema>),
    Failed(ModelError),
}

pub struct Model {
    model_id: String,
    reverse_mode: ReverseMode,
    driver: Arc<DriverInfo>,
    identifiers: IdentifiersFilters,
    filters: FiltersSet,
    declarations: IndexMap<String, EntityDecl>,
    state: Mutex<InitState>,
}

impl Model {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            reverse_mode: ReverseMode::None,
            driver: Arc::new(DriverInfo::default()),
            identifiers: IdentifiersFilters::new(),
            filters: FiltersSet::new(),
            declarations: IndexMap::new(),
            state: Mutex::new(InitState::Unconfigured),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn reverse_mode(&self) -> ReverseMode {
        self.reverse_mode
    }

    pub fn set_reverse_mode(&mut self, mode: ReverseMode) {
        self.reverse_mode = mode;
    }

    pub fn driver(&self) -> &DriverInfo {
        &self.driver
    }

    pub fn set_driver(&mut self, driver: DriverInfo) {
        self.driver = Arc::new(driver);
    }

    pub fn identifiers(&self) -> &IdentifiersFilters {
        &self.identifiers
    }

    pub fn identifiers_mut(&mut self) -> &mut IdentifiersFilters {
        &mut self.identifiers
    }

    pub fn filters(&self) -> &FiltersSet {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut FiltersSet {
        &mut self.filters
    }

    /// Declare an entity ahead of reverse engineering.
    pub fn declare_entity(&mut self, decl: EntityDecl) -> Result<(), ConfigError> {
        if self.declarations.contains_key(&decl.name) {
            return Err(ConfigError::DuplicateEntity(decl.name));
        }
        self.declarations.insert(decl.name.clone(), decl);
        Ok(())
    }

    pub fn declarations(&self) -> impl Iterator<Item = &EntityDecl> {
        self.declarations.values()
    }

    /// Schema of an initialized model.
    pub fn schema(&self) -> Result<Arc<Schema>, ModelError> {
        match &*self.state.lock() {
            InitState::Ready(schema) => Ok(Arc::clone(schema)),
            InitState::Failed(err) => Err(err.clone()),
            InitState::Unconfigured => Err(ModelError::NotInitialized),
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(&*self.state.lock(), InitState::Ready(_))
    }

    /// Reverse engineer the schema through `provider`, once.
    ///
    /// # Arguments
    /// * `provider` - metadata of the live database, kept busy for the
    ///   whole pass
    ///
    /// # Returns
    /// The schema. A failed initialization is not retried: every later call
    /// returns the original error.
    pub fn initialize(&self, provider: &mut dyn MetadataProvider) -> Result<Arc<Schema>, ModelError> {
        let mut state = self.state.lock();
        match &*state {
            InitState::Ready(schema) => return Ok(Arc::clone(schema)),
            InitState::Failed(err) => return Err(err.clone()),
            InitState::Unconfigured => {}
        }
        match self.build_schema(provider) {
            Ok(schema) => {
                let schema = Arc::new(schema);
                *state = InitState::Ready(Arc::clone(&schema));
                Ok(schema)
            }
            Err(err) => {
                tracing::error!("model {} initialization failed: {}", self.model_id, err);
                *state = InitState::Failed(err.clone());
                Err(err)
            }
        }
    }

    fn build_schema(&self, provider: &mut dyn MetadataProvider) -> Result<Schema, ModelError> {
        tracing::info!("initializing model {}", self.model_id);
        self.driver.log();
        self.filters.ensure_cryptograph()?;
        let mut engineer = ReverseEngineer::new(
            self.reverse_mode,
            Arc::clone(&self.driver),
            &self.identifiers,
            &self.filters,
        );
        for decl in self.declarations.values() {
            engineer.declare(self.declared_entity(decl))?;
        }
        let entities = engineer.run(provider)?;
        Ok(Schema::new(self.model_id.clone(), Arc::clone(&self.driver), entities))
    }

    fn declared_entity(&self, decl: &EntityDecl) -> Entity {
        let mut entity = Entity::new(decl.name.clone(), Arc::clone(&self.driver));
        let table = decl.table.as_deref().unwrap_or(&decl.name);
        entity.set_table(Some(self.driver.table_name(table)), decl.table.is_some());
        entity.set_sql_primary_key(decl.primary_key.clone());
        for attr in &decl.attributes {
            let mut attribute = Attribute::new(
                attr.name.clone(),
                attr.kind,
                Query::parse(&attr.query),
                AttributeOrigin::Declared,
            );
            attribute.result_entity = attr.result.clone();
            entity.add_attribute(attribute);
        }
        entity
    }

    fn column<R>(
        &self,
        entity: &str,
        column: &str,
        f: impl FnOnce(&Column) -> Result<R, ModelError>,
    ) -> Result<R, ModelError> {
        let schema = self.schema()?;
        let entity = schema
            .entity(entity)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown entity {}", entity)))?;
        let found = entity.column(column).ok_or_else(|| {
            ConfigError::Invalid(format!("unknown column {}.{}", entity.name(), column))
        })?;
        f(found)
    }

    /// Value read from a column: the column read filter, then the read
    /// filter of the value's type.
    pub fn read_value(&self, entity: &str, column: &str, value: Value) -> Result<Value, ModelError> {
        self.column(entity, column, |c| {
            let value = c.read(value)?;
            Ok(self.filters.read.filter(value)?)
        })
    }

    /// Value written to a column: the write filter of the value's type, then
    /// the column write filter.
    pub fn write_value(&self, entity: &str, column: &str, value: Value) -> Result<Value, ModelError> {
        self.column(entity, column, |c| {
            let value = self.filters.write.filter(value)?;
            Ok(c.write(value)?)
        })
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("model_id", &self.model_id)
            .field("reverse_mode", &self.reverse_mode)
            .field("driver", &self.driver.tag)
            .field("declarations", &self.declarations.len())
            .finish()
    }
}
