//! Reverse engineering of the live schema into entities and joins.
//!
//! The pass runs as a sequence of phases:
//!
//! ```text
//! DiscoverTables -> DiscoverColumns -> InitializeEntities
//!     -> DiscoverJoins -> DiscoverExtendedJoins -> Done
//! ```
//!
//! The [`ReverseMode`] decides which phases run. The provider stays in its
//! busy state for the whole pass, and the resulting entities are handed back
//! only when every phase succeeded.
//!
//! Extended (many-to-many) joins are detected by naming convention only: a
//! junction entity referencing exactly two entities `left` and `right`
//! through disjoint columns must be named `left_right` or `right_left`.
//! Junction tables named otherwise are not detected.

use crate::error::{ConfigError, ModelError};
use crate::filters::{FiltersSet, IdentifiersFilters};
use crate::metadata::{BusyGuard, MetadataProvider};
use crate::model::attribute::Attribute;
use crate::model::column::Column;
use crate::model::driver::DriverInfo;
use crate::model::entity::Entity;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// How much of the schema is reverse engineered.
///
/// Each mode contains the previous ones, except that `joins` only links
/// declared entities while `full` also discovers tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReverseMode {
    #[default]
    None,
    /// Columns and keys of declared entities.
    Columns,
    /// Tables, columns and keys.
    Tables,
    /// Columns, keys and joins of declared entities.
    Joins,
    /// Tables, columns, keys and joins.
    Full,
    /// Everything, including many-to-many joins.
    Extended,
}

impl ReverseMode {
    pub fn reverse_columns(self) -> bool {
        self > ReverseMode::None
    }

    pub fn reverse_tables(self) -> bool {
        self == ReverseMode::Tables || self > ReverseMode::Joins
    }

    pub fn reverse_joins(self) -> bool {
        self > ReverseMode::Tables
    }

    pub fn reverse_extended(self) -> bool {
        self == ReverseMode::Extended
    }

    pub fn name(self) -> &'static str {
        match self {
            ReverseMode::None => "none",
            ReverseMode::Columns => "columns",
            ReverseMode::Tables => "tables",
            ReverseMode::Joins => "joins",
            ReverseMode::Full => "full",
            ReverseMode::Extended => "extended",
        }
    }
}

impl fmt::Display for ReverseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReverseMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(ReverseMode::None),
            "columns" => Ok(ReverseMode::Columns),
            "tables" => Ok(ReverseMode::Tables),
            "joins" => Ok(ReverseMode::Joins),
            "full" => Ok(ReverseMode::Full),
            "extended" => Ok(ReverseMode::Extended),
            other => Err(ConfigError::Invalid(format!("unknown reverse mode: {}", other))),
        }
    }
}

/// Phase of the reverse engineering pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    DiscoverTables,
    DiscoverColumns,
    InitializeEntities,
    DiscoverJoins,
    DiscoverExtendedJoins,
    Done,
}

impl Phase {
    const ORDER: [Phase; 6] = [
        Phase::DiscoverTables,
        Phase::DiscoverColumns,
        Phase::InitializeEntities,
        Phase::DiscoverJoins,
        Phase::DiscoverExtendedJoins,
        Phase::Done,
    ];

    pub fn is_enabled(self, mode: ReverseMode) -> bool {
        match self {
            Phase::DiscoverTables => mode.reverse_columns() && mode.reverse_tables(),
            Phase::DiscoverColumns => mode.reverse_columns(),
            Phase::InitializeEntities | Phase::Done => true,
            Phase::DiscoverJoins => mode.reverse_columns() && mode.reverse_joins(),
            Phase::DiscoverExtendedJoins => mode.reverse_extended(),
        }
    }

    /// First phase run under `mode`.
    pub fn first(mode: ReverseMode) -> Phase {
        Self::ORDER
            .into_iter()
            .find(|p| p.is_enabled(mode))
            .unwrap_or(Phase::Done)
    }

    /// Phase following this one under `mode`, skipping disabled phases.
    pub fn next(self, mode: ReverseMode) -> Phase {
        Self::ORDER
            .into_iter()
            .skip_while(|p| *p != self)
            .skip(1)
            .find(|p| p.is_enabled(mode))
            .unwrap_or(Phase::Done)
    }
}

/// Drives one reverse engineering pass over a set of entities.
pub struct ReverseEngineer<'a> {
    mode: ReverseMode,
    driver: Arc<DriverInfo>,
    identifiers: &'a IdentifiersFilters,
    filters: &'a FiltersSet,
    entities: IndexMap<String, Entity>,
    /// Bound table to entity name.
    by_table: BTreeMap<String, String>,
    /// Referencing entity to the (referenced entity, foreign key columns)
    /// pairs found while discovering joins.
    potential_join_tables: IndexMap<String, Vec<(String, Vec<String>)>>,
    phase: Phase,
}

impl<'a> ReverseEngineer<'a> {
    pub fn new(
        mode: ReverseMode,
        driver: Arc<DriverInfo>,
        identifiers: &'a IdentifiersFilters,
        filters: &'a FiltersSet,
    ) -> Self {
        Self {
            mode,
            driver,
            identifiers,
            filters,
            entities: IndexMap::new(),
            by_table: BTreeMap::new(),
            potential_join_tables: IndexMap::new(),
            phase: Phase::first(mode),
        }
    }

    /// Add a declared entity before running the pass.
    pub fn declare(&mut self, entity: Entity) -> Result<(), ConfigError> {
        if self.entities.contains_key(entity.name()) {
            return Err(ConfigError::DuplicateEntity(entity.name().to_string()));
        }
        if let Some(table) = entity.table() {
            if let Some(previous) = self.by_table.get(table) {
                return Err(ConfigError::SharedTable {
                    first: previous.clone(),
                    second: entity.name().to_string(),
                    table: table.to_string(),
                });
            }
            self.by_table
                .insert(table.to_string(), entity.name().to_string());
        }
        self.entities.insert(entity.name().to_string(), entity);
        Ok(())
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run every enabled phase.
    ///
    /// # Returns
    /// * `Ok(entities)` - all known entities, declared and discovered
    /// * `Err(e)` - the first fatal error; nothing of the pass is kept
    pub fn run(mut self, provider: &mut dyn MetadataProvider) -> Result<IndexMap<String, Entity>, ModelError> {
        let mut provider = BusyGuard::new(provider);
        tracing::info!("reverse engineering with mode {}", self.mode);
        while self.phase != Phase::Done {
            tracing::info!("reverse engineering phase {:?}", self.phase);
            self.step(&mut *provider)?;
            self.phase = self.phase.next(self.mode);
        }
        tracing::info!("reverse engineering done: {} entities", self.entities.len());
        Ok(self.entities)
    }

    fn step(&mut self, provider: &mut dyn MetadataProvider) -> Result<(), ModelError> {
        match self.phase {
            Phase::DiscoverTables => self.discover_tables(provider),
            Phase::DiscoverColumns => self.discover_columns(provider),
            Phase::InitializeEntities => {
                self.initialize_entities();
                Ok(())
            }
            Phase::DiscoverJoins => self.discover_joins(provider),
            Phase::DiscoverExtendedJoins => self.discover_extended_joins(),
            Phase::Done => Ok(()),
        }
    }

    fn discover_tables(&mut self, provider: &mut dyn MetadataProvider) -> Result<(), ModelError> {
        let ignore = self.driver.ignore_pattern()?;
        for table in provider.list_tables()? {
            if ignore.as_ref().is_some_and(|re| re.is_match(&table)) {
                tracing::debug!("ignoring table {}", table);
                continue;
            }
            if self.by_table.contains_key(&table) {
                continue;
            }
            let name = self.identifiers.transform_table_name(&table)?;
            match self.entities.get_mut(&name) {
                Some(entity) => {
                    if let Some(bound) = entity.table().map(str::to_string) {
                        if entity.has_explicit_table() {
                            return Err(ConfigError::TableRebind {
                                entity: name,
                                bound,
                                table,
                            }
                            .into());
                        }
                        tracing::warn!("rebinding entity {} from table {} to table {}", name, bound, table);
                        self.by_table.remove(&bound);
                    } else {
                        tracing::warn!("binding entity {} to table {}", name, table);
                    }
                    entity.set_table(Some(table.clone()), false);
                }
                None => {
                    let mut entity = Entity::new(name.clone(), Arc::clone(&self.driver));
                    entity.set_table(Some(table.clone()), false);
                    self.entities.insert(name.clone(), entity);
                }
            }
            self.by_table.insert(table, name);
        }
        tracing::info!("{} tables bound to entities", self.by_table.len());
        Ok(())
    }

    fn discover_columns(&mut self, provider: &mut dyn MetadataProvider) -> Result<(), ModelError> {
        let bound: Vec<(String, String)> = self
            .by_table
            .iter()
            .map(|(t, e)| (t.clone(), e.clone()))
            .collect();
        for (table, name) in bound {
            let infos = provider.list_columns(&table)?;
            let Some(entity) = self.entities.get_mut(&name) else {
                continue;
            };
            if infos.is_empty() {
                if entity.has_explicit_table() {
                    return Err(ConfigError::MissingTable { entity: name, table }.into());
                }
                tracing::warn!("table {} does not exist, entity {} left without table", table, name);
                entity.set_table(None, false);
                entity.clear_columns();
                self.by_table.remove(&table);
                continue;
            }
            entity.clear_columns();
            for info in infos {
                let logical = self.identifiers.transform_column_name(&table, &info.sql_name)?;
                let mut column = Column::new(logical, &info).with_filters(
                    self.filters.read.get_column_filter(&table, &info.sql_name),
                    self.filters.write.get_column_filter(&table, &info.sql_name),
                );
                if info.is_enum {
                    if let Some(values) = provider.describe_enum(&table, &info.sql_name)? {
                        column.set_enum_values(values);
                    }
                }
                entity.add_column(column)?;
            }
            if entity.sql_primary_key().is_none() {
                entity.set_sql_primary_key(provider.primary_key(&table)?);
            }
        }
        Ok(())
    }

    fn initialize_entities(&mut self) {
        let default_filter = self.identifiers.get_default_column_filter();
        for entity in self.entities.values_mut() {
            entity.set_default_column_filter(default_filter.clone());
            entity.initialize();
        }
        tracing::info!("{} entities initialized", self.entities.len());
    }

    fn discover_joins(&mut self, provider: &mut dyn MetadataProvider) -> Result<(), ModelError> {
        let candidates: Vec<(String, String)> = self
            .by_table
            .iter()
            .map(|(t, e)| (t.clone(), e.clone()))
            .collect();
        for (pk_table, pk_name) in candidates {
            let keyed = self
                .entities
                .get(&pk_name)
                .and_then(Entity::sql_primary_key)
                .is_some_and(|key| !key.is_empty());
            if !keyed {
                continue;
            }
            for fk in provider.foreign_keys(&pk_table)? {
                let Some(fk_name) = self.by_table.get(&fk.fk_table).cloned() else {
                    continue;
                };
                self.declare_upstream_join(&pk_name, &fk_name, &fk.fk_columns)?;
                self.declare_downstream_join(&pk_name, &fk_name, &fk.fk_columns)?;
                self.potential_join_tables
                    .entry(fk_name)
                    .or_default()
                    .push((pk_name.clone(), fk.fk_columns));
            }
        }
        Ok(())
    }

    fn entity(&self, name: &str) -> Result<&Entity, ModelError> {
        self.entities
            .get(name)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown entity {}", name)).into())
    }

    fn add_join(&mut self, entity: &str, attribute: Option<Attribute>) {
        if let (Some(attribute), Some(entity)) = (attribute, self.entities.get_mut(entity)) {
            entity.add_attribute(attribute);
        }
    }

    /// Name of the attribute navigating from the referencing entity to the
    /// referenced one.
    fn upstream_name(pk_entity: &Entity, fk_columns: &[String]) -> Result<String, ConfigError> {
        let [fk_column] = fk_columns else {
            return Ok(pk_entity.name().to_string());
        };
        let key = pk_entity.primary_key()?;
        let first = key.first().ok_or_else(|| ConfigError::UnresolvedPrimaryKey {
            entity: pk_entity.name().to_string(),
            table: pk_entity.table().map(str::to_string),
        })?;
        if *fk_column == first.sql_name {
            return Ok(pk_entity.name().to_string());
        }
        let mut name = fk_column.to_lowercase();
        if name.len() > 3 && name.ends_with("_id") {
            name.truncate(name.len() - 3);
        }
        Ok(name)
    }

    fn declare_upstream_join(&mut self, pk_name: &str, fk_name: &str, fk_columns: &[String]) -> Result<(), ModelError> {
        let pk_entity = self.entity(pk_name)?;
        let fk_entity = self.entity(fk_name)?;
        pk_entity.primary_key()?;
        let name = Self::upstream_name(pk_entity, fk_columns)?;
        if fk_entity.has_attribute(&name) {
            tracing::debug!(
                "explicit declaration of attribute {}.{} supersedes implicit join from {}",
                fk_name,
                name,
                pk_name
            );
            return Ok(());
        }
        let attribute = fk_entity.upstream_join(&name, pk_entity, fk_columns)?;
        self.add_join(fk_name, attribute);
        Ok(())
    }

    fn declare_downstream_join(&mut self, pk_name: &str, fk_name: &str, fk_columns: &[String]) -> Result<(), ModelError> {
        let name = self.identifiers.pluralize(fk_name)?;
        let pk_entity = self.entity(pk_name)?;
        let fk_entity = self.entity(fk_name)?;
        pk_entity.primary_key()?;
        if pk_entity.has_attribute(&name) {
            tracing::debug!(
                "explicit declaration of attribute {}.{} supersedes implicit join toward {}",
                pk_name,
                name,
                fk_name
            );
            return Ok(());
        }
        let attribute = pk_entity.downstream_join(&name, fk_entity, fk_columns)?;
        self.add_join(pk_name, attribute);
        Ok(())
    }

    fn discover_extended_joins(&mut self) -> Result<(), ModelError> {
        let potential = std::mem::take(&mut self.potential_join_tables);
        for (join_name, referenced) in &potential {
            let [(left, left_fk), (right, right_fk)] = referenced.as_slice() else {
                continue;
            };
            if left_fk.iter().any(|c| right_fk.contains(c)) {
                continue;
            }
            if *join_name != format!("{}_{}", left, right) && *join_name != format!("{}_{}", right, left) {
                continue;
            }
            self.declare_extended_join(left, left_fk, join_name, right_fk, right)?;
            self.declare_extended_join(right, right_fk, join_name, left_fk, left)?;
        }
        self.potential_join_tables = potential;
        Ok(())
    }

    fn declare_extended_join(
        &mut self,
        left_name: &str,
        left_fk: &[String],
        join_name: &str,
        right_fk: &[String],
        right_name: &str,
    ) -> Result<(), ModelError> {
        let name = self.identifiers.pluralize(right_name)?;
        let left = self.entity(left_name)?;
        if left.has_attribute(&name) {
            tracing::debug!(
                "explicit declaration of attribute {}.{} supersedes implicit join through {}",
                left_name,
                name,
                join_name
            );
            return Ok(());
        }
        let attribute = left.extended_join(&name, left_fk, self.entity(join_name)?, right_fk, self.entity(right_name)?)?;
        self.add_join(left_name, attribute);
        Ok(())
    }
}
