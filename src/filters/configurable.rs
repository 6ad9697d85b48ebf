//! String-configured transform registries.
//!
//! Configuration comes in three shapes:
//!
//! 1. a flat string, `"key1=val1, key2=val2"`, where a bare token with no `=`
//!    becomes both the default table mapping (`*`) and the default column
//!    mapping (`*.*`)
//! 2. a map from keys to comma-separated transform names, or to pre-built
//!    transforms
//! 3. keys of the form `table` or `table.column`; a second dot is an error
//!
//! Each transform token resolves, in order, to a stock transform, a
//! `/search/replace/` regex substitution, a registered plugin, or a
//! registered lookup adapter. A token prefixed with `-` removes that
//! transform from the aggregated chain of the lookup.

use crate::error::ConfigError;
use crate::filters::registry::Filters;
use crate::transform::{Filterable, Lookup, Transform};
use dashmap::DashMap;
use indexmap::IndexMap;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Factory producing a fresh transform for a registered plugin name.
pub type PluginFactory<T> = Arc<dyn Fn() -> Result<Transform<T>, ConfigError> + Send + Sync>;

/// Mapping configuration as found in configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Mappings {
    /// `"key1=val1, key2=val2"` or a single default transform list.
    Flat(String),
    /// `key -> "transform1, transform2"`.
    Map(IndexMap<String, String>),
}

/// Value bound to a mapping key.
pub enum MappingValue<T> {
    /// Comma-separated transform names.
    Config(String),
    Transform(Transform<T>),
}

impl<T> From<&str> for MappingValue<T> {
    fn from(s: &str) -> Self {
        MappingValue::Config(s.to_string())
    }
}

impl<T> From<Transform<T>> for MappingValue<T> {
    fn from(t: Transform<T>) -> Self {
        MappingValue::Transform(t)
    }
}

/// How a single configuration token resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformKind {
    Stock(String),
    RegexSubstitution { search: String, replace: String },
    Plugin(String),
    Lookup(String),
}

/// A parsed configuration token.
#[derive(Clone)]
pub struct Token<T> {
    name: String,
    negative: bool,
    transform: Transform<T>,
}

impl<T> Token<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }
}

impl<T> fmt::Debug for Token<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-{}", self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// Lookup cache key. Patterns match case-insensitively, so names are stored
/// lowercased; the cache holds one entry per distinct schema name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    Table(String),
    Column(String, String),
}

/// Split a mapping key into table pattern and optional column pattern.
pub fn split_mapping_key(prefix: &str, key: &str) -> Result<(String, Option<String>), ConfigError> {
    let key = key.trim();
    match key.split_once('.') {
        None => Ok((key.to_string(), None)),
        Some((table, column)) => {
            if column.contains('.') {
                return Err(ConfigError::InvalidMappingKey {
                    prefix: prefix.to_string(),
                    key: key.to_string(),
                });
            }
            Ok((table.to_string(), Some(column.to_string())))
        }
    }
}

/// Parse a flat `"key1=val1, key2=val2"` string into ordered key/value pairs.
pub fn parse_flat_mappings(value: &str) -> IndexMap<String, String> {
    let mut map = IndexMap::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('=') {
            None => {
                map.insert("*".to_string(), part.to_string());
                map.insert("*.*".to_string(), part.to_string());
            }
            Some((key, val)) => {
                map.insert(key.trim().to_string(), val.trim().to_string());
            }
        }
    }
    map
}

/// Parse a `/search/replace/` rule; the trailing slash is optional and the
/// replacement may be empty.
pub fn parse_regex_rule(rule: &str) -> Result<(String, String), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidRegexRule {
        rule: rule.to_string(),
        reason: reason.to_string(),
    };
    let body = rule
        .strip_prefix('/')
        .ok_or_else(|| invalid("missing leading slash"))?;
    let body = body.strip_suffix('/').unwrap_or(body);
    let (search, replace) = body
        .split_once('/')
        .ok_or_else(|| invalid("missing replacement part"))?;
    if search.is_empty() {
        return Err(invalid("empty search expression"));
    }
    if replace.contains('/') {
        return Err(invalid("too many slashes"));
    }
    Ok((search.to_string(), replace.to_string()))
}

/// Registry of transforms built from string configuration.
pub struct ConfigurableFilters<T: Filterable> {
    prefix: String,
    resolved: Filters<Transform<T>>,
    configuration: Filters<Vec<Token<T>>>,
    plugins: BTreeMap<String, PluginFactory<T>>,
    lookups: BTreeMap<String, Arc<dyn Lookup<T>>>,
    secret_required: bool,
    cache: DashMap<CacheKey, Transform<T>>,
}

impl<T: Filterable> ConfigurableFilters<T> {
    /// Create an empty registry.
    ///
    /// # Arguments
    /// * `prefix` - configuration key prefix, used in error messages
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            resolved: Filters::new(),
            configuration: Filters::new(),
            plugins: BTreeMap::new(),
            lookups: BTreeMap::new(),
            secret_required: false,
            cache: DashMap::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Register a named stock transform.
    pub fn add_stock_filter(&mut self, name: &str, transform: Transform<T>) -> &mut Self {
        self.resolved.add_stock_filter(name, transform);
        self
    }

    pub fn has_stock_filter(&self, name: &str) -> bool {
        self.resolved.has_stock_filter(name)
    }

    pub fn stock_names(&self) -> Vec<&str> {
        self.resolved.stock_names()
    }

    /// Register a plugin: `name` in configuration values instantiates a
    /// transform through `factory`.
    pub fn register_plugin<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn() -> Result<Transform<T>, ConfigError> + Send + Sync + 'static,
    {
        if self.plugins.insert(name.to_string(), Arc::new(factory)).is_some() {
            tracing::warn!("{}: overriding plugin {}", self.prefix, name);
        }
        self
    }

    /// Register a lookup object: `name` in configuration values maps each
    /// value through `lookup`.
    pub fn register_lookup(&mut self, name: &str, lookup: Arc<dyn Lookup<T>>) -> &mut Self {
        if self.lookups.insert(name.to_string(), lookup).is_some() {
            tracing::warn!("{}: overriding lookup {}", self.prefix, name);
        }
        self
    }

    /// Decide how `token` resolves, without building the transform.
    pub fn resolve_kind(&self, token: &str) -> Result<TransformKind, ConfigError> {
        if self.resolved.has_stock_filter(token) {
            return Ok(TransformKind::Stock(token.to_string()));
        }
        if token.starts_with('/') {
            let (search, replace) = parse_regex_rule(token)?;
            return Ok(TransformKind::RegexSubstitution { search, replace });
        }
        if self.plugins.contains_key(token) {
            return Ok(TransformKind::Plugin(token.to_string()));
        }
        if self.lookups.contains_key(token) {
            return Ok(TransformKind::Lookup(token.to_string()));
        }
        Err(ConfigError::UnknownTransform {
            prefix: self.prefix.clone(),
            token: token.to_string(),
        })
    }

    /// Build the transform a single positive token stands for.
    pub fn resolve(&self, token: &str) -> Result<Transform<T>, ConfigError> {
        let unknown = || ConfigError::UnknownTransform {
            prefix: self.prefix.clone(),
            token: token.to_string(),
        };
        match self.resolve_kind(token)? {
            TransformKind::Stock(name) => self.resolved.stock_filter(&name).cloned().ok_or_else(unknown),
            TransformKind::RegexSubstitution { search, replace } => {
                regex_substitution(token, &search, replace)
            }
            TransformKind::Plugin(name) => {
                let factory = self.plugins.get(&name).ok_or_else(unknown)?;
                factory()
            }
            TransformKind::Lookup(name) => {
                let lookup = self.lookups.get(&name).ok_or_else(unknown)?;
                Ok(Transform::from_lookup(name, Arc::clone(lookup)))
            }
        }
    }

    fn parse_tokens(&self, value: &str) -> Result<Vec<Token<T>>, ConfigError> {
        value
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|raw| match raw.strip_prefix('-') {
                Some(name) => Ok(Token {
                    name: name.trim().to_string(),
                    negative: true,
                    transform: Transform::identity(),
                }),
                None => Ok(Token {
                    name: raw.to_string(),
                    negative: false,
                    transform: self.resolve(raw)?,
                }),
            })
            .collect()
    }

    /// Add mappings from a flat `"key=val, ..."` string.
    pub fn add_mappings_str(&mut self, value: &str) -> Result<(), ConfigError> {
        for (key, val) in parse_flat_mappings(value) {
            self.add_mapping_str(&key, &val)?;
        }
        Ok(())
    }

    /// Add mappings from their configuration file form.
    pub fn add_mappings(&mut self, mappings: &Mappings) -> Result<(), ConfigError> {
        match mappings {
            Mappings::Flat(value) => self.add_mappings_str(value),
            Mappings::Map(map) => {
                for (key, val) in map {
                    self.add_mapping_str(key, val)?;
                }
                Ok(())
            }
        }
    }

    /// Add a single mapping.
    pub fn add_mapping(&mut self, key: &str, value: MappingValue<T>) -> Result<(), ConfigError> {
        match value {
            MappingValue::Config(s) => self.add_mapping_str(key, &s),
            MappingValue::Transform(t) => self.add_mapping_transform(key, t),
        }
    }

    /// Map `key` to a comma-separated list of transform tokens.
    pub fn add_mapping_str(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let tokens = self.parse_tokens(value)?;
        if tokens.iter().any(|t| t.transform.requires_secret()) {
            self.secret_required = true;
        }
        let (table, column) = split_mapping_key(&self.prefix, key)?;
        self.cache.clear();
        match column {
            None => self.configuration.add_table_mapping(&table, tokens),
            Some(column) => self.configuration.add_column_mapping(&table, &column, tokens),
        }
    }

    /// Map `key` to a pre-built transform.
    pub fn add_mapping_transform(&mut self, key: &str, transform: Transform<T>) -> Result<(), ConfigError> {
        if transform.requires_secret() {
            self.secret_required = true;
        }
        let (table, column) = split_mapping_key(&self.prefix, key)?;
        self.cache.clear();
        match column {
            None => self.resolved.add_table_mapping(&table, transform),
            Some(column) => self.resolved.add_column_mapping(&table, &column, transform),
        }
    }

    /// Whether any registered mapping contains a step that needs a secret.
    pub fn needs_secret(&self) -> bool {
        self.secret_required
    }

    /// Compose the aggregated tokens: positives in order, first occurrence
    /// kept, minus every name listed negatively.
    fn compose_tokens<'a, I>(lists: I) -> Transform<T>
    where
        I: IntoIterator<Item = &'a Vec<Token<T>>>,
    {
        let tokens: Vec<&Token<T>> = lists.into_iter().flatten().collect();
        let negatives: HashSet<&str> = tokens
            .iter()
            .filter(|t| t.negative)
            .map(|t| t.name.as_str())
            .collect();
        let mut seen = HashSet::new();
        tokens
            .into_iter()
            .filter(|t| !t.negative && !negatives.contains(t.name.as_str()))
            .filter(|t| seen.insert(t.name.as_str()))
            .fold(Transform::identity(), |acc, t| acc.then(&t.transform))
    }

    /// Transform for a table name: pre-built mappings first, then configured
    /// tokens.
    pub fn get_table_filter(&self, table: &str) -> Transform<T> {
        let key = CacheKey::Table(table.to_lowercase());
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }
        let direct = self.resolved.get_table_filter(table);
        let configured = Self::compose_tokens(self.configuration.table_matches(table));
        let filter = direct.then(&configured);
        self.cache.insert(key, filter.clone());
        filter
    }

    /// Transform for a column of a table.
    pub fn get_column_filter(&self, table: &str, column: &str) -> Transform<T> {
        let key = CacheKey::Column(table.to_lowercase(), column.to_lowercase());
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }
        let direct = self.resolved.get_column_filter(table, column);
        let configured = Self::compose_tokens(self.configuration.column_matches(table, column));
        let filter = direct.then(&configured);
        self.cache.insert(key, filter.clone());
        filter
    }

    /// Transform registered under `*.*`.
    pub fn get_default_column_filter(&self) -> Transform<T> {
        let direct = self.resolved.get_default_column_filter();
        let configured =
            Self::compose_tokens(std::iter::once(self.configuration.get_default_column_filter()));
        direct.then(&configured)
    }

    /// Raw configured tokens matching a column, in fold order. Useful to
    /// explain how a chain was built.
    pub fn configured_tokens(&self, table: &str, column: &str) -> Vec<String> {
        self.configuration
            .column_matches(table, column)
            .into_iter()
            .flatten()
            .map(|t| format!("{:?}", t))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty() && self.configuration.is_empty()
    }
}

impl<T: Filterable> fmt::Debug for ConfigurableFilters<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurableFilters")
            .field("prefix", &self.prefix)
            .field("stock", &self.resolved.stock_names())
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .field("lookups", &self.lookups.keys().collect::<Vec<_>>())
            .field("configuration", &self.configuration)
            .finish()
    }
}

/// Build a case-insensitive regex substitution transform.
fn regex_substitution<T: Filterable>(
    rule: &str,
    search: &str,
    replace: String,
) -> Result<Transform<T>, ConfigError> {
    let re = RegexBuilder::new(search)
        .case_insensitive(true)
        .build()
        .map_err(|e| ConfigError::InvalidRegexRule {
            rule: rule.to_string(),
            reason: e.to_string(),
        })?;
    Ok(Transform::new(rule, move |value: T| {
        Ok(match value.to_text() {
            Some(text) => T::from_text(re.replace_all(&text, replace.as_str()).into_owned()),
            None => value,
        })
    }))
}
