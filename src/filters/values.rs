//! Value filters applied when reading from and writing to the database.
//!
//! Besides table and column mappings, keys of the form `type:<name>` map a
//! [`ValueType`] to a transform. [`ValueFilters::filter`] applies the
//! transform of the most specific registered type in the value's ancestry.

use crate::error::{ConfigError, TransformError};
use crate::filters::configurable::{parse_flat_mappings, ConfigurableFilters, Mappings, MappingValue};
use crate::filters::crypto::{cryptograph_by_name, AesCryptograph, Cryptograph};
use crate::transform::{Lookup, Transform};
use crate::value::{HtmlEscaped, Value, ValueType};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::NaiveTime;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Prefix of type filter keys.
pub const TYPE_KEY_PREFIX: &str = "type:";

type SharedCryptograph = Arc<RwLock<Option<Arc<dyn Cryptograph>>>>;

fn current_cryptograph(
    holder: &SharedCryptograph,
    transform: &str,
) -> Result<Arc<dyn Cryptograph>, TransformError> {
    holder
        .read()
        .clone()
        .ok_or_else(|| TransformError::MissingCryptograph(transform.to_string()))
}

fn value_bytes(value: &Value) -> Vec<u8> {
    match value {
        Value::Bytes(bytes) => bytes.clone(),
        other => other.to_string().into_bytes(),
    }
}

fn base64_decode(value: &Value) -> Result<Vec<u8>, TransformError> {
    match value {
        Value::Bytes(bytes) => BASE64.decode(bytes),
        other => BASE64.decode(other.to_string().trim()),
    }
    .map_err(|e| TransformError::Decode(format!("invalid base64: {}", e)))
}

/// Stock transform passing nulls through untouched.
fn stock<F>(name: &'static str, func: F) -> Transform<Value>
where
    F: Fn(Value) -> Result<Value, TransformError> + Send + Sync + 'static,
{
    Transform::new(name, move |value: Value| {
        if value.is_null() {
            Ok(value)
        } else {
            func(value)
        }
    })
}

/// Stock transform that needs the shared cryptograph.
fn secret_stock<F>(name: &'static str, holder: &SharedCryptograph, func: F) -> Transform<Value>
where
    F: Fn(&dyn Cryptograph, Value) -> Result<Value, TransformError> + Send + Sync + 'static,
{
    let holder = Arc::clone(holder);
    stock(name, move |value| {
        let crypto = current_cryptograph(&holder, name)?;
        func(crypto.as_ref(), value)
    })
    .requiring_secret()
}

/// Registry of value transforms, keyed by table, column, or value type.
pub struct ValueFilters {
    filters: ConfigurableFilters<Value>,
    type_mappings: BTreeMap<ValueType, Transform<Value>>,
    type_cache: DashMap<ValueType, Transform<Value>>,
    type_secret: bool,
    cryptograph: SharedCryptograph,
    hierarchy_walks: AtomicUsize,
}

impl ValueFilters {
    /// Create value filters with every stock transform registered.
    ///
    /// # Arguments
    /// * `prefix` - configuration prefix, `filters.read` or `filters.write`
    pub fn new(prefix: impl Into<String>) -> Self {
        let cryptograph: SharedCryptograph = Arc::new(RwLock::new(None));
        let mut filters = ConfigurableFilters::new(prefix);

        filters
            .add_stock_filter("lowercase", stock("lowercase", |v| Ok(Value::Text(v.to_string().to_lowercase()))))
            .add_stock_filter("uppercase", stock("uppercase", |v| Ok(Value::Text(v.to_string().to_uppercase()))))
            .add_stock_filter(
                "calendar_to_date",
                stock("calendar_to_date", |v| {
                    Ok(match v {
                        Value::Timestamp(ts) => Value::Date(ts.date()),
                        other => other,
                    })
                }),
            )
            .add_stock_filter(
                "date_to_calendar",
                stock("date_to_calendar", |v| {
                    Ok(match v {
                        Value::Date(date) => Value::Timestamp(date.and_time(NaiveTime::MIN)),
                        other => other,
                    })
                }),
            )
            .add_stock_filter(
                "number_to_boolean",
                stock("number_to_boolean", |v| {
                    Ok(match v {
                        Value::Int(i) => Value::Bool(i != 0),
                        Value::Float(f) => Value::Bool(f.trunc() != 0.0),
                        other => other,
                    })
                }),
            )
            .add_stock_filter(
                "raw_obfuscate",
                secret_stock("raw_obfuscate", &cryptograph, |crypto, v| {
                    Ok(Value::Bytes(crypto.encrypt(&v.to_string())?))
                }),
            )
            .add_stock_filter(
                "raw_deobfuscate",
                secret_stock("raw_deobfuscate", &cryptograph, |crypto, v| {
                    Ok(Value::Text(crypto.decrypt(&value_bytes(&v))?))
                }),
            )
            .add_stock_filter(
                "obfuscate",
                secret_stock("obfuscate", &cryptograph, |crypto, v| {
                    Ok(Value::Text(BASE64.encode(crypto.encrypt(&v.to_string())?)))
                }),
            )
            .add_stock_filter(
                "deobfuscate",
                secret_stock("deobfuscate", &cryptograph, |crypto, v| {
                    Ok(Value::Text(crypto.decrypt(&base64_decode(&v)?)?))
                }),
            )
            .add_stock_filter(
                "deobfuscate_strings",
                secret_stock("deobfuscate_strings", &cryptograph, |crypto, v| match v {
                    Value::Text(_) => Ok(Value::Text(crypto.decrypt(&base64_decode(&v)?)?)),
                    other => Ok(other),
                }),
            )
            .add_stock_filter(
                "base64_encode",
                stock("base64_encode", |v| Ok(Value::Text(BASE64.encode(value_bytes(&v))))),
            )
            .add_stock_filter(
                "base64_decode",
                stock("base64_decode", |v| Ok(Value::Bytes(base64_decode(&v)?))),
            )
            .add_stock_filter("mask", Transform::new("mask", |_: Value| Ok(Value::Null)))
            .add_stock_filter(
                "no_html",
                stock("no_html", |v| {
                    if v.to_string().contains(['<', '>', '"']) {
                        Err(TransformError::Validation("invalid character".to_string()))
                    } else {
                        Ok(v)
                    }
                }),
            )
            .add_stock_filter(
                "escape_html",
                stock("escape_html", |v| Ok(Value::Html(HtmlEscaped::new(v)))),
            );

        Self {
            filters,
            type_mappings: BTreeMap::new(),
            type_cache: DashMap::new(),
            type_secret: false,
            cryptograph,
            hierarchy_walks: AtomicUsize::new(0),
        }
    }

    /// Register a plugin transform name.
    pub fn register_plugin<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn() -> Result<Transform<Value>, ConfigError> + Send + Sync + 'static,
    {
        self.filters.register_plugin(name, factory);
        self
    }

    /// Register a lookup adapter name.
    pub fn register_lookup(&mut self, name: &str, lookup: Arc<dyn Lookup<Value>>) -> &mut Self {
        self.filters.register_lookup(name, lookup);
        self
    }

    /// Register an additional stock transform.
    pub fn add_stock_filter(&mut self, name: &str, transform: Transform<Value>) -> &mut Self {
        self.filters.add_stock_filter(name, transform);
        self
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

    /// Add a single mapping, either a pre-built transform or a
    /// comma-separated transform list.
    pub fn add_mapping(&mut self, key: &str, value: MappingValue<Value>) -> Result<(), ConfigError> {
        match self.parse_type_key(key)? {
            Some(value_type) => {
                let transform = match value {
                    MappingValue::Config(s) => self.resolve_list(&s)?,
                    MappingValue::Transform(t) => t,
                };
                self.add_type_mapping(value_type, transform);
                Ok(())
            }
            None => self.filters.add_mapping(key, value),
        }
    }

    /// Map `key` to a comma-separated transform list. `type:<name>` keys
    /// register type filters.
    pub fn add_mapping_str(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.add_mapping(key, MappingValue::Config(value.to_string()))
    }

    fn parse_type_key(&self, key: &str) -> Result<Option<ValueType>, ConfigError> {
        let key = key.trim();
        match key.strip_prefix(TYPE_KEY_PREFIX) {
            None => Ok(None),
            Some(name) => name
                .parse::<ValueType>()
                .map(Some)
                .map_err(|_| ConfigError::UnknownValueType {
                    prefix: self.filters.prefix().to_string(),
                    key: key.to_string(),
                }),
        }
    }

    /// Compose a transform list for a type filter; negative tokens remove
    /// positives of the same name.
    fn resolve_list(&self, value: &str) -> Result<Transform<Value>, ConfigError> {
        let tokens: Vec<&str> = value.split(',').map(str::trim).filter(|t| !t.is_empty()).collect();
        let negatives: Vec<&str> = tokens.iter().filter_map(|t| t.strip_prefix('-')).collect();
        tokens
            .iter()
            .filter(|t| !t.starts_with('-') && !negatives.contains(*t))
            .try_fold(Transform::identity(), |acc, token| {
                Ok(acc.then(&self.filters.resolve(token)?))
            })
    }

    /// Map a value type to a transform, replacing any previous one.
    pub fn add_type_mapping(&mut self, value_type: ValueType, transform: Transform<Value>) {
        if transform.requires_secret() {
            self.type_secret = true;
        }
        if self.type_mappings.insert(value_type, transform).is_some() {
            tracing::warn!("overwriting type mapping for type {}", value_type);
        }
        self.type_cache.clear();
    }

    /// Apply the type filter of the most specific registered type in the
    /// ancestry of the value's type, identity when none is registered.
    pub fn filter(&self, value: Value) -> Result<Value, TransformError> {
        let transform = self.type_filter(value.value_type());
        transform.apply(value)
    }

    /// Transform used by [`filter`](ValueFilters::filter) for values of
    /// `value_type`.
    pub fn type_filter(&self, value_type: ValueType) -> Transform<Value> {
        if let Some(hit) = self.type_cache.get(&value_type) {
            return hit.clone();
        }
        self.hierarchy_walks.fetch_add(1, Ordering::Relaxed);
        let mut tried = Vec::new();
        let mut found = None;
        for candidate in value_type.ancestry() {
            if let Some(transform) = self.type_mappings.get(&candidate) {
                found = Some(transform.clone());
                break;
            }
            tried.push(candidate);
        }
        let transform = found.unwrap_or_default();
        if tried.is_empty() {
            self.type_cache.insert(value_type, transform.clone());
        }
        for candidate in tried {
            tracing::debug!("caching type filter {:?} for type {}", transform, candidate);
            self.type_cache.insert(candidate, transform.clone());
        }
        transform
    }

    /// Number of type hierarchy walks performed so far, i.e. type filter
    /// cache misses.
    pub fn hierarchy_walks(&self) -> usize {
        self.hierarchy_walks.load(Ordering::Relaxed)
    }

    /// Whether any registered mapping needs a cryptograph.
    pub fn needs_cryptograph(&self) -> bool {
        self.type_secret || self.filters.needs_secret()
    }

    /// Install the cryptograph used by the obfuscation transforms.
    pub fn set_cryptograph(&self, cryptograph: Arc<dyn Cryptograph>) {
        *self.cryptograph.write() = Some(cryptograph);
    }

    /// Install a cryptograph by name.
    ///
    /// # Arguments
    /// * `name` - cryptograph name (`aes-gcm`)
    /// * `secret` - optional base64 key
    pub fn set_cryptograph_class(&self, name: &str, secret: Option<&str>) -> Result<(), ConfigError> {
        self.set_cryptograph(cryptograph_by_name(name, secret)?);
        Ok(())
    }

    pub fn has_cryptograph(&self) -> bool {
        self.cryptograph.read().is_some()
    }

    /// The installed cryptograph, if any.
    pub fn cryptograph(&self) -> Option<Arc<dyn Cryptograph>> {
        self.cryptograph.read().clone()
    }
}

impl Deref for ValueFilters {
    type Target = ConfigurableFilters<Value>;

    fn deref(&self) -> &Self::Target {
        &self.filters
    }
}

impl std::fmt::Debug for ValueFilters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueFilters")
            .field("filters", &self.filters)
            .field("type_mappings", &self.type_mappings)
            .field("has_cryptograph", &self.has_cryptograph())
            .finish()
    }
}

/// Read and write value filters of a model.
#[derive(Debug)]
pub struct FiltersSet {
    pub read: ValueFilters,
    pub write: ValueFilters,
}

impl Default for FiltersSet {
    fn default() -> Self {
        Self::new()
    }
}

impl FiltersSet {
    pub fn new() -> Self {
        Self {
            read: ValueFilters::new("filters.read"),
            write: ValueFilters::new("filters.write"),
        }
    }

    pub fn needs_cryptograph(&self) -> bool {
        self.read.needs_cryptograph() || self.write.needs_cryptograph()
    }

    /// Share one cryptograph between read and write filters.
    pub fn set_cryptograph(&self, cryptograph: Arc<dyn Cryptograph>) {
        self.read.set_cryptograph(Arc::clone(&cryptograph));
        self.write.set_cryptograph(cryptograph);
    }

    /// Give a cryptograph to each side that needs one and has none.
    ///
    /// An installed key is never replaced. A side without one borrows the
    /// other side's key; when neither has a key, a random AES key is shared.
    pub fn ensure_cryptograph(&self) -> Result<(), ConfigError> {
        let missing = |filters: &ValueFilters| filters.needs_cryptograph() && !filters.has_cryptograph();
        if !missing(&self.read) && !missing(&self.write) {
            return Ok(());
        }
        let cryptograph = match self.read.cryptograph().or_else(|| self.write.cryptograph()) {
            Some(installed) => installed,
            None => {
                tracing::warn!("value filters need a cryptograph, using a random AES key");
                Arc::new(AesCryptograph::random()?)
            }
        };
        for side in [&self.read, &self.write] {
            if missing(side) {
                side.set_cryptograph(Arc::clone(&cryptograph));
            }
        }
        Ok(())
    }
}
