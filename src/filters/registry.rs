//! Pattern-keyed registry of mapped values.
//!
//! [`Filters`] keeps two mappings:
//!
//! - a *tables mapping* from table patterns to values
//! - a *columns mapping* from (table pattern, column pattern) pairs to values
//!
//! plus a default column value (registered under `*.*`) and a set of named
//! stock values.
//!
//! # Lookup order
//!
//! A lookup evaluates every stored pattern and aggregates all matching values;
//! it never stops at the first match. Matches are folded in ascending
//! specificity (literal characters in the glob, summed over table and column
//! patterns for column entries), ties broken by registration order. With
//! transforms this means broad defaults run first and the most specific
//! entries run last.

use crate::error::ConfigError;
use crate::pattern::{Pattern, DEFAULT_SEPARATOR};
use crate::transform::Transform;
use std::collections::{btree_map, BTreeMap};

/// Values storable in a [`Filters`] registry.
pub trait Mapped: Clone {
    /// Neutral value, returned when nothing matches.
    fn empty() -> Self;

    /// Associative combination of two values, `left` first.
    fn aggregate(left: &Self, right: &Self) -> Self;
}

impl<T> Mapped for Transform<T> {
    fn empty() -> Self {
        Transform::identity()
    }

    fn aggregate(left: &Self, right: &Self) -> Self {
        left.then(right)
    }
}

impl<T: Clone> Mapped for Vec<T> {
    fn empty() -> Self {
        Vec::new()
    }

    fn aggregate(left: &Self, right: &Self) -> Self {
        let mut agg = Vec::with_capacity(left.len() + right.len());
        agg.extend(left.iter().cloned());
        agg.extend(right.iter().cloned());
        agg
    }
}

/// Canonical form of a configuration pattern: trimmed, lowercased, with a
/// lone `_` standing for `*`.
pub fn canonical_key(pattern: &str) -> String {
    let trimmed = pattern.trim();
    if trimmed == "_" {
        "*".to_string()
    } else {
        trimmed.to_lowercase()
    }
}

#[derive(Debug, Clone)]
struct Entry<V> {
    pattern: Pattern,
    value: V,
    seq: usize,
}

#[derive(Debug, Clone)]
struct ColumnGroup<V> {
    pattern: Pattern,
    entries: BTreeMap<String, Entry<V>>,
}

/// Two-level pattern registry with aggregation on collision and on lookup.
#[derive(Debug, Clone)]
pub struct Filters<V: Mapped> {
    separator: char,
    tables: BTreeMap<String, Entry<V>>,
    columns: BTreeMap<String, ColumnGroup<V>>,
    default_column: V,
    stock: BTreeMap<String, V>,
    next_seq: usize,
}

impl<V: Mapped> Default for Filters<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Mapped> Filters<V> {
    pub fn new() -> Self {
        Self::with_separator(DEFAULT_SEPARATOR)
    }

    /// Registry whose patterns never let `*` cross `separator`.
    pub fn with_separator(separator: char) -> Self {
        Self {
            separator,
            tables: BTreeMap::new(),
            columns: BTreeMap::new(),
            default_column: V::empty(),
            stock: BTreeMap::new(),
            next_seq: 0,
        }
    }

    fn compile(&self, key: &str) -> Result<Pattern, ConfigError> {
        Pattern::compile(key, self.separator)
    }

    fn bump(&mut self) -> usize {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Add a table mapping, aggregating with any value already registered
    /// under the same canonical pattern.
    ///
    /// # Arguments
    /// * `pattern` - glob pattern of table names
    /// * `value` - mapped value
    pub fn add_table_mapping(&mut self, pattern: &str, value: V) -> Result<(), ConfigError> {
        let key = canonical_key(pattern);
        if let Some(entry) = self.tables.get_mut(&key) {
            tracing::warn!("table mapping '{}' registered twice, aggregating", key);
            entry.value = V::aggregate(&entry.value, &value);
            return Ok(());
        }
        let pattern = self.compile(&key)?;
        let seq = self.bump();
        self.tables.insert(key, Entry { pattern, value, seq });
        Ok(())
    }

    /// Add a column mapping. Registering under `*` and `*` also sets the
    /// default column value.
    ///
    /// # Arguments
    /// * `table_pattern` - glob pattern of table names
    /// * `column_pattern` - glob pattern of column names
    /// * `value` - mapped value
    pub fn add_column_mapping(
        &mut self,
        table_pattern: &str,
        column_pattern: &str,
        value: V,
    ) -> Result<(), ConfigError> {
        let table_key = canonical_key(table_pattern);
        let column_key = canonical_key(column_pattern);
        let table_compiled = self.compile(&table_key)?;
        let column_compiled = self.compile(&column_key)?;
        let group = self
            .columns
            .entry(table_key.clone())
            .or_insert_with(|| ColumnGroup {
                pattern: table_compiled,
                entries: BTreeMap::new(),
            });
        let stored = match group.entries.entry(column_key.clone()) {
            btree_map::Entry::Occupied(mut occupied) => {
                tracing::warn!(
                    "column mapping '{}.{}' registered twice, aggregating",
                    table_key,
                    column_key
                );
                let entry = occupied.get_mut();
                entry.value = V::aggregate(&entry.value, &value);
                entry.value.clone()
            }
            btree_map::Entry::Vacant(vacant) => {
                let seq = self.next_seq;
                self.next_seq += 1;
                vacant.insert(Entry {
                    pattern: column_compiled,
                    value: value.clone(),
                    seq,
                });
                value
            }
        };
        if table_key == "*" && column_key == "*" {
            self.default_column = stored;
        }
        Ok(())
    }

    /// Register a named reusable value.
    pub fn add_stock_filter(&mut self, name: &str, value: V) -> &mut Self {
        if self.stock.insert(name.to_string(), value).is_some() {
            tracing::warn!("overriding stock filter {}", name);
        }
        self
    }

    pub fn stock_filter(&self, name: &str) -> Option<&V> {
        self.stock.get(name)
    }

    pub fn has_stock_filter(&self, name: &str) -> bool {
        self.stock.contains_key(name)
    }

    /// Names of all stock values, sorted.
    pub fn stock_names(&self) -> Vec<&str> {
        self.stock.keys().map(String::as_str).collect()
    }

    /// All values whose table pattern matches `table`, in fold order.
    pub fn table_matches(&self, table: &str) -> Vec<&V> {
        let mut matched: Vec<(usize, usize, &V)> = self
            .tables
            .values()
            .filter(|entry| entry.pattern.matches(table))
            .map(|entry| (entry.pattern.specificity(), entry.seq, &entry.value))
            .collect();
        matched.sort_by_key(|(specificity, seq, _)| (*specificity, *seq));
        matched.into_iter().map(|(_, _, value)| value).collect()
    }

    /// All values whose table and column patterns both match, in fold order.
    pub fn column_matches(&self, table: &str, column: &str) -> Vec<&V> {
        let mut matched: Vec<(usize, usize, &V)> = self
            .columns
            .values()
            .filter(|group| group.pattern.matches(table))
            .flat_map(|group| {
                let table_specificity = group.pattern.specificity();
                group
                    .entries
                    .values()
                    .filter(move |entry| entry.pattern.matches(column))
                    .map(move |entry| {
                        (
                            table_specificity + entry.pattern.specificity(),
                            entry.seq,
                            &entry.value,
                        )
                    })
            })
            .collect();
        matched.sort_by_key(|(specificity, seq, _)| (*specificity, *seq));
        matched.into_iter().map(|(_, _, value)| value).collect()
    }

    /// Aggregate of every table mapping matching `table`, or the empty value.
    pub fn get_table_filter(&self, table: &str) -> V {
        self.table_matches(table)
            .into_iter()
            .fold(V::empty(), |acc, value| V::aggregate(&acc, value))
    }

    /// Aggregate of every column mapping matching `table` and `column`, or the
    /// empty value.
    pub fn get_column_filter(&self, table: &str, column: &str) -> V {
        self.column_matches(table, column)
            .into_iter()
            .fold(V::empty(), |acc, value| V::aggregate(&acc, value))
    }

    /// Value registered under `*.*`.
    pub fn get_default_column_filter(&self) -> &V {
        &self.default_column
    }

    /// Number of table and column entries.
    pub fn len(&self) -> usize {
        self.tables.len()
            + self
                .columns
                .values()
                .map(|group| group.entries.len())
                .sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
