//! Translation of SQL identifiers into entity and attribute names.

use crate::error::{ConfigError, TransformError};
use crate::filters::configurable::{ConfigurableFilters, Mappings};
use crate::filters::inflector::{EnglishInflector, Inflector};
use crate::transform::Transform;
use convert_case::{Case, Casing};
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Configuration prefix of identifier mappings.
pub const IDENTIFIERS_PREFIX: &str = "identifiers.mapping";

/// `snake_case` to `camelCase`: split on `_`, lowercase everything, then
/// capitalize every part but the first. An empty result becomes `_`. A name
/// already shaped like the output (no `_`, an uppercase letter, not starting
/// with one) is kept as is, so applying the conversion twice changes nothing
/// further.
///
/// # Example
///
/// ```
/// use relmodel::filters::identifiers::snake_to_camel;
///
/// assert_eq!(snake_to_camel("PUBLISHER_ID"), "publisherId");
/// assert_eq!(snake_to_camel("__"), "_");
/// ```
pub fn snake_to_camel(snake: &str) -> String {
    // Already camelCase.
    if !snake.contains('_')
        && !snake.starts_with(char::is_uppercase)
        && snake.chars().any(char::is_uppercase)
    {
        return snake.to_string();
    }
    let lower = snake.to_lowercase();
    let mut out = String::with_capacity(lower.len());
    for part in lower.split('_').filter(|p| !p.is_empty()) {
        if out.is_empty() {
            out.push_str(part);
        } else {
            let mut chars = part.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    if out.is_empty() {
        "_".to_string()
    } else {
        out
    }
}

/// Identifier filters: table and column name mappings plus the inflector
/// used to name plural navigation attributes.
pub struct IdentifiersFilters {
    filters: ConfigurableFilters<String>,
    inflector: Option<Arc<dyn Inflector>>,
    inflectors: BTreeMap<String, Arc<dyn Inflector>>,
}

impl Default for IdentifiersFilters {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentifiersFilters {
    /// Create identifier filters with the stock transforms registered and the
    /// English inflector selected.
    pub fn new() -> Self {
        let mut filters = ConfigurableFilters::new(IDENTIFIERS_PREFIX);
        filters
            .add_stock_filter("lowercase", Transform::new("lowercase", |s: String| Ok(s.to_lowercase())))
            .add_stock_filter("uppercase", Transform::new("uppercase", |s: String| Ok(s.to_uppercase())))
            .add_stock_filter("snake_to_camel", Transform::new("snake_to_camel", |s: String| Ok(snake_to_camel(&s))))
            .add_stock_filter("camel_to_snake", Transform::new("camel_to_snake", |s: String| Ok(s.to_case(Case::Snake))))
            .add_stock_filter("pascal", Transform::new("pascal", |s: String| Ok(s.to_case(Case::Pascal))))
            .add_stock_filter(
                "plural_en",
                Transform::new("plural_en", |s: String| EnglishInflector.plural(&s)),
            );
        Self {
            filters,
            inflector: Some(Arc::new(EnglishInflector)),
            inflectors: BTreeMap::new(),
        }
    }

    /// Register a named inflector, selectable through [`set_inflector`].
    ///
    /// [`set_inflector`]: IdentifiersFilters::set_inflector
    pub fn register_inflector(&mut self, name: &str, inflector: Arc<dyn Inflector>) -> &mut Self {
        self.inflectors.insert(name.to_string(), inflector);
        self
    }

    /// Select the inflector by name.
    ///
    /// # Arguments
    /// * `name` - empty or `none` for no pluralization, `english`/`en` for the
    ///   built-in pluralizer, or the name of a registered inflector
    pub fn set_inflector(&mut self, name: &str) -> Result<(), ConfigError> {
        let name = name.trim();
        self.inflector = match name.to_ascii_lowercase().as_str() {
            "" | "none" => None,
            "english" | "en" => Some(Arc::new(EnglishInflector)),
            _ => match self.inflectors.get(name) {
                Some(inflector) => Some(Arc::clone(inflector)),
                None => return Err(ConfigError::Inflector(name.to_string())),
            },
        };
        Ok(())
    }

    /// Use `inflector` directly.
    pub fn set_inflector_impl(&mut self, inflector: Arc<dyn Inflector>) {
        self.inflector = Some(inflector);
    }

    /// Plural form of `word` through the selected inflector, `word` itself
    /// when pluralization is disabled.
    pub fn pluralize(&self, word: &str) -> Result<String, TransformError> {
        match &self.inflector {
            Some(inflector) => inflector.plural(word),
            None => Ok(word.to_string()),
        }
    }

    /// Alias of [`ConfigurableFilters::add_mappings`], matching the
    /// `identifiers.mapping` configuration key.
    pub fn set_mapping(&mut self, mappings: &Mappings) -> Result<(), ConfigError> {
        self.filters.add_mappings(mappings)
    }

    /// Entity name for a SQL table. Unmapped names pass through unchanged.
    pub fn transform_table_name(&self, sql_table: &str) -> Result<String, TransformError> {
        self.filters.get_table_filter(sql_table).apply(sql_table.to_string())
    }

    /// Attribute name for a column of a SQL table.
    pub fn transform_column_name(&self, sql_table: &str, sql_column: &str) -> Result<String, TransformError> {
        self.filters
            .get_column_filter(sql_table, sql_column)
            .apply(sql_column.to_string())
    }

    /// Attribute name for a column, through the default column mapping only.
    pub fn transform_column_name_default(&self, sql_column: &str) -> Result<String, TransformError> {
        self.filters
            .get_default_column_filter()
            .apply(sql_column.to_string())
    }
}

impl Deref for IdentifiersFilters {
    type Target = ConfigurableFilters<String>;

    fn deref(&self) -> &Self::Target {
        &self.filters
    }
}

impl DerefMut for IdentifiersFilters {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.filters
    }
}

impl std::fmt::Debug for IdentifiersFilters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifiersFilters")
            .field("filters", &self.filters)
            .field("inflector", &self.inflector.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_to_camel() {
        assert_eq!(snake_to_camel("book_id"), "bookId");
        assert_eq!(snake_to_camel("AUTHOR_BOOK"), "authorBook");
        assert_eq!(snake_to_camel("_leading__double_"), "leadingDouble");
        assert_eq!(snake_to_camel(""), "_");
        assert_eq!(snake_to_camel("Book"), "book");
        assert_eq!(snake_to_camel("BookTitle"), "booktitle");
        assert_eq!(snake_to_camel("bookTitle"), "bookTitle");
    }

    #[test]
    fn test_snake_to_camel_is_idempotent() {
        for word in ["book_id", "publisherId", "A_B_C", "PLAIN", "__", "x_1", "BookTitle", "1_a"] {
            let once = snake_to_camel(word);
            assert_eq!(snake_to_camel(&once), once);
        }
    }

    #[test]
    fn test_unmapped_names_pass_through() {
        let filters = IdentifiersFilters::new();
        assert_eq!(filters.transform_table_name("Book_Shelf").unwrap(), "Book_Shelf");
        assert_eq!(filters.transform_column_name("book", "ISBN").unwrap(), "ISBN");
    }

    #[test]
    fn test_table_and_column_mappings() {
        let mut filters = IdentifiersFilters::new();
        filters.add_mappings_str("lowercase, *.*_id=snake_to_camel").unwrap();
        assert_eq!(filters.transform_table_name("BOOK").unwrap(), "book");
        assert_eq!(filters.transform_column_name("BOOK", "TITLE").unwrap(), "title");
        assert_eq!(filters.transform_column_name("BOOK", "PUBLISHER_ID").unwrap(), "publisherId");
        assert_eq!(filters.transform_column_name_default("TITLE").unwrap(), "title");
    }

    #[test]
    fn test_extra_case_conversions() {
        let mut filters = IdentifiersFilters::new();
        filters.add_mapping_str("*", "pascal").unwrap();
        filters.add_mapping_str("*.*", "camel_to_snake").unwrap();
        assert_eq!(filters.transform_table_name("author_book").unwrap(), "AuthorBook");
        assert_eq!(filters.transform_column_name("t", "publisherId").unwrap(), "publisher_id");
    }

    #[test]
    fn test_regex_rules_on_identifiers() {
        let mut filters = IdentifiersFilters::new();
        filters.add_mapping_str("*", "/^tbl_//").unwrap();
        assert_eq!(filters.transform_table_name("TBL_book").unwrap(), "book");
    }

    #[test]
    fn test_inflector_selection() {
        let mut filters = IdentifiersFilters::new();
        assert_eq!(filters.pluralize("book").unwrap(), "books");

        filters.set_inflector("none").unwrap();
        assert_eq!(filters.pluralize("book").unwrap(), "book");

        filters.register_inflector(
            "latin",
            Arc::new(|w: &str| Ok::<_, TransformError>(format!("{}i", w.trim_end_matches("us")))),
        );
        filters.set_inflector("latin").unwrap();
        assert_eq!(filters.pluralize("cactus").unwrap(), "cacti");

        assert_eq!(
            filters.set_inflector("klingon"),
            Err(ConfigError::Inflector("klingon".to_string()))
        );
    }
}
