//! Vendor-specific SQL dialect settings.

use crate::error::ConfigError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// How the database folds unquoted table names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseSensitivity {
    #[default]
    Unknown,
    Sensitive,
    Lowercase,
    Uppercase,
}

/// Query parameter placeholder style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderStyle {
    /// `?`
    #[default]
    Question,
    /// `$1`, `$2`, ...
    Numbered,
}

/// SQL dialect information of the database driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverInfo {
    pub tag: String,
    pub identifier_quote_char: Option<char>,
    pub tables_case: CaseSensitivity,
    /// Case-insensitive regex of tables skipped during discovery.
    pub ignore_tables: Option<String>,
    pub placeholders: PlaceholderStyle,
    pub strict_column_types: bool,
    /// Append `::type` casts to key parameters (PostgreSQL).
    pub column_markers: bool,
}

impl Default for DriverInfo {
    fn default() -> Self {
        Self {
            tag: "unknown".to_string(),
            identifier_quote_char: None,
            tables_case: CaseSensitivity::Unknown,
            ignore_tables: None,
            placeholders: PlaceholderStyle::Question,
            strict_column_types: false,
            column_markers: false,
        }
    }
}

impl DriverInfo {
    /// Stock settings for a driver tag.
    pub fn for_tag(tag: &str) -> Self {
        let tag = tag.trim().to_ascii_lowercase();
        match tag.as_str() {
            "postgresql" | "postgres" | "pg" => Self {
                tag: "postgresql".to_string(),
                identifier_quote_char: Some('"'),
                tables_case: CaseSensitivity::Lowercase,
                ignore_tables: Some("^(pg_|sql_).*".to_string()),
                placeholders: PlaceholderStyle::Numbered,
                ..Self::default()
            },
            "mysql" | "mariadb" => Self {
                tag,
                identifier_quote_char: Some('`'),
                tables_case: CaseSensitivity::Sensitive,
                ..Self::default()
            },
            "sqlite" => Self {
                tag,
                identifier_quote_char: Some('"'),
                tables_case: CaseSensitivity::Sensitive,
                ..Self::default()
            },
            "hsqldb" | "h2" | "oracle" => Self {
                tag,
                identifier_quote_char: Some('"'),
                tables_case: CaseSensitivity::Uppercase,
                ..Self::default()
            },
            _ => Self {
                tag,
                ..Self::default()
            },
        }
    }

    /// Stock settings guessed from a connection URL.
    pub fn from_url(url: &str) -> Self {
        let mut parts = url.split(':');
        let scheme = match parts.next() {
            Some("jdbc") => parts.next().unwrap_or(""),
            Some(scheme) => scheme,
            None => "",
        };
        Self::for_tag(scheme)
    }

    /// Quote an identifier, doubling embedded quote characters.
    pub fn quote_identifier(&self, id: &str) -> String {
        match self.identifier_quote_char {
            None => id.to_string(),
            Some(q) => {
                let doubled = format!("{}{}", q, q);
                format!("{}{}{}", q, id.replace(q, &doubled), q)
            }
        }
    }

    /// Table name as stored by the database.
    pub fn table_name(&self, table: &str) -> String {
        match self.tables_case {
            CaseSensitivity::Lowercase => table.to_lowercase(),
            CaseSensitivity::Uppercase => table.to_uppercase(),
            CaseSensitivity::Unknown | CaseSensitivity::Sensitive => table.to_string(),
        }
    }

    /// Compiled ignore-tables regex, if any.
    pub fn ignore_pattern(&self) -> Result<Option<Regex>, ConfigError> {
        match self.ignore_tables.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(pattern) => RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map(Some)
                .map_err(|e| ConfigError::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Whether key predicates carry `::type` casts.
    pub fn uses_column_markers(&self) -> bool {
        self.strict_column_types && self.column_markers
    }

    pub fn log(&self) {
        tracing::info!("driver tag: {}", self.tag);
        tracing::info!("driver tables case sensitivity: {:?}", self.tables_case);
        tracing::info!("driver strict column types: {}", self.strict_column_types);
        tracing::info!("driver column markers: {}", self.column_markers);
        tracing::info!("driver ignore tables pattern: {:?}", self.ignore_tables);
        tracing::info!("driver identifier quote char: <{:?}>", self.identifier_quote_char);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoting() {
        assert_eq!(DriverInfo::for_tag("postgresql").quote_identifier("book"), "\"book\"");
        assert_eq!(DriverInfo::for_tag("mysql").quote_identifier("book"), "`book`");
        assert_eq!(DriverInfo::default().quote_identifier("book"), "book");
        assert_eq!(DriverInfo::for_tag("pg").quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_from_url() {
        assert_eq!(DriverInfo::from_url("postgres://u:p@localhost/db").tag, "postgresql");
        assert_eq!(DriverInfo::from_url("mysql://root@localhost/db").tag, "mysql");
        assert_eq!(DriverInfo::from_url("jdbc:hsqldb:mem:test").tag, "hsqldb");
        assert_eq!(DriverInfo::from_url("oops").tag, "oops");
    }

    #[test]
    fn test_table_case() {
        assert_eq!(DriverInfo::for_tag("postgresql").table_name("Book"), "book");
        assert_eq!(DriverInfo::for_tag("h2").table_name("Book"), "BOOK");
        assert_eq!(DriverInfo::for_tag("mysql").table_name("Book"), "Book");
    }

    #[test]
    fn test_ignore_pattern() {
        let driver = DriverInfo::for_tag("postgresql");
        let pattern = driver.ignore_pattern().unwrap().unwrap();
        assert!(pattern.is_match("PG_STATISTIC"));
        assert!(!pattern.is_match("book"));

        let broken = DriverInfo {
            ignore_tables: Some("([".to_string()),
            ..DriverInfo::default()
        };
        assert!(broken.ignore_pattern().is_err());
    }
}
