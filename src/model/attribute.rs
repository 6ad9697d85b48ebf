//! Entity attributes and their parameterized SQL.

use crate::model::driver::PlaceholderStyle;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Piece of a parameterized query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPart {
    Text(String),
    /// Named parameter, rendered as a placeholder.
    Param(String),
    /// Slot filled at execution time, such as the SET list of an update.
    Dynamic,
}

/// Parameterized SQL text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    parts: Vec<QueryPart>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&mut self, text: &str) -> &mut Self {
        if let Some(QueryPart::Text(last)) = self.parts.last_mut() {
            last.push_str(text);
        } else if !text.is_empty() {
            self.parts.push(QueryPart::Text(text.to_string()));
        }
        self
    }

    pub fn push_param(&mut self, name: &str) -> &mut Self {
        self.parts.push(QueryPart::Param(name.to_string()));
        self
    }

    pub fn push_dynamic(&mut self) -> &mut Self {
        self.parts.push(QueryPart::Dynamic);
        self
    }

    pub fn parts(&self) -> &[QueryPart] {
        &self.parts
    }

    /// Parameter names, in order of appearance.
    pub fn parameters(&self) -> Vec<&str> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                QueryPart::Param(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn has_dynamic_part(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, QueryPart::Dynamic))
    }

    /// SQL text with placeholders in the given style. The dynamic slot is
    /// rendered as `{set}`.
    pub fn render(&self, style: PlaceholderStyle) -> String {
        let mut sql = String::new();
        let mut index = 0;
        for part in &self.parts {
            match part {
                QueryPart::Text(text) => sql.push_str(text),
                QueryPart::Param(_) => {
                    index += 1;
                    match style {
                        PlaceholderStyle::Question => sql.push('?'),
                        PlaceholderStyle::Numbered => sql.push_str(&format!("${}", index)),
                    }
                }
                QueryPart::Dynamic => sql.push_str("{set}"),
            }
        }
        sql
    }

    /// Copy of this query with the dynamic slot replaced by `fill`.
    pub fn with_dynamic(&self, fill: &Query) -> Query {
        let mut query = Query::new();
        for part in &self.parts {
            match part {
                QueryPart::Text(text) => {
                    query.push_text(text);
                }
                QueryPart::Param(name) => {
                    query.push_param(name);
                }
                QueryPart::Dynamic => {
                    for inner in &fill.parts {
                        match inner {
                            QueryPart::Text(text) => query.push_text(text),
                            QueryPart::Param(name) => query.push_param(name),
                            QueryPart::Dynamic => query.push_dynamic(),
                        };
                    }
                }
            }
        }
        query
    }

    /// Parse SQL text holding `<name>` parameter markers.
    ///
    /// A `<` not followed by an identifier and a closing `>` is kept as
    /// text, so comparisons such as `a < b` survive.
    pub fn parse(sql: &str) -> Query {
        let mut query = Query::new();
        let mut rest = sql;
        while let Some(start) = rest.find('<') {
            let after = &rest[start + 1..];
            let name_len = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            if name_len > 0 && after[name_len..].starts_with('>') {
                query.push_text(&rest[..start]);
                query.push_param(&after[..name_len]);
                rest = &after[name_len + 1..];
            } else {
                query.push_text(&rest[..=start]);
                rest = after;
            }
        }
        query.push_text(rest);
        query
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            match part {
                QueryPart::Text(text) => f.write_str(text)?,
                QueryPart::Param(name) => write!(f, "<{}>", name)?,
                QueryPart::Dynamic => f.write_str("{set}")?,
            }
        }
        Ok(())
    }
}

/// What executing an attribute yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    Scalar,
    Row,
    Rowset,
    Action,
}

/// How an attribute came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeOrigin {
    Declared,
    /// CRUD attribute built at entity initialization.
    Generated,
    /// Join toward the referenced row.
    Upstream,
    /// Join toward the referencing rows.
    Downstream,
    /// Many-to-many join through a junction table.
    ExtendedJoin,
}

/// A named, parameterized query attached to an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub kind: AttributeKind,
    /// Entity of the returned rows, for row and rowset attributes.
    pub result_entity: Option<String>,
    pub query: Query,
    pub origin: AttributeOrigin,
    /// Generated key column an insert retrieves.
    pub generated_key_column: Option<String>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, kind: AttributeKind, query: Query, origin: AttributeOrigin) -> Self {
        Self {
            name: name.into(),
            kind,
            result_entity: None,
            query,
            origin,
            generated_key_column: None,
        }
    }

    pub fn returning(mut self, entity: impl Into<String>) -> Self {
        self.result_entity = Some(entity.into());
        self
    }

    pub fn is_declared(&self) -> bool {
        self.origin == AttributeOrigin::Declared
    }
}
