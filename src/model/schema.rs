//! Reverse-engineered schema and its serializable summary.

use crate::model::attribute::{Attribute, AttributeKind, AttributeOrigin};
use crate::model::driver::DriverInfo;
use crate::model::entity::Entity;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Entities of an initialized model.
#[derive(Debug)]
pub struct Schema {
    model_id: String,
    driver: Arc<DriverInfo>,
    entities: IndexMap<String, Entity>,
    tables: HashMap<String, String>,
}

impl Schema {
    pub fn new(model_id: impl Into<String>, driver: Arc<DriverInfo>, entities: IndexMap<String, Entity>) -> Self {
        let tables = entities
            .values()
            .filter_map(|e| e.table().map(|t| (t.to_string(), e.name().to_string())))
            .collect();
        Self {
            model_id: model_id.into(),
            driver,
            entities,
            tables,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn driver(&self) -> &DriverInfo {
        &self.driver
    }

    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    pub fn entity_for_table(&self, table: &str) -> Option<&Entity> {
        self.tables.get(table).and_then(|name| self.entities.get(name))
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Serializable view of the schema, with SQL rendered in the driver's
    /// placeholder style.
    pub fn summary(&self) -> SchemaSummary {
        SchemaSummary {
            model_id: self.model_id.clone(),
            driver: self.driver.tag.clone(),
            entities: self.entities.values().map(|e| self.entity_summary(e)).collect(),
        }
    }

    fn entity_summary(&self, entity: &Entity) -> EntitySummary {
        let generated = [
            entity.iterate_attribute(),
            entity.count_attribute(),
            entity.fetch_attribute(),
            entity.delete_attribute(),
            entity.update_attribute(),
        ];
        EntitySummary {
            name: entity.name().to_string(),
            table: entity.table().map(str::to_string),
            primary_key: entity
                .sql_primary_key()
                .map(|k| k.to_vec())
                .unwrap_or_default(),
            columns: entity
                .columns()
                .map(|c| ColumnSummary {
                    name: c.name.clone(),
                    sql_name: c.sql_name.clone(),
                    type_name: c.type_name.clone(),
                    key: c.is_key_column(),
                    enum_values: c.enum_values().map(|v| v.to_vec()),
                })
                .collect(),
            attributes: generated
                .into_iter()
                .flatten()
                .chain(entity.attributes())
                .map(|a| self.attribute_summary(a))
                .collect(),
        }
    }

    fn attribute_summary(&self, attribute: &Attribute) -> AttributeSummary {
        AttributeSummary {
            name: attribute.name.clone(),
            kind: attribute.kind,
            origin: attribute.origin,
            result: attribute.result_entity.clone(),
            sql: attribute.query.render(self.driver.placeholders),
            parameters: attribute
                .query
                .parameters()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSummary {
    pub model_id: String,
    pub driver: String,
    pub entities: Vec<EntitySummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub primary_key: Vec<String>,
    pub columns: Vec<ColumnSummary>,
    pub attributes: Vec<AttributeSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub name: String,
    pub sql_name: String,
    pub type_name: String,
    #[serde(default)]
    pub key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSummary {
    pub name: String,
    pub kind: AttributeKind,
    pub origin: AttributeOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub sql: String,
    #[serde(default)]
    pub parameters: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ColumnInfo;
    use crate::model::column::Column;

    #[test]
    fn test_summary_lists_generated_attributes() {
        let driver = Arc::new(DriverInfo::for_tag("postgresql"));
        let mut publisher = Entity::new("publisher", Arc::clone(&driver));
        publisher.set_table(Some("publisher".to_string()), false);
        publisher
            .add_column(Column::new("publisher_id", &ColumnInfo::new("publisher_id", "serial")))
            .unwrap();
        publisher.set_sql_primary_key(vec!["publisher_id".to_string()]);
        publisher.initialize();

        let mut entities = IndexMap::new();
        entities.insert("publisher".to_string(), publisher);
        let schema = Schema::new("bookshelf", driver, entities);
        assert!(schema.entity_for_table("publisher").is_some());

        let summary = schema.summary();
        let names: Vec<&str> = summary.entities[0]
            .attributes
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["iterate", "count", "fetch", "delete", "update"]);
        assert_eq!(
            summary.entities[0].attributes[2].sql,
            "SELECT * FROM \"publisher\" WHERE \"publisher_id\" = $1"
        );
        assert!(summary.entities[0].columns[0].key);

        let yaml = serde_yaml::to_string(&summary).unwrap();
        assert!(yaml.contains("model_id: bookshelf"));
    }
}
