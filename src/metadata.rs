//! Declarative metadata model
//!
//! This is the shape in which the external annotation harvester hands over
//! what it discovered about classes and fields. Every declarative tag is a
//! variant keyed by its kind, so the aggregator in
//! [`table_config`](crate::table_config) can walk the model without knowing
//! anything about the host ORM.

use crate::error::SynthResult;
use serde::Deserialize;

/// Everything the harvester discovered for one persistence unit
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaModel {
    #[serde(default)]
    pub entities: Vec<EntityModel>,
    #[serde(default)]
    pub embeddables: Vec<EmbeddableModel>,
}

impl SchemaModel {
    /// Parse the harvester's JSON output
    pub fn from_json(json: &str) -> SynthResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn entity(&self, name: &str) -> Option<&EntityModel> {
        self.entities.iter().find(|e| e.name == name)
    }

    pub fn embeddable(&self, name: &str) -> Option<&EmbeddableModel> {
        self.embeddables.iter().find(|e| e.name == name)
    }
}

/// One persistent class
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityModel {
    /// Class name
    pub name: String,
    /// Explicit table name; derived from the class name when absent
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub superclass: Option<String>,
    /// Contributes fields to subclasses but owns no table
    #[serde(default)]
    pub mapped_superclass: bool,
    #[serde(default)]
    pub fields: Vec<FieldModel>,
    #[serde(default)]
    pub tags: Vec<EntityTag>,
}

impl EntityModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn mapped_superclass(mut self) -> Self {
        self.mapped_superclass = true;
        self
    }

    pub fn field(mut self, field: FieldModel) -> Self {
        self.fields.push(field);
        self
    }

    pub fn tag(mut self, tag: EntityTag) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn has_tag(&self, predicate: impl Fn(&EntityTag) -> bool) -> bool {
        self.tags.iter().any(predicate)
    }
}

/// A value type whose fields are stored inline in the owning table
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmbeddableModel {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldModel>,
}

impl EmbeddableModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldModel) -> Self {
        self.fields.push(field);
        self
    }
}

/// One persistent attribute
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldModel {
    pub name: String,
    /// Explicit column name
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub tags: Vec<FieldTag>,
}

impl FieldModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn tag(mut self, tag: FieldTag) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn has_tag(&self, predicate: impl Fn(&FieldTag) -> bool) -> bool {
        self.tags.iter().any(predicate)
    }
}

/// Class-level declarative tags
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityTag {
    /// Keep a history table maintained by triggers
    Temporal,
    /// Add audit columns and the stamping trigger
    Auditable,
    Partitioned(PartitionDeclaration),
    Render { enabled: bool },
    /// A view replaces the table; the table itself is not rendered
    SupersededByView,
    /// Short owner name used when deriving object names
    ShortName { name: String },
    Index(IndexDeclaration),
    UniqueConstraint(IndexDeclaration),
    Deferred {
        name: String,
        #[serde(default)]
        declaration: Option<String>,
        #[serde(default)]
        unique_columns: Vec<String>,
        #[serde(default = "default_true")]
        initially_deferred: bool,
    },
    Sequence(SequenceDeclaration),
    Comment { text: String },
}

/// Field-level declarative tags
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldTag {
    Id,
    EmbeddedId { embeddable: String },
    Embedded { embeddable: String },
    /// Renames a column of an embedded type, addressed by attribute path
    AttributeOverride { path: String, column: String },
    Enumerated {
        values: Vec<String>,
        #[serde(default)]
        ordinal: bool,
    },
    Default { expression: String },
    Version,
    /// Changes to this column alone never produce a history row
    NotHistorized,
    Translatable,
    /// Links the row to its translations; the column becomes the detail table's parent key
    I18nKey { language_column: String },
    ManyToOne {
        target: String,
        #[serde(default)]
        join_column: Option<String>,
        #[serde(default)]
        cascade_delete: bool,
        #[serde(default)]
        cascade_nullable: bool,
        #[serde(default)]
        no_foreign_key: bool,
        /// `Some(initially_deferred)` when the FK must be deferrable
        #[serde(default)]
        deferred: Option<bool>,
    },
    ManyToMany {
        target: String,
        #[serde(default)]
        join_table: Option<String>,
        #[serde(default)]
        join_column: Option<String>,
        #[serde(default)]
        inverse_join_column: Option<String>,
    },
    ElementCollection {
        #[serde(default)]
        table: Option<String>,
        #[serde(default)]
        join_column: Option<String>,
    },
    Comment { text: String },
}

/// Range partitioning on a date/timestamp column
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PartitionDeclaration {
    pub column: String,
    #[serde(default)]
    pub interval: PartitionInterval,
    /// First boundary, `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`
    pub first_boundary: String,
    #[serde(default)]
    pub local_primary_key: bool,
    /// Default used when the column has to be added to the table
    #[serde(default)]
    pub default_expression: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionInterval {
    Day,
    #[default]
    Month,
    Year,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct IndexDeclaration {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    /// Explicit SQL fragment replacing the column list, e.g. `lower(email)`
    #[serde(default)]
    pub sql: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SequenceDeclaration {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_one")]
    pub start: i64,
    #[serde(default = "default_one")]
    pub increment: i64,
}

fn default_true() -> bool {
    true
}

fn default_one() -> i64 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let json = r#"{
            "entities": [{
                "name": "Customer",
                "tags": [{"kind": "temporal"}, {"kind": "short_name", "name": "cust"}],
                "fields": [
                    {"name": "id", "tags": [{"kind": "id"}]},
                    {"name": "status", "tags": [{"kind": "enumerated", "values": ["ACTIVE", "CLOSED"]}]},
                    {"name": "region", "tags": [{"kind": "many_to_one", "target": "Region", "cascade_delete": true}]}
                ]
            }]
        }"#;
        let model = SchemaModel::from_json(json).unwrap();
        let customer = model.entity("Customer").unwrap();
        assert!(customer.has_tag(|t| matches!(t, EntityTag::Temporal)));
        assert_eq!(customer.fields.len(), 3);
        match &customer.fields[2].tags[0] {
            FieldTag::ManyToOne { target, cascade_delete, deferred, .. } => {
                assert_eq!(target, "Region");
                assert!(cascade_delete);
                assert!(deferred.is_none());
            }
            other => panic!("unexpected tag {:?}", other),
        }
    }

    #[test]
    fn test_partition_defaults() {
        let json = r#"{"kind": "partitioned", "column": "booked_at", "first_boundary": "2024-01-01"}"#;
        let tag: EntityTag = serde_json::from_str(json).unwrap();
        match tag {
            EntityTag::Partitioned(p) => {
                assert_eq!(p.interval, PartitionInterval::Month);
                assert!(!p.local_primary_key);
            }
            other => panic!("unexpected tag {:?}", other),
        }
    }

    #[test]
    fn test_invalid_json() {
        assert!(SchemaModel::from_json("{\"entities\": 1}").is_err());
    }
}
