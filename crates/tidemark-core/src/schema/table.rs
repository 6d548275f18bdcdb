use serde::{Deserialize, Serialize};

use super::types::AttributeType;
use crate::error::{MigrateError, Result};

/// A key attribute declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    /// Attribute name.
    pub name: String,
    /// Attribute type.
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
}

impl AttributeDefinition {
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
        }
    }
}

/// Primary key of a table: a hash key and an optional range key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySchema {
    pub hash_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_key: Option<String>,
}

impl KeySchema {
    /// Single-attribute primary key.
    pub fn hash(name: impl Into<String>) -> Self {
        Self {
            hash_key: name.into(),
            range_key: None,
        }
    }

    /// Composite primary key.
    pub fn composite(hash: impl Into<String>, range: impl Into<String>) -> Self {
        Self {
            hash_key: hash.into(),
            range_key: Some(range.into()),
        }
    }
}

/// Everything needed to create a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Table name.
    pub name: String,
    /// Key attribute declarations.
    pub attributes: Vec<AttributeDefinition>,
    /// Primary key.
    pub key: KeySchema,
}

impl TableSpec {
    /// Start building a table spec.
    pub fn builder(name: impl Into<String>) -> TableSpecBuilder {
        TableSpecBuilder {
            name: name.into(),
            attributes: Vec::new(),
            key: None,
        }
    }

    /// Check that every key attribute has a declaration.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(MigrateError::InvalidArgument("table name is empty".into()));
        }

        let declared = |name: &str| self.attributes.iter().any(|a| a.name == name);
        if !declared(&self.key.hash_key) {
            return Err(MigrateError::InvalidArgument(format!(
                "table '{}': hash key '{}' has no attribute definition",
                self.name, self.key.hash_key
            )));
        }
        if let Some(range) = &self.key.range_key {
            if !declared(range) {
                return Err(MigrateError::InvalidArgument(format!(
                    "table '{}': range key '{}' has no attribute definition",
                    self.name, range
                )));
            }
        }
        Ok(())
    }
}

/// Builder for [`TableSpec`].
pub struct TableSpecBuilder {
    name: String,
    attributes: Vec<AttributeDefinition>,
    key: Option<KeySchema>,
}

impl TableSpecBuilder {
    /// Declare a key attribute.
    pub fn attribute(mut self, name: impl Into<String>, attribute_type: AttributeType) -> Self {
        self.attributes
            .push(AttributeDefinition::new(name, attribute_type));
        self
    }

    /// Set a single-attribute primary key.
    pub fn hash_key(mut self, name: impl Into<String>) -> Self {
        self.key = Some(KeySchema::hash(name));
        self
    }

    /// Set a composite primary key.
    pub fn composite_key(mut self, hash: impl Into<String>, range: impl Into<String>) -> Self {
        self.key = Some(KeySchema::composite(hash, range));
        self
    }

    /// Build and validate the spec.
    pub fn build(self) -> Result<TableSpec> {
        let key = self.key.ok_or_else(|| {
            MigrateError::InvalidArgument(format!("table '{}' has no primary key", self.name))
        })?;
        let spec = TableSpec {
            name: self.name,
            attributes: self.attributes,
            key,
        };
        spec.validate()?;
        Ok(spec)
    }
}
