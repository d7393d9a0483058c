//! PM schema and PM definition entities

use crate::definition::Definition;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Schema of a raw performance-measurement record stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PmSchema {
    /// Schema name (unique)
    pub name: String,
    /// Namespace the schema is published under
    #[serde(default)]
    pub namespace: String,
    /// Counter fields carried by the schema
    #[serde(default)]
    pub counters: Vec<String>,
}

impl PmSchema {
    /// Create new schema
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            counters: Vec::new(),
        }
    }

    /// With counters
    #[inline]
    #[must_use]
    pub fn with_counters<I, S>(mut self, counters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.counters = counters.into_iter().map(Into::into).collect();
        self
    }
}

impl Definition for PmSchema {
    type Key = String;

    const KIND: &'static str = "pm_schema";

    fn key(&self) -> Self::Key {
        self.name.clone()
    }
}

/// Identity of a PM definition: unique per schema
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PmDefinitionKey {
    /// Owning schema
    pub schema: String,
    /// Definition name within the schema
    pub name: String,
}

impl fmt::Display for PmDefinitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.schema, self.name)
    }
}

/// A PM counter exposed to KPI expressions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PmDefinition {
    /// Counter name
    pub name: String,
    /// Schema the counter is read from
    pub schema: String,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PmDefinition {
    /// Create new PM definition
    #[inline]
    #[must_use]
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
            description: None,
        }
    }

    /// With description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Definition for PmDefinition {
    type Key = PmDefinitionKey;

    const KIND: &'static str = "pm_definition";

    fn key(&self) -> Self::Key {
        PmDefinitionKey {
            schema: self.schema.clone(),
            name: self.name.clone(),
        }
    }
}

/// Shorthand counter entry carried by input documents.
///
/// Folded into the document's PM definitions before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PmCounter {
    pub schema: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<PmCounter> for PmDefinition {
    fn from(counter: PmCounter) -> Self {
        Self {
            name: counter.name,
            schema: counter.schema,
            description: counter.description,
        }
    }
}
