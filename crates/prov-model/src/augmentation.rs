//! Augmentation definition entity

use crate::definition::Definition;
use serde::{Deserialize, Serialize};

/// Enrichment service registration that derives an augmented schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AugmentationDefinition {
    /// Registration name (unique)
    pub name: String,
    /// Enrichment service endpoint
    pub url: String,
    /// Schema the augmented records are published as
    pub output_schema: String,
    /// Per-input-schema enrichment rules
    #[serde(default)]
    pub rules: Vec<AugmentationRule>,
}

/// One enrichment rule: which fields to add to records of an input schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AugmentationRule {
    pub input_schema: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

impl AugmentationDefinition {
    /// Create new augmentation definition
    #[inline]
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        output_schema: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            output_schema: output_schema.into(),
            rules: Vec::new(),
        }
    }

    /// With rule
    #[inline]
    #[must_use]
    pub fn with_rule<I, S>(mut self, input_schema: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rules.push(AugmentationRule {
            input_schema: input_schema.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Input schemas read by this augmentation
    pub fn input_schemas(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.input_schema.as_str())
    }
}

impl Definition for AugmentationDefinition {
    type Key = String;

    const KIND: &'static str = "augmentation";

    fn key(&self) -> Self::Key {
        self.name.clone()
    }
}
