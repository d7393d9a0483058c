//! Profile and index definition entities

use crate::definition::Definition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Profile grouping the KPIs and augmentations deployed together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDefinition {
    /// Profile name (unique)
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// KPI names the profile exposes
    #[serde(default)]
    pub kpis: Vec<String>,
    /// Augmentation names the profile relies on
    #[serde(default)]
    pub augmentations: Vec<String>,
}

impl ProfileDefinition {
    /// Create new profile definition
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            kpis: Vec::new(),
            augmentations: Vec::new(),
        }
    }

    /// With KPI references
    #[inline]
    #[must_use]
    pub fn with_kpis<I, S>(mut self, kpis: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.kpis = kpis.into_iter().map(Into::into).collect();
        self
    }

    /// With augmentation references
    #[inline]
    #[must_use]
    pub fn with_augmentations<I, S>(mut self, augmentations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.augmentations = augmentations.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the profile references the named KPI
    #[inline]
    #[must_use]
    pub fn references_kpi(&self, name: &str) -> bool {
        self.kpis.iter().any(|k| k == name)
    }

    /// Whether the profile references the named augmentation
    #[inline]
    #[must_use]
    pub fn references_augmentation(&self, name: &str) -> bool {
        self.augmentations.iter().any(|a| a == name)
    }
}

impl Definition for ProfileDefinition {
    type Key = String;

    const KIND: &'static str = "profile";

    fn key(&self) -> Self::Key {
        self.name.clone()
    }
}

/// Search index provisioned per profile over its KPI output tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Index name, equal to the owning profile name
    pub name: String,
    /// KPIs exposed through the index
    pub kpis: BTreeSet<String>,
    /// KPI output tables the indexer reads
    pub source_tables: BTreeSet<String>,
}

impl Definition for IndexDefinition {
    type Key = String;

    const KIND: &'static str = "index";

    fn key(&self) -> Self::Key {
        self.name.clone()
    }
}
