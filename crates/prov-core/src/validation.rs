//! Reference validation of definitions
//!
//! [`ReferenceValidator`] is the default [`Validator`]. It checks that
//! definitions are well formed and that every cross reference resolves
//! within the cumulative submission.

use crate::collaborators::Validator;
use crate::context::ValidPmDefinitions;
use crate::error::ValidationError;
use prov_model::{AugmentationDefinition, PmDefinition, ResourceSubmission};
use std::collections::BTreeMap;

/// Aggregation periods (minutes) the KPI calculator supports
pub const SUPPORTED_PERIODS: [u32; 3] = [15, 60, 1440];

/// Default reference-checking validator
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceValidator;

impl ReferenceValidator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Validator for ReferenceValidator {
    fn validate_augmentations(
        &self,
        augmentations: &[AugmentationDefinition],
        submission: &ResourceSubmission,
    ) -> Result<(), ValidationError> {
        for augmentation in augmentations {
            let name = augmentation.name.as_str();
            if name.is_empty() {
                return Err(ValidationError::invalid("augmentation", name, "empty name"));
            }
            if !(augmentation.url.starts_with("http://") || augmentation.url.starts_with("https://"))
            {
                return Err(ValidationError::invalid(
                    "augmentation",
                    name,
                    format!("url '{}' is not http(s)", augmentation.url),
                ));
            }
            if augmentation.output_schema.is_empty() {
                return Err(ValidationError::invalid(
                    "augmentation",
                    name,
                    "empty output schema",
                ));
            }
            if augmentation.rules.is_empty() {
                return Err(ValidationError::invalid("augmentation", name, "no rules"));
            }
            for rule in &augmentation.rules {
                if rule.input_schema == augmentation.output_schema {
                    return Err(ValidationError::invalid(
                        "augmentation",
                        name,
                        "output schema is also an input schema",
                    ));
                }
                if !submission.has_schema(&rule.input_schema) {
                    return Err(ValidationError::unresolved(
                        "augmentation",
                        name,
                        "pm schema",
                        &rule.input_schema,
                    ));
                }
            }
        }
        Ok(())
    }

    fn validate_kpi_definitions(
        &self,
        submission: &ResourceSubmission,
    ) -> Result<(), ValidationError> {
        for kpi in submission.kpi_definitions.values() {
            let name = kpi.name.as_str();
            if name.is_empty() {
                return Err(ValidationError::invalid("kpi", name, "empty name"));
            }
            if !is_identifier(&kpi.alias) {
                return Err(ValidationError::invalid(
                    "kpi",
                    name,
                    format!("alias '{}' is not an identifier", kpi.alias),
                ));
            }
            if kpi.expression.trim().is_empty() {
                return Err(ValidationError::invalid("kpi", name, "empty expression"));
            }
            if let Some(period) = kpi.aggregation_period {
                if !SUPPORTED_PERIODS.contains(&period) {
                    return Err(ValidationError::invalid(
                        "kpi",
                        name,
                        format!("unsupported aggregation period {period}"),
                    ));
                }
            }
            for input in &kpi.inputs {
                if input == name {
                    return Err(ValidationError::invalid("kpi", name, "references itself"));
                }
                if submission.kpi(input).is_none() && !submission.has_pm_definition_named(input) {
                    return Err(ValidationError::unresolved("kpi", name, "input", input));
                }
            }
        }
        Ok(())
    }

    fn validate_profile_definitions(
        &self,
        submission: &ResourceSubmission,
    ) -> Result<(), ValidationError> {
        for profile in submission.profile_definitions.values() {
            let name = profile.name.as_str();
            if name.is_empty() {
                return Err(ValidationError::invalid("profile", name, "empty name"));
            }
            if let Some(kpi) = profile.kpis.iter().find(|k| submission.kpi(k).is_none()) {
                return Err(ValidationError::unresolved("profile", name, "kpi", kpi));
            }
            if let Some(augmentation) = profile
                .augmentations
                .iter()
                .find(|a| submission.augmentation(a).is_none())
            {
                return Err(ValidationError::unresolved(
                    "profile",
                    name,
                    "augmentation",
                    augmentation,
                ));
            }
        }
        Ok(())
    }

    fn valid_pm_definitions(
        &self,
        candidates: &[PmDefinition],
        submission: &ResourceSubmission,
    ) -> ValidPmDefinitions {
        let mut grouped: BTreeMap<String, BTreeMap<String, PmDefinition>> = BTreeMap::new();
        for definition in candidates {
            if let Some(reason) = pm_rejection(definition, submission) {
                tracing::warn!(
                    schema = %definition.schema,
                    name = %definition.name,
                    reason,
                    "dropping invalid pm definition"
                );
                continue;
            }
            grouped
                .entry(definition.schema.clone())
                .or_default()
                .insert(definition.name.clone(), definition.clone());
        }
        grouped
            .into_iter()
            .map(|(schema, by_name)| (schema, by_name.into_values().collect()))
            .collect()
    }
}

fn pm_rejection(definition: &PmDefinition, submission: &ResourceSubmission) -> Option<&'static str> {
    if definition.name.is_empty() {
        return Some("empty name");
    }
    if !submission.has_schema(&definition.schema) {
        return Some("unknown schema");
    }
    let declared = submission
        .pm_schemas
        .get(&definition.schema)
        .map(|schema| &schema.counters);
    match declared {
        Some(counters) if !counters.is_empty() && !counters.contains(&definition.name) => {
            Some("counter not declared by schema")
        }
        _ => None,
    }
}
