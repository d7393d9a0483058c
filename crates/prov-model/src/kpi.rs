//! KPI definition entity

use crate::definition::Definition;
use serde::{Deserialize, Serialize};

/// KPI calculated downstream from PM definitions or other KPIs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KpiDefinition {
    /// KPI name (unique)
    pub name: String,
    /// Output table alias
    pub alias: String,
    /// Calculation expression, opaque to provisioning
    pub expression: String,
    /// Aggregation period in minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation_period: Option<u32>,
    /// Names of PM definitions or KPIs the expression reads
    #[serde(default)]
    pub inputs: Vec<String>,
}

impl KpiDefinition {
    /// Create new KPI definition
    #[inline]
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        alias: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            alias: alias.into(),
            expression: expression.into(),
            aggregation_period: None,
            inputs: Vec::new(),
        }
    }

    /// With aggregation period in minutes
    #[inline]
    #[must_use]
    pub fn with_period(mut self, minutes: u32) -> Self {
        self.aggregation_period = Some(minutes);
        self
    }

    /// With expression inputs
    #[inline]
    #[must_use]
    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// Name of the table the calculator writes this KPI into.
    ///
    /// `kpi_<alias>_<period>`, or `kpi_<alias>_` for non-aggregated KPIs.
    #[must_use]
    pub fn output_table(&self) -> String {
        match self.aggregation_period {
            Some(period) => format!("kpi_{}_{}", self.alias, period),
            None => format!("kpi_{}_", self.alias),
        }
    }
}

impl Definition for KpiDefinition {
    type Key = String;

    const KIND: &'static str = "kpi";

    fn key(&self) -> Self::Key {
        self.name.clone()
    }
}
