//! Saved reports, the unit of work for preloading.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::entity::{EntityInstanceId, EntityType};
use super::filter::Filter;
use super::subset::SubsetId;
use crate::define_id_type;
use crate::services::error::{CalculationError, CalculationResult};

define_id_type!(i64, ReportId);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedReport {
    pub id: ReportId,
    pub name: String,
    pub measure_name: String,
    #[serde(default)]
    pub entity_type: Option<EntityType>,
    #[serde(default)]
    pub entity_instance_ids: Vec<EntityInstanceId>,
    #[serde(default)]
    pub filter: Filter,
    /// Days of data ending on the subset's latest complete day.
    pub period_days: u32,
    /// Subsets the report applies to; `None` means every subset.
    #[serde(default)]
    pub subset_ids: Option<Vec<SubsetId>>,
    /// Names of the saved breakdowns shown with the report.
    #[serde(default)]
    pub breaks: Vec<String>,
}

impl SavedReport {
    pub fn applies_to(&self, subset: &SubsetId) -> bool {
        self.subset_ids
            .as_ref()
            .map(|ids| ids.contains(subset))
            .unwrap_or(true)
    }

    /// Saved breakdown names must be unique within a report.
    pub fn validate_breaks(&self) -> CalculationResult<()> {
        let mut seen = HashSet::new();
        for name in &self.breaks {
            if !seen.insert(name.as_str()) {
                return Err(CalculationError::bad_request(format!(
                    "Report '{}' has duplicate saved breakdown '{}'",
                    self.name, name
                )));
            }
        }
        Ok(())
    }
}

/// A saved report resolved against one subset.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReport {
    pub subset: SubsetId,
    pub report: SavedReport,
}

impl ParsedReport {
    pub fn describe(&self) -> String {
        format!("{}/{}", self.subset, self.report.name)
    }
}
