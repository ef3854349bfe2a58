//! Breakdown categories: a demographic dimension split into labelled groups.

use super::filter::DemographicFilter;
use super::quota_cells::GroupedQuotaCells;

/// A breakdown dimension such as age group, with one quota-cell set per label.
///
/// Label schemes are derived from the base scheme on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakdownCategory {
    pub name: String,
    base: GroupedQuotaCells,
    labels: Vec<(String, DemographicFilter)>,
}

impl BreakdownCategory {
    pub fn new(name: impl Into<String>, base: GroupedQuotaCells) -> Self {
        Self {
            name: name.into(),
            base,
            labels: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>, filter: DemographicFilter) -> Self {
        self.labels.push((label.into(), filter));
        self
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|(label, _)| label.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Each label with the quota cells it covers.
    pub fn categories(&self) -> impl Iterator<Item = (&str, GroupedQuotaCells)> + '_ {
        self.labels
            .iter()
            .map(|(label, filter)| (label.as_str(), self.base.filtered_by(filter)))
    }
}
