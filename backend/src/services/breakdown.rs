//! Breakdown engine.
//!
//! Re-weights one set of unweighted totals per breakdown label (age group,
//! gender, region, segment) and collects the label results per entity.

use std::collections::HashMap;

use crate::models::{
    BreakdownCategory, CategoryResults, CellTotals, DemographicFilter, EntityCategoryResults,
    EntityWeightedDailyResults, GroupedQuotaCells, QuotaCellKey, Subset, UnweightedTotals,
};
use crate::services::weighting::WeightedCounts;

pub const AGE_FIELD: &str = "age";
pub const GENDER_FIELD: &str = "gender";
pub const REGION_FIELD: &str = "region";
pub const SEGMENT_FIELD: &str = "segment";

/// Weight every label of `category` without significance.
///
/// Each day's cells are indexed once and shared by all labels. Entity order
/// follows `unweighted`. A category with no labels yields one accumulator per
/// entity with no label results.
pub fn weight_category_without_significance(
    unweighted: &UnweightedTotals,
    category: &BreakdownCategory,
) -> Vec<EntityCategoryResults> {
    let labels: Vec<(&str, GroupedQuotaCells)> = category.categories().collect();
    let calculation_type = unweighted.measure.calculation_type;

    unweighted
        .entities
        .iter()
        .map(|series| {
            let indexed: Vec<_> = series
                .days
                .iter()
                .map(|day| {
                    let cells: HashMap<&QuotaCellKey, &CellTotals> =
                        day.cells.iter().map(|c| (&c.cell, c)).collect();
                    (day.date, cells)
                })
                .collect();

            let mut accumulator = EntityCategoryResults::new(series.entity_instance.clone());
            for (label, cells) in &labels {
                let weighted_daily_results = indexed
                    .iter()
                    .map(|(date, day_cells)| {
                        let mut counts = WeightedCounts::default();
                        for weighted in cells.cells() {
                            if let Some(totals) = day_cells.get(&weighted.cell.key) {
                                counts.add(totals, weighted.weight);
                            }
                        }
                        counts.into_result(*date, calculation_type)
                    })
                    .collect();
                accumulator.category_results.push(CategoryResults {
                    label: label.to_string(),
                    weighted_daily_results,
                });
            }
            accumulator
        })
        .collect()
}

/// Collect per-label weighted results into per-entity accumulators.
///
/// `weigh` is called once per label with that label's cells and must return
/// results in `unweighted` entity order.
pub fn accumulate_label_results<F>(
    unweighted: &UnweightedTotals,
    category: &BreakdownCategory,
    mut weigh: F,
) -> Vec<EntityCategoryResults>
where
    F: FnMut(&GroupedQuotaCells) -> Vec<EntityWeightedDailyResults>,
{
    let mut accumulators: Vec<EntityCategoryResults> = unweighted
        .entities
        .iter()
        .map(|series| EntityCategoryResults::new(series.entity_instance.clone()))
        .collect();

    for (label, cells) in category.categories() {
        for (index, entity_results) in weigh(&cells).into_iter().enumerate() {
            if let Some(accumulator) = accumulators.get_mut(index) {
                accumulator.category_results.push(CategoryResults {
                    label: label.to_string(),
                    weighted_daily_results: entity_results.weighted_daily_results,
                });
            }
        }
    }
    accumulators
}

/// Builds the standard demographic breakdown categories for a request.
pub struct BreakdownCategoryFactory<'a> {
    quota_cells: &'a GroupedQuotaCells,
    demographic_filter: &'a DemographicFilter,
}

impl<'a> BreakdownCategoryFactory<'a> {
    /// # Arguments
    /// * `quota_cells` - The request's weighting scheme
    /// * `demographic_filter` - Restricts which cells, and so which labels, apply
    pub fn new(quota_cells: &'a GroupedQuotaCells, demographic_filter: &'a DemographicFilter) -> Self {
        Self {
            quota_cells,
            demographic_filter,
        }
    }

    pub fn by_age_group(&self) -> BreakdownCategory {
        self.by_field("Age", AGE_FIELD)
    }

    pub fn by_gender(&self) -> BreakdownCategory {
        self.by_field("Gender", GENDER_FIELD)
    }

    pub fn by_region(&self) -> BreakdownCategory {
        self.by_field("Region", REGION_FIELD)
    }

    /// Segment breakdown from the subset's configured segment labels.
    ///
    /// Returns `None` when the subset has no segments or any label matches no
    /// quota cell.
    pub fn by_segment(&self, subset: &Subset) -> Option<BreakdownCategory> {
        if subset.segment_names.is_empty() {
            return None;
        }
        let base = self.quota_cells.filtered_by(self.demographic_filter);
        let available = base.distinct_values(SEGMENT_FIELD);

        let mut category = BreakdownCategory::new("Segment", base);
        for label in &subset.segment_names {
            if !available.iter().any(|v| v == label) {
                log::debug!(
                    "Segment '{}' of subset '{}' has no quota cells; omitting segment breakdown",
                    label,
                    subset.id
                );
                return None;
            }
            category = category.with_label(
                label.clone(),
                DemographicFilter::all().with(SEGMENT_FIELD, [label.clone()]),
            );
        }
        Some(category)
    }

    fn by_field(&self, name: &str, field: &str) -> BreakdownCategory {
        let base = self.quota_cells.filtered_by(self.demographic_filter);
        let values = base.distinct_values(field);
        values.into_iter().fold(BreakdownCategory::new(name, base), |category, value| {
            let filter = DemographicFilter::all().with(field, [value.clone()]);
            category.with_label(value, filter)
        })
    }
}

#[cfg(test)]
#[path = "breakdown_tests.rs"]
mod breakdown_tests;
