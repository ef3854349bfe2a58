//! Legacy break calculation.
//!
//! Re-runs the full weighting once per breakdown label instead of sharing
//! indexed cell totals across labels. Results are identical to the default
//! path; it is kept selectable for comparison against older deployments.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::models::{
    AverageType, BreakdownCategory, EntityCategoryResults, EntityWeightedDailyResults,
    GroupedQuotaCells, Measure, ResultsProviderParameters, UnweightedTotals, WeightedDailyResult,
};
use crate::services::breakdown;
use crate::services::calculator::{MarketAverageOptions, MetricCalculator};
use crate::services::error::CalculationResult;

pub struct LegacyBreakCalculator {
    inner: Arc<dyn MetricCalculator>,
}

impl LegacyBreakCalculator {
    pub fn new(inner: Arc<dyn MetricCalculator>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl MetricCalculator for LegacyBreakCalculator {
    async fn calculate_unweighted_totals(
        &self,
        params: &ResultsProviderParameters,
        measure: &Measure,
        cancel: &CancellationToken,
    ) -> CalculationResult<Arc<UnweightedTotals>> {
        self.inner
            .calculate_unweighted_totals(params, measure, cancel)
            .await
    }

    fn calculate_weighted_from_unweighted(
        &self,
        unweighted: &UnweightedTotals,
        calculate_significance: bool,
        quota_cells: Option<&GroupedQuotaCells>,
    ) -> Vec<EntityWeightedDailyResults> {
        self.inner
            .calculate_weighted_from_unweighted(unweighted, calculate_significance, quota_cells)
    }

    fn weight_category(
        &self,
        unweighted: &UnweightedTotals,
        category: &BreakdownCategory,
    ) -> Vec<EntityCategoryResults> {
        breakdown::accumulate_label_results(unweighted, category, |cells| {
            self.inner
                .calculate_weighted_from_unweighted(unweighted, false, Some(cells))
        })
    }

    fn calculate_market_average(
        &self,
        measure_results: &[EntityWeightedDailyResults],
        relative_sizes: Option<&[EntityWeightedDailyResults]>,
        options: &MarketAverageOptions,
    ) -> CalculationResult<Vec<WeightedDailyResult>> {
        self.inner
            .calculate_market_average(measure_results, relative_sizes, options)
    }

    fn calculate_average_mentions(
        &self,
        unweighted: &UnweightedTotals,
        quota_cells: Option<&GroupedQuotaCells>,
    ) -> CalculationResult<Vec<WeightedDailyResult>> {
        self.inner.calculate_average_mentions(unweighted, quota_cells)
    }

    fn calculate_numeric_response_average(
        &self,
        unweighted: &UnweightedTotals,
        average_type: AverageType,
        quota_cells: Option<&GroupedQuotaCells>,
    ) -> CalculationResult<Vec<WeightedDailyResult>> {
        self.inner
            .calculate_numeric_response_average(unweighted, average_type, quota_cells)
    }
}
