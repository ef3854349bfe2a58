//! Trial restriction.
//!
//! Trial users may see the shape of the data but not recent values: every
//! result dated after their cutoff is redacted to zero on its way out of the
//! calculator chain.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::models::{
    AverageType, BreakdownCategory, CategoryResults, EntityCategoryResults,
    EntityWeightedDailyResults,
    GroupedQuotaCells, Measure, ResultsProviderParameters, UnweightedTotals, WeightedDailyResult,
};
use crate::services::calculator::{
    MarketAverageOptions, MeasureTotals, MetricCalculator, WeightedWithAverage,
};
use crate::services::error::CalculationResult;

/// Raised when a response had data withheld, so the caller can tell the user.
#[derive(Debug, Default)]
pub struct TrialRestrictionSignal {
    raised: AtomicUsize,
}

impl TrialRestrictionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised_count() > 0
    }

    /// Number of calls that redacted at least one result.
    pub fn raised_count(&self) -> usize {
        self.raised.load(Ordering::SeqCst)
    }
}

/// Who the chain is serving, for [`build_calculator_chain`](crate::services::calculator::build_calculator_chain).
#[derive(Debug, Clone)]
pub struct TrialContext {
    /// `None` for users that are not on a trial.
    pub cutoff: Option<NaiveDate>,
    pub signal: Arc<TrialRestrictionSignal>,
}

impl TrialContext {
    pub fn new(cutoff: Option<NaiveDate>) -> Self {
        Self {
            cutoff,
            signal: Arc::new(TrialRestrictionSignal::new()),
        }
    }
}

pub struct TrialRestrictingCalculator {
    inner: Arc<dyn MetricCalculator>,
    cutoff: Option<NaiveDate>,
    signal: Arc<TrialRestrictionSignal>,
}

impl TrialRestrictingCalculator {
    /// # Arguments
    /// * `inner` - Next link of the chain
    /// * `cutoff` - Last date a trial user may see; `None` disables redaction
    /// * `signal` - Raised once per call that withheld data
    pub fn new(
        inner: Arc<dyn MetricCalculator>,
        cutoff: Option<NaiveDate>,
        signal: Arc<TrialRestrictionSignal>,
    ) -> Self {
        Self {
            inner,
            cutoff,
            signal,
        }
    }

    /// Redact `results` in place, raising the signal if anything changed.
    fn restrict<'a, I>(&self, results: I)
    where
        I: IntoIterator<Item = &'a mut WeightedDailyResult>,
    {
        let Some(cutoff) = self.cutoff else {
            return;
        };
        let mut redacted = 0usize;
        for result in results {
            if result.date > cutoff {
                redact(result);
                redacted += 1;
            }
        }
        if redacted > 0 {
            log::debug!("Redacted {} results after trial cutoff {}", redacted, cutoff);
            self.signal.raise();
        }
    }
}

fn redact(result: &mut WeightedDailyResult) {
    result.weighted_result = Some(0.0);
    result.weighted_value_total = 0.0;
    result.unweighted_value_total = 0.0;
    result.standard_deviation = None;
    result.variance = None;
    result.significance = None;
}

#[async_trait]
impl MetricCalculator for TrialRestrictingCalculator {
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
        let mut results = self.inner.calculate_weighted_from_unweighted(
            unweighted,
            calculate_significance,
            quota_cells,
        );
        self.restrict(
            results
                .iter_mut()
                .flat_map(|r| r.weighted_daily_results.iter_mut()),
        );
        results
    }

    fn weight_category(
        &self,
        unweighted: &UnweightedTotals,
        category: &BreakdownCategory,
    ) -> Vec<EntityCategoryResults> {
        let mut results = self.inner.weight_category(unweighted, category);
        self.restrict(
            results
                .iter_mut()
                .flat_map(|r| r.category_results.iter_mut())
                .flat_map(|c| c.weighted_daily_results.iter_mut()),
        );
        results
    }

    fn calculate_market_average(
        &self,
        measure_results: &[EntityWeightedDailyResults],
        relative_sizes: Option<&[EntityWeightedDailyResults]>,
        options: &MarketAverageOptions,
    ) -> CalculationResult<Vec<WeightedDailyResult>> {
        let mut results =
            self.inner
                .calculate_market_average(measure_results, relative_sizes, options)?;
        self.restrict(results.iter_mut());
        Ok(results)
    }

    fn calculate_average_mentions(
        &self,
        unweighted: &UnweightedTotals,
        quota_cells: Option<&GroupedQuotaCells>,
    ) -> CalculationResult<Vec<WeightedDailyResult>> {
        let mut results = self.inner.calculate_average_mentions(unweighted, quota_cells)?;
        self.restrict(results.iter_mut());
        Ok(results)
    }

    fn calculate_numeric_response_average(
        &self,
        unweighted: &UnweightedTotals,
        average_type: AverageType,
        quota_cells: Option<&GroupedQuotaCells>,
    ) -> CalculationResult<Vec<WeightedDailyResult>> {
        let mut results = self.inner.calculate_numeric_response_average(
            unweighted,
            average_type,
            quota_cells,
        )?;
        self.restrict(results.iter_mut());
        Ok(results)
    }

    fn calculate_market_average_from_unweighted(
        &self,
        totals: &UnweightedTotals,
        weightings: Option<&UnweightedTotals>,
        options: &MarketAverageOptions,
        quota_cells: Option<&GroupedQuotaCells>,
    ) -> CalculationResult<Vec<WeightedDailyResult>> {
        let mut results = self.inner.calculate_market_average_from_unweighted(
            totals,
            weightings,
            options,
            quota_cells,
        )?;
        self.restrict(results.iter_mut());
        Ok(results)
    }

    fn calculate_market_average_for_category(
        &self,
        totals: &UnweightedTotals,
        weightings: Option<&UnweightedTotals>,
        category: &BreakdownCategory,
        options: &MarketAverageOptions,
    ) -> CalculationResult<Vec<CategoryResults>> {
        let mut results = self
            .inner
            .calculate_market_average_for_category(totals, weightings, category, options)?;
        self.restrict(
            results
                .iter_mut()
                .flat_map(|c| c.weighted_daily_results.iter_mut()),
        );
        Ok(results)
    }

    fn calculate_measures_with_market_average(
        &self,
        measures: &[MeasureTotals<'_>],
        calculate_significance: bool,
        options: &MarketAverageOptions,
    ) -> CalculationResult<Vec<WeightedWithAverage>> {
        let mut results = self.inner.calculate_measures_with_market_average(
            measures,
            calculate_significance,
            options,
        )?;
        self.restrict(results.iter_mut().flat_map(|measure| {
            let WeightedWithAverage {
                per_entity,
                market_average,
            } = measure;
            per_entity
                .iter_mut()
                .flat_map(|e| e.weighted_daily_results.iter_mut())
                .chain(market_average.iter_mut())
        }));
        Ok(results)
    }
}
