//! The metric calculator chain.
//!
//! [`MetricCalculator`] is the capability every link of the chain offers.
//! [`PipelineCalculator`] does the work; decorators such as
//! [`LegacyBreakCalculator`](crate::services::legacy_breaks::LegacyBreakCalculator)
//! and [`TrialRestrictingCalculator`](crate::services::trial::TrialRestrictingCalculator)
//! hold the next link and adjust behaviour around it. [`build_calculator_chain`]
//! assembles the chain from configuration once at setup.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::CalculationSettings;
use crate::db::repository::FullRepository;
use crate::models::{
    AverageType, BreakdownCategory, CategoryResults, EntityCategoryResults, EntityMeanMap,
    EntityWeightedDailyResults, GroupedQuotaCells, MainQuestionType, Measure,
    ResultsProviderParameters, UnweightedTotals, WeightedDailyResult,
};
use crate::services::error::CalculationResult;
use crate::services::legacy_breaks::LegacyBreakCalculator;
use crate::services::trial::{TrialContext, TrialRestrictingCalculator};
use crate::services::{breakdown, market_average, unweighted, weighting};

/// Options for combining entity results into a market average.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketAverageOptions {
    pub minimum_sample_per_point: u32,
    pub average_type: AverageType,
    pub question_type: MainQuestionType,
    pub entity_mean_map: Option<EntityMeanMap>,
}

impl MarketAverageOptions {
    pub fn from_params(params: &ResultsProviderParameters, minimum_sample_per_point: u32) -> Self {
        Self {
            minimum_sample_per_point,
            average_type: params.average_type,
            question_type: params.question_type,
            entity_mean_map: params.entity_mean_map.clone(),
        }
    }
}

/// Totals of one measure paired with the totals sizing its entities.
pub type MeasureTotals<'a> = (&'a UnweightedTotals, Option<&'a UnweightedTotals>);

/// Weighted results of one measure alongside its market average.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedWithAverage {
    pub per_entity: Vec<EntityWeightedDailyResults>,
    pub market_average: Vec<WeightedDailyResult>,
}

#[async_trait]
pub trait MetricCalculator: Send + Sync {
    /// Count respondents for `measure` under the request's parameters.
    async fn calculate_unweighted_totals(
        &self,
        params: &ResultsProviderParameters,
        measure: &Measure,
        cancel: &CancellationToken,
    ) -> CalculationResult<Arc<UnweightedTotals>>;

    /// Weight unweighted totals, optionally with a different quota-cell set.
    fn calculate_weighted_from_unweighted(
        &self,
        unweighted: &UnweightedTotals,
        calculate_significance: bool,
        quota_cells: Option<&GroupedQuotaCells>,
    ) -> Vec<EntityWeightedDailyResults>;

    /// Weight every label of a breakdown category, without significance.
    fn weight_category(
        &self,
        unweighted: &UnweightedTotals,
        category: &BreakdownCategory,
    ) -> Vec<EntityCategoryResults>;

    fn calculate_market_average(
        &self,
        measure_results: &[EntityWeightedDailyResults],
        relative_sizes: Option<&[EntityWeightedDailyResults]>,
        options: &MarketAverageOptions,
    ) -> CalculationResult<Vec<WeightedDailyResult>>;

    fn calculate_average_mentions(
        &self,
        unweighted: &UnweightedTotals,
        quota_cells: Option<&GroupedQuotaCells>,
    ) -> CalculationResult<Vec<WeightedDailyResult>>;

    fn calculate_numeric_response_average(
        &self,
        unweighted: &UnweightedTotals,
        average_type: AverageType,
        quota_cells: Option<&GroupedQuotaCells>,
    ) -> CalculationResult<Vec<WeightedDailyResult>>;

    /// Weight `totals` and the optional relative-size totals, then average
    /// across entities.
    fn calculate_market_average_from_unweighted(
        &self,
        totals: &UnweightedTotals,
        weightings: Option<&UnweightedTotals>,
        options: &MarketAverageOptions,
        quota_cells: Option<&GroupedQuotaCells>,
    ) -> CalculationResult<Vec<WeightedDailyResult>> {
        let measure_results = self.calculate_weighted_from_unweighted(totals, false, quota_cells);
        let relative_sizes =
            weightings.map(|w| self.calculate_weighted_from_unweighted(w, false, quota_cells));
        self.calculate_market_average(&measure_results, relative_sizes.as_deref(), options)
    }

    /// The market average once per label of `category`, in label order.
    fn calculate_market_average_for_category(
        &self,
        totals: &UnweightedTotals,
        weightings: Option<&UnweightedTotals>,
        category: &BreakdownCategory,
        options: &MarketAverageOptions,
    ) -> CalculationResult<Vec<CategoryResults>> {
        category
            .categories()
            .map(|(label, cells)| {
                Ok(CategoryResults {
                    label: label.to_string(),
                    weighted_daily_results: self.calculate_market_average_from_unweighted(
                        totals,
                        weightings,
                        options,
                        Some(&cells),
                    )?,
                })
            })
            .collect()
    }

    /// Weight each measure and compute its market average, in input order.
    fn calculate_measures_with_market_average(
        &self,
        measures: &[MeasureTotals<'_>],
        calculate_significance: bool,
        options: &MarketAverageOptions,
    ) -> CalculationResult<Vec<WeightedWithAverage>> {
        measures
            .iter()
            .map(|&(totals, weightings)| {
                Ok(WeightedWithAverage {
                    per_entity: self.calculate_weighted_from_unweighted(
                        totals,
                        calculate_significance,
                        None,
                    ),
                    market_average: self.calculate_market_average_from_unweighted(
                        totals, weightings, options, None,
                    )?,
                })
            })
            .collect()
    }
}

/// The calculator that does the work, reading respondents from a repository.
pub struct PipelineCalculator {
    repo: Arc<dyn FullRepository>,
}

impl PipelineCalculator {
    pub fn new(repo: Arc<dyn FullRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl MetricCalculator for PipelineCalculator {
    async fn calculate_unweighted_totals(
        &self,
        params: &ResultsProviderParameters,
        measure: &Measure,
        cancel: &CancellationToken,
    ) -> CalculationResult<Arc<UnweightedTotals>> {
        let totals =
            unweighted::calculate_unweighted_totals(self.repo.as_ref(), params, measure, cancel)
                .await?;
        Ok(Arc::new(totals))
    }

    fn calculate_weighted_from_unweighted(
        &self,
        unweighted: &UnweightedTotals,
        calculate_significance: bool,
        quota_cells: Option<&GroupedQuotaCells>,
    ) -> Vec<EntityWeightedDailyResults> {
        weighting::weight(unweighted, calculate_significance, quota_cells)
    }

    fn weight_category(
        &self,
        unweighted: &UnweightedTotals,
        category: &BreakdownCategory,
    ) -> Vec<EntityCategoryResults> {
        breakdown::weight_category_without_significance(unweighted, category)
    }

    fn calculate_market_average(
        &self,
        measure_results: &[EntityWeightedDailyResults],
        relative_sizes: Option<&[EntityWeightedDailyResults]>,
        options: &MarketAverageOptions,
    ) -> CalculationResult<Vec<WeightedDailyResult>> {
        market_average::calculate_market_average(
            measure_results,
            options.minimum_sample_per_point,
            options.average_type,
            options.question_type,
            options.entity_mean_map.as_ref(),
            relative_sizes,
        )
    }

    fn calculate_average_mentions(
        &self,
        unweighted: &UnweightedTotals,
        quota_cells: Option<&GroupedQuotaCells>,
    ) -> CalculationResult<Vec<WeightedDailyResult>> {
        weighting::average_mentions(unweighted, quota_cells)
    }

    fn calculate_numeric_response_average(
        &self,
        unweighted: &UnweightedTotals,
        average_type: AverageType,
        quota_cells: Option<&GroupedQuotaCells>,
    ) -> CalculationResult<Vec<WeightedDailyResult>> {
        weighting::numeric_response_average(unweighted, average_type, quota_cells)
    }
}

/// Assemble the calculator chain.
///
/// # Arguments
/// * `repo` - Data source for the pipeline
/// * `settings` - Selects the legacy break path when configured
/// * `trial` - Trial cutoff and signal for trial users, `None` otherwise
pub fn build_calculator_chain(
    repo: Arc<dyn FullRepository>,
    settings: &CalculationSettings,
    trial: Option<TrialContext>,
) -> Arc<dyn MetricCalculator> {
    let mut chain: Arc<dyn MetricCalculator> = Arc::new(PipelineCalculator::new(repo));
    if settings.legacy_break_calculation {
        log::info!("Using legacy break calculation");
        chain = Arc::new(LegacyBreakCalculator::new(chain));
    }
    if let Some(trial) = trial {
        chain = Arc::new(TrialRestrictingCalculator::new(chain, trial.cutoff, trial.signal));
    }
    chain
}
