//! Request-level convenience over the calculator chain.
//!
//! [`MetricCalculator`] keeps a minimal surface. [`ConvenientCalculator`]
//! combines its stages in the ways callers need them: counting then weighting
//! a measure, weighting the market-average base measure alongside it, and
//! repeating a calculation per breakdown label.

use futures::future::try_join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::{CalculationSettings, EngineConfig};
use crate::db::repository::{FullRepository, MeasureRepository};
use crate::models::{
    AverageType, BreakdownCategory, CategoryResults, EntityCategoryResults, EntityMeanMap,
    EntityWeightedDailyResults, GroupedQuotaCells, MainQuestionType, Measure,
    ResultsProviderParameters, SigConfidenceLevel, UnweightedTotals, WeightedDailyResult,
};
use crate::services::calculator::{
    build_calculator_chain, MarketAverageOptions, MeasureTotals, MetricCalculator,
};
use crate::services::error::{CalculationError, CalculationResult};
use crate::services::trial::TrialContext;

/// Market-average base measure name meaning "weight every entity equally".
pub const USE_EQUAL_WEIGHTING_MEASURE: &str = "UseEqualWeighting";

/// Weighted results of one measure with its market average.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureResults {
    pub measure: Measure,
    pub per_entity: Vec<EntityWeightedDailyResults>,
    pub market_average: Vec<WeightedDailyResult>,
}

#[derive(Clone)]
pub struct ConvenientCalculator {
    calculator: Arc<dyn MetricCalculator>,
    repo: Arc<dyn FullRepository>,
    low_sample_for_brand: u32,
    default_confidence_level: SigConfidenceLevel,
}

impl ConvenientCalculator {
    pub fn new(
        calculator: Arc<dyn MetricCalculator>,
        repo: Arc<dyn FullRepository>,
        settings: &CalculationSettings,
    ) -> Self {
        Self {
            calculator,
            repo,
            low_sample_for_brand: settings.low_sample_for_brand,
            default_confidence_level: SigConfidenceLevel::from_percent(
                settings.default_confidence_level,
            )
            .unwrap_or_else(|| {
                log::warn!(
                    "Unsupported confidence level {}%, using 95%",
                    settings.default_confidence_level
                );
                SigConfidenceLevel::default()
            }),
        }
    }

    /// Compose the calculator chain described by `config` over `repo`.
    pub fn from_config(
        repo: Arc<dyn FullRepository>,
        config: &EngineConfig,
        trial: Option<TrialContext>,
    ) -> Self {
        let calculator = build_calculator_chain(repo.clone(), &config.calculation, trial);
        Self::new(calculator, repo, &config.calculation)
    }

    pub fn calculator(&self) -> &Arc<dyn MetricCalculator> {
        &self.calculator
    }

    pub fn repository(&self) -> &Arc<dyn FullRepository> {
        &self.repo
    }

    /// Confidence level for requests that do not name one.
    pub fn default_confidence_level(&self) -> SigConfidenceLevel {
        self.default_confidence_level
    }

    /// Count the primary measure, or `measure_override`, for a request.
    pub async fn calculate_unweighted_for_measure(
        &self,
        params: &ResultsProviderParameters,
        measure_override: Option<&Measure>,
        cancel: &CancellationToken,
    ) -> CalculationResult<Arc<UnweightedTotals>> {
        let measure = measure_override.unwrap_or(&params.primary_measure);
        self.calculator
            .calculate_unweighted_totals(params, measure, cancel)
            .await
    }

    /// Count and weight a measure, with significance when the request asks for it.
    pub async fn calculate_weighted_for_measure(
        &self,
        params: &ResultsProviderParameters,
        measure_override: Option<&Measure>,
        cancel: &CancellationToken,
    ) -> CalculationResult<Vec<EntityWeightedDailyResults>> {
        let unweighted = self
            .calculate_unweighted_for_measure(params, measure_override, cancel)
            .await?;
        Ok(self.calculator.calculate_weighted_from_unweighted(
            &unweighted,
            params.include_significance,
            None,
        ))
    }

    pub fn weight_category_without_significance(
        &self,
        unweighted: &UnweightedTotals,
        category: &BreakdownCategory,
    ) -> Vec<EntityCategoryResults> {
        self.calculator.weight_category(unweighted, category)
    }

    /// Unweighted totals of the measure that sizes entities in `measure`'s
    /// market average.
    ///
    /// # Returns
    /// `Ok(None)` when the measure weights entities equally.
    pub async fn market_average_weightings(
        &self,
        params: &ResultsProviderParameters,
        measure: &Measure,
        cancel: &CancellationToken,
    ) -> CalculationResult<Option<Arc<UnweightedTotals>>> {
        let base = match measure.market_average_base_measure.as_deref() {
            None => return Ok(None),
            Some(name) if name.trim().is_empty() || name == USE_EQUAL_WEIGHTING_MEASURE => {
                return Ok(None)
            }
            Some(name) => name,
        };
        let base_measure = self.repo.get_measure(base).await?;
        let totals = self
            .calculate_unweighted_for_measure(params, Some(&base_measure), cancel)
            .await?;
        Ok(Some(totals))
    }

    /// Weight `totals` and the optional relative-size totals, then average
    /// across entities.
    ///
    /// # Arguments
    /// * `totals` - Measure being averaged
    /// * `weightings` - Base measure sizing each entity, `None` for none
    /// * `filtered_cells` - Scheme override, e.g. one breakdown label
    pub fn calculate_market_average(
        &self,
        totals: &UnweightedTotals,
        weightings: Option<&UnweightedTotals>,
        average_type: AverageType,
        question_type: MainQuestionType,
        entity_mean_map: Option<&EntityMeanMap>,
        filtered_cells: Option<&GroupedQuotaCells>,
    ) -> CalculationResult<Vec<WeightedDailyResult>> {
        let options = self.market_average_options(average_type, question_type, entity_mean_map);
        self.calculator.calculate_market_average_from_unweighted(
            totals,
            weightings,
            &options,
            filtered_cells,
        )
    }

    /// The market average once per label of `category`.
    pub fn market_average_for_category(
        &self,
        totals: &UnweightedTotals,
        weightings: Option<&UnweightedTotals>,
        category: &BreakdownCategory,
        average_type: AverageType,
        question_type: MainQuestionType,
        entity_mean_map: Option<&EntityMeanMap>,
    ) -> CalculationResult<Vec<CategoryResults>> {
        let options = self.market_average_options(average_type, question_type, entity_mean_map);
        self.calculator
            .calculate_market_average_for_category(totals, weightings, category, &options)
    }

    fn market_average_options(
        &self,
        average_type: AverageType,
        question_type: MainQuestionType,
        entity_mean_map: Option<&EntityMeanMap>,
    ) -> MarketAverageOptions {
        MarketAverageOptions {
            minimum_sample_per_point: self.low_sample_for_brand,
            average_type,
            question_type,
            entity_mean_map: entity_mean_map.cloned(),
        }
    }

    pub async fn average_mentions_for_measure(
        &self,
        params: &ResultsProviderParameters,
        measure_override: Option<&Measure>,
        cancel: &CancellationToken,
    ) -> CalculationResult<Vec<WeightedDailyResult>> {
        let unweighted = self
            .calculate_unweighted_for_measure(params, measure_override, cancel)
            .await?;
        self.calculator.calculate_average_mentions(&unweighted, None)
    }

    pub async fn numeric_response_average(
        &self,
        params: &ResultsProviderParameters,
        cancel: &CancellationToken,
    ) -> CalculationResult<Vec<WeightedDailyResult>> {
        let unweighted = self
            .calculate_unweighted_for_measure(params, None, cancel)
            .await?;
        self.calculator
            .calculate_numeric_response_average(&unweighted, params.average_type, None)
    }

    /// Weighted results for the primary and every additional measure, with
    /// each measure's market average, in request order.
    pub async fn market_average_results_for_all_measures(
        &self,
        params: &ResultsProviderParameters,
        cancel: &CancellationToken,
    ) -> CalculationResult<Vec<MeasureResults>> {
        let measures: Vec<&Measure> = std::iter::once(&params.primary_measure)
            .chain(params.additional_measures.iter())
            .collect();

        let totals = try_join_all(measures.iter().map(|&measure| async move {
            let totals = self
                .calculate_unweighted_for_measure(params, Some(measure), cancel)
                .await?;
            let weightings = self
                .market_average_weightings(params, measure, cancel)
                .await?;
            Ok::<_, CalculationError>((totals, weightings))
        }))
        .await?;

        let pairs: Vec<MeasureTotals<'_>> = totals
            .iter()
            .map(|(totals, weightings)| (totals.as_ref(), weightings.as_deref()))
            .collect();
        let options = MarketAverageOptions::from_params(params, self.low_sample_for_brand);
        let results = self.calculator.calculate_measures_with_market_average(
            &pairs,
            params.include_significance,
            &options,
        )?;

        Ok(measures
            .into_iter()
            .zip(results)
            .map(|(measure, result)| MeasureResults {
                measure: measure.clone(),
                per_entity: result.per_entity,
                market_average: result.market_average,
            })
            .collect())
    }
}
