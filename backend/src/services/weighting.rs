//! Weighting engine.
//!
//! Turns [`UnweightedTotals`] into weighted results by applying each quota
//! cell's weight to its counts. Everything here is a pure function of its
//! inputs: weighting the same totals twice gives identical results.

use chrono::NaiveDate;

use crate::models::{
    AverageType, CalculationType, CellTotals, DailyCellTotals, EntityCellSeries,
    EntityWeightedDailyResults, GroupedQuotaCells, UnweightedTotals, WeightedDailyResult,
};
use crate::services::error::{CalculationError, CalculationResult};
use crate::services::significance;

/// Comparand name used when each day is tested against the day before.
pub const PREVIOUS_PERIOD: &str = "previous period";

/// Running weighted sums for one entity on one day.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct WeightedCounts {
    base: f64,
    sample: u32,
    trues: f64,
    detractors: f64,
    values: f64,
    squares: f64,
    unweighted_trues: u32,
    unweighted_detractors: u32,
    unweighted_values: f64,
}

impl WeightedCounts {
    pub(crate) fn add(&mut self, totals: &CellTotals, weight: f64) {
        self.base += weight * f64::from(totals.sample_size);
        self.sample += totals.sample_size;
        self.trues += weight * f64::from(totals.true_count);
        self.detractors += weight * f64::from(totals.detractor_count);
        self.values += weight * totals.value_total;
        self.squares += weight * totals.value_squares;
        self.unweighted_trues += totals.true_count;
        self.unweighted_detractors += totals.detractor_count;
        self.unweighted_values += totals.value_total;
    }

    pub(crate) fn into_result(self, date: NaiveDate, calculation_type: CalculationType) -> WeightedDailyResult {
        if self.base <= 0.0 || self.sample == 0 {
            return WeightedDailyResult::no_sample(date);
        }

        let (value, weighted_value_total, unweighted_value_total, variance) = match calculation_type {
            CalculationType::YesNo | CalculationType::Text => {
                let p = self.trues / self.base;
                (p, self.trues, f64::from(self.unweighted_trues), p * (1.0 - p))
            }
            CalculationType::Average => {
                let mean = self.values / self.base;
                let variance = (self.squares / self.base - mean * mean).max(0.0);
                (mean, self.values, self.unweighted_values, variance)
            }
            CalculationType::NetPromoterScore => {
                let promoters = self.trues / self.base;
                let detractors = self.detractors / self.base;
                let nps = 100.0 * (promoters - detractors);
                // Each respondent scores +100, -100 or 0.
                let variance = (10_000.0 * (promoters + detractors) - nps * nps).max(0.0);
                (
                    nps,
                    100.0 * (self.trues - self.detractors),
                    f64::from(self.unweighted_trues) - f64::from(self.unweighted_detractors),
                    variance,
                )
            }
        };

        WeightedDailyResult {
            date,
            weighted_result: Some(value),
            unweighted_sample_size: self.sample,
            weighted_sample_size: self.base,
            weighted_value_total,
            unweighted_value_total,
            standard_deviation: Some(variance.sqrt()),
            variance: Some(variance),
            significance: None,
        }
    }
}

/// Weight one day's cell totals. Cells outside `cells` contribute nothing.
pub fn weight_day(
    day: &DailyCellTotals,
    cells: &GroupedQuotaCells,
    calculation_type: CalculationType,
) -> WeightedDailyResult {
    let mut counts = WeightedCounts::default();
    for totals in &day.cells {
        if let Some(weight) = cells.weight_of(&totals.cell) {
            counts.add(totals, weight);
        }
    }
    counts.into_result(day.date, calculation_type)
}

pub fn weight_series(
    series: &EntityCellSeries,
    cells: &GroupedQuotaCells,
    calculation_type: CalculationType,
) -> EntityWeightedDailyResults {
    EntityWeightedDailyResults::new(
        series.entity_instance.clone(),
        series
            .days
            .iter()
            .map(|day| weight_day(day, cells, calculation_type))
            .collect(),
    )
}

/// Weight every entity of `unweighted`.
///
/// # Arguments
/// * `unweighted` - Totals to weight
/// * `calculate_significance` - Annotate each day against the previous day
/// * `quota_cells` - Scheme to weight with instead of the totals' own, e.g.
///   one breakdown label's cells
///
/// # Returns
/// One series per entity, in the same order as `unweighted.entities`.
pub fn weight(
    unweighted: &UnweightedTotals,
    calculate_significance: bool,
    quota_cells: Option<&GroupedQuotaCells>,
) -> Vec<EntityWeightedDailyResults> {
    let cells = quota_cells.unwrap_or(&unweighted.quota_cells);
    let calculation_type = unweighted.measure.calculation_type;

    let mut results: Vec<EntityWeightedDailyResults> = unweighted
        .entities
        .iter()
        .map(|series| weight_series(series, cells, calculation_type))
        .collect();

    if calculate_significance {
        for entity in &mut results {
            annotate_against_previous_day(
                &mut entity.weighted_daily_results,
                calculation_type,
                unweighted,
            );
        }
    }

    log::debug!(
        "Weighted {} entities x {} days for measure '{}'",
        results.len(),
        unweighted.day_count(),
        unweighted.measure.name
    );
    results
}

fn annotate_against_previous_day(
    results: &mut [WeightedDailyResult],
    calculation_type: CalculationType,
    unweighted: &UnweightedTotals,
) {
    for i in 1..results.len() {
        let (before, rest) = results.split_at_mut(i);
        let previous = &before[i - 1];
        significance::mutate_result_to_include_significance(
            calculation_type,
            unweighted.measure.number_format,
            &mut rest[0],
            previous,
            PREVIOUS_PERIOD,
            unweighted.sig_confidence_level,
        );
    }
}

/// Weighted mean number of entities selected per respondent, per day.
///
/// Respondents are asked about every entity, so the base is the largest
/// entity base that day.
///
/// # Errors
/// `BadRequest` unless the measure is a yes/no measure asked about entities.
pub fn average_mentions(
    unweighted: &UnweightedTotals,
    quota_cells: Option<&GroupedQuotaCells>,
) -> CalculationResult<Vec<WeightedDailyResult>> {
    let measure = &unweighted.measure;
    if measure.calculation_type != CalculationType::YesNo || !measure.has_entities() {
        return Err(CalculationError::bad_request(format!(
            "Average mentions needs a yes/no measure asked about entities; '{}' is not",
            measure.name
        )));
    }
    let cells = quota_cells.unwrap_or(&unweighted.quota_cells);

    let results = (0..unweighted.day_count())
        .map(|day_index| {
            let date = unweighted.entities[0].days[day_index].date;
            let per_entity: Vec<WeightedCounts> = unweighted
                .entities
                .iter()
                .map(|series| {
                    let mut counts = WeightedCounts::default();
                    for totals in &series.days[day_index].cells {
                        if let Some(weight) = cells.weight_of(&totals.cell) {
                            counts.add(totals, weight);
                        }
                    }
                    counts
                })
                .collect();

            let Some(base) = per_entity
                .iter()
                .copied()
                .max_by(|a, b| a.base.total_cmp(&b.base))
            else {
                return WeightedDailyResult::no_sample(date);
            };
            if base.base <= 0.0 || base.sample == 0 {
                return WeightedDailyResult::no_sample(date);
            }

            let mentions: f64 = per_entity.iter().map(|c| c.trues).sum();
            let unweighted_mentions: u32 = per_entity.iter().map(|c| c.unweighted_trues).sum();
            WeightedDailyResult {
                date,
                weighted_result: Some(mentions / base.base),
                unweighted_sample_size: base.sample,
                weighted_sample_size: base.base,
                weighted_value_total: mentions,
                unweighted_value_total: f64::from(unweighted_mentions),
                standard_deviation: None,
                variance: None,
                significance: None,
            }
        })
        .collect();
    Ok(results)
}

/// Pooled weighted mean of a numeric answer across every entity, per day.
///
/// # Errors
/// `BadRequest` for non-numeric measures or average types other than
/// `Mean`/`ResultMean`.
pub fn numeric_response_average(
    unweighted: &UnweightedTotals,
    average_type: AverageType,
    quota_cells: Option<&GroupedQuotaCells>,
) -> CalculationResult<Vec<WeightedDailyResult>> {
    if unweighted.measure.calculation_type != CalculationType::Average {
        return Err(CalculationError::bad_request(format!(
            "Numeric response average needs a numeric measure; '{}' is {}",
            unweighted.measure.name, unweighted.measure.calculation_type
        )));
    }
    if !matches!(average_type, AverageType::Mean | AverageType::ResultMean) {
        return Err(CalculationError::bad_request(format!(
            "Average type {:?} is not supported for numeric responses",
            average_type
        )));
    }
    let cells = quota_cells.unwrap_or(&unweighted.quota_cells);

    let results = (0..unweighted.day_count())
        .map(|day_index| {
            let date = unweighted.entities[0].days[day_index].date;
            let mut counts = WeightedCounts::default();
            for series in &unweighted.entities {
                for totals in &series.days[day_index].cells {
                    if let Some(weight) = cells.weight_of(&totals.cell) {
                        counts.add(totals, weight);
                    }
                }
            }
            counts.into_result(date, CalculationType::Average)
        })
        .collect();
    Ok(results)
}

#[cfg(test)]
#[path = "weighting_tests.rs"]
mod weighting_tests;
