//! Market average engine.
//!
//! Combines per-entity results into one "average across the market" series.
//! Entities can be sized by a second measure's results (relative sizes); when
//! they are, any entity whose share of the average would rest on too few
//! respondents has its weight capped and the excess spread over the others.

use crate::models::{
    AverageType, EntityMeanMap, EntityWeightedDailyResults, MainQuestionType, WeightedDailyResult,
};
use crate::services::error::{CalculationError, CalculationResult};

/// Entity id used for results that are not about an entity.
const NO_ENTITY_ID: i64 = -1;

const WEIGHT_IS_ZERO: f64 = 1e-10;

#[derive(Debug, Clone, Copy)]
struct Point<'a> {
    result: &'a WeightedDailyResult,
    entity_id: i64,
    weight: f64,
}

/// Average entity results day by day.
///
/// # Arguments
/// * `measure_results` - Weighted results per entity, all with the same days
/// * `minimum_sample_per_point` - Respondents each share of the average must rest on
/// * `average_type` - How entity results are combined
/// * `question_type` - Whether entities share one base
/// * `entity_mean_map` - Values replacing entity ids for `EntityIdMean`
/// * `relative_sizes` - Per-entity sizing results, aligned with `measure_results`
///
/// # Returns
/// One result per day of the input, same dates, same order.
///
/// # Errors
/// `Internal` when entities or days of the inputs do not line up.
pub fn calculate_market_average(
    measure_results: &[EntityWeightedDailyResults],
    minimum_sample_per_point: u32,
    average_type: AverageType,
    question_type: MainQuestionType,
    entity_mean_map: Option<&EntityMeanMap>,
    relative_sizes: Option<&[EntityWeightedDailyResults]>,
) -> CalculationResult<Vec<WeightedDailyResult>> {
    let day_count = uniform_day_count(measure_results)?;
    if let Some(sizes) = relative_sizes {
        assert_aligned(measure_results, sizes)?;
    }

    let mut averages = Vec::with_capacity(day_count);
    for day in 0..day_count {
        let mut points = Vec::with_capacity(measure_results.len());
        for (index, entity) in measure_results.iter().enumerate() {
            let result = &entity.weighted_daily_results[day];
            let weight = match relative_sizes {
                Some(sizes) => {
                    let size = &sizes[index].weighted_daily_results[day];
                    if size.date != result.date {
                        return Err(CalculationError::internal(format!(
                            "No relative size defined for {}",
                            result.date
                        )));
                    }
                    size.value_or_zero()
                }
                None => match average_type {
                    AverageType::ResultMean => f64::from(result.unweighted_sample_size),
                    _ => 1.0,
                },
            };
            points.push(Point {
                result,
                entity_id: entity
                    .entity_instance
                    .as_ref()
                    .map(|e| e.id.value())
                    .unwrap_or(NO_ENTITY_ID),
                weight,
            });
        }

        if relative_sizes.is_some() {
            points = trim_weights_for_low_sample(points, minimum_sample_per_point);
        }

        let date = measure_results[0].weighted_daily_results[day].date;
        let average = match average_type {
            AverageType::Mean | AverageType::ResultMean => mean(date, &points, question_type),
            AverageType::EntityIdMean => entity_id_mean(date, &points, entity_mean_map),
            AverageType::Median => median_entity_id(date, &points),
        };
        averages.push(average);
    }
    Ok(averages)
}

fn uniform_day_count(results: &[EntityWeightedDailyResults]) -> CalculationResult<usize> {
    let counts = results.iter().map(|r| r.weighted_daily_results.len());
    let (min, max) = counts.fold((usize::MAX, 0), |(min, max), n| (min.min(n), max.max(n)));
    if results.is_empty() {
        return Ok(0);
    }
    if min != max {
        return Err(CalculationError::internal(
            "Number of daily weighted results for each entity instance is not the same",
        ));
    }
    Ok(max)
}

fn assert_aligned(
    measure_results: &[EntityWeightedDailyResults],
    sizes: &[EntityWeightedDailyResults],
) -> CalculationResult<()> {
    let misaligned: Vec<String> = measure_results
        .iter()
        .zip(sizes.iter())
        .filter(|(r, s)| {
            r.entity_instance.as_ref().map(|e| e.id) != s.entity_instance.as_ref().map(|e| e.id)
        })
        .map(|(r, s)| {
            format!(
                "{:?}/{:?}",
                r.entity_instance.as_ref().map(|e| e.id.value()),
                s.entity_instance.as_ref().map(|e| e.id.value())
            )
        })
        .collect();

    if measure_results.len() != sizes.len() || !misaligned.is_empty() {
        return Err(CalculationError::internal(format!(
            "Entity instance alignment issue for: {}",
            misaligned.join(",")
        )));
    }
    for (r, s) in measure_results.iter().zip(sizes) {
        if r.weighted_daily_results.len() != s.weighted_daily_results.len() {
            return Err(CalculationError::internal(
                "Relative sizes cover a different number of days",
            ));
        }
    }
    Ok(())
}

/// Cap each entity's normalised weight at `sample / minimum_sample` and
/// upweight the remaining entities to compensate.
///
/// Entities are visited least-upweightable first so a cap applied early is
/// carried by everyone after it.
fn trim_weights_for_low_sample(points: Vec<Point<'_>>, minimum_sample: u32) -> Vec<Point<'_>> {
    let total_weight: f64 = points.iter().map(|p| p.weight).sum();
    if total_weight.abs() < WEIGHT_IS_ZERO || minimum_sample == 0 {
        return points;
    }

    let mut ranked: Vec<(Point<'_>, f64, f64)> = points
        .into_iter()
        .map(|p| {
            let normalised = p.weight / total_weight;
            let max_allowed = f64::from(p.result.unweighted_sample_size) / f64::from(minimum_sample);
            (p, normalised, max_allowed)
        })
        .collect();
    ranked.sort_by(|a, b| (a.2 / a.1).total_cmp(&(b.2 / b.1)));

    let mut upweight = 1.0;
    let mut remaining = 1.0;
    ranked
        .into_iter()
        .map(|(point, normalised, max_allowed)| {
            remaining -= normalised;
            let mut weight = normalised * upweight;
            if weight > max_allowed {
                let spare = weight - max_allowed;
                if remaining > WEIGHT_IS_ZERO {
                    upweight *= 1.0 + spare / remaining;
                }
                weight = max_allowed;
                log::debug!(
                    "Entity {} downweighted to {:.4} for low sample",
                    point.entity_id,
                    weight
                );
            }
            Point { weight, ..point }
        })
        .collect()
}

fn safe_divide(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Weighted standard deviation and variance; `None` with fewer than two values.
fn deviation(values: &[(f64, f64)], total_weight: f64, mean: f64) -> (Option<f64>, Option<f64>) {
    if values.len() <= 1 || total_weight <= 0.0 {
        return (None, None);
    }
    let variance = values
        .iter()
        .map(|(value, weight)| weight * (value - mean).powi(2))
        .sum::<f64>()
        / total_weight;
    (Some(variance.sqrt()), Some(variance))
}

fn mean(
    date: chrono::NaiveDate,
    points: &[Point<'_>],
    question_type: MainQuestionType,
) -> WeightedDailyResult {
    let contributing: Vec<&Point<'_>> = points
        .iter()
        .filter(|p| p.result.unweighted_sample_size > 0 && p.weight > 0.0)
        .collect();
    let total_weight: f64 = contributing.iter().map(|p| p.weight).sum();
    if contributing.is_empty() || total_weight <= 0.0 {
        return WeightedDailyResult::no_sample(date);
    }

    let total: f64 = contributing
        .iter()
        .map(|p| p.result.value_or_zero() * p.weight)
        .sum();
    let value = safe_divide(total, total_weight);
    let weighted_values: Vec<(f64, f64)> = contributing
        .iter()
        .map(|p| (p.result.value_or_zero(), p.weight))
        .collect();
    let (standard_deviation, variance) = deviation(&weighted_values, total_weight, value);

    let (unweighted_sample_size, weighted_sample_size) = match question_type {
        MainQuestionType::MultipleChoice => (
            contributing.iter().map(|p| p.result.unweighted_sample_size).sum(),
            contributing.iter().map(|p| p.result.weighted_sample_size).sum(),
        ),
        MainQuestionType::SingleChoice => (
            contributing
                .iter()
                .map(|p| p.result.unweighted_sample_size)
                .max()
                .unwrap_or(0),
            contributing
                .iter()
                .map(|p| p.result.weighted_sample_size)
                .fold(0.0, f64::max),
        ),
    };

    WeightedDailyResult {
        date,
        weighted_result: Some(value),
        unweighted_sample_size,
        weighted_sample_size,
        weighted_value_total: total,
        unweighted_value_total: points.len() as f64,
        standard_deviation,
        variance,
        significance: None,
    }
}

fn entity_id_mean(
    date: chrono::NaiveDate,
    points: &[Point<'_>],
    entity_mean_map: Option<&EntityMeanMap>,
) -> WeightedDailyResult {
    let included: Vec<&Point<'_>> = points
        .iter()
        .filter(|p| {
            entity_mean_map
                .and_then(|map| map.mapping.iter().find(|m| m.entity_id.value() == p.entity_id))
                .map(|m| m.include_in_calculation)
                .unwrap_or(true)
        })
        .collect();
    let Some(first) = included.first() else {
        return WeightedDailyResult::no_sample(date);
    };

    let weighted_values: Vec<(f64, f64)> = included
        .iter()
        .filter(|p| p.result.unweighted_sample_size > 0)
        .map(|p| {
            let multiplier = entity_mean_map
                .and_then(|map| map.mapping.iter().find(|m| m.entity_id.value() == p.entity_id))
                .map(|m| m.mean_calculation_value)
                .unwrap_or(p.entity_id as f64);
            (multiplier, p.result.weighted_value_total)
        })
        .collect();
    let total: f64 = weighted_values.iter().map(|(m, w)| m * w).sum();
    let total_weight: f64 = included.iter().map(|p| p.result.weighted_value_total).sum();
    let value = safe_divide(total, total_weight);
    let (standard_deviation, variance) = deviation(&weighted_values, total_weight, value);

    WeightedDailyResult {
        date,
        weighted_result: Some(value),
        unweighted_sample_size: first.result.unweighted_sample_size,
        weighted_sample_size: first.result.weighted_sample_size,
        weighted_value_total: total,
        unweighted_value_total: included.len() as f64,
        standard_deviation,
        variance,
        significance: None,
    }
}

/// Entity id holding the upper-median selection when entities are ordered by id.
fn median_entity_id(date: chrono::NaiveDate, points: &[Point<'_>]) -> WeightedDailyResult {
    let mut ordered: Vec<&Point<'_>> = points.iter().collect();
    ordered.sort_by_key(|p| p.entity_id);

    let weighted_sample: f64 = points
        .iter()
        .map(|p| p.result.weighted_value_total)
        .sum::<f64>()
        .floor();
    if weighted_sample <= 0.0 {
        return WeightedDailyResult::no_sample(date);
    }
    let median_index = (weighted_sample / 2.0).ceil();

    let mut running = 0.0;
    let mut median = ordered.last().map(|p| p.entity_id).unwrap_or(NO_ENTITY_ID);
    for point in &ordered {
        running += point.result.weighted_value_total;
        if running >= median_index {
            median = point.entity_id;
            break;
        }
    }

    WeightedDailyResult {
        date,
        weighted_result: Some(median as f64),
        unweighted_sample_size: points.iter().map(|p| p.result.unweighted_sample_size).sum(),
        weighted_sample_size: weighted_sample,
        weighted_value_total: weighted_sample,
        unweighted_value_total: points.len() as f64,
        standard_deviation: None,
        variance: None,
        significance: None,
    }
}

#[cfg(test)]
#[path = "market_average_tests.rs"]
mod market_average_tests;
