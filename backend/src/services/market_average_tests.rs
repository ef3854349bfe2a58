use super::*;
use crate::models::{EntityInstance, EntityMeanMapping, EntityInstanceId};
use chrono::NaiveDate;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 2, d).unwrap()
}

fn create_test_result(date: NaiveDate, n: u32, value: f64, weighted_value_total: f64) -> WeightedDailyResult {
    WeightedDailyResult {
        date,
        weighted_result: Some(value),
        unweighted_sample_size: n,
        weighted_sample_size: f64::from(n),
        weighted_value_total,
        unweighted_value_total: weighted_value_total,
        standard_deviation: None,
        variance: None,
        significance: None,
    }
}

fn entity(id: i64, results: Vec<WeightedDailyResult>) -> EntityWeightedDailyResults {
    EntityWeightedDailyResults::new(Some(EntityInstance::new(id, id.to_string())), results)
}

/// Three entities with 20 respondents each selecting 4, 7 and 9 times.
fn create_single_choice_results(weighted: bool) -> Vec<EntityWeightedDailyResults> {
    let totals = if weighted { [6.0, 8.0, 10.0] } else { [4.0, 7.0, 9.0] };
    (1..=3)
        .zip(totals)
        .map(|(id, total)| entity(id, vec![create_test_result(day(1), 20, 0.0, total)]))
        .collect()
}

fn mean_map(values: &[(i64, f64, bool)]) -> EntityMeanMap {
    EntityMeanMap {
        mapping: values
            .iter()
            .map(|&(id, value, include)| EntityMeanMapping {
                entity_id: EntityInstanceId(id),
                mean_calculation_value: value,
                include_in_calculation: include,
            })
            .collect(),
    }
}

fn average(
    results: &[EntityWeightedDailyResults],
    average_type: AverageType,
    question_type: MainQuestionType,
    map: Option<&EntityMeanMap>,
    sizes: Option<&[EntityWeightedDailyResults]>,
) -> Vec<WeightedDailyResult> {
    calculate_market_average(results, 75, average_type, question_type, map, sizes).unwrap()
}

#[test]
fn test_entity_id_mean_unweighted() {
    let results = create_single_choice_results(false);
    let avg = average(&results, AverageType::EntityIdMean, MainQuestionType::SingleChoice, None, None);
    assert_eq!(avg.len(), 1);
    assert_eq!(avg[0].weighted_result, Some(2.25));
    assert_eq!(avg[0].unweighted_sample_size, 20);
}

#[test]
fn test_entity_id_mean_weighted_with_deviation() {
    let results = create_single_choice_results(true);
    let avg = average(&results, AverageType::EntityIdMean, MainQuestionType::SingleChoice, None, None);
    let value = avg[0].weighted_result.unwrap();
    assert!((value - 52.0 / 24.0).abs() < 1e-9);
    assert!((avg[0].standard_deviation.unwrap() - 0.7993).abs() < 1e-3);
}

#[test]
fn test_entity_id_mean_respects_mapping() {
    let results = create_single_choice_results(false);
    let map = mean_map(&[(1, 1.0, true), (2, 1.0, true), (3, 1.0, true)]);
    let avg = average(&results, AverageType::EntityIdMean, MainQuestionType::SingleChoice, Some(&map), None);
    assert_eq!(avg[0].weighted_result, Some(1.0));
    assert_eq!(avg[0].unweighted_value_total, 3.0);
    assert!(avg[0].standard_deviation.unwrap().abs() < 1e-9);
}

#[test]
fn test_entity_id_mean_excludes_entities() {
    let results = create_single_choice_results(false);
    let map = mean_map(&[(1, 23452.0, false), (2, 1.0, true), (3, 1.0, true)]);
    let avg = average(&results, AverageType::EntityIdMean, MainQuestionType::SingleChoice, Some(&map), None);
    assert_eq!(avg[0].weighted_result, Some(1.0));
    assert_eq!(avg[0].unweighted_value_total, 2.0);
    assert_eq!(avg[0].unweighted_sample_size, 20);
}

#[test]
fn test_median_entity_id() {
    let results = create_single_choice_results(false);
    let avg = average(&results, AverageType::Median, MainQuestionType::SingleChoice, None, None);
    // 20 selections, upper median is the 10th: entity 2 holds selections 5..=11
    assert_eq!(avg[0].weighted_result, Some(2.0));
    assert_eq!(avg[0].unweighted_sample_size, 60);
}

#[test]
fn test_mean_uses_equal_weights_without_sizes() {
    let results = vec![
        entity(1, vec![create_test_result(day(1), 100, 0.2, 20.0)]),
        entity(2, vec![create_test_result(day(1), 300, 0.6, 180.0)]),
    ];
    let avg = average(&results, AverageType::Mean, MainQuestionType::MultipleChoice, None, None);
    assert!((avg[0].weighted_result.unwrap() - 0.4).abs() < 1e-12);
    assert_eq!(avg[0].unweighted_sample_size, 400);
    assert!((avg[0].standard_deviation.unwrap() - 0.2).abs() < 1e-12);
}

#[test]
fn test_result_mean_falls_back_to_sample_sizes() {
    let results = vec![
        entity(1, vec![create_test_result(day(1), 100, 0.2, 20.0)]),
        entity(2, vec![create_test_result(day(1), 300, 0.6, 180.0)]),
    ];
    let avg = average(&results, AverageType::ResultMean, MainQuestionType::MultipleChoice, None, None);
    assert!((avg[0].weighted_result.unwrap() - 0.5).abs() < 1e-12);
}

#[test]
fn test_single_choice_mean_shares_base() {
    let results = vec![
        entity(1, vec![create_test_result(day(1), 100, 0.2, 20.0)]),
        entity(2, vec![create_test_result(day(1), 100, 0.6, 60.0)]),
    ];
    let avg = average(&results, AverageType::Mean, MainQuestionType::SingleChoice, None, None);
    assert_eq!(avg[0].unweighted_sample_size, 100);
}

#[test]
fn test_low_sample_entity_is_downweighted() {
    let results = vec![
        entity(1, vec![create_test_result(day(1), 300, 0.5, 150.0)]),
        entity(2, vec![create_test_result(day(1), 15, 0.1, 1.5)]),
    ];
    let sizes = vec![
        entity(1, vec![create_test_result(day(1), 300, 0.5, 150.0)]),
        entity(2, vec![create_test_result(day(1), 300, 0.5, 150.0)]),
    ];
    let avg = average(&results, AverageType::Mean, MainQuestionType::MultipleChoice, None, Some(&sizes));
    // Entity 2 capped at 15/75 = 0.2 of the average, entity 1 carries 0.8
    assert!((avg[0].weighted_result.unwrap() - 0.42).abs() < 1e-12);
}

#[test]
fn test_trimming_when_every_entity_is_capped() {
    let low = create_test_result(day(1), 10, 0.5, 5.0);
    let lower = create_test_result(day(1), 5, 0.5, 2.5);
    let points = vec![
        Point { result: &low, entity_id: 1, weight: 1.0 },
        Point { result: &lower, entity_id: 2, weight: 1.0 },
    ];

    let trimmed = trim_weights_for_low_sample(points, 100);

    assert_eq!(trimmed.len(), 2);
    assert!(trimmed.iter().all(|p| p.weight.is_finite() && p.weight >= 0.0));
    let capped: Vec<_> = trimmed.iter().map(|p| (p.entity_id, p.weight)).collect();
    assert!(capped.contains(&(1, 0.1)));
    assert!(capped.contains(&(2, 0.05)));
}

#[test]
fn test_single_entity_has_no_deviation() {
    let results = vec![entity(1, vec![create_test_result(day(1), 20, 0.5, 4.0)])];
    let avg = average(&results, AverageType::Mean, MainQuestionType::MultipleChoice, None, None);
    assert!(avg[0].standard_deviation.is_none());
}

#[test]
fn test_output_follows_input_days() {
    let results = vec![
        entity(1, (1..=3).map(|d| create_test_result(day(d), 50, 0.3, 15.0)).collect()),
        entity(2, (1..=3).map(|d| create_test_result(day(d), 50, 0.5, 25.0)).collect()),
    ];
    let avg = average(&results, AverageType::Mean, MainQuestionType::MultipleChoice, None, None);
    let dates: Vec<_> = avg.iter().map(|r| r.date).collect();
    assert_eq!(dates, vec![day(1), day(2), day(3)]);
}

#[test]
fn test_no_contributing_entities_is_no_sample() {
    let results = vec![entity(1, vec![WeightedDailyResult::no_sample(day(1))])];
    let avg = average(&results, AverageType::Mean, MainQuestionType::MultipleChoice, None, None);
    assert_eq!(avg[0], WeightedDailyResult::no_sample(day(1)));
}

#[test]
fn test_misaligned_sizes_are_rejected() {
    let results = create_single_choice_results(false);
    let mut sizes = create_single_choice_results(false);
    sizes.swap(0, 1);
    let err = calculate_market_average(
        &results,
        75,
        AverageType::Mean,
        MainQuestionType::MultipleChoice,
        None,
        Some(&sizes),
    )
    .unwrap_err();
    assert!(matches!(err, CalculationError::Internal { .. }));
}

#[test]
fn test_ragged_days_are_rejected() {
    let results = vec![
        entity(1, vec![create_test_result(day(1), 10, 0.1, 1.0)]),
        entity(2, vec![]),
    ];
    let err = calculate_market_average(
        &results,
        75,
        AverageType::Mean,
        MainQuestionType::MultipleChoice,
        None,
        None,
    )
    .unwrap_err();
    assert!(matches!(err, CalculationError::Internal { .. }));
}

#[test]
fn test_empty_input_gives_empty_average() {
    let avg = average(&[], AverageType::Mean, MainQuestionType::MultipleChoice, None, None);
    assert!(avg.is_empty());
}
