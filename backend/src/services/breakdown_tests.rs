use super::*;
use crate::models::Subset;
use crate::services::test_support::*;
use crate::services::weighting;

fn sample_totals() -> UnweightedTotals {
    let fy = cell("f", "young");
    let fo = cell("f", "old");
    let my = cell("m", "young");
    let mo = cell("m", "old");
    totals(
        awareness(),
        vec![
            (
                brand(1, "A"),
                vec![
                    vec![yes_no(&fy, 10, 3), yes_no(&fo, 12, 5), yes_no(&my, 9, 1), yes_no(&mo, 11, 7)],
                    vec![yes_no(&fo, 4, 4), yes_no(&mo, 6, 0)],
                ],
            ),
            (
                brand(2, "B"),
                vec![vec![yes_no(&my, 3, 3)], vec![]],
            ),
        ],
    )
}

#[test]
fn test_labels_follow_scheme_order() {
    let cells = scheme();
    let filter = DemographicFilter::all();
    let factory = BreakdownCategoryFactory::new(&cells, &filter);

    let ages = factory.by_age_group();
    assert_eq!(ages.labels().collect::<Vec<_>>(), vec!["young", "old"]);
    let genders = factory.by_gender();
    assert_eq!(genders.labels().collect::<Vec<_>>(), vec!["f", "m"]);
    assert!(factory.by_region().is_empty());
}

#[test]
fn test_demographic_filter_restricts_labels() {
    let cells = scheme();
    let filter = DemographicFilter::all().with(AGE_FIELD, ["old"]);
    let factory = BreakdownCategoryFactory::new(&cells, &filter);

    assert_eq!(factory.by_age_group().labels().collect::<Vec<_>>(), vec!["old"]);
}

#[test]
fn test_optimized_path_matches_per_label_weighting() {
    let unweighted = sample_totals();
    let cells = scheme();
    let filter = DemographicFilter::all();
    let category = BreakdownCategoryFactory::new(&cells, &filter).by_gender();

    let optimized = weight_category_without_significance(&unweighted, &category);
    let legacy = accumulate_label_results(&unweighted, &category, |label_cells| {
        weighting::weight(&unweighted, false, Some(label_cells))
    });

    assert_eq!(optimized, legacy);
    assert_eq!(optimized.len(), 2);
    let female = optimized[0].label("f").unwrap();
    // (1.5*3 + 1*5) / (1.5*10 + 1*12)
    let value = female.weighted_daily_results[0].weighted_result.unwrap();
    assert!((value - 9.5 / 27.0).abs() < 1e-12);
    assert_eq!(optimized[1].label("f").unwrap().weighted_daily_results[0].weighted_result, None);
}

#[test]
fn test_empty_category_gives_empty_accumulators() {
    let unweighted = sample_totals();
    let category = BreakdownCategory::new("Nothing", scheme());

    let results = weight_category_without_significance(&unweighted, &category);

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.category_results.is_empty()));
}

#[test]
fn test_segment_breakdown_requires_every_label() {
    let cells = GroupedQuotaCells::unit_weights([
        crate::models::QuotaCell::from_parts([(SEGMENT_FIELD, "heavy")]),
        crate::models::QuotaCell::from_parts([(SEGMENT_FIELD, "light")]),
    ]);
    let filter = DemographicFilter::all();
    let factory = BreakdownCategoryFactory::new(&cells, &filter);
    let mut subset = Subset::new("uk-consumer", "UK", day(1));

    assert!(factory.by_segment(&subset).is_none());

    subset.segment_names = vec!["heavy".into(), "light".into()];
    let category = factory.by_segment(&subset).unwrap();
    assert_eq!(category.labels().collect::<Vec<_>>(), vec!["heavy", "light"]);

    subset.segment_names.push("lapsed".into());
    assert!(factory.by_segment(&subset).is_none());
}
