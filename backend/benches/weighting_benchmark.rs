use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use survey_metrics::models::{
    AverageDescriptor, CalculationPeriod, CalculationType, CellTotals, DailyCellTotals,
    DemographicFilter, EntityCellSeries, EntityInstance, EntityType, Filter, GroupedQuotaCells,
    Measure, QuotaCell, SigConfidenceLevel, SubsetId, UnweightedTotals, ValueRange,
    WeightedQuotaCell,
};
use survey_metrics::services::breakdown::{
    accumulate_label_results, weight_category_without_significance, BreakdownCategoryFactory,
};
use survey_metrics::services::weighting;

const AGES: [&str; 5] = ["16-24", "25-34", "35-44", "45-54", "55+"];
const GENDERS: [&str; 2] = ["f", "m"];
const REGIONS: [&str; 4] = ["north", "midlands", "south", "scotland"];

fn scheme() -> GroupedQuotaCells {
    let mut cells = Vec::new();
    for (i, age) in AGES.iter().enumerate() {
        for gender in GENDERS {
            for region in REGIONS {
                let cell = QuotaCell::from_parts([("age", *age), ("gender", gender), ("region", region)]);
                cells.push(WeightedQuotaCell::new(cell, 0.5 + i as f64 * 0.25));
            }
        }
    }
    GroupedQuotaCells::new(cells)
}

fn totals(entities: i64, days: u32) -> UnweightedTotals {
    let cells = scheme();
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let period = CalculationPeriod::ending_on(start + chrono::Duration::days(i64::from(days) - 1), days)
        .unwrap();
    let entities = (1..=entities)
        .map(|id| EntityCellSeries {
            entity_instance: Some(EntityInstance::new(id, format!("Brand {}", id))),
            days: period
                .days()
                .enumerate()
                .map(|(d, date)| DailyCellTotals {
                    date,
                    cells: cells
                        .cells()
                        .iter()
                        .enumerate()
                        .map(|(c, cell)| {
                            let sample = 5 + ((c + d) % 7) as u32;
                            let trues = (c as u32 + id as u32) % (sample + 1);
                            CellTotals {
                                sample_size: sample,
                                true_count: trues,
                                value_total: f64::from(trues),
                                value_squares: f64::from(trues),
                                ..CellTotals::empty(cell.cell.key.clone())
                            }
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();

    UnweightedTotals {
        measure: Measure::new("aware", CalculationType::YesNo)
            .with_entity_type(EntityType::new("brand"))
            .with_true_values(ValueRange::single(1.0)),
        subset: SubsetId::new("uk-consumer"),
        period,
        filter: Filter::AlwaysInclude,
        average: AverageDescriptor::daily(),
        sig_confidence_level: SigConfidenceLevel::NinetyFive,
        quota_cells: cells,
        entities,
    }
}

fn bench_weighting(c: &mut Criterion) {
    let mut group = c.benchmark_group("weighting");

    for (entities, days) in [(5, 30), (20, 90)] {
        let unweighted = totals(entities, days);
        group.bench_with_input(
            BenchmarkId::new("weight_with_significance", format!("{}x{}", entities, days)),
            &unweighted,
            |b, input| b.iter(|| weighting::weight(black_box(input), true, None)),
        );
    }

    group.finish();
}

fn bench_breakdowns(c: &mut Criterion) {
    let mut group = c.benchmark_group("breakdowns");

    let unweighted = totals(10, 30);
    let filter = DemographicFilter::all();
    let category = BreakdownCategoryFactory::new(&unweighted.quota_cells, &filter).by_age_group();

    group.bench_function("optimized", |b| {
        b.iter(|| weight_category_without_significance(black_box(&unweighted), &category));
    });
    group.bench_function("legacy", |b| {
        b.iter(|| {
            accumulate_label_results(black_box(&unweighted), &category, |cells| {
                weighting::weight(&unweighted, false, Some(cells))
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_weighting, bench_breakdowns);
criterion_main!(benches);
