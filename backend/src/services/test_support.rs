//! Builders for unweighted totals in service unit tests.

use chrono::NaiveDate;

use crate::models::{
    AverageDescriptor, CalculationPeriod, CalculationType, CellTotals, DailyCellTotals,
    EntityCellSeries, EntityInstance, EntityType, Filter, GroupedQuotaCells, Measure, QuotaCell,
    SigConfidenceLevel, SubsetId, UnweightedTotals, ValueRange, WeightedQuotaCell,
};

pub(crate) fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

pub(crate) fn cell(gender: &str, age: &str) -> QuotaCell {
    QuotaCell::from_parts([("gender", gender), ("age", age)])
}

/// Female/male x young/old, weighted f-young 1.5, f-old 1.0, m-young 0.5, m-old 1.0.
pub(crate) fn scheme() -> GroupedQuotaCells {
    GroupedQuotaCells::new(vec![
        WeightedQuotaCell::new(cell("f", "young"), 1.5),
        WeightedQuotaCell::new(cell("f", "old"), 1.0),
        WeightedQuotaCell::new(cell("m", "young"), 0.5),
        WeightedQuotaCell::new(cell("m", "old"), 1.0),
    ])
}

pub(crate) fn yes_no(cell: &QuotaCell, sample: u32, trues: u32) -> CellTotals {
    CellTotals {
        sample_size: sample,
        true_count: trues,
        value_total: f64::from(trues),
        value_squares: f64::from(trues),
        ..CellTotals::empty(cell.key.clone())
    }
}

pub(crate) fn numeric(cell: &QuotaCell, values: &[f64]) -> CellTotals {
    CellTotals {
        sample_size: values.len() as u32,
        value_total: values.iter().sum(),
        value_squares: values.iter().map(|v| v * v).sum(),
        ..CellTotals::empty(cell.key.clone())
    }
}

pub(crate) fn brand(id: i64, name: &str) -> Option<EntityInstance> {
    Some(EntityInstance::new(id, name))
}

/// Totals over days 1..=n where `days[i]` holds the cells of day i+1.
pub(crate) fn totals(
    measure: Measure,
    entities: Vec<(Option<EntityInstance>, Vec<Vec<CellTotals>>)>,
) -> UnweightedTotals {
    let day_count = entities.first().map(|(_, d)| d.len()).unwrap_or(1).max(1) as u32;
    UnweightedTotals {
        measure,
        subset: SubsetId::new("uk-consumer"),
        period: CalculationPeriod::new(day(1), day(day_count)).unwrap(),
        filter: Filter::AlwaysInclude,
        average: AverageDescriptor::daily(),
        sig_confidence_level: SigConfidenceLevel::NinetyFive,
        quota_cells: scheme(),
        entities: entities
            .into_iter()
            .map(|(entity_instance, days)| EntityCellSeries {
                entity_instance,
                days: days
                    .into_iter()
                    .enumerate()
                    .map(|(i, cells)| DailyCellTotals {
                        date: day(i as u32 + 1),
                        cells,
                    })
                    .collect(),
            })
            .collect(),
    }
}

pub(crate) fn awareness() -> Measure {
    Measure::new("aware", CalculationType::YesNo)
        .with_entity_type(EntityType::new("brand"))
        .with_true_values(ValueRange::single(1.0))
}
