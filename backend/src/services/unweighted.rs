//! Unweighted aggregator.
//!
//! Fetches raw counts from the respondent source and normalises them so that
//! every downstream stage can index entities and days positionally: one
//! series per requested entity in request order, one entry per day of the
//! period, cells restricted to the weighting scheme and in scheme order.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use crate::db::repository::{RespondentRepository, UnweightedCountQuery};
use crate::models::{
    AverageDescriptor, CellTotals, DailyCellTotals, EntityCellSeries, EntityInstance,
    GroupedQuotaCells, Measure, QuotaCellKey, ResultsProviderParameters, Totalisation,
    UnweightedTotals,
};
use crate::services::error::{CalculationError, CalculationResult};

/// Count respondents for `measure` under the request's subset, period and filter.
///
/// # Arguments
/// * `repo` - Respondent source
/// * `params` - Request parameters (subset, period, filter, instances, scheme)
/// * `measure` - Measure to count; the primary measure or e.g. a market-average
///   base measure
/// * `cancel` - Checked before the respondent source is queried
///
/// # Errors
/// * `Cancelled` if the token fired before the fetch
/// * `BadRequest` for an uncountable measure or malformed filter
/// * `Repository` errors from the respondent source, unchanged
pub async fn calculate_unweighted_totals<R>(
    repo: &R,
    params: &ResultsProviderParameters,
    measure: &Measure,
    cancel: &CancellationToken,
) -> CalculationResult<UnweightedTotals>
where
    R: RespondentRepository + ?Sized,
{
    measure.validate()?;
    params.filter.validate()?;
    if cancel.is_cancelled() {
        return Err(CalculationError::Cancelled);
    }

    let targets = if measure.has_entities() {
        params.requested_instances.as_ref()
    } else {
        None
    };
    let requested: Vec<Option<EntityInstance>> = match targets {
        Some(targets) => targets.instances().iter().cloned().map(Some).collect(),
        None => vec![None],
    };

    let raw = repo
        .get_unweighted_counts(UnweightedCountQuery {
            measure,
            subset: &params.subset.id,
            period: &params.calculation_period,
            filter: &params.filter,
            targets,
        })
        .await?;

    let entities = normalise(
        raw,
        &requested,
        params,
        &params.quota_cells,
        &params.average,
    );

    log::debug!(
        "Unweighted totals for '{}' in '{}': {} entities, {} days",
        measure.name,
        params.subset.id,
        entities.len(),
        entities.first().map(|e| e.days.len()).unwrap_or(0)
    );

    Ok(UnweightedTotals {
        measure: measure.clone(),
        subset: params.subset.id.clone(),
        period: params.calculation_period,
        filter: params.filter.clone(),
        average: params.average.clone(),
        sig_confidence_level: params.sig_confidence_level,
        quota_cells: params.quota_cells.clone(),
        entities,
    })
}

fn normalise(
    raw: Vec<EntityCellSeries>,
    requested: &[Option<EntityInstance>],
    params: &ResultsProviderParameters,
    cells: &GroupedQuotaCells,
    average: &AverageDescriptor,
) -> Vec<EntityCellSeries> {
    let mut by_entity: HashMap<Option<i64>, EntityCellSeries> = raw
        .into_iter()
        .map(|series| (series.entity_instance.as_ref().map(|e| e.id.value()), series))
        .collect();

    requested
        .iter()
        .map(|entity| {
            let key = entity.as_ref().map(|e| e.id.value());
            let mut raw_days: HashMap<_, DailyCellTotals> = by_entity
                .remove(&key)
                .map(|series| series.days.into_iter().map(|d| (d.date, d)).collect())
                .unwrap_or_default();

            let days: Vec<DailyCellTotals> = params
                .calculation_period
                .days()
                .map(|date| match raw_days.remove(&date) {
                    Some(day) => DailyCellTotals {
                        date,
                        cells: in_scheme_order(day.cells, cells),
                    },
                    None => DailyCellTotals::empty(date),
                })
                .collect();

            let days = match average.totalisation {
                Totalisation::Daily => days,
                Totalisation::WholePeriod => vec![collapse(days, params, cells)],
            };

            EntityCellSeries {
                entity_instance: entity.clone(),
                days,
            }
        })
        .collect()
}

fn in_scheme_order(day_cells: Vec<CellTotals>, cells: &GroupedQuotaCells) -> Vec<CellTotals> {
    let mut by_key: HashMap<QuotaCellKey, CellTotals> =
        day_cells.into_iter().map(|c| (c.cell.clone(), c)).collect();
    cells
        .cells()
        .iter()
        .filter_map(|c| by_key.remove(&c.cell.key))
        .collect()
}

fn collapse(
    days: Vec<DailyCellTotals>,
    params: &ResultsProviderParameters,
    cells: &GroupedQuotaCells,
) -> DailyCellTotals {
    let mut summed: HashMap<QuotaCellKey, CellTotals> = HashMap::new();
    for day in &days {
        for totals in &day.cells {
            summed
                .entry(totals.cell.clone())
                .or_insert_with(|| CellTotals::empty(totals.cell.clone()))
                .add(totals);
        }
    }
    DailyCellTotals {
        date: params.calculation_period.end(),
        cells: in_scheme_order(summed.into_values().collect(), cells),
    }
}
