//! Raw per-cell counts, the input to every weighting stage.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::entity::EntityInstance;
use super::filter::Filter;
use super::measure::Measure;
use super::parameters::AverageDescriptor;
use super::period::CalculationPeriod;
use super::results::SigConfidenceLevel;
use super::quota_cells::{GroupedQuotaCells, QuotaCellKey};
use super::subset::SubsetId;

/// Unweighted counts for one quota cell on one day.
///
/// `true_count` is the number of respondents whose answer is a "true" value
/// (promoters for NPS), `detractor_count` the NPS detractors, and
/// `value_total`/`value_squares` the sum and sum of squares of numeric answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellTotals {
    pub cell: QuotaCellKey,
    pub sample_size: u32,
    pub true_count: u32,
    pub detractor_count: u32,
    pub value_total: f64,
    pub value_squares: f64,
}

impl CellTotals {
    pub fn empty(cell: QuotaCellKey) -> Self {
        Self {
            cell,
            sample_size: 0,
            true_count: 0,
            detractor_count: 0,
            value_total: 0.0,
            value_squares: 0.0,
        }
    }

    pub fn add(&mut self, other: &CellTotals) {
        self.sample_size += other.sample_size;
        self.true_count += other.true_count;
        self.detractor_count += other.detractor_count;
        self.value_total += other.value_total;
        self.value_squares += other.value_squares;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCellTotals {
    pub date: NaiveDate,
    pub cells: Vec<CellTotals>,
}

impl DailyCellTotals {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            cells: Vec::new(),
        }
    }

    pub fn sample_size(&self) -> u32 {
        self.cells.iter().map(|c| c.sample_size).sum()
    }
}

/// Day-ordered cell totals for one entity instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCellSeries {
    pub entity_instance: Option<EntityInstance>,
    pub days: Vec<DailyCellTotals>,
}

/// Everything counted for one (measure, subset, period, filter).
///
/// Computed once per request and shared behind an `Arc` by every stage that
/// weights it; nothing downstream mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct UnweightedTotals {
    pub measure: Measure,
    pub subset: SubsetId,
    pub period: CalculationPeriod,
    pub filter: Filter,
    pub average: AverageDescriptor,
    /// Level used when results are compared with the previous period.
    pub sig_confidence_level: SigConfidenceLevel,
    pub quota_cells: GroupedQuotaCells,
    /// One series per requested entity instance, in request order.
    pub entities: Vec<EntityCellSeries>,
}

impl UnweightedTotals {
    pub fn entity_instances(&self) -> Vec<Option<EntityInstance>> {
        self.entities
            .iter()
            .map(|e| e.entity_instance.clone())
            .collect()
    }

    pub fn day_count(&self) -> usize {
        self.entities.first().map(|e| e.days.len()).unwrap_or(0)
    }
}
