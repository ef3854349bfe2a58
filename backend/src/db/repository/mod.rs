//! Read-only repository traits the calculation engine depends on.
//!
//! Configuration (measures, subsets, entities, saved reports) and respondent
//! counts are owned elsewhere; the engine only reads them through these traits.
//! [`FullRepository`] bundles them for dependency injection.

pub mod error;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::{
    CalculationPeriod, EntityCellSeries, EntityInstance, EntityType, Filter, GroupedQuotaCells,
    Measure, SavedReport, Subset, SubsetId, TargetInstances,
};

pub use error::{ErrorContext, RepositoryError, RepositoryResult};

/// Repository trait for measure configuration.
#[async_trait]
pub trait MeasureRepository: Send + Sync {
    /// Fetch a measure by name.
    ///
    /// # Returns
    /// * `Ok(Measure)` if the measure exists
    /// * `Err(RepositoryError::NotFound)` otherwise
    async fn get_measure(&self, name: &str) -> RepositoryResult<Measure>;

    async fn list_measures(&self) -> RepositoryResult<Vec<Measure>>;
}

/// Repository trait for subsets and their weighting schemes.
#[async_trait]
pub trait SubsetRepository: Send + Sync {
    async fn get_subset(&self, id: &SubsetId) -> RepositoryResult<Subset>;

    /// All configured subsets, enabled or not.
    async fn list_subsets(&self) -> RepositoryResult<Vec<Subset>>;

    /// The full weighting scheme of a subset.
    ///
    /// # Arguments
    /// * `id` - Subset to fetch cells for
    ///
    /// # Returns
    /// * `Ok(GroupedQuotaCells)` - Every quota cell of the subset with its weight
    async fn get_quota_cells(&self, id: &SubsetId) -> RepositoryResult<GroupedQuotaCells>;

    /// Last day with complete fieldwork for a subset.
    async fn latest_complete_date(&self, id: &SubsetId) -> RepositoryResult<NaiveDate>;
}

#[async_trait]
pub trait EntityRepository: Send + Sync {
    /// Instances of an entity type available in a subset, ordered by id.
    async fn get_instances(
        &self,
        entity_type: &EntityType,
        subset: &SubsetId,
    ) -> RepositoryResult<Vec<EntityInstance>>;
}

#[async_trait]
pub trait SavedReportRepository: Send + Sync {
    async fn list_reports(&self) -> RepositoryResult<Vec<SavedReport>>;
}

/// What to count for one unweighted totals request.
#[derive(Debug, Clone, Copy)]
pub struct UnweightedCountQuery<'a> {
    pub measure: &'a Measure,
    pub subset: &'a SubsetId,
    pub period: &'a CalculationPeriod,
    pub filter: &'a Filter,
    /// `None` for measures not asked about entities.
    pub targets: Option<&'a TargetInstances>,
}

/// Repository trait for respondent-level data.
#[async_trait]
pub trait RespondentRepository: Send + Sync {
    /// Count respondents per entity, day and quota cell.
    ///
    /// # Arguments
    /// * `query` - Measure, subset, period, filter and requested entities
    ///
    /// # Returns
    /// * `Ok(Vec<EntityCellSeries>)` - Counts for the entities and days that had
    ///   respondents. Callers fill in gaps.
    /// * `Err(RepositoryError)` - If the respondent source fails
    async fn get_unweighted_counts(
        &self,
        query: UnweightedCountQuery<'_>,
    ) -> RepositoryResult<Vec<EntityCellSeries>>;
}

/// Everything the engine reads, behind one object.
pub trait FullRepository:
    MeasureRepository + SubsetRepository + EntityRepository + SavedReportRepository + RespondentRepository
{
}

impl<T> FullRepository for T where
    T: MeasureRepository
        + SubsetRepository
        + EntityRepository
        + SavedReportRepository
        + RespondentRepository
{
}
