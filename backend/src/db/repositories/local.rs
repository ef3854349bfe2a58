//! In-memory local repository implementation.
//!
//! Stores configuration and respondent-level records in memory and answers
//! unweighted count queries by evaluating filters and measure conditions
//! directly. Suitable for unit tests, local development and the preload
//! binary's fixture mode.

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::db::repository::*;
use crate::models::*;

/// One answer given by a respondent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Answer {
    pub field: String,
    #[serde(default)]
    pub entity: Option<EntityInstanceId>,
    pub value: f64,
}

/// A single survey respondent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Respondent {
    pub id: i64,
    pub subset: SubsetId,
    pub date: NaiveDate,
    pub quota_cell: QuotaCellKey,
    #[serde(default)]
    pub demographics: BTreeMap<String, String>,
    #[serde(default)]
    pub answers: Vec<Answer>,
}

impl Respondent {
    pub fn new(id: i64, subset: &SubsetId, date: NaiveDate, cell: &QuotaCell) -> Self {
        Self {
            id,
            subset: subset.clone(),
            date,
            quota_cell: cell.key.clone(),
            demographics: cell.demographics.clone(),
            answers: Vec::new(),
        }
    }

    pub fn answer(mut self, field: impl Into<String>, entity: Option<i64>, value: f64) -> Self {
        self.answers.push(Answer {
            field: field.into(),
            entity: entity.map(EntityInstanceId),
            value,
        });
        self
    }
}

impl FilterSubject for Respondent {
    fn demographic(&self, field: &str) -> Option<&str> {
        self.demographics.get(field).map(String::as_str)
    }

    fn answer(&self, field: &str, entity: Option<EntityInstanceId>) -> Option<f64> {
        self.answers
            .iter()
            .find(|a| a.field == field && a.entity == entity)
            .map(|a| a.value)
    }
}

#[derive(Debug, Deserialize)]
struct EntityFixture {
    entity_type: EntityType,
    instances: Vec<EntityInstance>,
}

/// JSON seed for a [`LocalRepository`].
#[derive(Debug, Default, Deserialize)]
pub struct LocalFixture {
    #[serde(default)]
    measures: Vec<Measure>,
    #[serde(default)]
    subsets: Vec<Subset>,
    #[serde(default)]
    quota_cells: HashMap<SubsetId, Vec<WeightedQuotaCell>>,
    #[serde(default)]
    entities: Vec<EntityFixture>,
    #[serde(default)]
    reports: Vec<SavedReport>,
    #[serde(default)]
    respondents: Vec<Respondent>,
}

/// In-memory local repository.
///
/// # Example
/// ```ignore
/// let repo = LocalRepository::new();
/// repo.add_subset(subset);
/// repo.add_measure(measure);
/// repo.add_respondents(respondents);
/// let cells = repo.get_quota_cells(&subset_id).await?;
/// ```
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
    unweighted_queries: Arc<AtomicUsize>,
}

impl std::fmt::Debug for LocalRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalRepository").finish_non_exhaustive()
    }
}

#[derive(Default)]
struct LocalData {
    measures: BTreeMap<String, Measure>,
    subsets: BTreeMap<SubsetId, Subset>,
    quota_cells: HashMap<SubsetId, GroupedQuotaCells>,
    latest_dates: HashMap<SubsetId, NaiveDate>,
    entities: HashMap<EntityType, Vec<EntityInstance>>,
    reports: Vec<SavedReport>,
    respondents: Vec<Respondent>,
    query_delay: Option<Duration>,
    is_healthy: bool,
}

impl LocalRepository {
    /// Create a new empty local repository.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData {
                is_healthy: true,
                ..Default::default()
            })),
            unweighted_queries: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Build a repository from a JSON fixture.
    pub fn from_fixture_json(json: &str) -> RepositoryResult<Self> {
        let fixture: LocalFixture = serde_json::from_str(json).map_err(|e| {
            RepositoryError::configuration(format!("Failed to parse fixture: {}", e))
        })?;
        let repo = Self::new();
        {
            let mut data = repo.data.write();
            for measure in fixture.measures {
                data.measures.insert(measure.name.clone(), measure);
            }
            for subset in fixture.subsets {
                data.subsets.insert(subset.id.clone(), subset);
            }
            for (subset, cells) in fixture.quota_cells {
                data.quota_cells.insert(subset, GroupedQuotaCells::new(cells));
            }
            for entity in fixture.entities {
                let mut instances = entity.instances;
                instances.sort_by_key(|i| i.id);
                data.entities.insert(entity.entity_type, instances);
            }
            data.reports = fixture.reports;
            data.respondents = fixture.respondents;
        }
        Ok(repo)
    }

    pub fn from_fixture_file<P: AsRef<Path>>(path: P) -> RepositoryResult<Self> {
        let json = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            RepositoryError::configuration(format!(
                "Failed to read fixture {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_fixture_json(&json)
    }

    pub fn add_measure(&self, measure: Measure) {
        self.data.write().measures.insert(measure.name.clone(), measure);
    }

    pub fn add_subset(&self, subset: Subset) {
        self.data.write().subsets.insert(subset.id.clone(), subset);
    }

    pub fn set_quota_cells(&self, subset: &SubsetId, cells: GroupedQuotaCells) {
        self.data.write().quota_cells.insert(subset.clone(), cells);
    }

    /// Derive sample-balancing weights for a subset from its stored respondents.
    ///
    /// # Arguments
    /// * `subset` - Subset whose scheme is replaced
    /// * `targets` - Target population share per cell
    pub fn set_quota_targets(&self, subset: &SubsetId, targets: &[(QuotaCell, f64)]) {
        let mut data = self.data.write();
        let mut sizes: HashMap<QuotaCellKey, u32> = HashMap::new();
        for r in data.respondents.iter().filter(|r| &r.subset == subset) {
            *sizes.entry(r.quota_cell.clone()).or_default() += 1;
        }
        let scheme = GroupedQuotaCells::balanced(targets, &sizes);
        data.quota_cells.insert(subset.clone(), scheme);
    }

    pub fn set_latest_complete_date(&self, subset: &SubsetId, date: NaiveDate) {
        self.data.write().latest_dates.insert(subset.clone(), date);
    }

    pub fn add_entity_instances(&self, entity_type: EntityType, instances: Vec<EntityInstance>) {
        let mut data = self.data.write();
        let stored = data.entities.entry(entity_type).or_default();
        stored.extend(instances);
        stored.sort_by_key(|i| i.id);
        stored.dedup_by_key(|i| i.id);
    }

    pub fn add_report(&self, report: SavedReport) {
        self.data.write().reports.push(report);
    }

    pub fn add_respondent(&self, respondent: Respondent) {
        self.data.write().respondents.push(respondent);
    }

    pub fn add_respondents(&self, respondents: impl IntoIterator<Item = Respondent>) {
        self.data.write().respondents.extend(respondents);
    }

    /// Set the health status for testing data source failures.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().is_healthy = healthy;
    }

    /// Delay every unweighted count query, for exercising slow sources.
    pub fn set_query_delay(&self, delay: Option<Duration>) {
        self.data.write().query_delay = delay;
    }

    /// Number of unweighted count queries answered so far.
    pub fn unweighted_query_count(&self) -> usize {
        self.unweighted_queries.load(Ordering::SeqCst)
    }

    pub fn respondent_count(&self) -> usize {
        self.data.read().respondents.len()
    }

    /// Clear all data from the repository.
    pub fn clear(&self) {
        let mut data = self.data.write();
        *data = LocalData {
            is_healthy: data.is_healthy,
            ..Default::default()
        };
    }

    fn ensure_healthy(&self, operation: &str) -> RepositoryResult<()> {
        if self.data.read().is_healthy {
            Ok(())
        } else {
            Err(RepositoryError::Unavailable {
                message: "Local repository marked unhealthy".to_string(),
                context: ErrorContext::new(operation).retryable(),
            })
        }
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn count_respondent(measure: &Measure, value: Option<f64>, totals: &mut CellTotals) {
    match measure.calculation_type {
        CalculationType::YesNo => {
            let is_true = match (value, measure.true_values) {
                (Some(v), Some(range)) => range.contains(v),
                (Some(v), None) => v > 0.0,
                (None, _) => false,
            };
            totals.sample_size += 1;
            if is_true {
                totals.true_count += 1;
                totals.value_total += 1.0;
                totals.value_squares += 1.0;
            }
        }
        CalculationType::Average => {
            if let Some(v) = value {
                totals.sample_size += 1;
                totals.value_total += v;
                totals.value_squares += v * v;
            }
        }
        CalculationType::NetPromoterScore => {
            if let Some(v) = value {
                totals.sample_size += 1;
                if measure.true_values.map(|r| r.contains(v)).unwrap_or(false) {
                    totals.true_count += 1;
                } else if measure.detractor_values.map(|r| r.contains(v)).unwrap_or(false) {
                    totals.detractor_count += 1;
                }
            }
        }
        CalculationType::Text => {}
    }
}

#[async_trait]
impl MeasureRepository for LocalRepository {
    async fn get_measure(&self, name: &str) -> RepositoryResult<Measure> {
        self.ensure_healthy("get_measure")?;
        self.data.read().measures.get(name).cloned().ok_or_else(|| {
            RepositoryError::not_found_with_context(
                format!("Measure '{}' does not exist", name),
                ErrorContext::new("get_measure")
                    .with_resource("measure")
                    .with_key(name),
            )
        })
    }

    async fn list_measures(&self) -> RepositoryResult<Vec<Measure>> {
        self.ensure_healthy("list_measures")?;
        Ok(self.data.read().measures.values().cloned().collect())
    }
}

#[async_trait]
impl SubsetRepository for LocalRepository {
    async fn get_subset(&self, id: &SubsetId) -> RepositoryResult<Subset> {
        self.ensure_healthy("get_subset")?;
        self.data.read().subsets.get(id).cloned().ok_or_else(|| {
            RepositoryError::not_found_with_context(
                format!("Subset '{}' does not exist", id),
                ErrorContext::new("get_subset")
                    .with_resource("subset")
                    .with_key(id),
            )
        })
    }

    async fn list_subsets(&self) -> RepositoryResult<Vec<Subset>> {
        self.ensure_healthy("list_subsets")?;
        Ok(self.data.read().subsets.values().cloned().collect())
    }

    async fn get_quota_cells(&self, id: &SubsetId) -> RepositoryResult<GroupedQuotaCells> {
        self.ensure_healthy("get_quota_cells")?;
        self.data.read().quota_cells.get(id).cloned().ok_or_else(|| {
            RepositoryError::not_found_with_context(
                format!("Subset '{}' has no weighting scheme", id),
                ErrorContext::new("get_quota_cells")
                    .with_resource("quota_cells")
                    .with_key(id),
            )
        })
    }

    async fn latest_complete_date(&self, id: &SubsetId) -> RepositoryResult<NaiveDate> {
        self.ensure_healthy("latest_complete_date")?;
        let data = self.data.read();
        if let Some(date) = data.latest_dates.get(id) {
            return Ok(*date);
        }
        data.respondents
            .iter()
            .filter(|r| &r.subset == id)
            .map(|r| r.date)
            .max()
            .ok_or_else(|| {
                RepositoryError::not_found_with_context(
                    format!("Subset '{}' has no respondents", id),
                    ErrorContext::new("latest_complete_date")
                        .with_resource("subset")
                        .with_key(id),
                )
            })
    }
}

#[async_trait]
impl EntityRepository for LocalRepository {
    async fn get_instances(
        &self,
        entity_type: &EntityType,
        _subset: &SubsetId,
    ) -> RepositoryResult<Vec<EntityInstance>> {
        self.ensure_healthy("get_instances")?;
        self.data.read().entities.get(entity_type).cloned().ok_or_else(|| {
            RepositoryError::not_found_with_context(
                format!("Entity type '{}' has no instances", entity_type),
                ErrorContext::new("get_instances")
                    .with_resource("entity_type")
                    .with_key(entity_type),
            )
        })
    }
}

#[async_trait]
impl SavedReportRepository for LocalRepository {
    async fn list_reports(&self) -> RepositoryResult<Vec<SavedReport>> {
        self.ensure_healthy("list_reports")?;
        Ok(self.data.read().reports.clone())
    }
}

#[async_trait]
impl RespondentRepository for LocalRepository {
    async fn get_unweighted_counts(
        &self,
        query: UnweightedCountQuery<'_>,
    ) -> RepositoryResult<Vec<EntityCellSeries>> {
        self.ensure_healthy("get_unweighted_counts")?;
        self.unweighted_queries.fetch_add(1, Ordering::SeqCst);

        let delay = self.data.read().query_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let data = self.data.read();
        let measure = query.measure;
        let entities: Vec<Option<EntityInstance>> = match query.targets {
            Some(targets) => targets.instances().iter().cloned().map(Some).collect(),
            None => vec![None],
        };

        let respondents: Vec<&Respondent> = data
            .respondents
            .iter()
            .filter(|r| &r.subset == query.subset && query.period.contains(r.date))
            .filter(|r| query.filter.matches(*r))
            .collect();

        let series = entities
            .into_iter()
            .map(|entity| {
                let entity_id = entity.as_ref().map(|e| e.id);
                let mut by_day: BTreeMap<NaiveDate, BTreeMap<QuotaCellKey, CellTotals>> =
                    BTreeMap::new();

                for r in &respondents {
                    if r.answer(measure.base_field_name(), entity_id).is_none() {
                        continue;
                    }
                    let totals = by_day
                        .entry(r.date)
                        .or_default()
                        .entry(r.quota_cell.clone())
                        .or_insert_with(|| CellTotals::empty(r.quota_cell.clone()));
                    count_respondent(measure, r.answer(&measure.name, entity_id), totals);
                }

                EntityCellSeries {
                    entity_instance: entity,
                    days: by_day
                        .into_iter()
                        .map(|(date, cells)| DailyCellTotals {
                            date,
                            cells: cells.into_values().collect(),
                        })
                        .collect(),
                }
            })
            .collect();

        log::debug!(
            "Counted {} respondents for measure '{}' in subset '{}'",
            respondents.len(),
            measure.name,
            query.subset
        );
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn seeded() -> (LocalRepository, SubsetId, QuotaCell, QuotaCell) {
        let repo = LocalRepository::new();
        let subset = Subset::new("uk-consumer", "UK consumers", date(1));
        let id = subset.id.clone();
        let female = QuotaCell::from_parts([("gender", "f")]);
        let male = QuotaCell::from_parts([("gender", "m")]);
        repo.add_subset(subset);
        repo.add_respondents(vec![
            Respondent::new(1, &id, date(1), &female).answer("aware", Some(1), 1.0),
            Respondent::new(2, &id, date(1), &male).answer("aware", Some(1), 0.0),
            Respondent::new(3, &id, date(2), &female).answer("aware", Some(1), 1.0),
            Respondent::new(4, &id, date(2), &female).answer("aware", Some(2), 1.0),
        ]);
        (repo, id, female, male)
    }

    #[tokio::test]
    async fn test_counts_per_day_and_cell() {
        let (repo, subset, female, _) = seeded();
        let measure = Measure::new("aware", CalculationType::YesNo)
            .with_entity_type(EntityType::new("brand"))
            .with_true_values(ValueRange::single(1.0));
        let targets = TargetInstances::new(
            EntityType::new("brand"),
            vec![EntityInstance::new(1, "A"), EntityInstance::new(2, "B")],
        );
        let period = CalculationPeriod::new(date(1), date(2)).unwrap();

        let series = repo
            .get_unweighted_counts(UnweightedCountQuery {
                measure: &measure,
                subset: &subset,
                period: &period,
                filter: &Filter::AlwaysInclude,
                targets: Some(&targets),
            })
            .await
            .unwrap();

        assert_eq!(series.len(), 2);
        let brand_a = &series[0];
        assert_eq!(brand_a.days.len(), 2);
        assert_eq!(brand_a.days[0].sample_size(), 2);
        let female_day1 = brand_a.days[0].cells.iter().find(|c| c.cell == female.key).unwrap();
        assert_eq!(female_day1.true_count, 1);
        assert_eq!(series[1].days.len(), 1);
        assert_eq!(repo.unweighted_query_count(), 1);
    }

    #[tokio::test]
    async fn test_unhealthy_repository_fails_retryably() {
        let (repo, subset, _, _) = seeded();
        repo.set_healthy(false);
        let err = repo.get_subset(&subset).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_measure_is_not_found() {
        let repo = LocalRepository::new();
        let err = repo.get_measure("nope").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.context().key.as_deref(), Some("nope"));
    }

    #[tokio::test]
    async fn test_latest_complete_date_defaults_to_last_respondent() {
        let (repo, subset, _, _) = seeded();
        assert_eq!(repo.latest_complete_date(&subset).await.unwrap(), date(2));
        repo.set_latest_complete_date(&subset, date(1));
        assert_eq!(repo.latest_complete_date(&subset).await.unwrap(), date(1));
    }

    #[tokio::test]
    async fn test_quota_targets_balance_stored_sample() {
        let (repo, subset, female, male) = seeded();
        repo.set_quota_targets(&subset, &[(female.clone(), 0.5), (male.clone(), 0.5)]);
        let cells = repo.get_quota_cells(&subset).await.unwrap();
        // 3 female, 1 male respondents
        let wf = cells.weight_of(&female.key).unwrap();
        let wm = cells.weight_of(&male.key).unwrap();
        assert!((wf * 3.0 - wm).abs() < 1e-9);
    }

    #[test]
    fn test_fixture_json() {
        let json = r#"{
            "measures": [{"name": "aware", "display_name": "Awareness", "calculation_type": "YesNo"}],
            "subsets": [{"id": "uk-consumer", "display_name": "UK", "start_date": "2024-01-01"}],
            "quota_cells": {"uk-consumer": [{"cell": {"key": "all", "demographics": {}}, "weight": 1.0}]},
            "entities": [{"entity_type": "brand", "instances": [{"id": 2, "name": "B"}, {"id": 1, "name": "A"}]}],
            "respondents": [{"id": 1, "subset": "uk-consumer", "date": "2024-01-02", "quota_cell": "all",
                             "answers": [{"field": "aware", "entity": 1, "value": 1}]}]
        }"#;
        let repo = LocalRepository::from_fixture_json(json).unwrap();
        assert_eq!(repo.respondent_count(), 1);
        let instances = repo.data.read().entities[&EntityType::new("brand")].clone();
        assert_eq!(instances[0].id, EntityInstanceId(1));
    }

    #[test]
    fn test_bad_fixture_is_configuration_error() {
        let err = LocalRepository::from_fixture_json("{ not json").unwrap_err();
        assert!(matches!(err, RepositoryError::Configuration { .. }));
    }
}
