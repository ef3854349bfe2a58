//! Background preloading of saved-report data.
//!
//! A preload walks every saved report of every enabled subset, computes its
//! results and keeps them in the [`ResultsCache`]. At most one preload runs
//! per deployment; its progress lives in the [`DataPreloadTaskCache`] so
//! callers can poll, cancel or clear it.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::PreloadSettings;
use crate::db::repository::{
    EntityRepository, FullRepository, MeasureRepository, SavedReportRepository, SubsetRepository,
};
use crate::models::{
    AverageDescriptor, BreakdownCategory, CalculationPeriod, DemographicFilter,
    EntityCategoryResults, ParsedReport, ResultsProviderParameters, Subset, TargetInstances,
};
use crate::services::breakdown::BreakdownCategoryFactory;
use crate::services::convenient::ConvenientCalculator;
use crate::services::error::{CalculationError, CalculationResult};
use crate::services::results_cache::{CachedReport, ResultsCache};
use crate::services::task_cache::{DataPreloadTaskCache, DataPreloadTaskStatus, PreloadState};

#[derive(Clone)]
pub struct DataPreloader {
    repo: Arc<dyn FullRepository>,
    calculator: ConvenientCalculator,
    tasks: DataPreloadTaskCache,
    results: ResultsCache,
    cache_key: String,
    max_parallelism: usize,
}

impl DataPreloader {
    pub fn new(
        calculator: ConvenientCalculator,
        tasks: DataPreloadTaskCache,
        results: ResultsCache,
        settings: &PreloadSettings,
    ) -> Self {
        Self {
            repo: calculator.repository().clone(),
            calculator,
            tasks,
            results,
            cache_key: settings.cache_key(),
            max_parallelism: settings.max_parallelism.max(1),
        }
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub fn results(&self) -> &ResultsCache {
        &self.results
    }

    /// Start preloading every saved report, unless a preload is already running.
    ///
    /// The work runs on a spawned task under a child of `cancel`; this returns
    /// as soon as it has started.
    ///
    /// # Returns
    /// The running task's status if there is one, otherwise the new task's
    /// initial status.
    ///
    /// # Errors
    /// Repository errors while enumerating reports. Failures of individual
    /// reports are recorded in the status instead.
    pub async fn preload_report_data_into_memory(
        &self,
        cancel: &CancellationToken,
    ) -> CalculationResult<DataPreloadTaskStatus> {
        if let Some(status) = self.tasks.get(&self.cache_key) {
            if status.is_live() {
                log::debug!("Preload {} already running", status.task_id);
                return Ok(status);
            }
        }

        let reports = self.get_reports_to_preload().await?;
        let token = cancel.child_token();
        let (status, started) = self.tasks.start_if_idle(
            &self.cache_key,
            DataPreloadTaskStatus::new(reports.len()),
            token.clone(),
        );
        if !started {
            return Ok(status);
        }

        log::info!(
            "Starting preload {} of {} reports for '{}'",
            status.task_id,
            reports.len(),
            self.cache_key
        );
        let worker = self.clone();
        let task_id = status.task_id;
        tokio::spawn(async move { worker.run(reports, token, task_id).await });
        Ok(status)
    }

    /// # Errors
    /// `NotFound` when no preload has been started or it has expired.
    pub fn check_task_status(&self) -> CalculationResult<DataPreloadTaskStatus> {
        self.tasks
            .get(&self.cache_key)
            .ok_or_else(|| self.no_task())
    }

    /// # Errors
    /// `NotFound` when there is no preload to cancel.
    pub fn cancel_task(&self) -> CalculationResult<DataPreloadTaskStatus> {
        let status = self
            .tasks
            .cancel(&self.cache_key)
            .ok_or_else(|| self.no_task())?;
        log::info!("Cancelled preload {}", status.task_id);
        Ok(status)
    }

    /// Forget the current task, running or not.
    pub fn clear_task_status(&self) {
        if let Some(status) = self.tasks.remove(&self.cache_key) {
            log::info!("Cleared preload {}", status.task_id);
        }
    }

    pub fn state(&self) -> PreloadState {
        self.tasks
            .get(&self.cache_key)
            .map(|s| s.state())
            .unwrap_or(PreloadState::Idle)
    }

    /// Every saved report resolved against every enabled subset it applies to.
    pub async fn get_reports_to_preload(&self) -> CalculationResult<Vec<ParsedReport>> {
        let subsets = self.repo.list_subsets().await?;
        let reports = self.repo.list_reports().await?;
        Ok(subsets
            .iter()
            .filter(|subset| subset.enabled)
            .flat_map(|subset| {
                reports
                    .iter()
                    .filter(|report| report.applies_to(&subset.id))
                    .map(|report| ParsedReport {
                        subset: subset.id.clone(),
                        report: report.clone(),
                    })
            })
            .collect())
    }

    fn no_task(&self) -> CalculationError {
        CalculationError::not_found(format!("No preload task for '{}'", self.cache_key))
    }

    async fn run(self, reports: Vec<ParsedReport>, cancel: CancellationToken, task_id: Uuid) {
        stream::iter(reports)
            .map(|report| {
                let worker = self.clone();
                let cancel = cancel.clone();
                async move { worker.preload_unit(report, &cancel, task_id).await }
            })
            .buffer_unordered(self.max_parallelism)
            .collect::<Vec<()>>()
            .await;

        match self.tasks.get(&self.cache_key) {
            Some(status) if status.task_id == task_id => log::info!(
                "Preload {} finished: {}/{} attempted, {} failed, cancelled: {}",
                task_id,
                status.completed_count,
                status.total_count,
                status.errors.len(),
                status.is_cancelled
            ),
            _ => log::info!("Preload {} finished after its status was cleared", task_id),
        }
    }

    async fn preload_unit(&self, report: ParsedReport, cancel: &CancellationToken, task_id: Uuid) {
        if cancel.is_cancelled() {
            return;
        }
        let outcome = self.preload_report(&report, cancel).await;
        if matches!(outcome, Err(CalculationError::Cancelled)) {
            return;
        }
        if let Err(e) = &outcome {
            log::warn!("Preloading {} failed: {}", report.describe(), e);
        }
        self.tasks.update(&self.cache_key, task_id, |status| {
            status.completed_count += 1;
            if let Err(e) = outcome {
                status.errors.push(format!("{}: {}", report.describe(), e));
            }
        });
    }

    async fn preload_report(
        &self,
        parsed: &ParsedReport,
        cancel: &CancellationToken,
    ) -> CalculationResult<()> {
        let saved = &parsed.report;
        saved.validate_breaks()?;

        let subset = self.repo.get_subset(&parsed.subset).await?;
        let measure = self.repo.get_measure(&saved.measure_name).await?;
        let quota_cells = self.repo.get_quota_cells(&subset.id).await?;
        let latest = self.repo.latest_complete_date(&subset.id).await?;
        let period = CalculationPeriod::ending_on(latest, saved.period_days)?;

        let mut builder =
            ResultsProviderParameters::builder(subset.clone(), measure.clone(), period, quota_cells)
                .filter(saved.filter.clone())
                .average(AverageDescriptor::whole_period())
                .confidence_level(self.calculator.default_confidence_level());
        if let Some(entity_type) = saved
            .entity_type
            .clone()
            .or_else(|| measure.entity_combination.first().cloned())
            .filter(|_| measure.has_entities())
        {
            let mut instances = self.repo.get_instances(&entity_type, &subset.id).await?;
            if !saved.entity_instance_ids.is_empty() {
                instances.retain(|i| saved.entity_instance_ids.contains(&i.id));
            }
            builder = builder.requested_instances(TargetInstances::new(entity_type, instances));
        }
        let params = builder.build()?;

        let unweighted = self
            .calculator
            .calculate_unweighted_for_measure(&params, None, cancel)
            .await?;
        if cancel.is_cancelled() {
            return Err(CalculationError::Cancelled);
        }
        let weighted = self
            .calculator
            .calculator()
            .calculate_weighted_from_unweighted(&unweighted, false, None);

        let demographic_filter = DemographicFilter::all();
        let factory = BreakdownCategoryFactory::new(&params.quota_cells, &demographic_filter);
        let mut breaks: Vec<(String, Vec<EntityCategoryResults>)> = Vec::new();
        for name in &saved.breaks {
            match saved_break(&factory, name, &subset)? {
                Some(category) => breaks.push((
                    name.clone(),
                    self.calculator
                        .weight_category_without_significance(&unweighted, &category),
                )),
                None => log::debug!(
                    "Break '{}' of {} has no resolvable labels",
                    name,
                    parsed.describe()
                ),
            }
        }

        self.results.insert(CachedReport {
            subset: subset.id.clone(),
            report_id: saved.id,
            unweighted,
            weighted,
            breaks,
            computed_at: Utc::now(),
        });
        Ok(())
    }
}

fn saved_break(
    factory: &BreakdownCategoryFactory<'_>,
    name: &str,
    subset: &Subset,
) -> CalculationResult<Option<BreakdownCategory>> {
    match name.to_lowercase().as_str() {
        "age" => Ok(Some(factory.by_age_group())),
        "gender" => Ok(Some(factory.by_gender())),
        "region" => Ok(Some(factory.by_region())),
        "segment" => Ok(factory.by_segment(subset)),
        _ => Err(CalculationError::bad_request(format!(
            "Unknown saved breakdown '{}'",
            name
        ))),
    }
}
