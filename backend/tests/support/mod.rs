#![allow(dead_code)]

use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use survey_metrics::api::*;

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// This is panic-safe (restores variables on unwind) and also serializes access to
/// process-global env vars to avoid flaky tests when Rust runs tests in parallel.
///
/// `changes` is a list of `(key, value)` pairs:
/// - `Some(v)` sets the variable to `v`
/// - `None` removes the variable
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().expect("ENV_LOCK poisoned");
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

pub const SUBSET: &str = "uk-consumer";
pub const AWARENESS: &str = "awareness";
pub const RESPONDENTS_PER_DAY: i64 = 100;

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
}

pub fn brand() -> EntityType {
    EntityType::new("brand")
}

pub fn brands() -> Vec<EntityInstance> {
    vec![
        EntityInstance::new(1, "A"),
        EntityInstance::new(2, "B"),
        EntityInstance::new(3, "C"),
    ]
}

pub fn cells() -> Vec<QuotaCell> {
    let mut cells = Vec::new();
    for gender in ["f", "m"] {
        for age in ["young", "old"] {
            cells.push(QuotaCell::from_parts([
                ("gender", gender),
                ("age", age),
                ("segment", if age == "young" { "new" } else { "loyal" }),
            ]));
        }
    }
    cells
}

pub fn awareness() -> Measure {
    Measure::new(AWARENESS, CalculationType::YesNo)
        .with_entity_type(brand())
        .with_true_values(ValueRange::single(1.0))
}

/// The uk-consumer fixture: brands A, B and C are known by 50, 30 and 20 of
/// 100 respondents on every day from 1 to 7 January 2024. Every quota cell is
/// weighted 1.0.
pub fn uk_consumer() -> LocalRepository {
    let repo = LocalRepository::new();
    let subset = Subset::new(SUBSET, "UK consumers", date(1));
    let subset_id = subset.id.clone();
    let cells = cells();

    repo.add_subset(subset);
    repo.add_measure(awareness());
    repo.add_entity_instances(brand(), brands());
    repo.set_quota_cells(&subset_id, GroupedQuotaCells::unit_weights(cells.clone()));

    let mut id = 0;
    for day in 1..=7 {
        for i in 0..RESPONDENTS_PER_DAY {
            id += 1;
            let cell = &cells[(i % 4) as usize];
            let answer = |threshold: i64| if i < threshold { 1.0 } else { 0.0 };
            repo.add_respondent(
                Respondent::new(id, &subset_id, date(day), cell)
                    .answer(AWARENESS, Some(1), answer(50))
                    .answer(AWARENESS, Some(2), answer(30))
                    .answer(AWARENESS, Some(3), answer(20)),
            );
        }
    }
    repo
}

pub fn saved_report(id: i64, name: &str, measure: &str, breaks: &[&str]) -> SavedReport {
    SavedReport {
        id: ReportId(id),
        name: name.to_string(),
        measure_name: measure.to_string(),
        entity_type: Some(brand()),
        entity_instance_ids: Vec::new(),
        filter: Filter::AlwaysInclude,
        period_days: 7,
        subset_ids: None,
        breaks: breaks.iter().map(|b| b.to_string()).collect(),
    }
}

/// Awareness of every brand over the whole fixture week.
pub fn week_params() -> ResultsProviderParameters {
    params_for(date(1), date(7))
}

pub fn params_for(start: NaiveDate, end: NaiveDate) -> ResultsProviderParameters {
    ResultsProviderParameters::builder(
        Subset::new(SUBSET, "UK consumers", date(1)),
        awareness(),
        CalculationPeriod::new(start, end).unwrap(),
        GroupedQuotaCells::unit_weights(cells()),
    )
    .requested_instances(TargetInstances::new(brand(), brands()))
    .build()
    .unwrap()
}

pub fn calculator(repo: &LocalRepository, config: &EngineConfig) -> ConvenientCalculator {
    let repo: Arc<dyn FullRepository> = Arc::new(repo.clone());
    ConvenientCalculator::from_config(repo, config, None)
}
