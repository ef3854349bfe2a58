//! Results computed by the preloader, kept for requests to reuse.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{
    EntityCategoryResults, EntityWeightedDailyResults, ReportId, SubsetId, UnweightedTotals,
};

#[derive(Debug, Clone, PartialEq)]
pub struct CachedReport {
    pub subset: SubsetId,
    pub report_id: ReportId,
    pub unweighted: Arc<UnweightedTotals>,
    pub weighted: Vec<EntityWeightedDailyResults>,
    /// Saved breakdown name with its results, in report order.
    pub breaks: Vec<(String, Vec<EntityCategoryResults>)>,
    pub computed_at: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct ResultsCache {
    entries: Arc<RwLock<HashMap<(SubsetId, ReportId), Arc<CachedReport>>>>,
}

impl ResultsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a report's results, replacing any earlier run.
    pub fn insert(&self, report: CachedReport) {
        let key = (report.subset.clone(), report.report_id);
        self.entries.write().insert(key, Arc::new(report));
    }

    pub fn get(&self, subset: &SubsetId, report_id: ReportId) -> Option<Arc<CachedReport>> {
        self.entries
            .read()
            .get(&(subset.clone(), report_id))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
