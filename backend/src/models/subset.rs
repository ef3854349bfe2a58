//! Survey subsets (a market or audience slice such as `uk-consumer`).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::define_key_type;

define_key_type!(SubsetId);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subset {
    pub id: SubsetId,
    pub display_name: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub override_start_date: Option<NaiveDate>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Segment labels configured for the segment breakdown, in display order.
    #[serde(default)]
    pub segment_names: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl Subset {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, start_date: NaiveDate) -> Self {
        Self {
            id: SubsetId::new(id),
            display_name: display_name.into(),
            start_date,
            override_start_date: None,
            enabled: true,
            segment_names: Vec::new(),
        }
    }

    /// First day with usable data for this subset.
    pub fn effective_start_date(&self) -> NaiveDate {
        self.override_start_date.unwrap_or(self.start_date)
    }
}
