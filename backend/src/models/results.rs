//! Weighted result types produced by the calculation pipeline.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::entity::EntityInstance;

/// Direction of a significant difference against a comparand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Significance {
    Up,
    Down,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SigConfidenceLevel {
    Ninety,
    #[default]
    NinetyFive,
    NinetyEight,
    NinetyNine,
}

impl SigConfidenceLevel {
    /// Two-tailed critical value of the standard normal distribution.
    pub fn critical_value(self) -> f64 {
        match self {
            Self::Ninety => 1.645,
            Self::NinetyFive => 1.96,
            Self::NinetyEight => 2.326,
            Self::NinetyNine => 2.576,
        }
    }

    pub fn from_percent(percent: u8) -> Option<Self> {
        match percent {
            90 => Some(Self::Ninety),
            95 => Some(Self::NinetyFive),
            98 => Some(Self::NinetyEight),
            99 => Some(Self::NinetyNine),
            _ => None,
        }
    }
}

impl fmt::Display for SigConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let percent = match self {
            Self::Ninety => 90,
            Self::NinetyFive => 95,
            Self::NinetyEight => 98,
            Self::NinetyNine => 99,
        };
        write!(f, "{}%", percent)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignificanceAnnotation {
    pub significance: Significance,
    /// Test statistic; `None` when the test could not be run.
    pub t_score: Option<f64>,
    pub confidence_level: SigConfidenceLevel,
    pub comparand_name: String,
    pub help_text: Option<String>,
}

/// One day's weighted value for one entity (or for the whole sample).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedDailyResult {
    pub date: NaiveDate,
    /// `None` when nobody was in the base.
    pub weighted_result: Option<f64>,
    pub unweighted_sample_size: u32,
    pub weighted_sample_size: f64,
    pub weighted_value_total: f64,
    pub unweighted_value_total: f64,
    pub standard_deviation: Option<f64>,
    pub variance: Option<f64>,
    pub significance: Option<SignificanceAnnotation>,
}

impl WeightedDailyResult {
    /// The defined result for a day with an empty base.
    pub fn no_sample(date: NaiveDate) -> Self {
        Self {
            date,
            weighted_result: None,
            unweighted_sample_size: 0,
            weighted_sample_size: 0.0,
            weighted_value_total: 0.0,
            unweighted_value_total: 0.0,
            standard_deviation: None,
            variance: None,
            significance: None,
        }
    }

    pub fn has_sample(&self) -> bool {
        self.unweighted_sample_size > 0 && self.weighted_result.is_some()
    }

    /// Weighted value, treating an empty base as zero.
    pub fn value_or_zero(&self) -> f64 {
        self.weighted_result.unwrap_or(0.0)
    }

    pub fn significance(&self) -> Significance {
        self.significance
            .as_ref()
            .map(|s| s.significance)
            .unwrap_or_default()
    }
}

/// A day-ordered result series for one entity instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityWeightedDailyResults {
    /// `None` for measures that are not asked about an entity.
    pub entity_instance: Option<EntityInstance>,
    pub weighted_daily_results: Vec<WeightedDailyResult>,
}

impl EntityWeightedDailyResults {
    pub fn new(entity_instance: Option<EntityInstance>, weighted_daily_results: Vec<WeightedDailyResult>) -> Self {
        Self {
            entity_instance,
            weighted_daily_results,
        }
    }

    pub fn last(&self) -> Option<&WeightedDailyResult> {
        self.weighted_daily_results.last()
    }
}

/// Results for one label of a breakdown category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryResults {
    pub label: String,
    pub weighted_daily_results: Vec<WeightedDailyResult>,
}

/// All labels of a breakdown category for one entity instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCategoryResults {
    pub entity_instance: Option<EntityInstance>,
    pub category_results: Vec<CategoryResults>,
}

impl EntityCategoryResults {
    pub fn new(entity_instance: Option<EntityInstance>) -> Self {
        Self {
            entity_instance,
            category_results: Vec::new(),
        }
    }

    pub fn label(&self, label: &str) -> Option<&CategoryResults> {
        self.category_results.iter().find(|c| c.label == label)
    }
}

/// Headline result and the standard demographic breakdowns for one measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokenDownResults {
    pub measure_name: String,
    pub weighted: Vec<EntityWeightedDailyResults>,
    pub by_age_group: Vec<EntityCategoryResults>,
    pub by_gender: Vec<EntityCategoryResults>,
    pub by_region: Vec<EntityCategoryResults>,
    /// Absent when the subset's segments could not all be resolved.
    pub by_segment: Option<Vec<EntityCategoryResults>>,
}
