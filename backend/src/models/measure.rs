//! Measure definitions: what is counted for a metric and how it is turned into a number.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::entity::EntityType;
use crate::services::error::{CalculationError, CalculationResult};

/// How a measure's weighted value is computed from respondent answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalculationType {
    /// Share of the base whose answer falls in the measure's true values.
    YesNo,
    /// Mean of a numeric answer.
    Average,
    /// Promoter share minus detractor share, in points.
    NetPromoterScore,
    /// Free text; cannot be aggregated.
    Text,
}

impl FromStr for CalculationType {
    type Err = CalculationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['_', '-', ' '], "").as_str() {
            "yesno" | "proportion" => Ok(Self::YesNo),
            "average" | "mean" => Ok(Self::Average),
            "netpromoterscore" | "nps" => Ok(Self::NetPromoterScore),
            "text" => Ok(Self::Text),
            _ => Err(CalculationError::bad_request(format!(
                "Unknown calculation type: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for CalculationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::YesNo => "YesNo",
            Self::Average => "Average",
            Self::NetPromoterScore => "NetPromoterScore",
            Self::Text => "Text",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NumberFormat {
    #[default]
    Percentage,
    Decimal,
    Integer,
}

/// Inclusive range of answer codes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn single(value: f64) -> Self {
        Self::new(value, value)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn is_valid(&self) -> bool {
        self.min <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub name: String,
    pub display_name: String,
    /// Entity types the measure is asked about. Empty for profile questions.
    #[serde(default)]
    pub entity_combination: Vec<EntityType>,
    #[serde(default)]
    pub number_format: NumberFormat,
    pub calculation_type: CalculationType,
    /// Answers counted as "true" (promoters for NPS).
    #[serde(default)]
    pub true_values: Option<ValueRange>,
    /// Answers counted as detractors. NPS only.
    #[serde(default)]
    pub detractor_values: Option<ValueRange>,
    /// Field whose answers define the base. Defaults to the measure's own field.
    #[serde(default)]
    pub base_field: Option<String>,
    /// Measure whose results size entities in the market average.
    #[serde(default)]
    pub market_average_base_measure: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub disabled_for_filter: bool,
    #[serde(default = "default_true")]
    pub eligible_for_crosstab: bool,
}

fn default_true() -> bool {
    true
}

impl Measure {
    pub fn new(name: impl Into<String>, calculation_type: CalculationType) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            entity_combination: Vec::new(),
            number_format: NumberFormat::default(),
            calculation_type,
            true_values: None,
            detractor_values: None,
            base_field: None,
            market_average_base_measure: None,
            disabled: false,
            disabled_for_filter: false,
            eligible_for_crosstab: true,
        }
    }

    pub fn with_entity_type(mut self, entity_type: EntityType) -> Self {
        self.entity_combination.push(entity_type);
        self
    }

    pub fn with_true_values(mut self, range: ValueRange) -> Self {
        self.true_values = Some(range);
        self
    }

    pub fn with_detractor_values(mut self, range: ValueRange) -> Self {
        self.detractor_values = Some(range);
        self
    }

    pub fn with_base_field(mut self, field: impl Into<String>) -> Self {
        self.base_field = Some(field.into());
        self
    }

    pub fn with_market_average_base_measure(mut self, measure: impl Into<String>) -> Self {
        self.market_average_base_measure = Some(measure.into());
        self
    }

    /// Field used to decide whether a respondent is in the base.
    pub fn base_field_name(&self) -> &str {
        self.base_field.as_deref().unwrap_or(&self.name)
    }

    pub fn has_entities(&self) -> bool {
        !self.entity_combination.is_empty()
    }

    /// Checks the measure can be calculated at all.
    pub fn validate(&self) -> CalculationResult<()> {
        if self.entity_combination.len() > 2 {
            return Err(CalculationError::bad_request(format!(
                "Measure '{}' combines {} entity types; at most two are supported",
                self.name,
                self.entity_combination.len()
            )));
        }
        if self.calculation_type == CalculationType::Text {
            return Err(CalculationError::bad_request(format!(
                "Measure '{}' is a text measure and cannot be calculated",
                self.name
            )));
        }
        for range in [self.true_values, self.detractor_values].into_iter().flatten() {
            if !range.is_valid() {
                return Err(CalculationError::bad_request(format!(
                    "Measure '{}' has an inverted value range {}..{}",
                    self.name, range.min, range.max
                )));
            }
        }
        Ok(())
    }
}
