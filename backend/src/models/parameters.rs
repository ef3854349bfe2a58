//! Request parameters for a metric calculation.

use serde::{Deserialize, Serialize};

use super::entity::{EntityInstanceId, TargetInstances};
use super::filter::Filter;
use super::measure::Measure;
use super::period::CalculationPeriod;
use super::quota_cells::GroupedQuotaCells;
use super::results::SigConfidenceLevel;
use super::subset::Subset;
use crate::services::error::{CalculationError, CalculationResult};

/// How days are grouped into reported results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Totalisation {
    /// One result per day.
    #[default]
    Daily,
    /// A single result for the whole period, dated at its last day.
    WholePeriod,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AverageDescriptor {
    pub id: String,
    pub totalisation: Totalisation,
}

impl AverageDescriptor {
    pub fn daily() -> Self {
        Self {
            id: "daily".to_string(),
            totalisation: Totalisation::Daily,
        }
    }

    pub fn whole_period() -> Self {
        Self {
            id: "whole-period".to_string(),
            totalisation: Totalisation::WholePeriod,
        }
    }
}

impl Default for AverageDescriptor {
    fn default() -> Self {
        Self::daily()
    }
}

/// How entity results are combined into a market average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AverageType {
    /// Equal-weighted mean of entity results.
    #[default]
    Mean,
    /// Size-weighted mean of entity results.
    ResultMean,
    /// Mean of entity ids (or mapped values) weighted by selections.
    EntityIdMean,
    /// Entity id holding the median selection.
    Median,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MainQuestionType {
    /// Each respondent picks one entity; entities share a base.
    SingleChoice,
    /// Each entity is asked separately.
    #[default]
    MultipleChoice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMeanMapping {
    pub entity_id: EntityInstanceId,
    pub mean_calculation_value: f64,
    #[serde(default = "default_include")]
    pub include_in_calculation: bool,
}

fn default_include() -> bool {
    true
}

/// Replaces entity ids with configured values when averaging ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityMeanMap {
    pub mapping: Vec<EntityMeanMapping>,
}

impl EntityMeanMap {
    pub fn get(&self, id: EntityInstanceId) -> Option<&EntityMeanMapping> {
        self.mapping.iter().find(|m| m.entity_id == id)
    }
}

/// Everything needed to run one metric calculation.
#[derive(Debug, Clone)]
pub struct ResultsProviderParameters {
    pub subset: Subset,
    pub primary_measure: Measure,
    pub additional_measures: Vec<Measure>,
    /// `None` for measures that are not asked about an entity.
    pub requested_instances: Option<TargetInstances>,
    pub filter_instances: Vec<TargetInstances>,
    pub filter: Filter,
    pub quota_cells: GroupedQuotaCells,
    pub calculation_period: CalculationPeriod,
    pub average: AverageDescriptor,
    pub include_significance: bool,
    pub sig_confidence_level: SigConfidenceLevel,
    pub average_type: AverageType,
    pub question_type: MainQuestionType,
    pub entity_mean_map: Option<EntityMeanMap>,
    pub sample_size_entity_instance_id: Option<EntityInstanceId>,
    pub low_sample_entity_instance_ids: Vec<EntityInstanceId>,
    pub focus_entity_instance_id: Option<EntityInstanceId>,
}

impl ResultsProviderParameters {
    pub fn builder(
        subset: Subset,
        primary_measure: Measure,
        calculation_period: CalculationPeriod,
        quota_cells: GroupedQuotaCells,
    ) -> ResultsProviderParametersBuilder {
        ResultsProviderParametersBuilder {
            params: ResultsProviderParameters {
                subset,
                primary_measure,
                additional_measures: Vec::new(),
                requested_instances: None,
                filter_instances: Vec::new(),
                filter: Filter::AlwaysInclude,
                quota_cells,
                calculation_period,
                average: AverageDescriptor::daily(),
                include_significance: false,
                sig_confidence_level: SigConfidenceLevel::default(),
                average_type: AverageType::default(),
                question_type: MainQuestionType::default(),
                entity_mean_map: None,
                sample_size_entity_instance_id: None,
                low_sample_entity_instance_ids: Vec::new(),
                focus_entity_instance_id: None,
            },
        }
    }
}

pub struct ResultsProviderParametersBuilder {
    params: ResultsProviderParameters,
}

impl ResultsProviderParametersBuilder {
    pub fn requested_instances(mut self, targets: TargetInstances) -> Self {
        self.params.requested_instances = Some(targets);
        self
    }

    pub fn additional_measure(mut self, measure: Measure) -> Self {
        self.params.additional_measures.push(measure);
        self
    }

    pub fn filter_instances(mut self, targets: TargetInstances) -> Self {
        self.params.filter_instances.push(targets);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.params.filter = filter;
        self
    }

    pub fn average(mut self, average: AverageDescriptor) -> Self {
        self.params.average = average;
        self
    }

    /// Set the confidence level without turning significance on.
    pub fn confidence_level(mut self, level: SigConfidenceLevel) -> Self {
        self.params.sig_confidence_level = level;
        self
    }

    pub fn significance(mut self, level: SigConfidenceLevel) -> Self {
        self.params.include_significance = true;
        self.params.sig_confidence_level = level;
        self
    }

    pub fn average_type(mut self, average_type: AverageType) -> Self {
        self.params.average_type = average_type;
        self
    }

    pub fn question_type(mut self, question_type: MainQuestionType) -> Self {
        self.params.question_type = question_type;
        self
    }

    pub fn entity_mean_map(mut self, map: EntityMeanMap) -> Self {
        self.params.entity_mean_map = Some(map);
        self
    }

    pub fn sample_size_entity(mut self, id: EntityInstanceId) -> Self {
        self.params.sample_size_entity_instance_id = Some(id);
        self
    }

    pub fn low_sample_entities(mut self, ids: Vec<EntityInstanceId>) -> Self {
        self.params.low_sample_entity_instance_ids = ids;
        self
    }

    pub fn focus_entity(mut self, id: EntityInstanceId) -> Self {
        self.params.focus_entity_instance_id = Some(id);
        self
    }

    /// Validate and return the parameters.
    ///
    /// # Errors
    /// `BadRequest` for an invalid measure or filter, or when a measure asked
    /// about entities has no requested instances (or the reverse).
    pub fn build(self) -> CalculationResult<ResultsProviderParameters> {
        let params = self.params;
        params.primary_measure.validate()?;
        params.filter.validate()?;

        match (&params.requested_instances, params.primary_measure.has_entities()) {
            (None, true) => {
                return Err(CalculationError::bad_request(format!(
                    "Measure '{}' needs requested entity instances",
                    params.primary_measure.name
                )))
            }
            (Some(_), false) => {
                return Err(CalculationError::bad_request(format!(
                    "Measure '{}' is not asked about entities",
                    params.primary_measure.name
                )))
            }
            (Some(targets), true)
                if !params.primary_measure.entity_combination.contains(&targets.entity_type) =>
            {
                return Err(CalculationError::bad_request(format!(
                    "Measure '{}' is not asked about '{}'",
                    params.primary_measure.name, targets.entity_type
                )))
            }
            _ => {}
        }
        Ok(params)
    }
}
