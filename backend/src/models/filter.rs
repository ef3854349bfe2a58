//! Respondent filters.
//!
//! A [`Filter`] is a composite tree evaluated against anything implementing
//! [`FilterSubject`]; a [`DemographicFilter`] is the demographic-only leaf that
//! also selects quota cells.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::entity::EntityInstanceId;
use super::measure::ValueRange;
use crate::services::error::{CalculationError, CalculationResult};

/// What a filter can ask about a respondent.
pub trait FilterSubject {
    /// Value of a demographic field such as `"age"` or `"region"`.
    fn demographic(&self, field: &str) -> Option<&str>;
    /// Numeric answer to `field`, optionally about one entity instance.
    fn answer(&self, field: &str, entity: Option<EntityInstanceId>) -> Option<f64>;
}

/// Allowed values per demographic field. An empty filter admits everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DemographicFilter {
    constraints: BTreeMap<String, BTreeSet<String>>,
}

impl DemographicFilter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict `field` to `values`, intersecting with any existing restriction.
    pub fn with<I, S>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        let field = field.into();
        let merged = match self.constraints.remove(&field) {
            Some(existing) => existing.intersection(&values).cloned().collect(),
            None => values,
        };
        self.constraints.insert(field, merged);
        self
    }

    pub fn is_unrestricted(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn constraints(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.constraints
    }

    /// True when every constrained field has an allowed value.
    pub fn matches<'a, F>(&self, lookup: F) -> bool
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        self.constraints.iter().all(|(field, allowed)| {
            lookup(field).map(|v| allowed.contains(v)).unwrap_or(false)
        })
    }

    pub fn matches_map(&self, demographics: &BTreeMap<String, String>) -> bool {
        self.matches(|field| demographics.get(field).map(String::as_str))
    }

    pub fn validate(&self) -> CalculationResult<()> {
        match self.constraints.iter().find(|(_, values)| values.is_empty()) {
            Some((field, _)) => Err(CalculationError::bad_request(format!(
                "Demographic filter on '{}' admits no values",
                field
            ))),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Filter {
    #[default]
    AlwaysInclude,
    Demographic(DemographicFilter),
    Answer {
        field: String,
        #[serde(default)]
        entity: Option<EntityInstanceId>,
        range: ValueRange,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn matches(&self, subject: &impl FilterSubject) -> bool {
        match self {
            Filter::AlwaysInclude => true,
            Filter::Demographic(demographic) => {
                demographic.matches(|field| subject.demographic(field))
            }
            Filter::Answer {
                field,
                entity,
                range,
            } => subject
                .answer(field, *entity)
                .map(|v| range.contains(v))
                .unwrap_or(false),
            Filter::And(children) => children.iter().all(|c| c.matches(subject)),
            Filter::Or(children) => children.iter().any(|c| c.matches(subject)),
            Filter::Not(child) => !child.matches(subject),
        }
    }

    /// Rejects trees that cannot be evaluated meaningfully.
    pub fn validate(&self) -> CalculationResult<()> {
        match self {
            Filter::AlwaysInclude => Ok(()),
            Filter::Demographic(demographic) => demographic.validate(),
            Filter::Answer { field, range, .. } => {
                if field.is_empty() {
                    return Err(CalculationError::bad_request(
                        "Answer filter is missing its field",
                    ));
                }
                if !range.is_valid() {
                    return Err(CalculationError::bad_request(format!(
                        "Answer filter on '{}' has an inverted range",
                        field
                    )));
                }
                Ok(())
            }
            Filter::And(children) | Filter::Or(children) => {
                if children.is_empty() {
                    return Err(CalculationError::bad_request(
                        "Composite filter has no children",
                    ));
                }
                children.iter().try_for_each(Filter::validate)
            }
            Filter::Not(child) => child.validate(),
        }
    }
}
