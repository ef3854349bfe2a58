//! Calculation periods and waves.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::services::error::{CalculationError, CalculationResult};

/// An inclusive range of days a calculation covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalculationPeriod {
    start: NaiveDate,
    end: NaiveDate,
}

impl CalculationPeriod {
    /// Create a period from `start` to `end`, both inclusive.
    ///
    /// # Errors
    /// `BadRequest` when `end` is before `start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> CalculationResult<Self> {
        if end < start {
            return Err(CalculationError::bad_request(format!(
                "Calculation period is empty: {} is before {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Period of `days` days ending on `end`.
    pub fn ending_on(end: NaiveDate, days: u32) -> CalculationResult<Self> {
        if days == 0 {
            return Err(CalculationError::bad_request(
                "Calculation period must cover at least one day",
            ));
        }
        Self::new(end - Duration::days(i64::from(days) - 1), end)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn day_count(&self) -> usize {
        ((self.end - self.start).num_days() + 1) as usize
    }

    /// Every day in the period, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |d| *d <= self.end)
    }
}

/// A named fieldwork period compared against other waves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wave {
    pub name: String,
    pub period: CalculationPeriod,
}

impl Wave {
    pub fn new(name: impl Into<String>, period: CalculationPeriod) -> Self {
        Self {
            name: name.into(),
            period,
        }
    }
}
