//! Domain model for survey metric calculation.
//!
//! Types here are plain data: measures and subsets as configured, the
//! weighting scheme, request parameters and the results the pipeline produces.

pub mod macros;

pub mod breakdown;
pub mod entity;
pub mod filter;
pub mod measure;
pub mod parameters;
pub mod period;
pub mod quota_cells;
pub mod reports;
pub mod results;
pub mod subset;
pub mod unweighted;

pub use breakdown::BreakdownCategory;
pub use entity::{EntityInstance, EntityInstanceId, EntityType, TargetInstances};
pub use filter::{DemographicFilter, Filter, FilterSubject};
pub use measure::{CalculationType, Measure, NumberFormat, ValueRange};
pub use parameters::{
    AverageDescriptor, AverageType, EntityMeanMap, EntityMeanMapping, MainQuestionType,
    ResultsProviderParameters, ResultsProviderParametersBuilder, Totalisation,
};
pub use period::{CalculationPeriod, Wave};
pub use quota_cells::{GroupedQuotaCells, QuotaCell, QuotaCellKey, WeightedQuotaCell};
pub use reports::{ParsedReport, ReportId, SavedReport};
pub use results::{
    BrokenDownResults, CategoryResults, EntityCategoryResults, EntityWeightedDailyResults,
    SigConfidenceLevel, Significance, SignificanceAnnotation, WeightedDailyResult,
};
pub use subset::{Subset, SubsetId};
pub use unweighted::{CellTotals, DailyCellTotals, EntityCellSeries, UnweightedTotals};
