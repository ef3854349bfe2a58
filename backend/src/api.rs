//! Public API surface of the engine.
//!
//! Re-exports the types a caller needs to build requests, run calculations
//! and drive preloading, so they can be imported from one place.

pub use crate::config::{CalculationSettings, EngineConfig, PreloadSettings, RepositorySettings};
pub use crate::db::factory::{RepositoryFactory, RepositoryType};
pub use crate::db::repository::{FullRepository, RepositoryError, RepositoryResult};
pub use crate::db::repositories::{LocalRepository, Respondent};

pub use crate::models::{
    AverageDescriptor, AverageType, BreakdownCategory, BrokenDownResults, CalculationPeriod,
    CalculationType, CategoryResults, DemographicFilter, EntityCategoryResults, EntityInstance,
    EntityInstanceId, EntityMeanMap, EntityMeanMapping, EntityType, EntityWeightedDailyResults,
    Filter, GroupedQuotaCells, MainQuestionType, Measure, NumberFormat, QuotaCell, ReportId,
    ResultsProviderParameters, SavedReport, SigConfidenceLevel, Significance,
    SignificanceAnnotation, Subset, SubsetId, TargetInstances, Totalisation, UnweightedTotals,
    ValueRange, Wave, WeightedDailyResult, WeightedQuotaCell,
};

pub use crate::services::{
    build_calculator_chain, compare_waves, CachedReport, CalculationError, CalculationResult,
    ConvenientCalculator, DataPreloadTaskCache, DataPreloadTaskStatus, DataPreloader,
    MetricCalculator, PreloadState, ProfileBreakdownService, ResultsCache, TrialContext,
    TrialRestrictionSignal, WaveComparand, WaveComparison,
};
