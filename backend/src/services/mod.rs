//! Service layer: the calculation pipeline and the preload scheduler.
//!
//! The numeric stages (`weighting`, `breakdown`, `market_average`,
//! `significance`) are synchronous pure functions. `unweighted` is the only
//! stage that touches the repository. `calculator` wraps the stages behind
//! [`MetricCalculator`] so decorators (`legacy_breaks`, `trial`) can be
//! stacked; `convenient`, `waves` and `profile` build request-level results on
//! top, and `preloader` runs saved reports in the background.

pub mod breakdown;
pub mod calculator;
pub mod convenient;
pub mod error;
pub mod legacy_breaks;
pub mod market_average;
pub mod preloader;
pub mod profile;
pub mod results_cache;
pub mod significance;
pub mod task_cache;
pub mod trial;
pub mod unweighted;
pub mod waves;
pub mod weighting;

#[cfg(test)]
pub(crate) mod test_support;

pub use calculator::{build_calculator_chain, MarketAverageOptions, MetricCalculator, PipelineCalculator};
pub use convenient::{ConvenientCalculator, MeasureResults};
pub use error::{CalculationError, CalculationResult};
pub use legacy_breaks::LegacyBreakCalculator;
pub use preloader::DataPreloader;
pub use profile::ProfileBreakdownService;
pub use results_cache::{CachedReport, ResultsCache};
pub use task_cache::{DataPreloadTaskCache, DataPreloadTaskStatus, PreloadState};
pub use trial::{TrialContext, TrialRestrictingCalculator, TrialRestrictionSignal};
pub use waves::{compare_waves, WaveComparand, WaveComparison, WaveResults};
