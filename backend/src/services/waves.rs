//! Wave comparison.
//!
//! Each wave is totalised over its whole period and tested for significance
//! against either the wave before it or one named wave.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::models::{
    AverageDescriptor, EntityWeightedDailyResults, Measure, ResultsProviderParameters,
    SigConfidenceLevel, Wave,
};
use crate::services::convenient::ConvenientCalculator;
use crate::services::error::{CalculationError, CalculationResult};
use crate::services::significance;

/// What each wave is compared with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaveComparand {
    PreviousWave,
    Named(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaveResults {
    pub wave: Wave,
    /// One whole-period result per entity.
    pub results: Vec<EntityWeightedDailyResults>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaveComparison {
    pub waves: Vec<WaveResults>,
    /// Set when significance could not be calculated; the waves are still valid.
    pub error_message: Option<String>,
}

/// Calculate every wave and annotate each against `comparand`.
///
/// # Errors
/// Calculation errors for any wave. A comparand that names no wave is not an
/// error; it is reported in [`WaveComparison::error_message`].
pub async fn compare_waves(
    calculator: &ConvenientCalculator,
    params: &ResultsProviderParameters,
    waves: &[Wave],
    comparand: &WaveComparand,
    cancel: &CancellationToken,
) -> CalculationResult<WaveComparison> {
    let mut results = Vec::with_capacity(waves.len());
    for wave in waves {
        let mut wave_params = params.clone();
        wave_params.calculation_period = wave.period;
        wave_params.average = AverageDescriptor::whole_period();

        let unweighted = calculator
            .calculate_unweighted_for_measure(&wave_params, None, cancel)
            .await?;
        results.push(WaveResults {
            wave: wave.clone(),
            results: calculator
                .calculator()
                .calculate_weighted_from_unweighted(&unweighted, false, None),
        });
    }

    let error_message = annotate_waves(
        &params.primary_measure,
        params.sig_confidence_level,
        &mut results,
        comparand,
    )
    .err()
    .map(|e| {
        log::warn!("Wave comparison without significance: {}", e);
        e.to_string()
    });

    Ok(WaveComparison {
        waves: results,
        error_message,
    })
}

/// Attach significance annotations to every wave that has a comparand.
///
/// # Errors
/// `SignificanceCalculation` when `comparand` names a wave not in `waves`;
/// nothing is annotated in that case.
pub fn annotate_waves(
    measure: &Measure,
    level: SigConfidenceLevel,
    waves: &mut [WaveResults],
    comparand: &WaveComparand,
) -> CalculationResult<()> {
    let named = match comparand {
        WaveComparand::PreviousWave => None,
        WaveComparand::Named(name) => Some(
            waves
                .iter()
                .position(|w| &w.wave.name == name)
                .ok_or_else(|| CalculationError::significance(name.clone()))?,
        ),
    };

    for index in 0..waves.len() {
        let comparand_index = match named {
            Some(named) if named == index => continue,
            Some(named) => named,
            None if index == 0 => continue,
            None => index - 1,
        };
        let reference = waves[comparand_index].clone();
        let wave = &mut waves[index];
        for (entity, compared) in wave.results.iter_mut().zip(&reference.results) {
            for (result, other) in entity
                .weighted_daily_results
                .iter_mut()
                .zip(&compared.weighted_daily_results)
            {
                significance::mutate_result_to_include_significance(
                    measure.calculation_type,
                    measure.number_format,
                    result,
                    other,
                    &reference.wave.name,
                    level,
                );
            }
        }
    }
    Ok(())
}
