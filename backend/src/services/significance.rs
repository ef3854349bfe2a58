//! Significance testing between two weighted results.
//!
//! Proportions use a pooled two-proportion z-test; averages and NPS use a
//! Welch-style t statistic from the results' standard deviations. Sample
//! sizes are always the unweighted counts.

use crate::models::{
    CalculationType, NumberFormat, SigConfidenceLevel, Significance, SignificanceAnnotation,
    WeightedDailyResult,
};

/// Test statistic for `result` against `comparand`.
///
/// Returns `None` when either side has no sample or the statistic is
/// undefined (zero standard error).
pub fn calculate_t_score(
    calculation_type: CalculationType,
    result: &WeightedDailyResult,
    comparand: &WeightedDailyResult,
) -> Option<f64> {
    let n1 = result.unweighted_sample_size;
    let n2 = comparand.unweighted_sample_size;
    if n1 == 0 || n2 == 0 {
        return None;
    }
    let v1 = result.weighted_result?;
    let v2 = comparand.weighted_result?;

    match calculation_type {
        CalculationType::Average => match (result.standard_deviation, comparand.standard_deviation) {
            (Some(sd1), Some(sd2)) => mean_t_score(v1, sd1, n1, v2, sd2, n2),
            _ => proportion_z_score(v1, n1, v2, n2),
        },
        CalculationType::NetPromoterScore => {
            let sd1 = result
                .standard_deviation
                .unwrap_or_else(|| nps_max_deviation(v1));
            let sd2 = comparand
                .standard_deviation
                .unwrap_or_else(|| nps_max_deviation(v2));
            mean_t_score(v1, sd1, n1, v2, sd2, n2)
        }
        CalculationType::YesNo | CalculationType::Text => proportion_z_score(v1, n1, v2, n2),
    }
}

fn proportion_z_score(p1: f64, n1: u32, p2: f64, n2: u32) -> Option<f64> {
    let (n1, n2) = (f64::from(n1), f64::from(n2));
    let pooled = (p1 * n1 + p2 * n2) / (n1 + n2);
    let standard_error = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();
    finite_ratio(p1 - p2, standard_error)
}

fn mean_t_score(m1: f64, sd1: f64, n1: u32, m2: f64, sd2: f64, n2: u32) -> Option<f64> {
    let standard_error = (sd1 * sd1 / f64::from(n1) + sd2 * sd2 / f64::from(n2)).sqrt();
    finite_ratio(m1 - m2, standard_error)
}

/// Upper bound on an NPS score's deviation when none was recorded.
fn nps_max_deviation(nps: f64) -> f64 {
    (10_000.0 - nps * nps).max(0.0).sqrt()
}

fn finite_ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator > 0.0 && denominator.is_finite() {
        let ratio = numerator / denominator;
        ratio.is_finite().then_some(ratio)
    } else {
        None
    }
}

/// Classify a test statistic at a confidence level.
pub fn calculate_significance(t_score: Option<f64>, level: SigConfidenceLevel) -> Significance {
    match t_score {
        Some(t) if t > level.critical_value() => Significance::Up,
        Some(t) if t < -level.critical_value() => Significance::Down,
        _ => Significance::None,
    }
}

fn help_text(
    number_format: NumberFormat,
    result: &WeightedDailyResult,
    comparand: &WeightedDailyResult,
    comparand_name: &str,
) -> Option<String> {
    let difference = result.weighted_result? - comparand.weighted_result?;
    let text = match number_format {
        NumberFormat::Percentage => format!("{:+.0}% vs {}", difference * 100.0, comparand_name),
        NumberFormat::Decimal => format!("{:+.2} vs {}", difference, comparand_name),
        NumberFormat::Integer => format!("{:+.0} vs {}", difference, comparand_name),
    };
    Some(text)
}

/// Attach a significance annotation to `result`.
///
/// # Arguments
/// * `calculation_type` - Selects the test
/// * `number_format` - Formats the help text difference
/// * `result` - Result to annotate
/// * `comparand` - Result it is compared against
/// * `comparand_name` - Shown in the annotation, e.g. `"previous period"`
/// * `level` - Confidence level
pub fn mutate_result_to_include_significance(
    calculation_type: CalculationType,
    number_format: NumberFormat,
    result: &mut WeightedDailyResult,
    comparand: &WeightedDailyResult,
    comparand_name: &str,
    level: SigConfidenceLevel,
) {
    let t_score = calculate_t_score(calculation_type, result, comparand);
    let significance = calculate_significance(t_score, level);
    let help_text = match significance {
        Significance::None => None,
        _ => help_text(number_format, result, comparand, comparand_name),
    };
    result.significance = Some(SignificanceAnnotation {
        significance,
        t_score,
        confidence_level: level,
        comparand_name: comparand_name.to_string(),
        help_text,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn result(value: f64, n: u32) -> WeightedDailyResult {
        WeightedDailyResult {
            weighted_result: Some(value),
            unweighted_sample_size: n,
            weighted_sample_size: f64::from(n),
            ..WeightedDailyResult::no_sample(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        }
    }

    fn with_sd(value: f64, n: u32, sd: f64) -> WeightedDailyResult {
        WeightedDailyResult {
            standard_deviation: Some(sd),
            variance: Some(sd * sd),
            ..result(value, n)
        }
    }

    #[test]
    fn test_proportion_significantly_down() {
        let t = calculate_t_score(CalculationType::YesNo, &result(0.0928, 1667), &result(0.1138, 1591));
        assert_eq!(
            calculate_significance(t, SigConfidenceLevel::NinetyFive),
            Significance::Down
        );
    }

    #[test]
    fn test_proportion_z_score_value() {
        let z = calculate_t_score(CalculationType::YesNo, &result(0.5, 100), &result(0.3, 100)).unwrap();
        assert!((z - 2.886_751).abs() < 1e-5);
        assert_eq!(
            calculate_significance(Some(z), SigConfidenceLevel::NinetyFive),
            Significance::Up
        );
        assert_eq!(
            calculate_significance(Some(z), SigConfidenceLevel::NinetyNine),
            Significance::Up
        );
    }

    #[test]
    fn test_average_significantly_up() {
        let t = calculate_t_score(
            CalculationType::Average,
            &with_sd(18.365, 257, 7.94),
            &with_sd(16.979, 272, 8.10),
        );
        assert_eq!(
            calculate_significance(t, SigConfidenceLevel::NinetyFive),
            Significance::Up
        );
    }

    #[test]
    fn test_zero_sample_is_not_significant() {
        let t = calculate_t_score(CalculationType::YesNo, &result(0.9, 0), &result(0.1, 500));
        assert_eq!(t, None);
        assert_eq!(
            calculate_significance(t, SigConfidenceLevel::Ninety),
            Significance::None
        );
    }

    #[test]
    fn test_degenerate_proportions_give_no_score() {
        assert_eq!(
            calculate_t_score(CalculationType::YesNo, &result(1.0, 50), &result(1.0, 50)),
            None
        );
    }

    #[test]
    fn test_nps_without_deviation_uses_bound() {
        let t = calculate_t_score(
            CalculationType::NetPromoterScore,
            &result(40.0, 400),
            &result(10.0, 400),
        )
        .unwrap();
        assert!(t > 1.96);
    }

    #[test]
    fn test_critical_values() {
        assert_eq!(
            calculate_significance(Some(1.7), SigConfidenceLevel::Ninety),
            Significance::Up
        );
        assert_eq!(
            calculate_significance(Some(1.7), SigConfidenceLevel::NinetyFive),
            Significance::None
        );
        assert_eq!(
            calculate_significance(Some(-2.4), SigConfidenceLevel::NinetyEight),
            Significance::Down
        );
        assert_eq!(
            calculate_significance(Some(-2.4), SigConfidenceLevel::NinetyNine),
            Significance::None
        );
    }

    #[test]
    fn test_annotation_help_text() {
        let mut current = result(0.5, 100);
        mutate_result_to_include_significance(
            CalculationType::YesNo,
            NumberFormat::Percentage,
            &mut current,
            &result(0.3, 100),
            "Brand B",
            SigConfidenceLevel::NinetyFive,
        );
        let annotation = current.significance.unwrap();
        assert_eq!(annotation.significance, Significance::Up);
        assert_eq!(annotation.comparand_name, "Brand B");
        assert_eq!(annotation.help_text.as_deref(), Some("+20% vs Brand B"));
    }

    #[test]
    fn test_annotation_without_difference_has_no_help_text() {
        let mut current = result(0.31, 100);
        mutate_result_to_include_significance(
            CalculationType::YesNo,
            NumberFormat::Percentage,
            &mut current,
            &result(0.3, 100),
            "previous period",
            SigConfidenceLevel::NinetyFive,
        );
        let annotation = current.significance.unwrap();
        assert_eq!(annotation.significance, Significance::None);
        assert!(annotation.help_text.is_none());
    }
}
