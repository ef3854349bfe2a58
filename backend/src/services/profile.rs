//! Profile breakdowns: a measure's headline result together with its age,
//! gender, region and segment splits, all weighted from one set of totals.

use futures::future::try_join_all;
use tokio_util::sync::CancellationToken;

use crate::models::{
    BreakdownCategory, BrokenDownResults, DemographicFilter, Measure, ResultsProviderParameters,
};
use crate::services::breakdown::BreakdownCategoryFactory;
use crate::services::convenient::ConvenientCalculator;
use crate::services::error::CalculationResult;

pub struct ProfileBreakdownService {
    calculator: ConvenientCalculator,
}

impl ProfileBreakdownService {
    pub fn new(calculator: ConvenientCalculator) -> Self {
        Self { calculator }
    }

    /// Broken-down results for the primary and every additional measure.
    ///
    /// # Arguments
    /// * `params` - The request
    /// * `demographic_filter` - Restricts which quota cells, and so which
    ///   breakdown labels, are used
    /// * `cancel` - Cancels outstanding counts
    pub async fn broken_down_results(
        &self,
        params: &ResultsProviderParameters,
        demographic_filter: &DemographicFilter,
        cancel: &CancellationToken,
    ) -> CalculationResult<Vec<BrokenDownResults>> {
        let measures =
            std::iter::once(&params.primary_measure).chain(params.additional_measures.iter());
        try_join_all(measures.map(|measure| {
            self.broken_down_for_measure(params, measure, demographic_filter, cancel)
        }))
        .await
    }

    async fn broken_down_for_measure(
        &self,
        params: &ResultsProviderParameters,
        measure: &Measure,
        demographic_filter: &DemographicFilter,
        cancel: &CancellationToken,
    ) -> CalculationResult<BrokenDownResults> {
        let unweighted = self
            .calculator
            .calculate_unweighted_for_measure(params, Some(measure), cancel)
            .await?;

        let factory = BreakdownCategoryFactory::new(&params.quota_cells, demographic_filter);
        let weigh = |category: BreakdownCategory| {
            self.calculator
                .weight_category_without_significance(&unweighted, &category)
        };

        Ok(BrokenDownResults {
            measure_name: measure.name.clone(),
            weighted: self.calculator.calculator().calculate_weighted_from_unweighted(
                &unweighted,
                params.include_significance,
                None,
            ),
            by_age_group: weigh(factory.by_age_group()),
            by_gender: weigh(factory.by_gender()),
            by_region: weigh(factory.by_region()),
            by_segment: factory.by_segment(&params.subset).map(weigh),
        })
    }
}
