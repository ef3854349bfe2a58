//! Quota cells and weighting schemes.
//!
//! A quota cell is one demographic stratum (e.g. female / 18-24 / north). A
//! [`GroupedQuotaCells`] is a complete weighting scheme: every cell the
//! calculation may draw on together with the weight applied to each of its
//! respondents. Schemes are immutable; narrowing one returns a new scheme.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::filter::DemographicFilter;
use crate::define_key_type;

define_key_type!(QuotaCellKey);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuotaCell {
    pub key: QuotaCellKey,
    /// Demographic field → value for this stratum.
    pub demographics: BTreeMap<String, String>,
}

impl QuotaCell {
    /// Build a cell whose key is derived from its demographic parts,
    /// e.g. `age=18-24|gender=f`.
    pub fn from_parts<I, K, V>(parts: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let demographics: BTreeMap<String, String> = parts
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let key = demographics
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("|");
        Self {
            key: QuotaCellKey(key),
            demographics,
        }
    }

    pub fn demographic(&self, field: &str) -> Option<&str> {
        self.demographics.get(field).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedQuotaCell {
    pub cell: QuotaCell,
    pub weight: f64,
}

impl WeightedQuotaCell {
    pub fn new(cell: QuotaCell, weight: f64) -> Self {
        Self { cell, weight }
    }
}

/// Ordered, read-only set of weighted quota cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedQuotaCells {
    cells: Vec<WeightedQuotaCell>,
    index: HashMap<QuotaCellKey, usize>,
}

impl GroupedQuotaCells {
    pub fn new(cells: Vec<WeightedQuotaCell>) -> Self {
        let mut unique: Vec<WeightedQuotaCell> = Vec::with_capacity(cells.len());
        let mut index = HashMap::with_capacity(cells.len());
        for cell in cells {
            if index.contains_key(&cell.cell.key) {
                log::warn!("Duplicate quota cell {} ignored", cell.cell.key);
                continue;
            }
            index.insert(cell.cell.key.clone(), unique.len());
            unique.push(cell);
        }
        Self {
            cells: unique,
            index,
        }
    }

    /// Every cell weighted 1.0, i.e. an unweighted scheme.
    pub fn unit_weights(cells: impl IntoIterator<Item = QuotaCell>) -> Self {
        Self::new(
            cells
                .into_iter()
                .map(|c| WeightedQuotaCell::new(c, 1.0))
                .collect(),
        )
    }

    /// Sample-balancing weights: each cell is weighted so that its weighted
    /// share of the sample equals its target share.
    ///
    /// # Arguments
    /// * `targets` - Cells with their target population share
    /// * `sample_sizes` - Respondents achieved per cell
    ///
    /// Cells with no respondents get weight 0. Target shares are normalised,
    /// so they need not sum to 1.
    pub fn balanced(targets: &[(QuotaCell, f64)], sample_sizes: &HashMap<QuotaCellKey, u32>) -> Self {
        let target_total: f64 = targets.iter().map(|(_, t)| t.max(0.0)).sum();
        let sample_total: u32 = targets
            .iter()
            .map(|(c, _)| sample_sizes.get(&c.key).copied().unwrap_or(0))
            .sum();

        let cells = targets
            .iter()
            .map(|(cell, target)| {
                let n = sample_sizes.get(&cell.key).copied().unwrap_or(0);
                let weight = if n == 0 || target_total <= 0.0 || sample_total == 0 {
                    0.0
                } else {
                    let target_share = target.max(0.0) / target_total;
                    let sample_share = f64::from(n) / f64::from(sample_total);
                    target_share / sample_share
                };
                WeightedQuotaCell::new(cell.clone(), weight)
            })
            .collect();
        Self::new(cells)
    }

    pub fn cells(&self) -> &[WeightedQuotaCell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, key: &QuotaCellKey) -> bool {
        self.index.contains_key(key)
    }

    /// Weight for a cell, or `None` when the cell is not part of this scheme.
    pub fn weight_of(&self, key: &QuotaCellKey) -> Option<f64> {
        self.index.get(key).map(|&i| self.cells[i].weight)
    }

    /// The cells admitted by a demographic filter, weights unchanged.
    pub fn filtered_by(&self, filter: &DemographicFilter) -> Self {
        if filter.is_unrestricted() {
            return self.clone();
        }
        Self::new(
            self.cells
                .iter()
                .filter(|c| filter.matches_map(&c.cell.demographics))
                .cloned()
                .collect(),
        )
    }

    /// Distinct values of a demographic field, in scheme order.
    pub fn distinct_values(&self, field: &str) -> Vec<String> {
        let mut seen = Vec::new();
        for cell in &self.cells {
            if let Some(value) = cell.cell.demographic(field) {
                if !seen.iter().any(|s: &String| s == value) {
                    seen.push(value.to_string());
                }
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(gender: &str, region: &str) -> QuotaCell {
        QuotaCell::from_parts([("gender", gender), ("region", region)])
    }

    fn scheme() -> GroupedQuotaCells {
        GroupedQuotaCells::new(vec![
            WeightedQuotaCell::new(cell("f", "north"), 1.2),
            WeightedQuotaCell::new(cell("m", "north"), 0.8),
            WeightedQuotaCell::new(cell("f", "south"), 1.0),
        ])
    }

    #[test]
    fn test_key_is_derived_from_parts() {
        assert_eq!(cell("f", "north").key.as_str(), "gender=f|region=north");
    }

    #[test]
    fn test_weight_lookup() {
        let scheme = scheme();
        assert_eq!(scheme.weight_of(&cell("m", "north").key), Some(0.8));
        assert_eq!(scheme.weight_of(&cell("m", "south").key), None);
    }

    #[test]
    fn test_filtered_by_keeps_order_and_weights() {
        let female = scheme().filtered_by(&DemographicFilter::all().with("gender", ["f"]));
        assert_eq!(female.len(), 2);
        assert_eq!(female.cells()[0].weight, 1.2);
        assert_eq!(female.cells()[1].cell.demographic("region"), Some("south"));
    }

    #[test]
    fn test_distinct_values_in_scheme_order() {
        assert_eq!(scheme().distinct_values("region"), vec!["north", "south"]);
        assert!(scheme().distinct_values("age").is_empty());
    }

    #[test]
    fn test_balanced_weights_hit_targets() {
        let north = cell("f", "north");
        let south = cell("f", "south");
        let sizes = HashMap::from([(north.key.clone(), 75), (south.key.clone(), 25)]);
        let scheme = GroupedQuotaCells::balanced(&[(north.clone(), 0.5), (south.clone(), 0.5)], &sizes);

        let w_north = scheme.weight_of(&north.key).unwrap();
        let w_south = scheme.weight_of(&south.key).unwrap();
        assert!((w_north * 75.0 - w_south * 25.0).abs() < 1e-9);
        assert!((w_north * 75.0 + w_south * 25.0 - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_balanced_empty_cell_gets_zero_weight() {
        let north = cell("f", "north");
        let south = cell("f", "south");
        let sizes = HashMap::from([(north.key.clone(), 10)]);
        let scheme = GroupedQuotaCells::balanced(&[(north, 0.5), (south.clone(), 0.5)], &sizes);
        assert_eq!(scheme.weight_of(&south.key), Some(0.0));
    }
}
