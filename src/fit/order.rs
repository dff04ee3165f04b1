//! Ordering of fitted curves for comparative plotting.

use crate::domain::FitResult;

/// Sort fits ascending by concentration.
///
/// The sort is stable, so equal concentrations keep encounter order. In practice
/// the aggregator already merges equal concentrations into one group, so ties do
/// not reach this point.
pub fn order_by_concentration(mut fits: Vec<FitResult>) -> Vec<FitResult> {
    fits.sort_by(|a, b| a.concentration.cmp(&b.concentration));
    fits
}
