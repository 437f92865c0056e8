use rand::RngCore;
use serde::Serialize;

use super::clamp_mrca_uncertainty;
use super::r#trait::StratumRetentionPolicy;
use crate::bit_floor;
use crate::errors::{HstratError, Result};

/// Retains strata with spacing proportional to depth (total depositions).
///
/// Retained ranks are the multiples of a power-of-two spacing plus the newest
/// rank. The spacing doubles each time `2 * resolution` strata would
/// otherwise accumulate, so at most `2 * resolution + 1` strata are held and
/// MRCA uncertainty is at most `depth / resolution`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DepthProportionalPolicy {
    #[serde(rename = "depth_proportional_resolution")]
    pub resolution: u64,
}

impl DepthProportionalPolicy {
    pub fn new(resolution: u64) -> Result<Self> {
        if resolution == 0 {
            return Err(HstratError::invalid_param(
                "depth_proportional_resolution",
                0.0,
            ));
        }
        Ok(Self { resolution })
    }
}

/// Spacing between retained ranks once `num_strata_deposited` strata have
/// been deposited.
pub(crate) fn calc_provided_uncertainty(resolution: u64, num_strata_deposited: u64) -> u64 {
    bit_floor(num_strata_deposited / resolution).max(1)
}

/// Multiples of the current spacing below `num_strata_deposited`, then the
/// newest rank if it is off the grid.
fn iter_grid_ranks(resolution: u64, num_strata_deposited: u64) -> impl Iterator<Item = u64> {
    let spacing = calc_provided_uncertainty(resolution, num_strata_deposited);
    let num_aligned = num_strata_deposited.div_ceil(spacing);
    let newest_rank = num_strata_deposited.checked_sub(1);
    let unaligned_newest = newest_rank.filter(|rank| rank % spacing != 0);
    (0..num_aligned)
        .map(move |i| i * spacing)
        .chain(unaligned_newest)
}

impl StratumRetentionPolicy for DepthProportionalPolicy {
    fn gen_drop_ranks(
        &self,
        num_stratum_depositions_completed: u64,
        retained_ranks: &[u64],
        _rng: &mut dyn RngCore,
    ) -> Vec<u64> {
        let newest_rank = num_stratum_depositions_completed;
        let spacing = calc_provided_uncertainty(self.resolution, newest_rank + 1);
        retained_ranks
            .iter()
            .copied()
            .filter(|&rank| rank % spacing != 0 && rank != newest_rank)
            .collect()
    }

    fn iter_retained_ranks(
        &self,
        num_strata_deposited: u64,
    ) -> Option<Box<dyn Iterator<Item = u64> + '_>> {
        Some(Box::new(iter_grid_ranks(self.resolution, num_strata_deposited)))
    }

    fn calc_num_strata_retained_exact(&self, num_strata_deposited: u64) -> Option<u64> {
        if num_strata_deposited == 0 {
            return Some(0);
        }
        let spacing = calc_provided_uncertainty(self.resolution, num_strata_deposited);
        let newest_rank = num_strata_deposited - 1;
        let extra = u64::from(newest_rank % spacing != 0);
        Some(num_strata_deposited.div_ceil(spacing) + extra)
    }

    fn calc_num_strata_retained_upper_bound(&self, num_strata_deposited: u64) -> u64 {
        num_strata_deposited.min(2 * self.resolution + 1)
    }

    fn calc_rank_at_column_index(&self, index: usize, num_strata_deposited: u64) -> Option<u64> {
        let num_retained = self.calc_num_strata_retained_exact(num_strata_deposited)?;
        let index = index as u64;
        if index >= num_retained {
            None
        } else if index + 1 == num_retained {
            Some(num_strata_deposited - 1)
        } else {
            Some(index * calc_provided_uncertainty(self.resolution, num_strata_deposited))
        }
    }

    fn calc_mrca_uncertainty_abs_upper_bound(
        &self,
        first_num_strata_deposited: u64,
        second_num_strata_deposited: u64,
        actual_rank_of_mrca: u64,
    ) -> u64 {
        let deepest = first_num_strata_deposited.max(second_num_strata_deposited);
        clamp_mrca_uncertainty(
            calc_provided_uncertainty(self.resolution, deepest) - 1,
            first_num_strata_deposited,
            second_num_strata_deposited,
            actual_rank_of_mrca,
        )
    }

    fn algo_identifier(&self) -> &'static str {
        "depth_proportional_resolution_algo"
    }
}
