use rand::RngCore;
use serde::Serialize;

use super::clamp_mrca_uncertainty;
use super::r#trait::StratumRetentionPolicy;
use super::recency_proportional::{calc_num_strata_retained_upper_bound, RecencySpacing};
use crate::bit_floor;
use crate::errors::{HstratError, Result};

/// Retains strata using a recency-proportional approach with an upper bound
/// on the number of retained strata.
///
/// At each depth the policy uses the finest recency-proportional resolution
/// whose retained-count bound fits `size_curb`. Once even resolution zero no
/// longer fits, spacing falls back to a single power-of-two grid over the
/// whole column (a degree-one geometric sequence), sized so at most
/// `size_curb` strata remain. Spacing never shrinks as depth grows, so every
/// transition only drops ranks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CurbedRecencyProportionalPolicy {
    pub size_curb: u64,
}

impl CurbedRecencyProportionalPolicy {
    pub fn new(size_curb: u64) -> Result<Self> {
        if size_curb < 8 {
            return Err(HstratError::invalid_param("size_curb", size_curb as f64));
        }
        Ok(Self { size_curb })
    }

    /// Spacing rule in force after `num_strata_deposited` depositions.
    pub(crate) fn calc_spacing(&self, num_strata_deposited: u64) -> RecencySpacing {
        let fitting_resolution = (0..self.size_curb).rev().find(|&resolution| {
            calc_num_strata_retained_upper_bound(resolution, num_strata_deposited)
                <= self.size_curb
        });
        match fitting_resolution {
            Some(resolution) => RecencySpacing::new(resolution),
            None => {
                let grid_interspersal = (self.size_curb - 1) / 2;
                RecencySpacing {
                    resolution: 0,
                    floor: bit_floor(num_strata_deposited / grid_interspersal).max(1),
                }
            }
        }
    }
}

impl StratumRetentionPolicy for CurbedRecencyProportionalPolicy {
    fn gen_drop_ranks(
        &self,
        num_stratum_depositions_completed: u64,
        retained_ranks: &[u64],
        _rng: &mut dyn RngCore,
    ) -> Vec<u64> {
        let newest_rank = num_stratum_depositions_completed;
        let spacing = self.calc_spacing(newest_rank + 1);
        retained_ranks
            .iter()
            .copied()
            .filter(|&rank| !spacing.retains(rank, newest_rank))
            .collect()
    }

    fn iter_retained_ranks(
        &self,
        num_strata_deposited: u64,
    ) -> Option<Box<dyn Iterator<Item = u64> + '_>> {
        Some(
            self.calc_spacing(num_strata_deposited)
                .iter_retained_ranks(num_strata_deposited),
        )
    }

    fn calc_num_strata_retained_exact(&self, num_strata_deposited: u64) -> Option<u64> {
        Some(
            self.calc_spacing(num_strata_deposited)
                .calc_num_retained(num_strata_deposited),
        )
    }

    fn calc_num_strata_retained_upper_bound(&self, num_strata_deposited: u64) -> u64 {
        num_strata_deposited.min(self.size_curb)
    }

    fn calc_mrca_uncertainty_abs_upper_bound(
        &self,
        first_num_strata_deposited: u64,
        second_num_strata_deposited: u64,
        actual_rank_of_mrca: u64,
    ) -> u64 {
        let deepest = first_num_strata_deposited.max(second_num_strata_deposited);
        let distance = deepest.saturating_sub(actual_rank_of_mrca + 1);
        let bracket = self.calc_spacing(deepest).calc_bracket_spacing(distance);
        clamp_mrca_uncertainty(
            bracket - 1,
            first_num_strata_deposited,
            second_num_strata_deposited,
            actual_rank_of_mrca,
        )
    }

    fn algo_identifier(&self) -> &'static str {
        "recency_proportional_resolution_curbed_algo"
    }
}
