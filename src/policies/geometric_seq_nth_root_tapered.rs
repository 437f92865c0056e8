use rand::RngCore;
use serde::Serialize;

use super::geometric_seq_nth_root::{
    calc_mrca_uncertainty_abs_upper_bound, calc_num_strata_retained_cap, calc_retained_ranks,
    validate_params,
};
use super::r#trait::StratumRetentionPolicy;
use crate::errors::Result;

/// Geometric sequence Nth root retention with tapered (gradual) purging.
///
/// Retains everything [`GeometricSeqNthRootPolicy`] retains, and fills the
/// remaining capacity up to its hard cap with the most recent other strata.
/// The column therefore always holds exactly `min(n, cap)` strata, and each
/// deposition past the cap evicts the oldest filler stratum instead of
/// purging in bulk.
///
/// Which strata are fillers depends on the deposition history, so ranks
/// cannot be computed in closed form from `n`.
///
/// [`GeometricSeqNthRootPolicy`]: super::GeometricSeqNthRootPolicy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct GeometricSeqNthRootTaperedPolicy {
    pub degree: u64,
    pub interspersal: u64,
}

impl Default for GeometricSeqNthRootTaperedPolicy {
    fn default() -> Self {
        Self {
            degree: 2,
            interspersal: 2,
        }
    }
}

impl GeometricSeqNthRootTaperedPolicy {
    pub fn new(degree: u64, interspersal: u64) -> Result<Self> {
        validate_params(degree, interspersal)?;
        Ok(Self {
            degree,
            interspersal,
        })
    }

    fn cap(&self) -> u64 {
        calc_num_strata_retained_cap(self.degree, self.interspersal)
    }
}

impl StratumRetentionPolicy for GeometricSeqNthRootTaperedPolicy {
    fn gen_drop_ranks(
        &self,
        num_stratum_depositions_completed: u64,
        retained_ranks: &[u64],
        _rng: &mut dyn RngCore,
    ) -> Vec<u64> {
        let cap = self.cap() as usize;
        if retained_ranks.len() <= cap {
            return Vec::new();
        }
        let required = calc_retained_ranks(
            self.degree,
            self.interspersal,
            num_stratum_depositions_completed + 1,
        );
        let num_fillers_kept = cap.saturating_sub(required.len());
        let fillers: Vec<u64> = retained_ranks
            .iter()
            .copied()
            .filter(|rank| required.binary_search(rank).is_err())
            .collect();
        let num_evicted = fillers.len().saturating_sub(num_fillers_kept);
        fillers[..num_evicted].to_vec()
    }

    fn calc_num_strata_retained_exact(&self, num_strata_deposited: u64) -> Option<u64> {
        Some(num_strata_deposited.min(self.cap()))
    }

    fn calc_num_strata_retained_upper_bound(&self, num_strata_deposited: u64) -> u64 {
        num_strata_deposited.min(self.cap())
    }

    fn calc_mrca_uncertainty_abs_upper_bound(
        &self,
        first_num_strata_deposited: u64,
        second_num_strata_deposited: u64,
        actual_rank_of_mrca: u64,
    ) -> u64 {
        calc_mrca_uncertainty_abs_upper_bound(
            self.degree,
            self.interspersal,
            first_num_strata_deposited,
            second_num_strata_deposited,
            actual_rank_of_mrca,
        )
    }

    fn algo_identifier(&self) -> &'static str {
        "geom_seq_nth_root_tapered_algo"
    }
}
