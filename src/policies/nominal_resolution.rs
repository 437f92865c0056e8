use rand::RngCore;
use serde::Serialize;

use super::clamp_mrca_uncertainty;
use super::r#trait::StratumRetentionPolicy;

/// Retains only the first and most recent strata -- minimal memory usage,
/// maximum MRCA uncertainty.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NominalResolutionPolicy;

impl NominalResolutionPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl StratumRetentionPolicy for NominalResolutionPolicy {
    fn gen_drop_ranks(
        &self,
        num_stratum_depositions_completed: u64,
        retained_ranks: &[u64],
        _rng: &mut dyn RngCore,
    ) -> Vec<u64> {
        let newest_rank = num_stratum_depositions_completed;
        retained_ranks
            .iter()
            .copied()
            .filter(|&rank| rank != 0 && rank != newest_rank)
            .collect()
    }

    fn iter_retained_ranks(
        &self,
        num_strata_deposited: u64,
    ) -> Option<Box<dyn Iterator<Item = u64> + '_>> {
        Some(match num_strata_deposited {
            0 => Box::new(std::iter::empty()),
            1 => Box::new(std::iter::once(0u64)),
            n => Box::new([0u64, n - 1].into_iter()),
        })
    }

    fn calc_num_strata_retained_exact(&self, num_strata_deposited: u64) -> Option<u64> {
        Some(num_strata_deposited.min(2))
    }

    fn calc_num_strata_retained_upper_bound(&self, num_strata_deposited: u64) -> u64 {
        num_strata_deposited.min(2)
    }

    fn calc_rank_at_column_index(&self, index: usize, num_strata_deposited: u64) -> Option<u64> {
        match (index, num_strata_deposited) {
            (_, 0) => None,
            (0, _) => Some(0),
            (1, n) if n >= 2 => Some(n - 1),
            _ => None,
        }
    }

    fn calc_mrca_uncertainty_abs_upper_bound(
        &self,
        first_num_strata_deposited: u64,
        second_num_strata_deposited: u64,
        actual_rank_of_mrca: u64,
    ) -> u64 {
        clamp_mrca_uncertainty(
            u64::MAX,
            first_num_strata_deposited,
            second_num_strata_deposited,
            actual_rank_of_mrca,
        )
    }

    fn algo_identifier(&self) -> &'static str {
        "nominal_resolution_algo"
    }
}
