use rand::RngCore;
use serde::Serialize;

use super::r#trait::StratumRetentionPolicy;

/// Retains every stratum ever deposited -- zero MRCA uncertainty, but O(n)
/// memory usage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PerfectResolutionPolicy;

impl PerfectResolutionPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl StratumRetentionPolicy for PerfectResolutionPolicy {
    fn gen_drop_ranks(
        &self,
        _num_stratum_depositions_completed: u64,
        _retained_ranks: &[u64],
        _rng: &mut dyn RngCore,
    ) -> Vec<u64> {
        Vec::new()
    }

    fn iter_retained_ranks(
        &self,
        num_strata_deposited: u64,
    ) -> Option<Box<dyn Iterator<Item = u64> + '_>> {
        Some(Box::new(0..num_strata_deposited))
    }

    fn calc_num_strata_retained_exact(&self, num_strata_deposited: u64) -> Option<u64> {
        Some(num_strata_deposited)
    }

    fn calc_num_strata_retained_upper_bound(&self, num_strata_deposited: u64) -> u64 {
        num_strata_deposited
    }

    fn calc_rank_at_column_index(&self, index: usize, num_strata_deposited: u64) -> Option<u64> {
        let rank = index as u64;
        (rank < num_strata_deposited).then_some(rank)
    }

    fn calc_mrca_uncertainty_abs_upper_bound(
        &self,
        _first_num_strata_deposited: u64,
        _second_num_strata_deposited: u64,
        _actual_rank_of_mrca: u64,
    ) -> u64 {
        0
    }

    fn algo_identifier(&self) -> &'static str {
        "perfect_resolution_algo"
    }
}
