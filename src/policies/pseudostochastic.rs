use rand::RngCore;
use serde::Serialize;

use super::clamp_mrca_uncertainty;
use super::r#trait::StratumRetentionPolicy;

/// Deterministic pseudo-stochastic retention policy.
///
/// Rank 0 and the newest stratum are always retained. When a stratum stops
/// being the newest, a salted hash of its rank decides once whether it is
/// kept for good or dropped. Expected space is O(n); useful for exercising
/// comparison edge cases, not for production.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PseudostochasticPolicy {
    pub hash_salt: u64,
}

impl PseudostochasticPolicy {
    pub fn new(hash_salt: u64) -> Self {
        Self { hash_salt }
    }

    /// Splitmix64 of the salted rank; even hashes survive.
    #[inline]
    fn should_retain(&self, rank: u64) -> bool {
        let mut z = (rank ^ self.hash_salt).wrapping_add(0x9E37_79B9_7F4A_7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        z % 2 == 0
    }
}

impl StratumRetentionPolicy for PseudostochasticPolicy {
    fn gen_drop_ranks(
        &self,
        num_stratum_depositions_completed: u64,
        retained_ranks: &[u64],
        _rng: &mut dyn RngCore,
    ) -> Vec<u64> {
        let Some(second_most_recent) = num_stratum_depositions_completed.checked_sub(1) else {
            return Vec::new();
        };
        if second_most_recent == 0
            || self.should_retain(second_most_recent)
            || retained_ranks.binary_search(&second_most_recent).is_err()
        {
            return Vec::new();
        }
        vec![second_most_recent]
    }

    fn iter_retained_ranks(
        &self,
        num_strata_deposited: u64,
    ) -> Option<Box<dyn Iterator<Item = u64> + '_>> {
        let Some(newest_rank) = num_strata_deposited.checked_sub(1) else {
            return Some(Box::new(std::iter::empty()));
        };
        let interior = (1..newest_rank).filter(|&rank| self.should_retain(rank));
        let newest = (newest_rank > 0).then_some(newest_rank);
        Some(Box::new(std::iter::once(0).chain(interior).chain(newest)))
    }

    // Both would hash every rank below the depth on each call.
    fn calc_num_strata_retained_exact(&self, _num_strata_deposited: u64) -> Option<u64> {
        None
    }

    fn calc_rank_at_column_index(&self, _index: usize, _num_strata_deposited: u64) -> Option<u64> {
        None
    }

    fn calc_num_strata_retained_upper_bound(&self, num_strata_deposited: u64) -> u64 {
        num_strata_deposited
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
        "pseudostochastic_algo"
    }
}
