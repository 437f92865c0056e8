use std::fmt::Debug;

use rand::RngCore;
use serde::Serialize;

/// Trait for stratum retention policies.
///
/// A retention policy determines which strata (historical checkpoints) are
/// kept or discarded as new generations are deposited. Different policies
/// offer different trade-offs between memory usage and MRCA inference accuracy.
///
/// Every policy retains rank 0 and the newest rank, and is nested: the ranks
/// retained after `n + 1` depositions are a subset of those retained after
/// `n` depositions plus rank `n`. A dropped rank is therefore never needed
/// again.
pub trait StratumRetentionPolicy: Clone + Debug + PartialEq + Send + Sync + Serialize {
    /// Return the ranks that should be DROPPED once the stratum at rank
    /// `num_stratum_depositions_completed` has been inserted alongside
    /// `retained_ranks` (ascending, including that newest rank).
    fn gen_drop_ranks(
        &self,
        num_stratum_depositions_completed: u64,
        retained_ranks: &[u64],
        rng: &mut dyn RngCore,
    ) -> Vec<u64>;

    /// Iterate over retained ranks in ascending order for a column with
    /// `num_strata_deposited` strata deposited, when the policy can compute
    /// them without a column's history.
    fn iter_retained_ranks(
        &self,
        _num_strata_deposited: u64,
    ) -> Option<Box<dyn Iterator<Item = u64> + '_>> {
        None
    }

    /// Exact number of strata retained after `num_strata_deposited`
    /// depositions, if predictable.
    fn calc_num_strata_retained_exact(&self, num_strata_deposited: u64) -> Option<u64> {
        self.iter_retained_ranks(num_strata_deposited)
            .map(|ranks| ranks.count() as u64)
    }

    /// Upper bound on the number of strata retained after
    /// `num_strata_deposited` depositions.
    fn calc_num_strata_retained_upper_bound(&self, num_strata_deposited: u64) -> u64;

    /// The rank at a given column index (0-based) when `num_strata_deposited`
    /// strata have been deposited.
    fn calc_rank_at_column_index(&self, index: usize, num_strata_deposited: u64) -> Option<u64> {
        self.iter_retained_ranks(num_strata_deposited)?.nth(index)
    }

    /// Upper bound on the absolute uncertainty of the MRCA rank estimate
    /// between columns of depth `first_num_strata_deposited` and
    /// `second_num_strata_deposited` whose lineages diverged after
    /// `actual_rank_of_mrca`.
    ///
    /// Non-increasing in `actual_rank_of_mrca`, never above the shallower
    /// column's newest rank, and 0 for equal-depth columns whose MRCA is the
    /// shared newest rank.
    fn calc_mrca_uncertainty_abs_upper_bound(
        &self,
        first_num_strata_deposited: u64,
        second_num_strata_deposited: u64,
        actual_rank_of_mrca: u64,
    ) -> u64;

    /// The absolute bound relative to the number of ranks elapsed since the
    /// MRCA in the deeper column.
    fn calc_mrca_uncertainty_rel_upper_bound(
        &self,
        first_num_strata_deposited: u64,
        second_num_strata_deposited: u64,
        actual_rank_of_mrca: u64,
    ) -> f64 {
        let abs = self.calc_mrca_uncertainty_abs_upper_bound(
            first_num_strata_deposited,
            second_num_strata_deposited,
            actual_rank_of_mrca,
        );
        let elapsed = first_num_strata_deposited
            .max(second_num_strata_deposited)
            .saturating_sub(actual_rank_of_mrca)
            .max(1);
        abs as f64 / elapsed as f64
    }

    /// Algorithm identifier string for serialization compatibility.
    fn algo_identifier(&self) -> &'static str;
}
