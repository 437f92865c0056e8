//! Comparison of two lineages' retained strata: bounds and point estimates
//! for the rank of their most recent common ancestor (MRCA).

pub mod estimation;
pub mod juxtaposition;
pub mod mrca;
pub mod priors;

use crate::column::HereditaryStratigraphicColumn;
use crate::differentia::Differentia;
use crate::policies::StratumRetentionPolicy;
use crate::stores::StratumOrderedStore;

pub use estimation::{
    ballpark_rank_of_mrca_between, estimate_rank_of_mrca_between,
    estimate_rank_of_mrca_maximum_likelihood, estimate_rank_of_mrca_naive,
    estimate_rank_of_mrca_unbiased, estimate_ranks_since_mrca_with, Estimator,
};
pub use juxtaposition::{
    calc_min_implausible_spurious_consecutive_differentia_collisions,
    calc_probability_differentia_collision, calc_rank_of_first_retained_disparity_between,
    calc_rank_of_first_retained_disparity_between_bsearch,
    calc_rank_of_first_retained_disparity_between_generic,
    calc_rank_of_last_retained_commonality_between,
    calc_rank_of_last_retained_commonality_between_bsearch,
    calc_rank_of_last_retained_commonality_between_generic,
    calc_ranks_since_first_retained_disparity_with,
    calc_ranks_since_last_retained_commonality_with, does_definitively_share_no_common_ancestor,
    iter_ranks_of_retained_commonality_between,
};
pub use mrca::{
    calc_pairwise_ranks_of_last_retained_commonality, calc_rank_of_mrca_bounds_between,
    calc_rank_of_mrca_uncertainty_between, calc_ranks_since_mrca_bounds_with,
    does_have_any_common_ancestor,
};
pub use priors::{ArbitraryPrior, ExponentialPrior, Prior, UniformPrior};

/// Read access to a lineage's retained strata, in ascending rank order.
///
/// Everything in this module compares through this trait, so columns over
/// any store (or any other rank/differentia source) can be juxtaposed.
pub trait RetainedStrata {
    fn num_strata_deposited(&self) -> u64;

    fn differentia_bit_width(&self) -> u8;

    fn num_strata_retained(&self) -> usize;

    fn rank_at_column_index(&self, index: usize) -> Option<u64>;

    fn differentia_at_column_index(&self, index: usize) -> Option<Differentia>;

    fn iter_ranks_and_differentia(&self) -> Box<dyn Iterator<Item = (u64, Differentia)> + '_>;

    /// Whether `*_at_column_index` lookups are O(1).
    fn has_random_access(&self) -> bool {
        false
    }
}

impl<P: StratumRetentionPolicy, S: StratumOrderedStore> RetainedStrata
    for HereditaryStratigraphicColumn<P, S>
{
    fn num_strata_deposited(&self) -> u64 {
        self.get_num_strata_deposited()
    }

    fn differentia_bit_width(&self) -> u8 {
        self.get_stratum_differentia_bit_width()
    }

    fn num_strata_retained(&self) -> usize {
        self.get_num_strata_retained()
    }

    fn rank_at_column_index(&self, index: usize) -> Option<u64> {
        self.get_rank_at_column_index(index)
    }

    fn differentia_at_column_index(&self, index: usize) -> Option<Differentia> {
        self.get_stratum_at_column_index(index).map(|s| s.differentia)
    }

    fn iter_ranks_and_differentia(&self) -> Box<dyn Iterator<Item = (u64, Differentia)> + '_> {
        Box::new(
            self.iter_retained_ranks()
                .zip(self.iter_retained_differentia()),
        )
    }

    fn has_random_access(&self) -> bool {
        S::RANDOM_ACCESS
    }
}

/// Hand-built columns for comparison tests.
#[cfg(test)]
pub(crate) mod testing {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use crate::column::{HereditaryStratigraphicColumn, Stratum};
    use crate::differentia::Differentia;
    use crate::policies::StochasticPolicy;
    use crate::stores::{StratumOrderedStore, StratumOrderedStoreList};

    /// Column holding exactly `strata` as `(rank, differentia)` pairs.
    ///
    /// Backed by a policy without closed-form ranks, so every lookup goes
    /// through the store.
    pub(crate) fn make_column(
        strata: &[(u64, u64)],
        num_strata_deposited: u64,
        bit_width: u8,
    ) -> HereditaryStratigraphicColumn<StochasticPolicy> {
        let mut store = StratumOrderedStoreList::default();
        for &(rank, differentia) in strata {
            store.deposit_stratum(Stratum::new(rank, Differentia::new(differentia, bit_width)));
        }
        HereditaryStratigraphicColumn::from_parts(
            StochasticPolicy::default(),
            bit_width,
            store,
            num_strata_deposited,
            SmallRng::seed_from_u64(0),
        )
        .unwrap()
    }
}
