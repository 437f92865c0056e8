//! Backing structures holding a column's retained strata in ascending rank
//! order.

mod dict;
mod list;
mod tree;

use std::fmt::Debug;

use crate::column::Stratum;

pub use dict::StratumOrderedStoreDict;
pub use list::StratumOrderedStoreList;
pub use tree::StratumOrderedStoreTree;

/// Ordered collection of retained strata.
///
/// Ranks are strictly increasing; index 0 is the oldest retained stratum
/// and the last index is the newest.
pub trait StratumOrderedStore: Clone + Debug + Default + Send + Sync {
    /// Whether indexed access is O(1), making binary searches over column
    /// indices cheaper than a linear walk.
    const RANDOM_ACCESS: bool = false;

    /// Append `stratum`, whose rank exceeds every retained rank.
    fn deposit_stratum(&mut self, stratum: Stratum);

    /// Remove the strata at `ranks`; ranks not retained are ignored.
    fn del_ranks(&mut self, ranks: &[u64]);

    /// Remove the strata at column `indices`; out-of-range indices are
    /// ignored. The only way to delete strata deposited without ranks.
    fn del_column_indices(&mut self, indices: &[usize]) {
        let ranks: Vec<u64> = indices
            .iter()
            .filter_map(|&index| self.get_rank_at_column_index(index))
            .collect();
        self.del_ranks(&ranks);
    }

    fn get_num_strata_retained(&self) -> usize;

    fn get_stratum_at_column_index(&self, index: usize) -> Option<&Stratum>;

    /// Position of `rank` among retained strata, if retained.
    fn get_column_index_of_rank(&self, rank: u64) -> Option<usize>;

    fn get_stratum_at_rank(&self, rank: u64) -> Option<&Stratum> {
        let index = self.get_column_index_of_rank(rank)?;
        self.get_stratum_at_column_index(index)
    }

    fn get_rank_at_column_index(&self, index: usize) -> Option<u64> {
        self.get_stratum_at_column_index(index)?.rank
    }

    /// Retained strata, oldest first.
    fn iter_retained_strata(&self) -> Box<dyn Iterator<Item = &Stratum> + '_>;

    /// Stored ranks, ascending; strata deposited without a rank are skipped.
    fn iter_retained_ranks(&self) -> Box<dyn Iterator<Item = u64> + '_> {
        Box::new(self.iter_retained_strata().filter_map(|s| s.rank))
    }
}

/// Exercises one store implementation against the shared contract.
#[cfg(test)]
pub(crate) fn check_store_contract<S: StratumOrderedStore>() {
    use crate::differentia::Differentia;

    let mut store = S::default();
    assert_eq!(store.get_num_strata_retained(), 0);
    assert!(store.get_stratum_at_column_index(0).is_none());

    for rank in 0..20u64 {
        store.deposit_stratum(Stratum::new(rank, Differentia::new(rank * 3, 8)));
    }
    assert_eq!(store.get_num_strata_retained(), 20);

    store.del_ranks(&[3, 7, 8, 19, 42]);
    let ranks: Vec<u64> = store.iter_retained_ranks().collect();
    let expected: Vec<u64> = (0..19).filter(|r| ![3, 7, 8].contains(r)).collect();
    assert_eq!(ranks, expected);
    assert_eq!(store.get_num_strata_retained(), expected.len());

    for (index, &rank) in expected.iter().enumerate() {
        assert_eq!(store.get_column_index_of_rank(rank), Some(index));
        assert_eq!(store.get_rank_at_column_index(index), Some(rank));
        let stratum = store.get_stratum_at_rank(rank).unwrap();
        assert_eq!(stratum.differentia, Differentia::new(rank * 3, 8));
    }
    assert_eq!(store.get_column_index_of_rank(3), None);
    assert!(store.get_stratum_at_rank(19).is_none());
    assert!(store.get_stratum_at_column_index(expected.len()).is_none());

    // Clones evolve independently.
    let mut fork = store.clone();
    fork.del_ranks(&[0, 18]);
    fork.deposit_stratum(Stratum::new(25, Differentia::new(1, 8)));
    assert_eq!(store.iter_retained_ranks().collect::<Vec<_>>(), expected);
    assert_eq!(fork.get_rank_at_column_index(0), Some(1));
    assert_eq!(fork.iter_retained_ranks().last(), Some(25));

    store.del_ranks(&[]);
    assert_eq!(store.get_num_strata_retained(), expected.len());

    // Index-based deletion removes the same strata as rank-based deletion.
    let mut by_index = store.clone();
    let mut by_rank = store.clone();
    by_index.del_column_indices(&[5, 0, 2, 99]);
    by_rank.del_ranks(&[expected[0], expected[2], expected[5]]);
    assert_eq!(
        by_index.iter_retained_strata().collect::<Vec<_>>(),
        by_rank.iter_retained_strata().collect::<Vec<_>>()
    );
    assert_eq!(by_index.get_num_strata_retained(), expected.len() - 3);
}
