use std::cmp::Ordering;

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, trace};

use super::stratum::{Annotation, Stratum};
use crate::differentia::Differentia;
use crate::errors::{HstratError, Result};
use crate::policies::{sorted_set_difference, StratumRetentionPolicy};
use crate::reconstruction::juxtaposition;
use crate::stores::{StratumOrderedStore, StratumOrderedStoreList};

/// A hereditary stratigraphic column.
///
/// Maintains an ordered sequence of strata (rank + differentia pairs) in a
/// backing store `S`. When a new stratum is deposited the retention policy
/// is consulted to decide which older strata to prune, keeping memory
/// bounded according to the chosen policy.
///
/// A column starts life with its rank-0 stratum already deposited. `clone`
/// copies the generator state along with the strata, so a clone and its
/// source go on to deposit identical differentiae. Branch lineages with
/// [`fork`](Self::fork) or [`clone_descendant`](Self::clone_descendant).
#[derive(Clone, Debug)]
pub struct HereditaryStratigraphicColumn<P: StratumRetentionPolicy, S = StratumOrderedStoreList> {
    policy: P,
    store: S,
    differentia_bit_width: u8,
    num_strata_deposited: u64,
    stores_ranks: bool,
    rng: SmallRng,
}

fn validate_bit_width(differentia_bit_width: u8) -> Result<()> {
    if (1..=64).contains(&differentia_bit_width) {
        Ok(())
    } else {
        Err(HstratError::InvalidBitWidth(differentia_bit_width))
    }
}

impl<P: StratumRetentionPolicy> HereditaryStratigraphicColumn<P> {
    /// Create a list-backed column seeded from system entropy.
    pub fn new(policy: P, differentia_bit_width: u8) -> Result<Self> {
        Self::from_rng(policy, differentia_bit_width, SmallRng::from_entropy())
    }

    /// Create a list-backed column with a deterministic seed for
    /// reproducibility.
    pub fn with_seed(policy: P, differentia_bit_width: u8, seed: u64) -> Result<Self> {
        Self::from_rng(policy, differentia_bit_width, SmallRng::seed_from_u64(seed))
    }

    /// Create a list-backed column whose strata carry no ranks.
    ///
    /// Every rank query is answered by the policy's closed form, so the
    /// policy must be able to enumerate its retained ranks.
    pub fn with_elided_ranks(policy: P, differentia_bit_width: u8, rng: SmallRng) -> Result<Self> {
        if policy.iter_retained_ranks(1).is_none()
            || policy.calc_rank_at_column_index(0, 1).is_none()
        {
            return Err(HstratError::RankElisionUnsupported(policy.algo_identifier()));
        }
        Self::build(policy, differentia_bit_width, rng, None, false)
    }
}

impl<P: StratumRetentionPolicy, S: StratumOrderedStore> HereditaryStratigraphicColumn<P, S> {
    /// Create a column over any store, drawing differentiae from `rng`.
    pub fn from_rng(policy: P, differentia_bit_width: u8, rng: SmallRng) -> Result<Self> {
        Self::from_rng_with_annotation(policy, differentia_bit_width, rng, None)
    }

    /// Like [`from_rng`](Self::from_rng), attaching `initial_annotation` to
    /// the rank-0 stratum.
    pub fn from_rng_with_annotation(
        policy: P,
        differentia_bit_width: u8,
        rng: SmallRng,
        initial_annotation: Option<Annotation>,
    ) -> Result<Self> {
        Self::build(policy, differentia_bit_width, rng, initial_annotation, true)
    }

    fn build(
        policy: P,
        differentia_bit_width: u8,
        rng: SmallRng,
        initial_annotation: Option<Annotation>,
        stores_ranks: bool,
    ) -> Result<Self> {
        validate_bit_width(differentia_bit_width)?;
        let mut column = Self {
            policy,
            store: S::default(),
            differentia_bit_width,
            num_strata_deposited: 0,
            stores_ranks,
            rng,
        };
        column.deposit(initial_annotation);
        Ok(column)
    }

    /// Reassemble a column from its parts.
    ///
    /// The caller is responsible for `store` holding exactly the ranks the
    /// policy retains after `num_strata_deposited` depositions.
    pub fn from_parts(
        policy: P,
        differentia_bit_width: u8,
        store: S,
        num_strata_deposited: u64,
        rng: SmallRng,
    ) -> Result<Self> {
        validate_bit_width(differentia_bit_width)?;
        Ok(Self {
            policy,
            store,
            differentia_bit_width,
            num_strata_deposited,
            stores_ranks: true,
            rng,
        })
    }

    /// Deposit a single new stratum.
    pub fn deposit_stratum(&mut self) {
        self.deposit(None);
    }

    /// Deposit a single new stratum carrying `annotation`.
    pub fn deposit_annotated_stratum(&mut self, annotation: impl Into<Annotation>) {
        self.deposit(Some(annotation.into()));
    }

    fn make_stratum(&mut self, rank: u64) -> Stratum {
        let differentia = Differentia::random(&mut self.rng, self.differentia_bit_width);
        if self.stores_ranks {
            Stratum::new(rank, differentia)
        } else {
            Stratum::without_rank(differentia)
        }
    }

    fn deposit(&mut self, annotation: Option<Annotation>) {
        let rank = self.num_strata_deposited;
        let stratum = self.make_stratum(rank).with_annotation(annotation);
        self.store.deposit_stratum(stratum);

        // Fast path: nestedness means a matching count is the right set.
        let retained = self.store.get_num_strata_retained() as u64;
        if self.policy.calc_num_strata_retained_exact(rank + 1) != Some(retained) {
            let retained_ranks: Vec<u64> = if self.stores_ranks {
                self.store.iter_retained_ranks().collect()
            } else {
                self.iter_policy_ranks(rank).chain([rank]).collect()
            };
            let drop_ranks = self
                .policy
                .gen_drop_ranks(rank, &retained_ranks, &mut self.rng);
            assert!(
                !drop_ranks.iter().any(|&r| r == 0 || r == rank),
                "{} tried to drop rank 0 or newest rank {rank}",
                self.policy.algo_identifier()
            );
            if !drop_ranks.is_empty() {
                trace!(rank, dropped = drop_ranks.len(), "purging strata");
                self.del_ranks(&retained_ranks, &drop_ranks);
            }
        }

        self.num_strata_deposited += 1;
    }

    /// Delete `drop_ranks` from the store, by index when strata carry no
    /// ranks. `retained_ranks` lists every rank currently in the store.
    fn del_ranks(&mut self, retained_ranks: &[u64], drop_ranks: &[u64]) {
        if self.stores_ranks {
            self.store.del_ranks(drop_ranks);
            return;
        }
        let indices: Vec<usize> = drop_ranks
            .iter()
            .filter_map(|rank| retained_ranks.binary_search(rank).ok())
            .collect();
        self.store.del_column_indices(&indices);
    }

    /// Ranks the policy retains after `num_strata_deposited` depositions.
    /// Only called for rank-elided columns, whose policy was checked to
    /// enumerate them at construction.
    fn iter_policy_ranks(&self, num_strata_deposited: u64) -> Box<dyn Iterator<Item = u64> + '_> {
        self.policy
            .iter_retained_ranks(num_strata_deposited)
            .unwrap_or_else(|| Box::new(std::iter::empty()))
    }

    /// Deposit `num_stratum_depositions` strata in succession.
    ///
    /// When the policy can enumerate its retained ranks, the column jumps
    /// straight to the final retained set and only draws differentiae for
    /// new ranks that survive.
    pub fn deposit_strata(&mut self, num_stratum_depositions: u64) {
        if num_stratum_depositions == 0 {
            return;
        }
        let first_new_rank = self.num_strata_deposited;
        let num_strata_deposited = first_new_rank + num_stratum_depositions;
        let target: Option<Vec<u64>> = self
            .policy
            .iter_retained_ranks(num_strata_deposited)
            .map(Iterator::collect);
        let Some(target) = target else {
            for _ in 0..num_stratum_depositions {
                self.deposit(None);
            }
            return;
        };

        let retained_ranks: Vec<u64> = self.iter_retained_ranks().collect();
        self.del_ranks(
            &retained_ranks,
            &sorted_set_difference(&retained_ranks, &target),
        );
        let first_new = target.partition_point(|&r| r < first_new_rank);
        for &rank in &target[first_new..] {
            let stratum = self.make_stratum(rank);
            self.store.deposit_stratum(stratum);
        }
        self.num_strata_deposited = num_strata_deposited;

        debug!(
            num_stratum_depositions,
            num_strata_retained = self.store.get_num_strata_retained(),
            "bulk deposit"
        );
    }

    /// Copy this column for a new branch of its lineage.
    ///
    /// The copy's generator is reseeded from this column's, which advances
    /// it: successive forks of one parent, and the parent itself, deposit
    /// independent differentiae from here on.
    pub fn fork(&mut self) -> Self {
        let mut child = self.clone();
        child.rng = SmallRng::seed_from_u64(self.rng.next_u64());
        child
    }

    /// Fork this column and deposit one additional stratum on the fork,
    /// simulating a parent-child relationship.
    pub fn clone_descendant(&mut self) -> Self {
        let mut descendant = self.fork();
        descendant.deposit_stratum();
        descendant
    }

    /// Total number of strata that have been deposited (including pruned ones).
    pub fn get_num_strata_deposited(&self) -> u64 {
        self.num_strata_deposited
    }

    /// Number of strata currently retained in this column.
    pub fn get_num_strata_retained(&self) -> usize {
        self.store.get_num_strata_retained()
    }

    pub fn get_num_discarded_strata(&self) -> u64 {
        self.num_strata_deposited - self.get_num_strata_retained() as u64
    }

    pub fn has_discarded_strata(&self) -> bool {
        self.get_num_discarded_strata() > 0
    }

    /// The bit width of the differentia values in this column.
    pub fn get_stratum_differentia_bit_width(&self) -> u8 {
        self.differentia_bit_width
    }

    pub fn get_policy(&self) -> &P {
        &self.policy
    }

    pub fn get_store(&self) -> &S {
        &self.store
    }

    /// Whether strata carry their ranks, rather than having them recomputed
    /// by the policy.
    pub fn has_stored_ranks(&self) -> bool {
        self.stores_ranks
    }

    /// Iterate over the ranks of all retained strata, in ascending order.
    pub fn iter_retained_ranks(&self) -> Box<dyn Iterator<Item = u64> + '_> {
        if self.stores_ranks {
            self.store.iter_retained_ranks()
        } else {
            self.iter_policy_ranks(self.num_strata_deposited)
        }
    }

    /// Iterate over the differentia values of all retained strata, in rank order.
    pub fn iter_retained_differentia(&self) -> impl Iterator<Item = Differentia> + '_ {
        self.store.iter_retained_strata().map(|s| s.differentia)
    }

    /// Retained strata, oldest first. In rank-elided columns their `rank`
    /// is `None`; pair them with [`iter_retained_ranks`](Self::iter_retained_ranks).
    pub fn iter_retained_strata(&self) -> impl Iterator<Item = &Stratum> {
        self.store.iter_retained_strata()
    }

    pub fn get_stratum_at_column_index(&self, index: usize) -> Option<&Stratum> {
        self.store.get_stratum_at_column_index(index)
    }

    /// Returns `None` if no stratum with the given rank is currently retained.
    pub fn get_stratum_at_rank(&self, rank: u64) -> Option<&Stratum> {
        if self.stores_ranks {
            return self.store.get_stratum_at_rank(rank);
        }
        let index = self.get_column_index_of_rank(rank)?;
        self.store.get_stratum_at_column_index(index)
    }

    /// Rank of the stratum at `index`, computed by the policy when it has a
    /// closed form and looked up in the store otherwise.
    pub fn get_rank_at_column_index(&self, index: usize) -> Option<u64> {
        if index >= self.get_num_strata_retained() {
            return None;
        }
        self.policy
            .calc_rank_at_column_index(index, self.num_strata_deposited)
            .or_else(|| self.store.get_rank_at_column_index(index))
    }

    pub fn get_column_index_of_rank(&self, rank: u64) -> Option<usize> {
        if self.stores_ranks {
            return self.store.get_column_index_of_rank(rank);
        }
        let (mut lo, mut hi) = (0, self.get_num_strata_retained());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.get_rank_at_column_index(mid)?.cmp(&rank) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Some(mid),
            }
        }
        None
    }

    /// Probability that two unrelated differentiae of this width match.
    pub fn calc_probability_differentia_collision(&self) -> f64 {
        juxtaposition::calc_probability_differentia_collision(self.differentia_bit_width)
    }

    /// Consecutive matching strata needed before a run of matches is
    /// implausible as chance collisions at `significance_level`.
    pub fn calc_min_implausible_spurious_consecutive_differentia_collisions(
        &self,
        significance_level: f64,
    ) -> Result<u64> {
        juxtaposition::calc_min_implausible_spurious_consecutive_differentia_collisions(
            self.differentia_bit_width,
            significance_level,
        )
    }
}
