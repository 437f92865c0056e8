use rand::RngCore;
use serde::Serialize;

use super::clamp_mrca_uncertainty;
use super::depth_proportional::calc_provided_uncertainty;
use super::drop_ranks_outside;
use super::r#trait::StratumRetentionPolicy;
use crate::errors::{HstratError, Result};

/// Depth-proportional retention with tapered (gradual) purging.
///
/// Holds the same power-of-two grid as [`DepthProportionalPolicy`], but when
/// the spacing doubles the strata that fall off the coarser grid are not
/// purged all at once. Instead one of them, oldest first, is purged for
/// every `spacing` further depositions, so the retained count grows smoothly
/// back toward `2 * resolution + 1`.
///
/// [`DepthProportionalPolicy`]: super::DepthProportionalPolicy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DepthProportionalTaperedPolicy {
    #[serde(rename = "depth_proportional_resolution")]
    pub resolution: u64,
}

impl DepthProportionalTaperedPolicy {
    pub fn new(resolution: u64) -> Result<Self> {
        if resolution == 0 {
            return Err(HstratError::invalid_param(
                "depth_proportional_resolution",
                0.0,
            ));
        }
        Ok(Self { resolution })
    }

    /// Ascending retained ranks after `num_strata_deposited` depositions.
    fn compute_retained_ranks(&self, num_strata_deposited: u64) -> Vec<u64> {
        let Some(newest_rank) = num_strata_deposited.checked_sub(1) else {
            return Vec::new();
        };
        let resolution = self.resolution;
        let spacing = calc_provided_uncertainty(resolution, num_strata_deposited);

        let mut ranks: Vec<u64> = (0..num_strata_deposited.div_ceil(spacing))
            .map(|i| i * spacing)
            .collect();

        // Odd multiples of the previous spacing that have not yet tapered
        // off. The stage began at `spacing * resolution` depositions and one
        // is released per `spacing` depositions since.
        if spacing >= 2 {
            let half = spacing / 2;
            let stage_start = spacing * resolution;
            let num_released =
                resolution.min((num_strata_deposited - stage_start) / spacing + 1);
            ranks.extend((num_released..resolution).map(|j| half * (2 * j + 1)));
        }

        ranks.push(newest_rank);
        ranks.sort_unstable();
        ranks.dedup();
        ranks
    }
}

impl StratumRetentionPolicy for DepthProportionalTaperedPolicy {
    fn gen_drop_ranks(
        &self,
        num_stratum_depositions_completed: u64,
        retained_ranks: &[u64],
        _rng: &mut dyn RngCore,
    ) -> Vec<u64> {
        let keep = self.compute_retained_ranks(num_stratum_depositions_completed + 1);
        drop_ranks_outside(retained_ranks, keep.into_iter())
    }

    fn iter_retained_ranks(
        &self,
        num_strata_deposited: u64,
    ) -> Option<Box<dyn Iterator<Item = u64> + '_>> {
        Some(Box::new(
            self.compute_retained_ranks(num_strata_deposited).into_iter(),
        ))
    }

    fn calc_num_strata_retained_upper_bound(&self, num_strata_deposited: u64) -> u64 {
        num_strata_deposited.min(2 * self.resolution + 1)
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
        "depth_proportional_resolution_tapered_algo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::testing::check_policy;
    use crate::policies::DepthProportionalPolicy;

    #[test]
    fn test_all_ranks_retained_before_first_doubling() {
        let policy = DepthProportionalTaperedPolicy::new(4).unwrap();
        for n in 0..8u64 {
            let ranks: Vec<u64> = policy.iter_retained_ranks(n).unwrap().collect();
            assert_eq!(ranks, (0..n).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_odd_ranks_taper_off_oldest_first() {
        let policy = DepthProportionalTaperedPolicy::new(3).unwrap();
        // Spacing becomes 2 at 6 depositions; rank 1 is released first.
        let ranks: Vec<u64> = policy.iter_retained_ranks(6).unwrap().collect();
        assert_eq!(ranks, vec![0, 2, 3, 4, 5]);
        let ranks: Vec<u64> = policy.iter_retained_ranks(8).unwrap().collect();
        assert_eq!(ranks, vec![0, 2, 4, 5, 6, 7]);
        let ranks: Vec<u64> = policy.iter_retained_ranks(10).unwrap().collect();
        assert_eq!(ranks, vec![0, 2, 4, 6, 8, 9]);
    }

    #[test]
    fn test_retains_superset_of_untapered() {
        let tapered = DepthProportionalTaperedPolicy::new(5).unwrap();
        let untapered = DepthProportionalPolicy::new(5).unwrap();
        for n in 0..300u64 {
            let outer: Vec<u64> = tapered.iter_retained_ranks(n).unwrap().collect();
            for rank in untapered.iter_retained_ranks(n).unwrap() {
                assert!(outer.binary_search(&rank).is_ok(), "n={n} rank={rank}");
            }
        }
    }

    #[test]
    fn test_invariants() {
        for resolution in [1, 2, 3, 6] {
            check_policy(&DepthProportionalTaperedPolicy::new(resolution).unwrap(), 150);
        }
    }

    #[test]
    fn test_algo_identifier() {
        let policy = DepthProportionalTaperedPolicy::new(3).unwrap();
        assert_eq!(
            policy.algo_identifier(),
            "depth_proportional_resolution_tapered_algo"
        );
    }
}
