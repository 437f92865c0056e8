use rand::RngCore;
use serde::Serialize;

use super::clamp_mrca_uncertainty;
use super::r#trait::StratumRetentionPolicy;
use crate::{bit_floor, bit_length};

/// Retains strata with spacing proportional to recency.
///
/// More recent strata are spaced more closely together, while older strata
/// are spaced more widely. A rank `d` depositions behind the newest is kept
/// iff it is a multiple of `max(1, bit_floor(d / (resolution + 1)))`; as the
/// spacing only ever doubles, a rank that leaves the grid never re-enters
/// it. Uses O(resolution * log n) space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RecencyProportionalPolicy {
    #[serde(rename = "recency_proportional_resolution")]
    pub resolution: u64,
}

impl RecencyProportionalPolicy {
    pub fn new(resolution: u64) -> Self {
        Self { resolution }
    }
}

/// Power-of-two spacing between retained ranks as a function of distance
/// behind the newest rank: `max(floor, bit_floor(distance / (resolution + 1)))`.
///
/// `floor` is a power of two. The curbed policy raises it once no recency
/// resolution fits its size budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RecencySpacing {
    pub(crate) resolution: u64,
    pub(crate) floor: u64,
}

impl RecencySpacing {
    pub(crate) fn new(resolution: u64) -> Self {
        Self {
            resolution,
            floor: 1,
        }
    }

    fn band_width(&self) -> u64 {
        self.resolution.saturating_add(1)
    }

    pub(crate) fn at_distance(&self, distance: u64) -> u64 {
        bit_floor(distance / self.band_width()).max(self.floor)
    }

    pub(crate) fn retains(&self, rank: u64, newest_rank: u64) -> bool {
        rank == newest_rank || rank % self.at_distance(newest_rank - rank) == 0
    }

    /// Runs of ranks sharing one spacing, oldest first, as
    /// `(spacing, first_rank, last_rank)` with inclusive ends.
    fn iter_bands(self, newest_rank: u64) -> impl Iterator<Item = (u64, u64, u64)> {
        let mut spacing = self.at_distance(newest_rank);
        let mut first_rank = 0u64;
        let mut exhausted = false;
        std::iter::from_fn(move || {
            if exhausted {
                return None;
            }
            let nearest_distance = if spacing == self.floor {
                0
            } else {
                spacing * self.band_width()
            };
            let last_rank = newest_rank - nearest_distance;
            let band = (spacing, first_rank, last_rank);
            if spacing == self.floor {
                exhausted = true;
            } else {
                spacing /= 2;
                first_rank = last_rank + 1;
            }
            Some(band)
        })
    }

    pub(crate) fn iter_retained_ranks(self, num_strata_deposited: u64) -> Box<dyn Iterator<Item = u64>> {
        let Some(newest_rank) = num_strata_deposited.checked_sub(1) else {
            return Box::new(std::iter::empty());
        };
        let floor = self.floor;
        let gridded = self
            .iter_bands(newest_rank)
            .flat_map(|(spacing, first_rank, last_rank)| {
                let start = first_rank.div_ceil(spacing);
                let stop = last_rank / spacing;
                (start..=stop).map(move |i| i * spacing)
            });
        let unaligned_newest = (newest_rank % floor != 0).then_some(newest_rank);
        Box::new(gridded.chain(unaligned_newest))
    }

    pub(crate) fn calc_num_retained(self, num_strata_deposited: u64) -> u64 {
        let Some(newest_rank) = num_strata_deposited.checked_sub(1) else {
            return 0;
        };
        let gridded: u64 = self
            .iter_bands(newest_rank)
            .map(|(spacing, first_rank, last_rank)| {
                (last_rank / spacing + 1).saturating_sub(first_rank.div_ceil(spacing))
            })
            .sum();
        gridded + u64::from(newest_rank % self.floor != 0)
    }

    /// Smallest spacing `q` such that both columns retain consecutive
    /// multiples of `q` around a rank `distance` behind the deeper column's
    /// newest rank.
    pub(crate) fn calc_bracket_spacing(&self, distance: u64) -> u64 {
        let denominator = self.band_width().saturating_mul(2) - 1;
        distance
            .div_ceil(denominator)
            .next_power_of_two()
            .max(self.floor)
    }
}

/// Upper bound on strata retained under `resolution` after
/// `num_strata_deposited` depositions: two bands of unit spacing, then at
/// most `resolution + 1` strata per further band.
pub(crate) fn calc_num_strata_retained_upper_bound(resolution: u64, num_strata_deposited: u64) -> u64 {
    if num_strata_deposited == 0 {
        return 0;
    }
    let band_width = resolution.saturating_add(1);
    let num_bands = bit_length((num_strata_deposited - 1) / band_width);
    num_strata_deposited.min(band_width.saturating_mul(num_bands + 1))
}

impl StratumRetentionPolicy for RecencyProportionalPolicy {
    fn gen_drop_ranks(
        &self,
        num_stratum_depositions_completed: u64,
        retained_ranks: &[u64],
        _rng: &mut dyn RngCore,
    ) -> Vec<u64> {
        let spacing = RecencySpacing::new(self.resolution);
        retained_ranks
            .iter()
            .copied()
            .filter(|&rank| !spacing.retains(rank, num_stratum_depositions_completed))
            .collect()
    }

    fn iter_retained_ranks(
        &self,
        num_strata_deposited: u64,
    ) -> Option<Box<dyn Iterator<Item = u64> + '_>> {
        Some(RecencySpacing::new(self.resolution).iter_retained_ranks(num_strata_deposited))
    }

    fn calc_num_strata_retained_exact(&self, num_strata_deposited: u64) -> Option<u64> {
        Some(RecencySpacing::new(self.resolution).calc_num_retained(num_strata_deposited))
    }

    fn calc_num_strata_retained_upper_bound(&self, num_strata_deposited: u64) -> u64 {
        calc_num_strata_retained_upper_bound(self.resolution, num_strata_deposited)
    }

    fn calc_mrca_uncertainty_abs_upper_bound(
        &self,
        first_num_strata_deposited: u64,
        second_num_strata_deposited: u64,
        actual_rank_of_mrca: u64,
    ) -> u64 {
        let deepest = first_num_strata_deposited.max(second_num_strata_deposited);
        let distance = deepest.saturating_sub(actual_rank_of_mrca + 1);
        let bracket = RecencySpacing::new(self.resolution).calc_bracket_spacing(distance);
        clamp_mrca_uncertainty(
            bracket - 1,
            first_num_strata_deposited,
            second_num_strata_deposited,
            actual_rank_of_mrca,
        )
    }

    fn algo_identifier(&self) -> &'static str {
        "recency_proportional_resolution_algo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::testing::check_policy;

    #[test]
    fn test_one_deposition() {
        let policy = RecencyProportionalPolicy::new(2);
        assert_eq!(policy.calc_num_strata_retained_exact(1), Some(1));
        let ranks: Vec<u64> = policy.iter_retained_ranks(1).unwrap().collect();
        assert_eq!(ranks, vec![0]);
    }

    #[test]
    fn test_spacing_widens_with_distance() {
        let policy = RecencyProportionalPolicy::new(1);
        let ranks: Vec<u64> = policy.iter_retained_ranks(17).unwrap().collect();
        // Distances 0..=3 keep every rank, 4..=7 every second, 8..=15 every
        // fourth, and rank 0 sits at distance 16.
        assert_eq!(ranks, vec![0, 4, 8, 10, 12, 13, 14, 15, 16]);
    }

    #[test]
    fn test_zero_resolution_is_logarithmic() {
        let policy = RecencyProportionalPolicy::new(0);
        for n in [100u64, 1_000, 100_000] {
            let count = policy.calc_num_strata_retained_exact(n).unwrap();
            assert!(count <= policy.calc_num_strata_retained_upper_bound(n));
            assert!(count <= 2 * bit_length(n) + 1, "n={n} count={count}");
        }
    }

    #[test]
    fn test_exact_count_matches_iteration() {
        for resolution in [0, 1, 3, 10] {
            let policy = RecencyProportionalPolicy::new(resolution);
            for n in [0u64, 1, 2, 17, 100, 1_000, 4_097] {
                let counted = policy.iter_retained_ranks(n).unwrap().count() as u64;
                assert_eq!(policy.calc_num_strata_retained_exact(n), Some(counted));
            }
        }
    }

    #[test]
    fn test_uncertainty_proportional_to_recency() {
        let policy = RecencyProportionalPolicy::new(4);
        for (n, mrca) in [(1_000u64, 10u64), (1_000, 900), (50_000, 49_000)] {
            let bound = policy.calc_mrca_uncertainty_abs_upper_bound(n, n, mrca);
            assert!(bound <= (n - mrca) / 4, "n={n} mrca={mrca} bound={bound}");
        }
    }

    #[test]
    fn test_invariants() {
        for resolution in [0, 1, 2, 5] {
            check_policy(&RecencyProportionalPolicy::new(resolution), 160);
        }
    }

    #[test]
    fn test_algo_identifier() {
        let policy = RecencyProportionalPolicy::new(2);
        assert_eq!(
            policy.algo_identifier(),
            "recency_proportional_resolution_algo"
        );
    }
}
