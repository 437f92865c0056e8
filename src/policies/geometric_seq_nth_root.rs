use rand::RngCore;
use serde::Serialize;
use tracing::warn;

use super::clamp_mrca_uncertainty;
use super::drop_ranks_outside;
use super::r#trait::StratumRetentionPolicy;
use crate::bit_floor;
use crate::errors::{HstratError, Result};

/// Retains strata using a geometric sequence based on the nth-root of the
/// number of depositions.
///
/// For each `i` in `1..=degree` the policy targets recency `n^(i/degree)`
/// and keeps at least `interspersal` strata within it, on a power-of-two
/// grid that only coarsens as `n` grows. Space is O(1): at most
/// `2 * degree * (interspersal + 1) + 2` strata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct GeometricSeqNthRootPolicy {
    pub degree: u64,
    pub interspersal: u64,
}

impl GeometricSeqNthRootPolicy {
    pub fn new(degree: u64, interspersal: u64) -> Result<Self> {
        validate_params(degree, interspersal)?;
        Ok(Self {
            degree,
            interspersal,
        })
    }

    /// Create with default interspersal of 2.
    pub fn with_degree(degree: u64) -> Result<Self> {
        Self::new(degree, 2)
    }
}

pub(crate) fn validate_params(degree: u64, interspersal: u64) -> Result<()> {
    if degree > u64::from(u32::MAX) {
        return Err(HstratError::invalid_param("degree", degree as f64));
    }
    if interspersal == 0 {
        return Err(HstratError::invalid_param("interspersal", 0.0));
    }
    if interspersal == 1 {
        warn!(
            degree,
            "interspersal of 1 leaves no slack around geometric targets; MRCA estimates may be much coarser than intended"
        );
    }
    Ok(())
}

/// Largest `t` with `t^degree <= n^pow`, i.e. `floor(n^(pow/degree))`.
///
/// Floating-point `pow` gives a first guess that is nudged with exact
/// integer comparisons whenever `n^pow` fits in 128 bits, so the result is
/// monotone in `n` and identical across platforms.
fn calc_target_recency(num_strata_deposited: u64, pow: u32, degree: u32) -> u64 {
    if pow == degree || num_strata_deposited <= 1 {
        return num_strata_deposited;
    }
    let exponent = f64::from(pow) / f64::from(degree);
    let guess = libm::floor(libm::pow(num_strata_deposited as f64, exponent)) as u64;
    let Some(ceiling) = u128::from(num_strata_deposited).checked_pow(pow) else {
        return guess.clamp(1, num_strata_deposited);
    };
    let exceeds = |t: u64| {
        u128::from(t)
            .checked_pow(degree)
            .map_or(true, |power| power > ceiling)
    };
    let mut target = guess.clamp(1, num_strata_deposited);
    while target > 1 && exceeds(target) {
        target -= 1;
    }
    while target < num_strata_deposited && !exceeds(target + 1) {
        target += 1;
    }
    target
}

/// Ascending ranks retained after `num_strata_deposited` depositions.
pub(crate) fn calc_retained_ranks(degree: u64, interspersal: u64, num_strata_deposited: u64) -> Vec<u64> {
    let Some(newest_rank) = num_strata_deposited.checked_sub(1) else {
        return Vec::new();
    };
    let degree = degree as u32;
    let mut ranks = vec![0, newest_rank];
    for pow in 1..=degree {
        let target_recency = calc_target_recency(num_strata_deposited, pow, degree);
        let sep = bit_floor(target_recency / interspersal).max(1);
        let backstop = (num_strata_deposited - target_recency).div_ceil(sep) * sep;
        ranks.extend((backstop..num_strata_deposited).step_by(sep as usize));
    }
    ranks.sort_unstable();
    ranks.dedup();
    ranks
}

/// Hard cap on strata retained under `degree` and `interspersal`.
pub(crate) fn calc_num_strata_retained_cap(degree: u64, interspersal: u64) -> u64 {
    2 * degree * (interspersal + 1) + 2
}

/// Raw absolute MRCA uncertainty bound: both columns keep every multiple of
/// the deepest column's outermost separation.
pub(crate) fn calc_mrca_uncertainty_abs_upper_bound(
    degree: u64,
    interspersal: u64,
    first_num_strata_deposited: u64,
    second_num_strata_deposited: u64,
    actual_rank_of_mrca: u64,
) -> u64 {
    let raw = if degree == 0 {
        u64::MAX
    } else {
        let deepest = first_num_strata_deposited.max(second_num_strata_deposited);
        bit_floor(deepest / interspersal).max(1) - 1
    };
    clamp_mrca_uncertainty(
        raw,
        first_num_strata_deposited,
        second_num_strata_deposited,
        actual_rank_of_mrca,
    )
}

impl StratumRetentionPolicy for GeometricSeqNthRootPolicy {
    fn gen_drop_ranks(
        &self,
        num_stratum_depositions_completed: u64,
        retained_ranks: &[u64],
        _rng: &mut dyn RngCore,
    ) -> Vec<u64> {
        let keep = calc_retained_ranks(
            self.degree,
            self.interspersal,
            num_stratum_depositions_completed + 1,
        );
        drop_ranks_outside(retained_ranks, keep.into_iter())
    }

    fn iter_retained_ranks(
        &self,
        num_strata_deposited: u64,
    ) -> Option<Box<dyn Iterator<Item = u64> + '_>> {
        let ranks = calc_retained_ranks(self.degree, self.interspersal, num_strata_deposited);
        Some(Box::new(ranks.into_iter()))
    }

    fn calc_num_strata_retained_upper_bound(&self, num_strata_deposited: u64) -> u64 {
        num_strata_deposited.min(calc_num_strata_retained_cap(self.degree, self.interspersal))
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
        "geom_seq_nth_root_algo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policies::testing::check_policy;

    #[test]
    fn test_rejects_zero_interspersal() {
        assert!(GeometricSeqNthRootPolicy::new(2, 0).is_err());
        assert!(GeometricSeqNthRootPolicy::new(0, 1).is_ok());
    }

    #[test]
    fn test_target_recency_is_exact_floor() {
        assert_eq!(calc_target_recency(16, 1, 2), 4);
        assert_eq!(calc_target_recency(17, 1, 2), 4);
        assert_eq!(calc_target_recency(24, 1, 2), 4);
        assert_eq!(calc_target_recency(25, 1, 2), 5);
        assert_eq!(calc_target_recency(27, 1, 3), 3);
        assert_eq!(calc_target_recency(64, 2, 3), 16);
        assert_eq!(calc_target_recency(1_000_000, 1, 3), 100);
    }

    #[test]
    fn test_target_recency_monotone() {
        for degree in 1..6u32 {
            for pow in 1..=degree {
                let mut previous = 0;
                for n in 1..2_000u64 {
                    let target = calc_target_recency(n, pow, degree);
                    assert!(target >= previous && target <= n);
                    let backstop_before = (n - 1) - calc_target_recency(n - 1, pow, degree);
                    assert!(n - target >= backstop_before, "n={n} pow={pow}");
                    previous = target;
                }
            }
        }
    }

    #[test]
    fn test_degree_zero_keeps_endpoints_only() {
        let policy = GeometricSeqNthRootPolicy::new(0, 2).unwrap();
        let ranks: Vec<u64> = policy.iter_retained_ranks(50).unwrap().collect();
        assert_eq!(ranks, vec![0, 49]);
    }

    #[test]
    fn test_space_stays_under_cap() {
        for (degree, interspersal) in [(1, 2), (2, 2), (3, 4), (4, 1)] {
            let policy = GeometricSeqNthRootPolicy::new(degree, interspersal).unwrap();
            let cap = calc_num_strata_retained_cap(degree, interspersal);
            for n in (0..3_000u64).chain([1 << 20, 1 << 33]) {
                let count = policy.calc_num_strata_retained_exact(n).unwrap();
                assert!(count <= cap, "n={n} count={count} cap={cap}");
            }
        }
    }

    #[test]
    fn test_invariants() {
        for (degree, interspersal) in [(0, 2), (1, 1), (1, 2), (2, 2), (3, 3), (6, 2)] {
            check_policy(&GeometricSeqNthRootPolicy::new(degree, interspersal).unwrap(), 260);
        }
    }

    #[test]
    fn test_algo_identifier() {
        let policy = GeometricSeqNthRootPolicy::new(2, 2).unwrap();
        assert_eq!(policy.algo_identifier(), "geom_seq_nth_root_algo");
    }
}
