use super::juxtaposition::{
    calc_probability_differentia_collision, check_bit_widths, iter_coincident_ranks,
};
use super::priors::{ArbitraryPrior, Prior};
use super::RetainedStrata;
use crate::errors::Result;

/// Selection of MRCA rank estimators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Estimator {
    /// Midpoint between last commonality and first disparity.
    Naive,
    /// Conditioned mean of the single most likely interval.
    MaximumLikelihood,
    /// Likelihood-weighted mean over every interval.
    Unbiased,
}

/// Common retained ranks up to and including the first mismatch, closed
/// off by the shallower column's depth when no mismatch is retained.
///
/// Consecutive entries delimit the intervals the MRCA may fall in. Empty
/// when the columns differ at rank 0.
fn extract_interval_boundaries(first: &impl RetainedStrata, second: &impl RetainedStrata) -> Vec<u64> {
    let mut boundaries = Vec::new();
    let mut found_disparity = false;
    for (rank, matched) in iter_coincident_ranks(first, second) {
        if !matched {
            if rank == 0 {
                return Vec::new();
            }
            boundaries.push(rank);
            found_disparity = true;
            break;
        }
        boundaries.push(rank);
    }
    if !found_disparity {
        boundaries.push(first.num_strata_deposited().min(second.num_strata_deposited()));
    }
    boundaries
}

/// Log-likelihood of each interval, newest first, paired with its
/// conditioned mean.
///
/// The newest interval assumes no spurious collision; each older one
/// assumes one more among the matching ranks above it.
fn weigh_intervals<'a>(
    boundaries: &'a [u64],
    p_collision: f64,
    prior: &'a dyn Prior,
) -> impl Iterator<Item = (f64, f64)> + 'a {
    let ln_p_collision = libm::log(p_collision);
    boundaries
        .windows(2)
        .rev()
        .enumerate()
        .map(move |(num_spurious, window)| {
            let (begin, end) = (window[0], window[1]);
            let log_weight = num_spurious as f64 * ln_p_collision
                + prior.calc_interval_log_probability_proxy(begin, end);
            (log_weight, prior.calc_interval_conditioned_mean(begin, end))
        })
}

/// Midpoint between the last commonality and the first disparity.
pub fn estimate_rank_of_mrca_naive(
    first: &impl RetainedStrata,
    second: &impl RetainedStrata,
) -> Result<Option<f64>> {
    check_bit_widths(first, second)?;
    let boundaries = extract_interval_boundaries(first, second);
    Ok(match boundaries[..] {
        [.., begin, end] => Some(ArbitraryPrior.calc_interval_conditioned_mean(begin, end)),
        _ => None,
    })
}

/// Conditioned mean of the interval maximizing collision likelihood times
/// prior weight.
pub fn estimate_rank_of_mrca_maximum_likelihood(
    first: &impl RetainedStrata,
    second: &impl RetainedStrata,
    prior: &dyn Prior,
) -> Result<Option<f64>> {
    let bit_width = check_bit_widths(first, second)?;
    let boundaries = extract_interval_boundaries(first, second);
    let p_collision = calc_probability_differentia_collision(bit_width);

    let mut best: Option<(f64, f64)> = None;
    for (log_weight, mean) in weigh_intervals(&boundaries, p_collision, prior) {
        if best.map_or(true, |(best_weight, _)| log_weight > best_weight) {
            best = Some((log_weight, mean));
        }
    }
    Ok(best.map(|(_, mean)| mean))
}

/// Likelihood-weighted average of every interval's conditioned mean.
pub fn estimate_rank_of_mrca_unbiased(
    first: &impl RetainedStrata,
    second: &impl RetainedStrata,
    prior: &dyn Prior,
) -> Result<Option<f64>> {
    let bit_width = check_bit_widths(first, second)?;
    let boundaries = extract_interval_boundaries(first, second);
    let p_collision = calc_probability_differentia_collision(bit_width);

    let weighted: Vec<(f64, f64)> = weigh_intervals(&boundaries, p_collision, prior).collect();
    let max_log_weight = weighted
        .iter()
        .map(|&(log_weight, _)| log_weight)
        .fold(f64::NEG_INFINITY, f64::max);
    if !max_log_weight.is_finite() {
        return Ok(None);
    }
    // Scaled by the heaviest interval so every weight lands in (0, 1].
    let (total_weight, weighted_sum) =
        weighted
            .iter()
            .fold((0.0, 0.0), |(total, sum), &(log_weight, mean)| {
                let weight = libm::exp(log_weight - max_log_weight);
                (total + weight, sum + weight * mean)
            });
    Ok(Some(weighted_sum / total_weight))
}

/// Estimate the MRCA rank using the specified estimator and prior.
///
/// `Ok(None)` when the columns share no common ancestor.
pub fn estimate_rank_of_mrca_between(
    first: &impl RetainedStrata,
    second: &impl RetainedStrata,
    estimator: Estimator,
    prior: &dyn Prior,
) -> Result<Option<f64>> {
    match estimator {
        Estimator::Naive => estimate_rank_of_mrca_naive(first, second),
        Estimator::MaximumLikelihood => {
            estimate_rank_of_mrca_maximum_likelihood(first, second, prior)
        }
        Estimator::Unbiased => estimate_rank_of_mrca_unbiased(first, second, prior),
    }
}

/// Quick MRCA estimate using `MaximumLikelihood` with `ArbitraryPrior`.
pub fn ballpark_rank_of_mrca_between(
    first: &impl RetainedStrata,
    second: &impl RetainedStrata,
) -> Result<Option<f64>> {
    estimate_rank_of_mrca_between(first, second, Estimator::MaximumLikelihood, &ArbitraryPrior)
}

/// Estimated ranks elapsed in `focal` since its MRCA with `other`.
pub fn estimate_ranks_since_mrca_with(
    focal: &impl RetainedStrata,
    other: &impl RetainedStrata,
    estimator: Estimator,
    prior: &dyn Prior,
) -> Result<Option<f64>> {
    let estimate = estimate_rank_of_mrca_between(focal, other, estimator, prior)?;
    Ok(estimate.map(|rank| focal.num_strata_deposited() as f64 - 1.0 - rank))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::HereditaryStratigraphicColumn;
    use crate::policies::{FixedResolutionPolicy, PerfectResolutionPolicy};
    use crate::reconstruction::priors::{ExponentialPrior, UniformPrior};
    use crate::reconstruction::testing::make_column;

    const ESTIMATORS: [Estimator; 3] = [
        Estimator::Naive,
        Estimator::MaximumLikelihood,
        Estimator::Unbiased,
    ];

    #[test]
    fn exact_under_perfect_resolution() {
        let mut ancestor =
            HereditaryStratigraphicColumn::with_seed(PerfectResolutionPolicy, 64, 3).unwrap();
        ancestor.deposit_strata(19);
        let mut left = ancestor.fork();
        let mut right = ancestor.fork();
        left.deposit_strata(6);
        right.deposit_strata(4);

        for estimator in ESTIMATORS {
            assert_eq!(
                estimate_rank_of_mrca_between(&left, &right, estimator, &UniformPrior),
                Ok(Some(19.0)),
                "{estimator:?}"
            );
        }
        assert_eq!(
            estimate_ranks_since_mrca_with(&left, &right, Estimator::Naive, &UniformPrior),
            Ok(Some(6.0))
        );
    }

    #[test]
    fn naive_is_interval_midpoint() {
        let a = make_column(&[(0, 1), (4, 2), (8, 3), (12, 4)], 13, 64);
        let b = make_column(&[(0, 1), (4, 2), (8, 9), (12, 9)], 13, 64);
        // MRCA in [4, 8) → midpoint 5.5
        assert_eq!(estimate_rank_of_mrca_naive(&a, &b), Ok(Some(5.5)));
        assert_eq!(ballpark_rank_of_mrca_between(&a, &b), Ok(Some(5.5)));
    }

    #[test]
    fn narrow_differentia_spread_unbiased_estimate() {
        // 1-bit matches are weak evidence, so older intervals pull the
        // unbiased estimate below the naive one.
        let a = make_column(&[(0, 1), (10, 0), (20, 1), (30, 0)], 31, 1);
        let b = make_column(&[(0, 1), (10, 0), (20, 1), (30, 1)], 31, 1);
        let naive = estimate_rank_of_mrca_naive(&a, &b).unwrap().unwrap();
        let unbiased = estimate_rank_of_mrca_unbiased(&a, &b, &UniformPrior)
            .unwrap()
            .unwrap();
        let likely = estimate_rank_of_mrca_maximum_likelihood(&a, &b, &UniformPrior)
            .unwrap()
            .unwrap();
        assert_eq!(naive, 24.5);
        assert_eq!(likely, 24.5);
        assert!(unbiased < naive && unbiased > 4.5, "unbiased={unbiased}");
    }

    #[test]
    fn exponential_prior_favours_recent_ranks() {
        let mut ancestor = HereditaryStratigraphicColumn::with_seed(
            FixedResolutionPolicy::new(50).unwrap(),
            64,
            8,
        )
        .unwrap();
        ancestor.deposit_strata(120);
        let mut left = ancestor.fork();
        let mut right = ancestor.fork();
        left.deposit_strata(100);
        right.deposit_strata(100);

        let growth = ExponentialPrior::new(1.05).unwrap();
        let flat = estimate_rank_of_mrca_unbiased(&left, &right, &UniformPrior)
            .unwrap()
            .unwrap();
        let skewed = estimate_rank_of_mrca_unbiased(&left, &right, &growth)
            .unwrap()
            .unwrap();
        assert!(skewed > flat, "skewed={skewed} flat={flat}");
        assert!((100.0..150.0).contains(&skewed));
    }

    #[test]
    fn exponential_prior_estimates_at_distant_mrca() {
        let mut ancestor = HereditaryStratigraphicColumn::with_seed(
            FixedResolutionPolicy::new(10).unwrap(),
            64,
            21,
        )
        .unwrap();
        ancestor.deposit_strata(2_000);
        let mut left = ancestor.fork();
        let mut right = ancestor.fork();
        left.deposit_strata(40);
        right.deposit_strata(25);

        for growth_factor in [0.9, 2.0] {
            let prior = ExponentialPrior::new(growth_factor).unwrap();
            for estimator in [Estimator::MaximumLikelihood, Estimator::Unbiased] {
                let estimate = estimate_rank_of_mrca_between(&left, &right, estimator, &prior)
                    .unwrap()
                    .unwrap();
                assert!(
                    (2_000.0..2_010.0).contains(&estimate),
                    "g={growth_factor} {estimator:?}: {estimate}"
                );
            }
        }
    }

    #[test]
    fn unrelated_columns_have_no_estimate() {
        let a = make_column(&[(0, 1), (5, 2)], 6, 64);
        let b = make_column(&[(0, 2), (5, 2)], 6, 64);
        for estimator in ESTIMATORS {
            assert_eq!(
                estimate_rank_of_mrca_between(&a, &b, estimator, &ArbitraryPrior),
                Ok(None)
            );
        }
    }
}
