use std::cmp::Ordering;
use std::collections::VecDeque;
use std::iter::Peekable;

use super::RetainedStrata;
use crate::differentia::Differentia;
use crate::errors::{HstratError, Result};

/// Probability of a spurious differentia collision at the given bit width.
///
/// Two independent random differentia at `bit_width` bits match with
/// probability `1 / 2^bit_width`.
pub fn calc_probability_differentia_collision(bit_width: u8) -> f64 {
    // libm::pow avoids the overflow of 1u64 << 64.
    libm::pow(2.0, f64::from(bit_width)).recip()
}

/// Minimum number of consecutive spurious collisions needed to fool a test
/// at the given significance level.
///
/// Returns the smallest `n` such that `p^n <= significance_level`, where
/// `p = calc_probability_differentia_collision(bit_width)`.
///
/// Special cases:
/// - `significance_level == 0.0` → `u64::MAX` (impossible to satisfy)
/// - `significance_level >= p` → `1` (a single collision already exceeds threshold)
pub fn calc_min_implausible_spurious_consecutive_differentia_collisions(
    bit_width: u8,
    significance_level: f64,
) -> Result<u64> {
    if !(0.0..=1.0).contains(&significance_level) {
        return Err(HstratError::InvalidConfidenceLevel(1.0 - significance_level));
    }
    if significance_level == 0.0 {
        return Ok(u64::MAX);
    }
    let p = calc_probability_differentia_collision(bit_width);
    if significance_level >= p {
        return Ok(1);
    }
    // Both logs are negative, so the ratio is positive.
    Ok(libm::ceil(libm::log(significance_level) / libm::log(p)) as u64)
}

/// Check a pair is comparable and return the collision threshold for
/// `confidence_level`.
pub(crate) fn calc_collision_threshold(
    first: &impl RetainedStrata,
    second: &impl RetainedStrata,
    confidence_level: f64,
) -> Result<u64> {
    if !(0.0..=1.0).contains(&confidence_level) {
        return Err(HstratError::InvalidConfidenceLevel(confidence_level));
    }
    let bit_width = check_bit_widths(first, second)?;
    calc_min_implausible_spurious_consecutive_differentia_collisions(
        bit_width,
        1.0 - confidence_level,
    )
}

pub(crate) fn check_bit_widths(
    first: &impl RetainedStrata,
    second: &impl RetainedStrata,
) -> Result<u8> {
    let (a, b) = (first.differentia_bit_width(), second.differentia_bit_width());
    if a == b {
        Ok(a)
    } else {
        Err(HstratError::MismatchedBitWidths {
            first: a,
            second: b,
        })
    }
}

type StrataIter<'a> = Peekable<Box<dyn Iterator<Item = (u64, Differentia)> + 'a>>;

/// Merge-walk over ranks retained by both columns, yielding each common
/// rank and whether its differentiae match.
pub(crate) struct CoincidentRanks<'a> {
    first: StrataIter<'a>,
    second: StrataIter<'a>,
}

impl Iterator for CoincidentRanks<'_> {
    type Item = (u64, bool);

    fn next(&mut self) -> Option<(u64, bool)> {
        loop {
            let &(rank_a, diff_a) = self.first.peek()?;
            let &(rank_b, diff_b) = self.second.peek()?;
            match rank_a.cmp(&rank_b) {
                Ordering::Less => {
                    self.first.next();
                }
                Ordering::Greater => {
                    self.second.next();
                }
                Ordering::Equal => {
                    self.first.next();
                    self.second.next();
                    return Some((rank_a, diff_a == diff_b));
                }
            }
        }
    }
}

pub(crate) fn iter_coincident_ranks<'a>(
    first: &'a impl RetainedStrata,
    second: &'a impl RetainedStrata,
) -> CoincidentRanks<'a> {
    CoincidentRanks {
        first: first.iter_ranks_and_differentia().peekable(),
        second: second.iter_ranks_and_differentia().peekable(),
    }
}

/// Iterate ranks retained by both columns where differentia matches,
/// stopping at the first common rank where differentia differs.
pub fn iter_ranks_of_retained_commonality_between<'a>(
    first: &'a impl RetainedStrata,
    second: &'a impl RetainedStrata,
) -> Result<impl Iterator<Item = u64> + 'a> {
    check_bit_widths(first, second)?;
    Ok(iter_coincident_ranks(first, second)
        .take_while(|&(_, matched)| matched)
        .map(|(rank, _)| rank))
}

fn fits_window(window: &VecDeque<u64>, capacity: u64) -> bool {
    (window.len() as u64) < capacity
}

/// Merge-walk form of last retained commonality; works for any pair of
/// comparable columns.
pub fn calc_rank_of_last_retained_commonality_between_generic(
    first: &impl RetainedStrata,
    second: &impl RetainedStrata,
    confidence_level: f64,
) -> Result<Option<u64>> {
    let threshold = calc_collision_threshold(first, second, confidence_level)?;
    Ok(last_commonality_generic(first, second, threshold))
}

fn last_commonality_generic(
    first: &impl RetainedStrata,
    second: &impl RetainedStrata,
    threshold: u64,
) -> Option<u64> {
    let mut window = VecDeque::new();
    for (rank, matched) in iter_coincident_ranks(first, second) {
        if !matched {
            break;
        }
        if !fits_window(&window, threshold) {
            window.pop_front();
        }
        window.push_back(rank);
    }
    if window.len() as u64 == threshold {
        window.front().copied()
    } else {
        None
    }
}

/// Number of leading column indices that hold rank == index in both
/// columns, when the binary-search shortcut applies.
fn bsearch_prefix_len(
    first: &impl RetainedStrata,
    second: &impl RetainedStrata,
    threshold: u64,
) -> Option<usize> {
    if first.differentia_bit_width() < 64
        || threshold != 1
        || !first.has_random_access()
        || !second.has_random_access()
    {
        return None;
    }
    let shallower = first.num_strata_deposited().min(second.num_strata_deposited());
    let prefix_len = usize::try_from(shallower).ok()?;
    if prefix_len == 0 {
        return None;
    }
    // Ranks strictly increase from 0, so rank == index at the last prefix
    // slot means every lower rank is retained too.
    let last = prefix_len - 1;
    let expected = Some(last as u64);
    (first.rank_at_column_index(last) == expected && second.rank_at_column_index(last) == expected)
        .then_some(prefix_len)
}

/// Index of the first mismatching differentia among the first
/// `prefix_len` strata, or `prefix_len` when none mismatch.
fn bsearch_first_mismatch(
    first: &impl RetainedStrata,
    second: &impl RetainedStrata,
    prefix_len: usize,
) -> usize {
    let (mut lo, mut hi) = (0, prefix_len);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if first.differentia_at_column_index(mid) == second.differentia_at_column_index(mid) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Binary-search form of last retained commonality.
///
/// Applies when both columns use 64-bit differentiae, the confidence level
/// needs only one match, both index their strata in O(1), and both retain
/// every rank below the shallower column's depth; otherwise falls back to
/// the merge walk.
pub fn calc_rank_of_last_retained_commonality_between_bsearch(
    first: &impl RetainedStrata,
    second: &impl RetainedStrata,
    confidence_level: f64,
) -> Result<Option<u64>> {
    let threshold = calc_collision_threshold(first, second, confidence_level)?;
    let Some(prefix_len) = bsearch_prefix_len(first, second, threshold) else {
        return Ok(last_commonality_generic(first, second, threshold));
    };
    let mismatch = bsearch_first_mismatch(first, second, prefix_len);
    Ok(mismatch.checked_sub(1).map(|index| index as u64))
}

/// Return the last retained rank confirmed as a common ancestor with
/// `confidence_level` confidence, accounting for spurious collisions.
///
/// The oldest rank among the last `threshold` consecutive matching common
/// ranks before the first mismatch is reported, where `threshold` comes
/// from [`calc_min_implausible_spurious_consecutive_differentia_collisions`].
/// `None` when fewer than `threshold` matches precede the first mismatch.
pub fn calc_rank_of_last_retained_commonality_between(
    first: &impl RetainedStrata,
    second: &impl RetainedStrata,
    confidence_level: f64,
) -> Result<Option<u64>> {
    calc_rank_of_last_retained_commonality_between_bsearch(first, second, confidence_level)
}

/// Merge-walk form of first retained disparity.
pub fn calc_rank_of_first_retained_disparity_between_generic(
    first: &impl RetainedStrata,
    second: &impl RetainedStrata,
    confidence_level: f64,
) -> Result<Option<u64>> {
    let threshold = calc_collision_threshold(first, second, confidence_level)?;
    Ok(first_disparity_generic(first, second, threshold))
}

fn first_disparity_generic(
    first: &impl RetainedStrata,
    second: &impl RetainedStrata,
    threshold: u64,
) -> Option<u64> {
    let capacity = threshold - 1;
    let mut window = VecDeque::new();
    for (rank, matched) in iter_coincident_ranks(first, second) {
        if matched {
            if capacity == 0 {
                continue;
            }
            if !fits_window(&window, capacity) {
                window.pop_front();
            }
            window.push_back(rank);
        } else {
            return Some(window.front().copied().unwrap_or(rank));
        }
    }
    None
}

/// Binary-search form of first retained disparity, under the same
/// conditions as [`calc_rank_of_last_retained_commonality_between_bsearch`].
pub fn calc_rank_of_first_retained_disparity_between_bsearch(
    first: &impl RetainedStrata,
    second: &impl RetainedStrata,
    confidence_level: f64,
) -> Result<Option<u64>> {
    let threshold = calc_collision_threshold(first, second, confidence_level)?;
    let Some(prefix_len) = bsearch_prefix_len(first, second, threshold) else {
        return Ok(first_disparity_generic(first, second, threshold));
    };
    let mismatch = bsearch_first_mismatch(first, second, prefix_len);
    Ok((mismatch < prefix_len).then_some(mismatch as u64))
}

/// Return the first retained rank at which the columns may already have
/// diverged.
///
/// That is the oldest of the `threshold - 1` matches preceding the first
/// mismatching common rank, or the mismatch itself when none precede it.
/// `None` when every common rank matches.
pub fn calc_rank_of_first_retained_disparity_between(
    first: &impl RetainedStrata,
    second: &impl RetainedStrata,
    confidence_level: f64,
) -> Result<Option<u64>> {
    calc_rank_of_first_retained_disparity_between_bsearch(first, second, confidence_level)
}

/// Ranks elapsed in `focal` since the last retained commonality with `other`.
pub fn calc_ranks_since_last_retained_commonality_with(
    focal: &impl RetainedStrata,
    other: &impl RetainedStrata,
    confidence_level: f64,
) -> Result<Option<u64>> {
    let last = calc_rank_of_last_retained_commonality_between(focal, other, confidence_level)?;
    Ok(last.map(|rank| focal.num_strata_deposited() - 1 - rank))
}

/// Ranks elapsed in `focal` since the first retained disparity with `other`.
pub fn calc_ranks_since_first_retained_disparity_with(
    focal: &impl RetainedStrata,
    other: &impl RetainedStrata,
    confidence_level: f64,
) -> Result<Option<u64>> {
    let first = calc_rank_of_first_retained_disparity_between(focal, other, confidence_level)?;
    Ok(first.map(|rank| focal.num_strata_deposited() - 1 - rank))
}

/// Return `true` if the columns definitively share no common ancestor.
///
/// Rank 0 is retained forever, so differing rank-0 differentiae are proof
/// of separate origins; matching ones prove nothing.
pub fn does_definitively_share_no_common_ancestor(
    first: &impl RetainedStrata,
    second: &impl RetainedStrata,
) -> Result<bool> {
    check_bit_widths(first, second)?;
    Ok(matches!(
        iter_coincident_ranks(first, second).next(),
        Some((0, false))
    ))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::*;
    use crate::column::HereditaryStratigraphicColumn;
    use crate::policies::PerfectResolutionPolicy;
    use crate::reconstruction::testing::make_column;
    use crate::stores::StratumOrderedStoreTree;

    /// Counts indexed differentia lookups made through it.
    struct CountingStrata<'a, T> {
        inner: &'a T,
        random_access: bool,
        lookups: Cell<usize>,
    }

    impl<'a, T: RetainedStrata> CountingStrata<'a, T> {
        fn new(inner: &'a T, random_access: bool) -> Self {
            Self {
                inner,
                random_access,
                lookups: Cell::new(0),
            }
        }
    }

    impl<T: RetainedStrata> RetainedStrata for CountingStrata<'_, T> {
        fn num_strata_deposited(&self) -> u64 {
            self.inner.num_strata_deposited()
        }

        fn differentia_bit_width(&self) -> u8 {
            self.inner.differentia_bit_width()
        }

        fn num_strata_retained(&self) -> usize {
            self.inner.num_strata_retained()
        }

        fn rank_at_column_index(&self, index: usize) -> Option<u64> {
            self.inner.rank_at_column_index(index)
        }

        fn differentia_at_column_index(&self, index: usize) -> Option<Differentia> {
            self.lookups.set(self.lookups.get() + 1);
            self.inner.differentia_at_column_index(index)
        }

        fn iter_ranks_and_differentia(
            &self,
        ) -> Box<dyn Iterator<Item = (u64, Differentia)> + '_> {
            self.inner.iter_ranks_and_differentia()
        }

        fn has_random_access(&self) -> bool {
            self.random_access
        }
    }

    const DIVERGED_AT_3: [[(u64, u64); 5]; 2] = [
        [(0, 100), (1, 200), (2, 300), (3, 400), (4, 500)],
        [(0, 100), (1, 200), (2, 300), (3, 999), (4, 888)],
    ];

    #[test]
    fn collision_probability_by_width() {
        let p = calc_probability_differentia_collision(64);
        assert!(p > 0.0 && p < 1e-18);
        assert_eq!(calc_probability_differentia_collision(1), 0.5);
    }

    #[test]
    fn min_implausible_collisions_known_values() {
        // p = 0.5: ceil(ln(0.05) / ln(0.5)) = ceil(4.32) = 5
        assert_eq!(
            calc_min_implausible_spurious_consecutive_differentia_collisions(1, 0.05),
            Ok(5)
        );
        assert_eq!(
            calc_min_implausible_spurious_consecutive_differentia_collisions(64, 0.0),
            Ok(u64::MAX)
        );
        let p = calc_probability_differentia_collision(8);
        assert_eq!(
            calc_min_implausible_spurious_consecutive_differentia_collisions(8, p + 0.01),
            Ok(1)
        );
        assert!(calc_min_implausible_spurious_consecutive_differentia_collisions(8, 1.5).is_err());
    }

    #[test]
    fn iter_commonality_stops_at_mismatch() {
        let a = make_column(&DIVERGED_AT_3[0], 5, 64);
        let b = make_column(&DIVERGED_AT_3[1], 5, 64);
        let common: Vec<u64> = iter_ranks_of_retained_commonality_between(&a, &b)
            .unwrap()
            .collect();
        assert_eq!(common, vec![0, 1, 2]);
    }

    #[test]
    fn iter_commonality_sparse_intersection() {
        // a retains 0,2,4; b retains 0,3,4 → common = 0,4
        let a = make_column(&[(0, 10), (2, 20), (4, 30)], 5, 64);
        let b = make_column(&[(0, 10), (3, 99), (4, 30)], 5, 64);
        let common: Vec<u64> = iter_ranks_of_retained_commonality_between(&a, &b)
            .unwrap()
            .collect();
        assert_eq!(common, vec![0, 4]);
    }

    #[test]
    fn last_commonality_and_first_disparity_bracket_divergence() {
        let a = make_column(&DIVERGED_AT_3[0], 5, 64);
        let b = make_column(&DIVERGED_AT_3[1], 5, 64);
        assert_eq!(calc_rank_of_last_retained_commonality_between(&a, &b, 0.95), Ok(Some(2)));
        assert_eq!(calc_rank_of_first_retained_disparity_between(&a, &b, 0.95), Ok(Some(3)));
        assert_eq!(calc_ranks_since_last_retained_commonality_with(&a, &b, 0.95), Ok(Some(2)));
        assert_eq!(calc_ranks_since_first_retained_disparity_with(&a, &b, 0.95), Ok(Some(1)));
    }

    #[test]
    fn narrow_differentia_need_longer_runs() {
        // 1-bit differentiae at 95% confidence need five consecutive matches.
        let strata: Vec<(u64, u64)> = (0..8).map(|r| (r, r % 2)).collect();
        let mut diverged = strata.clone();
        diverged[6].1 ^= 1;
        diverged[7].1 ^= 1;
        let a = make_column(&strata, 8, 1);
        let b = make_column(&diverged, 8, 1);

        // Matches at 0..=5; window of 5 starts at rank 1.
        assert_eq!(calc_rank_of_last_retained_commonality_between(&a, &b, 0.95), Ok(Some(1)));
        // Window of 4 before the mismatch at 6 starts at rank 2.
        assert_eq!(calc_rank_of_first_retained_disparity_between(&a, &b, 0.95), Ok(Some(2)));

        let short = make_column(&strata[..4], 4, 1);
        let short_diverged = make_column(&diverged[..4], 4, 1);
        assert_eq!(
            calc_rank_of_last_retained_commonality_between(&short, &short_diverged, 0.95),
            Ok(None)
        );
    }

    #[test]
    fn no_disparity_identical_columns() {
        let a = make_column(&[(0, 10), (1, 20), (2, 30)], 3, 64);
        let b = make_column(&[(0, 10), (1, 20), (2, 30)], 3, 64);
        assert_eq!(calc_rank_of_first_retained_disparity_between(&a, &b, 0.95), Ok(None));
        assert_eq!(calc_rank_of_last_retained_commonality_between(&a, &b, 0.95), Ok(Some(2)));
    }

    #[test]
    fn full_confidence_never_trusts_matches() {
        let a = make_column(&[(0, 10), (1, 20)], 2, 64);
        assert_eq!(calc_rank_of_last_retained_commonality_between(&a, &a, 1.0), Ok(None));
    }

    #[test]
    fn rejects_bad_inputs() {
        let a = make_column(&[(0, 1)], 1, 64);
        let b = make_column(&[(0, 1)], 1, 8);
        assert_eq!(
            calc_rank_of_last_retained_commonality_between(&a, &b, 0.95),
            Err(HstratError::MismatchedBitWidths { first: 64, second: 8 })
        );
        assert_eq!(
            calc_rank_of_first_retained_disparity_between(&a, &a, 1.5),
            Err(HstratError::InvalidConfidenceLevel(1.5))
        );
        assert!(calc_rank_of_last_retained_commonality_between(&a, &a, f64::NAN).is_err());
    }

    #[test]
    fn definitive_no_common_ancestor() {
        let a = make_column(&[(0, 111), (1, 200)], 2, 64);
        let b = make_column(&[(0, 222), (1, 200)], 2, 64);
        let c = make_column(&[(0, 111), (1, 999)], 2, 64);
        assert_eq!(does_definitively_share_no_common_ancestor(&a, &b), Ok(true));
        assert_eq!(does_definitively_share_no_common_ancestor(&a, &c), Ok(false));
    }

    #[test]
    fn bsearch_agrees_with_generic_on_relatives() {
        let mut ancestor =
            HereditaryStratigraphicColumn::with_seed(PerfectResolutionPolicy, 64, 42).unwrap();
        ancestor.deposit_strata(40);
        let mut left = ancestor.fork();
        let mut right = ancestor.fork();
        left.deposit_strata(13);
        right.deposit_strata(3);

        for (a, b) in [(&left, &right), (&left, &ancestor), (&ancestor, &ancestor)] {
            assert_eq!(
                calc_rank_of_last_retained_commonality_between_bsearch(a, b, 0.95),
                calc_rank_of_last_retained_commonality_between_generic(a, b, 0.95)
            );
            assert_eq!(
                calc_rank_of_first_retained_disparity_between_bsearch(a, b, 0.95),
                calc_rank_of_first_retained_disparity_between_generic(a, b, 0.95)
            );
        }
        assert_eq!(
            calc_rank_of_last_retained_commonality_between(&left, &right, 0.95),
            Ok(Some(40))
        );
        assert_eq!(
            calc_rank_of_first_retained_disparity_between(&left, &right, 0.95),
            Ok(Some(41))
        );
    }

    #[test]
    fn bsearch_skips_stores_without_random_access() {
        let mut ancestor = HereditaryStratigraphicColumn::<_, StratumOrderedStoreTree>::from_rng(
            PerfectResolutionPolicy,
            64,
            SmallRng::seed_from_u64(5),
        )
        .unwrap();
        ancestor.deposit_strata(200);
        let mut left = ancestor.fork();
        let mut right = ancestor.fork();
        left.deposit_strata(9);
        right.deposit_strata(30);
        assert!(!left.has_random_access());

        let (a, b) = (CountingStrata::new(&left, false), CountingStrata::new(&right, false));
        assert_eq!(
            calc_rank_of_last_retained_commonality_between_bsearch(&a, &b, 0.95),
            calc_rank_of_last_retained_commonality_between_generic(&left, &right, 0.95)
        );
        assert_eq!(
            calc_rank_of_first_retained_disparity_between_bsearch(&a, &b, 0.95),
            Ok(Some(201))
        );
        assert_eq!(a.lookups.get() + b.lookups.get(), 0);

        let (a, b) = (CountingStrata::new(&left, true), CountingStrata::new(&right, true));
        assert_eq!(
            calc_rank_of_last_retained_commonality_between_bsearch(&a, &b, 0.95),
            Ok(Some(200))
        );
        assert!(a.lookups.get() > 0 && a.lookups.get() < 32);
    }
}
