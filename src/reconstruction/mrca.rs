#[cfg(feature = "rayon")]
use rayon::prelude::*;
use tracing::debug;

use super::juxtaposition::{
    calc_rank_of_first_retained_disparity_between,
    calc_rank_of_last_retained_commonality_between, does_definitively_share_no_common_ancestor,
};
use super::RetainedStrata;
use crate::errors::Result;

/// Whether two columns share any common ancestor.
///
/// `Some(false)` when their rank-0 strata differ, `Some(true)` when enough
/// consecutive matches exist to rule out chance at `confidence_level`, and
/// `None` when the retained strata cannot tell.
pub fn does_have_any_common_ancestor(
    first: &impl RetainedStrata,
    second: &impl RetainedStrata,
    confidence_level: f64,
) -> Result<Option<bool>> {
    let last_commonality =
        calc_rank_of_last_retained_commonality_between(first, second, confidence_level)?;
    if does_definitively_share_no_common_ancestor(first, second)? {
        Ok(Some(false))
    } else if last_commonality.is_some() {
        Ok(Some(true))
    } else {
        Ok(None)
    }
}

/// Bounds on the rank of the MRCA between two columns.
///
/// Returns `Some((lower, upper))` with the true MRCA rank in
/// `[lower, upper)` at `confidence_level`. The lower bound is the last
/// retained commonality and the upper bound the first retained disparity,
/// or the shallower column's depth when no disparity is retained. `None`
/// unless a common ancestor is established.
pub fn calc_rank_of_mrca_bounds_between(
    first: &impl RetainedStrata,
    second: &impl RetainedStrata,
    confidence_level: f64,
) -> Result<Option<(u64, u64)>> {
    if does_have_any_common_ancestor(first, second, confidence_level)? != Some(true) {
        return Ok(None);
    }
    let lower = calc_rank_of_last_retained_commonality_between(first, second, confidence_level)?;
    let upper = calc_rank_of_first_retained_disparity_between(first, second, confidence_level)?
        .unwrap_or_else(|| first.num_strata_deposited().min(second.num_strata_deposited()));
    Ok(lower.map(|lower| (lower, upper)))
}

/// Number of ranks that could be the MRCA besides the lower bound, i.e.
/// `upper - lower - 1` of [`calc_rank_of_mrca_bounds_between`].
pub fn calc_rank_of_mrca_uncertainty_between(
    first: &impl RetainedStrata,
    second: &impl RetainedStrata,
    confidence_level: f64,
) -> Result<Option<u64>> {
    let bounds = calc_rank_of_mrca_bounds_between(first, second, confidence_level)?;
    Ok(bounds.map(|(lower, upper)| upper - lower - 1))
}

/// Bounds on ranks elapsed in `focal` since its MRCA with `other`, as a
/// half-open range `[lower, upper)`.
pub fn calc_ranks_since_mrca_bounds_with(
    focal: &impl RetainedStrata,
    other: &impl RetainedStrata,
    confidence_level: f64,
) -> Result<Option<(u64, u64)>> {
    let bounds = calc_rank_of_mrca_bounds_between(focal, other, confidence_level)?;
    let num_strata_deposited = focal.num_strata_deposited();
    Ok(bounds.map(|(lower, upper)| (num_strata_deposited - upper, num_strata_deposited - lower)))
}

/// Last retained commonality for every ordered pair of `population`.
///
/// Entry `[i][j]` compares members `i` and `j`; the matrix is symmetric.
/// Rows are computed in parallel with the `rayon` feature.
pub fn calc_pairwise_ranks_of_last_retained_commonality<C>(
    population: &[C],
    confidence_level: f64,
) -> Result<Vec<Vec<Option<u64>>>>
where
    C: RetainedStrata + Sync,
{
    let row = |first: &C| -> Result<Vec<Option<u64>>> {
        population
            .iter()
            .map(|second| {
                calc_rank_of_last_retained_commonality_between(first, second, confidence_level)
            })
            .collect()
    };

    #[cfg(feature = "rayon")]
    let matrix = population.par_iter().map(row).collect::<Result<Vec<_>>>();
    #[cfg(not(feature = "rayon"))]
    let matrix = population.iter().map(row).collect::<Result<Vec<_>>>();

    debug!(population_size = population.len(), "pairwise commonality");
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::HereditaryStratigraphicColumn;
    use crate::errors::HstratError;
    use crate::policies::{FixedResolutionPolicy, PerfectResolutionPolicy};
    use crate::reconstruction::testing::make_column;

    #[test]
    fn common_ancestor_parent_child() {
        let mut col =
            HereditaryStratigraphicColumn::with_seed(PerfectResolutionPolicy, 64, 42).unwrap();
        col.deposit_strata(10);
        let child = col.clone_descendant();
        assert_eq!(does_have_any_common_ancestor(&col, &child, 0.95), Ok(Some(true)));
    }

    #[test]
    fn unrelated_columns() {
        let a = HereditaryStratigraphicColumn::with_seed(PerfectResolutionPolicy, 64, 1).unwrap();
        let b = HereditaryStratigraphicColumn::with_seed(PerfectResolutionPolicy, 64, 2).unwrap();
        assert_eq!(does_have_any_common_ancestor(&a, &b, 0.95), Ok(Some(false)));
        assert_eq!(calc_rank_of_mrca_bounds_between(&a, &b, 0.95), Ok(None));
    }

    #[test]
    fn indeterminate_with_too_few_matches() {
        // 1-bit differentiae need five matches at 95% confidence.
        let a = make_column(&[(0, 1), (1, 0)], 2, 1);
        assert_eq!(does_have_any_common_ancestor(&a, &a, 0.95), Ok(None));
        assert_eq!(calc_rank_of_mrca_bounds_between(&a, &a, 0.95), Ok(None));
    }

    #[test]
    fn mrca_bounds_parent_child_perfect() {
        let mut parent =
            HereditaryStratigraphicColumn::with_seed(PerfectResolutionPolicy, 64, 42).unwrap();
        parent.deposit_strata(9);
        let mut child = parent.clone_descendant();
        child.deposit_strata(5);

        // The parent's newest rank 9 is the MRCA; no disparity is retained.
        assert_eq!(calc_rank_of_mrca_bounds_between(&parent, &child, 0.95), Ok(Some((9, 10))));
        assert_eq!(calc_rank_of_mrca_uncertainty_between(&parent, &child, 0.95), Ok(Some(0)));
        assert_eq!(calc_ranks_since_mrca_bounds_with(&child, &parent, 0.95), Ok(Some((6, 7))));
    }

    #[test]
    fn mrca_bounds_known_divergence() {
        let a = make_column(&[(0, 100), (1, 200), (2, 300), (3, 400), (4, 500)], 5, 64);
        let b = make_column(&[(0, 100), (1, 200), (2, 300), (3, 999), (4, 888)], 5, 64);
        assert_eq!(calc_rank_of_mrca_bounds_between(&a, &b, 0.95), Ok(Some((2, 3))));
        assert_eq!(calc_ranks_since_mrca_bounds_with(&a, &b, 0.95), Ok(Some((2, 3))));
    }

    #[test]
    fn mrca_bounds_sparse_siblings() {
        let mut ancestor =
            HereditaryStratigraphicColumn::with_seed(FixedResolutionPolicy::new(10).unwrap(), 64, 4)
                .unwrap();
        ancestor.deposit_strata(54);
        let mut left = ancestor.fork();
        let mut right = ancestor.fork();
        left.deposit_strata(30);
        right.deposit_strata(20);

        let (lower, upper) = calc_rank_of_mrca_bounds_between(&left, &right, 0.95)
            .unwrap()
            .unwrap();
        assert_eq!((lower, upper), (50, 60));
        assert!(lower <= 54 && 54 < upper);
    }

    #[test]
    fn pairwise_matrix_is_symmetric() {
        let mut root =
            HereditaryStratigraphicColumn::with_seed(PerfectResolutionPolicy, 64, 11).unwrap();
        root.deposit_strata(5);
        let mut population = vec![root.fork(), root.fork(), root];
        population[0].deposit_strata(3);
        population[1].deposit_strata(1);

        let matrix = calc_pairwise_ranks_of_last_retained_commonality(&population, 0.95).unwrap();
        assert_eq!(matrix.len(), 3);
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(matrix[i][j], matrix[j][i]);
            }
        }
        assert_eq!(matrix[0][1], Some(5));
        assert_eq!(matrix[0][2], Some(5));
        assert_eq!(matrix[0][0], Some(8));
    }

    #[test]
    fn pairwise_matrix_propagates_errors() {
        let population = vec![make_column(&[(0, 1)], 1, 64)];
        assert_eq!(
            calc_pairwise_ranks_of_last_retained_commonality(&population, 2.0),
            Err(HstratError::InvalidConfidenceLevel(2.0))
        );
    }
}
