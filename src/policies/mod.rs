pub mod curbed_recency_proportional;
pub mod depth_proportional;
pub mod depth_proportional_tapered;
pub mod dynamic;
pub mod fixed_resolution;
pub mod geometric_seq_nth_root;
pub mod geometric_seq_nth_root_tapered;
pub mod nominal_resolution;
pub mod perfect_resolution;
pub mod pseudostochastic;
pub mod recency_proportional;
pub mod stochastic;
mod r#trait;

/// Compute `lhs \ rhs` for sorted ascending unique rank slices.
pub(crate) fn sorted_set_difference(lhs: &[u64], rhs: &[u64]) -> Vec<u64> {
    let mut out = Vec::new();
    let mut i = 0usize;
    let mut j = 0usize;

    while i < lhs.len() && j < rhs.len() {
        match lhs[i].cmp(&rhs[j]) {
            std::cmp::Ordering::Less => {
                out.push(lhs[i]);
                i += 1;
            }
            std::cmp::Ordering::Equal => {
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Greater => {
                j += 1;
            }
        }
    }

    out.extend_from_slice(&lhs[i..]);
    out
}

/// Ranks of `retained_ranks` absent from the ascending `keep` iterator.
pub(crate) fn drop_ranks_outside(
    retained_ranks: &[u64],
    keep: impl Iterator<Item = u64>,
) -> Vec<u64> {
    let keep: Vec<u64> = keep.collect();
    sorted_set_difference(retained_ranks, &keep)
}

/// Apply the bounds every policy shares to a raw MRCA uncertainty estimate:
/// never above the shallower column's newest rank, and zero when two
/// equal-depth columns diverged after their shared newest rank.
pub(crate) fn clamp_mrca_uncertainty(
    raw: u64,
    first_num_strata_deposited: u64,
    second_num_strata_deposited: u64,
    actual_rank_of_mrca: u64,
) -> u64 {
    let shallower = first_num_strata_deposited.min(second_num_strata_deposited);
    if shallower == 0 {
        return 0;
    }
    if first_num_strata_deposited == second_num_strata_deposited
        && actual_rank_of_mrca + 1 >= shallower
    {
        return 0;
    }
    raw.min(shallower - 1)
}

pub use curbed_recency_proportional::CurbedRecencyProportionalPolicy;
pub use depth_proportional::DepthProportionalPolicy;
pub use depth_proportional_tapered::DepthProportionalTaperedPolicy;
pub use dynamic::DynamicPolicy;
pub use fixed_resolution::FixedResolutionPolicy;
pub use geometric_seq_nth_root::GeometricSeqNthRootPolicy;
pub use geometric_seq_nth_root_tapered::GeometricSeqNthRootTaperedPolicy;
pub use nominal_resolution::NominalResolutionPolicy;
pub use perfect_resolution::PerfectResolutionPolicy;
pub use pseudostochastic::PseudostochasticPolicy;
pub use r#trait::StratumRetentionPolicy;
pub use recency_proportional::RecencyProportionalPolicy;
pub use stochastic::StochasticPolicy;
