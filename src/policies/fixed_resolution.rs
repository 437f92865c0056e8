use rand::RngCore;
use serde::Serialize;

use super::clamp_mrca_uncertainty;
use super::r#trait::StratumRetentionPolicy;
use crate::errors::{HstratError, Result};

/// Retains strata at fixed rank intervals.
///
/// Keeps every `resolution`-th rank (0, resolution, 2*resolution, ...)
/// plus the newest rank. MRCA uncertainty stays below `resolution`
/// regardless of depth, at the cost of linear memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FixedResolutionPolicy {
    #[serde(rename = "fixed_resolution")]
    pub resolution: u64,
}

impl FixedResolutionPolicy {
    pub fn new(resolution: u64) -> Result<Self> {
        if resolution == 0 {
            return Err(HstratError::invalid_param("fixed_resolution", 0.0));
        }
        Ok(Self { resolution })
    }
}

impl StratumRetentionPolicy for FixedResolutionPolicy {
    fn gen_drop_ranks(
        &self,
        num_stratum_depositions_completed: u64,
        retained_ranks: &[u64],
        _rng: &mut dyn RngCore,
    ) -> Vec<u64> {
        let newest_rank = num_stratum_depositions_completed;
        retained_ranks
            .iter()
            .copied()
            .filter(|&rank| rank % self.resolution != 0 && rank != newest_rank)
            .collect()
    }

    fn iter_retained_ranks(
        &self,
        num_strata_deposited: u64,
    ) -> Option<Box<dyn Iterator<Item = u64> + '_>> {
        if num_strata_deposited == 0 {
            return Some(Box::new(std::iter::empty()));
        }
        let newest_rank = num_strata_deposited - 1;
        let resolution = self.resolution;
        let aligned = (0..=newest_rank / resolution).map(move |i| i * resolution);
        let unaligned_newest = (newest_rank % resolution != 0).then_some(newest_rank);
        Some(Box::new(aligned.chain(unaligned_newest)))
    }

    fn calc_num_strata_retained_exact(&self, num_strata_deposited: u64) -> Option<u64> {
        if num_strata_deposited == 0 {
            return Some(0);
        }
        let newest_rank = num_strata_deposited - 1;
        let aligned_count = newest_rank / self.resolution + 1;
        let extra = u64::from(newest_rank % self.resolution != 0);
        Some(aligned_count + extra)
    }

    fn calc_num_strata_retained_upper_bound(&self, num_strata_deposited: u64) -> u64 {
        self.calc_num_strata_retained_exact(num_strata_deposited)
            .unwrap_or(num_strata_deposited)
    }

    fn calc_rank_at_column_index(&self, index: usize, num_strata_deposited: u64) -> Option<u64> {
        let num_retained = self.calc_num_strata_retained_exact(num_strata_deposited)?;
        let index = index as u64;
        if index >= num_retained {
            None
        } else if index + 1 == num_retained {
            Some(num_strata_deposited - 1)
        } else {
            Some(index * self.resolution)
        }
    }

    fn calc_mrca_uncertainty_abs_upper_bound(
        &self,
        first_num_strata_deposited: u64,
        second_num_strata_deposited: u64,
        actual_rank_of_mrca: u64,
    ) -> u64 {
        clamp_mrca_uncertainty(
            self.resolution - 1,
            first_num_strata_deposited,
            second_num_strata_deposited,
            actual_rank_of_mrca,
        )
    }

    fn algo_identifier(&self) -> &'static str {
        "fixed_resolution_algo"
    }
}
