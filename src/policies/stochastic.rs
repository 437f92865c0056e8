use rand::{Rng, RngCore};
use serde::Serialize;

use super::clamp_mrca_uncertainty;
use super::r#trait::StratumRetentionPolicy;
use crate::errors::{HstratError, Result};

/// Stochastic retention policy.
///
/// Retains first (rank 0) and last (newest) strata always. When a stratum
/// stops being the newest it survives with probability
/// `retention_probability`, drawn from the column's RNG; survivors are never
/// dropped afterwards. Retained ranks depend on the draws, so there is no
/// closed form for them. A poor choice outside of testing.
///
/// `PartialEq` is implemented via bitwise f64 comparison to avoid
/// floating-point equality pitfalls.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct StochasticPolicy {
    pub retention_probability: f64,
}

impl Default for StochasticPolicy {
    fn default() -> Self {
        Self {
            retention_probability: 0.5,
        }
    }
}

impl StochasticPolicy {
    pub fn new(retention_probability: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&retention_probability) {
            return Err(HstratError::invalid_param(
                "retention_probability",
                retention_probability,
            ));
        }
        Ok(Self {
            retention_probability,
        })
    }
}

impl PartialEq for StochasticPolicy {
    fn eq(&self, other: &Self) -> bool {
        self.retention_probability.to_bits() == other.retention_probability.to_bits()
    }
}

impl StratumRetentionPolicy for StochasticPolicy {
    fn gen_drop_ranks(
        &self,
        num_stratum_depositions_completed: u64,
        retained_ranks: &[u64],
        rng: &mut dyn RngCore,
    ) -> Vec<u64> {
        let Some(second_most_recent) = num_stratum_depositions_completed.checked_sub(1) else {
            return Vec::new();
        };
        if second_most_recent == 0 || retained_ranks.binary_search(&second_most_recent).is_err() {
            return Vec::new();
        }
        if rng.gen_bool(self.retention_probability) {
            Vec::new()
        } else {
            vec![second_most_recent]
        }
    }

    fn calc_num_strata_retained_exact(&self, _num_strata_deposited: u64) -> Option<u64> {
        None
    }

    fn calc_num_strata_retained_upper_bound(&self, num_strata_deposited: u64) -> u64 {
        num_strata_deposited
    }

    fn calc_mrca_uncertainty_abs_upper_bound(
        &self,
        first_num_strata_deposited: u64,
        second_num_strata_deposited: u64,
        actual_rank_of_mrca: u64,
    ) -> u64 {
        clamp_mrca_uncertainty(
            u64::MAX,
            first_num_strata_deposited,
            second_num_strata_deposited,
            actual_rank_of_mrca,
        )
    }

    fn algo_identifier(&self) -> &'static str {
        "stochastic_algo"
    }
}
