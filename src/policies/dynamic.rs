use rand::RngCore;
use serde::Serialize;
use serde_json::Value;

use super::*;
use crate::errors::{HstratError, Result};

/// A runtime-dispatched wrapper over all 11 stratum retention policy types.
///
/// `DynamicPolicy` enables selecting a policy at runtime rather than at compile
/// time, e.g. when restoring a column from a [`ColumnRecord`]. Each trait
/// method delegates to the inner variant via a `match` dispatch. Serializes
/// as the inner policy's parameters.
///
/// [`ColumnRecord`]: crate::serialization::ColumnRecord
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DynamicPolicy {
    FixedResolution(FixedResolutionPolicy),
    RecencyProportional(RecencyProportionalPolicy),
    CurbedRecencyProportional(CurbedRecencyProportionalPolicy),
    GeometricSeqNthRoot(GeometricSeqNthRootPolicy),
    GeometricSeqNthRootTapered(GeometricSeqNthRootTaperedPolicy),
    DepthProportional(DepthProportionalPolicy),
    DepthProportionalTapered(DepthProportionalTaperedPolicy),
    NominalResolution(NominalResolutionPolicy),
    PerfectResolution(PerfectResolutionPolicy),
    Pseudostochastic(PseudostochasticPolicy),
    Stochastic(StochasticPolicy),
}

/// Helper macro that dispatches a method call to the inner policy variant.
macro_rules! dispatch {
    ($self:expr, $method:ident $(, $arg:expr)*) => {
        match $self {
            DynamicPolicy::FixedResolution(p) => p.$method($($arg),*),
            DynamicPolicy::RecencyProportional(p) => p.$method($($arg),*),
            DynamicPolicy::CurbedRecencyProportional(p) => p.$method($($arg),*),
            DynamicPolicy::GeometricSeqNthRoot(p) => p.$method($($arg),*),
            DynamicPolicy::GeometricSeqNthRootTapered(p) => p.$method($($arg),*),
            DynamicPolicy::DepthProportional(p) => p.$method($($arg),*),
            DynamicPolicy::DepthProportionalTapered(p) => p.$method($($arg),*),
            DynamicPolicy::NominalResolution(p) => p.$method($($arg),*),
            DynamicPolicy::PerfectResolution(p) => p.$method($($arg),*),
            DynamicPolicy::Pseudostochastic(p) => p.$method($($arg),*),
            DynamicPolicy::Stochastic(p) => p.$method($($arg),*),
        }
    };
}

impl DynamicPolicy {
    /// Build a validated policy from its algorithm identifier and structured
    /// parameters, as stored in a column record.
    pub fn from_spec(algo_identifier: &str, spec: &Value) -> Result<Self> {
        let policy = match algo_identifier {
            "perfect_resolution_algo" => PerfectResolutionPolicy::new().into(),
            "nominal_resolution_algo" => NominalResolutionPolicy::new().into(),
            "fixed_resolution_algo" => {
                FixedResolutionPolicy::new(param_u64(spec, "fixed_resolution")?)?.into()
            }
            "depth_proportional_resolution_algo" => DepthProportionalPolicy::new(param_u64(
                spec,
                "depth_proportional_resolution",
            )?)?
            .into(),
            "depth_proportional_resolution_tapered_algo" => DepthProportionalTaperedPolicy::new(
                param_u64(spec, "depth_proportional_resolution")?,
            )?
            .into(),
            "recency_proportional_resolution_algo" => RecencyProportionalPolicy::new(param_u64(
                spec,
                "recency_proportional_resolution",
            )?)
            .into(),
            "recency_proportional_resolution_curbed_algo" => {
                CurbedRecencyProportionalPolicy::new(param_u64(spec, "size_curb")?)?.into()
            }
            "geom_seq_nth_root_algo" => GeometricSeqNthRootPolicy::new(
                param_u64(spec, "degree")?,
                param_u64(spec, "interspersal")?,
            )?
            .into(),
            "geom_seq_nth_root_tapered_algo" => GeometricSeqNthRootTaperedPolicy::new(
                param_u64(spec, "degree")?,
                param_u64(spec, "interspersal")?,
            )?
            .into(),
            "pseudostochastic_algo" => {
                PseudostochasticPolicy::new(param_u64(spec, "hash_salt")?).into()
            }
            "stochastic_algo" => {
                let probability = spec
                    .get("retention_probability")
                    .and_then(Value::as_f64)
                    .ok_or_else(|| missing_param("retention_probability"))?;
                StochasticPolicy::new(probability)?.into()
            }
            unknown => return Err(HstratError::UnknownPolicyAlgorithm(unknown.to_string())),
        };
        Ok(policy)
    }

    /// Structured parameters of the wrapped policy.
    pub fn to_spec(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

fn param_u64(spec: &Value, name: &str) -> Result<u64> {
    spec.get(name)
        .and_then(Value::as_u64)
        .ok_or_else(|| missing_param(name))
}

fn missing_param(name: &str) -> HstratError {
    HstratError::DeserializationError(format!("policy spec lacks numeric '{name}'"))
}

impl StratumRetentionPolicy for DynamicPolicy {
    fn gen_drop_ranks(
        &self,
        num_stratum_depositions_completed: u64,
        retained_ranks: &[u64],
        rng: &mut dyn RngCore,
    ) -> Vec<u64> {
        dispatch!(
            self,
            gen_drop_ranks,
            num_stratum_depositions_completed,
            retained_ranks,
            rng
        )
    }

    fn iter_retained_ranks(
        &self,
        num_strata_deposited: u64,
    ) -> Option<Box<dyn Iterator<Item = u64> + '_>> {
        dispatch!(self, iter_retained_ranks, num_strata_deposited)
    }

    fn calc_num_strata_retained_exact(&self, num_strata_deposited: u64) -> Option<u64> {
        dispatch!(self, calc_num_strata_retained_exact, num_strata_deposited)
    }

    fn calc_num_strata_retained_upper_bound(&self, num_strata_deposited: u64) -> u64 {
        dispatch!(self, calc_num_strata_retained_upper_bound, num_strata_deposited)
    }

    fn calc_rank_at_column_index(&self, index: usize, num_strata_deposited: u64) -> Option<u64> {
        dispatch!(self, calc_rank_at_column_index, index, num_strata_deposited)
    }

    fn calc_mrca_uncertainty_abs_upper_bound(
        &self,
        first_num_strata_deposited: u64,
        second_num_strata_deposited: u64,
        actual_rank_of_mrca: u64,
    ) -> u64 {
        dispatch!(
            self,
            calc_mrca_uncertainty_abs_upper_bound,
            first_num_strata_deposited,
            second_num_strata_deposited,
            actual_rank_of_mrca
        )
    }

    fn calc_mrca_uncertainty_rel_upper_bound(
        &self,
        first_num_strata_deposited: u64,
        second_num_strata_deposited: u64,
        actual_rank_of_mrca: u64,
    ) -> f64 {
        dispatch!(
            self,
            calc_mrca_uncertainty_rel_upper_bound,
            first_num_strata_deposited,
            second_num_strata_deposited,
            actual_rank_of_mrca
        )
    }

    fn algo_identifier(&self) -> &'static str {
        dispatch!(self, algo_identifier)
    }
}

// Convenience From impls for each variant.
impl From<FixedResolutionPolicy> for DynamicPolicy {
    fn from(p: FixedResolutionPolicy) -> Self {
        DynamicPolicy::FixedResolution(p)
    }
}

impl From<RecencyProportionalPolicy> for DynamicPolicy {
    fn from(p: RecencyProportionalPolicy) -> Self {
        DynamicPolicy::RecencyProportional(p)
    }
}

impl From<CurbedRecencyProportionalPolicy> for DynamicPolicy {
    fn from(p: CurbedRecencyProportionalPolicy) -> Self {
        DynamicPolicy::CurbedRecencyProportional(p)
    }
}

impl From<GeometricSeqNthRootPolicy> for DynamicPolicy {
    fn from(p: GeometricSeqNthRootPolicy) -> Self {
        DynamicPolicy::GeometricSeqNthRoot(p)
    }
}

impl From<GeometricSeqNthRootTaperedPolicy> for DynamicPolicy {
    fn from(p: GeometricSeqNthRootTaperedPolicy) -> Self {
        DynamicPolicy::GeometricSeqNthRootTapered(p)
    }
}

impl From<DepthProportionalPolicy> for DynamicPolicy {
    fn from(p: DepthProportionalPolicy) -> Self {
        DynamicPolicy::DepthProportional(p)
    }
}

impl From<DepthProportionalTaperedPolicy> for DynamicPolicy {
    fn from(p: DepthProportionalTaperedPolicy) -> Self {
        DynamicPolicy::DepthProportionalTapered(p)
    }
}

impl From<NominalResolutionPolicy> for DynamicPolicy {
    fn from(p: NominalResolutionPolicy) -> Self {
        DynamicPolicy::NominalResolution(p)
    }
}

impl From<PerfectResolutionPolicy> for DynamicPolicy {
    fn from(p: PerfectResolutionPolicy) -> Self {
        DynamicPolicy::PerfectResolution(p)
    }
}

impl From<PseudostochasticPolicy> for DynamicPolicy {
    fn from(p: PseudostochasticPolicy) -> Self {
        DynamicPolicy::Pseudostochastic(p)
    }
}

impl From<StochasticPolicy> for DynamicPolicy {
    fn from(p: StochasticPolicy) -> Self {
        DynamicPolicy::Stochastic(p)
    }
}
