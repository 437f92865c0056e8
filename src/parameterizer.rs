//! Inverse search of a policy's integer parameter so that an evaluated
//! property, such as retained count or MRCA uncertainty, meets a target.

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::errors::{HstratError, Result};
use crate::policies::StratumRetentionPolicy;

/// Requirement on an evaluated policy property.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParameterTarget {
    AtLeast(f64),
    AtMost(f64),
    Exactly(f64),
}

impl ParameterTarget {
    pub fn is_met_by(&self, value: f64) -> bool {
        match *self {
            Self::AtLeast(target) => value >= target,
            Self::AtMost(target) => value <= target,
            Self::Exactly(target) => value == target,
        }
    }
}

impl fmt::Display for ParameterTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AtLeast(target) => write!(f, ">= {target}"),
            Self::AtMost(target) => write!(f, "<= {target}"),
            Self::Exactly(target) => write!(f, "== {target}"),
        }
    }
}

/// Property of a policy that the parameterizer steers.
pub trait PolicyEvaluator<P> {
    fn evaluate(&self, policy: &P) -> f64;
}

/// Exact retained count after `at_num_strata_deposited` depositions,
/// falling back to the upper bound when the policy cannot predict it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NumStrataRetainedExactEvaluator {
    pub at_num_strata_deposited: u64,
}

impl<P: StratumRetentionPolicy> PolicyEvaluator<P> for NumStrataRetainedExactEvaluator {
    fn evaluate(&self, policy: &P) -> f64 {
        let n = self.at_num_strata_deposited;
        policy
            .calc_num_strata_retained_exact(n)
            .unwrap_or_else(|| policy.calc_num_strata_retained_upper_bound(n)) as f64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NumStrataRetainedUpperBoundEvaluator {
    pub at_num_strata_deposited: u64,
}

impl<P: StratumRetentionPolicy> PolicyEvaluator<P> for NumStrataRetainedUpperBoundEvaluator {
    fn evaluate(&self, policy: &P) -> f64 {
        policy.calc_num_strata_retained_upper_bound(self.at_num_strata_deposited) as f64
    }
}

/// Absolute MRCA uncertainty bound between two columns of depth
/// `at_num_strata_deposited` whose MRCA sits at `at_rank`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MrcaUncertaintyAbsUpperBoundEvaluator {
    pub at_num_strata_deposited: u64,
    pub at_rank: u64,
}

impl<P: StratumRetentionPolicy> PolicyEvaluator<P> for MrcaUncertaintyAbsUpperBoundEvaluator {
    fn evaluate(&self, policy: &P) -> f64 {
        let n = self.at_num_strata_deposited;
        policy.calc_mrca_uncertainty_abs_upper_bound(n, n, self.at_rank) as f64
    }
}

/// Relative counterpart of [`MrcaUncertaintyAbsUpperBoundEvaluator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MrcaUncertaintyRelUpperBoundEvaluator {
    pub at_num_strata_deposited: u64,
    pub at_rank: u64,
}

impl<P: StratumRetentionPolicy> PolicyEvaluator<P> for MrcaUncertaintyRelUpperBoundEvaluator {
    fn evaluate(&self, policy: &P) -> f64 {
        let n = self.at_num_strata_deposited;
        policy.calc_mrca_uncertainty_rel_upper_bound(n, n, self.at_rank)
    }
}

/// Closure evaluator.
#[derive(Clone, Copy, Debug)]
pub struct FnEvaluator<F>(pub F);

impl<P, F: Fn(&P) -> f64> PolicyEvaluator<P> for FnEvaluator<F> {
    fn evaluate(&self, policy: &P) -> f64 {
        (self.0)(policy)
    }
}

/// Searches `[lower, upper]` for a parameter whose policy meets a target.
///
/// The evaluated property must be monotonic in the parameter. Meeting the
/// target picks the smallest satisfying parameter when larger parameters
/// make it easier and the largest one otherwise.
pub struct PolicyParameterizer<F> {
    factory: F,
    lower: u64,
    upper: u64,
}

impl<P, F> PolicyParameterizer<F>
where
    P: StratumRetentionPolicy,
    F: Fn(u64) -> Result<P>,
{
    pub fn new(factory: F, lower: u64, upper: u64) -> Result<Self> {
        if lower > upper {
            return Err(HstratError::invalid_param("parameter_upper_bound", upper as f64));
        }
        Ok(Self {
            factory,
            lower,
            upper,
        })
    }

    pub fn parameterize(
        &self,
        target: ParameterTarget,
        evaluator: &impl PolicyEvaluator<P>,
    ) -> Result<u64> {
        let mut memo = Memo {
            factory: &self.factory,
            evaluator,
            evaluated: BTreeMap::new(),
        };
        let found = self.search(&mut memo, target)?;
        match found {
            Some(parameter) => {
                debug!(parameter, %target, "parameterized policy");
                Ok(parameter)
            }
            None => Err(HstratError::UnsatisfiableParameterization {
                lower: self.lower,
                upper: self.upper,
                target: target.to_string(),
            }),
        }
    }

    /// Parameterize, then build the policy.
    pub fn build(
        &self,
        target: ParameterTarget,
        evaluator: &impl PolicyEvaluator<P>,
    ) -> Result<P> {
        (self.factory)(self.parameterize(target, evaluator)?)
    }

    fn search<E: PolicyEvaluator<P>>(
        &self,
        memo: &mut Memo<'_, F, E>,
        target: ParameterTarget,
    ) -> Result<Option<u64>> {
        let (lower, upper) = (self.lower, self.upper);
        let baseline = memo.value(lower)?;
        let Some(increasing) = memo.detect_direction(lower, upper, baseline)? else {
            return Ok(target.is_met_by(baseline).then_some(lower));
        };

        match (target, increasing) {
            (ParameterTarget::AtLeast(t), true) => {
                search_first_true(lower, upper, |p| Ok(memo.value(p)? >= t))
            }
            (ParameterTarget::AtLeast(t), false) => {
                search_last_true(lower, upper, |p| Ok(memo.value(p)? >= t))
            }
            (ParameterTarget::AtMost(t), true) => {
                search_last_true(lower, upper, |p| Ok(memo.value(p)? <= t))
            }
            (ParameterTarget::AtMost(t), false) => {
                search_first_true(lower, upper, |p| Ok(memo.value(p)? <= t))
            }
            (ParameterTarget::Exactly(t), increasing) => {
                let boundary = if increasing {
                    search_first_true(lower, upper, |p| Ok(memo.value(p)? >= t))?
                } else {
                    search_last_true(lower, upper, |p| Ok(memo.value(p)? >= t))?
                };
                if let Some(p) = boundary {
                    if memo.value(p)? == t {
                        return Ok(Some(p));
                    }
                }
                Ok(memo.find_evaluated(t))
            }
        }
    }
}

struct Memo<'a, F, E> {
    factory: &'a F,
    evaluator: &'a E,
    evaluated: BTreeMap<u64, f64>,
}

impl<P, F, E> Memo<'_, F, E>
where
    F: Fn(u64) -> Result<P>,
    E: PolicyEvaluator<P>,
{
    fn value(&mut self, parameter: u64) -> Result<f64> {
        if let Some(&value) = self.evaluated.get(&parameter) {
            return Ok(value);
        }
        let value = self.evaluator.evaluate(&(self.factory)(parameter)?);
        self.evaluated.insert(parameter, value);
        Ok(value)
    }

    /// Compare against the first doubling probe whose value differs from
    /// the lower bound's. `None` when the evaluator looks flat.
    fn detect_direction(&mut self, lower: u64, upper: u64, baseline: f64) -> Result<Option<bool>> {
        let mut step = 1u64;
        while lower < upper {
            let probe = lower.saturating_add(step).min(upper);
            let value = self.value(probe)?;
            if value != baseline {
                return Ok(Some(value > baseline));
            }
            if probe == upper {
                break;
            }
            step = step.saturating_mul(2);
        }
        Ok(None)
    }

    fn find_evaluated(&self, target: f64) -> Option<u64> {
        self.evaluated
            .iter()
            .find(|&(_, &value)| value == target)
            .map(|(&parameter, _)| parameter)
    }
}

/// Smallest parameter in `[lower, upper]` satisfying `pred`, which must
/// flip from false to true at most once. Gallops, then bisects.
fn search_first_true(
    lower: u64,
    upper: u64,
    mut pred: impl FnMut(u64) -> Result<bool>,
) -> Result<Option<u64>> {
    if pred(lower)? {
        return Ok(Some(lower));
    }
    let mut failing = lower;
    let mut step = 1u64;
    let mut passing = loop {
        let probe = lower.saturating_add(step).min(upper);
        if pred(probe)? {
            break probe;
        }
        if probe == upper {
            return Ok(None);
        }
        failing = probe;
        step = step.saturating_mul(2);
    };
    while passing - failing > 1 {
        let mid = failing + (passing - failing) / 2;
        if pred(mid)? {
            passing = mid;
        } else {
            failing = mid;
        }
    }
    Ok(Some(passing))
}

/// Largest parameter in `[lower, upper]` satisfying `pred`, which must
/// flip from true to false at most once.
fn search_last_true(
    lower: u64,
    upper: u64,
    mut pred: impl FnMut(u64) -> Result<bool>,
) -> Result<Option<u64>> {
    if !pred(lower)? {
        return Ok(None);
    }
    let first_failing = search_first_true(lower, upper, |p| pred(p).map(|ok| !ok))?;
    Ok(Some(first_failing.map_or(upper, |p| p - 1)))
}
