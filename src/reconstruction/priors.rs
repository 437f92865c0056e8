use crate::errors::{HstratError, Result};

/// Belief about where the MRCA falls, used to weigh the intervals between
/// coincident retained ranks.
///
/// Intervals are half-open rank ranges `[begin, end)`.
pub trait Prior: Send + Sync {
    /// Unnormalized weight proportional to the probability that the MRCA
    /// falls in `[begin, end)`.
    fn calc_interval_probability_proxy(&self, begin: u64, end: u64) -> f64;

    /// Natural log of [`calc_interval_probability_proxy`](Self::calc_interval_probability_proxy).
    ///
    /// Estimators weigh intervals in log space, so priors whose proxy can
    /// leave `f64` range should compute this directly.
    fn calc_interval_log_probability_proxy(&self, begin: u64, end: u64) -> f64 {
        libm::log(self.calc_interval_probability_proxy(begin, end))
    }

    /// Expected MRCA rank conditioned on it falling in `[begin, end)`.
    fn calc_interval_conditioned_mean(&self, begin: u64, end: u64) -> f64;
}

fn interval_midpoint(begin: u64, end: u64) -> f64 {
    (begin as f64 + end as f64 - 1.0) / 2.0
}

/// Non-informative prior: every interval weighs the same regardless of
/// its width.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ArbitraryPrior;

impl Prior for ArbitraryPrior {
    fn calc_interval_probability_proxy(&self, _begin: u64, _end: u64) -> f64 {
        1.0
    }

    fn calc_interval_conditioned_mean(&self, begin: u64, end: u64) -> f64 {
        interval_midpoint(begin, end)
    }
}

/// Every rank equally likely, so an interval weighs its width.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UniformPrior;

impl Prior for UniformPrior {
    fn calc_interval_probability_proxy(&self, begin: u64, end: u64) -> f64 {
        (end - begin) as f64
    }

    fn calc_interval_conditioned_mean(&self, begin: u64, end: u64) -> f64 {
        interval_midpoint(begin, end)
    }
}

/// Population growing as `growth_factor^rank`, favouring recent ranks when
/// `growth_factor > 1`. A factor of 1 behaves as [`UniformPrior`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExponentialPrior {
    growth_factor: f64,
}

impl ExponentialPrior {
    pub fn new(growth_factor: f64) -> Result<Self> {
        if !(growth_factor.is_finite() && growth_factor > 0.0) {
            return Err(HstratError::invalid_param("growth_factor", growth_factor));
        }
        Ok(Self { growth_factor })
    }

    pub fn growth_factor(&self) -> f64 {
        self.growth_factor
    }

    fn is_uniform(&self) -> bool {
        (self.growth_factor - 1.0).abs() < f64::EPSILON
    }
}

impl Prior for ExponentialPrior {
    /// `sum(g^rank for rank in begin..end)`, which overflows or underflows
    /// for distant ranks; see the log form.
    fn calc_interval_probability_proxy(&self, begin: u64, end: u64) -> f64 {
        if self.is_uniform() {
            return end.saturating_sub(begin) as f64;
        }
        libm::exp(self.calc_interval_log_probability_proxy(begin, end))
    }

    fn calc_interval_log_probability_proxy(&self, begin: u64, end: u64) -> f64 {
        if end <= begin {
            return f64::NEG_INFINITY;
        }
        let width = (end - begin) as f64;
        if self.is_uniform() {
            return libm::log(width);
        }
        // ln(g^begin * (g^w - 1) / (g - 1)), with both factors of the ratio
        // taken as positive magnitudes so g < 1 works too.
        let ln_g = libm::log(self.growth_factor);
        let span = width * ln_g;
        let ln_numerator = if span > 0.0 {
            // ln(e^x - 1) = x + ln(1 - e^-x), safe once e^x overflows.
            span + libm::log1p(-libm::exp(-span))
        } else {
            libm::log(-libm::expm1(span))
        };
        let ln_denominator = libm::log(libm::expm1(ln_g).abs());
        begin as f64 * ln_g + ln_numerator - ln_denominator
    }

    fn calc_interval_conditioned_mean(&self, begin: u64, end: u64) -> f64 {
        if self.is_uniform() || end <= begin {
            return interval_midpoint(begin, end);
        }
        // Mean of x over [0, w) weighted by g^x, shifted to begin:
        //   (g^w (w ln g - 1) + 1) / (ln g (g^w - 1))
        let width = (end - begin) as f64;
        let ln_g = libm::log(self.growth_factor);
        let g_w = libm::pow(self.growth_factor, width);
        let offset = (g_w * (width * ln_g - 1.0) + 1.0) / (ln_g * (g_w - 1.0));
        if offset.is_finite() {
            begin as f64 + offset
        } else if ln_g > 0.0 {
            // g^w overflowed; mass concentrates 1/ln g below the end.
            end as f64 - ln_g.recip()
        } else {
            begin as f64 - ln_g.recip()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arbitrary_prior_weighs_intervals_equally() {
        let p = ArbitraryPrior;
        assert_eq!(p.calc_interval_probability_proxy(0, 100), 1.0);
        assert_eq!(p.calc_interval_probability_proxy(50, 51), 1.0);
        assert_eq!(p.calc_interval_conditioned_mean(0, 10), 4.5);
        assert_eq!(p.calc_interval_conditioned_mean(5, 6), 5.0);
    }

    #[test]
    fn uniform_prior_proxy_is_width() {
        let p = UniformPrior;
        assert_eq!(p.calc_interval_probability_proxy(0, 10), 10.0);
        assert_eq!(p.calc_interval_probability_proxy(3, 7), 4.0);
    }

    #[test]
    fn exponential_prior_rejects_bad_growth() {
        assert!(ExponentialPrior::new(0.0).is_err());
        assert!(ExponentialPrior::new(-1.5).is_err());
        assert!(ExponentialPrior::new(f64::INFINITY).is_err());
        assert_eq!(ExponentialPrior::new(1.1).unwrap().growth_factor(), 1.1);
    }

    #[test]
    fn exponential_prior_growth_factor_1_is_uniform() {
        let exp = ExponentialPrior::new(1.0).unwrap();
        for (b, e) in [(0u64, 10u64), (5, 20), (100, 200)] {
            assert_eq!(
                exp.calc_interval_probability_proxy(b, e),
                UniformPrior.calc_interval_probability_proxy(b, e)
            );
            assert_eq!(
                exp.calc_interval_conditioned_mean(b, e),
                UniformPrior.calc_interval_conditioned_mean(b, e)
            );
        }
    }

    #[test]
    fn exponential_prior_mean_leans_with_growth() {
        let growing = ExponentialPrior::new(2.0).unwrap();
        let shrinking = ExponentialPrior::new(0.5).unwrap();
        let mean = growing.calc_interval_conditioned_mean(0, 100);
        assert!(mean > 49.5 && mean < 100.0, "mean={mean}");
        let mean = shrinking.calc_interval_conditioned_mean(0, 100);
        assert!(mean < 49.5 && mean >= 0.0, "mean={mean}");
        assert!(growing.calc_interval_probability_proxy(5, 6) > 0.0);
    }

    #[test]
    fn exponential_proxy_sums_rank_weights() {
        for g in [0.5, 0.9, 1.3, 2.0] {
            let exp = ExponentialPrior::new(g).unwrap();
            for (b, e) in [(0u64, 1u64), (3, 9), (10, 40)] {
                let direct: f64 = (b..e).map(|rank| libm::pow(g, rank as f64)).sum();
                let proxy = exp.calc_interval_probability_proxy(b, e);
                assert!(proxy > 0.0, "g={g} [{b}, {e})");
                assert!((proxy / direct - 1.0).abs() < 1e-9, "g={g}: {proxy} vs {direct}");
            }
        }
    }

    #[test]
    fn exponential_log_proxy_finite_at_distant_ranks() {
        let shrinking = ExponentialPrior::new(0.9).unwrap();
        let growing = ExponentialPrior::new(2.0).unwrap();
        for prior in [shrinking, growing] {
            let near = prior.calc_interval_log_probability_proxy(2_000, 2_010);
            let far = prior.calc_interval_log_probability_proxy(1_990, 2_000);
            assert!(near.is_finite() && far.is_finite());
            // Adjacent equal-width intervals differ by g^10.
            let expected = 10.0 * libm::log(prior.growth_factor());
            assert!((near - far - expected).abs() < 1e-6, "{near} - {far}");
        }
        assert!(growing
            .calc_interval_log_probability_proxy(0, 1_000_000)
            .is_finite());
        assert_eq!(
            UniformPrior.calc_interval_log_probability_proxy(4, 8),
            libm::log(4.0)
        );
    }

    #[test]
    fn exponential_prior_mean_survives_overflow() {
        let exp = ExponentialPrior::new(1.5).unwrap();
        let mean = exp.calc_interval_conditioned_mean(1_000, 100_000);
        assert!(mean.is_finite());
        assert!(mean > 99_990.0 && mean < 100_000.0, "mean={mean}");
    }
}
