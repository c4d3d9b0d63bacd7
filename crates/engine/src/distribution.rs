//! Demand distribution policy.
//!
//! Quantile forecasts, safety stock and stockout risk are all expressed as
//! `mean + z * stddev` for a standardized location-scale distribution. The
//! default is the normal approximation; callers with heavily skewed or
//! intermittent demand can plug in another distribution, and it is then used
//! consistently by every component that is generic over it.

use statrs::distribution::{ContinuousCDF, Normal};

/// A standardized (mean 0, scale 1) continuous distribution.
pub trait StandardizedDistribution: Send + Sync + core::fmt::Debug {
    /// Inverse CDF for `p` in (0, 1).
    fn quantile(&self, p: f64) -> f64;

    /// CDF at `x`.
    fn cdf(&self, x: f64) -> f64;

    /// Stable name recorded alongside results.
    fn name(&self) -> &'static str;
}

/// Standard normal distribution, evaluated with `statrs`.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct NormalApproximation;

impl StandardizedDistribution for NormalApproximation {
    fn quantile(&self, p: f64) -> f64 {
        // statrs panics outside [0, 1]; the median is exact by symmetry.
        if p.is_nan() {
            f64::NAN
        } else if p <= 0.0 {
            f64::NEG_INFINITY
        } else if p >= 1.0 {
            f64::INFINITY
        } else if p == 0.5 {
            0.0
        } else {
            Normal::standard().inverse_cdf(p)
        }
    }

    fn cdf(&self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        Normal::standard().cdf(x)
    }

    fn name(&self) -> &'static str {
        "normal"
    }
}
