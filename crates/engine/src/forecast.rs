use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use stockcast_core::{Period, SeriesKey, SkuCode, StoreCode};

use crate::config::ForecastConfig;
use crate::distribution::{NormalApproximation, StandardizedDistribution};
use crate::error::{EngineError, EngineResult};
use crate::observation::{DemandObservation, prepare_series};
use crate::stats::{mean, stddev_sample};

/// Caller-supplied multiplicative demand adjustment (promotion, weather, ...).
///
/// The engine does no causal modelling; it only applies the factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExogenousAdjustment {
    pub label: String,
    pub factor: f64,
}

impl ExogenousAdjustment {
    pub fn new(label: impl Into<String>, factor: f64) -> Self {
        Self {
            label: label.into(),
            factor,
        }
    }
}

/// Parameters of a single forecast run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub horizon_periods: u32,
    /// Extra quantile levels to report, each in (0, 1). P50/P90 are always produced.
    pub confidence_levels: Vec<f64>,
    #[serde(default)]
    pub adjustments: Vec<ExogenousAdjustment>,
    pub generated_at: DateTime<Utc>,
}

impl ForecastRequest {
    pub fn new(horizon_periods: u32, generated_at: DateTime<Utc>) -> Self {
        Self {
            horizon_periods,
            confidence_levels: vec![0.5, 0.9],
            adjustments: Vec::new(),
            generated_at,
        }
    }

    pub fn with_confidence_levels(mut self, levels: impl Into<Vec<f64>>) -> Self {
        self.confidence_levels = levels.into();
        self
    }

    pub fn with_adjustment(mut self, adjustment: ExogenousAdjustment) -> Self {
        self.adjustments.push(adjustment);
        self
    }

    fn validate(&self) -> EngineResult<()> {
        if self.horizon_periods == 0 {
            return Err(EngineError::forecast_input("horizon_periods must be positive"));
        }
        for &level in &self.confidence_levels {
            if !(level > 0.0 && level < 1.0) {
                return Err(EngineError::forecast_input(format!(
                    "confidence level {level} is outside (0, 1)"
                )));
            }
        }
        for adj in &self.adjustments {
            if !(adj.factor.is_finite() && adj.factor >= 0.0) {
                return Err(EngineError::forecast_input(format!(
                    "adjustment '{}' has invalid factor {}",
                    adj.label, adj.factor
                )));
            }
        }
        Ok(())
    }

    fn adjustment_factor(&self) -> f64 {
        self.adjustments.iter().map(|a| a.factor).product()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileForecast {
    pub level: f64,
    pub value: f64,
}

/// Lookup key of a forecast record (forecasts are never referenced by pointer).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForecastRef {
    pub sku: SkuCode,
    pub store: StoreCode,
    pub generated_at: DateTime<Utc>,
}

/// A probabilistic demand forecast for one (sku, store).
///
/// Demand figures are per-period rates over `horizon`. Records are append-only:
/// the current forecast is the one with the latest `generated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub sku: SkuCode,
    pub store: StoreCode,
    pub horizon: Period,
    pub horizon_periods: u32,
    /// Length of one demand period in days; fractional for sub-day buckets.
    pub period_days: f64,
    pub mean_demand: f64,
    pub p50: f64,
    pub p90: f64,
    pub quantiles: Vec<QuantileForecast>,
    /// Per-period residual standard deviation before horizon widening.
    pub residual_stddev: f64,
    pub observations_used: usize,
    pub adjustment_factor: f64,
    pub distribution: String,
    pub model_version: String,
    pub generated_at: DateTime<Utc>,
}

impl ForecastResult {
    pub fn key(&self) -> SeriesKey {
        SeriesKey::new(self.sku.clone(), self.store.clone())
    }

    pub fn reference(&self) -> ForecastRef {
        ForecastRef {
            sku: self.sku.clone(),
            store: self.store.clone(),
            generated_at: self.generated_at,
        }
    }

    /// Value of a requested quantile level, if it was part of the run.
    pub fn quantile(&self, level: f64) -> Option<f64> {
        self.quantiles
            .iter()
            .find(|q| (q.level - level).abs() < 1e-12)
            .map(|q| q.value)
    }
}

/// Level + dispersion demand model.
///
/// Model:
/// - Seed the level with the mean of the first `seed_periods` usable periods.
/// - Update the level by EWMA (`smoothing_alpha`) for every later period.
/// - Residuals are deviations from the seed inside the seed window and
///   one-step-ahead errors after it; dispersion is the sample stddev of the
///   trailing `residual_window` residuals.
/// - `quantile(p) = mean + z(p) * stddev * sqrt(horizon_periods)`, clamped at 0.
#[derive(Debug, Clone)]
pub struct ForecastModel<D = NormalApproximation> {
    config: ForecastConfig,
    distribution: D,
}

impl ForecastModel<NormalApproximation> {
    pub fn new(config: ForecastConfig) -> EngineResult<Self> {
        Self::with_distribution(config, NormalApproximation)
    }
}

impl<D: StandardizedDistribution> ForecastModel<D> {
    pub fn with_distribution(config: ForecastConfig, distribution: D) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { config, distribution })
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Fit the series and project it over the requested horizon.
    ///
    /// Pure: identical inputs produce identical output.
    pub fn forecast(
        &self,
        observations: &[DemandObservation],
        request: &ForecastRequest,
    ) -> EngineResult<ForecastResult> {
        request.validate()?;

        let required = self.config.min_periods;
        let series = prepare_series(observations)?.ok_or(EngineError::InsufficientData {
            required,
            available: 0,
        })?;

        if series.values.len() < required {
            return Err(EngineError::InsufficientData {
                required,
                available: series.values.len(),
            });
        }

        let (level, residuals) = fit_level(&series.values, self.config.smoothing_alpha, self.config.seed_periods);
        let start = residuals.len().saturating_sub(self.config.residual_window);
        let residual_stddev = stddev_sample(&residuals[start..]);

        let adjustment_factor = request.adjustment_factor();
        let mean_demand = (level * adjustment_factor).max(0.0);
        let spread = residual_stddev * adjustment_factor * f64::from(request.horizon_periods).sqrt();

        let quantile_at = |p: f64| -> f64 {
            if spread <= 0.0 {
                return mean_demand;
            }
            (mean_demand + self.distribution.quantile(p) * spread).max(0.0)
        };

        let p50 = quantile_at(0.5);
        let p90 = quantile_at(0.9).max(p50);
        let quantiles = request
            .confidence_levels
            .iter()
            .map(|&level| QuantileForecast {
                level,
                value: quantile_at(level),
            })
            .collect();

        let period_days = series.last_period.length_days();
        let horizon = series.last_period.following(request.horizon_periods)?;

        debug!(
            series = %series.key,
            observations = series.values.len(),
            mean = mean_demand,
            p50,
            p90,
            residual_stddev,
            "demand forecast computed"
        );

        Ok(ForecastResult {
            sku: series.key.sku,
            store: series.key.store,
            horizon,
            horizon_periods: request.horizon_periods,
            period_days,
            mean_demand,
            p50,
            p90,
            quantiles,
            residual_stddev,
            observations_used: series.values.len(),
            adjustment_factor,
            distribution: self.distribution.name().to_string(),
            model_version: self.config.model_version.clone(),
            generated_at: request.generated_at,
        })
    }
}

/// Returns the final level and the residual sequence.
fn fit_level(values: &[f64], alpha: f64, seed_periods: usize) -> (f64, Vec<f64>) {
    let seed_len = seed_periods.min(values.len());
    let seed = mean(&values[..seed_len]);

    let mut residuals: Vec<f64> = values[..seed_len].iter().map(|v| v - seed).collect();
    let mut level = seed;
    for &v in &values[seed_len..] {
        residuals.push(v - level);
        level = alpha * v + (1.0 - alpha) * level;
    }
    (level, residuals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn generated_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn daily(quantities: &[f64]) -> Vec<DemandObservation> {
        quantities
            .iter()
            .enumerate()
            .map(|(i, &q)| {
                DemandObservation::new(
                    SkuCode::new("SKU-1").unwrap(),
                    StoreCode::new("S1").unwrap(),
                    Period::days_from(t0() + Duration::days(i as i64), 1).unwrap(),
                    q,
                )
                .unwrap()
            })
            .collect()
    }

    fn model() -> ForecastModel {
        ForecastModel::new(ForecastConfig::default()).unwrap()
    }

    #[test]
    fn worked_example_matches_expected_quantiles() {
        let obs = daily(&[10.0, 12.0, 9.0, 11.0, 10.0, 13.0, 9.0, 12.0]);
        let req = ForecastRequest::new(1, generated_at()).with_confidence_levels(vec![0.5, 0.9]);

        let f = model().forecast(&obs, &req).unwrap();

        assert!((f.mean_demand - 10.75).abs() < 1e-9);
        assert!((f.p50 - 10.75).abs() < 1e-9);
        assert!((f.residual_stddev - 1.488_047_7).abs() < 1e-6);
        assert!((f.p90 - 12.657).abs() < 0.01);
        assert!(f.p90 > f.p50);
        assert_eq!(f.quantile(0.9), Some(f.p90));
        assert_eq!(f.observations_used, 8);
        assert_eq!(f.distribution, "normal");
    }

    #[test]
    fn horizon_follows_last_period() {
        let obs = daily(&[3.0, 4.0, 5.0]);
        let f = model().forecast(&obs, &ForecastRequest::new(7, generated_at())).unwrap();

        assert_eq!(f.horizon.start(), t0() + Duration::days(3));
        assert_eq!(f.horizon.end(), t0() + Duration::days(10));
        assert_eq!(f.period_days, 1.0);
        assert_eq!(f.generated_at, generated_at());
    }

    #[test]
    fn horizon_beyond_the_calendar_is_rejected() {
        let obs = daily(&[10.0, 12.0, 9.0, 11.0, 10.0, 13.0, 9.0, 12.0]);
        let err = model()
            .forecast(&obs, &ForecastRequest::new(u32::MAX, generated_at()))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidForecastInput(_)));
    }

    #[test]
    fn hourly_buckets_keep_their_length() {
        let obs: Vec<_> = (0..48)
            .map(|h| {
                DemandObservation::new(
                    SkuCode::new("SKU-1").unwrap(),
                    StoreCode::new("S1").unwrap(),
                    Period::starting_at(t0() + Duration::hours(h), Duration::hours(1)).unwrap(),
                    10.0,
                )
                .unwrap()
            })
            .collect();
        let f = model().forecast(&obs, &ForecastRequest::new(24, generated_at())).unwrap();

        assert!((f.period_days - 1.0 / 24.0).abs() < 1e-12);
        assert_eq!(f.horizon.start(), t0() + Duration::hours(48));
        assert_eq!(f.horizon.end(), t0() + Duration::hours(72));
        assert_eq!(f.mean_demand, 10.0);
    }

    #[test]
    fn flat_history_has_no_widening() {
        let obs = daily(&[5.0; 10]);
        let f = model().forecast(&obs, &ForecastRequest::new(4, generated_at())).unwrap();

        assert_eq!(f.residual_stddev, 0.0);
        assert_eq!(f.mean_demand, 5.0);
        assert_eq!(f.p50, 5.0);
        assert_eq!(f.p90, 5.0);
    }

    #[test]
    fn level_tracks_recent_demand_after_seed_window() {
        let mut q = vec![10.0; 8];
        q.extend([20.0, 20.0, 20.0]);
        let f = model().forecast(&daily(&q), &ForecastRequest::new(1, generated_at())).unwrap();

        // 10 -> 13 -> 15.1 -> 16.57
        assert!((f.mean_demand - 16.57).abs() < 1e-9);
    }

    #[test]
    fn too_few_periods_is_insufficient_data() {
        let err = model()
            .forecast(&daily(&[1.0, 2.0]), &ForecastRequest::new(1, generated_at()))
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::InsufficientData {
                required: 3,
                available: 2
            }
        );

        let err = model().forecast(&[], &ForecastRequest::new(1, generated_at())).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { available: 0, .. }));
    }

    #[test]
    fn request_parameters_are_validated() {
        let obs = daily(&[1.0, 2.0, 3.0]);

        let err = model().forecast(&obs, &ForecastRequest::new(0, generated_at())).unwrap_err();
        assert!(matches!(err, EngineError::InvalidForecastInput(_)));

        let req = ForecastRequest::new(1, generated_at()).with_confidence_levels(vec![0.5, 1.0]);
        assert!(model().forecast(&obs, &req).is_err());

        let req = ForecastRequest::new(1, generated_at()).with_adjustment(ExogenousAdjustment::new("promo", f64::NAN));
        assert!(model().forecast(&obs, &req).is_err());
    }

    #[test]
    fn adjustments_scale_mean_and_spread() {
        let obs = daily(&[10.0, 12.0, 9.0, 11.0, 10.0, 13.0, 9.0, 12.0]);
        let base = model().forecast(&obs, &ForecastRequest::new(1, generated_at())).unwrap();
        let req = ForecastRequest::new(1, generated_at()).with_adjustment(ExogenousAdjustment::new("promo", 1.5));
        let promo = model().forecast(&obs, &req).unwrap();

        assert!((promo.mean_demand - base.mean_demand * 1.5).abs() < 1e-9);
        assert!(((promo.p90 - promo.p50) - (base.p90 - base.p50) * 1.5).abs() < 1e-9);
        assert_eq!(promo.adjustment_factor, 1.5);
    }

    #[test]
    fn low_quantiles_are_clamped_at_zero() {
        let obs = daily(&[0.0, 9.0, 0.0, 0.0, 8.0, 0.0]);
        let req = ForecastRequest::new(4, generated_at()).with_confidence_levels(vec![0.05]);
        let f = model().forecast(&obs, &req).unwrap();
        assert_eq!(f.quantile(0.05), Some(0.0));
    }

    #[test]
    fn longer_horizon_widens_the_upper_quantile() {
        let obs = daily(&[10.0, 12.0, 9.0, 11.0, 10.0, 13.0, 9.0, 12.0]);
        let one = model().forecast(&obs, &ForecastRequest::new(1, generated_at())).unwrap();
        let four = model().forecast(&obs, &ForecastRequest::new(4, generated_at())).unwrap();

        assert!(((four.p90 - four.p50) - 2.0 * (one.p90 - one.p50)).abs() < 1e-9);
        assert_eq!(four.mean_demand, one.mean_demand);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        #[test]
        fn quantiles_are_ordered_and_non_negative(
            quantities in prop::collection::vec(0.0f64..500.0, 3..40),
            horizon in 1u32..30,
        ) {
            let f = model().forecast(&daily(&quantities), &ForecastRequest::new(horizon, generated_at())).unwrap();
            prop_assert!(f.mean_demand >= 0.0);
            prop_assert!(f.p50 >= 0.0);
            prop_assert!(f.p90 >= f.p50);
        }

        #[test]
        fn forecasting_is_idempotent(quantities in prop::collection::vec(0.0f64..500.0, 3..40)) {
            let obs = daily(&quantities);
            let req = ForecastRequest::new(3, generated_at()).with_confidence_levels(vec![0.1, 0.5, 0.95]);
            let a = model().forecast(&obs, &req).unwrap();
            let b = model().forecast(&obs, &req).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
