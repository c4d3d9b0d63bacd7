use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockcast_core::{Period, SeriesKey, SkuCode, StoreCode};

use crate::config::AccuracyConfig;
use crate::error::{EngineError, EngineResult};
use crate::forecast::{ForecastRef, ForecastResult};
use crate::observation::DemandObservation;
use crate::stats::mean;

/// Guards percentage errors when realized demand is exactly zero.
const REALIZED_EPSILON: f64 = 1e-6;

/// Forecast-vs-actual comparison for one closed period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyRecord {
    pub sku: SkuCode,
    pub store: StoreCode,
    pub forecast_ref: ForecastRef,
    pub period: Period,
    pub realized_demand: f64,
    pub forecast_demand: f64,
    pub absolute_pct_error: f64,
    /// Signed percentage; positive = over-forecast.
    pub bias: f64,
    pub computed_at: DateTime<Utc>,
}

impl AccuracyRecord {
    pub fn key(&self) -> SeriesKey {
        SeriesKey::new(self.sku.clone(), self.store.clone())
    }
}

/// Trailing accuracy for one (sku, store).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracySummary {
    pub sku: SkuCode,
    pub store: StoreCode,
    pub records_used: usize,
    pub mape: f64,
    pub mean_bias: f64,
    /// `100 - MAPE`; negative when errors exceed 100 % on average.
    pub accuracy_pct: f64,
    pub needs_retraining: bool,
    pub latest_computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct AccuracyTracker {
    config: AccuracyConfig,
}

impl AccuracyTracker {
    pub fn new(config: AccuracyConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Compare realized demand against a prior forecast.
    ///
    /// The prediction is the forecast's per-period mean times the number of
    /// forecast periods the realized bucket covers. Only valid once the realized period lies entirely inside the forecast
    /// horizon and carries an observed quantity.
    pub fn record_accuracy(
        &self,
        forecast: &ForecastResult,
        realized: &DemandObservation,
        computed_at: DateTime<Utc>,
    ) -> EngineResult<AccuracyRecord> {
        if realized.key() != forecast.key() {
            return Err(EngineError::forecast_input(format!(
                "realized demand for {} cannot be scored against forecast for {}",
                realized.key(),
                forecast.key()
            )));
        }
        if !realized.is_observed() || !forecast.horizon.contains(&realized.period()) {
            return Err(EngineError::PrematureAccuracyCheck {
                period_end: realized.period().end(),
                horizon_end: forecast.horizon.end(),
            });
        }

        if !(forecast.period_days.is_finite() && forecast.period_days > 0.0) {
            return Err(EngineError::forecast_input("forecast period_days must be positive"));
        }

        // mean_demand is a per-period rate; the realized bucket may span several periods.
        let periods_covered = realized.period().length_days() / forecast.period_days;
        let actual = realized.quantity();
        let predicted = forecast.mean_demand * periods_covered;
        let denom = actual.max(REALIZED_EPSILON);

        Ok(AccuracyRecord {
            sku: forecast.sku.clone(),
            store: forecast.store.clone(),
            forecast_ref: forecast.reference(),
            period: realized.period(),
            realized_demand: actual,
            forecast_demand: predicted,
            absolute_pct_error: (actual - predicted).abs() / denom * 100.0,
            bias: (predicted - actual) / denom * 100.0,
            computed_at,
        })
    }

    /// Aggregate accuracy over the trailing `trailing_records` records of `key`.
    ///
    /// Returns `None` when the series has no records.
    pub fn aggregate(&self, key: &SeriesKey, records: &[AccuracyRecord]) -> Option<AccuracySummary> {
        let mut series: Vec<&AccuracyRecord> = records
            .iter()
            .filter(|r| r.sku == key.sku && r.store == key.store)
            .collect();
        if series.is_empty() {
            return None;
        }

        // Stable sort keeps insertion order for equal timestamps.
        series.sort_by_key(|r| r.computed_at);
        let start = series.len().saturating_sub(self.config.trailing_records);
        let trailing = &series[start..];

        let errors: Vec<f64> = trailing.iter().map(|r| r.absolute_pct_error).collect();
        let biases: Vec<f64> = trailing.iter().map(|r| r.bias).collect();
        let mape = mean(&errors);
        let accuracy_pct = 100.0 - mape;

        Some(AccuracySummary {
            sku: key.sku.clone(),
            store: key.store.clone(),
            records_used: trailing.len(),
            mape,
            mean_bias: mean(&biases),
            accuracy_pct,
            needs_retraining: accuracy_pct < self.config.min_accuracy_pct,
            latest_computed_at: trailing[trailing.len() - 1].computed_at,
        })
    }
}
