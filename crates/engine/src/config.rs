//! Engine configuration parameter object.
//!
//! Configuration is passed explicitly into each component; there is no global
//! settings state. Every section except [`CostModel`] has defaults, so a JSON
//! document only needs to spell out the cost coefficients.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    pub costs: CostModel,
    #[serde(default)]
    pub accuracy: AccuracyConfig,
}

impl EngineConfig {
    /// Defaults everywhere except the (required) cost model.
    pub fn new(costs: CostModel) -> Self {
        Self {
            forecast: ForecastConfig::default(),
            policy: PolicyConfig::default(),
            costs,
            accuracy: AccuracyConfig::default(),
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.forecast.validate()?;
        self.policy.validate()?;
        self.costs.validate()?;
        self.accuracy.validate()
    }
}

/// Level/dispersion model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// EWMA smoothing constant in (0, 1].
    pub smoothing_alpha: f64,
    /// Trailing residuals used for the dispersion estimate.
    pub residual_window: usize,
    /// Leading periods averaged to seed the level.
    pub seed_periods: usize,
    /// Minimum usable periods before a forecast is attempted.
    pub min_periods: usize,
    pub model_version: String,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            smoothing_alpha: 0.3,
            residual_window: 8,
            seed_periods: 8,
            min_periods: 3,
            model_version: "ewma-normal/1".to_string(),
        }
    }
}

impl ForecastConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if !(self.smoothing_alpha.is_finite() && self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err(EngineError::config("forecast.smoothing_alpha must be in (0, 1]"));
        }
        // Sample stddev needs two residuals.
        if self.residual_window < 2 {
            return Err(EngineError::config("forecast.residual_window must be >= 2"));
        }
        if self.seed_periods == 0 {
            return Err(EngineError::config("forecast.seed_periods must be >= 1"));
        }
        if self.min_periods == 0 {
            return Err(EngineError::config("forecast.min_periods must be >= 1"));
        }
        if self.model_version.trim().is_empty() {
            return Err(EngineError::config("forecast.model_version cannot be empty"));
        }
        Ok(())
    }
}

/// Defaults applied when a caller does not specify policy parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub default_service_level: f64,
    pub default_lead_time_days: i64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default_service_level: 0.95,
            default_lead_time_days: 7,
        }
    }
}

impl PolicyConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if !(self.default_service_level > 0.0 && self.default_service_level < 1.0) {
            return Err(EngineError::config("policy.default_service_level must be in (0, 1)"));
        }
        if self.default_lead_time_days <= 0 {
            return Err(EngineError::config("policy.default_lead_time_days must be positive"));
        }
        Ok(())
    }
}

/// Cost coefficients for scenario cost impact. Required; never inferred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostModel {
    pub holding_cost_per_unit_per_day: f64,
    pub stockout_cost_per_unit: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl CostModel {
    pub fn new(holding_cost_per_unit_per_day: f64, stockout_cost_per_unit: f64) -> Self {
        Self {
            holding_cost_per_unit_per_day,
            stockout_cost_per_unit,
            currency: default_currency(),
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        for (name, v) in [
            ("holding_cost_per_unit_per_day", self.holding_cost_per_unit_per_day),
            ("stockout_cost_per_unit", self.stockout_cost_per_unit),
        ] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(EngineError::config(format!(
                    "costs.{name} must be a finite non-negative number"
                )));
            }
        }
        if self.currency.trim().is_empty() {
            return Err(EngineError::config("costs.currency cannot be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccuracyConfig {
    /// Trailing records averaged into the aggregate accuracy.
    pub trailing_records: usize,
    /// Below this aggregate accuracy (percent) a model is flagged for retraining.
    pub min_accuracy_pct: f64,
}

impl Default for AccuracyConfig {
    fn default() -> Self {
        Self {
            trailing_records: 12,
            min_accuracy_pct: 70.0,
        }
    }
}

impl AccuracyConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.trailing_records == 0 {
            return Err(EngineError::config("accuracy.trailing_records must be >= 1"));
        }
        if !self.min_accuracy_pct.is_finite() {
            return Err(EngineError::config("accuracy.min_accuracy_pct must be finite"));
        }
        Ok(())
    }
}
