use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use stockcast_core::{SeriesKey, SkuCode, StoreCode};

use crate::config::PolicyConfig;
use crate::distribution::{NormalApproximation, StandardizedDistribution};
use crate::error::{EngineError, EngineResult};
use crate::forecast::{ForecastRef, ForecastResult};
use crate::stats::round_up_to_multiple;

/// Inputs that, together with a forecast, determine an inventory policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRequest {
    pub lead_time_days: i64,
    /// Target probability of not stocking out during lead time, in (0, 1).
    pub service_level: f64,
    pub current_stock: f64,
    /// Pipeline stock already ordered but not received.
    #[serde(default)]
    pub on_order: f64,
    pub case_pack: Option<u32>,
    pub min_order_qty: Option<f64>,
    /// Purchase cost per unit, used to value the suggested order.
    #[serde(default)]
    pub unit_cost: Option<f64>,
    pub computed_at: DateTime<Utc>,
}

impl PolicyRequest {
    pub fn new(lead_time_days: i64, service_level: f64, current_stock: f64, computed_at: DateTime<Utc>) -> Self {
        Self {
            lead_time_days,
            service_level,
            current_stock,
            on_order: 0.0,
            case_pack: None,
            min_order_qty: None,
            unit_cost: None,
            computed_at,
        }
    }

    /// Request using the configured default lead time and service level.
    pub fn from_defaults(defaults: &PolicyConfig, current_stock: f64, computed_at: DateTime<Utc>) -> Self {
        Self::new(
            defaults.default_lead_time_days,
            defaults.default_service_level,
            current_stock,
            computed_at,
        )
    }

    pub fn with_on_order(mut self, on_order: f64) -> Self {
        self.on_order = on_order;
        self
    }

    pub fn with_case_pack(mut self, case_pack: u32) -> Self {
        self.case_pack = Some(case_pack);
        self
    }

    pub fn with_min_order_qty(mut self, min_order_qty: f64) -> Self {
        self.min_order_qty = Some(min_order_qty);
        self
    }

    pub fn with_unit_cost(mut self, unit_cost: f64) -> Self {
        self.unit_cost = Some(unit_cost);
        self
    }

    pub(crate) fn validate(&self) -> EngineResult<()> {
        if self.lead_time_days <= 0 {
            return Err(EngineError::policy_input(format!(
                "lead_time_days must be positive (got {})",
                self.lead_time_days
            )));
        }
        if !(self.service_level > 0.0 && self.service_level < 1.0) {
            return Err(EngineError::policy_input(format!(
                "service_level must be in (0, 1) (got {})",
                self.service_level
            )));
        }
        for (name, v) in [("current_stock", self.current_stock), ("on_order", self.on_order)] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(EngineError::policy_input(format!(
                    "{name} must be a finite non-negative number (got {v})"
                )));
            }
        }
        if self.case_pack == Some(0) {
            return Err(EngineError::policy_input("case_pack must be positive"));
        }
        for (name, v) in [("min_order_qty", self.min_order_qty), ("unit_cost", self.unit_cost)] {
            if let Some(v) = v.filter(|v| !(v.is_finite() && *v >= 0.0)) {
                return Err(EngineError::policy_input(format!(
                    "{name} must be a finite non-negative number (got {v})"
                )));
            }
        }
        Ok(())
    }
}

/// How soon a replenishment order is needed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReorderUrgency {
    /// Inventory position at or below safety stock.
    Critical,
    /// At or below half the reorder point.
    High,
    /// At or below the reorder point.
    Medium,
    Low,
}

impl ReorderUrgency {
    fn classify(position: f64, safety_stock: f64, reorder_point: f64) -> Self {
        if position <= safety_stock {
            ReorderUrgency::Critical
        } else if position <= reorder_point * 0.5 {
            ReorderUrgency::High
        } else if position <= reorder_point {
            ReorderUrgency::Medium
        } else {
            ReorderUrgency::Low
        }
    }
}

/// Daily demand rate and dispersion implied by a forecast.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandProfile {
    pub mean_per_day: f64,
    pub stddev_per_day: f64,
}

impl DemandProfile {
    /// Back-solve dispersion from the forecast's P90/P50 spread so the policy
    /// stays consistent with whatever quantile model produced the forecast.
    pub fn from_forecast<D: StandardizedDistribution>(
        forecast: &ForecastResult,
        distribution: &D,
    ) -> EngineResult<Self> {
        let values_ok = [forecast.mean_demand, forecast.p50, forecast.p90]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0);
        if !values_ok || forecast.p90 < forecast.p50 {
            return Err(EngineError::policy_input(
                "forecast must satisfy p90 >= p50 >= 0 and mean_demand >= 0",
            ));
        }
        let period_days = forecast.period_days;
        if !(period_days.is_finite() && period_days > 0.0) || forecast.horizon_periods == 0 {
            return Err(EngineError::policy_input(
                "forecast period_days and horizon_periods must be positive",
            ));
        }

        let stddev_per_period = (forecast.p90 - forecast.p50)
            / distribution.quantile(0.9)
            / f64::from(forecast.horizon_periods).sqrt();

        Ok(Self {
            mean_per_day: forecast.mean_demand / period_days,
            stddev_per_day: stddev_per_period / period_days.sqrt(),
        })
    }

    pub fn lead_time_demand(&self, lead_time_days: f64) -> f64 {
        self.mean_per_day * lead_time_days
    }

    pub fn lead_time_stddev(&self, lead_time_days: f64) -> f64 {
        self.stddev_per_day * lead_time_days.sqrt()
    }
}

/// Safety stock, reorder point and order suggestion for one (sku, store).
///
/// Derived deterministically from a forecast plus a [`PolicyRequest`];
/// recomputed (never patched) whenever any input changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryPolicy {
    pub sku: SkuCode,
    pub store: StoreCode,
    pub forecast_ref: ForecastRef,
    pub lead_time_days: i64,
    pub service_level: f64,
    pub current_stock: f64,
    pub on_order: f64,
    pub safety_stock: f64,
    pub reorder_point: f64,
    pub suggested_order_qty: f64,
    pub urgency: ReorderUrgency,
    pub case_pack: Option<u32>,
    pub min_order_qty: Option<f64>,
    #[serde(default)]
    pub unit_cost: Option<f64>,
    /// `suggested_order_qty * unit_cost`, when a unit cost was given.
    #[serde(default)]
    pub order_value: Option<f64>,
    pub computed_at: DateTime<Utc>,
}

impl InventoryPolicy {
    pub fn key(&self) -> SeriesKey {
        SeriesKey::new(self.sku.clone(), self.store.clone())
    }

    /// On-hand plus pipeline stock.
    pub fn inventory_position(&self) -> f64 {
        self.current_stock + self.on_order
    }

    /// The request that reproduces this policy with a different lead time.
    pub fn request_with_lead_time(&self, lead_time_days: i64, computed_at: DateTime<Utc>) -> PolicyRequest {
        PolicyRequest {
            lead_time_days,
            service_level: self.service_level,
            current_stock: self.current_stock,
            on_order: self.on_order,
            case_pack: self.case_pack,
            min_order_qty: self.min_order_qty,
            unit_cost: self.unit_cost,
            computed_at,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct PolicyCalculator<D = NormalApproximation> {
    distribution: D,
}

impl PolicyCalculator<NormalApproximation> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<D: StandardizedDistribution> PolicyCalculator<D> {
    pub fn with_distribution(distribution: D) -> Self {
        Self { distribution }
    }

    pub fn distribution(&self) -> &D {
        &self.distribution
    }

    pub fn compute_policy(&self, forecast: &ForecastResult, request: &PolicyRequest) -> EngineResult<InventoryPolicy> {
        request.validate()?;
        let profile = DemandProfile::from_forecast(forecast, &self.distribution)?;
        Ok(self.compute_from_profile(forecast.reference(), profile, request))
    }

    /// Policy for an already-validated request and profile.
    pub(crate) fn compute_from_profile(
        &self,
        forecast_ref: ForecastRef,
        profile: DemandProfile,
        request: &PolicyRequest,
    ) -> InventoryPolicy {
        let lead_time = request.lead_time_days as f64;
        let z = self.distribution.quantile(request.service_level);

        let safety_stock = (z * profile.lead_time_stddev(lead_time)).max(0.0);
        let reorder_point = profile.lead_time_demand(lead_time) + safety_stock;

        let position = request.current_stock + request.on_order;
        let shortfall = (reorder_point - position).max(0.0);
        let suggested_order_qty = if shortfall > 0.0 {
            let with_moq = request.min_order_qty.map_or(shortfall, |moq| shortfall.max(moq));
            match request.case_pack {
                Some(pack) => round_up_to_multiple(with_moq, f64::from(pack)),
                None => with_moq,
            }
        } else {
            0.0
        };

        let urgency = ReorderUrgency::classify(position, safety_stock, reorder_point);
        let order_value = request.unit_cost.map(|c| suggested_order_qty * c);

        debug!(
            sku = %forecast_ref.sku,
            store = %forecast_ref.store,
            lead_time_days = request.lead_time_days,
            service_level = request.service_level,
            safety_stock,
            reorder_point,
            suggested_order_qty,
            "inventory policy computed"
        );

        InventoryPolicy {
            sku: forecast_ref.sku.clone(),
            store: forecast_ref.store.clone(),
            forecast_ref,
            lead_time_days: request.lead_time_days,
            service_level: request.service_level,
            current_stock: request.current_stock,
            on_order: request.on_order,
            safety_stock,
            reorder_point,
            suggested_order_qty,
            urgency,
            case_pack: request.case_pack,
            min_order_qty: request.min_order_qty,
            unit_cost: request.unit_cost,
            order_value,
            computed_at: request.computed_at,
        }
    }
}
