//! What-if scenario simulation.
//!
//! A scenario perturbs a baseline forecast/policy pair (lead-time delta, demand
//! delta) and reports the resulting stockout risk and cost impact.
//!
//! Scenario records are immutable snapshots. Lifecycle transitions return a new
//! snapshot and leave the old one untouched, so concurrent runs never race on
//! a shared status field:
//!
//! ```text
//! Draft ──start──▶ Running ──complete──▶ Completed ──start (re-run)──▶ Running
//!                          └──fail─────▶ Failed (terminal; use fresh_attempt)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use stockcast_core::{Entity, RunId, ScenarioId};

use crate::config::CostModel;
use crate::distribution::{NormalApproximation, StandardizedDistribution};
use crate::error::{EngineError, EngineResult};
use crate::forecast::{ForecastRef, ForecastResult};
use crate::policy::{DemandProfile, InventoryPolicy, PolicyCalculator};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ScenarioStatus {
    Draft,
    Running { started_at: DateTime<Utc> },
    Completed { completed_at: DateTime<Utc>, run_id: RunId },
    Failed { failed_at: DateTime<Utc>, reason: String },
}

impl ScenarioStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ScenarioStatus::Draft => "draft",
            ScenarioStatus::Running { .. } => "running",
            ScenarioStatus::Completed { .. } => "completed",
            ScenarioStatus::Failed { .. } => "failed",
        }
    }
}

/// A named perturbation of a baseline forecast/policy pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    id: ScenarioId,
    name: String,
    description: String,
    lead_time_delta_days: i64,
    /// Signed percentage; -100 removes all demand.
    demand_delta_pct: f64,
    status: ScenarioStatus,
    created_at: DateTime<Utc>,
}

impl Scenario {
    pub fn draft(
        name: impl Into<String>,
        description: impl Into<String>,
        lead_time_delta_days: i64,
        demand_delta_pct: f64,
        created_at: DateTime<Utc>,
    ) -> EngineResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(EngineError::scenario("name cannot be empty"));
        }
        if !demand_delta_pct.is_finite() {
            return Err(EngineError::scenario("demand_delta_pct must be finite"));
        }
        Ok(Self {
            id: ScenarioId::new(),
            name,
            description: description.into(),
            lead_time_delta_days,
            demand_delta_pct,
            status: ScenarioStatus::Draft,
            created_at,
        })
    }

    pub fn id_typed(&self) -> ScenarioId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn lead_time_delta_days(&self) -> i64 {
        self.lead_time_delta_days
    }

    pub fn demand_delta_pct(&self) -> f64 {
        self.demand_delta_pct
    }

    pub fn status(&self) -> &ScenarioStatus {
        &self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Running snapshot. Allowed from `Draft`, and from `Completed` as a re-run.
    pub fn start(&self, at: DateTime<Utc>) -> EngineResult<Scenario> {
        match self.status {
            ScenarioStatus::Draft | ScenarioStatus::Completed { .. } => {
                Ok(self.with_status(ScenarioStatus::Running { started_at: at }))
            }
            ScenarioStatus::Running { .. } => Err(EngineError::transition(format!(
                "scenario {} is already running",
                self.id
            ))),
            ScenarioStatus::Failed { .. } => Err(EngineError::transition(format!(
                "scenario {} failed; start a fresh attempt instead",
                self.id
            ))),
        }
    }

    pub fn complete(&self, run_id: RunId, at: DateTime<Utc>) -> EngineResult<Scenario> {
        self.ensure_running("complete")?;
        Ok(self.with_status(ScenarioStatus::Completed {
            completed_at: at,
            run_id,
        }))
    }

    pub fn fail(&self, reason: impl Into<String>, at: DateTime<Utc>) -> EngineResult<Scenario> {
        self.ensure_running("fail")?;
        Ok(self.with_status(ScenarioStatus::Failed {
            failed_at: at,
            reason: reason.into(),
        }))
    }

    /// New `Draft` scenario with the same definition and a new identifier.
    pub fn fresh_attempt(&self, at: DateTime<Utc>) -> Scenario {
        Scenario {
            id: ScenarioId::new(),
            status: ScenarioStatus::Draft,
            created_at: at,
            ..self.clone()
        }
    }

    fn ensure_running(&self, action: &str) -> EngineResult<()> {
        match self.status {
            ScenarioStatus::Running { .. } => Ok(()),
            ref other => Err(EngineError::transition(format!(
                "cannot {action} scenario {} in state {}",
                self.id,
                other.label()
            ))),
        }
    }

    fn with_status(&self, status: ScenarioStatus) -> Scenario {
        Scenario {
            status,
            ..self.clone()
        }
    }
}

impl Entity for Scenario {
    type Id = ScenarioId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Outcome of one scenario run. Append-only, one per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub run_id: RunId,
    pub scenario_id: ScenarioId,
    pub baseline_forecast_ref: ForecastRef,
    pub baseline_stockout_risk_pct: f64,
    pub stockout_risk_pct: f64,
    /// Positive = net cost increase, in `currency`.
    pub cost_impact: f64,
    pub currency: String,
    pub effective_lead_time_days: i64,
    pub effective_mean_demand_per_day: f64,
    pub adjusted_forecast: ForecastResult,
    pub adjusted_policy: InventoryPolicy,
    pub computed_at: DateTime<Utc>,
}

impl Entity for ScenarioResult {
    type Id = RunId;

    fn id(&self) -> &Self::Id {
        &self.run_id
    }
}

/// The snapshots a run produced (`Running`, then `Completed` or `Failed`) and
/// its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioExecution {
    pub snapshots: Vec<Scenario>,
    pub outcome: EngineResult<ScenarioResult>,
}

impl ScenarioExecution {
    pub fn final_snapshot(&self) -> Option<&Scenario> {
        self.snapshots.last()
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioSimulator<D = NormalApproximation> {
    costs: CostModel,
    policy: PolicyCalculator<D>,
}

impl ScenarioSimulator<NormalApproximation> {
    pub fn new(costs: CostModel) -> EngineResult<Self> {
        Self::with_distribution(costs, NormalApproximation)
    }
}

impl<D: StandardizedDistribution> ScenarioSimulator<D> {
    pub fn with_distribution(costs: CostModel, distribution: D) -> EngineResult<Self> {
        costs.validate()?;
        Ok(Self {
            costs,
            policy: PolicyCalculator::with_distribution(distribution),
        })
    }

    pub fn costs(&self) -> &CostModel {
        &self.costs
    }

    /// Drive the scenario through `Running` to a terminal snapshot.
    ///
    /// Only an illegal starting state is returned as `Err`; simulation failures
    /// end in a `Failed` snapshot and are reported in `outcome`.
    pub fn execute(
        &self,
        scenario: &Scenario,
        baseline_forecast: &ForecastResult,
        baseline_policy: &InventoryPolicy,
        at: DateTime<Utc>,
    ) -> EngineResult<ScenarioExecution> {
        let running = scenario.start(at)?;
        let outcome = self.run_scenario(&running, baseline_forecast, baseline_policy, at);
        let terminal = match &outcome {
            Ok(result) => running.complete(result.run_id, at)?,
            Err(e) => running.fail(e.to_string(), at)?,
        };
        Ok(ScenarioExecution {
            snapshots: vec![running, terminal],
            outcome,
        })
    }

    /// Compute one scenario result. Each call yields a new `run_id`.
    pub fn run_scenario(
        &self,
        scenario: &Scenario,
        baseline_forecast: &ForecastResult,
        baseline_policy: &InventoryPolicy,
        computed_at: DateTime<Utc>,
    ) -> EngineResult<ScenarioResult> {
        if baseline_forecast.key() != baseline_policy.key() {
            return Err(EngineError::scenario(format!(
                "baseline forecast ({}) and policy ({}) belong to different series",
                baseline_forecast.key(),
                baseline_policy.key()
            )));
        }
        if !scenario.demand_delta_pct.is_finite() {
            return Err(EngineError::scenario("demand_delta_pct must be finite"));
        }

        let base_lead_time = baseline_policy.lead_time_days;
        if base_lead_time <= 0 {
            return Err(EngineError::scenario("baseline lead time must be positive"));
        }
        let lead_time = base_lead_time
            .checked_add(scenario.lead_time_delta_days)
            .filter(|lt| *lt > 0)
            .ok_or_else(|| {
                EngineError::scenario(format!(
                    "effective lead time {} + {} days is not positive",
                    base_lead_time, scenario.lead_time_delta_days
                ))
            })?;

        let baseline = DemandProfile::from_forecast(baseline_forecast, self.policy.distribution())?;
        let demand_factor = 1.0 + scenario.demand_delta_pct / 100.0;
        let dispersion_factor = (lead_time as f64 / base_lead_time as f64).sqrt();
        let adjusted = DemandProfile {
            mean_per_day: (baseline.mean_per_day * demand_factor).max(0.0),
            stddev_per_day: baseline.stddev_per_day * dispersion_factor,
        };

        let adjusted_forecast = adjust_forecast(baseline_forecast, demand_factor, dispersion_factor, computed_at);
        let request = baseline_policy.request_with_lead_time(lead_time, computed_at);
        request
            .validate()
            .map_err(|e| EngineError::scenario(format!("baseline policy cannot be replayed: {e}")))?;
        let adjusted_policy = self
            .policy
            .compute_from_profile(adjusted_forecast.reference(), adjusted, &request);

        let available = baseline_policy.inventory_position();
        let baseline_risk = self.stockout_risk_pct(&baseline, base_lead_time as f64, available);
        let risk = self.stockout_risk_pct(&adjusted, lead_time as f64, available);

        let holding_delta = (adjusted_policy.safety_stock - baseline_policy.safety_stock)
            * self.costs.holding_cost_per_unit_per_day
            * lead_time as f64;
        let stockout_delta =
            ((baseline_risk - risk) / 100.0) * self.costs.stockout_cost_per_unit * adjusted.mean_per_day;
        let cost_impact = holding_delta - stockout_delta;

        let run_id = RunId::new();
        debug!(
            scenario_id = %scenario.id,
            run_id = %run_id,
            effective_lead_time_days = lead_time,
            baseline_risk,
            risk,
            cost_impact,
            "scenario simulated"
        );

        Ok(ScenarioResult {
            run_id,
            scenario_id: scenario.id,
            baseline_forecast_ref: baseline_forecast.reference(),
            baseline_stockout_risk_pct: baseline_risk,
            stockout_risk_pct: risk,
            cost_impact,
            currency: self.costs.currency.clone(),
            effective_lead_time_days: lead_time,
            effective_mean_demand_per_day: adjusted.mean_per_day,
            adjusted_forecast,
            adjusted_policy,
            computed_at,
        })
    }

    /// Probability (percent) that lead-time demand exceeds `available` stock.
    fn stockout_risk_pct(&self, profile: &DemandProfile, lead_time_days: f64, available: f64) -> f64 {
        let demand = profile.lead_time_demand(lead_time_days);
        let stddev = profile.lead_time_stddev(lead_time_days);
        let risk = if stddev <= 0.0 {
            if demand > available { 100.0 } else { 0.0 }
        } else {
            100.0 * (1.0 - self.policy.distribution().cdf((available - demand) / stddev))
        };
        risk.clamp(0.0, 100.0)
    }
}

fn adjust_forecast(
    baseline: &ForecastResult,
    demand_factor: f64,
    dispersion_factor: f64,
    generated_at: DateTime<Utc>,
) -> ForecastResult {
    let p50 = (baseline.p50 * demand_factor).max(0.0);
    let rescale = |value: f64| (p50 + (value - baseline.p50) * dispersion_factor).max(0.0);

    ForecastResult {
        mean_demand: (baseline.mean_demand * demand_factor).max(0.0),
        p50,
        p90: rescale(baseline.p90).max(p50),
        quantiles: baseline
            .quantiles
            .iter()
            .map(|q| crate::forecast::QuantileForecast {
                level: q.level,
                value: rescale(q.value),
            })
            .collect(),
        residual_stddev: baseline.residual_stddev * dispersion_factor,
        adjustment_factor: baseline.adjustment_factor * demand_factor.max(0.0),
        generated_at,
        ..baseline.clone()
    }
}
