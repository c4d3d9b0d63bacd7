//! Orchestration of the engine against its collaborator stores.
//!
//! The engine is pure; this service owns the read-compute-persist sequences
//! and the ordering between them (a policy is always computed from the
//! forecast it was read together with).

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use stockcast_core::{ScenarioId, SeriesKey};
use stockcast_engine::{
    AccuracyRecord, AccuracyRepository, AccuracySummary, AccuracyTracker, DemandObservation,
    EngineConfig, EngineError, EngineResult, ForecastModel, ForecastRepository, ForecastRequest,
    ForecastResult, HistoryStore, InventoryPolicy, PolicyCalculator, PolicyRepository,
    PolicyRequest, RepositoryError, Scenario, ScenarioExecution, ScenarioFilter, ScenarioRepository,
    ScenarioResult, ScenarioSimulator,
};

use crate::repositories::{
    InMemoryAccuracyRepository, InMemoryForecastRepository, InMemoryHistoryStore,
    InMemoryPolicyRepository, InMemoryScenarioRepository,
};
use crate::scenario_runner::{ScenarioBatchRunner, ScenarioJob};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("no forecast recorded for {0}")]
    MissingForecast(SeriesKey),

    #[error("no policy recorded for {0}")]
    MissingPolicy(SeriesKey),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// One (sku, store) outcome of [`ReplenishmentService::plan_batch`].
#[derive(Debug)]
pub struct PlannedSeries {
    pub key: SeriesKey,
    pub outcome: ServiceResult<(ForecastResult, InventoryPolicy)>,
}

impl PlannedSeries {
    pub fn policy(&self) -> Option<&InventoryPolicy> {
        self.outcome.as_ref().ok().map(|(_, policy)| policy)
    }

    /// Most urgent first, then larger order value; failures last.
    fn priority(&self, other: &Self) -> Ordering {
        match (self.policy(), other.policy()) {
            (Some(a), Some(b)) => a.urgency.cmp(&b.urgency).then_with(|| {
                let value = |p: &InventoryPolicy| p.order_value.unwrap_or(0.0);
                value(b).total_cmp(&value(a))
            }),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

/// The collaborator stores the service reads from and appends to.
#[derive(Clone)]
pub struct Stores {
    pub history: Arc<dyn HistoryStore>,
    pub forecasts: Arc<dyn ForecastRepository>,
    pub policies: Arc<dyn PolicyRepository>,
    pub scenarios: Arc<dyn ScenarioRepository>,
    pub accuracy: Arc<dyn AccuracyRepository>,
}

impl Stores {
    /// Fresh in-memory stores for tests/dev.
    pub fn in_memory() -> Self {
        Self {
            history: Arc::new(InMemoryHistoryStore::new()),
            forecasts: Arc::new(InMemoryForecastRepository::new()),
            policies: Arc::new(InMemoryPolicyRepository::new()),
            scenarios: Arc::new(InMemoryScenarioRepository::new()),
            accuracy: Arc::new(InMemoryAccuracyRepository::new()),
        }
    }
}

pub struct ReplenishmentService {
    config: EngineConfig,
    stores: Stores,
    model: ForecastModel,
    calculator: PolicyCalculator,
    simulator: ScenarioSimulator,
    tracker: AccuracyTracker,
    runner: ScenarioBatchRunner,
}

impl ReplenishmentService {
    pub fn new(config: EngineConfig, stores: Stores) -> ServiceResult<Self> {
        config.validate()?;
        Ok(Self {
            model: ForecastModel::new(config.forecast.clone())?,
            calculator: PolicyCalculator::new(),
            simulator: ScenarioSimulator::new(config.costs.clone())?,
            tracker: AccuracyTracker::new(config.accuracy.clone())?,
            runner: ScenarioBatchRunner::default(),
            config,
            stores,
        })
    }

    pub fn with_runner(mut self, runner: ScenarioBatchRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Policy request filled from the configured defaults.
    pub fn default_policy_request(&self, current_stock: f64, computed_at: DateTime<Utc>) -> PolicyRequest {
        PolicyRequest::from_defaults(&self.config.policy, current_stock, computed_at)
    }

    /// Forecast `key` from history whose periods start in `[since, until)` and
    /// append the result.
    pub fn refresh_forecast(
        &self,
        key: &SeriesKey,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        request: &ForecastRequest,
    ) -> ServiceResult<ForecastResult> {
        let history = self.stores.history.fetch_observations(key, since, until)?;
        let forecast = self.model.forecast(&history, request).inspect_err(|e| {
            warn!(sku = %key.sku, store = %key.store, error = %e, "forecast refresh failed");
        })?;

        self.stores.forecasts.save(forecast.clone())?;
        info!(
            sku = %key.sku,
            store = %key.store,
            mean = forecast.mean_demand,
            p90 = forecast.p90,
            observations = forecast.observations_used,
            "forecast refreshed"
        );
        Ok(forecast)
    }

    /// Recompute the policy of `key` from its latest forecast and append it.
    pub fn refresh_policy(&self, key: &SeriesKey, request: &PolicyRequest) -> ServiceResult<InventoryPolicy> {
        let forecast = self
            .stores
            .forecasts
            .latest(key)?
            .ok_or_else(|| ServiceError::MissingForecast(key.clone()))?;
        self.policy_from(&forecast, request)
    }

    /// Refresh the forecast and derive the policy from that same forecast.
    pub fn plan(
        &self,
        key: &SeriesKey,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        forecast_request: &ForecastRequest,
        policy_request: &PolicyRequest,
    ) -> ServiceResult<(ForecastResult, InventoryPolicy)> {
        let forecast = self.refresh_forecast(key, since, until, forecast_request)?;
        let policy = self.policy_from(&forecast, policy_request)?;
        Ok((forecast, policy))
    }

    /// [`plan`](Self::plan) for many series over one history window.
    ///
    /// A series that fails is reported in its own entry; the others still
    /// plan and persist.
    pub fn plan_batch(
        &self,
        series: &[(SeriesKey, PolicyRequest)],
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        forecast_request: &ForecastRequest,
    ) -> Vec<PlannedSeries> {
        let mut planned: Vec<PlannedSeries> = series
            .iter()
            .map(|(key, policy_request)| PlannedSeries {
                key: key.clone(),
                outcome: self.plan(key, since, until, forecast_request, policy_request),
            })
            .collect();
        planned.sort_by(PlannedSeries::priority);

        let failed = planned.iter().filter(|p| p.outcome.is_err()).count();
        info!(series = planned.len(), failed, "batch plan complete");
        planned
    }

    fn policy_from(&self, forecast: &ForecastResult, request: &PolicyRequest) -> ServiceResult<InventoryPolicy> {
        let key = forecast.key();
        let policy = self.calculator.compute_policy(forecast, request)?;
        self.stores.policies.save(policy.clone())?;

        info!(
            sku = %key.sku,
            store = %key.store,
            safety_stock = policy.safety_stock,
            reorder_point = policy.reorder_point,
            order_qty = policy.suggested_order_qty,
            urgency = ?policy.urgency,
            "policy refreshed"
        );
        Ok(policy)
    }

    /// Persist a draft scenario.
    pub fn create_scenario(&self, scenario: Scenario) -> ServiceResult<Scenario> {
        self.stores.scenarios.save_scenario(scenario.clone())?;
        debug!(scenario_id = %scenario.id_typed(), name = scenario.name(), "scenario created");
        Ok(scenario)
    }

    pub fn list_scenarios(&self, filter: &ScenarioFilter) -> ServiceResult<Vec<Scenario>> {
        Ok(self.stores.scenarios.list(filter)?)
    }

    pub fn scenario_results(&self, scenario_id: ScenarioId) -> ServiceResult<Vec<ScenarioResult>> {
        Ok(self.stores.scenarios.results_for(scenario_id)?)
    }

    /// Run `scenario` against the latest forecast and policy of `key`.
    ///
    /// Both snapshots and, on success, the result are appended. A simulation
    /// failure is reported in the returned execution, not as `Err`.
    pub fn run_scenario(
        &self,
        scenario: &Scenario,
        key: &SeriesKey,
        at: DateTime<Utc>,
    ) -> ServiceResult<ScenarioExecution> {
        let (forecast, policy) = self.baseline(key)?;
        let execution = self.simulator.execute(scenario, &forecast, &policy, at)?;
        self.persist(&execution)?;
        Ok(execution)
    }

    /// Run several scenarios for `key` in parallel against one baseline.
    ///
    /// Outcomes are in input order; a scenario that cannot start is reported
    /// in its own slot without affecting the others.
    pub fn run_scenarios(
        &self,
        scenarios: &[Scenario],
        key: &SeriesKey,
        at: DateTime<Utc>,
    ) -> ServiceResult<Vec<EngineResult<ScenarioExecution>>> {
        let (forecast, policy) = self.baseline(key)?;
        let jobs = scenarios
            .iter()
            .map(|s| ScenarioJob::new(s.clone(), &forecast, &policy))
            .collect();

        let outcomes = self.runner.run(&self.simulator, jobs, at);
        for execution in outcomes.iter().flatten() {
            self.persist(execution)?;
        }
        Ok(outcomes)
    }

    fn baseline(&self, key: &SeriesKey) -> ServiceResult<(ForecastResult, InventoryPolicy)> {
        let policy = self
            .stores
            .policies
            .latest(key)?
            .ok_or_else(|| ServiceError::MissingPolicy(key.clone()))?;
        let forecast = self
            .stores
            .forecasts
            .latest(key)?
            .ok_or_else(|| ServiceError::MissingForecast(key.clone()))?;
        if policy.forecast_ref != forecast.reference() {
            warn!(sku = %key.sku, store = %key.store, "latest policy predates latest forecast");
        }
        Ok((forecast, policy))
    }

    fn persist(&self, execution: &ScenarioExecution) -> ServiceResult<()> {
        for snapshot in &execution.snapshots {
            self.stores.scenarios.save_scenario(snapshot.clone())?;
        }
        match &execution.outcome {
            Ok(result) => {
                self.stores.scenarios.save_result(result.clone())?;
                info!(
                    scenario_id = %result.scenario_id,
                    run_id = %result.run_id,
                    risk_pct = result.stockout_risk_pct,
                    cost_impact = result.cost_impact,
                    "scenario completed"
                );
            }
            Err(e) => {
                let scenario_id = execution.final_snapshot().map(Scenario::id_typed);
                warn!(scenario_id = ?scenario_id, error = %e, "scenario failed");
            }
        }
        Ok(())
    }

    /// Record realized demand and, when the latest forecast of its series
    /// covers the period, score that forecast.
    pub fn record_actual(
        &self,
        observation: DemandObservation,
        computed_at: DateTime<Utc>,
    ) -> ServiceResult<Option<AccuracyRecord>> {
        let key = observation.key();
        self.stores.history.record_observation(observation.clone())?;

        let Some(forecast) = self.stores.forecasts.latest(&key)? else {
            return Ok(None);
        };
        if !observation.is_observed() || !forecast.horizon.contains(&observation.period()) {
            debug!(sku = %key.sku, store = %key.store, "actual recorded, no covering forecast");
            return Ok(None);
        }
        self.score_actual(&forecast, &observation, computed_at).map(Some)
    }

    /// Score `realized` against a specific forecast and append the record.
    pub fn score_actual(
        &self,
        forecast: &ForecastResult,
        realized: &DemandObservation,
        computed_at: DateTime<Utc>,
    ) -> ServiceResult<AccuracyRecord> {
        let record = self.tracker.record_accuracy(forecast, realized, computed_at)?;
        self.stores.accuracy.save(record.clone())?;
        info!(
            sku = %record.sku,
            store = %record.store,
            ape = record.absolute_pct_error,
            bias = record.bias,
            "forecast scored"
        );
        Ok(record)
    }

    /// Trailing accuracy of `key`, `None` until a forecast has been scored.
    pub fn accuracy_summary(&self, key: &SeriesKey) -> ServiceResult<Option<AccuracySummary>> {
        let records = self
            .stores
            .accuracy
            .recent(key, self.config.accuracy.trailing_records)?;
        let summary = self.tracker.aggregate(key, &records);
        if let Some(s) = summary.as_ref().filter(|s| s.needs_retraining) {
            warn!(
                sku = %key.sku,
                store = %key.store,
                accuracy_pct = s.accuracy_pct,
                "forecast accuracy below threshold"
            );
        }
        Ok(summary)
    }
}
