use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use stockcast_core::{Entity, ScenarioId, SeriesKey};
use stockcast_engine::{
    AccuracyRecord, AccuracyRepository, DemandObservation, ForecastRepository, ForecastResult,
    HistoryStore, InventoryPolicy, PolicyRepository, RepositoryError, Scenario, ScenarioFilter,
    ScenarioRepository, ScenarioResult,
};

fn poisoned() -> RepositoryError {
    RepositoryError::Storage("lock poisoned".to_string())
}

/// Append-only per-series log shared by the forecast, policy and accuracy stores.
#[derive(Debug)]
struct SeriesLog<T> {
    inner: RwLock<HashMap<SeriesKey, Vec<T>>>,
}

impl<T: Clone> SeriesLog<T> {
    fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    fn append(&self, key: SeriesKey, record: T) -> Result<(), RepositoryError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        map.entry(key).or_default().push(record);
        Ok(())
    }

    fn read<R>(&self, key: &SeriesKey, f: impl FnOnce(&[T]) -> R) -> Result<R, RepositoryError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(f(map.get(key).map(Vec::as_slice).unwrap_or_default()))
    }
}

/// In-memory demand history for tests/dev.
///
/// Observations are kept sorted by period start; a period that overlaps one
/// already recorded for the same series is rejected.
#[derive(Debug)]
pub struct InMemoryHistoryStore {
    inner: RwLock<HashMap<SeriesKey, Vec<DemandObservation>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Record a batch, stopping at the first rejected observation.
    pub fn extend(
        &self,
        observations: impl IntoIterator<Item = DemandObservation>,
    ) -> Result<(), RepositoryError> {
        observations
            .into_iter()
            .try_for_each(|obs| self.record_observation(obs))
    }

    pub fn len(&self, key: &SeriesKey) -> Result<usize, RepositoryError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.get(key).map_or(0, Vec::len))
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn fetch_observations(
        &self,
        key: &SeriesKey,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<DemandObservation>, RepositoryError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map
            .get(key)
            .map(|series| {
                series
                    .iter()
                    .filter(|obs| obs.period().start() >= since && obs.period().start() < until)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn record_observation(&self, observation: DemandObservation) -> Result<(), RepositoryError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let series = map.entry(observation.key()).or_default();

        if let Some(existing) = series
            .iter()
            .find(|obs| obs.period().overlaps(&observation.period()))
        {
            return Err(RepositoryError::Conflict(format!(
                "{} already has an observation for {}",
                observation.key(),
                existing.period()
            )));
        }

        let at = series.partition_point(|obs| obs.period().start() < observation.period().start());
        series.insert(at, observation);
        Ok(())
    }
}

/// In-memory forecast log for tests/dev.
#[derive(Debug)]
pub struct InMemoryForecastRepository {
    log: SeriesLog<ForecastResult>,
}

impl InMemoryForecastRepository {
    pub fn new() -> Self {
        Self { log: SeriesLog::new() }
    }

    /// Every forecast saved for `key`, in save order.
    pub fn history(&self, key: &SeriesKey) -> Result<Vec<ForecastResult>, RepositoryError> {
        self.log.read(key, <[ForecastResult]>::to_vec)
    }
}

impl Default for InMemoryForecastRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl ForecastRepository for InMemoryForecastRepository {
    fn save(&self, forecast: ForecastResult) -> Result<(), RepositoryError> {
        self.log.append(forecast.key(), forecast)
    }

    fn latest(&self, key: &SeriesKey) -> Result<Option<ForecastResult>, RepositoryError> {
        // max_by_key keeps the last of equal timestamps, i.e. the most recent save.
        self.log
            .read(key, |all| all.iter().max_by_key(|f| f.generated_at).cloned())
    }
}

/// In-memory policy log for tests/dev.
#[derive(Debug)]
pub struct InMemoryPolicyRepository {
    log: SeriesLog<InventoryPolicy>,
}

impl InMemoryPolicyRepository {
    pub fn new() -> Self {
        Self { log: SeriesLog::new() }
    }

    pub fn history(&self, key: &SeriesKey) -> Result<Vec<InventoryPolicy>, RepositoryError> {
        self.log.read(key, <[InventoryPolicy]>::to_vec)
    }
}

impl Default for InMemoryPolicyRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyRepository for InMemoryPolicyRepository {
    fn save(&self, policy: InventoryPolicy) -> Result<(), RepositoryError> {
        self.log.append(policy.key(), policy)
    }

    fn latest(&self, key: &SeriesKey) -> Result<Option<InventoryPolicy>, RepositoryError> {
        self.log
            .read(key, |all| all.iter().max_by_key(|p| p.computed_at).cloned())
    }
}

/// In-memory accuracy log for tests/dev.
#[derive(Debug)]
pub struct InMemoryAccuracyRepository {
    log: SeriesLog<AccuracyRecord>,
}

impl InMemoryAccuracyRepository {
    pub fn new() -> Self {
        Self { log: SeriesLog::new() }
    }
}

impl Default for InMemoryAccuracyRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl AccuracyRepository for InMemoryAccuracyRepository {
    fn save(&self, record: AccuracyRecord) -> Result<(), RepositoryError> {
        self.log.append(record.key(), record)
    }

    fn recent(&self, key: &SeriesKey, limit: usize) -> Result<Vec<AccuracyRecord>, RepositoryError> {
        self.log.read(key, |all| {
            let mut records = all.to_vec();
            records.sort_by_key(|r| r.computed_at);
            let start = records.len().saturating_sub(limit);
            records.split_off(start)
        })
    }
}

#[derive(Debug, Default)]
struct ScenarioTables {
    /// Every snapshot ever saved, in save order.
    snapshots: Vec<Scenario>,
    results: Vec<ScenarioResult>,
}

/// In-memory scenario snapshots and run results for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryScenarioRepository {
    inner: RwLock<ScenarioTables>,
}

impl InMemoryScenarioRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All snapshots of one scenario, in save order.
    pub fn snapshots_of(&self, id: ScenarioId) -> Result<Vec<Scenario>, RepositoryError> {
        let tables = self.inner.read().map_err(|_| poisoned())?;
        Ok(tables
            .snapshots
            .iter()
            .filter(|s| *s.id() == id)
            .cloned()
            .collect())
    }
}

impl ScenarioRepository for InMemoryScenarioRepository {
    fn save_scenario(&self, scenario: Scenario) -> Result<(), RepositoryError> {
        let mut tables = self.inner.write().map_err(|_| poisoned())?;
        tables.snapshots.push(scenario);
        Ok(())
    }

    fn save_result(&self, result: ScenarioResult) -> Result<(), RepositoryError> {
        let mut tables = self.inner.write().map_err(|_| poisoned())?;
        if tables.results.iter().any(|r| r.run_id == result.run_id) {
            return Err(RepositoryError::Conflict(format!(
                "run {} already has a result",
                result.run_id
            )));
        }
        tables.results.push(result);
        Ok(())
    }

    fn list(&self, filter: &ScenarioFilter) -> Result<Vec<Scenario>, RepositoryError> {
        let tables = self.inner.read().map_err(|_| poisoned())?;

        // First-seen order of ids, latest snapshot per id.
        let mut order: Vec<ScenarioId> = Vec::new();
        let mut latest: HashMap<ScenarioId, &Scenario> = HashMap::new();
        for snapshot in &tables.snapshots {
            let id = *snapshot.id();
            if latest.insert(id, snapshot).is_none() {
                order.push(id);
            }
        }

        Ok(order
            .into_iter()
            .filter_map(|id| latest.get(&id).copied())
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }

    fn results_for(&self, scenario_id: ScenarioId) -> Result<Vec<ScenarioResult>, RepositoryError> {
        let tables = self.inner.read().map_err(|_| poisoned())?;
        let mut results: Vec<ScenarioResult> = tables
            .results
            .iter()
            .filter(|r| r.scenario_id == scenario_id)
            .cloned()
            .collect();
        results.sort_by_key(|r| r.computed_at);
        Ok(results)
    }
}
