//! Collaborator interfaces.
//!
//! The engine never calls these itself; they describe what the surrounding
//! application must provide to feed the engine and keep its records. All stores
//! are append-only: saving a record never overwrites an earlier one.

use chrono::{DateTime, Utc};
use thiserror::Error;

use stockcast_core::{ScenarioId, SeriesKey};

use crate::accuracy::AccuracyRecord;
use crate::forecast::ForecastResult;
use crate::observation::DemandObservation;
use crate::policy::InventoryPolicy;
use crate::scenario::{Scenario, ScenarioResult};

/// Storage failure reported by a collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("storage failure: {0}")]
    Storage(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Source of time-ordered demand observations.
pub trait HistoryStore: Send + Sync {
    /// Observations of `key` whose period starts in `[since, until)`, oldest first.
    fn fetch_observations(
        &self,
        key: &SeriesKey,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<DemandObservation>, RepositoryError>;

    fn record_observation(&self, observation: DemandObservation) -> Result<(), RepositoryError>;
}

pub trait ForecastRepository: Send + Sync {
    fn save(&self, forecast: ForecastResult) -> Result<(), RepositoryError>;

    /// The forecast with the latest `generated_at` for `key`.
    fn latest(&self, key: &SeriesKey) -> Result<Option<ForecastResult>, RepositoryError>;
}

pub trait PolicyRepository: Send + Sync {
    fn save(&self, policy: InventoryPolicy) -> Result<(), RepositoryError>;

    /// The policy with the latest `computed_at` for `key`.
    fn latest(&self, key: &SeriesKey) -> Result<Option<InventoryPolicy>, RepositoryError>;
}

/// Selection criteria for [`ScenarioRepository::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioFilter {
    /// Status label (`draft`, `running`, `completed`, `failed`).
    pub state: Option<String>,
    pub name_contains: Option<String>,
}

impl ScenarioFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_name_containing(mut self, fragment: impl Into<String>) -> Self {
        self.name_contains = Some(fragment.into());
        self
    }

    pub fn matches(&self, scenario: &Scenario) -> bool {
        let state_ok = self
            .state
            .as_deref()
            .is_none_or(|s| s.eq_ignore_ascii_case(scenario.status().label()));
        let name_ok = self.name_contains.as_deref().is_none_or(|fragment| {
            scenario
                .name()
                .to_lowercase()
                .contains(&fragment.to_lowercase())
        });
        state_ok && name_ok
    }
}

pub trait ScenarioRepository: Send + Sync {
    /// Append a scenario snapshot.
    fn save_scenario(&self, scenario: Scenario) -> Result<(), RepositoryError>;

    fn save_result(&self, result: ScenarioResult) -> Result<(), RepositoryError>;

    /// Latest snapshot of every scenario matching `filter`.
    fn list(&self, filter: &ScenarioFilter) -> Result<Vec<Scenario>, RepositoryError>;

    /// All results of a scenario, oldest first.
    fn results_for(&self, scenario_id: ScenarioId) -> Result<Vec<ScenarioResult>, RepositoryError>;
}

pub trait AccuracyRepository: Send + Sync {
    fn save(&self, record: AccuracyRecord) -> Result<(), RepositoryError>;

    /// Up to `limit` most recent records of `key`, oldest first.
    fn recent(&self, key: &SeriesKey, limit: usize) -> Result<Vec<AccuracyRecord>, RepositoryError>;
}
