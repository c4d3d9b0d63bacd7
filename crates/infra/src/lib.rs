//! Infrastructure layer: in-memory stores, config loading, orchestration.

pub mod config;
pub mod repositories;
pub mod scenario_runner;
pub mod service;

pub use repositories::{
    InMemoryAccuracyRepository, InMemoryForecastRepository, InMemoryHistoryStore,
    InMemoryPolicyRepository, InMemoryScenarioRepository,
};
pub use scenario_runner::{ScenarioBatchRunner, ScenarioJob};
pub use service::{PlannedSeries, ReplenishmentService, ServiceError, ServiceResult, Stores};
