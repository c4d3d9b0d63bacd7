//! `stockcast-engine`
//!
//! **Responsibility:** replenishment and forecasting computations.
//!
//! Every component here is a pure, synchronous function over its inputs:
//! - It performs no IO and holds no shared mutable state.
//! - Persistence and scheduling belong to the collaborators described in
//!   [`repository`] (implemented by `stockcast-infra`).
//! - Results are immutable, timestamped records; re-running produces new
//!   records instead of mutating old ones.

pub mod accuracy;
pub mod config;
pub mod distribution;
pub mod error;
pub mod forecast;
pub mod observation;
pub mod policy;
pub mod repository;
pub mod scenario;

mod stats;

pub use accuracy::{AccuracyRecord, AccuracySummary, AccuracyTracker};
pub use config::{AccuracyConfig, CostModel, EngineConfig, ForecastConfig, PolicyConfig};
pub use distribution::{NormalApproximation, StandardizedDistribution};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use forecast::{
    ExogenousAdjustment, ForecastModel, ForecastRef, ForecastRequest, ForecastResult, QuantileForecast,
};
pub use observation::DemandObservation;
pub use policy::{DemandProfile, InventoryPolicy, PolicyCalculator, PolicyRequest, ReorderUrgency};
pub use repository::{
    AccuracyRepository, ForecastRepository, HistoryStore, PolicyRepository, RepositoryError,
    ScenarioFilter, ScenarioRepository,
};
pub use scenario::{Scenario, ScenarioExecution, ScenarioResult, ScenarioSimulator, ScenarioStatus};
