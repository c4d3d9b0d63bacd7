//! Store adapters for the engine's collaborator traits.

mod in_memory;

pub use in_memory::{
    InMemoryAccuracyRepository, InMemoryForecastRepository, InMemoryHistoryStore,
    InMemoryPolicyRepository, InMemoryScenarioRepository,
};
