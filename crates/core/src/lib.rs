//! Shared building blocks for the replenishment engine: identifiers, periods, errors.
//!
//! This crate contains **pure** primitives (no infrastructure concerns):
//! identifiers, demand periods, and the domain error model.

pub mod entity;
pub mod error;
pub mod id;
pub mod period;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{RunId, ScenarioId, SeriesKey, SkuCode, StoreCode};
pub use period::Period;
