//! Entity trait: identity that survives across immutable snapshots.

/// Entity marker + minimal interface.
///
/// Engine records are append-only snapshots; two snapshots of the same entity
/// share an identifier even when their contents differ (e.g. a scenario moving
/// from `Draft` to `Completed`).
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
