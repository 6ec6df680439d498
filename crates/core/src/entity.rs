//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Identity is optional: an entity built in memory gets its id from the
/// persistence side, so call sites that need a persisted entity must check for
/// presence instead of assuming it.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the identifier, if the entity has been persisted.
    fn id(&self) -> Option<Self::Id>;

    /// Returns the identifier or a `MissingIdentity` error naming `what`.
    fn require_id(&self, what: &str) -> crate::DomainResult<Self::Id> {
        self.id().ok_or_else(|| {
            crate::DomainError::missing_identity(format!("expected {what} id not to be empty"))
        })
    }
}
