//! Account persistence boundary.
//!
//! Ports the transfer service uses to load account snapshots and persist the
//! activities they gained, plus an in-memory implementation for tests/dev.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryAccountStore;
pub use r#trait::{LoadAccountPort, StoreError, UpdateAccountStatePort};
