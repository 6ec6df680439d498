//! Per-account locking boundary.
//!
//! The transfer service depends on the [`AccountLock`] capability only; this
//! module ships the in-process implementation and an RAII guard.

pub mod in_process;
pub mod r#trait;

pub use in_process::InProcessAccountLock;
pub use r#trait::{AccountLock, LockError, LockGuard};
