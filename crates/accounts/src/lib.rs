//! Account domain module.
//!
//! Pure domain logic only: no IO, no locking, no persistence concerns. An
//! [`Account`] is a snapshot of an account's recent history: a baseline balance
//! plus the [`ActivityWindow`] of activities that happened after it.

pub mod account;
pub mod activity;
pub mod activity_window;

pub use account::Account;
pub use activity::{Activity, Direction};
pub use activity_window::ActivityWindow;
