//! Infrastructure layer: account ports, reference adapters, configuration and
//! the money transfer use case.

pub mod account_lock;
pub mod account_store;
pub mod config;
pub mod send_money;


pub use account_lock::{AccountLock, InProcessAccountLock, LockError, LockGuard};
pub use account_store::{InMemoryAccountStore, LoadAccountPort, StoreError, UpdateAccountStatePort};
pub use config::TransferConfig;
pub use send_money::{
    SendMoneyCommand, SendMoneyService, SendMoneyUseCase, TransferError, TransferReceipt,
};
