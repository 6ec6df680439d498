use chrono::{DateTime, Utc};
use thiserror::Error;

use moneyflow_accounts::Account;
use moneyflow_core::AccountId;
use std::sync::Arc;

/// Account persistence error.
///
/// These are **infrastructure errors** as opposed to domain errors (validation,
/// the overdraft rule).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    #[error("account has no identity: {0}")]
    MissingIdentity(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Loads account snapshots.
///
/// The returned account's window holds every activity at or after
/// `baseline_date`; its baseline balance is the balance right before that
/// date. This bounds the loaded history regardless of account age.
pub trait LoadAccountPort: Send + Sync {
    fn load_account(
        &self,
        account_id: AccountId,
        baseline_date: DateTime<Utc>,
    ) -> Result<Account, StoreError>;
}

/// Persists activities an account gained in memory.
///
/// Only activities without an id are written. Idempotency is up to the
/// implementation: writing the same in-memory account twice may store its new
/// activities twice.
pub trait UpdateAccountStatePort: Send + Sync {
    fn update_activities(&self, account: &Account) -> Result<(), StoreError>;

    /// Persist several accounts as one unit.
    ///
    /// The default writes them one by one, so a failure part way through leaves
    /// the earlier accounts written. Implementations that can commit all of them
    /// in a single step should override this.
    fn update_all(&self, accounts: &[&Account]) -> Result<(), StoreError> {
        for account in accounts {
            self.update_activities(account)?;
        }
        Ok(())
    }
}

impl<S> LoadAccountPort for Arc<S>
where
    S: LoadAccountPort + ?Sized,
{
    fn load_account(
        &self,
        account_id: AccountId,
        baseline_date: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        (**self).load_account(account_id, baseline_date)
    }
}

impl<S> UpdateAccountStatePort for Arc<S>
where
    S: UpdateAccountStatePort + ?Sized,
{
    fn update_activities(&self, account: &Account) -> Result<(), StoreError> {
        (**self).update_activities(account)
    }

    fn update_all(&self, accounts: &[&Account]) -> Result<(), StoreError> {
        (**self).update_all(accounts)
    }
}
