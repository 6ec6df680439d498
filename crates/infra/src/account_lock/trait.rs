use thiserror::Error;

use moneyflow_core::AccountId;
use std::sync::Arc;

/// Account lock operation error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("timed out waiting for the lock on account {0}")]
    Timeout(AccountId),

    #[error("lock on account {0} is not held")]
    NotHeld(AccountId),

    #[error("lock state poisoned")]
    Poisoned,

    #[error("lock backend failure: {0}")]
    Backend(String),
}

/// Per-account mutual exclusion across concurrent transfers.
///
/// An in-process implementation serves single-node deployments; a shared-storage
/// implementation can serve several nodes behind the same interface.
///
/// Locks are not reentrant: a caller must not lock an id it already holds.
pub trait AccountLock: Send + Sync {
    /// Block until the lock on `account_id` is held by the caller.
    fn lock_account(&self, account_id: AccountId) -> Result<(), LockError>;

    /// Take the lock if it is free; `Ok(false)` means someone else holds it.
    ///
    /// The default blocks, for backends without a non-blocking acquire.
    fn try_lock_account(&self, account_id: AccountId) -> Result<bool, LockError> {
        self.lock_account(account_id).map(|()| true)
    }

    fn release_account(&self, account_id: AccountId) -> Result<(), LockError>;
}

impl<L> AccountLock for Arc<L>
where
    L: AccountLock + ?Sized,
{
    fn lock_account(&self, account_id: AccountId) -> Result<(), LockError> {
        (**self).lock_account(account_id)
    }

    fn try_lock_account(&self, account_id: AccountId) -> Result<bool, LockError> {
        (**self).try_lock_account(account_id)
    }

    fn release_account(&self, account_id: AccountId) -> Result<(), LockError> {
        (**self).release_account(account_id)
    }
}

/// Holds one account lock and releases it when dropped.
///
/// Call [`LockGuard::release`] to observe the release result; a failed release on
/// drop is logged.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a, L: AccountLock + ?Sized> {
    lock: &'a L,
    account_id: AccountId,
    held: bool,
}

impl<'a, L: AccountLock + ?Sized> LockGuard<'a, L> {
    /// Block until `account_id` is locked.
    pub fn acquire(lock: &'a L, account_id: AccountId) -> Result<Self, LockError> {
        lock.lock_account(account_id)?;
        Ok(Self {
            lock,
            account_id,
            held: true,
        })
    }

    /// Lock `account_id` only if it is free right now.
    pub fn try_acquire(lock: &'a L, account_id: AccountId) -> Result<Option<Self>, LockError> {
        if lock.try_lock_account(account_id)? {
            Ok(Some(Self {
                lock,
                account_id,
                held: true,
            }))
        } else {
            Ok(None)
        }
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn release(mut self) -> Result<(), LockError> {
        self.held = false;
        self.lock.release_account(self.account_id)
    }
}

impl<L: AccountLock + ?Sized> Drop for LockGuard<'_, L> {
    fn drop(&mut self) {
        if self.held {
            if let Err(e) = self.lock.release_account(self.account_id) {
                tracing::error!(account = %self.account_id, error = %e, "failed to release account lock");
            }
        }
    }
}

impl<L: AccountLock + ?Sized> core::fmt::Debug for LockGuard<'_, L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LockGuard")
            .field("account_id", &self.account_id)
            .field("held", &self.held)
            .finish()
    }
}
