use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use moneyflow_core::AccountId;

use super::r#trait::{AccountLock, LockError};

/// Mutex-map account lock for single-process deployments.
///
/// A set of held ids guarded by one mutex; waiters park on a condition variable
/// and give up with [`LockError::Timeout`] after `acquire_timeout`.
#[derive(Debug)]
pub struct InProcessAccountLock {
    held: Mutex<HashSet<AccountId>>,
    released: Condvar,
    acquire_timeout: Duration,
    lock_calls: AtomicUsize,
}

impl Default for InProcessAccountLock {
    fn default() -> Self {
        Self::with_timeout(Duration::from_secs(5))
    }
}

impl InProcessAccountLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(acquire_timeout: Duration) -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
            acquire_timeout,
            lock_calls: AtomicUsize::new(0),
        }
    }

    pub fn is_locked(&self, account_id: AccountId) -> bool {
        self.held
            .lock()
            .map(|held| held.contains(&account_id))
            .unwrap_or(false)
    }

    /// Number of acquire attempts (blocking and non-blocking) so far.
    pub fn lock_calls(&self) -> usize {
        self.lock_calls.load(Ordering::SeqCst)
    }

    /// Number of ids currently held.
    pub fn held_count(&self) -> usize {
        self.held.lock().map(|held| held.len()).unwrap_or(0)
    }
}

impl AccountLock for InProcessAccountLock {
    fn lock_account(&self, account_id: AccountId) -> Result<(), LockError> {
        self.lock_calls.fetch_add(1, Ordering::SeqCst);
        let deadline = Instant::now() + self.acquire_timeout;

        let mut held = self.held.lock().map_err(|_| LockError::Poisoned)?;
        while held.contains(&account_id) {
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(account = %account_id, "account lock wait timed out");
                return Err(LockError::Timeout(account_id));
            }
            let (guard, _) = self
                .released
                .wait_timeout(held, deadline - now)
                .map_err(|_| LockError::Poisoned)?;
            held = guard;
        }

        held.insert(account_id);
        Ok(())
    }

    fn try_lock_account(&self, account_id: AccountId) -> Result<bool, LockError> {
        self.lock_calls.fetch_add(1, Ordering::SeqCst);
        let mut held = self.held.lock().map_err(|_| LockError::Poisoned)?;
        Ok(held.insert(account_id))
    }

    fn release_account(&self, account_id: AccountId) -> Result<(), LockError> {
        let mut held = self.held.lock().map_err(|_| LockError::Poisoned)?;
        if !held.remove(&account_id) {
            return Err(LockError::NotHeld(account_id));
        }
        drop(held);
        self.released.notify_all();
        Ok(())
    }
}
