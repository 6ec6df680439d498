use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};

use moneyflow_accounts::{Account, Activity, ActivityWindow};
use moneyflow_core::{AccountId, ActivityId, Money};

use super::r#trait::{LoadAccountPort, StoreError, UpdateAccountStatePort};

#[derive(Debug, Clone, Default)]
struct StoredAccount {
    opening_balance: Money,
    activities: Vec<Activity>,
}

impl StoredAccount {
    fn balance(&self, id: AccountId) -> Money {
        self.opening_balance + ActivityWindow::new(self.activities.clone()).calculate_balance(id)
    }
}

/// In-memory account store implementing both account ports.
///
/// Intended for tests/dev. `update_all` commits every account under one write
/// lock: either all new activities are stored or none are.
#[derive(Debug)]
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<AccountId, StoredAccount>>,
    next_id: AtomicI64,
    load_calls: AtomicUsize,
    update_calls: AtomicUsize,
    fail_updates: AtomicBool,
}

impl Default for InMemoryAccountStore {
    fn default() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            load_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            fail_updates: AtomicBool::new(false),
        }
    }
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account with an opening balance; ids are handed out from 1.
    pub fn open_account(&self, opening_balance: Money) -> Result<AccountId, StoreError> {
        let id = AccountId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut accounts = self.write()?;
        accounts.insert(
            id,
            StoredAccount {
                opening_balance,
                activities: Vec::new(),
            },
        );
        tracing::debug!(account = %id, %opening_balance, "opened account");
        Ok(id)
    }

    /// Store a historical activity directly (seeding), bypassing any aggregate.
    pub fn record_activity(&self, activity: Activity) -> Result<ActivityId, StoreError> {
        let owner = activity.owner_account_id();
        let mut accounts = self.write()?;
        let stored = accounts
            .get_mut(&owner)
            .ok_or(StoreError::AccountNotFound(owner))?;

        let id = activity.id().unwrap_or_default();
        stored.activities.push(activity.with_id(id));
        Ok(id)
    }

    /// All-time balance: opening balance plus every stored activity.
    pub fn balance_of(&self, account_id: AccountId) -> Result<Money, StoreError> {
        let accounts = self.read()?;
        accounts
            .get(&account_id)
            .map(|stored| stored.balance(account_id))
            .ok_or(StoreError::AccountNotFound(account_id))
    }

    pub fn activities_of(&self, account_id: AccountId) -> Result<Vec<Activity>, StoreError> {
        let accounts = self.read()?;
        accounts
            .get(&account_id)
            .map(|stored| stored.activities.clone())
            .ok_or(StoreError::AccountNotFound(account_id))
    }

    /// Number of `load_account` calls served so far.
    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    /// Number of update calls (`update_activities` or `update_all`) served so far.
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Make every subsequent update fail with a backend error.
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<AccountId, StoredAccount>>, StoreError> {
        self.accounts
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<AccountId, StoredAccount>>, StoreError> {
        self.accounts
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn begin_update(&self) -> Result<(), StoreError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("update rejected by store".to_string()));
        }
        Ok(())
    }
}

/// Validate that every account can be written, then write all of them.
fn commit(
    accounts: &mut HashMap<AccountId, StoredAccount>,
    batch: &[&Account],
) -> Result<usize, StoreError> {
    let mut ids = Vec::with_capacity(batch.len());
    for account in batch {
        let id = account
            .id()
            .ok_or_else(|| StoreError::MissingIdentity("cannot persist an account without id".to_string()))?;
        if !accounts.contains_key(&id) {
            return Err(StoreError::AccountNotFound(id));
        }
        if let Some(foreign) = account
            .activity_window()
            .unpersisted()
            .find(|a| a.owner_account_id() != id)
        {
            return Err(StoreError::Backend(format!(
                "activity owned by {} cannot be stored under account {id}",
                foreign.owner_account_id()
            )));
        }
        ids.push(id);
    }

    let mut written = 0;
    for (account, id) in batch.iter().zip(ids) {
        if let Some(stored) = accounts.get_mut(&id) {
            for activity in account.activity_window().unpersisted() {
                stored
                    .activities
                    .push(activity.clone().with_id(ActivityId::new()));
                written += 1;
            }
        }
    }
    Ok(written)
}

impl LoadAccountPort for InMemoryAccountStore {
    fn load_account(
        &self,
        account_id: AccountId,
        baseline_date: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);

        let accounts = self.read()?;
        let stored = accounts
            .get(&account_id)
            .ok_or(StoreError::AccountNotFound(account_id))?;

        let (before, inside): (Vec<Activity>, Vec<Activity>) = stored
            .activities
            .iter()
            .cloned()
            .partition(|a| a.timestamp() < baseline_date);

        let baseline_balance =
            stored.opening_balance + ActivityWindow::new(before).calculate_balance(account_id);
        let window = ActivityWindow::for_account(account_id, inside)
            .map_err(|e| StoreError::Backend(format!("corrupt activity history: {e}")))?;

        Ok(Account::with_id(account_id, baseline_balance, window))
    }
}

impl UpdateAccountStatePort for InMemoryAccountStore {
    fn update_activities(&self, account: &Account) -> Result<(), StoreError> {
        self.begin_update()?;
        let mut accounts = self.write()?;
        let written = commit(&mut accounts, &[account])?;
        tracing::debug!(account = ?account.id(), written, "persisted activities");
        Ok(())
    }

    fn update_all(&self, batch: &[&Account]) -> Result<(), StoreError> {
        self.begin_update()?;
        let mut accounts = self.write()?;
        let written = commit(&mut accounts, batch)?;
        tracing::debug!(accounts = batch.len(), written, "persisted activities atomically");
        Ok(())
    }
}
