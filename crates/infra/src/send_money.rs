//! Money transfer orchestration (application-level use case).
//!
//! `SendMoneyService` moves money between two accounts through the three ports
//! it is built from: an account loader, an account state updater and an
//! account lock.
//!
//! ## Transfer flow
//!
//! ```text
//! SendMoneyCommand
//!   ↓
//! 1. Threshold check (no loads, no locks on failure)
//!   ↓
//! 2. Load both accounts with a bounded lookback window; both must carry an id
//!   ↓
//! 3. Lock source, re-read source, withdraw (overdraft rule lives in Account)
//!   ↓
//! 4. Lock target, re-read target, deposit
//!   ↓
//! 5. Persist both accounts in one update call
//!   ↓
//! 6. Release both locks
//! ```
//!
//! Locks are always taken source first. Every acquired lock is held by a
//! [`LockGuard`], so it is released on every exit path, including persistence
//! failures and panics.
//!
//! ## Contention
//!
//! Waiting for the target while holding the source would deadlock two
//! opposite-direction transfers. The target is therefore taken with a
//! non-blocking acquire; when it is busy the source lock is released, the
//! in-memory copies are dropped and the round starts over after a jittered
//! pause. After `max_lock_attempts` rounds the transfer fails with
//! [`TransferError::Contended`]. Failed transfers are never retried here.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use thiserror::Error;

use moneyflow_accounts::{Account, Activity};
use moneyflow_core::{AccountId, DomainError, DomainResult, Entity, Money};

use crate::account_lock::{AccountLock, LockError, LockGuard};
use crate::account_store::{LoadAccountPort, StoreError, UpdateAccountStatePort};
use crate::config::TransferConfig;

/// Command: move `money` from `source_account_id` to `target_account_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMoneyCommand {
    source_account_id: AccountId,
    target_account_id: AccountId,
    money: Money,
}

impl SendMoneyCommand {
    pub fn new(
        source_account_id: AccountId,
        target_account_id: AccountId,
        money: Money,
    ) -> DomainResult<Self> {
        if !money.is_positive() {
            return Err(DomainError::validation(format!(
                "transfer amount must be positive (got {money})"
            )));
        }
        if source_account_id == target_account_id {
            return Err(DomainError::validation(format!(
                "source and target account must differ (both {source_account_id})"
            )));
        }

        Ok(Self {
            source_account_id,
            target_account_id,
            money,
        })
    }

    pub fn source_account_id(&self) -> AccountId {
        self.source_account_id
    }

    pub fn target_account_id(&self) -> AccountId {
        self.target_account_id
    }

    pub fn money(&self) -> Money {
        self.money
    }
}

/// Outcome of a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub withdrawal: Activity,
    pub deposit: Activity,
    pub source_balance: Money,
    pub target_balance: Money,
}

/// Why a transfer did not happen.
///
/// Every variant leaves persisted state untouched, except `Persistence` when the
/// update port does not commit atomically.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("maximum threshold for transferring money exceeded: tried {attempted}, threshold is {threshold}")]
    ThresholdExceeded { threshold: Money, attempted: Money },

    #[error("insufficient funds on account {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        balance: Money,
        requested: Money,
    },

    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    #[error("loaded account has no identity: {0}")]
    MissingIdentity(String),

    #[error("could not acquire account lock: {0}")]
    LockAcquisition(#[from] LockError),

    #[error("target lock stayed contended for {attempts} attempts")]
    Contended { attempts: u32 },

    #[error("persisting the transfer failed: {0}")]
    Persistence(StoreError),

    #[error("transfer rejected: {0}")]
    Rejected(DomainError),

    #[error("lookback of {0} reaches before the earliest representable date")]
    LookbackOutOfRange(chrono::Duration),
}

impl From<StoreError> for TransferError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::AccountNotFound(id) => TransferError::AccountNotFound(id),
            StoreError::MissingIdentity(msg) => TransferError::MissingIdentity(msg),
            other => TransferError::Persistence(other),
        }
    }
}

impl From<DomainError> for TransferError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::MissingIdentity(msg) => TransferError::MissingIdentity(msg),
            other => TransferError::Rejected(other),
        }
    }
}

/// Inbound port: the single command surface adapters call.
pub trait SendMoneyUseCase: Send + Sync {
    fn send_money(&self, command: &SendMoneyCommand) -> Result<TransferReceipt, TransferError>;
}

/// Transfer orchestrator.
///
/// Owns no state besides its collaborators: each call loads its own copies of
/// the two accounts and drops them when it returns, so concurrent transfers on
/// disjoint accounts proceed in parallel.
#[derive(Debug)]
pub struct SendMoneyService<L, U, K> {
    load_account_port: L,
    update_account_state_port: U,
    account_lock: K,
    config: TransferConfig,
}

/// One contended round ended; the caller should pause and start over.
struct Contention;

impl<L, U, K> SendMoneyService<L, U, K> {
    pub fn new(
        load_account_port: L,
        update_account_state_port: U,
        account_lock: K,
        config: TransferConfig,
    ) -> Self {
        Self {
            load_account_port,
            update_account_state_port,
            account_lock,
            config,
        }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn into_parts(self) -> (L, U, K) {
        (
            self.load_account_port,
            self.update_account_state_port,
            self.account_lock,
        )
    }
}

impl<L, U, K> SendMoneyService<L, U, K>
where
    L: LoadAccountPort,
    U: UpdateAccountStatePort,
    K: AccountLock,
{
    /// Run one transfer to completion or to its first failure.
    pub fn send_money(&self, command: &SendMoneyCommand) -> Result<TransferReceipt, TransferError> {
        let span = tracing::info_span!(
            "send_money",
            source = %command.source_account_id,
            target = %command.target_account_id,
            amount = %command.money,
        );
        let _entered = span.enter();

        let result = self.execute(command);
        match &result {
            Ok(receipt) => tracing::info!(
                source_balance = %receipt.source_balance,
                target_balance = %receipt.target_balance,
                "transfer committed"
            ),
            Err(e) => tracing::warn!(error = %e, "transfer failed"),
        }
        result
    }

    fn execute(&self, command: &SendMoneyCommand) -> Result<TransferReceipt, TransferError> {
        self.check_threshold(command)?;
        tracing::debug!("threshold checked");

        let baseline_date = Utc::now()
            .checked_sub_signed(self.config.lookback)
            .ok_or(TransferError::LookbackOutOfRange(self.config.lookback))?;

        let source = self
            .load_account_port
            .load_account(command.source_account_id, baseline_date)?;
        let target = self
            .load_account_port
            .load_account(command.target_account_id, baseline_date)?;

        let source_id = source.require_id("source account")?;
        let target_id = target.require_id("target account")?;
        tracing::debug!("accounts loaded");

        let attempts = self.config.max_lock_attempts.max(1);
        for attempt in 1..=attempts {
            match self.attempt(source_id, target_id, command.money, baseline_date)? {
                Ok(receipt) => return Ok(receipt),
                Err(Contention) => {
                    tracing::debug!(attempt, "target lock busy; backing off");
                    if attempt < attempts {
                        self.back_off(attempt);
                    }
                }
            }
        }

        Err(TransferError::Contended { attempts })
    }

    /// One locking round: lock source, withdraw, try target, deposit, persist.
    fn attempt(
        &self,
        source_id: AccountId,
        target_id: AccountId,
        money: Money,
        baseline_date: DateTime<Utc>,
    ) -> Result<Result<TransferReceipt, Contention>, TransferError> {
        let source_guard = LockGuard::acquire(&self.account_lock, source_id)?;
        tracing::debug!("source locked");

        // Re-read under the lock so the overdraft rule sees every committed transfer.
        let mut source = self.load_account(source_id, baseline_date)?;
        let withdrawal = match source.withdraw(money, target_id) {
            Ok(activity) => activity,
            Err(DomainError::InsufficientFunds { balance, requested }) => {
                drop(source_guard);
                return Err(TransferError::InsufficientFunds {
                    account: source_id,
                    balance,
                    requested,
                });
            }
            Err(other) => return Err(other.into()),
        };
        tracing::debug!("withdrawn");

        let Some(target_guard) = LockGuard::try_acquire(&self.account_lock, target_id)? else {
            drop(source_guard);
            return Ok(Err(Contention));
        };
        tracing::debug!("target locked");

        let mut target = self.load_account(target_id, baseline_date)?;
        let deposit = target.deposit(money, source_id)?;
        tracing::debug!("deposited");

        self.update_account_state_port
            .update_all(&[&source, &target])
            .map_err(TransferError::Persistence)?;
        tracing::debug!("persisted");

        let receipt = TransferReceipt {
            withdrawal,
            deposit,
            source_balance: source.calculate_balance(),
            target_balance: target.calculate_balance(),
        };

        drop(target_guard);
        drop(source_guard);
        tracing::debug!("locks released");

        Ok(Ok(receipt))
    }

    fn check_threshold(&self, command: &SendMoneyCommand) -> Result<(), TransferError> {
        let threshold = self.config.maximum_transfer_threshold;
        if command.money.is_greater_than(threshold) {
            return Err(TransferError::ThresholdExceeded {
                threshold,
                attempted: command.money,
            });
        }
        Ok(())
    }

    fn load_account(
        &self,
        account_id: AccountId,
        baseline_date: DateTime<Utc>,
    ) -> Result<Account, TransferError> {
        let account = self
            .load_account_port
            .load_account(account_id, baseline_date)?;
        if account.id() != Some(account_id) {
            return Err(TransferError::MissingIdentity(format!(
                "expected account {account_id}, loaded {:?}",
                account.id()
            )));
        }
        Ok(account)
    }

    fn back_off(&self, attempt: u32) {
        let base = self.config.lock_backoff;
        if base.is_zero() {
            std::thread::yield_now();
            return;
        }
        std::thread::sleep(backoff_delay(base, attempt));
    }
}

/// Pause before round `attempt + 1`: the base scaled by the attempt (capped at 8)
/// plus up to one base of jitter. Saturates instead of overflowing.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let base_us = u64::try_from(base.as_micros()).unwrap_or(u64::MAX);
    let scaled = base_us.saturating_mul(u64::from(attempt.min(8)));
    let jitter = rand::rng().random_range(0..=base_us);
    Duration::from_micros(scaled.saturating_add(jitter))
}

impl<L, U, K> SendMoneyUseCase for SendMoneyService<L, U, K>
where
    L: LoadAccountPort,
    U: UpdateAccountStatePort,
    K: AccountLock,
{
    fn send_money(&self, command: &SendMoneyCommand) -> Result<TransferReceipt, TransferError> {
        SendMoneyService::send_money(self, command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use moneyflow_accounts::ActivityWindow;
    use proptest::prelude::*;

    use crate::account_lock::InProcessAccountLock;
    use crate::account_store::InMemoryAccountStore;

    type Service =
        SendMoneyService<Arc<InMemoryAccountStore>, Arc<InMemoryAccountStore>, Arc<InProcessAccountLock>>;

    fn setup(config: TransferConfig) -> (Service, Arc<InMemoryAccountStore>, Arc<InProcessAccountLock>) {
        let store = Arc::new(InMemoryAccountStore::new());
        let lock = Arc::new(InProcessAccountLock::new());
        let service = SendMoneyService::new(store.clone(), store.clone(), lock.clone(), config);
        (service, store, lock)
    }

    fn command(source: AccountId, target: AccountId, amount: i64) -> SendMoneyCommand {
        SendMoneyCommand::new(source, target, Money::of(amount)).unwrap()
    }

    #[test]
    fn command_rejects_non_positive_amounts_and_self_transfers() {
        let (a, b) = (AccountId::new(1), AccountId::new(2));
        assert!(matches!(
            SendMoneyCommand::new(a, b, Money::ZERO),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            SendMoneyCommand::new(a, b, Money::of(-5)),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            SendMoneyCommand::new(a, a, Money::of(5)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn transaction_succeeds() {
        let (service, store, lock) = setup(TransferConfig::default());
        let a = store.open_account(Money::of(500)).unwrap();
        let b = store.open_account(Money::of(20)).unwrap();

        let receipt = service.send_money(&command(a, b, 300)).unwrap();

        assert_eq!(receipt.source_balance, Money::of(200));
        assert_eq!(receipt.target_balance, Money::of(320));
        assert!(receipt.withdrawal.is_outgoing());
        assert!(receipt.deposit.is_incoming());
        assert_eq!(receipt.withdrawal.money(), receipt.deposit.money());
        assert_eq!(store.balance_of(a).unwrap(), Money::of(200));
        assert_eq!(store.balance_of(b).unwrap(), Money::of(320));
        assert_eq!(store.update_calls(), 1);
        assert_eq!(lock.held_count(), 0);
    }

    #[test]
    fn given_withdrawal_fails_then_only_source_account_is_locked_and_released() {
        let (service, store, lock) = setup(TransferConfig::default());
        let a = store.open_account(Money::of(100)).unwrap();
        let b = store.open_account(Money::ZERO).unwrap();

        let err = service.send_money(&command(a, b, 101)).unwrap_err();

        assert_eq!(
            err,
            TransferError::InsufficientFunds {
                account: a,
                balance: Money::of(100),
                requested: Money::of(101),
            }
        );
        assert_eq!(lock.lock_calls(), 1);
        assert_eq!(lock.held_count(), 0);
        assert_eq!(store.update_calls(), 0);
        assert_eq!(store.balance_of(a).unwrap(), Money::of(100));
    }

    #[test]
    fn threshold_boundary() {
        let config = TransferConfig::default().with_maximum_transfer_threshold(Money::of(1_000));
        let (service, store, lock) = setup(config);
        let a = store.open_account(Money::of(5_000)).unwrap();
        let b = store.open_account(Money::ZERO).unwrap();
        assert!(service.send_money(&command(a, b, 1_000)).is_ok());

        let loads = store.load_calls();
        let locks = lock.lock_calls();
        let err = service.send_money(&command(a, b, 1_001)).unwrap_err();
        assert_eq!(
            err,
            TransferError::ThresholdExceeded {
                threshold: Money::of(1_000),
                attempted: Money::of(1_001),
            }
        );
        assert_eq!(store.load_calls(), loads);
        assert_eq!(lock.lock_calls(), locks);
    }

    #[test]
    fn unknown_account_fails_before_locking() {
        let (service, store, lock) = setup(TransferConfig::default());
        let a = store.open_account(Money::of(10)).unwrap();

        let err = service
            .send_money(&command(a, AccountId::new(404), 1))
            .unwrap_err();
        assert_eq!(err, TransferError::AccountNotFound(AccountId::new(404)));
        assert_eq!(lock.lock_calls(), 0);
    }

    #[test]
    fn persistence_failure_releases_both_locks() {
        let (service, store, lock) = setup(TransferConfig::default());
        let a = store.open_account(Money::of(10)).unwrap();
        let b = store.open_account(Money::of(10)).unwrap();
        store.fail_updates(true);

        let err = service.send_money(&command(a, b, 5)).unwrap_err();
        assert!(matches!(err, TransferError::Persistence(StoreError::Backend(_))));
        assert_eq!(lock.held_count(), 0);
        assert_eq!(store.balance_of(a).unwrap(), Money::of(10));
        assert_eq!(store.balance_of(b).unwrap(), Money::of(10));
    }

    #[test]
    fn busy_target_exhausts_attempts_and_releases_source() {
        let config = TransferConfig::default()
            .with_max_lock_attempts(3)
            .with_lock_backoff(Duration::ZERO);
        let (service, store, lock) = setup(config);
        let a = store.open_account(Money::of(10)).unwrap();
        let b = store.open_account(Money::ZERO).unwrap();
        lock.lock_account(b).unwrap();

        let err = service.send_money(&command(a, b, 5)).unwrap_err();
        assert_eq!(err, TransferError::Contended { attempts: 3 });
        assert!(!lock.is_locked(a));
        assert!(lock.is_locked(b));
        assert_eq!(store.balance_of(a).unwrap(), Money::of(10));
    }

    #[test]
    fn busy_source_times_out_as_lock_failure() {
        let store = Arc::new(InMemoryAccountStore::new());
        let lock = Arc::new(InProcessAccountLock::with_timeout(Duration::from_millis(10)));
        let service = SendMoneyService::new(
            store.clone(),
            store.clone(),
            lock.clone(),
            TransferConfig::default(),
        );
        let a = store.open_account(Money::of(10)).unwrap();
        let b = store.open_account(Money::ZERO).unwrap();
        lock.lock_account(a).unwrap();

        let err = service.send_money(&command(a, b, 5)).unwrap_err();
        assert_eq!(err, TransferError::LockAcquisition(LockError::Timeout(a)));
        assert_eq!(store.update_calls(), 0);
    }

    /// Loader that forgets account ids, as a broken adapter would.
    struct AnonymousLoader;

    impl LoadAccountPort for AnonymousLoader {
        fn load_account(&self, _: AccountId, _: DateTime<Utc>) -> Result<Account, StoreError> {
            Ok(Account::without_id(Money::of(1_000), ActivityWindow::empty()))
        }
    }

    #[test]
    fn loaded_account_without_id_is_fatal() {
        let store = Arc::new(InMemoryAccountStore::new());
        let lock = Arc::new(InProcessAccountLock::new());
        let service =
            SendMoneyService::new(AnonymousLoader, store.clone(), lock.clone(), TransferConfig::default());

        let err = service
            .send_money(&command(AccountId::new(1), AccountId::new(2), 5))
            .unwrap_err();
        assert!(matches!(err, TransferError::MissingIdentity(msg) if msg.contains("source account")));
        assert_eq!(lock.lock_calls(), 0);
        assert_eq!(store.update_calls(), 0);
    }

    /// Loader whose target account carries history owned by another account,
    /// so the deposit is refused after both locks are taken.
    struct ForeignTargetLoader {
        store: Arc<InMemoryAccountStore>,
        target: AccountId,
    }

    impl LoadAccountPort for ForeignTargetLoader {
        fn load_account(&self, id: AccountId, at: DateTime<Utc>) -> Result<Account, StoreError> {
            if id != self.target {
                return self.store.load_account(id, at);
            }
            let stranger = AccountId::new(9);
            let foreign = Activity::new(stranger, stranger, id, at, Money::of(1)).unwrap();
            Ok(Account::with_id(id, Money::ZERO, ActivityWindow::new(vec![foreign])))
        }
    }

    #[test]
    fn given_deposit_fails_then_both_locks_are_released_and_nothing_is_persisted() {
        let store = Arc::new(InMemoryAccountStore::new());
        let lock = Arc::new(InProcessAccountLock::new());
        let a = store.open_account(Money::of(100)).unwrap();
        let b = store.open_account(Money::ZERO).unwrap();
        let loader = ForeignTargetLoader {
            store: store.clone(),
            target: b,
        };
        let service = SendMoneyService::new(loader, store.clone(), lock.clone(), TransferConfig::default());

        let err = service.send_money(&command(a, b, 40)).unwrap_err();

        assert!(matches!(err, TransferError::Rejected(DomainError::InvalidActivity(_))));
        assert_eq!(lock.lock_calls(), 2);
        assert_eq!(lock.held_count(), 0);
        assert_eq!(store.update_calls(), 0);
        assert_eq!(store.balance_of(a).unwrap(), Money::of(100));
        assert!(store.activities_of(a).unwrap().is_empty());
    }

    #[test]
    fn lookback_before_the_earliest_date_is_an_error() {
        let mut config = TransferConfig::default();
        config.lookback = chrono::Duration::MAX;
        let (service, store, lock) = setup(config);
        let a = store.open_account(Money::of(10)).unwrap();
        let b = store.open_account(Money::ZERO).unwrap();

        let err = service.send_money(&command(a, b, 5)).unwrap_err();
        assert!(matches!(err, TransferError::LookbackOutOfRange(_)));
        assert_eq!(store.load_calls(), 0);
        assert_eq!(lock.lock_calls(), 0);
    }

    #[test]
    fn backoff_delay_is_bounded_and_saturates() {
        let base = Duration::from_millis(2);
        for attempt in 1..=20 {
            let delay = backoff_delay(base, attempt);
            assert!(delay >= base * attempt.min(8));
            assert!(delay <= base * (attempt.min(8) + 1));
        }

        assert_eq!(
            backoff_delay(Duration::from_secs(u64::MAX), 64),
            Duration::from_micros(u64::MAX)
        );
    }

    proptest! {
        #[test]
        fn transfers_conserve_the_pair_total(
            source_balance in 0i64..10_000,
            target_balance in 0i64..10_000,
            amount in 1i64..20_000,
        ) {
            let (service, store, lock) = setup(TransferConfig::default());
            let a = store.open_account(Money::of(source_balance)).unwrap();
            let b = store.open_account(Money::of(target_balance)).unwrap();

            let result = service.send_money(&command(a, b, amount));

            if amount <= source_balance {
                let receipt = result.unwrap();
                prop_assert_eq!(receipt.source_balance, Money::of(source_balance - amount));
                prop_assert_eq!(receipt.target_balance, Money::of(target_balance + amount));
            } else {
                let is_insufficient = matches!(result, Err(TransferError::InsufficientFunds { .. }));
                prop_assert!(is_insufficient);
            }
            prop_assert_eq!(
                store.balance_of(a).unwrap() + store.balance_of(b).unwrap(),
                Money::of(source_balance + target_balance)
            );
            prop_assert!(store.balance_of(a).unwrap().is_positive_or_zero());
            prop_assert_eq!(lock.held_count(), 0);
        }
    }

    #[test]
    fn works_through_the_use_case_trait_object() {
        let (service, store, _) = setup(TransferConfig::default());
        let a = store.open_account(Money::of(10)).unwrap();
        let b = store.open_account(Money::ZERO).unwrap();

        let use_case: &dyn SendMoneyUseCase = &service;
        assert!(use_case.send_money(&command(a, b, 10)).is_ok());
        assert_eq!(store.balance_of(a).unwrap(), Money::ZERO);
    }
}
