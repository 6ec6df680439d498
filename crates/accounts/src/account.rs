use chrono::Utc;

use moneyflow_core::{AccountId, DomainError, DomainResult, Entity, Money};

use crate::activity::Activity;
use crate::activity_window::ActivityWindow;

/// Aggregate root: Account.
///
/// A snapshot of an account: the balance it had right before its window starts,
/// plus the window of activities since then. Withdrawals and deposits are the
/// only ways to change it; both append a new activity to the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    id: Option<AccountId>,
    baseline_balance: Money,
    activity_window: ActivityWindow,
}

impl Account {
    /// An account that has not been persisted yet.
    pub fn without_id(baseline_balance: Money, activity_window: ActivityWindow) -> Self {
        Self {
            id: None,
            baseline_balance,
            activity_window,
        }
    }

    /// An account reconstructed from storage.
    pub fn with_id(
        id: AccountId,
        baseline_balance: Money,
        activity_window: ActivityWindow,
    ) -> Self {
        Self {
            id: Some(id),
            baseline_balance,
            activity_window,
        }
    }

    pub fn id(&self) -> Option<AccountId> {
        self.id
    }

    pub fn baseline_balance(&self) -> Money {
        self.baseline_balance
    }

    pub fn activity_window(&self) -> &ActivityWindow {
        &self.activity_window
    }

    /// Baseline balance plus the net effect of every activity in the window.
    pub fn calculate_balance(&self) -> Money {
        match self.id {
            Some(id) => self.baseline_balance + self.activity_window.calculate_balance(id),
            None => self.baseline_balance,
        }
    }

    /// Whether withdrawing `money` would leave the balance at zero or above.
    pub fn may_withdraw(&self, money: Money) -> bool {
        (self.calculate_balance() + money.negate()).is_positive_or_zero()
    }

    /// Withdraw `money` towards `target_account_id`.
    ///
    /// On `InsufficientFunds` nothing is mutated. On success the outgoing
    /// activity has been appended to the window and a copy is returned.
    pub fn withdraw(&mut self, money: Money, target_account_id: AccountId) -> DomainResult<Activity> {
        let id = self.require_id("withdrawing account")?;

        if !self.may_withdraw(money) {
            return Err(DomainError::InsufficientFunds {
                balance: self.calculate_balance(),
                requested: money,
            });
        }

        let withdrawal = Activity::new(id, id, target_account_id, Utc::now(), money)?;
        self.activity_window.add_activity(withdrawal.clone())?;
        Ok(withdrawal)
    }

    /// Deposit `money` coming from `source_account_id`.
    ///
    /// No rule limits incoming funds; only malformed input fails.
    pub fn deposit(&mut self, money: Money, source_account_id: AccountId) -> DomainResult<Activity> {
        let id = self.require_id("depositing account")?;

        let deposit = Activity::new(id, source_account_id, id, Utc::now(), money)?;
        self.activity_window.add_activity(deposit.clone())?;
        Ok(deposit)
    }
}

impl Entity for Account {
    type Id = AccountId;

    fn id(&self) -> Option<AccountId> {
        self.id
    }
}
