use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use moneyflow_core::{AccountId, ActivityId, DomainError, DomainResult, Money, ValueObject};

/// Which way money moves, seen from the owning account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// One leg of a money movement, as seen by its owning account (immutable).
///
/// A transfer produces two activities sharing source, target and amount: one
/// owned by the source account (outgoing), one owned by the target (incoming).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    id: Option<ActivityId>,
    owner_account_id: AccountId,
    source_account_id: AccountId,
    target_account_id: AccountId,
    timestamp: DateTime<Utc>,
    money: Money,
}

impl ValueObject for Activity {}

impl Activity {
    /// Build an activity that has not been persisted yet.
    ///
    /// The amount must be non-negative and the owner must be one of the two legs.
    pub fn new(
        owner_account_id: AccountId,
        source_account_id: AccountId,
        target_account_id: AccountId,
        timestamp: DateTime<Utc>,
        money: Money,
    ) -> DomainResult<Self> {
        if money.is_negative() {
            return Err(DomainError::validation(format!(
                "activity amount must not be negative (got {money})"
            )));
        }
        if owner_account_id != source_account_id && owner_account_id != target_account_id {
            return Err(DomainError::invalid_activity(format!(
                "owner {owner_account_id} is neither source {source_account_id} nor target {target_account_id}"
            )));
        }

        Ok(Self {
            id: None,
            owner_account_id,
            source_account_id,
            target_account_id,
            timestamp,
            money,
        })
    }

    /// The same activity, marked as stored under `id`.
    pub fn with_id(mut self, id: ActivityId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn id(&self) -> Option<ActivityId> {
        self.id
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn owner_account_id(&self) -> AccountId {
        self.owner_account_id
    }

    pub fn source_account_id(&self) -> AccountId {
        self.source_account_id
    }

    pub fn target_account_id(&self) -> AccountId {
        self.target_account_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn money(&self) -> Money {
        self.money
    }

    pub fn direction(&self) -> Direction {
        if self.owner_account_id == self.source_account_id {
            Direction::Outgoing
        } else {
            Direction::Incoming
        }
    }

    pub fn is_outgoing(&self) -> bool {
        self.direction() == Direction::Outgoing
    }

    pub fn is_incoming(&self) -> bool {
        self.direction() == Direction::Incoming
    }

    /// Signed effect of this activity on `account_id`'s balance.
    pub(crate) fn delta_for(&self, account_id: AccountId) -> Money {
        let mut delta = Money::ZERO;
        if self.target_account_id == account_id {
            delta = delta + self.money;
        }
        if self.source_account_id == account_id {
            delta = delta - self.money;
        }
        delta
    }
}
