use chrono::{DateTime, Utc};

use moneyflow_core::{AccountId, DomainError, DomainResult, Money};

use crate::activity::Activity;

/// A trailing slice of one account's activities, ordered by timestamp.
///
/// The window never holds the full history: the balance it computes is relative
/// to the owning account's baseline balance. Additions stay in memory until the
/// persistence side stores them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityWindow {
    account_id: Option<AccountId>,
    activities: Vec<Activity>,
}

impl ActivityWindow {
    /// Build a window from loaded activities (sorted by timestamp, stable).
    pub fn new(mut activities: Vec<Activity>) -> Self {
        activities.sort_by_key(Activity::timestamp);
        Self {
            account_id: None,
            activities,
        }
    }

    /// Build a window bound to `account_id`; every activity must be owned by it.
    pub fn for_account(account_id: AccountId, activities: Vec<Activity>) -> DomainResult<Self> {
        if let Some(foreign) = activities
            .iter()
            .find(|a| a.owner_account_id() != account_id)
        {
            return Err(DomainError::invalid_activity(format!(
                "activity owned by {} cannot join the window of {account_id}",
                foreign.owner_account_id()
            )));
        }
        let mut window = Self::new(activities);
        window.account_id = Some(account_id);
        Ok(window)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Append an activity (memory only).
    ///
    /// The activity keeps timestamp order: it lands after every activity with an
    /// equal or earlier timestamp.
    pub fn add_activity(&mut self, activity: Activity) -> DomainResult<()> {
        if let Some(owner) = self.owner() {
            if activity.owner_account_id() != owner {
                return Err(DomainError::invalid_activity(format!(
                    "activity owned by {} cannot join the window of {owner}",
                    activity.owner_account_id()
                )));
            }
        }

        let at = self
            .activities
            .partition_point(|a| a.timestamp() <= activity.timestamp());
        self.activities.insert(at, activity);
        Ok(())
    }

    /// Incoming minus outgoing amounts for `account_id` across the window.
    pub fn calculate_balance(&self, account_id: AccountId) -> Money {
        self.activities.iter().map(|a| a.delta_for(account_id)).sum()
    }

    /// Timestamp of the earliest activity; the window's start boundary.
    pub fn start_timestamp(&self) -> Option<DateTime<Utc>> {
        self.activities.first().map(Activity::timestamp)
    }

    /// Timestamp of the latest activity.
    pub fn end_timestamp(&self) -> Option<DateTime<Utc>> {
        self.activities.last().map(Activity::timestamp)
    }

    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    /// Activities added in memory that have not been stored yet.
    pub fn unpersisted(&self) -> impl Iterator<Item = &Activity> {
        self.activities.iter().filter(|a| !a.is_persisted())
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    fn owner(&self) -> Option<AccountId> {
        self.account_id
            .or_else(|| self.activities.first().map(Activity::owner_account_id))
    }
}
