//! Money value object.
//!
//! Amounts are whole minor units (e.g. cents); there is no floating point and
//! no currency. Values enter through [`Money::of`] as `i64` and are held as
//! `i128`, so sums of any realistic number of amounts are exact. Use
//! [`Money::checked_add`] when combining values of unknown provenance.

use core::iter::Sum;
use core::ops::{Add, Neg, Sub};

use serde::{Deserialize, Serialize};

use crate::value_object::ValueObject;

/// Immutable signed amount of money.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i128);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn of(amount: i64) -> Self {
        Self(amount as i128)
    }

    pub fn amount(&self) -> i128 {
        self.0
    }

    pub fn add(a: Money, b: Money) -> Money {
        Money(a.0 + b.0)
    }

    pub fn subtract(a: Money, b: Money) -> Money {
        Money(a.0 - b.0)
    }

    pub fn plus(self, other: Money) -> Money {
        Money::add(self, other)
    }

    pub fn minus(self, other: Money) -> Money {
        Money::subtract(self, other)
    }

    pub fn negate(self) -> Money {
        Money(-self.0)
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn is_positive_or_zero(&self) -> bool {
        self.0 >= 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn is_greater_than(&self, other: Money) -> bool {
        self.0 > other.0
    }

    pub fn is_greater_than_or_equal_to(&self, other: Money) -> bool {
        self.0 >= other.0
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Money::of(value)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money::add(self, rhs)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money::subtract(self, rhs)
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        self.negate()
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Money::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}
