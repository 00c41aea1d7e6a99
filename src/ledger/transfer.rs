//! Transfer record value types.
//!
//! A transfer is one entry in an account's ledger: an addition (earned
//! points) or a deduction (spent points). Records are immutable values;
//! state changes happen by deriving a new value for the same id during
//! event application.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_type!(
    /// Identifies one ledger account.
    AccountId
);
id_type!(
    /// Identifies one transfer within an account.
    TransferId
);
id_type!(
    /// Identifies the customer an account belongs to.
    CustomerId
);
id_type!(
    /// Reference to an originating or revised transaction.
    TransactionId
);

/// Who issued a ledger operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Issuer {
    System,
    Admin,
    Api,
}

/// An addition entry: points earned, with spend-down tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditionRecord {
    pub id: TransferId,
    /// Original earned value. Never changes after creation.
    pub value: Decimal,
    /// Portion of `value` still spendable. Decremented by allocation.
    pub available_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
    pub canceled: bool,
    pub expired: bool,
    pub transaction_id: Option<TransactionId>,
    pub comment: Option<String>,
    pub issuer: Issuer,
}

impl AdditionRecord {
    pub fn is_canceled(&self) -> bool {
        self.canceled
    }

    /// Expired either explicitly or by its expiry date having passed.
    pub fn is_expired(&self, at: DateTime<Utc>) -> bool {
        self.expired || self.expires_at.is_some_and(|e| e <= at)
    }

    pub fn is_locked(&self, at: DateTime<Utc>) -> bool {
        !self.canceled
            && !self.is_expired(at)
            && self.locked_until.is_some_and(|l| l > at)
    }

    /// Spendable: not locked, not expired, not canceled, with amount left.
    pub fn is_active(&self, at: DateTime<Utc>) -> bool {
        !self.canceled
            && !self.is_expired(at)
            && !self.is_locked(at)
            && self.available_amount > Decimal::ZERO
    }

    /// Portion of the original value already consumed by deductions.
    pub fn used_amount(&self) -> Decimal {
        self.value - self.available_amount
    }
}

/// A deduction entry: points spent, for bookkeeping.
///
/// Deductions never transition; corrections are superseding entries that
/// reference the revised transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeductionRecord {
    pub id: TransferId,
    pub value: Decimal,
    pub created_at: DateTime<Utc>,
    pub transaction_id: Option<TransactionId>,
    pub revised_transaction_id: Option<TransactionId>,
    pub comment: Option<String>,
    pub issuer: Issuer,
}

/// One entry in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferRecord {
    Addition(AdditionRecord),
    Deduction(DeductionRecord),
}

impl TransferRecord {
    pub fn id(&self) -> TransferId {
        match self {
            TransferRecord::Addition(a) => a.id,
            TransferRecord::Deduction(d) => d.id,
        }
    }

    pub fn value(&self) -> Decimal {
        match self {
            TransferRecord::Addition(a) => a.value,
            TransferRecord::Deduction(d) => d.value,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            TransferRecord::Addition(a) => a.created_at,
            TransferRecord::Deduction(d) => d.created_at,
        }
    }

    pub fn as_addition(&self) -> Option<&AdditionRecord> {
        match self {
            TransferRecord::Addition(a) => Some(a),
            TransferRecord::Deduction(_) => None,
        }
    }
}
