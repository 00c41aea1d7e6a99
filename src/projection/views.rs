//! Denormalized view types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::{AccountId, CustomerId, Issuer, TransactionId, TransferId};

/// Whether a view row represents earned or spent points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    Earning,
    Spending,
}

/// Explicit per-transfer status.
///
/// Earning rows move `Pending -> Active -> Expired | Canceled`; the two
/// right-hand states are terminal. Spending rows are bookkeeping and are
/// created `Active`, never transitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Active,
    Expired,
    Canceled,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Expired | TransferStatus::Canceled)
    }

    /// Legal moves in the status machine.
    pub fn can_transition_to(&self, to: TransferStatus) -> bool {
        match (self, to) {
            (TransferStatus::Pending, TransferStatus::Active) => true,
            (TransferStatus::Pending, TransferStatus::Expired) => true,
            (TransferStatus::Pending, TransferStatus::Canceled) => true,
            (TransferStatus::Active, TransferStatus::Expired) => true,
            (TransferStatus::Active, TransferStatus::Canceled) => true,
            _ => false,
        }
    }
}

/// One transfer, denormalized for display and balance queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferView {
    pub id: TransferId,
    pub account_id: AccountId,
    pub customer_id: CustomerId,
    pub kind: TransferKind,
    pub status: TransferStatus,
    pub value: Decimal,
    /// Remaining spendable amount. Always zero for spending rows.
    pub available_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
    pub transaction_id: Option<TransactionId>,
    pub comment: Option<String>,
    pub issuer: Issuer,
}

impl TransferView {
    fn is_dated_expired(&self, at: DateTime<Utc>) -> bool {
        self.status == TransferStatus::Expired || self.expires_at.is_some_and(|e| e <= at)
    }

    /// Locked as of `at`. A `Pending` row whose lock has lapsed is no
    /// longer locked even before any unlock event arrives.
    pub fn is_locked(&self, at: DateTime<Utc>) -> bool {
        self.kind == TransferKind::Earning
            && self.status != TransferStatus::Canceled
            && !self.is_dated_expired(at)
            && self.locked_until.is_some_and(|l| l > at)
    }

    /// Spendable as of `at`.
    pub fn is_active(&self, at: DateTime<Utc>) -> bool {
        self.kind == TransferKind::Earning
            && !self.status.is_terminal()
            && !self.is_dated_expired(at)
            && !self.is_locked(at)
            && self.available_amount > Decimal::ZERO
    }
}

/// Per-account denormalized totals.
///
/// Lifetime sums are maintained incrementally; point-in-time figures
/// (available, locked) are computed over the account's transfer views so
/// passive lock expiry needs no event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountView {
    pub account_id: AccountId,
    pub customer_id: CustomerId,
    /// Lifetime earned points over non-canceled earning rows.
    pub earned: Decimal,
    /// Sum of deduction values recorded.
    pub spent: Decimal,
    pub last_reset_at: Option<DateTime<Utc>>,
    pub transfer_count: u64,
}

impl AccountView {
    pub fn new(account_id: AccountId, customer_id: CustomerId) -> Self {
        Self {
            account_id,
            customer_id,
            earned: Decimal::ZERO,
            spent: Decimal::ZERO,
            last_reset_at: None,
            transfer_count: 0,
        }
    }
}
