//! Ledger events.
//!
//! Every mutation of an account is one of these facts, durably appended
//! before any read model reflects it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::transfer::{AccountId, CustomerId, Issuer, TransactionId, TransferId};

/// How much of a spend was drawn from one addition record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub transfer_id: TransferId,
    pub amount: Decimal,
}

/// A fact recorded in an account's event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    AccountCreated {
        customer_id: CustomerId,
    },
    PointsAdded {
        transfer_id: TransferId,
        value: Decimal,
        expires_at: Option<DateTime<Utc>>,
        locked_until: Option<DateTime<Utc>>,
        transaction_id: Option<TransactionId>,
        comment: Option<String>,
        issuer: Issuer,
    },
    /// Carries the consumption the command computed so replay and read
    /// models apply exactly the same draw-down.
    PointsSpent {
        transfer_id: TransferId,
        value: Decimal,
        transaction_id: Option<TransactionId>,
        revised_transaction_id: Option<TransactionId>,
        comment: Option<String>,
        issuer: Issuer,
        allocations: Vec<Allocation>,
    },
    TransferCanceled {
        transfer_id: TransferId,
    },
    TransferExpired {
        transfer_id: TransferId,
    },
    TransferUnlocked {
        transfer_id: TransferId,
    },
    PointsReset {},
}

impl LedgerEvent {
    /// Short name for logs and audit output.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::AccountCreated { .. } => "account_created",
            LedgerEvent::PointsAdded { .. } => "points_added",
            LedgerEvent::PointsSpent { .. } => "points_spent",
            LedgerEvent::TransferCanceled { .. } => "transfer_canceled",
            LedgerEvent::TransferExpired { .. } => "transfer_expired",
            LedgerEvent::TransferUnlocked { .. } => "transfer_unlocked",
            LedgerEvent::PointsReset {} => "points_reset",
        }
    }
}

/// An event with its stream position and occurrence time.
///
/// `sequence` is contiguous from 0 within an account. `occurred_at` is the
/// instant the command was accepted; state derivation during replay uses it
/// as "now" so rebuilt state never depends on the wall clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub account_id: AccountId,
    pub sequence: u64,
    pub occurred_at: DateTime<Utc>,
    pub event: LedgerEvent,
}
