//! Account aggregate.
//!
//! State is rebuilt by folding `apply` over the account's event history.
//! Command handlers validate against the current state and emit new events;
//! they never mutate state themselves, so a rejected command leaves nothing
//! behind.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::warn;

use super::event::{Allocation, EventEnvelope, LedgerEvent};
use super::transfer::{
    AccountId, AdditionRecord, CustomerId, DeductionRecord, Issuer, TransactionId, TransferId,
    TransferRecord,
};

/// Result type for ledger command handling.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors from ledger commands.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Account has no event history")]
    AccountNotFound,

    #[error("Account is already open")]
    AccountAlreadyOpen,

    #[error("Transfer not found: {transfer}")]
    TransferNotFound { transfer: TransferId },

    #[error("Duplicate transfer id: {transfer}")]
    DuplicateTransfer { transfer: TransferId },

    #[error("Illegal transition for transfer {transfer}: {reason}")]
    InvalidStateTransition {
        transfer: TransferId,
        reason: &'static str,
    },

    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Parameters for adding points.
#[derive(Debug, Clone)]
pub struct AddPoints {
    pub transfer_id: TransferId,
    pub value: Decimal,
    pub expires_at: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
    pub transaction_id: Option<TransactionId>,
    pub comment: Option<String>,
    pub issuer: Issuer,
}

/// Parameters for spending points.
#[derive(Debug, Clone)]
pub struct SpendPoints {
    pub transfer_id: TransferId,
    pub value: Decimal,
    pub transaction_id: Option<TransactionId>,
    pub revised_transaction_id: Option<TransactionId>,
    pub comment: Option<String>,
    pub issuer: Issuer,
}

/// Current state of one account, derived from its event stream.
#[derive(Debug, Clone, Default)]
pub struct AccountState {
    account_id: Option<AccountId>,
    customer_id: Option<CustomerId>,
    transfers: HashMap<TransferId, TransferRecord>,
    /// Creation order. Events arrive ordered, so this is chronological.
    order: Vec<TransferId>,
    last_reset_at: Option<DateTime<Utc>>,
    version: u64,
}

impl AccountState {
    /// Rebuild state from an ordered event history.
    pub fn replay<'a>(events: impl IntoIterator<Item = &'a EventEnvelope>) -> Self {
        let mut state = Self::default();
        for envelope in events {
            state.apply(envelope);
        }
        state
    }

    /// Fold one event into state. Events are facts; this never fails.
    pub fn apply(&mut self, envelope: &EventEnvelope) {
        match &envelope.event {
            LedgerEvent::AccountCreated { customer_id } => {
                self.account_id = Some(envelope.account_id);
                self.customer_id = Some(*customer_id);
            }
            LedgerEvent::PointsAdded {
                transfer_id,
                value,
                expires_at,
                locked_until,
                transaction_id,
                comment,
                issuer,
            } => {
                self.insert(TransferRecord::Addition(AdditionRecord {
                    id: *transfer_id,
                    value: *value,
                    available_amount: *value,
                    created_at: envelope.occurred_at,
                    expires_at: *expires_at,
                    locked_until: *locked_until,
                    canceled: false,
                    expired: false,
                    transaction_id: *transaction_id,
                    comment: comment.clone(),
                    issuer: *issuer,
                }));
            }
            LedgerEvent::PointsSpent {
                transfer_id,
                value,
                transaction_id,
                revised_transaction_id,
                comment,
                issuer,
                allocations,
            } => {
                self.insert(TransferRecord::Deduction(DeductionRecord {
                    id: *transfer_id,
                    value: *value,
                    created_at: envelope.occurred_at,
                    transaction_id: *transaction_id,
                    revised_transaction_id: *revised_transaction_id,
                    comment: comment.clone(),
                    issuer: *issuer,
                }));
                for allocation in allocations {
                    if let Some(TransferRecord::Addition(a)) =
                        self.transfers.get_mut(&allocation.transfer_id)
                    {
                        a.available_amount -= allocation.amount;
                    }
                }
            }
            LedgerEvent::TransferCanceled { transfer_id } => {
                if let Some(TransferRecord::Addition(a)) = self.transfers.get_mut(transfer_id) {
                    a.canceled = true;
                }
            }
            LedgerEvent::TransferExpired { transfer_id } => {
                if let Some(TransferRecord::Addition(a)) = self.transfers.get_mut(transfer_id) {
                    a.expired = true;
                }
            }
            LedgerEvent::TransferUnlocked { transfer_id } => {
                if let Some(TransferRecord::Addition(a)) = self.transfers.get_mut(transfer_id) {
                    a.locked_until = None;
                }
            }
            LedgerEvent::PointsReset {} => {
                let at = envelope.occurred_at;
                for record in self.transfers.values_mut() {
                    if let TransferRecord::Addition(a) = record {
                        if a.is_active(at) || a.is_locked(at) {
                            a.expired = true;
                        }
                    }
                }
                self.last_reset_at = Some(at);
            }
        }
        self.version = envelope.sequence + 1;
    }

    fn insert(&mut self, record: TransferRecord) {
        let id = record.id();
        if self.transfers.insert(id, record).is_none() {
            self.order.push(id);
        }
    }

    // ---- Commands -------------------------------------------------------

    /// Open the account for a customer.
    pub fn open(&self, customer_id: CustomerId) -> Result<Vec<LedgerEvent>> {
        if self.customer_id.is_some() {
            return Err(LedgerError::AccountAlreadyOpen);
        }
        Ok(vec![LedgerEvent::AccountCreated { customer_id }])
    }

    /// Append a new addition record.
    pub fn add_points(&self, cmd: AddPoints) -> Result<Vec<LedgerEvent>> {
        self.ensure_open()?;
        if cmd.value < Decimal::ZERO {
            return Err(LedgerError::Validation(format!(
                "point value must be non-negative, got {}",
                cmd.value
            )));
        }
        if self.transfers.contains_key(&cmd.transfer_id) {
            return Err(LedgerError::DuplicateTransfer {
                transfer: cmd.transfer_id,
            });
        }
        Ok(vec![LedgerEvent::PointsAdded {
            transfer_id: cmd.transfer_id,
            value: cmd.value,
            expires_at: cmd.expires_at,
            locked_until: cmd.locked_until,
            transaction_id: cmd.transaction_id,
            comment: cmd.comment,
            issuer: cmd.issuer,
        }])
    }

    /// Append a deduction and allocate it across active additions,
    /// oldest first.
    ///
    /// A spend larger than the total active available amount drains every
    /// active record to zero and stops; the deduction still records the
    /// full requested value.
    pub fn spend_points(&self, cmd: SpendPoints, at: DateTime<Utc>) -> Result<Vec<LedgerEvent>> {
        self.ensure_open()?;
        if cmd.value < Decimal::ZERO {
            return Err(LedgerError::Validation(format!(
                "spend value must be non-negative, got {}",
                cmd.value
            )));
        }
        if self.transfers.contains_key(&cmd.transfer_id) {
            return Err(LedgerError::DuplicateTransfer {
                transfer: cmd.transfer_id,
            });
        }

        let (allocations, shortfall) = self.allocate(cmd.value, at);
        if shortfall > Decimal::ZERO {
            warn!(
                account = ?self.account_id,
                transfer = %cmd.transfer_id,
                requested = %cmd.value,
                shortfall = %shortfall,
                "spend exceeds available points, draining to zero"
            );
        }

        Ok(vec![LedgerEvent::PointsSpent {
            transfer_id: cmd.transfer_id,
            value: cmd.value,
            transaction_id: cmd.transaction_id,
            revised_transaction_id: cmd.revised_transaction_id,
            comment: cmd.comment,
            issuer: cmd.issuer,
            allocations,
        }])
    }

    /// Clear the lock on an addition. Legal only while it is locked.
    pub fn unlock_transfer(
        &self,
        transfer_id: TransferId,
        at: DateTime<Utc>,
    ) -> Result<Vec<LedgerEvent>> {
        self.ensure_open()?;
        let addition = self.addition(transfer_id)?;
        if !addition.is_locked(at) {
            let reason = if addition.is_canceled() {
                "cannot unlock a canceled transfer"
            } else if addition.is_expired(at) {
                "cannot unlock an expired transfer"
            } else {
                "transfer is not locked"
            };
            return Err(LedgerError::InvalidStateTransition {
                transfer: transfer_id,
                reason,
            });
        }
        Ok(vec![LedgerEvent::TransferUnlocked { transfer_id }])
    }

    /// Move an addition to expired. Irreversible.
    pub fn expire_transfer(&self, transfer_id: TransferId) -> Result<Vec<LedgerEvent>> {
        self.ensure_open()?;
        let addition = self.addition(transfer_id)?;
        if addition.canceled || addition.expired {
            return Err(LedgerError::InvalidStateTransition {
                transfer: transfer_id,
                reason: "transfer is already in a terminal state",
            });
        }
        Ok(vec![LedgerEvent::TransferExpired { transfer_id }])
    }

    /// Move an addition to canceled. Deductions are never cancelable.
    pub fn cancel_transfer(&self, transfer_id: TransferId) -> Result<Vec<LedgerEvent>> {
        self.ensure_open()?;
        let addition = self.addition(transfer_id)?;
        if addition.canceled || addition.expired {
            return Err(LedgerError::InvalidStateTransition {
                transfer: transfer_id,
                reason: "transfer is already in a terminal state",
            });
        }
        Ok(vec![LedgerEvent::TransferCanceled { transfer_id }])
    }

    /// Expire everything active or locked as of the event's timestamp.
    pub fn reset(&self) -> Result<Vec<LedgerEvent>> {
        self.ensure_open()?;
        Ok(vec![LedgerEvent::PointsReset {}])
    }

    fn ensure_open(&self) -> Result<()> {
        if self.customer_id.is_none() {
            return Err(LedgerError::AccountNotFound);
        }
        Ok(())
    }

    fn addition(&self, transfer_id: TransferId) -> Result<&AdditionRecord> {
        match self.transfers.get(&transfer_id) {
            Some(TransferRecord::Addition(a)) => Ok(a),
            Some(TransferRecord::Deduction(_)) => Err(LedgerError::InvalidStateTransition {
                transfer: transfer_id,
                reason: "deduction records cannot change state",
            }),
            None => Err(LedgerError::TransferNotFound {
                transfer: transfer_id,
            }),
        }
    }

    /// Oldest-first walk over active additions. Ties on creation time break
    /// by transfer id so allocation is deterministic.
    fn allocate(&self, amount: Decimal, at: DateTime<Utc>) -> (Vec<Allocation>, Decimal) {
        let mut active: Vec<&AdditionRecord> = self
            .order
            .iter()
            .filter_map(|id| self.transfers.get(id))
            .filter_map(TransferRecord::as_addition)
            .filter(|a| a.is_active(at))
            .collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let mut remaining = amount;
        let mut allocations = Vec::new();
        for addition in active {
            if remaining <= Decimal::ZERO {
                break;
            }
            let draw = remaining.min(addition.available_amount);
            if draw > Decimal::ZERO {
                allocations.push(Allocation {
                    transfer_id: addition.id,
                    amount: draw,
                });
                remaining -= draw;
            }
        }
        (allocations, remaining.max(Decimal::ZERO))
    }

    // ---- Queries --------------------------------------------------------

    pub fn account_id(&self) -> Option<AccountId> {
        self.account_id
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    /// Number of events applied. Callers pass this back as the expected
    /// version when writing.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn last_reset_at(&self) -> Option<DateTime<Utc>> {
        self.last_reset_at
    }

    pub fn transfer(&self, id: TransferId) -> Option<&TransferRecord> {
        self.transfers.get(&id)
    }

    /// All transfers in creation order.
    pub fn transfers(&self) -> impl Iterator<Item = &TransferRecord> {
        self.order.iter().filter_map(|id| self.transfers.get(id))
    }

    fn additions(&self) -> impl Iterator<Item = &AdditionRecord> {
        self.transfers().filter_map(TransferRecord::as_addition)
    }

    /// Spendable balance as of `at`.
    pub fn available_amount(&self, at: DateTime<Utc>) -> Decimal {
        self.additions()
            .filter(|a| a.is_active(at))
            .map(|a| a.available_amount)
            .sum()
    }

    /// Lifetime earned points over non-canceled additions.
    pub fn earned_amount(&self) -> Decimal {
        self.additions()
            .filter(|a| !a.canceled)
            .map(|a| a.value)
            .sum()
    }

    /// Earned points since `date`, never reaching back past the last reset.
    pub fn earned_amount_since(&self, date: DateTime<Utc>) -> Decimal {
        let floor = match self.last_reset_at {
            Some(reset) => date.max(reset),
            None => date,
        };
        self.additions()
            .filter(|a| !a.canceled && a.created_at > floor)
            .map(|a| a.value)
            .sum()
    }

    /// Points consumed from additions, lifetime.
    pub fn used_amount(&self) -> Decimal {
        self.additions().map(AdditionRecord::used_amount).sum()
    }

    /// Points lost to expiry as of `at`.
    pub fn expired_amount(&self, at: DateTime<Utc>) -> Decimal {
        self.additions()
            .filter(|a| !a.canceled && a.is_expired(at))
            .map(|a| a.available_amount)
            .sum()
    }

    /// Points currently held behind locks as of `at`.
    pub fn locked_amount(&self, at: DateTime<Utc>) -> Decimal {
        self.additions()
            .filter(|a| a.is_locked(at))
            .map(|a| a.available_amount)
            .sum()
    }
}
