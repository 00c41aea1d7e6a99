//! Ledger view projector.
//!
//! Rebuilds per-transfer and per-account views from the event stream. The
//! derived balances must agree with the aggregate's own queries for any
//! history; divergence is a bug, not a tolerance.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::error;

use super::views::{AccountView, TransferKind, TransferStatus, TransferView};
use super::{ProjectionError, Projector, Result};
use crate::ledger::{AccountId, EventEnvelope, LedgerEvent, TransferId};

#[derive(Default)]
struct Inner {
    accounts: HashMap<AccountId, AccountView>,
    transfers: HashMap<TransferId, TransferView>,
    by_account: HashMap<AccountId, Vec<TransferId>>,
    next_sequence: HashMap<AccountId, u64>,
}

/// Read model over the points ledger.
#[derive(Default)]
pub struct LedgerViewProjector {
    inner: RwLock<Inner>,
}

impl LedgerViewProjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn account(&self, account: AccountId) -> Option<AccountView> {
        self.inner.read().await.accounts.get(&account).cloned()
    }

    pub async fn transfer(&self, transfer: TransferId) -> Option<TransferView> {
        self.inner.read().await.transfers.get(&transfer).cloned()
    }

    /// All of an account's transfers in creation order.
    pub async fn transfers_for(&self, account: AccountId) -> Vec<TransferView> {
        let inner = self.inner.read().await;
        inner
            .by_account
            .get(&account)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.transfers.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn available_amount(&self, account: AccountId, at: DateTime<Utc>) -> Decimal {
        self.sum_transfers(account, |t| {
            if t.is_active(at) {
                t.available_amount
            } else {
                Decimal::ZERO
            }
        })
        .await
    }

    pub async fn locked_amount(&self, account: AccountId, at: DateTime<Utc>) -> Decimal {
        self.sum_transfers(account, |t| {
            if t.is_locked(at) {
                t.available_amount
            } else {
                Decimal::ZERO
            }
        })
        .await
    }

    pub async fn expired_amount(&self, account: AccountId, at: DateTime<Utc>) -> Decimal {
        self.sum_transfers(account, |t| {
            if t.kind == TransferKind::Earning
                && t.status != TransferStatus::Canceled
                && (t.status == TransferStatus::Expired || t.expires_at.is_some_and(|e| e <= at))
            {
                t.available_amount
            } else {
                Decimal::ZERO
            }
        })
        .await
    }

    pub async fn used_amount(&self, account: AccountId) -> Decimal {
        self.sum_transfers(account, |t| {
            if t.kind == TransferKind::Earning {
                t.value - t.available_amount
            } else {
                Decimal::ZERO
            }
        })
        .await
    }

    pub async fn earned_amount(&self, account: AccountId) -> Decimal {
        self.inner
            .read()
            .await
            .accounts
            .get(&account)
            .map(|a| a.earned)
            .unwrap_or(Decimal::ZERO)
    }

    async fn sum_transfers<F>(&self, account: AccountId, f: F) -> Decimal
    where
        F: Fn(&TransferView) -> Decimal,
    {
        let inner = self.inner.read().await;
        inner
            .by_account
            .get(&account)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.transfers.get(id))
                    .map(&f)
                    .sum()
            })
            .unwrap_or(Decimal::ZERO)
    }
}

impl Inner {
    fn account_mut(&mut self, account: AccountId) -> Result<&mut AccountView> {
        self.accounts
            .get_mut(&account)
            .ok_or(ProjectionError::UnknownAccount { account })
    }

    fn transfer_mut(
        &mut self,
        account: AccountId,
        transfer: TransferId,
    ) -> Result<&mut TransferView> {
        self.transfers
            .get_mut(&transfer)
            .ok_or(ProjectionError::UnknownTransfer { account, transfer })
    }

    fn transition(
        &mut self,
        account: AccountId,
        transfer: TransferId,
        to: TransferStatus,
    ) -> Result<&mut TransferView> {
        let view = self.transfer_mut(account, transfer)?;
        if view.kind == TransferKind::Spending || !view.status.can_transition_to(to) {
            return Err(ProjectionError::IllegalTransition {
                transfer,
                from: view.status,
                to,
            });
        }
        view.status = to;
        Ok(view)
    }

    fn insert_view(&mut self, view: TransferView) {
        let account = view.account_id;
        let id = view.id;
        self.transfers.insert(id, view);
        self.by_account.entry(account).or_default().push(id);
    }

    fn fold(&mut self, envelope: &EventEnvelope) -> Result<()> {
        let account = envelope.account_id;
        let at = envelope.occurred_at;

        let expected = self.next_sequence.get(&account).copied().unwrap_or(0);
        if envelope.sequence != expected {
            return Err(ProjectionError::OutOfOrder {
                account,
                expected,
                actual: envelope.sequence,
            });
        }

        match &envelope.event {
            LedgerEvent::AccountCreated { customer_id } => {
                self.accounts
                    .insert(account, AccountView::new(account, *customer_id));
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
                let view = self.account_mut(account)?;
                view.earned += *value;
                view.transfer_count += 1;
                let customer_id = view.customer_id;

                let status = if locked_until.is_some_and(|l| l > at) {
                    TransferStatus::Pending
                } else {
                    TransferStatus::Active
                };
                self.insert_view(TransferView {
                    id: *transfer_id,
                    account_id: account,
                    customer_id,
                    kind: TransferKind::Earning,
                    status,
                    value: *value,
                    available_amount: *value,
                    created_at: at,
                    expires_at: *expires_at,
                    locked_until: *locked_until,
                    transaction_id: *transaction_id,
                    comment: comment.clone(),
                    issuer: *issuer,
                });
            }
            LedgerEvent::PointsSpent {
                transfer_id,
                value,
                transaction_id,
                comment,
                issuer,
                allocations,
                ..
            } => {
                let view = self.account_mut(account)?;
                view.spent += *value;
                view.transfer_count += 1;
                let customer_id = view.customer_id;

                for allocation in allocations {
                    let target = self.transfer_mut(account, allocation.transfer_id)?;
                    if target.kind != TransferKind::Earning {
                        return Err(ProjectionError::UnknownTransfer {
                            account,
                            transfer: allocation.transfer_id,
                        });
                    }
                    target.available_amount -= allocation.amount;
                }

                self.insert_view(TransferView {
                    id: *transfer_id,
                    account_id: account,
                    customer_id,
                    kind: TransferKind::Spending,
                    status: TransferStatus::Active,
                    value: *value,
                    available_amount: Decimal::ZERO,
                    created_at: at,
                    expires_at: None,
                    locked_until: None,
                    transaction_id: *transaction_id,
                    comment: comment.clone(),
                    issuer: *issuer,
                });
            }
            LedgerEvent::TransferCanceled { transfer_id } => {
                self.account_mut(account)?;
                let view = self.transition(account, *transfer_id, TransferStatus::Canceled)?;
                let value = view.value;
                self.account_mut(account)?.earned -= value;
            }
            LedgerEvent::TransferExpired { transfer_id } => {
                self.account_mut(account)?;
                self.transition(account, *transfer_id, TransferStatus::Expired)?;
            }
            LedgerEvent::TransferUnlocked { transfer_id } => {
                self.account_mut(account)?;
                let view = self.transition(account, *transfer_id, TransferStatus::Active)?;
                view.locked_until = None;
            }
            LedgerEvent::PointsReset {} => {
                let view = self.account_mut(account)?;
                view.last_reset_at = Some(at);
                if let Some(ids) = self.by_account.get(&account) {
                    for id in ids {
                        if let Some(t) = self.transfers.get_mut(id) {
                            if t.kind == TransferKind::Earning && !t.status.is_terminal() {
                                t.status = TransferStatus::Expired;
                            }
                        }
                    }
                }
            }
        }

        self.next_sequence.insert(account, expected + 1);
        Ok(())
    }
}

#[async_trait]
impl Projector for LedgerViewProjector {
    fn name(&self) -> &str {
        "ledger_views"
    }

    async fn apply(&self, envelope: &EventEnvelope) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.fold(envelope).inspect_err(|e| {
            error!(
                projector = self.name(),
                account = %envelope.account_id,
                sequence = envelope.sequence,
                event = envelope.event.name(),
                %e,
                "projection halted on corrupt event stream"
            );
        })
    }
}
