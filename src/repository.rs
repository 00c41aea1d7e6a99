//! Account repository.
//!
//! Loads account state by replaying history and executes commands under
//! optimistic concurrency: the caller's observed version rides along with
//! the append, and a stale write surfaces `SequenceConflict` for the caller
//! to reload and retry. Committed events are handed to the bus before the
//! call returns.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::bus::{BusError, EventBus};
use crate::ledger::{AccountId, AccountState, EventEnvelope, LedgerError, LedgerEvent};
use crate::store::{EventStore, StoreError};

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Errors from command execution.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

impl RepositoryError {
    /// Whether the caller should reload and retry the command.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            RepositoryError::Store(StoreError::SequenceConflict { .. })
        )
    }
}

/// Repository over one event store and an optional read-side bus.
pub struct AccountRepository {
    store: Arc<dyn EventStore>,
    bus: Option<Arc<dyn EventBus>>,
}

impl AccountRepository {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store, bus: None }
    }

    pub fn with_bus(store: Arc<dyn EventStore>, bus: Arc<dyn EventBus>) -> Self {
        Self {
            store,
            bus: Some(bus),
        }
    }

    /// Replay an account's history into state.
    pub async fn load(&self, account: AccountId) -> Result<AccountState> {
        let history = self.store.load(account).await?;
        Ok(AccountState::replay(&history))
    }

    /// Load, run a command against current state, append the result.
    ///
    /// `occurred_at` stamps every emitted event and is the instant state
    /// derivation treats as "now". The command closure is pure; nothing is
    /// persisted when it rejects.
    pub async fn execute<F>(
        &self,
        account: AccountId,
        occurred_at: DateTime<Utc>,
        command: F,
    ) -> Result<AccountState>
    where
        F: FnOnce(&AccountState) -> std::result::Result<Vec<LedgerEvent>, LedgerError>,
    {
        let history = self.store.load(account).await?;
        let mut state = AccountState::replay(&history);
        let expected_version = state.version();

        let events = command(&state)?;
        if events.is_empty() {
            return Ok(state);
        }

        let envelopes: Vec<EventEnvelope> = events
            .into_iter()
            .enumerate()
            .map(|(offset, event)| EventEnvelope {
                account_id: account,
                sequence: expected_version + offset as u64,
                occurred_at,
                event,
            })
            .collect();

        self.store
            .append(account, expected_version, envelopes.clone())
            .await?;

        info!(
            account = %account,
            from_version = expected_version,
            appended = envelopes.len(),
            "committed ledger events"
        );

        for envelope in &envelopes {
            state.apply(envelope);
        }

        if let Some(bus) = &self.bus {
            bus.publish(&envelopes).await?;
        }

        Ok(state)
    }
}
