//! Event persistence.
//!
//! Streams are append-only and versioned per account. Writers supply the
//! version of history they last observed; a mismatch is rejected so the
//! caller can reload and retry (optimistic concurrency, no lock held).

use async_trait::async_trait;

use crate::ledger::{AccountId, EventEnvelope};

pub mod memory;
pub mod schema;
pub mod sqlite;

pub use memory::MemoryEventStore;
pub use sqlite::SqliteEventStore;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Version conflict: expected {expected}, stream is at {actual}")]
    SequenceConflict { expected: u64, actual: u64 },

    #[error("Envelope sequence {sequence} does not follow stream version {version}")]
    NonContiguous { sequence: u64, version: u64 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid account id: {0}")]
    InvalidId(#[from] uuid::Error),

    #[error("Invalid timestamp in stored event: {0}")]
    InvalidTimestamp(String),
}

/// Interface for event persistence.
///
/// Implementations:
/// - `SqliteEventStore`: SQLite storage
/// - `MemoryEventStore`: in-memory storage for tests and standalone use
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append events to an account's stream.
    ///
    /// `expected_version` must equal the current stream length; otherwise
    /// the write fails with `SequenceConflict` and nothing is stored.
    /// Envelope sequences must continue the stream contiguously.
    async fn append(
        &self,
        account: AccountId,
        expected_version: u64,
        events: Vec<EventEnvelope>,
    ) -> Result<()>;

    /// Load an account's full history, ordered by sequence.
    async fn load(&self, account: AccountId) -> Result<Vec<EventEnvelope>>;

    /// Load history from sequence `from` onwards.
    async fn load_from(&self, account: AccountId, from: u64) -> Result<Vec<EventEnvelope>>;

    /// Current stream length for an account (0 when unknown).
    async fn version(&self, account: AccountId) -> Result<u64>;

    /// All accounts with stored events.
    async fn list_accounts(&self) -> Result<Vec<AccountId>>;
}

/// Shared append validation: the caller's observed version must match the
/// stream, and new envelopes must extend it without gaps.
pub(crate) fn check_append(
    current_version: u64,
    expected_version: u64,
    events: &[EventEnvelope],
) -> Result<()> {
    if current_version != expected_version {
        return Err(StoreError::SequenceConflict {
            expected: expected_version,
            actual: current_version,
        });
    }
    for (offset, envelope) in events.iter().enumerate() {
        let wanted = current_version + offset as u64;
        if envelope.sequence != wanted {
            return Err(StoreError::NonContiguous {
                sequence: envelope.sequence,
                version: wanted,
            });
        }
    }
    Ok(())
}
