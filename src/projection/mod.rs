//! Read-side projections.
//!
//! Projectors consume the ledger's event stream and rebuild denormalized
//! views. Events for one account arrive strictly in emitted order; an event
//! that cannot be applied cleanly means the stream is corrupt upstream, so
//! projectors fail hard instead of skipping.

use async_trait::async_trait;

use crate::ledger::{AccountId, EventEnvelope, TransferId};

mod ledger_views;
mod views;

pub use ledger_views::LedgerViewProjector;
pub use views::{AccountView, TransferKind, TransferStatus, TransferView};

/// Result type for projector operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// Errors from projector operations. All of these are fatal for the
/// projector: they indicate event-order corruption, not a transient fault.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("Event for unknown account {account}")]
    UnknownAccount { account: AccountId },

    #[error("Event targets unknown transfer {transfer} in account {account}")]
    UnknownTransfer {
        account: AccountId,
        transfer: TransferId,
    },

    #[error("Illegal transition for transfer {transfer}: {from:?} -> {to:?}")]
    IllegalTransition {
        transfer: TransferId,
        from: TransferStatus,
        to: TransferStatus,
    },

    #[error("Out-of-order event for account {account}: expected sequence {expected}, got {actual}")]
    OutOfOrder {
        account: AccountId,
        expected: u64,
        actual: u64,
    },
}

/// In-process projector interface.
///
/// `apply` takes `&self`; projectors that maintain state use interior
/// mutability (`RwLock`).
#[async_trait]
pub trait Projector: Send + Sync {
    /// Name of this projector, for registration logs and alerts.
    fn name(&self) -> &str;

    /// Fold one event into the read model.
    async fn apply(&self, envelope: &EventEnvelope) -> Result<()>;
}
