//! In-process event bus.
//!
//! Delivers committed envelopes to registered projectors, sequentially and
//! in emitted order, so each projector sees one account's history exactly
//! as the ledger wrote it. A projector failure propagates to the publisher
//! rather than being skipped.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::ledger::EventEnvelope;
use crate::projection::{ProjectionError, Projector};

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors from event delivery.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Projector '{projector}' failed: {source}")]
    Projection {
        projector: String,
        #[source]
        source: ProjectionError,
    },
}

/// Interface for publishing committed events to the read side.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, envelopes: &[EventEnvelope]) -> Result<()>;
}

/// Bus that routes events directly to in-process projectors.
#[derive(Default)]
pub struct InProcessBus {
    projectors: RwLock<Vec<Arc<dyn Projector>>>,
}

impl InProcessBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a projector.
    pub async fn add_projector(&self, projector: Arc<dyn Projector>) {
        info!(projector = %projector.name(), "Registered in-process projector");
        self.projectors.write().await.push(projector);
    }
}

#[async_trait]
impl EventBus for InProcessBus {
    async fn publish(&self, envelopes: &[EventEnvelope]) -> Result<()> {
        // Collect under the read lock, release before the async applies.
        let projectors: Vec<_> = self.projectors.read().await.iter().cloned().collect();

        for envelope in envelopes {
            for projector in &projectors {
                if let Err(source) = projector.apply(envelope).await {
                    error!(
                        projector = %projector.name(),
                        account = %envelope.account_id,
                        sequence = envelope.sequence,
                        "halting event delivery"
                    );
                    return Err(BusError::Projection {
                        projector: projector.name().to_string(),
                        source,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{AccountId, CustomerId, LedgerEvent, TransferId};
    use crate::projection::LedgerViewProjector;
    use chrono::Utc;

    #[tokio::test]
    async fn publish_reaches_registered_projectors() {
        let bus = InProcessBus::new();
        let projector = Arc::new(LedgerViewProjector::new());
        bus.add_projector(projector.clone()).await;

        let account = AccountId::new();
        let envelope = EventEnvelope {
            account_id: account,
            sequence: 0,
            occurred_at: Utc::now(),
            event: LedgerEvent::AccountCreated {
                customer_id: CustomerId::new(),
            },
        };

        bus.publish(std::slice::from_ref(&envelope)).await.unwrap();
        assert!(projector.account(account).await.is_some());
    }

    #[tokio::test]
    async fn projector_failure_stops_delivery() {
        let bus = InProcessBus::new();
        bus.add_projector(Arc::new(LedgerViewProjector::new()))
            .await;

        // References a transfer that was never added.
        let envelope = EventEnvelope {
            account_id: AccountId::new(),
            sequence: 0,
            occurred_at: Utc::now(),
            event: LedgerEvent::TransferExpired {
                transfer_id: TransferId::new(),
            },
        };

        let result = bus.publish(std::slice::from_ref(&envelope)).await;
        assert!(matches!(result, Err(BusError::Projection { .. })));
    }
}
