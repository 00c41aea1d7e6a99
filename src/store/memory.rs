//! In-memory event store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{check_append, EventStore, Result};
use crate::ledger::{AccountId, EventEnvelope};

/// Event store backed by a map. For tests and single-process use.
#[derive(Default)]
pub struct MemoryEventStore {
    streams: RwLock<HashMap<AccountId, Vec<EventEnvelope>>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(
        &self,
        account: AccountId,
        expected_version: u64,
        events: Vec<EventEnvelope>,
    ) -> Result<()> {
        let mut streams = self.streams.write().await;
        let current = streams.get(&account).map(|s| s.len() as u64).unwrap_or(0);
        check_append(current, expected_version, &events)?;
        streams.entry(account).or_default().extend(events);
        Ok(())
    }

    async fn load(&self, account: AccountId) -> Result<Vec<EventEnvelope>> {
        let streams = self.streams.read().await;
        Ok(streams.get(&account).cloned().unwrap_or_default())
    }

    async fn load_from(&self, account: AccountId, from: u64) -> Result<Vec<EventEnvelope>> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(&account)
            .map(|stream| {
                stream
                    .iter()
                    .filter(|e| e.sequence >= from)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn version(&self, account: AccountId) -> Result<u64> {
        let streams = self.streams.read().await;
        Ok(streams.get(&account).map(|s| s.len() as u64).unwrap_or(0))
    }

    async fn list_accounts(&self) -> Result<Vec<AccountId>> {
        let streams = self.streams.read().await;
        Ok(streams.keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{CustomerId, LedgerEvent};
    use crate::store::StoreError;
    use chrono::Utc;

    fn envelope(account: AccountId, sequence: u64) -> EventEnvelope {
        EventEnvelope {
            account_id: account,
            sequence,
            occurred_at: Utc::now(),
            event: LedgerEvent::AccountCreated {
                customer_id: CustomerId::new(),
            },
        }
    }

    #[tokio::test]
    async fn append_and_load_round_trip() {
        let store = MemoryEventStore::new();
        let account = AccountId::new();

        store
            .append(account, 0, vec![envelope(account, 0), envelope(account, 1)])
            .await
            .unwrap();

        let loaded = store.load(account).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(store.version(account).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let store = MemoryEventStore::new();
        let account = AccountId::new();

        store
            .append(account, 0, vec![envelope(account, 0)])
            .await
            .unwrap();

        let result = store.append(account, 0, vec![envelope(account, 0)]).await;
        assert!(matches!(
            result,
            Err(StoreError::SequenceConflict {
                expected: 0,
                actual: 1
            })
        ));
        // Nothing partial was written
        assert_eq!(store.version(account).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn gapped_sequence_is_rejected() {
        let store = MemoryEventStore::new();
        let account = AccountId::new();

        let result = store.append(account, 0, vec![envelope(account, 5)]).await;
        assert!(matches!(result, Err(StoreError::NonContiguous { .. })));
    }

    #[tokio::test]
    async fn load_from_skips_earlier_events() {
        let store = MemoryEventStore::new();
        let account = AccountId::new();

        store
            .append(
                account,
                0,
                (0..4).map(|i| envelope(account, i)).collect(),
            )
            .await
            .unwrap();

        let tail = store.load_from(account, 2).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].sequence, 2);
    }

    #[tokio::test]
    async fn unknown_account_is_empty() {
        let store = MemoryEventStore::new();
        let account = AccountId::new();
        assert!(store.load(account).await.unwrap().is_empty());
        assert_eq!(store.version(account).await.unwrap(), 0);
    }
}
