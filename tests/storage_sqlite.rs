//! SQLite event store contract tests.

use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;
use sqlx::sqlite::SqlitePoolOptions;

use tally::ledger::{
    AccountId, Allocation, CustomerId, EventEnvelope, Issuer, LedgerEvent, TransferId,
};
use tally::store::{EventStore, SqliteEventStore, StoreError};

async fn store() -> SqliteEventStore {
    // One connection: every in-memory SQLite connection is its own database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = SqliteEventStore::new(pool);
    store.init().await.unwrap();
    store
}

fn history(account: AccountId) -> Vec<EventEnvelope> {
    let t1 = TransferId::new();
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
    vec![
        EventEnvelope {
            account_id: account,
            sequence: 0,
            occurred_at: base,
            event: LedgerEvent::AccountCreated {
                customer_id: CustomerId::new(),
            },
        },
        EventEnvelope {
            account_id: account,
            sequence: 1,
            occurred_at: base + chrono::Duration::hours(1),
            event: LedgerEvent::PointsAdded {
                transfer_id: t1,
                value: dec!(100),
                expires_at: Some(base + chrono::Duration::days(365)),
                locked_until: None,
                transaction_id: None,
                comment: Some("welcome bonus".into()),
                issuer: Issuer::System,
            },
        },
        EventEnvelope {
            account_id: account,
            sequence: 2,
            occurred_at: base + chrono::Duration::hours(2),
            event: LedgerEvent::PointsSpent {
                transfer_id: TransferId::new(),
                value: dec!(30),
                transaction_id: None,
                revised_transaction_id: None,
                comment: None,
                issuer: Issuer::Api,
                allocations: vec![Allocation {
                    transfer_id: t1,
                    amount: dec!(30),
                }],
            },
        },
    ]
}

#[tokio::test]
async fn append_and_load_round_trip() {
    let store = store().await;
    let account = AccountId::new();
    let events = history(account);

    store.append(account, 0, events.clone()).await.unwrap();

    let loaded = store.load(account).await.unwrap();
    assert_eq!(loaded, events);
    assert_eq!(store.version(account).await.unwrap(), 3);
}

#[tokio::test]
async fn stale_version_rolls_back_whole_append() {
    let store = store().await;
    let account = AccountId::new();
    let events = history(account);

    store.append(account, 0, events.clone()).await.unwrap();

    let result = store.append(account, 1, events).await;
    assert!(matches!(
        result,
        Err(StoreError::SequenceConflict {
            expected: 1,
            actual: 3
        })
    ));
    assert_eq!(store.version(account).await.unwrap(), 3);
}

#[tokio::test]
async fn load_from_returns_tail() {
    let store = store().await;
    let account = AccountId::new();

    store.append(account, 0, history(account)).await.unwrap();

    let tail = store.load_from(account, 1).await.unwrap();
    assert_eq!(tail.len(), 2);
    assert_eq!(tail[0].sequence, 1);
    assert_eq!(tail[1].sequence, 2);
}

#[tokio::test]
async fn accounts_are_isolated() {
    let store = store().await;
    let a = AccountId::new();
    let b = AccountId::new();

    store.append(a, 0, history(a)).await.unwrap();
    store.append(b, 0, history(b)).await.unwrap();

    assert_eq!(store.load(a).await.unwrap().len(), 3);
    assert_eq!(store.load(b).await.unwrap().len(), 3);

    let mut accounts = store.list_accounts().await.unwrap();
    accounts.sort();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(accounts, expected);
}

#[tokio::test]
async fn empty_append_is_a_no_op() {
    let store = store().await;
    let account = AccountId::new();
    store.append(account, 0, vec![]).await.unwrap();
    assert_eq!(store.version(account).await.unwrap(), 0);
}

#[tokio::test]
async fn events_survive_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}?mode=rwc", dir.path().join("ledger.db").display());
    let account = AccountId::new();
    let events = history(account);

    {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .unwrap();
        let store = SqliteEventStore::new(pool.clone());
        store.init().await.unwrap();
        store.append(account, 0, events.clone()).await.unwrap();
        pool.close().await;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .unwrap();
    let store = SqliteEventStore::new(pool);
    store.init().await.unwrap();

    assert_eq!(store.load(account).await.unwrap(), events);
}
