//! End-to-end ledger scenarios: commands through the repository and store,
//! with the read model fed off the bus.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use tally::bus::InProcessBus;
use tally::ledger::{
    AccountId, AccountState, AddPoints, CustomerId, Issuer, LedgerError, SpendPoints, TransferId,
};
use tally::projection::{LedgerViewProjector, TransferStatus};
use tally::repository::{AccountRepository, RepositoryError};
use tally::store::{EventStore, MemoryEventStore};

fn at(h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap()
}

fn add(transfer_id: TransferId, value: Decimal) -> AddPoints {
    AddPoints {
        transfer_id,
        value,
        expires_at: None,
        locked_until: None,
        transaction_id: None,
        comment: None,
        issuer: Issuer::System,
    }
}

fn spend(transfer_id: TransferId, value: Decimal) -> SpendPoints {
    SpendPoints {
        transfer_id,
        value,
        transaction_id: None,
        revised_transaction_id: None,
        comment: None,
        issuer: Issuer::Api,
    }
}

struct Fixture {
    repo: AccountRepository,
    projector: Arc<LedgerViewProjector>,
    store: Arc<MemoryEventStore>,
    account: AccountId,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn fixture() -> Fixture {
    init_tracing();
    let store = Arc::new(MemoryEventStore::new());
    let bus = Arc::new(InProcessBus::new());
    let projector = Arc::new(LedgerViewProjector::new());
    bus.add_projector(projector.clone()).await;

    let repo = AccountRepository::with_bus(store.clone(), bus);
    let account = AccountId::new();
    repo.execute(account, at(6), |s| s.open(CustomerId::new()))
        .await
        .unwrap();

    Fixture {
        repo,
        projector,
        store,
        account,
    }
}

#[tokio::test]
async fn fifo_spend_drains_oldest_first() {
    let f = fixture().await;
    let t1 = TransferId::new();
    let t2 = TransferId::new();

    f.repo
        .execute(f.account, at(8), |s| s.add_points(add(t1, dec!(100))))
        .await
        .unwrap();
    f.repo
        .execute(f.account, at(9), |s| s.add_points(add(t2, dec!(50))))
        .await
        .unwrap();
    let state = f
        .repo
        .execute(f.account, at(10), |s| {
            s.spend_points(spend(TransferId::new(), dec!(120)), at(10))
        })
        .await
        .unwrap();

    assert_eq!(state.available_amount(at(10)), dec!(30));
    let t1_view = f.projector.transfer(t1).await.unwrap();
    let t2_view = f.projector.transfer(t2).await.unwrap();
    assert_eq!(t1_view.available_amount, dec!(0));
    assert_eq!(t2_view.available_amount, dec!(30));
}

#[tokio::test]
async fn aggregate_and_projection_agree_on_balances() {
    let f = fixture().await;
    let locked = TransferId::new();
    let expiring = TransferId::new();

    f.repo
        .execute(f.account, at(8), |s| s.add_points(add(TransferId::new(), dec!(100))))
        .await
        .unwrap();
    f.repo
        .execute(f.account, at(9), |s| {
            s.add_points(AddPoints {
                locked_until: Some(at(20)),
                ..add(locked, dec!(40))
            })
        })
        .await
        .unwrap();
    f.repo
        .execute(f.account, at(10), |s| {
            s.add_points(AddPoints {
                expires_at: Some(at(11)),
                ..add(expiring, dec!(25))
            })
        })
        .await
        .unwrap();
    f.repo
        .execute(f.account, at(10), |s| {
            s.spend_points(spend(TransferId::new(), dec!(60)), at(10))
        })
        .await
        .unwrap();

    let state = f.repo.load(f.account).await.unwrap();
    for instant in [at(10), at(12), at(21)] {
        assert_eq!(
            state.available_amount(instant),
            f.projector.available_amount(f.account, instant).await,
            "available mismatch at {instant}"
        );
        assert_eq!(
            state.locked_amount(instant),
            f.projector.locked_amount(f.account, instant).await,
            "locked mismatch at {instant}"
        );
        assert_eq!(
            state.expired_amount(instant),
            f.projector.expired_amount(f.account, instant).await,
            "expired mismatch at {instant}"
        );
    }
    assert_eq!(state.used_amount(), f.projector.used_amount(f.account).await);
    assert_eq!(
        state.earned_amount(),
        f.projector.earned_amount(f.account).await
    );
}

#[tokio::test]
async fn expiration_is_monotonic() {
    let f = fixture().await;
    let id = TransferId::new();

    f.repo
        .execute(f.account, at(8), |s| {
            s.add_points(AddPoints {
                locked_until: Some(at(20)),
                ..add(id, dec!(50))
            })
        })
        .await
        .unwrap();
    f.repo
        .execute(f.account, at(9), |s| s.expire_transfer(id))
        .await
        .unwrap();

    // No later operation restores the contribution.
    let result = f
        .repo
        .execute(f.account, at(10), |s| s.unlock_transfer(id, at(10)))
        .await;
    assert!(matches!(
        result,
        Err(RepositoryError::Ledger(
            LedgerError::InvalidStateTransition { .. }
        ))
    ));

    let state = f.repo.load(f.account).await.unwrap();
    assert_eq!(state.available_amount(at(21)), dec!(0));
    assert_eq!(
        f.projector.transfer(id).await.unwrap().status,
        TransferStatus::Expired
    );
}

#[tokio::test]
async fn reset_then_new_earnings() {
    let f = fixture().await;

    f.repo
        .execute(f.account, at(8), |s| s.add_points(add(TransferId::new(), dec!(80))))
        .await
        .unwrap();
    f.repo
        .execute(f.account, at(9), |s| s.reset())
        .await
        .unwrap();
    let state = f
        .repo
        .execute(f.account, at(10), |s| s.add_points(add(TransferId::new(), dec!(15))))
        .await
        .unwrap();

    assert_eq!(state.available_amount(at(10)), dec!(15));
    assert_eq!(state.earned_amount_since(at(1)), dec!(15));
    assert_eq!(state.last_reset_at(), Some(at(9)));
    assert_eq!(
        f.projector.available_amount(f.account, at(10)).await,
        dec!(15)
    );
}

#[tokio::test]
async fn replaying_history_twice_is_identical() {
    let f = fixture().await;
    let t1 = TransferId::new();

    f.repo
        .execute(f.account, at(8), |s| s.add_points(add(t1, dec!(100))))
        .await
        .unwrap();
    f.repo
        .execute(f.account, at(9), |s| {
            s.spend_points(spend(TransferId::new(), dec!(30)), at(9))
        })
        .await
        .unwrap();
    f.repo
        .execute(f.account, at(10), |s| s.reset())
        .await
        .unwrap();

    let history = f.store.load(f.account).await.unwrap();
    let first = AccountState::replay(&history);
    let second = AccountState::replay(&history);

    assert_eq!(first.version(), second.version());
    assert_eq!(first.available_amount(at(11)), second.available_amount(at(11)));
    assert_eq!(first.earned_amount(), second.earned_amount());
    assert_eq!(first.used_amount(), second.used_amount());
    assert_eq!(first.expired_amount(at(11)), second.expired_amount(at(11)));
    for record in first.transfers() {
        assert_eq!(second.transfer(record.id()), Some(record));
    }
}

#[tokio::test]
async fn stale_writer_gets_conflict_and_retries() {
    let f = fixture().await;

    // Writer A loads, writer B commits first.
    let state_a = f.repo.load(f.account).await.unwrap();
    let version_a = state_a.version();

    f.repo
        .execute(f.account, at(8), |s| s.add_points(add(TransferId::new(), dec!(10))))
        .await
        .unwrap();

    // Writer A appends against its stale observation.
    let events = state_a
        .add_points(add(TransferId::new(), dec!(20)))
        .unwrap();
    let envelopes: Vec<_> = events
        .into_iter()
        .enumerate()
        .map(|(i, event)| tally::ledger::EventEnvelope {
            account_id: f.account,
            sequence: version_a + i as u64,
            occurred_at: at(8),
            event,
        })
        .collect();
    let result = f.store.append(f.account, version_a, envelopes).await;
    assert!(matches!(
        result,
        Err(tally::store::StoreError::SequenceConflict { .. })
    ));

    // Retry from fresh state succeeds.
    f.repo
        .execute(f.account, at(9), |s| s.add_points(add(TransferId::new(), dec!(20))))
        .await
        .unwrap();
    let state = f.repo.load(f.account).await.unwrap();
    assert_eq!(state.available_amount(at(9)), dec!(30));
}

#[tokio::test]
async fn duplicate_transfer_rejected_across_commands() {
    let f = fixture().await;
    let id = TransferId::new();

    f.repo
        .execute(f.account, at(8), |s| s.add_points(add(id, dec!(10))))
        .await
        .unwrap();
    let result = f
        .repo
        .execute(f.account, at(9), |s| s.add_points(add(id, dec!(10))))
        .await;
    assert!(matches!(
        result,
        Err(RepositoryError::Ledger(LedgerError::DuplicateTransfer { .. }))
    ));
    // The rejected command left no event behind.
    assert_eq!(f.repo.load(f.account).await.unwrap().version(), 2);
}

#[tokio::test]
async fn bus_delivers_in_order_across_accounts() {
    let store = Arc::new(MemoryEventStore::new());
    let bus = Arc::new(InProcessBus::new());
    let projector = Arc::new(LedgerViewProjector::new());
    bus.add_projector(projector.clone()).await;
    let repo = AccountRepository::with_bus(store, bus.clone());

    let accounts: Vec<AccountId> = (0..4).map(|_| AccountId::new()).collect();
    for &account in &accounts {
        repo.execute(account, at(6), |s| s.open(CustomerId::new()))
            .await
            .unwrap();
        repo.execute(account, at(7), |s| s.add_points(add(TransferId::new(), dec!(5))))
            .await
            .unwrap();
    }

    for &account in &accounts {
        assert_eq!(projector.available_amount(account, at(8)).await, dec!(5));
    }
}
