//! SQLite implementation of the event store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sqlx::{Acquire, Row, SqlitePool};
use uuid::Uuid;

use super::schema::{LedgerEvents, CREATE_LEDGER_EVENTS_TABLE};
use super::{check_append, EventStore, Result, StoreError};
use crate::ledger::{AccountId, EventEnvelope, LedgerEvent};

/// SQLite-backed event store.
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    /// Create a new SQLite event store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_LEDGER_EVENTS_TABLE)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn decode_row(row: &sqlx::sqlite::SqliteRow) -> Result<EventEnvelope> {
        let account: String = row.get("account");
        let sequence: i64 = row.get("sequence");
        let occurred_at: String = row.get("occurred_at");
        let event_data: String = row.get("event_data");

        let occurred_at = DateTime::parse_from_rfc3339(&occurred_at)
            .map_err(|e| StoreError::InvalidTimestamp(e.to_string()))?
            .with_timezone(&Utc);
        let event: LedgerEvent = serde_json::from_str(&event_data)?;

        Ok(EventEnvelope {
            account_id: AccountId(Uuid::parse_str(&account)?),
            sequence: sequence as u64,
            occurred_at,
            event,
        })
    }

    async fn load_where(&self, account: AccountId, from: u64) -> Result<Vec<EventEnvelope>> {
        let query = Query::select()
            .columns([
                LedgerEvents::Account,
                LedgerEvents::Sequence,
                LedgerEvents::OccurredAt,
                LedgerEvents::EventData,
            ])
            .from(LedgerEvents::Table)
            .and_where(Expr::col(LedgerEvents::Account).eq(account.to_string()))
            .and_where(Expr::col(LedgerEvents::Sequence).gte(from as i64))
            .order_by(LedgerEvents::Sequence, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            events.push(Self::decode_row(&row)?);
        }
        Ok(events)
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn append(
        &self,
        account: AccountId,
        expected_version: u64,
        events: Vec<EventEnvelope>,
    ) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let account_str = account.to_string();

        // Transaction gives the version check isolation from concurrent
        // writers; a conflicting append rolls back untouched.
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let current_version = {
            let query = Query::select()
                .expr(Expr::col(LedgerEvents::Sequence).max())
                .from(LedgerEvents::Table)
                .and_where(Expr::col(LedgerEvents::Account).eq(&account_str))
                .to_string(SqliteQueryBuilder);

            let row = sqlx::query(&query).fetch_optional(&mut *tx).await?;
            match row {
                Some(row) => {
                    let max_seq: Option<i64> = row.get(0);
                    max_seq.map(|s| s as u64 + 1).unwrap_or(0)
                }
                None => 0,
            }
        };

        check_append(current_version, expected_version, &events)?;

        for envelope in &events {
            let event_data = serde_json::to_string(&envelope.event)?;

            let query = Query::insert()
                .into_table(LedgerEvents::Table)
                .columns([
                    LedgerEvents::Account,
                    LedgerEvents::Sequence,
                    LedgerEvents::OccurredAt,
                    LedgerEvents::EventData,
                ])
                .values_panic([
                    account_str.clone().into(),
                    (envelope.sequence as i64).into(),
                    envelope.occurred_at.to_rfc3339().into(),
                    event_data.into(),
                ])
                .to_string(SqliteQueryBuilder);

            sqlx::query(&query).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load(&self, account: AccountId) -> Result<Vec<EventEnvelope>> {
        self.load_where(account, 0).await
    }

    async fn load_from(&self, account: AccountId, from: u64) -> Result<Vec<EventEnvelope>> {
        self.load_where(account, from).await
    }

    async fn version(&self, account: AccountId) -> Result<u64> {
        let query = Query::select()
            .expr(Expr::col(LedgerEvents::Sequence).max())
            .from(LedgerEvents::Table)
            .and_where(Expr::col(LedgerEvents::Account).eq(account.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        Ok(match row {
            Some(row) => {
                let max_seq: Option<i64> = row.get(0);
                max_seq.map(|s| s as u64 + 1).unwrap_or(0)
            }
            None => 0,
        })
    }

    async fn list_accounts(&self) -> Result<Vec<AccountId>> {
        let query = Query::select()
            .distinct()
            .column(LedgerEvents::Account)
            .from(LedgerEvents::Table)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut accounts = Vec::with_capacity(rows.len());
        for row in rows {
            let account: String = row.get("account");
            accounts.push(AccountId(Uuid::parse_str(&account)?));
        }
        Ok(accounts)
    }
}
