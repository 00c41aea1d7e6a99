//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query
//! building.

use sea_query::Iden;

/// Ledger events table schema.
#[derive(Iden)]
pub enum LedgerEvents {
    Table,
    #[iden = "account"]
    Account,
    #[iden = "sequence"]
    Sequence,
    #[iden = "occurred_at"]
    OccurredAt,
    #[iden = "event_data"]
    EventData,
}

/// SQL for creating the ledger events table.
pub const CREATE_LEDGER_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ledger_events (
    account TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    occurred_at TEXT NOT NULL,
    event_data TEXT NOT NULL,
    PRIMARY KEY (account, sequence)
);

CREATE INDEX IF NOT EXISTS idx_ledger_events_account ON ledger_events(account);
"#;
