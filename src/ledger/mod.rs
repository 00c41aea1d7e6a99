//! Points ledger: transfer records, events, and the account aggregate.

mod account;
mod event;
mod transfer;

pub use account::{
    AccountState, AddPoints, LedgerError, Result, SpendPoints,
};
pub use event::{Allocation, EventEnvelope, LedgerEvent};
pub use transfer::{
    AccountId, AdditionRecord, CustomerId, DeductionRecord, Issuer, TransactionId, TransferId,
    TransferRecord,
};
