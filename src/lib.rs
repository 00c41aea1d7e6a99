//! Tally - loyalty points back office core.
//!
//! An event-sourced points ledger (additions, FIFO spend-down, locking,
//! expiration, cancellation, resets) and a prioritized earning-rule engine
//! that converts transactions and business events into point awards.

pub mod bus;
pub mod config;
pub mod engine;
pub mod ledger;
pub mod projection;
pub mod repository;
pub mod store;

pub use config::{Config, EarningConfig};
pub use engine::{EarningRule, EarningRuleEngine, EvaluationOutcome};
pub use ledger::{AccountId, AccountState, CustomerId, LedgerEvent, TransferId};
pub use repository::AccountRepository;
