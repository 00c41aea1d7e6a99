//! Evaluation inputs.
//!
//! A transaction snapshot and the customer's membership data are fetched by
//! the caller at the start of an evaluation and treated as immutable for
//! its duration.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::{CustomerId, TransactionId};

/// Identifies a customer level (tier).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LevelId(pub Uuid);

/// Identifies a customer segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(pub Uuid);

/// Identifies a point of sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PosId(pub Uuid);

/// A (key, value) label attached to a line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub key: String,
    pub value: String,
}

impl Label {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One purchased line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub sku: String,
    pub name: Option<String>,
    pub quantity: u32,
    /// Total value of the line, not per unit.
    pub gross_value: Decimal,
    pub labels: Vec<Label>,
}

impl LineItem {
    pub fn has_label(&self, label: &Label) -> bool {
        self.labels.contains(label)
    }
}

/// Immutable view of the transaction under evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionSnapshot {
    pub transaction_id: TransactionId,
    pub purchased_at: DateTime<Utc>,
    pub pos_id: Option<PosId>,
    pub items: Vec<LineItem>,
}

impl TransactionSnapshot {
    /// Total gross value across all lines.
    pub fn gross_value(&self) -> Decimal {
        self.items.iter().map(|i| i.gross_value).sum()
    }
}

/// Customer account status. Only some statuses earn points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerStatus {
    New,
    Active,
    Blocked,
    Deleted,
}

/// The customer's membership data at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerContext {
    pub customer_id: CustomerId,
    pub status: CustomerStatus,
    pub level: Option<LevelId>,
    pub segments: Vec<SegmentId>,
    /// Point of sale the customer registered at, used by event paths.
    pub pos_id: Option<PosId>,
}

impl CustomerContext {
    pub fn new(customer_id: CustomerId, status: CustomerStatus) -> Self {
        Self {
            customer_id,
            status,
            level: None,
            segments: Vec::new(),
            pos_id: None,
        }
    }
}
