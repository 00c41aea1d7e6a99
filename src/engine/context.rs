//! Evaluation context.
//!
//! Transient accumulator for one evaluation pass. Created fresh per call,
//! discarded after; never persisted.

use rust_decimal::{Decimal, RoundingStrategy};

use super::transaction::TransactionSnapshot;

/// Round a point total to two decimal places, halves away from zero.
pub(crate) fn round_points(points: Decimal) -> Decimal {
    points.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Mutable state threaded through one transaction evaluation.
pub struct EvaluationContext<'a> {
    transaction: &'a TransactionSnapshot,
    /// Accumulated points per line item, indexed like `transaction.items`.
    item_points: Vec<Decimal>,
    /// Whole-transaction contributions (fixed awards).
    transaction_points: Decimal,
    fired_rules: Vec<String>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(transaction: &'a TransactionSnapshot) -> Self {
        Self {
            transaction,
            item_points: vec![Decimal::ZERO; transaction.items.len()],
            transaction_points: Decimal::ZERO,
            fired_rules: Vec::new(),
        }
    }

    /// The transaction under evaluation. Returns the outer lifetime so
    /// callers can hold item references while accumulating points.
    pub fn transaction(&self) -> &'a TransactionSnapshot {
        self.transaction
    }

    pub fn item_points(&self, index: usize) -> Decimal {
        self.item_points[index]
    }

    pub fn add_item_points(&mut self, index: usize, points: Decimal) {
        self.item_points[index] += points;
    }

    /// Scale one item's accumulated points, returning the delta applied.
    pub fn multiply_item_points(&mut self, index: usize, factor: Decimal) -> Decimal {
        let before = self.item_points[index];
        self.item_points[index] = before * factor;
        self.item_points[index] - before
    }

    pub fn add_transaction_points(&mut self, points: Decimal) {
        self.transaction_points += points;
    }

    pub fn record_fired(&mut self, rule_name: &str) {
        self.fired_rules.push(rule_name.to_string());
    }

    /// Running total across items and transaction-level awards.
    pub fn total(&self) -> Decimal {
        self.item_points.iter().copied().sum::<Decimal>() + self.transaction_points
    }

    pub fn into_outcome(self) -> EvaluationOutcome {
        EvaluationOutcome {
            points: round_points(self.total()),
            fired_rules: self.fired_rules,
        }
    }
}

/// Result of one evaluation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationOutcome {
    /// Non-negative total, rounded to two decimal places.
    pub points: Decimal,
    /// Display names of the rules that fired, in execution order.
    pub fired_rules: Vec<String>,
}

impl EvaluationOutcome {
    pub fn zero() -> Self {
        Self {
            points: Decimal::ZERO,
            fired_rules: Vec::new(),
        }
    }

    /// Fired-rule names joined for audit comments.
    pub fn fired_rules_display(&self) -> String {
        self.fired_rules.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TransactionId;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn transaction() -> TransactionSnapshot {
        TransactionSnapshot {
            transaction_id: TransactionId::new(),
            purchased_at: Utc::now(),
            pos_id: None,
            items: vec![
                crate::engine::LineItem {
                    sku: "SKU-1".into(),
                    name: None,
                    quantity: 1,
                    gross_value: dec!(10),
                    labels: vec![],
                },
                crate::engine::LineItem {
                    sku: "SKU-2".into(),
                    name: None,
                    quantity: 2,
                    gross_value: dec!(20),
                    labels: vec![],
                },
            ],
        }
    }

    #[test]
    fn totals_combine_item_and_transaction_points() {
        let tx = transaction();
        let mut ctx = EvaluationContext::new(&tx);
        ctx.add_item_points(0, dec!(1.5));
        ctx.add_item_points(1, dec!(2));
        ctx.add_transaction_points(dec!(10));
        assert_eq!(ctx.total(), dec!(13.5));
    }

    #[test]
    fn multiply_returns_delta() {
        let tx = transaction();
        let mut ctx = EvaluationContext::new(&tx);
        ctx.add_item_points(0, dec!(4));
        let delta = ctx.multiply_item_points(0, dec!(3));
        assert_eq!(delta, dec!(8));
        assert_eq!(ctx.item_points(0), dec!(12));
    }

    #[test]
    fn outcome_rounds_half_away_from_zero() {
        let tx = transaction();
        let mut ctx = EvaluationContext::new(&tx);
        ctx.add_item_points(0, dec!(1.005));
        let outcome = ctx.into_outcome();
        assert_eq!(outcome.points, dec!(1.01));
    }
}
