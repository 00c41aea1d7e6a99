//! Point-computation strategies, one per transaction rule kind.
//!
//! An algorithm mutates the shared evaluation context and reports whether
//! it fired, meaning it changed the accumulated total by a non-zero delta.
//! A multiplier of one or a match against items holding zero points does
//! not fire, and so cannot trigger early termination.

use rust_decimal::Decimal;

use super::context::EvaluationContext;
use super::rule::{EarningRule, RuleKind};
use crate::config::EarningConfig;

/// Strategy interface for one rule kind's formula.
pub(crate) trait RuleAlgorithm: Send + Sync {
    fn evaluate(
        &self,
        ctx: &mut EvaluationContext<'_>,
        rule: &EarningRule,
        config: &EarningConfig,
    ) -> bool;
}

/// Dispatch table from rule kind to its algorithm. Event-path kinds have
/// no transaction algorithm and return `None`.
pub(crate) fn algorithm_for(kind: &RuleKind) -> Option<&'static dyn RuleAlgorithm> {
    match kind {
        RuleKind::FlatRate { .. } => Some(&FlatRate),
        RuleKind::PerProduct { .. } => Some(&PerProduct),
        RuleKind::ProductMultiplier { .. } => Some(&ProductMultiplier),
        RuleKind::LabelMultiplier { .. } => Some(&LabelMultiplier),
        _ => None,
    }
}

/// `point_value * item_value` over every non-excluded line.
struct FlatRate;

impl RuleAlgorithm for FlatRate {
    fn evaluate(
        &self,
        ctx: &mut EvaluationContext<'_>,
        rule: &EarningRule,
        config: &EarningConfig,
    ) -> bool {
        let RuleKind::FlatRate {
            point_value,
            excluded_skus,
            excluded_labels,
            exclude_delivery_cost,
            min_order_value,
        } = &rule.kind
        else {
            return false;
        };

        let items = &ctx.transaction().items;
        let matched: Vec<(usize, Decimal)> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| {
                !excluded_skus.contains(&item.sku)
                    && !item.labels.iter().any(|l| excluded_labels.contains(l))
                    && !(*exclude_delivery_cost && config.delivery_skus.contains(&item.sku))
            })
            .map(|(index, item)| (index, item.gross_value))
            .collect();

        let matched_value: Decimal = matched.iter().map(|(_, v)| *v).sum();
        if min_order_value.is_some_and(|m| matched_value < m) {
            return false;
        }

        let mut delta = Decimal::ZERO;
        for (index, value) in matched {
            let points = *point_value * value;
            ctx.add_item_points(index, points);
            delta += points;
        }
        delta != Decimal::ZERO
    }
}

/// Fixed award once if any listed product appears, regardless of quantity
/// or value.
struct PerProduct;

impl RuleAlgorithm for PerProduct {
    fn evaluate(
        &self,
        ctx: &mut EvaluationContext<'_>,
        rule: &EarningRule,
        _config: &EarningConfig,
    ) -> bool {
        let RuleKind::PerProduct { point_value, skus } = &rule.kind else {
            return false;
        };

        let matched = ctx
            .transaction()
            .items
            .iter()
            .any(|item| skus.contains(&item.sku));
        if !matched || *point_value == Decimal::ZERO {
            return false;
        }

        ctx.add_transaction_points(*point_value);
        true
    }
}

/// Scales points already earned by items matched by SKU or label.
struct ProductMultiplier;

impl RuleAlgorithm for ProductMultiplier {
    fn evaluate(
        &self,
        ctx: &mut EvaluationContext<'_>,
        rule: &EarningRule,
        _config: &EarningConfig,
    ) -> bool {
        let RuleKind::ProductMultiplier {
            multiplier,
            skus,
            labels,
        } = &rule.kind
        else {
            return false;
        };

        let items = &ctx.transaction().items;
        let mut delta = Decimal::ZERO;
        for (index, item) in items.iter().enumerate() {
            let matched =
                skus.contains(&item.sku) || item.labels.iter().any(|l| labels.contains(l));
            if matched {
                delta += ctx.multiply_item_points(index, *multiplier);
            }
        }
        delta != Decimal::ZERO
    }
}

/// Per-item multiplier looked up by (label key, label value). An item
/// matching several entries composes them multiplicatively.
struct LabelMultiplier;

impl RuleAlgorithm for LabelMultiplier {
    fn evaluate(
        &self,
        ctx: &mut EvaluationContext<'_>,
        rule: &EarningRule,
        _config: &EarningConfig,
    ) -> bool {
        let RuleKind::LabelMultiplier { multipliers } = &rule.kind else {
            return false;
        };

        let items = &ctx.transaction().items;
        let mut delta = Decimal::ZERO;
        for (index, item) in items.iter().enumerate() {
            let mut factor = Decimal::ONE;
            for entry in multipliers {
                if item.labels.iter().any(|l| entry.matches(l)) {
                    factor *= entry.multiplier;
                }
            }
            if factor != Decimal::ONE {
                delta += ctx.multiply_item_points(index, factor);
            }
        }
        delta != Decimal::ZERO
    }
}
