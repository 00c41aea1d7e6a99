//! Earning rule evaluation.
//!
//! Converts a transaction or business event into a point award by running
//! the configured rules. Evaluation is a pure, synchronous computation:
//! rules, customer membership, and configuration are fetched by the caller
//! and treated as an immutable snapshot for the duration of the call.

use rust_decimal::Decimal;
use tracing::debug;

mod algorithms;
mod context;
mod rule;
mod transaction;

use algorithms::algorithm_for;
use chrono::{DateTime, Utc};
use context::round_points;

pub use context::{EvaluationContext, EvaluationOutcome};
pub use rule::{
    ActivityWindow, AudienceFilter, EarningRule, EarningRuleId, LabelMultiplier, ReferralReward,
    Result, RuleError, RuleKind,
};
pub use transaction::{
    CustomerContext, CustomerStatus, Label, LevelId, LineItem, PosId, SegmentId,
    TransactionSnapshot,
};

use crate::config::EarningConfig;

/// A single-shot award produced by one rule.
#[derive(Debug, Clone, PartialEq)]
pub struct EventAward {
    pub rule_id: EarningRuleId,
    pub rule_name: String,
    pub points: Decimal,
}

/// Which party a referral award goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferralRecipient {
    Referrer,
    Referred,
}

/// A referral award for one recipient bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferralAward {
    pub recipient: ReferralRecipient,
    pub rule_id: EarningRuleId,
    pub rule_name: String,
    pub points: Decimal,
}

/// Stateless rule evaluator.
#[derive(Debug, Default)]
pub struct EarningRuleEngine;

impl EarningRuleEngine {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate every applicable transaction rule, in priority order.
    pub fn evaluate_transaction(
        &self,
        transaction: &TransactionSnapshot,
        customer: &CustomerContext,
        rules: &[EarningRule],
        config: &EarningConfig,
    ) -> EvaluationOutcome {
        if !config.can_earn(customer.status) {
            return EvaluationOutcome::zero();
        }

        let at = transaction.purchased_at;
        let mut candidates: Vec<&EarningRule> = rules
            .iter()
            .filter(|r| r.kind.is_transaction_kind())
            .filter(|r| r.window.covers(at))
            .filter(|r| r.audience.matches_customer(customer))
            .filter(|r| r.audience.matches_pos(transaction.pos_id))
            .collect();
        // Stable sort keeps authoring order among equal priorities.
        candidates.sort_by_key(|r| r.priority);

        let mut ctx = EvaluationContext::new(transaction);
        for rule in candidates {
            let Some(algorithm) = algorithm_for(&rule.kind) else {
                continue;
            };
            if algorithm.evaluate(&mut ctx, rule, config) {
                ctx.record_fired(&rule.name);
                debug!(rule = %rule.name, total = %ctx.total(), "earning rule fired");
                if rule.stoppable && rule.last_executed_rule {
                    debug!(rule = %rule.name, "stopping at last-executed rule");
                    break;
                }
            }
        }
        ctx.into_outcome()
    }

    /// Highest-value active rule for a named business event.
    pub fn evaluate_event(
        &self,
        event_name: &str,
        at: DateTime<Utc>,
        customer: &CustomerContext,
        rules: &[EarningRule],
        config: &EarningConfig,
    ) -> Option<EventAward> {
        self.best_award(at, customer, rules, config, |kind| match kind {
            RuleKind::EventRule {
                event_name: name,
                point_value,
            } if name == event_name => Some(*point_value),
            _ => None,
        })
    }

    /// Highest-value active rule for a caller-defined event name.
    pub fn evaluate_custom_event(
        &self,
        event_name: &str,
        at: DateTime<Utc>,
        customer: &CustomerContext,
        rules: &[EarningRule],
        config: &EarningConfig,
    ) -> Option<EventAward> {
        self.best_award(at, customer, rules, config, |kind| match kind {
            RuleKind::CustomEvent {
                event_name: name,
                point_value,
            } if name == event_name => Some(*point_value),
            _ => None,
        })
    }

    /// Highest-value active referral rule per reward bucket. A referral can
    /// reward referrer and referred independently, so up to two awards come
    /// back.
    pub fn evaluate_referral_event(
        &self,
        event_name: &str,
        at: DateTime<Utc>,
        customer: &CustomerContext,
        rules: &[EarningRule],
        config: &EarningConfig,
    ) -> Vec<ReferralAward> {
        if !config.can_earn(customer.status) {
            return Vec::new();
        }

        let mut best: [Option<(&EarningRule, Decimal)>; 2] = [None, None];
        for rule in rules {
            if !self.eligible(rule, at, customer) {
                continue;
            }
            let RuleKind::Referral {
                event_name: name,
                reward,
                point_value,
            } = &rule.kind
            else {
                continue;
            };
            if name != event_name {
                continue;
            }

            let buckets: &[usize] = match reward {
                ReferralReward::Referrer => &[0],
                ReferralReward::Referred => &[1],
                ReferralReward::Both => &[0, 1],
            };
            for &bucket in buckets {
                if best[bucket].is_none_or(|(_, current)| *point_value > current) {
                    best[bucket] = Some((rule, *point_value));
                }
            }
        }

        let recipients = [ReferralRecipient::Referrer, ReferralRecipient::Referred];
        best.into_iter()
            .zip(recipients)
            .filter_map(|(entry, recipient)| {
                entry.map(|(rule, points)| ReferralAward {
                    recipient,
                    rule_id: rule.id,
                    rule_name: rule.name.clone(),
                    points: round_points(points),
                })
            })
            .collect()
    }

    /// Every active geofenced rule containing the supplied coordinates.
    pub fn evaluate_geo_event(
        &self,
        latitude: f64,
        longitude: f64,
        at: DateTime<Utc>,
        customer: &CustomerContext,
        rules: &[EarningRule],
        config: &EarningConfig,
    ) -> Vec<EventAward> {
        if !config.can_earn(customer.status) {
            return Vec::new();
        }

        rules
            .iter()
            .filter(|r| self.eligible(r, at, customer))
            .filter_map(|rule| match &rule.kind {
                RuleKind::Geo {
                    latitude: lat,
                    longitude: lon,
                    radius_km,
                    point_value,
                } if haversine_km(latitude, longitude, *lat, *lon) <= *radius_km => {
                    Some(EventAward {
                        rule_id: rule.id,
                        rule_name: rule.name.clone(),
                        points: round_points(*point_value),
                    })
                }
                _ => None,
            })
            .collect()
    }

    fn eligible(&self, rule: &EarningRule, at: DateTime<Utc>, customer: &CustomerContext) -> bool {
        rule.window.covers(at)
            && rule.audience.matches_customer(customer)
            && rule.audience.matches_pos(customer.pos_id)
    }

    fn best_award<F>(
        &self,
        at: DateTime<Utc>,
        customer: &CustomerContext,
        rules: &[EarningRule],
        config: &EarningConfig,
        select: F,
    ) -> Option<EventAward>
    where
        F: Fn(&RuleKind) -> Option<Decimal>,
    {
        if !config.can_earn(customer.status) {
            return None;
        }

        let mut best: Option<(&EarningRule, Decimal)> = None;
        for rule in rules {
            if !self.eligible(rule, at, customer) {
                continue;
            }
            let Some(points) = select(&rule.kind) else {
                continue;
            };
            if best.is_none_or(|(_, current)| points > current) {
                best = Some((rule, points));
            }
        }

        best.map(|(rule, points)| EventAward {
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            points: round_points(points),
        })
    }
}

/// Great-circle distance between two coordinates, in kilometers.
fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}
