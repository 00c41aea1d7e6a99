//! Earning rule model.
//!
//! Rules are authored by the campaign back office and are read-only inputs
//! here. Structural validity is enforced at authoring time via
//! `EarningRule::validate`; evaluation itself never fails on rule data.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::transaction::{CustomerContext, Label, LevelId, PosId, SegmentId};

/// Result type for rule authoring.
pub type Result<T> = std::result::Result<T, RuleError>;

/// Errors from rule construction.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Invalid rule '{name}': {reason}")]
    Validation { name: String, reason: String },
}

/// Identifies an earning rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EarningRuleId(pub Uuid);

impl EarningRuleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EarningRuleId {
    fn default() -> Self {
        Self::new()
    }
}

/// When a rule is in force.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityWindow {
    AllTime,
    Between {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

impl ActivityWindow {
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        match self {
            ActivityWindow::AllTime => true,
            ActivityWindow::Between { from, to } => *from <= at && at <= *to,
        }
    }
}

/// Which customers and points of sale a rule applies to.
///
/// Empty level and segment lists match every customer; otherwise the
/// customer's level or one of their segments must be listed. A non-empty
/// pos list additionally restricts where the purchase or event happened.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudienceFilter {
    pub levels: Vec<LevelId>,
    pub segments: Vec<SegmentId>,
    pub pos: Vec<PosId>,
}

impl AudienceFilter {
    pub fn matches_customer(&self, customer: &CustomerContext) -> bool {
        if self.levels.is_empty() && self.segments.is_empty() {
            return true;
        }
        if customer.level.is_some_and(|l| self.levels.contains(&l)) {
            return true;
        }
        customer.segments.iter().any(|s| self.segments.contains(s))
    }

    pub fn matches_pos(&self, pos: Option<PosId>) -> bool {
        if self.pos.is_empty() {
            return true;
        }
        pos.is_some_and(|p| self.pos.contains(&p))
    }
}

/// One (label key, label value) -> multiplier entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMultiplier {
    pub key: String,
    pub value: String,
    pub multiplier: Decimal,
}

impl LabelMultiplier {
    pub fn matches(&self, label: &Label) -> bool {
        self.key == label.key && self.value == label.value
    }
}

/// Who a referral rule rewards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralReward {
    Referrer,
    Referred,
    Both,
}

/// Rule-kind-specific parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKind {
    /// Points per unit of matched order value.
    FlatRate {
        point_value: Decimal,
        excluded_skus: Vec<String>,
        excluded_labels: Vec<Label>,
        exclude_delivery_cost: bool,
        min_order_value: Option<Decimal>,
    },
    /// Fixed award when any listed product is purchased.
    PerProduct {
        point_value: Decimal,
        skus: Vec<String>,
    },
    /// Multiply accumulated points of items matched by SKU or label.
    ProductMultiplier {
        multiplier: Decimal,
        skus: Vec<String>,
        labels: Vec<Label>,
    },
    /// Per-label multiplier table; matches compose multiplicatively.
    LabelMultiplier { multipliers: Vec<LabelMultiplier> },
    /// Fixed award for a named business event.
    EventRule {
        event_name: String,
        point_value: Decimal,
    },
    /// Fixed award for a caller-defined event name.
    CustomEvent {
        event_name: String,
        point_value: Decimal,
    },
    /// Award on referral completion, per reward bucket.
    Referral {
        event_name: String,
        reward: ReferralReward,
        point_value: Decimal,
    },
    /// Award when an event happens inside a geofence.
    Geo {
        latitude: f64,
        longitude: f64,
        radius_km: f64,
        point_value: Decimal,
    },
}

impl RuleKind {
    /// Kinds evaluated against a whole transaction, as opposed to the
    /// single-shot event paths.
    pub fn is_transaction_kind(&self) -> bool {
        matches!(
            self,
            RuleKind::FlatRate { .. }
                | RuleKind::PerProduct { .. }
                | RuleKind::ProductMultiplier { .. }
                | RuleKind::LabelMultiplier { .. }
        )
    }
}

/// A configured earning rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningRule {
    pub id: EarningRuleId,
    /// Display name, surfaced in audit output.
    pub name: String,
    /// Ascending execution order; lower runs first.
    pub priority: i32,
    pub window: ActivityWindow,
    pub audience: AudienceFilter,
    /// With `last_executed_rule`, stops evaluation once this rule fires.
    pub stoppable: bool,
    pub last_executed_rule: bool,
    pub kind: RuleKind,
}

impl EarningRule {
    /// Structural validation, run when a rule is authored or loaded.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| {
            Err(RuleError::Validation {
                name: self.name.clone(),
                reason,
            })
        };

        if let ActivityWindow::Between { from, to } = self.window {
            if from > to {
                return fail(format!("activity window starts after it ends: {from} > {to}"));
            }
        }

        match &self.kind {
            RuleKind::FlatRate {
                point_value,
                min_order_value,
                ..
            } => {
                if *point_value < Decimal::ZERO {
                    return fail("point value must be non-negative".into());
                }
                if min_order_value.is_some_and(|m| m < Decimal::ZERO) {
                    return fail("minimum order value must be non-negative".into());
                }
            }
            RuleKind::PerProduct { point_value, skus } => {
                if *point_value < Decimal::ZERO {
                    return fail("point value must be non-negative".into());
                }
                if skus.is_empty() {
                    return fail("product purchase rule needs at least one SKU".into());
                }
            }
            RuleKind::ProductMultiplier {
                multiplier,
                skus,
                labels,
            } => {
                if *multiplier < Decimal::ZERO {
                    return fail("multiplier must be non-negative".into());
                }
                if skus.is_empty() && labels.is_empty() {
                    return fail("multiplier rule needs SKUs or labels to match".into());
                }
            }
            RuleKind::LabelMultiplier { multipliers } => {
                if multipliers.is_empty() {
                    return fail("label multiplier rule needs at least one entry".into());
                }
                if multipliers.iter().any(|m| m.multiplier < Decimal::ZERO) {
                    return fail("multipliers must be non-negative".into());
                }
            }
            RuleKind::EventRule {
                event_name,
                point_value,
            }
            | RuleKind::CustomEvent {
                event_name,
                point_value,
            }
            | RuleKind::Referral {
                event_name,
                point_value,
                ..
            } => {
                if event_name.is_empty() {
                    return fail("event name must not be empty".into());
                }
                if *point_value < Decimal::ZERO {
                    return fail("point value must be non-negative".into());
                }
            }
            RuleKind::Geo {
                latitude,
                longitude,
                radius_km,
                point_value,
            } => {
                if !latitude.is_finite() || !(-90.0..=90.0).contains(latitude) {
                    return fail(format!("latitude out of range: {latitude}"));
                }
                if !longitude.is_finite() || !(-180.0..=180.0).contains(longitude) {
                    return fail(format!("longitude out of range: {longitude}"));
                }
                if !radius_km.is_finite() || *radius_km <= 0.0 {
                    return fail(format!("radius must be positive: {radius_km}"));
                }
                if *point_value < Decimal::ZERO {
                    return fail("point value must be non-negative".into());
                }
            }
        }

        Ok(())
    }
}
