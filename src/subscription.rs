// 💳 Subscription State - Provider status mapping and access predicates
//
// Payment providers report free-form status strings. They are mapped once,
// here, into SubscriptionStatus; everything else works with the enum.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::Profile;

/// Days of access kept after a missed renewal
pub const PAST_DUE_GRACE_DAYS: i64 = 3;

/// Trial length when the provider does not send an end date
pub const TRIAL_DAYS: i64 = 7;

// ============================================================================
// STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    Pending,
    PastDue,
    Canceled,
    Expired,
}

impl SubscriptionStatus {
    /// Map a payment-provider status string (case-insensitive)
    pub fn from_provider(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase().replace(|c: char| c == '-' || c == ' ', "_");

        match normalized.as_str() {
            "paid" | "approved" | "completed" | "active" | "authorized" => {
                Some(SubscriptionStatus::Active)
            }
            "trial" | "trialing" => Some(SubscriptionStatus::Trialing),
            "waiting_payment" | "pending" | "processing" => Some(SubscriptionStatus::Pending),
            "overdue" | "past_due" | "late" | "refused" => Some(SubscriptionStatus::PastDue),
            "canceled" | "cancelled" | "refunded" | "chargedback" | "chargeback" => {
                Some(SubscriptionStatus::Canceled)
            }
            "expired" | "ended" => Some(SubscriptionStatus::Expired),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    /// Parse the stored (snake_case) form
    pub fn parse_stored(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(SubscriptionStatus::Active),
            "trialing" => Some(SubscriptionStatus::Trialing),
            "pending" => Some(SubscriptionStatus::Pending),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "canceled" => Some(SubscriptionStatus::Canceled),
            "expired" => Some(SubscriptionStatus::Expired),
            _ => None,
        }
    }

    /// Whether a webhook with this status should provision an account
    pub fn grants_access(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PLAN
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Monthly,
    Quarterly,
    Annual,
}

impl Plan {
    /// Recognize a plan from a provider plan name or billing frequency
    pub fn from_provider(raw: &str) -> Option<Self> {
        let lower = raw.trim().to_lowercase();

        if ["anual", "annual", "yearly", "year"].iter().any(|k| lower.contains(k)) {
            Some(Plan::Annual)
        } else if ["trimestral", "quarterly", "quarter", "trimestre"]
            .iter()
            .any(|k| lower.contains(k))
        {
            Some(Plan::Quarterly)
        } else if ["mensal", "monthly", "month", "mês"].iter().any(|k| lower.contains(k)) {
            Some(Plan::Monthly)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Monthly => "monthly",
            Plan::Quarterly => "quarterly",
            Plan::Annual => "annual",
        }
    }

    pub fn parse_stored(raw: &str) -> Option<Self> {
        match raw {
            "monthly" => Some(Plan::Monthly),
            "quarterly" => Some(Plan::Quarterly),
            "annual" => Some(Plan::Annual),
            _ => None,
        }
    }

    pub fn period_days(&self) -> i64 {
        match self {
            Plan::Monthly => 30,
            Plan::Quarterly => 90,
            Plan::Annual => 365,
        }
    }
}

// ============================================================================
// ACCESS PREDICATES
// ============================================================================

/// Whether the profile may use paid features at `now`
pub fn has_access(profile: &Profile, now: DateTime<Utc>) -> bool {
    let ends_at = profile.subscription_ends_at;

    match profile.subscription_status {
        Some(SubscriptionStatus::Active) | Some(SubscriptionStatus::Trialing) => {
            ends_at.map_or(true, |end| end > now)
        }
        Some(SubscriptionStatus::PastDue) => {
            ends_at.map_or(false, |end| end + Duration::days(PAST_DUE_GRACE_DAYS) > now)
        }
        // Paid through the end of the current period
        Some(SubscriptionStatus::Canceled) => ends_at.map_or(false, |end| end > now),
        Some(SubscriptionStatus::Pending) | Some(SubscriptionStatus::Expired) | None => false,
    }
}

pub fn is_trial(profile: &Profile) -> bool {
    profile.subscription_status == Some(SubscriptionStatus::Trialing)
}

/// Whole days until the subscription end (0 once past, None without an end date)
pub fn days_remaining(profile: &Profile, now: DateTime<Utc>) -> Option<i64> {
    profile
        .subscription_ends_at
        .map(|end| (end - now).num_days().max(0))
}

/// Whether the user should be sent to checkout
pub fn needs_payment(profile: &Profile, now: DateTime<Utc>) -> bool {
    match profile.subscription_status {
        Some(SubscriptionStatus::PastDue) | Some(SubscriptionStatus::Pending) => true,
        _ => !has_access(profile, now),
    }
}

/// Access summary returned to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessSummary {
    pub status: Option<SubscriptionStatus>,
    pub plan: Option<Plan>,
    pub has_access: bool,
    pub is_trial: bool,
    pub needs_payment: bool,
    pub days_remaining: Option<i64>,
}

impl AccessSummary {
    pub fn for_profile(profile: &Profile, now: DateTime<Utc>) -> Self {
        AccessSummary {
            status: profile.subscription_status,
            plan: profile.plan,
            has_access: has_access(profile, now),
            is_trial: is_trial(profile),
            needs_payment: needs_payment(profile, now),
            days_remaining: days_remaining(profile, now),
        }
    }
}
