// 📒 Domain Entities - Transactions, limits, reminders, profiles
//
// Plain persisted records. Validation lives on the input types
// (NewTransaction, NewReminder, LimitsInput) so every store path shares it.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::subscription::{Plan, SubscriptionStatus};

// ============================================================================
// TRANSACTION TYPE
// ============================================================================

/// Direction of money: `Entrada` (income) or `Saída` (expense)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    #[serde(rename = "Entrada", alias = "entrada", alias = "income")]
    Entrada,

    #[serde(
        rename = "Saída",
        alias = "Saida",
        alias = "saida",
        alias = "saída",
        alias = "expense"
    )]
    Saida,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Entrada => "Entrada",
            TransactionType::Saida => "Saída",
        }
    }

    /// Signed value of `amount` for this direction
    pub fn signed(&self, amount: f64) -> f64 {
        match self {
            TransactionType::Entrada => amount,
            TransactionType::Saida => -amount,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "entrada" | "income" => Ok(TransactionType::Entrada),
            "saída" | "saida" | "expense" => Ok(TransactionType::Saida),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

// ============================================================================
// TRANSACTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub owner_id: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub category: String,
    /// Always positive; `kind` carries the sign
    pub amount: f64,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Build a stored transaction from validated input
    pub fn from_input(owner_id: &str, input: NewTransaction) -> Self {
        Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            description: input.description.trim().to_string(),
            kind: input.kind,
            category: input.category.trim().to_string(),
            amount: input.amount,
            date: input.date,
            created_at: Utc::now(),
        }
    }

    pub fn signed_amount(&self) -> f64 {
        self.kind.signed(self.amount)
    }

    pub fn is_expense(&self) -> bool {
        self.kind == TransactionType::Saida
    }
}

/// Input for creating or replacing a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "finite_amount"))]
pub struct NewTransaction {
    #[validate(custom(function = "not_blank"))]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    #[validate(custom(function = "not_blank"))]
    pub category: String,
    #[validate(range(exclusive_min = 0.0, message = "amount must be a positive number"))]
    pub amount: f64,
    pub date: NaiveDate,
}

// ============================================================================
// VALIDATION
// ============================================================================

fn invalid(code: &'static str, message: impl Into<Cow<'static, str>>) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(invalid("blank", "must not be blank"));
    }
    Ok(())
}

// NaN slips through range checks
fn finite_amount(input: &NewTransaction) -> Result<(), ValidationError> {
    if !input.amount.is_finite() {
        return Err(invalid("amount", "amount must be a positive number"));
    }
    Ok(())
}

fn check_ceiling(category: &str, ceiling: f64) -> Result<(), ValidationError> {
    if category.trim().is_empty() {
        return Err(invalid("category", "category is required"));
    }
    if !ceiling.is_finite() || ceiling < 0.0 {
        return Err(invalid(
            "ceiling",
            format!("limit for {} must be zero or positive", category),
        ));
    }
    Ok(())
}

fn valid_ceilings(limits: &BTreeMap<String, f64>) -> Result<(), ValidationError> {
    limits
        .iter()
        .try_for_each(|(category, ceiling)| check_ceiling(category, *ceiling))
}

/// One line per failed field, e.g. `category: must not be blank`
pub fn describe_errors(errors: &ValidationErrors) -> String {
    let mut lines: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| match &e.message {
                Some(message) if field == "__all__" || message.starts_with(field) => {
                    message.to_string()
                }
                Some(message) => format!("{}: {}", field, message),
                None => format!("{}: invalid", field),
            })
        })
        .collect();
    lines.sort();
    lines.dedup();
    lines.join("; ")
}

// ============================================================================
// SPENDING LIMIT
// ============================================================================

/// Per-category ceilings, one row per user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendingLimit {
    pub owner_id: String,
    pub limits: BTreeMap<String, f64>,
    pub updated_at: DateTime<Utc>,
}

impl SpendingLimit {
    pub fn new(owner_id: &str) -> Self {
        SpendingLimit {
            owner_id: owner_id.to_string(),
            limits: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Set the ceiling for one category
    pub fn set(&mut self, category: &str, ceiling: f64) -> Result<(), ValidationError> {
        check_ceiling(category, ceiling)?;
        self.limits.insert(category.trim().to_string(), ceiling);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn ceiling(&self, category: &str) -> Option<f64> {
        self.limits.get(category).copied()
    }

}

/// Body of `PUT /api/limits`: every ceiling, replacing the stored ones
#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct LimitsInput {
    #[validate(custom(function = "valid_ceilings"))]
    pub limits: BTreeMap<String, f64>,
}

// ============================================================================
// REMINDER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Local wall-clock time, interpreted in the configured calendar time zone
    pub starts_at: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar_event_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewReminder {
    #[validate(custom(function = "not_blank"))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub starts_at: NaiveDateTime,
}

impl Reminder {
    pub fn from_input(owner_id: &str, input: NewReminder) -> Self {
        Reminder {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            title: input.title.trim().to_string(),
            description: input.description.trim().to_string(),
            starts_at: input.starts_at,
            calendar_event_id: None,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// PROFILE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Auth provider user id
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    pub subscription_status: Option<SubscriptionStatus>,
    pub plan: Option<Plan>,
    pub subscription_started_at: Option<DateTime<Utc>>,
    pub subscription_ends_at: Option<DateTime<Utc>>,
    pub payment_customer_id: Option<String>,
    pub payment_subscription_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(id: &str, email: &str, name: &str, phone: &str) -> Self {
        Profile {
            id: id.to_string(),
            email: email.trim().to_lowercase(),
            name: name.trim().to_string(),
            phone: phone.trim().to_string(),
            subscription_status: None,
            plan: None,
            subscription_started_at: None,
            subscription_ends_at: None,
            payment_customer_id: None,
            payment_subscription_id: None,
            updated_at: Utc::now(),
        }
    }

    /// Apply subscription fields; `None` values keep what is stored
    pub fn apply(&mut self, update: &SubscriptionUpdate) {
        self.subscription_status = Some(update.status);
        if update.plan.is_some() {
            self.plan = update.plan;
        }
        if update.started_at.is_some() {
            self.subscription_started_at = update.started_at;
        }
        if update.ends_at.is_some() {
            self.subscription_ends_at = update.ends_at;
        }
        if update.customer_id.is_some() {
            self.payment_customer_id = update.customer_id.clone();
        }
        if update.subscription_id.is_some() {
            self.payment_subscription_id = update.subscription_id.clone();
        }
        self.updated_at = Utc::now();
    }
}

/// Subscription fields written by payment webhooks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionUpdate {
    #[serde(rename = "subscription_status")]
    pub status: SubscriptionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    #[serde(rename = "subscription_started_at", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "subscription_ends_at", skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(rename = "payment_customer_id", skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(rename = "payment_subscription_id", skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
}
