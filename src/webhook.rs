// 🔔 Payment Webhook - Provider status → subscription, account provisioning
//
// Flow for one delivery:
//   1. map the provider status string (unknown → failure)
//   2. access-granting status → create the account, falling back to the
//      existing one when the email is already registered
//   3. any other status → update the existing account, if there is one
//   4. write the subscription fields onto the profile
//
// Deliveries are not deduplicated; replaying one rewrites the same fields.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

use crate::baas::{eq, BaasClient, CreateUserOutcome, NewAuthUser};
use crate::db;
use crate::format::parse_flexible_datetime;
use crate::models::{Profile, SubscriptionUpdate};
use crate::subscription::{Plan, SubscriptionStatus, TRIAL_DAYS};

// ============================================================================
// PAYLOAD
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentWebhook {
    #[serde(alias = "order_status", alias = "payment_status", alias = "event_status")]
    pub status: String,

    #[serde(default, alias = "order_id", alias = "transaction_id")]
    pub id: Option<String>,

    #[serde(alias = "Customer")]
    pub customer: WebhookCustomer,

    #[serde(default, alias = "Subscription")]
    pub subscription: Option<WebhookSubscription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookCustomer {
    #[serde(alias = "Email")]
    pub email: String,

    #[serde(default, alias = "full_name", alias = "Name")]
    pub name: String,

    #[serde(default, alias = "mobile", alias = "phone_number")]
    pub phone: String,

    #[serde(default, alias = "customer_id")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookSubscription {
    #[serde(default, alias = "subscription_id")]
    pub id: Option<String>,

    #[serde(default, alias = "plan_name", alias = "frequency")]
    pub plan: Option<String>,

    #[serde(default, alias = "start_date", alias = "started_at")]
    pub start: Option<String>,

    #[serde(default, alias = "next_payment_date", alias = "charges_until", alias = "current_period_end")]
    pub next_payment: Option<String>,
}

/// `{success, message}` answer returned to the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookOutcome {
    pub success: bool,
    pub message: String,
    /// The delivery itself is unusable; resending it will not help
    #[serde(skip)]
    pub rejected: bool,
}

impl WebhookOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        WebhookOutcome {
            success: true,
            message: message.into(),
            rejected: false,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        WebhookOutcome {
            success: false,
            message: message.into(),
            rejected: false,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        WebhookOutcome {
            success: false,
            message: message.into(),
            rejected: true,
        }
    }
}

/// Shared-secret check for the `x-webhook-token` header
///
/// With no secret configured every delivery is accepted.
pub fn verify_token(expected: Option<&str>, provided: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    let Some(provided) = provided else {
        return false;
    };

    let (a, b) = (expected.as_bytes(), provided.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ============================================================================
// PROVISIONER
// ============================================================================

/// Identity data for a new account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub email: String,
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountOutcome {
    Created(String),
    AlreadyExists,
}

/// Where accounts live: the local SQLite profiles table or the BaaS
#[derive(Clone)]
pub enum Provisioner {
    Local(Arc<Mutex<Connection>>),
    Remote(BaasClient),
}

#[derive(Serialize)]
struct RemoteProfileUpdate<'a> {
    #[serde(flatten)]
    update: &'a SubscriptionUpdate,
    updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct RemoteProfileInsert<'a> {
    id: &'a str,
    email: &'a str,
    name: &'a str,
    phone: &'a str,
    #[serde(flatten)]
    update: &'a SubscriptionUpdate,
    updated_at: DateTime<Utc>,
}

impl Provisioner {
    pub async fn create_account(&self, account: &NewAccount) -> Result<AccountOutcome> {
        match self {
            Provisioner::Local(conn) => local_create(conn, account),
            Provisioner::Remote(baas) => {
                let user = NewAuthUser {
                    email: account.email.clone(),
                    // The user sets a real password through the recovery flow
                    password: uuid::Uuid::new_v4().to_string(),
                    email_confirm: true,
                    user_metadata: serde_json::json!({
                        "name": account.name,
                        "phone": account.phone,
                    }),
                };
                match baas.create_user(&user).await? {
                    CreateUserOutcome::Created(created) => Ok(AccountOutcome::Created(created.id)),
                    CreateUserOutcome::AlreadyExists => Ok(AccountOutcome::AlreadyExists),
                }
            }
        }
    }

    /// User id registered for `email`
    pub async fn find_account(&self, email: &str) -> Result<Option<String>> {
        match self {
            Provisioner::Local(conn) => local_find(conn, email),
            Provisioner::Remote(baas) => Ok(baas.find_user_by_email(email).await?.map(|u| u.id)),
        }
    }

    /// Profile row for a user id
    pub async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        match self {
            Provisioner::Local(conn) => local_get(conn, user_id),
            Provisioner::Remote(baas) => {
                let rows: Vec<Profile> = baas.select("profiles", &[eq("id", user_id)]).await?;
                Ok(rows.into_iter().next())
            }
        }
    }

    /// Write subscription fields, creating the profile row when missing
    pub async fn apply_subscription(
        &self,
        user_id: &str,
        account: &NewAccount,
        update: &SubscriptionUpdate,
    ) -> Result<()> {
        match self {
            Provisioner::Local(conn) => local_apply(conn, user_id, account, update),
            Provisioner::Remote(baas) => {
                let now = Utc::now();
                let updated: Vec<serde_json::Value> = baas
                    .update(
                        "profiles",
                        &[eq("id", user_id)],
                        &RemoteProfileUpdate { update, updated_at: now },
                    )
                    .await?;

                if updated.is_empty() {
                    let _: Vec<serde_json::Value> = baas
                        .insert(
                            "profiles",
                            &RemoteProfileInsert {
                                id: user_id,
                                email: &account.email,
                                name: &account.name,
                                phone: &account.phone,
                                update,
                                updated_at: now,
                            },
                        )
                        .await?;
                }
                Ok(())
            }
        }
    }
}

fn local_get(conn: &Mutex<Connection>, user_id: &str) -> Result<Option<Profile>> {
    let conn = db::lock(conn)?;
    db::get_profile(&conn, user_id)
}

fn local_find(conn: &Mutex<Connection>, email: &str) -> Result<Option<String>> {
    let conn = db::lock(conn)?;
    Ok(db::find_profile_by_email(&conn, email)?.map(|p| p.id))
}

fn local_create(conn: &Mutex<Connection>, account: &NewAccount) -> Result<AccountOutcome> {
    let conn = db::lock(conn)?;

    if db::find_profile_by_email(&conn, &account.email)?.is_some() {
        return Ok(AccountOutcome::AlreadyExists);
    }

    let id = uuid::Uuid::new_v4().to_string();
    let profile = Profile::new(&id, &account.email, &account.name, &account.phone);
    if db::create_profile(&conn, &profile)? {
        Ok(AccountOutcome::Created(id))
    } else {
        Ok(AccountOutcome::AlreadyExists)
    }
}

fn local_apply(
    conn: &Mutex<Connection>,
    user_id: &str,
    account: &NewAccount,
    update: &SubscriptionUpdate,
) -> Result<()> {
    let conn = db::lock(conn)?;

    if db::apply_subscription_update(&conn, user_id, update)? {
        return Ok(());
    }

    let mut profile = Profile::new(user_id, &account.email, &account.name, &account.phone);
    profile.apply(update);
    db::create_profile(&conn, &profile)?;
    Ok(())
}

// ============================================================================
// PROCESSING
// ============================================================================

/// Subscription fields carried by a delivery
pub fn subscription_update(
    payload: &PaymentWebhook,
    status: SubscriptionStatus,
    now: DateTime<Utc>,
) -> SubscriptionUpdate {
    let subscription = payload.subscription.clone().unwrap_or_default();
    let plan = subscription.plan.as_deref().and_then(Plan::from_provider);

    let started_at = subscription.start.as_deref().and_then(parse_flexible_datetime);
    let ends_at = subscription
        .next_payment
        .as_deref()
        .and_then(parse_flexible_datetime)
        .or_else(|| match status {
            SubscriptionStatus::Active => plan.map(|p| now + Duration::days(p.period_days())),
            SubscriptionStatus::Trialing => Some(now + Duration::days(TRIAL_DAYS)),
            _ => None,
        });

    SubscriptionUpdate {
        status,
        plan,
        started_at,
        ends_at,
        customer_id: payload.customer.id.clone(),
        subscription_id: subscription.id,
    }
}

pub async fn process_webhook(
    provisioner: &Provisioner,
    payload: &PaymentWebhook,
    now: DateTime<Utc>,
) -> WebhookOutcome {
    let Some(status) = SubscriptionStatus::from_provider(&payload.status) else {
        warn!(status = %payload.status, "unknown payment status");
        return WebhookOutcome::rejected(format!("unknown payment status: {}", payload.status));
    };

    let email = payload.customer.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return WebhookOutcome::rejected("customer email is required");
    }

    let account = NewAccount {
        email,
        name: payload.customer.name.trim().to_string(),
        phone: payload.customer.phone.trim().to_string(),
    };
    let update = subscription_update(payload, status, now);

    info!(
        email = %account.email,
        status = %status,
        order = payload.id.as_deref().unwrap_or("-"),
        "payment webhook received"
    );

    let result = if status.grants_access() {
        provision(provisioner, &account, update, now).await
    } else {
        update_existing(provisioner, &account, &update).await
    };

    match result {
        Ok(outcome) => outcome,
        Err(err) => {
            let detail = format!("{:#}", err);
            error!(email = %account.email, error = %detail, "webhook processing failed");
            WebhookOutcome::failure(format!("failed to process webhook: {}", err))
        }
    }
}

async fn provision(
    provisioner: &Provisioner,
    account: &NewAccount,
    mut update: SubscriptionUpdate,
    now: DateTime<Utc>,
) -> Result<WebhookOutcome> {
    let (user_id, message) = match provisioner.create_account(account).await? {
        AccountOutcome::Created(id) => {
            update.started_at = update.started_at.or(Some(now));
            (id, "account created")
        }
        AccountOutcome::AlreadyExists => {
            let id = provisioner
                .find_account(&account.email)
                .await?
                .ok_or_else(|| anyhow!("account for {} exists but was not found", account.email))?;
            (id, "account updated")
        }
    };

    provisioner.apply_subscription(&user_id, account, &update).await?;
    info!(user_id = %user_id, status = %update.status, "{}", message);

    Ok(WebhookOutcome::ok(format!("{}: subscription {}", message, update.status)))
}

async fn update_existing(
    provisioner: &Provisioner,
    account: &NewAccount,
    update: &SubscriptionUpdate,
) -> Result<WebhookOutcome> {
    let Some(user_id) = provisioner.find_account(&account.email).await? else {
        info!(email = %account.email, status = %update.status, "no account for webhook, ignored");
        return Ok(WebhookOutcome::ok(format!(
            "no account for {}; status {} ignored",
            account.email, update.status
        )));
    };

    provisioner.apply_subscription(&user_id, account, update).await?;
    Ok(WebhookOutcome::ok(format!("subscription updated: {}", update.status)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BaasConfig;
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    fn local() -> (Provisioner, Arc<Mutex<Connection>>) {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        (Provisioner::Local(conn.clone()), conn)
    }

    fn payload(status: &str) -> PaymentWebhook {
        serde_json::from_value(json!({
            "order_status": status,
            "order_id": "ord-1",
            "Customer": {
                "email": "Ana@Example.com",
                "full_name": "Ana Souza",
                "mobile": "+5511999990000",
                "customer_id": "cus-1"
            },
            "Subscription": {
                "id": "sub-1",
                "plan_name": "Plano Mensal"
            }
        }))
        .unwrap()
    }

    fn stored(conn: &Arc<Mutex<Connection>>) -> Option<Profile> {
        let conn = conn.lock().unwrap();
        db::find_profile_by_email(&conn, "ana@example.com").unwrap()
    }

    #[test]
    fn test_payload_aliases() {
        let p = payload("paid");
        assert_eq!(p.status, "paid");
        assert_eq!(p.id.as_deref(), Some("ord-1"));
        assert_eq!(p.customer.name, "Ana Souza");
        assert_eq!(p.customer.phone, "+5511999990000");
        assert_eq!(p.subscription.unwrap().plan.as_deref(), Some("Plano Mensal"));

        let minimal: PaymentWebhook = serde_json::from_value(json!({
            "status": "approved",
            "customer": { "email": "bruno@example.com" }
        }))
        .unwrap();
        assert!(minimal.subscription.is_none());
        assert_eq!(minimal.customer.name, "");
    }

    #[test]
    fn test_subscription_update_dates() {
        let update = subscription_update(&payload("paid"), SubscriptionStatus::Active, now());
        assert_eq!(update.plan, Some(Plan::Monthly));
        assert_eq!(update.ends_at, Some(now() + Duration::days(30)));
        assert_eq!(update.customer_id.as_deref(), Some("cus-1"));
        assert_eq!(update.subscription_id.as_deref(), Some("sub-1"));

        let mut explicit = payload("paid");
        explicit.subscription.as_mut().unwrap().next_payment = Some("2026-12-01".to_string());
        let update = subscription_update(&explicit, SubscriptionStatus::Active, now());
        assert_eq!(update.ends_at, Some(Utc.with_ymd_and_hms(2026, 12, 1, 0, 0, 0).unwrap()));

        let update = subscription_update(&payload("canceled"), SubscriptionStatus::Canceled, now());
        assert_eq!(update.ends_at, None);
    }

    #[test]
    fn test_verify_token() {
        assert!(verify_token(None, None));
        assert!(verify_token(None, Some("anything")));
        assert!(verify_token(Some("s3cret"), Some("s3cret")));
        assert!(!verify_token(Some("s3cret"), Some("s3cre")));
        assert!(!verify_token(Some("s3cret"), None));
    }

    #[tokio::test]
    async fn test_approved_payment_creates_account() {
        let (provisioner, conn) = local();

        let outcome = process_webhook(&provisioner, &payload("paid"), now()).await;
        assert!(outcome.success, "{}", outcome.message);
        assert!(outcome.message.contains("account created"));

        let profile = stored(&conn).unwrap();
        assert_eq!(profile.name, "Ana Souza");
        assert_eq!(profile.subscription_status, Some(SubscriptionStatus::Active));
        assert_eq!(profile.subscription_started_at, Some(now()));
        assert_eq!(profile.payment_subscription_id.as_deref(), Some("sub-1"));
    }

    #[tokio::test]
    async fn test_repeated_delivery_updates_existing_account() {
        let (provisioner, conn) = local();

        process_webhook(&provisioner, &payload("paid"), now()).await;
        let first_id = stored(&conn).unwrap().id;

        let outcome = process_webhook(&provisioner, &payload("approved"), now()).await;
        assert!(outcome.success);
        assert!(outcome.message.contains("account updated"));
        assert_eq!(stored(&conn).unwrap().id, first_id);
    }

    #[tokio::test]
    async fn test_cancellation_for_unknown_email_is_ignored() {
        let (provisioner, conn) = local();

        let outcome = process_webhook(&provisioner, &payload("refunded"), now()).await;
        assert!(outcome.success);
        assert!(outcome.message.contains("ignored"));
        assert!(stored(&conn).is_none());
    }

    #[tokio::test]
    async fn test_cancellation_updates_existing_account() {
        let (provisioner, conn) = local();
        process_webhook(&provisioner, &payload("paid"), now()).await;

        let outcome = process_webhook(&provisioner, &payload("chargedback"), now()).await;
        assert!(outcome.success);

        let profile = stored(&conn).unwrap();
        assert_eq!(profile.subscription_status, Some(SubscriptionStatus::Canceled));
        // Paid-through date from the activation is kept
        assert_eq!(profile.subscription_ends_at, Some(now() + Duration::days(30)));
    }

    #[tokio::test]
    async fn test_rejects_unknown_status_and_missing_email() {
        let (provisioner, _) = local();

        let outcome = process_webhook(&provisioner, &payload("on_hold_forever"), now()).await;
        assert!(!outcome.success);
        assert!(outcome.rejected);
        assert!(outcome.message.contains("unknown payment status"));

        let mut no_email = payload("paid");
        no_email.customer.email = "  ".to_string();
        let outcome = process_webhook(&provisioner, &no_email, now()).await;
        assert!(!outcome.success);
        assert!(outcome.rejected);
    }

    fn remote(server: &MockServer) -> Provisioner {
        Provisioner::Remote(BaasClient::new(&BaasConfig {
            url: server.uri(),
            service_key: "key".to_string(),
        }))
    }

    #[tokio::test]
    async fn test_remote_cancellation_patches_existing_profile() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/admin/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "never" })))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/admin/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "users": [{ "id": "user-7", "email": "ana@example.com" }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/profiles"))
            .and(query_param("id", "eq.user-7"))
            .and(body_partial_json(json!({ "subscription_status": "canceled" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "user-7" }])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/profiles"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let outcome = process_webhook(&remote(&server), &payload("canceled"), now()).await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.message, "subscription updated: canceled");
    }

    #[tokio::test]
    async fn test_remote_cancellation_without_user_is_ignored() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/admin/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "users": [] })))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/profiles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let outcome = process_webhook(&remote(&server), &payload("refunded"), now()).await;
        assert!(outcome.success);
        assert!(outcome.message.contains("ignored"));
    }

    #[tokio::test]
    async fn test_remote_get_profile() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .and(query_param("id", "eq.user-7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": "user-7",
                "email": "ana@example.com",
                "name": "Ana Souza",
                "subscription_status": "active",
                "plan": "monthly",
                "subscription_ends_at": "2026-11-15T12:00:00+00:00",
                "updated_at": "2026-10-16T12:00:00+00:00"
            }])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .and(query_param("id", "eq.nobody"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let provisioner = remote(&server);
        let profile = provisioner.get_profile("user-7").await.unwrap().unwrap();
        assert_eq!(profile.subscription_status, Some(SubscriptionStatus::Active));
        assert_eq!(profile.plan, Some(Plan::Monthly));
        assert_eq!(profile.phone, "");
        assert_eq!(
            profile.subscription_ends_at,
            Some(Utc.with_ymd_and_hms(2026, 11, 15, 12, 0, 0).unwrap())
        );

        assert!(provisioner.get_profile("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remote_existing_user_gets_profile_row() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/admin/users"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "error_code": "email_exists",
                "msg": "A user with this email address has already been registered"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/admin/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "users": [{ "id": "user-7", "email": "ana@example.com" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/profiles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/profiles"))
            .and(body_partial_json(json!({
                "id": "user-7",
                "email": "ana@example.com",
                "subscription_status": "active",
                "plan": "monthly"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{ "id": "user-7" }])))
            .expect(1)
            .mount(&server)
            .await;

        let provisioner = Provisioner::Remote(BaasClient::new(&BaasConfig {
            url: server.uri(),
            service_key: "key".to_string(),
        }));

        let outcome = process_webhook(&provisioner, &payload("paid"), now()).await;
        assert!(outcome.success, "{}", outcome.message);
        assert!(outcome.message.contains("account updated"));
    }

    #[tokio::test]
    async fn test_remote_failure_becomes_unsuccessful_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/admin/users"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let provisioner = Provisioner::Remote(BaasClient::new(&BaasConfig {
            url: server.uri(),
            service_key: "key".to_string(),
        }));

        let outcome = process_webhook(&provisioner, &payload("paid"), now()).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("500"));
    }
}
