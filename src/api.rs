// 🌐 REST API - axum router over the finance, reminder and billing modules
//
// The session layer lives in front of this service and forwards the
// authenticated user as `x-user-id`. Calendar calls use the caller's
// Google token from `Authorization: Bearer`.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use chrono::{Datelike, Local, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{error, info, warn};
use validator::{Validate, ValidationErrors};

use crate::balance::{self, DailyBalance, LimitStatus, Summary};
use crate::baas::BaasClient;
use crate::calendar::{CalendarClient, CalendarEvent, ListQuery};
use crate::checkout::{checkout_url, CheckoutRequest};
use crate::commands::{self, Command};
use crate::config::Config;
use crate::db;
use crate::error::RemoteError;
use crate::format::{format_brl, format_date_br, format_datetime_br, month_name, parse_date_input, parse_flexible_datetime};
use crate::models::{
    describe_errors, LimitsInput, NewReminder, NewTransaction, Profile, Reminder, SpendingLimit,
    Transaction,
};
use crate::reminders;
use crate::subscription::{AccessSummary, Plan};
use crate::webhook::{self, PaymentWebhook, Provisioner, WebhookOutcome};

const OWNER_HEADER: &str = "x-user-id";
const WEBHOOK_TOKEN_HEADER: &str = "x-webhook-token";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub calendar: CalendarClient,
    pub provisioner: Provisioner,
    pub config: Arc<Config>,
}

impl AppState {
    /// Accounts go to the BaaS when it is configured, otherwise to `db`
    pub fn new(db: Arc<Mutex<Connection>>, config: Config) -> Self {
        let provisioner = match &config.baas {
            Some(baas) => Provisioner::Remote(BaasClient::new(baas)),
            None => Provisioner::Local(db.clone()),
        };

        AppState {
            calendar: CalendarClient::new(&config.calendar),
            provisioner,
            config: Arc::new(config),
            db,
        }
    }
}

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error(transparent)]
    Upstream(#[from] RemoteError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::BadRequest(describe_errors(&errors))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Upstream(e) if e.is_unauthorized() => StatusCode::UNAUTHORIZED,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            AppError::Internal(e) => {
                let detail = format!("{:#}", e);
                error!(error = %detail, "request failed");
                "internal error".to_string()
            }
            AppError::Upstream(e) => {
                warn!(error = %e, "upstream call failed");
                self.to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(ApiResponse::error(message))).into_response()
    }
}

fn owner(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::Unauthorized(format!("missing {} header", OWNER_HEADER)))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_optional_date(raw: Option<&str>, field: &str) -> Result<Option<NaiveDate>, AppError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => parse_date_input(value)
            .map(Some)
            .ok_or_else(|| AppError::BadRequest(format!("invalid {}: {}", field, value))),
        None => Ok(None),
    }
}

/// `YYYY-MM`, defaulting to the current month
fn parse_month(raw: Option<&str>) -> Result<(i32, u32), AppError> {
    let Some(value) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        let today = Local::now().date_naive();
        return Ok((today.year(), today.month()));
    };

    NaiveDate::parse_from_str(&format!("{}-01", value), "%Y-%m-%d")
        .map(|d| (d.year(), d.month()))
        .map_err(|_| AppError::BadRequest(format!("invalid month: {}", value)))
}

// ============================================================================
// QUERIES & BODIES
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MonthQuery {
    pub month: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DayQuery {
    pub date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub max: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CommandInput {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct CommandReply {
    pub command: Command,
    pub reply: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutInput {
    pub plan: Plan,
    #[serde(flatten)]
    pub customer: CheckoutRequest,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub plan: Plan,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub year: i32,
    pub month: u32,
    #[serde(flatten)]
    pub summary: Summary,
    pub by_category: BTreeMap<String, f64>,
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/transactions?from=&to=
async fn list_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(range): Query<RangeQuery>,
) -> ApiResult<Vec<Transaction>> {
    let owner = owner(&headers)?;
    let from = parse_optional_date(range.from.as_deref(), "from")?;
    let to = parse_optional_date(range.to.as_deref(), "to")?;

    let conn = db::lock(&state.db)?;
    Ok(Json(ApiResponse::ok(db::list_transactions(&conn, &owner, from, to)?)))
}

/// POST /api/transactions
async fn create_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<NewTransaction>,
) -> Result<(StatusCode, Json<ApiResponse<Transaction>>), AppError> {
    let owner = owner(&headers)?;
    input.validate()?;

    let tx = Transaction::from_input(&owner, input);
    db::insert_transaction(&*db::lock(&state.db)?, &tx)?;
    info!(transaction_id = %tx.id, kind = %tx.kind, "transaction created");

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(tx))))
}

/// PUT /api/transactions/:id
async fn update_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<NewTransaction>,
) -> ApiResult<Transaction> {
    let owner = owner(&headers)?;
    input.validate()?;

    let conn = db::lock(&state.db)?;
    if !db::update_transaction(&conn, &owner, &id, &input)? {
        return Err(AppError::NotFound("transaction"));
    }
    let tx = db::get_transaction(&conn, &owner, &id)?.ok_or(AppError::NotFound("transaction"))?;
    Ok(Json(ApiResponse::ok(tx)))
}

/// DELETE /api/transactions/:id
async fn delete_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<String> {
    let owner = owner(&headers)?;
    if !db::delete_transaction(&*db::lock(&state.db)?, &owner, &id)? {
        return Err(AppError::NotFound("transaction"));
    }
    Ok(Json(ApiResponse::ok(id)))
}

/// GET /api/balance/daily?from=&to=
async fn daily_balance(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(range): Query<RangeQuery>,
) -> ApiResult<Vec<DailyBalance>> {
    let owner = owner(&headers)?;
    let from = parse_optional_date(range.from.as_deref(), "from")?;
    let to = parse_optional_date(range.to.as_deref(), "to")?;

    let transactions = db::list_transactions(&*db::lock(&state.db)?, &owner, from, to)?;
    Ok(Json(ApiResponse::ok(balance::daily_balances(&transactions))))
}

/// GET /api/summary?month=YYYY-MM
async fn month_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<MonthQuery>,
) -> ApiResult<SummaryResponse> {
    let owner = owner(&headers)?;
    let (year, month) = parse_month(query.month.as_deref())?;

    let all = db::list_transactions(&*db::lock(&state.db)?, &owner, None, None)?;
    let in_month = balance::filter_month(&all, year, month);

    Ok(Json(ApiResponse::ok(SummaryResponse {
        year,
        month,
        summary: balance::summarize(&in_month),
        by_category: balance::category_spending(&in_month),
    })))
}

// ============================================================================
// LIMITS
// ============================================================================

/// GET /api/limits
async fn get_limits(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<SpendingLimit> {
    let owner = owner(&headers)?;
    let limit = db::get_spending_limit(&*db::lock(&state.db)?, &owner)?
        .unwrap_or_else(|| SpendingLimit::new(&owner));
    Ok(Json(ApiResponse::ok(limit)))
}

/// PUT /api/limits - replaces every ceiling
async fn put_limits(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<LimitsInput>,
) -> ApiResult<SpendingLimit> {
    let owner = owner(&headers)?;

    input.validate()?;

    let mut limit = SpendingLimit::new(&owner);
    for (category, ceiling) in &input.limits {
        limit
            .set(category, *ceiling)
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
    }

    db::upsert_spending_limit(&*db::lock(&state.db)?, &limit)?;
    Ok(Json(ApiResponse::ok(limit)))
}

/// GET /api/limits/status?month=YYYY-MM
async fn limits_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<MonthQuery>,
) -> ApiResult<Vec<LimitStatus>> {
    let owner = owner(&headers)?;
    let (year, month) = parse_month(query.month.as_deref())?;

    let conn = db::lock(&state.db)?;
    let Some(limit) = db::get_spending_limit(&conn, &owner)? else {
        return Ok(Json(ApiResponse::ok(Vec::new())));
    };
    let all = db::list_transactions(&conn, &owner, None, None)?;

    let statuses = balance::limit_status(&balance::filter_month(&all, year, month), &limit);
    Ok(Json(ApiResponse::ok(statuses)))
}

// ============================================================================
// REMINDERS & CALENDAR
// ============================================================================

/// GET /api/reminders?date=
async fn list_reminders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DayQuery>,
) -> ApiResult<Vec<Reminder>> {
    let owner = owner(&headers)?;
    let day = parse_optional_date(query.date.as_deref(), "date")?;
    Ok(Json(ApiResponse::ok(reminders::list_reminders(&state.db, &owner, day)?)))
}

/// POST /api/reminders
async fn create_reminder(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<NewReminder>,
) -> Result<(StatusCode, Json<ApiResponse<Reminder>>), AppError> {
    let owner = owner(&headers)?;
    input.validate()?;
    let token = bearer_token(&headers);

    let reminder =
        reminders::create_reminder(&state.db, &state.calendar, token.as_deref(), &owner, input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(reminder))))
}

/// PUT /api/reminders/:id
async fn update_reminder(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<NewReminder>,
) -> ApiResult<Reminder> {
    let owner = owner(&headers)?;
    input.validate()?;
    let token = bearer_token(&headers);

    let reminder =
        reminders::update_reminder(&state.db, &state.calendar, token.as_deref(), &owner, &id, input)
            .await?
            .ok_or(AppError::NotFound("reminder"))?;
    Ok(Json(ApiResponse::ok(reminder)))
}

/// DELETE /api/reminders/:id
async fn delete_reminder(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<String> {
    let owner = owner(&headers)?;
    let token = bearer_token(&headers);

    if !reminders::delete_reminder(&state.db, &state.calendar, token.as_deref(), &owner, &id).await? {
        return Err(AppError::NotFound("reminder"));
    }
    Ok(Json(ApiResponse::ok(id)))
}

/// GET /api/calendar/events?from=&to=&max= - requires a Google token
async fn calendar_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Vec<CalendarEvent>> {
    owner(&headers)?;
    let token = bearer_token(&headers)
        .ok_or_else(|| AppError::Unauthorized("missing calendar token".to_string()))?;

    let bound = |raw: Option<&str>, field: &str| -> Result<_, AppError> {
        raw.map(|value| {
            parse_flexible_datetime(value)
                .ok_or_else(|| AppError::BadRequest(format!("invalid {}: {}", field, value)))
        })
        .transpose()
    };

    let list = ListQuery {
        time_min: bound(query.from.as_deref(), "from")?,
        time_max: bound(query.to.as_deref(), "to")?,
        max_results: query.max,
    };

    let events = state.calendar.list_events(&token, &list).await?;
    Ok(Json(ApiResponse::ok(events)))
}

// ============================================================================
// COMMANDS
// ============================================================================

/// POST /api/commands - run one chat message
async fn run_command(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CommandInput>,
) -> ApiResult<CommandReply> {
    let owner = owner(&headers)?;
    let today = Local::now().date_naive();

    let command = commands::parse_command(&input.text, today)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let token = bearer_token(&headers);
    let reply = execute(&state, &owner, token.as_deref(), &command, today).await?;

    Ok(Json(ApiResponse::ok(CommandReply { command, reply })))
}

async fn execute(
    state: &AppState,
    owner: &str,
    token: Option<&str>,
    command: &Command,
    today: NaiveDate,
) -> Result<String, AppError> {
    match command {
        Command::Record { kind, amount, category, description, date } => {
            let input = NewTransaction {
                description: description.clone(),
                kind: *kind,
                category: category.clone(),
                amount: *amount,
                date: *date,
            };
            input.validate()?;

            let tx = Transaction::from_input(owner, input);
            db::insert_transaction(&*db::lock(&state.db)?, &tx)?;

            Ok(format!(
                "✅ {} de {} em {} registrada para {}",
                tx.kind,
                format_brl(tx.amount),
                tx.category,
                format_date_br(tx.date)
            ))
        }
        Command::Remind { title, date, time } => {
            let input = NewReminder {
                title: title.clone(),
                description: String::new(),
                starts_at: date.and_time(*time),
            };
            input.validate()?;
            let reminder = reminders::create_reminder(&state.db, &state.calendar, token, owner, input).await?;

            Ok(format!(
                "⏰ Lembrete \"{}\" criado para {}",
                reminder.title,
                format_datetime_br(reminder.starts_at)
            ))
        }
        Command::Balance => {
            let all = db::list_transactions(&*db::lock(&state.db)?, owner, None, None)?;
            Ok(format!("💰 Saldo atual: {}", format_brl(balance::summarize(&all).balance)))
        }
        Command::Summary => {
            let all = db::list_transactions(&*db::lock(&state.db)?, owner, None, None)?;
            let summary = balance::summarize(&balance::filter_month(&all, today.year(), today.month()));

            Ok(format!(
                "📊 Resumo de {}: entradas {}, saídas {}, saldo {} ({} transações)",
                month_name(today.month()),
                format_brl(summary.total_income),
                format_brl(summary.total_expense),
                format_brl(summary.balance),
                summary.transaction_count
            ))
        }
        Command::ListReminders { date } => {
            let found = reminders::list_reminders(&state.db, owner, *date)?;
            if found.is_empty() {
                return Ok("Nenhum lembrete encontrado.".to_string());
            }

            let lines: Vec<String> = found
                .iter()
                .map(|r| format!("• {} - {}", format_datetime_br(r.starts_at), r.title))
                .collect();
            Ok(lines.join("\n"))
        }
        Command::Help => Ok(commands::help_text().to_string()),
    }
}

// ============================================================================
// PROFILE, SUBSCRIPTION & CHECKOUT
// ============================================================================

/// Profiles live wherever the webhook provisions accounts
async fn load_profile(state: &AppState, owner: &str) -> Result<Profile, AppError> {
    state
        .provisioner
        .get_profile(owner)
        .await?
        .ok_or(AppError::NotFound("profile"))
}

/// GET /api/profile
async fn get_profile(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Profile> {
    let owner = owner(&headers)?;
    Ok(Json(ApiResponse::ok(load_profile(&state, &owner).await?)))
}

/// GET /api/subscription
async fn get_subscription(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<AccessSummary> {
    let owner = owner(&headers)?;
    let profile = load_profile(&state, &owner).await?;
    Ok(Json(ApiResponse::ok(AccessSummary::for_profile(&profile, Utc::now()))))
}

/// POST /api/checkout - redirect URL for a plan; the user id is optional
async fn create_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CheckoutInput>,
) -> ApiResult<CheckoutResponse> {
    let base = state
        .config
        .checkout
        .for_plan(input.plan)
        .ok_or_else(|| AppError::ServiceUnavailable(format!("no checkout configured for plan {}", input.plan.as_str())))?;

    let mut customer = input.customer;
    if customer.user_id.trim().is_empty() {
        if let Ok(owner) = owner(&headers) {
            customer.user_id = owner;
        }
    }

    Ok(Json(ApiResponse::ok(CheckoutResponse {
        plan: input.plan,
        url: checkout_url(base, &customer),
    })))
}

/// POST /api/webhooks/payment - answers `{success, message}` to the provider
async fn payment_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let provided = headers.get(WEBHOOK_TOKEN_HEADER).and_then(|v| v.to_str().ok());
    if !webhook::verify_token(state.config.webhook_secret.as_deref(), provided) {
        warn!("payment webhook rejected: bad token");
        return (StatusCode::UNAUTHORIZED, Json(WebhookOutcome::failure("invalid webhook token"))).into_response();
    }

    let payload: PaymentWebhook = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "malformed payment webhook");
            return (StatusCode::BAD_REQUEST, Json(WebhookOutcome::failure(format!("malformed payload: {}", e))))
                .into_response();
        }
    };

    let outcome = webhook::process_webhook(&state.provisioner, &payload, Utc::now()).await;
    // Providers retry 5xx, so only provisioning failures get one
    let status = if outcome.success {
        StatusCode::OK
    } else if outcome.rejected {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(outcome)).into_response()
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/transactions", get(list_transactions).post(create_transaction))
        .route("/transactions/:id", put(update_transaction).delete(delete_transaction))
        .route("/balance/daily", get(daily_balance))
        .route("/summary", get(month_summary))
        .route("/limits", get(get_limits).put(put_limits))
        .route("/limits/status", get(limits_status))
        .route("/reminders", get(list_reminders).post(create_reminder))
        .route("/reminders/:id", put(update_reminder).delete(delete_reminder))
        .route("/calendar/events", get(calendar_events))
        .route("/commands", post(run_command))
        .route("/profile", get(get_profile))
        .route("/subscription", get(get_subscription))
        .route("/checkout", post(create_checkout))
        .route("/webhooks/payment", post(payment_webhook))
        .with_state(state);

    Router::new().nest("/api", api_routes)
}
