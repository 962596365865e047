use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use validator::Validate;

use crate::format::{parse_amount, parse_date_input};
use crate::models::{
    describe_errors, NewTransaction, Profile, Reminder, SpendingLimit, SubscriptionUpdate, Transaction,
    TransactionType,
};
use crate::subscription::{Plan, SubscriptionStatus};

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Lock a shared connection; never hold the guard across an `.await`
pub fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|_| anyhow!("database lock poisoned"))
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Transactions (import_hash is only set for CSV imports)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            description TEXT NOT NULL,
            type TEXT NOT NULL,
            category TEXT NOT NULL,
            amount REAL NOT NULL,
            date TEXT NOT NULL,
            created_at TEXT NOT NULL,
            import_hash TEXT UNIQUE
        )",
        [],
    )?;

    // ==========================================================================
    // Spending limits (one row per user, ceilings as a JSON map)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS spending_limits (
            owner_id TEXT PRIMARY KEY,
            limits TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Reminders
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS reminders (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            starts_at TEXT NOT NULL,
            calendar_event_id TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Profiles
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY,
            email TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL DEFAULT '',
            phone TEXT NOT NULL DEFAULT '',
            subscription_status TEXT,
            plan TEXT,
            subscription_started_at TEXT,
            subscription_ends_at TEXT,
            payment_customer_id TEXT,
            payment_subscription_id TEXT,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_owner_date ON transactions(owner_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_reminders_owner_start ON reminders(owner_id, starts_at)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// ROW CONVERSION HELPERS
// ============================================================================

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn text_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn get_date(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}

fn get_naive_datetime(row: &Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, DATETIME_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn get_timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn get_optional_timestamp(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn format_naive_datetime(datetime: NaiveDateTime) -> String {
    datetime.format(DATETIME_FORMAT).to_string()
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

const TRANSACTION_COLUMNS: &str =
    "id, owner_id, description, type, category, amount, date, created_at";

fn transaction_from_row(row: &Row) -> rusqlite::Result<Transaction> {
    let kind_raw: String = row.get(3)?;
    let kind: TransactionType = kind_raw.parse().map_err(|e: String| text_error(3, e))?;

    Ok(Transaction {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        description: row.get(2)?,
        kind,
        category: row.get(4)?,
        amount: row.get(5)?,
        date: get_date(row, 6)?,
        created_at: get_timestamp(row, 7)?,
    })
}

/// Stable hash used to skip rows already imported from a CSV
pub fn import_hash(tx: &Transaction) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{}|{}|{}|{}|{:.2}",
        tx.owner_id,
        format_date(tx.date),
        tx.description.to_lowercase(),
        tx.kind.as_str(),
        tx.amount
    ));
    format!("{:x}", hasher.finalize())
}

fn insert_transaction_row(
    conn: &Connection,
    tx: &Transaction,
    hash: Option<&str>,
) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO transactions (
            id, owner_id, description, type, category, amount, date, created_at, import_hash
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            tx.id,
            tx.owner_id,
            tx.description,
            tx.kind.as_str(),
            tx.category,
            tx.amount,
            format_date(tx.date),
            tx.created_at.to_rfc3339(),
            hash,
        ],
    )
}

pub fn insert_transaction(conn: &Connection, tx: &Transaction) -> Result<()> {
    insert_transaction_row(conn, tx, None).context("Failed to insert transaction")?;
    debug!(id = %tx.id, owner = %tx.owner_id, "transaction inserted");
    Ok(())
}

pub fn get_transaction(conn: &Connection, owner_id: &str, id: &str) -> Result<Option<Transaction>> {
    let sql = format!(
        "SELECT {} FROM transactions WHERE owner_id = ?1 AND id = ?2",
        TRANSACTION_COLUMNS
    );
    let tx = conn
        .query_row(&sql, params![owner_id, id], transaction_from_row)
        .optional()?;
    Ok(tx)
}

/// Transactions of one owner, oldest first, optionally within an inclusive date range
pub fn list_transactions(
    conn: &Connection,
    owner_id: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<Transaction>> {
    let sql = format!(
        "SELECT {} FROM transactions
         WHERE owner_id = ?1
           AND (?2 IS NULL OR date >= ?2)
           AND (?3 IS NULL OR date <= ?3)
         ORDER BY date ASC, created_at ASC",
        TRANSACTION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;

    let transactions = stmt
        .query_map(
            params![owner_id, from.map(format_date), to.map(format_date)],
            transaction_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(transactions)
}

/// Replace the editable fields; false when the row does not exist for this owner
pub fn update_transaction(
    conn: &Connection,
    owner_id: &str,
    id: &str,
    input: &NewTransaction,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE transactions
         SET description = ?1, type = ?2, category = ?3, amount = ?4, date = ?5
         WHERE owner_id = ?6 AND id = ?7",
        params![
            input.description.trim(),
            input.kind.as_str(),
            input.category.trim(),
            input.amount,
            format_date(input.date),
            owner_id,
            id,
        ],
    )?;
    Ok(changed > 0)
}

pub fn delete_transaction(conn: &Connection, owner_id: &str, id: &str) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM transactions WHERE owner_id = ?1 AND id = ?2",
        params![owner_id, id],
    )?;
    Ok(changed > 0)
}

// ============================================================================
// CSV IMPORT
// ============================================================================

/// One CSV line; headers may be in Portuguese or English
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "descricao", alias = "Descrição", alias = "Description")]
    description: String,
    #[serde(rename = "type", alias = "tipo", alias = "Tipo", alias = "Type")]
    kind: String,
    #[serde(alias = "categoria", alias = "Categoria", alias = "Category")]
    category: String,
    #[serde(alias = "valor", alias = "Valor", alias = "Amount")]
    amount: String,
    #[serde(alias = "data", alias = "Data", alias = "Date")]
    date: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub inserted: usize,
    pub duplicates: usize,
}

pub fn load_csv(csv_path: &Path, owner_id: &str) -> Result<Vec<Transaction>> {
    let rdr = csv::Reader::from_path(csv_path).context("Failed to open CSV file")?;
    read_csv(rdr, owner_id)
}

fn read_csv<R: std::io::Read>(mut rdr: csv::Reader<R>, owner_id: &str) -> Result<Vec<Transaction>> {
    let mut transactions = Vec::new();

    for (index, result) in rdr.deserialize().enumerate() {
        let line = index + 2; // header is line 1
        let row: CsvRow = result.with_context(|| format!("Failed to read CSV line {}", line))?;

        let input = NewTransaction {
            kind: row
                .kind
                .parse()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("Invalid type on line {}", line))?,
            amount: parse_amount(&row.amount)
                .with_context(|| format!("Invalid amount '{}' on line {}", row.amount, line))?,
            date: parse_date_input(&row.date)
                .with_context(|| format!("Invalid date '{}' on line {}", row.date, line))?,
            description: row.description,
            category: row.category,
        };
        input
            .validate()
            .map_err(|e| anyhow!(describe_errors(&e)))
            .with_context(|| format!("Invalid transaction on line {}", line))?;

        transactions.push(Transaction::from_input(owner_id, input));
    }

    Ok(transactions)
}

/// Insert imported transactions, skipping ones already imported
pub fn import_transactions(conn: &Connection, transactions: &[Transaction]) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    for tx in transactions {
        let hash = import_hash(tx);

        match insert_transaction_row(conn, tx, Some(&hash)) {
            Ok(_) => stats.inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                stats.duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(
        inserted = stats.inserted,
        duplicates = stats.duplicates,
        "transactions imported"
    );

    Ok(stats)
}

// ============================================================================
// SPENDING LIMITS
// ============================================================================

pub fn get_spending_limit(conn: &Connection, owner_id: &str) -> Result<Option<SpendingLimit>> {
    let row = conn
        .query_row(
            "SELECT owner_id, limits, updated_at FROM spending_limits WHERE owner_id = ?1",
            params![owner_id],
            |row| {
                let limits_json: String = row.get(1)?;
                let limits: BTreeMap<String, f64> =
                    serde_json::from_str(&limits_json).map_err(|e| conversion_error(1, e))?;
                Ok(SpendingLimit {
                    owner_id: row.get(0)?,
                    limits,
                    updated_at: get_timestamp(row, 2)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub fn upsert_spending_limit(conn: &Connection, limit: &SpendingLimit) -> Result<()> {
    let limits_json = serde_json::to_string(&limit.limits)?;

    conn.execute(
        "INSERT INTO spending_limits (owner_id, limits, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(owner_id) DO UPDATE SET limits = excluded.limits, updated_at = excluded.updated_at",
        params![limit.owner_id, limits_json, limit.updated_at.to_rfc3339()],
    )?;

    Ok(())
}

// ============================================================================
// REMINDERS
// ============================================================================

const REMINDER_COLUMNS: &str =
    "id, owner_id, title, description, starts_at, calendar_event_id, created_at";

fn reminder_from_row(row: &Row) -> rusqlite::Result<Reminder> {
    Ok(Reminder {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        starts_at: get_naive_datetime(row, 4)?,
        calendar_event_id: row.get(5)?,
        created_at: get_timestamp(row, 6)?,
    })
}

pub fn insert_reminder(conn: &Connection, reminder: &Reminder) -> Result<()> {
    conn.execute(
        "INSERT INTO reminders (
            id, owner_id, title, description, starts_at, calendar_event_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            reminder.id,
            reminder.owner_id,
            reminder.title,
            reminder.description,
            format_naive_datetime(reminder.starts_at),
            reminder.calendar_event_id,
            reminder.created_at.to_rfc3339(),
        ],
    )
    .context("Failed to insert reminder")?;
    Ok(())
}

pub fn get_reminder(conn: &Connection, owner_id: &str, id: &str) -> Result<Option<Reminder>> {
    let sql = format!(
        "SELECT {} FROM reminders WHERE owner_id = ?1 AND id = ?2",
        REMINDER_COLUMNS
    );
    let reminder = conn
        .query_row(&sql, params![owner_id, id], reminder_from_row)
        .optional()?;
    Ok(reminder)
}

/// Reminders of one owner by start time, optionally restricted to one day
pub fn list_reminders(
    conn: &Connection,
    owner_id: &str,
    day: Option<NaiveDate>,
) -> Result<Vec<Reminder>> {
    // starts_at is stored as ISO text, so a day is a lexicographic range
    let (from, to) = match day {
        Some(day) => (
            Some(format!("{}T00:00:00", format_date(day))),
            day.succ_opt().map(|next| format!("{}T00:00:00", format_date(next))),
        ),
        None => (None, None),
    };

    let sql = format!(
        "SELECT {} FROM reminders
         WHERE owner_id = ?1
           AND (?2 IS NULL OR starts_at >= ?2)
           AND (?3 IS NULL OR starts_at < ?3)
         ORDER BY starts_at ASC",
        REMINDER_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;

    let reminders = stmt
        .query_map(params![owner_id, from, to], reminder_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(reminders)
}

pub fn update_reminder(conn: &Connection, reminder: &Reminder) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE reminders
         SET title = ?1, description = ?2, starts_at = ?3, calendar_event_id = ?4
         WHERE owner_id = ?5 AND id = ?6",
        params![
            reminder.title,
            reminder.description,
            format_naive_datetime(reminder.starts_at),
            reminder.calendar_event_id,
            reminder.owner_id,
            reminder.id,
        ],
    )?;
    Ok(changed > 0)
}

pub fn set_reminder_event(conn: &Connection, id: &str, event_id: Option<&str>) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE reminders SET calendar_event_id = ?1 WHERE id = ?2",
        params![event_id, id],
    )?;
    Ok(changed > 0)
}

pub fn delete_reminder(conn: &Connection, owner_id: &str, id: &str) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM reminders WHERE owner_id = ?1 AND id = ?2",
        params![owner_id, id],
    )?;
    Ok(changed > 0)
}

// ============================================================================
// PROFILES
// ============================================================================

const PROFILE_COLUMNS: &str = "id, email, name, phone, subscription_status, plan,
    subscription_started_at, subscription_ends_at, payment_customer_id,
    payment_subscription_id, updated_at";

fn profile_from_row(row: &Row) -> rusqlite::Result<Profile> {
    let status: Option<String> = row.get(4)?;
    let plan: Option<String> = row.get(5)?;

    Ok(Profile {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        phone: row.get(3)?,
        subscription_status: status
            .map(|s| {
                SubscriptionStatus::parse_stored(&s)
                    .ok_or_else(|| text_error(4, format!("unknown subscription status: {}", s)))
            })
            .transpose()?,
        plan: plan
            .map(|p| {
                Plan::parse_stored(&p).ok_or_else(|| text_error(5, format!("unknown plan: {}", p)))
            })
            .transpose()?,
        subscription_started_at: get_optional_timestamp(row, 6)?,
        subscription_ends_at: get_optional_timestamp(row, 7)?,
        payment_customer_id: row.get(8)?,
        payment_subscription_id: row.get(9)?,
        updated_at: get_timestamp(row, 10)?,
    })
}

pub fn get_profile(conn: &Connection, id: &str) -> Result<Option<Profile>> {
    let sql = format!("SELECT {} FROM profiles WHERE id = ?1", PROFILE_COLUMNS);
    let profile = conn.query_row(&sql, params![id], profile_from_row).optional()?;
    Ok(profile)
}

pub fn find_profile_by_email(conn: &Connection, email: &str) -> Result<Option<Profile>> {
    let sql = format!("SELECT {} FROM profiles WHERE email = ?1", PROFILE_COLUMNS);
    let profile = conn
        .query_row(&sql, params![email.trim().to_lowercase()], profile_from_row)
        .optional()?;
    Ok(profile)
}

/// Insert a profile; false when the email is already registered
pub fn create_profile(conn: &Connection, profile: &Profile) -> Result<bool> {
    let result = conn.execute(
        "INSERT INTO profiles (
            id, email, name, phone, subscription_status, plan,
            subscription_started_at, subscription_ends_at, payment_customer_id,
            payment_subscription_id, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            profile.id,
            profile.email,
            profile.name,
            profile.phone,
            profile.subscription_status.map(|s| s.as_str()),
            profile.plan.map(|p| p.as_str()),
            profile.subscription_started_at.map(|dt| dt.to_rfc3339()),
            profile.subscription_ends_at.map(|dt| dt.to_rfc3339()),
            profile.payment_customer_id,
            profile.payment_subscription_id,
            profile.updated_at.to_rfc3339(),
        ],
    );

    match result {
        Ok(_) => Ok(true),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Write subscription fields onto an existing profile; false when it does not exist
pub fn apply_subscription_update(
    conn: &Connection,
    id: &str,
    update: &SubscriptionUpdate,
) -> Result<bool> {
    let Some(mut profile) = get_profile(conn, id)? else {
        return Ok(false);
    };
    profile.apply(update);

    conn.execute(
        "UPDATE profiles
         SET subscription_status = ?1, plan = ?2, subscription_started_at = ?3,
             subscription_ends_at = ?4, payment_customer_id = ?5,
             payment_subscription_id = ?6, updated_at = ?7
         WHERE id = ?8",
        params![
            profile.subscription_status.map(|s| s.as_str()),
            profile.plan.map(|p| p.as_str()),
            profile.subscription_started_at.map(|dt| dt.to_rfc3339()),
            profile.subscription_ends_at.map(|dt| dt.to_rfc3339()),
            profile.payment_customer_id,
            profile.payment_subscription_id,
            profile.updated_at.to_rfc3339(),
            id,
        ],
    )?;

    Ok(true)
}
