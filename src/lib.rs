// Controle Financeiro - Core Library
// Exposes all modules for use in the CLI, the API server, and tests

pub mod balance;
pub mod baas;
pub mod calendar;
pub mod checkout;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod models;
pub mod reminders;
pub mod subscription;
pub mod webhook;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use balance::{daily_balances, limit_status, summarize, DailyBalance, LimitLevel, LimitStatus, Summary};
pub use calendar::{CalendarClient, CalendarEvent, EventInput};
pub use commands::{parse_command, Command, CommandError};
pub use config::Config;
pub use db::{
    import_transactions, list_transactions, load_csv, setup_database, ImportStats,
};
pub use error::RemoteError;
pub use models::{NewReminder, NewTransaction, Profile, Reminder, SpendingLimit, Transaction, TransactionType};
pub use subscription::{AccessSummary, Plan, SubscriptionStatus};
pub use webhook::{process_webhook, PaymentWebhook, Provisioner, WebhookOutcome};
