// 📈 Balance Engine - Daily running balance, summaries, limit status
//
// Running balance is a single pass over per-day totals in date order:
//   balance(day) = balance(previous day) + income(day) - expense(day)

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{SpendingLimit, Transaction, TransactionType};

/// Share of a ceiling at which a category is flagged
pub const WARNING_THRESHOLD: f64 = 80.0;

// ============================================================================
// DAILY BALANCE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBalance {
    pub date: NaiveDate,
    pub income: f64,
    pub expense: f64,
    /// income - expense for this day
    pub net: f64,
    /// Accumulated balance at the end of this day
    pub balance: f64,
}

/// One entry per day that has transactions, in ascending date order
pub fn daily_balances(transactions: &[Transaction]) -> Vec<DailyBalance> {
    let mut per_day: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();

    for tx in transactions {
        let (income, expense) = per_day.entry(tx.date).or_insert((0.0, 0.0));
        match tx.kind {
            TransactionType::Entrada => *income += tx.amount,
            TransactionType::Saida => *expense += tx.amount,
        }
    }

    let mut running = 0.0;
    per_day
        .into_iter()
        .map(|(date, (income, expense))| {
            let net = income - expense;
            running += net;
            DailyBalance {
                date,
                income,
                expense,
                net,
                balance: running,
            }
        })
        .collect()
}

// ============================================================================
// SUMMARY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_income: f64,
    pub total_expense: f64,
    pub balance: f64,
    pub transaction_count: usize,
}

pub fn summarize(transactions: &[Transaction]) -> Summary {
    let mut summary = Summary::default();

    for tx in transactions {
        match tx.kind {
            TransactionType::Entrada => summary.total_income += tx.amount,
            TransactionType::Saida => summary.total_expense += tx.amount,
        }
    }

    summary.balance = summary.total_income - summary.total_expense;
    summary.transaction_count = transactions.len();
    summary
}

/// Transactions dated in the given calendar month
pub fn filter_month(transactions: &[Transaction], year: i32, month: u32) -> Vec<Transaction> {
    transactions
        .iter()
        .filter(|tx| tx.date.year() == year && tx.date.month() == month)
        .cloned()
        .collect()
}

/// Expense totals per category
pub fn category_spending(transactions: &[Transaction]) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();

    for tx in transactions.iter().filter(|tx| tx.is_expense()) {
        *totals.entry(tx.category.clone()).or_insert(0.0) += tx.amount;
    }

    totals
}

// ============================================================================
// LIMIT STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitLevel {
    Ok,
    Warning,
    Exceeded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitStatus {
    pub category: String,
    pub limit: f64,
    pub spent: f64,
    /// Negative once the ceiling is passed
    pub remaining: f64,
    pub percent_used: f64,
    pub level: LimitLevel,
}

/// Compare expense totals with every category that has a ceiling
pub fn limit_status(transactions: &[Transaction], limit: &SpendingLimit) -> Vec<LimitStatus> {
    let spending = category_spending(transactions);

    limit
        .limits
        .iter()
        .map(|(category, ceiling)| {
            let spent = spending.get(category).copied().unwrap_or(0.0);
            let percent_used = if *ceiling > 0.0 {
                spent * 100.0 / ceiling
            } else if spent > 0.0 {
                // Any spending against a zero ceiling is over it
                f64::INFINITY
            } else {
                0.0
            };

            let level = if spent > *ceiling {
                LimitLevel::Exceeded
            } else if percent_used >= WARNING_THRESHOLD {
                LimitLevel::Warning
            } else {
                LimitLevel::Ok
            };

            LimitStatus {
                category: category.clone(),
                limit: *ceiling,
                spent,
                remaining: ceiling - spent,
                // Keep the JSON representable
                percent_used: if percent_used.is_finite() { percent_used } else { 100.0 },
                level,
            }
        })
        .collect()
}
