// 💱 Formatting - Brazilian currency and date conventions
//
// R$ with `.` thousands and `,` decimals; dd/mm/yyyy dates.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};

const MONTHS: [&str; 12] = [
    "janeiro", "fevereiro", "março", "abril", "maio", "junho", "julho", "agosto", "setembro",
    "outubro", "novembro", "dezembro",
];

// ============================================================================
// CURRENCY
// ============================================================================

/// Format a value as Brazilian reais, e.g. `R$ 1.234,56`
pub fn format_brl(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };

    format!(
        "{}R$ {},{:02}",
        sign,
        group_thousands(cents / 100),
        cents % 100
    )
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }

    out
}

/// Parse a user-typed amount: `50`, `50,9`, `1.234,56`, `1234.56`, `R$ 50`
///
/// Returns None for anything that is not a positive number.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let mut text = raw.trim().to_lowercase();
    if let Some(rest) = text.strip_prefix("r$") {
        text = rest.trim().to_string();
    }

    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
        return None;
    }

    let normalized = if text.contains(',') {
        // Comma is the decimal separator, dots group thousands
        if text.matches(',').count() > 1 {
            return None;
        }
        text.replace('.', "").replace(',', ".")
    } else if text.matches('.').count() > 1 {
        text.replace('.', "")
    } else if let Some((_, frac)) = text.split_once('.') {
        // A single dot followed by three digits groups thousands ("1.500")
        if frac.len() == 3 {
            text.replace('.', "")
        } else {
            text
        }
    } else {
        text
    };

    let value: f64 = normalized.parse().ok()?;
    if value.is_finite() && value > 0.0 {
        Some(value)
    } else {
        None
    }
}

// ============================================================================
// DATES
// ============================================================================

pub fn month_name(month: u32) -> &'static str {
    month
        .checked_sub(1)
        .and_then(|i| MONTHS.get(i as usize))
        .copied()
        .unwrap_or("")
}

/// `16/10/2026`
pub fn format_date_br(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// `16 de outubro de 2026`
pub fn format_date_long(date: NaiveDate) -> String {
    format!("{} de {} de {}", date.day(), month_name(date.month()), date.year())
}

/// `16/10/2026 14:00`
pub fn format_datetime_br(datetime: NaiveDateTime) -> String {
    datetime.format("%d/%m/%Y %H:%M").to_string()
}

/// Parse a date typed in a form: `2026-10-16` or `16/10/2026`
pub fn parse_date_input(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
        .ok()
}

/// Parse timestamps as payment providers send them
pub fn parse_flexible_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
