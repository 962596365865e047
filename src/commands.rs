// 💬 Command Grammar - Short chat messages → transactions and reminders
//
//   gastei 50 no mercado ontem
//   recebi 3.000 de salário dia 5
//   lembrete pagar aluguel amanhã às 14h
//   lembretes amanhã | saldo | resumo | ajuda
//
// Matching is case- and accent-insensitive; descriptions and titles keep
// the text as typed. Ambiguous dates resolve toward the past for money
// already spent and toward the future for reminders.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use serde::Serialize;
use thiserror::Error;

use crate::format::parse_amount;
use crate::models::TransactionType;

/// Reminder time when the message does not name one
pub const DEFAULT_REMINDER_HOUR: u32 = 9;

const CONNECTORS: &[&str] = &[
    "em", "no", "na", "nos", "nas", "de", "do", "da", "com", "pra", "para", "pro", "me", "que",
];

const DATE_PREPOSITIONS: &[&str] = &["em", "no", "na", "de", "para", "pra", "ate", "proxima", "proximo"];

const TIME_PREPOSITIONS: &[&str] = &["as", "a", "ao"];

/// Only "às" introduces a bare hour; "a 2" is usually a quantity
const BARE_HOUR_PREPOSITION: &str = "as";

const CURRENCY_WORDS: &[&str] = &["reais", "real", "r$", "brl"];

const WEEKDAYS: &[(&str, Weekday)] = &[
    ("segunda", Weekday::Mon),
    ("terca", Weekday::Tue),
    ("quarta", Weekday::Wed),
    ("quinta", Weekday::Thu),
    ("sexta", Weekday::Fri),
    ("sabado", Weekday::Sat),
    ("domingo", Weekday::Sun),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBias {
    Past,
    Future,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Record {
        kind: TransactionType,
        amount: f64,
        category: String,
        description: String,
        date: NaiveDate,
    },
    Remind {
        title: String,
        date: NaiveDate,
        time: NaiveTime,
    },
    Balance,
    Summary,
    ListReminders {
        date: Option<NaiveDate>,
    },
    Help,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("mensagem vazia")]
    Empty,

    #[error("comando desconhecido: {0}")]
    UnknownCommand(String),

    #[error("valor não informado")]
    MissingAmount,

    #[error("categoria não informada")]
    MissingCategory,

    #[error("título do lembrete não informado")]
    MissingTitle,
}

pub fn help_text() -> &'static str {
    "Comandos:\n\
     • gastei <valor> <categoria> [descrição] [data]\n\
     • recebi <valor> <categoria> [descrição] [data]\n\
     • lembrete <título> [data] [hora]\n\
     • lembretes [data]\n\
     • saldo | resumo | ajuda"
}

// ============================================================================
// TOKENS
// ============================================================================

#[derive(Debug, Clone)]
struct Token {
    raw: String,
    norm: String,
}

/// Lowercase and strip Portuguese diacritics
pub fn fold(text: &str) -> String {
    text.chars()
        .flat_map(|c| c.to_lowercase())
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

fn tokenize(text: &str) -> Vec<Token> {
    text.split_whitespace()
        .map(|word| word.trim_end_matches([',', '.', '!', '?', ';']))
        .filter(|word| !word.is_empty())
        .map(|word| Token {
            raw: word.to_string(),
            norm: fold(word),
        })
        .collect()
}

fn join_raw(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|t| t.raw.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_leading_connectors(tokens: &mut Vec<Token>) {
    while tokens
        .first()
        .map_or(false, |t| CONNECTORS.contains(&t.norm.as_str()))
    {
        tokens.remove(0);
    }
}

fn strip_trailing_connectors(tokens: &mut Vec<Token>) {
    while tokens
        .last()
        .map_or(false, |t| CONNECTORS.contains(&t.norm.as_str()))
    {
        tokens.pop();
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ============================================================================
// DATE PATTERNS
// ============================================================================

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map_or(28, |d| d.day())
}

/// Day `day` of the given month, clamped to the month's length
fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day.min(last_day_of_month(year, month)))
}

fn shift_month(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let index = year * 12 + (month as i32 - 1) + delta;
    (index.div_euclid(12), (index.rem_euclid(12) + 1) as u32)
}

fn resolve_day_of_month(day: u32, today: NaiveDate, bias: DateBias) -> Option<NaiveDate> {
    if !(1..=31).contains(&day) {
        return None;
    }

    let this_month = clamped_date(today.year(), today.month(), day)?;
    let delta = match bias {
        DateBias::Future if this_month < today => 1,
        DateBias::Past if this_month > today => -1,
        _ => return Some(this_month),
    };

    let (year, month) = shift_month(today.year(), today.month(), delta);
    clamped_date(year, month, day)
}

fn resolve_weekday(target: Weekday, today: NaiveDate, bias: DateBias) -> NaiveDate {
    let from = today.weekday().num_days_from_monday() as i64;
    let to = target.num_days_from_monday() as i64;

    match bias {
        DateBias::Future => {
            let ahead = (to - from).rem_euclid(7);
            today + Duration::days(if ahead == 0 { 7 } else { ahead })
        }
        DateBias::Past => today - Duration::days((from - to).rem_euclid(7)),
    }
}

/// `dd/mm`, `dd/mm/yy`, `dd/mm/yyyy`, `dd-mm-yyyy`, `yyyy-mm-dd`
fn parse_numeric_date(token: &str, today: NaiveDate, bias: DateBias) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(token, "%Y-%m-%d") {
        return Some(date);
    }

    let parts: Vec<&str> = token.split(['/', '-']).collect();
    if parts.len() < 2 || parts.len() > 3 || parts.iter().any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit())) {
        return None;
    }

    let day: u32 = parts[0].parse().ok()?;
    let month: u32 = parts[1].parse().ok()?;

    match parts.get(2) {
        Some(year_raw) => {
            let year: i32 = year_raw.parse().ok()?;
            let year = match year_raw.len() {
                2 => 2000 + year,
                4 => year,
                _ => return None,
            };
            NaiveDate::from_ymd_opt(year, month, day)
        }
        None => {
            let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
            match bias {
                DateBias::Future if this_year < today => {
                    NaiveDate::from_ymd_opt(today.year() + 1, month, day)
                }
                DateBias::Past if this_year > today => {
                    NaiveDate::from_ymd_opt(today.year() - 1, month, day)
                }
                _ => Some(this_year),
            }
        }
    }
}

fn small_number(token: Option<&Token>) -> Option<i64> {
    token
        .filter(|t| t.norm.chars().all(|c| c.is_ascii_digit()) && t.norm.len() <= 3)
        .and_then(|t| t.norm.parse().ok())
}

/// Date pattern starting at `tokens[i]`: resolved date and tokens consumed
fn match_date_at(tokens: &[Token], i: usize, today: NaiveDate, bias: DateBias) -> Option<(NaiveDate, usize)> {
    let word = tokens[i].norm.as_str();
    let next = |offset: usize| tokens.get(i + offset).map(|t| t.norm.as_str());

    match word {
        "hoje" => return Some((today, 1)),
        "amanha" => return Some((today + Duration::days(1), 1)),
        "ontem" => return Some((today - Duration::days(1), 1)),
        "anteontem" => return Some((today - Duration::days(2), 1)),
        "depois" if next(1) == Some("de") && next(2) == Some("amanha") => {
            return Some((today + Duration::days(2), 3));
        }
        "dia" => {
            let day = small_number(tokens.get(i + 1))?;
            return resolve_day_of_month(day as u32, today, bias).map(|d| (d, 2));
        }
        // em 3 dias | daqui 3 dias | daqui a 3 dias
        "em" | "daqui" => {
            let skip = if word == "daqui" && next(1) == Some("a") { 2 } else { 1 };
            let count = small_number(tokens.get(i + skip))?;
            return match next(skip + 1) {
                Some("dia") | Some("dias") => Some((today + Duration::days(count), skip + 2)),
                _ => None,
            };
        }
        _ => {}
    }

    // "segunda" or "segunda-feira"
    let weekday = WEEKDAYS.iter().find(|(name, _)| {
        word.strip_prefix(name)
            .map_or(false, |rest| rest.is_empty() || rest.starts_with('-'))
    });
    if let Some((_, weekday)) = weekday {
        return Some((resolve_weekday(*weekday, today, bias), 1));
    }

    parse_numeric_date(word, today, bias).map(|d| (d, 1))
}

/// Find and remove the first date pattern (and a preposition right before it)
fn take_date(tokens: &mut Vec<Token>, today: NaiveDate, bias: DateBias) -> Option<NaiveDate> {
    for i in 0..tokens.len() {
        if let Some((date, consumed)) = match_date_at(tokens, i, today, bias) {
            let start = if i > 0 && DATE_PREPOSITIONS.contains(&tokens[i - 1].norm.as_str()) {
                i - 1
            } else {
                i
            };
            tokens.drain(start..i + consumed);
            return Some(date);
        }
    }
    None
}

/// Parse a date phrase on its own, e.g. `amanhã` or `25/12`
pub fn parse_date_phrase(text: &str, today: NaiveDate, bias: DateBias) -> Option<NaiveDate> {
    let mut tokens = tokenize(text);
    take_date(&mut tokens, today, bias)
}

// ============================================================================
// TIME PATTERNS
// ============================================================================

/// `14:00`, `14h`, `14h30`, `9hs`, `14:30h`
fn parse_time_token(token: &str) -> Option<NaiveTime> {
    let trimmed = token.trim_end_matches("hs").trim_end_matches('h');
    let had_suffix = trimmed.len() != token.len();

    let (hour, minute) = if let Some((h, m)) = trimmed.split_once(':') {
        (h, m)
    } else if let Some((h, m)) = trimmed.split_once('h') {
        (h, m)
    } else if had_suffix {
        (trimmed, "0")
    } else {
        return None;
    };

    if hour.is_empty() || hour.len() > 2 || minute.len() > 2 {
        return None;
    }
    let hour: u32 = hour.parse().ok()?;
    let minute: u32 = if minute.is_empty() { 0 } else { minute.parse().ok()? };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Find and remove the first time pattern (and `às` right before it)
fn take_time(tokens: &mut Vec<Token>) -> Option<NaiveTime> {
    for i in 0..tokens.len() {
        let previous = i.checked_sub(1).map(|p| tokens[p].norm.as_str());

        let time = parse_time_token(&tokens[i].norm).or_else(|| {
            if previous == Some(BARE_HOUR_PREPOSITION) {
                small_number(Some(&tokens[i]))
                    .and_then(|h| NaiveTime::from_hms_opt(u32::try_from(h).ok()?, 0, 0))
            } else {
                None
            }
        });

        if let Some(time) = time {
            let start = match previous {
                Some(p) if TIME_PREPOSITIONS.contains(&p) => i - 1,
                _ => i,
            };
            tokens.drain(start..=i);
            return Some(time);
        }
    }
    None
}

// ============================================================================
// COMMANDS
// ============================================================================

pub fn parse_command(text: &str, today: NaiveDate) -> Result<Command, CommandError> {
    let mut tokens = tokenize(text);
    if tokens.is_empty() {
        return Err(CommandError::Empty);
    }

    let keyword = tokens.remove(0);
    match keyword.norm.as_str() {
        "gasto" | "gastei" | "saida" | "paguei" | "despesa" => {
            parse_record(tokens, TransactionType::Saida, today)
        }
        "entrada" | "recebi" | "ganhei" | "receita" => {
            parse_record(tokens, TransactionType::Entrada, today)
        }
        "lembrete" | "lembrar" | "lembre" | "lembra" | "lembre-me" => parse_reminder(tokens, today),
        "lembretes" | "agenda" => Ok(Command::ListReminders {
            date: take_date(&mut tokens, today, DateBias::Future),
        }),
        "saldo" => Ok(Command::Balance),
        "resumo" => Ok(Command::Summary),
        "ajuda" | "help" | "menu" => Ok(Command::Help),
        _ => Err(CommandError::UnknownCommand(keyword.raw)),
    }
}

fn parse_record(
    mut tokens: Vec<Token>,
    kind: TransactionType,
    today: NaiveDate,
) -> Result<Command, CommandError> {
    let date = take_date(&mut tokens, today, DateBias::Past).unwrap_or(today);

    // "R$ 50" arrives as two tokens
    let mut amount = None;
    for i in 0..tokens.len() {
        let candidate = if tokens[i].norm == "r$" {
            tokens.get(i + 1).map(|next| (format!("r$ {}", next.norm), 2))
        } else {
            Some((tokens[i].norm.clone(), 1))
        };

        if let Some((text, consumed)) = candidate {
            if let Some(value) = parse_amount(&text) {
                tokens.drain(i..i + consumed);
                // "50 reais"
                if tokens
                    .get(i)
                    .map_or(false, |t| CURRENCY_WORDS.contains(&t.norm.as_str()))
                {
                    tokens.remove(i);
                }
                amount = Some(value);
                break;
            }
        }
    }
    let amount = amount.ok_or(CommandError::MissingAmount)?;

    strip_leading_connectors(&mut tokens);
    if tokens.is_empty() {
        return Err(CommandError::MissingCategory);
    }
    let category = capitalize(&tokens.remove(0).raw);

    strip_leading_connectors(&mut tokens);
    strip_trailing_connectors(&mut tokens);
    let description = if tokens.is_empty() {
        category.clone()
    } else {
        join_raw(&tokens)
    };

    Ok(Command::Record {
        kind,
        amount,
        category,
        description,
        date,
    })
}

fn parse_reminder(mut tokens: Vec<Token>, today: NaiveDate) -> Result<Command, CommandError> {
    let date = take_date(&mut tokens, today, DateBias::Future).unwrap_or(today);
    let time = take_time(&mut tokens)
        .or_else(|| NaiveTime::from_hms_opt(DEFAULT_REMINDER_HOUR, 0, 0))
        .unwrap_or(NaiveTime::MIN);

    strip_leading_connectors(&mut tokens);
    strip_trailing_connectors(&mut tokens);
    if tokens.is_empty() {
        return Err(CommandError::MissingTitle);
    }

    Ok(Command::Remind {
        title: join_raw(&tokens),
        date,
        time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Friday
    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_fold() {
        assert_eq!(fold("Amanhã ÀS Saúde"), "amanha as saude");
        assert_eq!(fold("Terça"), "terca");
    }

    #[test]
    fn test_simple_expense() {
        let cmd = parse_command("gastei 50 no mercado", today()).unwrap();
        assert_eq!(
            cmd,
            Command::Record {
                kind: TransactionType::Saida,
                amount: 50.0,
                category: "Mercado".to_string(),
                description: "Mercado".to_string(),
                date: today(),
            }
        );
    }

    #[test]
    fn test_expense_with_currency_description_and_date() {
        let cmd = parse_command("Gastei R$ 32,50 em transporte uber ontem", today()).unwrap();
        match cmd {
            Command::Record { amount, category, description, date: d, .. } => {
                assert_eq!(amount, 32.5);
                assert_eq!(category, "Transporte");
                assert_eq!(description, "uber");
                assert_eq!(d, date(2026, 10, 15));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_income_day_of_month_resolves_to_past() {
        let cmd = parse_command("recebi 3.000 de salário dia 5", today()).unwrap();
        match cmd {
            Command::Record { kind, amount, category, date: d, .. } => {
                assert_eq!(kind, TransactionType::Entrada);
                assert_eq!(amount, 3000.0);
                assert_eq!(category, "Salário");
                assert_eq!(d, date(2026, 10, 5));
            }
            other => panic!("unexpected {:?}", other),
        }

        // Day 20 has not happened yet this month, so it is last month's
        match parse_command("gasto 80 farmácia dia 20", today()).unwrap() {
            Command::Record { date: d, .. } => assert_eq!(d, date(2026, 9, 20)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_expense_numeric_and_weekday_dates() {
        match parse_command("paguei 120 luz 10/09", today()).unwrap() {
            Command::Record { category, date: d, .. } => {
                assert_eq!(category, "Luz");
                assert_eq!(d, date(2026, 9, 10));
            }
            other => panic!("unexpected {:?}", other),
        }

        // A future dd/mm in a past-biased command belongs to last year
        match parse_command("paguei 120 luz 20/12", today()).unwrap() {
            Command::Record { date: d, .. } => assert_eq!(d, date(2025, 12, 20)),
            other => panic!("unexpected {:?}", other),
        }

        match parse_command("gastei 40 lazer cinema na sexta", today()).unwrap() {
            Command::Record { description, date: d, .. } => {
                assert_eq!(description, "cinema");
                assert_eq!(d, today());
            }
            other => panic!("unexpected {:?}", other),
        }

        match parse_command("gastei 40 lazer segunda", today()).unwrap() {
            Command::Record { date: d, .. } => assert_eq!(d, date(2026, 10, 12)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_record_errors() {
        assert_eq!(parse_command("gastei mercado", today()), Err(CommandError::MissingAmount));
        assert_eq!(parse_command("gastei 50", today()), Err(CommandError::MissingCategory));
        assert_eq!(parse_command("gastei 50 no", today()), Err(CommandError::MissingCategory));
        assert_eq!(parse_command("   ", today()), Err(CommandError::Empty));
        assert_eq!(
            parse_command("compre pão", today()),
            Err(CommandError::UnknownCommand("compre".to_string()))
        );
    }

    #[test]
    fn test_reminder_tomorrow_with_time() {
        let cmd = parse_command("lembrete pagar aluguel amanhã às 14h", today()).unwrap();
        assert_eq!(
            cmd,
            Command::Remind {
                title: "pagar aluguel".to_string(),
                date: date(2026, 10, 17),
                time: time(14, 0),
            }
        );
    }

    #[test]
    fn test_reminder_weekday_resolves_to_future() {
        match parse_command("lembrar de ligar para o banco segunda 9:30", today()).unwrap() {
            Command::Remind { title, date: d, time: t } => {
                assert_eq!(title, "ligar para o banco");
                assert_eq!(d, date(2026, 10, 19));
                assert_eq!(t, time(9, 30));
            }
            other => panic!("unexpected {:?}", other),
        }

        // Same weekday as today means next week
        match parse_command("lembrete feira sexta", today()).unwrap() {
            Command::Remind { date: d, .. } => assert_eq!(d, date(2026, 10, 23)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_reminder_day_and_numeric_dates() {
        match parse_command("lembrete dentista dia 10 as 15h30", today()).unwrap() {
            Command::Remind { title, date: d, time: t } => {
                assert_eq!(title, "dentista");
                assert_eq!(d, date(2026, 11, 10));
                assert_eq!(t, time(15, 30));
            }
            other => panic!("unexpected {:?}", other),
        }

        match parse_command("lembrete consulta 01/02", today()).unwrap() {
            Command::Remind { date: d, time: t, .. } => {
                assert_eq!(d, date(2027, 2, 1));
                assert_eq!(t, time(DEFAULT_REMINDER_HOUR, 0));
            }
            other => panic!("unexpected {:?}", other),
        }

        match parse_command("lembrete pagar fatura em 3 dias às 8", today()).unwrap() {
            Command::Remind { title, date: d, time: t } => {
                assert_eq!(title, "pagar fatura");
                assert_eq!(d, date(2026, 10, 19));
                assert_eq!(t, time(8, 0));
            }
            other => panic!("unexpected {:?}", other),
        }

        match parse_command("lembrete renovar seguro depois de amanhã", today()).unwrap() {
            Command::Remind { date: d, .. } => assert_eq!(d, date(2026, 10, 18)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_currency_word_after_amount() {
        match parse_command("gastei 50 reais no mercado", today()).unwrap() {
            Command::Record { amount, category, description, .. } => {
                assert_eq!(amount, 50.0);
                assert_eq!(category, "Mercado");
                assert_eq!(description, "Mercado");
            }
            other => panic!("unexpected {:?}", other),
        }

        match parse_command("paguei 1.200 real aluguel apartamento", today()).unwrap() {
            Command::Record { amount, category, description, .. } => {
                assert_eq!(amount, 1200.0);
                assert_eq!(category, "Aluguel");
                assert_eq!(description, "apartamento");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_quantity_after_a_is_not_an_hour() {
        match parse_command("lembrete levar a 2 reuniões amanhã", today()).unwrap() {
            Command::Remind { title, date: d, time: t } => {
                assert_eq!(title, "levar a 2 reuniões");
                assert_eq!(d, date(2026, 10, 17));
                assert_eq!(t, time(DEFAULT_REMINDER_HOUR, 0));
            }
            other => panic!("unexpected {:?}", other),
        }

        // An explicit time still swallows the "a" before it
        match parse_command("lembrete ligar a 15h", today()).unwrap() {
            Command::Remind { title, time: t, .. } => {
                assert_eq!(title, "ligar");
                assert_eq!(t, time(15, 0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_reminder_without_title() {
        assert_eq!(
            parse_command("lembrete amanhã às 10h", today()),
            Err(CommandError::MissingTitle)
        );
    }

    #[test]
    fn test_query_commands() {
        assert_eq!(parse_command("Saldo", today()), Ok(Command::Balance));
        assert_eq!(parse_command("resumo", today()), Ok(Command::Summary));
        assert_eq!(parse_command("ajuda", today()), Ok(Command::Help));
        assert_eq!(
            parse_command("lembretes amanhã", today()),
            Ok(Command::ListReminders { date: Some(date(2026, 10, 17)) })
        );
        assert_eq!(
            parse_command("lembretes", today()),
            Ok(Command::ListReminders { date: None })
        );
    }

    #[test]
    fn test_day_of_month_clamps() {
        // 31 in a 30-day month becomes the last day
        let today = date(2026, 11, 5);
        assert_eq!(resolve_day_of_month(31, today, DateBias::Future), Some(date(2026, 11, 30)));
        assert_eq!(resolve_day_of_month(31, today, DateBias::Past), Some(date(2026, 10, 31)));
        assert_eq!(resolve_day_of_month(0, today, DateBias::Past), None);

        // January going back crosses the year
        let january = date(2027, 1, 3);
        assert_eq!(resolve_day_of_month(20, january, DateBias::Past), Some(date(2026, 12, 20)));
    }

    #[test]
    fn test_time_tokens() {
        assert_eq!(parse_time_token("14:00"), Some(time(14, 0)));
        assert_eq!(parse_time_token("9hs"), Some(time(9, 0)));
        assert_eq!(parse_time_token("14h30"), Some(time(14, 30)));
        assert_eq!(parse_time_token("25h"), None);
        assert_eq!(parse_time_token("14"), None);
        assert_eq!(parse_time_token("hoje"), None);
    }

    #[test]
    fn test_date_phrase() {
        assert_eq!(parse_date_phrase("25/12", today(), DateBias::Future), Some(date(2026, 12, 25)));
        assert_eq!(parse_date_phrase("2026-01-31", today(), DateBias::Future), Some(date(2026, 1, 31)));
        assert_eq!(parse_date_phrase("31/02", today(), DateBias::Future), None);
        assert_eq!(parse_date_phrase("daqui a 2 dias", today(), DateBias::Future), Some(date(2026, 10, 18)));
    }
}
