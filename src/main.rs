use anyhow::{bail, Result};
use chrono::Local;
use rusqlite::Connection;
use std::env;
use std::path::Path;

use controle_financeiro::format::{format_brl, format_date_br};
use controle_financeiro::{
    daily_balances, import_transactions, list_transactions, load_csv, parse_command, setup_database,
    summarize,
};

const DEFAULT_DB_PATH: &str = "financeiro.db";

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("import") if args.len() >= 4 => run_import(&args[2], &args[3], db_path(args.get(4))),
        Some("saldo") if args.len() >= 3 => run_balance(&args[2], db_path(args.get(3))),
        Some("comando") if args.len() >= 3 => run_command(&args[2..].join(" ")),
        _ => {
            print_usage();
            bail!("invalid arguments");
        }
    }
}

/// Explicit argument, then DATABASE_PATH, then the default file
fn db_path(arg: Option<&String>) -> String {
    arg.cloned()
        .or_else(|| env::var("DATABASE_PATH").ok())
        .unwrap_or_else(|| DEFAULT_DB_PATH.to_string())
}

fn print_usage() {
    eprintln!("Uso:");
    eprintln!("  controle-financeiro import <arquivo.csv> <usuario> [banco.db]");
    eprintln!("  controle-financeiro saldo <usuario> [banco.db]");
    eprintln!("  controle-financeiro comando \"<texto>\"");
}

fn run_import(csv_path: &str, owner_id: &str, db_path: String) -> Result<()> {
    println!("🗄️  Importação - CSV → SQLite + WAL");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load CSV
    println!("\n📂 Lendo CSV...");
    let transactions = load_csv(Path::new(csv_path), owner_id)?;
    println!("✓ {} transações lidas de {}", transactions.len(), csv_path);

    // 2. Setup database
    println!("\n🔧 Preparando banco...");
    let conn = Connection::open(&db_path)?;
    setup_database(&conn)?;
    println!("✓ Banco pronto em {}", db_path);

    // 3. Insert transactions
    println!("\n💾 Gravando transações...");
    let stats = import_transactions(&conn, &transactions)?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Novas: {}", stats.inserted);
    println!("✓ Duplicadas ignoradas: {}", stats.duplicates);

    Ok(())
}

fn run_balance(owner_id: &str, db_path: String) -> Result<()> {
    if !Path::new(&db_path).exists() {
        eprintln!("❌ Banco não encontrado: {}", db_path);
        eprintln!("   Rode primeiro: controle-financeiro import <arquivo.csv> {}", owner_id);
        std::process::exit(1);
    }

    let conn = Connection::open(&db_path)?;
    let transactions = list_transactions(&conn, owner_id, None, None)?;

    println!("📊 Saldo diário de {}", owner_id);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for day in daily_balances(&transactions) {
        println!(
            "{}  entradas {:>14}  saídas {:>14}  saldo {:>14}",
            format_date_br(day.date),
            format_brl(day.income),
            format_brl(day.expense),
            format_brl(day.balance)
        );
    }

    let summary = summarize(&transactions);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Transações: {}", summary.transaction_count);
    println!("💰 Saldo final: {}", format_brl(summary.balance));

    Ok(())
}

/// Show how a chat message would be interpreted, without saving anything
fn run_command(text: &str) -> Result<()> {
    let today = Local::now().date_naive();

    match parse_command(text, today) {
        Ok(command) => {
            println!("✓ {}", serde_json::to_string_pretty(&command)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    }
}
