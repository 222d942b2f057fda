//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_settings` / `open_storage` - Settings and blob storage
//! - `parse_date_arg` / `parse_money_arg` - Argument parsing
//! - `cmd_init` - Initialize the database

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use fatura_core::{db::Database, LocalStorage, Settings};
use rust_decimal::Decimal;

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Built-in settings plus the override file, if any
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    Settings::load(path).context("Failed to load settings")
}

/// Blob storage for uploaded statements
pub fn open_storage(settings: &Settings) -> Result<LocalStorage> {
    let dir = settings.storage_dir()?;
    LocalStorage::new(&dir)
        .with_context(|| format!("Failed to open storage at {}", dir.display()))
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn parse_date_arg(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}' (use YYYY-MM-DD)", s))
}

/// Parse a non-negative amount such as `5000` or `45.90`
pub fn parse_money_arg(s: &str) -> Result<Decimal> {
    let amount = Decimal::from_str(s.trim())
        .with_context(|| format!("Invalid amount '{}' (use e.g. 45.90)", s))?;
    if amount.is_sign_negative() && !amount.is_zero() {
        anyhow::bail!("Amount must not be negative: {}", s);
    }
    Ok(amount)
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    open_db(db_path, no_encrypt)?;

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Add a card: fatura cards add Nubank --closing-day 27 --due-day 5");
    println!("  2. Import a statement: fatura import upload extrato.ofx");

    Ok(())
}
