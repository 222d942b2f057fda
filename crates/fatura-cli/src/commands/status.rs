//! Status-related command implementations (status, accounts, transactions)

use std::path::Path;

use anyhow::Result;
use fatura_core::{
    db::{Database, DB_KEY_ENV},
    models::TransactionType,
    Settings,
};

use super::{open_db, truncate};

pub fn cmd_status(db_path: &Path, user_id: i64, no_encrypt: bool, settings: &Settings) -> Result<()> {
    use std::fs;

    println!();
    println!("📊 Fatura Status");
    println!("   ─────────────────────────────────────────────────────────────");

    println!("   Database: {}", db_path.display());

    if db_path.exists() {
        if let Ok(metadata) = fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    match &settings.source {
        Some(path) => println!("   Settings: {}", path.display()),
        None => println!("   Settings: built-in defaults"),
    }
    match settings.storage_dir() {
        Ok(dir) => println!("   Storage: {}", dir.display()),
        Err(e) => println!("   Storage: ❌ {}", e),
    }

    if db_path.exists() {
        match open_db(db_path, no_encrypt) {
            Ok(db) => {
                println!();
                println!("   Accounts: {}", db.list_accounts(user_id)?.len());
                println!("   Cards: {}", db.list_cards(user_id, false)?.len());
                println!("   Transactions: {}", db.count_transactions(user_id)?);
                println!("   Imports: {}", db.list_import_batches(user_id, i64::MAX)?.len());
            }
            Err(e) => {
                println!();
                println!("   ❌ Error opening database: {}", e);
                if !no_encrypt && !has_key {
                    println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
                } else if has_key {
                    println!("      (Check if {} is correct)", DB_KEY_ENV);
                }
            }
        }
    }

    println!();
    Ok(())
}

pub fn cmd_accounts_list(db: &Database, user_id: i64) -> Result<()> {
    let accounts = db.list_accounts(user_id)?;

    if accounts.is_empty() {
        println!("No accounts found. Add one with:");
        println!("  fatura accounts add \"Conta Corrente\"");
        return Ok(());
    }

    println!();
    println!("📁 Accounts");
    println!("   ─────────────────────────────");

    for account in accounts {
        println!("   [{}] {}", account.id, account.name);
    }

    Ok(())
}

pub fn cmd_accounts_add(db: &Database, user_id: i64, name: &str) -> Result<i64> {
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Account name must not be empty");
    }
    let id = db.upsert_account(user_id, name)?;
    println!("✅ Account '{}' (ID: {})", name, id);
    Ok(id)
}

pub fn cmd_transactions_list(db: &Database, user_id: i64, limit: i64) -> Result<()> {
    let transactions = db.list_transactions(user_id, limit)?;

    if transactions.is_empty() {
        println!("No transactions found. Import some with:");
        println!("  fatura import upload extrato.ofx");
        return Ok(());
    }

    println!();
    println!("📝 Recent Transactions");
    println!("   ─────────────────────────────────────────────────────────────");

    for tx in transactions {
        let amount_str = match tx.kind {
            TransactionType::Expense => format!("\x1b[31m-{:.2}\x1b[0m", tx.amount), // Red for expenses
            TransactionType::Income => format!("\x1b[32m+{:.2}\x1b[0m", tx.amount), // Green for income
            TransactionType::Transfer => format!("{:.2}", tx.amount),
        };

        println!(
            "   [{}] {} │ {:>10} │ {}",
            tx.id,
            tx.date,
            amount_str,
            truncate(tx.display_description(), 40)
        );
    }

    Ok(())
}
