//! Duplicate detection command implementations

use anyhow::Result;
use chrono::NaiveDate;
use fatura_core::{db::Database, dedupe};
use rust_decimal::Decimal;

use super::truncate;

pub fn cmd_dedupe_rehash(db: &Database, user_id: Option<i64>, only_missing: bool) -> Result<usize> {
    match user_id {
        Some(id) => println!("🔁 Recomputing fingerprints for user {}...", id),
        None => println!("🔁 Recomputing fingerprints for all users..."),
    }

    let updated = dedupe::recalculate_fingerprints(db, user_id, only_missing)?;
    println!("✅ Updated {} fingerprint(s)", updated);
    Ok(updated)
}

pub fn cmd_dedupe_check(
    db: &Database,
    user_id: i64,
    date: NaiveDate,
    amount: Decimal,
    description: &str,
    external_id: Option<&str>,
) -> Result<bool> {
    let fingerprint = dedupe::fingerprint(date, amount, description, external_id);
    let exact = dedupe::find_duplicates(db, user_id, &fingerprint)?;
    let similar = dedupe::find_similar(db, user_id, date, amount, external_id)?;

    println!("   Fingerprint: {}", fingerprint);

    if exact.is_empty() {
        println!("✅ Not a duplicate");
    } else {
        println!("👯 Duplicate of {} transaction(s):", exact.len());
        for tx in &exact {
            println!("   [{}] {} │ {:.2} │ {}", tx.id, tx.date, tx.amount, truncate(tx.display_description(), 40));
        }
    }

    let near: Vec<_> = similar
        .iter()
        .filter(|tx| !exact.iter().any(|e| e.id == tx.id))
        .collect();
    if !near.is_empty() {
        println!();
        println!("💡 Same day and amount, different description:");
        for tx in near {
            println!("   [{}] {} │ {:.2} │ {}", tx.id, tx.date, tx.amount, truncate(tx.display_description(), 40));
        }
    }

    Ok(!exact.is_empty())
}
