//! Content fingerprints for duplicate detection
//!
//! A fingerprint hashes the date, the amount in cents, a normalized
//! description and the external id. Account and card are left out so the
//! same purchase imported through two accounts is still caught.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::db::Database;
use crate::error::Result;
use crate::models::{round_money, Transaction};

/// Rows rehashed per page by [`recalculate_fingerprints`]
const REHASH_CHUNK: i64 = 100;

/// Normalize a description for hashing: collapse whitespace, lowercase,
/// drop anything outside `[a-z0-9 ]`, trim.
pub fn normalize_description(description: &str) -> String {
    let collapsed = description.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == ' ')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Stable SHA-256 hex fingerprint of a transaction's content
pub fn fingerprint(
    date: NaiveDate,
    amount: Decimal,
    description: &str,
    external_id: Option<&str>,
) -> String {
    let payload = format!(
        "{}|{}|{}|{}",
        date.format("%Y-%m-%d"),
        round_money(amount),
        normalize_description(description),
        external_id.unwrap_or("")
    );

    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

/// Fingerprint of a stored transaction, from its original description
pub fn transaction_fingerprint(tx: &Transaction) -> String {
    fingerprint(
        tx.date,
        tx.amount,
        &tx.description_original,
        tx.external_id.as_deref(),
    )
}

/// Whether the user already has a transaction with this fingerprint
pub fn is_duplicate(db: &Database, user_id: i64, fingerprint: &str) -> Result<bool> {
    db.fingerprint_exists(user_id, fingerprint)
}

/// The user's transactions matching this fingerprint exactly
pub fn find_duplicates(db: &Database, user_id: i64, fingerprint: &str) -> Result<Vec<Transaction>> {
    db.find_by_fingerprint(user_id, fingerprint)
}

/// Possible duplicates: same day and amount, and same external id when one is known
pub fn find_similar(
    db: &Database,
    user_id: i64,
    date: NaiveDate,
    amount: Decimal,
    external_id: Option<&str>,
) -> Result<Vec<Transaction>> {
    db.find_similar_transactions(user_id, date, amount, external_id)
}

/// Recompute stored fingerprints, one page of rows at a time.
///
/// With `only_missing` set, rows that already carry a fingerprint are left
/// alone. Returns the number of rows updated.
pub fn recalculate_fingerprints(
    db: &Database,
    user_id: Option<i64>,
    only_missing: bool,
) -> Result<usize> {
    let mut updated = 0;
    let mut last_id = 0;

    loop {
        let page = db.transactions_after(user_id, only_missing, last_id, REHASH_CHUNK)?;
        let Some(last) = page.last() else {
            break;
        };
        last_id = last.id;

        for tx in &page {
            let fp = transaction_fingerprint(tx);
            if tx.fingerprint.as_deref() != Some(fp.as_str()) {
                db.set_transaction_fingerprint(tx.id, &fp)?;
                updated += 1;
            }
        }
        debug!(last_id, rows = page.len(), "Rehashed fingerprint page");
    }

    info!(updated, "Fingerprint recalculation finished");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewTransaction, TransactionType};
    use std::str::FromStr;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_normalize_description() {
        assert_eq!(normalize_description("  Padaria   São-João  "), "padaria sojoo");
        assert_eq!(normalize_description("UBER *TRIP\t123"), "uber trip 123");
        assert_eq!(normalize_description(""), "");
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = fingerprint(d(2025, 1, 10), dec("150"), "Mercado  Central", Some("X1"));
        let b = fingerprint(d(2025, 1, 10), dec("150.00"), "mercado central", Some("X1"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_changes_with_each_field() {
        let base = fingerprint(d(2025, 1, 10), dec("150.00"), "Mercado", Some("X1"));
        assert_ne!(base, fingerprint(d(2025, 1, 11), dec("150.00"), "Mercado", Some("X1")));
        assert_ne!(base, fingerprint(d(2025, 1, 10), dec("150.01"), "Mercado", Some("X1")));
        assert_ne!(base, fingerprint(d(2025, 1, 10), dec("150.00"), "Mercadao", Some("X1")));
        assert_ne!(base, fingerprint(d(2025, 1, 10), dec("150.00"), "Mercado", Some("X2")));
        assert_ne!(base, fingerprint(d(2025, 1, 10), dec("150.00"), "Mercado", None));
    }

    #[test]
    fn test_missing_external_id_hashes_as_empty() {
        assert_eq!(
            fingerprint(d(2025, 1, 10), dec("1"), "a", None),
            fingerprint(d(2025, 1, 10), dec("1"), "a", Some(""))
        );
    }

    #[test]
    fn test_amount_rounds_half_away_from_zero() {
        assert_eq!(
            fingerprint(d(2025, 1, 10), dec("10.005"), "a", None),
            fingerprint(d(2025, 1, 10), dec("10.01"), "a", None)
        );
    }

    #[test]
    fn test_duplicate_lookup_is_user_scoped() {
        let db = Database::in_memory().unwrap();
        let fp = fingerprint(d(2025, 3, 1), dec("20.00"), "Cafe", None);

        let mut tx = NewTransaction::new(1, d(2025, 3, 1), "Cafe", dec("20.00"), TransactionType::Expense);
        tx.fingerprint = Some(fp.clone());
        let id = db.insert_transaction(&tx).unwrap();

        assert!(is_duplicate(&db, 1, &fp).unwrap());
        assert!(!is_duplicate(&db, 2, &fp).unwrap());

        let dups = find_duplicates(&db, 1, &fp).unwrap();
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].id, id);
    }

    #[test]
    fn test_find_similar_narrows_by_external_id() {
        let db = Database::in_memory().unwrap();
        for ext in ["A", "B"] {
            let mut tx = NewTransaction::new(1, d(2025, 3, 1), "Loja", dec("9.90"), TransactionType::Expense);
            tx.external_id = Some(ext.to_string());
            db.insert_transaction(&tx).unwrap();
        }

        assert_eq!(find_similar(&db, 1, d(2025, 3, 1), dec("9.9"), None).unwrap().len(), 2);
        assert_eq!(find_similar(&db, 1, d(2025, 3, 1), dec("9.90"), Some("B")).unwrap().len(), 1);
        assert!(find_similar(&db, 1, d(2025, 3, 2), dec("9.90"), None).unwrap().is_empty());
    }

    #[test]
    fn test_recalculate_fingerprints_fills_missing() {
        let db = Database::in_memory().unwrap();
        for i in 0..3 {
            let tx = NewTransaction::new(
                1,
                d(2025, 4, 1 + i),
                format!("Compra {}", i),
                dec("5.00"),
                TransactionType::Expense,
            );
            db.insert_transaction(&tx).unwrap();
        }

        assert_eq!(recalculate_fingerprints(&db, Some(1), true).unwrap(), 3);
        // Everything is current now
        assert_eq!(recalculate_fingerprints(&db, Some(1), false).unwrap(), 0);

        let txs = db.list_transactions(1, 10).unwrap();
        for tx in txs {
            assert_eq!(tx.fingerprint.as_deref(), Some(transaction_fingerprint(&tx).as_str()));
        }
    }
}
