//! Transaction operations

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};
use rust_decimal::Decimal;

use super::{get_date, get_enum, get_money, money_to_sql, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{NewTransaction, PaymentMethod, Transaction};

const TRANSACTION_COLUMNS: &str = "id, user_id, account_id, card_id, cycle_id, date, \
    description_original, description, amount, kind, payment_method, external_id, \
    fingerprint, is_installment, installment_current, installment_total, parent_id, created_at";

fn row_to_transaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<Transaction> {
    let payment_method: Option<String> = row.get(10)?;
    let created_at_str: String = row.get(17)?;
    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        account_id: row.get(2)?,
        card_id: row.get(3)?,
        cycle_id: row.get(4)?,
        date: get_date(row, 5)?,
        description_original: row.get(6)?,
        description: row.get(7)?,
        amount: get_money(row, 8)?,
        kind: get_enum(row, 9)?,
        payment_method: payment_method.and_then(|s| s.parse::<PaymentMethod>().ok()),
        external_id: row.get(11)?,
        fingerprint: row.get(12)?,
        is_installment: row.get(13)?,
        installment_current: row.get(14)?,
        installment_total: row.get(15)?,
        parent_id: row.get(16)?,
        created_at: parse_datetime(&created_at_str),
    })
}

impl Database {
    /// Insert a transaction after checking its invariants
    pub fn insert_transaction(&self, tx: &NewTransaction) -> Result<i64> {
        tx.validate()?;
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO transactions (
                user_id, account_id, card_id, cycle_id, date, description_original, description,
                amount, kind, payment_method, external_id, fingerprint, is_installment,
                installment_current, installment_total, parent_id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                tx.user_id,
                tx.account_id,
                tx.card_id,
                tx.cycle_id,
                tx.date.to_string(),
                tx.description_original,
                tx.description,
                money_to_sql(tx.amount),
                tx.kind.as_str(),
                tx.payment_method.map(|p| p.as_str()),
                tx.external_id,
                tx.fingerprint,
                tx.is_installment,
                tx.installment_current,
                tx.installment_total,
                tx.parent_id,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Get a transaction by ID
    pub fn get_transaction(&self, id: i64) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let tx = conn
            .query_row(
                &format!("SELECT {} FROM transactions WHERE id = ?", TRANSACTION_COLUMNS),
                params![id],
                row_to_transaction,
            )
            .optional()?;
        Ok(tx)
    }

    /// Get a transaction by ID, failing when it does not exist
    pub fn require_transaction(&self, id: i64) -> Result<Transaction> {
        self.get_transaction(id)?
            .ok_or_else(|| Error::NotFound(format!("transaction {}", id)))
    }

    /// Newest transactions of a user
    pub fn list_transactions(&self, user_id: i64, limit: i64) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions WHERE user_id = ? ORDER BY date DESC, id DESC LIMIT ?",
            TRANSACTION_COLUMNS
        ))?;
        let txs = stmt
            .query_map(params![user_id, limit], row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(txs)
    }

    /// Transactions assigned to a cycle, consolidated statement row included
    pub fn list_cycle_transactions(&self, cycle_id: i64) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions WHERE cycle_id = ? ORDER BY date, id",
            TRANSACTION_COLUMNS
        ))?;
        let txs = stmt
            .query_map(params![cycle_id], row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(txs)
    }

    /// Count a user's transactions
    pub fn count_transactions(&self, user_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE user_id = ?",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Point a transaction at a cycle
    pub fn set_transaction_cycle(&self, id: i64, cycle_id: Option<i64>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE transactions SET cycle_id = ? WHERE id = ?",
            params![cycle_id, id],
        )?;
        Ok(())
    }

    /// Link a transaction to the first installment of its series
    pub fn set_transaction_parent(&self, id: i64, parent_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE transactions SET parent_id = ? WHERE id = ?",
            params![parent_id, id],
        )?;
        Ok(())
    }

    /// Move a transaction to another date
    pub fn set_transaction_date(&self, id: i64, date: NaiveDate) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE transactions SET date = ? WHERE id = ?",
            params![date.to_string(), id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("transaction {}", id)));
        }
        Ok(())
    }

    /// Overwrite a transaction amount
    pub fn set_transaction_amount(&self, id: i64, amount: Decimal) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE transactions SET amount = ? WHERE id = ?",
            params![money_to_sql(amount), id],
        )?;
        Ok(())
    }

    /// Store a recomputed fingerprint
    pub fn set_transaction_fingerprint(&self, id: i64, fingerprint: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE transactions SET fingerprint = ? WHERE id = ?",
            params![fingerprint, id],
        )?;
        Ok(())
    }

    /// The consolidated statement row of a cycle, if one exists
    pub fn find_statement_transaction(&self, cycle_id: i64) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let tx = conn
            .query_row(
                &format!(
                    "SELECT {} FROM transactions WHERE cycle_id = ? AND payment_method = ? ORDER BY id LIMIT 1",
                    TRANSACTION_COLUMNS
                ),
                params![cycle_id, PaymentMethod::CardStatement.as_str()],
                row_to_transaction,
            )
            .optional()?;
        Ok(tx)
    }

    /// Whether the user already has a transaction with this fingerprint
    pub fn fingerprint_exists(&self, user_id: i64, fingerprint: &str) -> Result<bool> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM transactions WHERE user_id = ? AND fingerprint = ?)",
            params![user_id, fingerprint],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// The user's transactions carrying this fingerprint
    pub fn find_by_fingerprint(&self, user_id: i64, fingerprint: &str) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions WHERE user_id = ? AND fingerprint = ? ORDER BY id",
            TRANSACTION_COLUMNS
        ))?;
        let txs = stmt
            .query_map(params![user_id, fingerprint], row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(txs)
    }

    /// Same-day, same-amount transactions, narrowed by external id when given
    pub fn find_similar_transactions(
        &self,
        user_id: i64,
        date: NaiveDate,
        amount: Decimal,
        external_id: Option<&str>,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let amount = money_to_sql(amount);
        let date = date.to_string();

        let txs = match external_id.filter(|e| !e.is_empty()) {
            Some(ext) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM transactions WHERE user_id = ? AND date = ? AND amount = ? AND external_id = ? ORDER BY id",
                    TRANSACTION_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![user_id, date, amount, ext], row_to_transaction)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM transactions WHERE user_id = ? AND date = ? AND amount = ? ORDER BY id",
                    TRANSACTION_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![user_id, date, amount], row_to_transaction)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(txs)
    }

    /// A page of transactions ordered by id, for bulk fingerprint maintenance
    pub fn transactions_after(
        &self,
        user_id: Option<i64>,
        only_missing_fingerprint: bool,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;

        let mut conditions = vec!["id > ?".to_string()];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(after_id)];

        if let Some(uid) = user_id {
            conditions.push("user_id = ?".to_string());
            params.push(Box::new(uid));
        }
        if only_missing_fingerprint {
            conditions.push("fingerprint IS NULL".to_string());
        }
        params.push(Box::new(limit));

        let sql = format!(
            "SELECT {} FROM transactions WHERE {} ORDER BY id LIMIT ?",
            TRANSACTION_COLUMNS,
            conditions.join(" AND ")
        );
        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let txs = stmt
            .query_map(param_refs.as_slice(), row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(txs)
    }
}
