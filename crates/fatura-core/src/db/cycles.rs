//! Statement cycle rows

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};
use rust_decimal::Decimal;

use super::{get_date, get_enum, get_money, money_to_sql, Database};
use crate::cycles::CycleBounds;
use crate::error::{Error, Result};
use crate::models::{Cycle, CycleStatus, PaymentMethod};

const CYCLE_COLUMNS: &str =
    "id, card_id, month, year, start_date, end_date, due_date, status, total";

fn row_to_cycle(row: &rusqlite::Row<'_>) -> rusqlite::Result<Cycle> {
    Ok(Cycle {
        id: row.get(0)?,
        card_id: row.get(1)?,
        month: row.get(2)?,
        year: row.get(3)?,
        start_date: get_date(row, 4)?,
        end_date: get_date(row, 5)?,
        due_date: get_date(row, 6)?,
        status: get_enum(row, 7)?,
        total: get_money(row, 8)?,
    })
}

impl Database {
    /// Look up the cycle for (card, month, year)
    pub fn find_cycle(&self, card_id: i64, month: u32, year: i32) -> Result<Option<Cycle>> {
        let conn = self.conn()?;
        let cycle = conn
            .query_row(
                &format!(
                    "SELECT {} FROM cycles WHERE card_id = ? AND month = ? AND year = ?",
                    CYCLE_COLUMNS
                ),
                params![card_id, month, year],
                row_to_cycle,
            )
            .optional()?;
        Ok(cycle)
    }

    /// Insert an open cycle unless (card, month, year) already exists.
    ///
    /// Returns the stored row and whether this call created it.
    pub fn insert_cycle(
        &self,
        card_id: i64,
        month: u32,
        year: i32,
        bounds: &CycleBounds,
    ) -> Result<(Cycle, bool)> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            r#"
            INSERT INTO cycles (card_id, month, year, start_date, end_date, due_date, status, total)
            VALUES (?, ?, ?, ?, ?, ?, 'open', '0.00')
            ON CONFLICT(card_id, month, year) DO NOTHING
            "#,
            params![
                card_id,
                month,
                year,
                bounds.start_date.to_string(),
                bounds.end_date.to_string(),
                bounds.due_date.to_string(),
            ],
        )?;
        drop(conn);

        let cycle = self.find_cycle(card_id, month, year)?.ok_or_else(|| {
            Error::NotFound(format!("cycle {}/{} for card {}", month, year, card_id))
        })?;
        Ok((cycle, inserted > 0))
    }

    /// Get a cycle by ID
    pub fn get_cycle(&self, id: i64) -> Result<Option<Cycle>> {
        let conn = self.conn()?;
        let cycle = conn
            .query_row(
                &format!("SELECT {} FROM cycles WHERE id = ?", CYCLE_COLUMNS),
                params![id],
                row_to_cycle,
            )
            .optional()?;
        Ok(cycle)
    }

    /// Get a cycle by ID, failing when it does not exist
    pub fn require_cycle(&self, id: i64) -> Result<Cycle> {
        self.get_cycle(id)?
            .ok_or_else(|| Error::NotFound(format!("cycle {}", id)))
    }

    /// All cycles of a card, oldest first
    pub fn list_cycles(&self, card_id: i64) -> Result<Vec<Cycle>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM cycles WHERE card_id = ? ORDER BY year, month",
            CYCLE_COLUMNS
        ))?;
        let cycles = stmt
            .query_map(params![card_id], row_to_cycle)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(cycles)
    }

    /// Cycles of a card in any of the given states, oldest first
    pub fn list_cycles_by_status(
        &self,
        card_id: i64,
        statuses: &[CycleStatus],
    ) -> Result<Vec<Cycle>> {
        let cycles = self.list_cycles(card_id)?;
        Ok(cycles
            .into_iter()
            .filter(|c| statuses.contains(&c.status))
            .collect())
    }

    /// Open cycles on any of the user's cards whose end date is on or before `date`
    pub fn list_open_cycles_ending_by(
        &self,
        user_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<Cycle>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT c.id, c.card_id, c.month, c.year, c.start_date, c.end_date, c.due_date, c.status, c.total
            FROM cycles c
            JOIN cards k ON k.id = c.card_id
            WHERE k.user_id = ? AND c.status = 'open' AND c.end_date <= ?
            ORDER BY c.end_date, c.id
            "#,
        )?;
        let cycles = stmt
            .query_map(params![user_id, date.to_string()], row_to_cycle)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(cycles)
    }

    /// Persist a cycle status
    pub fn set_cycle_status(&self, id: i64, status: CycleStatus) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE cycles SET status = ? WHERE id = ?",
            params![status.as_str(), id],
        )?;
        Ok(())
    }

    /// Persist a cycle total
    pub fn set_cycle_total(&self, id: i64, total: Decimal) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE cycles SET total = ? WHERE id = ?",
            params![money_to_sql(total), id],
        )?;
        Ok(())
    }

    /// Amounts of the purchases assigned to a cycle.
    ///
    /// The consolidated statement row points at the cycle too and is left out.
    pub fn cycle_amounts(&self, cycle_id: i64) -> Result<Vec<Decimal>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT amount FROM transactions
            WHERE cycle_id = ? AND (payment_method IS NULL OR payment_method != ?)
            "#,
        )?;
        let amounts = stmt
            .query_map(
                params![cycle_id, PaymentMethod::CardStatement.as_str()],
                |row| get_money(row, 0),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(amounts)
    }
}
