//! Credit card statement cycles
//!
//! A cycle is identified by (card, month, year). A purchase dated on or
//! before the card's closing day belongs to the cycle of its own month,
//! otherwise to the next month's. Cycles move `open -> closed -> paid` and
//! never back.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{
    Card, Cycle, CycleStatus, NewTransaction, PaymentMethod, TransactionType,
};

/// Date range and due date of one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleBounds {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub due_date: NaiveDate,
}

/// Number of days in a calendar month
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_month, next_year) = next_month(month, year);
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

fn prev_month(month: u32, year: i32) -> (u32, i32) {
    if month <= 1 {
        (12, year - 1)
    } else {
        (month - 1, year)
    }
}

fn next_month(month: u32, year: i32) -> (u32, i32) {
    if month >= 12 {
        (1, year + 1)
    } else {
        (month + 1, year)
    }
}

/// (month, year) shifted forward by `months` calendar months
pub fn shift_month(month: u32, year: i32, months: u32) -> (u32, i32) {
    let index = year as i64 * 12 + (month as i64 - 1) + months as i64;
    ((index.rem_euclid(12) + 1) as u32, index.div_euclid(12) as i32)
}

fn ymd_clamped(year: i32, month: u32, day: u32) -> Result<NaiveDate> {
    let day = day.min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| Error::InvalidData(format!("invalid date {}-{}-{}", year, month, day)))
}

/// Boundaries of the cycle referenced by (month, year).
///
/// Start and end are both taken from the month before the reference month:
/// start is the day after the closing day, end is the closing day itself.
/// The due date falls in the reference month. Days are clamped to the
/// month's length.
pub fn cycle_bounds(closing_day: u32, due_day: u32, month: u32, year: i32) -> Result<CycleBounds> {
    if !(1..=12).contains(&month) {
        return Err(Error::InvalidData(format!("invalid month {}", month)));
    }

    let (start_month, start_year) = prev_month(month, year);
    let start_date = ymd_clamped(start_year, start_month, closing_day + 1)?;

    let (closing_month, closing_year) = prev_month(month, year);
    let end_date = ymd_clamped(closing_year, closing_month, closing_day)?;

    let due_date = ymd_clamped(year, month, due_day)?;

    Ok(CycleBounds {
        start_date,
        end_date,
        due_date,
    })
}

/// Reference (month, year) of the cycle a date belongs to
pub fn reference_month(closing_day: u32, date: NaiveDate) -> (u32, i32) {
    if date.day() <= closing_day {
        (date.month(), date.year())
    } else {
        next_month(date.month(), date.year())
    }
}

/// English month name, for statement descriptions
fn month_name(month: u32) -> String {
    NaiveDate::from_ymd_opt(2000, month, 1)
        .map(|d| d.format("%B").to_string())
        .unwrap_or_default()
}

/// Cycle operations over a database
pub struct CycleEngine<'a> {
    db: &'a Database,
}

impl<'a> CycleEngine<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Find or create the cycle a date belongs to
    pub fn cycle_for_date(&self, card: &Card, date: NaiveDate) -> Result<Cycle> {
        let (month, year) = reference_month(card.closing_day, date);

        if let Some(cycle) = self.db.find_cycle(card.id, month, year)? {
            return Ok(cycle);
        }
        self.generate_cycle(card, month, year)
    }

    /// Create the open cycle for (month, year) unless it already exists
    pub fn generate_cycle(&self, card: &Card, month: u32, year: i32) -> Result<Cycle> {
        let bounds = cycle_bounds(card.closing_day, card.due_day, month, year)?;
        let (cycle, created) = self.db.insert_cycle(card.id, month, year, &bounds)?;
        if created {
            info!(
                card_id = card.id,
                month,
                year,
                start = %bounds.start_date,
                end = %bounds.end_date,
                due = %bounds.due_date,
                "Created statement cycle"
            );
        }
        Ok(cycle)
    }

    /// Re-sum the purchases assigned to a cycle and persist the total.
    ///
    /// Paid cycles are frozen and keep their stored total.
    pub fn recalculate_total(&self, cycle_id: i64) -> Result<Decimal> {
        let cycle = self.db.require_cycle(cycle_id)?;
        if cycle.status == CycleStatus::Paid {
            return Ok(cycle.total);
        }

        let total: Decimal = self.db.cycle_amounts(cycle_id)?.into_iter().sum();
        self.db.set_cycle_total(cycle_id, total)?;
        debug!(cycle_id, total = %total, "Recalculated cycle total");
        Ok(total)
    }

    /// Close a cycle and upsert its consolidated statement transaction.
    ///
    /// Closing an already closed cycle refreshes the statement amount.
    pub fn close_cycle(&self, cycle_id: i64) -> Result<Cycle> {
        let cycle = self.db.require_cycle(cycle_id)?;
        if cycle.status == CycleStatus::Paid {
            return Err(Error::InvalidTransition(format!(
                "cycle {} is paid and cannot be closed again",
                cycle_id
            )));
        }

        let total = self.recalculate_total(cycle_id)?;
        self.db.set_cycle_status(cycle_id, CycleStatus::Closed)?;

        if total > Decimal::ZERO {
            let card = self.db.require_card(cycle.card_id)?;
            self.upsert_statement_transaction(&card, &cycle, total)?;
        }

        info!(cycle_id, total = %total, "Closed statement cycle");
        self.db.require_cycle(cycle_id)
    }

    fn upsert_statement_transaction(&self, card: &Card, cycle: &Cycle, total: Decimal) -> Result<i64> {
        if let Some(existing) = self.db.find_statement_transaction(cycle.id)? {
            self.db.set_transaction_amount(existing.id, total)?;
            return Ok(existing.id);
        }

        let description = format!(
            "Statement {} - {}/{}",
            card.name,
            month_name(cycle.month),
            cycle.year
        );
        let mut tx = NewTransaction::new(
            card.user_id,
            cycle.due_date,
            description,
            total,
            TransactionType::Expense,
        );
        tx.cycle_id = Some(cycle.id);
        tx.payment_method = Some(PaymentMethod::CardStatement);

        self.db.insert_transaction(&tx)
    }

    /// Mark a cycle paid, closing it first when still open.
    ///
    /// Paying an already paid cycle changes nothing.
    pub fn pay_cycle(&self, cycle_id: i64) -> Result<Cycle> {
        let cycle = self.db.require_cycle(cycle_id)?;
        match cycle.status {
            CycleStatus::Paid => return Ok(cycle),
            CycleStatus::Open => {
                self.close_cycle(cycle_id)?;
            }
            CycleStatus::Closed => {}
        }

        self.db.set_cycle_status(cycle_id, CycleStatus::Paid)?;
        info!(cycle_id, "Paid statement cycle");
        self.db.require_cycle(cycle_id)
    }

    /// Close every open cycle of the user's cards whose end date has been reached by `today`
    pub fn sweep_auto_close(&self, user_id: i64, today: NaiveDate) -> Result<usize> {
        let due = self.db.list_open_cycles_ending_by(user_id, today)?;
        for cycle in &due {
            self.close_cycle(cycle.id)?;
        }
        if !due.is_empty() {
            info!(user_id, closed = due.len(), "Auto-closed statement cycles");
        }
        Ok(due.len())
    }

    /// Point a card transaction at its cycle and refresh that cycle's total
    pub fn assign_transaction(&self, card: &Card, transaction_id: i64) -> Result<Cycle> {
        let tx = self.db.require_transaction(transaction_id)?;
        let cycle = self.cycle_for_date(card, tx.date)?;

        self.db.set_transaction_cycle(transaction_id, Some(cycle.id))?;
        self.recalculate_total(cycle.id)?;

        self.db.require_cycle(cycle.id)
    }

    /// Ensure cycles exist for the month of `today` and the next `months_ahead` months.
    ///
    /// Returns the cycles created by this call.
    pub fn generate_future_cycles(
        &self,
        card: &Card,
        months_ahead: u32,
        today: NaiveDate,
    ) -> Result<Vec<Cycle>> {
        let mut created = Vec::new();
        for i in 0..=months_ahead {
            let (month, year) = shift_month(today.month(), today.year(), i);
            if self.db.find_cycle(card.id, month, year)?.is_some() {
                continue;
            }
            created.push(self.generate_cycle(card, month, year)?);
        }
        Ok(created)
    }

    /// Open and closed cycles of a card, oldest first
    pub fn pending_cycles(&self, card_id: i64) -> Result<Vec<Cycle>> {
        self.db
            .list_cycles_by_status(card_id, &[CycleStatus::Open, CycleStatus::Closed])
    }

    /// Credit limit minus the totals of open cycles; `None` without a limit
    pub fn available_limit(&self, card: &Card) -> Result<Option<Decimal>> {
        let Some(limit) = card.credit_limit else {
            return Ok(None);
        };
        let used: Decimal = self
            .db
            .list_cycles_by_status(card.id, &[CycleStatus::Open])?
            .iter()
            .map(|c| c.total)
            .sum();
        Ok(Some(limit - used))
    }

    /// Move a card transaction to a new date, re-assigning its cycle and
    /// refreshing both the old and the new cycle totals
    pub fn reschedule_transaction(
        &self,
        card: &Card,
        transaction_id: i64,
        new_date: NaiveDate,
    ) -> Result<Cycle> {
        let tx = self.db.require_transaction(transaction_id)?;
        if tx.card_id != Some(card.id) {
            return Err(Error::InvalidData(format!(
                "transaction {} does not belong to card {}",
                transaction_id, card.id
            )));
        }

        self.db.set_transaction_date(transaction_id, new_date)?;
        let cycle = self.assign_transaction(card, transaction_id)?;

        if let Some(old) = tx.cycle_id.filter(|old| *old != cycle.id) {
            self.recalculate_total(old)?;
        }
        Ok(cycle)
    }
}
