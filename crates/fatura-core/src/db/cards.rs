//! Credit card operations

use rusqlite::{params, OptionalExtension};

use super::{get_money_opt, money_to_sql, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Card, NewCard};

const CARD_COLUMNS: &str =
    "id, user_id, name, closing_day, due_day, credit_limit, active, created_at";

fn row_to_card(row: &rusqlite::Row<'_>) -> rusqlite::Result<Card> {
    let created_at_str: String = row.get(7)?;
    Ok(Card {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        closing_day: row.get(3)?,
        due_day: row.get(4)?,
        credit_limit: get_money_opt(row, 5)?,
        active: row.get(6)?,
        created_at: parse_datetime(&created_at_str),
    })
}

impl Database {
    /// Create a card
    pub fn create_card(&self, card: &NewCard) -> Result<i64> {
        card.validate()?;
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO cards (user_id, name, closing_day, due_day, credit_limit) VALUES (?, ?, ?, ?, ?)",
            params![
                card.user_id,
                card.name.trim(),
                card.closing_day,
                card.due_day,
                card.credit_limit.map(money_to_sql),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Get a card by ID
    pub fn get_card(&self, id: i64) -> Result<Option<Card>> {
        let conn = self.conn()?;
        let card = conn
            .query_row(
                &format!("SELECT {} FROM cards WHERE id = ?", CARD_COLUMNS),
                params![id],
                row_to_card,
            )
            .optional()?;

        Ok(card)
    }

    /// Get a card by ID, failing when it does not exist
    pub fn require_card(&self, id: i64) -> Result<Card> {
        self.get_card(id)?
            .ok_or_else(|| Error::NotFound(format!("card {}", id)))
    }

    /// List a user's cards
    pub fn list_cards(&self, user_id: i64, include_inactive: bool) -> Result<Vec<Card>> {
        let conn = self.conn()?;
        let sql = if include_inactive {
            format!(
                "SELECT {} FROM cards WHERE user_id = ? ORDER BY name",
                CARD_COLUMNS
            )
        } else {
            format!(
                "SELECT {} FROM cards WHERE user_id = ? AND active = 1 ORDER BY name",
                CARD_COLUMNS
            )
        };
        let mut stmt = conn.prepare(&sql)?;

        let cards = stmt
            .query_map(params![user_id], row_to_card)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(cards)
    }

    /// Activate or deactivate a card
    pub fn set_card_active(&self, id: i64, active: bool) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE cards SET active = ? WHERE id = ?",
            params![active, id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("card {}", id)));
        }
        Ok(())
    }
}
