//! Card command implementations

use anyhow::Result;
use fatura_core::{db::Database, models::NewCard};

use super::{parse_money_arg, truncate};

pub fn cmd_cards_list(db: &Database, user_id: i64, include_inactive: bool) -> Result<()> {
    let cards = db.list_cards(user_id, include_inactive)?;

    if cards.is_empty() {
        println!("No cards found. Add one with:");
        println!("  fatura cards add Nubank --closing-day 27 --due-day 5");
        return Ok(());
    }

    println!();
    println!("💳 Cards");
    println!("   ─────────────────────────────────────────────────────────────");

    for card in cards {
        let limit = card
            .credit_limit
            .map(|l| format!("{:.2}", l))
            .unwrap_or_else(|| "-".to_string());
        let state = if card.active { "" } else { " (inactive)" };
        println!(
            "   [{}] {:<24} │ closes {:>2} │ due {:>2} │ limit {:>10}{}",
            card.id,
            truncate(&card.name, 24),
            card.closing_day,
            card.due_day,
            limit,
            state
        );
    }

    Ok(())
}

pub fn cmd_cards_add(
    db: &Database,
    user_id: i64,
    name: &str,
    closing_day: u32,
    due_day: u32,
    limit: Option<&str>,
) -> Result<()> {
    let credit_limit = limit.map(parse_money_arg).transpose()?;

    let id = db.create_card(&NewCard {
        user_id,
        name: name.to_string(),
        closing_day,
        due_day,
        credit_limit,
    })?;

    println!(
        "✅ Added card '{}' (ID: {}), closing day {}, due day {}",
        name, id, closing_day, due_day
    );
    Ok(())
}

pub fn cmd_cards_set_active(db: &Database, id: i64, active: bool) -> Result<()> {
    db.set_card_active(id, active)?;
    if active {
        println!("✅ Card {} reactivated", id);
    } else {
        println!("✅ Card {} deactivated", id);
    }
    Ok(())
}
