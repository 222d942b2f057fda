//! Statement cycle command implementations

use anyhow::Result;
use chrono::NaiveDate;
use fatura_core::{
    db::Database,
    models::{Cycle, CycleStatus, PaymentMethod},
    CycleEngine,
};

use super::truncate;

fn status_icon(status: CycleStatus) -> &'static str {
    match status {
        CycleStatus::Open => "🟢",
        CycleStatus::Closed => "🔒",
        CycleStatus::Paid => "✅",
    }
}

fn print_cycle(cycle: &Cycle) {
    println!(
        "   {} [{}] {:02}/{} │ {} → {} │ due {} │ {:>10.2} │ {}",
        status_icon(cycle.status),
        cycle.id,
        cycle.month,
        cycle.year,
        cycle.start_date,
        cycle.end_date,
        cycle.due_date,
        cycle.total,
        cycle.status
    );
}

pub fn cmd_cycles_list(db: &Database, card_id: i64, pending_only: bool) -> Result<()> {
    let card = db.require_card(card_id)?;
    let cycles = if pending_only {
        CycleEngine::new(db).pending_cycles(card.id)?
    } else {
        db.list_cycles(card.id)?
    };

    if cycles.is_empty() {
        println!("No cycles for card '{}' yet.", card.name);
        return Ok(());
    }

    println!();
    println!("🗓️  Cycles of {}", card.name);
    println!("   ─────────────────────────────────────────────────────────────");
    for cycle in &cycles {
        print_cycle(cycle);
    }

    Ok(())
}

pub fn cmd_cycles_find(db: &Database, card_id: i64, date: NaiveDate) -> Result<()> {
    let card = db.require_card(card_id)?;
    let cycle = CycleEngine::new(db).cycle_for_date(&card, date)?;

    println!("A purchase on {} belongs to:", date);
    print_cycle(&cycle);
    Ok(())
}

pub fn cmd_cycles_generate(db: &Database, card_id: i64, months_ahead: u32, today: NaiveDate) -> Result<()> {
    let card = db.require_card(card_id)?;
    let created = CycleEngine::new(db).generate_future_cycles(&card, months_ahead, today)?;

    if created.is_empty() {
        println!("✅ All cycles up to {} months ahead already exist", months_ahead);
        return Ok(());
    }

    println!("✅ Created {} cycle(s) for {}", created.len(), card.name);
    for cycle in &created {
        print_cycle(cycle);
    }
    Ok(())
}

pub fn cmd_cycles_close(db: &Database, id: i64) -> Result<()> {
    let cycle = CycleEngine::new(db).close_cycle(id)?;
    println!(
        "🔒 Closed cycle {:02}/{} with total {:.2}",
        cycle.month, cycle.year, cycle.total
    );
    if let Some(statement) = db.find_statement_transaction(cycle.id)? {
        println!(
            "   Statement transaction [{}] due {}",
            statement.id, statement.date
        );
    }
    Ok(())
}

pub fn cmd_cycles_pay(db: &Database, id: i64) -> Result<()> {
    let cycle = CycleEngine::new(db).pay_cycle(id)?;
    println!(
        "✅ Cycle {:02}/{} marked paid ({:.2})",
        cycle.month, cycle.year, cycle.total
    );
    Ok(())
}

pub fn cmd_cycles_sweep(db: &Database, user_id: i64, today: NaiveDate) -> Result<()> {
    let closed = CycleEngine::new(db).sweep_auto_close(user_id, today)?;
    if closed == 0 {
        println!("✅ No cycles to close as of {}", today);
    } else {
        println!("🔒 Closed {} cycle(s) ending before {}", closed, today);
    }
    Ok(())
}

pub fn cmd_cycles_show(db: &Database, id: i64) -> Result<()> {
    let cycle = db.require_cycle(id)?;
    let transactions = db.list_cycle_transactions(id)?;

    println!();
    print_cycle(&cycle);
    println!("   ─────────────────────────────────────────────────────────────");

    if transactions.is_empty() {
        println!("   (no transactions)");
        return Ok(());
    }

    for tx in transactions {
        let marker = if tx.payment_method == Some(PaymentMethod::CardStatement) {
            "Σ"
        } else {
            " "
        };
        let installment = match (tx.installment_current, tx.installment_total) {
            (Some(current), Some(total)) => format!(" ({}/{})", current, total),
            _ => String::new(),
        };
        println!(
            "   {} [{}] {} │ {:>10.2} │ {}{}",
            marker,
            tx.id,
            tx.date,
            tx.amount,
            truncate(tx.display_description(), 36),
            installment
        );
    }

    Ok(())
}

pub fn cmd_cycles_limit(db: &Database, card_id: i64) -> Result<()> {
    let card = db.require_card(card_id)?;
    match CycleEngine::new(db).available_limit(&card)? {
        Some(available) => println!("💳 {}: {:.2} available", card.name, available),
        None => println!("💳 {} has no credit limit set", card.name),
    }
    Ok(())
}

pub fn cmd_cycles_move(db: &Database, card_id: i64, transaction_id: i64, date: NaiveDate) -> Result<()> {
    let card = db.require_card(card_id)?;
    let cycle = CycleEngine::new(db).reschedule_transaction(&card, transaction_id, date)?;
    println!(
        "✅ Transaction {} moved to {} (cycle {:02}/{})",
        transaction_id, date, cycle.month, cycle.year
    );
    Ok(())
}
