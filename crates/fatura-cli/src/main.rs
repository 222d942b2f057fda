//! Fatura CLI - Credit card statements and bank imports
//!
//! Usage:
//!   fatura init                              Initialize database
//!   fatura cards add Nubank --closing-day 27 --due-day 5
//!   fatura import upload extrato.ofx         Store a statement and create a batch
//!   fatura import process 1                  Turn the batch into transactions
//!   fatura cycles sweep                      Close cycles whose period has ended

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use fatura_core::Importer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let settings = commands::load_settings(cli.config.as_deref())?;
    let user = cli.user;

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Status => commands::cmd_status(&cli.db, user, cli.no_encrypt, &settings),
        Commands::Accounts { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(AccountsAction::List) => commands::cmd_accounts_list(&db, user),
                Some(AccountsAction::Add { name }) => {
                    commands::cmd_accounts_add(&db, user, &name).map(|_| ())
                }
            }
        }
        Commands::Cards { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_cards_list(&db, user, false),
                Some(CardsAction::List { all }) => commands::cmd_cards_list(&db, user, all),
                Some(CardsAction::Add {
                    name,
                    closing_day,
                    due_day,
                    limit,
                }) => commands::cmd_cards_add(
                    &db,
                    user,
                    &name,
                    closing_day,
                    due_day,
                    limit.as_deref(),
                ),
                Some(CardsAction::Deactivate { id }) => commands::cmd_cards_set_active(&db, id, false),
                Some(CardsAction::Activate { id }) => commands::cmd_cards_set_active(&db, id, true),
            }
        }
        Commands::Cycles { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                CyclesAction::List { card, pending } => commands::cmd_cycles_list(&db, card, pending),
                CyclesAction::Find { card, date } => {
                    let date = commands::parse_date_arg(&date)?;
                    commands::cmd_cycles_find(&db, card, date)
                }
                CyclesAction::Generate { card, months } => commands::cmd_cycles_generate(
                    &db,
                    card,
                    months.unwrap_or(settings.cycles.months_ahead),
                    commands::today(),
                ),
                CyclesAction::Close { id } => commands::cmd_cycles_close(&db, id),
                CyclesAction::Pay { id } => commands::cmd_cycles_pay(&db, id),
                CyclesAction::Sweep { today } => {
                    let today = match today {
                        Some(s) => commands::parse_date_arg(&s)?,
                        None => commands::today(),
                    };
                    commands::cmd_cycles_sweep(&db, user, today)
                }
                CyclesAction::Show { id } => commands::cmd_cycles_show(&db, id),
                CyclesAction::Limit { card } => commands::cmd_cycles_limit(&db, card),
                CyclesAction::Move {
                    card,
                    transaction,
                    date,
                } => {
                    let date = commands::parse_date_arg(&date)?;
                    commands::cmd_cycles_move(&db, card, transaction, date)
                }
            }
        }
        Commands::Import { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let storage = commands::open_storage(&settings)?;
            let importer = Importer::new(&db, &storage).with_limits(settings.import.clone());
            match action {
                ImportAction::Upload {
                    file,
                    account,
                    card,
                } => commands::cmd_import_upload(&importer, user, &file, account, card).map(|_| ()),
                ImportAction::Suggest { batch, save } => {
                    commands::cmd_import_suggest(&importer, batch, save)
                }
                ImportAction::Preview {
                    batch,
                    mapping,
                    json,
                } => {
                    let mapping = mapping.as_deref().map(commands::load_mapping).transpose()?;
                    commands::cmd_import_preview(&importer, batch, mapping.as_ref(), json)
                }
                ImportAction::Process {
                    batch,
                    select,
                    mapping,
                } => {
                    let mapping = mapping.as_deref().map(commands::load_mapping).transpose()?;
                    let selected = (!select.is_empty()).then_some(select.as_slice());
                    commands::cmd_import_process(&importer, batch, selected, mapping.as_ref())
                }
                ImportAction::List { limit } => commands::cmd_import_list(&db, user, limit),
                ImportAction::Items { batch } => commands::cmd_import_items(&db, batch),
            }
        }
        Commands::Transactions { limit } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_transactions_list(&db, user, limit)
        }
        Commands::Dedupe { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                DedupeAction::Rehash {
                    all_users,
                    only_missing,
                } => {
                    let scope = if all_users { None } else { Some(user) };
                    commands::cmd_dedupe_rehash(&db, scope, only_missing).map(|_| ())
                }
                DedupeAction::Check {
                    date,
                    amount,
                    description,
                    external_id,
                } => {
                    let date = commands::parse_date_arg(&date)?;
                    let amount = commands::parse_money_arg(&amount)?;
                    commands::cmd_dedupe_check(
                        &db,
                        user,
                        date,
                        amount,
                        &description,
                        external_id.as_deref(),
                    )
                    .map(|_| ())
                }
            }
        }
    }
}
