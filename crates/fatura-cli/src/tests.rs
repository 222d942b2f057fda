//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::fs;
use std::str::FromStr;

use chrono::NaiveDate;
use fatura_core::db::Database;
use fatura_core::models::{CycleStatus, FieldMapping, ImportStatus, NewCard};
use fatura_core::{Importer, LocalStorage, Settings};
use rust_decimal::Decimal;
use tempfile::TempDir;

use crate::commands::{self, truncate};

fn setup_test_db() -> Database {
    Database::in_memory().unwrap()
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn create_card(db: &Database) -> i64 {
    db.create_card(&NewCard {
        user_id: 1,
        name: "Nubank".into(),
        closing_day: 27,
        due_day: 5,
        credit_limit: Some(Decimal::from_str("1000.00").unwrap()),
    })
    .unwrap()
}

const CSV: &str = "Data;Descrição;Valor\n03/03/2025;Farmacia;-40,00\n04/03/2025;Cinema;-60,00\n";

// ========== Helper Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("exactly10!", 10), "exactly10!");
    assert_eq!(truncate("this is too long", 10), "this is...");
    // Multibyte characters are counted, not split
    assert_eq!(truncate("Padaria São José", 10), "Padaria...");
    assert_eq!(truncate("ação", 4), "ação");
}

#[test]
fn test_parse_date_arg() {
    assert_eq!(commands::parse_date_arg("2025-03-01").unwrap(), d(2025, 3, 1));
    assert!(commands::parse_date_arg("01/03/2025").is_err());
}

#[test]
fn test_parse_money_arg() {
    assert_eq!(
        commands::parse_money_arg(" 45.90 ").unwrap(),
        Decimal::from_str("45.90").unwrap()
    );
    assert!(commands::parse_money_arg("-1").is_err());
    assert!(commands::parse_money_arg("abc").is_err());
}

#[test]
fn test_load_mapping() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mapping.json");
    fs::write(&path, r#"{"mode": "columns", "date": 0, "description": 1, "amount": 2}"#).unwrap();

    match commands::load_mapping(&path).unwrap() {
        FieldMapping::Columns(cols) => {
            assert_eq!(cols.date, Some(0));
            assert_eq!(cols.amount, Some(2));
        }
        other => panic!("unexpected mapping {:?}", other),
    }

    fs::write(&path, "not json").unwrap();
    assert!(commands::load_mapping(&path).is_err());
    assert!(commands::load_mapping(&dir.path().join("missing.json")).is_err());
}

// ========== Account and Card Command Tests ==========

#[test]
fn test_cmd_accounts() {
    let db = setup_test_db();
    assert!(commands::cmd_accounts_list(&db, 1).is_ok());

    let id = commands::cmd_accounts_add(&db, 1, "  Conta Corrente ").unwrap();
    assert_eq!(commands::cmd_accounts_add(&db, 1, "Conta Corrente").unwrap(), id);
    assert!(commands::cmd_accounts_add(&db, 1, "   ").is_err());
    assert!(commands::cmd_accounts_list(&db, 1).is_ok());
}

#[test]
fn test_cmd_cards_add_and_deactivate() {
    let db = setup_test_db();
    commands::cmd_cards_add(&db, 1, "Inter", 10, 17, Some("2500")).unwrap();

    let cards = db.list_cards(1, false).unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].credit_limit, Some(Decimal::from_str("2500").unwrap()));

    commands::cmd_cards_set_active(&db, cards[0].id, false).unwrap();
    assert!(db.list_cards(1, false).unwrap().is_empty());
    assert!(commands::cmd_cards_list(&db, 1, true).is_ok());
}

#[test]
fn test_cmd_cards_add_invalid() {
    let db = setup_test_db();
    assert!(commands::cmd_cards_add(&db, 1, "Bad", 0, 5, None).is_err());
    assert!(commands::cmd_cards_add(&db, 1, "Bad", 5, 5, Some("lots")).is_err());
    assert!(db.list_cards(1, true).unwrap().is_empty());
}

// ========== Cycle Command Tests ==========

#[test]
fn test_cmd_cycles_flow() {
    let db = setup_test_db();
    let card_id = create_card(&db);

    commands::cmd_cycles_generate(&db, card_id, 2, d(2025, 3, 15)).unwrap();
    assert_eq!(db.list_cycles(card_id).unwrap().len(), 3);
    // Running again creates nothing new
    commands::cmd_cycles_generate(&db, card_id, 2, d(2025, 3, 15)).unwrap();
    assert_eq!(db.list_cycles(card_id).unwrap().len(), 3);

    commands::cmd_cycles_find(&db, card_id, d(2025, 3, 28)).unwrap();
    let april = db.find_cycle(card_id, 4, 2025).unwrap().unwrap();

    commands::cmd_cycles_close(&db, april.id).unwrap();
    commands::cmd_cycles_pay(&db, april.id).unwrap();
    assert_eq!(db.require_cycle(april.id).unwrap().status, CycleStatus::Paid);
    assert!(commands::cmd_cycles_close(&db, april.id).is_err());

    assert!(commands::cmd_cycles_list(&db, card_id, true).is_ok());
    assert!(commands::cmd_cycles_show(&db, april.id).is_ok());
    assert!(commands::cmd_cycles_limit(&db, card_id).is_ok());
    assert!(commands::cmd_cycles_list(&db, 999, false).is_err());
}

#[test]
fn test_cmd_cycles_sweep() {
    let db = setup_test_db();
    let card_id = create_card(&db);
    commands::cmd_cycles_generate(&db, card_id, 0, d(2025, 3, 15)).unwrap();

    commands::cmd_cycles_sweep(&db, 1, d(2025, 3, 1)).unwrap();
    let march = db.find_cycle(card_id, 3, 2025).unwrap().unwrap();
    assert_eq!(march.status, CycleStatus::Closed);
}

// ========== Import Command Tests ==========

#[test]
fn test_cmd_import_workflow() {
    let dir = TempDir::new().unwrap();
    let db = setup_test_db();
    let card_id = create_card(&db);
    let storage = LocalStorage::new(dir.path().join("blobs")).unwrap();
    let importer = Importer::new(&db, &storage).with_limits(Settings::default().import);

    let file = dir.path().join("fatura-marco.csv");
    fs::write(&file, CSV).unwrap();

    let batch_id = commands::cmd_import_upload(&importer, 1, &file, None, Some(card_id)).unwrap();
    commands::cmd_import_suggest(&importer, batch_id, true).unwrap();
    assert!(db.require_import_batch(batch_id).unwrap().mapping.is_some());

    commands::cmd_import_preview(&importer, batch_id, None, false).unwrap();
    commands::cmd_import_preview(&importer, batch_id, None, true).unwrap();
    commands::cmd_import_process(&importer, batch_id, Some(&[1][..]), None).unwrap();

    let batch = db.require_import_batch(batch_id).unwrap();
    assert_eq!(batch.status, ImportStatus::Completed);
    assert_eq!(batch.imported_items, 1);

    let cycle = db.find_cycle(card_id, 3, 2025).unwrap().unwrap();
    assert_eq!(cycle.total, Decimal::from_str("60.00").unwrap());

    assert!(commands::cmd_import_list(&db, 1, 10).is_ok());
    assert!(commands::cmd_import_items(&db, batch_id).is_ok());
    assert!(commands::cmd_transactions_list(&db, 1, 10).is_ok());
}

#[test]
fn test_cmd_import_upload_rejects_unknown_extension() {
    let dir = TempDir::new().unwrap();
    let db = setup_test_db();
    let storage = LocalStorage::new(dir.path()).unwrap();
    let importer = Importer::new(&db, &storage);

    let file = dir.path().join("statement.pdf");
    fs::write(&file, "%PDF-1.4").unwrap();
    assert!(commands::cmd_import_upload(&importer, 1, &file, None, None).is_err());
    assert!(db.list_import_batches(1, 10).unwrap().is_empty());
}

// ========== Dedupe Command Tests ==========

#[test]
fn test_cmd_dedupe() {
    let dir = TempDir::new().unwrap();
    let db = setup_test_db();
    let storage = LocalStorage::new(dir.path()).unwrap();
    let importer = Importer::new(&db, &storage);

    let batch = importer
        .create_batch(1, "extrato.csv", CSV.as_bytes(), None, None)
        .unwrap();
    importer.process(batch.id, None, None).unwrap();

    let amount = Decimal::from_str("40.00").unwrap();
    assert!(commands::cmd_dedupe_check(&db, 1, d(2025, 3, 3), amount, "Farmacia", None).unwrap());
    assert!(!commands::cmd_dedupe_check(&db, 1, d(2025, 3, 3), amount, "Outra loja", None).unwrap());
    assert!(!commands::cmd_dedupe_check(&db, 2, d(2025, 3, 3), amount, "Farmacia", None).unwrap());

    assert_eq!(commands::cmd_dedupe_rehash(&db, Some(1), false).unwrap(), 0);
    assert_eq!(commands::cmd_dedupe_rehash(&db, None, true).unwrap(), 0);
}

// ========== Status Command Tests ==========

#[test]
fn test_cmd_status_on_missing_database() {
    let dir = TempDir::new().unwrap();
    let settings = Settings::default();
    let result = commands::cmd_status(&dir.path().join("missing.db"), 1, true, &settings);
    assert!(result.is_ok());
}

#[test]
fn test_cmd_init_unencrypted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fatura.db");
    commands::cmd_init(&path, true).unwrap();
    assert!(path.exists());

    let db = commands::open_db(&path, true).unwrap();
    assert_eq!(db.count_transactions(1).unwrap(), 0);
}
