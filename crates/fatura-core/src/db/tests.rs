//! Database tests

use super::*;
use crate::models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycles::cycle_bounds;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn new_card(db: &Database, user_id: i64) -> i64 {
        db.create_card(&NewCard {
            user_id,
            name: "Itaú Platinum".into(),
            closing_day: 27,
            due_day: 5,
            credit_limit: Some(dec("2500.00")),
        })
        .unwrap()
    }

    fn record(description: &str, amount: &str) -> ParsedRecord {
        ParsedRecord {
            date: d(2025, 1, 15),
            description: description.into(),
            amount: dec(amount),
            kind: TransactionType::Expense,
            external_id: None,
        }
    }

    #[test]
    fn test_in_memory_db() {
        let db = Database::in_memory().unwrap();
        assert!(db.list_accounts(1).unwrap().is_empty());
        assert!(db.list_cards(1, true).unwrap().is_empty());
        assert_eq!(db.count_transactions(1).unwrap(), 0);
    }

    #[test]
    fn test_schema_tables_exist() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn().unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
                 ('accounts', 'cards', 'cycles', 'transactions', 'import_batches', 'import_items')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 6);
    }

    #[test]
    fn test_account_upsert_is_per_user() {
        let db = Database::in_memory().unwrap();

        let id = db.upsert_account(1, "Conta Corrente").unwrap();
        assert!(id > 0);
        assert_eq!(db.upsert_account(1, "Conta Corrente").unwrap(), id);

        let other = db.upsert_account(2, "Conta Corrente").unwrap();
        assert_ne!(other, id);

        let accounts = db.list_accounts(1).unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].name, "Conta Corrente");
        assert_eq!(db.get_account(other).unwrap().unwrap().user_id, 2);
    }

    #[test]
    fn test_card_crud() {
        let db = Database::in_memory().unwrap();
        let id = new_card(&db, 1);

        let card = db.require_card(id).unwrap();
        assert_eq!(card.name, "Itaú Platinum");
        assert_eq!(card.closing_day, 27);
        assert_eq!(card.credit_limit, Some(dec("2500.00")));
        assert!(card.active);

        db.set_card_active(id, false).unwrap();
        assert!(db.list_cards(1, false).unwrap().is_empty());
        assert_eq!(db.list_cards(1, true).unwrap().len(), 1);

        assert!(matches!(db.require_card(999), Err(Error::NotFound(_))));
        assert!(matches!(db.set_card_active(999, true), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_card_validation() {
        let db = Database::in_memory().unwrap();
        let bad_day = NewCard {
            user_id: 1,
            name: "Bad".into(),
            closing_day: 32,
            due_day: 5,
            credit_limit: None,
        };
        assert!(matches!(db.create_card(&bad_day), Err(Error::InvalidData(_))));

        let blank = NewCard {
            name: "   ".into(),
            closing_day: 10,
            ..bad_day
        };
        assert!(db.create_card(&blank).is_err());
    }

    #[test]
    fn test_insert_cycle_ignores_conflicts() {
        let db = Database::in_memory().unwrap();
        let card_id = new_card(&db, 1);
        let bounds = cycle_bounds(27, 5, 3, 2025).unwrap();

        let (first, created) = db.insert_cycle(card_id, 3, 2025, &bounds).unwrap();
        assert!(created);
        assert_eq!(first.status, CycleStatus::Open);
        assert_eq!(first.total, Decimal::ZERO);
        assert_eq!(first.due_date, d(2025, 3, 5));

        let (second, created) = db.insert_cycle(card_id, 3, 2025, &bounds).unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(db.list_cycles(card_id).unwrap().len(), 1);
    }

    #[test]
    fn test_cycle_status_and_total() {
        let db = Database::in_memory().unwrap();
        let card_id = new_card(&db, 1);
        let (cycle, _) = db
            .insert_cycle(card_id, 1, 2025, &cycle_bounds(27, 5, 1, 2025).unwrap())
            .unwrap();

        db.set_cycle_total(cycle.id, dec("10.005")).unwrap();
        db.set_cycle_status(cycle.id, CycleStatus::Closed).unwrap();

        let stored = db.require_cycle(cycle.id).unwrap();
        assert_eq!(stored.total, dec("10.01"));
        assert_eq!(stored.status, CycleStatus::Closed);
        assert!(db
            .list_cycles_by_status(card_id, &[CycleStatus::Open])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_open_cycles_ending_by_is_scoped_to_user() {
        let db = Database::in_memory().unwrap();
        let mine = new_card(&db, 1);
        let theirs = new_card(&db, 2);
        let bounds = cycle_bounds(27, 5, 2, 2025).unwrap();
        db.insert_cycle(mine, 2, 2025, &bounds).unwrap();
        db.insert_cycle(theirs, 2, 2025, &bounds).unwrap();

        let due = db.list_open_cycles_ending_by(1, d(2025, 2, 1)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].card_id, mine);
        // The end date itself counts, the day before does not
        assert_eq!(db.list_open_cycles_ending_by(1, bounds.end_date).unwrap().len(), 1);
        assert!(db
            .list_open_cycles_ending_by(1, bounds.end_date.pred_opt().unwrap())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_transaction_roundtrip() {
        let db = Database::in_memory().unwrap();
        let account_id = db.upsert_account(1, "Conta").unwrap();

        let mut tx = NewTransaction::new(
            1,
            d(2025, 2, 3),
            "  PADARIA   CENTRAL ",
            dec("12.5"),
            TransactionType::Expense,
        );
        tx.account_id = Some(account_id);
        tx.payment_method = Some(PaymentMethod::Pix);
        tx.external_id = Some("ABC".into());
        tx.fingerprint = Some("fp-1".into());

        let id = db.insert_transaction(&tx).unwrap();
        let stored = db.require_transaction(id).unwrap();
        assert_eq!(stored.amount, dec("12.50"));
        assert_eq!(stored.date, d(2025, 2, 3));
        assert_eq!(stored.description_original, "  PADARIA   CENTRAL ");
        assert_eq!(stored.display_description(), "  PADARIA   CENTRAL ");
        assert_eq!(stored.payment_method, Some(PaymentMethod::Pix));
        assert_eq!(stored.account_id, Some(account_id));
        assert!(!stored.is_installment);

        assert!(db.fingerprint_exists(1, "fp-1").unwrap());
        assert!(!db.fingerprint_exists(2, "fp-1").unwrap());
        assert_eq!(db.find_by_fingerprint(1, "fp-1").unwrap().len(), 1);
    }

    #[test]
    fn test_transaction_validation() {
        let db = Database::in_memory().unwrap();

        let negative = NewTransaction::new(1, d(2025, 1, 1), "x", dec("-1"), TransactionType::Expense);
        assert!(matches!(db.insert_transaction(&negative), Err(Error::InvalidData(_))));

        let mut bad_installment =
            NewTransaction::new(1, d(2025, 1, 1), "x", dec("1"), TransactionType::Expense);
        bad_installment.installment_current = Some(5);
        bad_installment.installment_total = Some(4);
        assert!(db.insert_transaction(&bad_installment).is_err());

        assert_eq!(db.count_transactions(1).unwrap(), 0);
    }

    #[test]
    fn test_transaction_updates() {
        let db = Database::in_memory().unwrap();
        let id = db
            .insert_transaction(&NewTransaction::new(
                1,
                d(2025, 1, 1),
                "Mercado",
                dec("30.00"),
                TransactionType::Expense,
            ))
            .unwrap();

        db.set_transaction_date(id, d(2025, 1, 9)).unwrap();
        db.set_transaction_amount(id, dec("31.999")).unwrap();
        db.set_transaction_fingerprint(id, "abc").unwrap();
        db.set_transaction_parent(id, id).unwrap();

        let stored = db.require_transaction(id).unwrap();
        assert_eq!(stored.date, d(2025, 1, 9));
        assert_eq!(stored.amount, dec("32.00"));
        assert_eq!(stored.fingerprint.as_deref(), Some("abc"));
        assert_eq!(stored.parent_id, Some(id));

        assert!(matches!(
            db.set_transaction_date(999, d(2025, 1, 1)),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_find_similar_transactions() {
        let db = Database::in_memory().unwrap();
        let mut a = NewTransaction::new(1, d(2025, 4, 1), "Uber", dec("20.00"), TransactionType::Expense);
        a.external_id = Some("E1".into());
        db.insert_transaction(&a).unwrap();
        let b = NewTransaction::new(1, d(2025, 4, 1), "99 Taxi", dec("20.00"), TransactionType::Expense);
        db.insert_transaction(&b).unwrap();

        assert_eq!(
            db.find_similar_transactions(1, d(2025, 4, 1), dec("20"), None)
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            db.find_similar_transactions(1, d(2025, 4, 1), dec("20"), Some("E1"))
                .unwrap()
                .len(),
            1
        );
        assert!(db
            .find_similar_transactions(1, d(2025, 4, 2), dec("20"), None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_cycle_amounts_exclude_statement_rows() {
        let db = Database::in_memory().unwrap();
        let card_id = new_card(&db, 1);
        let (cycle, _) = db
            .insert_cycle(card_id, 1, 2025, &cycle_bounds(27, 5, 1, 2025).unwrap())
            .unwrap();

        let mut purchase =
            NewTransaction::new(1, d(2025, 1, 2), "Loja", dec("99.90"), TransactionType::Expense);
        purchase.card_id = Some(card_id);
        purchase.cycle_id = Some(cycle.id);
        db.insert_transaction(&purchase).unwrap();

        let mut statement =
            NewTransaction::new(1, d(2025, 1, 5), "Statement", dec("99.90"), TransactionType::Expense);
        statement.cycle_id = Some(cycle.id);
        statement.payment_method = Some(PaymentMethod::CardStatement);
        let statement_id = db.insert_transaction(&statement).unwrap();

        assert_eq!(db.cycle_amounts(cycle.id).unwrap(), vec![dec("99.90")]);
        assert_eq!(
            db.find_statement_transaction(cycle.id).unwrap().map(|t| t.id),
            Some(statement_id)
        );
        assert_eq!(db.list_cycle_transactions(cycle.id).unwrap().len(), 2);
    }

    #[test]
    fn test_transactions_after_pages() {
        let db = Database::in_memory().unwrap();
        for i in 0..5 {
            let mut tx = NewTransaction::new(
                1,
                d(2025, 1, 1 + i),
                "x",
                dec("1.00"),
                TransactionType::Expense,
            );
            if i % 2 == 0 {
                tx.fingerprint = Some(format!("fp{}", i));
            }
            db.insert_transaction(&tx).unwrap();
        }

        let first = db.transactions_after(Some(1), false, 0, 3).unwrap();
        assert_eq!(first.len(), 3);
        let rest = db
            .transactions_after(Some(1), false, first[2].id, 3)
            .unwrap();
        assert_eq!(rest.len(), 2);

        let missing = db.transactions_after(None, true, 0, 100).unwrap();
        assert_eq!(missing.len(), 2);
        assert!(db.transactions_after(Some(7), false, 0, 100).unwrap().is_empty());
    }

    #[test]
    fn test_import_batch_lifecycle() {
        let db = Database::in_memory().unwrap();
        let id = db
            .create_import_batch(&NewImportBatch {
                user_id: 1,
                account_id: None,
                card_id: None,
                original_filename: "extrato.csv".into(),
                file_path: "abc".into(),
                format: StatementFormat::Delimited,
            })
            .unwrap();

        let batch = db.require_import_batch(id).unwrap();
        assert_eq!(batch.status, ImportStatus::Pending);
        assert_eq!(batch.format, StatementFormat::Delimited);
        assert!(batch.mapping.is_none());

        let mapping = FieldMapping::Columns(ColumnMapping {
            date: Some(0),
            description: Some(1),
            amount: Some(2),
            ..ColumnMapping::default()
        });
        db.set_import_batch_mapping(id, &mapping).unwrap();
        db.mark_import_batch_failed(id, "boom").unwrap();

        let batch = db.require_import_batch(id).unwrap();
        assert_eq!(batch.status, ImportStatus::Failed);
        assert_eq!(batch.log.as_deref(), Some("boom"));
        assert_eq!(batch.mapping, Some(mapping));

        let counters = ImportCounters {
            total: 3,
            imported: 2,
            duplicates: 1,
            errors: 0,
        };
        db.finish_import_batch(id, &counters, ImportStatus::Completed)
            .unwrap();
        let batch = db.require_import_batch(id).unwrap();
        assert_eq!(batch.status, ImportStatus::Completed);
        assert_eq!(batch.imported_items, 2);
        assert_eq!(batch.duplicate_items, 1);
        assert!(batch.log.is_none());

        assert_eq!(db.list_import_batches(1, 10).unwrap().len(), 1);
        assert!(db.list_import_batches(2, 10).unwrap().is_empty());
    }

    #[test]
    fn test_import_items_and_counters() {
        let db = Database::in_memory().unwrap();
        let batch_id = db
            .create_import_batch(&NewImportBatch {
                user_id: 1,
                account_id: None,
                card_id: None,
                original_filename: "extrato.ofx".into(),
                file_path: "abc".into(),
                format: StatementFormat::Ofx,
            })
            .unwrap();
        let tx_id = db
            .insert_transaction(&NewTransaction::new(
                1,
                d(2025, 1, 15),
                "Padaria",
                dec("5.00"),
                TransactionType::Expense,
            ))
            .unwrap();

        let a = db.insert_import_item(batch_id, &record("Padaria", "5.00"), "fa").unwrap();
        let b = db.insert_import_item(batch_id, &record("Padaria", "5.00"), "fa").unwrap();
        let c = db.insert_import_item(batch_id, &record("Farmacia", "9.00"), "fc").unwrap();
        db.insert_import_item(batch_id, &record("Mercado", "1.00"), "fd").unwrap();

        db.mark_item_imported(a, tx_id).unwrap();
        db.mark_item_duplicate(b).unwrap();
        db.mark_item_error(c, "bad row").unwrap();

        let items = db.list_import_items(batch_id).unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[0].transaction_id, Some(tx_id));
        assert_eq!(items[0].record.description, "Padaria");
        assert_eq!(items[2].error.as_deref(), Some("bad row"));
        assert_eq!(items[3].status, ImportItemStatus::Pending);

        let counters = db.import_item_counters(batch_id).unwrap();
        assert_eq!(
            counters,
            ImportCounters {
                total: 4,
                imported: 1,
                duplicates: 1,
                errors: 1,
            }
        );

        assert_eq!(db.clear_import_items(batch_id).unwrap(), 4);
        assert!(db.list_import_items(batch_id).unwrap().is_empty());
    }

    #[test]
    fn test_encrypted_database_requires_key() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("enc.db");
        let path = path.to_string_lossy().into_owned();

        {
            let db = Database::new_with_key(&path, Some("correct horse")).unwrap();
            db.upsert_account(1, "Conta").unwrap();
        }

        let reopened = Database::new_with_key(&path, Some("correct horse")).unwrap();
        assert_eq!(reopened.list_accounts(1).unwrap().len(), 1);

        assert!(Database::new_with_key(&path, Some("wrong")).is_err());
    }
}
