//! Statement import pipeline
//!
//! An import moves through three steps:
//! 1. `create_batch` stores the uploaded file and detects its format
//! 2. `preview` parses it and flags rows that already exist
//! 3. `process` turns the selected rows into transactions, expanding
//!    installment purchases and assigning card cycles on the way
//!
//! A failing row is recorded on its item and never aborts the batch. A
//! failure outside the rows (unreadable file, bad mapping) marks the whole
//! batch failed; failed batches may be processed again.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{ImportSettings, Settings};
use crate::cycles::CycleEngine;
use crate::db::Database;
use crate::dedupe;
use crate::error::{Error, Result};
use crate::installments::{self, InstallmentInfo};
use crate::models::{
    Card, ColumnMapping, FieldMapping, ImportBatch, ImportStatus, NewImportBatch, NewTransaction,
    ParsedRecord, PaymentMethod, StatementFormat,
};
use crate::parsers::{self, DelimitedParser};
use crate::storage::Storage;

/// One parsed row as shown before processing
#[derive(Debug, Clone, Serialize)]
pub struct PreviewRow {
    /// Position in the parsed file, used to select rows for processing
    pub index: usize,
    pub record: ParsedRecord,
    pub fingerprint: String,
    pub is_duplicate: bool,
    /// Existing transactions with the same fingerprint
    pub duplicate_ids: Vec<i64>,
    pub installment: Option<InstallmentInfo>,
}

/// Outcome of processing a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub batch_id: i64,
    pub status: ImportStatus,
    pub total: i64,
    pub imported: i64,
    pub duplicates: i64,
    pub errors: i64,
}

impl ImportSummary {
    fn from_batch(batch: &ImportBatch) -> Self {
        Self {
            batch_id: batch.id,
            status: batch.status,
            total: batch.total_items,
            imported: batch.imported_items,
            duplicates: batch.duplicate_items,
            errors: batch.error_items,
        }
    }
}

/// A selected row waiting to be processed
struct PendingItem {
    item_id: i64,
    record: ParsedRecord,
    fingerprint: String,
}

/// Import orchestrator over a database and a blob store
pub struct Importer<'a> {
    db: &'a Database,
    storage: &'a dyn Storage,
    limits: ImportSettings,
}

impl<'a> Importer<'a> {
    pub fn new(db: &'a Database, storage: &'a dyn Storage) -> Self {
        Self {
            db,
            storage,
            limits: Settings::default().import,
        }
    }

    /// Use configured upload limits and batch size
    pub fn with_limits(mut self, limits: ImportSettings) -> Self {
        self.limits = limits;
        self
    }

    /// Store an uploaded file and record a pending batch for it
    pub fn create_batch(
        &self,
        user_id: i64,
        filename: &str,
        bytes: &[u8],
        account_id: Option<i64>,
        card_id: Option<i64>,
    ) -> Result<ImportBatch> {
        self.limits.validate_upload(filename, bytes.len() as u64)?;

        if let Some(card_id) = card_id {
            let card = self.db.require_card(card_id)?;
            if card.user_id != user_id {
                return Err(Error::InvalidData(format!(
                    "card {} does not belong to user {}",
                    card_id, user_id
                )));
            }
        }
        if let Some(account_id) = account_id {
            let account = self
                .db
                .get_account(account_id)?
                .ok_or_else(|| Error::NotFound(format!("account {}", account_id)))?;
            if account.user_id != user_id {
                return Err(Error::InvalidData(format!(
                    "account {} does not belong to user {}",
                    account_id, user_id
                )));
            }
        }

        let key = self.storage.store(bytes)?;
        let content = parsers::decode_content(bytes);
        let format = parsers::detect_format(&content, filename);

        let id = self.db.create_import_batch(&NewImportBatch {
            user_id,
            account_id,
            card_id,
            original_filename: filename.to_string(),
            file_path: key,
            format,
        })?;

        info!(
            batch_id = id,
            format = %format,
            storage = self.storage.name(),
            "Created import batch for {}",
            filename
        );
        self.db.require_import_batch(id)
    }

    /// Column mapping guessed from the header of a delimited file
    pub fn suggest_mapping(&self, batch_id: i64) -> Result<ColumnMapping> {
        let batch = self.db.require_import_batch(batch_id)?;
        if batch.format != StatementFormat::Delimited {
            return Err(Error::InvalidData(format!(
                "mapping suggestions are only available for csv files, batch {} is {}",
                batch_id, batch.format
            )));
        }
        let content = self.load_content(&batch)?;
        Ok(DelimitedParser.suggest_mapping(&content))
    }

    /// Save a mapping on a batch after checking it fits the batch format
    pub fn save_mapping(&self, batch_id: i64, mapping: &FieldMapping) -> Result<()> {
        let batch = self.db.require_import_batch(batch_id)?;
        check_mapping(batch.format, mapping)?;
        self.db.set_import_batch_mapping(batch_id, mapping)
    }

    /// Parse a batch and flag rows that would be duplicates
    pub fn preview(&self, batch_id: i64, mapping: Option<&FieldMapping>) -> Result<Vec<PreviewRow>> {
        let batch = self.db.require_import_batch(batch_id)?;
        let content = self.load_content(&batch)?;
        let mapping = resolve_mapping(&batch, &content, mapping)?;
        let records = parsers::parser_for(batch.format).parse(&content, mapping.as_ref())?;

        records
            .into_iter()
            .enumerate()
            .map(|(index, record)| -> Result<PreviewRow> {
                let fingerprint = record_fingerprint(&record);
                let duplicate_ids: Vec<i64> =
                    dedupe::find_duplicates(self.db, batch.user_id, &fingerprint)?
                        .iter()
                        .map(|tx| tx.id)
                        .collect();
                let installment = installments::parse(&record.description);
                Ok(PreviewRow {
                    index,
                    is_duplicate: !duplicate_ids.is_empty(),
                    duplicate_ids,
                    fingerprint,
                    installment,
                    record,
                })
            })
            .collect()
    }

    /// Process the selected rows using the configured batch size.
    ///
    /// `selected` holds preview indexes; `None` selects every row.
    pub fn process(
        &self,
        batch_id: i64,
        selected: Option<&[usize]>,
        mapping: Option<&FieldMapping>,
    ) -> Result<ImportSummary> {
        self.process_in_batches(batch_id, selected, mapping, self.limits.batch_size)
    }

    /// Process the selected rows, `batch_size` items at a time
    pub fn process_in_batches(
        &self,
        batch_id: i64,
        selected: Option<&[usize]>,
        mapping: Option<&FieldMapping>,
        batch_size: usize,
    ) -> Result<ImportSummary> {
        let batch = self.db.require_import_batch(batch_id)?;
        if !matches!(batch.status, ImportStatus::Pending | ImportStatus::Failed) {
            return Err(Error::InvalidTransition(format!(
                "batch {} is {} and cannot be processed",
                batch_id, batch.status
            )));
        }

        self.db
            .set_import_batch_status(batch_id, ImportStatus::Processing)?;

        match self.run(&batch, selected, mapping, batch_size) {
            Ok(summary) => Ok(summary),
            Err(e) => {
                error!(batch_id, error = %e, "Import batch failed");
                self.db.mark_import_batch_failed(batch_id, &e.to_string())?;
                Err(e)
            }
        }
    }

    fn run(
        &self,
        batch: &ImportBatch,
        selected: Option<&[usize]>,
        mapping: Option<&FieldMapping>,
        batch_size: usize,
    ) -> Result<ImportSummary> {
        let cleared = self.db.clear_import_items(batch.id)?;
        if cleared > 0 {
            debug!(batch_id = batch.id, cleared, "Cleared items of an earlier attempt");
        }

        let content = self.load_content(batch)?;
        let mapping = resolve_mapping(batch, &content, mapping)?;
        let records = parsers::parser_for(batch.format).parse(&content, mapping.as_ref())?;

        if batch.format.requires_mapping() {
            if let Some(mapping) = &mapping {
                self.db.set_import_batch_mapping(batch.id, mapping)?;
            }
        }

        let card = batch.card_id.map(|id| self.db.require_card(id)).transpose()?;

        let mut pending = Vec::new();
        for index in select_indexes(records.len(), selected) {
            let record = records[index].clone();
            let fingerprint = record_fingerprint(&record);
            let item_id = self.db.insert_import_item(batch.id, &record, &fingerprint)?;
            pending.push(PendingItem {
                item_id,
                record,
                fingerprint,
            });
        }

        let chunk_size = batch_size.max(1);
        for (n, chunk) in pending.chunks(chunk_size).enumerate() {
            debug!(batch_id = batch.id, chunk = n + 1, items = chunk.len(), "Processing import chunk");
            for item in chunk {
                if let Err(e) = self.process_item(batch, card.as_ref(), item) {
                    warn!(batch_id = batch.id, item_id = item.item_id, error = %e, "Import item failed");
                    self.db.mark_item_error(item.item_id, &e.to_string())?;
                }
            }
        }

        let counters = self.db.import_item_counters(batch.id)?;
        let status = if counters.errors > 0 || counters.duplicates > 0 {
            ImportStatus::CompletedWithWarnings
        } else {
            ImportStatus::Completed
        };
        self.db.finish_import_batch(batch.id, &counters, status)?;

        info!(
            batch_id = batch.id,
            total = counters.total,
            imported = counters.imported,
            duplicates = counters.duplicates,
            errors = counters.errors,
            "Import batch {}",
            status
        );

        let batch = self.db.require_import_batch(batch.id)?;
        Ok(ImportSummary::from_batch(&batch))
    }

    fn process_item(&self, batch: &ImportBatch, card: Option<&Card>, item: &PendingItem) -> Result<()> {
        if dedupe::is_duplicate(self.db, batch.user_id, &item.fingerprint)? {
            self.db.mark_item_duplicate(item.item_id)?;
            return Ok(());
        }

        let record = &item.record;
        let installment = installments::parse(&record.description);

        let mut tx = self.new_transaction(batch, card, record);
        tx.fingerprint = Some(item.fingerprint.clone());
        if let Some(info) = &installment {
            tx.description = Some(info.cleaned_description.clone());
            tx.is_installment = true;
            tx.installment_current = Some(info.current);
            tx.installment_total = Some(info.total);
        }

        let tx_id = self.db.insert_transaction(&tx)?;
        if installment.is_some() {
            self.db.set_transaction_parent(tx_id, tx_id)?;
        }
        if let Some(card) = card {
            CycleEngine::new(self.db).assign_transaction(card, tx_id)?;
        }

        if let Some(info) = &installment {
            self.create_future_installments(batch, card, record, info, tx_id)?;
        }

        self.db.mark_item_imported(item.item_id, tx_id)?;
        Ok(())
    }

    /// Create the installments after the one on the statement, a month apart
    fn create_future_installments(
        &self,
        batch: &ImportBatch,
        card: Option<&Card>,
        record: &ParsedRecord,
        info: &InstallmentInfo,
        parent_id: i64,
    ) -> Result<usize> {
        let mut created = 0;

        for number in info.current + 1..=info.total {
            let date = installments::add_months(record.date, number - info.current);
            let description = format!("{} PARC {}/{}", info.cleaned_description, number, info.total);
            let external_id = format!(
                "{}_PARC{}",
                record.external_id.as_deref().unwrap_or(""),
                number
            );
            let fingerprint =
                dedupe::fingerprint(date, record.amount, &description, Some(&external_id));

            if dedupe::is_duplicate(self.db, batch.user_id, &fingerprint)? {
                debug!(parent_id, number, "Future installment already exists");
                continue;
            }

            let mut tx = self.new_transaction(batch, card, record);
            tx.date = date;
            tx.description_original = description;
            tx.description = Some(info.cleaned_description.clone());
            tx.external_id = Some(external_id);
            tx.fingerprint = Some(fingerprint);
            tx.is_installment = true;
            tx.installment_current = Some(number);
            tx.installment_total = Some(info.total);
            tx.parent_id = Some(parent_id);

            let tx_id = self.db.insert_transaction(&tx)?;
            if let Some(card) = card {
                CycleEngine::new(self.db).assign_transaction(card, tx_id)?;
            }
            created += 1;
        }

        if created > 0 {
            debug!(parent_id, created, "Created future installments");
        }
        Ok(created)
    }

    fn new_transaction(&self, batch: &ImportBatch, card: Option<&Card>, record: &ParsedRecord) -> NewTransaction {
        let mut tx = NewTransaction::new(
            batch.user_id,
            record.date,
            record.description.clone(),
            record.amount,
            record.kind,
        );
        tx.account_id = batch.account_id;
        tx.card_id = card.map(|c| c.id);
        tx.payment_method = card.map(|_| PaymentMethod::Credit);
        tx.external_id = record.external_id.clone();
        tx
    }

    fn load_content(&self, batch: &ImportBatch) -> Result<String> {
        let bytes = self.storage.read(&batch.file_path)?;
        Ok(parsers::decode_content(&bytes))
    }
}

fn record_fingerprint(record: &ParsedRecord) -> String {
    dedupe::fingerprint(
        record.date,
        record.amount,
        &record.description,
        record.external_id.as_deref(),
    )
}

/// Selected indexes in the order given, without repeats or out-of-range entries
fn select_indexes(len: usize, selected: Option<&[usize]>) -> Vec<usize> {
    match selected {
        None => (0..len).collect(),
        Some(indexes) => {
            let mut seen = HashSet::new();
            indexes
                .iter()
                .copied()
                .filter(|i| *i < len && seen.insert(*i))
                .collect()
        }
    }
}

fn check_mapping(format: StatementFormat, mapping: &FieldMapping) -> Result<()> {
    let fits = match format {
        StatementFormat::Ofx => false,
        StatementFormat::Delimited => matches!(mapping, FieldMapping::Columns(_)),
        StatementFormat::FixedWidth => {
            matches!(mapping, FieldMapping::Positional(_) | FieldMapping::Pattern(_))
        }
    };
    if fits {
        Ok(())
    } else {
        Err(Error::Configuration(format!(
            "a {} mapping does not apply to {} files",
            mapping.mode(),
            format
        )))
    }
}

/// Mapping to parse with: the one given, else the one saved on the batch,
/// else a header guess for delimited files
fn resolve_mapping(
    batch: &ImportBatch,
    content: &str,
    given: Option<&FieldMapping>,
) -> Result<Option<FieldMapping>> {
    if !batch.format.requires_mapping() {
        return Ok(None);
    }
    if let Some(mapping) = given {
        check_mapping(batch.format, mapping)?;
        return Ok(Some(mapping.clone()));
    }
    if let Some(saved) = &batch.mapping {
        return Ok(Some(saved.clone()));
    }
    if batch.format == StatementFormat::Delimited {
        return Ok(Some(FieldMapping::Columns(
            DelimitedParser.suggest_mapping(content),
        )));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ImportItemStatus, NewCard, PositionMapping};
    use crate::storage::MemoryStorage;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    const CSV: &str = "Data;Descrição;Valor\n\
                       05/03/2025;Padaria;-12,50\n\
                       06/03/2025;Mercado;-80,00\n\
                       07/03/2025;Salario;3.000,00\n";

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_select_indexes() {
        assert_eq!(select_indexes(3, None), vec![0, 1, 2]);
        assert_eq!(select_indexes(3, Some(&[2, 0, 2, 9][..])), vec![2, 0]);
        assert!(select_indexes(0, Some(&[0][..])).is_empty());
    }

    #[test]
    fn test_check_mapping() {
        let columns = FieldMapping::Columns(ColumnMapping::default());
        let positional = FieldMapping::Positional(PositionMapping::default());
        assert!(check_mapping(StatementFormat::Delimited, &columns).is_ok());
        assert!(check_mapping(StatementFormat::FixedWidth, &positional).is_ok());
        assert!(check_mapping(StatementFormat::Delimited, &positional).is_err());
        assert!(check_mapping(StatementFormat::Ofx, &columns).is_err());
    }

    #[test]
    fn test_create_batch_detects_format_and_stores_file() {
        let db = Database::in_memory().unwrap();
        let storage = MemoryStorage::new();
        let importer = Importer::new(&db, &storage);

        let batch = importer
            .create_batch(1, "extrato.csv", CSV.as_bytes(), None, None)
            .unwrap();
        assert_eq!(batch.format, StatementFormat::Delimited);
        assert_eq!(batch.status, ImportStatus::Pending);
        assert_eq!(storage.read(&batch.file_path).unwrap(), CSV.as_bytes());

        assert!(importer
            .create_batch(1, "extrato.exe", CSV.as_bytes(), None, None)
            .is_err());
    }

    #[test]
    fn test_create_batch_rejects_foreign_card() {
        let db = Database::in_memory().unwrap();
        let storage = MemoryStorage::new();
        let card_id = db
            .create_card(&NewCard {
                user_id: 2,
                name: "Other".into(),
                closing_day: 5,
                due_day: 12,
                credit_limit: None,
            })
            .unwrap();

        let importer = Importer::new(&db, &storage);
        let err = importer
            .create_batch(1, "extrato.csv", CSV.as_bytes(), None, Some(card_id))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn test_preview_uses_suggested_mapping_and_flags_duplicates() {
        let db = Database::in_memory().unwrap();
        let storage = MemoryStorage::new();
        let importer = Importer::new(&db, &storage);
        let batch = importer
            .create_batch(1, "extrato.csv", CSV.as_bytes(), None, None)
            .unwrap();

        let rows = importer.preview(batch.id, None).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| !r.is_duplicate));
        assert_eq!(rows[0].record.amount, dec("12.50"));

        importer.process(batch.id, Some(&[1][..]), None).unwrap();

        let rows = importer.preview(batch.id, None).unwrap();
        assert!(!rows[0].is_duplicate);
        assert!(rows[1].is_duplicate);
        assert_eq!(rows[1].duplicate_ids.len(), 1);
    }

    #[test]
    fn test_process_selected_rows_and_reject_reprocessing() {
        let db = Database::in_memory().unwrap();
        let storage = MemoryStorage::new();
        let importer = Importer::new(&db, &storage);
        let batch = importer
            .create_batch(1, "extrato.csv", CSV.as_bytes(), None, None)
            .unwrap();

        let summary = importer.process(batch.id, Some(&[2, 0][..]), None).unwrap();
        assert_eq!(summary.status, ImportStatus::Completed);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.imported, 2);
        assert_eq!(db.count_transactions(1).unwrap(), 2);

        // The mapping used is kept on the batch
        let stored = db.require_import_batch(batch.id).unwrap();
        assert!(matches!(stored.mapping, Some(FieldMapping::Columns(_))));

        assert!(matches!(
            importer.process(batch.id, None, None),
            Err(Error::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_duplicates_complete_with_warnings() {
        let db = Database::in_memory().unwrap();
        let storage = MemoryStorage::new();
        let importer = Importer::new(&db, &storage);
        let csv = "Data;Descrição;Valor\n05/03/2025;Padaria;-12,50\n";

        let first = importer.create_batch(1, "a.csv", csv.as_bytes(), None, None).unwrap();
        let summary = importer.process(first.id, None, None).unwrap();
        assert_eq!(summary.status, ImportStatus::Completed);

        let second = importer.create_batch(1, "b.csv", csv.as_bytes(), None, None).unwrap();
        let summary = importer.process(second.id, None, None).unwrap();
        assert_eq!(summary.status, ImportStatus::CompletedWithWarnings);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.errors, 0);
        assert_eq!(
            db.require_import_batch(second.id).unwrap().status,
            ImportStatus::CompletedWithWarnings
        );
    }

    #[test]
    fn test_installment_expansion_with_card() {
        let db = Database::in_memory().unwrap();
        let storage = MemoryStorage::new();
        let card_id = db
            .create_card(&NewCard {
                user_id: 1,
                name: "Visa".into(),
                closing_day: 27,
                due_day: 5,
                credit_limit: None,
            })
            .unwrap();
        let csv = "Data;Descrição;Valor\n10/01/2025;LOJA X PARC 02/04;-100,00\n";

        let importer = Importer::new(&db, &storage);
        let batch = importer
            .create_batch(1, "fatura.csv", csv.as_bytes(), None, Some(card_id))
            .unwrap();
        let summary = importer.process(batch.id, None, None).unwrap();
        assert_eq!(summary.imported, 1);

        let items = db.list_import_items(batch.id).unwrap();
        assert_eq!(items[0].status, ImportItemStatus::Imported);
        let primary = db.require_transaction(items[0].transaction_id.unwrap()).unwrap();
        assert_eq!(primary.parent_id, Some(primary.id));
        assert_eq!(primary.description.as_deref(), Some("LOJA X"));
        assert_eq!(primary.installment_current, Some(2));

        let txs = db.list_transactions(1, 100).unwrap();
        let mut future: Vec<_> = txs.iter().filter(|t| t.id != primary.id).collect();
        future.sort_by_key(|t| t.date);
        assert_eq!(future.len(), 2);
        assert_eq!(future[0].date, d(2025, 2, 10));
        assert_eq!(future[0].description_original, "LOJA X PARC 3/4");
        assert_eq!(future[0].external_id.as_deref(), Some("_PARC3"));
        assert_eq!(future[1].date, d(2025, 3, 10));
        assert_eq!(future[1].installment_current, Some(4));
        assert!(future.iter().all(|t| t.parent_id == Some(primary.id)));
        assert!(future.iter().all(|t| t.cycle_id.is_some()));
        assert_eq!(db.list_cycles(card_id).unwrap().len(), 3);
    }

    #[test]
    fn test_missing_blob_fails_batch_and_allows_retry() {
        let db = Database::in_memory().unwrap();
        let storage = MemoryStorage::new();
        let importer = Importer::new(&db, &storage);
        let batch = importer
            .create_batch(1, "extrato.csv", CSV.as_bytes(), None, None)
            .unwrap();

        storage.remove(&batch.file_path).unwrap();
        assert!(importer.process(batch.id, None, None).is_err());
        let failed = db.require_import_batch(batch.id).unwrap();
        assert_eq!(failed.status, ImportStatus::Failed);
        assert!(failed.log.is_some());

        storage.store(CSV.as_bytes()).unwrap();
        let summary = importer.process(batch.id, None, None).unwrap();
        assert_eq!(summary.status, ImportStatus::Completed);
        assert_eq!(summary.imported, 3);
        assert!(db.require_import_batch(batch.id).unwrap().log.is_none());
    }

    #[test]
    fn test_suggest_mapping_only_for_csv() {
        let db = Database::in_memory().unwrap();
        let storage = MemoryStorage::new();
        let importer = Importer::new(&db, &storage);
        let csv = importer
            .create_batch(1, "extrato.csv", CSV.as_bytes(), None, None)
            .unwrap();
        let mapping = importer.suggest_mapping(csv.id).unwrap();
        assert_eq!(mapping.date, Some(0));
        assert_eq!(mapping.amount, Some(2));

        let txt = importer
            .create_batch(1, "extrato.txt", b"lonely line", None, None)
            .unwrap();
        assert_eq!(txt.format, StatementFormat::FixedWidth);
        assert!(importer.suggest_mapping(txt.id).is_err());
        assert!(matches!(
            importer.preview(txt.id, None),
            Err(Error::Configuration(_))
        ));
    }
}
