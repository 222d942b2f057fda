//! Import batch and item operations

use rusqlite::{params, OptionalExtension};

use super::{get_enum, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{
    FieldMapping, ImportBatch, ImportCounters, ImportItem, ImportItemStatus, ImportStatus,
    NewImportBatch, ParsedRecord,
};

const BATCH_COLUMNS: &str = "id, user_id, account_id, card_id, original_filename, file_path, \
    format, mapping, status, total_items, imported_items, duplicate_items, error_items, log, created_at";

fn row_to_batch(row: &rusqlite::Row<'_>) -> rusqlite::Result<ImportBatch> {
    let mapping_json: Option<String> = row.get(7)?;
    let created_at_str: String = row.get(14)?;

    let mapping = mapping_json
        .map(|s| serde_json::from_str::<FieldMapping>(&s))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(ImportBatch {
        id: row.get(0)?,
        user_id: row.get(1)?,
        account_id: row.get(2)?,
        card_id: row.get(3)?,
        original_filename: row.get(4)?,
        file_path: row.get(5)?,
        format: get_enum(row, 6)?,
        mapping,
        status: get_enum(row, 8)?,
        total_items: row.get(9)?,
        imported_items: row.get(10)?,
        duplicate_items: row.get(11)?,
        error_items: row.get(12)?,
        log: row.get(13)?,
        created_at: parse_datetime(&created_at_str),
    })
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<ImportItem> {
    let record_json: String = row.get(3)?;
    let record = serde_json::from_str::<ParsedRecord>(&record_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(ImportItem {
        id: row.get(0)?,
        batch_id: row.get(1)?,
        transaction_id: row.get(2)?,
        record,
        fingerprint: row.get(4)?,
        status: get_enum(row, 5)?,
        error: row.get(6)?,
    })
}

impl Database {
    /// Record a new pending import batch
    pub fn create_import_batch(&self, batch: &NewImportBatch) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO import_batches (user_id, account_id, card_id, original_filename, file_path, format, status)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                batch.user_id,
                batch.account_id,
                batch.card_id,
                batch.original_filename,
                batch.file_path,
                batch.format.as_str(),
                ImportStatus::Pending.as_str(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get an import batch by ID
    pub fn get_import_batch(&self, id: i64) -> Result<Option<ImportBatch>> {
        let conn = self.conn()?;
        let batch = conn
            .query_row(
                &format!("SELECT {} FROM import_batches WHERE id = ?", BATCH_COLUMNS),
                params![id],
                row_to_batch,
            )
            .optional()?;
        Ok(batch)
    }

    /// Get an import batch by ID, failing when it does not exist
    pub fn require_import_batch(&self, id: i64) -> Result<ImportBatch> {
        self.get_import_batch(id)?
            .ok_or_else(|| Error::NotFound(format!("import batch {}", id)))
    }

    /// Newest import batches of a user
    pub fn list_import_batches(&self, user_id: i64, limit: i64) -> Result<Vec<ImportBatch>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM import_batches WHERE user_id = ? ORDER BY id DESC LIMIT ?",
            BATCH_COLUMNS
        ))?;
        let batches = stmt
            .query_map(params![user_id, limit], row_to_batch)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(batches)
    }

    /// Persist a batch status
    pub fn set_import_batch_status(&self, id: i64, status: ImportStatus) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE import_batches SET status = ? WHERE id = ?",
            params![status.as_str(), id],
        )?;
        Ok(())
    }

    /// Save the field mapping used to parse a batch
    pub fn set_import_batch_mapping(&self, id: i64, mapping: &FieldMapping) -> Result<()> {
        let json = serde_json::to_string(mapping)?;
        let conn = self.conn()?;
        conn.execute(
            "UPDATE import_batches SET mapping = ? WHERE id = ?",
            params![json, id],
        )?;
        Ok(())
    }

    /// Mark a batch failed and keep the message
    pub fn mark_import_batch_failed(&self, id: i64, message: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE import_batches SET status = ?, log = ? WHERE id = ?",
            params![ImportStatus::Failed.as_str(), message, id],
        )?;
        Ok(())
    }

    /// Store final counters and status of a processed batch
    pub fn finish_import_batch(
        &self,
        id: i64,
        counters: &ImportCounters,
        status: ImportStatus,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE import_batches
            SET status = ?, total_items = ?, imported_items = ?, duplicate_items = ?, error_items = ?, log = NULL
            WHERE id = ?
            "#,
            params![
                status.as_str(),
                counters.total,
                counters.imported,
                counters.duplicates,
                counters.errors,
                id,
            ],
        )?;
        Ok(())
    }

    /// Drop the items of an earlier attempt before a batch is reprocessed
    pub fn clear_import_items(&self, batch_id: i64) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM import_items WHERE batch_id = ?",
            params![batch_id],
        )?;
        Ok(removed)
    }

    /// Add a pending candidate row to a batch
    pub fn insert_import_item(
        &self,
        batch_id: i64,
        record: &ParsedRecord,
        fingerprint: &str,
    ) -> Result<i64> {
        let json = serde_json::to_string(record)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO import_items (batch_id, record, fingerprint, status) VALUES (?, ?, ?, ?)",
            params![
                batch_id,
                json,
                fingerprint,
                ImportItemStatus::Pending.as_str()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Mark an item imported as the given transaction
    pub fn mark_item_imported(&self, item_id: i64, transaction_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE import_items SET status = ?, transaction_id = ?, error = NULL WHERE id = ?",
            params![
                ImportItemStatus::Imported.as_str(),
                transaction_id,
                item_id
            ],
        )?;
        Ok(())
    }

    /// Mark an item as a duplicate of an existing transaction
    pub fn mark_item_duplicate(&self, item_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE import_items SET status = ? WHERE id = ?",
            params![ImportItemStatus::Duplicate.as_str(), item_id],
        )?;
        Ok(())
    }

    /// Mark an item failed with the error message
    pub fn mark_item_error(&self, item_id: i64, message: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE import_items SET status = ?, error = ? WHERE id = ?",
            params![ImportItemStatus::Error.as_str(), message, item_id],
        )?;
        Ok(())
    }

    /// Items of a batch in creation order
    pub fn list_import_items(&self, batch_id: i64) -> Result<Vec<ImportItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, batch_id, transaction_id, record, fingerprint, status, error \
             FROM import_items WHERE batch_id = ? ORDER BY id",
        )?;
        let items = stmt
            .query_map(params![batch_id], row_to_item)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Count the items of a batch by status
    pub fn import_item_counters(&self, batch_id: i64) -> Result<ImportCounters> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM import_items WHERE batch_id = ? GROUP BY status",
        )?;
        let rows = stmt
            .query_map(params![batch_id], |row| {
                Ok((get_enum::<ImportItemStatus>(row, 0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut counters = ImportCounters::default();
        for (status, count) in rows {
            counters.total += count;
            match status {
                ImportItemStatus::Imported => counters.imported += count,
                ImportItemStatus::Duplicate => counters.duplicates += count,
                ImportItemStatus::Error => counters.errors += count,
                ImportItemStatus::Pending | ImportItemStatus::Skipped => {}
            }
        }
        Ok(counters)
    }
}
