//! Statement import command implementations

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use fatura_core::{
    db::Database,
    models::{FieldMapping, ImportStatus},
    Importer,
};

use super::truncate;

/// Read a JSON field mapping from a file
pub fn load_mapping(path: &Path) -> Result<FieldMapping> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read mapping file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid mapping in {}", path.display()))
}

pub fn cmd_import_upload(
    importer: &Importer<'_>,
    user_id: i64,
    file: &Path,
    account_id: Option<i64>,
    card_id: Option<i64>,
) -> Result<i64> {
    let bytes = fs::read(file).with_context(|| format!("Failed to read file: {}", file.display()))?;
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("File name is not valid UTF-8")?;

    println!("📥 Uploading {}...", file.display());
    let batch = importer.create_batch(user_id, filename, &bytes, account_id, card_id)?;

    println!("✅ Created import batch {} ({})", batch.id, batch.format);
    println!();
    println!("Next steps:");
    if batch.format.requires_mapping() {
        println!("  1. Check the mapping: fatura import suggest {} --save", batch.id);
        println!("  2. Preview rows:      fatura import preview {}", batch.id);
    } else {
        println!("  1. Preview rows:      fatura import preview {}", batch.id);
    }
    println!("  then process:         fatura import process {}", batch.id);

    Ok(batch.id)
}

pub fn cmd_import_suggest(importer: &Importer<'_>, batch_id: i64, save: bool) -> Result<()> {
    let mapping = FieldMapping::Columns(importer.suggest_mapping(batch_id)?);
    println!("{}", serde_json::to_string_pretty(&mapping)?);

    if save {
        importer.save_mapping(batch_id, &mapping)?;
        println!("✅ Mapping saved on batch {}", batch_id);
    }
    Ok(())
}

pub fn cmd_import_preview(
    importer: &Importer<'_>,
    batch_id: i64,
    mapping: Option<&FieldMapping>,
    json: bool,
) -> Result<()> {
    let rows = importer.preview(batch_id, mapping)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No rows could be parsed from batch {}.", batch_id);
        return Ok(());
    }

    let duplicates = rows.iter().filter(|r| r.is_duplicate).count();
    println!();
    println!("🔍 Preview of batch {} ({} rows, {} duplicates)", batch_id, rows.len(), duplicates);
    println!("   ─────────────────────────────────────────────────────────────");

    for row in &rows {
        let flag = if row.is_duplicate { "dup" } else { "   " };
        let installment = row
            .installment
            .as_ref()
            .map(|i| format!(" [{}/{}]", i.current, i.total))
            .unwrap_or_default();
        println!(
            "   {:>3} {} │ {} │ {:>10.2} {:<7} │ {}{}",
            row.index,
            flag,
            row.record.date,
            row.record.amount,
            row.record.kind.as_str(),
            truncate(&row.record.description, 36),
            installment
        );
    }

    Ok(())
}

pub fn cmd_import_process(
    importer: &Importer<'_>,
    batch_id: i64,
    selected: Option<&[usize]>,
    mapping: Option<&FieldMapping>,
) -> Result<()> {
    println!("⚙️  Processing batch {}...", batch_id);
    let summary = importer.process(batch_id, selected, mapping)?;

    match summary.status {
        ImportStatus::CompletedWithWarnings => println!("⚠️  Import finished with errors"),
        _ => println!("✅ Import complete!"),
    }
    println!("   Rows: {}", summary.total);
    println!("   Imported: {}", summary.imported);
    println!("   Skipped (duplicates): {}", summary.duplicates);
    if summary.errors > 0 {
        println!("   Errors: {}", summary.errors);
        println!("   Run 'fatura import items {}' for details.", batch_id);
    }

    Ok(())
}

pub fn cmd_import_list(db: &Database, user_id: i64, limit: i64) -> Result<()> {
    let batches = db.list_import_batches(user_id, limit)?;

    if batches.is_empty() {
        println!("No imports yet. Start one with:");
        println!("  fatura import upload extrato.ofx");
        return Ok(());
    }

    println!();
    println!("📥 Import Batches");
    println!("   ─────────────────────────────────────────────────────────────");

    for batch in batches {
        println!(
            "   [{}] {:<28} │ {:<4} │ {:<23} │ {}/{} imported, {} dup, {} err",
            batch.id,
            truncate(&batch.original_filename, 28),
            batch.format.as_str(),
            batch.status.as_str(),
            batch.imported_items,
            batch.total_items,
            batch.duplicate_items,
            batch.error_items
        );
        if let Some(log) = &batch.log {
            println!("       ❌ {}", log);
        }
    }

    Ok(())
}

pub fn cmd_import_items(db: &Database, batch_id: i64) -> Result<()> {
    let batch = db.require_import_batch(batch_id)?;
    let items = db.list_import_items(batch_id)?;

    println!();
    println!("📄 Items of batch {} ({})", batch.id, batch.original_filename);
    println!("   ─────────────────────────────────────────────────────────────");

    if items.is_empty() {
        println!("   (batch not processed yet)");
        return Ok(());
    }

    for item in items {
        let tx = item
            .transaction_id
            .map(|id| format!(" → tx {}", id))
            .unwrap_or_default();
        println!(
            "   [{}] {:<9} │ {} │ {:>10.2} │ {}{}",
            item.id,
            item.status.as_str(),
            item.record.date,
            item.record.amount,
            truncate(&item.record.description, 32),
            tx
        );
        if let Some(error) = &item.error {
            println!("        ❌ {}", error);
        }
    }

    Ok(())
}
