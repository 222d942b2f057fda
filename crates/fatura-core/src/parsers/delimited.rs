//! Delimited (CSV-like) statement parser

use csv::{ReaderBuilder, StringRecord};
use rust_decimal::Decimal;
use tracing::debug;

use super::{parse_amount, parse_date, StatementParser, PLACEHOLDER_DESCRIPTION};
use crate::error::{Error, Result};
use crate::models::{ColumnMapping, FieldMapping, ParsedRecord, StatementFormat, TransactionType};

const DELIMITERS: [u8; 4] = [b';', b',', b'\t', b'|'];

/// Type column values that mean money coming in
const INCOME_MARKERS: [&str; 5] = ["c", "credito", "crédito", "credit", "+"];

/// Header keywords per field, checked with a case-insensitive substring match
const DATE_KEYWORDS: &[&str] = &["data", "date", "dt", "data da compra", "data transação"];
const DESCRIPTION_KEYWORDS: &[&str] = &[
    "descricao",
    "descrição",
    "description",
    "memo",
    "historico",
    "histórico",
    "estabelecimento",
];
const AMOUNT_KEYWORDS: &[&str] = &["valor", "value", "amount", "vl", "quantia"];
const TYPE_KEYWORDS: &[&str] = &["tipo", "type", "natureza", "dc", "d/c"];
const EXTERNAL_ID_KEYWORDS: &[&str] = &["id", "identificador", "codigo", "código", "nsu", "doc"];

/// Pick the delimiter that occurs most often in the first line
pub fn detect_delimiter(content: &str) -> u8 {
    let first_line = content.lines().next().unwrap_or("");
    let mut best = (b',', 0usize);
    for delim in DELIMITERS {
        let count = first_line.bytes().filter(|b| *b == delim).count();
        if count > best.1 {
            best = (delim, count);
        }
    }
    best.0
}

fn read_rows(content: &str) -> Vec<StringRecord> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut rdr = ReaderBuilder::new()
        .delimiter(detect_delimiter(content))
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    rdr.records()
        .filter_map(|row| match row {
            Ok(row) => Some(row),
            Err(e) => {
                debug!(error = %e, "Skipping unreadable delimited row");
                None
            }
        })
        .collect()
}

fn field<'a>(row: &'a StringRecord, col: Option<usize>) -> Option<&'a str> {
    col.and_then(|c| row.get(c))
}

fn map_row(row: &StringRecord, mapping: &ColumnMapping) -> Option<ParsedRecord> {
    let date = parse_date(field(row, mapping.date)?, mapping.date_format.as_deref())?;

    let description = field(row, mapping.description)
        .map(|d| d.trim().to_string())
        .unwrap_or_else(|| PLACEHOLDER_DESCRIPTION.to_string());

    let amount = parse_amount(field(row, mapping.amount)?)?;

    let kind = match field(row, mapping.kind) {
        Some(raw) => {
            let marker = raw.trim().to_lowercase();
            if INCOME_MARKERS.contains(&marker.as_str()) {
                TransactionType::Income
            } else {
                TransactionType::Expense
            }
        }
        None if amount >= Decimal::ZERO => TransactionType::Income,
        None => TransactionType::Expense,
    };

    let external_id = field(row, mapping.external_id)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    Some(ParsedRecord {
        date,
        description,
        amount: amount.abs(),
        kind,
        external_id,
    })
}

/// Parser for delimited column files
#[derive(Debug, Clone, Copy, Default)]
pub struct DelimitedParser;

impl DelimitedParser {
    /// Guess a column mapping from the header row
    ///
    /// Each header goes to the first field, in the order date, description,
    /// amount, type, external id, whose keywords it contains. A field keeps
    /// the first header that claimed it; a header whose field is already
    /// taken stays unmapped.
    pub fn suggest_mapping(&self, content: &str) -> ColumnMapping {
        let mut mapping = ColumnMapping::default();
        let rows = read_rows(content);
        let Some(header) = rows.first() else {
            return mapping;
        };

        for (index, name) in header.iter().enumerate() {
            let name = name.trim().to_lowercase();
            let hit = |keywords: &[&str]| keywords.iter().any(|k| name.contains(k));

            let slot = if hit(DATE_KEYWORDS) {
                &mut mapping.date
            } else if hit(DESCRIPTION_KEYWORDS) {
                &mut mapping.description
            } else if hit(AMOUNT_KEYWORDS) {
                &mut mapping.amount
            } else if hit(TYPE_KEYWORDS) {
                &mut mapping.kind
            } else if hit(EXTERNAL_ID_KEYWORDS) {
                &mut mapping.external_id
            } else {
                continue;
            };
            slot.get_or_insert(index);
        }

        mapping
    }
}

impl StatementParser for DelimitedParser {
    fn format(&self) -> StatementFormat {
        StatementFormat::Delimited
    }

    fn supports(&self, content: &str) -> bool {
        let mut lines = content.split('\n');
        let (Some(first), Some(second)) = (lines.next(), lines.next()) else {
            return false;
        };

        let delim = detect_delimiter(content);
        let count = |line: &str| line.bytes().filter(|b| *b == delim).count();
        let first_count = count(first);
        first_count > 0 && first_count == count(second)
    }

    fn parse(&self, content: &str, mapping: Option<&FieldMapping>) -> Result<Vec<ParsedRecord>> {
        let mapping = match mapping {
            Some(FieldMapping::Columns(cols)) => cols,
            Some(other) => {
                return Err(Error::Configuration(format!(
                    "delimited statements need a column mapping, got {}",
                    other.mode()
                )))
            }
            None => {
                return Err(Error::Configuration(
                    "a column mapping is required for delimited statements".into(),
                ))
            }
        };

        let skip = usize::from(mapping.skip_header);
        let records = read_rows(content)
            .iter()
            .skip(skip)
            .filter(|row| row.iter().any(|f| !f.trim().is_empty()))
            .filter_map(|row| {
                let record = map_row(row, mapping);
                if record.is_none() {
                    debug!(row = ?row, "Skipping delimited row without a usable date or amount");
                }
                record
            })
            .collect();

        Ok(records)
    }
}
