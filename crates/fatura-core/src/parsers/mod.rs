//! Statement file parsers
//!
//! Three interchangeable parsers turn raw statement content into
//! [`ParsedRecord`]s:
//! - `ofx` - OFX/QFX bank exports, fixed grammar, no mapping
//! - `delimited` - CSV-like column files, needs a column mapping
//! - `fixed_width` - positional or regex-described text lines, needs a mapping
//!
//! Malformed lines or blocks are skipped; a missing or wrong mapping is a
//! configuration error for the whole call.

use chrono::{Datelike, NaiveDate};

use crate::error::Result;
use crate::models::{FieldMapping, ParsedRecord, StatementFormat};

mod amount;
pub mod delimited;
pub mod fixed_width;
pub mod ofx;

pub use amount::parse_amount;
pub use delimited::DelimitedParser;
pub use fixed_width::FixedWidthParser;
pub use ofx::OfxParser;

/// Description used when a record has none
pub const PLACEHOLDER_DESCRIPTION: &str = "No description";

/// Date formats tried after the mapping's own format
const FALLBACK_DATE_FORMATS: [&str; 5] = ["%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d", "%d/%m/%y", "%Y/%m/%d"];

/// A statement format parser
pub trait StatementParser: Send + Sync {
    /// Format tag this parser handles
    fn format(&self) -> StatementFormat;

    /// Fast structural sniff of the content
    fn supports(&self, content: &str) -> bool;

    /// Parse content into normalized records
    fn parse(&self, content: &str, mapping: Option<&FieldMapping>) -> Result<Vec<ParsedRecord>>;
}

/// Parsers in detection priority order
pub fn parsers() -> [&'static dyn StatementParser; 3] {
    [&OfxParser, &DelimitedParser, &FixedWidthParser]
}

/// The parser for a stored format tag
pub fn parser_for(format: StatementFormat) -> &'static dyn StatementParser {
    match format {
        StatementFormat::Ofx => &OfxParser,
        StatementFormat::Delimited => &DelimitedParser,
        StatementFormat::FixedWidth => &FixedWidthParser,
    }
}

/// Decode raw file bytes: UTF-8 when valid, Latin-1 otherwise. A leading BOM is dropped.
pub fn decode_content(bytes: &[u8]) -> String {
    let text = match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    };
    match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

/// Detect the statement format by content sniffing, then by file extension
pub fn detect_format(content: &str, filename: &str) -> StatementFormat {
    parsers()
        .iter()
        .find(|p| p.supports(content))
        .map(|p| p.format())
        .unwrap_or_else(|| StatementFormat::from_extension(filename))
}

/// Parse a date with an optional preferred chrono format, then the fallbacks
pub(crate) fn parse_date(raw: &str, preferred: Option<&str>) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    preferred
        .into_iter()
        .chain(FALLBACK_DATE_FORMATS)
        .filter_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        // %Y happily reads "25" as year 25; let the two-digit format handle that
        .find(|date| date.year() >= 1900)
}

/// Collapse whitespace runs and trim
pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
