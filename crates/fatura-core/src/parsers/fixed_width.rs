//! Fixed-width and pattern text statement parser

use regex::{Captures, Regex};
use rust_decimal::Decimal;
use tracing::debug;

use super::{parse_amount, parse_date, StatementParser, PLACEHOLDER_DESCRIPTION};
use crate::error::{Error, Result};
use crate::models::{
    FieldMapping, FieldSpan, GroupRef, ParsedRecord, PatternMapping, PositionMapping,
    StatementFormat, TransactionType,
};

/// Lines sampled by [`FixedWidthParser::supports`]
const SNIFF_LINES: usize = 10;
/// Largest line-length standard deviation still considered fixed-width
const MAX_LENGTH_DEVIATION: f64 = 5.0;

/// Raw field values pulled out of one line
struct RawFields {
    date: Option<String>,
    description: Option<String>,
    amount: Option<String>,
    kind: Option<String>,
    external_id: Option<String>,
}

fn slice(line: &str, span: Option<FieldSpan>) -> Option<String> {
    span.map(|s| {
        line.chars()
            .skip(s.start)
            .take(s.length)
            .collect::<String>()
            .trim()
            .to_string()
    })
}

fn group(caps: &Captures<'_>, group: Option<&GroupRef>) -> Option<String> {
    let m = match group? {
        GroupRef::Index(i) => caps.get(*i),
        GroupRef::Name(name) => caps.name(name),
    };
    m.map(|m| m.as_str().trim().to_string())
}

fn build_record(fields: RawFields, date_format: Option<&str>) -> Option<ParsedRecord> {
    let date = parse_date(fields.date.as_deref()?, date_format)?;
    let amount = parse_amount(fields.amount.as_deref()?)?;

    let description = fields
        .description
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| PLACEHOLDER_DESCRIPTION.to_string());

    let kind = match fields.kind {
        Some(k) if k.eq_ignore_ascii_case("c") => TransactionType::Income,
        Some(_) => TransactionType::Expense,
        None if amount >= Decimal::ZERO => TransactionType::Income,
        None => TransactionType::Expense,
    };

    Some(ParsedRecord {
        date,
        description,
        amount: amount.abs(),
        kind,
        external_id: fields.external_id.filter(|s| !s.is_empty()),
    })
}

fn positional(line: &str, m: &PositionMapping) -> Option<ParsedRecord> {
    let fields = RawFields {
        date: slice(line, m.date),
        description: slice(line, m.description),
        amount: slice(line, m.amount),
        kind: slice(line, m.kind),
        external_id: slice(line, m.external_id),
    };
    build_record(fields, m.date_format.as_deref())
}

fn pattern(line: &str, re: &Regex, m: &PatternMapping) -> Option<ParsedRecord> {
    let caps = re.captures(line)?;
    let fields = RawFields {
        date: group(&caps, m.date.as_ref()),
        description: group(&caps, m.description.as_ref()),
        amount: group(&caps, m.amount.as_ref()),
        kind: group(&caps, m.kind.as_ref()),
        external_id: group(&caps, m.external_id.as_ref()),
    };
    build_record(fields, m.date_format.as_deref())
}

/// Lines to parse: header dropped if asked, trailing whitespace trimmed, blanks skipped
fn data_lines(content: &str, skip_header: bool) -> impl Iterator<Item = &str> {
    content
        .lines()
        .skip(usize::from(skip_header))
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
}

/// Parser for fixed-width and regex-described text files
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedWidthParser;

impl StatementParser for FixedWidthParser {
    fn format(&self) -> StatementFormat {
        StatementFormat::FixedWidth
    }

    fn supports(&self, content: &str) -> bool {
        let lengths: Vec<f64> = content
            .split('\n')
            .take(SNIFF_LINES)
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.trim_end_matches('\r').chars().count() as f64)
            .collect();

        if lengths.len() < 3 {
            return false;
        }

        let n = lengths.len() as f64;
        let mean = lengths.iter().sum::<f64>() / n;
        let variance = lengths.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / n;
        variance.sqrt() < MAX_LENGTH_DEVIATION
    }

    fn parse(&self, content: &str, mapping: Option<&FieldMapping>) -> Result<Vec<ParsedRecord>> {
        let records: Vec<ParsedRecord> = match mapping {
            Some(FieldMapping::Positional(m)) => data_lines(content, m.skip_header)
                .filter_map(|line| {
                    let record = positional(line, m);
                    if record.is_none() {
                        debug!(line, "Skipping fixed-width line without a usable date or amount");
                    }
                    record
                })
                .collect(),
            Some(FieldMapping::Pattern(m)) => {
                let re = Regex::new(&m.pattern).map_err(|e| {
                    Error::Configuration(format!("invalid line pattern {:?}: {}", m.pattern, e))
                })?;
                data_lines(content, m.skip_header)
                    .filter_map(|line| {
                        let record = pattern(line, &re, m);
                        if record.is_none() {
                            debug!(line, "Skipping text line that does not match the pattern");
                        }
                        record
                    })
                    .collect()
            }
            Some(FieldMapping::Columns(_)) => {
                return Err(Error::Configuration(
                    "text statements need a positional or pattern mapping, got columns".into(),
                ))
            }
            None => {
                return Err(Error::Configuration(
                    "a positional or pattern mapping is required for text statements".into(),
                ))
            }
        };

        Ok(records)
    }
}
