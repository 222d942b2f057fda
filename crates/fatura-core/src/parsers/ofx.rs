//! OFX/QFX statement parser
//!
//! Handles both OFX 2.x (XML, closed `</STMTTRN>` tags) and OFX 1.x SGML
//! where transaction blocks are never closed.

use std::str::FromStr;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use tracing::debug;

use super::{collapse_whitespace, StatementParser, PLACEHOLDER_DESCRIPTION};
use crate::error::Result;
use crate::models::{FieldMapping, ParsedRecord, StatementFormat, TransactionType};

struct OfxPatterns {
    header: Regex,
    closed_block: Regex,
    timezone: Regex,
    trntype: Regex,
    dtposted: Regex,
    trnamt: Regex,
    fitid: Regex,
    name: Regex,
    memo: Regex,
}

fn tag(name: &str) -> Regex {
    Regex::new(&format!(r"(?i)<{}>([^<\r\n]+)", name)).expect("valid regex")
}

fn patterns() -> &'static OfxPatterns {
    static PATTERNS: OnceLock<OfxPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| OfxPatterns {
        header: Regex::new(r"(?i)<OFX>|OFXHEADER").expect("valid regex"),
        closed_block: Regex::new(r"(?s)<STMTTRN>(.*?)</STMTTRN>").expect("valid regex"),
        timezone: Regex::new(r"\[.*\]").expect("valid regex"),
        trntype: tag("TRNTYPE"),
        dtposted: tag("DTPOSTED"),
        trnamt: tag("TRNAMT"),
        fitid: tag("FITID"),
        name: tag("NAME"),
        memo: tag("MEMO"),
    })
}

/// Parser for OFX bank exports
#[derive(Debug, Clone, Copy, Default)]
pub struct OfxParser;

impl StatementParser for OfxParser {
    fn format(&self) -> StatementFormat {
        StatementFormat::Ofx
    }

    fn supports(&self, content: &str) -> bool {
        patterns().header.is_match(content)
    }

    fn parse(&self, content: &str, _mapping: Option<&FieldMapping>) -> Result<Vec<ParsedRecord>> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);

        let records = transaction_blocks(content)
            .into_iter()
            .filter_map(|block| {
                let record = parse_block(block);
                if record.is_none() {
                    debug!("Skipping malformed OFX transaction block");
                }
                record
            })
            .collect();

        Ok(records)
    }
}

/// Bodies of the `<STMTTRN>` blocks, closed form first, SGML form otherwise
fn transaction_blocks(content: &str) -> Vec<&str> {
    let closed: Vec<&str> = patterns()
        .closed_block
        .captures_iter(content)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();
    if !closed.is_empty() {
        return closed;
    }

    const OPEN: &str = "<STMTTRN>";
    const LIST_END: &str = "</BANKTRANLIST";

    let mut blocks = Vec::new();
    let mut rest = content;
    while let Some(start) = rest.find(OPEN) {
        let body = &rest[start + OPEN.len()..];
        let end = [body.find(OPEN), body.find(LIST_END)]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(body.len());
        blocks.push(&body[..end]);
        rest = &body[end..];
    }
    blocks
}

fn tag_value(re: &Regex, block: &str) -> Option<String> {
    re.captures(block)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn parse_ofx_date(raw: &str) -> Option<NaiveDate> {
    let without_tz = patterns().timezone.replace(raw, "");
    let digits: String = without_tz.chars().take(8).collect();
    NaiveDate::parse_from_str(&digits, "%Y%m%d").ok()
}

fn parse_block(block: &str) -> Option<ParsedRecord> {
    let p = patterns();

    // Only presence matters; the amount sign decides the direction
    tag_value(&p.trntype, block)?;
    let date = parse_ofx_date(&tag_value(&p.dtposted, block)?)?;
    let raw_amount = tag_value(&p.trnamt, block)?;
    let amount = Decimal::from_str(&raw_amount.replace(',', ".")).ok()?;

    let kind = if amount > Decimal::ZERO {
        TransactionType::Income
    } else {
        TransactionType::Expense
    };

    let external_id = tag_value(&p.fitid, block).filter(|s| !s.is_empty());

    let name = tag_value(&p.name, block).unwrap_or_default();
    let memo = tag_value(&p.memo, block);
    let description = match memo {
        Some(memo) if !name.is_empty() => format!("{} - {}", name, memo),
        Some(memo) => memo,
        None => name,
    };
    let description = collapse_whitespace(&description);

    Some(ParsedRecord {
        date,
        description: if description.is_empty() {
            PLACEHOLDER_DESCRIPTION.to_string()
        } else {
            description
        },
        amount: amount.abs(),
        kind,
        external_id,
    })
}
