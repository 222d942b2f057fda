//! Installment markers in free-text descriptions ("PARC 02/12", "parcela 3 de 6")

use std::sync::OnceLock;

use chrono::{Months, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Installment position parsed out of a description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentInfo {
    pub current: u32,
    pub total: u32,
    /// Description with the marker removed and whitespace collapsed
    pub cleaned_description: String,
}

/// Marker patterns, most specific first
fn patterns() -> &'static [Regex; 4] {
    static PATTERNS: OnceLock<[Regex; 4]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // PARC 02/12, *PARC 02/12, PARC.02/12
            Regex::new(r"(?i)\*?PARC\.?\s*(\d{1,2})/(\d{1,2})").expect("valid regex"),
            // parcela 2 de 12
            Regex::new(r"(?i)parcela\s+(\d{1,2})\s+de\s+(\d{1,2})").expect("valid regex"),
            // trailing 02/12
            Regex::new(r"\s(\d{1,2})/(\d{1,2})$").expect("valid regex"),
            // 02/12 between spaces
            Regex::new(r"\s(\d{1,2})/(\d{1,2})\s").expect("valid regex"),
        ]
    })
}

/// Detect an installment marker.
///
/// The first pattern whose first match has `current >= 1`, `total > 1` and
/// `current <= total` wins. Returns `None` when no pattern qualifies.
pub fn parse(description: &str) -> Option<InstallmentInfo> {
    for re in patterns() {
        let Some(caps) = re.captures(description) else {
            continue;
        };
        let (Some(whole), Some(cur), Some(tot)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let (Ok(current), Ok(total)) = (cur.as_str().parse::<u32>(), tot.as_str().parse::<u32>())
        else {
            continue;
        };

        if current > 0 && total > 1 && current <= total {
            return Some(InstallmentInfo {
                current,
                total,
                cleaned_description: clean_description(description, whole.as_str()),
            });
        }
    }
    None
}

fn clean_description(description: &str, marker: &str) -> String {
    description
        .replace(marker, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Shift a date by whole months, clamping the day to the target month's length
pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months)).unwrap_or(date)
}

/// Estimated purchase date of a series, given the charge date of installment `current`.
///
/// Installment 2 charged in November was bought in October.
pub fn original_purchase_date(charge_date: NaiveDate, current: u32) -> NaiveDate {
    let back = current.saturating_sub(1);
    charge_date
        .checked_sub_months(Months::new(back))
        .unwrap_or(charge_date)
}
