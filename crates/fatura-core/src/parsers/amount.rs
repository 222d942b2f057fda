//! Amount parsing with regional format detection

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;

struct AmountPatterns {
    /// 1.234,56
    dot_thousands: Regex,
    /// 1,234.56
    comma_thousands: Regex,
}

fn amount_patterns() -> &'static AmountPatterns {
    static PATTERNS: OnceLock<AmountPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| AmountPatterns {
        dot_thousands: Regex::new(r"\d{1,3}\.\d{3},\d{2}$").expect("valid regex"),
        comma_thousands: Regex::new(r"\d{1,3},\d{3}\.\d{2}$").expect("valid regex"),
    })
}

/// Parse a signed amount written in any of the common regional styles.
///
/// Currency marks (`R`, `$`) and whitespace are dropped, and a value in
/// parentheses is negative. The separators are picked by the first rule that
/// matches: dot thousands with decimal comma, then comma thousands with
/// decimal dot, then a lone comma as the decimal mark.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let mut s: String = raw
        .chars()
        .filter(|c| !matches!(c, 'R' | '$') && !c.is_whitespace())
        .collect();

    let mut negative = false;
    if s.starts_with('(') && s.ends_with(')') && s.len() > 2 {
        negative = true;
        s = s[1..s.len() - 1].to_string();
    }
    if let Some(rest) = s.strip_prefix('+') {
        s = rest.to_string();
    }

    let patterns = amount_patterns();
    let normalized = if patterns.dot_thousands.is_match(&s) {
        s.replace('.', "").replace(',', ".")
    } else if patterns.comma_thousands.is_match(&s) {
        s.replace(',', "")
    } else {
        s.replace(',', ".")
    };

    let value = Decimal::from_str(&normalized).ok()?;
    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_regional_formats() {
        assert_eq!(parse_amount("1.234,56"), Some(dec("1234.56")));
        assert_eq!(parse_amount("1,234.56"), Some(dec("1234.56")));
        assert_eq!(parse_amount("1234,56"), Some(dec("1234.56")));
        assert_eq!(parse_amount("1234.56"), Some(dec("1234.56")));
        assert_eq!(parse_amount("1.234.567,89"), Some(dec("1234567.89")));
    }

    #[test]
    fn test_signs_and_currency() {
        assert_eq!(parse_amount("R$ -45,90"), Some(dec("-45.90")));
        assert_eq!(parse_amount("-R$ 1.000,00"), Some(dec("-1000.00")));
        assert_eq!(parse_amount("$ 12.00"), Some(dec("12.00")));
        assert_eq!(parse_amount("(100,00)"), Some(dec("-100.00")));
        assert_eq!(parse_amount("+50,00"), Some(dec("50.00")));
    }

    #[test]
    fn test_garbage_is_none() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("1.2.3"), None);
    }
}
