//! Domain models for fatura

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest amount a `decimal(15,2)` column can hold
pub fn max_amount() -> Decimal {
    Decimal::new(999_999_999_999_999, 2)
}

/// Round to cents (half away from zero) and always carry two fractional digits
pub fn round_money(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// A bank account owned by a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A credit card with fixed closing and due days
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    /// Day of month the statement closes (1-31)
    pub closing_day: u32,
    /// Day of month the statement is due (1-31)
    pub due_day: u32,
    pub credit_limit: Option<Decimal>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// A card to be created
#[derive(Debug, Clone)]
pub struct NewCard {
    pub user_id: i64,
    pub name: String,
    pub closing_day: u32,
    pub due_day: u32,
    pub credit_limit: Option<Decimal>,
}

impl NewCard {
    pub fn validate(&self) -> Result<()> {
        if !(1..=31).contains(&self.closing_day) {
            return Err(Error::InvalidData(format!(
                "closing day must be between 1 and 31, got {}",
                self.closing_day
            )));
        }
        if !(1..=31).contains(&self.due_day) {
            return Err(Error::InvalidData(format!(
                "due day must be between 1 and 31, got {}",
                self.due_day
            )));
        }
        if self.name.trim().is_empty() {
            return Err(Error::InvalidData("card name is required".into()));
        }
        Ok(())
    }
}

/// Lifecycle of a statement cycle: open -> closed -> paid, never backwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    #[default]
    Open,
    Closed,
    Paid,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Paid => "paid",
        }
    }
}

impl std::str::FromStr for CycleStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            "paid" => Ok(Self::Paid),
            _ => Err(format!("Unknown cycle status: {}", s)),
        }
    }
}

impl std::fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A card's billing period, unique per (card, month, year)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cycle {
    pub id: i64,
    pub card_id: i64,
    /// Reference month (1-12)
    pub month: u32,
    pub year: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: CycleStatus,
    /// Sum of the amounts assigned to this cycle
    pub total: Decimal,
}

/// Transaction direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Transfer => "transfer",
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            "transfer" => Ok(Self::Transfer),
            _ => Err(format!("Unknown transaction type: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment method used for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Pix,
    Debit,
    Credit,
    Cash,
    Boleto,
    Transfer,
    /// Consolidated payable amount of a closed statement cycle
    CardStatement,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pix => "pix",
            Self::Debit => "debit",
            Self::Credit => "credit",
            Self::Cash => "cash",
            Self::Boleto => "boleto",
            Self::Transfer => "transfer",
            Self::CardStatement => "card_statement",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pix" => Ok(Self::Pix),
            "debit" => Ok(Self::Debit),
            "credit" => Ok(Self::Credit),
            "cash" => Ok(Self::Cash),
            "boleto" => Ok(Self::Boleto),
            "transfer" => Ok(Self::Transfer),
            "card_statement" => Ok(Self::CardStatement),
            _ => Err(format!("Unknown payment method: {}", s)),
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub account_id: Option<i64>,
    pub card_id: Option<i64>,
    pub cycle_id: Option<i64>,
    pub date: NaiveDate,
    /// Description exactly as it came from the source
    pub description_original: String,
    /// Cleaned description (installment marker removed, etc.)
    pub description: Option<String>,
    /// Always a non-negative magnitude; direction lives in `kind`
    pub amount: Decimal,
    pub kind: TransactionType,
    pub payment_method: Option<PaymentMethod>,
    pub external_id: Option<String>,
    /// Content hash for duplicate detection
    pub fingerprint: Option<String>,
    pub is_installment: bool,
    pub installment_current: Option<u32>,
    pub installment_total: Option<u32>,
    /// First installment of the series this row belongs to
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Description to show: the cleaned one when present
    pub fn display_description(&self) -> &str {
        self.description
            .as_deref()
            .unwrap_or(&self.description_original)
    }
}

/// A transaction to be inserted
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: i64,
    pub account_id: Option<i64>,
    pub card_id: Option<i64>,
    pub cycle_id: Option<i64>,
    pub date: NaiveDate,
    pub description_original: String,
    pub description: Option<String>,
    pub amount: Decimal,
    pub kind: TransactionType,
    pub payment_method: Option<PaymentMethod>,
    pub external_id: Option<String>,
    pub fingerprint: Option<String>,
    pub is_installment: bool,
    pub installment_current: Option<u32>,
    pub installment_total: Option<u32>,
    pub parent_id: Option<i64>,
}

impl NewTransaction {
    /// A plain transaction with no links or installment data
    pub fn new(
        user_id: i64,
        date: NaiveDate,
        description: impl Into<String>,
        amount: Decimal,
        kind: TransactionType,
    ) -> Self {
        Self {
            user_id,
            account_id: None,
            card_id: None,
            cycle_id: None,
            date,
            description_original: description.into(),
            description: None,
            amount,
            kind,
            payment_method: None,
            external_id: None,
            fingerprint: None,
            is_installment: false,
            installment_current: None,
            installment_total: None,
            parent_id: None,
        }
    }

    /// Check the row invariants before it reaches the database
    pub fn validate(&self) -> Result<()> {
        if self.amount.is_sign_negative() && !self.amount.is_zero() {
            return Err(Error::InvalidData(format!(
                "amount must be a non-negative magnitude, got {}",
                self.amount
            )));
        }
        if self.amount > max_amount() {
            return Err(Error::InvalidData(format!(
                "amount {} exceeds the storable maximum {}",
                self.amount,
                max_amount()
            )));
        }
        if let Some(total) = self.installment_total {
            let current = self.installment_current.unwrap_or(0);
            if current < 1 || current > total {
                return Err(Error::InvalidData(format!(
                    "installment {}/{} is out of range",
                    current, total
                )));
            }
        }
        Ok(())
    }
}

/// Statement file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementFormat {
    /// OFX/QFX bank export
    Ofx,
    /// Delimited columns (CSV and friends)
    Delimited,
    /// Fixed-width or regex-described text lines
    FixedWidth,
}

impl StatementFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ofx => "ofx",
            Self::Delimited => "csv",
            Self::FixedWidth => "txt",
        }
    }

    /// Whether parsing needs a caller-supplied field mapping
    pub fn requires_mapping(&self) -> bool {
        !matches!(self, Self::Ofx)
    }

    /// Guess the format from a file extension
    pub fn from_extension(filename: &str) -> Self {
        let ext = std::path::Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "ofx" | "qfx" => Self::Ofx,
            "csv" => Self::Delimited,
            _ => Self::FixedWidth,
        }
    }
}

impl std::str::FromStr for StatementFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ofx" | "qfx" => Ok(Self::Ofx),
            "csv" | "delimited" => Ok(Self::Delimited),
            "txt" | "fixed_width" => Ok(Self::FixedWidth),
            _ => Err(format!("Unknown statement format: {}", s)),
        }
    }
}

impl std::fmt::Display for StatementFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How to locate record fields in a delimited or fixed-width statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FieldMapping {
    /// Column index per field (delimited files)
    Columns(ColumnMapping),
    /// Character offset and length per field (fixed-width files)
    Positional(PositionMapping),
    /// Regex capture group per field (free-form text files)
    Pattern(PatternMapping),
}

impl FieldMapping {
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Columns(_) => "columns",
            Self::Positional(_) => "positional",
            Self::Pattern(_) => "pattern",
        }
    }
}

fn default_true() -> bool {
    true
}

/// Column indexes for a delimited statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    #[serde(default = "default_true")]
    pub skip_header: bool,
    /// chrono format tried before the common fallbacks
    #[serde(default)]
    pub date_format: Option<String>,
    pub date: Option<usize>,
    #[serde(default)]
    pub description: Option<usize>,
    pub amount: Option<usize>,
    #[serde(default, rename = "type")]
    pub kind: Option<usize>,
    #[serde(default)]
    pub external_id: Option<usize>,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            skip_header: true,
            date_format: Some("%d/%m/%Y".to_string()),
            date: None,
            description: None,
            amount: None,
            kind: None,
            external_id: None,
        }
    }
}

/// A slice of a fixed-width line, in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpan {
    pub start: usize,
    pub length: usize,
}

/// Character spans for a fixed-width statement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionMapping {
    #[serde(default)]
    pub skip_header: bool,
    #[serde(default)]
    pub date_format: Option<String>,
    pub date: Option<FieldSpan>,
    #[serde(default)]
    pub description: Option<FieldSpan>,
    pub amount: Option<FieldSpan>,
    #[serde(default, rename = "type")]
    pub kind: Option<FieldSpan>,
    #[serde(default)]
    pub external_id: Option<FieldSpan>,
}

/// A capture group, by position or by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupRef {
    Index(usize),
    Name(String),
}

/// A regex and the capture group holding each field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMapping {
    pub pattern: String,
    #[serde(default)]
    pub skip_header: bool,
    #[serde(default)]
    pub date_format: Option<String>,
    pub date: Option<GroupRef>,
    #[serde(default)]
    pub description: Option<GroupRef>,
    pub amount: Option<GroupRef>,
    #[serde(default, rename = "type")]
    pub kind: Option<GroupRef>,
    #[serde(default)]
    pub external_id: Option<GroupRef>,
}

/// One normalized record out of a statement parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRecord {
    pub date: NaiveDate,
    pub description: String,
    /// Non-negative magnitude
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub external_id: Option<String>,
}

/// Import batch status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    CompletedWithWarnings,
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::CompletedWithWarnings => "completed_with_warnings",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for ImportStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "completed_with_warnings" => Ok(Self::CompletedWithWarnings),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown import status: {}", s)),
        }
    }
}

impl std::fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a single candidate row inside an import batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImportItemStatus {
    #[default]
    Pending,
    Imported,
    Duplicate,
    Error,
    Skipped,
}

impl ImportItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Imported => "imported",
            Self::Duplicate => "duplicate",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }
}

impl std::str::FromStr for ImportItemStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "imported" => Ok(Self::Imported),
            "duplicate" => Ok(Self::Duplicate),
            "error" => Ok(Self::Error),
            "skipped" => Ok(Self::Skipped),
            _ => Err(format!("Unknown import item status: {}", s)),
        }
    }
}

impl std::fmt::Display for ImportItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One uploaded statement file and its processing state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportBatch {
    pub id: i64,
    pub user_id: i64,
    pub account_id: Option<i64>,
    pub card_id: Option<i64>,
    pub original_filename: String,
    /// Storage key of the raw file
    pub file_path: String,
    pub format: StatementFormat,
    pub mapping: Option<FieldMapping>,
    pub status: ImportStatus,
    pub total_items: i64,
    pub imported_items: i64,
    pub duplicate_items: i64,
    pub error_items: i64,
    /// Failure message for a failed batch
    pub log: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An import batch to be created
#[derive(Debug, Clone)]
pub struct NewImportBatch {
    pub user_id: i64,
    pub account_id: Option<i64>,
    pub card_id: Option<i64>,
    pub original_filename: String,
    pub file_path: String,
    pub format: StatementFormat,
}

/// One candidate transaction inside a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportItem {
    pub id: i64,
    pub batch_id: i64,
    pub transaction_id: Option<i64>,
    pub record: ParsedRecord,
    pub fingerprint: String,
    pub status: ImportItemStatus,
    pub error: Option<String>,
}

/// Counters derived from the item statuses of a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportCounters {
    pub total: i64,
    pub imported: i64,
    pub duplicates: i64,
    pub errors: i64,
}
