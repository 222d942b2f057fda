//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Fatura - Credit card statements and bank imports
#[derive(Parser)]
#[command(name = "fatura")]
#[command(about = "Credit card statement cycles and bank statement imports", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "fatura.db", global = true)]
    pub db: PathBuf,

    /// User whose data the command works on
    #[arg(long, default_value_t = 1, global = true)]
    pub user: i64,

    /// Settings file overriding the built-in defaults
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set FATURA_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Show database status (encryption, size, counts)
    Status,

    /// Manage bank accounts
    Accounts {
        #[command(subcommand)]
        action: Option<AccountsAction>,
    },

    /// Manage credit cards
    Cards {
        #[command(subcommand)]
        action: Option<CardsAction>,
    },

    /// Statement cycles of a card
    Cycles {
        #[command(subcommand)]
        action: CyclesAction,
    },

    /// Import bank and card statements
    Import {
        #[command(subcommand)]
        action: ImportAction,
    },

    /// List recent transactions
    Transactions {
        /// Number of transactions to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Duplicate detection maintenance
    Dedupe {
        #[command(subcommand)]
        action: DedupeAction,
    },
}

#[derive(Subcommand)]
pub enum AccountsAction {
    /// List accounts
    List,

    /// Add an account (returns the existing one if the name is taken)
    Add {
        /// Account name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum CardsAction {
    /// List cards
    List {
        /// Include deactivated cards
        #[arg(long)]
        all: bool,
    },

    /// Add a card
    Add {
        /// Card name
        name: String,

        /// Day of the month the statement closes (1-31)
        #[arg(long)]
        closing_day: u32,

        /// Day of the month the statement is due (1-31)
        #[arg(long)]
        due_day: u32,

        /// Credit limit (e.g., 5000.00)
        #[arg(long)]
        limit: Option<String>,
    },

    /// Deactivate a card
    Deactivate {
        /// Card ID
        id: i64,
    },

    /// Reactivate a card
    Activate {
        /// Card ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum CyclesAction {
    /// List the cycles of a card
    List {
        /// Card ID
        card: i64,

        /// Only open and closed cycles
        #[arg(long)]
        pending: bool,
    },

    /// Show (creating if needed) the cycle a purchase date falls in
    Find {
        /// Card ID
        card: i64,

        /// Purchase date (YYYY-MM-DD)
        date: String,
    },

    /// Create cycles for this month and the next ones
    Generate {
        /// Card ID
        card: i64,

        /// Months ahead (defaults to the configured value)
        #[arg(long)]
        months: Option<u32>,
    },

    /// Close a cycle and write its statement transaction
    Close {
        /// Cycle ID
        id: i64,
    },

    /// Mark a cycle paid
    Pay {
        /// Cycle ID
        id: i64,
    },

    /// Close every open cycle whose period has ended
    Sweep {
        /// Reference date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        today: Option<String>,
    },

    /// Show the transactions of a cycle
    Show {
        /// Cycle ID
        id: i64,
    },

    /// Show a card's remaining credit limit
    Limit {
        /// Card ID
        card: i64,
    },

    /// Move a card purchase to another date and re-assign its cycle
    Move {
        /// Card ID
        card: i64,

        /// Transaction ID
        transaction: i64,

        /// New date (YYYY-MM-DD)
        date: String,
    },
}

#[derive(Subcommand)]
pub enum ImportAction {
    /// Upload a statement file and create a pending batch
    Upload {
        /// Statement file (.ofx, .qfx, .csv, .txt)
        file: PathBuf,

        /// Account ID the statement belongs to
        #[arg(long)]
        account: Option<i64>,

        /// Card ID for credit card statements
        #[arg(long)]
        card: Option<i64>,
    },

    /// Suggest a column mapping for a CSV batch
    Suggest {
        /// Batch ID
        batch: i64,

        /// Save the suggestion on the batch
        #[arg(long)]
        save: bool,
    },

    /// Preview the parsed rows of a batch
    Preview {
        /// Batch ID
        batch: i64,

        /// JSON mapping file (defaults to the saved mapping)
        #[arg(long)]
        mapping: Option<PathBuf>,

        /// Output JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Process a batch into transactions
    Process {
        /// Batch ID
        batch: i64,

        /// Row indexes to import, comma separated (defaults to all rows)
        #[arg(long, value_delimiter = ',')]
        select: Vec<usize>,

        /// JSON mapping file (defaults to the saved mapping)
        #[arg(long)]
        mapping: Option<PathBuf>,
    },

    /// List import batches
    List {
        /// Number of batches to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Show the items of a batch
    Items {
        /// Batch ID
        batch: i64,
    },
}

#[derive(Subcommand)]
pub enum DedupeAction {
    /// Recompute stored fingerprints
    Rehash {
        /// Rehash every user's transactions, not only --user
        #[arg(long)]
        all_users: bool,

        /// Only fill in missing fingerprints
        #[arg(long)]
        only_missing: bool,
    },

    /// Check whether a transaction would be a duplicate
    Check {
        /// Date (YYYY-MM-DD)
        date: String,

        /// Amount (e.g., 45.90)
        amount: String,

        /// Description as it appears on the statement
        description: String,

        /// External ID from the bank, if any
        #[arg(long)]
        external_id: Option<String>,
    },
}
