//! Fatura Core Library
//!
//! Shared functionality for the Fatura statement tool:
//! - Database access and migrations (SQLCipher)
//! - Credit card statement cycles and their consolidated statements
//! - Statement parsers for OFX, delimited and fixed-width files
//! - Import batches with preview, duplicate detection and installments
//! - Content fingerprints for deduplication
//! - Blob storage for uploaded files

pub mod config;
pub mod cycles;
pub mod db;
pub mod dedupe;
pub mod error;
pub mod import;
pub mod installments;
pub mod models;
pub mod parsers;
pub mod storage;

pub use config::Settings;
pub use cycles::{CycleBounds, CycleEngine};
pub use db::Database;
pub use error::{Error, Result};
pub use import::{ImportSummary, Importer, PreviewRow};
pub use installments::InstallmentInfo;
pub use parsers::StatementParser;
pub use storage::{LocalStorage, MemoryStorage, Storage};
