//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init and shared utilities (open_db, settings, storage, argument parsing)
//! - `cards` - Card management commands
//! - `cycles` - Statement cycle commands (list, close, pay, sweep, move)
//! - `import` - Statement import commands (upload, preview, process)
//! - `dedupe` - Fingerprint maintenance and duplicate checks
//! - `status` - Status, accounts and transaction listing

pub mod cards;
pub mod core;
pub mod cycles;
pub mod dedupe;
pub mod import;
pub mod status;

// Re-export command functions for main.rs
pub use cards::*;
pub use core::*;
pub use cycles::*;
pub use dedupe::*;
pub use import::*;
pub use status::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
