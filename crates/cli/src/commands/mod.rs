//! Command handlers for the docqa CLI.
//!
//! Each command maps onto one retrieval pipeline operation.

pub mod documents;
pub mod ingest;
pub mod query;
pub mod status;

// Re-export command types for convenience
pub use documents::DocumentsCommand;
pub use ingest::IngestCommand;
pub use query::QueryCommand;
pub use status::StatusCommand;

use docqa_core::AppResult;
use serde::Serialize;

/// Print `value` as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
