//! pkr-sync library - Peaker form reconciliation tool
//!
//! Google Sheets adapter, retry policy and the command implementations
//! behind the `pkr-sync` binary.

pub mod commands;
pub mod retry;
pub mod sheets_client;

pub use sheets_client::SheetsClient;
