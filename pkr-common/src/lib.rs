//! # PKR Common Library
//!
//! Reconciliation engine for the Peaker step/litter form:
//! - Row ingestion and name canonicalization
//! - Duplicate detection and correction
//! - Per-group splitting against a persisted registry
//! - Per-day litter tally
//! - Configuration loading
//!
//! Transport lives elsewhere; everything here talks to spreadsheets through
//! the [`sink::TabularSource`] and [`sink::TabularSink`] traits.

pub mod config;
pub mod correct;
pub mod dedup;
pub mod error;
pub mod names;
pub mod registry;
pub mod row;
pub mod sink;
pub mod split;
pub mod tally;
pub mod time;

pub use error::{Error, Result};
pub use names::{canonicalize, AliasTable};
pub use row::Row;
