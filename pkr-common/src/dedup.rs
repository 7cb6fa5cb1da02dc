//! Duplicate submission detection
//!
//! The form occasionally "stutters" and records the same submission twice,
//! and people sometimes resubmit a day under a different group. Two keys
//! catch these:
//!
//! - primary fingerprint: every field except the timestamp. A repeat is an
//!   exact resubmission.
//! - secondary fingerprint: name plus everything from the day onwards,
//!   skipping the group. A repeat that is not also a primary repeat is
//!   "double counting".
//!
//! Rows are only reported here, never removed. See [`crate::correct`] for
//! the path that drops exact repeats.

use crate::row::{Row, DAY, NAME};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::info;

const SEPARATOR: &str = ",";

/// Dedup key derived from a subset of a row's present cells
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// All present cells after the timestamp
    pub fn primary(row: &Row) -> Self {
        Self(row.cells().skip(NAME).collect::<Vec<_>>().join(SEPARATOR))
    }

    /// Name plus all present cells from the day onwards
    pub fn secondary(row: &Row) -> Self {
        let tail = row.cells().skip(DAY);
        Self(
            std::iter::once(row.name.as_str())
                .chain(tail)
                .collect::<Vec<_>>()
                .join(SEPARATOR),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the deduplicator concluded about one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Unique,
    /// Exact resubmission of an earlier row
    Duplicate,
    /// Same person, day and figures as an earlier row under another group
    DoubleCounted { previous: String },
}

/// Outcome of a full pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupReport {
    pub primary_duplicates: usize,
    pub secondary_duplicates: usize,
    /// One line per double-counting hit, in row order
    pub diagnostics: Vec<String>,
    /// Data lines flagged as exact duplicates
    pub duplicate_lines: Vec<usize>,
}

/// Streaming deduplicator state
///
/// Feed rows in sheet order with [`Deduplicator::observe`]. The first
/// occurrence of a primary fingerprint wins. A secondary fingerprint
/// remembers the last row that did not trigger a double-counting report;
/// exact duplicates refresh it, reported rows do not.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<Fingerprint>,
    last_seen: HashMap<Fingerprint, String>,
    position: usize,
    report: DedupReport,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, row: &Row) -> Verdict {
        self.position += 1;
        let line = row.line_or(self.position);

        let primary = Fingerprint::primary(row);
        let duplicate = !self.seen.insert(primary.clone());
        if duplicate {
            self.report.primary_duplicates += 1;
            self.report.duplicate_lines.push(line);
        }

        let secondary = Fingerprint::secondary(row);
        let descriptor = format!("line {line}: {primary}");
        match self.last_seen.get(&secondary) {
            Some(previous) if !duplicate => {
                let previous = previous.clone();
                let diagnostic = format!("Double counting at line {line}: {previous}");
                info!("{}", diagnostic);
                self.report.diagnostics.push(diagnostic);
                self.report.secondary_duplicates += 1;
                Verdict::DoubleCounted { previous }
            }
            _ => {
                self.last_seen.insert(secondary, descriptor);
                if duplicate {
                    Verdict::Duplicate
                } else {
                    Verdict::Unique
                }
            }
        }
    }

    pub fn report(&self) -> &DedupReport {
        &self.report
    }

    pub fn finish(self) -> DedupReport {
        self.report
    }
}

/// Run a full pass over `rows`
pub fn deduplicate(rows: &[Row]) -> DedupReport {
    let mut dedup = Deduplicator::new();
    for row in rows {
        dedup.observe(row);
    }
    dedup.finish()
}
