//! Correction pass: drop exact resubmissions and resolve names

use crate::dedup::Fingerprint;
use crate::names::AliasTable;
use crate::row::Row;
use std::collections::HashSet;
use tracing::debug;

/// Corrected copy of `rows`
///
/// **Algorithm:**
/// 1. Keep at most `limit` rows (all when `None`)
/// 2. Fingerprint each row before touching its name
/// 3. Drop rows whose fingerprint was already seen
/// 4. Replace the name of every kept row with its resolved alias
///
/// Kept rows stay in their original relative order. A header row, if the
/// caller passes one, is treated like any other row.
pub fn correct(rows: &[Row], aliases: &AliasTable, limit: Option<usize>) -> Vec<Row> {
    let span = &rows[..limit.map_or(rows.len(), |n| n.min(rows.len()))];
    let mut seen = HashSet::with_capacity(span.len());
    let mut kept = Vec::with_capacity(span.len());

    for row in span {
        if !seen.insert(Fingerprint::primary(row)) {
            debug!(name = %row.name, timestamp = %row.timestamp, "Dropping exact resubmission");
            continue;
        }
        let mut row = row.clone();
        row.name = aliases.resolve(&row.name);
        kept.push(row);
    }

    debug!(input = span.len(), kept = kept.len(), "Correction pass complete");
    kept
}
