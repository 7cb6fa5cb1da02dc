//! Typed form-response rows
//!
//! Form responses arrive as ragged string rows: the spreadsheet API drops
//! trailing empty cells, so older or partially filled submissions are
//! shorter than the header. Each optional field here is `Some` exactly when
//! the source row reached that column, which keeps fingerprints faithful to
//! what was actually submitted.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Column of the submission timestamp
pub const TIMESTAMP: usize = 0;
/// Column of the respondent name
pub const NAME: usize = 1;
/// Column of the group the respondent walks with
pub const GROUP: usize = 2;
/// Column of the day of month
pub const DAY: usize = 3;
/// Column of the footstep count
pub const FOOTSTEPS: usize = 4;
/// Column of the litter-collected answer
pub const LITTER: usize = 5;

/// One form submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub timestamp: String,
    pub name: String,
    pub group: Option<String>,
    pub day: Option<String>,
    pub footsteps: Option<String>,
    pub litter: Option<String>,
    /// Cells past the litter column, kept verbatim
    #[serde(default)]
    pub extra: Vec<String>,
    /// 1-based data line in the source sheet; 0 when not read from a sheet
    #[serde(default)]
    pub line: usize,
}

impl Row {
    /// Build a row from raw cells read at data line `line`
    pub fn from_cells(cells: Vec<String>, line: usize) -> Result<Self> {
        if cells.len() <= NAME {
            return Err(Error::MalformedRow {
                line,
                width: cells.len(),
            });
        }

        let mut cells = cells.into_iter();
        let timestamp = cells.next().unwrap_or_default();
        let name = cells.next().unwrap_or_default();
        let group = cells.next();
        let day = cells.next();
        let footsteps = cells.next();
        let litter = cells.next();
        let extra = cells.collect();

        Ok(Self {
            timestamp,
            name,
            group,
            day,
            footsteps,
            litter,
            extra,
            line,
        })
    }

    /// Source line, or `position` for rows that were not read from a sheet
    pub fn line_or(&self, position: usize) -> usize {
        if self.line > 0 {
            self.line
        } else {
            position
        }
    }

    /// Number of cells the source row carried
    pub fn width(&self) -> usize {
        self.cells().count()
    }

    /// Present cells in column order
    pub fn cells(&self) -> impl Iterator<Item = &str> + '_ {
        [Some(&self.timestamp), Some(&self.name)]
            .into_iter()
            .chain([&self.group, &self.day, &self.footsteps, &self.litter].map(Option::as_ref))
            .map_while(|cell| cell.map(String::as_str))
            .chain(self.extra.iter().map(String::as_str))
    }

    /// Cell at `index`, if the source row reached that column
    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells().nth(index)
    }

    /// Owned cells, suitable for writing back to a sheet
    pub fn to_cells(&self) -> Vec<String> {
        self.cells().map(str::to_string).collect()
    }
}

/// Raw sheet contents split into header and data rows
#[derive(Debug, Clone, Default)]
pub struct SheetRows {
    /// First row of the range, written back as-is into new destinations
    pub header: Vec<String>,
    /// Data rows in sheet order
    pub rows: Vec<Row>,
}

/// Parse a fetched range: drop the header, keep at most `limit` data rows.
///
/// Completely empty rows are skipped with a warning. Each row keeps its
/// 1-based position among the data rows, counting skipped ones, so later
/// diagnostics name the line a reader sees in the sheet.
pub fn ingest(raw: Vec<Vec<String>>, limit: Option<usize>) -> Result<SheetRows> {
    let mut raw = raw.into_iter();
    let header = raw.next().unwrap_or_default();

    let take = limit.unwrap_or(usize::MAX);
    let mut rows = Vec::new();
    for (index, cells) in raw.take(take).enumerate() {
        let line = index + 1;
        if cells.iter().all(|c| c.is_empty()) {
            warn!(line, "Skipping empty row");
            continue;
        }
        rows.push(Row::from_cells(cells, line)?);
    }

    Ok(SheetRows { header, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_full_row_round_trips_cells() {
        let raw = cells(&["t", "Ann", "Hikers", "3", "12000", "Yes"]);
        let row = Row::from_cells(raw.clone(), 1).unwrap();
        assert_eq!(row.group.as_deref(), Some("Hikers"));
        assert_eq!(row.litter.as_deref(), Some("Yes"));
        assert_eq!(row.to_cells(), raw);
        assert_eq!(row.width(), 6);
    }

    #[test]
    fn test_short_row_keeps_only_present_fields() {
        let row = Row::from_cells(cells(&["t", "Ann", "Hikers", "3", "12000"]), 1).unwrap();
        assert_eq!(row.litter, None);
        assert_eq!(row.width(), 5);
        assert_eq!(row.cell(FOOTSTEPS), Some("12000"));
        assert_eq!(row.cell(LITTER), None);
    }

    #[test]
    fn test_extra_cells_follow_litter() {
        let row = Row::from_cells(cells(&["t", "Ann", "G", "3", "1", "No", "note"]), 1).unwrap();
        assert_eq!(row.extra, vec!["note".to_string()]);
        assert_eq!(row.cell(6), Some("note"));
    }

    #[test]
    fn test_row_without_name_is_malformed() {
        let err = Row::from_cells(cells(&["t"]), 4).unwrap_err();
        assert!(matches!(err, Error::MalformedRow { line: 4, width: 1 }));
    }

    #[test]
    fn test_ingest_drops_header_and_applies_limit() {
        let raw = vec![
            cells(&["Timestamp", "Name", "Group"]),
            cells(&["t1", "a", "G"]),
            cells(&["t2", "b", "G"]),
            cells(&["t3", "c", "G"]),
        ];
        let sheet = ingest(raw, Some(2)).unwrap();
        assert_eq!(sheet.header, cells(&["Timestamp", "Name", "Group"]));
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[1].name, "b");
    }

    #[test]
    fn test_ingest_skips_empty_rows() {
        let raw = vec![
            cells(&["Timestamp", "Name"]),
            vec![],
            cells(&["t1", "a"]),
        ];
        let sheet = ingest(raw, None).unwrap();
        assert_eq!(sheet.rows.len(), 1);
        assert_eq!(sheet.rows[0].line, 2);
    }

    #[test]
    fn test_line_or_prefers_source_line() {
        let read = Row::from_cells(cells(&["t", "Ann"]), 7).unwrap();
        let built = Row::from_cells(cells(&["t", "Ann"]), 0).unwrap();
        assert_eq!(read.line_or(3), 7);
        assert_eq!(built.line_or(3), 3);
    }

    #[test]
    fn test_ingest_of_empty_range() {
        let sheet = ingest(vec![], None).unwrap();
        assert!(sheet.header.is_empty());
        assert!(sheet.rows.is_empty());
    }
}
