//! Tabular source/sink capabilities
//!
//! The engine never talks to a spreadsheet service directly. It reads
//! ranges through [`TabularSource`] and creates/writes destination tables
//! through [`TabularSink`]. `pkr-sync` provides the Google Sheets
//! implementation; [`MemorySheets`] is the in-memory test double the
//! engine and command tests run against.

use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Destination table identity as returned by the sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableHandle {
    pub id: String,
    pub url: String,
}

/// Read side: rectangular ranges as ragged string rows
#[async_trait]
pub trait TabularSource: Send {
    /// Read `range` (A1 notation, optionally sheet-qualified) from `table_id`
    ///
    /// Missing trailing cells are simply absent.
    async fn fetch(&mut self, table_id: &str, range: &str) -> Result<Vec<Vec<String>>>;
}

/// Write side
#[async_trait]
pub trait TabularSink: Send {
    /// Create a new table titled `name`, seeding `header` into row 0 when given
    async fn create_table(&mut self, name: &str, header: Option<&[String]>) -> Result<TableHandle>;

    /// Write a contiguous block whose top-left cell is (`start_row`, `start_col`), 0-based
    ///
    /// The block spans as many columns as the widest row.
    async fn write_rows(
        &mut self,
        table_id: &str,
        start_row: usize,
        start_col: usize,
        rows: &[Vec<String>],
    ) -> Result<()>;

    /// Write a single cell at an A1 address such as `H1`
    async fn write_cell(&mut self, table_id: &str, cell: &str, value: &str) -> Result<()>;
}

/// Column letters for a 0-based column index: 0 → A, 25 → Z, 26 → AA
pub fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// A1 range of a `height` x `width` block whose top-left is (`start_row`, `start_col`), 0-based
///
/// `a1_range(0, 0, 2, 6) == "A1:F2"`. Zero rows or columns collapse to the
/// single top-left cell.
pub fn a1_range(start_row: usize, start_col: usize, height: usize, width: usize) -> String {
    let top_left = format!("{}{}", column_letters(start_col), start_row + 1);
    if height == 0 || width == 0 {
        return top_left;
    }
    format!(
        "{}:{}{}",
        top_left,
        column_letters(start_col + width - 1),
        start_row + height
    )
}

/// Parse an A1 cell address into 0-based (row, col)
pub fn parse_cell(cell: &str) -> Result<(usize, usize)> {
    let split = cell
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| invalid_cell(cell))?;
    let (letters, digits) = cell.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(invalid_cell(cell));
    }

    let col = letters
        .bytes()
        .try_fold(0usize, |acc, b| {
            acc.checked_mul(26)?
                .checked_add(usize::from(b.to_ascii_uppercase() - b'A') + 1)
        })
        .ok_or_else(|| invalid_cell(cell))?
        - 1;
    let row: usize = digits.parse().map_err(|_| invalid_cell(cell))?;
    if row == 0 {
        return Err(invalid_cell(cell));
    }
    Ok((row - 1, col))
}

fn invalid_cell(cell: &str) -> Error {
    Error::Config(format!("Invalid cell address: {cell:?}"))
}

/// Sink call record, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Create { name: String },
    WriteRows { table_id: String, start_row: usize, rows: usize },
    WriteCell { table_id: String, cell: String },
}

/// Table contents held by [`MemorySheets`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryTable {
    pub title: String,
    pub cells: Vec<Vec<String>>,
}

impl MemoryTable {
    fn put(&mut self, row: usize, col: usize, value: &str) {
        if self.cells.len() <= row {
            self.cells.resize(row + 1, Vec::new());
        }
        let line = &mut self.cells[row];
        if line.len() <= col {
            line.resize(col + 1, String::new());
        }
        line[col] = value.to_string();
    }

    /// Rows with at least one non-empty cell
    pub fn filled_rows(&self) -> usize {
        self.cells
            .iter()
            .filter(|row| row.iter().any(|c| !c.is_empty()))
            .count()
    }
}

/// In-memory spreadsheet service for tests
///
/// Sources are preloaded with [`MemorySheets::insert_range`]; created tables
/// get ids `mem-1`, `mem-2`, ... Every sink call is recorded, and an
/// injected failure makes the N-th mutation fail.
#[derive(Debug, Default)]
pub struct MemorySheets {
    ranges: HashMap<(String, String), Vec<Vec<String>>>,
    tables: HashMap<String, MemoryTable>,
    calls: Vec<SinkCall>,
    next_id: usize,
    fail_on_call: Option<usize>,
}

impl MemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `rows` for `fetch(table_id, range)`
    pub fn insert_range(&mut self, table_id: &str, range: &str, rows: Vec<Vec<String>>) {
        self.ranges
            .insert((table_id.to_string(), range.to_string()), rows);
    }

    /// Make the `n`-th sink mutation (1-based, counted over the lifetime) fail
    pub fn fail_on_call(&mut self, n: usize) {
        self.fail_on_call = Some(n);
    }

    pub fn calls(&self) -> &[SinkCall] {
        &self.calls
    }

    pub fn table(&self, id: &str) -> Option<&MemoryTable> {
        self.tables.get(id)
    }

    /// Register an existing table, e.g. one created by an earlier run
    pub fn insert_table(&mut self, id: &str, table: MemoryTable) {
        self.tables.insert(id.to_string(), table);
    }

    fn record(&mut self, call: SinkCall) -> Result<()> {
        self.calls.push(call);
        if self.fail_on_call == Some(self.calls.len()) {
            return Err(Error::Sink {
                operation: format!("{:?}", self.calls[self.calls.len() - 1]),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn table_mut(&mut self, id: &str) -> Result<&mut MemoryTable> {
        self.tables
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("table {id}")))
    }
}

#[async_trait]
impl TabularSource for MemorySheets {
    async fn fetch(&mut self, table_id: &str, range: &str) -> Result<Vec<Vec<String>>> {
        if let Some(rows) = self.ranges.get(&(table_id.to_string(), range.to_string())) {
            return Ok(rows.clone());
        }
        // Created tables are readable too, whatever the range
        self.tables
            .get(table_id)
            .map(|t| t.cells.clone())
            .ok_or_else(|| Error::NotFound(format!("{table_id}!{range}")))
    }
}

#[async_trait]
impl TabularSink for MemorySheets {
    async fn create_table(&mut self, name: &str, header: Option<&[String]>) -> Result<TableHandle> {
        self.record(SinkCall::Create {
            name: name.to_string(),
        })?;
        self.next_id += 1;
        let id = format!("mem-{}", self.next_id);
        let mut table = MemoryTable {
            title: name.to_string(),
            cells: Vec::new(),
        };
        if let Some(header) = header {
            table.cells.push(header.to_vec());
        }
        self.tables.insert(id.clone(), table);
        Ok(TableHandle {
            url: format!("memory://{id}"),
            id,
        })
    }

    async fn write_rows(
        &mut self,
        table_id: &str,
        start_row: usize,
        start_col: usize,
        rows: &[Vec<String>],
    ) -> Result<()> {
        self.record(SinkCall::WriteRows {
            table_id: table_id.to_string(),
            start_row,
            rows: rows.len(),
        })?;
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let table = self.table_mut(table_id)?;
        for (r, row) in rows.iter().enumerate() {
            for c in 0..width {
                let value = row.get(c).map(String::as_str).unwrap_or("");
                table.put(start_row + r, start_col + c, value);
            }
        }
        Ok(())
    }

    async fn write_cell(&mut self, table_id: &str, cell: &str, value: &str) -> Result<()> {
        self.record(SinkCall::WriteCell {
            table_id: table_id.to_string(),
            cell: cell.to_string(),
        })?;
        let (row, col) = parse_cell(cell)?;
        self.table_mut(table_id)?.put(row, col, value);
        Ok(())
    }
}
