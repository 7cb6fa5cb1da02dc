//! Group Splitter
//!
//! Routes corrected rows to one destination table per group.
//!
//! Each group moves through three states:
//!
//! - `Unknown`: not in the registry. The first row seen for it creates its
//!   table (header seeded into row 0) and registers it.
//! - `Registered`: has a table; rows accumulate in an in-memory buffer.
//! - `Flushed`: buffer written at the group's `next_row`, followed by a
//!   blank separator row, and the time of data stamped into the side cell.
//!
//! The group filter limits what is flushed, never what is discovered: every
//! group seen gets a table even if this run does not write to it.
//!
//! The registry is saved after every table creation and every flush, so
//! each persisted `next_row` matches what has actually been written up to
//! that point.

use crate::registry::GroupRegistry;
use crate::row::{Row, GROUP};
use crate::sink::TabularSink;
use crate::{Error, Result};
use chrono::Utc;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info};

/// Default side cell receiving the time of data
pub const DEFAULT_TIME_CELL: &str = "H1";

/// Splitter settings for one run
#[derive(Debug, Clone)]
pub struct SplitOptions {
    /// Column holding the group key
    pub group_key_index: usize,
    /// Seeded into row 0 of newly created tables
    pub header: Option<Vec<String>>,
    /// Written into `time_cell` of every flushed table
    pub time_of_data: String,
    pub time_cell: String,
    /// Groups to flush this run; empty means all
    pub groups: BTreeSet<String>,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            group_key_index: GROUP,
            header: None,
            time_of_data: String::new(),
            time_cell: DEFAULT_TIME_CELL.to_string(),
            groups: BTreeSet::new(),
        }
    }
}

/// Per-group lifecycle within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Unknown,
    Registered,
    Flushed,
}

/// One group's write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushRecord {
    pub group: String,
    /// 0-based row the block started at
    pub start_row: usize,
    /// Data rows written, separator excluded
    pub rows: usize,
    /// 1-based place among this run's flushes
    pub position: usize,
    /// Filter size, or every group seen when unfiltered
    pub total: usize,
}

impl FlushRecord {
    /// Progress line, e.g. `group Hikers (1/3)`
    pub fn progress(&self) -> String {
        format!("group {} ({}/{})", self.group, self.position, self.total)
    }
}

/// What a split run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitReport {
    /// Groups whose tables were created this run, in creation order
    pub created: Vec<String>,
    pub flushed: Vec<FlushRecord>,
    /// Groups buffered but excluded by the filter
    pub held: Vec<String>,
}

impl SplitReport {
    pub fn rows_written(&self) -> usize {
        self.flushed.iter().map(|f| f.rows).sum()
    }
}

/// Stateful splitter over an injected sink and registry
pub struct GroupSplitter<'a, S: TabularSink> {
    sink: &'a mut S,
    registry: &'a mut GroupRegistry,
    options: SplitOptions,
    buffers: Vec<(String, Vec<Row>)>,
    flushed: HashSet<String>,
    report: SplitReport,
}

impl<'a, S: TabularSink> GroupSplitter<'a, S> {
    pub fn new(sink: &'a mut S, registry: &'a mut GroupRegistry, options: SplitOptions) -> Self {
        Self {
            sink,
            registry,
            options,
            buffers: Vec::new(),
            flushed: HashSet::new(),
            report: SplitReport::default(),
        }
    }

    pub fn state(&self, group: &str) -> GroupState {
        if self.flushed.contains(group) {
            GroupState::Flushed
        } else if self.registry.contains(group) {
            GroupState::Registered
        } else {
            GroupState::Unknown
        }
    }

    /// Buffer `rows` by group, creating tables for unseen groups
    pub async fn partition(&mut self, rows: &[Row]) -> Result<()> {
        for (index, row) in rows.iter().enumerate() {
            let key = row
                .cell(self.options.group_key_index)
                .ok_or(Error::MissingGroupKey {
                    line: row.line_or(index + 1),
                    index: self.options.group_key_index,
                })?
                .to_string();

            if self.state(&key) == GroupState::Unknown {
                self.register(&key).await?;
            }

            match self.buffers.iter_mut().find(|(group, _)| *group == key) {
                Some((_, buffer)) => buffer.push(row.clone()),
                None => self.buffers.push((key, vec![row.clone()])),
            }
        }
        Ok(())
    }

    async fn register(&mut self, group: &str) -> Result<()> {
        let header = self.options.header.as_deref();
        let handle = self.sink.create_table(group, header).await?;
        info!(group = %group, url = %handle.url, "New sheet {}: {}", group, handle.url);

        let next_row = usize::from(header.is_some());
        self.registry.register(group, handle, next_row)?;
        self.registry.save()?;
        self.report.created.push(group.to_string());
        Ok(())
    }

    /// Write every selected group's buffer and return the run report
    pub async fn flush(mut self) -> Result<SplitReport> {
        let filter = std::mem::take(&mut self.options.groups);
        let total = if filter.is_empty() {
            self.buffers.len()
        } else {
            filter.len()
        };

        let buffers = std::mem::take(&mut self.buffers);
        let mut position = 0;
        for (group, rows) in buffers {
            if !filter.is_empty() && !filter.contains(&group) {
                self.report.held.push(group);
                continue;
            }
            position += 1;
            self.flush_group(&group, &rows, position, total).await?;
        }

        Ok(self.report)
    }

    async fn flush_group(&mut self, group: &str, rows: &[Row], position: usize, total: usize) -> Result<()> {
        let entry = self
            .registry
            .get(group)
            .ok_or_else(|| Error::NotFound(format!("registry entry for group {group}")))?;
        let table_id = entry.handle.id.clone();
        let record = FlushRecord {
            group: group.to_string(),
            start_row: entry.next_row,
            rows: rows.len(),
            position,
            total,
        };
        info!("{}", record.progress());

        let mut block: Vec<Vec<String>> = rows.iter().map(Row::to_cells).collect();
        let width = block.iter().map(Vec::len).max().unwrap_or(0);
        block.push(vec![String::new(); width]);

        debug!(group = %group, start_row = record.start_row, rows = rows.len(), "Writing group rows");
        self.sink.write_rows(&table_id, record.start_row, 0, &block).await?;
        self.sink
            .write_cell(&table_id, &self.options.time_cell, &self.options.time_of_data)
            .await?;

        if let Some(entry) = self.registry.get_mut(group) {
            entry.next_row += rows.len();
            entry.routed += rows.len();
            entry.last_flush_at = Some(Utc::now());
        }
        self.registry.save()?;

        self.flushed.insert(group.to_string());
        self.report.flushed.push(record);
        Ok(())
    }
}

/// Partition and flush in one call
pub async fn split<S: TabularSink>(
    sink: &mut S,
    registry: &mut GroupRegistry,
    rows: &[Row],
    options: SplitOptions,
) -> Result<SplitReport> {
    let mut splitter = GroupSplitter::new(sink, registry, options);
    splitter.partition(rows).await?;
    splitter.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{MemorySheets, SinkCall};

    fn row(name: &str, group: &str) -> Row {
        Row::from_cells(
            vec!["t".into(), name.into(), group.into(), "1".into(), "100".into(), "Yes".into()],
            0,
        )
        .unwrap()
    }

    fn options() -> SplitOptions {
        SplitOptions {
            header: Some(vec!["Timestamp".into(), "Name".into(), "Group".into()]),
            time_of_data: "Sat Oct 17 09:00:00 2026".into(),
            ..SplitOptions::default()
        }
    }

    #[tokio::test]
    async fn test_discovers_each_group_once_in_order() {
        let mut sheets = MemorySheets::new();
        let mut registry = GroupRegistry::in_memory();
        let rows = [row("a", "A"), row("b", "B"), row("c", "A")];

        let report = split(&mut sheets, &mut registry, &rows, options()).await.unwrap();

        assert_eq!(report.created, ["A", "B"]);
        assert_eq!(registry.names().collect::<Vec<_>>(), ["A", "B"]);
        let creates = sheets
            .calls()
            .iter()
            .filter(|c| matches!(c, SinkCall::Create { .. }))
            .count();
        assert_eq!(creates, 2);
    }

    #[tokio::test]
    async fn test_flush_writes_buffer_separator_and_time() {
        let mut sheets = MemorySheets::new();
        let mut registry = GroupRegistry::in_memory();
        let rows = [row("a", "A"), row("b", "B"), row("c", "A")];

        let report = split(&mut sheets, &mut registry, &rows, options()).await.unwrap();
        assert_eq!(report.rows_written(), 3);

        let a = registry.get("A").unwrap().clone();
        assert_eq!(a.next_row, 3);
        assert_eq!(a.routed, 2);
        assert!(a.last_flush_at.is_some());

        let table = sheets.table(&a.handle.id).unwrap();
        assert_eq!(table.cells[0][0], "Timestamp");
        assert_eq!(table.cells[0][7], "Sat Oct 17 09:00:00 2026");
        assert_eq!(table.cells[1][1], "a");
        assert_eq!(table.cells[2][1], "c");
        assert!(table.cells[3].iter().all(String::is_empty));
        assert_eq!(table.cells[3].len(), 6);
    }

    #[tokio::test]
    async fn test_filter_limits_writes_not_discovery() {
        let mut sheets = MemorySheets::new();
        let mut registry = GroupRegistry::in_memory();
        let rows = [row("a", "A"), row("b", "B")];
        let mut opts = options();
        opts.groups.insert("A".into());

        let report = split(&mut sheets, &mut registry, &rows, opts).await.unwrap();

        assert!(registry.contains("B"));
        assert_eq!(report.held, ["B"]);
        let b_id = registry.get("B").unwrap().handle.id.clone();
        let wrote_b = sheets.calls().iter().any(|c| match c {
            SinkCall::WriteRows { table_id, .. } | SinkCall::WriteCell { table_id, .. } => {
                *table_id == b_id
            }
            SinkCall::Create { .. } => false,
        });
        assert!(!wrote_b);
        assert_eq!(registry.get("B").unwrap().routed, 0);
    }

    #[tokio::test]
    async fn test_progress_counts_filter_not_groups_seen() {
        let mut sheets = MemorySheets::new();
        let mut registry = GroupRegistry::in_memory();
        let rows = [row("a", "A"), row("b", "B")];
        let mut opts = options();
        opts.groups.insert("A".into());

        let report = split(&mut sheets, &mut registry, &rows, opts).await.unwrap();

        let progress: Vec<_> = report.flushed.iter().map(FlushRecord::progress).collect();
        assert_eq!(progress, ["group A (1/1)"]);
    }

    #[tokio::test]
    async fn test_progress_counts_groups_seen_when_unfiltered() {
        let mut sheets = MemorySheets::new();
        let mut registry = GroupRegistry::in_memory();
        let rows = [row("a", "A"), row("b", "B"), row("c", "A")];

        let report = split(&mut sheets, &mut registry, &rows, options()).await.unwrap();

        let progress: Vec<_> = report.flushed.iter().map(FlushRecord::progress).collect();
        assert_eq!(progress, ["group A (1/2)", "group B (2/2)"]);
    }

    #[tokio::test]
    async fn test_existing_group_appends_at_offset() {
        let mut sheets = MemorySheets::new();
        let mut registry = GroupRegistry::in_memory();
        let handle = sheets.create_table("A", None).await.unwrap();
        registry.register("A", handle.clone(), 5).unwrap();

        let mut splitter = GroupSplitter::new(&mut sheets, &mut registry, options());
        assert_eq!(splitter.state("A"), GroupState::Registered);
        assert_eq!(splitter.state("Z"), GroupState::Unknown);
        splitter.partition(&[row("x", "A")]).await.unwrap();
        let report = splitter.flush().await.unwrap();

        assert!(report.created.is_empty());
        assert_eq!(
            report.flushed,
            vec![FlushRecord {
                group: "A".into(),
                start_row: 5,
                rows: 1,
                position: 1,
                total: 1,
            }]
        );
        assert_eq!(registry.get("A").unwrap().next_row, 6);
    }

    #[tokio::test]
    async fn test_table_without_header_starts_at_row_zero() {
        let mut sheets = MemorySheets::new();
        let mut registry = GroupRegistry::in_memory();
        let opts = SplitOptions {
            header: None,
            ..options()
        };

        let report = split(&mut sheets, &mut registry, &[row("a", "A")], opts).await.unwrap();
        assert_eq!(report.flushed[0].start_row, 0);
    }

    #[tokio::test]
    async fn test_sink_failure_propagates() {
        let mut sheets = MemorySheets::new();
        sheets.fail_on_call(2);
        let mut registry = GroupRegistry::in_memory();

        let err = split(&mut sheets, &mut registry, &[row("a", "A")], options())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Sink { .. }));
        // Registration survived, write progress did not advance
        assert_eq!(registry.get("A").unwrap().next_row, 1);
        assert_eq!(registry.get("A").unwrap().routed, 0);
    }

    #[tokio::test]
    async fn test_missing_group_key_is_fatal() {
        let mut sheets = MemorySheets::new();
        let mut registry = GroupRegistry::in_memory();
        let short = Row::from_cells(vec!["t".into(), "n".into()], 0).unwrap();

        let err = split(&mut sheets, &mut registry, &[short], options()).await.unwrap_err();
        assert!(matches!(err, Error::MissingGroupKey { .. }));
        assert!(sheets.calls().is_empty());
    }
}
