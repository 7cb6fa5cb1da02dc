//! Command implementations
//!
//! One function per tool: duplicate report, corrected master copy, group
//! split, litter tally. Each fetches the form once, drops the header,
//! applies the row limit, and works on the resulting rows. All of them are
//! generic over the capability traits so they run equally against the
//! Sheets API or [`pkr_common::sink::MemorySheets`].

use crate::sheets_client::DEFAULT_SHEET;
use pkr_common::config::TomlConfig;
use pkr_common::correct::correct;
use pkr_common::dedup::{deduplicate, DedupReport};
use pkr_common::registry::GroupRegistry;
use pkr_common::row::{self, Row, SheetRows};
use pkr_common::sink::{TabularSink, TabularSource};
use pkr_common::split::{split, SplitOptions, SplitReport};
use pkr_common::tally::{tally_litter, LitterTally};
use pkr_common::{time, AliasTable, Error, Result};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Form rows plus when they were fetched
#[derive(Debug, Clone)]
pub struct FormSnapshot {
    pub sheet: SheetRows,
    pub time_of_data: String,
}

/// Fetch the form responses, drop the header, keep at most `limit` rows
pub async fn fetch_form<S: TabularSource>(
    sheets: &mut S,
    config: &TomlConfig,
    limit: Option<usize>,
) -> Result<FormSnapshot> {
    let raw = sheets
        .fetch(&config.source.spreadsheet_id, &config.source.range)
        .await?;
    let time_of_data = time::time_of_data();
    info!("Got data at {}", time_of_data);

    let sheet = row::ingest(raw, limit)?;
    info!(rows = sheet.rows.len(), "Number of entries");
    Ok(FormSnapshot {
        sheet,
        time_of_data,
    })
}

/// Load the alias sheet; empty when none is configured
pub async fn load_aliases<S: TabularSource>(sheets: &mut S, config: &TomlConfig) -> Result<AliasTable> {
    let Some(range) = &config.source.alias_range else {
        return Ok(AliasTable::new());
    };
    let rows = sheets
        .fetch(config.source.alias_spreadsheet_id(), range)
        .await?;
    let aliases = AliasTable::from_rows(&rows);
    info!(aliases = aliases.len(), "Loaded alias table");
    Ok(aliases)
}

/// Duplicate report over the form
pub async fn find_duplicates<S: TabularSource>(
    sheets: &mut S,
    config: &TomlConfig,
    limit: Option<usize>,
) -> Result<DedupReport> {
    let form = fetch_form(sheets, config, limit).await?;
    Ok(deduplicate(&form.sheet.rows))
}

/// Result of writing the corrected master copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectionSummary {
    pub input_rows: usize,
    pub kept_rows: usize,
}

impl CorrectionSummary {
    pub fn dropped_rows(&self) -> usize {
        self.input_rows - self.kept_rows
    }
}

/// Correct the form and overwrite the master destination with it
pub async fn write_corrected<S: TabularSource + TabularSink>(
    sheets: &mut S,
    config: &TomlConfig,
    limit: Option<usize>,
) -> Result<CorrectionSummary> {
    let master = master_id(config)?;
    let form = fetch_form(sheets, config, limit).await?;
    let aliases = load_aliases(sheets, config).await?;
    let corrected = correct(&form.sheet.rows, &aliases, None);

    write_master(sheets, config, master, &form, &corrected).await?;
    Ok(CorrectionSummary {
        input_rows: form.sheet.rows.len(),
        kept_rows: corrected.len(),
    })
}

/// Full reconciliation: dedup report, correction, optional master copy,
/// then split the rows not yet routed into per-group tables
pub async fn split_groups<S: TabularSource + TabularSink>(
    sheets: &mut S,
    config: &TomlConfig,
    registry: &mut GroupRegistry,
    limit: Option<usize>,
    groups: &[String],
) -> Result<SplitReport> {
    let form = fetch_form(sheets, config, limit).await?;
    let aliases = load_aliases(sheets, config).await?;

    let report = deduplicate(&form.sheet.rows);
    info!(
        duplicates = report.primary_duplicates,
        double_counted = report.secondary_duplicates,
        "Duplicate scan complete"
    );

    let corrected = correct(&form.sheet.rows, &aliases, None);
    if let Some(master) = config.output.corrected_spreadsheet_id.as_deref() {
        write_master(sheets, config, master, &form, &corrected).await?;
    }

    let fresh = registry.unrouted(&corrected, row::GROUP)?;
    info!(corrected = corrected.len(), fresh = fresh.len(), "Rows to route");

    let options = SplitOptions {
        group_key_index: row::GROUP,
        header: Some(form.sheet.header.clone()).filter(|h| !h.is_empty()),
        time_of_data: form.time_of_data.clone(),
        time_cell: config.output.time_cell.clone(),
        groups: groups.iter().cloned().collect::<BTreeSet<_>>(),
    };
    split(sheets, registry, &fresh, options).await
}

/// Per-day litter tally over the form
pub async fn tally<S: TabularSource>(
    sheets: &mut S,
    config: &TomlConfig,
    limit: Option<usize>,
) -> Result<LitterTally> {
    let form = fetch_form(sheets, config, limit).await?;
    tally_litter(&form.sheet.rows)
}

fn master_id(config: &TomlConfig) -> Result<&str> {
    config
        .output
        .corrected_spreadsheet_id
        .as_deref()
        .ok_or_else(|| Error::Config("output.corrected_spreadsheet_id is not set".to_string()))
}

/// Overwrite the master from row 0, blanking rows left over from a longer
/// earlier copy
async fn write_master<S: TabularSource + TabularSink>(
    sheets: &mut S,
    config: &TomlConfig,
    master: &str,
    form: &FormSnapshot,
    corrected: &[Row],
) -> Result<()> {
    let previous = sheets.fetch(master, DEFAULT_SHEET).await?;

    let mut block = Vec::with_capacity(previous.len().max(corrected.len() + 1));
    if !form.sheet.header.is_empty() {
        block.push(form.sheet.header.clone());
    }
    block.extend(corrected.iter().map(Row::to_cells));

    let stale = previous.len().saturating_sub(block.len());
    if stale > 0 {
        debug!(stale, "Clearing rows from an earlier, longer copy");
        block.extend(std::iter::repeat_with(Vec::new).take(stale));
    }
    // Shorter rows leave old cells untouched on the sheet, so pad to the
    // widest row either copy has
    let width = block.iter().chain(&previous).map(Vec::len).max().unwrap_or(0);
    for row in &mut block {
        row.resize(width, String::new());
    }

    info!(rows = corrected.len(), stale, "Writing corrected data");
    sheets.write_rows(master, 0, 0, &block).await?;
    sheets
        .write_cell(master, &config.output.time_cell, &form.time_of_data)
        .await
}
