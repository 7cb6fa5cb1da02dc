//! Multi-run splitting tests
//!
//! Runs correction + splitting repeatedly against one in-memory sheet
//! service and an on-disk registry, checking that destination tables end
//! up holding every routed row exactly once.

use pkr_common::correct::correct;
use pkr_common::registry::GroupRegistry;
use pkr_common::row::{Row, GROUP};
use pkr_common::sink::{MemorySheets, SinkCall};
use pkr_common::split::{split, SplitOptions, SplitReport};
use pkr_common::AliasTable;
use std::collections::BTreeSet;
use std::path::Path;
use tempfile::TempDir;

fn row(ts: &str, name: &str, group: &str, day: &str) -> Row {
    Row::from_cells(
        vec![ts.into(), name.into(), group.into(), day.into(), "5000".into(), "Yes".into()],
        0,
    )
    .unwrap()
}

fn header() -> Vec<String> {
    ["Timestamp", "Name", "Group", "Day of Month", "Footsteps", "Litter"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

async fn run(
    sheets: &mut MemorySheets,
    registry_path: &Path,
    form: &[Row],
    groups: &[&str],
) -> SplitReport {
    let mut registry = GroupRegistry::load(registry_path).unwrap();
    let corrected = correct(form, &AliasTable::new(), None);
    let fresh = registry.unrouted(&corrected, GROUP).unwrap();
    let options = SplitOptions {
        header: Some(header()),
        time_of_data: "Sat Oct 17 09:00:00 2026".into(),
        groups: groups.iter().map(|g| g.to_string()).collect::<BTreeSet<_>>(),
        ..SplitOptions::default()
    };
    split(sheets, &mut registry, &fresh, options).await.unwrap()
}

fn data_rows(sheets: &MemorySheets, registry_path: &Path) -> usize {
    let registry = GroupRegistry::load(registry_path).unwrap();
    registry
        .iter()
        .map(|g| sheets.table(&g.handle.id).unwrap().filled_rows() - 1)
        .sum()
}

#[tokio::test]
async fn test_rerun_on_unchanged_form_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let registry_path = temp_dir.path().join("group_sheets.json");
    let mut sheets = MemorySheets::new();
    let form = vec![
        row("t1", "ann", "A", "1"),
        row("t2", "bob", "B", "1"),
        row("t3", "cat", "A", "1"),
    ];

    let first = run(&mut sheets, &registry_path, &form, &[]).await;
    assert_eq!(first.rows_written(), 3);
    let calls_after_first = sheets.calls().len();

    let second = run(&mut sheets, &registry_path, &form, &[]).await;
    assert!(second.created.is_empty());
    assert_eq!(second.rows_written(), 0);
    assert_eq!(sheets.calls().len(), calls_after_first);
    assert_eq!(data_rows(&sheets, &registry_path), 3);
}

#[tokio::test]
async fn test_new_submissions_append_after_previous_rows() {
    let temp_dir = TempDir::new().unwrap();
    let registry_path = temp_dir.path().join("group_sheets.json");
    let mut sheets = MemorySheets::new();
    let mut form = vec![row("t1", "ann", "A", "1"), row("t2", "bob", "A", "1")];

    run(&mut sheets, &registry_path, &form, &[]).await;
    form.push(row("t3", "cat", "A", "2"));
    form.push(row("t4", "ann", "A", "1")); // exact resubmission, dropped
    let second = run(&mut sheets, &registry_path, &form, &[]).await;

    assert_eq!(second.flushed.len(), 1);
    assert_eq!(second.flushed[0].start_row, 3);
    assert_eq!(second.flushed[0].rows, 1);

    let registry = GroupRegistry::load(&registry_path).unwrap();
    let a = registry.get("A").unwrap();
    let table = sheets.table(&a.handle.id).unwrap();
    assert_eq!(table.cells[1][1], "Ann");
    assert_eq!(table.cells[2][1], "Bob");
    assert_eq!(table.cells[3][1], "Cat");
    assert!(table.cells[4].iter().all(String::is_empty));
    assert_eq!(data_rows(&sheets, &registry_path), 3);
}

#[tokio::test]
async fn test_held_group_is_written_by_a_later_run() {
    let temp_dir = TempDir::new().unwrap();
    let registry_path = temp_dir.path().join("group_sheets.json");
    let mut sheets = MemorySheets::new();
    let form = vec![row("t1", "ann", "A", "1"), row("t2", "bob", "B", "1")];

    let first = run(&mut sheets, &registry_path, &form, &["A"]).await;
    assert_eq!(first.created, ["A", "B"]);
    assert_eq!(first.held, ["B"]);

    let second = run(&mut sheets, &registry_path, &form, &["B"]).await;
    assert!(second.created.is_empty());
    assert_eq!(second.flushed.len(), 1);
    assert_eq!(second.flushed[0].group, "B");
    assert_eq!(second.flushed[0].start_row, 1);
    assert_eq!(data_rows(&sheets, &registry_path), 2);

    let creates = sheets
        .calls()
        .iter()
        .filter(|c| matches!(c, SinkCall::Create { .. }))
        .count();
    assert_eq!(creates, 2);
}

#[tokio::test]
async fn test_failed_flush_keeps_registration_for_rerun() {
    let temp_dir = TempDir::new().unwrap();
    let registry_path = temp_dir.path().join("group_sheets.json");
    let mut sheets = MemorySheets::new();
    // create A, create B, write A rows fails
    sheets.fail_on_call(3);
    let form = vec![row("t1", "ann", "A", "1"), row("t2", "bob", "B", "1")];

    let mut registry = GroupRegistry::load(&registry_path).unwrap();
    let options = SplitOptions {
        header: Some(header()),
        ..SplitOptions::default()
    };
    assert!(split(&mut sheets, &mut registry, &form, options).await.is_err());

    // Both tables were checkpointed before the failure
    let reloaded = GroupRegistry::load(&registry_path).unwrap();
    assert_eq!(reloaded.len(), 2);
    assert_eq!(reloaded.get("A").unwrap().routed, 0);

    let report = run(&mut sheets, &registry_path, &form, &[]).await;
    assert!(report.created.is_empty());
    assert_eq!(report.rows_written(), 2);
    assert_eq!(data_rows(&sheets, &registry_path), 2);
}
