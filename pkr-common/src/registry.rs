//! Group Sheet Registry
//!
//! Persistent mapping from group name (raw, as typed in the form) to its
//! destination table, plus per-group write progress:
//!
//! - `next_row`: 0-based row index of the next append. Starts at 1 because
//!   new tables are created with the header already in row 0.
//! - `routed`: how many of this group's corrected rows have been written.
//!
//! A group is registered at most once; later runs reuse its table. The
//! snapshot is JSON, written atomically (temp file + rename) so a crash
//! mid-save leaves the previous snapshot intact.

use crate::row::Row;
use crate::sink::TableHandle;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SNAPSHOT_VERSION: u32 = 1;

/// Registry entry for one group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEntry {
    pub name: String,
    pub handle: TableHandle,
    pub next_row: usize,
    #[serde(default)]
    pub routed: usize,
    #[serde(default)]
    pub last_flush_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    groups: Vec<GroupEntry>,
}

/// Group → destination mapping, in creation order
#[derive(Debug, Default)]
pub struct GroupRegistry {
    path: Option<PathBuf>,
    groups: Vec<GroupEntry>,
}

impl GroupRegistry {
    /// Registry that is never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the snapshot at `path`; a missing file yields an empty registry
    /// that will be saved there.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            info!(path = %path.display(), "No group registry yet, starting empty");
            return Ok(Self {
                path: Some(path),
                groups: Vec::new(),
            });
        }

        let content = std::fs::read_to_string(&path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::Config(format!(
                "Unsupported registry version {} in {}",
                snapshot.version,
                path.display()
            )));
        }

        info!(path = %path.display(), groups = snapshot.groups.len(), "Loaded group registry");
        Ok(Self {
            path: Some(path),
            groups: snapshot.groups,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the snapshot atomically. No-op for in-memory registries.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            groups: self.groups.clone(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;

        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        temp.write_all(json.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        debug!(path = %path.display(), groups = self.groups.len(), "Saved group registry");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&GroupEntry> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut GroupEntry> {
        self.groups.iter_mut().find(|g| g.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Add a newly created destination. Registering a known group is an error.
    pub fn register(&mut self, name: &str, handle: TableHandle, next_row: usize) -> Result<&mut GroupEntry> {
        if self.contains(name) {
            return Err(Error::Config(format!("Group already registered: {name}")));
        }
        self.groups.push(GroupEntry {
            name: name.to_string(),
            handle,
            next_row,
            routed: 0,
            last_flush_at: None,
        });
        let index = self.groups.len() - 1;
        Ok(&mut self.groups[index])
    }

    /// Group names in creation order
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.groups.iter().map(|g| g.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroupEntry> + '_ {
        self.groups.iter()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Rows not yet written to their group's table
    ///
    /// For each group, the first `routed` rows (in input order) are taken to
    /// be already written and are skipped. Unknown groups keep all rows.
    pub fn unrouted(&self, rows: &[Row], key_index: usize) -> Result<Vec<Row>> {
        let mut remaining: HashMap<&str, usize> = self
            .groups
            .iter()
            .map(|g| (g.name.as_str(), g.routed))
            .collect();

        let mut fresh = Vec::new();
        for (index, row) in rows.iter().enumerate() {
            let key = row.cell(key_index).ok_or(Error::MissingGroupKey {
                line: row.line_or(index + 1),
                index: key_index,
            })?;
            match remaining.get_mut(key) {
                Some(skip) if *skip > 0 => *skip -= 1,
                _ => fresh.push(row.clone()),
            }
        }
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: &str) -> TableHandle {
        TableHandle {
            id: id.to_string(),
            url: format!("https://example.test/{id}"),
        }
    }

    fn row(name: &str, group: &str) -> Row {
        Row::from_cells(vec!["t".into(), name.into(), group.into()], 0).unwrap()
    }

    #[test]
    fn test_register_keeps_creation_order() {
        let mut registry = GroupRegistry::in_memory();
        registry.register("B", handle("b"), 1).unwrap();
        registry.register("A", handle("a"), 1).unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), ["B", "A"]);
    }

    #[test]
    fn test_register_twice_is_rejected() {
        let mut registry = GroupRegistry::in_memory();
        registry.register("A", handle("a"), 1).unwrap();
        assert!(registry.register("A", handle("a2"), 1).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_group_names_are_not_canonicalized() {
        let mut registry = GroupRegistry::in_memory();
        registry.register("hikers", handle("a"), 1).unwrap();
        assert!(!registry.contains("Hikers"));
    }

    #[test]
    fn test_unrouted_skips_already_written_rows_per_group() {
        let mut registry = GroupRegistry::in_memory();
        registry.register("A", handle("a"), 3).unwrap().routed = 2;

        let rows = [row("1", "A"), row("2", "B"), row("3", "A"), row("4", "A")];
        let fresh = registry.unrouted(&rows, 2).unwrap();
        let names: Vec<_> = fresh.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["2", "4"]);
    }

    #[test]
    fn test_unrouted_requires_group_key() {
        let registry = GroupRegistry::in_memory();
        let short = Row::from_cells(vec!["t".into(), "n".into()], 0).unwrap();
        let err = registry.unrouted(&[short], 2).unwrap_err();
        assert!(matches!(err, Error::MissingGroupKey { line: 1, index: 2 }));

        let read = Row::from_cells(vec!["t".into(), "n".into()], 9).unwrap();
        let err = registry.unrouted(&[read], 2).unwrap_err();
        assert!(matches!(err, Error::MissingGroupKey { line: 9, index: 2 }));
    }

    #[test]
    fn test_in_memory_save_is_noop() {
        let registry = GroupRegistry::in_memory();
        assert!(registry.path().is_none());
        registry.save().unwrap();
    }
}
