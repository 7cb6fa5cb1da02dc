//! Per-day litter tally
//!
//! Counts, for each day of month, how many submissions answered "Yes" or
//! "No" to the litter question and how many predate the question (no cell).
//! Any other answer aborts the tally: unclean input is surfaced, not guessed.

use crate::row::Row;
use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;

/// Litter answers for one day
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayTally {
    pub yes: usize,
    pub no: usize,
    pub absent: usize,
}

impl DayTally {
    pub fn total(&self) -> usize {
        self.yes + self.no + self.absent
    }

    /// `[yes, no, absent]`
    pub fn as_array(&self) -> [usize; 3] {
        [self.yes, self.no, self.absent]
    }
}

/// Days in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LitterTally {
    days: Vec<(String, DayTally)>,
    index: HashMap<String, usize>,
}

impl LitterTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one row. `line` is used for error reporting.
    pub fn record(&mut self, row: &Row, line: usize) -> Result<()> {
        let day = row.day.clone().unwrap_or_default();
        let slot = match self.index.get(&day) {
            Some(&slot) => slot,
            None => {
                self.days.push((day.clone(), DayTally::default()));
                self.index.insert(day, self.days.len() - 1);
                self.days.len() - 1
            }
        };
        let counts = &mut self.days[slot].1;

        match row.litter.as_deref() {
            Some("Yes") => counts.yes += 1,
            Some("No") => counts.no += 1,
            None => counts.absent += 1,
            Some(other) => {
                return Err(Error::UnexpectedValue {
                    line,
                    field: "litter",
                    value: other.to_string(),
                })
            }
        }
        Ok(())
    }

    pub fn get(&self, day: &str) -> Option<DayTally> {
        self.index.get(day).map(|&slot| self.days[slot].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, DayTally)> + '_ {
        self.days.iter().map(|(day, counts)| (day.as_str(), *counts))
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

impl fmt::Display for LitterTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (day, counts) in self.iter() {
            writeln!(f, "{day}: {:?}", counts.as_array())?;
        }
        Ok(())
    }
}

/// Tally every row; stops at the first unexpected litter answer
pub fn tally_litter(rows: &[Row]) -> Result<LitterTally> {
    let mut tally = LitterTally::new();
    for (index, row) in rows.iter().enumerate() {
        tally.record(row, row.line_or(index + 1))?;
    }
    Ok(tally)
}
