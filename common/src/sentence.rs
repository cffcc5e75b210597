use crate::cell::Cell;
use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::fmt;

/// A logical statement about the board: exactly `count` of `cells` are mines.
///
/// Cells live in a `BTreeSet` so that equality and hashing are structural and
/// iteration order is stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Sentence {
    cells: BTreeSet<Cell>,
    count: usize,
}

impl Sentence {
    /// Builds a sentence, rejecting counts that exceed the number of cells.
    pub fn new(cells: impl IntoIterator<Item = Cell>, count: usize) -> Result<Self> {
        let cells: BTreeSet<Cell> = cells.into_iter().collect();
        if count > cells.len() {
            return Err(Error::Inconsistent(format!(
                "{} mines among {} cells",
                count,
                cells.len()
            )));
        }
        Ok(Sentence { cells, count })
    }

    pub fn cells(&self) -> &BTreeSet<Cell> {
        &self.cells
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Every cell, if the count says all of them are mines. Empty otherwise.
    pub fn known_mines(&self) -> BTreeSet<Cell> {
        if self.count == self.cells.len() && self.count != 0 {
            self.cells.clone()
        } else {
            BTreeSet::new()
        }
    }

    /// Every cell, if the count says none of them are mines. Empty otherwise.
    pub fn known_safes(&self) -> BTreeSet<Cell> {
        if self.count == 0 {
            self.cells.clone()
        } else {
            BTreeSet::new()
        }
    }

    /// Removes a cell known to be a mine, decrementing the count.
    ///
    /// Returns whether the cell was part of this sentence.
    pub fn resolve_as_mine(&mut self, cell: Cell) -> Result<bool> {
        if !self.cells.contains(&cell) {
            return Ok(false);
        }
        if self.count == 0 {
            return Err(Error::Inconsistent(format!(
                "{cell} is a mine but {self} has no mines left"
            )));
        }
        self.cells.remove(&cell);
        self.count -= 1;
        Ok(true)
    }

    /// Removes a cell known to be safe. The count is unchanged.
    ///
    /// Returns whether the cell was part of this sentence.
    pub fn resolve_as_safe(&mut self, cell: Cell) -> Result<bool> {
        if !self.cells.contains(&cell) {
            return Ok(false);
        }
        if self.count == self.cells.len() {
            return Err(Error::Inconsistent(format!(
                "{cell} is safe but every cell of {self} must be a mine"
            )));
        }
        self.cells.remove(&cell);
        Ok(true)
    }

    /// If `self` is a subset of `other`, the sentence over the difference.
    pub fn difference_from(&self, other: &Sentence) -> Result<Option<Sentence>> {
        if !self.cells.is_subset(&other.cells) {
            return Ok(None);
        }
        let count = other.count.checked_sub(self.count).ok_or_else(|| {
            Error::Inconsistent(format!("{self} is a subset of {other} with more mines"))
        })?;
        Sentence::new(other.cells.difference(&self.cells).copied(), count).map(Some)
    }
}

impl fmt::Display for Sentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, cell) in self.cells.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{cell}")?;
        }
        write!(f, "}} = {}", self.count)
    }
}
