use crate::cell::{Cell, Grid};
use crate::error::{Error, Result};
use rand::Rng;
use rand::seq::IteratorRandom;
use std::collections::BTreeSet;

/// The hidden game board: where the mines are.
///
/// The engine never looks at this directly; the game loop asks it for the
/// number shown on an opened cell and feeds that to the knowledge base.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Board {
    grid: Grid,
    mines: BTreeSet<Cell>,
}

impl Board {
    /// Places `mines` mines uniformly at random.
    pub fn new<R: Rng + ?Sized>(
        height: usize,
        width: usize,
        mines: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let grid = Grid::new(height, width)?;
        if mines >= height * width {
            return Err(Error::TooManyMines {
                height,
                width,
                mines,
            });
        }

        let mines = grid.cells().choose_multiple(rng, mines).into_iter().collect();
        Ok(Board { grid, mines })
    }

    /// Builds a board with mines at exactly the given cells.
    pub fn from_mines(
        height: usize,
        width: usize,
        mines: impl IntoIterator<Item = Cell>,
    ) -> Result<Self> {
        let grid = Grid::new(height, width)?;
        let mines = mines
            .into_iter()
            .map(|cell| grid.check(cell).map(|()| cell))
            .collect::<Result<BTreeSet<Cell>>>()?;
        if mines.len() >= height * width {
            return Err(Error::TooManyMines {
                height,
                width,
                mines: mines.len(),
            });
        }
        Ok(Board { grid, mines })
    }

    pub fn height(&self) -> usize {
        self.grid.height
    }

    pub fn width(&self) -> usize {
        self.grid.width
    }

    pub fn mines(&self) -> &BTreeSet<Cell> {
        &self.mines
    }

    pub fn is_mine(&self, cell: Cell) -> Result<bool> {
        self.grid.check(cell)?;
        Ok(self.mines.contains(&cell))
    }

    /// Number of mines within one row and column of `cell`, not counting the
    /// cell itself.
    pub fn nearby_mines(&self, cell: Cell) -> Result<usize> {
        self.grid.check(cell)?;
        Ok(self
            .grid
            .neighbors(cell)
            .filter(|neighbor| self.mines.contains(neighbor))
            .count())
    }

    /// True once the flagged set is exactly the mine set.
    pub fn has_won(&self, found: &BTreeSet<Cell>) -> bool {
        *found == self.mines
    }

    /// Text dump of the board with `X` on mines.
    pub fn render(&self) -> String {
        let rule = format!("{}-\n", "--".repeat(self.grid.width));
        let mut out = String::new();
        for row in 0..self.grid.height {
            out.push_str(&rule);
            for col in 0..self.grid.width {
                if self.mines.contains(&Cell::new(row, col)) {
                    out.push_str("|X");
                } else {
                    out.push_str("| ");
                }
            }
            out.push_str("|\n");
        }
        out.push_str(&rule);
        out
    }
}
