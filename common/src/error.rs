use crate::cell::Cell;
use thiserror::Error;

/// Everything that can go wrong inside the knowledge base or its collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("cell {cell} is outside the {height}x{width} grid")]
    OutOfBounds {
        cell: Cell,
        height: usize,
        width: usize,
    },

    #[error("cell {cell} reported {count} nearby mines but only has {neighbors} neighbors")]
    InvalidCount {
        cell: Cell,
        count: usize,
        neighbors: usize,
    },

    /// The knowledge base contradicts itself. Either the observation feed is
    /// wrong or the closure is.
    #[error("knowledge base is inconsistent: {0}")]
    Inconsistent(String),

    #[error("{mines} mines do not fit on a {height}x{width} board")]
    TooManyMines {
        height: usize,
        width: usize,
        mines: usize,
    },

    #[error("grid dimensions must be non-zero")]
    EmptyGrid,

    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// The engine confirmed a cell that its observations do not force.
    #[error("engine deduction for {0} is not entailed by the observations")]
    Unsound(Cell),

    #[error("solver error: {0}")]
    Solver(String),
}

pub type Result<T> = std::result::Result<T, Error>;
