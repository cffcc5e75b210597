//! A Minesweeper player that only moves when logic says it is safe.
//!
//! The [`KnowledgeEngine`] keeps a list of [`Sentence`]s ("exactly N of these
//! cells are mines"), and after each observation saturates them: cells that a
//! single sentence pins down are broadcast to every other sentence, and pairs
//! where one sentence's cells are a subset of another's yield the difference as
//! a new sentence.

pub mod autoplay;
pub mod board;
pub mod cell;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod oracle;
pub mod sentence;

pub use autoplay::{GameReport, Outcome, PlayOptions, play};
pub use board::Board;
pub use cell::{Cell, Grid};
pub use engine::KnowledgeEngine;
pub use error::{Error, Result};
pub use fallback::random_move;
pub use oracle::{DeducedState, Oracle};
pub use sentence::Sentence;
