use crate::board::Board;
use crate::cell::Cell;
use crate::engine::KnowledgeEngine;
use crate::fallback::random_move;
use crate::oracle::Oracle;
use anyhow::Context;
use rand::Rng;
use tracing::{debug, info};

/// Knobs for a single autonomous game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayOptions {
    /// Guess at random when no cell is known to be safe.
    pub allow_guess: bool,
    /// Cross-check every deduction with the SAT oracle.
    pub audit: bool,
}

impl Default for PlayOptions {
    fn default() -> Self {
        PlayOptions {
            allow_guess: true,
            audit: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Won,
    Lost,
    /// No safe move and guessing disabled, or nothing left to guess.
    Stuck,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameReport {
    pub outcome: Outcome,
    pub safe_moves: usize,
    pub random_moves: usize,
    pub mines_found: usize,
    /// The guess that hit a mine, if the game was lost.
    pub losing_cell: Option<Cell>,
}

/// Plays `board` to the end: known-safe cells first, random guesses otherwise.
pub fn play<R: Rng + ?Sized>(
    board: &Board,
    engine: &mut KnowledgeEngine,
    rng: &mut R,
    options: &PlayOptions,
) -> anyhow::Result<GameReport> {
    if (engine.height(), engine.width()) != (board.height(), board.width()) {
        anyhow::bail!(
            "engine is {}x{} but board is {}x{}",
            engine.height(),
            engine.width(),
            board.height(),
            board.width()
        );
    }

    // Moves made before this call are replayed so the audit sees them too.
    let mut oracle = None;
    if options.audit {
        let mut replay = Oracle::new(engine.grid());
        for &cell in engine.moves_made() {
            replay.observe(cell, board.nearby_mines(cell)?)?;
        }
        oracle = Some(replay);
    }
    let mut safe_moves = 0;
    let mut random_moves = 0;

    let (outcome, losing_cell) = loop {
        if board.has_won(engine.confirmed_mines()) {
            break (Outcome::Won, None);
        }

        let (cell, guessed) = match engine.query_safe_move() {
            Some(cell) => (cell, false),
            None if options.allow_guess => {
                match random_move(&engine.query_fallback_candidates(), rng) {
                    Some(cell) => (cell, true),
                    None => break (Outcome::Stuck, None),
                }
            }
            None => break (Outcome::Stuck, None),
        };

        if guessed {
            random_moves += 1;
        } else {
            safe_moves += 1;
        }

        if board.is_mine(cell)? {
            if !guessed {
                anyhow::bail!("engine offered mine {cell} as a safe move");
            }
            break (Outcome::Lost, Some(cell));
        }

        let count = board.nearby_mines(cell)?;
        debug!(%cell, count, guessed, "opening cell");
        engine
            .record_observation(cell, count)
            .with_context(|| format!("recording {cell} = {count}"))?;

        if let Some(oracle) = oracle.as_mut() {
            oracle.observe(cell, count)?;
            oracle
                .audit(engine)
                .with_context(|| format!("auditing after {cell}"))?;
        }
    };

    let report = GameReport {
        outcome,
        safe_moves,
        random_moves,
        mines_found: engine.confirmed_mines().len(),
        losing_cell,
    };
    info!(
        outcome = ?report.outcome,
        safe_moves,
        random_moves,
        mines_found = report.mines_found,
        "game finished"
    );
    Ok(report)
}
