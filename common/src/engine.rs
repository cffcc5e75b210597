use crate::cell::{Cell, Grid};
use crate::error::{Error, Result};
use crate::sentence::Sentence;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, trace};

/// The player's knowledge base.
///
/// Holds every cell proven to be a mine or safe, every move made so far and the
/// list of sentences still carrying information. All mutation goes through
/// [`KnowledgeEngine::record_observation`] (or [`KnowledgeEngine::assert_sentence`]),
/// which runs the full closure before returning.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct KnowledgeEngine {
    grid: Grid,
    moves_made: BTreeSet<Cell>,
    mines: BTreeSet<Cell>,
    safes: BTreeSet<Cell>,
    knowledge: Vec<Sentence>,
}

impl KnowledgeEngine {
    pub fn new(height: usize, width: usize) -> Result<Self> {
        Ok(KnowledgeEngine {
            grid: Grid::new(height, width)?,
            moves_made: BTreeSet::new(),
            mines: BTreeSet::new(),
            safes: BTreeSet::new(),
            knowledge: Vec::new(),
        })
    }

    pub fn height(&self) -> usize {
        self.grid.height
    }

    pub fn width(&self) -> usize {
        self.grid.width
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    pub fn contains(&self, cell: Cell) -> bool {
        self.grid.contains(cell)
    }

    pub fn moves_made(&self) -> &BTreeSet<Cell> {
        &self.moves_made
    }

    pub fn confirmed_mines(&self) -> &BTreeSet<Cell> {
        &self.mines
    }

    pub fn confirmed_safes(&self) -> &BTreeSet<Cell> {
        &self.safes
    }

    pub fn knowledge(&self) -> &[Sentence] {
        &self.knowledge
    }

    /// Called when the board reports that the safe cell `cell` has `count`
    /// mines among its neighbors.
    ///
    /// The update is applied to a scratch copy and only committed once the
    /// closure has succeeded, so a rejected observation leaves the engine
    /// untouched.
    pub fn record_observation(&mut self, cell: Cell, count: usize) -> Result<()> {
        self.grid.check(cell)?;
        let neighbors = self.grid.neighbors(cell).count();
        if count > neighbors {
            return Err(Error::InvalidCount {
                cell,
                count,
                neighbors,
            });
        }

        let mut scratch = self.clone();
        scratch.apply_observation(cell, count)?;
        *self = scratch;
        Ok(())
    }

    /// Adds a sentence known from outside the board feed and saturates.
    pub fn assert_sentence(&mut self, sentence: Sentence) -> Result<()> {
        for &cell in sentence.cells() {
            self.grid.check(cell)?;
        }

        let mut scratch = self.clone();
        let mut sentence = sentence;
        for cell in sentence.cells().clone() {
            if scratch.mines.contains(&cell) {
                sentence.resolve_as_mine(cell)?;
            } else if scratch.safes.contains(&cell) {
                sentence.resolve_as_safe(cell)?;
            }
        }
        debug!(%sentence, "asserting sentence");
        scratch.knowledge.push(sentence);
        scratch.close()?;
        *self = scratch;
        Ok(())
    }

    /// Runs the closure explicitly. Returns whether anything changed, which is
    /// never the case right after an observation.
    pub fn saturate(&mut self) -> Result<bool> {
        let mut scratch = self.clone();
        let changed = scratch.close()?;
        *self = scratch;
        Ok(changed)
    }

    /// A known-safe cell that has not been played yet, lowest in row-major
    /// order first.
    pub fn query_safe_move(&self) -> Option<Cell> {
        self.safes.difference(&self.moves_made).next().copied()
    }

    /// Cells a random guess may pick: not played and not a known mine.
    pub fn query_fallback_candidates(&self) -> BTreeSet<Cell> {
        self.grid
            .cells()
            .filter(|cell| !self.moves_made.contains(cell) && !self.mines.contains(cell))
            .collect()
    }

    fn apply_observation(&mut self, cell: Cell, count: usize) -> Result<()> {
        debug!(%cell, count, "recording observation");

        self.moves_made.insert(cell);
        self.mark_safe(cell)?;

        // Known mines are accounted for in the count, known safes drop out.
        let mut remaining = count;
        let mut undetermined = BTreeSet::new();
        for neighbor in self.grid.neighbors(cell) {
            if self.mines.contains(&neighbor) {
                remaining = remaining.checked_sub(1).ok_or_else(|| {
                    Error::Inconsistent(format!(
                        "{cell} reports {count} mines but more are already confirmed around it"
                    ))
                })?;
            } else if !self.safes.contains(&neighbor) {
                undetermined.insert(neighbor);
            }
        }

        let sentence = Sentence::new(undetermined.iter().copied(), remaining)?;
        trace!(%sentence, "new sentence");
        self.knowledge.push(sentence);

        if remaining == 0 {
            for &neighbor in &undetermined {
                self.mark_safe(neighbor)?;
            }
        } else if remaining == undetermined.len() {
            for &neighbor in &undetermined {
                self.mark_mine(neighbor)?;
            }
        }

        self.close()?;
        Ok(())
    }

    /// Confirms `cell` as a mine and removes it from every sentence.
    ///
    /// Returns whether the cell was newly confirmed.
    fn mark_mine(&mut self, cell: Cell) -> Result<bool> {
        if self.safes.contains(&cell) {
            return Err(Error::Inconsistent(format!(
                "{cell} is already known to be safe"
            )));
        }
        let new = self.mines.insert(cell);
        for sentence in &mut self.knowledge {
            sentence.resolve_as_mine(cell)?;
        }
        Ok(new)
    }

    /// Confirms `cell` as safe and removes it from every sentence.
    ///
    /// Returns whether the cell was newly confirmed.
    fn mark_safe(&mut self, cell: Cell) -> Result<bool> {
        if self.mines.contains(&cell) {
            return Err(Error::Inconsistent(format!(
                "{cell} is already known to be a mine"
            )));
        }
        let new = self.safes.insert(cell);
        for sentence in &mut self.knowledge {
            sentence.resolve_as_safe(cell)?;
        }
        Ok(new)
    }

    /// Saturates the knowledge base: extracts trivially known cells and
    /// derives subset differences until a pass changes nothing.
    fn close(&mut self) -> Result<bool> {
        let mut changed = false;
        let mut pass = 0;

        loop {
            pass += 1;
            let mut progress = false;

            // Marking mutates every sentence, so walk by index and copy the
            // extracted cells before broadcasting them.
            for i in 0..self.knowledge.len() {
                for cell in self.knowledge[i].known_mines() {
                    progress |= self.mark_mine(cell)?;
                }
                for cell in self.knowledge[i].known_safes() {
                    progress |= self.mark_safe(cell)?;
                }
            }

            let derived = self.derive_subset_sentences()?;
            if !derived.is_empty() {
                progress = true;
                self.knowledge.extend(derived);
            }

            debug!(
                pass,
                sentences = self.knowledge.len(),
                mines = self.mines.len(),
                safes = self.safes.len(),
                "closure pass"
            );

            if !progress {
                break;
            }
            changed = true;
        }

        let before = self.knowledge.len();
        self.knowledge.retain(|sentence| !sentence.is_empty());
        changed |= self.knowledge.len() != before;

        Ok(changed)
    }

    /// For every ordered pair `(a, b)` of distinct sentences with `a ⊆ b`, the
    /// sentence `b - a`, skipping any already held.
    fn derive_subset_sentences(&self) -> Result<Vec<Sentence>> {
        let held: HashSet<&Sentence> = self.knowledge.iter().collect();
        let mut queued: HashSet<Sentence> = HashSet::new();
        let mut derived = Vec::new();

        for a in &self.knowledge {
            for b in &self.knowledge {
                if a == b {
                    continue;
                }
                let Some(sentence) = a.difference_from(b)? else {
                    continue;
                };
                if held.contains(&sentence) || queued.contains(&sentence) {
                    continue;
                }
                trace!(%a, %b, %sentence, "derived sentence");
                queued.insert(sentence.clone());
                derived.push(sentence);
            }
        }

        Ok(derived)
    }

    /// Verifies every structural invariant of the knowledge base.
    pub fn check_invariants(&self) -> Result<()> {
        if self.grid.height == 0 || self.grid.width == 0 {
            return Err(Error::EmptyGrid);
        }
        if let Some(cell) = self.mines.intersection(&self.safes).next() {
            return Err(Error::Inconsistent(format!(
                "{cell} is confirmed both mine and safe"
            )));
        }
        if let Some(cell) = self.moves_made.difference(&self.safes).next() {
            return Err(Error::Inconsistent(format!(
                "{cell} was played but is not confirmed safe"
            )));
        }
        for cell in self.moves_made.iter().chain(&self.mines).chain(&self.safes) {
            self.grid.check(*cell)?;
        }
        for sentence in &self.knowledge {
            if sentence.count() > sentence.cells().len() {
                return Err(Error::Inconsistent(format!("{sentence} is unsatisfiable")));
            }
            for cell in sentence.cells() {
                self.grid.check(*cell)?;
                if self.mines.contains(cell) || self.safes.contains(cell) {
                    return Err(Error::Inconsistent(format!(
                        "{sentence} still mentions resolved cell {cell}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Serializes the knowledge base to bytes.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bcs::to_bytes(self).map_err(|e| Error::Snapshot(e.to_string()))
    }

    /// Deserializes a knowledge base from bytes, rejecting any snapshot that
    /// breaks an invariant.
    pub fn deserialize(bts: &[u8]) -> Result<Self> {
        let engine: KnowledgeEngine =
            bcs::from_bytes(bts).map_err(|e| Error::Snapshot(e.to_string()))?;
        engine.check_invariants()?;
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(coords: &[(usize, usize)]) -> BTreeSet<Cell> {
        coords.iter().copied().map(Cell::from).collect()
    }

    fn sentence(coords: &[(usize, usize)], count: usize) -> Sentence {
        Sentence::new(cells(coords), count).unwrap()
    }

    #[test]
    fn test_engine_initialization() {
        let engine = KnowledgeEngine::new(4, 5).unwrap();

        assert_eq!(engine.height(), 4);
        assert_eq!(engine.width(), 5);
        assert!(engine.moves_made().is_empty());
        assert!(engine.confirmed_mines().is_empty());
        assert!(engine.confirmed_safes().is_empty());
        assert!(engine.knowledge().is_empty());
        assert_eq!(engine.query_safe_move(), None);
        assert_eq!(engine.query_fallback_candidates().len(), 20);

        assert_eq!(KnowledgeEngine::new(0, 3), Err(Error::EmptyGrid));
    }

    #[test]
    fn test_center_observation_holds_single_sentence() {
        // 3x3 with the only mine at (0, 0); the centre sees it.
        let mut engine = KnowledgeEngine::new(3, 3).unwrap();
        engine.record_observation(Cell::new(1, 1), 1).unwrap();

        let expected = sentence(
            &[(0, 0), (0, 1), (0, 2), (1, 0), (1, 2), (2, 0), (2, 1), (2, 2)],
            1,
        );
        assert_eq!(engine.knowledge(), &[expected]);
        assert!(engine.confirmed_mines().is_empty());
        assert_eq!(engine.confirmed_safes(), &cells(&[(1, 1)]));
        assert_eq!(engine.query_safe_move(), None);
    }

    #[test]
    fn test_zero_observation_propagates_into_existing_sentence() {
        let mut engine = KnowledgeEngine::new(3, 3).unwrap();

        engine.record_observation(Cell::new(0, 1), 1).unwrap();
        assert_eq!(
            engine.knowledge(),
            &[sentence(&[(0, 0), (0, 2), (1, 0), (1, 1), (1, 2)], 1)]
        );
        assert!(engine.confirmed_mines().is_empty());

        engine.record_observation(Cell::new(2, 2), 0).unwrap();
        for safe in [(1, 1), (1, 2), (2, 1)] {
            assert!(engine.confirmed_safes().contains(&Cell::from(safe)));
        }
        assert!(
            engine
                .knowledge()
                .contains(&sentence(&[(0, 0), (0, 2), (1, 0)], 1))
        );
        assert!(engine.confirmed_mines().is_empty());
        assert_eq!(engine.query_safe_move(), Some(Cell::new(1, 1)));
    }

    #[test]
    fn test_subset_rule_confirms_mine() {
        let mut engine = KnowledgeEngine::new(3, 3).unwrap();

        engine
            .assert_sentence(sentence(&[(0, 0), (0, 1)], 1))
            .unwrap();
        engine
            .assert_sentence(sentence(&[(0, 0), (0, 1), (0, 2)], 2))
            .unwrap();

        assert_eq!(engine.confirmed_mines(), &cells(&[(0, 2)]));
        assert!(engine.knowledge().contains(&sentence(&[(0, 0), (0, 1)], 1)));
        assert!(engine.knowledge().iter().all(|s| !s.cells().contains(&Cell::new(0, 2))));
    }

    #[test]
    fn test_subset_rule_confirms_safes() {
        let mut engine = KnowledgeEngine::new(3, 3).unwrap();

        engine
            .assert_sentence(sentence(&[(2, 0), (2, 1), (2, 2)], 1))
            .unwrap();
        engine
            .assert_sentence(sentence(&[(2, 0), (2, 1)], 1))
            .unwrap();

        assert_eq!(engine.confirmed_safes(), &cells(&[(2, 2)]));
        assert_eq!(engine.query_safe_move(), Some(Cell::new(2, 2)));
    }

    #[test]
    fn test_known_neighbors_adjust_the_count() {
        let mut engine = KnowledgeEngine::new(3, 3).unwrap();
        engine.assert_sentence(sentence(&[(0, 0)], 1)).unwrap();
        assert_eq!(engine.confirmed_mines(), &cells(&[(0, 0)]));

        // (0, 1) sees the known mine plus one more among 4 unknown neighbors.
        engine.record_observation(Cell::new(0, 1), 2).unwrap();
        assert_eq!(
            engine.knowledge(),
            &[sentence(&[(0, 2), (1, 0), (1, 1), (1, 2)], 1)]
        );

        // (0, 1) reporting only the known mine clears the rest.
        let mut other = KnowledgeEngine::new(3, 3).unwrap();
        other.assert_sentence(sentence(&[(0, 0)], 1)).unwrap();
        other.record_observation(Cell::new(0, 1), 1).unwrap();
        assert_eq!(
            other.confirmed_safes(),
            &cells(&[(0, 1), (0, 2), (1, 0), (1, 1), (1, 2)])
        );
        assert!(other.knowledge().is_empty());
    }

    #[test]
    fn test_full_count_marks_every_neighbor_as_mine() {
        let mut engine = KnowledgeEngine::new(2, 2).unwrap();
        engine.record_observation(Cell::new(0, 0), 3).unwrap();

        assert_eq!(engine.confirmed_mines(), &cells(&[(0, 1), (1, 0), (1, 1)]));
        assert_eq!(engine.query_safe_move(), None);
        assert!(engine.query_fallback_candidates().is_empty());
    }

    #[test]
    fn test_fallback_candidates_exclude_moves_and_mines() {
        let mut engine = KnowledgeEngine::new(2, 3).unwrap();
        engine.assert_sentence(sentence(&[(1, 2)], 1)).unwrap();
        engine.record_observation(Cell::new(0, 0), 0).unwrap();

        let candidates = engine.query_fallback_candidates();
        assert!(!candidates.contains(&Cell::new(0, 0)));
        assert!(!candidates.contains(&Cell::new(1, 2)));
        assert!(candidates.contains(&Cell::new(0, 1)));
        assert_eq!(candidates.len(), 4);
    }

    #[test]
    fn test_out_of_range_is_rejected_without_side_effects() {
        let mut engine = KnowledgeEngine::new(3, 3).unwrap();
        engine.record_observation(Cell::new(0, 1), 1).unwrap();
        let before = engine.clone();

        assert!(matches!(
            engine.record_observation(Cell::new(3, 0), 0),
            Err(Error::OutOfBounds { .. })
        ));
        assert!(matches!(
            engine.assert_sentence(sentence(&[(0, 9)], 0)),
            Err(Error::OutOfBounds { .. })
        ));
        assert!(matches!(
            engine.record_observation(Cell::new(0, 0), 4),
            Err(Error::InvalidCount { .. })
        ));
        assert_eq!(engine, before);
    }

    #[test]
    fn test_contradiction_is_fatal_and_rolled_back() {
        let mut engine = KnowledgeEngine::new(3, 3).unwrap();
        engine.assert_sentence(sentence(&[(0, 0)], 1)).unwrap();
        let before = engine.clone();

        // Opening a confirmed mine.
        assert!(matches!(
            engine.record_observation(Cell::new(0, 0), 0),
            Err(Error::Inconsistent(_))
        ));
        assert_eq!(engine, before);

        // (1, 0) claims no mines next to a confirmed one.
        assert!(matches!(
            engine.record_observation(Cell::new(1, 0), 0),
            Err(Error::Inconsistent(_))
        ));
        assert_eq!(engine, before);
        engine.check_invariants().unwrap();
    }

    #[test]
    fn test_saturate_is_a_fixed_point() {
        let mut engine = KnowledgeEngine::new(4, 4).unwrap();
        engine.record_observation(Cell::new(0, 0), 1).unwrap();
        engine.record_observation(Cell::new(3, 3), 0).unwrap();
        engine.record_observation(Cell::new(0, 3), 1).unwrap();

        let before = engine.clone();
        assert!(!engine.saturate().unwrap());
        assert_eq!(engine, before);
    }

    #[test]
    fn test_snapshot_roundtrip_and_validation() {
        let mut engine = KnowledgeEngine::new(3, 3).unwrap();
        engine.record_observation(Cell::new(0, 1), 1).unwrap();
        engine.record_observation(Cell::new(2, 2), 0).unwrap();

        let bts = engine.serialize().unwrap();
        assert_eq!(KnowledgeEngine::deserialize(&bts).unwrap(), engine);

        assert!(matches!(
            KnowledgeEngine::deserialize(&bts[..bts.len() / 2]),
            Err(Error::Snapshot(_))
        ));

        let mut broken = engine.clone();
        broken.mines.insert(Cell::new(1, 1));
        let bts = bcs::to_bytes(&broken).unwrap();
        assert!(matches!(
            KnowledgeEngine::deserialize(&bts),
            Err(Error::Inconsistent(_))
        ));
    }
}
