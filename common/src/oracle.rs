//! SAT cross-check for the knowledge base.
//!
//! The oracle keeps its own copy of every raw observation as an "exactly k"
//! constraint and asks a SAT solver whether a cell is forced. It is much slower
//! than the closure but complete, which makes it a good auditor: every cell the
//! engine confirms must be forced here too.

use crate::cell::{Cell, Grid};
use crate::engine::KnowledgeEngine;
use crate::error::{Error, Result};
use crate::sentence::Sentence;
use itertools::Itertools;
use std::collections::HashMap;
use varisat::{CnfFormula, ExtendFormula, Lit, Solver, Var};

/// "Exactly `required_mines` of `variables` are mines", straight from the feed.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub variables: Vec<Cell>,
    pub required_mines: usize,
}

/// What the observations say about one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeducedState {
    ForcedMine,   // every consistent layout puts a mine here
    ForcedSafe,   // no consistent layout puts a mine here
    Undetermined,
}

#[derive(Debug, Clone)]
pub struct Oracle {
    grid: Grid,
    constraints: Vec<Constraint>,
}

impl Oracle {
    pub fn new(grid: Grid) -> Self {
        Oracle {
            grid,
            constraints: Vec::new(),
        }
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Records that `cell` was opened safely and showed `count`.
    pub fn observe(&mut self, cell: Cell, count: usize) -> Result<()> {
        self.grid.check(cell)?;
        self.constraints.push(Constraint {
            variables: vec![cell],
            required_mines: 0,
        });
        self.constraints.push(Constraint {
            variables: self.grid.neighbors(cell).collect(),
            required_mines: count,
        });
        Ok(())
    }

    /// Records a sentence asserted outside the board feed.
    pub fn constrain(&mut self, sentence: &Sentence) -> Result<()> {
        for &cell in sentence.cells() {
            self.grid.check(cell)?;
        }
        self.constraints.push(Constraint {
            variables: sentence.cells().iter().copied().collect(),
            required_mines: sentence.count(),
        });
        Ok(())
    }

    /// Decides every cell in `cells` by testing both assignments under
    /// assumptions.
    pub fn deduce(
        &self,
        cells: impl IntoIterator<Item = Cell>,
    ) -> Result<HashMap<Cell, DeducedState>> {
        let mut solver = Solver::new();
        let var_map: HashMap<Cell, Var> = self
            .grid
            .cells()
            .map(|cell| (cell, solver.new_var()))
            .collect();

        let mut formula = CnfFormula::new();
        for constraint in &self.constraints {
            let lits: Vec<Lit> = constraint
                .variables
                .iter()
                .filter_map(|c| var_map.get(c).map(|&v| Lit::from_var(v, true)))
                .collect();
            encode_exactly_k_to_formula(&mut formula, &mut solver, &lits, constraint.required_mines);
        }
        solver.add_formula(&formula);

        if !solver.solve().map_err(|e| Error::Solver(e.to_string()))? {
            return Err(Error::Inconsistent(
                "observations admit no mine layout".to_string(),
            ));
        }

        let mut deductions = HashMap::new();
        for cell in cells {
            self.grid.check(cell)?;
            let var = var_map[&cell];

            let mine_possible = solve_assuming(&mut solver, Lit::from_var(var, true))?;
            let safe_possible = solve_assuming(&mut solver, Lit::from_var(var, false))?;

            let state = match (mine_possible, safe_possible) {
                (true, true) => DeducedState::Undetermined,
                (true, false) => DeducedState::ForcedMine,
                (false, true) => DeducedState::ForcedSafe,
                (false, false) => {
                    return Err(Error::Inconsistent(format!("{cell} is neither mine nor safe")));
                }
            };
            deductions.insert(cell, state);
        }

        Ok(deductions)
    }

    /// Fails if the engine confirmed any cell the observations do not force.
    pub fn audit(&self, engine: &KnowledgeEngine) -> Result<()> {
        engine.check_invariants()?;

        let confirmed = engine
            .confirmed_mines()
            .iter()
            .chain(engine.confirmed_safes())
            .copied();
        let deductions = self.deduce(confirmed)?;

        for &cell in engine.confirmed_mines() {
            if deductions.get(&cell) != Some(&DeducedState::ForcedMine) {
                return Err(Error::Unsound(cell));
            }
        }
        for &cell in engine.confirmed_safes() {
            if deductions.get(&cell) != Some(&DeducedState::ForcedSafe) {
                return Err(Error::Unsound(cell));
            }
        }
        Ok(())
    }
}

fn solve_assuming(solver: &mut Solver, lit: Lit) -> Result<bool> {
    solver.assume(&[lit]);
    let result = solver.solve().map_err(|e| Error::Solver(e.to_string()));
    solver.assume(&[]);
    result
}

/// Encodes an "exactly k" constraint into the CNF formula.
fn encode_exactly_k_to_formula(
    formula: &mut CnfFormula,
    solver: &mut Solver,
    vars: &[Lit],
    k: usize,
) {
    encode_at_most_k_to_formula(formula, solver, vars, k);
    encode_at_least_k_to_formula(formula, solver, vars, k);
}

fn encode_at_most_k_to_formula(
    formula: &mut CnfFormula,
    solver: &mut Solver,
    vars: &[Lit],
    k: usize,
) {
    if k >= vars.len() {
        return;
    }
    if k == 0 {
        for &lit in vars {
            formula.add_clause(&[!lit]);
        }
        return;
    }

    if vars.len() <= 10 {
        // Every (k + 1)-subset has a safe cell.
        for combo in vars.iter().copied().combinations(k + 1) {
            let clause: Vec<Lit> = combo.iter().map(|&lit| !lit).collect();
            formula.add_clause(&clause);
        }
    } else {
        encode_sequential_counter_at_most_k_to_formula(formula, solver, vars, k);
    }
}

fn encode_at_least_k_to_formula(
    formula: &mut CnfFormula,
    solver: &mut Solver,
    vars: &[Lit],
    k: usize,
) {
    if k == 0 {
        return;
    }
    if k > vars.len() {
        formula.add_clause(&[]);
        return;
    }

    // At least k true is at most n - k false.
    let negated: Vec<Lit> = vars.iter().map(|&lit| !lit).collect();
    encode_at_most_k_to_formula(formula, solver, &negated, vars.len() - k);
}

/// Sequential counter encoding of "at most k" for `0 < k < vars.len()`.
///
/// `s[i][j]` is implied whenever at least `j + 1` of `vars[..=i]` are true.
fn encode_sequential_counter_at_most_k_to_formula(
    formula: &mut CnfFormula,
    solver: &mut Solver,
    vars: &[Lit],
    k: usize,
) {
    let n = vars.len();
    let s: Vec<Vec<Lit>> = (0..n - 1)
        .map(|_| (0..k).map(|_| solver.new_lit()).collect())
        .collect();

    formula.add_clause(&[!vars[0], s[0][0]]);
    for j in 1..k {
        formula.add_clause(&[!s[0][j]]);
    }

    for i in 1..n - 1 {
        formula.add_clause(&[!vars[i], s[i][0]]);
        formula.add_clause(&[!s[i - 1][0], s[i][0]]);
        for j in 1..k {
            formula.add_clause(&[!vars[i], !s[i - 1][j - 1], s[i][j]]);
            formula.add_clause(&[!s[i - 1][j], s[i][j]]);
        }
        formula.add_clause(&[!vars[i], !s[i - 1][k - 1]]);
    }

    formula.add_clause(&[!vars[n - 1], !s[n - 2][k - 1]]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(height: usize, width: usize) -> Grid {
        Grid::new(height, width).unwrap()
    }

    #[test]
    fn test_symmetric_constraint_is_undetermined() {
        let mut oracle = Oracle::new(grid(1, 2));
        oracle
            .constrain(&Sentence::new([Cell::new(0, 0), Cell::new(0, 1)], 1).unwrap())
            .unwrap();

        let deductions = oracle.deduce([Cell::new(0, 0), Cell::new(0, 1)]).unwrap();
        assert_eq!(deductions[&Cell::new(0, 0)], DeducedState::Undetermined);
        assert_eq!(deductions[&Cell::new(0, 1)], DeducedState::Undetermined);
    }

    #[test]
    fn test_observation_forces_neighbors() {
        let mut oracle = Oracle::new(grid(3, 3));
        oracle.observe(Cell::new(2, 2), 0).unwrap();

        let deductions = oracle
            .deduce([Cell::new(1, 1), Cell::new(2, 2), Cell::new(0, 0)])
            .unwrap();
        assert_eq!(deductions[&Cell::new(1, 1)], DeducedState::ForcedSafe);
        assert_eq!(deductions[&Cell::new(2, 2)], DeducedState::ForcedSafe);
        assert_eq!(deductions[&Cell::new(0, 0)], DeducedState::Undetermined);
    }

    #[test]
    fn test_subset_pair_forces_mine() {
        let mut oracle = Oracle::new(grid(1, 3));
        let row = |cols: &[usize]| cols.iter().map(|&c| Cell::new(0, c)).collect::<Vec<_>>();
        oracle
            .constrain(&Sentence::new(row(&[0, 1]), 1).unwrap())
            .unwrap();
        oracle
            .constrain(&Sentence::new(row(&[0, 1, 2]), 2).unwrap())
            .unwrap();

        let deductions = oracle.deduce([Cell::new(0, 2)]).unwrap();
        assert_eq!(deductions[&Cell::new(0, 2)], DeducedState::ForcedMine);
    }

    #[test]
    fn test_sequential_counter_on_wide_constraint() {
        // 12 cells exceed the naive encoding threshold.
        let g = grid(1, 12);
        let all: Vec<Cell> = g.cells().collect();

        let mut oracle = Oracle::new(g);
        oracle.constrain(&Sentence::new(all.clone(), 2).unwrap()).unwrap();
        oracle
            .constrain(&Sentence::new(all[..10].to_vec(), 0).unwrap())
            .unwrap();

        let deductions = oracle.deduce(all.iter().copied()).unwrap();
        assert_eq!(deductions[&Cell::new(0, 0)], DeducedState::ForcedSafe);
        assert_eq!(deductions[&Cell::new(0, 10)], DeducedState::ForcedMine);
        assert_eq!(deductions[&Cell::new(0, 11)], DeducedState::ForcedMine);

        let mut loose = Oracle::new(g);
        loose.constrain(&Sentence::new(all.clone(), 3).unwrap()).unwrap();
        let deductions = loose.deduce(all.iter().copied()).unwrap();
        assert!(deductions.values().all(|&s| s == DeducedState::Undetermined));
    }

    #[test]
    fn test_contradictory_observations() {
        let mut oracle = Oracle::new(grid(1, 2));
        oracle.observe(Cell::new(0, 0), 1).unwrap();
        oracle.observe(Cell::new(0, 1), 0).unwrap();

        assert!(matches!(
            oracle.deduce([Cell::new(0, 0)]),
            Err(Error::Inconsistent(_))
        ));
    }

    #[test]
    fn test_audit_accepts_engine_deductions() {
        let mut engine = KnowledgeEngine::new(3, 3).unwrap();
        let mut oracle = Oracle::new(engine.grid());

        for (cell, count) in [(Cell::new(0, 1), 1), (Cell::new(2, 2), 0)] {
            engine.record_observation(cell, count).unwrap();
            oracle.observe(cell, count).unwrap();
        }
        oracle.audit(&engine).unwrap();
    }

    #[test]
    fn test_audit_flags_unforced_confirmation() {
        let mut engine = KnowledgeEngine::new(3, 3).unwrap();
        engine
            .assert_sentence(Sentence::new([Cell::new(0, 0)], 1).unwrap())
            .unwrap();

        // The oracle never saw the asserted sentence.
        let oracle = Oracle::new(engine.grid());
        assert_eq!(oracle.audit(&engine), Err(Error::Unsound(Cell::new(0, 0))));
    }
}
