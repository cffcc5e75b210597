use crate::cell::Cell;
use rand::Rng;
use rand::seq::IteratorRandom;
use std::collections::BTreeSet;

/// Picks a guess uniformly among `candidates`, or `None` if there are none.
pub fn random_move<R: Rng + ?Sized>(candidates: &BTreeSet<Cell>, rng: &mut R) -> Option<Cell> {
    candidates.iter().copied().choose(rng)
}
