use minesweeper as ms;
use wasm_bindgen::prelude::*;

fn load(bts: &[u8]) -> Result<ms::KnowledgeEngine, String> {
    ms::KnowledgeEngine::deserialize(bts).map_err(|e| e.to_string())
}

fn flatten<'a>(cells: impl IntoIterator<Item = &'a ms::Cell>) -> Vec<u32> {
    cells
        .into_iter()
        .flat_map(|cell| [cell.row as u32, cell.col as u32])
        .collect()
}

#[wasm_bindgen]
pub fn create_engine(height: u32, width: u32) -> Result<Vec<u8>, String> {
    console_error_panic_hook::set_once();

    let engine =
        ms::KnowledgeEngine::new(height as usize, width as usize).map_err(|e| e.to_string())?;
    engine.serialize().map_err(|e| e.to_string())
}

#[wasm_bindgen]
pub fn observe(bts: Vec<u8>, row: u32, col: u32, count: u8) -> Result<Vec<u8>, String> {
    console_error_panic_hook::set_once();

    let mut engine = load(&bts)?;
    let cell = ms::Cell::new(row as usize, col as usize);
    engine
        .record_observation(cell, count as usize)
        .map_err(|e| e.to_string())?;
    engine.serialize().map_err(|e| e.to_string())
}

/// `[row, col]` of the next known-safe cell, or empty if there is none.
#[wasm_bindgen]
pub fn safe_move(bts: Vec<u8>) -> Result<Vec<u32>, String> {
    console_error_panic_hook::set_once();

    let engine = load(&bts)?;
    Ok(flatten(engine.query_safe_move().as_ref()))
}

/// `[row, col]` of a random unplayed cell not known to be a mine, or empty.
#[wasm_bindgen]
pub fn random_move(bts: Vec<u8>) -> Result<Vec<u32>, String> {
    console_error_panic_hook::set_once();

    let engine = load(&bts)?;
    let cell = ms::random_move(&engine.query_fallback_candidates(), &mut rand::rng());
    Ok(flatten(cell.as_ref()))
}

/// Confirmed mines as flattened `row, col` pairs.
#[wasm_bindgen]
pub fn mines(bts: Vec<u8>) -> Result<Vec<u32>, String> {
    console_error_panic_hook::set_once();

    Ok(flatten(load(&bts)?.confirmed_mines()))
}

/// Confirmed safe cells as flattened `row, col` pairs.
#[wasm_bindgen]
pub fn safes(bts: Vec<u8>) -> Result<Vec<u32>, String> {
    console_error_panic_hook::set_once();

    Ok(flatten(load(&bts)?.confirmed_safes()))
}
