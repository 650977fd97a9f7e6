//! Maximin fruit placement

use crate::grid::Grid;
use shared::Position;

/// Picks the empty cell farthest (Manhattan, unwrapped) from every non-empty cell.
///
/// Ties go to the first candidate in row-major order, `x` outer and `y` inner. With no
/// non-empty cells at all, the first empty cell wins. Cost is `O(cells × occupied)`,
/// which only stays cheap because tables are a few tens of cells per side.
#[derive(Debug, Default, Clone, Copy)]
pub struct FruitPlacer;

impl FruitPlacer {
    pub fn new() -> Self {
        Self
    }

    /// Returns `None` when the grid has no empty cell left.
    pub fn place(&self, grid: &Grid) -> Option<Position> {
        let occupied = grid.occupied_positions();
        let mut best: Option<(Position, u32)> = None;

        for (candidate, state) in grid.iter() {
            if !state.is_empty() {
                continue;
            }

            let distance = occupied
                .iter()
                .map(|o| candidate.manhattan(*o))
                .min()
                .unwrap_or(u32::MAX);

            match best {
                Some((_, best_distance)) if distance <= best_distance => {}
                _ => best = Some((candidate, distance)),
            }
        }

        best.map(|(pos, _)| pos)
    }
}
