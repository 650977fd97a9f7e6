//! Toroidal cell grid shared by every snake in a round.

use shared::Position;
use std::collections::HashMap;

pub type PlayerId = String;

/// Occupancy of a single cell. Display colors are resolved separately by owner id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CellState {
    #[default]
    Empty,
    Fruit,
    Obstacle,
    Occupied(PlayerId),
    DeadResidue(PlayerId),
}

impl CellState {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellState::Empty)
    }

    pub fn owner(&self) -> Option<&str> {
        match self {
            CellState::Occupied(id) | CellState::DeadResidue(id) => Some(id),
            _ => None,
        }
    }
}

/// `size × size` cells stored column-major (`x` outer), fixed for the game's lifetime.
///
/// Every coordinate is wrapped into range before lookup. Lookups that cannot be
/// normalized are reported as `None` by [`Grid::get`] and ignored by [`Grid::set`].
#[derive(Debug, Clone)]
pub struct Grid {
    size: u32,
    cells: Vec<CellState>,
}

impl Grid {
    pub fn new(size: u32) -> Self {
        let count = (size as usize) * (size as usize);
        Self {
            size,
            cells: vec![CellState::Empty; count],
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn normalize(&self, pos: Position) -> Option<Position> {
        pos.wrapped(self.size)
    }

    fn index(&self, pos: Position) -> Option<usize> {
        let pos = self.normalize(pos)?;
        Some(pos.x as usize * self.size as usize + pos.y as usize)
    }

    pub fn get(&self, pos: Position) -> Option<&CellState> {
        self.index(pos).and_then(|i| self.cells.get(i))
    }

    pub fn set(&mut self, pos: Position, state: CellState) {
        if let Some(cell) = self.index(pos).and_then(|i| self.cells.get_mut(i)) {
            *cell = state;
        }
    }

    pub fn is_empty(&self, pos: Position) -> bool {
        self.get(pos).is_some_and(CellState::is_empty)
    }

    /// Frees `pos` only while it is still `Occupied` by `owner`.
    ///
    /// A freed cell becomes `Empty` unless it is recorded residue, which is restored instead.
    pub fn release(&mut self, pos: Position, owner: &str, residue: &KilledResidue) {
        let owned = matches!(self.get(pos), Some(CellState::Occupied(id)) if id == owner);
        if owned {
            self.set(pos, residue.vacated(pos));
        }
    }

    /// Row-major scan: `x` ascending in the outer loop, `y` ascending in the inner loop.
    pub fn iter(&self) -> impl Iterator<Item = (Position, &CellState)> + '_ {
        let size = self.size as i32;
        self.cells.iter().enumerate().map(move |(i, state)| {
            let i = i as i32;
            (Position::new(i / size, i % size), state)
        })
    }

    pub fn occupied_positions(&self) -> Vec<Position> {
        self.iter()
            .filter(|(_, state)| !state.is_empty())
            .map(|(pos, _)| pos)
            .collect()
    }

    /// One line per `y` row, for debug logging.
    pub fn to_ascii(&self) -> String {
        let mut out = String::with_capacity(self.cells.len() + self.size as usize);
        for y in 0..self.size as i32 {
            for x in 0..self.size as i32 {
                let glyph = match self.get(Position::new(x, y)) {
                    Some(CellState::Empty) | None => '.',
                    Some(CellState::Fruit) => '*',
                    Some(CellState::Obstacle) => '#',
                    Some(CellState::Occupied(_)) => 'o',
                    Some(CellState::DeadResidue(_)) => 'x',
                };
                out.push(glyph);
            }
            out.push('\n');
        }
        out
    }
}

/// Cells left behind by dead snakes, keyed to the first snake that died there.
/// Append-only for the lifetime of a round.
#[derive(Debug, Clone, Default)]
pub struct KilledResidue {
    cells: HashMap<Position, PlayerId>,
}

impl KilledResidue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record<I>(&mut self, owner: &str, cells: I)
    where
        I: IntoIterator<Item = Position>,
    {
        for pos in cells {
            self.cells.entry(pos).or_insert_with(|| owner.to_string());
        }
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.cells.contains_key(&pos)
    }

    pub fn owner(&self, pos: Position) -> Option<&str> {
        self.cells.get(&pos).map(String::as_str)
    }

    /// What a cell at `pos` turns into once nothing live covers it.
    pub fn vacated(&self, pos: Position) -> CellState {
        match self.cells.get(&pos) {
            Some(owner) => CellState::DeadResidue(owner.clone()),
            None => CellState::Empty,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
