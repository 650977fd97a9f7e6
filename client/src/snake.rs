//! Per-player movement and collision state machine

use crate::grid::{CellState, Grid, KilledResidue, PlayerId};
use log::debug;
use shared::{Direction, OutboundUpdate, Position, FRUIT_SCORE};
use std::collections::VecDeque;

/// Why a move attempt failed, in the order the checks are made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collision {
    OwnBody,
    Obstacle,
    Residue,
    Snake(PlayerId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Dead snakes and unresolvable coordinates do nothing.
    Idle,
    Moved,
    Ate,
    Collided(Collision),
}

/// A snake body on the grid, tail first and head last.
///
/// `length` is the target body length and only grows when fruit is eaten; the body is
/// trimmed from the tail until it fits. A snake is `Alive` until its first failed move or
/// an external kill, after which it is `Dead` for good and its cells become residue.
#[derive(Debug, Clone)]
pub struct Snake {
    id: PlayerId,
    cells: VecDeque<Position>,
    direction: Direction,
    alive: bool,
    score: u32,
    length: usize,
}

impl Snake {
    /// Spawns a one-cell snake at `start` and marks the cell on the grid.
    ///
    /// On a zero-sized grid nothing is drawn and the snake never moves.
    pub fn new(id: impl Into<PlayerId>, start: Position, direction: Direction, grid: &mut Grid) -> Self {
        let start = grid.normalize(start).unwrap_or(start);
        Self::from_cells(id.into(), VecDeque::from([start]), direction, grid)
    }

    /// Spawns a snake whose body is `body` (tail first). Cells that cannot be placed on the
    /// grid are dropped; `None` when nothing is left.
    pub fn with_body(
        id: impl Into<PlayerId>,
        body: Vec<Position>,
        direction: Direction,
        grid: &mut Grid,
    ) -> Option<Self> {
        let cells: VecDeque<Position> =
            body.into_iter().filter_map(|pos| grid.normalize(pos)).collect();
        if cells.is_empty() {
            return None;
        }
        Some(Self::from_cells(id.into(), cells, direction, grid))
    }

    fn from_cells(id: PlayerId, cells: VecDeque<Position>, direction: Direction, grid: &mut Grid) -> Self {
        let snake = Self {
            id,
            length: cells.len(),
            cells,
            direction,
            alive: true,
            score: 0,
        };
        snake.draw(grid);
        snake
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn head(&self) -> Option<Position> {
        self.cells.back().copied()
    }

    pub fn cells(&self) -> Vec<Position> {
        self.cells.iter().copied().collect()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Applies the first input that does not reverse the current direction.
    ///
    /// Returns true when the direction changed.
    pub fn handle(&mut self, inputs: &[Direction]) -> bool {
        if !self.alive {
            return false;
        }

        let previous = self.direction;
        if let Some(next) = inputs.iter().find(|d| **d != self.direction.opposite()) {
            self.direction = *next;
        }
        self.direction != previous
    }

    /// Checks `pos` in fixed precedence: own body, obstacle, residue, then other live snakes.
    pub fn collision_at<F>(
        &self,
        pos: Position,
        grid: &Grid,
        residue: &KilledResidue,
        is_live: F,
    ) -> Option<Collision>
    where
        F: Fn(&str) -> bool,
    {
        if self.cells.contains(&pos) {
            return Some(Collision::OwnBody);
        }

        let state = grid.get(pos);
        if matches!(state, Some(CellState::Obstacle)) {
            return Some(Collision::Obstacle);
        }
        if residue.contains(pos) || matches!(state, Some(CellState::DeadResidue(_))) {
            return Some(Collision::Residue);
        }
        match state {
            Some(CellState::Occupied(owner)) if *owner != self.id && is_live(owner.as_str()) => {
                Some(Collision::Snake(owner.clone()))
            }
            _ => None,
        }
    }

    /// Advances one cell in the current direction.
    ///
    /// A collision kills the snake without committing the move; the caller owns the
    /// follow-up (residue, roster, game-over).
    pub fn next_move<F>(&mut self, grid: &mut Grid, residue: &KilledResidue, is_live: F) -> MoveOutcome
    where
        F: Fn(&str) -> bool,
    {
        if !self.alive {
            return MoveOutcome::Idle;
        }
        let Some(head) = self.head() else {
            return MoveOutcome::Idle;
        };
        let Some(candidate) = grid.normalize(head.step(self.direction)) else {
            return MoveOutcome::Idle;
        };

        if let Some(collision) = self.collision_at(candidate, grid, residue, is_live) {
            debug!("Snake {} collided at {:?}: {:?}", self.id, candidate, collision);
            self.die();
            return MoveOutcome::Collided(collision);
        }

        let ate = matches!(grid.get(candidate), Some(CellState::Fruit));
        self.cells.push_back(candidate);

        if ate {
            self.length += 1;
            self.score += FRUIT_SCORE;
        } else {
            while self.cells.len() > self.length {
                if let Some(tail) = self.cells.pop_front() {
                    grid.set(tail, residue.vacated(tail));
                }
            }
        }

        self.draw(grid);

        if ate {
            MoveOutcome::Ate
        } else {
            MoveOutcome::Moved
        }
    }

    /// `Alive -> Dead`. Returns false if the snake was already dead.
    pub fn die(&mut self) -> bool {
        if !self.alive {
            return false;
        }
        self.alive = false;
        true
    }

    pub fn to_update(&self) -> OutboundUpdate {
        OutboundUpdate {
            cells: self.cells(),
            direction: self.direction,
            alive: self.alive,
            score: self.score,
        }
    }

    fn draw(&self, grid: &mut Grid) {
        for pos in &self.cells {
            grid.set(*pos, CellState::Occupied(self.id.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_live(_: &str) -> bool {
        false
    }

    fn all_live(_: &str) -> bool {
        true
    }

    #[test]
    fn test_snake_creation_marks_grid() {
        let mut grid = Grid::new(20);
        let snake = Snake::new("me", Position::new(10, 10), Direction::Left, &mut grid);

        assert_eq!(snake.id(), "me");
        assert_eq!(snake.cells(), vec![Position::new(10, 10)]);
        assert_eq!(snake.length(), 1);
        assert_eq!(snake.score(), 0);
        assert!(snake.is_alive());
        assert_eq!(
            grid.get(Position::new(10, 10)),
            Some(&CellState::Occupied("me".into()))
        );
    }

    #[test]
    fn test_move_wraps_toroidally() {
        let mut grid = Grid::new(20);
        let residue = KilledResidue::new();
        let mut snake = Snake::new("me", Position::new(19, 5), Direction::Right, &mut grid);

        assert_eq!(snake.next_move(&mut grid, &residue, no_live), MoveOutcome::Moved);
        assert_eq!(snake.head(), Some(Position::new(0, 5)));
        assert!(grid.is_empty(Position::new(19, 5)));

        snake.handle(&[Direction::Up]);
        for _ in 0..6 {
            snake.next_move(&mut grid, &residue, no_live);
        }
        assert_eq!(snake.head(), Some(Position::new(0, 19)));
    }

    #[test]
    fn test_move_onto_empty_trims_tail() {
        let mut grid = Grid::new(20);
        let residue = KilledResidue::new();
        let mut snake = Snake::with_body(
            "me",
            vec![Position::new(3, 3), Position::new(4, 3)],
            Direction::Right,
            &mut grid,
        )
        .unwrap();

        assert_eq!(snake.next_move(&mut grid, &residue, no_live), MoveOutcome::Moved);

        assert_eq!(snake.cells(), vec![Position::new(4, 3), Position::new(5, 3)]);
        assert_eq!(snake.length(), 2);
        assert_eq!(snake.score(), 0);
        assert!(grid.is_empty(Position::new(3, 3)));
    }

    #[test]
    fn test_move_onto_fruit_grows() {
        let mut grid = Grid::new(20);
        let residue = KilledResidue::new();
        let mut snake = Snake::new("me", Position::new(10, 10), Direction::Right, &mut grid);
        grid.set(Position::new(11, 10), CellState::Fruit);

        assert_eq!(snake.next_move(&mut grid, &residue, no_live), MoveOutcome::Ate);

        assert_eq!(snake.score(), 10);
        assert_eq!(snake.length(), 2);
        assert_eq!(snake.cells(), vec![Position::new(10, 10), Position::new(11, 10)]);
        assert_eq!(
            grid.get(Position::new(10, 10)),
            Some(&CellState::Occupied("me".into()))
        );
        assert_eq!(
            grid.get(Position::new(11, 10)),
            Some(&CellState::Occupied("me".into()))
        );
    }

    #[test]
    fn test_self_collision_kills_without_moving() {
        let mut grid = Grid::new(20);
        let residue = KilledResidue::new();
        let body = vec![
            Position::new(5, 5),
            Position::new(6, 5),
            Position::new(6, 6),
            Position::new(5, 6),
        ];
        let mut snake = Snake::with_body("me", body.clone(), Direction::Up, &mut grid).unwrap();

        let outcome = snake.next_move(&mut grid, &residue, no_live);

        assert_eq!(outcome, MoveOutcome::Collided(Collision::OwnBody));
        assert!(!snake.is_alive());
        assert_eq!(snake.cells(), body);
        for pos in body {
            assert_eq!(grid.get(pos), Some(&CellState::Occupied("me".into())));
        }
    }

    #[test]
    fn test_collision_precedence() {
        let mut grid = Grid::new(10);
        let mut residue = KilledResidue::new();
        let snake = Snake::with_body(
            "me",
            vec![Position::new(1, 1), Position::new(2, 1)],
            Direction::Right,
            &mut grid,
        )
        .unwrap();

        residue.record(
            "ghost",
            vec![Position::new(1, 1), Position::new(5, 5), Position::new(6, 6)],
        );
        grid.set(Position::new(5, 5), CellState::Obstacle);
        grid.set(Position::new(7, 7), CellState::Occupied("other".into()));

        assert_eq!(
            snake.collision_at(Position::new(1, 1), &grid, &residue, all_live),
            Some(Collision::OwnBody)
        );
        assert_eq!(
            snake.collision_at(Position::new(5, 5), &grid, &residue, all_live),
            Some(Collision::Obstacle)
        );
        assert_eq!(
            snake.collision_at(Position::new(6, 6), &grid, &residue, all_live),
            Some(Collision::Residue)
        );
        assert_eq!(
            snake.collision_at(Position::new(7, 7), &grid, &residue, all_live),
            Some(Collision::Snake("other".into()))
        );
        assert_eq!(
            snake.collision_at(Position::new(7, 7), &grid, &residue, no_live),
            None
        );
        assert_eq!(
            snake.collision_at(Position::new(8, 8), &grid, &residue, all_live),
            None
        );
    }

    #[test]
    fn test_residue_cell_on_grid_blocks() {
        let mut grid = Grid::new(10);
        let residue = KilledResidue::new();
        let mut snake = Snake::new("me", Position::new(0, 0), Direction::Down, &mut grid);
        grid.set(Position::new(0, 1), CellState::DeadResidue("ghost".into()));

        assert_eq!(
            snake.next_move(&mut grid, &residue, no_live),
            MoveOutcome::Collided(Collision::Residue)
        );
    }

    #[test]
    fn test_trimmed_tail_over_residue_stays_residue() {
        let mut grid = Grid::new(10);
        let mut residue = KilledResidue::new();
        let mut snake = Snake::with_body(
            "me",
            vec![Position::new(3, 3), Position::new(4, 3)],
            Direction::Right,
            &mut grid,
        )
        .unwrap();
        residue.record("ghost", vec![Position::new(3, 3)]);

        assert_eq!(snake.next_move(&mut grid, &residue, no_live), MoveOutcome::Moved);

        assert_eq!(
            grid.get(Position::new(3, 3)),
            Some(&CellState::DeadResidue("ghost".into()))
        );
    }

    #[test]
    fn test_with_body_needs_a_cell() {
        let mut grid = Grid::new(10);
        assert!(Snake::with_body("me", Vec::new(), Direction::Up, &mut grid).is_none());

        let mut empty = Grid::new(0);
        assert!(Snake::with_body("me", vec![Position::new(0, 0)], Direction::Up, &mut empty).is_none());
        assert!(grid.occupied_positions().is_empty());
    }

    #[test]
    fn test_reverse_input_rejected() {
        let mut grid = Grid::new(20);
        let mut snake = Snake::new("me", Position::new(10, 10), Direction::Left, &mut grid);

        assert!(!snake.handle(&[Direction::Right]));
        assert_eq!(snake.direction(), Direction::Left);

        assert!(snake.handle(&[Direction::Up]));
        assert_eq!(snake.direction(), Direction::Up);
    }

    #[test]
    fn test_first_valid_input_wins() {
        let mut grid = Grid::new(20);
        let mut snake = Snake::new("me", Position::new(10, 10), Direction::Left, &mut grid);

        snake.handle(&[Direction::Right, Direction::Down, Direction::Up]);
        assert_eq!(snake.direction(), Direction::Down);

        snake.handle(&[]);
        assert_eq!(snake.direction(), Direction::Down);

        snake.handle(&[Direction::Up, Direction::Up]);
        assert_eq!(snake.direction(), Direction::Down);
    }

    #[test]
    fn test_dead_snake_is_inert() {
        let mut grid = Grid::new(20);
        let residue = KilledResidue::new();
        let mut snake = Snake::new("me", Position::new(10, 10), Direction::Left, &mut grid);

        assert!(snake.die());
        assert!(!snake.die());
        assert!(!snake.handle(&[Direction::Up]));
        assert_eq!(snake.next_move(&mut grid, &residue, no_live), MoveOutcome::Idle);
        assert_eq!(snake.head(), Some(Position::new(10, 10)));
    }

    #[test]
    fn test_to_update() {
        let mut grid = Grid::new(20);
        let mut snake = Snake::new("me", Position::new(1, 2), Direction::Down, &mut grid);
        snake.die();

        let update = snake.to_update();
        assert_eq!(update.cells, vec![Position::new(1, 2)]);
        assert_eq!(update.direction, Direction::Down);
        assert!(!update.alive);
        assert_eq!(update.score, 0);
    }
}
