//! Tick orchestration for one round: remote merge, local movement, fruit and outbound state.

use crate::config::{GameConfig, SpawnPoint};
use crate::fruit::FruitPlacer;
use crate::grid::{CellState, Grid, KilledResidue, PlayerId};
use crate::snake::{MoveOutcome, Snake};
use log::{debug, info};
use shared::{
    Color, Direction, InboundSnapshot, OutboundUpdate, Position, RemoteSnapshot,
    DEFAULT_REMOTE_COLOR,
};
use std::collections::{HashMap, HashSet};

/// Last merged state of a remote player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSnake {
    pub cells: Vec<Position>,
    pub alive: bool,
    pub color: Color,
    pub username: String,
}

/// Remote players keyed by id, created on first sight and removed on departure.
#[derive(Debug, Clone, Default)]
pub struct RemoteRoster {
    snakes: HashMap<PlayerId, RemoteSnake>,
}

impl RemoteRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the entry for `id`, returning the previous one.
    pub fn upsert(&mut self, id: &str, snake: RemoteSnake) -> Option<RemoteSnake> {
        self.snakes.insert(id.to_string(), snake)
    }

    pub fn remove(&mut self, id: &str) -> Option<RemoteSnake> {
        self.snakes.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&RemoteSnake> {
        self.snakes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut RemoteSnake> {
        self.snakes.get_mut(id)
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.snakes.keys().cloned().collect()
    }

    pub fn is_live(&self, id: &str) -> bool {
        self.snakes.get(id).is_some_and(|s| s.alive)
    }

    pub fn len(&self) -> usize {
        self.snakes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snakes.is_empty()
    }
}

/// What the transport should send after a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Update(OutboundUpdate),
    /// Emitted once, on the first tick after the local snake died.
    Died,
    Silent,
}

/// Owns the grid and every snake of a round and advances them one tick at a time.
///
/// Remote snapshots only ever touch the grid and the remote roster; the local snake is
/// driven exclusively by [`SimulationCoordinator::handle_input`] and the tick itself.
pub struct SimulationCoordinator {
    config: GameConfig,
    local_id: PlayerId,
    local_color: Color,
    grid: Grid,
    residue: KilledResidue,
    local: Option<Snake>,
    remotes: RemoteRoster,
    fruit: FruitPlacer,
    turn: u64,
    round_over: bool,
    death_reported: bool,
    winner: Option<PlayerId>,
}

impl SimulationCoordinator {
    pub fn new(config: GameConfig, local_id: impl Into<PlayerId>) -> Self {
        let mut grid = Grid::new(config.table_size);
        for pos in &config.obstacles {
            grid.set(*pos, CellState::Obstacle);
        }

        Self {
            local_color: config.spawns.first().map_or(DEFAULT_REMOTE_COLOR, |s| s.color),
            config,
            local_id: local_id.into(),
            grid,
            residue: KilledResidue::new(),
            local: None,
            remotes: RemoteRoster::new(),
            fruit: FruitPlacer::new(),
            turn: 0,
            round_over: false,
            death_reported: false,
            winner: None,
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn residue(&self) -> &KilledResidue {
        &self.residue
    }

    pub fn local_snake(&self) -> Option<&Snake> {
        self.local.as_ref()
    }

    pub fn remotes(&self) -> &RemoteRoster {
        &self.remotes
    }

    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn is_round_over(&self) -> bool {
        self.round_over
    }

    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    /// Places the local snake and the round's first fruit.
    pub fn start_round(&mut self, spawn: &SpawnPoint) {
        self.spawn_local(spawn);
        self.spawn_fruit();
        info!(
            "Round started for {} at {:?} heading {:?}",
            self.local_id,
            spawn.position(),
            spawn.direction
        );
    }

    pub fn spawn_local(&mut self, spawn: &SpawnPoint) {
        self.local_color = spawn.color;
        self.local = Some(Snake::new(
            self.local_id.clone(),
            spawn.position(),
            spawn.direction,
            &mut self.grid,
        ));
    }

    pub fn handle_input(&mut self, inputs: &[Direction]) {
        if self.round_over {
            return;
        }
        if let Some(snake) = self.local.as_mut() {
            if snake.handle(inputs) {
                debug!("Direction changed to {:?}", snake.direction());
            }
        }
    }

    /// Puts fruit on `pos` unless the cell is dead residue.
    pub fn place_fruit(&mut self, pos: Position) {
        if self.residue.contains(pos) {
            debug!("Refusing fruit on residue at {:?}", pos);
            return;
        }
        self.grid.set(pos, CellState::Fruit);
    }

    pub fn spawn_fruit(&mut self) -> Option<Position> {
        let pos = self.fruit.place(&self.grid)?;
        self.place_fruit(pos);
        debug!("Spawned fruit at {:?}", pos);
        Some(pos)
    }

    /// Merges a remote snapshot into the grid and the remote roster.
    ///
    /// Players that disappeared since the last merge are cleared first. Entries for the
    /// local player are ignored. Within one snapshot the last entry for an id wins.
    pub fn merge(&mut self, snapshot: &InboundSnapshot) {
        let mut incoming: Vec<(&str, &RemoteSnapshot)> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        for (id, snake) in &snapshot.snakes {
            if *id == self.local_id {
                continue;
            }
            match index.get(id.as_str()) {
                Some(i) => incoming[*i] = (id.as_str(), snake),
                None => {
                    index.insert(id.as_str(), incoming.len());
                    incoming.push((id.as_str(), snake));
                }
            }
        }

        let present: HashSet<&str> = incoming.iter().map(|(id, _)| *id).collect();
        for id in self.remotes.ids() {
            if !present.contains(id.as_str()) {
                self.depart(&id);
            }
        }

        for (id, snake) in incoming {
            let (color, username) = match snapshot.player(id) {
                Some(player) => (player.color, player.username.clone()),
                None => (DEFAULT_REMOTE_COLOR, String::new()),
            };
            if snake.alive {
                self.redraw_remote(id, snake, color, username);
            } else {
                self.retire_remote(id, snake, color, username);
            }
        }
    }

    fn depart(&mut self, id: &str) {
        if let Some(old) = self.remotes.remove(id) {
            for pos in &old.cells {
                self.grid.release(*pos, id, &self.residue);
            }
            info!("Remote player {} left, cleared {} cells", id, old.cells.len());
        }
    }

    fn redraw_remote(&mut self, id: &str, snake: &RemoteSnapshot, color: Color, username: String) {
        if let Some(existing) = self.remotes.get_mut(id) {
            if !existing.alive {
                existing.color = color;
                existing.username = username;
                return;
            }
        }

        let cells: Vec<Position> = snake
            .cells
            .iter()
            .filter_map(|pos| self.grid.normalize(*pos))
            .collect();

        if let Some(previous) = self.remotes.get(id) {
            let stale: Vec<Position> = previous
                .cells
                .iter()
                .filter(|pos| !cells.contains(*pos))
                .copied()
                .collect();
            for pos in stale {
                self.grid.release(pos, id, &self.residue);
            }
        }

        for pos in &cells {
            if self.residue.contains(*pos) {
                continue;
            }
            let drawable = match self.grid.get(*pos) {
                Some(CellState::Obstacle) | Some(CellState::DeadResidue(_)) | None => false,
                Some(CellState::Occupied(owner)) => *owner != self.local_id,
                Some(CellState::Empty) | Some(CellState::Fruit) => true,
            };
            if drawable {
                self.grid.set(*pos, CellState::Occupied(id.to_string()));
            }
        }

        let first_seen = self
            .remotes
            .upsert(
                id,
                RemoteSnake {
                    cells,
                    alive: true,
                    color,
                    username,
                },
            )
            .is_none();
        if first_seen {
            info!("Tracking remote player {}", id);
        }
    }

    fn retire_remote(&mut self, id: &str, snake: &RemoteSnapshot, color: Color, username: String) {
        match self.remotes.get_mut(id) {
            Some(existing) if existing.alive => {
                existing.alive = false;
                existing.color = color;
                existing.username = username;
                let cells = existing.cells.clone();
                self.mark_dead(id, &cells);
                info!("Remote player {} died, {} residue cells", id, cells.len());
            }
            Some(existing) => {
                existing.color = color;
                existing.username = username;
            }
            None => {
                let cells = snake
                    .cells
                    .iter()
                    .filter_map(|pos| self.grid.normalize(*pos))
                    .collect();
                self.remotes.upsert(
                    id,
                    RemoteSnake {
                        cells,
                        alive: false,
                        color,
                        username,
                    },
                );
            }
        }
    }

    /// Records `cells` as residue of `id` and paints every one not covered by another snake
    /// or an obstacle. Covered cells turn into residue when their occupant releases them.
    fn mark_dead(&mut self, id: &str, cells: &[Position]) {
        self.residue.record(id, cells.iter().copied());
        for pos in cells {
            let paint = match self.grid.get(*pos) {
                Some(CellState::Occupied(owner)) => owner == id,
                Some(CellState::Empty) | Some(CellState::Fruit) => true,
                Some(CellState::Obstacle) | Some(CellState::DeadResidue(_)) | None => false,
            };
            if paint {
                self.grid.set(*pos, self.residue.vacated(*pos));
            }
        }
    }

    fn on_local_death(&mut self) {
        let Some(snake) = self.local.as_ref() else {
            return;
        };
        let cells = snake.cells();
        let score = snake.score();
        let id = self.local_id.clone();
        self.mark_dead(&id, &cells);
        self.round_over = true;
        info!("Local player {} died with score {}", id, score);
    }

    /// External kill signal for the local snake.
    pub fn kill_local(&mut self) -> bool {
        let killed = self.local.as_mut().is_some_and(Snake::die);
        if killed {
            self.on_local_death();
        }
        killed
    }

    /// Marks the round finished as announced by the authority.
    pub fn finish(&mut self, winner: Option<PlayerId>) {
        self.round_over = true;
        self.winner = winner;
    }

    /// Moves the local snake once and spawns fruit on schedule. No-op once the round is over.
    pub fn advance(&mut self) -> MoveOutcome {
        if self.round_over {
            return MoveOutcome::Idle;
        }

        let remotes = &self.remotes;
        let outcome = match self.local.as_mut() {
            Some(snake) => snake.next_move(&mut self.grid, &self.residue, |id| remotes.is_live(id)),
            None => MoveOutcome::Idle,
        };

        if let MoveOutcome::Collided(_) = outcome {
            // The death tick is not counted as a turn and spawns no fruit.
            self.on_local_death();
            return outcome;
        }

        self.turn += 1;
        if self.turn % self.config.fruit_period == 0 && self.spawn_fruit().is_none() {
            debug!("No empty cell for fruit on turn {}", self.turn);
        }
        outcome
    }

    pub fn outbound(&mut self) -> Outbound {
        match self.local.as_ref() {
            Some(snake) if snake.is_alive() => Outbound::Update(snake.to_update()),
            Some(_) if !self.death_reported => {
                self.death_reported = true;
                Outbound::Died
            }
            _ => Outbound::Silent,
        }
    }

    /// One full tick: merge the latest snapshot if any, advance, report.
    pub fn tick(&mut self, inbound: Option<&InboundSnapshot>) -> Outbound {
        if let Some(snapshot) = inbound {
            self.merge(snapshot);
        }
        self.advance();
        self.outbound()
    }

    /// Display color for a cell; dead residue is drawn at half intensity.
    pub fn color_of(&self, state: &CellState) -> Color {
        match state {
            CellState::Empty => self.config.background_color,
            CellState::Fruit => self.config.fruit_color,
            CellState::Obstacle => self.config.obstacle_color,
            CellState::Occupied(id) => self.owner_color(id),
            CellState::DeadResidue(id) => self.owner_color(id).map(|c| c / 2),
        }
    }

    fn owner_color(&self, id: &str) -> Color {
        if id == self.local_id {
            return self.local_color;
        }
        self.remotes
            .get(id)
            .map_or(DEFAULT_REMOTE_COLOR, |snake| snake.color)
    }
}
