//! Immutable game configuration, loaded once before a round starts.

use serde::{Deserialize, Serialize};
use shared::{Color, Direction, Position, DEFAULT_TABLE_SIZE};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Where a local snake starts and which keys steer it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoint {
    #[serde(alias = "sx")]
    pub x: i32,
    #[serde(alias = "sy")]
    pub y: i32,
    pub color: Color,
    pub direction: Direction,
    #[serde(default)]
    pub keys: HashMap<String, Direction>,
}

impl SpawnPoint {
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub table_size: u32,
    #[serde(alias = "block_cells")]
    pub obstacles: Vec<Position>,
    /// Turns between fruit spawns.
    pub fruit_period: u64,
    pub tick_ms: u64,
    pub auth_timeout_ms: u64,
    #[serde(alias = "server_url")]
    pub server_addr: String,
    #[serde(alias = "back_color")]
    pub background_color: Color,
    pub fruit_color: Color,
    #[serde(alias = "block_color")]
    pub obstacle_color: Color,
    #[serde(alias = "snakes")]
    pub spawns: Vec<SpawnPoint>,
}

fn bindings(keys: [(&str, Direction); 4]) -> HashMap<String, Direction> {
    keys.into_iter().map(|(k, d)| (k.to_string(), d)).collect()
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            table_size: DEFAULT_TABLE_SIZE,
            obstacles: (12..=16).map(|x| Position::new(x, 14)).collect(),
            fruit_period: 10,
            tick_ms: 100,
            auth_timeout_ms: 5000,
            server_addr: "127.0.0.1:8080".to_string(),
            background_color: [30, 30, 40],
            fruit_color: [255, 60, 60],
            obstacle_color: [139, 69, 19],
            spawns: vec![
                SpawnPoint {
                    x: 10,
                    y: 10,
                    color: [0, 240, 0],
                    direction: Direction::Left,
                    keys: bindings([
                        ("w", Direction::Up),
                        ("s", Direction::Down),
                        ("a", Direction::Left),
                        ("d", Direction::Right),
                    ]),
                },
                SpawnPoint {
                    x: 1,
                    y: 15,
                    color: [0, 120, 240],
                    direction: Direction::Right,
                    keys: bindings([
                        ("i", Direction::Up),
                        ("k", Direction::Down),
                        ("j", Direction::Left),
                        ("l", Direction::Right),
                    ]),
                },
            ],
        }
    }
}

impl GameConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: GameConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            let config = GameConfig::default();
            config.validate()?;
            return Ok(config);
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table_size == 0 || self.table_size > 1024 {
            return Err(ConfigError::Invalid(format!(
                "table_size must be in 1..=1024, got {}",
                self.table_size
            )));
        }
        if self.fruit_period == 0 {
            return Err(ConfigError::Invalid("fruit_period must be positive".into()));
        }
        if self.tick_ms == 0 {
            return Err(ConfigError::Invalid("tick_ms must be positive".into()));
        }
        if self.spawns.is_empty() {
            return Err(ConfigError::Invalid("at least one spawn point is required".into()));
        }

        let in_range = |pos: Position| {
            (0..self.table_size as i32).contains(&pos.x) && (0..self.table_size as i32).contains(&pos.y)
        };
        if let Some(pos) = self.obstacles.iter().find(|p| !in_range(**p)) {
            return Err(ConfigError::Invalid(format!("obstacle {:?} is off the table", pos)));
        }
        if let Some(spawn) = self.spawns.iter().find(|s| !in_range(s.position())) {
            return Err(ConfigError::Invalid(format!(
                "spawn {:?} is off the table",
                spawn.position()
            )));
        }
        if let Some(spawn) = self.spawns.iter().find(|s| self.obstacles.contains(&s.position())) {
            return Err(ConfigError::Invalid(format!(
                "spawn {:?} sits on an obstacle",
                spawn.position()
            )));
        }
        Ok(())
    }

    /// Host plays spawn 0, everyone else the next one (wrapping if the list is short).
    pub fn spawn_for(&self, is_host: bool) -> Option<&SpawnPoint> {
        let index = if is_host { 0 } else { 1 % self.spawns.len().max(1) };
        self.spawns.get(index)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn ticks_per_second(&self) -> f32 {
        1000.0 / self.tick_ms as f32
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }
}
