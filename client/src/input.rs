//! Key-to-direction mapping and per-tick input buffering

use crate::config::SpawnPoint;
use log::{debug, warn};
use shared::Direction;
use std::collections::HashMap;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Keys bound to directions for the local snake.
#[derive(Debug, Clone, Default)]
pub struct KeyBindings {
    keys: HashMap<String, Direction>,
}

impl KeyBindings {
    pub fn new(keys: HashMap<String, Direction>) -> Self {
        Self { keys }
    }

    pub fn from_spawn(spawn: &SpawnPoint) -> Self {
        Self::new(spawn.keys.clone())
    }

    pub fn lookup(&self, key: &str) -> Option<Direction> {
        self.keys.get(key).copied()
    }

    /// Maps a line of key presses to directions, in the order they were typed.
    ///
    /// Whole whitespace-separated tokens are tried first so multi-character names
    /// ("up", "left") can be bound; otherwise every character is its own key.
    pub fn translate(&self, line: &str) -> Vec<Direction> {
        let mut directions = Vec::new();
        for token in line.split_whitespace() {
            if let Some(dir) = self.lookup(token) {
                directions.push(dir);
                continue;
            }
            let mut buf = [0u8; 4];
            directions.extend(
                token
                    .chars()
                    .filter_map(|c| self.lookup(c.encode_utf8(&mut buf))),
            );
        }
        directions
    }
}

/// Collects directions between ticks so the snake sees them in arrival order.
#[derive(Debug, Default)]
pub struct InputBuffer {
    pending: Vec<Direction>,
}

impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self, bindings: &KeyBindings, line: &str) {
        let directions = bindings.translate(line);
        if directions.is_empty() {
            debug!("Ignoring unbound input {:?}", line);
        }
        self.pending.extend(directions);
    }

    pub fn drain(&mut self) -> Vec<Direction> {
        std::mem::take(&mut self.pending)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Forwards stdin lines into `tx` until stdin closes or the receiver is dropped.
pub fn spawn_stdin_reader(tx: mpsc::Sender<String>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Error reading input: {}", e);
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;

    fn wasd() -> KeyBindings {
        let config = GameConfig::default();
        KeyBindings::from_spawn(&config.spawns[0])
    }

    #[test]
    fn test_translate_single_keys_in_order() {
        let bindings = wasd();
        assert_eq!(
            bindings.translate("wd"),
            vec![Direction::Up, Direction::Right]
        );
        assert_eq!(
            bindings.translate("s x a"),
            vec![Direction::Down, Direction::Left]
        );
        assert!(bindings.translate("ijkl").is_empty());
    }

    #[test]
    fn test_translate_named_tokens() {
        let mut keys = HashMap::new();
        keys.insert("up".to_string(), Direction::Up);
        keys.insert("u".to_string(), Direction::Left);
        let bindings = KeyBindings::new(keys);

        assert_eq!(bindings.translate("up"), vec![Direction::Up]);
        assert_eq!(bindings.translate("uu"), vec![Direction::Left, Direction::Left]);
    }

    #[test]
    fn test_input_buffer_drains() {
        let bindings = wasd();
        let mut buffer = InputBuffer::new();
        assert!(buffer.is_empty());

        buffer.push_line(&bindings, "w");
        buffer.push_line(&bindings, "zzz");
        buffer.push_line(&bindings, "a");

        assert_eq!(buffer.drain(), vec![Direction::Up, Direction::Left]);
        assert!(buffer.is_empty());
        assert!(buffer.drain().is_empty());
    }
}
