//! Connection sessions for the relay server
//!
//! UDP has no connections, so a session is keyed by the sender's socket address and
//! kept alive by any packet from it. Sessions start anonymous and carry a user id and
//! username once authenticated. Sessions that stay silent past the timeout are swept.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A peer address the server has heard from.
#[derive(Debug, Clone)]
pub struct Session {
    pub addr: SocketAddr,
    pub user_id: Option<String>,
    pub username: String,
    pub last_seen: Instant,
}

impl Session {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            user_id: None,
            username: String::new(),
            last_seen: Instant::now(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Tracks every live session and enforces the server capacity.
pub struct ClientManager {
    sessions: HashMap<SocketAddr, Session>,
    max_clients: usize,
    timeout: Duration,
}

impl ClientManager {
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            max_clients,
            timeout,
        }
    }

    /// Refreshes the session for `addr`, opening one if needed.
    ///
    /// Returns false when `addr` is unknown and the server is at capacity.
    pub fn touch(&mut self, addr: SocketAddr) -> bool {
        if let Some(session) = self.sessions.get_mut(&addr) {
            session.last_seen = Instant::now();
            return true;
        }
        if self.sessions.len() >= self.max_clients {
            return false;
        }
        info!("New session from {}", addr);
        self.sessions.insert(addr, Session::new(addr));
        true
    }

    /// Binds an identity to the session at `addr`.
    pub fn authenticate(&mut self, addr: SocketAddr, user_id: &str, username: &str) -> bool {
        match self.sessions.get_mut(&addr) {
            Some(session) => {
                session.user_id = Some(user_id.to_string());
                session.username = username.to_string();
                session.last_seen = Instant::now();
                info!("{} authenticated as {} ({})", addr, username, user_id);
                true
            }
            None => false,
        }
    }

    pub fn session(&self, addr: SocketAddr) -> Option<&Session> {
        self.sessions.get(&addr)
    }

    /// User id and username of an authenticated session.
    pub fn identity(&self, addr: SocketAddr) -> Option<(String, String)> {
        let session = self.sessions.get(&addr)?;
        let user_id = session.user_id.clone()?;
        Some((user_id, session.username.clone()))
    }

    pub fn addr_of(&self, user_id: &str) -> Option<SocketAddr> {
        self.sessions
            .values()
            .find(|s| s.user_id.as_deref() == Some(user_id))
            .map(|s| s.addr)
    }

    pub fn remove(&mut self, addr: SocketAddr) -> Option<Session> {
        let session = self.sessions.remove(&addr)?;
        info!("Session {} closed", addr);
        Some(session)
    }

    /// Removes and returns every session silent for longer than the timeout.
    pub fn check_timeouts(&mut self) -> Vec<Session> {
        let timeout = self.timeout;
        let expired: Vec<SocketAddr> = self
            .sessions
            .values()
            .filter(|s| s.is_timed_out(timeout))
            .map(|s| s.addr)
            .collect();

        expired
            .into_iter()
            .filter_map(|addr| self.remove(addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn manager(max_clients: usize) -> ClientManager {
        ClientManager::new(max_clients, Duration::from_secs(5))
    }

    #[test]
    fn test_session_starts_anonymous() {
        let session = Session::new(test_addr());
        assert_eq!(session.addr, test_addr());
        assert!(!session.is_authenticated());
        assert!(!session.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_session_timeout() {
        let mut session = Session::new(test_addr());
        session.last_seen = Instant::now() - Duration::from_secs(2);
        assert!(session.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_touch_opens_and_refreshes() {
        let mut manager = manager(2);
        assert!(manager.is_empty());

        assert!(manager.touch(test_addr()));
        assert!(manager.touch(test_addr()));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_capacity_limit() {
        let mut manager = manager(1);
        assert!(manager.touch(test_addr()));
        assert!(!manager.touch(test_addr2()));
        assert_eq!(manager.len(), 1);

        // Known addresses are still refreshed at capacity
        assert!(manager.touch(test_addr()));
    }

    #[test]
    fn test_authenticate_and_lookup() {
        let mut manager = manager(4);
        assert!(!manager.authenticate(test_addr(), "u1", "alice"));

        manager.touch(test_addr());
        manager.touch(test_addr2());
        assert!(manager.identity(test_addr()).is_none());

        assert!(manager.authenticate(test_addr(), "u1", "alice"));
        assert_eq!(
            manager.identity(test_addr()),
            Some(("u1".to_string(), "alice".to_string()))
        );
        assert_eq!(manager.addr_of("u1"), Some(test_addr()));
        assert_eq!(manager.addr_of("u2"), None);
        assert!(manager.session(test_addr2()).is_some());
    }

    #[test]
    fn test_remove_session() {
        let mut manager = manager(2);
        manager.touch(test_addr());

        assert!(manager.remove(test_addr()).is_some());
        assert!(manager.remove(test_addr()).is_none());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_check_timeouts_removes_only_silent_sessions() {
        let mut manager = ClientManager::new(4, Duration::from_millis(100));
        manager.touch(test_addr());
        manager.touch(test_addr2());
        manager.authenticate(test_addr(), "u1", "alice");

        manager
            .sessions
            .get_mut(&test_addr())
            .unwrap()
            .last_seen = Instant::now() - Duration::from_secs(1);

        let expired = manager.check_timeouts();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].user_id.as_deref(), Some("u1"));
        assert_eq!(manager.len(), 1);
        assert!(manager.session(test_addr2()).is_some());
    }
}
