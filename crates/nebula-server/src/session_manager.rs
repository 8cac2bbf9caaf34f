//! Registry of connected client sessions.

use std::collections::HashMap;
use std::sync::Arc;

use nebula_net::{Session, SessionId};
use parking_lot::RwLock;

/// Live sessions keyed by [`SessionId`].
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `session` until [`remove`](Self::remove) is called for its id.
    pub fn add(&self, session: &Arc<Session>) {
        self.sessions
            .write()
            .insert(session.id(), Arc::clone(session));
    }

    pub fn find(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.read().get(&id).cloned()
    }

    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Disconnect every tracked session (server shutdown).
    pub fn disconnect_all(&self) {
        let sessions: Vec<_> = self.sessions.read().values().cloned().collect();
        for session in sessions {
            session.disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nebula_net::{SessionConfig, SessionError, SessionHandler, SessionState};

    struct Ignore;

    impl SessionHandler for Ignore {
        fn on_received(&self, _: &Arc<Session>, window: &[u8]) -> Result<usize, SessionError> {
            Ok(window.len())
        }
    }

    fn session(id: u64) -> Arc<Session> {
        Session::new(SessionId(id), SessionConfig::default(), Arc::new(Ignore))
    }

    #[test]
    fn test_add_find_remove() {
        let manager = SessionManager::new();
        manager.add(&session(1));
        manager.add(&session(2));
        assert_eq!(manager.len(), 2);

        assert_eq!(manager.find(SessionId(2)).unwrap().id(), SessionId(2));
        assert!(manager.find(SessionId(3)).is_none());

        assert!(manager.remove(SessionId(1)).is_some());
        assert!(manager.remove(SessionId(1)).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_disconnect_all() {
        let manager = SessionManager::new();
        let a = session(1);
        let b = session(2);
        manager.add(&a);
        manager.add(&b);

        manager.disconnect_all();
        assert_eq!(a.state(), SessionState::Disconnected);
        assert_eq!(b.state(), SessionState::Disconnected);
    }
}
