use crate::error::SignalError;
use crate::session::{Session, SessionId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Реестр живых сессий: единственное общее изменяемое состояние.
///
/// Под замком только операции с таблицей; всё, что ждёт движок или
/// устройства, делается снаружи через `Arc<Session>`.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<Session>) -> Result<(), SignalError> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(session.id()) {
            return Err(SignalError::DuplicateSessionId(session.id().clone()));
        }
        debug!(session_id = %session.id(), total = sessions.len() + 1, "Session registered");
        sessions.insert(session.id().clone(), session);
        Ok(())
    }

    pub fn get(&self, id: &SessionId) -> Result<Arc<Session>, SignalError> {
        self.sessions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| SignalError::SessionNotFound(id.clone()))
    }

    /// Удаление идемпотентно: отсутствующий id не ошибка
    pub fn remove(&self, id: &SessionId) -> Option<Arc<Session>> {
        let removed = self.sessions.write().remove(id);
        if removed.is_some() {
            debug!(session_id = %id, "Session removed from registry");
        }
        removed
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.read().values().cloned().collect()
    }
}
