use crate::peer::state::{ConnectionState, SessionState};
use crate::peer::transport::StateHandler;
use crate::registry::SessionRegistry;
use crate::session::{Session, SessionId};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Разбор сессий: каждый ресурс освобождается ровно один раз
#[derive(Clone)]
pub struct Reaper {
    registry: Arc<SessionRegistry>,
}

impl Reaper {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Идемпотентный разбор по id. Возвращает true, если сессия была найдена.
    pub async fn teardown(&self, id: &SessionId) -> bool {
        // сначала убираем из реестра, чтобы её больше никто не нашёл
        let Some(session) = self.registry.remove(id) else {
            debug!(session_id = %id, "Teardown: session already gone");
            return false;
        };
        info!(session_id = %id, "Tearing down session");
        self.release(&session).await;
        true
    }

    /// Освобождает ресурсы сессии, не трогая реестр
    pub async fn release(&self, session: &Session) {
        session.mark_closed();

        if session.claim_transport_close() {
            // ошибки закрытия только логируем: разбор не может провалиться
            if let Err(e) = session.transport().close().await {
                warn!(session_id = %session.id(), "Failed to close peer connection: {e}");
            }
        }

        if let Some(capture) = session.take_capture() {
            debug!(
                session_id = %session.id(),
                streams = capture.streams().len(),
                "Stopping capture sources"
            );
            capture.release();
        }
    }

    /// Обработчик состояния соединения: Closed/Failed запускают разбор
    pub fn connection_state_handler(&self, session: &Arc<Session>) -> StateHandler {
        let reaper = self.clone();
        let id = session.id().clone();
        let session: Weak<Session> = Arc::downgrade(session);

        Arc::new(move |state: ConnectionState| {
            if state == ConnectionState::Connected {
                if let Some(session) = session.upgrade() {
                    session.set_state(SessionState::Connected);
                }
                return;
            }
            if !state.is_terminal() {
                debug!(session_id = %id, ?state, "Peer connection state ignored");
                return;
            }

            info!(session_id = %id, ?state, "Peer connection terminal, scheduling teardown");
            let reaper = reaper.clone();
            let id = id.clone();
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        reaper.teardown(&id).await;
                    });
                }
                Err(_) => warn!(session_id = %id, "No runtime to run teardown on"),
            }
        })
    }
}
