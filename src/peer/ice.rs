use crate::error::{SignalError, TransportError};
use crate::logger::dump_candidate;
use crate::peer::transport::CandidateHandler;
use crate::peer::types::IceCandidate;
use crate::registry::SessionRegistry;
use crate::session::{Session, SessionId};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Обмен кандидатами через реестр: сервер → клиент (опрос) и клиент → сервер
#[derive(Clone)]
pub struct CandidateRelay {
    registry: Arc<SessionRegistry>,
}

impl CandidateRelay {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Обработчик для движка: складывает локальные кандидаты в сессию.
    /// Держит слабую ссылку, чтобы не продлевать жизнь сессии после разбора.
    pub fn server_candidate_handler(session: &Arc<Session>) -> CandidateHandler {
        let session: Weak<Session> = Arc::downgrade(session);
        Arc::new(move |candidate: Option<IceCandidate>| match session.upgrade() {
            Some(session) => session.push_server_candidate(candidate),
            None => debug!("Candidate for released session discarded"),
        })
    }

    /// Серверные кандидаты сессии; опрос ничего не потребляет
    pub fn server_candidates(&self, id: &SessionId) -> Result<Vec<IceCandidate>, SignalError> {
        let session = self.registry.get(id)?;
        Ok(session.server_candidates())
    }

    /// Применяет ICE кандидат от удаленной стороны
    pub async fn submit_client_candidate(
        &self,
        id: &SessionId,
        candidate: IceCandidate,
    ) -> Result<(), SignalError> {
        let session = self.registry.get(id)?;
        if session.state().is_terminal() {
            return Err(SignalError::CandidateRejected(TransportError::Closed));
        }

        dump_candidate("REMOTE", id.as_str(), &candidate);
        match session.transport().add_remote_candidate(candidate).await {
            Ok(()) => {
                debug!(session_id = %id, "Successfully added ICE candidate");
                Ok(())
            }
            Err(e) => {
                warn!(session_id = %id, "Failed to add ICE candidate: {e}");
                Err(SignalError::CandidateRejected(e))
            }
        }
    }
}

pub fn analyze_candidates(candidates: &[IceCandidate]) {
    let mut host_count = 0;
    let mut srflx_count = 0;
    let mut relay_count = 0;

    for candidate in candidates {
        if candidate.candidate.contains("typ host") {
            host_count += 1;
        } else if candidate.candidate.contains("typ srflx") {
            srflx_count += 1;
        } else if candidate.candidate.contains("typ relay") {
            relay_count += 1;
        }
    }

    info!(
        "Candidate analysis: {} host, {} srflx, {} relay",
        host_count, srflx_count, relay_count
    );

    if relay_count == 0 {
        warn!("No TURN relay candidates found! Connection through NAT may fail.");
    }
}
