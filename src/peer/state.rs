use serde::Serialize;
use std::fmt;

/// ========== SESSION STATE ==========

/// Состояние сессии в реестре
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Зарегистрирована, идёт обмен описаниями
    Negotiating,
    /// Answer зафиксирован и отдан клиенту
    Negotiated,
    /// Транспорт сообщил о соединении
    Connected,
    /// Терминальное состояние, ресурсы освобождаются
    Closed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Negotiating => "negotiating",
            SessionState::Negotiated => "negotiated",
            SessionState::Connected => "connected",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// ========== TRANSPORT STATE ==========

/// Состояние транспорта, как его сообщает движок
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// Closed и Failed означают, что сессию пора разбирать
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed)
    }
}
