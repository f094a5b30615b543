pub mod connection;
pub mod ice;
pub mod sdp;
pub mod state;
pub mod transport;
pub mod types;

pub use state::{ConnectionState, SessionState};
pub use transport::{CandidateHandler, StateHandler, TransportFactory, TransportSession};
pub use types::{IceCandidate, SdpKind, ServerConfig, SessionDescription};
