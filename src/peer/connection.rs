use crate::capture::{CaptureTrack, MediaStream};
use crate::error::{ConfigError, TransportError};
use crate::logger::dump_selected_pair;
use crate::peer::state::ConnectionState;
use crate::peer::transport::{CandidateHandler, StateHandler, TransportFactory, TransportSession};
use crate::peer::types::{IceCandidate, SdpKind, ServerConfig, SessionDescription};
use crate::utils::add_ice_url_scheme;
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

/// Фабрика peer connection на webrtc-rs
pub struct RtcTransportFactory {
    ice_servers: Vec<RTCIceServer>,
}

impl RtcTransportFactory {
    pub fn new(servers: &[ServerConfig]) -> Self {
        let ice_servers = if servers.is_empty() {
            // Используем дефолтные серверы
            vec![RTCIceServer {
                urls: vec![DEFAULT_STUN_URL.into()],
                ..Default::default()
            }]
        } else {
            get_user_ice_servers(servers)
        };
        Self { ice_servers }
    }

    /// Новый peer connection со стандартными кодеками и интерцепторами
    pub async fn new_session(&self) -> Result<RtcTransportSession, TransportError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let pc = Arc::new(api.new_peer_connection(rtc_config(self.ice_servers.clone())).await?);

        // Добавляем обработчик ICE gathering state для отладки
        pc.on_ice_gathering_state_change(Box::new(move |state| {
            debug!("ICE gathering state changed to: {:?}", state);
            Box::pin(async {})
        }));

        Ok(RtcTransportSession { pc })
    }
}

#[async_trait]
impl TransportFactory for RtcTransportFactory {
    async fn create_session(
        &self,
        streams: &[&MediaStream],
    ) -> Result<Arc<dyn TransportSession>, TransportError> {
        let session = self.new_session().await?;
        let stream_ids: Vec<&str> = streams.iter().map(|s| s.id()).collect();
        info!(streams = ?stream_ids, "Peer connection created");
        Ok(Arc::new(session))
    }
}

/// Создает конфигурацию для peer connection
fn rtc_config(ice_servers: Vec<RTCIceServer>) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers,
        ice_candidate_pool_size: 10,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

/// Преобразует конфигурацию серверов в RTCIceServer
pub fn get_user_ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
            ..Default::default()
        })
        .collect()
}

/// Валидация ICE серверов: пустой URL запрещён, TURN требует логин и пароль
pub fn validate_ice_servers(servers: &[ServerConfig]) -> Result<(), ConfigError> {
    for server in servers {
        if server.url.is_empty() {
            return Err(ConfigError::IceServer {
                id: server.id.clone(),
                reason: "server URL cannot be empty".into(),
            });
        }

        if server.r#type == "turn" && (server.username.is_none() || server.credential.is_none()) {
            return Err(ConfigError::IceServer {
                id: server.id.clone(),
                reason: "TURN servers require username and credential".into(),
            });
        }
    }
    Ok(())
}

/// Peer connection webrtc-rs за интерфейсом TransportSession
pub struct RtcTransportSession {
    pc: Arc<RTCPeerConnection>,
}

impl RtcTransportSession {
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.pc
    }
}

#[async_trait]
impl TransportSession for RtcTransportSession {
    fn on_candidate(&self, handler: CandidateHandler) {
        self.pc
            .on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
                match cand {
                    Some(c) => match c.to_json() {
                        Ok(init) => handler(Some(init.into())),
                        Err(e) => warn!("Failed to serialize local candidate: {e}"),
                    },
                    // cand == None означает конец сбора
                    None => handler(None),
                }
                Box::pin(async {})
            }));
    }

    fn on_connection_state_change(&self, handler: StateHandler) {
        let pc_state: Weak<RTCPeerConnection> = Arc::downgrade(&self.pc);
        self.pc
            .on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
                debug!("Peer connection state changed to: {:?}", st);
                let state = match st {
                    RTCPeerConnectionState::New | RTCPeerConnectionState::Unspecified => {
                        ConnectionState::New
                    }
                    RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
                    RTCPeerConnectionState::Connected => ConnectionState::Connected,
                    RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
                    RTCPeerConnectionState::Failed => ConnectionState::Failed,
                    RTCPeerConnectionState::Closed => ConnectionState::Closed,
                };

                if matches!(state, ConnectionState::Connected | ConnectionState::Failed) {
                    if let Some(pc) = pc_state.upgrade() {
                        let moment = if state == ConnectionState::Connected {
                            "CONNECTED"
                        } else {
                            "BEFORE-FAIL"
                        };
                        tokio::spawn(async move {
                            dump_selected_pair(&pc, moment).await;
                        });
                    }
                }

                handler(state);
                Box::pin(async {})
            }));
    }

    async fn add_track(&self, track: &CaptureTrack) -> Result<(), TransportError> {
        let sender = self.pc.add_track(track.local()).await?;

        // RTCP нужно вычитывать, иначе не работают NACK и PLI
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while let Ok((_, _)) = sender.read(&mut rtcp_buf).await {}
        });
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), TransportError> {
        self.pc.set_remote_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        let answer = self.pc.create_answer(None).await?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), TransportError> {
        self.pc.set_local_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.pc.local_description().await.map(|d| SessionDescription {
            kind: if d.sdp_type == RTCSdpType::Offer {
                SdpKind::Offer
            } else {
                SdpKind::Answer
            },
            sdp: d.sdp,
        })
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        self.pc
            .add_ice_candidate(candidate.into())
            .await
            .map_err(|e| TransportError::Rejected(e.to_string()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.pc.close().await?;
        Ok(())
    }
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription, TransportError> {
    let rtc = match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp)?,
    };
    Ok(rtc)
}

impl From<RTCIceCandidateInit> for IceCandidate {
    fn from(init: RTCIceCandidateInit) -> Self {
        Self {
            candidate: init.candidate,
            sdp_mid: init.sdp_mid,
            sdp_mline_index: init.sdp_mline_index,
            username_fragment: init.username_fragment,
        }
    }
}

impl From<IceCandidate> for RTCIceCandidateInit {
    fn from(c: IceCandidate) -> Self {
        Self {
            candidate: c.candidate,
            sdp_mid: c.sdp_mid,
            sdp_mline_index: c.sdp_mline_index,
            username_fragment: c.username_fragment,
        }
    }
}
