//! Client side of the signaling exchange
//!
//! A synchronous state machine: feed it relay messages and transport events,
//! get back the messages to send. The WebRTC stack itself sits behind
//! [`PeerConnector`].

use std::collections::VecDeque;
use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ws::protocol::{
    ClientMsg, IceCandidate, PeerInfo, SdpKind, ServerMsg, SessionDescription, SignalData,
};

/// Status lines kept for display
const STATUS_HISTORY: usize = 64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("peer connection not ready")]
    NotReady,
    #[error("session description rejected: {0}")]
    Sdp(String),
    #[error("ICE candidate rejected: {0}")]
    Ice(String),
    #[error("peer connection failed")]
    Failed,
    #[error("peer connection closed")]
    Closed,
}

/// Peer-connection lifecycle as reported by the WebRTC stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// The peer-connection stack driven by the handshake
pub trait PeerConnector {
    /// Host: start a connection to a new joiner and return the local offer
    fn create_offer(&mut self, peer_id: &str) -> Result<SessionDescription, TransportError>;
    /// Joiner: apply the host's offer and return the local answer
    fn accept_offer(
        &mut self,
        from: &str,
        offer: SessionDescription,
    ) -> Result<SessionDescription, TransportError>;
    /// Host: apply a joiner's answer
    fn apply_answer(&mut self, from: &str, answer: SessionDescription) -> Result<(), TransportError>;
    fn add_ice_candidate(&mut self, from: &str, candidate: IceCandidate) -> Result<(), TransportError>;
    /// Release the peer connection and data channel for `peer_id`
    fn close(&mut self, peer_id: &str);
}

/// Room membership as reported by the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub room_code: String,
    pub peer_id: String,
    pub host_id: String,
    pub peers: Vec<PeerInfo>,
}

impl RoomInfo {
    pub fn is_host(&self) -> bool {
        self.peer_id == self.host_id
    }
}

/// One peer connection opened through the connector
#[derive(Debug, Clone)]
struct PeerLink {
    peer_id: String,
    state: ConnectionState,
    channel_open: bool,
}

pub struct SignalingClient<C> {
    connector: C,
    room: Option<RoomInfo>,
    /// Peer the host is currently handshaking with
    target: Option<String>,
    links: Vec<PeerLink>,
    status: VecDeque<String>,
}

impl<C: PeerConnector> SignalingClient<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            room: None,
            target: None,
            links: Vec::new(),
            status: VecDeque::with_capacity(STATUS_HISTORY),
        }
    }

    pub fn room(&self) -> Option<&RoomInfo> {
        self.room.as_ref()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn connector_mut(&mut self) -> &mut C {
        &mut self.connector
    }

    /// Status lines, oldest first
    pub fn status(&self) -> impl Iterator<Item = &str> {
        self.status.iter().map(String::as_str)
    }

    /// Start over as host; any previous connections are released
    pub fn create_room(&mut self, name: &str, room_code: Option<&str>) -> ClientMsg {
        self.teardown();
        ClientMsg::CreateRoom {
            name: name.to_string(),
            room_code: room_code
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        }
    }

    /// Start over as joiner; any previous connections are released
    pub fn join_room(&mut self, name: &str, room_code: &str) -> ClientMsg {
        self.teardown();
        ClientMsg::JoinRoom {
            name: name.to_string(),
            room_code: room_code.trim().to_string(),
        }
    }

    /// Close every peer connection and forget the room
    pub fn teardown(&mut self) {
        for link in self.links.drain(..) {
            debug!(peer_id = %link.peer_id, "Closing peer connection");
            self.connector.close(&link.peer_id);
        }
        self.room = None;
        self.target = None;
    }

    pub fn connection_state(&self, peer_id: &str) -> Option<ConnectionState> {
        self.link(peer_id).map(|l| l.state)
    }

    pub fn is_connected(&self, peer_id: &str) -> bool {
        self.connection_state(peer_id) == Some(ConnectionState::Connected)
    }

    /// Whether data may be sent to `peer_id` right now
    pub fn usable(&self, peer_id: &str) -> Result<(), TransportError> {
        match self.link(peer_id) {
            None => Err(TransportError::NotReady),
            Some(link) => match link.state {
                ConnectionState::Failed => Err(TransportError::Failed),
                ConnectionState::Closed => Err(TransportError::Closed),
                ConnectionState::Connected if link.channel_open => Ok(()),
                _ => Err(TransportError::NotReady),
            },
        }
    }

    /// Feed a connection-state change from the WebRTC stack. A failed
    /// connection is reported and left unusable; there is no retry.
    pub fn on_connection_state(&mut self, peer_id: &str, state: ConnectionState) {
        let Some(link) = self.links.iter_mut().find(|l| l.peer_id == peer_id) else {
            debug!(peer_id = %peer_id, %state, "State change for unknown peer");
            return;
        };
        link.state = state;
        if matches!(state, ConnectionState::Failed | ConnectionState::Closed) {
            link.channel_open = false;
        }

        self.push_status(format!("RTC state: {state}"));
        match state {
            ConnectionState::Connected => info!(peer_id = %peer_id, "Peer connected"),
            ConnectionState::Failed => {
                warn!(peer_id = %peer_id, "Peer connection failed");
                self.push_status(format!("Connection to {peer_id} failed"));
            }
            _ => {}
        }
    }

    pub fn on_channel_open(&mut self, peer_id: &str) {
        let Some(link) = self.links.iter_mut().find(|l| l.peer_id == peer_id) else {
            return;
        };
        link.channel_open = true;
        self.push_status("Data channel open".to_string());
    }

    pub fn on_channel_close(&mut self, peer_id: &str) {
        let Some(link) = self.links.iter_mut().find(|l| l.peer_id == peer_id) else {
            return;
        };
        link.channel_open = false;
        self.push_status("Data channel closed".to_string());
    }

    /// Parse relay text; anything unparseable is ignored
    pub fn handle_raw(&mut self, raw: &str) -> Vec<ClientMsg> {
        match serde_json::from_str::<ServerMsg>(raw) {
            Ok(msg) => self.handle(msg),
            Err(e) => {
                warn!(error = %e, "Ignoring malformed relay message");
                Vec::new()
            }
        }
    }

    /// Apply one relay message; returns what to send back
    pub fn handle(&mut self, msg: ServerMsg) -> Vec<ClientMsg> {
        match msg {
            ServerMsg::Error { message } => {
                self.push_status(format!("Server: {message}"));
                Vec::new()
            }
            ServerMsg::RoomCreated {
                room_code,
                peer_id,
                host_id,
                peers,
            }
            | ServerMsg::RoomJoined {
                room_code,
                peer_id,
                host_id,
                peers,
            } => {
                self.teardown();
                let info = RoomInfo {
                    room_code,
                    peer_id,
                    host_id,
                    peers,
                };
                let verb = if info.is_host() { "Room created" } else { "Room joined" };
                self.push_status(format!("{verb}: {}", info.room_code));
                self.room = Some(info);
                Vec::new()
            }
            ServerMsg::PeerJoined { peer } => self.on_peer_joined(peer),
            ServerMsg::PeerLeft { peer_id } => {
                if let Some(room) = self.room.as_mut() {
                    room.peers.retain(|p| p.peer_id != peer_id);
                    if self.target.as_deref() == Some(peer_id.as_str()) {
                        self.target = None;
                    }
                    self.close_link(&peer_id);
                    self.push_status(format!("Peer left: {peer_id}"));
                }
                Vec::new()
            }
            ServerMsg::Signal { from, data } => self.on_signal(from, data),
        }
    }

    /// Wrap a locally gathered ICE candidate for the current counterpart
    pub fn local_candidate(&self, candidate: IceCandidate) -> Option<ClientMsg> {
        let room = self.room.as_ref()?;
        let to = if room.is_host() {
            self.target.clone()?
        } else {
            room.host_id.clone()
        };
        Some(ClientMsg::Signal {
            room_code: room.room_code.clone(),
            to,
            data: SignalData::ice(candidate),
        })
    }

    fn link(&self, peer_id: &str) -> Option<&PeerLink> {
        self.links.iter().find(|l| l.peer_id == peer_id)
    }

    /// Replace any existing connection to `peer_id` with a fresh one
    fn open_link(&mut self, peer_id: &str) {
        self.close_link(peer_id);
        self.links.push(PeerLink {
            peer_id: peer_id.to_string(),
            state: ConnectionState::New,
            channel_open: false,
        });
    }

    fn close_link(&mut self, peer_id: &str) {
        let before = self.links.len();
        self.links.retain(|l| l.peer_id != peer_id);
        if self.links.len() != before {
            self.connector.close(peer_id);
        }
    }

    fn on_peer_joined(&mut self, peer: PeerInfo) -> Vec<ClientMsg> {
        let Some(room) = self.room.as_mut() else {
            return Vec::new();
        };
        room.peers.push(peer.clone());
        if !room.is_host() {
            return Vec::new();
        }
        let room_code = room.room_code.clone();

        self.push_status(format!("Peer joined: {}", peer.name));
        self.target = Some(peer.peer_id.clone());
        self.open_link(&peer.peer_id);
        match self.connector.create_offer(&peer.peer_id) {
            Ok(offer) => {
                self.push_status("Host: offer sent".to_string());
                vec![ClientMsg::Signal {
                    room_code,
                    to: peer.peer_id,
                    data: SignalData::sdp(offer),
                }]
            }
            Err(e) => {
                self.push_status(format!("Offer failed: {e}"));
                Vec::new()
            }
        }
    }

    fn on_signal(&mut self, from: String, data: SignalData) -> Vec<ClientMsg> {
        let Some(room) = self.room.clone() else {
            return Vec::new();
        };
        let mut out = Vec::new();

        if let Some(sdp) = data.sdp {
            match (room.is_host(), sdp.kind) {
                (false, SdpKind::Offer) => {
                    self.open_link(&from);
                    match self.connector.accept_offer(&from, sdp) {
                        Ok(answer) => {
                            out.push(ClientMsg::Signal {
                                room_code: room.room_code.clone(),
                                to: room.host_id.clone(),
                                data: SignalData::sdp(answer),
                            });
                            self.push_status("Joiner: answer sent".to_string());
                        }
                        Err(e) => self.push_status(format!("Answer failed: {e}")),
                    }
                }
                (true, SdpKind::Answer) => match self.connector.apply_answer(&from, sdp) {
                    Ok(()) => self.push_status("Host: answer applied".to_string()),
                    Err(e) => self.push_status(format!("Answer rejected: {e}")),
                },
                (is_host, kind) => {
                    warn!(from = %from, is_host, ?kind, "Unexpected session description");
                }
            }
        }

        if let Some(candidate) = data.ice {
            if let Err(e) = self.connector.add_ice_candidate(&from, candidate) {
                self.push_status(format!("ICE add failed: {e}"));
            }
        }
        out
    }

    fn push_status(&mut self, line: String) {
        info!(status = %line, "Signaling status");
        if self.status.len() == STATUS_HISTORY {
            self.status.pop_front();
        }
        self.status.push_back(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every call; optionally refuses ICE
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        reject_ice: bool,
    }

    impl PeerConnector for Recorder {
        fn create_offer(&mut self, peer_id: &str) -> Result<SessionDescription, TransportError> {
            self.calls.push(format!("offer:{peer_id}"));
            Ok(SessionDescription {
                kind: SdpKind::Offer,
                sdp: format!("offer-for-{peer_id}"),
            })
        }

        fn accept_offer(
            &mut self,
            from: &str,
            offer: SessionDescription,
        ) -> Result<SessionDescription, TransportError> {
            self.calls.push(format!("accept:{from}:{}", offer.sdp));
            Ok(SessionDescription {
                kind: SdpKind::Answer,
                sdp: "answer".into(),
            })
        }

        fn apply_answer(&mut self, from: &str, answer: SessionDescription) -> Result<(), TransportError> {
            self.calls.push(format!("answer:{from}:{}", answer.sdp));
            Ok(())
        }

        fn add_ice_candidate(&mut self, from: &str, candidate: IceCandidate) -> Result<(), TransportError> {
            if self.reject_ice {
                return Err(TransportError::Ice("bad candidate".into()));
            }
            self.calls.push(format!("ice:{from}:{}", candidate.candidate));
            Ok(())
        }

        fn close(&mut self, peer_id: &str) {
            self.calls.push(format!("close:{peer_id}"));
        }
    }

    fn candidate(text: &str) -> IceCandidate {
        IceCandidate {
            candidate: text.into(),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
        }
    }

    fn created(peer_id: &str) -> ServerMsg {
        ServerMsg::RoomCreated {
            room_code: "R".into(),
            peer_id: peer_id.into(),
            host_id: peer_id.into(),
            peers: vec![],
        }
    }

    #[test]
    fn host_offers_to_each_joiner_and_applies_answer() {
        let mut host = SignalingClient::new(Recorder::default());
        host.handle(created("h"));
        assert!(host.room().unwrap().is_host());

        let out = host.handle(ServerMsg::PeerJoined {
            peer: PeerInfo {
                peer_id: "j".into(),
                name: "Jo".into(),
            },
        });
        match out.as_slice() {
            [ClientMsg::Signal { to, data, .. }] => {
                assert_eq!(to, "j");
                assert_eq!(data.sdp.as_ref().unwrap().kind, SdpKind::Offer);
            }
            other => panic!("unexpected output: {other:?}"),
        }

        host.handle(ServerMsg::Signal {
            from: "j".into(),
            data: SignalData::sdp(SessionDescription {
                kind: SdpKind::Answer,
                sdp: "ans".into(),
            }),
        });
        assert_eq!(host.connector().calls, vec!["offer:j", "answer:j:ans"]);

        let ice = host.local_candidate(candidate("c1")).unwrap();
        assert!(matches!(ice, ClientMsg::Signal { ref to, .. } if to == "j"));
    }

    #[test]
    fn joiner_answers_offer_to_host() {
        let mut joiner = SignalingClient::new(Recorder::default());
        assert!(joiner.local_candidate(candidate("early")).is_none());
        joiner.handle(ServerMsg::RoomJoined {
            room_code: "R".into(),
            peer_id: "j".into(),
            host_id: "h".into(),
            peers: vec![],
        });

        let out = joiner.handle(ServerMsg::Signal {
            from: "h".into(),
            data: SignalData::sdp(SessionDescription {
                kind: SdpKind::Offer,
                sdp: "o".into(),
            }),
        });
        match out.as_slice() {
            [ClientMsg::Signal { to, data, .. }] => {
                assert_eq!(to, "h");
                assert_eq!(data.sdp.as_ref().unwrap().kind, SdpKind::Answer);
            }
            other => panic!("unexpected output: {other:?}"),
        }

        joiner.handle(ServerMsg::Signal {
            from: "h".into(),
            data: SignalData::ice(candidate("c9")),
        });
        assert_eq!(joiner.connector().calls, vec!["accept:h:o", "ice:h:c9"]);
        assert!(matches!(
            joiner.local_candidate(candidate("mine")),
            Some(ClientMsg::Signal { ref to, .. }) if to == "h"
        ));
    }

    #[test]
    fn errors_become_status_lines_without_retry() {
        let mut client = SignalingClient::new(Recorder {
            reject_ice: true,
            ..Recorder::default()
        });
        client.handle(created("h"));
        client.handle(ServerMsg::error("room code already exists"));
        client.handle(ServerMsg::Signal {
            from: "j".into(),
            data: SignalData::ice(candidate("c")),
        });
        assert!(client.handle_raw("not json").is_empty());

        let status: Vec<&str> = client.status().collect();
        assert!(status.iter().any(|s| *s == "Server: room code already exists"));
        assert!(status.iter().any(|s| s.starts_with("ICE add failed")));
        assert!(client.connector().calls.is_empty());
    }

    #[test]
    fn signals_before_room_are_ignored() {
        let mut client = SignalingClient::new(Recorder::default());
        let out = client.handle(ServerMsg::Signal {
            from: "h".into(),
            data: SignalData::sdp(SessionDescription {
                kind: SdpKind::Offer,
                sdp: "o".into(),
            }),
        });
        assert!(out.is_empty());
        assert!(client.connector().calls.is_empty());
        assert_eq!(
            client.create_room("Host", Some("  ")),
            ClientMsg::CreateRoom {
                name: "Host".into(),
                room_code: None,
            }
        );
    }

    fn joined(peer_id: &str) -> ServerMsg {
        ServerMsg::PeerJoined {
            peer: PeerInfo {
                peer_id: peer_id.into(),
                name: "Jo".into(),
            },
        }
    }

    #[test]
    fn connected_transport_becomes_usable_once_channel_opens() {
        let mut host = SignalingClient::new(Recorder::default());
        host.handle(created("h"));
        assert_eq!(host.usable("j"), Err(TransportError::NotReady));

        host.handle(joined("j"));
        assert_eq!(host.connection_state("j"), Some(ConnectionState::New));

        host.on_connection_state("j", ConnectionState::Connecting);
        host.on_connection_state("j", ConnectionState::Connected);
        assert!(host.is_connected("j"));
        assert_eq!(host.usable("j"), Err(TransportError::NotReady));

        host.on_channel_open("j");
        assert_eq!(host.usable("j"), Ok(()));
        assert!(host.status().any(|s| s == "RTC state: connected"));

        host.on_channel_close("j");
        assert_eq!(host.usable("j"), Err(TransportError::NotReady));
    }

    #[test]
    fn failed_connection_is_reported_without_retry() {
        let mut host = SignalingClient::new(Recorder::default());
        host.handle(created("h"));
        host.handle(joined("j"));
        host.on_connection_state("j", ConnectionState::Connecting);
        host.on_channel_open("j");
        host.on_connection_state("j", ConnectionState::Failed);

        let status: Vec<&str> = host.status().collect();
        assert!(status.contains(&"RTC state: failed"));
        assert!(status.contains(&"Connection to j failed"));
        assert!(!host.is_connected("j"));
        assert_eq!(host.usable("j"), Err(TransportError::Failed));
        // no second offer and no close: the failed link is left as is
        assert_eq!(host.connector().calls, vec!["offer:j"]);
    }

    #[test]
    fn departures_and_restarts_release_connections() {
        let mut host = SignalingClient::new(Recorder::default());
        host.handle(created("h"));
        host.handle(joined("j"));
        host.handle(joined("k"));
        host.handle(ServerMsg::PeerLeft {
            peer_id: "j".into(),
        });
        assert_eq!(host.connection_state("j"), None);
        assert_eq!(host.connection_state("k"), Some(ConnectionState::New));

        host.create_room("Host", None);
        assert!(host.room().is_none());
        assert_eq!(host.connection_state("k"), None);
        assert_eq!(
            host.connector().calls,
            vec!["offer:j", "offer:k", "close:j", "close:k"]
        );

        let mut joiner = SignalingClient::new(Recorder::default());
        joiner.handle(ServerMsg::RoomJoined {
            room_code: "R".into(),
            peer_id: "j".into(),
            host_id: "h".into(),
            peers: vec![],
        });
        let offer = || ServerMsg::Signal {
            from: "h".into(),
            data: SignalData::sdp(SessionDescription {
                kind: SdpKind::Offer,
                sdp: "o".into(),
            }),
        };
        joiner.handle(offer());
        // a renegotiated offer replaces the old connection
        joiner.handle(offer());
        joiner.handle(ServerMsg::PeerLeft {
            peer_id: "h".into(),
        });
        joiner.handle(ServerMsg::error("Host left, room closed"));
        assert_eq!(
            joiner.connector().calls,
            vec!["accept:h:o", "close:h", "accept:h:o", "close:h"]
        );
        assert_eq!(joiner.usable("h"), Err(TransportError::NotReady));
    }

    #[test]
    fn status_history_keeps_newest_lines() {
        let mut client = SignalingClient::new(Recorder::default());
        for i in 0..(STATUS_HISTORY + 5) {
            client.handle(ServerMsg::error(format!("e{i}")));
        }
        let status: Vec<&str> = client.status().collect();
        assert_eq!(status.len(), STATUS_HISTORY);
        assert_eq!(status[0], "Server: e5");
        assert_eq!(status[STATUS_HISTORY - 1], format!("Server: e{}", STATUS_HISTORY + 4));
    }
}
