//! Wire message definitions
//!
//! Three buses share these types:
//! - the signaling socket (`ClientMsg` / `ServerMsg`)
//! - the post-handshake peer data channel (`LobbyMsg`)
//! - the same-device in-game broadcast channel (`IngameMsg`)

use serde::{Deserialize, Serialize};

/// Messages sent from a client to the signaling relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    /// Open a new room and become its host
    CreateRoom {
        #[serde(default)]
        name: String,
        /// Requested code; the relay generates one when absent or blank
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_code: Option<String>,
    },

    /// Join an existing room
    JoinRoom {
        #[serde(default)]
        name: String,
        room_code: String,
    },

    /// Forward a handshake payload to another peer in the room
    Signal {
        room_code: String,
        to: String,
        data: SignalData,
    },
}

/// Messages sent from the signaling relay to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    /// Room opened, sent to the host only
    RoomCreated {
        room_code: String,
        peer_id: String,
        host_id: String,
        peers: Vec<PeerInfo>,
    },

    /// Room joined, sent to the joiner only
    RoomJoined {
        room_code: String,
        peer_id: String,
        host_id: String,
        peers: Vec<PeerInfo>,
    },

    /// Somebody else joined the room
    PeerJoined { peer: PeerInfo },

    /// Somebody left the room
    PeerLeft { peer_id: String },

    /// Handshake payload relayed from another peer
    Signal { from: String, data: SignalData },

    /// Request rejected or room terminated
    Error { message: String },
}

impl ServerMsg {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Room member as listed by the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub peer_id: String,
    pub name: String,
}

/// Relay envelope body: exactly one of a session description or an ICE candidate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ice: Option<IceCandidate>,
}

impl SignalData {
    pub fn sdp(description: SessionDescription) -> Self {
        Self {
            sdp: Some(description),
            ice: None,
        }
    }

    pub fn ice(candidate: IceCandidate) -> Self {
        Self {
            sdp: None,
            ice: Some(candidate),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// WebRTC session description (`RTCSessionDescriptionInit`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

/// WebRTC ICE candidate (`RTCIceCandidateInit`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        default,
        rename = "sdpMLineIndex",
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_m_line_index: Option<u16>,
}

/// Messages exchanged over the peer data channel before the match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum LobbyMsg {
    /// One peer's own lobby state
    LobbyState(LobbyPlayer),
    /// Host state plus every peer state, assembled by the host
    LobbySnapshot(LobbySnapshot),
    /// Host starts the match on the given stage
    StartGame { stage: String },
    /// Liveness probe
    Ping { t: u64, from: String },
}

/// `ping` as browsers send it, with `t` and `from` beside `type`
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum FlatLobbyMsg {
    Ping {
        t: u64,
        #[serde(default)]
        from: String,
    },
}

impl LobbyMsg {
    /// Parse data-channel text, also taking the flat `ping` shape
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<LobbyMsg>(raw).or_else(|err| {
            match serde_json::from_str::<FlatLobbyMsg>(raw) {
                Ok(FlatLobbyMsg::Ping { t, from }) => Ok(LobbyMsg::Ping { t, from }),
                Err(_) => Err(err),
            }
        })
    }
}

/// A player's lobby selections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LobbyPlayer {
    pub id: String,
    pub name: String,
    pub ready: bool,
    pub is_host: bool,
    pub role: String,
    pub weapon: String,
    pub gadget: String,
    pub mission: String,
    pub equip: Vec<String>,
}

impl Default for LobbyPlayer {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: "Player".to_string(),
            ready: false,
            is_host: false,
            role: "Assault".to_string(),
            weapon: "rifle".to_string(),
            gadget: "turret".to_string(),
            mission: crate::game::stage::DEFAULT_STAGE_KEY.to_string(),
            equip: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbySnapshot {
    pub host: LobbyPlayer,
    #[serde(default)]
    pub peers: Vec<LobbyPlayer>,
}

/// Messages on the same-device in-game broadcast channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum IngameMsg {
    /// A game page finished loading
    IngameReady { id: String },
    /// One client's own transform
    LocalPos(PeerPosition),
    /// Every known client's transform
    RemotePositions(Vec<PeerPosition>),
}

/// Transform of one client as carried on the broadcast channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerPosition {
    #[serde(default)]
    pub id: String,
    pub x: f32,
    pub y: f32,
    /// Collision radius; zero or missing means "same as the local player"
    #[serde(default)]
    pub r: f32,
}
