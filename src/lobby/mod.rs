//! Pre-match lobby carried over the peer data channel
//!
//! The host is the source of truth: joiners push their own `lobby_state`, the
//! host folds it into its table and answers every change with a full
//! `lobby_snapshot`. Only the host may start the match.

use thiserror::Error;
use tracing::{debug, info};

use crate::game::stage::DEFAULT_STAGE_KEY;
use crate::ws::protocol::{LobbyMsg, LobbyPlayer, LobbySnapshot};

/// Which end of the star topology this client is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyRole {
    Host,
    Join,
}

#[derive(Debug, Error)]
pub enum LobbyError {
    #[error("only the host can start the match")]
    NotHost,
    #[error("not every player is ready")]
    NotAllReady,
    #[error("malformed lobby message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Side effect requested by the lobby
#[derive(Debug, Clone, PartialEq)]
pub enum LobbyAction {
    /// Send on the data channel: to every peer for the host, to the host for a joiner
    Broadcast(LobbyMsg),
    /// Joiner took over the host's mission selection
    MissionAdopted(String),
    /// Leave the lobby for the game on this stage
    EnterGame { stage: String },
}

pub struct Lobby {
    role: LobbyRole,
    local: LobbyPlayer,
    /// Host only: joiner states keyed by id, in arrival order
    peer_states: Vec<LobbyPlayer>,
    /// Joiner only: last state heard from the host
    remote_host: Option<LobbyPlayer>,
    /// Joiner only: peers listed in the last snapshot
    remote_peers: Vec<LobbyPlayer>,
}

impl Lobby {
    pub fn new(role: LobbyRole, mut local: LobbyPlayer) -> Self {
        local.is_host = role == LobbyRole::Host;
        if local.name.trim().is_empty() {
            local.name = LobbyPlayer::default().name;
        }
        Self {
            role,
            local,
            peer_states: Vec::new(),
            remote_host: None,
            remote_peers: Vec::new(),
        }
    }

    pub fn role(&self) -> LobbyRole {
        self.role
    }

    pub fn is_host(&self) -> bool {
        self.role == LobbyRole::Host
    }

    pub fn local(&self) -> &LobbyPlayer {
        &self.local
    }

    pub fn remote_host(&self) -> Option<&LobbyPlayer> {
        self.remote_host.as_ref()
    }

    /// Message announcing the local state after a change
    pub fn state_message(&self) -> LobbyMsg {
        match self.role {
            LobbyRole::Host => LobbyMsg::LobbySnapshot(self.snapshot()),
            LobbyRole::Join => LobbyMsg::LobbyState(self.local.clone()),
        }
    }

    pub fn set_ready(&mut self, ready: bool) -> LobbyMsg {
        self.local.ready = ready;
        info!(ready, "Lobby ready state changed");
        self.state_message()
    }

    /// Change the mission; joiners follow the host's pick on the next snapshot
    pub fn set_mission(&mut self, mission: impl Into<String>) -> LobbyMsg {
        self.local.mission = mission.into();
        self.state_message()
    }

    /// Apply arbitrary local edits (name, role, loadout) and announce them
    pub fn update_local(&mut self, edit: impl FnOnce(&mut LobbyPlayer)) -> LobbyMsg {
        edit(&mut self.local);
        self.local.is_host = self.is_host();
        self.state_message()
    }

    /// Host state followed by every known joiner
    pub fn snapshot(&self) -> LobbySnapshot {
        LobbySnapshot {
            host: self.local.clone(),
            peers: self.peer_states.clone(),
        }
    }

    /// Players as listed in the lobby: host first, local id never twice
    pub fn roster(&self) -> Vec<LobbyPlayer> {
        match self.role {
            LobbyRole::Host => {
                let mut players = vec![self.local.clone()];
                players.extend(
                    self.peer_states
                        .iter()
                        .filter(|p| p.id != self.local.id)
                        .cloned(),
                );
                players
            }
            LobbyRole::Join => {
                let mut players: Vec<LobbyPlayer> = self.remote_host.iter().cloned().collect();
                players.push(self.local.clone());
                players.extend(
                    self.remote_peers
                        .iter()
                        .filter(|p| p.id != self.local.id)
                        .cloned(),
                );
                players
            }
        }
    }

    /// True when the host could start right now
    pub fn all_ready(&self) -> bool {
        if !self.is_host() {
            return false;
        }
        self.local.ready && self.peer_states.iter().all(|p| p.ready)
    }

    /// Host only: the `start_game` broadcast plus the local transition
    pub fn start(&self) -> Result<(LobbyMsg, LobbyAction), LobbyError> {
        if !self.is_host() {
            return Err(LobbyError::NotHost);
        }
        if !self.all_ready() {
            return Err(LobbyError::NotAllReady);
        }
        let stage = if self.local.mission.is_empty() {
            DEFAULT_STAGE_KEY.to_string()
        } else {
            self.local.mission.clone()
        };
        info!(stage = %stage, players = self.peer_states.len() + 1, "Starting match");
        Ok((
            LobbyMsg::StartGame {
                stage: stage.clone(),
            },
            LobbyAction::EnterGame { stage },
        ))
    }

    pub fn ping(&self, t: u64) -> LobbyMsg {
        LobbyMsg::Ping {
            t,
            from: match self.role {
                LobbyRole::Host => "host".to_string(),
                LobbyRole::Join => "join".to_string(),
            },
        }
    }

    /// Parse and handle raw data-channel text
    pub fn handle_raw(&mut self, raw: &str) -> Result<Vec<LobbyAction>, LobbyError> {
        let msg = LobbyMsg::parse(raw)?;
        Ok(self.handle(msg))
    }

    pub fn handle(&mut self, msg: LobbyMsg) -> Vec<LobbyAction> {
        match msg {
            LobbyMsg::LobbyState(state) => match self.role {
                LobbyRole::Host => {
                    if !state.id.is_empty() {
                        match self.peer_states.iter_mut().find(|p| p.id == state.id) {
                            Some(slot) => *slot = state,
                            None => {
                                info!(peer_id = %state.id, name = %state.name, "Player entered lobby");
                                self.peer_states.push(state);
                            }
                        }
                    }
                    vec![LobbyAction::Broadcast(self.state_message())]
                }
                LobbyRole::Join => {
                    self.remote_host = Some(state);
                    self.adopt_host_mission().into_iter().collect()
                }
            },
            LobbyMsg::LobbySnapshot(snapshot) => {
                if self.is_host() {
                    return Vec::new();
                }
                self.remote_host = Some(snapshot.host);
                self.remote_peers = snapshot.peers;
                self.adopt_host_mission().into_iter().collect()
            }
            LobbyMsg::StartGame { stage } => {
                let stage = if stage.is_empty() {
                    DEFAULT_STAGE_KEY.to_string()
                } else {
                    stage
                };
                info!(stage = %stage, "Match start received");
                vec![LobbyAction::EnterGame { stage }]
            }
            LobbyMsg::Ping { t, from } => {
                debug!(t, from = %from, "Lobby ping");
                Vec::new()
            }
        }
    }

    /// Drop a joiner whose channel closed
    pub fn remove_peer(&mut self, id: &str) -> Option<LobbyMsg> {
        let before = self.peer_states.len();
        self.peer_states.retain(|p| p.id != id);
        (self.peer_states.len() != before).then(|| self.state_message())
    }

    fn adopt_host_mission(&mut self) -> Option<LobbyAction> {
        let mission = self.remote_host.as_ref()?.mission.clone();
        if mission.is_empty() || mission == self.local.mission {
            return None;
        }
        info!(mission = %mission, "Adopted host mission");
        self.local.mission = mission.clone();
        Some(LobbyAction::MissionAdopted(mission))
    }
}
