//! Peer state synchronization over the local broadcast channel
//!
//! Each client periodically publishes its own transform as `local_pos`. A
//! `PositionRelay` gathers those and answers with the full `remote_positions`
//! list, which every client applies by wholesale replacement. There is no
//! ordering or interpolation: the latest list wins.

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::ws::protocol::{IngameMsg, PeerPosition};

use super::Player;

/// Minimum time between two `local_pos` sends (seconds)
pub const SEND_INTERVAL: f64 = 0.06;
/// Inbound messages buffered between two ticks
pub const INBOX_CAPACITY: usize = 256;

/// Last known transform of another client
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePlayer {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub r: f32,
}

impl RemotePlayer {
    /// Point-in-circle test used by ray marching
    pub fn contains(&self, x: f32, y: f32) -> bool {
        let dx = x - self.x;
        let dy = y - self.y;
        dx * dx + dy * dy <= self.r * self.r
    }

    fn from_position(pos: PeerPosition, fallback_r: f32) -> Self {
        Self {
            r: if pos.r > 0.0 { pos.r } else { fallback_r },
            id: pos.id,
            x: pos.x,
            y: pos.y,
        }
    }
}

/// Per-session synchronizer: send throttle plus the current remote set
pub struct PeerSync {
    local_id: String,
    interval: f64,
    last_sent: Option<f64>,
    remotes: Vec<RemotePlayer>,
}

impl PeerSync {
    pub fn new(local_id: impl Into<String>) -> Self {
        Self {
            local_id: local_id.into(),
            interval: SEND_INTERVAL,
            last_sent: None,
            remotes: Vec::new(),
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn remotes(&self) -> &[RemotePlayer] {
        &self.remotes
    }

    /// Announcement emitted once when the session starts
    pub fn ready_message(&self) -> IngameMsg {
        IngameMsg::IngameReady {
            id: self.local_id.clone(),
        }
    }

    /// `local_pos` for this frame, or `None` while throttled
    pub fn maybe_send(&mut self, now: f64, player: &Player) -> Option<IngameMsg> {
        if let Some(last) = self.last_sent {
            if now - last < self.interval {
                return None;
            }
        }
        self.last_sent = Some(now);
        Some(IngameMsg::LocalPos(PeerPosition {
            id: self.local_id.clone(),
            x: player.x,
            y: player.y,
            r: player.radius,
        }))
    }

    /// Apply one inbound message. Returns true when the remote set changed.
    ///
    /// `remote_positions` replaces the whole set, minus our own entry and
    /// entries without an id. Other message kinds are ignored here.
    pub fn apply(&mut self, msg: IngameMsg, local_radius: f32) -> bool {
        match msg {
            IngameMsg::RemotePositions(list) => {
                let local_id = &self.local_id;
                self.remotes = list
                    .into_iter()
                    .filter(|p| !p.id.is_empty() && p.id != *local_id)
                    .map(|p| RemotePlayer::from_position(p, local_radius))
                    .collect();
                true
            }
            IngameMsg::IngameReady { id } => {
                debug!(peer_id = %id, "Peer reported ready");
                false
            }
            IngameMsg::LocalPos(_) => false,
        }
    }
}

/// Producer half of the inbound queue; cloned into network callbacks
#[derive(Clone)]
pub struct InboxSender {
    tx: mpsc::Sender<IngameMsg>,
}

impl InboxSender {
    /// Enqueue without blocking. A full or closed queue drops the message.
    pub fn push(&self, msg: IngameMsg) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Peer inbox full, dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Peer inbox closed, dropping message");
                false
            }
        }
    }

    /// Parse raw channel text and enqueue it; malformed text is dropped
    pub fn push_raw(&self, raw: &str) -> bool {
        match serde_json::from_str::<IngameMsg>(raw) {
            Ok(msg) => self.push(msg),
            Err(e) => {
                debug!(error = %e, "Dropping malformed peer message");
                false
            }
        }
    }
}

/// Consumer half of the inbound queue, owned by the session and drained once
/// at the start of every tick
pub struct PeerInbox {
    rx: mpsc::Receiver<IngameMsg>,
}

impl PeerInbox {
    pub fn channel(capacity: usize) -> (InboxSender, PeerInbox) {
        let (tx, rx) = mpsc::channel(capacity);
        (InboxSender { tx }, PeerInbox { rx })
    }

    /// Everything queued so far, in arrival order
    pub fn drain(&mut self) -> Vec<IngameMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }
}

/// Hub side of the local broadcast channel
#[derive(Debug, Default)]
pub struct PositionRelay {
    ready: Vec<String>,
    peers: Vec<PeerPosition>,
}

impl PositionRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clients with a known position
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn is_ready(&self, id: &str) -> bool {
        self.ready.iter().any(|r| r == id)
    }

    /// Record a message from a client. Returns the `remote_positions`
    /// broadcast to send back, if there is one.
    ///
    /// A newly ready client gets the current list right away; it only
    /// appears in the list itself once it publishes a position.
    pub fn handle(&mut self, msg: IngameMsg) -> Option<IngameMsg> {
        match msg {
            IngameMsg::IngameReady { id } => {
                if id.is_empty() || self.is_ready(&id) {
                    return None;
                }
                debug!(peer_id = %id, "Relay peer ready");
                self.ready.push(id);
                Some(self.broadcast())
            }
            IngameMsg::LocalPos(pos) => {
                if pos.id.is_empty() {
                    return None;
                }
                if !self.is_ready(&pos.id) {
                    self.ready.push(pos.id.clone());
                }
                match self.peers.iter_mut().find(|p| p.id == pos.id) {
                    Some(slot) => *slot = pos,
                    None => self.peers.push(pos),
                }
                Some(self.broadcast())
            }
            IngameMsg::RemotePositions(_) => None,
        }
    }

    /// Drop a client that left the channel
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.ready.len();
        self.ready.retain(|r| r != id);
        self.peers.retain(|p| p.id != id);
        self.ready.len() != before
    }

    pub fn broadcast(&self) -> IngameMsg {
        IngameMsg::RemotePositions(self.peers.clone())
    }
}
