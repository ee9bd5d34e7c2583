//! Room registry for the signaling relay
//!
//! Rooms are keyed by code. Each member has an outbound channel drained by its
//! socket writer task, so the registry never awaits while holding a lock.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::ws::protocol::{PeerInfo, ServerMsg, SignalData};

/// Members per room, host included
pub const ROOM_CAPACITY: usize = 5;
pub const MAX_NAME_CHARS: usize = 16;
pub const MAX_CODE_CHARS: usize = 16;
pub const ROOM_CODE_PREFIX: &str = "IAO";
const PEER_ID_LEN: usize = 8;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Outbound queue of one socket
pub type PeerTx = mpsc::Sender<ServerMsg>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignalError {
    #[error("room code already exists")]
    RoomExists,
    #[error("room does not exist")]
    RoomNotFound,
    #[error("room is full (max {ROOM_CAPACITY} players)")]
    RoomFull,
    #[error("not a member of this room")]
    NotMember,
    #[error("target peer not found")]
    PeerNotFound,
    #[error("invalid message: {0}")]
    BadMessage(String),
    #[error("rate limit exceeded")]
    RateLimited,
}

/// Where a socket sits after a successful create or join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub room_code: String,
    pub peer_id: String,
}

struct Member {
    peer_id: String,
    name: String,
    tx: PeerTx,
}

struct Room {
    host_id: String,
    members: Vec<Member>,
    /// Set once the room is torn down; late joiners holding the Arc back off
    closed: bool,
}

impl Room {
    fn peer_list(&self) -> Vec<PeerInfo> {
        self.members
            .iter()
            .map(|m| PeerInfo {
                peer_id: m.peer_id.clone(),
                name: m.name.clone(),
            })
            .collect()
    }

    fn contains(&self, peer_id: &str) -> bool {
        self.members.iter().any(|m| m.peer_id == peer_id)
    }

    fn broadcast(&self, msg: &ServerMsg, except: Option<&str>) {
        for member in &self.members {
            if except == Some(member.peer_id.as_str()) {
                continue;
            }
            deliver(&member.tx, &member.peer_id, msg.clone());
        }
    }

    fn fresh_peer_id(&self) -> String {
        loop {
            let id = random_peer_id();
            if !self.contains(&id) {
                return id;
            }
        }
    }
}

fn deliver(tx: &PeerTx, peer_id: &str, msg: ServerMsg) -> bool {
    match tx.try_send(msg) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(peer_id = %peer_id, "Peer outbound queue full, dropping message");
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!(peer_id = %peer_id, "Peer outbound queue closed");
            false
        }
    }
}

/// `IAO-XXXX-XX`, uppercase base36
pub fn random_room_code() -> String {
    let mut rng = rand::thread_rng();
    let mut chunk = |n: usize| -> String {
        (0..n)
            .map(|_| BASE36[rng.gen_range(0..BASE36.len())].to_ascii_uppercase() as char)
            .collect()
    };
    let a = chunk(4);
    let b = chunk(2);
    format!("{ROOM_CODE_PREFIX}-{a}-{b}")
}

/// Eight lowercase base36 characters
pub fn random_peer_id() -> String {
    let mut rng = rand::thread_rng();
    (0..PEER_ID_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

fn display_name(name: &str, fallback: &str) -> String {
    if name.is_empty() {
        fallback.to_string()
    } else {
        name.chars().take(MAX_NAME_CHARS).collect()
    }
}

/// All open rooms
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<Mutex<Room>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn peer_count(&self) -> usize {
        // Never wait on a room lock while holding a map shard
        let rooms: Vec<_> = self.rooms.iter().map(|r| r.value().clone()).collect();
        rooms.iter().map(|room| room.lock().members.len()).sum()
    }

    /// Member list of a room, in join order
    pub fn peers(&self, room_code: &str) -> Option<Vec<PeerInfo>> {
        self.room(room_code).map(|room| room.lock().peer_list())
    }

    fn room(&self, room_code: &str) -> Option<Arc<Mutex<Room>>> {
        self.rooms.get(room_code).map(|r| r.value().clone())
    }

    /// Open a room with the caller as host; `room_created` goes out on `tx`
    pub fn create_room(
        &self,
        name: &str,
        requested_code: Option<&str>,
        tx: PeerTx,
    ) -> Result<Membership, SignalError> {
        let name = display_name(name, "Host");
        let requested: String = requested_code
            .unwrap_or_default()
            .trim()
            .chars()
            .take(MAX_CODE_CHARS)
            .collect();

        let peer_id = random_peer_id();
        let room = Arc::new(Mutex::new(Room {
            host_id: peer_id.clone(),
            members: vec![Member {
                peer_id: peer_id.clone(),
                name,
                tx,
            }],
            closed: false,
        }));

        // Joiners that find the room block on this guard until `room_created` is queued
        let guard = room.lock();
        let room_code = if requested.is_empty() {
            loop {
                let code = random_room_code();
                if let Entry::Vacant(slot) = self.rooms.entry(code.clone()) {
                    slot.insert(room.clone());
                    break code;
                }
            }
        } else {
            match self.rooms.entry(requested.clone()) {
                Entry::Occupied(_) => return Err(SignalError::RoomExists),
                Entry::Vacant(slot) => {
                    slot.insert(room.clone());
                    requested
                }
            }
        };

        info!(room_code = %room_code, peer_id = %peer_id, "Room created");
        let reply = ServerMsg::RoomCreated {
            room_code: room_code.clone(),
            peer_id: peer_id.clone(),
            host_id: peer_id.clone(),
            peers: guard.peer_list(),
        };
        if let Some(host) = guard.members.first() {
            deliver(&host.tx, &peer_id, reply);
        }
        drop(guard);
        Ok(Membership { room_code, peer_id })
    }

    /// Add the caller to a room. The joiner gets `room_joined` on `tx` before
    /// anyone else can address it; members already inside get `peer_joined`.
    pub fn join_room(
        &self,
        name: &str,
        room_code: &str,
        tx: PeerTx,
    ) -> Result<Membership, SignalError> {
        let room_code = room_code.trim();
        let room = self.room(room_code).ok_or(SignalError::RoomNotFound)?;
        let mut room = room.lock();
        if room.closed {
            return Err(SignalError::RoomNotFound);
        }
        if room.members.len() >= ROOM_CAPACITY {
            return Err(SignalError::RoomFull);
        }

        let name = display_name(name, "Join");
        let peer_id = room.fresh_peer_id();
        room.broadcast(
            &ServerMsg::PeerJoined {
                peer: PeerInfo {
                    peer_id: peer_id.clone(),
                    name: name.clone(),
                },
            },
            None,
        );
        room.members.push(Member {
            peer_id: peer_id.clone(),
            name,
            tx: tx.clone(),
        });
        let reply = ServerMsg::RoomJoined {
            room_code: room_code.to_string(),
            peer_id: peer_id.clone(),
            host_id: room.host_id.clone(),
            peers: room.peer_list(),
        };
        deliver(&tx, &peer_id, reply);

        info!(
            room_code = %room_code,
            peer_id = %peer_id,
            members = room.members.len(),
            "Peer joined room"
        );
        Ok(Membership {
            room_code: room_code.to_string(),
            peer_id,
        })
    }

    /// Forward a handshake payload from `from` to `to` inside `room_code`
    pub fn relay(
        &self,
        room_code: &str,
        from: Option<&str>,
        to: &str,
        data: SignalData,
    ) -> Result<(), SignalError> {
        let room = self.room(room_code).ok_or(SignalError::RoomNotFound)?;
        let room = room.lock();
        let from = from
            .filter(|id| room.contains(id))
            .ok_or(SignalError::NotMember)?;
        let target = room
            .members
            .iter()
            .find(|m| m.peer_id == to)
            .ok_or(SignalError::PeerNotFound)?;

        debug!(room_code = %room_code, from = %from, to = %to, "Relaying signal");
        deliver(
            &target.tx,
            &target.peer_id,
            ServerMsg::Signal {
                from: from.to_string(),
                data,
            },
        );
        Ok(())
    }

    /// Remove a departed peer. Remaining members get `peer_left`; if the host
    /// left they also get an error and the room closes. Empty rooms are removed.
    pub fn leave(&self, membership: &Membership) {
        let Some(room) = self.room(&membership.room_code) else {
            return;
        };

        let remove_room = {
            let mut room = room.lock();
            let before = room.members.len();
            room.members.retain(|m| m.peer_id != membership.peer_id);
            if room.members.len() == before {
                return;
            }

            room.broadcast(
                &ServerMsg::PeerLeft {
                    peer_id: membership.peer_id.clone(),
                },
                None,
            );
            info!(
                room_code = %membership.room_code,
                peer_id = %membership.peer_id,
                "Peer left room"
            );

            if room.host_id == membership.peer_id {
                room.broadcast(&ServerMsg::error("Host left, room closed"), None);
                info!(room_code = %membership.room_code, "Room closed by host departure");
                room.closed = true;
            }
            room.closed || room.members.is_empty()
        };

        if remove_room {
            self.rooms
                .remove_if(&membership.room_code, |_, current| Arc::ptr_eq(current, &room));
            debug!(room_code = %membership.room_code, "Room removed");
        }
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::{SdpKind, SessionDescription};
    use tokio_test::assert_ok;

    fn channel() -> (PeerTx, mpsc::Receiver<ServerMsg>) {
        mpsc::channel(16)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn generated_codes_and_ids_have_expected_shape() {
        let code = random_room_code();
        assert_eq!(code.len(), 11);
        assert!(code.starts_with("IAO-"));
        assert_eq!(&code[8..9], "-");
        assert!(code
            .chars()
            .all(|c| c == '-' || c.is_ascii_uppercase() || c.is_ascii_digit()));

        let id = random_peer_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn create_then_join_lists_both_peers() {
        let registry = RoomRegistry::new();
        let (host_tx, mut host_rx) = channel();
        let host = registry
            .create_room("", Some("  ROOM-1  "), host_tx)
            .unwrap();
        assert_eq!(host.room_code, "ROOM-1");
        match drain(&mut host_rx).as_slice() {
            [ServerMsg::RoomCreated {
                peers, host_id, ..
            }] => {
                assert_eq!(host_id, &host.peer_id);
                assert_eq!(peers.len(), 1);
                assert_eq!(peers[0].name, "Host");
            }
            other => panic!("unexpected replies: {other:?}"),
        }

        let (join_tx, mut join_rx) = channel();
        let joiner = registry
            .join_room("A very long player name", " ROOM-1", join_tx)
            .unwrap();
        match drain(&mut join_rx).as_slice() {
            [ServerMsg::RoomJoined {
                peers,
                host_id,
                peer_id,
                ..
            }] => {
                assert_eq!(host_id, &host.peer_id);
                assert_eq!(peer_id, &joiner.peer_id);
                assert_eq!(peers.len(), 2);
                assert_eq!(peers[1].name, "A very long play");
            }
            other => panic!("unexpected replies: {other:?}"),
        }

        assert_eq!(
            drain(&mut host_rx),
            vec![ServerMsg::PeerJoined {
                peer: PeerInfo {
                    peer_id: joiner.peer_id.clone(),
                    name: "A very long play".into(),
                },
            }]
        );
        assert_eq!(registry.room_count(), 1);
        assert_eq!(registry.peer_count(), 2);
    }

    #[test]
    fn generated_code_when_none_requested() {
        let registry = RoomRegistry::new();
        let (tx, _rx) = channel();
        let host = registry.create_room("h", Some("   "), tx).unwrap();
        assert!(host.room_code.starts_with("IAO-"));
    }

    #[test]
    fn duplicate_code_unknown_room_and_capacity() {
        let registry = RoomRegistry::new();
        let (tx, _rx) = mpsc::channel(64);
        assert_ok!(registry.create_room("h", Some("R"), tx.clone()));
        assert_eq!(
            registry.create_room("h", Some("R"), tx.clone()).unwrap_err(),
            SignalError::RoomExists
        );
        assert_eq!(
            registry.join_room("j", "NOPE", tx.clone()).unwrap_err(),
            SignalError::RoomNotFound
        );
        for _ in 1..ROOM_CAPACITY {
            assert_ok!(registry.join_room("j", "R", tx.clone()));
        }
        assert_eq!(
            registry.join_room("j", "R", tx).unwrap_err(),
            SignalError::RoomFull
        );
    }

    #[test]
    fn relay_requires_membership_and_target() {
        let registry = RoomRegistry::new();
        let (host_tx, mut host_rx) = channel();
        let (join_tx, mut join_rx) = channel();
        let host = registry.create_room("h", Some("R"), host_tx).unwrap();
        let joiner = registry.join_room("j", "R", join_tx).unwrap();
        drain(&mut host_rx);
        drain(&mut join_rx);

        let offer = SignalData::sdp(SessionDescription {
            kind: SdpKind::Offer,
            sdp: "v=0".into(),
        });
        registry
            .relay("R", Some(&host.peer_id), &joiner.peer_id, offer.clone())
            .unwrap();
        assert_eq!(
            drain(&mut join_rx),
            vec![ServerMsg::Signal {
                from: host.peer_id.clone(),
                data: offer.clone(),
            }]
        );

        assert_eq!(
            registry.relay("X", Some(&host.peer_id), &joiner.peer_id, offer.clone()),
            Err(SignalError::RoomNotFound)
        );
        assert_eq!(
            registry.relay("R", None, &joiner.peer_id, offer.clone()),
            Err(SignalError::NotMember)
        );
        assert_eq!(
            registry.relay("R", Some("stranger"), &joiner.peer_id, offer.clone()),
            Err(SignalError::NotMember)
        );
        assert_eq!(
            registry.relay("R", Some(&host.peer_id), "ghost", offer),
            Err(SignalError::PeerNotFound)
        );
    }

    #[test]
    fn host_departure_closes_room() {
        let registry = RoomRegistry::new();
        let (host_tx, _host_rx) = channel();
        let (join_tx, mut join_rx) = channel();
        let host = registry.create_room("h", Some("R"), host_tx).unwrap();
        registry.join_room("j", "R", join_tx).unwrap();
        drain(&mut join_rx);

        registry.leave(&host);
        let inbox = drain(&mut join_rx);
        assert_eq!(
            inbox[0],
            ServerMsg::PeerLeft {
                peer_id: host.peer_id.clone()
            }
        );
        assert!(matches!(inbox[1], ServerMsg::Error { .. }));
        assert_eq!(registry.room_count(), 0);

        let (tx, _rx) = channel();
        assert_eq!(
            registry.join_room("late", "R", tx).unwrap_err(),
            SignalError::RoomNotFound
        );
    }

    #[test]
    fn joiner_departure_keeps_room_and_last_leave_removes_it() {
        let registry = RoomRegistry::new();
        let (host_tx, mut host_rx) = channel();
        let (join_tx, _join_rx) = channel();
        let host = registry.create_room("h", None, host_tx).unwrap();
        let joiner = registry.join_room("j", &host.room_code, join_tx).unwrap();
        drain(&mut host_rx);

        registry.leave(&joiner);
        assert_eq!(
            drain(&mut host_rx),
            vec![ServerMsg::PeerLeft {
                peer_id: joiner.peer_id.clone()
            }]
        );
        assert_eq!(registry.room_count(), 1);
        assert_eq!(registry.peers(&host.room_code).map(|p| p.len()), Some(1));

        // leaving twice is a no-op
        registry.leave(&joiner);
        registry.leave(&host);
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn host_hears_room_created_before_any_racing_join() {
        let registry = RoomRegistry::new();
        for i in 0..500 {
            let code = format!("RACE-{i}");
            let (host_tx, mut host_rx) = channel();
            let (join_tx, _join_rx) = channel();

            std::thread::scope(|scope| {
                scope.spawn(|| loop {
                    if registry.join_room("j", &code, join_tx.clone()).is_ok() {
                        break;
                    }
                    std::thread::yield_now();
                });
                assert_ok!(registry.create_room("h", Some(&code), host_tx));
            });

            let inbox = drain(&mut host_rx);
            assert!(
                matches!(inbox.first(), Some(ServerMsg::RoomCreated { peers, .. }) if peers.len() == 1),
                "round {i}: {inbox:?}"
            );
            assert!(matches!(inbox.get(1), Some(ServerMsg::PeerJoined { .. })));
        }
    }
}
