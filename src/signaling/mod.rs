//! WebRTC signaling: the room relay and the client-side handshake

pub mod client;
pub mod room;

pub use client::{ConnectionState, PeerConnector, RoomInfo, SignalingClient, TransportError};
pub use room::{Membership, RoomRegistry, SignalError};
