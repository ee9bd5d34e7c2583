//! WebSocket signaling endpoint and wire types

pub mod handler;
pub mod protocol;
