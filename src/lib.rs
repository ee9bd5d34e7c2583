//! Ice Age Operation
//!
//! Simulation core for the top-down survival shooter plus the WebRTC
//! signaling relay that lets browsers find each other.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod lobby;
pub mod signaling;
pub mod util;
pub mod ws;
