//! HTTP surface: health, signaling socket and stage files

pub mod routes;

pub use routes::{build_router, AppError};
