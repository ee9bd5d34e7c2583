//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Default signaling messages per second per socket.
/// ICE gathering bursts a handful of candidates at once, so this stays generous.
pub const SIGNAL_RATE_LIMIT: u32 = 50;

/// Per-socket rate limiter state
#[derive(Clone)]
pub struct PeerRateLimiter {
    signal_limiter: Arc<Limiter>,
}

impl PeerRateLimiter {
    pub fn new(messages_per_second: u32) -> Self {
        Self {
            signal_limiter: create_limiter(messages_per_second),
        }
    }

    /// Check if a signaling message is allowed (returns true if allowed)
    pub fn check_message(&self) -> bool {
        self.signal_limiter.check().is_ok()
    }
}

impl Default for PeerRateLimiter {
    fn default() -> Self {
        Self::new(SIGNAL_RATE_LIMIT)
    }
}
