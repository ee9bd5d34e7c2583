//! Time utilities for the relay server and the frame-driven simulation

use std::time::Instant;

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Largest step a single frame may simulate (seconds).
/// Long pauses such as a backgrounded tab collapse into one short step.
pub const MAX_FRAME_DT: f32 = 0.033;

/// Converts animation-clock timestamps into clamped frame deltas
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    last: Option<f64>,
    elapsed: f64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance to `now` (seconds, monotonic) and return the frame delta.
    /// The first frame yields zero; a clock that runs backwards yields zero.
    pub fn advance(&mut self, now: f64) -> f32 {
        let dt = match self.last {
            Some(last) => ((now - last) as f32).clamp(0.0, MAX_FRAME_DT),
            None => 0.0,
        };
        self.last = Some(now);
        self.elapsed += dt as f64;
        dt
    }

    /// Simulated time so far (sum of clamped deltas)
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_is_zero() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.advance(12.5), 0.0);
    }

    #[test]
    fn long_pause_is_clamped() {
        let mut clock = FrameClock::new();
        clock.advance(1.0);
        let dt = clock.advance(5.0);
        assert!((dt - MAX_FRAME_DT).abs() < 1e-6);
    }

    #[test]
    fn normal_frames_pass_through() {
        let mut clock = FrameClock::new();
        clock.advance(1.0);
        let dt = clock.advance(1.016);
        assert!((dt - 0.016).abs() < 1e-4);
        assert_eq!(clock.advance(0.5), 0.0);
    }
}
