//! Player movement, stamina and collision resolution

use super::stage::Stage;
use super::sync::RemotePlayer;
use super::{clamp, FrameInput, Player};

/// Player collision radius
pub const PLAYER_RADIUS: f32 = 12.0;
/// Walking speed in world units per second
pub const PLAYER_SPEED: f32 = 220.0;
pub const PLAYER_MAX_HEALTH: f32 = 100.0;
pub const PLAYER_MAX_STAMINA: f32 = 100.0;
/// Speed factor while sprinting
pub const RUN_MULTIPLIER: f32 = 1.6;
/// Stamina spent per second of sprinting
pub const STAMINA_DRAIN: f32 = 35.0;
/// Stamina recovered per second when not sprinting
pub const STAMINA_REGEN: f32 = 28.0;

/// Outcome of one movement step
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MoveResult {
    pub sprinting: bool,
    pub blocked_x: bool,
    pub blocked_y: bool,
}

/// Movement system for the local player
pub struct MovementSystem;

impl MovementSystem {
    /// Unit vector from the held direction flags; zero when idle or cancelled out
    pub fn direction(input: &FrameInput) -> (f32, f32) {
        let mut vx = 0.0f32;
        let mut vy = 0.0f32;
        if input.up {
            vy -= 1.0;
        }
        if input.down {
            vy += 1.0;
        }
        if input.left {
            vx -= 1.0;
        }
        if input.right {
            vx += 1.0;
        }

        let len = vx.hypot(vy);
        if len == 0.0 {
            return (0.0, 0.0);
        }
        (vx / len, vy / len)
    }

    /// Move the player for one frame: sprint gating, axis-separated wall
    /// collision, world clamp, then stamina drain or regen.
    pub fn step(player: &mut Player, input: &FrameInput, stage: &Stage, dt: f32) -> MoveResult {
        let (vx, vy) = Self::direction(input);
        let moving = vx != 0.0 || vy != 0.0;
        let sprinting = input.sprint && player.stamina > 0.0 && moving;
        let speed = if sprinting {
            player.speed * RUN_MULTIPLIER
        } else {
            player.speed
        };

        let next_x = player.x + vx * speed * dt;
        let next_y = player.y + vy * speed * dt;

        // X first at the current Y, then Y at the resolved X
        let blocked_x = Self::is_blocked(stage, next_x, player.y, player.radius);
        if !blocked_x {
            player.x = next_x;
        }
        let blocked_y = Self::is_blocked(stage, player.x, next_y, player.radius);
        if !blocked_y {
            player.y = next_y;
        }

        let (width, height) = stage.world_size();
        player.x = clamp(player.x, player.radius, width - player.radius);
        player.y = clamp(player.y, player.radius, height - player.radius);

        player.stamina = if sprinting {
            (player.stamina - STAMINA_DRAIN * dt).max(0.0)
        } else {
            (player.stamina + STAMINA_REGEN * dt).min(player.max_stamina)
        };

        MoveResult {
            sprinting,
            blocked_x,
            blocked_y,
        }
    }

    /// Four cardinal probes one radius out from the candidate center
    fn is_blocked(stage: &Stage, x: f32, y: f32, r: f32) -> bool {
        if stage.is_empty() {
            return false;
        }
        [(x - r, y), (x + r, y), (x, y - r), (x, y + r)]
            .iter()
            .any(|&(px, py)| stage.is_wall(px, py))
    }

    /// Push the local player out of every overlapping remote player.
    ///
    /// One-sided: remote players never move. The result is not re-validated
    /// against walls, so a push can end inside terrain.
    pub fn resolve_overlap(player: &mut Player, remotes: &[RemotePlayer]) {
        for other in remotes {
            let dx = player.x - other.x;
            let dy = player.y - other.y;
            let dist = match dx.hypot(dy) {
                d if d > 0.0 => d,
                _ => 1.0,
            };
            let min_dist = player.radius + other.r;
            if dist < min_dist {
                let push = (min_dist - dist) / dist;
                player.x += dx * push;
                player.y += dy * push;
            }
        }
    }
}
