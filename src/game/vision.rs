//! Field-of-view ray marching and the aim-assist laser

use super::combat::BULLET_SPEED;
use super::stage::Stage;
use super::sync::RemotePlayer;
use super::Player;

/// Cone width without a light source (degrees)
pub const FOV_NO_LIGHT_DEG: f32 = 30.0;
/// Cone width with a light source (degrees)
pub const FOV_LIGHT_DEG: f32 = 140.0;
pub const RANGE_NO_LIGHT_TILES: f32 = 5.0;
pub const RANGE_LIGHT_TILES: f32 = 50.0;
/// How far past a wall sample the cone edge is drawn, as a fraction of a tile
pub const WALL_REVEAL_FRACTION: f32 = 0.35;
pub const MIN_RAYS: usize = 40;
const RAYS_PER_DEGREE: f32 = 2.8;
const MIN_RAY_STEP: f32 = 6.0;

const LASER_STEP: f32 = 12.0;
/// Laser starts this far beyond the player's edge
const LASER_GAP: f32 = 8.0;
/// Laser stops this far short of the crosshair
const CROSSHAIR_GAP: f32 = 18.0;

/// Cone shape selected by the light toggle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisionParams {
    pub fov_deg: f32,
    /// Max ray length in world units
    pub range: f32,
}

impl VisionParams {
    pub fn for_light(has_light: bool, tile_size: f32) -> Self {
        if has_light {
            Self {
                fov_deg: FOV_LIGHT_DEG,
                range: RANGE_LIGHT_TILES * tile_size,
            }
        } else {
            Self {
                fov_deg: FOV_NO_LIGHT_DEG,
                range: RANGE_NO_LIGHT_TILES * tile_size,
            }
        }
    }

    /// Number of angular segments; rays = segments + 1
    pub fn segments(&self) -> usize {
        ((self.fov_deg * RAYS_PER_DEGREE).ceil() as usize).max(MIN_RAYS)
    }
}

/// Visible polygon in world space: the origin plus one endpoint per ray
#[derive(Debug, Clone, PartialEq)]
pub struct VisionCone {
    pub origin: (f32, f32),
    pub points: Vec<(f32, f32)>,
    pub params: VisionParams,
}

/// Aim-assist segment in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AimLaser {
    pub start: (f32, f32),
    pub end: (f32, f32),
}

pub struct VisionSystem;

impl VisionSystem {
    /// March distance per sample
    pub fn ray_step(tile_size: f32) -> f32 {
        MIN_RAY_STEP.max(tile_size / 10.0)
    }

    /// Distance along `angle` at which the view is blocked.
    ///
    /// A remote player's circle stops the ray at the sample inside it. A wall
    /// stops it half a step back plus the wall reveal, so the edge lands a
    /// little past the wall face. Unobstructed rays return `max_range`.
    pub fn cast(
        stage: &Stage,
        remotes: &[RemotePlayer],
        origin: (f32, f32),
        angle: f32,
        max_range: f32,
    ) -> f32 {
        let step = Self::ray_step(stage.tile_size());
        let (sin, cos) = angle.sin_cos();
        let mut dist = 0.0f32;
        while dist < max_range {
            let nx = origin.0 + cos * dist;
            let ny = origin.1 + sin * dist;
            if remotes.iter().any(|p| p.contains(nx, ny)) {
                return dist;
            }
            if stage.is_wall(nx, ny) {
                let reveal = stage.tile_size() * WALL_REVEAL_FRACTION;
                return max_range.min((dist - step * 0.5 + reveal).max(0.0));
            }
            dist += step;
        }
        max_range
    }

    /// Build the vision cone centred on the direction from the player to `aim`
    pub fn cone(
        stage: &Stage,
        remotes: &[RemotePlayer],
        player: &Player,
        aim: (f32, f32),
    ) -> VisionCone {
        let params = VisionParams::for_light(player.has_light, stage.tile_size());
        let origin = (player.x, player.y);
        let base = (aim.1 - player.y).atan2(aim.0 - player.x);
        let half = params.fov_deg.to_radians() / 2.0;
        let segments = params.segments();

        let points = (0..=segments)
            .map(|i| {
                let t = i as f32 / segments as f32;
                let angle = base - half + t * half * 2.0;
                let dist = Self::cast(stage, remotes, origin, angle, params.range);
                (origin.0 + angle.cos() * dist, origin.1 + angle.sin() * dist)
            })
            .collect();

        VisionCone {
            origin,
            points,
            params,
        }
    }

    /// Laser from just beyond the player toward `aim`, cut at the first wall or
    /// shortly before the crosshair, and never longer than a bullet can fly.
    pub fn aim_laser(stage: &Stage, player: &Player, aim: (f32, f32), bullet_life: f32) -> AimLaser {
        let dx = aim.0 - player.x;
        let dy = aim.1 - player.y;
        let len = match dx.hypot(dy) {
            l if l > 0.0 => l,
            _ => 1.0,
        };
        let (ux, uy) = (dx / len, dy / len);
        let offset = player.radius + LASER_GAP;
        let start = (player.x + ux * offset, player.y + uy * offset);
        let max_dist = BULLET_SPEED * bullet_life;

        let mut wall_dist = max_dist;
        let mut dist = 0.0f32;
        while dist < max_dist {
            if stage.is_wall(start.0 + ux * dist, start.1 + uy * dist) {
                wall_dist = dist;
                break;
            }
            dist += LASER_STEP;
        }

        let cross_dist = max_dist.min((len - CROSSHAIR_GAP).max(0.0));
        let final_dist = cross_dist.min(wall_dist);
        AimLaser {
            start,
            end: (start.0 + ux * final_dist, start.1 + uy * final_dist),
        }
    }
}
