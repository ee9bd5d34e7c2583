//! Blizzard tiles: damage over time and the screen tint that follows it

use super::stage::{Stage, Tile};
use super::{clamp, Player};

/// Health lost per second while standing in a blizzard
pub const HAZARD_DAMAGE_PER_SEC: f32 = 1.0;
/// Overlay opacity approached while inside a blizzard
pub const OVERLAY_HAZARD_TARGET: f32 = 0.45;
pub const OVERLAY_FADE_IN_RATE: f32 = 3.5;
pub const OVERLAY_FADE_OUT_RATE: f32 = 2.8;

/// Smoothed tint opacity in `[0, OVERLAY_HAZARD_TARGET]`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Overlay {
    value: f32,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// Ease toward the target for this frame
    pub fn update(&mut self, on_hazard: bool, dt: f32) -> f32 {
        let (target, rate) = if on_hazard {
            (OVERLAY_HAZARD_TARGET, OVERLAY_FADE_IN_RATE)
        } else {
            (0.0, OVERLAY_FADE_OUT_RATE)
        };
        self.value += (target - self.value) * clamp(dt * rate, 0.0, 1.0);
        self.value
    }
}

pub struct HazardSystem;

impl HazardSystem {
    pub fn on_hazard(player: &Player, stage: &Stage) -> bool {
        stage.tile_at(player.x, player.y) == Tile::Hazard
    }

    /// Apply blizzard damage for one frame; returns the health removed.
    /// Health never drops below zero and a dead player takes nothing.
    pub fn apply_damage(player: &mut Player, stage: &Stage, dt: f32) -> f32 {
        if !player.is_alive() || !Self::on_hazard(player, stage) {
            return 0.0;
        }
        let before = player.health;
        player.health = (player.health - HAZARD_DAMAGE_PER_SEC * dt).max(0.0);
        before - player.health
    }
}
