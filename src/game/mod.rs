//! Frame-driven gameplay simulation

pub mod combat;
pub mod hazard;
pub mod mask;
pub mod physics;
pub mod session;
pub mod stage;
pub mod sync;
pub mod view;
pub mod vision;

pub use combat::{Bullet, Inventory, Item, ItemKind};
pub use session::{Frame, GameSession, SessionOptions};
pub use stage::{Stage, Tile};
pub use sync::RemotePlayer;

use physics::{PLAYER_MAX_HEALTH, PLAYER_MAX_STAMINA, PLAYER_RADIUS, PLAYER_SPEED};

/// Input state held during one frame (keyboard flags plus cursor in view space)
#[derive(Debug, Clone, Default)]
pub struct FrameInput {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub sprint: bool,
    pub shooting: bool,
    pub aiming: bool,
    /// Cursor position relative to the view origin
    pub mouse_x: f32,
    pub mouse_y: f32,
}

/// The local player; only the simulation tick mutates it
#[derive(Debug, Clone)]
pub struct Player {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub speed: f32,
    pub stamina: f32,
    pub max_stamina: f32,
    pub health: f32,
    pub max_health: f32,
    /// Carried light source; widens and lengthens the vision cone
    pub has_light: bool,
    pub inventory: Inventory,
}

impl Player {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            radius: PLAYER_RADIUS,
            speed: PLAYER_SPEED,
            stamina: PLAYER_MAX_STAMINA,
            max_stamina: PLAYER_MAX_STAMINA,
            health: PLAYER_MAX_HEALTH,
            max_health: PLAYER_MAX_HEALTH,
            has_light: false,
            inventory: Inventory::default(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }
}

/// `max(min, min(max, v))`; never panics when the range is inverted
pub(crate) fn clamp(v: f32, min: f32, max: f32) -> f32 {
    min.max(max.min(v))
}
