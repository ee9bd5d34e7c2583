//! Camera and read-only projections for the HUD and minimap

use serde::Serialize;

use super::combat::ItemKind;
use super::stage::{Stage, Tile};
use super::{clamp, Player};

/// View origin in world space
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Camera {
    pub x: f32,
    pub y: f32,
}

impl Camera {
    /// Center on `target`, clamped so the view never leaves the world.
    /// A world smaller than the view pins the origin to 0.
    pub fn follow(target: (f32, f32), view: (f32, f32), world: (f32, f32)) -> Self {
        Self {
            x: clamp(target.0 - view.0 / 2.0, 0.0, (world.0 - view.0).max(0.0)),
            y: clamp(target.1 - view.1 / 2.0, 0.0, (world.1 - view.1).max(0.0)),
        }
    }

    pub fn to_view(&self, wx: f32, wy: f32) -> (f32, f32) {
        (wx - self.x, wy - self.y)
    }

    pub fn to_world(&self, vx: f32, vy: f32) -> (f32, f32) {
        (vx + self.x, vy + self.y)
    }
}

/// One inventory row as the HUD shows it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HudSlot {
    pub name: String,
    pub active: bool,
    /// `"current/max"` ammo or uses
    pub meter: String,
}

/// Values bound to the HUD each frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HudState {
    pub health: f32,
    pub max_health: f32,
    pub stamina: f32,
    pub max_stamina: f32,
    /// `"hp/max"` with health rounded
    pub health_label: String,
    pub stamina_label: String,
    /// Rounds left in the active weapon, `None` for gadgets
    pub ammo: Option<u32>,
    pub slots: Vec<HudSlot>,
}

impl HudState {
    pub fn from_player(player: &Player) -> Self {
        let inventory = &player.inventory;
        let ammo = inventory.active().and_then(|item| match item.kind {
            ItemKind::Ranged { ammo, .. } => Some(ammo),
            ItemKind::Gadget { .. } => None,
        });
        let slots = inventory
            .items()
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let (cur, max) = item.meter();
                HudSlot {
                    name: item.name.clone(),
                    active: i == inventory.active_index(),
                    meter: format!("{cur}/{max}"),
                }
            })
            .collect();

        Self {
            health: player.health,
            max_health: player.max_health,
            stamina: player.stamina,
            max_stamina: player.max_stamina,
            health_label: format!("{}/{}", player.health.round(), player.max_health),
            stamina_label: format!("{}/{}", player.stamina.round(), player.max_stamina),
            ammo,
            slots,
        }
    }

    pub fn health_ratio(&self) -> f32 {
        ratio(self.health, self.max_health)
    }

    pub fn stamina_ratio(&self) -> f32 {
        ratio(self.stamina, self.max_stamina)
    }
}

fn ratio(value: f32, max: f32) -> f32 {
    if max > 0.0 {
        clamp(value / max, 0.0, 1.0)
    } else {
        0.0
    }
}

/// Event marker on the minimap
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinimapMarker {
    pub x: f32,
    pub y: f32,
    pub triggered: bool,
}

/// World scaled into a fixed-size minimap
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Minimap {
    pub width: f32,
    pub height: f32,
    pub player: (f32, f32),
    pub markers: Vec<MinimapMarker>,
    /// Camera view rectangle `(x, y, w, h)` in minimap units
    pub view_rect: (f32, f32, f32, f32),
}

impl Minimap {
    pub fn project(
        stage: &Stage,
        player: &Player,
        camera: &Camera,
        view: (f32, f32),
        size: (f32, f32),
    ) -> Self {
        let (world_w, world_h) = stage.world_size();
        let sx = size.0 / world_w;
        let sy = size.1 / world_h;
        Self {
            width: size.0,
            height: size.1,
            player: (player.x * sx, player.y * sy),
            markers: stage
                .events()
                .iter()
                .map(|ev| MinimapMarker {
                    x: ev.x * sx,
                    y: ev.y * sy,
                    triggered: ev.triggered,
                })
                .collect(),
            view_rect: (camera.x * sx, camera.y * sy, view.0 * sx, view.1 * sy),
        }
    }

    /// Text rendering of the grid with the player marked `@`; handy in logs
    /// and for headless debugging
    pub fn ascii(stage: &Stage, player: &Player) -> Vec<String> {
        let t = stage.tile_size();
        let player_cell = ((player.x / t).floor() as usize, (player.y / t).floor() as usize);
        (0..stage.rows())
            .map(|row| {
                (0..stage.cols())
                    .map(|col| {
                        if (col, row) == player_cell {
                            return '@';
                        }
                        let center = (col as f32 * t + t / 2.0, row as f32 * t + t / 2.0);
                        match stage.tile_at(center.0, center.1) {
                            Tile::Spawn => Tile::Floor.symbol(),
                            tile => tile.symbol(),
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_centres_then_clamps_to_world() {
        let world = (2400.0, 1800.0);
        let view = (800.0, 600.0);
        assert_eq!(
            Camera::follow((1200.0, 900.0), view, world),
            Camera { x: 800.0, y: 600.0 }
        );
        assert_eq!(Camera::follow((10.0, 10.0), view, world), Camera { x: 0.0, y: 0.0 });
        assert_eq!(
            Camera::follow((2390.0, 1790.0), view, world),
            Camera { x: 1600.0, y: 1200.0 }
        );
    }

    #[test]
    fn small_world_pins_camera_to_origin() {
        let cam = Camera::follow((100.0, 100.0), (800.0, 600.0), (320.0, 240.0));
        assert_eq!(cam, Camera { x: 0.0, y: 0.0 });
        assert_eq!(cam.to_world(10.0, 10.0), (10.0, 10.0));
    }

    #[test]
    fn hud_reflects_active_weapon() {
        let mut player = Player::new(0.0, 0.0);
        player.health = 57.4;
        let hud = HudState::from_player(&player);
        assert_eq!(hud.health_label, "57/100");
        assert_eq!(hud.ammo, Some(25));
        assert_eq!(hud.slots.len(), 3);
        assert!(hud.slots[0].active);
        assert_eq!(hud.slots[1].meter, "12/12");

        player.inventory.select(2);
        let hud = HudState::from_player(&player);
        assert_eq!(hud.ammo, None);
        assert!(hud.slots[2].active);
        assert!((hud.health_ratio() - 0.574).abs() < 1e-4);
    }

    #[test]
    fn minimap_scales_world_to_size() {
        let stage = Stage::empty();
        let player = Player::new(1200.0, 900.0);
        let camera = Camera::follow((1200.0, 900.0), (800.0, 600.0), stage.world_size());
        let map = Minimap::project(&stage, &player, &camera, (800.0, 600.0), (240.0, 180.0));
        assert_eq!(map.player, (120.0, 90.0));
        assert_eq!(map.view_rect, (80.0, 60.0, 80.0, 60.0));
        assert!(map.markers.is_empty());
    }

    #[test]
    fn ascii_marks_player_cell() {
        let stage = Stage::from_rows(&["#S~", "..,"], 80.0).unwrap();
        let player = Player::new(100.0, 100.0);
        assert_eq!(Minimap::ascii(&stage, &player), vec!["#.~", ".@,"]);
    }
}
