//! Combat system - inventory, shooting, projectiles

use rand::Rng;
use tracing::debug;

use super::stage::Stage;
use super::Player;

/// Muzzle velocity in world units per second
pub const BULLET_SPEED: f32 = 520.0;
/// Projectile lifetime for items that do not define one (seconds)
pub const DEFAULT_BULLET_LIFE: f32 = 1.8;
/// Minimum time between shots (seconds)
pub const SHOT_COOLDOWN: f64 = 0.12;
/// Gap between the player's edge and a fresh bullet
pub const MUZZLE_GAP: f32 = 4.0;

/// Inventory slot an item occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Main,
    Side,
    Gear,
}

/// What an item is, and the state only that kind carries
#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    Ranged {
        ammo: u32,
        max_ammo: u32,
        /// Half-width of the random spread cone, in degrees
        spread_deg: f32,
        /// Projectile lifetime in seconds; `None` uses [`DEFAULT_BULLET_LIFE`]
        projectile_life: Option<f32>,
    },
    Gadget {
        uses_cur: u32,
        uses_max: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub name: String,
    pub slot: SlotKind,
    pub kind: ItemKind,
}

impl Item {
    pub fn ranged(
        name: &str,
        slot: SlotKind,
        ammo: u32,
        max_ammo: u32,
        spread_deg: f32,
        projectile_life: Option<f32>,
    ) -> Self {
        Self {
            name: name.to_string(),
            slot,
            kind: ItemKind::Ranged {
                ammo,
                max_ammo,
                spread_deg,
                projectile_life,
            },
        }
    }

    pub fn gadget(name: &str, uses_cur: u32, uses_max: u32) -> Self {
        Self {
            name: name.to_string(),
            slot: SlotKind::Gear,
            kind: ItemKind::Gadget { uses_cur, uses_max },
        }
    }

    /// `(current, max)` counter shown on the inventory slot
    pub fn meter(&self) -> (u32, u32) {
        match self.kind {
            ItemKind::Ranged { ammo, max_ammo, .. } => (ammo, max_ammo),
            ItemKind::Gadget { uses_cur, uses_max } => (uses_cur, uses_max),
        }
    }
}

/// Equipped items plus the active slot index
#[derive(Debug, Clone, PartialEq)]
pub struct Inventory {
    items: Vec<Item>,
    active: usize,
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new(vec![
            Item::ranged("Rifle", SlotKind::Main, 25, 30, 3.0, Some(2.2)),
            Item::ranged("Pistol", SlotKind::Side, 12, 12, 8.0, Some(1.5)),
            Item::gadget("Turret", 2, 3),
        ])
    }
}

impl Inventory {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items, active: 0 }
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active(&self) -> Option<&Item> {
        self.items.get(self.active)
    }

    /// Switch the active slot; out-of-range indices are ignored
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.items.len() {
            return false;
        }
        self.active = index;
        true
    }

    /// Spread half-angle of the active item in radians (0 for gadgets)
    pub fn spread_rad(&self) -> f32 {
        match self.active().map(|item| &item.kind) {
            Some(ItemKind::Ranged { spread_deg, .. }) => spread_deg.to_radians(),
            _ => 0.0,
        }
    }

    /// Projectile lifetime of the active item
    pub fn bullet_life(&self) -> f32 {
        match self.active().map(|item| &item.kind) {
            Some(ItemKind::Ranged {
                projectile_life: Some(life),
                ..
            }) => *life,
            _ => DEFAULT_BULLET_LIFE,
        }
    }

    /// Spend one round from the active weapon. False for gadgets or an empty magazine.
    fn take_round(&mut self) -> bool {
        match self.items.get_mut(self.active).map(|item| &mut item.kind) {
            Some(ItemKind::Ranged { ammo, .. }) if *ammo > 0 => {
                *ammo -= 1;
                true
            }
            _ => false,
        }
    }
}

/// Projectile in flight
#[derive(Debug, Clone, PartialEq)]
pub struct Bullet {
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    /// Seconds left before the bullet expires
    pub life: f32,
}

impl Bullet {
    /// Spawn at the shooter's edge along `angle`
    pub fn new(origin_x: f32, origin_y: f32, offset: f32, angle: f32, life: f32) -> Self {
        let (uy, ux) = angle.sin_cos();
        Self {
            x: origin_x + ux * offset,
            y: origin_y + uy * offset,
            vel_x: ux * BULLET_SPEED,
            vel_y: uy * BULLET_SPEED,
            life,
        }
    }

    /// Advance one frame; returns false once expired
    pub fn update(&mut self, dt: f32) -> bool {
        self.x += self.vel_x * dt;
        self.y += self.vel_y * dt;
        self.life -= dt;
        self.life > 0.0
    }
}

/// Monotonic-clock shot limiter
#[derive(Debug, Clone, Default)]
pub struct Trigger {
    last_shot: Option<f64>,
}

impl Trigger {
    pub fn ready(&self, now: f64) -> bool {
        self.last_shot
            .map_or(true, |last| now - last >= SHOT_COOLDOWN)
    }

    fn fire(&mut self, now: f64) {
        self.last_shot = Some(now);
    }
}

/// Combat system for shooting and projectile upkeep
pub struct CombatSystem;

impl CombatSystem {
    /// Fire one bullet toward `target` if the trigger is held, the cooldown has
    /// elapsed and the active weapon has ammo. Otherwise does nothing.
    pub fn try_shoot<R: Rng>(
        player: &mut Player,
        trigger: &mut Trigger,
        shooting: bool,
        target: (f32, f32),
        now: f64,
        rng: &mut R,
    ) -> Option<Bullet> {
        if !shooting || !trigger.ready(now) {
            return None;
        }
        if !player.inventory.take_round() {
            return None;
        }
        trigger.fire(now);

        let base_angle = (target.1 - player.y).atan2(target.0 - player.x);
        let spread = player.inventory.spread_rad();
        let offset = if spread > 0.0 {
            rng.gen_range(-spread..=spread)
        } else {
            0.0
        };

        Some(Bullet::new(
            player.x,
            player.y,
            player.radius + MUZZLE_GAP,
            base_angle + offset,
            player.inventory.bullet_life(),
        ))
    }

    /// Advance every bullet and drop the expired ones and those inside walls.
    /// Removal swaps from the back, so survivors may be reordered.
    pub fn update_bullets(bullets: &mut Vec<Bullet>, stage: &Stage, dt: f32) -> usize {
        let mut removed = 0;
        for i in (0..bullets.len()).rev() {
            let alive = bullets[i].update(dt);
            if !alive || stage.is_wall(bullets[i].x, bullets[i].y) {
                bullets.swap_remove(i);
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, remaining = bullets.len(), "Bullets retired");
        }
        removed
    }
}
