//! Game session - owns all per-match state and runs the frame tick

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};
use uuid::Uuid;

use crate::util::time::FrameClock;
use crate::ws::protocol::IngameMsg;

use super::combat::{Bullet, CombatSystem, Trigger};
use super::hazard::{HazardSystem, Overlay};
use super::mask::{select_compositor, MaskCompositor, RenderCaps, VisionMask};
use super::physics::MovementSystem;
use super::stage::Stage;
use super::sync::{InboxSender, PeerInbox, PeerSync, RemotePlayer, INBOX_CAPACITY};
use super::view::{Camera, HudState};
use super::vision::{AimLaser, VisionCone, VisionSystem};
use super::{FrameInput, Player};

/// Session construction parameters
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Id published on the local broadcast channel
    pub local_id: String,
    pub view_width: f32,
    pub view_height: f32,
    /// Seed for shot spread
    pub seed: u64,
    pub caps: RenderCaps,
    pub inbox_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            local_id: Uuid::new_v4().to_string(),
            view_width: 1280.0,
            view_height: 720.0,
            seed: rand::random(),
            caps: RenderCaps::default(),
            inbox_capacity: INBOX_CAPACITY,
        }
    }
}

/// Everything one tick produced for the presentation layer and the network
#[derive(Debug, Clone)]
pub struct Frame {
    pub dt: f32,
    pub camera: Camera,
    /// Bullet spawned this frame, if any
    pub shot: Option<Bullet>,
    pub bullets_removed: usize,
    pub hazard_damage: f32,
    pub overlay: f32,
    /// Ids of stage events that fired this frame
    pub events: Vec<String>,
    pub cone: VisionCone,
    /// Composited visibility mask in view space
    pub mask: VisionMask,
    /// Present while the aim button is held
    pub laser: Option<AimLaser>,
    pub hud: HudState,
    /// Messages to publish on the local broadcast channel
    pub outbound: Vec<IngameMsg>,
}

/// Per-match aggregate. The only place gameplay state is mutated.
pub struct GameSession {
    stage: Stage,
    player: Player,
    bullets: Vec<Bullet>,
    trigger: Trigger,
    overlay: Overlay,
    camera: Camera,
    view: (f32, f32),
    clock: FrameClock,
    rng: ChaCha8Rng,
    sync: PeerSync,
    inbox: PeerInbox,
    inbox_tx: InboxSender,
    compositor: Box<dyn MaskCompositor>,
    mask: VisionMask,
    /// Outbound messages queued outside a tick
    pending: Vec<IngameMsg>,
}

impl GameSession {
    pub fn new(stage: Stage, options: SessionOptions) -> Self {
        let (x, y) = stage.find_spawn();
        let view = (options.view_width.max(1.0), options.view_height.max(1.0));
        let (inbox_tx, inbox) = PeerInbox::channel(options.inbox_capacity.max(1));
        let sync = PeerSync::new(options.local_id);
        let ready = sync.ready_message();

        info!(
            local_id = %sync.local_id(),
            spawn_x = x,
            spawn_y = y,
            open_world = stage.is_empty(),
            "Game session started"
        );

        Self {
            camera: Camera::follow((x, y), view, stage.world_size()),
            player: Player::new(x, y),
            stage,
            bullets: Vec::new(),
            trigger: Trigger::default(),
            overlay: Overlay::new(),
            view,
            clock: FrameClock::new(),
            rng: ChaCha8Rng::seed_from_u64(options.seed),
            sync,
            inbox,
            inbox_tx,
            compositor: select_compositor(options.caps),
            mask: VisionMask::new(view.0 as usize, view.1 as usize),
            pending: vec![ready],
        }
    }

    /// Handle for network callbacks; messages land on the next tick
    pub fn inbox(&self) -> InboxSender {
        self.inbox_tx.clone()
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn bullets(&self) -> &[Bullet] {
        &self.bullets
    }

    pub fn remotes(&self) -> &[RemotePlayer] {
        self.sync.remotes()
    }

    pub fn camera(&self) -> Camera {
        self.camera
    }

    pub fn local_id(&self) -> &str {
        self.sync.local_id()
    }

    pub fn elapsed(&self) -> f64 {
        self.clock.elapsed()
    }

    /// Switch the active inventory slot
    pub fn select_slot(&mut self, index: usize) -> bool {
        let changed = self.player.inventory.select(index);
        if changed {
            debug!(slot = index, "Active slot changed");
        }
        changed
    }

    /// Flip the carried light; returns the new state
    pub fn toggle_light(&mut self) -> bool {
        self.player.has_light = !self.player.has_light;
        self.player.has_light
    }

    /// Run one frame. `now` is the monotonic animation clock in seconds.
    ///
    /// Phases run in a fixed order: inbound messages, movement, overlap,
    /// shooting, projectiles, environment, vision, peer send.
    pub fn tick(&mut self, input: &FrameInput, now: f64) -> Frame {
        let dt = self.clock.advance(now);

        for msg in self.inbox.drain() {
            self.sync.apply(msg, self.player.radius);
        }

        MovementSystem::step(&mut self.player, input, &self.stage, dt);
        MovementSystem::resolve_overlap(&mut self.player, self.sync.remotes());
        self.camera = Camera::follow(
            (self.player.x, self.player.y),
            self.view,
            self.stage.world_size(),
        );
        let aim = self.camera.to_world(input.mouse_x, input.mouse_y);

        let shot = CombatSystem::try_shoot(
            &mut self.player,
            &mut self.trigger,
            input.shooting,
            aim,
            now,
            &mut self.rng,
        );
        if let Some(bullet) = &shot {
            self.bullets.push(bullet.clone());
        }
        let bullets_removed = CombatSystem::update_bullets(&mut self.bullets, &self.stage, dt);

        let hazard_damage = HazardSystem::apply_damage(&mut self.player, &self.stage, dt);
        let on_hazard = HazardSystem::on_hazard(&self.player, &self.stage);
        let overlay = self.overlay.update(on_hazard, dt);
        let events = self.stage.trigger_events(self.player.x, self.player.y);

        let cone = VisionSystem::cone(&self.stage, self.sync.remotes(), &self.player, aim);
        self.render_mask(&cone);
        let mask = self.compositor.composite(&self.mask);

        let laser = input.aiming.then(|| {
            VisionSystem::aim_laser(
                &self.stage,
                &self.player,
                aim,
                self.player.inventory.bullet_life(),
            )
        });

        let mut outbound = std::mem::take(&mut self.pending);
        outbound.extend(self.sync.maybe_send(now, &self.player));

        Frame {
            dt,
            camera: self.camera,
            shot,
            bullets_removed,
            hazard_damage,
            overlay,
            events,
            cone,
            mask,
            laser,
            hud: HudState::from_player(&self.player),
            outbound,
        }
    }

    /// Opaque raster with the personal circle and the cone knocked out
    fn render_mask(&mut self, cone: &VisionCone) {
        let origin = self.camera.to_view(cone.origin.0, cone.origin.1);
        let mut polygon = Vec::with_capacity(cone.points.len() + 1);
        polygon.push(origin);
        polygon.extend(cone.points.iter().map(|&(x, y)| self.camera.to_view(x, y)));

        self.mask.fill_hidden();
        self.mask
            .reveal_circle(origin.0, origin.1, self.stage.tile_size());
        self.mask.reveal_polygon(&polygon);
    }
}
