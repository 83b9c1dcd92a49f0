//! Game state and top-level model operations
//!
//! Everything the simulation needs lives here and serializes together, RNG
//! included, so a saved state continues deterministically.

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::ball::Ball;
use super::effects;
use super::events::GameEvent;
use super::geometry::Ray;
use super::item::{GameItem, ItemKind};
use super::level::{Level, PieceChange, ProjectileReaction};
use super::paddle::{Paddle, PaddleTypes};
use super::projectile::{Projectile, ProjectileKind};
use super::timer::ItemTimer;
use crate::consts::*;
use crate::tuning::Tuning;

/// Current phase of gameplay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    /// Ball resting on the paddle, waiting for launch
    Serve,
    Playing,
    Paused,
    /// Every breakable and bomb destroyed
    LevelComplete,
    /// Out of lives
    GameOver,
}

/// Complete game state (deterministic, serializable)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    /// Run seed for reproducibility
    pub seed: u64,
    pub(crate) rng: Pcg32,
    pub tuning: Tuning,
    pub phase: GamePhase,
    /// Phase to return to when unpaused
    pub(crate) resume_phase: GamePhase,
    /// Simulation tick counter
    pub time_ticks: u64,
    pub lives: u8,
    pub score: u64,
    pub level: Level,
    pub paddle: Paddle,
    /// Active balls (sorted by id for determinism)
    pub balls: Vec<Ball>,
    /// Items falling toward the paddle
    pub items: Vec<GameItem>,
    /// Running item effect timers
    pub timers: Vec<ItemTimer>,
    pub projectiles: Vec<Projectile>,
    /// Ball followed by the ball camera
    pub ball_cam: Option<u32>,
    /// Unit "down" for gravity balls and nets
    pub gravity_dir: Vec2,
    /// Next entity ID
    next_id: u32,
    /// Events since the last drain
    #[serde(skip)]
    events: Vec<GameEvent>,
}

impl GameState {
    /// New game on the given level, with a ball ready to serve
    pub fn new(seed: u64, level: Level, tuning: Tuning) -> Self {
        let paddle = Paddle::new(0.0, level.size().x, PADDLE_CENTER_Y);
        let mut state = Self {
            seed,
            rng: Pcg32::seed_from_u64(seed),
            lives: tuning.starting_lives.min(MAX_LIVES),
            tuning,
            phase: GamePhase::Serve,
            resume_phase: GamePhase::Serve,
            time_ticks: 0,
            score: 0,
            level,
            paddle,
            balls: Vec::new(),
            items: Vec::new(),
            timers: Vec::new(),
            projectiles: Vec::new(),
            ball_cam: None,
            gravity_dir: Vec2::NEG_Y,
            next_id: 1,
            events: Vec::new(),
        };
        state.spawn_ball_on_paddle();
        log::info!(
            "New game: seed {}, {}x{} level, {} lives",
            seed,
            state.level.width(),
            state.level.height(),
            state.lives
        );
        state
    }

    /// Allocate a new entity ID
    pub fn next_entity_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn rng(&mut self) -> &mut Pcg32 {
        &mut self.rng
    }

    // === Events ===

    pub fn push_event(&mut self, event: GameEvent) {
        self.events.push(event);
    }

    /// Events not yet drained
    pub fn events(&self) -> &[GameEvent] {
        &self.events
    }

    /// Take every event queued since the last drain
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    // === Lookups ===

    pub fn ball(&self, id: u32) -> Option<&Ball> {
        self.balls.iter().find(|b| b.id == id)
    }

    pub fn ball_mut(&mut self, id: u32) -> Option<&mut Ball> {
        self.balls.iter_mut().find(|b| b.id == id)
    }

    /// Running timer for an item kind
    pub fn timer_for(&self, kind: ItemKind) -> Option<&ItemTimer> {
        self.timers.iter().find(|t| t.kind() == kind && t.is_running())
    }

    /// Either camera mode is on
    pub fn camera_active(&self) -> bool {
        self.paddle.is_camera_active() || self.ball_cam.is_some()
    }

    /// Ensure entities are sorted by ID for deterministic iteration
    pub fn normalize_order(&mut self) {
        self.balls.sort_by_key(|b| b.id);
        self.items.sort_by_key(|i| i.id);
        self.timers.sort_by_key(|t| t.id);
        self.projectiles.sort_by_key(|p| p.id);
    }

    // === Spawning ===

    pub fn spawn_ball(&mut self, ball: Ball) {
        self.push_event(GameEvent::BallSpawned { ball_id: ball.id });
        self.balls.push(ball);
    }

    /// New ball resting on the paddle
    pub fn spawn_ball_on_paddle(&mut self) -> u32 {
        let id = self.next_entity_id();
        let mut ball = Ball::new(id, self.paddle.center() + Vec2::new(0.0, 1.0));
        if let Some(old) = self.paddle.detach() {
            log::debug!("Dropping stale attachment of ball {}", old.ball_id);
        }
        self.paddle.attach_ball(&mut ball);
        self.spawn_ball(ball);
        id
    }

    pub fn spawn_item(&mut self, kind: ItemKind, at: Vec2) -> u32 {
        let id = self.next_entity_id();
        let mut item = GameItem::new(id, kind, at, self.tuning.item_descent_speed);
        item.set_camera_faded(self.camera_active());
        self.items.push(item);
        self.push_event(GameEvent::ItemSpawned { item_id: id, kind });
        id
    }

    pub fn spawn_random_item(&mut self, at: Vec2) -> u32 {
        let kind = ItemKind::ALL[self.rng.random_range(0..ItemKind::ALL.len())];
        self.spawn_item(kind, at)
    }

    pub fn spawn_projectile(&mut self, mut projectile: Projectile) {
        projectile.id = self.next_entity_id();
        self.push_event(GameEvent::ProjectileFired {
            kind: projectile.kind,
        });
        self.projectiles.push(projectile);
    }

    // === Level changes ===

    /// Score, events and item drops for changes to the grid
    pub fn apply_piece_changes(&mut self, changes: &[PieceChange], item_drops: &[Vec2]) {
        for change in changes {
            match *change {
                PieceChange::Damaged { piece_id, row, col } => {
                    self.push_event(GameEvent::PieceDamaged { piece_id, row, col });
                }
                PieceChange::Destroyed {
                    piece_id,
                    row,
                    col,
                    center,
                    points,
                } => {
                    self.score += u64::from(points);
                    self.push_event(GameEvent::PieceDestroyed {
                        piece_id,
                        row,
                        col,
                        points,
                    });
                    let chance = f64::from(self.tuning.item_drop_chance.clamp(0.0, 1.0));
                    if self.rng.random_bool(chance) {
                        self.spawn_random_item(center);
                    }
                }
                PieceChange::BombExploded { row, col } => {
                    self.push_event(GameEvent::BombExploded { row, col });
                }
                PieceChange::Removed { piece_id, row, col } => {
                    self.push_event(GameEvent::PieceRemoved { piece_id, row, col });
                }
                PieceChange::Frozen { piece_id, row, col } => {
                    self.push_event(GameEvent::PieceFrozen { piece_id, row, col });
                }
                PieceChange::Thawed {
                    piece_id,
                    row,
                    col,
                    by_fire,
                } => {
                    self.push_event(GameEvent::PieceThawed {
                        piece_id,
                        row,
                        col,
                        by_fire,
                    });
                }
            }
        }
        for &at in item_drops {
            self.spawn_random_item(at);
        }
    }

    pub fn apply_projectile_reaction(&mut self, reaction: &ProjectileReaction) {
        self.apply_piece_changes(&reaction.changes, &reaction.item_drops);
    }

    // === Shooting ===

    /// Player fire button. Releasing an attached ball takes priority over
    /// the paddle's weapons, which are tried in a fixed order.
    pub fn shoot(&mut self) {
        if let Some(attached) = self.paddle.attached() {
            self.release_attached_ball(attached.ball_id);
            return;
        }
        if self.phase != GamePhase::Playing || !self.paddle.can_fire() {
            return;
        }

        let muzzle = self.paddle.muzzle();
        let types = self.paddle.types();
        if types.contains(PaddleTypes::LASER_BEAM) {
            self.fire_laser_beam(muzzle);
        } else {
            let kind = if types.contains(PaddleTypes::LASER_BULLET) {
                ProjectileKind::PaddleLaserBullet
            } else if types.contains(PaddleTypes::MINE_LAUNCHER) {
                ProjectileKind::PaddleMine
            } else if types.contains(PaddleTypes::FLAME_BLASTER) {
                ProjectileKind::FlameBlast
            } else if types.contains(PaddleTypes::ICE_BLASTER) {
                ProjectileKind::IceBlast
            } else {
                return;
            };
            let center = muzzle + Vec2::new(0.0, kind.half_size().y);
            self.spawn_projectile(Projectile::new(kind, center, Vec2::Y * kind.speed()));
        }
        self.paddle.start_refire_delay();
    }

    pub(crate) fn release_attached_ball(&mut self, ball_id: u32) {
        let multiplier = self.tuning.release_velocity_multiplier;
        let Some(ball) = self.balls.iter_mut().find(|b| b.id == ball_id) else {
            // Attachment to a ball that no longer exists
            self.paddle.detach();
            return;
        };
        match self.paddle.fire_attached_ball(ball, multiplier, &mut self.rng) {
            Ok(Some(id)) => {
                self.push_event(GameEvent::BallReleased { ball_id: id });
                if self.phase == GamePhase::Serve {
                    self.phase = GamePhase::Playing;
                }
            }
            Ok(None) => {}
            Err(e) => log::warn!("Failed to release ball {}: {}", ball_id, e),
        }
    }

    /// Instant beam straight up; damages the first piece in its path
    fn fire_laser_beam(&mut self, muzzle: Vec2) {
        let hit = Ray::new(muzzle, Vec2::Y)
            .ok()
            .and_then(|ray| self.level.ray_cast(&ray));
        let hit_piece = hit.and_then(|(index, _)| self.level.piece_at_index(index).map(|p| p.id));
        if let Some((index, _)) = hit {
            let reaction = self
                .level
                .projectile_hit(index, ProjectileKind::PaddleLaserBullet);
            self.apply_projectile_reaction(&reaction);
        }
        self.push_event(GameEvent::LaserBeamFired { hit_piece });
    }

    // === Losing balls ===

    /// Take a ball out of play and drop every reference to it
    pub fn remove_ball(&mut self, ball_id: u32) {
        let Some(index) = self.balls.iter().position(|b| b.id == ball_id) else {
            return;
        };
        self.balls.remove(index);
        if self.paddle.attached().is_some_and(|a| a.ball_id == ball_id) {
            self.paddle.detach();
        }
        self.level.unload_ball(ball_id);
        for timer in &mut self.timers {
            timer.forget_ball(ball_id);
        }
        if self.ball_cam == Some(ball_id) {
            self.ball_cam = self.balls.first().map(|b| b.id);
        }
        self.push_event(GameEvent::BallDied { ball_id });
        log::info!("Ball {} lost, {} remaining", ball_id, self.balls.len());
    }

    /// Last ball gone: lose a life, strip every effect and serve again
    pub fn lose_life(&mut self) {
        self.lives = self.lives.saturating_sub(1);
        self.push_event(GameEvent::LifeLost { lives: self.lives });
        log::info!("Life lost, {} remaining", self.lives);

        let mut timers = std::mem::take(&mut self.timers);
        for timer in &mut timers {
            if let Some(deactivation) = timer.cancel_and_deactivate() {
                effects::deactivate(self, &deactivation);
            }
        }
        self.items.clear();
        self.projectiles.clear();

        if self.lives == 0 {
            self.phase = GamePhase::GameOver;
            self.push_event(GameEvent::GameOver);
            log::info!("Game over with score {}", self.score);
        } else {
            self.phase = GamePhase::Serve;
            self.spawn_ball_on_paddle();
        }
    }
}
