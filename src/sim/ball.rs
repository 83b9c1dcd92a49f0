//! Game ball
//!
//! A ball is a circle travelling in the level plane with a discrete speed
//! class, an animated size class and any number of simultaneously active type
//! modifiers. Per-tick flight physics depends on its current mode: free flight
//! or captured inside a cannon.

use bitflags::bitflags;
use glam::{Vec2, Vec3, Vec4};
use rand::Rng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::collision::nudge_off_horizontal;
use super::geometry::Circle;
use super::projectile::{Projectile, ProjectileKind};
use super::random_sign;
use crate::consts::*;
use crate::error::SimError;
use crate::rotate_deg;

bitflags! {
    /// Simultaneously active ball modifiers
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct BallTypes: u32 {
        const UBER = 1 << 0;
        const INVISI = 1 << 1;
        const GHOST = 1 << 2;
        const GRAVITY = 1 << 3;
        const CRAZY = 1 << 4;
        const FIRE = 1 << 5;
        const ICE = 1 << 6;
        const OMNI_LASER_BULLET = 1 << 7;
    }
}

/// Per-type colour tint, multiplied together for every active type
const BALL_TINTS: [(BallTypes, Vec3); 8] = [
    (BallTypes::UBER, Vec3::new(1.0, 0.55, 0.55)),
    (BallTypes::INVISI, Vec3::new(0.85, 0.85, 1.0)),
    (BallTypes::GHOST, Vec3::new(0.75, 1.0, 0.75)),
    (BallTypes::GRAVITY, Vec3::new(0.75, 0.75, 0.75)),
    (BallTypes::CRAZY, Vec3::new(0.8, 0.5, 1.0)),
    (BallTypes::FIRE, Vec3::new(1.0, 0.6, 0.2)),
    (BallTypes::ICE, Vec3::new(0.6, 0.85, 1.0)),
    (BallTypes::OMNI_LASER_BULLET, Vec3::new(1.0, 1.0, 0.6)),
];

/// Colour tint associated with a single ball type (white if unknown or mixed)
pub fn ball_type_tint(kind: BallTypes) -> Vec3 {
    BALL_TINTS
        .iter()
        .find(|(t, _)| *t == kind)
        .map_or(Vec3::ONE, |(_, c)| *c)
}

/// Discrete speed classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BallSpeed {
    Zero,
    Slowest,
    Slow,
    Normal,
    Fast,
    Fastest,
}

impl BallSpeed {
    const ALL: [BallSpeed; 6] = [
        BallSpeed::Zero,
        BallSpeed::Slowest,
        BallSpeed::Slow,
        BallSpeed::Normal,
        BallSpeed::Fast,
        BallSpeed::Fastest,
    ];

    pub const fn units_per_sec(self) -> f32 {
        match self {
            BallSpeed::Zero => 0.0,
            BallSpeed::Slowest => 7.0,
            BallSpeed::Slow => 12.0,
            BallSpeed::Normal => 17.0,
            BallSpeed::Fast => 22.0,
            BallSpeed::Fastest => 27.0,
        }
    }

    /// One class faster, saturating at `Fastest`
    pub fn faster(self) -> Self {
        match self {
            BallSpeed::Zero | BallSpeed::Slowest => BallSpeed::Slow,
            BallSpeed::Slow => BallSpeed::Normal,
            BallSpeed::Normal => BallSpeed::Fast,
            BallSpeed::Fast | BallSpeed::Fastest => BallSpeed::Fastest,
        }
    }

    /// One class slower, never below `Slowest` (a stopped ball stays stopped)
    pub fn slower(self) -> Self {
        match self {
            BallSpeed::Zero => BallSpeed::Zero,
            BallSpeed::Slowest | BallSpeed::Slow => BallSpeed::Slowest,
            BallSpeed::Normal => BallSpeed::Slow,
            BallSpeed::Fast => BallSpeed::Normal,
            BallSpeed::Fastest => BallSpeed::Fast,
        }
    }
}

impl TryFrom<u32> for BallSpeed {
    type Error = SimError;

    /// Speed class from its integral units-per-second value
    fn try_from(units: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|s| s.units_per_sec() as u32 == units)
            .ok_or(SimError::InvalidSpeedClass(units))
    }
}

/// Discrete size classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BallSize {
    Smallest,
    Smaller,
    Normal,
    Bigger,
    Biggest,
}

impl BallSize {
    /// Steps away from `Normal`
    fn diff(self) -> f32 {
        self as i32 as f32 - BallSize::Normal as i32 as f32
    }

    /// Target scale factor for this size class
    pub fn scale_factor(self) -> f32 {
        (DEFAULT_BALL_RADIUS + self.diff() * RADIUS_DIFF_PER_SIZE) / DEFAULT_BALL_RADIUS
    }

    pub fn bigger(self) -> Option<Self> {
        BallSize::try_from(self as u8 + 1).ok()
    }

    pub fn smaller(self) -> Option<Self> {
        (self as u8).checked_sub(1).and_then(|i| BallSize::try_from(i).ok())
    }
}

impl TryFrom<u8> for BallSize {
    type Error = SimError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        match index {
            0 => Ok(BallSize::Smallest),
            1 => Ok(BallSize::Smaller),
            2 => Ok(BallSize::Normal),
            3 => Ok(BallSize::Bigger),
            4 => Ok(BallSize::Biggest),
            _ => Err(SimError::InvalidSizeClass(index)),
        }
    }
}

/// Suppression of one category of ball collisions
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum CollisionGate {
    #[default]
    Open,
    /// Closed for the remaining seconds
    Closed { remaining: f32 },
    /// Closed until explicitly reopened
    Sealed,
}

impl CollisionGate {
    pub fn is_open(&self) -> bool {
        matches!(self, CollisionGate::Open)
    }

    /// Close for at least `secs`. Never shortens an existing closure.
    pub fn close_for(&mut self, secs: f32) {
        if secs <= 0.0 {
            return;
        }
        match self {
            CollisionGate::Open => *self = CollisionGate::Closed { remaining: secs },
            CollisionGate::Closed { remaining } => *remaining = remaining.max(secs),
            CollisionGate::Sealed => {}
        }
    }

    pub fn seal(&mut self) {
        *self = CollisionGate::Sealed;
    }

    pub fn open(&mut self) {
        *self = CollisionGate::Open;
    }

    pub fn tick(&mut self, dt: f32) {
        if let CollisionGate::Closed { remaining } = self {
            *remaining -= dt;
            if *remaining <= 0.0 {
                *self = CollisionGate::Open;
            }
        }
    }
}

/// Per-ball clocks for free flight
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlightState {
    crazy_clock: f32,
    crazy_next: f32,
    omni_clock: f32,
}

/// What drives a ball's physics this tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BallMode {
    Flying(FlightState),
    /// Held inside a cannon piece; `resume` is restored when fired
    InCannon { piece_id: u32, resume: Box<BallMode> },
}

impl Default for BallMode {
    fn default() -> Self {
        BallMode::Flying(FlightState::default())
    }
}

/// World facts a ball needs for one tick of flight
#[derive(Debug, Clone, Copy)]
pub struct BallTickContext {
    /// Unit "down" vector for gravity balls
    pub gravity_dir: Vec2,
    /// Width and height of the level
    pub level_size: Vec2,
    /// Riding a sticky paddle
    pub attached: bool,
    /// Centre of a magnet paddle, if one is active
    pub magnet_target: Option<Vec2>,
}

impl Default for BallTickContext {
    fn default() -> Self {
        Self {
            gravity_dir: Vec2::NEG_Y,
            level_size: Vec2::new(10.0 * PIECE_WIDTH, 20.0 * PIECE_HEIGHT),
            attached: false,
            magnet_target: None,
        }
    }
}

/// A game ball
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ball {
    pub id: u32,
    center: Vec2,
    /// Camera-only offset out of the level plane
    z_offset: f32,
    /// Unit length, or zero while halted on a sticky paddle
    direction: Vec2,
    speed: BallSpeed,
    /// Temporary speed on top of the speed class, decays to zero
    boost: f32,
    /// Current travel speed of a gravity ball
    gravity_speed: f32,
    size: BallSize,
    scale_factor: f32,
    types: BallTypes,
    mode: BallMode,
    pub ball_ball_gate: CollisionGate,
    pub block_gate: CollisionGate,
    pub paddle_gate: CollisionGate,
    /// Piece most recently collided with; ignored for the next level collision
    pub last_piece: Option<u32>,
    /// Portal the ball last came out of; cleared once clear of it
    pub portal_lock: Option<u32>,
    time_since_collision: f32,
    /// Remaining time a ghost ball ignores ghostable pieces
    ghost_remaining: f32,
    /// View-only spin (degrees)
    pub rotation: Vec3,
}

impl Ball {
    pub fn new(id: u32, center: Vec2) -> Self {
        Self {
            id,
            center,
            z_offset: 0.0,
            direction: Vec2::Y,
            speed: BallSpeed::Normal,
            boost: 0.0,
            gravity_speed: BallSpeed::Normal.units_per_sec(),
            size: BallSize::Normal,
            scale_factor: 1.0,
            types: BallTypes::empty(),
            mode: BallMode::default(),
            ball_ball_gate: CollisionGate::Open,
            block_gate: CollisionGate::Open,
            paddle_gate: CollisionGate::Open,
            last_piece: None,
            portal_lock: None,
            time_since_collision: 0.0,
            ghost_remaining: 0.0,
            rotation: Vec3::ZERO,
        }
    }

    /// Copy of this ball for a multiball split: same types, size and speed,
    /// fresh mode and gates
    pub fn split_copy(&self, id: u32) -> Self {
        let mut copy = self.clone();
        copy.id = id;
        copy.mode = BallMode::default();
        copy.ball_ball_gate.open();
        copy.block_gate.open();
        copy.paddle_gate.open();
        copy.last_piece = None;
        copy.portal_lock = None;
        copy.ghost_remaining = 0.0;
        copy
    }

    // === Position ===

    pub fn center(&self) -> Vec2 {
        self.center
    }

    pub fn set_center(&mut self, center: Vec2) {
        self.center = center;
    }

    pub fn center_3d(&self) -> Vec3 {
        self.center.extend(self.z_offset)
    }

    pub fn set_z_offset(&mut self, z: f32) {
        self.z_offset = z;
    }

    pub fn radius(&self) -> f32 {
        self.scale_factor * DEFAULT_BALL_RADIUS
    }

    pub fn bounds(&self) -> Circle {
        Circle::new(self.center, self.radius())
    }

    // === Direction and speed ===

    pub fn direction(&self) -> Vec2 {
        self.direction
    }

    /// Normalize and apply. Near-horizontal directions are tipped off the
    /// horizontal.
    pub fn set_direction(&mut self, dir: Vec2) -> Result<(), SimError> {
        let unit = dir
            .try_normalize()
            .ok_or(SimError::DegenerateDirection { x: dir.x, y: dir.y })?;
        self.direction = nudge_off_horizontal(unit);
        Ok(())
    }

    pub fn set_velocity(&mut self, speed: BallSpeed, dir: Vec2) -> Result<(), SimError> {
        self.set_direction(dir)?;
        self.set_speed(speed);
        Ok(())
    }

    pub fn speed_class(&self) -> BallSpeed {
        self.speed
    }

    pub fn set_speed(&mut self, speed: BallSpeed) {
        self.speed = speed;
        self.gravity_speed = speed.units_per_sec();
    }

    pub fn increase_speed(&mut self) {
        self.set_speed(self.speed.faster());
    }

    pub fn decrease_speed(&mut self) {
        self.set_speed(self.speed.slower());
    }

    /// Travel speed including any boost
    pub fn speed(&self) -> f32 {
        self.speed.units_per_sec() + self.boost
    }

    pub fn velocity(&self) -> Vec2 {
        self.direction * self.speed()
    }

    pub fn boost(&self) -> f32 {
        self.boost
    }

    /// Temporary burst of speed that decays over time
    pub fn apply_boost(&mut self, amount: f32) {
        self.boost = (self.boost + amount).max(0.0);
    }

    /// Stop moving but keep the speed class, so a release resumes at speed
    pub fn halt(&mut self) {
        self.direction = Vec2::ZERO;
        self.boost = 0.0;
    }

    pub fn is_stationary(&self) -> bool {
        self.direction == Vec2::ZERO || self.speed() == 0.0
    }

    // === Types ===

    pub fn types(&self) -> BallTypes {
        self.types
    }

    pub fn has_type(&self, kind: BallTypes) -> bool {
        self.types.contains(kind)
    }

    pub fn add_type(&mut self, kind: BallTypes) {
        self.types.insert(kind);
    }

    pub fn remove_type(&mut self, kind: BallTypes) {
        self.types.remove(kind);
    }

    pub fn remove_all_types(&mut self) {
        self.types = BallTypes::empty();
    }

    /// Product of the tints of every active type. Invisi balls are nearly transparent.
    pub fn colour(&self) -> Vec4 {
        let rgb = BALL_TINTS
            .iter()
            .filter(|(t, _)| self.types.contains(*t))
            .fold(Vec3::ONE, |acc, (_, tint)| acc * *tint);
        let alpha = if self.has_type(BallTypes::INVISI) { 0.1 } else { 1.0 };
        rgb.extend(alpha)
    }

    // === Size ===

    pub fn size(&self) -> BallSize {
        self.size
    }

    /// Current (possibly animating) scale factor
    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }

    /// Request a new size class; the radius animates toward it
    pub fn set_size(&mut self, size: BallSize) {
        self.size = size;
    }

    /// Returns false if already at the largest size
    pub fn increase_size(&mut self) -> bool {
        match self.size.bigger() {
            Some(s) => {
                self.size = s;
                true
            }
            None => false,
        }
    }

    /// Returns false if already at the smallest size
    pub fn decrease_size(&mut self) -> bool {
        match self.size.smaller() {
            Some(s) => {
                self.size = s;
                true
            }
            None => false,
        }
    }

    /// Snap the scale immediately, skipping animation
    pub fn set_scale_factor(&mut self, factor: f32) -> Result<(), SimError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(SimError::InvalidScaleFactor(factor));
        }
        self.scale_factor = factor;
        Ok(())
    }

    fn animate_size(&mut self, dt: f32) {
        let target = self.size.scale_factor();
        let diff = target - self.scale_factor;
        if diff == 0.0 {
            return;
        }
        let step = (RADIUS_DIFF_PER_SIZE / DEFAULT_BALL_RADIUS) * dt / BALL_SECONDS_TO_CHANGE_SIZE;
        if diff.abs() <= step {
            self.scale_factor = target;
        } else {
            self.scale_factor += step * diff.signum();
        }
    }

    // === Collision bookkeeping ===

    pub fn time_since_last_collision(&self) -> f32 {
        self.time_since_collision
    }

    pub fn mark_collision(&mut self) {
        self.time_since_collision = 0.0;
    }

    /// Slipped through a block: ignore ghostable pieces for a while
    pub fn start_ghosting(&mut self) {
        self.ghost_remaining = GHOST_MODE_SECS;
    }

    pub fn is_ghosting(&self) -> bool {
        self.ghost_remaining > 0.0 && self.has_type(BallTypes::GHOST)
    }

    // === Cannon ===

    pub fn mode(&self) -> &BallMode {
        &self.mode
    }

    pub fn is_loaded_in_cannon(&self) -> bool {
        matches!(self.mode, BallMode::InCannon { .. })
    }

    pub fn cannon_piece(&self) -> Option<u32> {
        match self.mode {
            BallMode::InCannon { piece_id, .. } => Some(piece_id),
            BallMode::Flying(_) => None,
        }
    }

    /// Capture the ball inside a cannon, keeping its current mode for later
    pub fn load_into_cannon(&mut self, piece_id: u32, cannon_center: Vec2) {
        if self.is_loaded_in_cannon() {
            return;
        }
        let previous = std::mem::take(&mut self.mode);
        self.mode = BallMode::InCannon {
            piece_id,
            resume: Box::new(previous),
        };
        self.center = cannon_center;
        self.ball_ball_gate.seal();
        self.block_gate.seal();
        self.last_piece = Some(piece_id);
    }

    /// Fire out of the barrel along `dir` and restore the pre-capture mode
    pub fn fire_from_cannon(&mut self, cannon_center: Vec2, dir: Vec2) -> Result<(), SimError> {
        let dir = dir
            .try_normalize()
            .ok_or(SimError::DegenerateDirection { x: dir.x, y: dir.y })?;
        match std::mem::take(&mut self.mode) {
            BallMode::InCannon { resume, .. } => self.mode = *resume,
            flying => {
                self.mode = flying;
                return Ok(());
            }
        }
        self.direction = nudge_off_horizontal(dir);
        self.center = cannon_center + dir * CANNON_HALF_BARREL_LENGTH;
        self.ball_ball_gate.open();
        self.block_gate.open();
        self.mark_collision();
        Ok(())
    }

    // === Simulation ===

    /// Advance one tick. Returns any projectiles the ball spawned.
    pub fn tick(&mut self, dt: f32, ctx: &BallTickContext, rng: &mut Pcg32) -> Vec<Projectile> {
        self.time_since_collision += dt;
        self.ghost_remaining = (self.ghost_remaining - dt).max(0.0);
        self.ball_ball_gate.tick(dt);
        self.block_gate.tick(dt);
        self.paddle_gate.tick(dt);
        self.animate_size(dt);
        self.rotation += Vec3::splat(MAX_ROTATION_DEG_PER_SEC * dt);

        let mut mode = std::mem::take(&mut self.mode);
        let spawned = match &mut mode {
            BallMode::Flying(flight) => self.fly(dt, flight, ctx, rng),
            BallMode::InCannon { .. } => Vec::new(),
        };
        self.mode = mode;
        spawned
    }

    fn fly(
        &mut self,
        dt: f32,
        flight: &mut FlightState,
        ctx: &BallTickContext,
        rng: &mut Pcg32,
    ) -> Vec<Projectile> {
        if let Some(target) = ctx.magnet_target {
            self.steer_toward(dt, target);
        }

        let velocity = if self.boost > 0.0 {
            self.boost -= (BOOST_DECELERATION * dt).min(self.boost);
            self.gravity_speed = self.speed();
            self.velocity()
        } else {
            if self.has_type(BallTypes::CRAZY) {
                self.perturb_crazy(dt, flight, ctx, rng);
            }
            if self.has_type(BallTypes::GRAVITY) && !ctx.attached && !self.is_stationary() {
                self.gravity_velocity(dt, ctx.gravity_dir)
            } else {
                self.gravity_speed = self.speed.units_per_sec();
                self.velocity()
            }
        };

        self.center += velocity * dt;

        if self.has_type(BallTypes::OMNI_LASER_BULLET) {
            self.fire_omni_bullets(dt, flight, rng)
        } else {
            flight.omni_clock = 0.0;
            Vec::new()
        }
    }

    /// Velocity of a gravity ball. The component along gravity accelerates
    /// until it passes the nominal speed, then is held at nominal.
    fn gravity_velocity(&mut self, dt: f32, gravity_dir: Vec2) -> Vec2 {
        let nominal = self.speed.units_per_sec();
        let g = gravity_dir.try_normalize().unwrap_or(Vec2::NEG_Y);
        let current = self.direction * self.gravity_speed;
        let projected = current.dot(g);

        let velocity = if projected > nominal {
            current - g * projected + g * nominal
        } else {
            current + g * (GRAVITY_ACCELERATION * dt)
        };

        if let Some(dir) = velocity.try_normalize() {
            self.direction = dir;
            self.gravity_speed = velocity.length();
        }
        velocity
    }

    /// Random direction change at random intervals, only once the ball has
    /// gone a while without hitting anything
    fn perturb_crazy(
        &mut self,
        dt: f32,
        flight: &mut FlightState,
        ctx: &BallTickContext,
        rng: &mut Pcg32,
    ) {
        if self.is_stationary() || ctx.attached {
            flight.crazy_clock = 0.0;
            flight.crazy_next = 1.5;
            return;
        }

        flight.crazy_clock += dt;
        if flight.crazy_clock < flight.crazy_next
            || self.time_since_collision <= CRAZY_WAIT_SINCE_COLLISION_SECS
        {
            return;
        }
        flight.crazy_clock = 0.0;
        flight.crazy_next = 1.0 + rng.random::<f32>() * 2.0;

        let sign = random_sign(rng);
        let c = self.center;
        // Outside the level (other than below): head back in
        let inward = if c.y > ctx.level_size.y {
            Some(Vec2::NEG_Y)
        } else if c.x < 0.0 {
            Some(Vec2::X)
        } else if c.x > ctx.level_size.x {
            Some(Vec2::NEG_X)
        } else {
            None
        };

        let new_dir = match inward {
            Some(v) => rotate_deg(v, sign * rng.random::<f32>() * 45.0),
            None => rotate_deg(self.direction, sign * (45.0 + rng.random::<f32>() * 115.0)),
        };
        self.direction = nudge_off_horizontal(new_dir.normalize_or(self.direction));
        log::debug!("Crazy ball {} changed direction", self.id);
    }

    fn fire_omni_bullets(
        &mut self,
        dt: f32,
        flight: &mut FlightState,
        rng: &mut Pcg32,
    ) -> Vec<Projectile> {
        if flight.omni_clock < OMNI_BULLET_WAIT_SECS {
            flight.omni_clock += dt;
            return Vec::new();
        }
        flight.omni_clock = 0.0;

        let count = rng.random_range(0..=MAX_OMNI_BULLETS);
        let radius = self.radius();
        (0..count)
            .map(|_| {
                let dir = rotate_deg(Vec2::Y, rng.random_range(0.0..360.0));
                let width = radius * 0.25 + rng.random::<f32>() * 0.75 * radius;
                let height = 1.75 * width;
                Projectile::new(
                    ProjectileKind::BallLaserBullet,
                    self.center + dir * (radius + height * 0.5),
                    dir * BALL_LASER_BULLET_SPEED + self.velocity(),
                )
                .with_half_size(Vec2::new(width * 0.5, height * 0.5))
            })
            .collect()
    }

    /// Magnet paddle pull: turn a descending ball toward `target`
    fn steer_toward(&mut self, dt: f32, target: Vec2) {
        if self.direction.y >= 0.0 || self.center.y <= target.y {
            return;
        }
        let Some(desired) = (target - self.center).try_normalize() else {
            return;
        };
        let signed = self
            .direction
            .perp_dot(desired)
            .atan2(self.direction.dot(desired));
        let max = (MAGNET_DEG_PER_SEC * dt).to_radians();
        let turned = Vec2::from_angle(signed.clamp(-max, max)).rotate(self.direction);
        self.direction = nudge_off_horizontal(turned.normalize_or(self.direction));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angle_between_deg;
    use rand::SeedableRng;

    fn rng() -> Pcg32 {
        Pcg32::seed_from_u64(7)
    }

    #[test]
    fn test_horizontal_velocity_is_nudged_upward() {
        let mut ball = Ball::new(1, Vec2::ZERO);
        ball.set_velocity(BallSpeed::Normal, Vec2::X).unwrap();
        let d = ball.direction();
        assert!(d.y > 0.0);
        assert!((d.length() - 1.0).abs() < 1e-5);

        // It keeps climbing rather than travelling flat
        let y0 = ball.center().y;
        ball.tick(1.0, &BallTickContext::default(), &mut rng());
        assert!(ball.center().y > y0);
    }

    #[test]
    fn test_degenerate_direction_rejected() {
        let mut ball = Ball::new(1, Vec2::ZERO);
        let before = ball.direction();
        assert!(matches!(
            ball.set_direction(Vec2::ZERO),
            Err(SimError::DegenerateDirection { .. })
        ));
        assert!(ball.set_direction(Vec2::new(f32::NAN, 1.0)).is_err());
        assert_eq!(ball.direction(), before);
    }

    #[test]
    fn test_invalid_scale_rejected() {
        let mut ball = Ball::new(1, Vec2::ZERO);
        assert!(ball.set_scale_factor(0.0).is_err());
        assert!(ball.set_scale_factor(-1.0).is_err());
        assert!(ball.set_scale_factor(f32::INFINITY).is_err());
        ball.set_scale_factor(1.5).unwrap();
        assert!((ball.radius() - 1.5 * DEFAULT_BALL_RADIUS).abs() < 1e-6);
    }

    #[test]
    fn test_size_change_animates() {
        let mut ball = Ball::new(1, Vec2::ZERO);
        ball.halt();
        assert!(ball.increase_size());
        let target = BallSize::Bigger.scale_factor();

        ball.tick(BALL_SECONDS_TO_CHANGE_SIZE / 2.0, &BallTickContext::default(), &mut rng());
        let mid = ball.scale_factor();
        assert!(mid > 1.0 && mid < target);
        assert!((ball.radius() - mid * DEFAULT_BALL_RADIUS).abs() < 1e-6);

        ball.tick(BALL_SECONDS_TO_CHANGE_SIZE, &BallTickContext::default(), &mut rng());
        assert_eq!(ball.scale_factor(), target);
    }

    #[test]
    fn test_size_classes_saturate() {
        let mut ball = Ball::new(1, Vec2::ZERO);
        assert!(ball.increase_size());
        assert!(ball.increase_size());
        assert!(!ball.increase_size());
        assert_eq!(ball.size(), BallSize::Biggest);
        assert!(BallSize::Smallest.scale_factor() > 0.0);
        assert!(BallSize::try_from(5).is_err());
    }

    #[test]
    fn test_speed_classes() {
        assert_eq!(BallSpeed::Fastest.faster(), BallSpeed::Fastest);
        assert_eq!(BallSpeed::Slowest.slower(), BallSpeed::Slowest);
        assert_eq!(BallSpeed::Zero.slower(), BallSpeed::Zero);
        assert_eq!(BallSpeed::try_from(17).unwrap(), BallSpeed::Normal);
        assert!(matches!(
            BallSpeed::try_from(18),
            Err(SimError::InvalidSpeedClass(18))
        ));
    }

    #[test]
    fn test_halt_keeps_speed() {
        let mut ball = Ball::new(1, Vec2::ZERO);
        ball.set_speed(BallSpeed::Fast);
        ball.halt();
        assert!(ball.is_stationary());
        assert_eq!(ball.speed_class(), BallSpeed::Fast);
        let start = ball.center();
        ball.tick(0.5, &BallTickContext::default(), &mut rng());
        assert_eq!(ball.center(), start);
    }

    #[test]
    fn test_collision_gates() {
        let mut gate = CollisionGate::Open;
        gate.close_for(0.2);
        assert!(!gate.is_open());
        gate.close_for(0.1);
        gate.tick(0.15);
        assert!(!gate.is_open());
        gate.tick(0.1);
        assert!(gate.is_open());

        gate.seal();
        gate.tick(100.0);
        gate.close_for(1.0);
        assert_eq!(gate, CollisionGate::Sealed);
    }

    #[test]
    fn test_cannon_saves_and_restores_mode() {
        let mut ball = Ball::new(1, Vec2::ZERO);
        ball.tick(0.1, &BallTickContext::default(), &mut rng());
        let mode_before = ball.mode().clone();

        ball.load_into_cannon(42, Vec2::new(3.0, 3.0));
        assert!(ball.is_loaded_in_cannon());
        assert_eq!(ball.cannon_piece(), Some(42));
        assert_eq!(ball.center(), Vec2::new(3.0, 3.0));
        assert_eq!(ball.block_gate, CollisionGate::Sealed);

        // No movement while held
        ball.tick(1.0, &BallTickContext::default(), &mut rng());
        assert_eq!(ball.center(), Vec2::new(3.0, 3.0));

        ball.fire_from_cannon(Vec2::new(3.0, 3.0), Vec2::new(0.0, 1.0)).unwrap();
        assert!(!ball.is_loaded_in_cannon());
        assert_eq!(ball.mode(), &mode_before);
        assert!(ball.block_gate.is_open());
        assert!((ball.center() - Vec2::new(3.0, 3.0 + CANNON_HALF_BARREL_LENGTH)).length() < 1e-5);
    }

    #[test]
    fn test_gravity_ball_falls() {
        let mut ball = Ball::new(1, Vec2::new(5.0, 10.0));
        ball.add_type(BallTypes::GRAVITY);
        ball.set_direction(Vec2::new(1.0, 0.2)).unwrap();
        let ctx = BallTickContext::default();
        let mut r = rng();
        for _ in 0..240 {
            ball.tick(SIM_DT, &ctx, &mut r);
            // Speed along gravity never runs away past nominal plus one step of acceleration
            let along = (ball.direction() * ball.gravity_speed).dot(Vec2::NEG_Y);
            assert!(along <= BallSpeed::Normal.units_per_sec() + GRAVITY_ACCELERATION * SIM_DT + 1e-3);
        }
        assert!(ball.direction().y < 0.0);
    }

    #[test]
    fn test_crazy_clock_is_per_ball() {
        let ctx = BallTickContext::default();
        let mut r = rng();
        let mut a = Ball::new(1, Vec2::new(5.0, 5.0));
        let mut b = Ball::new(2, Vec2::new(6.0, 5.0));
        for (ball, clock) in [(&mut a, 1.45), (&mut b, 0.0)] {
            ball.add_type(BallTypes::CRAZY);
            // Both long past their last collision
            ball.time_since_collision = 10.0;
            ball.mode = BallMode::Flying(FlightState {
                crazy_clock: clock,
                crazy_next: 1.5,
                omni_clock: 0.0,
            });
        }

        // Exact binary step so `b` reaches its 1.5s deadline on tick 12
        let dt = 0.125;
        let mut a_changes = Vec::new();
        let mut b_changes = Vec::new();
        for n in 1..=12 {
            let (a_before, b_before) = (a.direction(), b.direction());
            a.tick(dt, &ctx, &mut r);
            b.tick(dt, &ctx, &mut r);
            if a.direction() != a_before {
                a_changes.push(n);
            }
            if b.direction() != b_before {
                b_changes.push(n);
            }
        }

        assert_eq!(a_changes.first(), Some(&1));
        assert_eq!(b_changes, vec![12]);
        // `a` reset its own clock; its next change waits at least a second
        assert!(a_changes.get(1).is_none_or(|&n| n >= 9));
    }

    #[test]
    fn test_omni_ball_fires_bounded_bullets() {
        let mut ball = Ball::new(1, Vec2::new(5.0, 5.0));
        ball.add_type(BallTypes::OMNI_LASER_BULLET);
        let ctx = BallTickContext::default();
        let mut r = rng();
        let mut total = 0;
        for _ in 0..100 {
            let spawned = ball.tick(0.1, &ctx, &mut r);
            assert!(spawned.len() <= MAX_OMNI_BULLETS as usize);
            for p in &spawned {
                assert_eq!(p.kind, ProjectileKind::BallLaserBullet);
                assert!(p.half_size.y > p.half_size.x);
            }
            total += spawned.len();
        }
        assert!(total > 0);
    }

    #[test]
    fn test_boost_decays() {
        let mut ball = Ball::new(1, Vec2::ZERO);
        ball.apply_boost(BOOST_TEMP_SPEED_INCREASE);
        assert!(ball.speed() > BallSpeed::Normal.units_per_sec());
        ball.tick(BOOST_TEMP_SPEED_INCREASE / BOOST_DECELERATION + 0.1, &BallTickContext::default(), &mut rng());
        assert_eq!(ball.boost(), 0.0);
    }

    #[test]
    fn test_magnet_turns_descending_ball() {
        let mut ball = Ball::new(1, Vec2::new(0.0, 10.0));
        ball.set_direction(Vec2::new(1.0, -1.0)).unwrap();
        let target = Vec2::new(0.0, 0.0);
        let ctx = BallTickContext {
            magnet_target: Some(target),
            ..Default::default()
        };
        ball.tick(0.1, &ctx, &mut rng());
        // Turned 8 degrees toward straight down
        let turned = angle_between_deg(ball.direction(), Vec2::NEG_Y);
        assert!((turned - (45.0 - MAGNET_DEG_PER_SEC * 0.1)).abs() < 1e-2);
    }

    #[test]
    fn test_split_copy_keeps_types() {
        let mut ball = Ball::new(1, Vec2::ZERO);
        ball.add_type(BallTypes::FIRE | BallTypes::GHOST);
        ball.load_into_cannon(3, Vec2::ZERO);
        let copy = ball.split_copy(9);
        assert_eq!(copy.id, 9);
        assert_eq!(copy.types(), ball.types());
        assert!(!copy.is_loaded_in_cannon());
        assert!(copy.block_gate.is_open());
    }

    #[test]
    fn test_colour_multiplies_tints() {
        let mut ball = Ball::new(1, Vec2::ZERO);
        assert_eq!(ball.colour(), Vec4::ONE);
        ball.add_type(BallTypes::FIRE | BallTypes::ICE);
        let expected = ball_type_tint(BallTypes::FIRE) * ball_type_tint(BallTypes::ICE);
        assert!((ball.colour().truncate() - expected).length() < 1e-6);
        assert_eq!(ball_type_tint(BallTypes::FIRE | BallTypes::ICE), Vec3::ONE);
    }
}
