//! Player paddle
//!
//! Horizontal movement within the level, size classes with animated width,
//! collision outline (trapezoid normally, flattened toward the bottom while the
//! paddle camera is active) and the sticky-paddle attach/release mechanic.

use std::collections::VecDeque;

use bitflags::bitflags;
use glam::Vec2;
use rand::Rng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::ball::Ball;
use super::collision::reflect_off_surface;
use super::geometry::{Aabb, BoundingLines, Circle, LineSeg};
use crate::consts::*;
use crate::error::SimError;
use crate::{angle_between_deg, rotate_deg};

bitflags! {
    /// Simultaneously active paddle modifiers
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct PaddleTypes: u32 {
        const STICKY = 1 << 0;
        const LASER_BULLET = 1 << 1;
        const LASER_BEAM = 1 << 2;
        const MAGNET = 1 << 3;
        const MINE_LAUNCHER = 1 << 4;
        const FLAME_BLASTER = 1 << 5;
        const ICE_BLASTER = 1 << 6;
        const INVISI = 1 << 7;
        const POISON = 1 << 8;
    }
}

/// Discrete paddle width classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PaddleSize {
    Smallest,
    Smaller,
    Normal,
    Bigger,
    Biggest,
}

impl PaddleSize {
    pub fn scale_factor(self) -> f32 {
        let diff = self as i32 as f32 - PaddleSize::Normal as i32 as f32;
        (PADDLE_WIDTH_TOTAL + diff * PADDLE_WIDTH_DIFF_PER_SIZE) / PADDLE_WIDTH_TOTAL
    }

    pub fn bigger(self) -> Option<Self> {
        PaddleSize::try_from(self as u8 + 1).ok()
    }

    pub fn smaller(self) -> Option<Self> {
        (self as u8).checked_sub(1).and_then(|i| PaddleSize::try_from(i).ok())
    }
}

impl TryFrom<u8> for PaddleSize {
    type Error = SimError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        match index {
            0 => Ok(PaddleSize::Smallest),
            1 => Ok(PaddleSize::Smaller),
            2 => Ok(PaddleSize::Normal),
            3 => Ok(PaddleSize::Bigger),
            4 => Ok(PaddleSize::Biggest),
            _ => Err(SimError::InvalidSizeClass(index)),
        }
    }
}

/// A ball riding a sticky paddle, offset from the paddle centre
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttachedBall {
    pub ball_id: u32,
    pub offset: Vec2,
    pub radius: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paddle {
    center: Vec2,
    size: PaddleSize,
    scale_factor: f32,
    /// Scale the width animates toward
    target_scale: f32,
    half_width: f32,
    half_height: f32,
    types: PaddleTypes,
    camera_active: bool,
    /// Collision outline relative to `center`
    local_bounds: BoundingLines,
    min_x: f32,
    max_x: f32,
    /// Velocity set by input for the next tick only
    pending_velocity: f32,
    recent_velocities: VecDeque<f32>,
    attached: Option<AttachedBall>,
    refire_cooldown: f32,
}

impl Paddle {
    /// Paddle resting on `y` between the given horizontal level bounds
    pub fn new(min_x: f32, max_x: f32, y: f32) -> Self {
        let mut paddle = Self {
            center: Vec2::new((min_x + max_x) * 0.5, y),
            size: PaddleSize::Normal,
            scale_factor: 1.0,
            target_scale: 1.0,
            half_width: PADDLE_HALF_WIDTH,
            half_height: PADDLE_HALF_HEIGHT,
            types: PaddleTypes::empty(),
            camera_active: false,
            local_bounds: BoundingLines::new(),
            min_x,
            max_x,
            pending_velocity: 0.0,
            recent_velocities: VecDeque::with_capacity(PADDLE_AVG_OVER_TICKS),
            attached: None,
            refire_cooldown: 0.0,
        };
        paddle.rebuild_bounds();
        paddle
    }

    // === Geometry ===

    pub fn center(&self) -> Vec2 {
        self.center
    }

    pub fn half_width(&self) -> f32 {
        self.half_width
    }

    pub fn half_height(&self) -> f32 {
        self.half_height
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_center(self.center, Vec2::new(self.half_width, self.half_height))
    }

    /// Collision outline in world space
    pub fn world_bounds(&self) -> BoundingLines {
        self.local_bounds.translated(self.center)
    }

    /// Collision outline relative to the paddle centre
    pub fn local_bounds(&self) -> &BoundingLines {
        &self.local_bounds
    }

    /// Top of the collision outline, in world space
    pub fn top_y(&self) -> f32 {
        self.center.y + self.collision_top()
    }

    fn collision_top(&self) -> f32 {
        if self.camera_active {
            -self.half_height + PADDLE_CAM_COLLISION_HEIGHT_FRACTION * 2.0 * self.half_height
        } else {
            self.half_height
        }
    }

    /// Apply a width scale and rebuild the collision outline. The scale
    /// holds until the next size class change.
    pub fn set_dimensions(&mut self, scale: f32) -> Result<(), SimError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(SimError::InvalidScaleFactor(scale));
        }
        self.scale_factor = scale;
        self.target_scale = scale;
        self.rebuild_bounds();
        Ok(())
    }

    pub fn is_camera_active(&self) -> bool {
        self.camera_active
    }

    pub fn set_camera_active(&mut self, active: bool) {
        if self.camera_active != active {
            self.camera_active = active;
            self.rebuild_bounds();
        }
    }

    fn rebuild_bounds(&mut self) {
        let hw = PADDLE_HALF_WIDTH * self.scale_factor;
        let hh = PADDLE_HALF_HEIGHT;
        self.half_width = hw;
        self.half_height = hh;
        self.local_bounds.clear();

        if self.camera_active {
            // Flat box squashed toward the bottom edge
            let top = self.collision_top();
            self.local_bounds.push(
                LineSeg::new(Vec2::new(-hw, top), Vec2::new(hw, top)),
                Vec2::Y,
            );
            self.local_bounds.push(
                LineSeg::new(Vec2::new(-hw, -hh), Vec2::new(-hw, top)),
                Vec2::NEG_X,
            );
            self.local_bounds.push(
                LineSeg::new(Vec2::new(hw, -hh), Vec2::new(hw, top)),
                Vec2::X,
            );
        } else {
            // Flat top, angled shoulders, short vertical sides
            let flat = PADDLE_WIDTH_FLAT_TOP * 0.5 * self.scale_factor;
            let shoulder = hw - flat;
            self.local_bounds.push(
                LineSeg::new(Vec2::new(-flat, hh), Vec2::new(flat, hh)),
                Vec2::Y,
            );
            self.local_bounds.push(
                LineSeg::new(Vec2::new(-hw, 0.0), Vec2::new(-flat, hh)),
                Vec2::new(-hh, shoulder),
            );
            self.local_bounds.push(
                LineSeg::new(Vec2::new(flat, hh), Vec2::new(hw, 0.0)),
                Vec2::new(hh, shoulder),
            );
            self.local_bounds.push(
                LineSeg::new(Vec2::new(-hw, -hh), Vec2::new(-hw, 0.0)),
                Vec2::NEG_X,
            );
            self.local_bounds.push(
                LineSeg::new(Vec2::new(hw, -hh), Vec2::new(hw, 0.0)),
                Vec2::X,
            );
        }
        self.local_bounds.push(
            LineSeg::new(Vec2::new(-hw, -hh), Vec2::new(hw, -hh)),
            Vec2::NEG_Y,
        );
    }

    // === Size ===

    pub fn size(&self) -> PaddleSize {
        self.size
    }

    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }

    pub fn increase_size(&mut self) -> bool {
        match self.size.bigger() {
            Some(s) => {
                self.size = s;
                self.target_scale = s.scale_factor();
                true
            }
            None => false,
        }
    }

    pub fn decrease_size(&mut self) -> bool {
        match self.size.smaller() {
            Some(s) => {
                self.size = s;
                self.target_scale = s.scale_factor();
                true
            }
            None => false,
        }
    }

    fn animate_size(&mut self, dt: f32) {
        let target = self.target_scale;
        let diff = target - self.scale_factor;
        if diff == 0.0 {
            return;
        }
        let step = (PADDLE_WIDTH_DIFF_PER_SIZE / PADDLE_WIDTH_TOTAL) * dt / PADDLE_SECONDS_TO_CHANGE_SIZE;
        self.scale_factor = if diff.abs() <= step {
            target
        } else {
            self.scale_factor + step * diff.signum()
        };
        self.rebuild_bounds();
    }

    // === Types ===

    pub fn types(&self) -> PaddleTypes {
        self.types
    }

    pub fn has_type(&self, kind: PaddleTypes) -> bool {
        self.types.contains(kind)
    }

    pub fn add_type(&mut self, kind: PaddleTypes) {
        self.types.insert(kind);
    }

    pub fn remove_type(&mut self, kind: PaddleTypes) {
        self.types.remove(kind);
    }

    pub fn remove_all_types(&mut self) {
        self.types = PaddleTypes::empty();
    }

    pub fn alpha(&self) -> f32 {
        if self.has_type(PaddleTypes::INVISI) { 0.1 } else { 1.0 }
    }

    // === Movement ===

    pub fn set_level_bounds(&mut self, min_x: f32, max_x: f32) {
        self.min_x = min_x;
        self.max_x = max_x;
    }

    /// Instantaneous velocity from input, consumed by the next tick
    pub fn set_velocity_x(&mut self, velocity: f32) {
        self.pending_velocity = velocity;
    }

    pub fn max_speed(&self) -> f32 {
        if self.has_type(PaddleTypes::POISON) {
            PADDLE_MAX_SPEED * 0.5
        } else {
            PADDLE_MAX_SPEED
        }
    }

    /// Mean velocity over the last few ticks
    pub fn average_velocity(&self) -> f32 {
        if self.recent_velocities.is_empty() {
            return 0.0;
        }
        self.recent_velocities.iter().sum::<f32>() / self.recent_velocities.len() as f32
    }

    pub fn tick(&mut self, dt: f32) {
        self.animate_size(dt);
        self.refire_cooldown = (self.refire_cooldown - dt).max(0.0);

        let max = self.max_speed();
        let velocity = self.pending_velocity.clamp(-max, max);
        self.pending_velocity = 0.0;

        let old_x = self.center.x;
        let (left, right) = self.horizontal_extents();
        let lo = self.min_x + left;
        let hi = self.max_x - right;
        self.center.x = if lo > hi {
            (lo + hi) * 0.5
        } else {
            (old_x + velocity * dt).clamp(lo, hi)
        };

        let actual = if dt > 0.0 { (self.center.x - old_x) / dt } else { 0.0 };
        if self.recent_velocities.len() == PADDLE_AVG_OVER_TICKS {
            self.recent_velocities.pop_front();
        }
        self.recent_velocities.push_back(actual);
    }

    /// Left and right reach from the centre, including any attached ball
    /// hanging past the paddle edge
    fn horizontal_extents(&self) -> (f32, f32) {
        let hw = self.half_width;
        match self.attached {
            Some(a) => (
                hw.max(a.radius - a.offset.x),
                hw.max(a.offset.x + a.radius),
            ),
            None => (hw, hw),
        }
    }

    // === Sticky paddle ===

    pub fn attached(&self) -> Option<AttachedBall> {
        self.attached
    }

    pub fn has_attached_ball(&self) -> bool {
        self.attached.is_some()
    }

    /// World position an attached ball should be at
    pub fn attached_ball_center(&self) -> Option<Vec2> {
        self.attached.map(|a| self.center + a.offset)
    }

    /// Catch a ball and rest it on top of the collision outline. Only one ball
    /// may be attached at a time.
    pub fn attach_ball(&mut self, ball: &mut Ball) -> bool {
        if self.attached.is_some() {
            return false;
        }

        let r = ball.radius();
        let x = ball.center().x.clamp(
            self.center.x - self.half_width,
            self.center.x + self.half_width,
        );
        // Drop the ball straight onto the outline from above
        let drop_from = Vec2::new(x, self.top_y() + r + 1.0);
        let fall = Vec2::new(0.0, -(2.0 + 2.0 * self.half_height + r));
        let rest = self
            .world_bounds()
            .collide(&Circle::new(drop_from, r), fall)
            .map_or(Vec2::new(x, self.top_y() + r), |hit| hit.contact_center);

        ball.set_center(rest);
        ball.halt();
        ball.paddle_gate.seal();
        self.attached = Some(AttachedBall {
            ball_id: ball.id,
            offset: rest - self.center,
            radius: r,
        });
        true
    }

    /// Release the attached ball upward, flung by the paddle's recent motion
    /// with a little random spread. Returns the released ball's id.
    pub fn fire_attached_ball(
        &mut self,
        ball: &mut Ball,
        velocity_multiplier: f32,
        rng: &mut Pcg32,
    ) -> Result<Option<u32>, SimError> {
        let Some(attached) = self.attached else {
            return Ok(None);
        };
        if attached.ball_id != ball.id {
            return Ok(None);
        }

        let avg = self.average_velocity();
        let base = Vec2::Y + Vec2::new(avg * velocity_multiplier, 0.0);
        let max_jitter = if avg.abs() < 1e-3 {
            STILL_RAND_RELEASE_DEG
        } else {
            MOVING_RAND_RELEASE_DEG
        };
        let jitter = rng.random_range(-max_jitter..=max_jitter);
        ball.set_direction(rotate_deg(base, jitter))?;

        self.attached = None;
        ball.paddle_gate.open();
        ball.paddle_gate.close_for(PADDLE_HIT_GATE_SECS);
        ball.mark_collision();
        Ok(Some(attached.ball_id))
    }

    /// Drop the attachment without firing (ball lost or removed)
    pub fn detach(&mut self) -> Option<AttachedBall> {
        self.attached.take()
    }

    /// Direction for a ball bouncing off the paddle: surface reflection with
    /// a sideways push from the paddle's motion. Anything off the top or sides
    /// leaves at least `MIN_BALL_ANGLE_DEGS` above the paddle's line.
    pub fn deflect(&self, dir: Vec2, normal: Vec2) -> Vec2 {
        let reflected = reflect_off_surface(dir, normal);
        let pushed = reflected + Vec2::new(self.average_velocity() * PADDLE_VELOCITY_INFLUENCE, 0.0);
        let out = pushed.normalize_or(reflected);
        if normal.y < 0.0 || angle_between_deg(out, Vec2::Y) <= 90.0 - MIN_BALL_ANGLE_DEGS {
            return out;
        }
        let side = if out.x < 0.0 { Vec2::NEG_X } else { Vec2::X };
        rotate_deg(side, side.x * MIN_BALL_ANGLE_DEGS)
    }

    // === Weapons ===

    pub fn can_fire(&self) -> bool {
        self.refire_cooldown <= 0.0
    }

    pub fn start_refire_delay(&mut self) {
        self.refire_cooldown = PADDLE_REFIRE_DELAY_SECS;
    }

    /// Muzzle position on top of the paddle
    pub fn muzzle(&self) -> Vec2 {
        Vec2::new(self.center.x, self.center.y + self.half_height)
    }
}
