//! Projectiles fired by paddle weapons and omni-laser balls

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::geometry::Aabb;
use crate::consts::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectileKind {
    PaddleLaserBullet,
    BallLaserBullet,
    PaddleMine,
    FlameBlast,
    IceBlast,
}

impl ProjectileKind {
    /// Default half extents
    pub fn half_size(self) -> Vec2 {
        match self {
            ProjectileKind::PaddleLaserBullet => Vec2::new(0.1, 0.3),
            ProjectileKind::BallLaserBullet => Vec2::new(0.08, 0.14),
            ProjectileKind::PaddleMine => Vec2::new(0.25, 0.25),
            ProjectileKind::FlameBlast | ProjectileKind::IceBlast => Vec2::new(0.35, 0.35),
        }
    }

    /// Launch speed (units/s)
    pub fn speed(self) -> f32 {
        match self {
            ProjectileKind::PaddleLaserBullet => LASER_BULLET_SPEED,
            ProjectileKind::BallLaserBullet => BALL_LASER_BULLET_SPEED,
            ProjectileKind::PaddleMine => MINE_SPEED,
            ProjectileKind::FlameBlast | ProjectileKind::IceBlast => BLAST_SPEED,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Projectile {
    /// Assigned when the projectile enters the game state
    pub id: u32,
    pub kind: ProjectileKind,
    pub center: Vec2,
    pub velocity: Vec2,
    pub half_size: Vec2,
}

impl Projectile {
    pub fn new(kind: ProjectileKind, center: Vec2, velocity: Vec2) -> Self {
        Self {
            id: 0,
            kind,
            center,
            velocity,
            half_size: kind.half_size(),
        }
    }

    pub fn with_half_size(mut self, half_size: Vec2) -> Self {
        self.half_size = half_size;
        self
    }

    pub fn tick(&mut self, dt: f32) {
        self.center += self.velocity * dt;
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_center(self.center, self.half_size)
    }

    /// Outside the level by more than `OUT_OF_BOUNDS_BUFFER`
    pub fn is_out_of_bounds(&self, level_size: Vec2) -> bool {
        let c = self.center;
        c.x < -OUT_OF_BOUNDS_BUFFER
            || c.x > level_size.x + OUT_OF_BOUNDS_BUFFER
            || c.y < Y_COORD_OF_DEATH
            || c.y > level_size.y + OUT_OF_BOUNDS_BUFFER
    }
}
