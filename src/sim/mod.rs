//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (by entity ID)
//! - No rendering or platform dependencies

pub mod ball;
pub mod collision;
pub mod effects;
pub mod events;
pub mod geometry;
pub mod item;
pub mod level;
pub mod paddle;
pub mod projectile;
pub mod state;
pub mod tick;
pub mod timer;

use rand::Rng;

pub use ball::{Ball, BallMode, BallSize, BallSpeed, BallTypes, CollisionGate};
pub use collision::{ball_ball_contact, ball_ball_response, reflect_off_surface};
pub use events::GameEvent;
pub use geometry::{Aabb, BoundingLines, Circle, LineSeg, Ray, SweptHit};
pub use item::{GameItem, ItemKind};
pub use level::{BreakableColour, Level, LevelPiece, Neighbours, PieceKind};
pub use paddle::{Paddle, PaddleSize, PaddleTypes};
pub use projectile::{Projectile, ProjectileKind};
pub use state::{GamePhase, GameState};
pub use tick::{TickInput, tick};
pub use timer::{Deactivation, ItemTimer};

/// +1 or -1 with equal odds
pub(crate) fn random_sign(rng: &mut impl Rng) -> f32 {
    if rng.random_bool(0.5) { 1.0 } else { -1.0 }
}
