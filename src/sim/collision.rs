//! Collision response
//!
//! Reflection with the minimum-angle rules that keep a ball from skimming a
//! surface or bouncing straight back along the normal, plus ball-ball contact.

use glam::Vec2;

use super::geometry::Circle;
use crate::angle_between_deg;
use crate::consts::*;

/// Reflect velocity off a surface with the given unit normal
#[inline]
pub fn reflect_velocity(vel: Vec2, normal: Vec2) -> Vec2 {
    vel - 2.0 * vel.dot(normal) * normal
}

/// Rotate a unit direction so it is never closer than
/// `MIN_HORIZONTAL_ANGLE_DEGS` to horizontal. Signs of both components are
/// kept; an exactly horizontal direction is tipped upward.
pub fn nudge_off_horizontal(dir: Vec2) -> Vec2 {
    let min_rad = MIN_HORIZONTAL_ANGLE_DEGS.to_radians();
    if dir.y.abs() >= min_rad.sin() {
        return dir;
    }
    let x_sign = if dir.x < 0.0 { -1.0 } else { 1.0 };
    let y_sign = if dir.y < 0.0 { -1.0 } else { 1.0 };
    Vec2::new(x_sign * min_rad.cos(), y_sign * min_rad.sin())
}

/// Clamp an outgoing unit direction so its angle to `normal` lies in
/// `[MIN_BALL_ANGLE_DEGS, 90 - MIN_SURFACE_ANGLE_DEGS]`.
///
/// The tangential side of the direction is preserved. A direction exactly on
/// the normal is turned toward the normal's left-hand tangent.
pub fn clamp_to_surface_angles(dir: Vec2, normal: Vec2) -> Vec2 {
    let (Some(dir), Some(n)) = (dir.try_normalize(), normal.try_normalize()) else {
        return dir;
    };
    if dir.dot(n) < 0.0 {
        // Still heading into the surface
        return dir;
    }

    let angle = angle_between_deg(n, dir);
    let clamped = angle.clamp(MIN_BALL_ANGLE_DEGS, 90.0 - MIN_SURFACE_ANGLE_DEGS);
    if (clamped - angle).abs() <= 1e-4 {
        return dir;
    }

    let tangent = n.perp();
    let side = if dir.dot(tangent) < 0.0 { -1.0 } else { 1.0 };
    let rad = clamped.to_radians();
    (n * rad.cos() + tangent * (side * rad.sin())).normalize_or(n)
}

/// Full surface response for a unit direction: mirror about the normal,
/// then apply the angle clamps. Directions already leaving the surface are
/// returned unchanged.
pub fn reflect_off_surface(dir: Vec2, normal: Vec2) -> Vec2 {
    let Some(n) = normal.try_normalize() else {
        return dir;
    };
    if dir.dot(n) >= 0.0 {
        return dir;
    }
    clamp_to_surface_angles(reflect_velocity(dir, n), n)
}

/// Contact between two balls
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallContact {
    /// Unit normal from `b` toward `a`
    pub normal: Vec2,
    pub penetration: f32,
}

/// Overlap test between two ball circles
pub fn ball_ball_contact(a: &Circle, b: &Circle) -> Option<BallContact> {
    if !a.overlaps(b) {
        return None;
    }
    let offset = a.center - b.center;
    let dist = offset.length();
    let normal = offset.try_normalize().unwrap_or(Vec2::Y);
    Some(BallContact {
        normal,
        penetration: a.radius + b.radius - dist,
    })
}

/// New directions for two colliding balls. Each ball mirrors off the contact
/// normal only if it is moving into the other.
pub fn ball_ball_response(a_dir: Vec2, b_dir: Vec2, contact: &BallContact) -> (Vec2, Vec2) {
    let n = contact.normal;
    let a_out = if a_dir.dot(n) < 0.0 {
        reflect_velocity(a_dir, n)
    } else {
        a_dir
    };
    let b_out = if b_dir.dot(-n) < 0.0 {
        reflect_velocity(b_dir, -n)
    } else {
        b_dir
    };
    (a_out, b_out)
}
