//! Biff! Bam!! Blammo!?! - simulation core
//!
//! Core modules:
//! - `sim`: Deterministic simulation (swept collisions, level pieces, paddle, items)
//! - `tuning`: Data-driven game balance
//! - `error`: Precondition and content errors

pub mod error;
pub mod sim;
pub mod tuning;

pub use error::SimError;
pub use tuning::Tuning;

use glam::Vec2;

/// Game configuration constants
pub mod consts {
    /// Fixed simulation timestep (120 Hz)
    pub const SIM_DT: f32 = 1.0 / 120.0;
    /// Maximum substeps per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 8;

    /// Level piece dimensions (one grid cell)
    pub const PIECE_WIDTH: f32 = 2.5;
    pub const PIECE_HEIGHT: f32 = 1.0;
    pub const HALF_PIECE_WIDTH: f32 = PIECE_WIDTH / 2.0;
    pub const HALF_PIECE_HEIGHT: f32 = PIECE_HEIGHT / 2.0;

    /// Anything below this y is out of play
    pub const Y_COORD_OF_DEATH: f32 = -3.0;
    /// Projectiles further than this outside the level are discarded
    pub const OUT_OF_BOUNDS_BUFFER: f32 = 5.0;

    /// Ball defaults
    pub const DEFAULT_BALL_RADIUS: f32 = 0.5;
    pub const RADIUS_DIFF_PER_SIZE: f32 = 0.125;
    pub const BALL_SECONDS_TO_CHANGE_SIZE: f32 = 0.5;
    /// Minimum angle between a reflected ball and the surface normal
    pub const MIN_BALL_ANGLE_DEGS: f32 = 20.0;
    /// Minimum angle between a reflected ball and the surface itself
    pub const MIN_SURFACE_ANGLE_DEGS: f32 = 10.0;
    /// Minimum angle between a travelling ball and the horizontal
    pub const MIN_HORIZONTAL_ANGLE_DEGS: f32 = 5.0;
    /// Downward acceleration applied to gravity balls (units/s²)
    pub const GRAVITY_ACCELERATION: f32 = 8.0;
    pub const BOOST_DECELERATION: f32 = 10.0;
    pub const BOOST_TEMP_SPEED_INCREASE: f32 = 15.0;
    /// Ball spin, view-only (degrees/s)
    pub const MAX_ROTATION_DEG_PER_SEC: f32 = 90.0;
    /// Crazy ball will not perturb until this long after its last collision
    pub const CRAZY_WAIT_SINCE_COLLISION_SECS: f32 = 1.0;
    pub const OMNI_BULLET_WAIT_SECS: f32 = 0.6;
    pub const MAX_OMNI_BULLETS: u32 = 5;
    /// Odds that a ghost ball slips through a block instead of hitting it
    pub const GHOST_BALL_MISS_CHANCE: f64 = 0.25;
    /// After slipping through, a ghost ball ignores ghostable blocks this long
    pub const GHOST_MODE_SECS: f32 = 1.0;
    /// Maximum steering of a ball toward a magnet paddle
    pub const MAGNET_DEG_PER_SEC: f32 = 80.0;
    /// Largest random release angle from a still paddle
    pub const STILL_RAND_RELEASE_DEG: f32 = 20.0;
    /// Largest random release angle from a moving paddle
    pub const MOVING_RAND_RELEASE_DEG: f32 = 10.0;

    /// Paddle defaults
    pub const PADDLE_WIDTH_TOTAL: f32 = 3.5;
    pub const PADDLE_WIDTH_FLAT_TOP: f32 = 2.5;
    pub const PADDLE_HEIGHT_TOTAL: f32 = 0.5;
    pub const PADDLE_HALF_WIDTH: f32 = PADDLE_WIDTH_TOTAL / 2.0;
    pub const PADDLE_HALF_HEIGHT: f32 = PADDLE_HEIGHT_TOTAL / 2.0;
    /// The paddle rests on the level floor
    pub const PADDLE_CENTER_Y: f32 = PADDLE_HALF_HEIGHT;
    pub const PADDLE_WIDTH_DIFF_PER_SIZE: f32 = 0.8;
    pub const PADDLE_SECONDS_TO_CHANGE_SIZE: f32 = 0.5;
    pub const PADDLE_MAX_SPEED: f32 = 24.0;
    pub const PADDLE_AVG_OVER_TICKS: usize = 8;
    /// In paddle-cam mode the collision top sits this fraction of the height above the bottom
    pub const PADDLE_CAM_COLLISION_HEIGHT_FRACTION: f32 = 0.25;
    /// Delay between paddle weapon shots
    pub const PADDLE_REFIRE_DELAY_SECS: f32 = 0.3;
    /// How much of the paddle's average velocity bends a reflected ball
    pub const PADDLE_VELOCITY_INFLUENCE: f32 = 0.05;
    /// Ball-paddle collisions stay off this long after a hit or release
    pub const PADDLE_HIT_GATE_SECS: f32 = 0.1;

    /// Falling item dimensions
    pub const ITEM_HALF_WIDTH: f32 = 0.9;
    pub const ITEM_HALF_HEIGHT: f32 = 0.4;
    /// Item alpha while a camera mode is active
    pub const ITEM_CAMERA_ALPHA: f32 = 0.35;

    /// Largest number of extra balls a multiball item spawns
    pub const MAX_NUM_SPLIT_BALLS: u32 = 4;
    pub const MIN_SPLIT_DEGS: f32 = 360.0 / (MAX_NUM_SPLIT_BALLS as f32 + 1.0);

    /// Cannon block
    pub const CANNON_HALF_BARREL_LENGTH: f32 = 0.8;
    pub const CANNON_MIN_ROTATION_DEG_PER_SEC: f32 = 100.0;
    pub const CANNON_MAX_ROTATION_DEG_PER_SEC: f32 = 300.0;
    pub const CANNON_MIN_ROTATION_SECS: f32 = 1.0;
    pub const CANNON_MAX_ROTATION_SECS: f32 = 2.5;

    /// A ball caught by a net ignores blocks this long while it drops through
    pub const NET_BLOCK_GATE_SECS: f32 = 0.3;

    /// Projectiles
    pub const LASER_BULLET_SPEED: f32 = 20.0;
    pub const BALL_LASER_BULLET_SPEED: f32 = 15.0;
    pub const MINE_SPEED: f32 = 10.0;
    pub const BLAST_SPEED: f32 = 12.0;

    /// Most lives a player can bank
    pub const MAX_LIVES: u8 = 9;
}

/// Rotate a vector counter-clockwise by the given angle in degrees
#[inline]
pub fn rotate_deg(v: Vec2, degrees: f32) -> Vec2 {
    Vec2::from_angle(degrees.to_radians()).rotate(v)
}

/// Unsigned angle between two vectors, in degrees
#[inline]
pub fn angle_between_deg(a: Vec2, b: Vec2) -> f32 {
    let denom = a.length() * b.length();
    if denom <= f32::EPSILON {
        return 0.0;
    }
    (a.dot(b) / denom).clamp(-1.0, 1.0).acos().to_degrees()
}
