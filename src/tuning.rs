//! Game balance tuning
//!
//! Loaded from JSON so balance can change without a rebuild. Anything not
//! present in the file keeps its default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// Data-driven balance values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    // === Item effect durations (seconds) ===
    /// Ball modifiers (uber, fire, ice, crazy, ...)
    pub ball_effect_secs: f32,
    /// Paddle modifiers (sticky, laser, magnet, blasters, ...)
    pub paddle_effect_secs: f32,
    /// Paddle-cam and ball-cam
    pub camera_effect_secs: f32,

    // === Items ===
    /// Speed at which dropped items fall (units/s)
    pub item_descent_speed: f32,
    /// Chance (0-1) that a destroyed breakable drops an item
    pub item_drop_chance: f32,
    /// Ball-ball collisions stay off this long after a multiball split
    pub multiball_grace_secs: f32,

    // === Player ===
    pub starting_lives: u8,
    /// Fraction of the paddle's average velocity imparted to a released ball
    pub release_velocity_multiplier: f32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            ball_effect_secs: 15.0,
            paddle_effect_secs: 15.0,
            camera_effect_secs: 20.0,

            item_descent_speed: 4.0,
            item_drop_chance: 0.2,
            multiball_grace_secs: 0.5,

            starting_lives: 3,
            release_velocity_multiplier: 0.06,
        }
    }
}

impl Tuning {
    /// Parse tuning from a JSON document
    pub fn from_json(json: &str) -> Result<Self, SimError> {
        let tuning = serde_json::from_str(json)?;
        Ok(tuning)
    }

    /// Load tuning from a JSON file on disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let tuning = Self::from_json(&json)?;
        log::info!("Loaded tuning from {}", path.display());
        Ok(tuning)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
