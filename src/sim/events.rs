//! Semantic game events
//!
//! Pushed onto the game state's queue as things happen; sound, HUD and any
//! other listener drains them once per frame.

use serde::{Deserialize, Serialize};

use super::item::ItemKind;
use super::projectile::ProjectileKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    // === Balls ===
    BallSpawned { ball_id: u32 },
    BallDied { ball_id: u32 },
    BallPaddleHit { ball_id: u32 },
    BallBallHit { a: u32, b: u32 },
    BallAttached { ball_id: u32 },
    BallReleased { ball_id: u32 },
    BallCaughtByNet { ball_id: u32, piece_id: u32 },
    /// A ghost ball slipped through a piece
    BallPhasedThrough { ball_id: u32, piece_id: u32 },
    BallTeleported { ball_id: u32, from_piece: u32, to_piece: u32 },
    BallLoadedInCannon { ball_id: u32, piece_id: u32 },
    BallFiredFromCannon { ball_id: u32, piece_id: u32 },

    // === Level ===
    PieceDamaged { piece_id: u32, row: usize, col: usize },
    PieceDestroyed { piece_id: u32, row: usize, col: usize, points: u32 },
    BombExploded { row: usize, col: usize },
    /// Cleared without scoring, e.g. a net after catching a ball
    PieceRemoved { piece_id: u32, row: usize, col: usize },
    PieceFrozen { piece_id: u32, row: usize, col: usize },
    PieceThawed { piece_id: u32, row: usize, col: usize, by_fire: bool },
    LevelComplete,

    // === Items and timers ===
    ItemSpawned { item_id: u32, kind: ItemKind },
    ItemAcquired { item_id: u32, kind: ItemKind },
    ItemActivated { kind: ItemKind, duration: f32 },
    ItemDeactivated { kind: ItemKind },
    /// A new pickup cancelled an active opposing effect; neither applies
    ItemEffectsCancelled { acquired: ItemKind, cancelled: ItemKind },
    TimerStarted { timer_id: u32, kind: ItemKind, duration: f32 },
    TimerStopped { timer_id: u32, kind: ItemKind },

    // === Weapons ===
    ProjectileFired { kind: ProjectileKind },
    LaserBeamFired { hit_piece: Option<u32> },

    // === Player ===
    LifeGained { lives: u8 },
    LifeLost { lives: u8 },
    GameOver,
}
