//! Falling items
//!
//! Items drop from destroyed or item-drop pieces, fall straight down at a
//! constant speed (teleporting through portals) and are acquired when they
//! touch the paddle.

use glam::{Vec2, Vec4};
use serde::{Deserialize, Serialize};

use super::ball::BallTypes;
use super::geometry::Aabb;
use super::level::{Level, PieceKind};
use super::paddle::{Paddle, PaddleTypes};
use crate::consts::*;

/// Whether an item helps or hinders the player (HUD colour only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemDisposition {
    Good,
    Bad,
    Neutral,
}

impl ItemDisposition {
    pub fn colour(self) -> Vec4 {
        match self {
            ItemDisposition::Good => Vec4::new(0.0, 0.8, 0.2, 1.0),
            ItemDisposition::Bad => Vec4::new(0.9, 0.1, 0.1, 1.0),
            ItemDisposition::Neutral => Vec4::new(0.3, 0.5, 1.0, 1.0),
        }
    }
}

/// Which duration an item's effect lasts for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectCategory {
    Ball,
    Paddle,
    Camera,
    /// Applied once, never reverted
    Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    // Ball modifiers
    UberBall,
    InvisiBall,
    GhostBall,
    GravityBall,
    CrazyBall,
    FireBall,
    IceBall,
    OmniLaserBall,
    // Ball adjustments
    BallSpeedUp,
    BallSpeedDown,
    BallGrow,
    BallShrink,
    // Paddle adjustments
    PaddleGrow,
    PaddleShrink,
    // Paddle modifiers
    StickyPaddle,
    LaserBulletPaddle,
    LaserBeamPaddle,
    MagnetPaddle,
    MineLauncherPaddle,
    FlameBlasterPaddle,
    IceBlasterPaddle,
    InvisiPaddle,
    PoisonPaddle,
    // Cameras
    PaddleCam,
    BallCam,
    // Other
    MultiBall3,
    MultiBall5,
    OneUp,
}

impl ItemKind {
    pub const ALL: [ItemKind; 28] = [
        ItemKind::UberBall,
        ItemKind::InvisiBall,
        ItemKind::GhostBall,
        ItemKind::GravityBall,
        ItemKind::CrazyBall,
        ItemKind::FireBall,
        ItemKind::IceBall,
        ItemKind::OmniLaserBall,
        ItemKind::BallSpeedUp,
        ItemKind::BallSpeedDown,
        ItemKind::BallGrow,
        ItemKind::BallShrink,
        ItemKind::PaddleGrow,
        ItemKind::PaddleShrink,
        ItemKind::StickyPaddle,
        ItemKind::LaserBulletPaddle,
        ItemKind::LaserBeamPaddle,
        ItemKind::MagnetPaddle,
        ItemKind::MineLauncherPaddle,
        ItemKind::FlameBlasterPaddle,
        ItemKind::IceBlasterPaddle,
        ItemKind::InvisiPaddle,
        ItemKind::PoisonPaddle,
        ItemKind::PaddleCam,
        ItemKind::BallCam,
        ItemKind::MultiBall3,
        ItemKind::MultiBall5,
        ItemKind::OneUp,
    ];

    pub fn disposition(self) -> ItemDisposition {
        use ItemKind::*;
        match self {
            UberBall | FireBall | IceBall | OmniLaserBall | BallSpeedDown | PaddleGrow
            | StickyPaddle | LaserBulletPaddle | LaserBeamPaddle | MagnetPaddle
            | MineLauncherPaddle | FlameBlasterPaddle | IceBlasterPaddle | MultiBall3
            | MultiBall5 | OneUp => ItemDisposition::Good,
            InvisiBall | GhostBall | CrazyBall | BallSpeedUp | PaddleShrink | InvisiPaddle
            | PoisonPaddle | PaddleCam | BallCam => ItemDisposition::Bad,
            GravityBall | BallGrow | BallShrink => ItemDisposition::Neutral,
        }
    }

    /// The effect this one cancels out on contact
    pub fn opposing(self) -> Option<ItemKind> {
        match self {
            ItemKind::FireBall => Some(ItemKind::IceBall),
            ItemKind::IceBall => Some(ItemKind::FireBall),
            ItemKind::FlameBlasterPaddle => Some(ItemKind::IceBlasterPaddle),
            ItemKind::IceBlasterPaddle => Some(ItemKind::FlameBlasterPaddle),
            _ => None,
        }
    }

    pub fn category(self) -> EffectCategory {
        use ItemKind::*;
        match self {
            UberBall | InvisiBall | GhostBall | GravityBall | CrazyBall | FireBall | IceBall
            | OmniLaserBall => EffectCategory::Ball,
            StickyPaddle | LaserBulletPaddle | LaserBeamPaddle | MagnetPaddle
            | MineLauncherPaddle | FlameBlasterPaddle | IceBlasterPaddle | InvisiPaddle
            | PoisonPaddle => EffectCategory::Paddle,
            PaddleCam | BallCam => EffectCategory::Camera,
            BallSpeedUp | BallSpeedDown | BallGrow | BallShrink | PaddleGrow | PaddleShrink
            | MultiBall3 | MultiBall5 | OneUp => EffectCategory::Instant,
        }
    }

    pub fn is_instant(self) -> bool {
        self.category() == EffectCategory::Instant
    }

    /// Ball type flag this item toggles
    pub fn ball_type(self) -> Option<BallTypes> {
        Some(match self {
            ItemKind::UberBall => BallTypes::UBER,
            ItemKind::InvisiBall => BallTypes::INVISI,
            ItemKind::GhostBall => BallTypes::GHOST,
            ItemKind::GravityBall => BallTypes::GRAVITY,
            ItemKind::CrazyBall => BallTypes::CRAZY,
            ItemKind::FireBall => BallTypes::FIRE,
            ItemKind::IceBall => BallTypes::ICE,
            ItemKind::OmniLaserBall => BallTypes::OMNI_LASER_BULLET,
            _ => return None,
        })
    }

    /// Paddle type flag this item toggles
    pub fn paddle_type(self) -> Option<PaddleTypes> {
        Some(match self {
            ItemKind::StickyPaddle => PaddleTypes::STICKY,
            ItemKind::LaserBulletPaddle => PaddleTypes::LASER_BULLET,
            ItemKind::LaserBeamPaddle => PaddleTypes::LASER_BEAM,
            ItemKind::MagnetPaddle => PaddleTypes::MAGNET,
            ItemKind::MineLauncherPaddle => PaddleTypes::MINE_LAUNCHER,
            ItemKind::FlameBlasterPaddle => PaddleTypes::FLAME_BLASTER,
            ItemKind::IceBlasterPaddle => PaddleTypes::ICE_BLASTER,
            ItemKind::InvisiPaddle => PaddleTypes::INVISI,
            ItemKind::PoisonPaddle => PaddleTypes::POISON,
            _ => return None,
        })
    }
}

/// An item falling toward the paddle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameItem {
    pub id: u32,
    pub kind: ItemKind,
    center: Vec2,
    /// Unit direction of descent
    direction: Vec2,
    speed: f32,
    alpha: f32,
    /// Portals already passed through
    entered_portals: Vec<u32>,
}

impl GameItem {
    pub fn new(id: u32, kind: ItemKind, center: Vec2, descent_speed: f32) -> Self {
        Self {
            id,
            kind,
            center,
            direction: Vec2::NEG_Y,
            speed: descent_speed,
            alpha: 1.0,
            entered_portals: Vec::new(),
        }
    }

    pub fn center(&self) -> Vec2 {
        self.center
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Fade while a camera mode would have the item block the view
    pub fn set_camera_faded(&mut self, faded: bool) {
        self.alpha = if faded { ITEM_CAMERA_ALPHA } else { 1.0 };
    }

    pub fn colour(&self) -> Vec4 {
        let c = self.kind.disposition().colour();
        Vec4::new(c.x, c.y, c.z, c.w * self.alpha)
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_center(self.center, Vec2::new(ITEM_HALF_WIDTH, ITEM_HALF_HEIGHT))
    }

    pub fn collides_with_paddle(&self, paddle: &Paddle) -> bool {
        self.aabb().overlaps(&paddle.aabb())
    }

    pub fn is_below_level(&self) -> bool {
        self.center.y < Y_COORD_OF_DEATH
    }

    /// Fall for one tick. Returns the (entry, exit) portal ids if the item
    /// teleported.
    pub fn tick(&mut self, dt: f32, level: &Level) -> Option<(u32, u32)> {
        self.center += self.direction * self.speed * dt;

        let portal = level.piece_at(self.center)?;
        if !matches!(portal.kind, PieceKind::Portal { .. })
            || self.entered_portals.contains(&portal.id)
        {
            return None;
        }
        let sibling = level.portal_sibling(portal.id)?;
        self.center = sibling.center + (self.center - portal.center);
        self.entered_portals.push(portal.id);
        self.entered_portals.push(sibling.id);
        log::debug!("Item {} teleported from portal {} to {}", self.id, portal.id, sibling.id);
        Some((portal.id, sibling.id))
    }
}
