//! Level grid and level pieces
//!
//! The level is a grid of pieces, row 0 at the bottom. Each piece carries
//! collidable lines only on the sides that face open space, and reacts to
//! ball and projectile hits by staying as it is or turning into another kind.

use glam::Vec2;
use rand::Rng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::ball::{Ball, BallTypes};
use super::geometry::{Aabb, BoundingLines, LineSeg, Ray, SweptHit};
use super::projectile::ProjectileKind;
use super::random_sign;
use crate::consts::*;
use crate::error::SimError;
use crate::rotate_deg;

/// Breakable colours, strongest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BreakableColour {
    Red,
    Orange,
    Yellow,
    Green,
}

impl BreakableColour {
    /// Colour after taking one hit, or `None` if the piece breaks
    pub fn weakened(self) -> Option<Self> {
        match self {
            BreakableColour::Red => Some(BreakableColour::Orange),
            BreakableColour::Orange => Some(BreakableColour::Yellow),
            BreakableColour::Yellow => Some(BreakableColour::Green),
            BreakableColour::Green => None,
        }
    }

    /// Colour after `steps` hits, or `None` if the piece breaks on the way
    pub fn weakened_by(self, steps: u32) -> Option<Self> {
        (0..steps).try_fold(self, |colour, _| colour.weakened())
    }
}

/// Spin of a cannon with a ball inside
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CannonState {
    /// Unit barrel direction
    pub aim: Vec2,
    pub loaded_ball: Option<u32>,
    /// Signed spin rate (degrees/s)
    spin_deg_per_sec: f32,
    spin_remaining: f32,
}

impl Default for CannonState {
    fn default() -> Self {
        Self {
            aim: Vec2::Y,
            loaded_ball: None,
            spin_deg_per_sec: 0.0,
            spin_remaining: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PieceKind {
    Empty,
    Solid,
    Breakable(BreakableColour),
    Bomb,
    /// Catches a ball once and drops it along gravity
    Net,
    /// Paired teleporter; `sibling` is the grid index of its partner
    Portal { sibling: usize },
    Cannon(CannonState),
    /// Indestructible; drops an item whenever it is hit
    ItemDrop,
}

impl PieceKind {
    /// Balls pass through these pieces without bouncing
    pub fn is_no_bounds(&self) -> bool {
        matches!(self, PieceKind::Empty | PieceKind::Portal { .. })
    }

    /// Must be destroyed to finish the level
    pub fn must_be_destroyed(&self) -> bool {
        matches!(self, PieceKind::Breakable(_) | PieceKind::Bomb)
    }

    /// Destroyed by explosions and fire
    pub fn is_destructible(&self) -> bool {
        matches!(self, PieceKind::Breakable(_) | PieceKind::Bomb)
    }

    /// A ghost ball may slip through these
    pub fn ghost_passes_through(&self) -> bool {
        matches!(self, PieceKind::Breakable(_) | PieceKind::Bomb)
    }

    /// Can be encased in ice by ice balls and ice blasts
    pub fn can_freeze(&self) -> bool {
        matches!(
            self,
            PieceKind::Solid | PieceKind::Breakable(_) | PieceKind::Bomb | PieceKind::ItemDrop
        )
    }

    pub fn points_on_destroy(&self) -> u32 {
        match self {
            PieceKind::Breakable(_) => 100,
            PieceKind::Bomb => 50,
            _ => 0,
        }
    }

    fn from_symbol(symbol: char) -> Option<Self> {
        Some(match symbol {
            '.' => PieceKind::Empty,
            'S' => PieceKind::Solid,
            'R' => PieceKind::Breakable(BreakableColour::Red),
            'O' => PieceKind::Breakable(BreakableColour::Orange),
            'Y' => PieceKind::Breakable(BreakableColour::Yellow),
            'G' => PieceKind::Breakable(BreakableColour::Green),
            'B' => PieceKind::Bomb,
            'N' => PieceKind::Net,
            // Sibling filled in once all portals are known
            'P' => PieceKind::Portal { sibling: 0 },
            'C' => PieceKind::Cannon(CannonState::default()),
            'I' => PieceKind::ItemDrop,
            _ => return None,
        })
    }
}

/// Kinds of the eight surrounding cells; `None` past the level edge
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Neighbours {
    pub left: Option<PieceKind>,
    pub bottom: Option<PieceKind>,
    pub right: Option<PieceKind>,
    pub top: Option<PieceKind>,
    pub top_right: Option<PieceKind>,
    pub top_left: Option<PieceKind>,
    pub bottom_right: Option<PieceKind>,
    pub bottom_left: Option<PieceKind>,
}

fn exposes(neighbour: &Option<PieceKind>) -> bool {
    neighbour.as_ref().is_none_or(PieceKind::is_no_bounds)
}

/// One cell of the level grid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelPiece {
    pub id: u32,
    pub row: usize,
    pub col: usize,
    pub center: Vec2,
    pub kind: PieceKind,
    /// Encased in ice
    #[serde(default)]
    frozen: bool,
    bounds: BoundingLines,
}

impl LevelPiece {
    pub fn new(id: u32, row: usize, col: usize, kind: PieceKind) -> Self {
        Self {
            id,
            row,
            col,
            center: Vec2::new(
                col as f32 * PIECE_WIDTH + HALF_PIECE_WIDTH,
                row as f32 * PIECE_HEIGHT + HALF_PIECE_HEIGHT,
            ),
            kind,
            frozen: false,
            bounds: BoundingLines::new(),
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn is_no_bounds(&self) -> bool {
        self.kind.is_no_bounds()
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_center(self.center, Vec2::new(HALF_PIECE_WIDTH, HALF_PIECE_HEIGHT))
    }

    pub fn bounds(&self) -> &BoundingLines {
        &self.bounds
    }

    /// Rebuild the collidable sides: a side gets a line only when the
    /// neighbour there is missing or has no bounds itself
    pub fn update_bounds(&mut self, neighbours: &Neighbours) {
        self.bounds.clear();
        if self.is_no_bounds() {
            return;
        }

        let c = self.center;
        let (hw, hh) = (HALF_PIECE_WIDTH, HALF_PIECE_HEIGHT);
        let top_left = c + Vec2::new(-hw, hh);
        let top_right = c + Vec2::new(hw, hh);
        let bottom_left = c + Vec2::new(-hw, -hh);
        let bottom_right = c + Vec2::new(hw, -hh);

        if exposes(&neighbours.left) {
            self.bounds.push(LineSeg::new(top_left, bottom_left), Vec2::NEG_X);
        }
        if exposes(&neighbours.bottom) {
            self.bounds.push(LineSeg::new(bottom_left, bottom_right), Vec2::NEG_Y);
        }
        if exposes(&neighbours.right) {
            self.bounds.push(LineSeg::new(bottom_right, top_right), Vec2::X);
        }
        if exposes(&neighbours.top) {
            self.bounds.push(LineSeg::new(top_right, top_left), Vec2::Y);
        }
    }

    /// Swept ball test. Pieces without bounds never collide.
    pub fn collide_ball(&self, ball: &Ball, displacement: Vec2) -> Option<SweptHit> {
        if self.is_no_bounds() {
            return None;
        }
        self.bounds.collide(&ball.bounds(), displacement)
    }

    /// Distance along the ray to this piece's box
    pub fn ray_hit(&self, ray: &Ray) -> Option<f32> {
        if self.is_no_bounds() {
            return None;
        }
        ray.hit_aabb(&self.aabb())
    }

    pub fn collides_aabb(&self, aabb: &Aabb) -> bool {
        !self.is_no_bounds() && self.aabb().overlaps(aabb)
    }
}

/// A change to the grid caused by a hit
#[derive(Debug, Clone, PartialEq)]
pub enum PieceChange {
    Damaged {
        piece_id: u32,
        row: usize,
        col: usize,
    },
    Destroyed {
        piece_id: u32,
        row: usize,
        col: usize,
        center: Vec2,
        points: u32,
    },
    BombExploded {
        row: usize,
        col: usize,
    },
    /// Cleared without scoring (a used-up net)
    Removed {
        piece_id: u32,
        row: usize,
        col: usize,
    },
    Frozen {
        piece_id: u32,
        row: usize,
        col: usize,
    },
    /// Ice removed, melted by fire or shattered by anything else
    Thawed {
        piece_id: u32,
        row: usize,
        col: usize,
        by_fire: bool,
    },
}

/// What happens to the ball after hitting a piece
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BallResponse {
    Reflect,
    PassThrough,
    /// Ghost ball slipped through without touching the piece
    Phase,
    /// Held by the cannon at the given piece
    Capture { piece_id: u32, center: Vec2 },
    /// Caught by a net and dropped along gravity
    Drop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BallReaction {
    pub response: BallResponse,
    pub changes: Vec<PieceChange>,
    /// Points at which an item should drop regardless of chance
    pub item_drops: Vec<Vec2>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProjectileReaction {
    /// The projectile is used up
    pub consumed: bool,
    pub changes: Vec<PieceChange>,
    pub item_drops: Vec<Vec2>,
}

/// A cannon releasing its ball this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CannonFire {
    pub piece_id: u32,
    pub ball_id: u32,
    pub center: Vec2,
    pub dir: Vec2,
}

/// The level grid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Level {
    width: usize,
    height: usize,
    /// Row-major, row 0 at the bottom
    pieces: Vec<LevelPiece>,
    next_piece_id: u32,
    walls: BoundingLines,
}

impl Level {
    /// Build from rows of kinds, bottom row first
    pub fn from_rows(rows: Vec<Vec<PieceKind>>) -> Result<Self, SimError> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        if height == 0 || width == 0 {
            return Err(SimError::LayoutEmpty);
        }

        let mut pieces = Vec::with_capacity(width * height);
        let mut next_piece_id = 1;
        for (row, kinds) in rows.into_iter().enumerate() {
            if kinds.len() != width {
                return Err(SimError::LayoutRagged {
                    row,
                    expected: width,
                    found: kinds.len(),
                });
            }
            for (col, kind) in kinds.into_iter().enumerate() {
                pieces.push(LevelPiece::new(next_piece_id, row, col, kind));
                next_piece_id += 1;
            }
        }

        let mut level = Self {
            width,
            height,
            pieces,
            next_piece_id,
            walls: BoundingLines::new(),
        };
        level.build_walls();
        level.update_all_bounds();
        Ok(level)
    }

    /// Parse a text layout, top line is the highest row.
    ///
    /// `.` empty, `S` solid, `R O Y G` breakables, `B` bomb, `N` net,
    /// `P` portal, `C` cannon, `I` item drop. Portals pair up in reading order.
    pub fn parse(layout: &str) -> Result<Self, SimError> {
        let lines: Vec<&str> = layout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        let height = lines.len();

        let mut rows = Vec::with_capacity(height);
        let mut portals = Vec::new();
        for (line_no, line) in lines.iter().enumerate() {
            let row = height - 1 - line_no;
            let mut kinds = Vec::with_capacity(line.len());
            for (col, symbol) in line.chars().enumerate() {
                let kind = PieceKind::from_symbol(symbol)
                    .ok_or(SimError::UnknownPieceSymbol { symbol, row, col })?;
                if matches!(kind, PieceKind::Portal { .. }) {
                    portals.push((row, col));
                }
                kinds.push(kind);
            }
            rows.push(kinds);
        }
        if portals.len() % 2 != 0 {
            return Err(SimError::UnpairedPortal(portals.len()));
        }
        rows.reverse();

        let width = rows.first().map_or(0, Vec::len);
        for pair in portals.chunks(2) {
            let (a, b) = (pair[0], pair[1]);
            if let Some(kind) = rows.get_mut(a.0).and_then(|r| r.get_mut(a.1)) {
                *kind = PieceKind::Portal { sibling: b.0 * width + b.1 };
            }
            if let Some(kind) = rows.get_mut(b.0).and_then(|r| r.get_mut(b.1)) {
                *kind = PieceKind::Portal { sibling: a.0 * width + a.1 };
            }
        }

        let level = Self::from_rows(rows)?;
        log::info!(
            "Parsed {}x{} level with {} portal pairs",
            level.width,
            level.height,
            portals.len() / 2
        );
        Ok(level)
    }

    fn build_walls(&mut self) {
        let size = self.size();
        self.walls.clear();
        let bottom = Y_COORD_OF_DEATH - OUT_OF_BOUNDS_BUFFER;
        self.walls.push(
            LineSeg::new(Vec2::new(0.0, bottom), Vec2::new(0.0, size.y)),
            Vec2::X,
        );
        self.walls.push(
            LineSeg::new(Vec2::new(size.x, bottom), Vec2::new(size.x, size.y)),
            Vec2::NEG_X,
        );
        self.walls.push(LineSeg::new(Vec2::new(0.0, size.y), size), Vec2::NEG_Y);
    }

    // === Queries ===

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// World extent of the grid
    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width as f32 * PIECE_WIDTH, self.height as f32 * PIECE_HEIGHT)
    }

    /// Left, right and top walls
    pub fn walls(&self) -> &BoundingLines {
        &self.walls
    }

    pub fn pieces(&self) -> impl Iterator<Item = &LevelPiece> {
        self.pieces.iter()
    }

    fn index(&self, row: usize, col: usize) -> Option<usize> {
        (row < self.height && col < self.width).then_some(row * self.width + col)
    }

    pub fn piece(&self, row: usize, col: usize) -> Option<&LevelPiece> {
        self.index(row, col).and_then(|i| self.pieces.get(i))
    }

    pub fn piece_at_index(&self, index: usize) -> Option<&LevelPiece> {
        self.pieces.get(index)
    }

    pub fn index_of(&self, piece_id: u32) -> Option<usize> {
        self.pieces.iter().position(|p| p.id == piece_id)
    }

    pub fn piece_by_id(&self, piece_id: u32) -> Option<&LevelPiece> {
        self.pieces.iter().find(|p| p.id == piece_id)
    }

    /// Piece whose cell contains the point
    pub fn piece_at(&self, point: Vec2) -> Option<&LevelPiece> {
        if point.x < 0.0 || point.y < 0.0 {
            return None;
        }
        let col = (point.x / PIECE_WIDTH) as usize;
        let row = (point.y / PIECE_HEIGHT) as usize;
        self.piece(row, col)
    }

    /// Partner of a portal piece
    pub fn portal_sibling(&self, piece_id: u32) -> Option<&LevelPiece> {
        match self.piece_by_id(piece_id)?.kind {
            PieceKind::Portal { sibling } => self.pieces.get(sibling),
            _ => None,
        }
    }

    /// Every breakable and bomb is gone
    pub fn is_complete(&self) -> bool {
        !self.pieces.iter().any(|p| p.kind.must_be_destroyed())
    }

    pub fn neighbours(&self, row: usize, col: usize) -> Neighbours {
        let at = |dr: isize, dc: isize| -> Option<PieceKind> {
            let r = row.checked_add_signed(dr)?;
            let c = col.checked_add_signed(dc)?;
            self.piece(r, c).map(|p| p.kind.clone())
        };
        Neighbours {
            left: at(0, -1),
            bottom: at(-1, 0),
            right: at(0, 1),
            top: at(1, 0),
            top_right: at(1, 1),
            top_left: at(1, -1),
            bottom_right: at(-1, 1),
            bottom_left: at(-1, -1),
        }
    }

    // === Bounds maintenance ===

    pub fn update_all_bounds(&mut self) {
        for i in 0..self.pieces.len() {
            let (row, col) = (self.pieces[i].row, self.pieces[i].col);
            let n = self.neighbours(row, col);
            self.pieces[i].update_bounds(&n);
        }
    }

    /// Rebuild a piece and its eight neighbours after it changed kind
    fn refresh_around(&mut self, row: usize, col: usize) {
        for dr in -1..=1_isize {
            for dc in -1..=1_isize {
                let (Some(r), Some(c)) = (row.checked_add_signed(dr), col.checked_add_signed(dc))
                else {
                    continue;
                };
                if let Some(i) = self.index(r, c) {
                    let n = self.neighbours(r, c);
                    self.pieces[i].update_bounds(&n);
                }
            }
        }
    }

    /// Swap in a new piece at the cell. Returns the new piece id.
    pub fn replace_piece(&mut self, row: usize, col: usize, kind: PieceKind) -> Option<u32> {
        let i = self.index(row, col)?;
        let id = self.next_piece_id;
        self.next_piece_id += 1;
        self.pieces[i] = LevelPiece::new(id, row, col, kind);
        self.refresh_around(row, col);
        Some(id)
    }

    // === Collision queries ===

    /// Earliest piece hit by a ball moving by `displacement`. A hit at time
    /// zero against the piece the ball last bounced off is ignored, as are
    /// ghostable pieces while the ball is ghosting.
    pub fn ball_collision(&self, ball: &Ball, displacement: Vec2) -> Option<(usize, SweptHit)> {
        let r = ball.radius();
        let start = ball.center();
        let end = start + displacement;
        let sweep = Aabb::new(start.min(end) - Vec2::splat(r), start.max(end) + Vec2::splat(r));
        let ghosting = ball.is_ghosting();

        self.pieces
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_no_bounds() && p.aabb().overlaps(&sweep))
            .filter(|(_, p)| !(ghosting && p.kind.ghost_passes_through()))
            .filter_map(|(i, p)| {
                let hit = p.collide_ball(ball, displacement)?;
                if hit.toi == 0.0 && ball.last_piece == Some(p.id) {
                    return None;
                }
                Some((i, hit))
            })
            .min_by(|a, b| a.1.toi.total_cmp(&b.1.toi))
    }

    /// First piece along a ray (laser beam)
    pub fn ray_cast(&self, ray: &Ray) -> Option<(usize, f32)> {
        self.pieces
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.ray_hit(ray).map(|t| (i, t)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// First piece a projectile box overlaps, nearest the projectile centre
    pub fn projectile_collision(&self, aabb: &Aabb) -> Option<usize> {
        let c = aabb.center();
        self.pieces
            .iter()
            .enumerate()
            .filter(|(_, p)| p.collides_aabb(aabb))
            .min_by(|a, b| {
                a.1.center
                    .distance_squared(c)
                    .total_cmp(&b.1.center.distance_squared(c))
            })
            .map(|(i, _)| i)
    }

    // === Reactions ===

    /// React to a ball hitting the piece at `index`. The generator decides
    /// whether a ghost ball slips through.
    pub fn ball_hit(&mut self, index: usize, ball_types: BallTypes, rng: &mut Pcg32) -> BallReaction {
        let mut reaction = BallReaction {
            response: BallResponse::Reflect,
            changes: Vec::new(),
            item_drops: Vec::new(),
        };
        let Some(piece) = self.pieces.get(index) else {
            return reaction;
        };
        let (row, col, id, center, frozen) = (piece.row, piece.col, piece.id, piece.center, piece.frozen);
        let kind = piece.kind.clone();
        let uber = ball_types.contains(BallTypes::UBER);

        if ball_types.contains(BallTypes::GHOST)
            && kind.ghost_passes_through()
            && rng.random_bool(GHOST_BALL_MISS_CHANCE)
        {
            reaction.response = BallResponse::Phase;
            return reaction;
        }

        if kind.can_freeze() {
            if ball_types.contains(BallTypes::ICE) {
                self.freeze(index, &mut reaction.changes);
                return reaction;
            }
            if frozen {
                let by_fire = ball_types.contains(BallTypes::FIRE);
                self.thaw(index, by_fire, &mut reaction.changes);
                // Shattered ice takes a destructible piece with it
                if !by_fire && kind.is_destructible() {
                    self.destroy(row, col, &mut reaction.changes);
                    if uber {
                        reaction.response = BallResponse::PassThrough;
                    }
                }
                return reaction;
            }
        }

        match kind {
            PieceKind::Empty | PieceKind::Portal { .. } => {
                reaction.response = BallResponse::PassThrough;
            }
            PieceKind::Solid => {}
            PieceKind::Breakable(_) => {
                if ball_types.contains(BallTypes::FIRE) {
                    self.destroy(row, col, &mut reaction.changes);
                } else if uber {
                    self.damage_by(row, col, 2, &mut reaction.changes);
                } else {
                    self.damage(row, col, &mut reaction.changes);
                }
                if uber {
                    reaction.response = BallResponse::PassThrough;
                }
            }
            PieceKind::Bomb => {
                self.destroy(row, col, &mut reaction.changes);
                if uber {
                    reaction.response = BallResponse::PassThrough;
                }
            }
            PieceKind::Net => {
                if self.replace_piece(row, col, PieceKind::Empty).is_some() {
                    reaction.changes.push(PieceChange::Removed { piece_id: id, row, col });
                }
                reaction.response = BallResponse::Drop;
            }
            PieceKind::Cannon(state) => {
                if state.loaded_ball.is_none() {
                    reaction.response = BallResponse::Capture { piece_id: id, center };
                }
            }
            PieceKind::ItemDrop => {
                reaction
                    .item_drops
                    .push(center - Vec2::new(0.0, HALF_PIECE_HEIGHT + ITEM_HALF_HEIGHT));
            }
        }
        reaction
    }

    /// React to a projectile hitting the piece at `index`
    pub fn projectile_hit(&mut self, index: usize, kind: ProjectileKind) -> ProjectileReaction {
        let mut reaction = ProjectileReaction::default();
        let Some(piece) = self.pieces.get(index) else {
            return reaction;
        };
        let (row, col, center, frozen) = (piece.row, piece.col, piece.center, piece.frozen);
        let piece_kind = piece.kind.clone();
        if piece_kind.is_no_bounds() {
            return reaction;
        }
        reaction.consumed = true;

        match kind {
            ProjectileKind::PaddleMine => {
                self.explode(row, col, &mut reaction.changes);
            }
            ProjectileKind::FlameBlast => {
                if frozen {
                    self.thaw(index, true, &mut reaction.changes);
                } else if piece_kind.is_destructible() {
                    self.destroy(row, col, &mut reaction.changes);
                }
            }
            ProjectileKind::IceBlast => {
                if piece_kind.can_freeze() {
                    self.freeze(index, &mut reaction.changes);
                }
            }
            // Bullets glance off ice
            ProjectileKind::PaddleLaserBullet | ProjectileKind::BallLaserBullet if frozen => {}
            ProjectileKind::PaddleLaserBullet | ProjectileKind::BallLaserBullet => match piece_kind {
                PieceKind::Breakable(_) => self.damage(row, col, &mut reaction.changes),
                PieceKind::Bomb => self.destroy(row, col, &mut reaction.changes),
                PieceKind::ItemDrop => reaction
                    .item_drops
                    .push(center - Vec2::new(0.0, HALF_PIECE_HEIGHT + ITEM_HALF_HEIGHT)),
                _ => {}
            },
        }
        reaction
    }

    /// Encase the piece at `index` in ice
    pub fn freeze(&mut self, index: usize, changes: &mut Vec<PieceChange>) {
        let Some(piece) = self.pieces.get_mut(index) else {
            return;
        };
        if piece.frozen || !piece.kind.can_freeze() {
            return;
        }
        piece.frozen = true;
        changes.push(PieceChange::Frozen {
            piece_id: piece.id,
            row: piece.row,
            col: piece.col,
        });
    }

    /// Remove the ice from the piece at `index`
    pub fn thaw(&mut self, index: usize, by_fire: bool, changes: &mut Vec<PieceChange>) {
        let Some(piece) = self.pieces.get_mut(index) else {
            return;
        };
        if !piece.frozen {
            return;
        }
        piece.frozen = false;
        changes.push(PieceChange::Thawed {
            piece_id: piece.id,
            row: piece.row,
            col: piece.col,
            by_fire,
        });
    }

    /// Knock a breakable down one colour
    pub fn damage(&mut self, row: usize, col: usize, changes: &mut Vec<PieceChange>) {
        self.damage_by(row, col, 1, changes);
    }

    /// Knock a breakable down `steps` colours, destroying it if it runs out
    pub fn damage_by(&mut self, row: usize, col: usize, steps: u32, changes: &mut Vec<PieceChange>) {
        let Some((kind, old_id)) = self.piece(row, col).map(|p| (p.kind.clone(), p.id)) else {
            return;
        };
        match kind {
            PieceKind::Breakable(colour) => match colour.weakened_by(steps) {
                Some(weaker) => {
                    self.replace_piece(row, col, PieceKind::Breakable(weaker));
                    changes.push(PieceChange::Damaged {
                        piece_id: old_id,
                        row,
                        col,
                    });
                }
                None => self.destroy(row, col, changes),
            },
            PieceKind::Bomb => self.destroy(row, col, changes),
            _ => {}
        }
    }

    /// Remove a destructible piece. Bombs take their neighbours with them.
    pub fn destroy(&mut self, row: usize, col: usize, changes: &mut Vec<PieceChange>) {
        let mut pending = vec![(row, col)];
        while let Some((r, c)) = pending.pop() {
            let Some(piece) = self.piece(r, c) else {
                continue;
            };
            if !piece.kind.is_destructible() {
                continue;
            }
            let was_bomb = piece.kind == PieceKind::Bomb;
            changes.push(PieceChange::Destroyed {
                piece_id: piece.id,
                row: r,
                col: c,
                center: piece.center,
                points: piece.kind.points_on_destroy(),
            });
            self.replace_piece(r, c, PieceKind::Empty);

            if was_bomb {
                changes.push(PieceChange::BombExploded { row: r, col: c });
                pending.extend(self.surrounding(r, c));
            }
        }
    }

    /// Blast that destroys every destructible piece in the 3x3 block
    pub fn explode(&mut self, row: usize, col: usize, changes: &mut Vec<PieceChange>) {
        changes.push(PieceChange::BombExploded { row, col });
        self.destroy(row, col, changes);
        for (r, c) in self.surrounding(row, col) {
            self.destroy(r, c, changes);
        }
    }

    fn surrounding(&self, row: usize, col: usize) -> Vec<(usize, usize)> {
        let mut cells = Vec::with_capacity(8);
        for dr in -1..=1_isize {
            for dc in -1..=1_isize {
                if dr == 0 && dc == 0 {
                    continue;
                }
                if let (Some(r), Some(c)) = (row.checked_add_signed(dr), col.checked_add_signed(dc)) {
                    if self.index(r, c).is_some() {
                        cells.push((r, c));
                    }
                }
            }
        }
        cells
    }

    // === Cannons ===

    /// Put a ball in the cannon and start a random spin
    pub fn load_cannon(&mut self, piece_id: u32, ball_id: u32, rng: &mut Pcg32) -> bool {
        let Some(piece) = self.pieces.iter_mut().find(|p| p.id == piece_id) else {
            return false;
        };
        let PieceKind::Cannon(state) = &mut piece.kind else {
            return false;
        };
        if state.loaded_ball.is_some() {
            return false;
        }
        state.loaded_ball = Some(ball_id);
        state.spin_deg_per_sec = random_sign(rng)
            * rng.random_range(CANNON_MIN_ROTATION_DEG_PER_SEC..=CANNON_MAX_ROTATION_DEG_PER_SEC);
        state.spin_remaining = rng.random_range(CANNON_MIN_ROTATION_SECS..=CANNON_MAX_ROTATION_SECS);
        true
    }

    /// Spin loaded cannons; returns the ones that fire this tick
    pub fn tick_cannons(&mut self, dt: f32) -> Vec<CannonFire> {
        let mut fired = Vec::new();
        for piece in &mut self.pieces {
            let PieceKind::Cannon(state) = &mut piece.kind else {
                continue;
            };
            let Some(ball_id) = state.loaded_ball else {
                continue;
            };
            state.aim = rotate_deg(state.aim, state.spin_deg_per_sec * dt).normalize_or(Vec2::Y);
            state.spin_remaining -= dt;
            if state.spin_remaining <= 0.0 {
                state.loaded_ball = None;
                state.spin_remaining = 0.0;
                fired.push(CannonFire {
                    piece_id: piece.id,
                    ball_id,
                    center: piece.center,
                    dir: state.aim,
                });
            }
        }
        fired
    }

    /// Forget a ball that left play while inside a cannon
    pub fn unload_ball(&mut self, ball_id: u32) {
        for piece in &mut self.pieces {
            if let PieceKind::Cannon(state) = &mut piece.kind {
                if state.loaded_ball == Some(ball_id) {
                    state.loaded_ball = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> Pcg32 {
        Pcg32::seed_from_u64(11)
    }

    fn all_solid() -> Neighbours {
        Neighbours {
            left: Some(PieceKind::Solid),
            bottom: Some(PieceKind::Solid),
            right: Some(PieceKind::Solid),
            top: Some(PieceKind::Solid),
            top_right: Some(PieceKind::Solid),
            top_left: Some(PieceKind::Solid),
            bottom_right: Some(PieceKind::Solid),
            bottom_left: Some(PieceKind::Solid),
        }
    }

    #[test]
    fn test_parse_layout() {
        let level = Level::parse(
            "
            SSS
            R.P
            PBC
            ",
        )
        .unwrap();
        assert_eq!(level.width(), 3);
        assert_eq!(level.height(), 3);
        // Top text line is the highest row
        assert_eq!(level.piece(2, 0).unwrap().kind, PieceKind::Solid);
        assert_eq!(level.piece(0, 1).unwrap().kind, PieceKind::Bomb);

        let upper_portal = level.piece(1, 2).unwrap();
        let sibling = level.portal_sibling(upper_portal.id).unwrap();
        assert_eq!((sibling.row, sibling.col), (0, 0));
        let back = level.portal_sibling(sibling.id).unwrap();
        assert_eq!(back.id, upper_portal.id);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(Level::parse(""), Err(SimError::LayoutEmpty)));
        assert!(matches!(
            Level::parse("SS\nS"),
            Err(SimError::LayoutRagged { .. })
        ));
        assert!(matches!(
            Level::parse("SX"),
            Err(SimError::UnknownPieceSymbol { symbol: 'X', .. })
        ));
        assert!(matches!(Level::parse("P.."), Err(SimError::UnpairedPortal(1))));
    }

    #[test]
    fn test_bounds_only_face_open_space() {
        let mut piece = LevelPiece::new(1, 5, 5, PieceKind::Solid);
        piece.update_bounds(&all_solid());
        assert!(piece.bounds().is_empty());

        let mut n = all_solid();
        n.left = None;
        n.top = Some(PieceKind::Empty);
        n.right = Some(PieceKind::Portal { sibling: 0 });
        piece.update_bounds(&n);
        assert_eq!(piece.bounds().len(), 3);
        let normals: Vec<Vec2> = piece.bounds().iter().map(|l| l.normal).collect();
        assert!(normals.contains(&Vec2::NEG_X));
        assert!(normals.contains(&Vec2::X));
        assert!(normals.contains(&Vec2::Y));
        assert!(!normals.contains(&Vec2::NEG_Y));
    }

    #[test]
    fn test_update_bounds_is_idempotent() {
        let mut piece = LevelPiece::new(1, 0, 0, PieceKind::Bomb);
        let n = Neighbours::default();
        piece.update_bounds(&n);
        let first = piece.bounds().clone();
        piece.update_bounds(&n);
        assert_eq!(piece.bounds(), &first);
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn test_no_bounds_pieces_never_collide() {
        let mut empty = LevelPiece::new(1, 0, 0, PieceKind::Empty);
        empty.update_bounds(&Neighbours::default());
        assert!(empty.bounds().is_empty());

        let ball = Ball::new(9, empty.center - Vec2::new(0.0, 2.0));
        assert!(empty.collide_ball(&ball, Vec2::new(0.0, 4.0)).is_none());
        let ray = Ray::new(Vec2::new(0.0, -5.0), Vec2::Y).unwrap();
        assert!(empty.ray_hit(&ray).is_none());
    }

    #[test]
    fn test_interior_faces_omitted_and_rebuilt_on_change() {
        let mut level = Level::parse("RR").unwrap();
        let left = level.piece(0, 0).unwrap();
        // Level edge on three sides, breakable to the right
        assert_eq!(left.bounds().len(), 3);

        let mut changes = Vec::new();
        level.destroy(0, 1, &mut changes);
        assert_eq!(level.piece(0, 0).unwrap().bounds().len(), 4);
    }

    #[test]
    fn test_breakable_colour_chain() {
        let mut level = Level::parse("R").unwrap();
        let mut r = rng();
        let expected = [
            PieceKind::Breakable(BreakableColour::Orange),
            PieceKind::Breakable(BreakableColour::Yellow),
            PieceKind::Breakable(BreakableColour::Green),
            PieceKind::Empty,
        ];
        for kind in expected {
            let reaction = level.ball_hit(0, BallTypes::empty(), &mut r);
            assert_eq!(reaction.response, BallResponse::Reflect);
            assert_eq!(level.piece(0, 0).unwrap().kind, kind);
        }
        assert!(level.is_complete());
    }

    #[test]
    fn test_uber_ball_knocks_two_colours_and_passes() {
        let mut level = Level::parse("R").unwrap();
        let mut r = rng();
        let reaction = level.ball_hit(0, BallTypes::UBER, &mut r);
        assert_eq!(reaction.response, BallResponse::PassThrough);
        assert_eq!(
            level.piece(0, 0).unwrap().kind,
            PieceKind::Breakable(BreakableColour::Yellow)
        );
        assert!(matches!(reaction.changes[0], PieceChange::Damaged { .. }));

        // Yellow has only one step left before green, so it breaks
        let reaction = level.ball_hit(0, BallTypes::UBER, &mut r);
        assert_eq!(reaction.response, BallResponse::PassThrough);
        assert!(matches!(reaction.changes[0], PieceChange::Destroyed { points: 100, .. }));
        assert!(level.is_complete());

        let mut green = Level::parse("G").unwrap();
        green.ball_hit(0, BallTypes::UBER, &mut r);
        assert_eq!(green.piece(0, 0).unwrap().kind, PieceKind::Empty);
    }

    #[test]
    fn test_fire_ball_destroys_and_reflects() {
        let mut level = Level::parse("R").unwrap();
        let mut r = rng();
        let reaction = level.ball_hit(0, BallTypes::FIRE, &mut r);
        assert_eq!(reaction.response, BallResponse::Reflect);
        assert_eq!(level.piece(0, 0).unwrap().kind, PieceKind::Empty);
    }

    #[test]
    fn test_bomb_chain_explosion() {
        let mut level = Level::parse(
            "
            R..S
            .BB.
            ...R
            ",
        )
        .unwrap();
        let bomb = level.piece(1, 1).unwrap();
        let index = level.index_of(bomb.id).unwrap();
        let mut r = rng();
        let reaction = level.ball_hit(index, BallTypes::empty(), &mut r);

        let exploded = reaction
            .changes
            .iter()
            .filter(|c| matches!(c, PieceChange::BombExploded { .. }))
            .count();
        assert_eq!(exploded, 2);
        // Neighbouring red and the second bomb via the chain
        assert_eq!(level.piece(2, 0).unwrap().kind, PieceKind::Empty);
        assert_eq!(level.piece(1, 2).unwrap().kind, PieceKind::Empty);
        // Only reachable through the second bomb
        assert_eq!(level.piece(0, 3).unwrap().kind, PieceKind::Empty);
        // Solid survives
        assert_eq!(level.piece(2, 3).unwrap().kind, PieceKind::Solid);
        assert!(level.is_complete());
    }

    #[test]
    fn test_net_is_single_use() {
        let mut level = Level::parse("N").unwrap();
        let net_id = level.piece(0, 0).unwrap().id;
        let mut r = rng();
        let reaction = level.ball_hit(0, BallTypes::empty(), &mut r);
        assert_eq!(reaction.response, BallResponse::Drop);
        assert_eq!(
            reaction.changes,
            vec![PieceChange::Removed {
                piece_id: net_id,
                row: 0,
                col: 0
            }]
        );
        assert_eq!(level.piece(0, 0).unwrap().kind, PieceKind::Empty);
    }

    #[test]
    fn test_cannon_load_spin_and_fire() {
        let mut level = Level::parse("C").unwrap();
        let mut r = rng();
        let id = level.piece(0, 0).unwrap().id;

        let reaction = level.ball_hit(0, BallTypes::empty(), &mut r);
        assert!(matches!(reaction.response, BallResponse::Capture { piece_id, .. } if piece_id == id));
        assert!(level.load_cannon(id, 7, &mut r));
        assert!(!level.load_cannon(id, 8, &mut r));

        // A loaded cannon is solid to other balls
        let reaction = level.ball_hit(0, BallTypes::empty(), &mut r);
        assert_eq!(reaction.response, BallResponse::Reflect);

        let mut fired = Vec::new();
        for _ in 0..400 {
            fired.extend(level.tick_cannons(SIM_DT));
        }
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].ball_id, 7);
        assert!((fired[0].dir.length() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_item_drop_piece_drops_every_hit() {
        let mut level = Level::parse("I").unwrap();
        let mut r = rng();
        for _ in 0..3 {
            let reaction = level.ball_hit(0, BallTypes::empty(), &mut r);
            assert_eq!(reaction.item_drops.len(), 1);
        }
        assert_eq!(level.piece(0, 0).unwrap().kind, PieceKind::ItemDrop);
    }

    #[test]
    fn test_ball_collision_nearest_piece() {
        let level = Level::parse(
            "
            RRR
            ...
            .S.
            ...
            ",
        )
        .unwrap();
        // Below the solid in the middle column, moving up
        let mut ball = Ball::new(1, Vec2::new(1.5 * PIECE_WIDTH, 0.5));
        ball.set_scale_factor(0.2).unwrap();
        let (index, hit) = level.ball_collision(&ball, Vec2::new(0.0, 10.0)).unwrap();
        assert_eq!(level.piece_at_index(index).unwrap().kind, PieceKind::Solid);
        assert!((hit.normal - Vec2::NEG_Y).length() < 1e-5);
    }

    #[test]
    fn test_ray_cast_and_projectiles() {
        let mut level = Level::parse(
            "
            R
            .
            ",
        )
        .unwrap();
        let ray = Ray::new(Vec2::new(HALF_PIECE_WIDTH, -1.0), Vec2::Y).unwrap();
        let (index, t) = level.ray_cast(&ray).unwrap();
        assert_eq!(level.piece_at_index(index).unwrap().row, 1);
        assert!((t - 2.0).abs() < 1e-4);

        let reaction = level.projectile_hit(index, ProjectileKind::FlameBlast);
        assert!(reaction.consumed);
        assert!(level.is_complete());
    }

    #[test]
    fn test_ice_blast_freezes_and_flame_blast_thaws() {
        let mut level = Level::parse("R").unwrap();
        let reaction = level.projectile_hit(0, ProjectileKind::IceBlast);
        assert!(matches!(reaction.changes[..], [PieceChange::Frozen { .. }]));
        let piece = level.piece(0, 0).unwrap();
        assert!(piece.is_frozen());
        assert_eq!(piece.kind, PieceKind::Breakable(BreakableColour::Red));

        // Bullets glance off the ice
        level.projectile_hit(0, ProjectileKind::PaddleLaserBullet);
        assert_eq!(
            level.piece(0, 0).unwrap().kind,
            PieceKind::Breakable(BreakableColour::Red)
        );

        let reaction = level.projectile_hit(0, ProjectileKind::FlameBlast);
        assert!(matches!(
            reaction.changes[..],
            [PieceChange::Thawed { by_fire: true, .. }]
        ));
        let piece = level.piece(0, 0).unwrap();
        assert!(!piece.is_frozen());
        assert_eq!(piece.kind, PieceKind::Breakable(BreakableColour::Red));
    }

    #[test]
    fn test_ice_ball_freezes_instead_of_damaging() {
        let mut level = Level::parse("RS").unwrap();
        let mut r = rng();
        for index in [0, 1] {
            let reaction = level.ball_hit(index, BallTypes::ICE, &mut r);
            assert_eq!(reaction.response, BallResponse::Reflect);
            assert!(matches!(reaction.changes[..], [PieceChange::Frozen { .. }]));
            assert!(level.piece_at_index(index).unwrap().is_frozen());
        }
        assert_eq!(
            level.piece(0, 0).unwrap().kind,
            PieceKind::Breakable(BreakableColour::Red)
        );

        // Freezing twice changes nothing
        let reaction = level.ball_hit(0, BallTypes::ICE, &mut r);
        assert!(reaction.changes.is_empty());
    }

    #[test]
    fn test_fire_ball_melts_ice_without_damage() {
        let mut level = Level::parse("R").unwrap();
        let mut r = rng();
        level.ball_hit(0, BallTypes::ICE, &mut r);
        let reaction = level.ball_hit(0, BallTypes::FIRE, &mut r);
        assert!(matches!(
            reaction.changes[..],
            [PieceChange::Thawed { by_fire: true, .. }]
        ));
        let piece = level.piece(0, 0).unwrap();
        assert!(!piece.is_frozen());
        assert_eq!(piece.kind, PieceKind::Breakable(BreakableColour::Red));
    }

    #[test]
    fn test_plain_ball_shatters_ice() {
        let mut level = Level::parse("RS").unwrap();
        let mut r = rng();
        level.ball_hit(0, BallTypes::ICE, &mut r);
        level.ball_hit(1, BallTypes::ICE, &mut r);

        // A frozen breakable shatters with its ice
        let reaction = level.ball_hit(0, BallTypes::empty(), &mut r);
        assert!(matches!(
            reaction.changes[..],
            [PieceChange::Thawed { by_fire: false, .. }, PieceChange::Destroyed { .. }]
        ));
        assert_eq!(level.piece(0, 0).unwrap().kind, PieceKind::Empty);

        // A frozen solid only loses the ice
        level.ball_hit(1, BallTypes::empty(), &mut r);
        let solid = level.piece(0, 1).unwrap();
        assert_eq!(solid.kind, PieceKind::Solid);
        assert!(!solid.is_frozen());
    }

    #[test]
    fn test_ghost_ball_sometimes_slips_through() {
        let mut r = rng();
        let trials = 400;
        let mut phased = 0;
        for _ in 0..trials {
            let mut level = Level::parse("R").unwrap();
            let reaction = level.ball_hit(0, BallTypes::GHOST, &mut r);
            if reaction.response == BallResponse::Phase {
                phased += 1;
                assert!(reaction.changes.is_empty());
                assert_eq!(
                    level.piece(0, 0).unwrap().kind,
                    PieceKind::Breakable(BreakableColour::Red)
                );
            }
        }
        let rate = f64::from(phased) / f64::from(trials);
        assert!((rate - GHOST_BALL_MISS_CHANCE).abs() < 0.1, "rate {rate}");

        // Solid blocks always stop a ghost ball
        let mut level = Level::parse("S").unwrap();
        for _ in 0..50 {
            let reaction = level.ball_hit(0, BallTypes::GHOST, &mut r);
            assert_eq!(reaction.response, BallResponse::Reflect);
        }
    }

    #[test]
    fn test_ghosting_ball_ignores_breakables() {
        let level = Level::parse(
            "
            S
            .
            R
            .
            ",
        )
        .unwrap();
        let mut ball = Ball::new(1, Vec2::new(HALF_PIECE_WIDTH, 0.5));
        ball.set_scale_factor(0.2).unwrap();
        ball.add_type(BallTypes::GHOST);
        let (index, _) = level.ball_collision(&ball, Vec2::new(0.0, 10.0)).unwrap();
        assert!(matches!(level.piece_at_index(index).unwrap().kind, PieceKind::Breakable(_)));

        ball.start_ghosting();
        let (index, _) = level.ball_collision(&ball, Vec2::new(0.0, 10.0)).unwrap();
        assert_eq!(level.piece_at_index(index).unwrap().kind, PieceKind::Solid);
    }

    #[test]
    fn test_mine_explodes_block() {
        let mut level = Level::parse("RSR").unwrap();
        let reaction = level.projectile_hit(1, ProjectileKind::PaddleMine);
        assert!(reaction.consumed);
        assert!(level.is_complete());
        assert_eq!(level.piece(0, 1).unwrap().kind, PieceKind::Solid);
    }

    #[test]
    fn test_piece_at_and_walls() {
        let level = Level::parse("S.\n..").unwrap();
        let p = level.piece_at(Vec2::new(0.1, 1.5)).unwrap();
        assert_eq!((p.row, p.col), (1, 0));
        assert!(level.piece_at(Vec2::new(-1.0, 0.0)).is_none());
        assert_eq!(level.walls().len(), 3);
        assert_eq!(level.size(), Vec2::new(2.0 * PIECE_WIDTH, 2.0 * PIECE_HEIGHT));
    }
}
