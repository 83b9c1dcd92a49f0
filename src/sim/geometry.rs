//! Collision geometry primitives
//!
//! Circles, line segments, AABBs, rays and the bounding-line sets that give
//! level pieces and the paddle their reflective outline.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// Two hits closer in time than this are treated as simultaneous
const TOI_EPSILON: f32 = 1e-4;
/// When overlapping several lines at once, lines this much further than the
/// closest one are ignored
const OVERLAP_DIST_EPSILON: f32 = 0.08;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Vec2,
    pub radius: f32,
}

impl Circle {
    pub fn new(center: Vec2, radius: f32) -> Self {
        Self { center, radius }
    }

    pub fn overlaps(&self, other: &Circle) -> bool {
        let radii = self.radius + other.radius;
        self.center.distance_squared(other.center) < radii * radii
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSeg {
    pub p1: Vec2,
    pub p2: Vec2,
}

impl LineSeg {
    pub fn new(p1: Vec2, p2: Vec2) -> Self {
        Self { p1, p2 }
    }

    /// Closest point on the segment to `pt`
    pub fn closest_point(&self, pt: Vec2) -> Vec2 {
        let d = self.p2 - self.p1;
        let len_sq = d.length_squared();
        if len_sq < 1e-12 {
            return self.p1;
        }
        let t = ((pt - self.p1).dot(d) / len_sq).clamp(0.0, 1.0);
        self.p1 + d * t
    }

    pub fn sq_dist_to(&self, pt: Vec2) -> f32 {
        self.closest_point(pt).distance_squared(pt)
    }

    pub fn midpoint(&self) -> Vec2 {
        (self.p1 + self.p2) * 0.5
    }

    pub fn translated(&self, offset: Vec2) -> Self {
        Self::new(self.p1 + offset, self.p2 + offset)
    }

    /// Earliest fraction of `displacement` at which a circle starting at
    /// `circle.center` touches this segment. Zero when already touching.
    ///
    /// The swept region is the capsule of radius `circle.radius` around the
    /// segment: two offset sides plus the two end caps.
    pub fn earliest_contact(&self, circle: &Circle, displacement: Vec2) -> Option<f32> {
        let r = circle.radius;
        let c = circle.center;

        if self.sq_dist_to(c) <= r * r {
            return Some(0.0);
        }

        let a = displacement.length_squared();
        if a < 1e-12 {
            return None;
        }

        let mut best: Option<f32> = None;
        let mut consider = |t: f32| {
            if (0.0..=1.0).contains(&t) {
                best = Some(best.map_or(t, |b: f32| b.min(t)));
            }
        };

        // Flat sides of the capsule
        let e = self.p2 - self.p1;
        let len = e.length();
        if len > 1e-6 {
            let u = e / len;
            let m = u.perp();
            let s0 = (c - self.p1).dot(m);
            let ds = displacement.dot(m);
            let side_t = if s0 > r && ds < 0.0 {
                Some((s0 - r) / -ds)
            } else if s0 < -r && ds > 0.0 {
                Some((-r - s0) / ds)
            } else {
                None
            };
            if let Some(t) = side_t {
                let along = (c + displacement * t - self.p1).dot(u);
                if (0.0..=len).contains(&along) {
                    consider(t);
                }
            }
        }

        // Rounded end caps
        for end in [self.p1, self.p2] {
            let f = c - end;
            let b = 2.0 * f.dot(displacement);
            let cc = f.length_squared() - r * r;
            let disc = b * b - 4.0 * a * cc;
            if disc >= 0.0 {
                consider((-b - disc.sqrt()) / (2.0 * a));
            }
        }

        best
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn from_center(center: Vec2, half_extents: Vec2) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    pub fn contains(&self, pt: Vec2) -> bool {
        pt.x >= self.min.x && pt.x <= self.max.x && pt.y >= self.min.y && pt.y <= self.max.y
    }
}

/// A ray with a unit direction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    pub origin: Vec2,
    dir: Vec2,
}

impl Ray {
    pub fn new(origin: Vec2, dir: Vec2) -> Result<Self, SimError> {
        let dir = dir
            .try_normalize()
            .ok_or(SimError::DegenerateDirection { x: dir.x, y: dir.y })?;
        Ok(Self { origin, dir })
    }

    pub fn dir(&self) -> Vec2 {
        self.dir
    }

    pub fn point_at(&self, t: f32) -> Vec2 {
        self.origin + self.dir * t
    }

    /// Slab test. Returns the entry distance, or 0 if the origin is inside.
    pub fn hit_aabb(&self, aabb: &Aabb) -> Option<f32> {
        let mut t_min = 0.0_f32;
        let mut t_max = f32::INFINITY;

        for axis in 0..2 {
            let o = self.origin[axis];
            let d = self.dir[axis];
            let (lo, hi) = (aabb.min[axis], aabb.max[axis]);

            if d.abs() < 1e-8 {
                if o < lo || o > hi {
                    return None;
                }
            } else {
                let inv = 1.0 / d;
                let mut t1 = (lo - o) * inv;
                let mut t2 = (hi - o) * inv;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                }
                t_min = t_min.max(t1);
                t_max = t_max.min(t2);
                if t_min > t_max {
                    return None;
                }
            }
        }

        Some(t_min)
    }

    pub fn hit_segment(&self, seg: &LineSeg) -> Option<f32> {
        let e = seg.p2 - seg.p1;
        let denom = self.dir.perp_dot(e);
        if denom.abs() < 1e-8 {
            return None;
        }
        let w = seg.p1 - self.origin;
        let t = w.perp_dot(e) / denom;
        let s = w.perp_dot(self.dir) / denom;
        (t >= 0.0 && (0.0..=1.0).contains(&s)).then_some(t)
    }
}

/// One collidable line and its outward normal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingLine {
    pub seg: LineSeg,
    pub normal: Vec2,
}

/// Result of a swept circle test against a bounding-line set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweptHit {
    /// Unit normal to reflect about (averaged over simultaneous lines)
    pub normal: Vec2,
    /// Fraction of the displacement travelled before contact, in [0, 1]
    pub toi: f32,
    /// Circle centre at the moment of contact
    pub contact_center: Vec2,
    /// The earliest line hit
    pub line: LineSeg,
}

/// Ordered set of collidable line segments with outward normals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingLines {
    lines: Vec<BoundingLine>,
}

impl BoundingLines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, seg: LineSeg, normal: Vec2) {
        self.lines.push(BoundingLine {
            seg,
            normal: normal.normalize_or_zero(),
        });
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundingLine> {
        self.lines.iter()
    }

    pub fn translated(&self, offset: Vec2) -> Self {
        Self {
            lines: self
                .lines
                .iter()
                .map(|l| BoundingLine {
                    seg: l.seg.translated(offset),
                    normal: l.normal,
                })
                .collect(),
        }
    }

    /// Box around every line endpoint
    pub fn aabb(&self) -> Option<Aabb> {
        let first = self.lines.first()?;
        let (mut min, mut max) = (first.seg.p1, first.seg.p1);
        for line in &self.lines {
            min = min.min(line.seg.p1).min(line.seg.p2);
            max = max.max(line.seg.p1).max(line.seg.p2);
        }
        Some(Aabb::new(min, max))
    }

    /// Closest point on any line, with that line's normal
    pub fn closest_point(&self, pt: Vec2) -> Option<(Vec2, Vec2)> {
        self.lines
            .iter()
            .map(|l| (l.seg.closest_point(pt), l.normal))
            .min_by(|a, b| a.0.distance_squared(pt).total_cmp(&b.0.distance_squared(pt)))
    }

    /// Half-plane test against every line's normal
    pub fn is_inside(&self, pt: Vec2) -> bool {
        !self.lines.is_empty()
            && self.lines.iter().all(|l| {
                let mut from_line = pt - l.seg.p1;
                if from_line == Vec2::ZERO {
                    from_line = pt - l.seg.p2;
                }
                from_line.dot(l.normal) < 0.0
            })
    }

    /// Static overlap between a circle and any line
    pub fn overlaps_circle(&self, circle: &Circle) -> bool {
        let r_sq = circle.radius * circle.radius;
        self.lines.iter().any(|l| l.seg.sq_dist_to(circle.center) <= r_sq)
    }

    /// Nearest ray hit over all lines
    pub fn ray_hit(&self, ray: &Ray) -> Option<f32> {
        self.lines
            .iter()
            .filter_map(|l| ray.hit_segment(&l.seg))
            .min_by(f32::total_cmp)
    }

    /// Swept test of a circle moving by `displacement` this frame.
    ///
    /// Lines whose outward normal faces along the motion are skipped, so a
    /// circle resting against a line it is leaving does not collide again.
    /// Hits within `TOI_EPSILON` of the earliest are treated as simultaneous
    /// and their normals averaged (corner hits).
    pub fn collide(&self, circle: &Circle, displacement: Vec2) -> Option<SweptHit> {
        let moving = displacement.length_squared() > 1e-12;

        let hits: Vec<(&BoundingLine, f32)> = self
            .lines
            .iter()
            .filter(|l| !moving || displacement.dot(l.normal) < 0.0)
            .filter_map(|l| l.seg.earliest_contact(circle, displacement).map(|t| (l, t)))
            .collect();

        let min_toi = hits.iter().map(|(_, t)| *t).min_by(f32::total_cmp)?;
        let contact_center = circle.center + displacement * min_toi;

        let mut simultaneous: Vec<&BoundingLine> = hits
            .iter()
            .filter(|(_, t)| *t <= min_toi + TOI_EPSILON)
            .map(|(l, _)| *l)
            .collect();

        if min_toi == 0.0 && simultaneous.len() > 1 {
            let closest = simultaneous
                .iter()
                .map(|l| l.seg.sq_dist_to(contact_center).sqrt())
                .fold(f32::INFINITY, f32::min);
            simultaneous.retain(|l| l.seg.sq_dist_to(contact_center).sqrt() <= closest + OVERLAP_DIST_EPSILON);
        }

        let normal = simultaneous
            .iter()
            .fold(Vec2::ZERO, |acc, l| acc + l.normal)
            .try_normalize()?;

        Some(SweptHit {
            normal,
            toi: min_toi,
            contact_center,
            line: simultaneous[0].seg,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> BoundingLines {
        // Square from (0,0) to (1,1), outward normals
        let mut b = BoundingLines::new();
        b.push(LineSeg::new(Vec2::new(0.0, 1.0), Vec2::new(0.0, 0.0)), Vec2::NEG_X);
        b.push(LineSeg::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0)), Vec2::NEG_Y);
        b.push(LineSeg::new(Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0)), Vec2::X);
        b.push(LineSeg::new(Vec2::new(1.0, 1.0), Vec2::new(0.0, 1.0)), Vec2::Y);
        b
    }

    #[test]
    fn test_swept_head_on_time_of_impact() {
        let mut lines = BoundingLines::new();
        lines.push(
            LineSeg::new(Vec2::new(-1.0, 1.5), Vec2::new(1.0, 1.5)),
            Vec2::NEG_Y,
        );
        let circle = Circle::new(Vec2::ZERO, 0.5);

        let hit = lines.collide(&circle, Vec2::new(0.0, 2.0)).unwrap();
        assert!((hit.toi - 0.5).abs() < 1e-5);
        assert!((hit.normal - Vec2::NEG_Y).length() < 1e-5);
        assert!((hit.contact_center - Vec2::new(0.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn test_swept_miss_when_short() {
        let mut lines = BoundingLines::new();
        lines.push(
            LineSeg::new(Vec2::new(-1.0, 1.5), Vec2::new(1.0, 1.5)),
            Vec2::NEG_Y,
        );
        let circle = Circle::new(Vec2::ZERO, 0.5);
        assert!(lines.collide(&circle, Vec2::new(0.0, 0.5)).is_none());
    }

    #[test]
    fn test_swept_catches_tunnelling() {
        // Fast circle whose start and end positions are both clear of the line
        let mut lines = BoundingLines::new();
        lines.push(
            LineSeg::new(Vec2::new(-1.0, 5.0), Vec2::new(1.0, 5.0)),
            Vec2::NEG_Y,
        );
        let circle = Circle::new(Vec2::ZERO, 0.1);
        let hit = lines.collide(&circle, Vec2::new(0.0, 10.0)).unwrap();
        assert!(hit.toi > 0.45 && hit.toi < 0.5);
    }

    #[test]
    fn test_swept_end_cap() {
        let mut lines = BoundingLines::new();
        lines.push(
            LineSeg::new(Vec2::new(-1.0, 2.0), Vec2::new(0.0, 2.0)),
            Vec2::NEG_Y,
        );
        // Passes just right of the segment end, clips the cap
        let circle = Circle::new(Vec2::new(0.3, 0.0), 0.5);
        let hit = lines.collide(&circle, Vec2::new(0.0, 4.0));
        assert!(hit.is_some());
        // Far enough right to miss entirely
        let circle = Circle::new(Vec2::new(0.6, 0.0), 0.5);
        assert!(lines.collide(&circle, Vec2::new(0.0, 4.0)).is_none());
    }

    #[test]
    fn test_receding_circle_ignores_line() {
        let mut lines = BoundingLines::new();
        lines.push(
            LineSeg::new(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0)),
            Vec2::Y,
        );
        // Touching the top and moving away
        let circle = Circle::new(Vec2::new(0.0, 0.5), 0.5);
        assert!(lines.collide(&circle, Vec2::new(0.0, 1.0)).is_none());
        // Touching and moving in
        assert!(lines.collide(&circle, Vec2::new(0.0, -1.0)).is_some());
    }

    #[test]
    fn test_nearest_line_wins() {
        let mut lines = BoundingLines::new();
        lines.push(
            LineSeg::new(Vec2::new(-5.0, 4.0), Vec2::new(5.0, 4.0)),
            Vec2::NEG_Y,
        );
        lines.push(
            LineSeg::new(Vec2::new(2.0, -5.0), Vec2::new(2.0, 5.0)),
            Vec2::NEG_X,
        );
        let circle = Circle::new(Vec2::ZERO, 0.5);
        let hit = lines.collide(&circle, Vec2::new(3.0, 3.0)).unwrap();
        // Reaches x=1.5 at t=0.5 before y=3.5 at t=1.17
        assert!((hit.normal - Vec2::NEG_X).length() < 1e-5);
        assert!((hit.toi - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_corner_hit_averages_normals() {
        let bounds = unit_box();
        // Aim diagonally at the (1,1) corner
        let circle = Circle::new(Vec2::new(2.0, 2.0), 0.1);
        let hit = bounds.collide(&circle, Vec2::new(-2.0, -2.0)).unwrap();
        let expected = Vec2::new(1.0, 1.0).normalize();
        assert!((hit.normal - expected).length() < 1e-3);
    }

    #[test]
    fn test_is_inside_and_aabb() {
        let bounds = unit_box();
        assert!(bounds.is_inside(Vec2::new(0.5, 0.5)));
        assert!(!bounds.is_inside(Vec2::new(1.5, 0.5)));
        let aabb = bounds.aabb().unwrap();
        assert_eq!(aabb.min, Vec2::ZERO);
        assert_eq!(aabb.max, Vec2::ONE);
        assert!(BoundingLines::new().aabb().is_none());
    }

    #[test]
    fn test_aabb_overlap() {
        let a = Aabb::from_center(Vec2::ZERO, Vec2::ONE);
        let b = Aabb::from_center(Vec2::new(1.5, 0.0), Vec2::ONE);
        let c = Aabb::from_center(Vec2::new(3.0, 0.0), Vec2::ONE * 0.5);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_ray_aabb() {
        let aabb = Aabb::new(Vec2::new(2.0, -1.0), Vec2::new(3.0, 1.0));
        let ray = Ray::new(Vec2::ZERO, Vec2::X).unwrap();
        assert!((ray.hit_aabb(&aabb).unwrap() - 2.0).abs() < 1e-5);

        let away = Ray::new(Vec2::ZERO, Vec2::NEG_X).unwrap();
        assert!(away.hit_aabb(&aabb).is_none());

        let inside = Ray::new(Vec2::new(2.5, 0.0), Vec2::Y).unwrap();
        assert_eq!(inside.hit_aabb(&aabb), Some(0.0));
    }

    #[test]
    fn test_ray_segment_and_degenerate_ray() {
        let seg = LineSeg::new(Vec2::new(-1.0, 3.0), Vec2::new(1.0, 3.0));
        let ray = Ray::new(Vec2::ZERO, Vec2::new(0.0, 2.0)).unwrap();
        assert!((ray.hit_segment(&seg).unwrap() - 3.0).abs() < 1e-5);
        assert!(Ray::new(Vec2::ZERO, Vec2::ZERO).is_err());
    }
}
