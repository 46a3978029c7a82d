//! Shared integer-space geometry: axis-aligned boxes over voxel/block
//! coordinates. Grounded on `original_source/math/rect3i.h` (an inclusive
//! integer box with `position`/`size`), adapted to Rust with `glam::IVec3`.

use glam::IVec3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aabb {
    pub min: IVec3,
    /// Exclusive upper bound on each axis.
    pub max: IVec3,
}

impl Aabb {
    pub fn new(min: IVec3, max: IVec3) -> Self {
        Self { min, max }
    }

    pub fn from_min_size(min: IVec3, size: IVec3) -> Self {
        Self {
            min,
            max: min + size,
        }
    }

    pub fn size(&self) -> IVec3 {
        self.max - self.min
    }

    pub fn volume(&self) -> i64 {
        let s = self.size();
        s.x as i64 * s.y as i64 * s.z as i64
    }

    pub fn contains(&self, p: IVec3) -> bool {
        p.x >= self.min.x
            && p.y >= self.min.y
            && p.z >= self.min.z
            && p.x < self.max.x
            && p.y < self.max.y
            && p.z < self.max.z
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
            && self.min.z < other.max.z
            && self.max.z > other.min.z
    }

    /// Clip `self` to fit inside `other`, returning `None` if disjoint.
    pub fn clipped(&self, other: &Aabb) -> Option<Aabb> {
        if !self.intersects(other) {
            return None;
        }
        Some(Aabb {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        })
    }

    pub fn padded(&self, amount: i32) -> Aabb {
        Aabb {
            min: self.min - IVec3::splat(amount),
            max: self.max + IVec3::splat(amount),
        }
    }

    /// Iterate every integer point inside the box, X fastest.
    pub fn iter_points(&self) -> impl Iterator<Item = IVec3> + '_ {
        let size = self.size();
        (0..size.z).flat_map(move |z| {
            (0..size.y).flat_map(move |y| {
                (0..size.x).map(move |x| self.min + IVec3::new(x, y, z))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clipping_shrinks_to_intersection() {
        let a = Aabb::from_min_size(IVec3::ZERO, IVec3::splat(10));
        let b = Aabb::from_min_size(IVec3::splat(5), IVec3::splat(10));
        let c = a.clipped(&b).unwrap();
        assert_eq!(c.min, IVec3::splat(5));
        assert_eq!(c.max, IVec3::splat(10));
    }

    #[test]
    fn disjoint_boxes_do_not_clip() {
        let a = Aabb::from_min_size(IVec3::ZERO, IVec3::splat(2));
        let b = Aabb::from_min_size(IVec3::splat(10), IVec3::splat(2));
        assert!(a.clipped(&b).is_none());
    }
}
