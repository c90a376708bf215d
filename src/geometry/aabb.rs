use num_traits::One;
use std::ops::Sub;

use nalgebra::{ClosedAddAssign, ClosedDivAssign, Point, Scalar};

use super::{FloatType, WorldPoint, WorldTransform, WorldTriangle};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AABB<Point> {
    pub min: Point,
    pub max: Point,
}

impl<Point> AABB<Point> {
    pub fn new(min: Point, max: Point) -> AABB<Point> {
        AABB { min, max }
    }

    pub fn map<Point2, F: FnMut(&Point) -> Point2>(&self, mut f: F) -> AABB<Point2> {
        AABB {
            min: f(&self.min),
            max: f(&self.max),
        }
    }
}

impl<Point: Sub + Copy> AABB<Point> {
    pub fn size(&self) -> Point::Output {
        self.max - self.min
    }
}

impl<T: Scalar + ClosedAddAssign + ClosedDivAssign + One, const D: usize> AABB<Point<T, D>> {
    pub fn center(&self) -> Point<T, D> {
        let two = T::one() + T::one();
        let avg_coords = (&self.min.coords + &self.max.coords) / two;
        Point::from(avg_coords)
    }
}

impl AABB<WorldPoint> {
    /// Box that contains nothing; growing it by anything yields exactly that thing.
    pub fn empty() -> Self {
        AABB {
            min: WorldPoint::new(FloatType::INFINITY, FloatType::INFINITY, FloatType::INFINITY),
            max: WorldPoint::new(
                FloatType::NEG_INFINITY,
                FloatType::NEG_INFINITY,
                FloatType::NEG_INFINITY,
            ),
        }
    }

    /// Returns the smallest box containing all the points, None if the iterator is empty.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a WorldPoint>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut ret = AABB::new(*first, *first);
        iter.for_each(|p| ret.grow(p));
        Some(ret)
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn grow(&mut self, point: &WorldPoint) {
        self.min = self.min.inf(point);
        self.max = self.max.sup(point);
    }

    pub fn grow_box(&mut self, other: &Self) {
        self.min = self.min.inf(&other.min);
        self.max = self.max.sup(&other.max);
    }

    pub fn grow_triangle(&mut self, triangle: &WorldTriangle) {
        triangle.iter().for_each(|p| self.grow(p));
    }

    pub fn union(&self, other: &Self) -> Self {
        AABB {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Surface area used as a cost metric. Empty boxes have zero area.
    pub fn surface_area(&self) -> FloatType {
        if self.is_empty() {
            return 0.0;
        }
        let size = self.size();
        2.0 * (size.x * size.y + size.y * size.z + size.z * size.x)
    }

    /// Half of the box size along each axis.
    pub fn half_extent(&self) -> super::WorldVector {
        self.size() * 0.5
    }

    /// Index of the axis with the largest extent (first one wins on ties).
    pub fn dominant_axis(&self) -> usize {
        let size = self.size();
        (1..3).fold(0, |best, i| if size[i] > size[best] { i } else { best })
    }

    pub fn contains_point(&self, p: &WorldPoint) -> bool {
        (0..3).all(|i| self.min[i] <= p[i] && p[i] <= self.max[i])
    }

    pub fn contains_box(&self, other: &Self) -> bool {
        other.is_empty() || (self.contains_point(&other.min) && self.contains_point(&other.max))
    }

    pub fn corners(&self) -> [WorldPoint; 8] {
        std::array::from_fn(|i| {
            WorldPoint::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            )
        })
    }

    /// Axis aligned box enclosing this box after transformation.
    pub fn transformed(&self, transform: &WorldTransform) -> Self {
        let mut ret = Self::empty();
        for corner in self.corners() {
            ret.grow(&transform.transform_point(&corner));
        }
        ret
    }
}
