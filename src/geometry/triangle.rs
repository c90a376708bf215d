use std::ops::{Index, IndexMut, Mul, Sub};

use nalgebra::{
    ClosedAddAssign, ClosedDivAssign, ClosedMulAssign, ClosedSubAssign, DefaultAllocator, DimName,
    OPoint, OVector, Scalar, allocator::Allocator,
};
use num_traits::{One, Zero};
use simba::{scalar::ClosedAdd, simd::SimdValue};

use super::{WorldBox, WorldPoint};

#[derive(Clone, Debug, PartialEq)]
pub struct Triangle<Point>([Point; 3]);

impl<Point> Triangle<Point> {
    pub fn new(a: Point, b: Point, c: Point) -> Triangle<Point> {
        Triangle([a, b, c])
    }

    pub fn iter<'a>(&'a self) -> impl Iterator<Item = &'a Point> {
        self.0.iter()
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        3
    }

    pub fn map<Point2, F: FnMut(&Point) -> Point2>(&self, mut f: F) -> Triangle<Point2> {
        Triangle([f(&self[0]), f(&self[1]), f(&self[2])])
    }
}

impl<Point: Default> Default for Triangle<Point> {
    fn default() -> Self {
        Triangle([Default::default(), Default::default(), Default::default()])
    }
}

impl<Point> Index<usize> for Triangle<Point> {
    type Output = Point;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl<Point> IndexMut<usize> for Triangle<Point> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl<T: Scalar, D: DimName> Triangle<OPoint<T, D>>
where
    DefaultAllocator: Allocator<D>,
    T: ClosedAddAssign + ClosedDivAssign + Zero + From<u16>,
{
    pub fn centroid(&self) -> OPoint<T, D> {
        OPoint {
            coords: self.0.iter().map(|p| &p.coords).sum::<OVector<T, D>>()
                / T::from(self.0.len() as u16),
        }
    }
}

impl<T: Scalar, D: DimName> Triangle<OPoint<T, D>>
where
    DefaultAllocator: Allocator<D>,
    for<'a> &'a OPoint<T, D>: Sub<Output = OVector<T, D>>,
{
    /// Returns edge vectors, coming from self[0]
    pub fn edges(&self) -> [OVector<T, D>; 2] {
        [&self.0[1] - &self.0[0], &self.0[2] - &self.0[0]]
    }
}

impl<T: Scalar, D: DimName> Triangle<OPoint<T, D>>
where
    DefaultAllocator: Allocator<D>,
    for<'a> &'a OPoint<T, D>: Sub<Output = OVector<T, D>>,
    T: ClosedAddAssign + ClosedSubAssign + ClosedMulAssign,
{
    /// Returns a normal vector of the triangle, not normalized.
    pub fn normal(&self) -> OVector<T, D> {
        let [e1, e2] = self.edges();
        e1.cross(&e2)
    }
}

impl Triangle<WorldPoint> {
    pub fn bounding_box(&self) -> WorldBox {
        let mut ret = WorldBox::empty();
        ret.grow_triangle(self);
        ret
    }

    /// Degenerate triangle whose bounding box is exactly the given box.
    /// Its centroid is the center of the box (up to rounding).
    pub fn spanning_box(b: &WorldBox) -> Self {
        Triangle::new(b.min, b.max, b.center())
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct BarycentricCoordinates<T: SimdValue> {
    pub u: T,
    pub v: T,
}

impl<T> BarycentricCoordinates<T>
where
    T: SimdValue + One + Copy + Sub<Output = T>,
{
    pub fn interpolate<T2>(&self, a: &T2, b: &T2, c: &T2) -> T2
    where
        for<'a> &'a T2: Mul<T, Output = T2>,
        T2: ClosedAdd,
    {
        let w = T::one() - self.u - self.v;
        a * w + b * self.u + c * self.v
    }

    pub fn interpolate_triangle<T2>(&self, triangle: &Triangle<T2>) -> T2
    where
        for<'a> &'a T2: Mul<T, Output = T2>,
        T2: ClosedAdd,
    {
        self.interpolate(&triangle[0], &triangle[1], &triangle[2])
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::geometry::{WorldTriangle, WorldVector};

    use assert2::assert;

    fn triangle() -> WorldTriangle {
        Triangle::new(
            WorldPoint::new(-1.0, -1.0, 0.0),
            WorldPoint::new(0.0, 1.0, 0.0),
            WorldPoint::new(1.0, -1.0, 3.0),
        )
    }

    #[test]
    fn centroid_is_vertex_average() {
        assert!(triangle().centroid() == WorldPoint::new(0.0, -1.0 / 3.0, 1.0));
    }

    #[test]
    fn spanning_box_has_the_same_bounds() {
        let b = WorldBox::new(WorldPoint::new(-1.0, 2.0, -3.0), WorldPoint::new(4.0, 5.0, 6.0));
        let t = Triangle::spanning_box(&b);
        assert!(t.bounding_box() == b);
        assert!(t.centroid() == b.center());
    }

    #[test]
    fn interpolate_hits_vertices() {
        let t = triangle();
        let at = |u: f32, v: f32| {
            BarycentricCoordinates { u, v }.interpolate_triangle(&t.map(|p| p.coords))
        };

        assert!(at(0.0, 0.0) == t[0].coords);
        assert!(at(1.0, 0.0) == t[1].coords);
        assert!(at(0.0, 1.0) == t[2].coords);
    }

    #[test]
    fn normal_is_perpendicular_to_edges() {
        let t = triangle();
        let n: WorldVector = t.normal();
        let [e1, e2] = t.edges();
        assert!(n.dot(&e1).abs() < 1e-6);
        assert!(n.dot(&e2).abs() < 1e-6);
    }
}
