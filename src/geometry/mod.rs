mod aabb;
mod hit_record;
mod ray_box_intersection;
mod ray_triangle_intersection;
mod triangle;

pub use aabb::AABB;
pub use hit_record::{HitRecord, PrimitiveId};
pub use ray_box_intersection::{PackedBox, PackedRay, RayIntersectionExt};
pub use ray_triangle_intersection::MIN_HIT_DISTANCE;
pub use triangle::{BarycentricCoordinates, Triangle};

pub type FloatType = f32;
pub type SimdFloatType = simba::simd::WideF32x4;

pub const EPSILON: FloatType = 1e-6;

pub type WorldPoint = nalgebra::Point3<FloatType>;
pub type WorldVector = nalgebra::Vector3<FloatType>;
pub type WorldBox = AABB<WorldPoint>;
pub type WorldTriangle = Triangle<WorldPoint>;
pub type WorldTransform = nalgebra::Matrix4<FloatType>;

#[derive(Copy, Clone, Debug)]
pub struct Ray {
    pub origin: WorldPoint,
    pub direction: WorldVector,

    /// Componentwise inverse of the ray direction
    /// Zeros in direction get turned into positive infinity regardless of the sign of the zero
    pub inv_direction: WorldVector,
}

impl Ray {
    /// Creates a ray with normalized direction.
    pub fn new(origin: WorldPoint, direction: WorldVector) -> Ray {
        Self::with_unnormalized_direction(origin, direction.normalize())
    }

    /// Creates a ray keeping the direction length as is.
    /// Distances along such ray are measured in multiples of the direction length.
    pub fn with_unnormalized_direction(origin: WorldPoint, direction: WorldVector) -> Ray {
        debug_assert!(direction.norm_squared() > 0.0, "Ray direction must be non-zero");
        let inv_direction = direction.map(|x| if x == 0.0 { FloatType::INFINITY } else { 1.0 / x });

        Ray {
            origin,
            direction,
            inv_direction,
        }
    }

    pub fn point_at(&self, distance: FloatType) -> WorldPoint {
        self.origin + self.direction * distance
    }

    /// Transforms the ray by a homogeneous matrix without renormalizing the direction,
    /// so that distances along the transformed ray match distances along this one.
    pub fn transformed(&self, transform: &WorldTransform) -> Ray {
        Self::with_unnormalized_direction(
            transform.transform_point(&self.origin),
            transform.transform_vector(&self.direction),
        )
    }
}
