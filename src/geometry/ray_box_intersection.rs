use simba::simd::SimdValue;

use crate::{
    geometry::{FloatType, Ray, SimdFloatType, WorldBox},
    util::simba::{SimbaWorkarounds as _, fast_max, fast_min, horizontal_max, horizontal_min},
};

pub trait RayIntersectionExt {
    /// Calculate first and last ray intersection with the box.
    /// Returns minimum and maximum distance along the ray, ray intersects if min <= max.
    fn intersect(&self, ray: &Ray) -> (FloatType, FloatType);
}

/// Scalar slab test, kept as the reference for the packed version.
impl RayIntersectionExt for WorldBox {
    fn intersect(&self, ray: &Ray) -> (FloatType, FloatType) {
        let mut min_t = FloatType::NEG_INFINITY;
        let mut max_t = FloatType::INFINITY;

        for axis in 0..3 {
            let mut to_min = (self.min[axis] - ray.origin[axis]) * ray.inv_direction[axis];
            let mut to_max = (self.max[axis] - ray.origin[axis]) * ray.inv_direction[axis];
            // NaN if the ray starts on the slab boundary and is parallel to it.
            if to_min.is_nan() {
                to_min = FloatType::NEG_INFINITY;
            }
            if to_max.is_nan() {
                to_max = FloatType::INFINITY;
            }

            min_t = min_t.max(to_min.min(to_max));
            max_t = max_t.min(to_min.max(to_max));
        }

        (min_t, max_t)
    }
}

/// Ray origin and inverse direction with the three axes packed in SIMD lanes,
/// precomputed once per traversal.
#[derive(Copy, Clone, Debug)]
pub struct PackedRay {
    origin: SimdFloatType,
    inv_direction: SimdFloatType,
}

impl From<&Ray> for PackedRay {
    fn from(ray: &Ray) -> Self {
        PackedRay {
            origin: SimdFloatType::from([ray.origin.x, ray.origin.y, ray.origin.z, 0.0]),
            inv_direction: SimdFloatType::from([
                ray.inv_direction.x,
                ray.inv_direction.y,
                ray.inv_direction.z,
                1.0,
            ]),
        }
    }
}

/// Bounding box with the three axes packed in SIMD lanes.
/// The fourth lane spans the whole real line, so that it never limits the result.
#[derive(Copy, Clone, Debug)]
pub struct PackedBox {
    min: SimdFloatType,
    max: SimdFloatType,
}

impl From<&WorldBox> for PackedBox {
    fn from(b: &WorldBox) -> Self {
        PackedBox {
            min: SimdFloatType::from([b.min.x, b.min.y, b.min.z, FloatType::NEG_INFINITY]),
            max: SimdFloatType::from([b.max.x, b.max.y, b.max.z, FloatType::INFINITY]),
        }
    }
}

impl PackedBox {
    /// Slab test of all axes at once.
    #[inline]
    pub fn intersect_packed(&self, ray: &PackedRay) -> (FloatType, FloatType) {
        // Parallel rays starting on the slab boundary produce NaN, these get blended
        // to +-infinity so that the slab doesn't limit the range.
        let to_box_min = (self.min - ray.origin) * ray.inv_direction;
        let to_box_min = SimdFloatType::neg_infinity().select(to_box_min.is_nan(), to_box_min);
        let to_box_max = (self.max - ray.origin) * ray.inv_direction;
        let to_box_max = SimdFloatType::infinity().select(to_box_max.is_nan(), to_box_max);

        let near = fast_min(to_box_min, to_box_max);
        let far = fast_max(to_box_min, to_box_max);

        (horizontal_max(near), horizontal_min(far))
    }
}

impl RayIntersectionExt for PackedBox {
    fn intersect(&self, ray: &Ray) -> (FloatType, FloatType) {
        self.intersect_packed(&PackedRay::from(ray))
    }
}
