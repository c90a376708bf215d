use simba::simd::{SimdValue, WideBoolF32x4, WideF32x4};
use wide::f32x4;

use crate::geometry::{FloatType, SimdFloatType};

/// Simba's wide wrappers are thin newtypes, the missing operations go straight to `wide`.
pub trait SimbaWorkarounds: SimdValue {
    fn is_nan(self) -> Self::SimdBool;

    fn infinity() -> Self;
    fn neg_infinity() -> Self;
}

impl SimbaWorkarounds for WideF32x4 {
    #[inline(always)]
    fn is_nan(self) -> Self::SimdBool {
        WideBoolF32x4(f32x4::is_nan(self.0))
    }

    #[inline(always)]
    fn infinity() -> Self {
        WideF32x4(f32x4::splat(f32::INFINITY))
    }

    #[inline(always)]
    fn neg_infinity() -> Self {
        WideF32x4(f32x4::splat(f32::NEG_INFINITY))
    }
}

/// Lanewise minimum, result is unspecified if any of the inputs is NaN.
#[inline(always)]
pub fn fast_min(a: SimdFloatType, b: SimdFloatType) -> SimdFloatType {
    WideF32x4(f32x4::fast_min(a.0, b.0))
}

/// Lanewise maximum, result is unspecified if any of the inputs is NaN.
#[inline(always)]
pub fn fast_max(a: SimdFloatType, b: SimdFloatType) -> SimdFloatType {
    WideF32x4(f32x4::fast_max(a.0, b.0))
}

pub fn simd_element_iter<T: SimdValue>(value: T) -> impl Iterator<Item = T::Element> {
    (0..T::LANES).map(move |i| value.extract(i))
}

/// Minimum over all lanes
#[inline(always)]
pub fn horizontal_min(value: SimdFloatType) -> FloatType {
    simd_element_iter(value).fold(FloatType::INFINITY, FloatType::min)
}

/// Maximum over all lanes
#[inline(always)]
pub fn horizontal_max(value: SimdFloatType) -> FloatType {
    simd_element_iter(value).fold(FloatType::NEG_INFINITY, FloatType::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;
    use proptest::prelude::Strategy;
    use test_strategy::proptest;

    fn simd_value_strategy() -> impl Strategy<Value = SimdFloatType> {
        proptest::array::uniform4(-1e3f32..1e3f32).prop_map_into()
    }

    #[test]
    fn nan_detection() {
        let v = SimdFloatType::from([0.0, f32::NAN, 1.0, f32::INFINITY]);
        let mask = v.is_nan();
        assert!(!mask.extract(0));
        assert!(mask.extract(1));
        assert!(!mask.extract(2));
        assert!(!mask.extract(3));
    }

    #[test]
    fn infinity_splats() {
        assert!(SimdFloatType::infinity().0.to_array() == [f32::INFINITY; 4]);
        assert!(SimdFloatType::neg_infinity().0.to_array() == [f32::NEG_INFINITY; 4]);
    }

    #[test]
    fn element_iter_visits_all_lanes() {
        let v = SimdFloatType::from([1.0, 2.0, 3.0, 4.0]);
        assert!(simd_element_iter(v).collect::<Vec<_>>() == vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[proptest]
    fn fast_min_max_match_scalar(
        #[strategy(simd_value_strategy())] a: SimdFloatType,
        #[strategy(simd_value_strategy())] b: SimdFloatType,
    ) {
        let min = fast_min(a, b);
        let max = fast_max(a, b);
        for i in 0..4 {
            assert!(min.extract(i) == a.extract(i).min(b.extract(i)));
            assert!(max.extract(i) == a.extract(i).max(b.extract(i)));
        }
    }

    #[proptest]
    fn horizontal_reductions_match_iterators(
        #[strategy(simd_value_strategy())] a: SimdFloatType,
    ) {
        let lanes: Vec<f32> = simd_element_iter(a).collect();
        assert!(horizontal_min(a) == lanes.iter().copied().fold(f32::INFINITY, f32::min));
        assert!(horizontal_max(a) == lanes.iter().copied().fold(f32::NEG_INFINITY, f32::max));
    }
}
