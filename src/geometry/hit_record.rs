use super::{BarycentricCoordinates, FloatType};

/// Identifier of a hit triangle, packed into 32 bits:
/// instance index in the upper 12 bits, primitive index in the lower 20 bits.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrimitiveId(u32);

impl PrimitiveId {
    pub const INSTANCE_BITS: u32 = 12;
    pub const PRIMITIVE_BITS: u32 = 20;
    const PRIMITIVE_MASK: u32 = (1 << Self::PRIMITIVE_BITS) - 1;

    /// Highest valid instance index.
    pub const MAX_INSTANCE: u32 = (1 << Self::INSTANCE_BITS) - 1;
    /// Highest valid primitive index.
    pub const MAX_PRIMITIVE: u32 = Self::PRIMITIVE_MASK;

    /// Value of a hit record that hasn't hit anything yet.
    pub const NONE: Self = Self(u32::MAX);

    /// Pack an instance and primitive index, panics if either is out of range
    pub fn new(instance: u32, primitive: u32) -> Self {
        assert!(instance <= Self::MAX_INSTANCE);
        assert!(primitive <= Self::MAX_PRIMITIVE);
        Self(instance << Self::PRIMITIVE_BITS | primitive)
    }

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn instance(self) -> u32 {
        self.0 >> Self::PRIMITIVE_BITS
    }

    pub fn primitive(self) -> u32 {
        self.0 & Self::PRIMITIVE_MASK
    }

    /// Keeps the primitive index and replaces the instance index
    pub fn with_instance(self, instance: u32) -> Self {
        Self::new(instance, self.primitive())
    }
}

impl Default for PrimitiveId {
    fn default() -> Self {
        Self::NONE
    }
}

impl std::fmt::Debug for PrimitiveId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if *self == Self::NONE {
            f.write_str("PrimitiveId(NONE)")
        } else {
            f.debug_struct("PrimitiveId")
                .field("instance", &self.instance())
                .field("primitive", &self.primitive())
                .finish()
        }
    }
}

/// Nearest intersection found so far.
/// `t` doubles as the maximum distance of the query: traversal only accepts hits closer than it
/// and shrinks it with every accepted hit.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HitRecord {
    pub t: FloatType,
    pub uv: BarycentricCoordinates<FloatType>,
    pub id: PrimitiveId,
}

impl HitRecord {
    pub fn with_max_distance(max_t: FloatType) -> Self {
        HitRecord {
            t: max_t,
            uv: BarycentricCoordinates::default(),
            id: PrimitiveId::NONE,
        }
    }

    pub fn is_hit(&self) -> bool {
        self.id != PrimitiveId::NONE
    }
}

impl Default for HitRecord {
    fn default() -> Self {
        Self::with_max_distance(FloatType::INFINITY)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use assert2::assert;
    use test_strategy::proptest;

    #[proptest]
    fn packing(
        #[strategy(0u32..=PrimitiveId::MAX_INSTANCE)] instance: u32,
        #[strategy(0u32..=PrimitiveId::MAX_PRIMITIVE)] primitive: u32,
    ) {
        let id = PrimitiveId::new(instance, primitive);
        assert!(id.instance() == instance);
        assert!(id.primitive() == primitive);
        assert!(id.raw() == (instance << 20) | primitive);
    }

    #[test]
    fn with_instance_keeps_primitive() {
        let id = PrimitiveId::new(0, 12345).with_instance(4095);
        assert!(id.instance() == 4095);
        assert!(id.primitive() == 12345);
    }

    #[test]
    fn fresh_record_is_not_a_hit() {
        let hit = HitRecord::with_max_distance(10.0);
        assert!(!hit.is_hit());
        assert!(hit.t == 10.0);
    }

    #[test]
    #[should_panic]
    fn instance_out_of_range() {
        PrimitiveId::new(PrimitiveId::MAX_INSTANCE + 1, 0);
    }

    #[test]
    #[should_panic]
    fn primitive_out_of_range() {
        PrimitiveId::new(0, PrimitiveId::MAX_PRIMITIVE + 1);
    }
}
