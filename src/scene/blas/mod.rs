mod building;
mod printing;
mod ray_blas_intersection;

use std::ops::Range;

use index_vec::{IndexSlice, IndexVec};

use crate::geometry::{PrimitiveId, WorldBox, WorldPoint};

pub use printing::BvhStatistics;

/// Maximum depth of the hierarchy, subdivision stops here even if a split would pay off.
/// Bounds the traversal stack size.
pub const MAX_DEPTH: usize = 64;

/// Maximum number of triangles in a single hierarchy.
/// The highest primitive index is left out, so that a real hit never packs to `PrimitiveId::NONE`.
pub const MAX_PRIMITIVE_COUNT: usize = PrimitiveId::MAX_PRIMITIVE as usize;

/// Bounding volume hierarchy over triangles of a single mesh, in mesh local space.
/// Triangles themselves are not stored here, every operation takes the same slice that the
/// hierarchy was built over.
#[derive(Clone, Debug, Default)]
pub struct Blas {
    /// Node 0 is the root, children of an inner node are always stored next to each other.
    nodes: IndexVec<NodeIdx, BvhNode>,
    /// Permutation of triangle indices, leaves reference contiguous ranges of it.
    primitive_indices: IndexVec<PrimitiveSlot, PrimitiveIdx>,
    /// Triangle centroids, only used during building.
    centroids: IndexVec<PrimitiveIdx, WorldPoint>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BvhNode {
    pub bounds: WorldBox,
    /// Left child index for inner nodes (right child is `first + 1`),
    /// first primitive slot for leaves.
    first: u32,
    /// Number of primitives in a leaf, zero for inner nodes.
    count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeLink {
    Inner { left: NodeIdx, right: NodeIdx },
    Leaf { slots: Range<PrimitiveSlot> },
}

impl BvhNode {
    fn new_leaf(bounds: WorldBox, first: PrimitiveSlot, count: usize) -> Self {
        debug_assert!(count > 0);
        BvhNode {
            bounds,
            first: first.raw(),
            count: count as u32,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.count > 0
    }

    /// Number of primitives in a leaf, 0 for inner nodes
    pub fn primitive_count(&self) -> usize {
        self.count as usize
    }

    pub fn decode(&self) -> NodeLink {
        if self.is_leaf() {
            let first = PrimitiveSlot::from_raw(self.first);
            NodeLink::Leaf {
                slots: first..first + self.count as usize,
            }
        } else {
            let left = NodeIdx::from_raw(self.first);
            NodeLink::Inner {
                left,
                right: left + 1,
            }
        }
    }
}

index_vec::define_index_type! {
    pub struct NodeIdx = u32;
    IMPL_RAW_CONVERSIONS = true;
}

index_vec::define_index_type! {
    /// Index of a triangle in the mesh.
    pub struct PrimitiveIdx = u32;
    MAX_INDEX = MAX_PRIMITIVE_COUNT - 1;
    IMPL_RAW_CONVERSIONS = true;
}

index_vec::define_index_type! {
    /// Position in the leaf ordering of triangles.
    /// One past the last slot is valid too, as a range end.
    pub struct PrimitiveSlot = u32;
    MAX_INDEX = MAX_PRIMITIVE_COUNT;
    IMPL_RAW_CONVERSIONS = true;
}

impl Blas {
    pub fn root_index() -> NodeIdx {
        NodeIdx::new(0)
    }

    pub fn nodes(&self) -> &IndexSlice<NodeIdx, [BvhNode]> {
        &self.nodes
    }

    pub fn primitive_indices(&self) -> &IndexSlice<PrimitiveSlot, [PrimitiveIdx]> {
        &self.primitive_indices
    }

    /// Number of triangles the hierarchy was built over
    pub fn primitive_count(&self) -> usize {
        self.primitive_indices.len()
    }

    /// Bounds of the whole hierarchy, empty box if nothing was built yet.
    pub fn bounding_box(&self) -> WorldBox {
        self.nodes
            .first()
            .map_or_else(WorldBox::empty, |root| root.bounds)
    }
}
