mod building;
mod printing;
mod ray_tlas_intersection;

use index_vec::{IndexSlice, IndexVec};

use crate::geometry::{Triangle, WorldBox, WorldTriangle};

use super::{InstanceIdx, blas::Blas, kd_tree::KdTree, settings::KdTreeSettings};

pub use printing::TlasStatistics;
pub use ray_tlas_intersection::TlasStack;

/// Top level hierarchy over instances.
/// Node 0 is the root, other nodes are in no particular order.
#[derive(Clone, Debug, Default)]
pub struct Tlas {
    nodes: IndexVec<TlasNodeIdx, TlasNode>,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TlasNode {
    pub bounds: WorldBox,
    link: CompressedTlasLink,
}

/// Either two child node indices (16 bits each), or an instance index.
/// The root is never a child, so a right child index is never zero and inner links never have
/// the upper half zero.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq)]
struct CompressedTlasLink(u32);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TlasLink {
    Inner {
        left: TlasNodeIdx,
        right: TlasNodeIdx,
    },
    Leaf {
        instance: InstanceIdx,
    },
}

impl CompressedTlasLink {
    const INDEX_BITS: u32 = 16;
    const INDEX_MASK: u32 = (1 << Self::INDEX_BITS) - 1;

    pub const MAX_INDEX: u32 = Self::INDEX_MASK;

    fn new_inner(left: TlasNodeIdx, right: TlasNodeIdx) -> Self {
        assert!(right.raw() != 0, "Root can't be a child");
        Self(u32::from(left.raw()) | u32::from(right.raw()) << Self::INDEX_BITS)
    }

    fn new_leaf(instance: InstanceIdx) -> Self {
        Self(u32::from(instance.raw()))
    }

    fn decode(&self) -> TlasLink {
        let right = self.0 >> Self::INDEX_BITS;
        if right == 0 {
            TlasLink::Leaf {
                instance: InstanceIdx::from_raw(self.0 as u16),
            }
        } else {
            TlasLink::Inner {
                left: TlasNodeIdx::from_raw((self.0 & Self::INDEX_MASK) as u16),
                right: TlasNodeIdx::from_raw(right as u16),
            }
        }
    }
}

impl std::fmt::Debug for CompressedTlasLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlasLink")
            .field("0", &self.0)
            .field("<decoded>", &self.decode())
            .finish()
    }
}

index_vec::define_index_type! {
    pub struct TlasNodeIdx = u16;
    MAX_INDEX = CompressedTlasLink::MAX_INDEX as usize;
    IMPL_RAW_CONVERSIONS = true;
}

impl TlasNode {
    fn new_inner(bounds: WorldBox, left: TlasNodeIdx, right: TlasNodeIdx) -> Self {
        TlasNode {
            bounds,
            link: CompressedTlasLink::new_inner(left, right),
        }
    }

    fn new_leaf(bounds: WorldBox, instance: InstanceIdx) -> Self {
        TlasNode {
            bounds,
            link: CompressedTlasLink::new_leaf(instance),
        }
    }

    pub fn decode(&self) -> TlasLink {
        self.link.decode()
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.decode(), TlasLink::Leaf { .. })
    }
}

impl Tlas {
    pub fn root_index() -> TlasNodeIdx {
        TlasNodeIdx::new(0)
    }

    pub fn nodes(&self) -> &IndexSlice<TlasNodeIdx, [TlasNode]> {
        &self.nodes
    }

    /// Bounds of the whole scene, empty box if nothing was built yet.
    pub fn bounding_box(&self) -> WorldBox {
        self.nodes
            .first()
            .map_or_else(WorldBox::empty, |root| root.bounds)
    }

    /// Instances referenced by leaves, in depth first order.
    pub fn reachable_instances(&self) -> Vec<InstanceIdx> {
        let mut ret = Vec::new();
        if self.nodes.is_empty() {
            return ret;
        }

        let mut stack = vec![Tlas::root_index()];
        while let Some(index) = stack.pop() {
            match self.nodes[index].decode() {
                TlasLink::Inner { left, right } => {
                    stack.push(right);
                    stack.push(left);
                }
                TlasLink::Leaf { instance } => ret.push(instance),
            }
        }
        ret
    }
}

/// Scratch space for building the top level hierarchy.
/// Keeping one around between frames avoids reallocating on every rebuild.
#[derive(Clone, Debug, Default)]
pub struct TlasBuildContext {
    kd_tree: KdTree,
    /// Active cluster list of the linear nearest neighbor search.
    active: Vec<TlasNodeIdx>,
    surrogates: Vec<WorldTriangle>,
    surrogate_blas: Blas,
}

impl TlasBuildContext {
    pub fn new(kd_tree_settings: KdTreeSettings) -> TlasBuildContext {
        TlasBuildContext {
            kd_tree: KdTree::new(kd_tree_settings),
            ..Default::default()
        }
    }

    /// Builds surrogate triangles whose bounding boxes are exactly the given boxes.
    fn prepare_surrogates<'a>(&mut self, bounds: impl IntoIterator<Item = &'a WorldBox>) {
        self.surrogates.clear();
        self.surrogates
            .extend(bounds.into_iter().map(Triangle::spanning_box));
    }
}
