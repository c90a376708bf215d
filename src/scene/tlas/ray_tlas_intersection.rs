use index_vec::IndexSlice;

use crate::{
    geometry::{HitRecord, Ray, WorldBox},
    scene::{
        InstanceIdx, MeshIdx,
        instance::Instance,
        mesh::Mesh,
        traversal::{StackCache, TraversableTree, TraversalObserver, ordered_traversal},
    },
};

use super::{Tlas, TlasLink, TlasNodeIdx};

/// Traversal stack for the top level hierarchy.
/// Tree depth is not limited, so the stack lives on the heap and can be reused between queries.
pub type TlasStack = StackCache<TlasNodeIdx>;

impl TraversableTree for Tlas {
    type Node = TlasNodeIdx;

    fn root(&self) -> TlasNodeIdx {
        Tlas::root_index()
    }

    fn bounds(&self, node: TlasNodeIdx) -> &WorldBox {
        &self.nodes[node].bounds
    }

    fn children(&self, node: TlasNodeIdx) -> Option<(TlasNodeIdx, TlasNodeIdx)> {
        match self.nodes[node].decode() {
            TlasLink::Inner { left, right } => Some((left, right)),
            TlasLink::Leaf { .. } => None,
        }
    }
}

impl Tlas {
    /// Finds the nearest hit over all instances closer than `hit.t`, updating `hit` if found.
    /// Returns true if `hit` was updated.
    pub fn intersect(
        &self,
        instances: &IndexSlice<InstanceIdx, [Instance]>,
        meshes: &IndexSlice<MeshIdx, [Mesh]>,
        ray: &Ray,
        hit: &mut HitRecord,
        stack: &mut TlasStack,
    ) -> bool {
        self.intersect_observed(instances, meshes, ray, hit, stack, &mut ())
    }

    pub fn intersect_observed<O: TraversalObserver>(
        &self,
        instances: &IndexSlice<InstanceIdx, [Instance]>,
        meshes: &IndexSlice<MeshIdx, [Mesh]>,
        ray: &Ray,
        hit: &mut HitRecord,
        stack: &mut TlasStack,
        observer: &mut O,
    ) -> bool {
        if self.nodes.is_empty() {
            return false;
        }

        ordered_traversal(
            self,
            ray,
            hit,
            &mut stack.stack,
            observer,
            |node, hit, observer| {
                let TlasLink::Leaf { instance } = self.nodes[node].decode() else {
                    unreachable!("Traversal only calls back for leaves");
                };
                instances[instance].intersect_observed(instance, meshes, ray, hit, observer)
            },
        )
    }
}
