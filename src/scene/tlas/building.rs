use index_vec::IndexSlice;
use log::debug;

use crate::{
    geometry::WorldBox,
    scene::{
        BuildError, InstanceIdx, MAX_INSTANCE_COUNT,
        blas::{NodeLink, PrimitiveIdx},
        instance::Instance,
        kd_tree::{KdTree, pair_key},
        settings::TlasBuildPolicy,
    },
};

use super::{CompressedTlasLink, Tlas, TlasBuildContext, TlasNode, TlasNodeIdx};

/// Nearest neighbor search over the active clusters of agglomerative building.
trait ClusterIndex {
    /// Finds the active cluster minimizing the area of its union with `cluster`,
    /// None if `cluster` is the only one.
    fn nearest(
        &self,
        cluster: TlasNodeIdx,
        nodes: &IndexSlice<TlasNodeIdx, [TlasNode]>,
    ) -> Option<TlasNodeIdx>;

    /// Replaces two active clusters with the node that merges them.
    fn merge(
        &mut self,
        a: TlasNodeIdx,
        b: TlasNodeIdx,
        merged: TlasNodeIdx,
        bounds: &WorldBox,
    ) -> Result<(), BuildError>;
}

/// Brute force cluster index, quadratic in total.
struct LinearScan<'a> {
    active: &'a mut Vec<TlasNodeIdx>,
}

impl ClusterIndex for LinearScan<'_> {
    fn nearest(
        &self,
        cluster: TlasNodeIdx,
        nodes: &IndexSlice<TlasNodeIdx, [TlasNode]>,
    ) -> Option<TlasNodeIdx> {
        let bounds = &nodes[cluster].bounds;
        self.active
            .iter()
            .filter(|other| **other != cluster)
            .min_by_key(|other| {
                let area = bounds.union(&nodes[**other].bounds).surface_area();
                pair_key(cluster.raw().into(), other.raw().into(), area)
            })
            .copied()
    }

    fn merge(
        &mut self,
        a: TlasNodeIdx,
        b: TlasNodeIdx,
        merged: TlasNodeIdx,
        _bounds: &WorldBox,
    ) -> Result<(), BuildError> {
        self.active.retain(|cluster| *cluster != a && *cluster != b);
        self.active.push(merged);
        Ok(())
    }
}

impl ClusterIndex for KdTree {
    fn nearest(
        &self,
        cluster: TlasNodeIdx,
        _nodes: &IndexSlice<TlasNodeIdx, [TlasNode]>,
    ) -> Option<TlasNodeIdx> {
        self.find_nearest(cluster.raw().into())
            .map(|other| TlasNodeIdx::new(other as usize))
    }

    fn merge(
        &mut self,
        a: TlasNodeIdx,
        b: TlasNodeIdx,
        merged: TlasNodeIdx,
        bounds: &WorldBox,
    ) -> Result<(), BuildError> {
        self.remove(a.raw().into())?;
        self.remove(b.raw().into())?;
        self.insert(merged.raw().into(), *bounds)?;
        Ok(())
    }
}

impl Tlas {
    /// Builds the hierarchy over all instances with the given algorithm.
    pub fn build(
        &mut self,
        instances: &IndexSlice<InstanceIdx, [Instance]>,
        policy: TlasBuildPolicy,
        context: &mut TlasBuildContext,
    ) -> Result<(), BuildError> {
        match policy {
            TlasBuildPolicy::Agglomerative => self.build_agglomerative(instances, context)?,
            TlasBuildPolicy::Quick => self.build_quick(instances, context)?,
            TlasBuildPolicy::Clustered => self.build_clustered(instances, context)?,
        }

        debug!(
            "Built TLAS over {} instances using {policy:?}: {}",
            instances.len(),
            self.statistics()
        );
        Ok(())
    }

    /// Greedy bottom up clustering, always merging mutual nearest neighbors.
    pub fn build_agglomerative(
        &mut self,
        instances: &IndexSlice<InstanceIdx, [Instance]>,
        context: &mut TlasBuildContext,
    ) -> Result<(), BuildError> {
        check_instance_count(instances)?;
        self.init_leaves(instances);

        context.active.clear();
        context.active.extend(self.nodes.indices().skip(1));
        self.cluster(&mut LinearScan {
            active: &mut context.active,
        })
    }

    /// Same clustering as `build_agglomerative`, neighbors are found using a kd-tree.
    pub fn build_clustered(
        &mut self,
        instances: &IndexSlice<InstanceIdx, [Instance]>,
        context: &mut TlasBuildContext,
    ) -> Result<(), BuildError> {
        check_instance_count(instances)?;
        self.init_leaves(instances);

        context.kd_tree.rebuild(
            self.nodes
                .iter_enumerated()
                .skip(1)
                .map(|(index, node)| (index.raw().into(), node.bounds)),
        )?;
        self.cluster(&mut context.kd_tree)
    }

    /// SAH hierarchy over instance bounds, built by the bottom level builder on surrogate
    /// triangles and converted node by node.
    pub fn build_quick(
        &mut self,
        instances: &IndexSlice<InstanceIdx, [Instance]>,
        context: &mut TlasBuildContext,
    ) -> Result<(), BuildError> {
        check_instance_count(instances)?;

        context.prepare_surrogates(instances.iter().map(Instance::bounds));
        context.surrogate_blas.rebuild(&context.surrogates)?;
        let blas = &context.surrogate_blas;

        // Surrogate hierarchy node indices are kept, leaf content gets filled in below
        self.nodes.clear();
        self.nodes.extend(
            blas.nodes()
                .iter()
                .map(|node| TlasNode::new_leaf(node.bounds, InstanceIdx::new(0))),
        );

        for (index, node) in blas.nodes().iter_enumerated() {
            let index = TlasNodeIdx::new(index.index());
            match node.decode() {
                NodeLink::Inner { left, right } => {
                    self.nodes[index].link = CompressedTlasLink::new_inner(
                        TlasNodeIdx::new(left.index()),
                        TlasNodeIdx::new(right.index()),
                    );
                }
                NodeLink::Leaf { slots } => {
                    let members = blas.primitive_indices()[slots].as_raw_slice();
                    self.expand_leaf(index, members, instances);
                }
            }
        }

        Ok(())
    }

    /// Places leaves for all instances after the reserved root slot.
    fn init_leaves(&mut self, instances: &IndexSlice<InstanceIdx, [Instance]>) {
        self.nodes.clear();
        self.nodes
            .push(TlasNode::new_leaf(WorldBox::empty(), InstanceIdx::new(0)));
        self.nodes.extend(
            instances
                .iter_enumerated()
                .map(|(index, instance)| TlasNode::new_leaf(*instance.bounds(), index)),
        );
    }

    fn cluster(&mut self, index: &mut impl ClusterIndex) -> Result<(), BuildError> {
        let mut a = TlasNodeIdx::new(1);
        let mut b = index.nearest(a, &self.nodes);

        while let Some(b_node) = b {
            let c = index.nearest(b_node, &self.nodes);
            if c == Some(a) {
                let bounds = self.nodes[a].bounds.union(&self.nodes[b_node].bounds);
                let merged = self.nodes.push(TlasNode::new_inner(bounds, a, b_node));
                index.merge(a, b_node, merged, &bounds)?;
                a = merged;
                b = index.nearest(a, &self.nodes);
            } else {
                a = b_node;
                b = c;
            }
        }

        self.nodes[Tlas::root_index()] = self.nodes[a];
        Ok(())
    }

    /// Replaces the node at `at` with a balanced subtree over the instances.
    fn expand_leaf(
        &mut self,
        at: TlasNodeIdx,
        members: &[PrimitiveIdx],
        instances: &IndexSlice<InstanceIdx, [Instance]>,
    ) {
        if let [single] = members {
            let instance = InstanceIdx::new(single.index());
            self.nodes[at] = TlasNode::new_leaf(*instances[instance].bounds(), instance);
            return;
        }

        let (left_members, right_members) = members.split_at(members.len() / 2);
        let placeholder = self.nodes[at];
        let left = self.nodes.push(placeholder);
        let right = self.nodes.push(placeholder);
        self.expand_leaf(left, left_members, instances);
        self.expand_leaf(right, right_members, instances);

        let bounds = self.nodes[left].bounds.union(&self.nodes[right].bounds);
        self.nodes[at] = TlasNode::new_inner(bounds, left, right);
    }
}

fn check_instance_count(instances: &IndexSlice<InstanceIdx, [Instance]>) -> Result<(), BuildError> {
    if instances.is_empty() {
        Err(BuildError::EmptyScene)
    } else if instances.len() > MAX_INSTANCE_COUNT {
        Err(BuildError::TooManyInstances {
            count: instances.len(),
            max: MAX_INSTANCE_COUNT,
        })
    } else {
        Ok(())
    }
}
