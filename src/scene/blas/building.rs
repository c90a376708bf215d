use std::ops::Range;

use log::{debug, warn};

use crate::{
    geometry::{FloatType, WorldBox, WorldTriangle},
    scene::BuildError,
};

use super::{
    Blas, BvhNode, MAX_DEPTH, MAX_PRIMITIVE_COUNT, NodeIdx, NodeLink, PrimitiveIdx, PrimitiveSlot,
};

/// Number of SAH bins per axis.
const BIN_COUNT: usize = 8;

#[derive(Copy, Clone, Debug)]
struct Bin {
    bounds: WorldBox,
    count: usize,
}

impl Default for Bin {
    fn default() -> Self {
        Bin {
            bounds: WorldBox::empty(),
            count: 0,
        }
    }
}

/// Candidate split plane, primitives with centroid below `position` go left.
#[derive(Copy, Clone, Debug, PartialEq)]
struct Split {
    axis: usize,
    position: FloatType,
    cost: FloatType,
}

impl Blas {
    pub fn build(triangles: &[WorldTriangle]) -> Result<Blas, BuildError> {
        let mut blas = Blas::default();
        blas.rebuild(triangles)?;
        Ok(blas)
    }

    /// Builds the hierarchy from scratch over the triangles, reusing existing allocations.
    pub fn rebuild(&mut self, triangles: &[WorldTriangle]) -> Result<(), BuildError> {
        if triangles.is_empty() {
            return Err(BuildError::EmptyMesh);
        }
        if triangles.len() > MAX_PRIMITIVE_COUNT {
            return Err(BuildError::TooManyPrimitives {
                count: triangles.len(),
                max: MAX_PRIMITIVE_COUNT,
            });
        }

        self.nodes.clear();
        self.primitive_indices.clear();
        self.primitive_indices
            .extend((0..triangles.len()).map(PrimitiveIdx::new));
        self.centroids.clear();
        self.centroids
            .extend(triangles.iter().map(|t| t.centroid()));

        let all = PrimitiveSlot::new(0)..PrimitiveSlot::new(triangles.len());
        let bounds = self.leaf_bounds(all, triangles);
        let root = self.nodes.push(BvhNode::new_leaf(
            bounds,
            PrimitiveSlot::new(0),
            triangles.len(),
        ));

        let mut depth_limited_leaves = 0;
        self.subdivide(root, triangles, 0, &mut depth_limited_leaves);

        if depth_limited_leaves > 0 {
            warn!(
                "{depth_limited_leaves} BLAS leaves hit the depth limit of {MAX_DEPTH}, \
                 they stay unsplit"
            );
        }
        debug!(
            "Built BLAS over {} triangles: {}",
            triangles.len(),
            self.statistics()
        );

        Ok(())
    }

    /// Recomputes node bounds bottom up after vertices moved, keeping the topology.
    /// Triangles must be the same ones, in the same order, as during the last build.
    pub fn refit(&mut self, triangles: &[WorldTriangle]) {
        assert!(
            triangles.len() == self.primitive_count(),
            "Refit needs the triangles that the hierarchy was built over"
        );

        // Children always come after their parent
        for index in self.nodes.indices().rev() {
            let bounds = match self.nodes[index].decode() {
                NodeLink::Leaf { slots } => self.leaf_bounds(slots, triangles),
                NodeLink::Inner { left, right } => {
                    self.nodes[left].bounds.union(&self.nodes[right].bounds)
                }
            };
            self.nodes[index].bounds = bounds;
        }
    }

    fn subdivide(
        &mut self,
        index: NodeIdx,
        triangles: &[WorldTriangle],
        depth: usize,
        depth_limited_leaves: &mut usize,
    ) {
        let node = &self.nodes[index];
        let count = node.primitive_count();
        let NodeLink::Leaf { slots } = node.decode() else {
            unreachable!("Only leaves get subdivided");
        };

        if count <= 1 {
            return;
        }
        if depth >= MAX_DEPTH {
            *depth_limited_leaves += 1;
            return;
        }

        let Some(split) = self.find_best_split(slots.clone(), triangles) else {
            // All centroids coincide
            return;
        };
        if split.cost >= node.bounds.surface_area() * count as FloatType {
            return;
        }

        let centroids = &self.centroids;
        let left_count = itertools::partition(
            self.primitive_indices[slots.clone()].iter_mut(),
            |primitive| centroids[*primitive][split.axis] < split.position,
        );
        if left_count == 0 || left_count == count {
            // Bin assignment and the plane test can disagree by rounding
            return;
        }

        let middle = slots.start + left_count;
        let left_bounds = self.leaf_bounds(slots.start..middle, triangles);
        let right_bounds = self.leaf_bounds(middle..slots.end, triangles);
        let left = self
            .nodes
            .push(BvhNode::new_leaf(left_bounds, slots.start, left_count));
        let right = self
            .nodes
            .push(BvhNode::new_leaf(right_bounds, middle, count - left_count));
        debug_assert!(right == left + 1);

        let node = &mut self.nodes[index];
        node.first = left.raw();
        node.count = 0;

        self.subdivide(left, triangles, depth + 1, depth_limited_leaves);
        self.subdivide(right, triangles, depth + 1, depth_limited_leaves);
    }

    fn leaf_bounds(&self, slots: Range<PrimitiveSlot>, triangles: &[WorldTriangle]) -> WorldBox {
        let mut bounds = WorldBox::empty();
        for primitive in self.primitive_indices[slots].iter() {
            bounds.grow_triangle(&triangles[primitive.index()]);
        }
        bounds
    }

    /// Binned SAH over all three axes.
    /// Returns the cheapest boundary between bins, None if the centroids have no extent.
    fn find_best_split(
        &self,
        slots: Range<PrimitiveSlot>,
        triangles: &[WorldTriangle],
    ) -> Option<Split> {
        let primitives = &self.primitive_indices[slots];
        let centroid_bounds =
            WorldBox::from_points(primitives.iter().map(|p| &self.centroids[*p]))?;

        let mut best: Option<Split> = None;
        for axis in 0..3 {
            let low = centroid_bounds.min[axis];
            let high = centroid_bounds.max[axis];
            if high <= low {
                continue;
            }

            let scale = BIN_COUNT as FloatType / (high - low);
            let mut bins = [Bin::default(); BIN_COUNT];
            for primitive in primitives.iter() {
                let bin = ((self.centroids[*primitive][axis] - low) * scale) as usize;
                let bin = &mut bins[bin.min(BIN_COUNT - 1)];
                bin.count += 1;
                bin.bounds.grow_triangle(&triangles[primitive.index()]);
            }

            // Boundary i lies between bins i and i + 1
            let mut left_area = [0.0; BIN_COUNT - 1];
            let mut left_count = [0usize; BIN_COUNT - 1];
            let mut right_area = [0.0; BIN_COUNT - 1];
            let mut right_count = [0usize; BIN_COUNT - 1];
            let mut left_box = WorldBox::empty();
            let mut right_box = WorldBox::empty();
            let mut left_sum = 0;
            let mut right_sum = 0;
            for i in 0..BIN_COUNT - 1 {
                left_sum += bins[i].count;
                left_box.grow_box(&bins[i].bounds);
                left_count[i] = left_sum;
                left_area[i] = left_box.surface_area();

                let j = BIN_COUNT - 1 - i;
                right_sum += bins[j].count;
                right_box.grow_box(&bins[j].bounds);
                right_count[j - 1] = right_sum;
                right_area[j - 1] = right_box.surface_area();
            }

            let bin_width = (high - low) / BIN_COUNT as FloatType;
            for i in 0..BIN_COUNT - 1 {
                let cost = left_area[i] * left_count[i] as FloatType
                    + right_area[i] * right_count[i] as FloatType;
                if best.is_none_or(|b| cost < b.cost) {
                    best = Some(Split {
                        axis,
                        position: low + bin_width * (i + 1) as FloatType,
                        cost,
                    });
                }
            }
        }

        best
    }
}
