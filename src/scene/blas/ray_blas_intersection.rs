use arrayvec::ArrayVec;

use crate::{
    geometry::{FloatType, HitRecord, PrimitiveId, Ray, WorldBox, WorldTriangle},
    scene::traversal::{TraversableTree, TraversalObserver, ordered_traversal},
};

use super::{Blas, MAX_DEPTH, NodeIdx, NodeLink};

/// Every stacked node is a sibling of a different node on the current path,
/// so the depth limit bounds the stack size.
type BlasStack = ArrayVec<(NodeIdx, FloatType), MAX_DEPTH>;

impl TraversableTree for Blas {
    type Node = NodeIdx;

    fn root(&self) -> NodeIdx {
        Blas::root_index()
    }

    fn bounds(&self, node: NodeIdx) -> &WorldBox {
        &self.nodes[node].bounds
    }

    fn children(&self, node: NodeIdx) -> Option<(NodeIdx, NodeIdx)> {
        let node = &self.nodes[node];
        (!node.is_leaf()).then(|| {
            let left = NodeIdx::from_raw(node.first);
            (left, left + 1)
        })
    }
}

impl Blas {
    /// Finds the nearest triangle hit closer than `hit.t`, updating `hit` if found.
    /// The instance part of the hit id is left as zero.
    /// Returns true if `hit` was updated.
    pub fn intersect(&self, triangles: &[WorldTriangle], ray: &Ray, hit: &mut HitRecord) -> bool {
        self.intersect_observed(triangles, ray, hit, &mut ())
    }

    pub fn intersect_observed<O: TraversalObserver>(
        &self,
        triangles: &[WorldTriangle],
        ray: &Ray,
        hit: &mut HitRecord,
        observer: &mut O,
    ) -> bool {
        debug_assert!(triangles.len() == self.primitive_count());
        if self.nodes.is_empty() {
            return false;
        }

        let mut stack = BlasStack::new();
        ordered_traversal(self, ray, hit, &mut stack, observer, |node, hit, observer| {
            let NodeLink::Leaf { slots } = self.nodes[node].decode() else {
                unreachable!("Traversal only calls back for leaves");
            };

            let mut found = false;
            for primitive in self.primitive_indices[slots].iter() {
                observer.primitive_test();
                let Some((t, uv)) = triangles[primitive.index()].intersect(ray) else {
                    continue;
                };
                if t < hit.t {
                    *hit = HitRecord {
                        t,
                        uv,
                        id: PrimitiveId::new(0, primitive.raw()),
                    };
                    found = true;
                }
            }
            found
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        geometry::{
            Triangle, WorldPoint, WorldVector,
            test::{ray, world_triangles},
        },
        scene::{
            blas::test::{brute_force_intersect, chain_past_depth_limit, small_triangle},
            traversal::TraversalStats,
        },
    };

    use assert2::assert;
    use test_strategy::proptest;

    #[test]
    fn single_triangle_hit() {
        let triangles = [small_triangle(0.0, 0.0, 0.0)];
        let blas = Blas::build(&triangles).unwrap();
        let ray = Ray::new(WorldPoint::new(0.0, 0.0, -5.0), WorldVector::new(0.0, 0.0, 1.0));

        let mut hit = HitRecord::default();
        assert!(blas.intersect(&triangles, &ray, &mut hit));
        assert!((hit.t - 5.0).abs() < 1e-5);
        assert!(hit.id == PrimitiveId::new(0, 0));
    }

    #[test]
    fn barycentric_weights_are_inside() {
        let triangles = [Triangle::new(
            WorldPoint::new(-1.0, -1.0, 0.0),
            WorldPoint::new(0.0, 1.0, 0.0),
            WorldPoint::new(1.0, -1.0, 0.0),
        )];
        let blas = Blas::build(&triangles).unwrap();
        let ray = Ray::new(WorldPoint::new(0.0, 0.0, -5.0), WorldVector::new(0.0, 0.0, 1.0));

        let mut hit = HitRecord::default();
        assert!(blas.intersect(&triangles, &ray, &mut hit));
        assert!((hit.t - 5.0).abs() < 1e-5);
        assert!(hit.uv.u >= 0.0);
        assert!(hit.uv.v >= 0.0);
        assert!(hit.uv.u + hit.uv.v <= 1.0);

        let point = hit.uv.interpolate_triangle(&triangles[0].map(|p| p.coords));
        assert!((point - ray.point_at(hit.t).coords).norm() < 1e-5);
    }

    #[test]
    fn nearer_triangle_wins() {
        let triangles = [
            small_triangle(0.0, 0.0, 10.0),
            small_triangle(0.0, 0.0, 3.0),
            small_triangle(0.0, 0.0, 7.0),
        ];
        let blas = Blas::build(&triangles).unwrap();
        let ray = Ray::new(WorldPoint::new(0.0, 0.0, 0.0), WorldVector::new(0.0, 0.0, 1.0));

        let mut hit = HitRecord::default();
        assert!(blas.intersect(&triangles, &ray, &mut hit));
        assert!((hit.t - 3.0).abs() < 1e-5);
        assert!(hit.id.primitive() == 1);
    }

    #[test]
    fn only_the_hit_leaf_is_visited() {
        let triangles = [small_triangle(-50.0, 0.0, 0.0), small_triangle(50.0, 0.0, 0.0)];
        let blas = Blas::build(&triangles).unwrap();
        let ray = Ray::new(WorldPoint::new(50.0, 0.0, -5.0), WorldVector::new(0.0, 0.0, 1.0));

        let mut hit = HitRecord::default();
        let mut stats = TraversalStats::default();
        assert!(blas.intersect_observed(&triangles, &ray, &mut hit, &mut stats));

        assert!(hit.id.primitive() == 1);
        assert!(stats.inner_nodes == 1);
        assert!(stats.leaves == 1);
        assert!(stats.primitive_tests == 1);
    }

    #[test]
    fn hit_beyond_max_distance_is_ignored() {
        let triangles = [small_triangle(0.0, 0.0, 0.0)];
        let blas = Blas::build(&triangles).unwrap();
        let ray = Ray::new(WorldPoint::new(0.0, 0.0, -5.0), WorldVector::new(0.0, 0.0, 1.0));

        let mut hit = HitRecord::with_max_distance(4.0);
        assert!(!blas.intersect(&triangles, &ray, &mut hit));
        assert!(!hit.is_hit());
        assert!(hit.t == 4.0);
    }

    #[test]
    fn miss_leaves_record_untouched() {
        let triangles = [small_triangle(0.0, 0.0, 0.0)];
        let blas = Blas::build(&triangles).unwrap();
        let ray = Ray::new(WorldPoint::new(0.0, 0.0, -5.0), WorldVector::new(1.0, 0.0, 0.0));

        let mut hit = HitRecord::default();
        assert!(!blas.intersect(&triangles, &ray, &mut hit));
        assert!(hit == HitRecord::default());
    }

    #[test]
    fn depth_limited_hierarchy_matches_brute_force() {
        let triangles = chain_past_depth_limit();
        let blas = Blas::build(&triangles).unwrap();

        for (i, triangle) in triangles.iter().enumerate() {
            let origin = triangle.centroid() - WorldVector::new(0.0, 0.0, 1.0);
            let ray = Ray::new(origin, WorldVector::new(0.0, 0.0, 1.0));

            let mut expected = HitRecord::default();
            assert!(brute_force_intersect(&triangles, &ray, &mut expected));

            let mut hit = HitRecord::default();
            assert!(blas.intersect(&triangles, &ray, &mut hit));
            assert!(hit.id == PrimitiveId::new(0, i as u32));
            assert!(hit == expected);
        }
    }

    #[proptest]
    fn matches_brute_force(
        #[strategy(world_triangles(1..150))] triangles: Vec<WorldTriangle>,
        #[strategy(ray())] ray: Ray,
    ) {
        let blas = Blas::build(&triangles).unwrap();

        let mut expected = HitRecord::default();
        brute_force_intersect(&triangles, &ray, &mut expected);

        let mut hit = HitRecord::default();
        let found = blas.intersect(&triangles, &ray, &mut hit);

        assert!(found == expected.is_hit());
        assert!(hit.t == expected.t);
    }

    #[proptest]
    fn matches_brute_force_after_refit(
        #[strategy(world_triangles(1..100))] triangles: Vec<WorldTriangle>,
        #[strategy(world_triangles(100..101))] moved: Vec<WorldTriangle>,
        #[strategy(ray())] ray: Ray,
    ) {
        // Topology stays from the first set, geometry is unrelated
        let mut blas = Blas::build(&triangles).unwrap();
        let moved = &moved[..triangles.len()];
        blas.refit(moved);

        let mut expected = HitRecord::default();
        brute_force_intersect(moved, &ray, &mut expected);

        let mut hit = HitRecord::default();
        blas.intersect(moved, &ray, &mut hit);

        assert!(hit.t == expected.t, "{hit:?} != {expected:?}");
    }
}
