use arrayvec::ArrayVec;

use crate::geometry::{FloatType, HitRecord, PackedBox, PackedRay, Ray, WorldBox};

/// Hooks called during traversal, used for instrumenting queries.
/// All methods default to no-ops, `()` is the observer that doesn't observe anything.
pub trait TraversalObserver {
    fn inner_node(&mut self) {}
    fn leaf(&mut self) {}
    fn primitive_test(&mut self) {}
}

impl TraversalObserver for () {}

/// Counts of work done during a traversal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TraversalStats {
    pub inner_nodes: usize,
    pub leaves: usize,
    pub primitive_tests: usize,
}

impl TraversalObserver for TraversalStats {
    fn inner_node(&mut self) {
        self.inner_nodes += 1;
    }

    fn leaf(&mut self) {
        self.leaves += 1;
    }

    fn primitive_test(&mut self) {
        self.primitive_tests += 1;
    }
}

/// Stack of nodes waiting to be visited, with their entry distances.
pub(crate) trait NodeStack<N> {
    fn push_node(&mut self, node: N, entry_t: FloatType);
    fn pop_node(&mut self) -> Option<(N, FloatType)>;
    fn clear_nodes(&mut self);
}

/// Fixed capacity stack, panics when overflowing.
impl<N, const CAP: usize> NodeStack<N> for ArrayVec<(N, FloatType), CAP> {
    fn push_node(&mut self, node: N, entry_t: FloatType) {
        self.push((node, entry_t));
    }

    fn pop_node(&mut self) -> Option<(N, FloatType)> {
        self.pop()
    }

    fn clear_nodes(&mut self) {
        self.clear();
    }
}

impl<N> NodeStack<N> for Vec<(N, FloatType)> {
    fn push_node(&mut self, node: N, entry_t: FloatType) {
        self.push((node, entry_t));
    }

    fn pop_node(&mut self) -> Option<(N, FloatType)> {
        self.pop()
    }

    fn clear_nodes(&mut self) {
        self.clear();
    }
}

/// Binary tree as seen by the traversal.
pub(crate) trait TraversableTree {
    type Node: Copy;

    fn root(&self) -> Self::Node;
    fn bounds(&self, node: Self::Node) -> &WorldBox;
    /// Children of an inner node, None for leaves.
    fn children(&self, node: Self::Node) -> Option<(Self::Node, Self::Node)>;
}

/// Distance along the ray where it enters the box, if it does so before `max_t`.
fn entry_distance(bounds: &WorldBox, ray: &PackedRay, max_t: FloatType) -> Option<FloatType> {
    let (t1, t2) = PackedBox::from(bounds).intersect_packed(ray);
    let t1 = t1.max(0.0);
    let t2 = t2.min(max_t);
    (t1 <= t2 && t1 < max_t).then_some(t1)
}

/// Ordered depth first descent.
/// Visits the nearer child first and defers the farther one to the stack, nodes that the ray
/// enters only after the current `hit.t` are skipped.
/// `leaf` is called for every reached leaf, it should update `hit` and return true if it found a
/// closer hit.
/// Returns true if any hit closer than the original `hit.t` was found.
pub(crate) fn ordered_traversal<T, S, O>(
    tree: &T,
    ray: &Ray,
    hit: &mut HitRecord,
    stack: &mut S,
    observer: &mut O,
    mut leaf: impl FnMut(T::Node, &mut HitRecord, &mut O) -> bool,
) -> bool
where
    T: TraversableTree,
    S: NodeStack<T::Node>,
    O: TraversalObserver,
{
    let packed_ray = PackedRay::from(ray);
    let mut found = false;

    stack.clear_nodes();
    let root = tree.root();
    let Some(root_t) = entry_distance(tree.bounds(root), &packed_ray, hit.t) else {
        return false;
    };
    stack.push_node(root, root_t);

    while let Some((mut node, entry_t)) = stack.pop_node() {
        if entry_t >= hit.t {
            // The node was pushed before a closer hit was found
            continue;
        }

        loop {
            let Some((left, right)) = tree.children(node) else {
                observer.leaf();
                found |= leaf(node, hit, observer);
                break;
            };
            observer.inner_node();

            let left_t = entry_distance(tree.bounds(left), &packed_ray, hit.t);
            let right_t = entry_distance(tree.bounds(right), &packed_ray, hit.t);

            node = match (left_t, right_t) {
                (Some(left_t), Some(right_t)) => {
                    if left_t <= right_t {
                        stack.push_node(right, right_t);
                        left
                    } else {
                        stack.push_node(left, left_t);
                        right
                    }
                }
                (Some(_), None) => left,
                (None, Some(_)) => right,
                (None, None) => break,
            };
        }
    }

    found
}

/// Reusable traversal stack for trees without a depth limit.
/// Keeping one per thread avoids allocating in every query.
#[derive(Clone, Debug)]
pub struct StackCache<N> {
    pub(crate) stack: Vec<(N, FloatType)>,
}

impl<N> StackCache<N> {
    pub fn new() -> Self {
        StackCache { stack: Vec::new() }
    }
}

// Derived Default would require `N: Default`, which index types don't have
impl<N> Default for StackCache<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::geometry::{WorldPoint, WorldVector};

    use assert2::assert;

    /// Perfect binary tree over unit boxes placed along the x axis.
    struct Row {
        boxes: Vec<WorldBox>,
        depth: u32,
    }

    impl Row {
        fn new(depth: u32) -> Row {
            // Node numbering: 1 is the root, children of n are 2n and 2n + 1
            let leaf_count = 1usize << depth;
            let mut boxes = vec![WorldBox::empty(); 2 * leaf_count];
            for i in 0..leaf_count {
                let x = 2.0 * i as f32;
                boxes[leaf_count + i] =
                    WorldBox::new(WorldPoint::new(x, 0.0, 0.0), WorldPoint::new(x + 1.0, 1.0, 1.0));
            }
            for i in (1..leaf_count).rev() {
                boxes[i] = boxes[2 * i].union(&boxes[2 * i + 1]);
            }
            Row { boxes, depth }
        }
    }

    impl TraversableTree for Row {
        type Node = usize;

        fn root(&self) -> usize {
            1
        }

        fn bounds(&self, node: usize) -> &WorldBox {
            &self.boxes[node]
        }

        fn children(&self, node: usize) -> Option<(usize, usize)> {
            (node < (1 << self.depth)).then_some((2 * node, 2 * node + 1))
        }
    }

    /// Leaf callback that reports a hit at the entry point of the leaf box
    fn hit_leaf_entry(row: &Row, ray: &Ray, node: usize, hit: &mut HitRecord) -> bool {
        let (t, _) = crate::geometry::RayIntersectionExt::intersect(&row.boxes[node], ray);
        if t < hit.t {
            hit.t = t;
            true
        } else {
            false
        }
    }

    #[test]
    fn nearest_leaf_first_prunes_everything_else() {
        let row = Row::new(4);
        let ray = Ray::new(WorldPoint::new(-5.0, 0.5, 0.5), WorldVector::new(1.0, 0.0, 0.0));
        let mut hit = HitRecord::default();
        let mut stats = TraversalStats::default();
        let mut stack = Vec::new();

        let found = ordered_traversal(&row, &ray, &mut hit, &mut stack, &mut stats, |node, hit, _| {
            hit_leaf_entry(&row, &ray, node, hit)
        });

        assert!(found);
        assert!(hit.t == 5.0);
        assert!(stats.leaves == 1);
        assert!(stats.inner_nodes == 4);
    }

    #[test]
    fn reverse_direction_finds_the_other_end() {
        let row = Row::new(3);
        let ray = Ray::new(WorldPoint::new(100.0, 0.5, 0.5), WorldVector::new(-1.0, 0.0, 0.0));
        let mut hit = HitRecord::default();
        let mut stack = ArrayVec::<(usize, FloatType), 8>::new();

        ordered_traversal(&row, &ray, &mut hit, &mut stack, &mut (), |node, hit, _| {
            hit_leaf_entry(&row, &ray, node, hit)
        });

        // Last box spans 14..15
        assert!(hit.t == 85.0);
    }

    #[test]
    fn miss_visits_nothing() {
        let row = Row::new(3);
        let ray = Ray::new(WorldPoint::new(0.0, 5.0, 0.5), WorldVector::new(1.0, 0.0, 0.0));
        let mut hit = HitRecord::default();
        let mut stats = TraversalStats::default();
        let mut stack = Vec::new();

        let found = ordered_traversal(&row, &ray, &mut hit, &mut stack, &mut stats, |_, _, _| {
            panic!("No leaf should be reached")
        });

        assert!(!found);
        assert!(stats == TraversalStats::default());
    }

    #[test]
    fn max_distance_limits_the_search() {
        let row = Row::new(3);
        let ray = Ray::new(WorldPoint::new(-5.0, 0.5, 0.5), WorldVector::new(1.0, 0.0, 0.0));
        let mut hit = HitRecord::with_max_distance(4.0);
        let mut stack = Vec::new();

        let found = ordered_traversal(&row, &ray, &mut hit, &mut stack, &mut (), |node, hit, _| {
            hit_leaf_entry(&row, &ray, node, hit)
        });

        assert!(!found);
        assert!(hit.t == 4.0);
    }

    #[test]
    fn stack_cache_default_without_default_nodes() {
        // Index types don't implement Default
        #[derive(Clone, Copy, Debug)]
        struct Opaque(#[allow(dead_code)] u32);

        let mut cache = StackCache::<Opaque>::default();
        assert!(cache.stack.is_empty());

        let row = Row::new(2);
        let ray = Ray::new(WorldPoint::new(-5.0, 0.5, 0.5), WorldVector::new(1.0, 0.0, 0.0));
        let mut reused = StackCache::<usize>::new();
        for _ in 0..2 {
            let mut hit = HitRecord::default();
            ordered_traversal(&row, &ray, &mut hit, &mut reused.stack, &mut (), |node, hit, _| {
                hit_leaf_entry(&row, &ray, node, hit)
            });
            assert!(hit.t == 5.0);
        }

        cache.stack.push((Opaque(1), 0.0));
        assert!(cache.stack.len() == 1);
    }
}
