use arrayvec::ArrayVec;
use index_vec::IndexVec;
use log::trace;
use ordered_float::OrderedFloat;
use thiserror::Error;

use crate::geometry::{FloatType, WorldBox, WorldVector};

use super::settings::KdTreeSettings;

/// Nodes at this depth become leaves regardless of their size.
const MAX_DEPTH: usize = 48;

/// Lower bounds are shrunk by this factor, so that rounding never prunes the exact nearest item.
const LOWER_BOUND_SLACK: FloatType = 1.0 - 1e-4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KdTreeError {
    #[error("All slots of the tree are occupied")]
    Full,
    #[error("Item {0} is not in the tree")]
    UnknownItem(u32),
    #[error("Item {0} is already in the tree")]
    DuplicateItem(u32),
}

/// Total order on candidate pairs, smaller is better.
/// Ties in area are broken by the pair of ids, so that the nearest neighbor is unique.
pub type PairKey = (OrderedFloat<FloatType>, u32, u32);

pub fn pair_key(a: u32, b: u32, area: FloatType) -> PairKey {
    (OrderedFloat(area), a.min(b), a.max(b))
}

index_vec::define_index_type! {
    struct KdNodeIdx = u32;
}

#[derive(Clone, Debug)]
struct KdNode {
    /// Bounds of centroids of items in the subtree.
    /// Only ever grows after a rebuild, so it may be larger than needed.
    centroid_bounds: WorldBox,
    /// Component-wise minimum of half extents of items in the subtree.
    /// Only ever shrinks after a rebuild.
    min_half_extent: WorldVector,
    /// Number of live items in the subtree.
    count: u32,
    /// Slot range of a leaf, live items are at the start of it.
    first: u32,
    capacity: u32,
    parent: Option<KdNodeIdx>,
    /// Left child of an inner node, right child follows it.
    left: Option<KdNodeIdx>,
    split_axis: usize,
    split_value: FloatType,
}

/// Kd-tree over item bounding boxes, answering nearest neighbor queries
/// under the surface area of the union of the two boxes.
///
/// Items are identified by small integer ids.
/// Supports removing and inserting items between rebuilds, but the number of slots is fixed
/// by the last rebuild.
#[derive(Clone, Debug, Default)]
pub struct KdTree {
    settings: KdTreeSettings,
    nodes: IndexVec<KdNodeIdx, KdNode>,
    /// Item ids grouped by leaf.
    slots: Vec<u32>,
    slot_leaf: Vec<KdNodeIdx>,
    /// Indexed by item id.
    item_bounds: Vec<WorldBox>,
    /// Indexed by item id, None for items not in the tree.
    item_slot: Vec<Option<u32>>,
    /// Leaves that might have a free slot.
    spare_leaves: Vec<KdNodeIdx>,
}

impl KdTree {
    pub fn new(settings: KdTreeSettings) -> KdTree {
        KdTree {
            settings,
            ..Default::default()
        }
    }

    pub fn settings(&self) -> &KdTreeSettings {
        &self.settings
    }

    /// Number of live items.
    pub fn len(&self) -> usize {
        self.nodes.first().map_or(0, |root| root.count as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of slots, fixed at rebuild.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn contains(&self, item: u32) -> bool {
        self.slot_of(item).is_some()
    }

    pub fn bounds(&self, item: u32) -> Option<&WorldBox> {
        self.slot_of(item).map(|_| &self.item_bounds[item as usize])
    }

    fn slot_of(&self, item: u32) -> Option<u32> {
        self.item_slot.get(item as usize).copied().flatten()
    }

    /// Rebuilds the tree over the given items, reusing allocations.
    pub fn rebuild(
        &mut self,
        items: impl IntoIterator<Item = (u32, WorldBox)>,
    ) -> Result<(), KdTreeError> {
        self.nodes.clear();
        self.slots.clear();
        self.slot_leaf.clear();
        self.item_slot.clear();
        self.item_bounds.clear();
        self.spare_leaves.clear();

        for (item, bounds) in items {
            let index = item as usize;
            if index >= self.item_slot.len() {
                self.item_slot.resize(index + 1, None);
                self.item_bounds.resize(index + 1, WorldBox::empty());
            }
            if self.item_slot[index].is_some() {
                return Err(KdTreeError::DuplicateItem(item));
            }
            // Real slots get assigned after subdivision
            self.item_slot[index] = Some(u32::MAX);
            self.item_bounds[index] = bounds;
            self.slots.push(item);
        }

        if self.slots.is_empty() {
            return Ok(());
        }

        let count = self.slots.len() as u32;
        self.nodes.push(KdNode {
            centroid_bounds: WorldBox::empty(),
            min_half_extent: WorldVector::zeros(),
            count,
            first: 0,
            capacity: count,
            parent: None,
            left: None,
            split_axis: 0,
            split_value: 0.0,
        });
        self.subdivide(KdNodeIdx::new(0), 0);

        self.slot_leaf.resize(self.slots.len(), KdNodeIdx::new(0));
        for (index, node) in self.nodes.iter_enumerated() {
            if node.left.is_some() {
                continue;
            }
            for slot in node.first..node.first + node.capacity {
                self.slot_leaf[slot as usize] = index;
                self.item_slot[self.slots[slot as usize] as usize] = Some(slot);
            }
        }

        trace!(
            "Rebuilt kd tree over {} items: {} nodes",
            self.slots.len(),
            self.nodes.len()
        );

        Ok(())
    }

    fn subdivide(&mut self, index: KdNodeIdx, depth: usize) {
        let node = &self.nodes[index];
        let first = node.first as usize;
        let count = node.count as usize;
        let item_bounds = &self.item_bounds;
        let slots = &mut self.slots[first..first + count];

        let mut centroid_bounds = WorldBox::empty();
        let mut min_half_extent = WorldVector::repeat(FloatType::INFINITY);
        for item in slots.iter() {
            let bounds = &item_bounds[*item as usize];
            centroid_bounds.grow(&bounds.center());
            min_half_extent = min_half_extent.inf(&bounds.half_extent());
        }

        let axis = centroid_bounds.dominant_axis();
        let low = centroid_bounds.min[axis];
        let high = centroid_bounds.max[axis];
        let is_leaf = count <= self.settings.leaf_size || depth >= MAX_DEPTH || high <= low;

        let mut split_value = 0.0;
        let mut left_count = 0;
        if !is_leaf {
            split_value = low + (high - low) * 0.5;
            left_count = itertools::partition(slots.iter_mut(), |item| {
                item_bounds[*item as usize].center()[axis] < split_value
            });

            let smaller = left_count.min(count - left_count);
            let larger = left_count.max(count - left_count);
            let ratio = self.settings.rebalance_ratio;
            if smaller == 0 || larger as FloatType > ratio * smaller as FloatType {
                let median = count / 2;
                slots.select_nth_unstable_by_key(median, |item| {
                    OrderedFloat(item_bounds[*item as usize].center()[axis])
                });
                split_value = item_bounds[slots[median] as usize].center()[axis];
                left_count = median;
            }
        }

        let node = &mut self.nodes[index];
        node.centroid_bounds = centroid_bounds;
        node.min_half_extent = min_half_extent;
        if is_leaf {
            return;
        }
        node.split_axis = axis;
        node.split_value = split_value;

        let left = self.nodes.next_idx();
        self.nodes[index].left = Some(left);
        for (first, count) in [(first, left_count), (first + left_count, count - left_count)] {
            self.nodes.push(KdNode {
                centroid_bounds: WorldBox::empty(),
                min_half_extent: WorldVector::zeros(),
                count: count as u32,
                first: first as u32,
                capacity: count as u32,
                parent: Some(index),
                left: None,
                split_axis: 0,
                split_value: 0.0,
            });
        }

        self.subdivide(left, depth + 1);
        self.subdivide(left + 1, depth + 1);
    }

    /// Finds the item minimizing the surface area of its union with `item`.
    /// Returns None if `item` is not in the tree or it is the only one.
    pub fn find_nearest(&self, item: u32) -> Option<u32> {
        self.slot_of(item)?;
        let query = &self.item_bounds[item as usize];

        let mut best: Option<(PairKey, u32)> = None;
        let mut stack = ArrayVec::<KdNodeIdx, { 2 * MAX_DEPTH + 2 }>::new();
        stack.push(KdNodeIdx::new(0));

        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if node.count == 0 {
                continue;
            }
            if let Some((best_key, _)) = &best {
                if lower_bound_area(query, node) > best_key.0.0 {
                    continue;
                }
            }

            let Some(left) = node.left else {
                for slot in node.first..node.first + node.count {
                    let other = self.slots[slot as usize];
                    if other == item {
                        continue;
                    }
                    let area = query.union(&self.item_bounds[other as usize]).surface_area();
                    let key = pair_key(item, other, area);
                    if best.is_none_or(|(best_key, _)| key < best_key) {
                        best = Some((key, other));
                    }
                }
                continue;
            };

            // Nearer child is popped first
            let right = left + 1;
            let left_bound = lower_bound_area(query, &self.nodes[left]);
            let right_bound = lower_bound_area(query, &self.nodes[right]);
            if left_bound <= right_bound {
                stack.push(right);
                stack.push(left);
            } else {
                stack.push(left);
                stack.push(right);
            }
        }

        best.map(|(_, other)| other)
    }

    /// Removes a live item, its slot becomes free for later insertions.
    pub fn remove(&mut self, item: u32) -> Result<(), KdTreeError> {
        let slot = self.slot_of(item).ok_or(KdTreeError::UnknownItem(item))?;
        let leaf = self.slot_leaf[slot as usize];
        let node = &self.nodes[leaf];
        let was_full = node.count == node.capacity;
        let last = node.first + node.count - 1;

        self.slots.swap(slot as usize, last as usize);
        let moved = self.slots[slot as usize];
        self.item_slot[moved as usize] = Some(slot);
        self.item_slot[item as usize] = None;

        let mut current = Some(leaf);
        while let Some(index) = current {
            let node = &mut self.nodes[index];
            node.count -= 1;
            current = node.parent;
        }

        if was_full {
            self.spare_leaves.push(leaf);
        }
        Ok(())
    }

    /// Inserts an item into the leaf its centroid falls in,
    /// or into any leaf with a free slot if that one is full.
    pub fn insert(&mut self, item: u32, bounds: WorldBox) -> Result<(), KdTreeError> {
        if self.contains(item) {
            return Err(KdTreeError::DuplicateItem(item));
        }
        if self.nodes.is_empty() {
            return Err(KdTreeError::Full);
        }

        let centroid = bounds.center();
        let mut index = KdNodeIdx::new(0);
        while let Some(left) = self.nodes[index].left {
            let node = &self.nodes[index];
            index = if centroid[node.split_axis] < node.split_value {
                left
            } else {
                left + 1
            };
        }

        let leaf = if self.has_free_slot(index) {
            index
        } else {
            loop {
                let Some(candidate) = self.spare_leaves.pop() else {
                    return Err(KdTreeError::Full);
                };
                if self.has_free_slot(candidate) {
                    break candidate;
                }
            }
        };

        let node = &self.nodes[leaf];
        let slot = node.first + node.count;
        let item_index = item as usize;
        if item_index >= self.item_slot.len() {
            self.item_slot.resize(item_index + 1, None);
            self.item_bounds.resize(item_index + 1, WorldBox::empty());
        }
        self.slots[slot as usize] = item;
        self.item_slot[item_index] = Some(slot);
        self.item_bounds[item_index] = bounds;

        let half_extent = bounds.half_extent();
        let mut current = Some(leaf);
        while let Some(index) = current {
            let node = &mut self.nodes[index];
            node.count += 1;
            node.centroid_bounds.grow(&centroid);
            node.min_half_extent = node.min_half_extent.inf(&half_extent);
            current = node.parent;
        }

        if self.has_free_slot(leaf) {
            // Might have been taken off the spare list above
            self.spare_leaves.push(leaf);
        }
        Ok(())
    }

    fn has_free_slot(&self, leaf: KdNodeIdx) -> bool {
        let node = &self.nodes[leaf];
        node.count < node.capacity
    }
}

/// Lower bound on the union area of `query` with any item in the subtree.
/// Every item in the subtree has its centroid inside `centroid_bounds` and half extent at least
/// `min_half_extent` on each axis, the bound places such a smallest box as close to the query
/// as possible.
fn lower_bound_area(query: &WorldBox, node: &KdNode) -> FloatType {
    let mut extent = WorldVector::zeros();
    for axis in 0..3 {
        let middle = (query.min[axis] + query.max[axis]) * 0.5;
        let center = middle.clamp(node.centroid_bounds.min[axis], node.centroid_bounds.max[axis]);
        let half = node.min_half_extent[axis];
        extent[axis] = query.max[axis].max(center + half) - query.min[axis].min(center - half);
    }
    2.0 * (extent.x * extent.y + extent.y * extent.z + extent.z * extent.x) * LOWER_BOUND_SLACK
}
