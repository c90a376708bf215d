use std::fmt::{self, Display, Write};

use crate::{
    geometry::WorldTriangle,
    util::Stats,
};

use super::{Blas, NodeIdx, NodeLink};

/// Shape summary of a hierarchy.
#[derive(Clone, Debug, PartialEq)]
pub struct BvhStatistics {
    pub node_count: usize,
    /// Depth of leaves, root has depth 0
    pub leaf_depth: Stats,
    /// Number of primitives per leaf
    pub leaf_size: Stats,
}

impl Display for BvhStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} nodes; leaf depth: {}; leaf size: {}",
            self.node_count, self.leaf_depth, self.leaf_size
        )
    }
}

impl Blas {
    pub fn statistics(&self) -> BvhStatistics {
        let mut leaf_depth = Stats::default();
        let mut leaf_size = Stats::default();

        if !self.nodes.is_empty() {
            let mut stack = vec![(Blas::root_index(), 0)];
            while let Some((index, depth)) = stack.pop() {
                match self.nodes[index].decode() {
                    NodeLink::Inner { left, right } => {
                        stack.push((right, depth + 1));
                        stack.push((left, depth + 1));
                    }
                    NodeLink::Leaf { slots } => {
                        leaf_depth.add_sample(depth);
                        leaf_size.add_sample(slots.end.index() - slots.start.index());
                    }
                }
            }
        }

        BvhStatistics {
            node_count: self.nodes.len(),
            leaf_depth,
            leaf_size,
        }
    }

    /// Writes an indented outline of the tree, one node per line, with leaf triangles.
    pub fn write_tree(&self, triangles: &[WorldTriangle], out: &mut impl Write) -> fmt::Result {
        if self.nodes.is_empty() {
            return writeln!(out, "<empty>");
        }
        self.write_recursive(Blas::root_index(), 0, triangles, out)
    }

    fn write_recursive(
        &self,
        index: NodeIdx,
        indent: usize,
        triangles: &[WorldTriangle],
        out: &mut impl Write,
    ) -> fmt::Result {
        let node = &self.nodes[index];
        let prefix = "  ".repeat(indent);
        let kind = if node.is_leaf() { "L" } else { "I" };
        writeln!(
            out,
            "{prefix}- {kind}{}: {:?}-{:?}",
            index.raw(),
            node.bounds.min,
            node.bounds.max
        )?;

        match node.decode() {
            NodeLink::Inner { left, right } => {
                self.write_recursive(left, indent + 1, triangles, out)?;
                self.write_recursive(right, indent + 1, triangles, out)
            }
            NodeLink::Leaf { slots } => {
                for primitive in self.primitive_indices[slots].iter() {
                    let t = &triangles[primitive.index()];
                    writeln!(
                        out,
                        "{prefix}    #{}: {:?}, {:?}, {:?}",
                        primitive.raw(),
                        t[0],
                        t[1],
                        t[2]
                    )?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::scene::blas::test::small_triangle;

    use assert2::assert;

    #[test]
    fn two_leaf_statistics() {
        let triangles = [small_triangle(-50.0, 0.0, 0.0), small_triangle(50.0, 0.0, 0.0)];
        let stats = Blas::build(&triangles).unwrap().statistics();

        assert!(stats.node_count == 3);
        assert!(stats.leaf_depth == Stats::from_iter([1, 1]));
        assert!(stats.leaf_size == Stats::from_iter([1, 1]));
    }

    #[test]
    fn tree_outline() {
        let triangles = [small_triangle(-50.0, 0.0, 0.0), small_triangle(50.0, 0.0, 0.0)];
        let blas = Blas::build(&triangles).unwrap();

        let mut out = String::new();
        blas.write_tree(&triangles, &mut out).unwrap();
        let lines: Vec<_> = out.lines().collect();

        assert!(lines.len() == 5);
        assert!(lines[0].starts_with("- I0"));
        assert!(lines[1].starts_with("  - L1"));
        assert!(lines[2].trim_start().starts_with("#"));
        assert!(lines[3].starts_with("  - L2"));
    }

    #[test]
    fn empty_outline() {
        let mut out = String::new();
        Blas::default().write_tree(&[], &mut out).unwrap();
        assert!(out == "<empty>\n");
    }
}
