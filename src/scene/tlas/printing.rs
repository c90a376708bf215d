use std::fmt::{self, Display, Write};

use index_vec::IndexSlice;

use crate::{
    scene::{InstanceIdx, instance::Instance},
    util::Stats,
};

use super::{Tlas, TlasLink, TlasNodeIdx};

/// Shape summary of the top level hierarchy.
#[derive(Clone, Debug, PartialEq)]
pub struct TlasStatistics {
    /// Allocated nodes, including the ones left unreachable by building
    pub node_count: usize,
    pub reachable_node_count: usize,
    /// Depth of leaves, root has depth 0
    pub leaf_depth: Stats,
}

impl Display for TlasStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} nodes ({} reachable); leaf depth: {}",
            self.node_count, self.reachable_node_count, self.leaf_depth
        )
    }
}

impl Tlas {
    pub fn statistics(&self) -> TlasStatistics {
        let mut leaf_depth = Stats::default();
        let mut reachable_node_count = 0;

        if !self.nodes.is_empty() {
            let mut stack = vec![(Tlas::root_index(), 0)];
            while let Some((index, depth)) = stack.pop() {
                reachable_node_count += 1;
                match self.nodes[index].decode() {
                    TlasLink::Inner { left, right } => {
                        stack.push((right, depth + 1));
                        stack.push((left, depth + 1));
                    }
                    TlasLink::Leaf { .. } => leaf_depth.add_sample(depth),
                }
            }
        }

        TlasStatistics {
            node_count: self.nodes.len(),
            reachable_node_count,
            leaf_depth,
        }
    }

    /// Writes an indented outline of the tree, one node per line, leaves with their mesh.
    pub fn write_tree(
        &self,
        instances: &IndexSlice<InstanceIdx, [Instance]>,
        out: &mut impl Write,
    ) -> fmt::Result {
        if self.nodes.is_empty() {
            return writeln!(out, "<empty>");
        }
        self.write_recursive(Tlas::root_index(), 0, instances, out)
    }

    fn write_recursive(
        &self,
        index: TlasNodeIdx,
        indent: usize,
        instances: &IndexSlice<InstanceIdx, [Instance]>,
        out: &mut impl Write,
    ) -> fmt::Result {
        let node = &self.nodes[index];
        let prefix = "  ".repeat(indent);

        match node.decode() {
            TlasLink::Inner { left, right } => {
                writeln!(
                    out,
                    "{prefix}- I{}: {:?}-{:?}",
                    index.raw(),
                    node.bounds.min,
                    node.bounds.max
                )?;
                self.write_recursive(left, indent + 1, instances, out)?;
                self.write_recursive(right, indent + 1, instances, out)
            }
            TlasLink::Leaf { instance } => writeln!(
                out,
                "{prefix}- L{}: instance {} of mesh {}, {:?}-{:?}",
                index.raw(),
                instance.raw(),
                instances[instance].mesh().raw(),
                node.bounds.min,
                node.bounds.max
            ),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::scene::{
        settings::TlasBuildPolicy,
        tlas::{TlasBuildContext, test::scene_with_offsets},
    };

    use assert2::assert;
    use nalgebra::Vector3;

    #[test]
    fn three_instance_statistics() {
        let (_meshes, instances) = scene_with_offsets(&[
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(3.0, 0.0, 0.0),
            Vector3::new(100.0, 0.0, 0.0),
        ]);
        let mut tlas = Tlas::default();
        tlas.build(
            &instances,
            TlasBuildPolicy::Agglomerative,
            &mut TlasBuildContext::default(),
        )
        .unwrap();
        let stats = tlas.statistics();

        // Placeholder root, 3 leaves, 2 merges
        assert!(stats.node_count == 6);
        assert!(stats.reachable_node_count == 5);
        assert!(stats.leaf_depth.count == 3);
        assert!(stats.leaf_depth.min == 1);
        assert!(stats.leaf_depth.max == 2);
    }

    #[test]
    fn tree_outline() {
        let (_meshes, instances) =
            scene_with_offsets(&[Vector3::new(0.0, 0.0, 0.0), Vector3::new(10.0, 0.0, 0.0)]);
        let mut tlas = Tlas::default();
        tlas.build(&instances, TlasBuildPolicy::Quick, &mut TlasBuildContext::default())
            .unwrap();

        let mut out = String::new();
        tlas.write_tree(&instances, &mut out).unwrap();
        let lines: Vec<_> = out.lines().collect();

        assert!(lines.len() == 3);
        assert!(lines[0].starts_with("- I0"));
        assert!(lines[1].starts_with("  - L"));
        assert!(lines[1].contains("of mesh 0"));
        assert!(lines[2].starts_with("  - L"));
    }

    #[test]
    fn empty_outline() {
        let (_meshes, instances) = scene_with_offsets(&[]);
        let mut out = String::new();
        Tlas::default().write_tree(&instances, &mut out).unwrap();
        assert!(out == "<empty>\n");
    }
}
