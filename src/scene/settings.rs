use std::num::NonZeroUsize;

use assert2::assert;
use bon::bon;

use crate::geometry::FloatType;

const DEFAULT_LEAF_SIZE: NonZeroUsize = NonZeroUsize::new(4).unwrap();

/// Algorithm used for building the top level hierarchy.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TlasBuildPolicy {
    /// Greedy bottom up clustering with a linear nearest neighbor scan.
    /// Best trees, quadratic build time.
    #[default]
    Agglomerative,
    /// Binned SAH over instance bounds.
    Quick,
    /// Same clustering as `Agglomerative`, with neighbors found through a kd-tree.
    Clustered,
}

#[derive(Clone, Debug, PartialEq)]
pub struct KdTreeSettings {
    /// Nodes with at most this many items are not split.
    pub leaf_size: usize,
    /// Midpoint split is replaced by a median split if one side has more than this many
    /// times the items of the other.
    pub rebalance_ratio: FloatType,
}

#[bon]
impl KdTreeSettings {
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_LEAF_SIZE)] leaf_size: NonZeroUsize,
        #[builder(default = 3.0)] rebalance_ratio: FloatType,
    ) -> Self {
        assert!(rebalance_ratio >= 1.0, "Rebalance ratio below 1 would always rebalance");
        KdTreeSettings {
            leaf_size: leaf_size.get(),
            rebalance_ratio,
        }
    }
}

impl Default for KdTreeSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuildSettings {
    pub tlas_policy: TlasBuildPolicy,
    pub kd_tree: KdTreeSettings,
}

#[bon]
impl BuildSettings {
    #[builder]
    pub fn new(
        #[builder(default)] tlas_policy: TlasBuildPolicy,
        #[builder(default)] kd_tree: KdTreeSettings,
    ) -> Self {
        BuildSettings {
            tlas_policy,
            kd_tree,
        }
    }
}
