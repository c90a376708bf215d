pub mod geometry;
pub mod scene;
mod util;

pub use scene::{
    BuildError, BuildSettings, InstanceIdx, KdTreeSettings, MeshIdx, Scene, TlasBuildPolicy,
    TlasStack,
};
pub use util::Stats;
