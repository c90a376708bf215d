pub mod blas;
mod instance;
pub mod kd_tree;
mod mesh;
mod settings;
pub mod tlas;
mod traversal;

use index_vec::{IndexSlice, IndexVec};
use log::debug;
use thiserror::Error;

use crate::geometry::{HitRecord, PrimitiveId, Ray, WorldBox, WorldTransform, WorldTriangle};

pub use instance::Instance;
pub use kd_tree::KdTreeError;
pub use mesh::Mesh;
pub use settings::{BuildSettings, KdTreeSettings, TlasBuildPolicy};
pub use tlas::{Tlas, TlasBuildContext, TlasStack};
pub use traversal::{StackCache, TraversalObserver, TraversalStats};

/// Maximum number of instances in a scene, limited by the instance bits of `PrimitiveId`.
pub const MAX_INSTANCE_COUNT: usize = PrimitiveId::MAX_INSTANCE as usize + 1;

index_vec::define_index_type! {
    /// Handle of a mesh in the scene arena.
    pub struct MeshIdx = u32;
    IMPL_RAW_CONVERSIONS = true;
}

index_vec::define_index_type! {
    /// Handle of an instance, also the instance part of hit ids.
    pub struct InstanceIdx = u16;
    MAX_INDEX = MAX_INSTANCE_COUNT - 1;
    IMPL_RAW_CONVERSIONS = true;
}

#[derive(Error, Debug, PartialEq)]
pub enum BuildError {
    #[error("Mesh has no triangles")]
    EmptyMesh,
    #[error("Scene has no instances")]
    EmptyScene,
    #[error("Mesh has {count} triangles, at most {max} are supported")]
    TooManyPrimitives { count: usize, max: usize },
    #[error("Scene has {count} instances, at most {max} are supported")]
    TooManyInstances { count: usize, max: usize },
    #[error("Instance transform is not invertible")]
    SingularTransform,
    #[error("Unknown mesh {0:?}")]
    UnknownMesh(MeshIdx),
    #[error("Unknown instance {0:?}")]
    UnknownInstance(InstanceIdx),
    #[error("Spatial index failure: {0}")]
    SpatialIndex(#[from] KdTreeError),
}

/// Meshes, their instances and the top level hierarchy over them.
///
/// Changes to meshes or instances only become visible to queries after `rebuild`.
/// Queries take `&self`, so any number of threads can trace against a built scene,
/// each with its own `TlasStack`.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    meshes: IndexVec<MeshIdx, Mesh>,
    instances: IndexVec<InstanceIdx, Instance>,
    tlas: Tlas,
    build_context: TlasBuildContext,
    settings: BuildSettings,
    /// Instances changed since the last TLAS build
    dirty: bool,
}

impl Scene {
    pub fn new(settings: BuildSettings) -> Scene {
        Scene {
            build_context: TlasBuildContext::new(settings.kd_tree.clone()),
            settings,
            ..Default::default()
        }
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    /// Creates a mesh and builds its hierarchy.
    pub fn add_mesh(&mut self, triangles: Vec<WorldTriangle>) -> Result<MeshIdx, BuildError> {
        let mesh = Mesh::new(triangles)?;
        Ok(self.meshes.push(mesh))
    }

    pub fn meshes(&self) -> &IndexSlice<MeshIdx, [Mesh]> {
        &self.meshes
    }

    pub fn mesh(&self, mesh: MeshIdx) -> Option<&Mesh> {
        self.meshes.get(mesh)
    }

    /// Moves vertices of a mesh in place, refits its hierarchy and updates bounds of all
    /// instances using it.
    pub fn update_mesh_vertices(
        &mut self,
        mesh: MeshIdx,
        f: impl FnMut(usize, &mut WorldTriangle),
    ) -> Result<(), BuildError> {
        self.meshes
            .get_mut(mesh)
            .ok_or(BuildError::UnknownMesh(mesh))?
            .update_vertices(f);
        self.update_instance_bounds(mesh);
        Ok(())
    }

    /// Rebuilds the hierarchy of a mesh from its current vertices.
    pub fn rebuild_mesh(&mut self, mesh: MeshIdx) -> Result<(), BuildError> {
        self.meshes
            .get_mut(mesh)
            .ok_or(BuildError::UnknownMesh(mesh))?
            .rebuild()?;
        self.update_instance_bounds(mesh);
        Ok(())
    }

    fn update_instance_bounds(&mut self, mesh: MeshIdx) {
        for instance in self.instances.iter_mut() {
            if instance.mesh() == mesh {
                instance.update_bounds(&self.meshes);
                self.dirty = true;
            }
        }
    }

    pub fn add_instance(
        &mut self,
        mesh: MeshIdx,
        transform: WorldTransform,
    ) -> Result<InstanceIdx, BuildError> {
        if self.instances.len() >= MAX_INSTANCE_COUNT {
            return Err(BuildError::TooManyInstances {
                count: self.instances.len() + 1,
                max: MAX_INSTANCE_COUNT,
            });
        }
        let instance = Instance::new(mesh, transform, &self.meshes)?;
        self.dirty = true;
        Ok(self.instances.push(instance))
    }

    pub fn instances(&self) -> &IndexSlice<InstanceIdx, [Instance]> {
        &self.instances
    }

    pub fn set_transform(
        &mut self,
        instance: InstanceIdx,
        transform: WorldTransform,
    ) -> Result<(), BuildError> {
        self.instances
            .get_mut(instance)
            .ok_or(BuildError::UnknownInstance(instance))?
            .set_transform(transform, &self.meshes)?;
        self.dirty = true;
        Ok(())
    }

    /// True if meshes or instances changed since the last `rebuild`.
    pub fn needs_rebuild(&self) -> bool {
        self.dirty
    }

    /// Rebuilds the top level hierarchy using the configured policy.
    pub fn rebuild(&mut self) -> Result<(), BuildError> {
        self.rebuild_with(self.settings.tlas_policy)
    }

    pub fn rebuild_with(&mut self, policy: TlasBuildPolicy) -> Result<(), BuildError> {
        self.tlas
            .build(&self.instances, policy, &mut self.build_context)?;
        self.dirty = false;
        debug!(
            "Scene rebuilt: {} meshes, {} instances",
            self.meshes.len(),
            self.instances.len()
        );
        Ok(())
    }

    pub fn tlas(&self) -> &Tlas {
        &self.tlas
    }

    /// World bounds of everything in the last built hierarchy.
    pub fn bounding_box(&self) -> WorldBox {
        self.tlas.bounding_box()
    }

    /// Finds the nearest hit closer than `hit.t`, updating `hit` if found.
    /// Returns true if `hit` was updated.
    pub fn intersect(&self, ray: &Ray, hit: &mut HitRecord, stack: &mut TlasStack) -> bool {
        self.intersect_observed(ray, hit, stack, &mut ())
    }

    pub fn intersect_observed<O: TraversalObserver>(
        &self,
        ray: &Ray,
        hit: &mut HitRecord,
        stack: &mut TlasStack,
        observer: &mut O,
    ) -> bool {
        debug_assert!(!self.dirty, "Scene changed without rebuilding");
        self.tlas
            .intersect_observed(&self.instances, &self.meshes, ray, hit, stack, observer)
    }
}
