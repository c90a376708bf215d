use index_vec::IndexSlice;

use crate::geometry::{HitRecord, Ray, WorldBox, WorldTransform};

use super::{BuildError, InstanceIdx, MeshIdx, mesh::Mesh, traversal::TraversalObserver};

/// Placement of a mesh in the world.
#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    mesh: MeshIdx,
    transform: WorldTransform,
    inverse_transform: WorldTransform,
    /// World space box around the transformed mesh bounds.
    bounds: WorldBox,
}

impl Instance {
    pub fn new(
        mesh: MeshIdx,
        transform: WorldTransform,
        meshes: &IndexSlice<MeshIdx, [Mesh]>,
    ) -> Result<Instance, BuildError> {
        let mut instance = Instance {
            mesh,
            transform: WorldTransform::identity(),
            inverse_transform: WorldTransform::identity(),
            bounds: WorldBox::empty(),
        };
        instance.set_transform(transform, meshes)?;
        Ok(instance)
    }

    pub fn mesh(&self) -> MeshIdx {
        self.mesh
    }

    pub fn transform(&self) -> &WorldTransform {
        &self.transform
    }

    pub fn bounds(&self) -> &WorldBox {
        &self.bounds
    }

    /// Replaces the transform and recomputes world bounds.
    /// Fails without changing anything if the matrix is not invertible.
    pub fn set_transform(
        &mut self,
        transform: WorldTransform,
        meshes: &IndexSlice<MeshIdx, [Mesh]>,
    ) -> Result<(), BuildError> {
        let mesh = meshes
            .get(self.mesh)
            .ok_or(BuildError::UnknownMesh(self.mesh))?;
        let inverse_transform = transform
            .try_inverse()
            .ok_or(BuildError::SingularTransform)?;

        self.transform = transform;
        self.inverse_transform = inverse_transform;
        self.bounds = mesh.bounding_box().transformed(&self.transform);
        Ok(())
    }

    /// Recomputes world bounds after the mesh geometry changed.
    pub fn update_bounds(&mut self, meshes: &IndexSlice<MeshIdx, [Mesh]>) {
        self.bounds = meshes[self.mesh]
            .bounding_box()
            .transformed(&self.transform);
    }

    /// Intersects the referenced mesh with the ray moved to mesh space.
    /// Ray direction is not renormalized, so `t` means the same in both spaces.
    /// On hit the instance part of the id is set to `index`.
    pub fn intersect_observed<O: TraversalObserver>(
        &self,
        index: InstanceIdx,
        meshes: &IndexSlice<MeshIdx, [Mesh]>,
        ray: &Ray,
        hit: &mut HitRecord,
        observer: &mut O,
    ) -> bool {
        let local_ray = ray.transformed(&self.inverse_transform);
        let found = meshes[self.mesh].intersect_observed(&local_ray, hit, observer);
        if found {
            hit.id = hit.id.with_instance(index.raw() as u32);
        }
        found
    }

    pub fn intersect(
        &self,
        index: InstanceIdx,
        meshes: &IndexSlice<MeshIdx, [Mesh]>,
        ray: &Ray,
        hit: &mut HitRecord,
    ) -> bool {
        self.intersect_observed(index, meshes, ray, hit, &mut ())
    }
}
