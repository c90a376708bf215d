use crate::geometry::{HitRecord, Ray, WorldBox, WorldTriangle};

use super::{
    BuildError,
    blas::Blas,
    traversal::TraversalObserver,
};

/// Triangle soup in local space together with its hierarchy.
#[derive(Clone, Debug)]
pub struct Mesh {
    triangles: Vec<WorldTriangle>,
    blas: Blas,
}

impl Mesh {
    pub fn new(triangles: Vec<WorldTriangle>) -> Result<Mesh, BuildError> {
        let blas = Blas::build(&triangles)?;
        Ok(Mesh { triangles, blas })
    }

    pub fn triangles(&self) -> &[WorldTriangle] {
        &self.triangles
    }

    pub fn blas(&self) -> &Blas {
        &self.blas
    }

    /// Local space bounds of all triangles.
    pub fn bounding_box(&self) -> WorldBox {
        self.blas.bounding_box()
    }

    /// Moves vertices in place and refits the hierarchy.
    /// Cheap, but the hierarchy quality degrades with large motion, see `rebuild`.
    pub fn update_vertices(&mut self, mut f: impl FnMut(usize, &mut WorldTriangle)) {
        self.triangles
            .iter_mut()
            .enumerate()
            .for_each(|(i, t)| f(i, t));
        self.blas.refit(&self.triangles);
    }

    /// Rebuilds the hierarchy from the current vertices.
    pub fn rebuild(&mut self) -> Result<(), BuildError> {
        self.blas.rebuild(&self.triangles)
    }

    /// Replaces the triangles and rebuilds, keeps the old state on error.
    pub fn set_triangles(&mut self, triangles: Vec<WorldTriangle>) -> Result<(), BuildError> {
        let mut blas = std::mem::take(&mut self.blas);
        match blas.rebuild(&triangles) {
            Ok(()) => {
                self.blas = blas;
                self.triangles = triangles;
                Ok(())
            }
            Err(e) => {
                // Rebuild only fails before touching the hierarchy
                self.blas = blas;
                Err(e)
            }
        }
    }

    pub fn intersect(&self, ray: &Ray, hit: &mut HitRecord) -> bool {
        self.blas.intersect(&self.triangles, ray, hit)
    }

    pub fn intersect_observed<O: TraversalObserver>(
        &self,
        ray: &Ray,
        hit: &mut HitRecord,
        observer: &mut O,
    ) -> bool {
        self.blas
            .intersect_observed(&self.triangles, ray, hit, observer)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        geometry::{WorldPoint, WorldVector},
        scene::blas::test::{check_invariants, small_triangle},
    };

    use assert2::{assert, let_assert};

    fn ray_at(x: f32) -> Ray {
        Ray::new(WorldPoint::new(x, 0.0, -5.0), WorldVector::new(0.0, 0.0, 1.0))
    }

    #[test]
    fn empty_mesh_fails() {
        let_assert!(Err(e) = Mesh::new(Vec::new()));
        assert!(e == BuildError::EmptyMesh);
    }

    #[test]
    fn moved_vertices_are_hit_after_update() {
        let mut mesh =
            Mesh::new(vec![small_triangle(0.0, 0.0, 0.0), small_triangle(10.0, 0.0, 0.0)]).unwrap();

        let mut hit = HitRecord::default();
        assert!(!mesh.intersect(&ray_at(30.0), &mut hit));

        mesh.update_vertices(|i, t| {
            if i == 1 {
                *t = small_triangle(30.0, 0.0, 2.0);
            }
        });
        check_invariants(mesh.blas(), mesh.triangles());

        assert!(mesh.intersect(&ray_at(30.0), &mut hit));
        assert!((hit.t - 7.0).abs() < 1e-5);
        assert!(hit.id.primitive() == 1);
    }

    #[test]
    fn rebuild_after_update_keeps_results() {
        let mut mesh = Mesh::new(
            (0..20)
                .map(|i| small_triangle(i as f32 * 5.0, 0.0, 0.0))
                .collect(),
        )
        .unwrap();
        mesh.update_vertices(|i, t| *t = small_triangle(i as f32 * -5.0, 0.0, 1.0));

        let mut refitted_hit = HitRecord::default();
        mesh.intersect(&ray_at(-25.0), &mut refitted_hit);

        mesh.rebuild().unwrap();
        check_invariants(mesh.blas(), mesh.triangles());
        let mut rebuilt_hit = HitRecord::default();
        mesh.intersect(&ray_at(-25.0), &mut rebuilt_hit);

        assert!(refitted_hit.is_hit());
        assert!(refitted_hit == rebuilt_hit);
    }

    #[test]
    fn failed_set_triangles_keeps_mesh() {
        let mut mesh = Mesh::new(vec![small_triangle(0.0, 0.0, 0.0)]).unwrap();
        let_assert!(Err(BuildError::EmptyMesh) = mesh.set_triangles(Vec::new()));

        assert!(mesh.triangles().len() == 1);
        let mut hit = HitRecord::default();
        assert!(mesh.intersect(&ray_at(0.0), &mut hit));
    }

    #[test]
    fn set_triangles_replaces_geometry() {
        let mut mesh = Mesh::new(vec![small_triangle(0.0, 0.0, 0.0)]).unwrap();
        mesh.set_triangles(vec![small_triangle(20.0, 0.0, 0.0); 3])
            .unwrap();

        assert!(mesh.triangles().len() == 3);
        assert!(mesh.bounding_box() == small_triangle(20.0, 0.0, 0.0).bounding_box());
    }
}
