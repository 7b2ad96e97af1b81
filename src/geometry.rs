use glam::{Mat3, Mat4, Quat, Vec3};
use log::info;
use raytracer_shared::{face_normal, Aabb, Material, RaytracerConfig, Triangle};

use crate::scene::{ensure_capacity, BufferKind, Mesh, Scene, SceneError};

/// In-memory mesh handed over by an asset loader, in local space
#[derive(Clone, Debug, Default)]
pub struct SourceMesh {
    pub positions: Vec<Vec3>,
    /// Per-vertex normals; empty means "use face normals"
    pub normals: Vec<Vec3>,
    pub indices: Option<Vec<u32>>,
}

impl SourceMesh {
    pub fn new(positions: Vec<Vec3>, normals: Vec<Vec3>, indices: Option<Vec<u32>>) -> Self {
        Self {
            positions,
            normals,
            indices,
        }
    }

    pub fn is_indexed(&self) -> bool {
        self.indices.is_some()
    }

    /// Vertex references in triangle order, validated against the vertex count
    fn vertex_references(&self, indexed: bool) -> Result<Vec<usize>, SceneError> {
        let references: Vec<usize> = if indexed {
            let indices = self.indices.as_ref().ok_or(SceneError::MissingIndices)?;
            indices
                .iter()
                .map(|&index| {
                    let vertex = index as usize;
                    if vertex < self.positions.len() {
                        Ok(vertex)
                    } else {
                        Err(SceneError::IndexOutOfRange {
                            index,
                            vertex_count: self.positions.len(),
                        })
                    }
                })
                .collect::<Result<_, _>>()?
        } else {
            (0..self.positions.len()).collect()
        };

        if references.len() % 3 != 0 {
            return Err(SceneError::IncompleteTriangle {
                count: references.len(),
            });
        }
        Ok(references)
    }
}

/// Rotation applied to normals.
///
/// A transform that collapses an axis (zero scale) has no decomposition; the missing
/// axis is rebuilt from the two surviving ones, or identity if fewer survive.
fn normal_rotation(transform: &Mat4) -> Quat {
    if transform.determinant() != 0.0 {
        let (_, rotation, _) = transform.to_scale_rotation_translation();
        if rotation.is_finite() {
            return rotation;
        }
    }

    let linear = Mat3::from_mat4(*transform);
    let [x, y, z] = [linear.x_axis, linear.y_axis, linear.z_axis].map(Vec3::normalize_or_zero);
    let basis = match (x == Vec3::ZERO, y == Vec3::ZERO, z == Vec3::ZERO) {
        (false, false, true) => Mat3::from_cols(x, y, x.cross(y).normalize_or_zero()),
        (false, true, false) => Mat3::from_cols(x, z.cross(x).normalize_or_zero(), z),
        (true, false, false) => Mat3::from_cols(y.cross(z).normalize_or_zero(), y, z),
        _ => return Quat::IDENTITY,
    };
    let rotation = Quat::from_mat3(&basis);
    if rotation.is_finite() && rotation.length_squared() > 0.0 {
        rotation.normalize()
    } else {
        Quat::IDENTITY
    }
}

impl Scene {
    /// Convert a source mesh into world-space triangles and record its descriptor.
    ///
    /// Positions go through the full `transform`; normals only through its rotation.
    /// Nothing is appended unless every check passes. Returns the new mesh index.
    pub fn ingest_mesh(
        &mut self,
        source: &SourceMesh,
        transform: Mat4,
        material: Material,
        indexed: bool,
        bvh_depth: u32,
    ) -> Result<usize, SceneError> {
        if bvh_depth > RaytracerConfig::MAX_BVH_DEPTH {
            return Err(SceneError::DepthTooLarge {
                depth: bvh_depth,
                max: RaytracerConfig::MAX_BVH_DEPTH,
            });
        }
        if !source.normals.is_empty() && source.normals.len() != source.positions.len() {
            return Err(SceneError::NormalCountMismatch {
                positions: source.positions.len(),
                normals: source.normals.len(),
            });
        }

        let references = source.vertex_references(indexed)?;
        let triangle_count = references.len() / 3;
        let capacities = self.capacities();
        ensure_capacity(BufferKind::Meshes, self.meshes.len() + 1, capacities.meshes)?;
        ensure_capacity(
            BufferKind::Triangles,
            self.triangles.len() + triangle_count,
            capacities.triangles,
        )?;

        let rotation = normal_rotation(&transform);

        let mut bounds = Aabb::from_points(source.positions.iter().copied())
            .map(|local| local.transformed(&transform))
            .unwrap_or_else(|| Aabb::from_point(transform.transform_point3(Vec3::ZERO)));

        let mut triangles = Vec::with_capacity(triangle_count);
        for corners in references.chunks_exact(3) {
            let local = [
                source.positions[corners[0]],
                source.positions[corners[1]],
                source.positions[corners[2]],
            ];
            let normals = if source.normals.is_empty() {
                [face_normal(local); 3]
            } else {
                [
                    source.normals[corners[0]],
                    source.normals[corners[1]],
                    source.normals[corners[2]],
                ]
            };

            let positions = local.map(|p| transform.transform_point3(p));
            for point in positions {
                bounds.grow(point);
            }
            triangles.push(Triangle::new(positions, normals.map(|n| rotation * n)));
        }

        let first_triangle = self.triangles.len();
        self.triangles.extend(triangles);
        self.meshes.push(Mesh {
            first_triangle,
            triangle_count,
            root_node: None,
            bvh_depth,
            material,
            bounds,
        });

        info!(
            "Ingested mesh {}: {} triangles ({}), BVH depth {}",
            self.meshes.len() - 1,
            triangle_count,
            if indexed { "indexed" } else { "sequential" },
            bvh_depth
        );
        Ok(self.meshes.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use raytracer_shared::BufferCapacities;
    use std::f32::consts::FRAC_PI_2;

    fn unit_triangle() -> SourceMesh {
        SourceMesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![Vec3::Z; 3],
            None,
        )
    }

    fn quad() -> SourceMesh {
        SourceMesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y],
            vec![Vec3::Z; 4],
            Some(vec![0, 1, 2, 0, 2, 3]),
        )
    }

    #[test]
    fn test_ingest_single_triangle() {
        let mut scene = Scene::new();
        let mesh = scene
            .ingest_mesh(&unit_triangle(), Mat4::IDENTITY, Material::default(), false, 1)
            .unwrap();

        assert_eq!(mesh, 0);
        assert_eq!(scene.triangles().len(), 1);
        let descriptor = scene.meshes()[0];
        assert_eq!(descriptor.triangle_range(), 0..1);
        assert_eq!(descriptor.bvh_depth, 1);
        assert_eq!(descriptor.root_node, None);
        assert_eq!(descriptor.bounds.min, [0.0, 0.0, 0.0]);
        assert_eq!(descriptor.bounds.max, [1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_indexed_gather() {
        let mut scene = Scene::new();
        scene
            .ingest_mesh(&quad(), Mat4::IDENTITY, Material::default(), true, 2)
            .unwrap();

        let triangles = scene.triangles();
        assert_eq!(triangles.len(), 2);
        assert_eq!(triangles[1].pos_a, [0.0, 0.0, 0.0]);
        assert_eq!(triangles[1].pos_b, [1.0, 1.0, 0.0]);
        assert_eq!(triangles[1].pos_c, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_zero_scale_keeps_normals_finite() {
        let mut scene = Scene::new();
        scene
            .ingest_mesh(
                &unit_triangle(),
                Mat4::from_scale(Vec3::new(1.0, 1.0, 0.0)),
                Material::default(),
                false,
                1,
            )
            .unwrap();

        for normal in scene.triangles()[0].normals() {
            assert!(normal.is_finite());
            assert_abs_diff_eq!(normal, Vec3::Z, epsilon = 1e-6);
        }
        assert!(scene.meshes()[0].bounds.min_vec().is_finite());
        scene.build_bvhs().unwrap();
    }

    #[test]
    fn test_fully_collapsed_transform_leaves_normals_unrotated() {
        let mut scene = Scene::new();
        scene
            .ingest_mesh(&unit_triangle(), Mat4::ZERO, Material::default(), false, 0)
            .unwrap();

        for normal in scene.triangles()[0].normals() {
            assert_abs_diff_eq!(normal, Vec3::Z, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_transform_moves_positions_and_rotates_normals() {
        let mut scene = Scene::new();
        let transform = Mat4::from_scale_rotation_translation(
            Vec3::splat(2.0),
            Quat::from_rotation_x(FRAC_PI_2),
            Vec3::new(0.0, 5.0, 0.0),
        );
        scene
            .ingest_mesh(&unit_triangle(), transform, Material::default(), false, 0)
            .unwrap();

        let [a, b, c] = scene.triangles()[0].positions();
        assert_abs_diff_eq!(a, Vec3::new(0.0, 5.0, 0.0), epsilon = 1e-5);
        assert_abs_diff_eq!(b, Vec3::new(2.0, 5.0, 0.0), epsilon = 1e-5);
        assert_abs_diff_eq!(c, Vec3::new(0.0, 5.0, 2.0), epsilon = 1e-5);

        // Scale and translation leave the normal a unit vector, rotated from +Z to -Y
        for normal in scene.triangles()[0].normals() {
            assert_abs_diff_eq!(normal, Vec3::new(0.0, -1.0, 0.0), epsilon = 1e-5);
        }

        let bounds = scene.meshes()[0].bounds;
        assert_abs_diff_eq!(bounds.min_vec(), Vec3::new(0.0, 5.0, 0.0), epsilon = 1e-5);
        assert_abs_diff_eq!(bounds.max_vec(), Vec3::new(2.0, 5.0, 2.0), epsilon = 1e-5);
    }

    #[test]
    fn test_missing_normals_use_face_normal() {
        let mut scene = Scene::new();
        let source = SourceMesh::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], Vec::new(), None);
        scene
            .ingest_mesh(&source, Mat4::IDENTITY, Material::default(), false, 0)
            .unwrap();

        for normal in scene.triangles()[0].normals() {
            assert_abs_diff_eq!(normal, Vec3::Z, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_meshes_append_after_each_other() {
        let mut scene = Scene::new();
        scene
            .ingest_mesh(&quad(), Mat4::IDENTITY, Material::default(), true, 1)
            .unwrap();
        let second = scene
            .ingest_mesh(&unit_triangle(), Mat4::IDENTITY, Material::default(), false, 1)
            .unwrap();

        assert_eq!(second, 1);
        assert_eq!(scene.meshes()[0].triangle_range(), 0..2);
        assert_eq!(scene.meshes()[1].triangle_range(), 2..3);
    }

    #[test]
    fn test_zero_triangle_mesh() {
        let mut scene = Scene::new();
        let empty = SourceMesh::default();
        let transform = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        scene
            .ingest_mesh(&empty, transform, Material::default(), false, 3)
            .unwrap();

        let mesh = scene.meshes()[0];
        assert_eq!(mesh.triangle_count, 0);
        assert_eq!(mesh.bounds.min, [1.0, 2.0, 3.0]);
        assert_eq!(mesh.bounds.max, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_invalid_input_is_rejected_without_mutation() {
        let mut scene = Scene::new();

        let out_of_range = SourceMesh::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], Vec::new(), Some(vec![0, 1, 3]));
        assert_eq!(
            scene.ingest_mesh(&out_of_range, Mat4::IDENTITY, Material::default(), true, 1),
            Err(SceneError::IndexOutOfRange {
                index: 3,
                vertex_count: 3
            })
        );

        assert_eq!(
            scene.ingest_mesh(&unit_triangle(), Mat4::IDENTITY, Material::default(), true, 1),
            Err(SceneError::MissingIndices)
        );

        let dangling = SourceMesh::new(vec![Vec3::ZERO, Vec3::X], Vec::new(), None);
        assert_eq!(
            scene.ingest_mesh(&dangling, Mat4::IDENTITY, Material::default(), false, 1),
            Err(SceneError::IncompleteTriangle { count: 2 })
        );

        let mismatched = SourceMesh::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![Vec3::Z], None);
        assert_eq!(
            scene.ingest_mesh(&mismatched, Mat4::IDENTITY, Material::default(), false, 1),
            Err(SceneError::NormalCountMismatch {
                positions: 3,
                normals: 1
            })
        );

        assert_eq!(
            scene.ingest_mesh(&unit_triangle(), Mat4::IDENTITY, Material::default(), false, 25),
            Err(SceneError::DepthTooLarge { depth: 25, max: 24 })
        );

        assert!(scene.meshes().is_empty());
        assert!(scene.triangles().is_empty());
    }

    #[test]
    fn test_triangle_overflow_fails_fast() {
        let mut scene = Scene::with_capacities(BufferCapacities {
            triangles: 3,
            ..BufferCapacities::DEFAULT
        });
        scene
            .ingest_mesh(&quad(), Mat4::IDENTITY, Material::default(), true, 1)
            .unwrap();

        let err = scene
            .ingest_mesh(&quad(), Mat4::IDENTITY, Material::default(), true, 1)
            .unwrap_err();
        assert_eq!(
            err,
            SceneError::CapacityExceeded {
                kind: BufferKind::Triangles,
                requested: 4,
                capacity: 3
            }
        );
        assert_eq!(scene.triangles().len(), 2);
        assert_eq!(scene.meshes().len(), 1);
    }

    #[test]
    fn test_mesh_overflow_fails_fast() {
        let mut scene = Scene::with_capacities(BufferCapacities {
            meshes: 1,
            ..BufferCapacities::DEFAULT
        });
        scene
            .ingest_mesh(&unit_triangle(), Mat4::IDENTITY, Material::default(), false, 1)
            .unwrap();
        assert!(matches!(
            scene.ingest_mesh(&unit_triangle(), Mat4::IDENTITY, Material::default(), false, 1),
            Err(SceneError::CapacityExceeded {
                kind: BufferKind::Meshes,
                ..
            })
        ));
    }
}
