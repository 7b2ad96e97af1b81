use std::f32::consts::{FRAC_PI_2, TAU};

use glam::{Mat4, Quat, Vec3};
use log::info;
use raytracer_shared::Material;

use crate::geometry::SourceMesh;
use crate::scene::{Scene, SceneError};

/// Indexed torus around the Z axis with smooth normals
pub fn torus(major_radius: f32, minor_radius: f32, rings: u32, sides: u32) -> SourceMesh {
    let rings = rings.max(3);
    let sides = sides.max(3);
    let mut positions = Vec::with_capacity((rings * sides) as usize);
    let mut normals = Vec::with_capacity((rings * sides) as usize);

    for ring in 0..rings {
        let theta = ring as f32 / rings as f32 * TAU;
        let center = Vec3::new(theta.cos(), theta.sin(), 0.0) * major_radius;
        for side in 0..sides {
            let phi = side as f32 / sides as f32 * TAU;
            let normal = Vec3::new(theta.cos() * phi.cos(), theta.sin() * phi.cos(), phi.sin());
            positions.push(center + normal * minor_radius);
            normals.push(normal);
        }
    }

    let mut indices = Vec::with_capacity((rings * sides * 6) as usize);
    for ring in 0..rings {
        let next_ring = (ring + 1) % rings;
        for side in 0..sides {
            let next_side = (side + 1) % sides;
            let a = ring * sides + side;
            let b = next_ring * sides + side;
            let c = next_ring * sides + next_side;
            let d = ring * sides + next_side;
            indices.extend([a, b, c, a, c, d]);
        }
    }

    SourceMesh::new(positions, normals, Some(indices))
}

/// Non-indexed axis-aligned cube of edge `size` centred on the origin, flat normals
pub fn cube(size: f32) -> SourceMesh {
    let h = size * 0.5;
    // (normal, u, v) with u x v == normal
    let faces = [
        (Vec3::X, Vec3::Y, Vec3::Z),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::Z, Vec3::X),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::Y, Vec3::X),
    ];

    let mut positions = Vec::with_capacity(36);
    let mut normals = Vec::with_capacity(36);
    for (normal, u, v) in faces {
        let corner = |su: f32, sv: f32| (normal + u * su + v * sv) * h;
        let quad = [corner(-1.0, -1.0), corner(1.0, -1.0), corner(1.0, 1.0), corner(-1.0, 1.0)];
        for i in [0, 1, 2, 0, 2, 3] {
            positions.push(quad[i]);
            normals.push(normal);
        }
    }

    SourceMesh::new(positions, normals, None)
}

/// Fill `scene` with the built-in demo: an emissive ring, a cube and two spheres
pub fn demo_scene(scene: &mut Scene) -> Result<(), SceneError> {
    scene.clear();

    let ring = Mat4::from_scale_rotation_translation(
        Vec3::new(1.0, 1.0, 0.1),
        Quat::from_rotation_x(FRAC_PI_2),
        Vec3::new(0.0, 5.0, 0.0),
    );
    let ring_mesh = torus(3.0, 0.4, 48, 16);
    scene.ingest_mesh(
        &ring_mesh,
        ring,
        Material::emissive([1.0; 3], [1.0, 0.85, 0.6], 4.0),
        true,
        10,
    )?;

    scene.ingest_mesh(
        &cube(2.0),
        Mat4::from_translation(Vec3::new(0.0, 3.0, 0.0)),
        Material::diffuse([0.8, 0.8, 0.8]),
        false,
        8,
    )?;

    scene.add_sphere([3.0, 1.0, 0.0], 1.0, Material::metallic([0.9, 0.6, 0.3], 0.9))?;
    scene.add_sphere([0.0, -100.0, 0.0], 100.0, Material::diffuse([0.4, 0.5, 0.4]))?;

    info!("Demo scene ready: {}", scene.stats());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::FlatBuffers;
    use approx::assert_abs_diff_eq;
    use raytracer_shared::{face_normal, BufferCapacities};

    #[test]
    fn test_torus_shape() {
        let mesh = torus(2.0, 0.5, 8, 6);
        assert_eq!(mesh.positions.len(), 48);
        assert_eq!(mesh.normals.len(), 48);
        let indices = mesh.indices.as_ref().unwrap();
        assert_eq!(indices.len(), 8 * 6 * 6);
        assert!(indices.iter().all(|&i| (i as usize) < mesh.positions.len()));

        for (position, normal) in mesh.positions.iter().zip(&mesh.normals) {
            let ring_distance = Vec3::new(position.x, position.y, 0.0).length();
            assert!(ring_distance >= 1.5 - 1e-5 && ring_distance <= 2.5 + 1e-5);
            assert_abs_diff_eq!(normal.length(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_cube_normals_face_outwards() {
        let mesh = cube(2.0);
        assert_eq!(mesh.positions.len(), 36);
        assert!(mesh.indices.is_none());

        for (corners, normals) in mesh.positions.chunks_exact(3).zip(mesh.normals.chunks_exact(3)) {
            let geometric = face_normal([corners[0], corners[1], corners[2]]);
            assert_abs_diff_eq!(geometric, normals[0], epsilon = 1e-6);
            let centroid = (corners[0] + corners[1] + corners[2]) / 3.0;
            assert!(centroid.dot(normals[0]) > 0.0);
        }
        for position in &mesh.positions {
            assert_abs_diff_eq!(position.abs().max_element(), 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_demo_scene_fits_default_buffers() {
        let mut scene = Scene::new();
        demo_scene(&mut scene).unwrap();

        let mut flat = FlatBuffers::new(BufferCapacities::DEFAULT);
        scene.finalize(&mut flat).unwrap();

        assert_eq!(flat.mesh_count, 2);
        assert_eq!(flat.sphere_count, 2);
        assert_eq!(flat.triangle_count, 48 * 16 * 2 + 12);
        assert_eq!(flat.node_count, (1 << 11) - 1 + (1 << 9) - 1);

        // The ring is flattened and laid horizontally around (0, 5, 0)
        let ring = scene.meshes()[0].bounds;
        assert_abs_diff_eq!(ring.center(), Vec3::new(0.0, 5.0, 0.0), epsilon = 1e-3);
        assert!(ring.extent().z > 6.0 && ring.extent().y < 1.0);
    }
}
