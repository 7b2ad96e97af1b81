use bytemuck::Zeroable;
use log::info;
use raytracer_shared::{BufferCapacities, GpuMesh, GpuNode, RaytracerConfig, Sphere, Triangle};

use crate::scene::{ensure_capacity, BufferKind, Scene, SceneError};

/// Host copies of the four scene buffers, always allocated at full capacity.
///
/// Only the first `*_count` entries of each array are meaningful; the rest keep
/// whatever an earlier serialization left there and are never read by the shader.
pub struct FlatBuffers {
    spheres: Vec<Sphere>,
    meshes: Vec<GpuMesh>,
    triangles: Vec<Triangle>,
    nodes: Vec<GpuNode>,
    pub sphere_count: usize,
    pub mesh_count: usize,
    pub triangle_count: usize,
    pub node_count: usize,
}

impl FlatBuffers {
    pub fn new(capacities: BufferCapacities) -> Self {
        Self {
            spheres: vec![Sphere::zeroed(); capacities.spheres],
            meshes: vec![GpuMesh::zeroed(); capacities.meshes],
            triangles: vec![Triangle::zeroed(); capacities.triangles],
            nodes: vec![GpuNode::zeroed(); capacities.nodes],
            sphere_count: 0,
            mesh_count: 0,
            triangle_count: 0,
            node_count: 0,
        }
    }

    pub fn capacities(&self) -> BufferCapacities {
        BufferCapacities {
            spheres: self.spheres.len(),
            meshes: self.meshes.len(),
            triangles: self.triangles.len(),
            nodes: self.nodes.len(),
        }
    }

    /// Copy the scene's lists into the arrays, preserving order.
    ///
    /// Every size check runs before the first write, so a failure leaves the arrays
    /// and counts untouched.
    pub fn serialize(&mut self, scene: &Scene) -> Result<(), SceneError> {
        let capacities = self.capacities();
        ensure_capacity(BufferKind::Spheres, scene.spheres().len(), capacities.spheres)?;
        ensure_capacity(BufferKind::Meshes, scene.meshes().len(), capacities.meshes)?;
        ensure_capacity(BufferKind::Triangles, scene.triangles().len(), capacities.triangles)?;
        ensure_capacity(BufferKind::Nodes, scene.nodes().len(), capacities.nodes)?;

        let meshes = scene
            .meshes()
            .iter()
            .enumerate()
            .map(|(index, mesh)| {
                mesh.root_node
                    .map(|root| mesh.to_gpu(root))
                    .ok_or(SceneError::MissingBvh { mesh: index })
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.spheres[..scene.spheres().len()].copy_from_slice(scene.spheres());
        self.meshes[..meshes.len()].copy_from_slice(&meshes);
        self.triangles[..scene.triangles().len()].copy_from_slice(scene.triangles());
        for (slot, node) in self.nodes.iter_mut().zip(scene.nodes()) {
            *slot = node.to_gpu();
        }

        self.sphere_count = scene.spheres().len();
        self.mesh_count = meshes.len();
        self.triangle_count = scene.triangles().len();
        self.node_count = scene.nodes().len();
        Ok(())
    }

    pub fn spheres(&self) -> &[Sphere] {
        &self.spheres[..self.sphere_count]
    }

    pub fn meshes(&self) -> &[GpuMesh] {
        &self.meshes[..self.mesh_count]
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles[..self.triangle_count]
    }

    pub fn nodes(&self) -> &[GpuNode] {
        &self.nodes[..self.node_count]
    }

    /// Full-capacity byte image of one buffer, as uploaded
    pub fn bytes(&self, kind: BufferKind) -> &[u8] {
        match kind {
            BufferKind::Spheres => bytemuck::cast_slice(&self.spheres),
            BufferKind::Meshes => bytemuck::cast_slice(&self.meshes),
            BufferKind::Triangles => bytemuck::cast_slice(&self.triangles),
            BufferKind::Nodes => bytemuck::cast_slice(&self.nodes),
        }
    }
}

/// GPU storage buffers mirroring [`FlatBuffers`], bound at fixed slots
pub struct GpuSceneBuffers {
    pub spheres: wgpu::Buffer,
    pub meshes: wgpu::Buffer,
    pub triangles: wgpu::Buffer,
    pub nodes: wgpu::Buffer,
}

impl GpuSceneBuffers {
    pub fn new(device: &wgpu::Device, flat: &FlatBuffers) -> Self {
        let create = |label: &str, kind: BufferKind| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: flat.bytes(kind).len() as u64,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };

        Self {
            spheres: create("Sphere Buffer", BufferKind::Spheres),
            meshes: create("Mesh Buffer", BufferKind::Meshes),
            triangles: create("Triangle Buffer", BufferKind::Triangles),
            nodes: create("Node Buffer", BufferKind::Nodes),
        }
    }

    /// Re-upload all four buffers in full
    pub fn upload(&self, queue: &wgpu::Queue, flat: &FlatBuffers) {
        let mut total = 0;
        for (buffer, kind) in [
            (&self.spheres, BufferKind::Spheres),
            (&self.meshes, BufferKind::Meshes),
            (&self.triangles, BufferKind::Triangles),
            (&self.nodes, BufferKind::Nodes),
        ] {
            let bytes = flat.bytes(kind);
            queue.write_buffer(buffer, 0, bytes);
            total += bytes.len();
        }
        info!(
            "Uploaded scene buffers: {} spheres, {} meshes, {} triangles, {} nodes ({:.1} MiB)",
            flat.spheres().len(),
            flat.meshes().len(),
            flat.triangles().len(),
            flat.nodes().len(),
            total as f32 / (1024.0 * 1024.0)
        );
    }

    /// Layout entries for the uniform block and the four storage buffers
    pub fn layout_entries() -> [wgpu::BindGroupLayoutEntry; 5] {
        let storage = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        [
            wgpu::BindGroupLayoutEntry {
                binding: RaytracerConfig::UNIFORM_SLOT,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            storage(RaytracerConfig::SPHERE_SLOT),
            storage(RaytracerConfig::MESH_SLOT),
            storage(RaytracerConfig::TRIANGLE_SLOT),
            storage(RaytracerConfig::NODE_SLOT),
        ]
    }

    pub fn bind_group(
        &self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        uniforms: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: RaytracerConfig::UNIFORM_SLOT,
                    resource: uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: RaytracerConfig::SPHERE_SLOT,
                    resource: self.spheres.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: RaytracerConfig::MESH_SLOT,
                    resource: self.meshes.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: RaytracerConfig::TRIANGLE_SLOT,
                    resource: self.triangles.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: RaytracerConfig::NODE_SLOT,
                    resource: self.nodes.as_entire_binding(),
                },
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SourceMesh;
    use glam::{Mat4, Vec3};
    use raytracer_shared::Material;

    fn small() -> BufferCapacities {
        BufferCapacities {
            spheres: 4,
            meshes: 4,
            triangles: 16,
            nodes: 64,
        }
    }

    fn demo_scene() -> Scene {
        let mut scene = Scene::with_capacities(small());
        let quad = SourceMesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y],
            Vec::new(),
            Some(vec![0, 1, 2, 0, 2, 3]),
        );
        scene
            .ingest_mesh(&quad, Mat4::IDENTITY, Material::diffuse([0.8, 0.2, 0.2]), true, 2)
            .unwrap();
        scene
            .ingest_mesh(
                &quad,
                Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0)),
                Material::emissive([1.0; 3], [1.0, 0.9, 0.8], 4.0),
                true,
                1,
            )
            .unwrap();
        scene.add_sphere([0.0, 1.0, 0.0], 0.5, Material::metallic([0.9; 3], 0.8)).unwrap();
        scene.build_bvhs().unwrap();
        scene
    }

    #[test]
    fn test_serialize_copies_prefix_in_order() {
        let scene = demo_scene();
        let mut flat = FlatBuffers::new(small());
        flat.serialize(&scene).unwrap();

        assert_eq!(flat.spheres(), scene.spheres());
        assert_eq!(flat.triangles(), scene.triangles());
        assert_eq!(flat.mesh_count, 2);
        assert_eq!(flat.node_count, scene.nodes().len());
        for (gpu, node) in flat.nodes().iter().zip(scene.nodes()) {
            assert_eq!(*gpu, node.to_gpu());
        }

        let second = flat.meshes()[1];
        assert_eq!(second.first_triangle, 2);
        assert_eq!(second.triangle_count, 2);
        assert_eq!(second.root_node, 7);
        assert_eq!(second.bvh_depth, 1);
        assert_eq!(second.material.emission, [1.0, 0.9, 0.8, 4.0]);
        assert_eq!(second.bounds_min[1], 2.0);
    }

    #[test]
    fn test_serialize_is_idempotent() {
        let scene = demo_scene();
        let mut flat = FlatBuffers::new(small());

        flat.serialize(&scene).unwrap();
        let first: Vec<Vec<u8>> = [BufferKind::Spheres, BufferKind::Meshes, BufferKind::Triangles, BufferKind::Nodes]
            .into_iter()
            .map(|kind| flat.bytes(kind).to_vec())
            .collect();

        flat.serialize(&scene).unwrap();
        for (kind, bytes) in [BufferKind::Spheres, BufferKind::Meshes, BufferKind::Triangles, BufferKind::Nodes]
            .into_iter()
            .zip(first)
        {
            assert_eq!(flat.bytes(kind), bytes.as_slice());
        }
    }

    #[test]
    fn test_byte_images_have_full_capacity() {
        let flat = FlatBuffers::new(small());
        assert_eq!(flat.bytes(BufferKind::Spheres).len(), 4 * 64);
        assert_eq!(flat.bytes(BufferKind::Meshes).len(), 4 * 96);
        assert_eq!(flat.bytes(BufferKind::Triangles).len(), 16 * 96);
        assert_eq!(flat.bytes(BufferKind::Nodes).len(), 64 * 48);
    }

    #[test]
    fn test_overflow_is_rejected_before_writing() {
        let scene = demo_scene();
        let mut flat = FlatBuffers::new(BufferCapacities {
            nodes: 8,
            ..small()
        });

        assert_eq!(
            flat.serialize(&scene),
            Err(SceneError::CapacityExceeded {
                kind: BufferKind::Nodes,
                requested: 10,
                capacity: 8
            })
        );
        assert_eq!(flat.triangle_count, 0);
        assert!(flat.bytes(BufferKind::Triangles).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_unbuilt_scene_is_not_serialized() {
        let mut scene = demo_scene();
        scene.clear();
        let quad = SourceMesh::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], Vec::new(), None);
        scene
            .ingest_mesh(&quad, Mat4::IDENTITY, Material::default(), false, 1)
            .unwrap();

        let mut flat = FlatBuffers::new(small());
        assert_eq!(flat.serialize(&scene), Err(SceneError::MissingBvh { mesh: 0 }));
    }

    #[test]
    fn test_finalize_builds_and_serializes() {
        let mut scene = demo_scene();
        let mut flat = FlatBuffers::new(small());
        scene.finalize(&mut flat).unwrap();
        assert_eq!(flat.node_count, 7 + 3);
        assert_eq!(flat.meshes()[0].root_node, 0);
    }

    #[test]
    fn test_shrinking_scene_keeps_stale_tail_out_of_view() {
        let mut scene = demo_scene();
        let mut flat = FlatBuffers::new(small());
        flat.serialize(&scene).unwrap();

        scene.clear();
        scene.add_sphere([5.0; 3], 1.0, Material::default()).unwrap();
        flat.serialize(&scene).unwrap();

        assert_eq!(flat.spheres(), scene.spheres());
        assert_eq!(flat.mesh_count, 0);
        assert_eq!(flat.node_count, 0);
    }
}
