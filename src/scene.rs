use std::fmt;
use std::ops::Range;

use log::info;
use raytracer_shared::{Aabb, BufferCapacities, GpuMesh, Material, SkyMaterial, Sphere, Triangle};
use thiserror::Error;

use crate::buffers::FlatBuffers;
use crate::bvh::Node;

/// The four fixed-capacity scene buffers
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufferKind {
    Spheres,
    Meshes,
    Triangles,
    Nodes,
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BufferKind::Spheres => "sphere",
            BufferKind::Meshes => "mesh",
            BufferKind::Triangles => "triangle",
            BufferKind::Nodes => "node",
        };
        f.write_str(name)
    }
}

/// Errors raised while building or serializing a scene
#[derive(Debug, Error, PartialEq)]
pub enum SceneError {
    /// A fixed buffer would overflow
    #[error("{kind} buffer overflow: {requested} entries requested, capacity is {capacity}")]
    CapacityExceeded {
        kind: BufferKind,
        requested: usize,
        capacity: usize,
    },

    #[error("vertex index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },

    /// Indexed ingestion was requested for a mesh without an index array
    #[error("indexed mesh has no index array")]
    MissingIndices,

    #[error("mesh has {normals} normals for {positions} positions")]
    NormalCountMismatch { positions: usize, normals: usize },

    /// Vertex references that do not divide into whole triangles
    #[error("{count} vertex references do not form whole triangles")]
    IncompleteTriangle { count: usize },

    #[error("BVH depth {depth} exceeds the maximum of {max}")]
    DepthTooLarge { depth: u32, max: u32 },

    /// Serialization attempted before the hierarchy of this mesh was built
    #[error("mesh {mesh} has no BVH root")]
    MissingBvh { mesh: usize },
}

/// Fail with `CapacityExceeded` when `requested` entries do not fit
pub(crate) fn ensure_capacity(kind: BufferKind, requested: usize, capacity: usize) -> Result<(), SceneError> {
    if requested > capacity {
        return Err(SceneError::CapacityExceeded {
            kind,
            requested,
            capacity,
        });
    }
    Ok(())
}

/// Host-side mesh descriptor. The triangle range is contiguous in the scene's triangle list.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Mesh {
    pub first_triangle: usize,
    pub triangle_count: usize,
    /// Root node index, `None` until the BVH is built
    pub root_node: Option<usize>,
    pub bvh_depth: u32,
    pub material: Material,
    pub bounds: Aabb,
}

impl Mesh {
    pub fn triangle_range(&self) -> Range<usize> {
        self.first_triangle..self.first_triangle + self.triangle_count
    }

    pub(crate) fn to_gpu(&self, root_node: usize) -> GpuMesh {
        GpuMesh {
            first_triangle: self.first_triangle as u32,
            triangle_count: self.triangle_count as u32,
            root_node: root_node as u32,
            bvh_depth: self.bvh_depth,
            material: self.material,
            bounds_min: [self.bounds.min[0], self.bounds.min[1], self.bounds.min[2], 0.0],
            bounds_max: [self.bounds.max[0], self.bounds.max[1], self.bounds.max[2], 0.0],
        }
    }
}

/// Live entry counts of a scene
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SceneStats {
    pub spheres: usize,
    pub meshes: usize,
    pub triangles: usize,
    pub nodes: usize,
    pub leaves: usize,
}

impl fmt::Display for SceneStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} spheres, {} meshes, {} triangles, {} nodes ({} leaves)",
            self.spheres, self.meshes, self.triangles, self.nodes, self.leaves
        )
    }
}

/// Owns every geometry list of a loaded scene.
///
/// Meshes are appended by ingestion, hierarchies are built by [`Scene::build_bvhs`], and
/// [`Scene::finalize`] produces the flat buffers the shader reads.
pub struct Scene {
    pub(crate) spheres: Vec<Sphere>,
    pub(crate) meshes: Vec<Mesh>,
    pub(crate) triangles: Vec<Triangle>,
    pub(crate) nodes: Vec<Node>,
    sky: SkyMaterial,
    capacities: BufferCapacities,
}

impl Scene {
    pub fn new() -> Self {
        Self::with_capacities(BufferCapacities::DEFAULT)
    }

    pub fn with_capacities(capacities: BufferCapacities) -> Self {
        Self {
            spheres: Vec::new(),
            meshes: Vec::new(),
            triangles: Vec::new(),
            nodes: Vec::new(),
            sky: SkyMaterial::default(),
            capacities,
        }
    }

    pub fn capacities(&self) -> BufferCapacities {
        self.capacities
    }

    pub fn spheres(&self) -> &[Sphere] {
        &self.spheres
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn sky(&self) -> &SkyMaterial {
        &self.sky
    }

    pub fn set_sky(&mut self, sky: SkyMaterial) {
        self.sky = sky;
    }

    /// Append a sphere, returning its index
    pub fn add_sphere(&mut self, position: [f32; 3], radius: f32, material: Material) -> Result<usize, SceneError> {
        ensure_capacity(BufferKind::Spheres, self.spheres.len() + 1, self.capacities.spheres)?;
        self.spheres.push(Sphere::new(position, radius, material));
        Ok(self.spheres.len() - 1)
    }

    /// Drop all geometry. The sky is kept.
    pub fn clear(&mut self) {
        self.spheres.clear();
        self.meshes.clear();
        self.triangles.clear();
        self.nodes.clear();
    }

    /// Build every mesh hierarchy, then copy the scene into `flat`
    pub fn finalize(&mut self, flat: &mut FlatBuffers) -> Result<(), SceneError> {
        self.build_bvhs()?;
        flat.serialize(self)?;
        info!("Scene finalized: {}", self.stats());
        Ok(())
    }

    pub fn stats(&self) -> SceneStats {
        SceneStats {
            spheres: self.spheres.len(),
            meshes: self.meshes.len(),
            triangles: self.triangles.len(),
            nodes: self.nodes.len(),
            leaves: self.nodes.iter().filter(|node| node.is_leaf()).count(),
        }
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> BufferCapacities {
        BufferCapacities {
            spheres: 2,
            meshes: 2,
            triangles: 8,
            nodes: 16,
        }
    }

    #[test]
    fn test_add_sphere_respects_capacity() {
        let mut scene = Scene::with_capacities(small());
        assert_eq!(scene.add_sphere([0.0; 3], 1.0, Material::default()), Ok(0));
        assert_eq!(scene.add_sphere([1.0; 3], 0.5, Material::default()), Ok(1));

        let err = scene.add_sphere([2.0; 3], 0.5, Material::default()).unwrap_err();
        assert_eq!(
            err,
            SceneError::CapacityExceeded {
                kind: BufferKind::Spheres,
                requested: 3,
                capacity: 2
            }
        );
        assert_eq!(scene.spheres().len(), 2);
    }

    #[test]
    fn test_clear_keeps_sky() {
        let mut scene = Scene::with_capacities(small());
        let sky = SkyMaterial {
            sun_intensity: 3.0,
            ..SkyMaterial::default()
        };
        scene.set_sky(sky);
        scene.add_sphere([0.0; 3], 1.0, Material::default()).unwrap();
        scene.clear();

        assert_eq!(scene.stats(), SceneStats::default());
        assert_eq!(scene.sky().sun_intensity, 3.0);
    }

    #[test]
    fn test_capacity_error_message() {
        let err = ensure_capacity(BufferKind::Triangles, 501, 500).unwrap_err();
        assert_eq!(
            err.to_string(),
            "triangle buffer overflow: 501 entries requested, capacity is 500"
        );
        assert!(ensure_capacity(BufferKind::Nodes, 500, 500).is_ok());
    }
}
