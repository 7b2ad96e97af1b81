use std::path::Path;

use glam::{Mat4, Vec3};
use gltf::{mesh::Mode, Document, Node, Primitive};
use log::{debug, info, warn};
use raytracer_shared::Material;
use thiserror::Error;

use crate::geometry::SourceMesh;
use crate::scene::{Scene, SceneError};

/// Error types for glTF loading
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("failed to import glTF")]
    Import(#[from] gltf::Error),

    #[error("glTF file has no scene")]
    NoScene,

    #[error("primitive {primitive} of mesh {mesh} has no positions")]
    MissingPositions { mesh: usize, primitive: usize },

    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// One triangle primitive with the world transform of the node that instances it
#[derive(Clone, Debug)]
pub struct LoadedMesh {
    pub name: Option<String>,
    pub source: SourceMesh,
    pub transform: Mat4,
    pub material: Material,
}

impl LoadedMesh {
    pub fn ingest_into(&self, scene: &mut Scene, bvh_depth: u32) -> Result<usize, SceneError> {
        scene.ingest_mesh(
            &self.source,
            self.transform,
            self.material,
            self.source.is_indexed(),
            bvh_depth,
        )
    }
}

/// glTF document plus its decoded buffers
pub struct GltfLoader {
    document: Document,
    buffers: Vec<gltf::buffer::Data>,
}

impl GltfLoader {
    /// Load a glTF or GLB file from path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, LoaderError> {
        let (document, buffers, _) = gltf::import(path)?;
        Ok(Self { document, buffers })
    }

    /// Load glTF JSON or GLB from memory
    #[cfg(test)]
    pub fn load_from_slice(data: &[u8]) -> Result<Self, LoaderError> {
        let (document, buffers, _) = gltf::import_slice(data)?;
        Ok(Self { document, buffers })
    }

    /// Every triangle primitive of the default scene, in world space order of traversal
    pub fn meshes(&self) -> Result<Vec<LoadedMesh>, LoaderError> {
        let scene = self
            .document
            .default_scene()
            .or_else(|| self.document.scenes().next())
            .ok_or(LoaderError::NoScene)?;

        let mut meshes = Vec::new();
        for node in scene.nodes() {
            self.process_node(&node, &Mat4::IDENTITY, &mut meshes)?;
        }
        Ok(meshes)
    }

    /// Replace the scene's geometry with the file's meshes, all at `bvh_depth`
    pub fn load_into(&self, scene: &mut Scene, bvh_depth: u32) -> Result<usize, LoaderError> {
        let meshes = self.meshes()?;
        scene.clear();
        for mesh in &meshes {
            // A partially loaded scene is never kept
            match mesh.ingest_into(scene, bvh_depth) {
                Ok(index) => debug!(
                    "glTF mesh {} stored as mesh {}",
                    mesh.name.as_deref().unwrap_or("<unnamed>"),
                    index
                ),
                Err(err) => {
                    scene.clear();
                    return Err(err.into());
                }
            }
        }
        info!("Loaded {} glTF meshes", meshes.len());
        Ok(meshes.len())
    }

    fn process_node(&self, node: &Node, parent_transform: &Mat4, meshes: &mut Vec<LoadedMesh>) -> Result<(), LoaderError> {
        let local_transform = Mat4::from_cols_array_2d(&node.transform().matrix());
        let transform = *parent_transform * local_transform;

        if let Some(mesh) = node.mesh() {
            for primitive in mesh.primitives() {
                if let Some(source) = self.read_primitive(mesh.index(), &primitive)? {
                    meshes.push(LoadedMesh {
                        name: mesh.name().map(str::to_owned),
                        source,
                        transform,
                        material: convert_material(&primitive.material()),
                    });
                }
            }
        }

        for child in node.children() {
            self.process_node(&child, &transform, meshes)?;
        }
        Ok(())
    }

    fn read_primitive(&self, mesh: usize, primitive: &Primitive) -> Result<Option<SourceMesh>, LoaderError> {
        let reader = primitive.reader(|buffer| self.buffers.get(buffer.index()).map(|data| data.0.as_slice()));

        let positions: Vec<Vec3> = reader
            .read_positions()
            .ok_or(LoaderError::MissingPositions {
                mesh,
                primitive: primitive.index(),
            })?
            .map(Vec3::from_array)
            .collect();
        let normals: Vec<Vec3> = reader
            .read_normals()
            .map(|normals| normals.map(Vec3::from_array).collect())
            .unwrap_or_default();
        let indices: Option<Vec<u32>> = reader.read_indices().map(|indices| indices.into_u32().collect());

        let indices = match primitive.mode() {
            Mode::Triangles => indices,
            Mode::TriangleStrip => {
                let base = indices.unwrap_or_else(|| (0..positions.len() as u32).collect());
                Some(strip_to_list(&base))
            }
            Mode::TriangleFan => {
                let base = indices.unwrap_or_else(|| (0..positions.len() as u32).collect());
                Some(fan_to_list(&base))
            }
            mode => {
                warn!("Skipping primitive with unsupported mode {:?}", mode);
                return Ok(None);
            }
        };

        Ok(Some(SourceMesh::new(positions, normals, indices)))
    }
}

/// Map glTF PBR factors onto the shader's material record
fn convert_material(material: &gltf::Material) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, a] = pbr.base_color_factor();
    let [er, eg, eb] = material.emissive_factor();
    let strength = if er > 0.0 || eg > 0.0 || eb > 0.0 {
        material.emissive_strength().unwrap_or(1.0)
    } else {
        0.0
    };
    let metallic = pbr.metallic_factor();

    Material::new(
        [r, g, b, a],
        [er, eg, eb, strength],
        [1.0 - pbr.roughness_factor(), metallic, metallic, 0.0],
    )
}

/// Triangle list from strip indices; odd triangles are flipped to keep the winding
fn strip_to_list(strip: &[u32]) -> Vec<u32> {
    strip
        .windows(3)
        .enumerate()
        .flat_map(|(i, w)| if i % 2 == 0 { [w[0], w[1], w[2]] } else { [w[0], w[2], w[1]] })
        .collect()
}

fn fan_to_list(fan: &[u32]) -> Vec<u32> {
    match fan.split_first() {
        Some((&center, rest)) => rest.windows(2).flat_map(|w| [center, w[0], w[1]]).collect(),
        None => Vec::new(),
    }
}
