use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Configuration constants for the raytracer
pub struct RaytracerConfig;

impl RaytracerConfig {
    // Flat buffer capacities, mirrored by the array sizes the shader expects
    pub const MAX_SPHERES: usize = 4;
    pub const MAX_MESHES: usize = 10;
    pub const MAX_TRIANGLES: usize = 500_000;
    pub const MAX_NODES: usize = 1_000_000;

    // Binding slots inside the raytracing bind group
    pub const UNIFORM_SLOT: u32 = 0;
    pub const SPHERE_SLOT: u32 = 1;
    pub const MESH_SLOT: u32 = 2;
    pub const TRIANGLE_SLOT: u32 = 3;
    pub const NODE_SLOT: u32 = 4;

    /// Deepest BVH a single mesh may request
    pub const MAX_BVH_DEPTH: u32 = 24;

    pub const NEAR_PLANE: f32 = 0.01;
    pub const CAMERA_MOVE_SPEED: f32 = 0.1;
    pub const CAMERA_ROTATE_SENSITIVITY: f32 = 0.005;
    pub const CAMERA_PITCH_CLAMP: f32 = 0.99;

    pub const PERFORMANCE_STATS_INTERVAL: u64 = 60; // frames
    pub const MILLISECONDS_PER_SECOND: f32 = 1000.0;
}

/// Upper bounds for the four flat scene buffers
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BufferCapacities {
    pub spheres: usize,
    pub meshes: usize,
    pub triangles: usize,
    pub nodes: usize,
}

impl BufferCapacities {
    pub const DEFAULT: Self = Self {
        spheres: RaytracerConfig::MAX_SPHERES,
        meshes: RaytracerConfig::MAX_MESHES,
        triangles: RaytracerConfig::MAX_TRIANGLES,
        nodes: RaytracerConfig::MAX_NODES,
    };
}

impl Default for BufferCapacities {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Coordinate axis used for BVH splitting
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Axis::X),
            1 => Some(Axis::Y),
            2 => Some(Axis::Z),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// Component of `v` along this axis
    pub fn of(self, v: Vec3) -> f32 {
        match self {
            Axis::X => v.x,
            Axis::Y => v.y,
            Axis::Z => v.z,
        }
    }
}

/// Axis-Aligned Bounding Box, padded to the std430 `vec3` stride
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Aabb {
    pub min: [f32; 3],      // Minimum bounds
    pub _padding0: f32,     // Padding for alignment
    pub max: [f32; 3],      // Maximum bounds
    pub _padding1: f32,     // Padding for alignment
}

impl Aabb {
    /// Create a new AABB
    pub fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self {
            min,
            _padding0: 0.0,
            max,
            _padding1: 0.0,
        }
    }

    /// Create an empty AABB. Growing it by any point yields that point.
    pub fn empty() -> Self {
        Self::new([f32::INFINITY; 3], [f32::NEG_INFINITY; 3])
    }

    /// Zero-volume box sitting on a single point
    pub fn from_point(point: Vec3) -> Self {
        Self::new(point.to_array(), point.to_array())
    }

    /// Smallest box holding every point, `None` for an empty iterator
    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Option<Self> {
        let mut points = points.into_iter();
        let mut aabb = Self::from_point(points.next()?);
        for point in points {
            aabb.grow(point);
        }
        Some(aabb)
    }

    pub fn from_triangle(triangle: &Triangle) -> Self {
        let mut aabb = Self::empty();
        aabb.grow_triangle(triangle);
        aabb
    }

    pub fn min_vec(&self) -> Vec3 {
        Vec3::from_array(self.min)
    }

    pub fn max_vec(&self) -> Vec3 {
        Vec3::from_array(self.max)
    }

    /// Extend the box to include `point` (componentwise min/max)
    pub fn grow(&mut self, point: Vec3) {
        self.min = self.min_vec().min(point).to_array();
        self.max = self.max_vec().max(point).to_array();
    }

    pub fn grow_triangle(&mut self, triangle: &Triangle) {
        for point in triangle.positions() {
            self.grow(point);
        }
    }

    /// Combine this AABB with another
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb::new(
            self.min_vec().min(other.min_vec()).to_array(),
            self.max_vec().max(other.max_vec()).to_array(),
        )
    }

    /// Get the center point of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min_vec() + self.max_vec()) * 0.5
    }

    pub fn center_on_axis(&self, axis: Axis) -> f32 {
        axis.of(self.center())
    }

    pub fn extent(&self) -> Vec3 {
        self.max_vec() - self.min_vec()
    }

    /// Longest side, ties resolved X before Y before Z
    pub fn longest_axis(&self) -> Axis {
        let size = self.extent();
        if size.x >= size.y && size.x >= size.z {
            Axis::X
        } else if size.y >= size.z {
            Axis::Y
        } else {
            Axis::Z
        }
    }

    pub fn contains(&self, other: &Aabb) -> bool {
        self.min_vec().cmple(other.min_vec()).all() && self.max_vec().cmpge(other.max_vec()).all()
    }

    /// Bounds of the eight corners after an affine transform
    pub fn transformed(&self, transform: &glam::Mat4) -> Aabb {
        let (min, max) = (self.min_vec(), self.max_vec());
        let corners = (0..8).map(|i| {
            transform.transform_point3(Vec3::new(
                if i & 1 == 0 { min.x } else { max.x },
                if i & 2 == 0 { min.y } else { max.y },
                if i & 4 == 0 { min.z } else { max.z },
            ))
        });
        Aabb::from_points(corners).unwrap_or_else(Aabb::empty)
    }
}

/// World-space triangle with per-vertex normals.
/// Every `vec3` is followed by a float of padding to match the shader's 16-byte stride.
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Triangle {
    pub pos_a: [f32; 3],
    pub _padding_a: f32,
    pub pos_b: [f32; 3],
    pub _padding_b: f32,
    pub pos_c: [f32; 3],
    pub _padding_c: f32,
    pub normal_a: [f32; 3],
    pub _padding_d: f32,
    pub normal_b: [f32; 3],
    pub _padding_e: f32,
    pub normal_c: [f32; 3],
    pub _padding_f: f32,
}

impl Triangle {
    pub fn new(positions: [Vec3; 3], normals: [Vec3; 3]) -> Self {
        Self {
            pos_a: positions[0].to_array(),
            _padding_a: 0.0,
            pos_b: positions[1].to_array(),
            _padding_b: 0.0,
            pos_c: positions[2].to_array(),
            _padding_c: 0.0,
            normal_a: normals[0].to_array(),
            _padding_d: 0.0,
            normal_b: normals[1].to_array(),
            _padding_e: 0.0,
            normal_c: normals[2].to_array(),
            _padding_f: 0.0,
        }
    }

    /// Triangle whose three normals all equal the geometric face normal
    pub fn flat(positions: [Vec3; 3]) -> Self {
        let normal = face_normal(positions);
        Self::new(positions, [normal; 3])
    }

    pub fn positions(&self) -> [Vec3; 3] {
        [
            Vec3::from_array(self.pos_a),
            Vec3::from_array(self.pos_b),
            Vec3::from_array(self.pos_c),
        ]
    }

    pub fn normals(&self) -> [Vec3; 3] {
        [
            Vec3::from_array(self.normal_a),
            Vec3::from_array(self.normal_b),
            Vec3::from_array(self.normal_c),
        ]
    }

    /// Average of the three vertex positions
    pub fn centroid(&self) -> Vec3 {
        let [a, b, c] = self.positions();
        (a + b + c) / 3.0
    }

    pub fn centroid_on_axis(&self, axis: Axis) -> f32 {
        axis.of(self.centroid())
    }

    /// Calculate the bounding box of this triangle
    pub fn bounding_box(&self) -> Aabb {
        Aabb::from_triangle(self)
    }
}

/// Unit normal of the plane through three points; zero for degenerate triangles
pub fn face_normal([a, b, c]: [Vec3; 3]) -> Vec3 {
    (b - a).cross(c - a).normalize_or_zero()
}

/// Surface description, opaque to the host and passed to the shader as-is
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Material {
    pub color: [f32; 4],
    pub emission: [f32; 4], // rgb = emission colour, a = strength
    pub extra: [f32; 4],    // smoothness, specular probability, metallic, unused
}

impl Material {
    pub fn new(color: [f32; 4], emission: [f32; 4], extra: [f32; 4]) -> Self {
        Self {
            color,
            emission,
            extra,
        }
    }

    /// Create a diffuse material
    pub fn diffuse(color: [f32; 3]) -> Self {
        Self::new([color[0], color[1], color[2], 1.0], [0.0; 4], [0.0; 4])
    }

    /// Create an emissive material
    pub fn emissive(color: [f32; 3], emission: [f32; 3], strength: f32) -> Self {
        Self::new(
            [color[0], color[1], color[2], 1.0],
            [emission[0], emission[1], emission[2], strength],
            [0.0; 4],
        )
    }

    /// Create a metallic material
    pub fn metallic(color: [f32; 3], smoothness: f32) -> Self {
        Self::new([color[0], color[1], color[2], 1.0], [0.0; 4], [smoothness, 1.0, 1.0, 0.0])
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::diffuse([1.0; 3])
    }
}

/// Sphere primitive, intersected directly by the shader
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Sphere {
    pub position: [f32; 3],
    pub radius: f32,
    pub material: Material,
}

impl Sphere {
    /// Create a new sphere
    pub fn new(position: [f32; 3], radius: f32, material: Material) -> Self {
        Self {
            position,
            radius,
            material,
        }
    }
}

/// Per-mesh descriptor as the shader reads it
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct GpuMesh {
    pub first_triangle: u32,
    pub triangle_count: u32,
    pub root_node: u32,
    pub bvh_depth: u32,
    pub material: Material,
    pub bounds_min: [f32; 4],
    pub bounds_max: [f32; 4],
}

/// Flattened BVH node as the shader reads it.
/// `child_index` is only meaningful when `is_leaf == 0`; the second child sits at `child_index + 1`.
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct GpuNode {
    pub bounds: Aabb,
    pub triangle_index: u32,
    pub triangle_count: u32,
    pub child_index: u32,
    pub is_leaf: u32,
}

impl GpuNode {
    pub fn is_leaf(&self) -> bool {
        self.is_leaf != 0
    }
}

/// Ambient lighting. Colours are RGBA8 as authored; the shader receives them normalised.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkyMaterial {
    pub sky_color_zenith: [u8; 4],
    pub sky_color_horizon: [u8; 4],
    pub ground_color: [u8; 4],
    pub sun_color: [u8; 4],
    pub sun_direction: [f32; 3],
    pub sun_focus: f32,
    pub sun_intensity: f32,
}

impl Default for SkyMaterial {
    fn default() -> Self {
        const DARK_GRAY: [u8; 4] = [80, 80, 80, 255];
        Self {
            sky_color_zenith: DARK_GRAY,
            sky_color_horizon: DARK_GRAY,
            ground_color: DARK_GRAY,
            sun_color: DARK_GRAY,
            sun_direction: [-0.5, -1.0, -0.5],
            sun_focus: 1.0,
            sun_intensity: 0.5,
        }
    }
}

/// RGBA8 colour to normalised floats
pub fn color_to_vec4(color: [u8; 4]) -> [f32; 4] {
    (Vec4::new(color[0] as f32, color[1] as f32, color[2] as f32, color[3] as f32) / 255.0).to_array()
}

/// Uniform block of the raytracing pass
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct TracingUniforms {
    pub camera_position: [f32; 3],
    pub rays_per_pixel: u32,
    pub camera_direction: [f32; 3],
    pub max_bounces: u32,
    pub view_params: [f32; 3],
    pub blur: f32,
    pub resolution: [f32; 2],
    pub screen_center: [f32; 2],
    pub rendered_frames: u32,
    pub denoise: u32,
    pub pause: u32,
    pub sphere_count: u32,
    pub mesh_count: u32,
    pub _padding: [u32; 3],
    pub sky_color_zenith: [f32; 4],
    pub sky_color_horizon: [f32; 4],
    pub ground_color: [f32; 4],
    pub sun_color: [f32; 4],
    pub sun_direction: [f32; 3],
    pub sun_focus: f32,
    pub sun_intensity: f32,
    pub _padding_sky: [f32; 3],
}

impl TracingUniforms {
    pub fn set_sky(&mut self, sky: &SkyMaterial) {
        self.sky_color_zenith = color_to_vec4(sky.sky_color_zenith);
        self.sky_color_horizon = color_to_vec4(sky.sky_color_horizon);
        self.ground_color = color_to_vec4(sky.ground_color);
        self.sun_color = color_to_vec4(sky.sun_color);
        self.sun_direction = sky.sun_direction;
        self.sun_focus = sky.sun_focus;
        self.sun_intensity = sky.sun_intensity;
    }
}

/// Uniform block of the post-process pass
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct PostUniforms {
    pub resolution: [f32; 2],
    pub denoise: u32,
    pub _padding: u32,
}

// Byte sizes the WGSL declarations in shaders/ rely on
const _: () = assert!(std::mem::size_of::<Aabb>() == 32);
const _: () = assert!(std::mem::size_of::<Triangle>() == 96);
const _: () = assert!(std::mem::size_of::<Material>() == 48);
const _: () = assert!(std::mem::size_of::<Sphere>() == 64);
const _: () = assert!(std::mem::size_of::<GpuMesh>() == 96);
const _: () = assert!(std::mem::size_of::<GpuNode>() == 48);
const _: () = assert!(std::mem::size_of::<TracingUniforms>() == 192);
const _: () = assert!(std::mem::size_of::<PostUniforms>() == 16);
