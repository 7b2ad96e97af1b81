use glam::{Vec2, Vec3};
use raytracer_shared::{RaytracerConfig, TracingUniforms};

/// Look-at camera with a vertical field of view in degrees
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub fov: f32,
}

/// Camera-derived values written into the tracing uniforms each frame
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CameraView {
    pub camera_position: Vec3,
    /// Unit view direction scaled by `1 / tan(fov / 2)`
    pub camera_direction: Vec3,
    /// Near-plane width, height and distance
    pub view_params: Vec3,
    pub resolution: Vec2,
    pub screen_center: Vec2,
}

impl Camera {
    pub fn new(position: Vec3, target: Vec3, fov: f32) -> Self {
        Self {
            position,
            target,
            fov,
        }
    }

    /// Unit vector from the position towards the target
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }

    pub fn view(&self, width: u32, height: u32) -> CameraView {
        let near = RaytracerConfig::NEAR_PLANE;
        let half_fov = (self.fov * 0.5).to_radians();
        let plane_height = near * half_fov.tan() * 2.0;
        let plane_width = plane_height * width as f32 / height.max(1) as f32;
        let resolution = Vec2::new(width as f32, height as f32);

        CameraView {
            camera_position: self.position,
            camera_direction: self.forward() * (1.0 / half_fov.tan()),
            view_params: Vec3::new(plane_width, plane_height, near),
            resolution,
            screen_center: resolution * 0.5,
        }
    }
}

impl CameraView {
    pub fn write_to(&self, uniforms: &mut TracingUniforms) {
        uniforms.camera_position = self.camera_position.to_array();
        uniforms.camera_direction = self.camera_direction.to_array();
        uniforms.view_params = self.view_params.to_array();
        uniforms.resolution = self.resolution.to_array();
        uniforms.screen_center = self.screen_center.to_array();
    }
}
