use glam::{Quat, Vec3};
use raytracer_shared::RaytracerConfig;
use winit::{
    dpi::PhysicalPosition,
    event::{ElementState, MouseButton, VirtualKeyCode},
};

use crate::camera::Camera;

/// Actions the host frame loop forwards to the renderer
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action {
    ToggleDebug,
    ToggleDenoise,
    TogglePause,
    /// Free-fly step: forward, right, up in units of the move speed
    Move(i8, i8, i8),
    Exit,
}

impl Action {
    pub fn from_key(key: VirtualKeyCode) -> Option<Self> {
        match key {
            VirtualKeyCode::Key1 => Some(Action::ToggleDebug),
            VirtualKeyCode::R => Some(Action::ToggleDenoise),
            VirtualKeyCode::P => Some(Action::TogglePause),
            VirtualKeyCode::W => Some(Action::Move(1, 0, 0)),
            VirtualKeyCode::S => Some(Action::Move(-1, 0, 0)),
            VirtualKeyCode::D => Some(Action::Move(0, 1, 0)),
            VirtualKeyCode::A => Some(Action::Move(0, -1, 0)),
            VirtualKeyCode::E => Some(Action::Move(0, 0, 1)),
            VirtualKeyCode::Q => Some(Action::Move(0, 0, -1)),
            VirtualKeyCode::Escape => Some(Action::Exit),
            _ => None,
        }
    }
}

/// Mouse drag tracking
#[derive(Default)]
pub struct InputState {
    mouse_pressed: bool,
    last_mouse_pos: Option<(f64, f64)>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle_mouse_input(&mut self, button: MouseButton, button_state: ElementState) {
        if button == MouseButton::Left {
            self.mouse_pressed = button_state == ElementState::Pressed;
        }
    }

    /// Track the cursor; returns the drag delta while the left button is held
    pub fn handle_cursor_moved(&mut self, position: PhysicalPosition<f64>) -> Option<(f64, f64)> {
        let delta = match (self.mouse_pressed, self.last_mouse_pos) {
            (true, Some((x, y))) => Some((position.x - x, position.y - y)),
            _ => None,
        };
        self.last_mouse_pos = Some((position.x, position.y));
        delta
    }
}

/// Free-fly movement of a look-at camera. The target moves along with the camera.
pub struct CameraController;

impl CameraController {
    pub fn rotate_camera(camera: &mut Camera, delta_x: f64, delta_y: f64) {
        let sensitivity = RaytracerConfig::CAMERA_ROTATE_SENSITIVITY;
        let distance = (camera.target - camera.position).length().max(1.0);
        let forward = camera.forward();

        let yawed = Quat::from_rotation_y(-delta_x as f32 * sensitivity) * forward;
        let clamp = RaytracerConfig::CAMERA_PITCH_CLAMP;
        let pitched = Vec3::new(yawed.x, (yawed.y - delta_y as f32 * sensitivity).clamp(-clamp, clamp), yawed.z);

        let direction = pitched.try_normalize().unwrap_or(forward);
        camera.target = camera.position + direction * distance;
    }

    pub fn move_camera(camera: &mut Camera, forward: f32, right: f32, up: f32) {
        let speed = RaytracerConfig::CAMERA_MOVE_SPEED;
        let facing = camera.forward();
        let right_vec = facing.cross(Vec3::Y).normalize_or_zero();

        let offset = (facing * forward + right_vec * right + Vec3::Y * up) * speed;
        camera.position += offset;
        camera.target += offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_key_bindings() {
        assert_eq!(Action::from_key(VirtualKeyCode::Key1), Some(Action::ToggleDebug));
        assert_eq!(Action::from_key(VirtualKeyCode::R), Some(Action::ToggleDenoise));
        assert_eq!(Action::from_key(VirtualKeyCode::P), Some(Action::TogglePause));
        assert_eq!(Action::from_key(VirtualKeyCode::Q), Some(Action::Move(0, 0, -1)));
        assert_eq!(Action::from_key(VirtualKeyCode::Z), None);
    }

    #[test]
    fn test_drag_delta_only_while_pressed() {
        let mut input = InputState::new();
        assert_eq!(input.handle_cursor_moved(PhysicalPosition::new(10.0, 10.0)), None);

        input.handle_mouse_input(MouseButton::Left, ElementState::Pressed);
        assert_eq!(input.handle_cursor_moved(PhysicalPosition::new(15.0, 7.0)), Some((5.0, -3.0)));

        input.handle_mouse_input(MouseButton::Left, ElementState::Released);
        assert_eq!(input.handle_cursor_moved(PhysicalPosition::new(20.0, 7.0)), None);
    }

    #[test]
    fn test_move_translates_target_too() {
        let mut camera = Camera::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -4.0), 45.0);
        CameraController::move_camera(&mut camera, 1.0, 0.0, 0.0);

        let step = RaytracerConfig::CAMERA_MOVE_SPEED;
        assert_abs_diff_eq!(camera.position, Vec3::new(0.0, 0.0, -step), epsilon = 1e-6);
        assert_abs_diff_eq!(camera.target, Vec3::new(0.0, 0.0, -4.0 - step), epsilon = 1e-6);
    }

    #[test]
    fn test_rotate_keeps_position_and_distance() {
        let mut camera = Camera::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(1.0, 2.0, -2.0), 45.0);
        CameraController::rotate_camera(&mut camera, 100.0, 0.0);

        assert_eq!(camera.position, Vec3::new(1.0, 2.0, 3.0));
        assert_abs_diff_eq!((camera.target - camera.position).length(), 5.0, epsilon = 1e-4);
        assert!(camera.forward().x.abs() > 0.1);
    }
}
