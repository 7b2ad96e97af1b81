use std::path::{Path, PathBuf};

use glam::Vec3;
use log::info;
use raytracer_shared::SkyMaterial;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::camera::Camera;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings in {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
}

/// Initial camera placement
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub position: [f32; 3],
    pub target: [f32; 3],
    /// Vertical field of view in degrees
    pub fov: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            position: [15.0, 8.0, 15.0],
            target: [0.0, 0.5, 0.0],
            fov: 45.0,
        }
    }
}

impl CameraSettings {
    pub fn to_camera(&self) -> Camera {
        Camera::new(Vec3::from_array(self.position), Vec3::from_array(self.target), self.fov)
    }
}

/// Runtime settings, loaded from a RON file. Missing fields take their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerSettings {
    pub width: u32,
    pub height: u32,
    pub max_bounces: u32,
    pub rays_per_pixel: u32,
    pub blur: f32,
    pub camera: CameraSettings,
    pub sky: SkyMaterial,
    pub denoise: bool,
    pub paused: bool,
}

impl Default for TracerSettings {
    fn default() -> Self {
        Self {
            width: 2048,
            height: 1024,
            max_bounces: 7,
            rays_per_pixel: 10,
            blur: 0.001,
            camera: CameraSettings::default(),
            sky: SkyMaterial::default(),
            denoise: false,
            paused: false,
        }
    }
}

impl TracerSettings {
    pub fn from_ron(source: &str, path: &Path) -> Result<Self, SettingsError> {
        ron::from_str(source).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let source = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_ron(&source, path)?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Settings from `path`, or the defaults when no path is given
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, SettingsError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = TracerSettings::default();
        assert_eq!((settings.width, settings.height), (2048, 1024));
        assert_eq!(settings.max_bounces, 7);
        assert_eq!(settings.rays_per_pixel, 10);
        assert_eq!(settings.camera.position, [15.0, 8.0, 15.0]);
        assert_eq!(settings.sky.sun_direction, [-0.5, -1.0, -0.5]);
        assert!(!settings.denoise);
    }

    #[test]
    fn test_partial_ron_keeps_defaults() {
        let source = "(max_bounces: 3, denoise: true, camera: (fov: 60.0), sky: (sun_intensity: 2.0))";
        let settings = TracerSettings::from_ron(source, Path::new("test.ron")).unwrap();

        assert_eq!(settings.max_bounces, 3);
        assert!(settings.denoise);
        assert_eq!(settings.camera.fov, 60.0);
        assert_eq!(settings.camera.target, [0.0, 0.5, 0.0]);
        assert_eq!(settings.sky.sun_intensity, 2.0);
        assert_eq!(settings.sky.sun_focus, 1.0);
        assert_eq!(settings.width, 2048);
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = TracerSettings::from_ron("(width: \"wide\")", Path::new("bad.ron")).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
        assert!(err.to_string().contains("bad.ron"));
    }

    #[test]
    fn test_missing_file() {
        let err = TracerSettings::load(Path::new("/nonexistent/settings.ron")).unwrap_err();
        assert!(matches!(err, SettingsError::Io { .. }));
        assert!(TracerSettings::load_or_default(None).is_ok());
    }
}
