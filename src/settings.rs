use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::*;
use crate::geometry::{round_to_precision, Facing, Fp, Orientation};
use crate::movement::{AxisRange, EnabledAxes, MovementRequest};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed settings file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneSettings {
    pub tile_side: Fp,
    pub floor_side_tiles: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoomSettings {
    pub name: String,
    pub width: Fp,
    pub depth: Fp,
    pub height: Fp,
    pub thickness: Fp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BeaconSettings {
    pub name: String,
    pub width: Fp,
    pub height: Fp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    pub name: String,
    pub make: String,
    pub model: String,
    pub orientation: Orientation,
    pub facing: Facing,
    pub resolution_width: u32,
    pub resolution_height: u32,
    pub focal_length: Fp,
    pub pixel_size: Fp,
    pub grid_x: i64,
    pub grid_y: i64,
    pub beacon_distance: Fp,
    pub rotation_x_angle: Fp,
    pub rotation_z_angle: Fp,
    pub show_fov: bool,
}

/// Flag and range keys keep the names used by existing settings files:
/// `horizontal_rotation` is the rotation X range but the
/// `horizontal_rotation_enabled` flag switches the rotation Z sweep.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraMovementSettings {
    pub fov_scan_enabled: bool,
    pub beacon_distance_enabled: bool,
    #[serde(rename = "horizontal_rotation_enabled")]
    pub rotation_z_angle_enabled: bool,
    #[serde(rename = "vertical_rotation_enabled")]
    pub rotation_x_angle_enabled: bool,
    pub output_path: String,
    pub file_prefix: String,
    pub distance: AxisRange,
    #[serde(rename = "horizontal_rotation")]
    pub rotation_x_angle: AxisRange,
    #[serde(rename = "vertical_rotation")]
    pub rotation_z_angle: AxisRange,
}

impl CameraMovementSettings {
    pub fn enabled_axes(&self) -> EnabledAxes {
        EnabledAxes {
            fov_scan: self.fov_scan_enabled,
            beacon_distance: self.beacon_distance_enabled,
            rotation_x_angle: self.rotation_x_angle_enabled,
            rotation_z_angle: self.rotation_z_angle_enabled,
        }
    }

    pub fn request(&self) -> MovementRequest {
        MovementRequest {
            axes: self.enabled_axes(),
            beacon_distance: self.distance,
            rotation_x_angle: self.rotation_x_angle,
            rotation_z_angle: self.rotation_z_angle,
        }
    }
}

/// Configuration of a whole simulation. Field order is the key order of the
/// YAML file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub version: String,
    pub date: String,
    pub scene: SceneSettings,
    pub room: RoomSettings,
    pub beacon: BeaconSettings,
    pub camera: CameraSettings,
    pub camera_movement: CameraMovementSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            version: env!("CARGO_PKG_VERSION").to_string(),
            date: timestamp(),
            scene: SceneSettings {
                tile_side: DEFAULT_TILE_SIDE,
                floor_side_tiles: DEFAULT_FLOOR_SIDE_TILES,
            },
            room: RoomSettings {
                name: DEFAULT_ROOM_NAME.to_string(),
                width: DEFAULT_ROOM_WIDTH,
                depth: DEFAULT_ROOM_DEPTH,
                height: DEFAULT_ROOM_HEIGHT,
                thickness: DEFAULT_ROOM_THICKNESS,
            },
            beacon: BeaconSettings {
                name: DEFAULT_BEACON_NAME.to_string(),
                width: DEFAULT_BEACON_WIDTH,
                height: DEFAULT_BEACON_HEIGHT,
            },
            camera: CameraSettings {
                name: DEFAULT_CAMERA_NAME.to_string(),
                make: DEFAULT_CAMERA_MAKE.to_string(),
                model: DEFAULT_CAMERA_MODEL.to_string(),
                orientation: Orientation::Landscape,
                facing: Facing::Back,
                resolution_width: DEFAULT_CAMERA_RESOLUTION_WIDTH,
                resolution_height: DEFAULT_CAMERA_RESOLUTION_HEIGHT,
                focal_length: DEFAULT_CAMERA_FOCAL_LENGTH,
                pixel_size: DEFAULT_CAMERA_PIXEL_SIZE,
                grid_x: 0,
                grid_y: 0,
                beacon_distance: DEFAULT_CAMERA_BEACON_DISTANCE,
                rotation_x_angle: 0.0,
                rotation_z_angle: 0.0,
                show_fov: DEFAULT_SHOW_CAMERA_FOV,
            },
            camera_movement: CameraMovementSettings {
                fov_scan_enabled: DEFAULT_CAMERA_MOVEMENT_FOV_SCAN_ENABLED,
                beacon_distance_enabled: false,
                rotation_z_angle_enabled: false,
                rotation_x_angle_enabled: false,
                output_path: String::new(),
                file_prefix: DEFAULT_FILE_PREFIX.to_string(),
                distance: AxisRange::new(
                    DEFAULT_CAMERA_DISTANCE_START,
                    DEFAULT_CAMERA_DISTANCE_END,
                    DEFAULT_CAMERA_DISTANCE_STEP,
                ),
                rotation_x_angle: AxisRange::new(
                    DEFAULT_CAMERA_ROTATION_X_ANGLE_START,
                    DEFAULT_CAMERA_ROTATION_X_ANGLE_END,
                    DEFAULT_CAMERA_ROTATION_X_ANGLE_STEP,
                ),
                rotation_z_angle: AxisRange::new(
                    DEFAULT_CAMERA_ROTATION_Z_ANGLE_START,
                    DEFAULT_CAMERA_ROTATION_Z_ANGLE_END,
                    DEFAULT_CAMERA_ROTATION_Z_ANGLE_STEP,
                ),
            },
        }
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn round_range(range: &AxisRange) -> AxisRange {
    AxisRange::new(
        round_to_precision(range.start),
        round_to_precision(range.end),
        round_to_precision(range.step),
    )
}

impl Settings {
    pub fn load(path: &Path) -> Result<Settings, SettingsError> {
        log::info!("Load settings from {}", path.display());
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = serde_yaml::from_str(&text)?;
        log::debug!("{settings:?}");
        Ok(settings)
    }

    /// Writes a copy stamped with the current version and date, floating point
    /// values rounded. Missing parent directories are created.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        log::info!("Save settings to {}", path.display());
        let io_error = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let text = serde_yaml::to_string(&self.rounded())?;
        fs::write(path, text).map_err(io_error)
    }

    pub fn rounded(&self) -> Settings {
        let mut settings = self.clone();
        settings.version = env!("CARGO_PKG_VERSION").to_string();
        settings.date = timestamp();

        let scene = &mut settings.scene;
        scene.tile_side = round_to_precision(scene.tile_side);

        let room = &mut settings.room;
        for value in [
            &mut room.width,
            &mut room.depth,
            &mut room.height,
            &mut room.thickness,
        ] {
            *value = round_to_precision(*value);
        }

        let beacon = &mut settings.beacon;
        beacon.width = round_to_precision(beacon.width);
        beacon.height = round_to_precision(beacon.height);

        let camera = &mut settings.camera;
        for value in [
            &mut camera.focal_length,
            &mut camera.pixel_size,
            &mut camera.beacon_distance,
            &mut camera.rotation_x_angle,
            &mut camera.rotation_z_angle,
        ] {
            *value = round_to_precision(*value);
        }

        let movement = &mut settings.camera_movement;
        movement.distance = round_range(&movement.distance);
        movement.rotation_x_angle = round_range(&movement.rotation_x_angle);
        movement.rotation_z_angle = round_range(&movement.rotation_z_angle);
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE_NAME);

        let mut settings = Settings::default();
        settings.camera.focal_length = 4.123456;
        settings.camera.orientation = Orientation::Portrait;
        settings.camera_movement.output_path = "/tmp/renders".to_string();
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.camera.focal_length, 4.1235);
        assert_eq!(loaded.camera.orientation, Orientation::Portrait);
        assert_eq!(loaded.camera_movement, settings.camera_movement);
        assert_eq!(loaded.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_key_order_and_names() {
        let text = serde_yaml::to_string(&Settings::default()).unwrap();
        let keys: Vec<&str> = text
            .lines()
            .filter(|line| !line.starts_with(' '))
            .filter_map(|line| line.split(':').next())
            .collect();
        assert_eq!(
            keys,
            ["version", "date", "scene", "room", "beacon", "camera", "camera_movement"]
        );
        assert!(text.contains("floor_side_tiles:"));
        assert!(text.contains("horizontal_rotation:"));
        assert!(text.contains("vertical_rotation_enabled:"));
    }

    #[test]
    fn test_rotation_key_mapping() {
        let yaml = r#"
version: 2.1.0
date: 2024-01-01 10:00:00
scene: {tile_side: 50, floor_side_tiles: 100}
room: {name: Room, width: 5000, depth: 5000, height: 3000, thickness: 10}
beacon: {name: Beacon, width: 200, height: 200}
camera:
  name: Camera
  make: Apple
  model: iPhone
  orientation: PORTRAIT
  facing: Front
  resolution_width: 4032
  resolution_height: 3024
  focal_length: 4.25
  pixel_size: 0.0014
  grid_x: 1
  grid_y: -2
  beacon_distance: 2000
  rotation_x_angle: 0
  rotation_z_angle: 0
  show_fov: true
camera_movement:
  fov_scan_enabled: false
  beacon_distance_enabled: false
  horizontal_rotation_enabled: true
  vertical_rotation_enabled: false
  output_path: out
  file_prefix: render
  distance: {start: 1000, end: 2000, step: 500}
  horizontal_rotation: {start: 0, end: 30, step: 10}
  vertical_rotation: {start: 0, end: 90, step: 45}
"#;
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        let request = settings.camera_movement.request();
        assert!(request.axes.rotation_z_angle);
        assert!(!request.axes.rotation_x_angle);
        assert_eq!(request.rotation_x_angle.end, 30.0);
        assert_eq!(request.rotation_z_angle.step, 45.0);
        assert_eq!(settings.camera.facing, Facing::Front);
        assert_eq!(settings.camera.orientation, Orientation::Portrait);
        assert_eq!((settings.camera.grid_x, settings.camera.grid_y), (1, -2));
    }

    #[test]
    fn test_load_errors() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.yml");
        assert!(matches!(Settings::load(&missing), Err(SettingsError::Io { .. })));

        let broken = dir.path().join("broken.yml");
        fs::write(&broken, "scene: [").unwrap();
        assert!(matches!(Settings::load(&broken), Err(SettingsError::Yaml(_))));
    }
}
