use crate::geometry::Fp;

/// Decimal places kept for every floating point value that leaves the process
/// (metadata blocks and settings files).
pub const DECIMAL_PRECISION: i32 = 4;

/// Upper bound for the denominator of the focal length EXIF rational.
pub const FOCAL_LENGTH_MAX_DENOMINATOR: u64 = 1_000_000;

pub const SOFTWARE_SHORT_NAME: &str = "VLIPS";
pub const SETTINGS_FILE_NAME: &str = "settings.yml";
pub const RENDER_FILE_EXTENSION: &str = "jpg";

/// Orientation of the camera before pitch/yaw offsets, degrees. Looks up at the ceiling.
pub const DEFAULT_CAMERA_ROTATION: [Fp; 3] = [180.0, 0.0, 0.0];
/// The beacon panel faces down, towards the floor.
pub const DEFAULT_BEACON_ROTATION: [Fp; 3] = [180.0, 0.0, 0.0];

// scene
pub const DEFAULT_TILE_SIDE: Fp = 50.0;
pub const DEFAULT_FLOOR_SIDE_TILES: u32 = 100;

// room
pub const DEFAULT_ROOM_NAME: &str = "Room";
pub const DEFAULT_ROOM_WIDTH: Fp = 5000.0;
pub const DEFAULT_ROOM_DEPTH: Fp = 5000.0;
pub const DEFAULT_ROOM_HEIGHT: Fp = 3000.0;
pub const DEFAULT_ROOM_THICKNESS: Fp = 10.0;

// beacon
pub const DEFAULT_BEACON_NAME: &str = "Beacon";
pub const DEFAULT_BEACON_WIDTH: Fp = 200.0;
pub const DEFAULT_BEACON_HEIGHT: Fp = 200.0;

// camera
pub const DEFAULT_CAMERA_NAME: &str = "Camera";
pub const DEFAULT_CAMERA_MAKE: &str = "VLIPS";
pub const DEFAULT_CAMERA_MODEL: &str = "Simulated Camera";
pub const DEFAULT_CAMERA_RESOLUTION_WIDTH: u32 = 4032;
pub const DEFAULT_CAMERA_RESOLUTION_HEIGHT: u32 = 3024;
pub const DEFAULT_CAMERA_FOCAL_LENGTH: Fp = 4.25;
pub const DEFAULT_CAMERA_PIXEL_SIZE: Fp = 0.0014;
pub const DEFAULT_CAMERA_BEACON_DISTANCE: Fp = 2000.0;
pub const DEFAULT_SHOW_CAMERA_FOV: bool = true;

// camera movement
pub const DEFAULT_CAMERA_MOVEMENT_FOV_SCAN_ENABLED: bool = true;
pub const DEFAULT_FILE_PREFIX: &str = "render";
pub const DEFAULT_CAMERA_DISTANCE_START: Fp = 1000.0;
pub const DEFAULT_CAMERA_DISTANCE_END: Fp = 2500.0;
pub const DEFAULT_CAMERA_DISTANCE_STEP: Fp = 500.0;
pub const DEFAULT_CAMERA_ROTATION_X_ANGLE_START: Fp = 0.0;
pub const DEFAULT_CAMERA_ROTATION_X_ANGLE_END: Fp = 30.0;
pub const DEFAULT_CAMERA_ROTATION_X_ANGLE_STEP: Fp = 10.0;
pub const DEFAULT_CAMERA_ROTATION_Z_ANGLE_START: Fp = 0.0;
pub const DEFAULT_CAMERA_ROTATION_Z_ANGLE_END: Fp = 90.0;
pub const DEFAULT_CAMERA_ROTATION_Z_ANGLE_STEP: Fp = 15.0;

pub fn software_name() -> String {
    format!("{} ({})", SOFTWARE_SHORT_NAME, env!("CARGO_PKG_VERSION"))
}

/// Upper bound on the values a single sweep axis may expand to.
pub const MAX_AXIS_VALUES: usize = 100_000;
/// Upper bound on the steps of one planned sweep.
pub const MAX_SWEEP_STEPS: usize = 1_000_000;
