use std::fmt;

use na::Vector3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DECIMAL_PRECISION, DEFAULT_BEACON_ROTATION, DEFAULT_CAMERA_FOCAL_LENGTH,
    DEFAULT_CAMERA_MAKE, DEFAULT_CAMERA_MODEL, DEFAULT_CAMERA_NAME, DEFAULT_CAMERA_PIXEL_SIZE,
    DEFAULT_CAMERA_RESOLUTION_HEIGHT, DEFAULT_CAMERA_RESOLUTION_WIDTH, DEFAULT_CAMERA_ROTATION,
    FOCAL_LENGTH_MAX_DENOMINATOR,
};

pub type Fp = f64;
pub type Vec3f = Vector3<Fp>;

pub static EPS: Fp = 1e-9;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("{what} must be positive, got {value}")]
    NonPositive { what: &'static str, value: Fp },
    #[error("focal length {0} mm does not fit in an EXIF rational")]
    FocalLengthOutOfRange(Fp),
}

fn ensure_positive(what: &'static str, value: Fp) -> Result<(), GeometryError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(GeometryError::NonPositive { what, value })
    }
}

/// Round half away from zero to `DECIMAL_PRECISION` places. Negative zero is
/// folded into zero so serialized output does not depend on the sign bit.
pub fn round_to_precision(value: Fp) -> Fp {
    let scale = (10.0 as Fp).powi(DECIMAL_PRECISION);
    let rounded = (value * scale).round() / scale;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

pub fn round_vec(v: &Vec3f) -> [Fp; 3] {
    [
        round_to_precision(v.x),
        round_to_precision(v.y),
        round_to_precision(v.z),
    ]
}

pub fn degrees_to_radians(v: &Vec3f) -> Vec3f {
    v.map(|angle| angle.to_radians())
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

/// Closest fraction to `numerator / denominator` whose denominator does not
/// exceed `max_denominator` (continued fraction expansion, ties go to the
/// last convergent).
pub fn limit_denominator(numerator: u64, denominator: u64, max_denominator: u64) -> (u64, u64) {
    let max_denominator = max_denominator.max(1);
    let divisor = gcd(numerator, denominator).max(1);
    let (numerator, denominator) = (numerator / divisor, denominator / divisor);
    if denominator <= max_denominator {
        return (numerator, denominator);
    }

    let (mut p0, mut q0, mut p1, mut q1) = (0u64, 1u64, 1u64, 0u64);
    let (mut n, mut d) = (numerator, denominator);
    loop {
        let a = n / d;
        let q2 = q0 + a * q1;
        if q2 > max_denominator {
            break;
        }
        (p0, q0, p1, q1) = (p1, q1, p0 + a * p1, q2);
        (n, d) = (d, n - a * d);
    }
    let k = (max_denominator - q0) / q1;
    let bound1 = (p0 + k * p1, q0 + k * q1);
    let bound2 = (p1, q1);

    let distance = |(p, q): (u64, u64)| -> i128 {
        (p as i128 * denominator as i128 - numerator as i128 * q as i128).abs()
    };
    // |p/q - N/D| compared without division: cross multiply by the other q
    if distance(bound2) * bound1.1 as i128 <= distance(bound1) * bound2.1 as i128 {
        bound2
    } else {
        bound1
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Scene {
    pub tile_side: Fp,
    pub floor_side_tiles: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneRecord {
    pub tile_side: Fp,
    #[serde(rename = "floor_sides_tiles")]
    pub floor_side_tiles: u32,
}

impl Scene {
    pub fn new(tile_side: Fp, floor_side_tiles: u32) -> Result<Self, GeometryError> {
        log::debug!("Scene::new(tile_side={tile_side}, floor_side_tiles={floor_side_tiles})");
        ensure_positive("tile side", tile_side)?;
        Ok(Scene {
            tile_side,
            floor_side_tiles,
        })
    }

    pub fn to_record(&self) -> SceneRecord {
        SceneRecord {
            tile_side: round_to_precision(self.tile_side),
            floor_side_tiles: self.floor_side_tiles,
        }
    }
}

impl From<&SceneRecord> for Scene {
    fn from(record: &SceneRecord) -> Self {
        Scene {
            tile_side: record.tile_side,
            floor_side_tiles: record.floor_side_tiles,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Room {
    pub name: String,
    pub width: Fp,
    pub depth: Fp,
    pub height: Fp,
    pub thickness: Fp,
}

impl Room {
    pub fn new(
        name: &str,
        width: Fp,
        depth: Fp,
        height: Fp,
        thickness: Fp,
    ) -> Result<Self, GeometryError> {
        ensure_positive("room width", width)?;
        ensure_positive("room depth", depth)?;
        ensure_positive("room height", height)?;
        ensure_positive("room thickness", thickness)?;
        Ok(Room {
            name: name.to_string(),
            width,
            depth,
            height,
            thickness,
        })
    }
}

/// Light emitting panel hanging from the ceiling. Dimensions are width,
/// height and depth (always 0) in millimetres; rotation in degrees.
#[derive(Clone, Debug, PartialEq)]
pub struct Beacon {
    pub name: String,
    pub dimensions: Vec3f,
    pub location: Vec3f,
    pub rotation: Vec3f,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BeaconRecord {
    pub name: String,
    pub dimensions: [Fp; 3],
    pub location: [Fp; 3],
    pub rotation: [Fp; 3],
}

impl Beacon {
    pub fn new(name: &str, width: Fp, height: Fp, location: Vec3f) -> Result<Self, GeometryError> {
        ensure_positive("beacon width", width)?;
        ensure_positive("beacon height", height)?;
        Ok(Beacon {
            name: name.to_string(),
            dimensions: Vec3f::new(width, height, 0.0),
            location,
            rotation: Vec3f::from(DEFAULT_BEACON_ROTATION),
        })
    }

    pub fn width(&self) -> Fp {
        self.dimensions.x
    }

    pub fn height(&self) -> Fp {
        self.dimensions.y
    }

    pub fn rotation_euler(&self) -> Vec3f {
        degrees_to_radians(&self.rotation)
    }

    pub fn to_record(&self) -> BeaconRecord {
        BeaconRecord {
            name: self.name.clone(),
            dimensions: round_vec(&self.dimensions),
            location: round_vec(&self.location),
            rotation: round_vec(&self.rotation),
        }
    }
}

impl From<&BeaconRecord> for Beacon {
    fn from(record: &BeaconRecord) -> Self {
        Beacon {
            name: record.name.clone(),
            dimensions: Vec3f::from(record.dimensions),
            location: Vec3f::from(record.location),
            rotation: Vec3f::from(record.rotation),
        }
    }
}

/// Which side of a handheld device the simulated camera sits on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Facing {
    Front,
    Back,
    #[default]
    Unknown,
}

impl Facing {
    /// Case-insensitive; anything that is not front or back is unknown.
    pub fn parse(value: &str) -> Facing {
        match value.trim().to_lowercase().as_str() {
            "front" => Facing::Front,
            "back" => Facing::Back,
            _ => Facing::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Facing::Front => "front",
            Facing::Back => "back",
            Facing::Unknown => "unknown",
        }
    }
}

impl From<String> for Facing {
    fn from(value: String) -> Self {
        Facing::parse(&value)
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Orientation {
    Portrait,
    #[default]
    Landscape,
}

impl Orientation {
    pub fn parse(value: &str) -> Orientation {
        if value.trim().eq_ignore_ascii_case("portrait") {
            Orientation::Portrait
        } else {
            Orientation::Landscape
        }
    }
}

impl From<String> for Orientation {
    fn from(value: String) -> Self {
        Orientation::parse(&value)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub name: String,
    pub facing: Facing,
    pub orientation: Orientation,
    pub resolution_width: u32,
    pub resolution_height: u32,
    pub focal_length: Fp,
    pub pixel_size: Fp,
    pub make: String,
    pub model: String,
    pub software: String,
    pub location: Vec3f,
    /// Degrees, absolute (default orientation already applied).
    pub rotation: Vec3f,
    pub grid_location: (i64, i64),
    /// Pitch offset from the default orientation, degrees.
    pub rotation_x_angle: Fp,
    /// Yaw offset from the default orientation, degrees.
    pub rotation_z_angle: Fp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraRecord {
    pub name: String,
    pub facing: Facing,
    pub resolution_width: u32,
    pub resolution_height: u32,
    pub focal_length: Fp,
    pub pixel_size: Fp,
    pub sensor_width: Fp,
    pub sensor_height: Fp,
    pub make: String,
    pub model: String,
    pub software: String,
    pub location: [Fp; 3],
    pub rotation: [Fp; 3],
    pub grid_location: [i64; 2],
    pub rotation_x_angle: Fp,
    pub rotation_z_angle: Fp,
}

impl Default for Camera {
    fn default() -> Self {
        Camera {
            name: DEFAULT_CAMERA_NAME.to_string(),
            facing: Facing::Unknown,
            orientation: Orientation::Landscape,
            resolution_width: DEFAULT_CAMERA_RESOLUTION_WIDTH,
            resolution_height: DEFAULT_CAMERA_RESOLUTION_HEIGHT,
            focal_length: DEFAULT_CAMERA_FOCAL_LENGTH,
            pixel_size: DEFAULT_CAMERA_PIXEL_SIZE,
            make: DEFAULT_CAMERA_MAKE.to_string(),
            model: DEFAULT_CAMERA_MODEL.to_string(),
            software: String::new(),
            location: Vec3f::zeros(),
            rotation: Vec3f::from(DEFAULT_CAMERA_ROTATION),
            grid_location: (0, 0),
            rotation_x_angle: 0.0,
            rotation_z_angle: 0.0,
        }
    }
}

impl Camera {
    pub fn validate(&self) -> Result<(), GeometryError> {
        ensure_positive("resolution width", self.resolution_width as Fp)?;
        ensure_positive("resolution height", self.resolution_height as Fp)?;
        ensure_positive("focal length", self.focal_length)?;
        ensure_positive("pixel size", self.pixel_size)
    }

    pub fn sensor_width(&self) -> Fp {
        self.resolution_width as Fp * self.pixel_size
    }

    pub fn sensor_height(&self) -> Fp {
        self.resolution_height as Fp * self.pixel_size
    }

    /// Sensor extent along the image x and y axes once the orientation is
    /// applied: portrait swaps the long side onto y.
    pub fn oriented_sensor(&self) -> (Fp, Fp) {
        match self.orientation {
            Orientation::Landscape => (self.sensor_width(), self.sensor_height()),
            Orientation::Portrait => (self.sensor_height(), self.sensor_width()),
        }
    }

    /// Render resolution (x, y) for the current orientation.
    pub fn oriented_resolution(&self) -> (u32, u32) {
        match self.orientation {
            Orientation::Landscape => (self.resolution_width, self.resolution_height),
            Orientation::Portrait => (self.resolution_height, self.resolution_width),
        }
    }

    pub fn rotation_euler(&self) -> Vec3f {
        degrees_to_radians(&self.rotation)
    }

    /// Focal length as an exact (numerator, denominator) pair of the value
    /// rounded to `DECIMAL_PRECISION`, ready for an EXIF RATIONAL.
    pub fn focal_length_rational(&self) -> Result<(u32, u32), GeometryError> {
        let rounded = round_to_precision(self.focal_length);
        let scale = 10u64.pow(DECIMAL_PRECISION as u32);
        let scaled = rounded * scale as Fp;
        if !(scaled >= 1.0 && scaled <= u32::MAX as Fp) {
            return Err(GeometryError::FocalLengthOutOfRange(self.focal_length));
        }
        let (numerator, denominator) =
            limit_denominator(scaled.round() as u64, scale, FOCAL_LENGTH_MAX_DENOMINATOR);
        match (u32::try_from(numerator), u32::try_from(denominator)) {
            (Ok(numerator), Ok(denominator)) => Ok((numerator, denominator)),
            _ => Err(GeometryError::FocalLengthOutOfRange(self.focal_length)),
        }
    }

    pub fn to_record(&self) -> CameraRecord {
        CameraRecord {
            name: self.name.clone(),
            facing: self.facing,
            resolution_width: self.resolution_width,
            resolution_height: self.resolution_height,
            focal_length: round_to_precision(self.focal_length),
            pixel_size: round_to_precision(self.pixel_size),
            sensor_width: round_to_precision(self.sensor_width()),
            sensor_height: round_to_precision(self.sensor_height()),
            make: self.make.clone(),
            model: self.model.clone(),
            software: self.software.clone(),
            location: round_vec(&self.location),
            rotation: round_vec(&self.rotation),
            grid_location: [self.grid_location.0, self.grid_location.1],
            rotation_x_angle: round_to_precision(self.rotation_x_angle),
            rotation_z_angle: round_to_precision(self.rotation_z_angle),
        }
    }
}

impl From<&CameraRecord> for Camera {
    // the record carries no orientation; sensor sizes are re-derived
    fn from(record: &CameraRecord) -> Self {
        Camera {
            name: record.name.clone(),
            facing: record.facing,
            orientation: Orientation::Landscape,
            resolution_width: record.resolution_width,
            resolution_height: record.resolution_height,
            focal_length: record.focal_length,
            pixel_size: record.pixel_size,
            make: record.make.clone(),
            model: record.model.clone(),
            software: record.software.clone(),
            location: Vec3f::from(record.location),
            rotation: Vec3f::from(record.rotation),
            grid_location: (record.grid_location[0], record.grid_location[1]),
            rotation_x_angle: record.rotation_x_angle,
            rotation_z_angle: record.rotation_z_angle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_round_to_precision() {
        assert_eq!(round_to_precision(1.23456789), 1.2346);
        assert_eq!(round_to_precision(-0.00001), 0.0);
        assert!(round_to_precision(-0.00001).is_sign_positive());
        let once = round_to_precision(std::f64::consts::PI);
        assert_eq!(round_to_precision(once), once);
    }

    #[test]
    fn test_facing_parse() {
        assert_eq!(Facing::parse("FRONT"), Facing::Front);
        assert_eq!(Facing::parse("Back"), Facing::Back);
        assert_eq!(Facing::parse("side"), Facing::Unknown);
        assert_eq!(Facing::parse(""), Facing::Unknown);
        let facing: Facing = serde_json::from_str("\"BaCk\"").unwrap();
        assert_eq!(facing, Facing::Back);
        assert_eq!(serde_json::to_string(&Facing::Front).unwrap(), "\"front\"");
    }

    #[test]
    fn test_orientation_parse() {
        assert_eq!(Orientation::parse("Portrait"), Orientation::Portrait);
        assert_eq!(Orientation::parse("landscape"), Orientation::Landscape);
        assert_eq!(Orientation::parse("anything"), Orientation::Landscape);
    }

    #[test]
    fn test_sensor_dimensions() {
        let camera = Camera {
            resolution_width: 4000,
            resolution_height: 3000,
            pixel_size: 0.001,
            ..Default::default()
        };
        assert_relative_eq!(camera.sensor_width(), 4.0);
        assert_relative_eq!(camera.sensor_height(), 3.0);
        assert_eq!(camera.oriented_sensor(), (camera.sensor_width(), camera.sensor_height()));

        let portrait = Camera {
            orientation: Orientation::Portrait,
            ..camera
        };
        assert_eq!(portrait.oriented_sensor(), (portrait.sensor_height(), portrait.sensor_width()));
        assert_eq!(portrait.oriented_resolution(), (3000, 4000));
    }

    #[test]
    fn test_rotation_euler_does_not_mutate() {
        let camera = Camera {
            rotation: Vec3f::new(180.0, 90.0, -45.0),
            ..Default::default()
        };
        let euler = camera.rotation_euler();
        assert_relative_eq!(euler.x, std::f64::consts::PI);
        assert_relative_eq!(euler.y, std::f64::consts::FRAC_PI_2);
        assert_relative_eq!(euler.z, -std::f64::consts::FRAC_PI_4);
        assert_eq!(camera.rotation, Vec3f::new(180.0, 90.0, -45.0));
    }

    #[test]
    fn test_focal_length_rational() {
        let camera = Camera {
            focal_length: 4.25,
            ..Default::default()
        };
        assert_eq!(camera.focal_length_rational().unwrap(), (17, 4));

        let camera = Camera {
            focal_length: 26.123456,
            ..Default::default()
        };
        let (numerator, denominator) = camera.focal_length_rational().unwrap();
        assert_eq!((numerator, denominator), (52247, 2000));
        assert_eq!(
            round_to_precision(numerator as Fp / denominator as Fp),
            round_to_precision(camera.focal_length)
        );
    }

    #[test]
    fn test_focal_length_rational_out_of_range() {
        let camera = Camera {
            focal_length: 0.00001,
            ..Default::default()
        };
        assert!(matches!(
            camera.focal_length_rational(),
            Err(GeometryError::FocalLengthOutOfRange(_))
        ));
    }

    #[test]
    fn test_limit_denominator() {
        assert_eq!(limit_denominator(10, 4, 1_000_000), (5, 2));
        // pi to 6 places bounded by 1000 gives the classic 355/113
        assert_eq!(limit_denominator(3_141_593, 1_000_000, 1000), (355, 113));
        assert_eq!(limit_denominator(1, 3, 2), (1, 2));
    }

    #[test]
    fn test_positive_dimensions_required() {
        assert!(Scene::new(0.0, 10).is_err());
        assert!(Room::new("Room", 1.0, 1.0, -1.0, 1.0).is_err());
        assert!(Beacon::new("Beacon", 100.0, 0.0, Vec3f::zeros()).is_err());
        let camera = Camera {
            pixel_size: 0.0,
            ..Default::default()
        };
        assert_eq!(
            camera.validate(),
            Err(GeometryError::NonPositive {
                what: "pixel size",
                value: 0.0
            })
        );
    }

    #[test]
    fn test_camera_record_is_rounded() {
        let camera = Camera {
            location: Vec3f::new(1.000049, -2.5, 3.0),
            rotation_x_angle: 10.123456,
            ..Default::default()
        };
        let record = camera.to_record();
        assert_eq!(record.location, [1.0, -2.5, 3.0]);
        assert_eq!(record.rotation_x_angle, 10.1235);
        assert_eq!(Camera::from(&record).to_record().location, record.location);
    }
}
