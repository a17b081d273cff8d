use crate::geometry::{Beacon, Camera, Fp, Scene, Vec3f};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FovKind {
    Full,
    Beacon,
    Tiles,
    EvenTiles,
}

impl FovKind {
    pub const ALL: [FovKind; 4] = [
        FovKind::Full,
        FovKind::Beacon,
        FovKind::Tiles,
        FovKind::EvenTiles,
    ];

    /// Normalized name, used in corner-scan file names.
    pub fn label(&self) -> &'static str {
        match self {
            FovKind::Full => "full",
            FovKind::Beacon => "beacon",
            FovKind::Tiles => "tiles",
            FovKind::EvenTiles => "even_tiles",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            FovKind::Full => "FOV Full",
            FovKind::Beacon => "FOV Beacon",
            FovKind::Tiles => "FOV Tiles",
            FovKind::EvenTiles => "FOV Even Tiles",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Corner {
    UpperLeft,
    UpperRight,
    LowerRight,
    LowerLeft,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::UpperLeft,
        Corner::UpperRight,
        Corner::LowerRight,
        Corner::LowerLeft,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Corner::UpperLeft => "upper_left",
            Corner::UpperRight => "upper_right",
            Corner::LowerRight => "lower_right",
            Corner::LowerLeft => "lower_left",
        }
    }

    /// Unit offsets of the corner from the rectangle centre, in half extents.
    fn signs(&self) -> (Fp, Fp) {
        match self {
            Corner::UpperLeft => (-1.0, 1.0),
            Corner::UpperRight => (1.0, 1.0),
            Corner::LowerRight => (1.0, -1.0),
            Corner::LowerLeft => (-1.0, -1.0),
        }
    }
}

/// Floor footprint centred under the camera. Tile counts exist only for the
/// tile aligned variants.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FovRectangle {
    pub width: Fp,
    pub height: Fp,
    pub tiles: Option<(i64, i64)>,
}

impl FovRectangle {
    pub fn corner(&self, corner: Corner, z: Fp) -> Vec3f {
        let (sx, sy) = corner.signs();
        Vec3f::new(sx * self.width / 2.0, sy * self.height / 2.0, z)
    }
}

/// The four nested rectangles, always derived together from one set of inputs.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldOfView {
    pub beacon_distance: Fp,
    pub full: FovRectangle,
    pub beacon: FovRectangle,
    pub tiles: FovRectangle,
    pub even_tiles: FovRectangle,
}

impl FieldOfView {
    pub fn compute(camera: &Camera, beacon: &Beacon, scene: &Scene, beacon_distance: Fp) -> Self {
        let (sensor_width, sensor_height) = camera.oriented_sensor();
        Self::from_sensor(
            sensor_width,
            sensor_height,
            camera.focal_length,
            beacon.width(),
            beacon.height(),
            scene.tile_side,
            beacon_distance,
        )
    }

    pub fn from_sensor(
        sensor_width: Fp,
        sensor_height: Fp,
        focal_length: Fp,
        beacon_width: Fp,
        beacon_height: Fp,
        tile_side: Fp,
        beacon_distance: Fp,
    ) -> Self {
        let full_width = sensor_width * beacon_distance / focal_length;
        let full_height = sensor_height * beacon_distance / focal_length;

        // may go negative when the beacon does not fit; tiles then collapse
        let beacon_width = full_width - beacon_width;
        let beacon_height = full_height - beacon_height;

        let tiles_x_raw = (beacon_width / tile_side).floor() as i64;
        let tiles_y_raw = (beacon_height / tile_side).floor() as i64;

        let force_even = |count: i64| if count % 2 != 0 { count - 1 } else { count };
        let (mut tiles_x, mut tiles_y) = (force_even(tiles_x_raw), force_even(tiles_y_raw));
        if tiles_x <= 0 || tiles_y <= 0 {
            tiles_x = 0;
            tiles_y = 0;
        }

        let fov = FieldOfView {
            beacon_distance,
            full: FovRectangle {
                width: full_width,
                height: full_height,
                tiles: None,
            },
            beacon: FovRectangle {
                width: beacon_width,
                height: beacon_height,
                tiles: None,
            },
            tiles: FovRectangle {
                width: tiles_x_raw as Fp * tile_side,
                height: tiles_y_raw as Fp * tile_side,
                tiles: Some((tiles_x_raw, tiles_y_raw)),
            },
            even_tiles: FovRectangle {
                width: tiles_x as Fp * tile_side,
                height: tiles_y as Fp * tile_side,
                tiles: Some((tiles_x, tiles_y)),
            },
        };
        log::debug!(
            "FOV at {beacon_distance} mm: full {full_width}x{full_height}, even tiles {tiles_x}x{tiles_y}"
        );
        fov
    }

    pub fn get(&self, kind: FovKind) -> &FovRectangle {
        match kind {
            FovKind::Full => &self.full,
            FovKind::Beacon => &self.beacon,
            FovKind::Tiles => &self.tiles,
            FovKind::EvenTiles => &self.even_tiles,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (FovKind, &FovRectangle)> {
        FovKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CornerStep {
    pub fov: FovKind,
    pub corner: Corner,
    pub location: Vec3f,
}

/// Four corners of each of the four rectangles, at a fixed camera height.
pub fn corner_steps(fov: &FieldOfView, camera_height: Fp) -> Vec<CornerStep> {
    fov.iter()
        .flat_map(|(kind, rectangle)| {
            Corner::ALL.into_iter().map(move |corner| CornerStep {
                fov: kind,
                corner,
                location: rectangle.corner(corner, camera_height),
            })
        })
        .collect()
}
