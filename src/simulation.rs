use std::fmt;
use std::path::Path;

use thiserror::Error;

use crate::constants::{software_name, DEFAULT_CAMERA_ROTATION};
use crate::fov::FieldOfView;
use crate::geometry::{Beacon, Camera, Fp, GeometryError, Room, Scene, Vec3f};
use crate::metadata::SimulationMetadata;
use crate::settings::{
    BeaconSettings, CameraSettings, RoomSettings, SceneSettings, Settings, SettingsError,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entity {
    Room,
    Beacon,
    Camera,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::Room => "room",
            Entity::Beacon => "beacon",
            Entity::Camera => "camera",
        })
    }
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("the {0} has not been set up")]
    MissingEntity(Entity),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Text labels shown next to the camera, in display order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LabelKind {
    Height,
    X,
    Y,
    Grid,
    Rotation,
    RotationX,
    RotationZ,
}

/// Everything a sweep changes, so it can be put back afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraState {
    camera: Camera,
    beacon_distance: Fp,
}

/// One simulation session: the configuration plus the entities derived from
/// it. Room, beacon and camera exist only after their setup ran.
#[derive(Debug)]
pub struct Simulation {
    settings: Settings,
    scene: Scene,
    room: Option<Room>,
    beacon: Option<Beacon>,
    camera: Option<Camera>,
    beacon_distance: Fp,
    fov: Option<FieldOfView>,
    labels: Vec<(LabelKind, String)>,
}

impl Simulation {
    pub fn new(settings: Settings) -> Result<Self, SimulationError> {
        let scene = Scene::new(settings.scene.tile_side, settings.scene.floor_side_tiles)?;
        let beacon_distance = settings.camera.beacon_distance;
        Ok(Simulation {
            settings,
            scene,
            room: None,
            beacon: None,
            camera: None,
            beacon_distance,
            fov: None,
            labels: Vec::new(),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn room(&self) -> Result<&Room, SimulationError> {
        self.room
            .as_ref()
            .ok_or(SimulationError::MissingEntity(Entity::Room))
    }

    pub fn beacon(&self) -> Result<&Beacon, SimulationError> {
        self.beacon
            .as_ref()
            .ok_or(SimulationError::MissingEntity(Entity::Beacon))
    }

    pub fn camera(&self) -> Result<&Camera, SimulationError> {
        self.camera
            .as_ref()
            .ok_or(SimulationError::MissingEntity(Entity::Camera))
    }

    pub fn beacon_distance(&self) -> Fp {
        self.beacon_distance
    }

    /// Field of view of the current camera placement.
    pub fn fov(&self) -> Result<&FieldOfView, SimulationError> {
        self.fov
            .as_ref()
            .ok_or(SimulationError::MissingEntity(Entity::Camera))
    }

    pub fn labels(&self) -> &[(LabelKind, String)] {
        &self.labels
    }

    pub fn label(&self, kind: LabelKind) -> Option<&str> {
        self.labels
            .iter()
            .find(|(label, _)| *label == kind)
            .map(|(_, text)| text.as_str())
    }

    /// Field of view the current camera would have at another distance.
    pub fn field_of_view_at(&self, beacon_distance: Fp) -> Result<FieldOfView, SimulationError> {
        Ok(FieldOfView::compute(
            self.camera()?,
            self.beacon()?,
            &self.scene,
            beacon_distance,
        ))
    }

    /// Builds scene, room, beacon and camera from the current settings.
    pub fn create_scene(&mut self) -> Result<(), SimulationError> {
        log::info!("Create scene");
        let settings = self.settings.clone();
        self.setup_scene(settings.scene)?;
        self.setup_room(settings.room)?;
        self.place_beacon(settings.beacon)?;
        self.setup_camera(settings.camera)
    }

    pub fn empty_scene(&mut self) {
        log::info!("Empty scene");
        self.room = None;
        self.beacon = None;
        self.camera = None;
        self.fov = None;
        self.labels.clear();
    }

    pub fn setup_scene(&mut self, scene: SceneSettings) -> Result<(), SimulationError> {
        log::info!("Set the scene up");
        self.scene = Scene::new(scene.tile_side, scene.floor_side_tiles)?;
        self.settings.scene = scene;
        self.refresh_camera()
    }

    /// Replaces the room; an existing beacon follows the new ceiling height.
    pub fn setup_room(&mut self, room: RoomSettings) -> Result<(), SimulationError> {
        log::info!("Set the room up");
        self.room = Some(Room::new(
            &room.name,
            room.width,
            room.depth,
            room.height,
            room.thickness,
        )?);
        self.settings.room = room;
        if self.beacon.is_some() {
            self.place_beacon(self.settings.beacon.clone())
        } else {
            self.refresh_camera()
        }
    }

    /// Replaces the beacon and switches off the distance and rotation sweeps,
    /// whose ranges were chosen for the previous beacon.
    pub fn setup_beacon(&mut self, beacon: BeaconSettings) -> Result<(), SimulationError> {
        self.place_beacon(beacon)?;
        let movement = &mut self.settings.camera_movement;
        movement.beacon_distance_enabled = false;
        movement.rotation_x_angle_enabled = false;
        movement.rotation_z_angle_enabled = false;
        Ok(())
    }

    fn place_beacon(&mut self, beacon: BeaconSettings) -> Result<(), SimulationError> {
        log::info!("Set the beacon up");
        let height = self.room()?.height;
        let placed = Beacon::new(
            &beacon.name,
            beacon.width,
            beacon.height,
            Vec3f::new(0.0, 0.0, height),
        )?;
        log::debug!("beacon: {placed:?}");
        self.beacon = Some(placed);
        self.settings.beacon = beacon;
        self.refresh_camera()
    }

    pub fn setup_camera(&mut self, camera: CameraSettings) -> Result<(), SimulationError> {
        log::info!("Set the camera up");
        self.room()?;
        self.beacon()?;
        let mut placed = Camera {
            name: camera.name.clone(),
            facing: camera.facing,
            orientation: camera.orientation,
            resolution_width: camera.resolution_width,
            resolution_height: camera.resolution_height,
            focal_length: camera.focal_length,
            pixel_size: camera.pixel_size,
            make: camera.make.clone(),
            model: camera.model.clone(),
            software: software_name(),
            ..Default::default()
        };
        placed.validate()?;
        self.camera = Some(placed);

        let tile_side = self.scene.tile_side;
        let x = tile_side * camera.grid_x as Fp;
        let y = tile_side * camera.grid_y as Fp;
        let (distance, rotation_x, rotation_z) = (
            camera.beacon_distance,
            camera.rotation_x_angle,
            camera.rotation_z_angle,
        );
        self.settings.camera = camera;
        self.place_camera(x, y, distance, rotation_x, rotation_z)
    }

    fn refresh_camera(&mut self) -> Result<(), SimulationError> {
        if self.camera.is_some() {
            self.setup_camera(self.settings.camera.clone())
        } else {
            Ok(())
        }
    }

    /// Moves the camera without touching the stored configuration. The field
    /// of view and labels are recomputed together.
    pub fn place_camera(
        &mut self,
        x: Fp,
        y: Fp,
        beacon_distance: Fp,
        rotation_x_angle: Fp,
        rotation_z_angle: Fp,
    ) -> Result<(), SimulationError> {
        let room_height = self.room()?.height;
        let tile_side = self.scene.tile_side;
        let camera = self
            .camera
            .as_mut()
            .ok_or(SimulationError::MissingEntity(Entity::Camera))?;

        camera.location = Vec3f::new(x, y, room_height - beacon_distance);
        camera.rotation =
            Vec3f::from(DEFAULT_CAMERA_ROTATION) - Vec3f::new(rotation_x_angle, 0.0, rotation_z_angle);
        camera.grid_location = (
            (x / tile_side).round() as i64,
            (y / tile_side).round() as i64,
        );
        camera.rotation_x_angle = rotation_x_angle;
        camera.rotation_z_angle = rotation_z_angle;
        log::debug!(
            "camera at {:?}, rotation {:?}",
            camera.location.as_slice(),
            camera.rotation.as_slice()
        );

        self.beacon_distance = beacon_distance;
        self.fov = Some(self.field_of_view_at(beacon_distance)?);
        self.labels = self.compute_labels(room_height)?;
        Ok(())
    }

    fn compute_labels(&self, room_height: Fp) -> Result<Vec<(LabelKind, String)>, SimulationError> {
        let camera = self.camera()?;
        let tile_side = self.scene.tile_side;
        let (x, y) = (camera.location.x, camera.location.y);
        Ok(vec![
            (
                LabelKind::Height,
                format!("Height: {:.2} m", (room_height - self.beacon_distance) / 1000.0),
            ),
            (LabelKind::X, format!("X: {:.3} m", x / 1000.0)),
            (LabelKind::Y, format!("Y: {:.3} m", y / 1000.0)),
            (
                LabelKind::Grid,
                format!(
                    "Grid: {}, {}",
                    (x / tile_side).trunc() as i64,
                    (y / tile_side).trunc() as i64
                ),
            ),
            (LabelKind::Rotation, "Rotation: ".to_string()),
            (
                LabelKind::RotationX,
                format!("- X: {:.2}º", camera.rotation_x_angle),
            ),
            (
                LabelKind::RotationZ,
                format!("- Z: {:.2}º", camera.rotation_z_angle),
            ),
        ])
    }

    pub fn camera_state(&self) -> Result<CameraState, SimulationError> {
        Ok(CameraState {
            camera: self.camera()?.clone(),
            beacon_distance: self.beacon_distance,
        })
    }

    pub fn restore_camera_state(&mut self, state: CameraState) -> Result<(), SimulationError> {
        log::debug!("restore camera state");
        self.camera = Some(state.camera);
        self.beacon_distance = state.beacon_distance;
        self.fov = Some(self.field_of_view_at(state.beacon_distance)?);
        let room_height = self.room()?.height;
        self.labels = self.compute_labels(room_height)?;
        Ok(())
    }

    /// Snapshot of the current placement as stored in a render. Lengths are
    /// taken to whole millimetres and the grid location is derived from them.
    pub fn render_metadata(&self, software: &str) -> Result<SimulationMetadata, SimulationError> {
        let beacon = self.beacon()?;
        let camera = self.camera()?;
        let tile_side = self.scene.tile_side;

        let scene = Scene {
            tile_side: tile_side.round(),
            floor_side_tiles: self.scene.floor_side_tiles,
        };
        let beacon = Beacon {
            dimensions: beacon.dimensions.map(Fp::round),
            location: beacon.location.map(Fp::round),
            ..beacon.clone()
        };
        let camera = Camera {
            software: software.to_string(),
            location: camera.location.map(Fp::round),
            grid_location: (
                (camera.location.x / tile_side).round() as i64,
                (camera.location.y / tile_side).round() as i64,
            ),
            ..camera.clone()
        };
        Ok(SimulationMetadata::new(&scene, &beacon, &camera))
    }

    /// Replaces the configuration with the file contents and rebuilds the scene.
    pub fn load_settings(&mut self, path: &Path) -> Result<(), SimulationError> {
        self.settings = Settings::load(path)?;
        self.empty_scene();
        self.create_scene()
    }

    pub fn save_settings(&self, path: &Path) -> Result<(), SimulationError> {
        Ok(self.settings.save(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    fn simulation() -> Simulation {
        let mut simulation = Simulation::new(Settings::default()).unwrap();
        simulation.create_scene().unwrap();
        simulation
    }

    #[test]
    fn test_missing_entities() {
        let mut simulation = Simulation::new(Settings::default()).unwrap();
        assert!(matches!(
            simulation.setup_beacon(Settings::default().beacon),
            Err(SimulationError::MissingEntity(Entity::Room))
        ));
        assert!(matches!(
            simulation.place_camera(0.0, 0.0, 1000.0, 0.0, 0.0),
            Err(SimulationError::MissingEntity(Entity::Room))
        ));
        simulation.setup_room(Settings::default().room).unwrap();
        assert!(matches!(
            simulation.setup_camera(Settings::default().camera),
            Err(SimulationError::MissingEntity(Entity::Beacon))
        ));
        assert!(matches!(
            simulation.render_metadata("test"),
            Err(SimulationError::MissingEntity(Entity::Beacon))
        ));
    }

    #[test]
    fn test_create_scene_places_entities() {
        let simulation = simulation();
        let room = simulation.room().unwrap();
        let beacon = simulation.beacon().unwrap();
        let camera = simulation.camera().unwrap();
        assert_eq!(beacon.location, Vec3f::new(0.0, 0.0, room.height));
        assert_relative_eq!(camera.location.z, room.height - simulation.beacon_distance());
        assert_eq!(camera.rotation, Vec3f::from(DEFAULT_CAMERA_ROTATION));
        assert_eq!(camera.software, software_name());
        assert_eq!(simulation.labels().len(), 7);
    }

    #[test]
    fn test_setup_camera_from_grid() {
        let mut simulation = simulation();
        let mut camera = simulation.settings().camera.clone();
        camera.grid_x = 2;
        camera.grid_y = -1;
        camera.beacon_distance = 1500.0;
        camera.rotation_x_angle = 10.0;
        camera.rotation_z_angle = 45.0;
        simulation.setup_camera(camera).unwrap();

        let placed = simulation.camera().unwrap();
        assert_eq!(placed.location, Vec3f::new(100.0, -50.0, 1500.0));
        assert_eq!(placed.rotation, Vec3f::new(170.0, 0.0, -45.0));
        assert_eq!(placed.grid_location, (2, -1));
        assert_eq!(simulation.label(LabelKind::Height), Some("Height: 1.50 m"));
        assert_eq!(simulation.label(LabelKind::X), Some("X: 0.100 m"));
        assert_eq!(simulation.label(LabelKind::Grid), Some("Grid: 2, -1"));
        assert_eq!(simulation.label(LabelKind::RotationZ), Some("- Z: 45.00º"));
        assert_eq!(simulation.settings().camera.grid_x, 2);
    }

    #[test]
    fn test_fov_follows_camera() {
        let mut simulation = simulation();
        let before = simulation.fov().unwrap().clone();
        simulation.place_camera(0.0, 0.0, 2.0 * simulation.beacon_distance(), 0.0, 0.0).unwrap();
        let after = simulation.fov().unwrap();
        assert_relative_eq!(after.full.width, 2.0 * before.full.width);
        // placement does not touch the stored configuration
        assert_eq!(simulation.settings().camera, Settings::default().camera);
    }

    #[test]
    fn test_room_change_moves_beacon_and_camera() {
        let mut simulation = simulation();
        let mut room = simulation.settings().room.clone();
        room.height = 4000.0;
        simulation.setup_room(room).unwrap();
        assert_eq!(simulation.beacon().unwrap().location.z, 4000.0);
        assert_relative_eq!(
            simulation.camera().unwrap().location.z,
            4000.0 - simulation.settings().camera.beacon_distance
        );
    }

    #[test]
    fn test_setup_beacon_disables_sweeps() {
        let mut simulation = simulation();
        let movement = &mut simulation.settings_mut().camera_movement;
        movement.beacon_distance_enabled = true;
        movement.rotation_x_angle_enabled = true;
        movement.fov_scan_enabled = true;

        let mut beacon = simulation.settings().beacon.clone();
        beacon.width = 300.0;
        simulation.setup_beacon(beacon).unwrap();

        let movement = &simulation.settings().camera_movement;
        assert!(!movement.beacon_distance_enabled);
        assert!(!movement.rotation_x_angle_enabled);
        assert!(movement.fov_scan_enabled);
        assert_eq!(simulation.beacon().unwrap().width(), 300.0);
    }

    #[test]
    fn test_camera_state_round_trip() {
        let mut simulation = simulation();
        let state = simulation.camera_state().unwrap();
        let labels = simulation.labels().to_vec();
        simulation.place_camera(500.0, 250.0, 1000.0, 20.0, 30.0).unwrap();
        assert_ne!(simulation.labels(), labels.as_slice());

        simulation.restore_camera_state(state.clone()).unwrap();
        assert_eq!(simulation.camera_state().unwrap(), state);
        assert_eq!(simulation.labels(), labels.as_slice());
    }

    #[test]
    fn test_render_metadata_rounds_to_millimetres() {
        let mut simulation = simulation();
        simulation.place_camera(74.6, -25.2, 1999.7, 0.0, 0.0).unwrap();
        let metadata = simulation.render_metadata("VLIPS (test)").unwrap();
        assert_eq!(metadata.camera.location, [75.0, -25.0, 1000.0]);
        assert_eq!(metadata.camera.grid_location, [1, -1]);
        assert_eq!(metadata.camera.software, "VLIPS (test)");
        assert_eq!(metadata.scene.tile_side, 50.0);
    }

    #[test]
    fn test_load_settings_rebuilds_scene() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.yml");
        let mut settings = Settings::default();
        settings.room.height = 2500.0;
        settings.camera.beacon_distance = 1000.0;
        settings.camera_movement.rotation_z_angle_enabled = true;
        settings.save(&path).unwrap();

        let mut simulation = simulation();
        simulation.load_settings(&path).unwrap();
        assert_eq!(simulation.room().unwrap().height, 2500.0);
        assert_relative_eq!(simulation.camera().unwrap().location.z, 1500.0);
        assert!(simulation.settings().camera_movement.rotation_z_angle_enabled);
    }

    #[test]
    fn test_empty_scene() {
        let mut simulation = simulation();
        simulation.empty_scene();
        assert!(simulation.camera().is_err());
        assert!(simulation.fov().is_err());
        assert!(simulation.labels().is_empty());
    }
}
