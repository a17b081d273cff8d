use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::exif::{extract_from_jpeg, insert_into_jpeg, ExifData, ExifError};
use crate::geometry::{
    Beacon, BeaconRecord, Camera, CameraRecord, GeometryError, Scene, SceneRecord,
};

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{0} is not a JPEG image")]
    NotJpeg(PathBuf),
    #[error(transparent)]
    Exif(#[from] ExifError),
    #[error("{0} carries no EXIF block")]
    MissingExif(PathBuf),
    #[error("{0} carries no user comment")]
    MissingUserComment(PathBuf),
    #[error("malformed simulation metadata: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Everything needed to reconstruct the ground truth of one render.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationMetadata {
    pub scene: SceneRecord,
    pub beacon: BeaconRecord,
    pub camera: CameraRecord,
}

impl SimulationMetadata {
    pub fn new(scene: &Scene, beacon: &Beacon, camera: &Camera) -> Self {
        SimulationMetadata {
            scene: scene.to_record(),
            beacon: beacon.to_record(),
            camera: camera.to_record(),
        }
    }

    pub fn encode(&self) -> Result<String, MetadataError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Strict inverse of [`encode`](Self::encode); any missing or mistyped
    /// field fails the whole decode.
    pub fn decode(text: &str) -> Result<Self, MetadataError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Display tags, focal length rational and the encoded block.
    pub fn exif_data(&self) -> Result<ExifData, MetadataError> {
        let camera = &self.camera;
        Ok(ExifData {
            make: Some(camera.make.clone()),
            model: Some(format!("{} ({})", camera.model, camera.facing)),
            software: Some(camera.software.clone()),
            focal_length: Some(Camera::from(camera).focal_length_rational()?),
            user_comment: Some(self.encode()?),
        })
    }
}

fn read_jpeg(path: &Path) -> Result<Vec<u8>, MetadataError> {
    let bytes = fs::read(path).map_err(|source| MetadataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    match image::guess_format(&bytes) {
        Ok(image::ImageFormat::Jpeg) => Ok(bytes),
        _ => Err(MetadataError::NotJpeg(path.to_path_buf())),
    }
}

fn write_exif(path: &Path, jpeg: &[u8], exif: &ExifData) -> Result<(), MetadataError> {
    let updated = insert_into_jpeg(jpeg, exif)?;
    fs::write(path, updated).map_err(|source| MetadataError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_exif(path: &Path, jpeg: &[u8]) -> Result<ExifData, MetadataError> {
    extract_from_jpeg(jpeg)?.ok_or_else(|| MetadataError::MissingExif(path.to_path_buf()))
}

/// Embeds `metadata` into the JPEG at `path`, replacing any previous EXIF block.
pub fn embed_metadata(path: &Path, metadata: &SimulationMetadata) -> Result<(), MetadataError> {
    log::info!("Save EXIF data to {}", path.display());
    let jpeg = read_jpeg(path)?;
    let exif = metadata.exif_data()?;
    log::debug!("exif: {exif:?}");
    write_exif(path, &jpeg, &exif)
}

/// The raw embedded text, without parsing it.
pub fn read_user_comment(path: &Path) -> Result<String, MetadataError> {
    let jpeg = read_jpeg(path)?;
    read_exif(path, &jpeg)?
        .user_comment
        .ok_or_else(|| MetadataError::MissingUserComment(path.to_path_buf()))
}

pub fn read_metadata(path: &Path) -> Result<SimulationMetadata, MetadataError> {
    log::info!("Read EXIF data from {}", path.display());
    SimulationMetadata::decode(&read_user_comment(path)?)
}

/// Textual patch of the embedded block. The other tags are kept; the caller
/// is responsible for the result still being parseable.
pub fn replace_in_user_comment(
    path: &Path,
    old_value: &str,
    new_value: &str,
) -> Result<(), MetadataError> {
    log::info!(
        "Replace {old_value:?} with {new_value:?} in the user comment of {}",
        path.display()
    );
    let jpeg = read_jpeg(path)?;
    let mut exif = read_exif(path, &jpeg)?;
    let comment = exif
        .user_comment
        .take()
        .ok_or_else(|| MetadataError::MissingUserComment(path.to_path_buf()))?;
    exif.user_comment = Some(comment.replace(old_value, new_value));
    write_exif(path, &jpeg, &exif)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Facing, Vec3f};
    use image::{codecs::jpeg::JpegEncoder, ColorType};
    use tempfile::TempDir;

    fn snapshot() -> SimulationMetadata {
        let scene = Scene::new(50.0, 100).unwrap();
        let beacon = Beacon::new("Beacon", 200.0, 150.0, Vec3f::new(0.0, 0.0, 3000.0)).unwrap();
        let camera = Camera {
            facing: Facing::Back,
            focal_length: 4.123456,
            pixel_size: 0.00140001,
            location: Vec3f::new(12.34567, -0.00004, 1000.0),
            rotation: Vec3f::new(170.0, 0.0, -33.333333),
            rotation_x_angle: 10.0,
            rotation_z_angle: 33.333333,
            software: "VLIPS (test)".to_string(),
            ..Default::default()
        };
        SimulationMetadata::new(&scene, &beacon, &camera)
    }

    fn write_jpeg(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        let pixels = vec![128u8; 16 * 8 * 3];
        let mut bytes = Vec::new();
        JpegEncoder::new(&mut bytes)
            .encode(&pixels, 16, 8, ColorType::Rgb8)
            .unwrap();
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_encode_is_idempotent() {
        let metadata = snapshot();
        let encoded = metadata.encode().unwrap();
        let decoded = SimulationMetadata::decode(&encoded).unwrap();
        assert_eq!(decoded, metadata);
        assert_eq!(decoded.encode().unwrap(), encoded);
        assert_eq!(decoded.camera.focal_length, 4.1235);
        assert_eq!(decoded.camera.location, [12.3457, 0.0, 1000.0]);
    }

    #[test]
    fn test_wire_keys() {
        let value: serde_json::Value = serde_json::from_str(&snapshot().encode().unwrap()).unwrap();
        assert_eq!(value["scene"]["floor_sides_tiles"], 100);
        assert_eq!(value["camera"]["facing"], "back");
        assert_eq!(value["beacon"]["dimensions"][1], 150.0);
    }

    #[test]
    fn test_decode_rejects_partial_input() {
        assert!(matches!(
            SimulationMetadata::decode("{\"scene\": {\"tile_side\": 50.0, \"floor_sides_tiles\": 1}}"),
            Err(MetadataError::Json(_))
        ));
        assert!(SimulationMetadata::decode("not json").is_err());
    }

    #[test]
    fn test_embed_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = write_jpeg(&dir, "render.jpg");
        embed_metadata(&path, &snapshot()).unwrap();

        assert_eq!(read_metadata(&path).unwrap(), snapshot());
        let bytes = fs::read(&path).unwrap();
        let exif = extract_from_jpeg(&bytes).unwrap().unwrap();
        assert_eq!(exif.model.as_deref(), Some("Simulated Camera (back)"));
        assert_eq!(exif.focal_length, Some((8247, 2000)));
        // the image itself is still decodable
        assert!(image::load_from_memory(&bytes).is_ok());
    }

    #[test]
    fn test_replace_keeps_other_tags() {
        let dir = TempDir::new().unwrap();
        let path = write_jpeg(&dir, "render.jpg");
        embed_metadata(&path, &snapshot()).unwrap();

        replace_in_user_comment(&path, "Beacon", "Panel").unwrap();
        assert_eq!(read_metadata(&path).unwrap().beacon.name, "Panel");
        let exif = extract_from_jpeg(&fs::read(&path).unwrap()).unwrap().unwrap();
        assert_eq!(exif.make.as_deref(), Some("VLIPS"));
        assert_eq!(exif.software.as_deref(), Some("VLIPS (test)"));
        assert!(exif.focal_length.is_some());
    }

    #[test]
    fn test_missing_metadata() {
        let dir = TempDir::new().unwrap();
        let path = write_jpeg(&dir, "plain.jpg");
        assert!(matches!(read_metadata(&path), Err(MetadataError::MissingExif(_))));

        let text = dir.path().join("notes.jpg");
        fs::write(&text, "hello").unwrap();
        assert!(matches!(read_metadata(&text), Err(MetadataError::NotJpeg(_))));

        let missing = dir.path().join("missing.jpg");
        assert!(matches!(read_metadata(&missing), Err(MetadataError::Io { .. })));
    }
}
