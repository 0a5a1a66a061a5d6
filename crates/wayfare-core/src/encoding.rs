//! Photo loading and the face encoding source contract.
//!
//! Detection and encoding run outside this crate. An [`EncodingSource`]
//! hands back one `(box, vector)` pair per detected face for a decoded,
//! orientation-corrected RGB image.

use crate::types::DetectedFace;
use image::{DynamicImage, ImageDecoder, ImageReader, RgbImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("photo not found: {0}")]
    PhotoNotFound(PathBuf),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("image: {0}")]
    Image(#[from] image::ImageError),
    #[error("malformed face encodings in {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("encoder failed: {0}")]
    Encoder(String),
}

/// A decoded photo ready for face encoding.
pub struct LoadedPhoto {
    pub path: PathBuf,
    pub pixels: RgbImage,
}

impl LoadedPhoto {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// Decode a photo, apply its EXIF orientation, and convert it to 8-bit RGB.
pub fn load_photo(path: &Path) -> Result<LoadedPhoto, EncodingError> {
    if !path.exists() {
        return Err(EncodingError::PhotoNotFound(path.to_path_buf()));
    }

    let mut decoder = ImageReader::open(path)?.with_guessed_format()?.into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);

    let pixels = image.into_rgb8();
    tracing::debug!(
        path = %path.display(),
        width = pixels.width(),
        height = pixels.height(),
        "photo decoded"
    );

    Ok(LoadedPhoto {
        path: path.to_path_buf(),
        pixels,
    })
}

/// Source of face boxes and encodings for one photo.
pub trait EncodingSource {
    fn encode(&mut self, photo: &LoadedPhoto) -> Result<Vec<DetectedFace>, EncodingError>;
}

/// Reads encodings an external detector wrote next to each photo as
/// `<photo>.faces.json`. A photo without a sidecar has no faces.
#[derive(Debug, Default, Clone)]
pub struct SidecarEncodingSource;

impl SidecarEncodingSource {
    pub fn sidecar_path(photo: &Path) -> PathBuf {
        let mut name = photo.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".faces.json");
        photo.with_file_name(name)
    }
}

impl EncodingSource for SidecarEncodingSource {
    fn encode(&mut self, photo: &LoadedPhoto) -> Result<Vec<DetectedFace>, EncodingError> {
        let path = Self::sidecar_path(&photo.path);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no face sidecar; treating photo as faceless");
            return Ok(Vec::new());
        }

        let raw = std::fs::read_to_string(&path)?;
        serde_json::from_str(&raw).map_err(|source| EncodingError::Malformed { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            SidecarEncodingSource::sidecar_path(Path::new("/trips/1/beach.jpg")),
            PathBuf::from("/trips/1/beach.jpg.faces.json")
        );
    }

    #[test]
    fn test_load_missing_photo() {
        let err = load_photo(Path::new("/definitely/not/here.jpg")).err().unwrap();
        assert!(matches!(err, EncodingError::PhotoNotFound(_)));
    }

    #[test]
    fn test_load_photo_converts_to_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.png");
        image::GrayImage::from_pixel(64, 48, image::Luma([90])).save(&path).unwrap();

        let photo = load_photo(&path).unwrap();
        assert_eq!((photo.width(), photo.height()), (64, 48));
        assert_eq!(photo.pixels.get_pixel(0, 0).0, [90, 90, 90]);
    }

    #[test]
    fn test_sidecar_encodings_read_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("group.png");
        image::RgbImage::new(200, 200).save(&path).unwrap();
        std::fs::write(
            SidecarEncodingSource::sidecar_path(&path),
            r#"[
                {"top": 10, "right": 120, "bottom": 130, "left": 10, "encoding": [0.1, 0.2]},
                {"top": 150, "right": 40, "bottom": 175, "left": 15, "encoding": [0.3, 0.4]}
            ]"#,
        )
        .unwrap();

        let photo = load_photo(&path).unwrap();
        let faces = SidecarEncodingSource.encode(&photo).unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].bounds.height(), 120);
        assert_eq!(faces[1].encoding.values, vec![0.3, 0.4]);
    }

    #[test]
    fn test_missing_sidecar_means_no_faces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.png");
        image::RgbImage::new(8, 8).save(&path).unwrap();
        let photo = load_photo(&path).unwrap();
        assert!(SidecarEncodingSource.encode(&photo).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.png");
        image::RgbImage::new(8, 8).save(&path).unwrap();
        std::fs::write(SidecarEncodingSource::sidecar_path(&path), "{not json").unwrap();
        let photo = load_photo(&path).unwrap();
        assert!(matches!(
            SidecarEncodingSource.encode(&photo),
            Err(EncodingError::Malformed { .. })
        ));
    }
}
