//! Face thumbnails: padded crop around a detected face, shrunk to fit a square cap.

use crate::types::FaceBox;
use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_THUMBNAIL_PADDING: u32 = 50;
pub const DEFAULT_THUMBNAIL_MAX_SIZE: u32 = 200;

#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("face box {0:?} lies outside the {1}x{2} image")]
    OutOfBounds(FaceBox, u32, u32),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("image: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailSpec {
    /// Margin added on every side of the face box before cropping.
    pub padding: u32,
    /// Thumbnails are shrunk to fit within `max_size` x `max_size`.
    pub max_size: u32,
}

impl Default for ThumbnailSpec {
    fn default() -> Self {
        Self {
            padding: DEFAULT_THUMBNAIL_PADDING,
            max_size: DEFAULT_THUMBNAIL_MAX_SIZE,
        }
    }
}

/// Padded crop rectangle `(x, y, width, height)` clamped to the image.
pub fn crop_region(
    face: &FaceBox,
    image_width: u32,
    image_height: u32,
    padding: u32,
) -> (u32, u32, u32, u32) {
    let left = face.left.saturating_sub(padding);
    let top = face.top.saturating_sub(padding);
    let right = face.right.saturating_add(padding).min(image_width);
    let bottom = face.bottom.saturating_add(padding).min(image_height);
    (
        left,
        top,
        right.saturating_sub(left),
        bottom.saturating_sub(top),
    )
}

/// Crop the face out of `image` and shrink it to fit `spec.max_size`.
///
/// Crops smaller than the cap keep their size; aspect ratio is preserved.
pub fn face_thumbnail(
    image: &RgbImage,
    face: &FaceBox,
    spec: &ThumbnailSpec,
) -> Result<RgbImage, ThumbnailError> {
    let (x, y, w, h) = crop_region(face, image.width(), image.height(), spec.padding);
    if w == 0 || h == 0 {
        return Err(ThumbnailError::OutOfBounds(*face, image.width(), image.height()));
    }

    let crop = imageops::crop_imm(image, x, y, w, h).to_image();
    if w <= spec.max_size && h <= spec.max_size {
        return Ok(crop);
    }

    let scale = spec.max_size as f64 / w.max(h) as f64;
    let new_w = ((w as f64 * scale).round() as u32).max(1);
    let new_h = ((h as f64 * scale).round() as u32).max(1);
    Ok(imageops::resize(&crop, new_w, new_h, FilterType::Lanczos3))
}

/// Render and write a face thumbnail as JPEG into `dir`, returning its path.
pub fn save_face_thumbnail(
    image: &RgbImage,
    face: &FaceBox,
    spec: &ThumbnailSpec,
    dir: &Path,
    file_stem: &str,
) -> Result<PathBuf, ThumbnailError> {
    let thumbnail = face_thumbnail(image, face, spec)?;
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{file_stem}.jpg"));
    thumbnail.save_with_format(&path, ImageFormat::Jpeg)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(top: u32, right: u32, bottom: u32, left: u32) -> FaceBox {
        FaceBox { top, right, bottom, left }
    }

    #[test]
    fn test_crop_region_clamps_to_bounds() {
        // Face near the top-left corner of a 300x200 image.
        let region = crop_region(&face(10, 80, 90, 20), 300, 200, 50);
        assert_eq!(region, (0, 0, 130, 140));

        // Face near the bottom-right corner.
        let region = crop_region(&face(150, 290, 190, 250), 300, 200, 50);
        assert_eq!(region, (200, 100, 100, 100));
    }

    #[test]
    fn test_small_crop_is_not_enlarged() {
        let image = RgbImage::new(400, 400);
        let spec = ThumbnailSpec::default();
        let thumb = face_thumbnail(&image, &face(150, 200, 210, 150), &spec).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (150, 160));
    }

    #[test]
    fn test_large_crop_fits_cap() {
        let image = RgbImage::new(1200, 1000);
        // 600 x 300 face + 100 padding → 700 x 400 crop.
        let spec = ThumbnailSpec::default();
        let thumb = face_thumbnail(&image, &face(300, 900, 600, 300), &spec).unwrap();
        assert_eq!(thumb.width(), 200);
        assert!(thumb.height() <= 200);
        assert_eq!(thumb.height(), 114);
    }

    #[test]
    fn test_face_outside_image_is_rejected() {
        let image = RgbImage::new(100, 100);
        let spec = ThumbnailSpec { padding: 0, max_size: 200 };
        let err = face_thumbnail(&image, &face(120, 180, 160, 140), &spec).unwrap_err();
        assert!(matches!(err, ThumbnailError::OutOfBounds(..)));
    }

    #[test]
    fn test_save_writes_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let image = RgbImage::from_pixel(320, 240, image::Rgb([200, 120, 40]));
        let spec = ThumbnailSpec::default();
        let path =
            save_face_thumbnail(&image, &face(60, 200, 180, 100), &spec, dir.path(), "face_1")
                .unwrap();
        assert_eq!(path, dir.path().join("face_1.jpg"));
        let reloaded = image::open(&path).unwrap();
        // 200 x 220 crop scaled by 200/220.
        assert_eq!((reloaded.width(), reloaded.height()), (182, 200));
    }
}
