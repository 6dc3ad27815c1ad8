//! Photo capture support: cover-fit math shared with the background pass,
//! and PNG output for captured frames.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use image::RgbaImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture readback failed: {0}")]
    Readback(String),
    #[error("capture format not supported: {0}")]
    Format(String),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A centered crop of the source image, in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Computes the largest centered crop of a `src_w` by `src_h` image that
/// matches the destination aspect ratio. This is how the camera frame fills
/// the window: scale to cover, crop the overflow.
pub fn cover_fit(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> CropRect {
    if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
        return CropRect {
            x: 0,
            y: 0,
            width: src_w.max(1),
            height: src_h.max(1),
        };
    }

    // Compare aspects without going through floats
    let src_wider = u64::from(src_w) * u64::from(dst_h) > u64::from(dst_w) * u64::from(src_h);

    if src_wider {
        let width = (f64::from(src_h) * f64::from(dst_w) / f64::from(dst_h)).round() as u32;
        let width = width.clamp(1, src_w);
        CropRect {
            x: (src_w - width) / 2,
            y: 0,
            width,
            height: src_h,
        }
    } else {
        let height = (f64::from(src_w) * f64::from(dst_h) / f64::from(dst_w)).round() as u32;
        let height = height.clamp(1, src_h);
        CropRect {
            x: 0,
            y: (src_h - height) / 2,
            width: src_w,
            height,
        }
    }
}

/// The same crop expressed as a UV transform, `uv' = offset + uv * scale`.
/// The background pass samples the camera texture with this.
pub fn cover_uv_transform(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> ([f32; 2], [f32; 2]) {
    let crop = cover_fit(src_w, src_h, dst_w, dst_h);
    let full_w = src_w.max(1) as f32;
    let full_h = src_h.max(1) as f32;

    (
        [crop.width as f32 / full_w, crop.height as f32 / full_h],
        [crop.x as f32 / full_w, crop.y as f32 / full_h],
    )
}

fn timestamped_path(dir: &Path) -> PathBuf {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    dir.join(format!("ar-capture-{seconds}.png"))
}

/// Writes the captured frame as a timestamped PNG under `dir`, creating the
/// directory if needed. Returns the path written.
pub fn save_png(image: &RgbaImage, dir: &Path) -> Result<PathBuf, CaptureError> {
    std::fs::create_dir_all(dir)?;
    let path = timestamped_path(dir);
    image.save(&path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_source_crops_the_sides() {
        let crop = cover_fit(1920, 1080, 1080, 1920);
        assert_eq!(
            crop,
            CropRect {
                x: 656,
                y: 0,
                width: 608,
                height: 1080
            }
        );
    }

    #[test]
    fn tall_source_crops_top_and_bottom() {
        let crop = cover_fit(1080, 1920, 1920, 1080);
        assert_eq!(
            crop,
            CropRect {
                x: 0,
                y: 656,
                width: 1080,
                height: 608
            }
        );
    }

    #[test]
    fn matching_aspect_keeps_the_full_frame() {
        let crop = cover_fit(1280, 720, 1920, 1080);
        assert_eq!(
            crop,
            CropRect {
                x: 0,
                y: 0,
                width: 1280,
                height: 720
            }
        );
    }

    #[test]
    fn degenerate_sizes_stay_usable() {
        let crop = cover_fit(0, 0, 100, 100);
        assert_eq!(crop.width, 1);
        assert_eq!(crop.height, 1);

        let crop = cover_fit(640, 480, 0, 100);
        assert_eq!(crop.width, 640);
        assert_eq!(crop.height, 480);
    }

    #[test]
    fn uv_transform_matches_the_crop() {
        let (scale, offset) = cover_uv_transform(1920, 1080, 1080, 1920);
        assert!((scale[0] - 608.0 / 1920.0).abs() < 1e-6);
        assert!((scale[1] - 1.0).abs() < 1e-6);
        assert!((offset[0] - 656.0 / 1920.0).abs() < 1e-6);
        assert!(offset[1].abs() < 1e-6);
    }

    #[test]
    fn capture_files_are_timestamped_pngs() {
        let path = timestamped_path(Path::new("captures"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("ar-capture-"));
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn save_png_writes_under_the_target_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("captures");
        let image = RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 255]));

        let path = save_png(&image, &target).unwrap();
        assert!(path.exists());
        assert_eq!(path.parent().unwrap(), target);
    }
}
