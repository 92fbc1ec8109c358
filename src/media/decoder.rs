/// File to displayable pixels
///
/// Regular images are decoded through the `image` codecs and fitted to the
/// requested box. HDR images (Radiance, OpenEXR) are read as 32-bit floats,
/// clipped to [0, 1] and scaled to 8 bits. HDR output is NOT resized: callers
/// get native resolution and scale at display time.

use image::{imageops::FilterType, DynamicImage, ImageReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::raster::{RasterImage, Size};
use super::source::{FormatFamily, SourceIdentity};

/// Why a decode produced no image.
///
/// Cloneable so one coalesced decode can be reported to every item waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("not a decodable image: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("failed to decode {path}: {message}")]
    DecodeFailure { path: PathBuf, message: String },

    #[error("unsupported channel layout in {path}: {channels} channels")]
    UnsupportedChannelLayout { path: PathBuf, channels: u8 },

    #[error("decode worker panicked for {path}: {message}")]
    WorkerPanicked { path: PathBuf, message: String },
}

impl DecodeError {
    fn failure(path: &Path, err: impl std::fmt::Display) -> Self {
        DecodeError::DecodeFailure {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Decoder seam used by the load coordinator.
///
/// Implementations run on background workers and must not touch shared state.
pub trait Decode: Send + Sync + 'static {
    fn decode(&self, source: &SourceIdentity, target_size: Option<Size>) -> Result<RasterImage, DecodeError>;
}

/// The production decoder backed by the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoder;

impl Decode for ImageDecoder {
    fn decode(&self, source: &SourceIdentity, target_size: Option<Size>) -> Result<RasterImage, DecodeError> {
        decode(source, target_size)
    }
}

/// Decode `source`, fitting regular images inside `target_size`.
///
/// `None` means native size.
pub fn decode(source: &SourceIdentity, target_size: Option<Size>) -> Result<RasterImage, DecodeError> {
    match source.family() {
        FormatFamily::NotAnImage => Err(DecodeError::UnsupportedFormat(source.path().to_path_buf())),
        FormatFamily::Regular => decode_regular(source.path(), target_size),
        FormatFamily::Hdr => decode_hdr(source.path()),
    }
}

fn open(path: &Path) -> Result<ImageReader<std::io::BufReader<std::fs::File>>, DecodeError> {
    ImageReader::open(path)
        .map_err(|e| DecodeError::failure(path, e))?
        .with_guessed_format()
        .map_err(|e| DecodeError::failure(path, e))
}

fn decode_regular(path: &Path, target_size: Option<Size>) -> Result<RasterImage, DecodeError> {
    // Header-only pass to plan the output size before pixels are allocated
    let planned = match target_size {
        Some(bounds) => {
            let (width, height) = open(path)?
                .into_dimensions()
                .map_err(|e| DecodeError::failure(path, e))?;
            Some(Size::new(width, height).fit_within(bounds))
        }
        None => None,
    };

    let img = open(path)?
        .decode()
        .map_err(|e| DecodeError::failure(path, e))?;

    let img = match planned {
        Some(size) if size != Size::new(img.width(), img.height()) => {
            img.resize_exact(size.width, size.height, FilterType::Lanczos3)
        }
        _ => img,
    };

    to_raster(path, img)
}

/// Keep alpha when the source has it, otherwise pack as RGB
fn to_raster(path: &Path, img: DynamicImage) -> Result<RasterImage, DecodeError> {
    let (width, height) = (img.width(), img.height());
    let raster = if img.color().has_alpha() {
        RasterImage::new(width, height, 4, img.into_rgba8().into_raw())
    } else {
        RasterImage::new(width, height, 3, img.into_rgb8().into_raw())
    };
    raster.ok_or_else(|| DecodeError::failure(path, "decoded buffer does not match image dimensions"))
}

fn decode_hdr(path: &Path) -> Result<RasterImage, DecodeError> {
    let img = open(path)?
        .decode()
        .map_err(|e| DecodeError::failure(path, e))?;

    let (width, height) = (img.width(), img.height());
    let channels = img.color().channel_count();

    let floats = match channels {
        3 => img.into_rgb32f().into_raw(),
        4 => img.into_rgba32f().into_raw(),
        _ => {
            return Err(DecodeError::UnsupportedChannelLayout {
                path: path.to_path_buf(),
                channels,
            })
        }
    };

    let pixels = floats.iter().map(|&v| clip_to_u8(v)).collect();

    RasterImage::new(width, height, channels, pixels).ok_or_else(|| {
        DecodeError::failure(path, "decoded buffer does not match image dimensions")
    })
}

/// [0, 1] float to 8-bit, truncating
fn clip_to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgb32FImage, Rgba, Rgba32FImage, RgbaImage, RgbImage};

    #[test]
    fn test_not_an_image_is_unsupported() {
        let source = SourceIdentity::new("/nonexistent/notes.txt");
        let result = decode(&source, None);
        assert!(matches!(result, Err(DecodeError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_regular_fits_target_box() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.png");
        RgbImage::from_pixel(400, 200, Rgb([10, 20, 30])).save(&path).unwrap();

        let raster = decode(&SourceIdentity::new(&path), Some(Size::new(100, 100))).unwrap();
        assert_eq!(raster.size(), Size::new(100, 50));
        assert_eq!(raster.channels(), 3);
    }

    #[test]
    fn test_regular_native_size_when_target_unset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alpha.png");
        RgbaImage::from_pixel(40, 30, Rgba([1, 2, 3, 4])).save(&path).unwrap();

        let raster = decode(&SourceIdentity::new(&path), None).unwrap();
        assert_eq!(raster.size(), Size::new(40, 30));
        assert_eq!(raster.channels(), 4);
        assert_eq!(&raster.pixels()[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_regular_small_source_is_not_upscaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.png");
        RgbImage::new(20, 10).save(&path).unwrap();

        let raster = decode(&SourceIdentity::new(&path), Some(Size::new(285, 150))).unwrap();
        assert_eq!(raster.size(), Size::new(20, 10));
    }

    #[test]
    fn test_hdr_is_clipped_and_not_resized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.hdr");
        Rgb32FImage::from_pixel(64, 32, Rgb([0.5, 2.0, 0.0])).save(&path).unwrap();

        let raster = decode(&SourceIdentity::new(&path), Some(Size::new(16, 16))).unwrap();
        assert_eq!(raster.channels(), 3);
        assert_eq!(raster.size(), Size::new(64, 32));
        let px = &raster.pixels()[..3];
        // Radiance stores a shared exponent, so mid-grey may come back slightly off
        assert!((125..=130).contains(&px[0]));
        assert_eq!(px[1], 255);
        assert!(px[2] <= 2);
    }

    #[test]
    fn test_exr_with_alpha_keeps_four_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.exr");
        Rgba32FImage::from_pixel(8, 4, Rgba([1.5, 0.25, -1.0, 1.0])).save(&path).unwrap();

        let raster = decode(&SourceIdentity::new(&path), None).unwrap();
        assert_eq!(raster.channels(), 4);
        assert_eq!(&raster.pixels()[..4], &[255, 63, 0, 255]);
    }

    #[test]
    fn test_corrupt_file_is_decode_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\nnot really").unwrap();

        let result = decode(&SourceIdentity::new(&path), None);
        assert!(matches!(result, Err(DecodeError::DecodeFailure { .. })));
    }

    #[test]
    fn test_clip_to_u8() {
        assert_eq!(clip_to_u8(-0.5), 0);
        assert_eq!(clip_to_u8(1.0), 255);
        assert_eq!(clip_to_u8(7.0), 255);
        assert_eq!(clip_to_u8(0.5), 127);
    }
}
