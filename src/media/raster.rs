use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Width/height pair used for target boxes and image dimensions
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Fit `self` inside `bounds`, keeping the aspect ratio.
    /// Never grows past `self`; each side is at least 1 pixel.
    pub fn fit_within(self, bounds: Size) -> Size {
        if self.width == 0 || self.height == 0 {
            return self;
        }
        let scale = (bounds.width as f64 / self.width as f64)
            .min(bounds.height as f64 / self.height as f64)
            .min(1.0);
        Size {
            width: ((self.width as f64 * scale).round() as u32).max(1),
            height: ((self.height as f64 * scale).round() as u32).max(1),
        }
    }

    /// Multiply both sides by `percent / 100`
    pub fn scaled_percent(self, percent: u32) -> Size {
        Size {
            width: (self.width as u64 * percent as u64 / 100).max(1) as u32,
            height: (self.height as u64 * percent as u64 / 100).max(1) as u32,
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Parses `WIDTHxHEIGHT`, both sides non-zero
impl FromStr for Size {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (width, height) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
        let side = |raw: &str| match raw.trim().parse::<u32>() {
            Ok(0) | Err(_) => Err(format!("invalid size '{}'", s)),
            Ok(v) => Ok(v),
        };
        Ok(Size::new(side(width)?, side(height)?))
    }
}

/// Decoded, displayable pixels.
///
/// Always 8 bits per channel, packed row-major, either RGB (3 channels)
/// or RGBA (4 channels).
#[derive(Clone, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    channels: u8,
    pixels: Vec<u8>,
}

impl RasterImage {
    /// Wrap a packed buffer. Returns `None` when the channel count is not
    /// 3 or 4, or when the buffer length does not match the dimensions.
    pub fn new(width: u32, height: u32, channels: u8, pixels: Vec<u8>) -> Option<Self> {
        if !matches!(channels, 3 | 4) {
            return None;
        }
        let expected = width as usize * height as usize * channels as usize;
        if pixels.len() != expected {
            return None;
        }
        Some(Self { width, height, channels, pixels })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn has_alpha(&self) -> bool {
        self.channels == 4
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }
}

// Pixel buffers are large; keep them out of debug output
impl fmt::Debug for RasterImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!("320x180".parse::<Size>(), Ok(Size::new(320, 180)));
        assert_eq!("64X64".parse::<Size>(), Ok(Size::new(64, 64)));
        assert!("0x10".parse::<Size>().is_err());
        assert!("wide".parse::<Size>().is_err());
    }

    #[test]
    fn test_fit_preserves_aspect_ratio() {
        let fitted = Size::new(400, 200).fit_within(Size::new(100, 100));
        assert_eq!(fitted, Size::new(100, 50));

        let tall = Size::new(300, 900).fit_within(Size::new(285, 150));
        assert_eq!(tall, Size::new(50, 150));
    }

    #[test]
    fn test_fit_never_upscales() {
        let small = Size::new(40, 20);
        assert_eq!(small.fit_within(Size::new(400, 400)), small);
    }

    #[test]
    fn test_rejects_bad_channel_layout() {
        assert!(RasterImage::new(2, 2, 1, vec![0; 4]).is_none());
        assert!(RasterImage::new(2, 2, 3, vec![0; 11]).is_none());
        let rgba = RasterImage::new(2, 2, 4, vec![0; 16]).unwrap();
        assert!(rgba.has_alpha());
    }
}
