/// Media decoding module
///
/// This module handles:
/// - Classifying files into regular raster, HDR raster, or not-an-image
/// - Decoding regular images with aspect-preserving pre-scaling
/// - Decoding HDR images through the floating-point path and clipping them to 8-bit

pub mod source;
pub mod raster;
pub mod decoder;

pub use decoder::{decode, Decode, DecodeError, ImageDecoder};
pub use raster::{RasterImage, Size};
pub use source::{FormatFamily, SourceIdentity};
