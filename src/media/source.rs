use image::ImageFormat;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Number of leading bytes read when the extension does not identify the format
const SNIFF_BYTES: usize = 64;

/// Extensions routed to the floating-point decode path.
/// Mime databases tend to misidentify these (.hdr shows up as a subtitle format).
const HDR_EXTENSIONS: [&str; 2] = ["hdr", "exr"];

/// Which decode path a file goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatFamily {
    /// 8-bit formats handled by the regular codec (PNG, JPEG, ...)
    Regular,
    /// Floating-point formats that need clipping before display (Radiance, OpenEXR)
    Hdr,
    NotAnImage,
}

impl FormatFamily {
    pub fn is_image(self) -> bool {
        !matches!(self, FormatFamily::NotAnImage)
    }
}

/// Handle to a file the catalog can display.
///
/// The path is the stable identity other collaborators (history lookups,
/// viewer navigation) key on. `exists` and `family` are captured once at
/// construction so every later decision about this file is consistent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceIdentity {
    path: PathBuf,
    exists: bool,
    family: FormatFamily,
}

impl SourceIdentity {
    /// Inspect `path` and classify it
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let exists = path.is_file();
        let family = classify(&path, exists);
        Self { path, exists, family }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn family(&self) -> FormatFamily {
        self.family
    }

    pub fn is_image(&self) -> bool {
        self.family.is_image()
    }

    /// Filename only (e.g., "IMG_0001.png"), used for display labels
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    }
}

/// Map a path to its format family.
///
/// The extension decides first. Files with an unknown or missing extension
/// are sniffed by their magic bytes, which only happens when the file exists.
pub fn classify(path: &Path, exists: bool) -> FormatFamily {
    if let Some(ext) = path.extension() {
        let ext = ext.to_string_lossy().to_lowercase();
        if HDR_EXTENSIONS.contains(&ext.as_str()) {
            return FormatFamily::Hdr;
        }
        if let Some(format) = ImageFormat::from_extension(&ext) {
            return family_of(format);
        }
    }

    if !exists {
        return FormatFamily::NotAnImage;
    }

    sniff(path)
        .map(family_of)
        .unwrap_or(FormatFamily::NotAnImage)
}

fn family_of(format: ImageFormat) -> FormatFamily {
    match format {
        ImageFormat::Hdr | ImageFormat::OpenExr => FormatFamily::Hdr,
        format if format.reading_enabled() => FormatFamily::Regular,
        _ => FormatFamily::NotAnImage,
    }
}

fn sniff(path: &Path) -> Option<ImageFormat> {
    let mut file = File::open(path).ok()?;
    let mut header = [0u8; SNIFF_BYTES];
    let bytes_read = file.read(&mut header).ok()?;
    image::guess_format(&header[..bytes_read]).ok()
}
