/// Collections backed by a directory tree
///
/// Each directory is a collection keyed by its path. Sub-directories are its
/// children (loaded when expanded) and the files directly inside it are its
/// files. Every file is tagged with its lowercase extension (`ext`) and the
/// name of its directory (`dir`); a `tags.json` next to the files can add a
/// group and more tags per file name:
///
/// ```json
/// { "comp_v002.exr": { "group": "comp", "tags": { "status": "approved" } } }
/// ```

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use log::debug;

use crate::collections::{CollectionDescriptor, CollectionKey, CollectionLoader, FileEntry, HistoryProvider, LoaderError};
use crate::state::TagSet;

pub const SIDECAR_FILE: &str = "tags.json";

#[derive(Deserialize, Debug, Default)]
struct SidecarEntry {
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    tags: TagSet,
}

#[derive(Debug, Clone, Default)]
pub struct DirectoryLoader {
    /// Also list dot-files and dot-directories
    pub include_hidden: bool,
}

impl DirectoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root collection for `dir`
    pub fn descriptor(&self, dir: &Path) -> CollectionDescriptor {
        CollectionDescriptor::new(display_name(dir), dir.to_string_lossy().into_owned())
            .with_loader(Arc::new(self.clone()))
    }

    /// Direct entries of `dir`, sorted by name
    fn entries(&self, dir: &Path) -> Result<Vec<walkdir::DirEntry>, LoaderError> {
        let mut entries = Vec::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = entry.map_err(walk_error)?;
            if !self.include_hidden && entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            entries.push(entry);
        }
        Ok(entries)
    }
}

impl CollectionLoader for DirectoryLoader {
    fn load_children(&self, key: &CollectionKey) -> Result<Vec<CollectionDescriptor>, LoaderError> {
        let children: Vec<CollectionDescriptor> = self
            .entries(Path::new(key.as_str()))?
            .into_iter()
            .filter(|entry| entry.file_type().is_dir())
            .map(|entry| self.descriptor(entry.path()))
            .collect();
        debug!("[DirectoryLoader] {} sub-collection(s) in {}", children.len(), key);
        Ok(children)
    }

    fn load_files(&self, key: &CollectionKey) -> Result<Vec<FileEntry>, LoaderError> {
        let dir = Path::new(key.as_str());
        let mut sidecar = read_sidecar(dir)?;
        let dir_name = display_name(dir);

        let files: Vec<FileEntry> = self
            .entries(dir)?
            .into_iter()
            .filter(|entry| entry.file_type().is_file() && entry.file_name() != SIDECAR_FILE)
            .map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let extra = sidecar.remove(&name).unwrap_or_default();

                let mut tags = TagSet::new().with("dir", dir_name.as_str());
                if let Some(ext) = entry.path().extension() {
                    tags.insert("ext", ext.to_string_lossy().to_lowercase());
                }
                tags.extend(extra.tags);

                let file = FileEntry::new(entry.into_path()).with_tags(tags);
                match extra.group {
                    Some(group) => file.with_group(group),
                    None => file,
                }
            })
            .collect();
        debug!("[DirectoryLoader] {} file(s) in {}", files.len(), key);
        Ok(files)
    }
}

fn read_sidecar(dir: &Path) -> Result<HashMap<String, SidecarEntry>, LoaderError> {
    let path = dir.join(SIDECAR_FILE);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&content).map_err(|e| LoaderError::Parse {
        path,
        message: e.to_string(),
    })
}

fn walk_error(e: walkdir::Error) -> LoaderError {
    let message = e.to_string();
    match e.into_io_error() {
        Some(io) => LoaderError::Io(io),
        None => LoaderError::Other(message),
    }
}

fn display_name(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.to_string_lossy().into_owned())
}

/// Earlier versions of a file: siblings sharing its name up to a `_v<N>`
/// suffix, newest version first. `shot_v003.exr` finds `shot_v002.exr`,
/// `shot_v001.exr` and so on.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionHistory;

impl VersionHistory {
    pub fn new() -> Self {
        Self
    }

    fn split(stem: &str) -> Option<(&str, u64)> {
        let (base, n) = stem.rsplit_once("_v")?;
        if base.is_empty() || n.is_empty() || !n.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some((base, n.parse().ok()?))
    }
}

impl HistoryProvider for VersionHistory {
    fn find_history(&self, path: &Path) -> Vec<PathBuf> {
        let (Some(dir), Some(stem)) = (path.parent(), path.file_stem().map(|s| s.to_string_lossy())) else {
            return Vec::new();
        };
        let Some((base, _)) = Self::split(&stem) else {
            return Vec::new();
        };
        let ext = path.extension();

        let mut versions: Vec<(u64, PathBuf)> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && e.path().extension() == ext)
            .filter_map(|e| {
                let stem = e.path().file_stem()?.to_string_lossy().into_owned();
                let (other_base, n) = Self::split(&stem)?;
                (other_base == base).then(|| (n, e.into_path()))
            })
            .collect();

        versions.sort_by(|a, b| b.0.cmp(&a.0));
        versions.into_iter().map(|(_, path)| path).collect()
    }
}
