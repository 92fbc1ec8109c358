/// What the outside world tells the tree about collections
///
/// Collections are enumerated by external loaders: a database query, a
/// directory walk, a production tracker. The tree only sees descriptors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::state::TagSet;

/// Backing identity of a collection, unique among its siblings
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct CollectionKey(String);

impl CollectionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CollectionKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for CollectionKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file a collection contributes to the catalog
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub path: PathBuf,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub tags: TagSet,
}

impl FileEntry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            group: None,
            tags: TagSet::new(),
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_tags(mut self, tags: TagSet) -> Self {
        self.tags = tags;
        self
    }

    /// Tags as seen by the filter engine: the entry's own tags plus its group
    pub fn catalog_tags(&self) -> TagSet {
        let mut tags = self.tags.clone();
        if let Some(group) = &self.group {
            tags.insert("group", group.as_str());
        }
        tags
    }
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("{0}")]
    Other(String),
}

/// Enumerates sub-collections and files of a collection.
///
/// Called on the interactive thread. A collection without a loader is not
/// expandable.
pub trait CollectionLoader: Send + Sync {
    fn load_children(&self, key: &CollectionKey) -> Result<Vec<CollectionDescriptor>, LoaderError>;

    fn load_files(&self, key: &CollectionKey) -> Result<Vec<FileEntry>, LoaderError>;
}

/// Finds earlier versions/related files of a path, for the viewer's history panel
pub trait HistoryProvider: Send + Sync {
    fn find_history(&self, path: &Path) -> Vec<PathBuf>;
}

/// Everything needed to create a collection node
#[derive(Clone)]
pub struct CollectionDescriptor {
    pub name: String,
    pub key: CollectionKey,
    /// Files known up front, used when there is no loader
    pub files: Vec<FileEntry>,
    pub loader: Option<Arc<dyn CollectionLoader>>,
}

impl CollectionDescriptor {
    pub fn new(name: impl Into<String>, key: impl Into<CollectionKey>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            files: Vec::new(),
            loader: None,
        }
    }

    pub fn with_files(mut self, files: Vec<FileEntry>) -> Self {
        self.files = files;
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn CollectionLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn is_expandable(&self) -> bool {
        self.loader.is_some()
    }
}

impl fmt::Debug for CollectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionDescriptor")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("files", &self.files.len())
            .field("expandable", &self.is_expandable())
            .finish()
    }
}

/// Distinct group names, sorted
pub fn groups(files: &[FileEntry]) -> Vec<String> {
    let mut groups: Vec<String> = files.iter().filter_map(|f| f.group.clone()).collect();
    groups.sort();
    groups.dedup();
    groups
}

pub fn files_in_group<'a>(files: &'a [FileEntry], group: &str) -> Vec<&'a FileEntry> {
    files
        .iter()
        .filter(|f| f.group.as_deref() == Some(group))
        .collect()
}

/// Files keyed by group; ungrouped files are left out
pub fn files_by_group(files: &[FileEntry]) -> BTreeMap<&str, Vec<&FileEntry>> {
    let mut grouped: BTreeMap<&str, Vec<&FileEntry>> = BTreeMap::new();
    for file in files {
        if let Some(group) = file.group.as_deref() {
            grouped.entry(group).or_default().push(file);
        }
    }
    grouped
}
