/// Shared data structures for the catalog
///
/// These structs represent the data model that flows between the load
/// coordinator and the display layer.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::collections::NodeId;
use crate::media::{RasterImage, Size, SourceIdentity};

use super::tags::TagSet;

/// Stable handle to a catalog item. Never reused within a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where an item is in its decode lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadState {
    Unloaded,
    Pending,
    Loaded,
    Failed,
}

impl LoadState {
    pub fn is_settled(self) -> bool {
        matches!(self, LoadState::Loaded | LoadState::Failed)
    }
}

/// Represents a single thumbnail in the catalog
#[derive(Debug, Clone)]
pub struct ThumbnailItem {
    pub(crate) id: ItemId,
    pub(crate) source: SourceIdentity,
    /// Last decoded image; `None` shows the placeholder
    pub(crate) image: Option<Arc<RasterImage>>,
    pub(crate) target_size: Option<Size>,
    pub(crate) tags: TagSet,
    /// Collection node the item was added from, so unchecking it can remove the item
    pub(crate) collection: Option<NodeId>,
    pub(crate) state: LoadState,
    /// Message of the last failed decode
    pub(crate) error: Option<String>,
}

impl ThumbnailItem {
    pub(crate) fn new(
        id: ItemId,
        source: SourceIdentity,
        tags: TagSet,
        target_size: Option<Size>,
        collection: Option<NodeId>,
    ) -> Self {
        Self {
            id,
            source,
            image: None,
            target_size,
            tags,
            collection,
            state: LoadState::Unloaded,
            error: None,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn source(&self) -> &SourceIdentity {
        &self.source
    }

    pub fn path(&self) -> &Path {
        self.source.path()
    }

    pub fn image(&self) -> Option<&Arc<RasterImage>> {
        self.image.as_ref()
    }

    pub fn target_size(&self) -> Option<Size> {
        self.target_size
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn collection(&self) -> Option<NodeId> {
        self.collection
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Header text shown over the thumbnail
    pub fn label(&self) -> String {
        self.source.file_name()
    }
}
