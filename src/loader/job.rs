use std::path::PathBuf;
use std::sync::Arc;

use crate::media::{DecodeError, RasterImage, Size, SourceIdentity};
use crate::state::ItemId;

/// One pending decode
#[derive(Debug, Clone)]
pub struct LoadJob {
    pub source: SourceIdentity,
    /// Box to fit the result in; `None` decodes at native size
    pub target_size: Option<Size>,
    /// Catalog item the result belongs to
    pub item: ItemId,
}

impl LoadJob {
    pub fn new(source: SourceIdentity, target_size: Option<Size>, item: ItemId) -> Self {
        Self { source, target_size, item }
    }
}

/// A settled decode, handed to the interactive thread.
///
/// `items` lists every live item that was waiting on this source; a coalesced
/// submission shares the single decode result.
#[derive(Debug, Clone)]
pub struct Completion {
    pub source: PathBuf,
    pub items: Vec<ItemId>,
    pub result: Result<Arc<RasterImage>, DecodeError>,
}

/// What `submit` did with a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Queued for a worker
    Admitted,
    /// Joined a decode already pending or in flight for the same source
    Coalesced,
    /// The same source is still decoding, cancelled or for another target
    /// size; the job runs after it
    Deferred,
    /// Settled without touching the workers (not an image)
    Settled,
}
