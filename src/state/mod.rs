/// State management module
///
/// This module handles all catalog state, including:
/// - Shared data structures (data.rs)
/// - Item tags used for filtering (tags.rs)
/// - The catalog of thumbnail items and its decode bookkeeping (catalog.rs)

pub mod data;
pub mod tags;
pub mod catalog;

pub use catalog::Catalog;
pub use data::{ItemId, LoadState, ThumbnailItem};
pub use tags::{Scalar, TagFloat, TagSet, TagValue};
