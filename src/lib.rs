//! Browsable, filterable thumbnail catalogs over lazily loaded media collections.
//!
//! - `media`: classify and decode image files into display-ready rasters
//! - `loader`: bounded, ordered, de-duplicated background decoding
//! - `state`: the catalog of thumbnail items and their tags
//! - `filter`: tag predicates and the path pattern
//! - `collections`: the lazily expanded collection tree and categories
//! - `context`: one open category wired to a catalog
//!
//! Everything except decoding runs on the caller's (interactive) thread.
//! Changes are published as `view::ViewEvent`s.

pub mod collections;
pub mod config;
pub mod context;
pub mod directory;
pub mod filter;
pub mod loader;
pub mod media;
pub mod state;
pub mod view;

pub use collections::{Category, CategoryRegistry, CollectionTree, NodeId};
pub use config::CatalogConfig;
pub use context::{CatalogueContext, Step};
pub use filter::{accepts, ActiveFilterSet, FilterPredicate, MatchMode, PathPattern};
pub use loader::LoadCoordinator;
pub use state::{Catalog, ItemId, LoadState, TagSet, ThumbnailItem};
pub use view::{ViewEvent, ViewObserver};
