/// Collection browsing module
///
/// This module handles:
/// - Descriptors and loader traits through which collections are enumerated (source.rs)
/// - The lazily expanded collection tree and its reconciliation (tree.rs)
/// - Categories grouping root collections into browsing modes (category.rs)

pub mod source;
pub mod tree;
pub mod category;

pub use category::{Category, CategoryRegistry};
pub use source::{
    files_by_group, files_in_group, groups, CollectionDescriptor, CollectionKey, CollectionLoader, FileEntry,
    HistoryProvider, LoaderError,
};
pub use tree::{CollectionNode, CollectionTree, ExpandState, LoadRequest, NodeId, ReconcileReport, TreeError};
