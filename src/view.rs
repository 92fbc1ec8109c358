/// Change notifications for the display layer
///
/// The catalog and the collection tree never paint anything; they publish
/// `ViewEvent`s and whatever renders the grid/tree repaints exactly what changed.

use std::ops::Range;
use tokio::sync::mpsc;

use crate::collections::NodeId;
use crate::state::ItemId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    /// A new item was appended to the catalog at `row`
    ItemInserted { item: ItemId, row: usize },
    /// An item's image, load state, or size hint changed
    ItemChanged(ItemId),
    /// An item left the catalog
    ItemRemoved(ItemId),
    /// One reconciliation pass over a node's children (`None`: the top level).
    /// `removed` ranges index the old child list, ascending and disjoint;
    /// `inserted` indexes the new one. Consumers apply the removals from the
    /// last range to the first, then insert `inserted` at `inserted.start`.
    ChildrenReplaced {
        node: Option<NodeId>,
        removed: Vec<Range<usize>>,
        inserted: Range<usize>,
    },
    /// Check state of a collection node flipped
    NodeChanged(NodeId),
}

/// Receiver of `ViewEvent`s
pub trait ViewObserver: Send {
    fn notify(&mut self, event: ViewEvent);
}

/// Discards every event (headless use)
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ViewObserver for NullObserver {
    fn notify(&mut self, _event: ViewEvent) {}
}

impl ViewObserver for mpsc::UnboundedSender<ViewEvent> {
    fn notify(&mut self, event: ViewEvent) {
        // A dropped receiver just means nobody is watching anymore
        let _ = self.send(event);
    }
}

impl ViewObserver for Vec<ViewEvent> {
    fn notify(&mut self, event: ViewEvent) {
        self.push(event);
    }
}
