use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info};

use crate::collections::NodeId;
use crate::config::CatalogConfig;
use crate::filter::{self, ActiveFilterSet, PathPattern};
use crate::loader::{Completion, LoadCoordinator, LoadJob};
use crate::media::{Size, SourceIdentity};
use crate::view::{NullObserver, ViewEvent, ViewObserver};

use super::data::{ItemId, LoadState, ThumbnailItem};
use super::tags::TagSet;

/// The Catalog owns every thumbnail item shown in one grid.
///
/// It lives on the interactive thread. Decodes go through the owned
/// `LoadCoordinator`; their results are only applied when the caller pumps
/// (`pump`, `drain`, `settle_next`), so item state is never touched by a
/// background worker. Every state transition is published to the observer.
pub struct Catalog {
    items: Vec<ThumbnailItem>,
    /// Row of each live item in `items`
    rows: HashMap<ItemId, usize>,
    next_id: u64,
    coordinator: LoadCoordinator,
    observer: Box<dyn ViewObserver>,
    /// Size hint for items added without an explicit one
    default_size: Option<Size>,
}

impl Catalog {
    /// Create a catalog with its own coordinator, configured from `config`
    pub fn new(config: &CatalogConfig) -> std::io::Result<Self> {
        let coordinator = LoadCoordinator::new(config)?;
        Ok(Self::with_coordinator(coordinator, Some(config.scaled_thumbnail_size())))
    }

    pub fn with_coordinator(coordinator: LoadCoordinator, default_size: Option<Size>) -> Self {
        Self {
            items: Vec::new(),
            rows: HashMap::new(),
            next_id: 1,
            coordinator,
            observer: Box::new(NullObserver),
            default_size,
        }
    }

    pub fn set_observer(&mut self, observer: Box<dyn ViewObserver>) {
        self.observer = observer;
    }

    pub fn default_size(&self) -> Option<Size> {
        self.default_size
    }

    /// Add one item and queue its decode
    pub fn add(&mut self, source: SourceIdentity, tags: TagSet, target_size: Option<Size>) -> ItemId {
        let id = self.insert(source, tags, target_size, None);
        self.enqueue(id);
        id
    }

    /// Add many items from one collection.
    ///
    /// All items are inserted first, then their decodes are queued in the
    /// same order, so admission follows the collection's file order.
    pub fn add_batch<I>(&mut self, collection: Option<NodeId>, entries: I) -> Vec<ItemId>
    where
        I: IntoIterator<Item = (SourceIdentity, TagSet)>,
    {
        let size = self.default_size;
        let ids: Vec<ItemId> = entries
            .into_iter()
            .map(|(source, tags)| self.insert(source, tags, size, collection))
            .collect();

        for &id in &ids {
            self.enqueue(id);
        }

        info!("[Catalog] Queued {} item(s) from {:?}", ids.len(), collection);
        ids
    }

    fn insert(
        &mut self,
        source: SourceIdentity,
        tags: TagSet,
        target_size: Option<Size>,
        collection: Option<NodeId>,
    ) -> ItemId {
        let id = ItemId(self.next_id);
        self.next_id += 1;

        let row = self.items.len();
        self.items.push(ThumbnailItem::new(id, source, tags, target_size, collection));
        self.rows.insert(id, row);
        self.observer.notify(ViewEvent::ItemInserted { item: id, row });
        id
    }

    /// Submit a decode for `id` and mark it pending
    fn enqueue(&mut self, id: ItemId) {
        let Some(&row) = self.rows.get(&id) else {
            return;
        };
        let item = &mut self.items[row];
        let job = LoadJob::new(item.source.clone(), item.target_size, id);
        item.state = LoadState::Pending;
        self.coordinator.submit(job);
        self.observer.notify(ViewEvent::ItemChanged(id));
    }

    /// Remove every item matching `predicate`, dropping interest in any
    /// decode still pending for it. Returns how many were removed.
    pub fn remove<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&ThumbnailItem) -> bool,
    {
        let before = self.items.len();
        let mut removed = Vec::new();

        self.items.retain(|item| {
            if predicate(item) {
                removed.push((item.id, item.source.path().to_path_buf(), item.state));
                false
            } else {
                true
            }
        });

        for (id, path, state) in &removed {
            if *state == LoadState::Pending {
                self.coordinator.detach(*id, path);
            }
            self.observer.notify(ViewEvent::ItemRemoved(*id));
        }

        if !removed.is_empty() {
            self.reindex();
        }
        before - self.items.len()
    }

    /// Remove the items that were added from collection node `collection`
    pub fn remove_collection(&mut self, collection: NodeId) -> usize {
        self.remove(|item| item.collection == Some(collection))
    }

    pub fn clear(&mut self) -> usize {
        self.remove(|_| true)
    }

    fn reindex(&mut self) {
        self.rows = self
            .items
            .iter()
            .enumerate()
            .map(|(row, item)| (item.id, row))
            .collect();
    }

    /// Decode `id` again with its current size hint.
    /// No-op while a decode for it is already pending.
    pub fn refresh(&mut self, id: ItemId) -> bool {
        match self.get(id) {
            Some(item) if item.state != LoadState::Pending => {
                self.enqueue(id);
                true
            }
            _ => false,
        }
    }

    /// Re-decode every item, e.g. after the size slider was released
    pub fn refresh_all(&mut self) -> usize {
        let ids: Vec<ItemId> = self.items.iter().map(|item| item.id).collect();
        ids.into_iter().filter(|&id| self.refresh(id)).count()
    }

    /// Change the size hint used by future decodes of `id`.
    /// The current image is left as it is until the next refresh.
    pub fn set_target_size(&mut self, id: ItemId, size: Option<Size>) -> bool {
        let Some(&row) = self.rows.get(&id) else {
            return false;
        };
        self.items[row].target_size = size;
        self.observer.notify(ViewEvent::ItemChanged(id));
        true
    }

    /// Apply a size hint to every item and make it the default for new ones
    pub fn set_all_target_sizes(&mut self, size: Option<Size>) {
        self.default_size = size;
        let ids: Vec<ItemId> = self.items.iter().map(|item| item.id).collect();
        for id in ids {
            self.set_target_size(id, size);
        }
    }

    /// Apply whatever decodes have finished, without blocking.
    /// Returns the number of items updated.
    pub fn pump(&mut self) -> usize {
        let completions = self.coordinator.poll();
        self.apply_all(completions)
    }

    /// Block until every queued decode settled and apply the results
    pub fn drain(&mut self) -> usize {
        let completions = self.coordinator.drain();
        self.apply_all(completions)
    }

    /// Await the next finished decode and apply it.
    /// Returns `false` once nothing is outstanding.
    pub async fn settle_next(&mut self) -> bool {
        match self.coordinator.next_completion().await {
            Some(completion) => {
                self.apply(completion);
                true
            }
            None => false,
        }
    }

    fn apply_all(&mut self, completions: Vec<Completion>) -> usize {
        completions.into_iter().map(|c| self.apply(c)).sum()
    }

    fn apply(&mut self, completion: Completion) -> usize {
        let mut updated = 0;

        for id in completion.items {
            let Some(&row) = self.rows.get(&id) else {
                debug!("[Catalog] Dropping result for removed item {}", id);
                continue;
            };
            let item = &mut self.items[row];
            if item.state != LoadState::Pending || item.source.path() != completion.source {
                debug!("[Catalog] Dropping stale result for {}", id);
                continue;
            }

            match &completion.result {
                Ok(image) => {
                    item.image = Some(Arc::clone(image));
                    item.state = LoadState::Loaded;
                    item.error = None;
                }
                Err(e) => {
                    // Keep whatever was displayed before
                    item.state = LoadState::Failed;
                    item.error = Some(e.to_string());
                }
            }
            self.observer.notify(ViewEvent::ItemChanged(id));
            updated += 1;
        }

        updated
    }

    pub fn get(&self, id: ItemId) -> Option<&ThumbnailItem> {
        self.rows.get(&id).map(|&row| &self.items[row])
    }

    /// First item showing `path`
    pub fn find_by_path(&self, path: &Path) -> Option<ItemId> {
        self.items.iter().find(|item| item.path() == path).map(|item| item.id)
    }

    pub fn row_of(&self, id: ItemId) -> Option<usize> {
        self.rows.get(&id).copied()
    }

    pub fn items(&self) -> &[ThumbnailItem] {
        &self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = &ThumbnailItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn count_in_state(&self, state: LoadState) -> usize {
        self.items.iter().filter(|item| item.state == state).count()
    }

    /// Ids of the items passing both the tag filters and the path pattern,
    /// in catalog order
    pub fn visible(&self, filters: &ActiveFilterSet, pattern: &PathPattern) -> Vec<ItemId> {
        self.items
            .iter()
            .filter(|item| filter::accepts(&item.tags, filters) && pattern.matches(item.path()))
            .map(|item| item.id)
            .collect()
    }

    pub fn coordinator(&self) -> &LoadCoordinator {
        &self.coordinator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterPredicate, MatchMode};
    use image::{Rgb, RgbImage};
    use std::path::{Path, PathBuf};
    use tokio::sync::mpsc;

    fn catalog() -> Catalog {
        let config = CatalogConfig {
            max_concurrent_decodes: 2,
            ..CatalogConfig::default()
        };
        Catalog::new(&config).unwrap()
    }

    fn png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(width, height, Rgb([200, 100, 50])).save(&path).unwrap();
        path
    }

    #[test]
    fn test_every_added_item_settles_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = catalog();
        let (tx, mut rx) = mpsc::unbounded_channel();
        catalog.set_observer(Box::new(tx));

        let mut ids = Vec::new();
        for i in 0..6 {
            let path = png(dir.path(), &format!("{}.png", i), 40, 20);
            ids.push(catalog.add(SourceIdentity::new(path), TagSet::new(), None));
        }
        std::fs::write(dir.path().join("notes.txt"), "hi").unwrap();
        ids.push(catalog.add(SourceIdentity::new(dir.path().join("notes.txt")), TagSet::new(), None));

        let updated = catalog.drain();
        assert_eq!(updated, 7);
        assert_eq!(catalog.count_in_state(LoadState::Loaded), 6);
        assert_eq!(catalog.count_in_state(LoadState::Failed), 1);
        assert_eq!(catalog.count_in_state(LoadState::Pending), 0);

        let mut changed = HashMap::new();
        while let Ok(event) = rx.try_recv() {
            if let ViewEvent::ItemChanged(id) = event {
                *changed.entry(id).or_insert(0) += 1;
            }
        }
        // unloaded -> pending, pending -> settled
        for id in ids {
            assert_eq!(changed.get(&id), Some(&2));
        }
    }

    #[test]
    fn test_size_hint_applies_to_next_decode_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = png(dir.path(), "b.png", 400, 200);
        let mut catalog = catalog();

        let id = catalog.add(SourceIdentity::new(&path), TagSet::new(), Some(Size::new(100, 100)));
        catalog.drain();
        assert_eq!(catalog.get(id).unwrap().image().unwrap().size(), Size::new(100, 50));

        catalog.set_target_size(id, Some(Size::new(50, 50)));
        assert_eq!(catalog.get(id).unwrap().image().unwrap().size(), Size::new(100, 50));

        assert!(catalog.refresh(id));
        catalog.drain();
        assert_eq!(catalog.get(id).unwrap().image().unwrap().size(), Size::new(50, 25));
    }

    #[test]
    fn test_same_file_at_two_sizes_gets_both() {
        let dir = tempfile::tempdir().unwrap();
        let path = png(dir.path(), "b.png", 400, 200);
        let mut catalog = catalog();

        let big = catalog.add(SourceIdentity::new(&path), TagSet::new(), Some(Size::new(200, 200)));
        let small = catalog.add(SourceIdentity::new(&path), TagSet::new(), Some(Size::new(50, 50)));
        catalog.drain();

        assert_eq!(catalog.get(big).unwrap().image().unwrap().size(), Size::new(200, 100));
        assert_eq!(catalog.get(small).unwrap().image().unwrap().size(), Size::new(50, 25));
        assert!(catalog.coordinator().is_idle());
    }

    #[test]
    fn test_failed_item_keeps_previous_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = png(dir.path(), "flaky.png", 10, 10);
        let mut catalog = catalog();

        let id = catalog.add(SourceIdentity::new(&path), TagSet::new(), None);
        catalog.drain();
        assert_eq!(catalog.get(id).unwrap().state(), LoadState::Loaded);

        std::fs::write(&path, b"garbage").unwrap();
        catalog.refresh(id);
        catalog.drain();

        let item = catalog.get(id).unwrap();
        assert_eq!(item.state(), LoadState::Failed);
        assert!(item.error().is_some());
        assert_eq!(item.image().unwrap().size(), Size::new(10, 10));
    }

    #[test]
    fn test_removed_item_is_not_touched_by_late_result() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = catalog();
        let node = NodeId(7);

        let entries: Vec<_> = (0..4)
            .map(|i| (SourceIdentity::new(png(dir.path(), &format!("{}.png", i), 64, 64)), TagSet::new()))
            .collect();
        let ids = catalog.add_batch(Some(node), entries);
        let keep = catalog.add(SourceIdentity::new(png(dir.path(), "keep.png", 8, 8)), TagSet::new(), None);

        assert_eq!(catalog.remove_collection(node), 4);
        catalog.drain();

        assert_eq!(catalog.len(), 1);
        assert!(ids.iter().all(|&id| catalog.get(id).is_none()));
        assert_eq!(catalog.get(keep).unwrap().state(), LoadState::Loaded);
        assert_eq!(catalog.row_of(keep), Some(0));
    }

    #[test]
    fn test_same_file_twice_decodes_once_for_both() {
        let dir = tempfile::tempdir().unwrap();
        let path = png(dir.path(), "shared.png", 30, 30);
        let mut catalog = catalog();

        let first = catalog.add(SourceIdentity::new(&path), TagSet::new(), None);
        let second = catalog.add(SourceIdentity::new(&path), TagSet::new(), None);
        assert_eq!(catalog.coordinator().in_flight_count(), 1);

        catalog.drain();
        let a = catalog.get(first).unwrap().image().unwrap();
        let b = catalog.get(second).unwrap().image().unwrap();
        assert!(Arc::ptr_eq(a, b));
    }

    #[test]
    fn test_visible_applies_tags_and_pattern() {
        let mut catalog = catalog();
        let hero = catalog.add(SourceIdentity::new("/show/hero_v001.png"), TagSet::new().with("task", "comp"), None);
        let _bg = catalog.add(SourceIdentity::new("/show/bg_v001.png"), TagSet::new().with("task", "paint"), None);
        let hero2 = catalog.add(SourceIdentity::new("/show/HERO_v002.png"), TagSet::new().with("task", "comp"), None);

        let mut filters = ActiveFilterSet::new(MatchMode::All);
        filters.insert(FilterPredicate::values("task", ["comp"]));

        assert_eq!(catalog.visible(&filters, &PathPattern::default()), vec![hero, hero2]);
        let pattern = PathPattern::new("hero_v002").unwrap();
        assert_eq!(catalog.visible(&filters, &pattern), vec![hero2]);
    }
}
