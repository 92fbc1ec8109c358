use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use thiserror::Error;

use crate::collections::{Category, CollectionTree, HistoryProvider, NodeId, ReconcileReport, TreeError};
use crate::filter::{ActiveFilterSet, PathPattern};
use crate::media::SourceIdentity;
use crate::state::{Catalog, ItemId};

#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("invalid path pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Viewer navigation keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Next,
    Previous,
    First,
    Last,
}

/// One open category: its collection tree, the catalog fed by checked
/// collections, and the filters applied to the grid.
pub struct CatalogueContext {
    category: String,
    history: Option<Arc<dyn HistoryProvider>>,
    expand_group: bool,
    tree: CollectionTree,
    catalog: Catalog,
    filters: ActiveFilterSet,
    pattern: PathPattern,
}

impl CatalogueContext {
    pub fn new(category: &Category, catalog: Catalog) -> Self {
        info!(
            "[Context] Opening '{}' with {} root collection(s)",
            category.name,
            category.roots.len()
        );
        Self {
            category: category.name.clone(),
            history: category.history.clone(),
            expand_group: category.expand_group,
            tree: CollectionTree::with_roots(category.roots.clone()),
            catalog,
            filters: ActiveFilterSet::default(),
            pattern: PathPattern::default(),
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn tree(&self) -> &CollectionTree {
        &self.tree
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    /// Check a collection: its files join the catalog.
    /// Returns the new items; none when it was already checked.
    pub fn check(&mut self, node: NodeId) -> Result<Vec<ItemId>, ContextError> {
        if self.tree.get(node).map(|n| n.is_checked()).unwrap_or(false) {
            return Ok(Vec::new());
        }
        let files = self.tree.load_files(node)?;
        self.tree.set_checked(node, true)?;

        debug!("[Context] {} checked, {} file(s)", node, files.len());
        let entries = files
            .into_iter()
            .map(|file| (SourceIdentity::new(&file.path), file.catalog_tags()));
        Ok(self.catalog.add_batch(Some(node), entries))
    }

    /// Uncheck a collection and drop its items. Returns how many were removed.
    pub fn uncheck(&mut self, node: NodeId) -> Result<usize, ContextError> {
        if !self.tree.set_checked(node, false)? {
            return Ok(0);
        }
        Ok(self.catalog.remove_collection(node))
    }

    pub fn expand(&mut self, node: NodeId) -> Result<(), ContextError> {
        Ok(self.tree.expand(node)?)
    }

    pub fn collapse(&mut self, node: NodeId) -> Result<(), ContextError> {
        Ok(self.tree.collapse(node)?)
    }

    /// Reload a node's children. Items of checked collections that
    /// disappeared leave the catalog with them.
    pub fn refresh(&mut self, node: NodeId) -> Result<ReconcileReport, ContextError> {
        let report = self.tree.refresh(node)?;
        for &node in &report.unchecked {
            self.catalog.remove_collection(node);
        }
        Ok(report)
    }

    pub fn filters(&self) -> &ActiveFilterSet {
        &self.filters
    }

    pub fn set_filters(&mut self, filters: ActiveFilterSet) {
        self.filters = filters;
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// An invalid pattern is reported and the current one stays
    pub fn set_pattern(&mut self, pattern: &str) -> Result<(), ContextError> {
        Ok(self.pattern.set(pattern)?)
    }

    /// Items currently shown in the grid
    pub fn visible(&self) -> Vec<ItemId> {
        self.catalog.visible(&self.filters, &self.pattern)
    }

    /// Item the viewer moves to from `current`, if it moves at all
    pub fn step(&self, current: ItemId, step: Step) -> Option<ItemId> {
        let visible = self.visible();
        let position = visible.iter().position(|&id| id == current);

        let target = match (step, position) {
            (Step::First, _) => visible.first(),
            (Step::Last, _) => visible.last(),
            (Step::Next, Some(i)) => visible.get(i + 1).or(visible.last()),
            (Step::Previous, Some(i)) => i.checked_sub(1).and_then(|i| visible.get(i)).or(visible.first()),
            (_, None) => visible.first(),
        };

        target.copied().filter(|&id| id != current)
    }

    /// Same as `step`, for a viewer that tracks the file it shows
    pub fn step_from_path(&self, current: &Path, step: Step) -> Option<PathBuf> {
        let next = match self.catalog.find_by_path(current) {
            Some(id) => self.step(id, step)?,
            None => *self.visible().first()?,
        };
        self.catalog.get(next).map(|item| item.path().to_path_buf())
    }

    /// Related files of `path` (earlier versions etc.), most relevant first
    pub fn history(&self, path: &Path) -> Vec<PathBuf> {
        match &self.history {
            Some(provider) => provider.find_history(path),
            None => Vec::new(),
        }
    }

    /// Files the viewer opens for `item`: the whole visible group when the
    /// category expands groups, otherwise just the item's file
    pub fn open_paths(&self, item: ItemId) -> Vec<PathBuf> {
        let Some(opened) = self.catalog.get(item) else {
            return Vec::new();
        };
        let group = opened.tags().values("group").first();
        let (true, Some(group)) = (self.expand_group, group) else {
            return vec![opened.path().to_path_buf()];
        };

        self.visible()
            .into_iter()
            .filter_map(|id| self.catalog.get(id))
            .filter(|other| {
                other.collection() == opened.collection() && other.tags().values("group").first() == Some(group)
            })
            .map(|other| other.path().to_path_buf())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::{CollectionDescriptor, CollectionKey, CollectionLoader, FileEntry, LoaderError};
    use crate::config::CatalogConfig;
    use crate::filter::{FilterPredicate, MatchMode};
    use crate::state::{LoadState, TagSet};
    use image::{Rgb, RgbImage};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Shot list whose children can be changed between refreshes
    struct Shots {
        dir: PathBuf,
        shots: Mutex<Vec<&'static str>>,
    }

    impl CollectionLoader for Shots {
        fn load_children(&self, _key: &CollectionKey) -> Result<Vec<CollectionDescriptor>, LoaderError> {
            let shots = self.shots.lock().unwrap();
            Ok(shots
                .iter()
                .map(|shot| {
                    let file = FileEntry::new(self.dir.join(format!("{}.png", shot)));
                    CollectionDescriptor::new(*shot, *shot).with_files(vec![file])
                })
                .collect())
        }

        fn load_files(&self, _key: &CollectionKey) -> Result<Vec<FileEntry>, LoaderError> {
            Ok(Vec::new())
        }
    }

    struct Versions;

    impl HistoryProvider for Versions {
        fn find_history(&self, path: &Path) -> Vec<PathBuf> {
            vec![path.with_file_name("v002.png"), path.with_file_name("v001.png")]
        }
    }

    fn png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(8, 8, Rgb([10, 20, 30])).save(&path).unwrap();
        path
    }

    fn flat_context(dir: &TempDir, expand_group: bool) -> (CatalogueContext, NodeId) {
        let files = vec![
            FileEntry::new(png(dir.path(), "comp_a.png")).with_group("comp"),
            FileEntry::new(png(dir.path(), "plate.png")).with_tags(TagSet::new().with("kind", "plate")),
            FileEntry::new(png(dir.path(), "comp_b.png")).with_group("comp"),
            FileEntry::new(png(dir.path(), "anim.png")).with_group("anim"),
        ];
        let category = Category::new("Shots", "Production")
            .with_roots(vec![CollectionDescriptor::new("sh010", "sh010").with_files(files)])
            .with_history(Arc::new(Versions))
            .with_expand_group(expand_group);
        let catalog = Catalog::new(&CatalogConfig::default()).unwrap();
        let context = CatalogueContext::new(&category, catalog);
        let root = context.tree().roots()[0];
        (context, root)
    }

    #[test]
    fn test_check_adds_and_uncheck_removes() {
        let dir = tempfile::tempdir().unwrap();
        let (mut context, root) = flat_context(&dir, false);

        let ids = context.check(root).unwrap();
        assert_eq!(ids.len(), 4);
        assert!(context.check(root).unwrap().is_empty());

        context.catalog_mut().drain();
        assert_eq!(context.catalog().count_in_state(LoadState::Loaded), 4);
        let first = context.catalog().get(ids[0]).unwrap();
        assert_eq!(first.collection(), Some(root));

        assert_eq!(context.uncheck(root).unwrap(), 4);
        assert!(context.catalog().is_empty());
        assert_eq!(context.uncheck(root).unwrap(), 0);
    }

    #[test]
    fn test_filters_and_step() {
        let dir = tempfile::tempdir().unwrap();
        let (mut context, root) = flat_context(&dir, false);
        let ids = context.check(root).unwrap();

        let mut filters = ActiveFilterSet::new(MatchMode::Any);
        filters.insert(FilterPredicate::values("group", ["comp"]));
        filters.insert(FilterPredicate::presence("kind"));
        context.set_filters(filters);
        assert_eq!(context.visible(), vec![ids[0], ids[1], ids[2]]);

        assert_eq!(context.step(ids[0], Step::Next), Some(ids[1]));
        assert_eq!(context.step(ids[2], Step::Next), None);
        assert_eq!(context.step(ids[0], Step::Previous), None);
        assert_eq!(context.step(ids[1], Step::Previous), Some(ids[0]));
        assert_eq!(context.step(ids[0], Step::Last), Some(ids[2]));
        assert_eq!(context.step(ids[0], Step::First), None);
        // filtered out: jump to the first visible item
        assert_eq!(context.step(ids[3], Step::Next), Some(ids[0]));

        assert!(context.set_pattern("comp_").is_ok());
        assert_eq!(context.visible(), vec![ids[0], ids[2]]);
        assert!(context.set_pattern("[").is_err());
        assert_eq!(context.pattern().as_str(), "comp_");

        let from = context.catalog().get(ids[0]).unwrap().path().to_path_buf();
        let to = context.step_from_path(&from, Step::Next).unwrap();
        assert!(to.ends_with("comp_b.png"));
    }

    #[test]
    fn test_history_and_groups() {
        let dir = tempfile::tempdir().unwrap();
        let (mut context, root) = flat_context(&dir, true);
        let ids = context.check(root).unwrap();

        let history = context.history(Path::new("/show/sh010/v003.png"));
        assert_eq!(history, vec![PathBuf::from("/show/sh010/v002.png"), PathBuf::from("/show/sh010/v001.png")]);

        let opened = context.open_paths(ids[0]);
        assert_eq!(opened.len(), 2);
        assert!(opened[1].ends_with("comp_b.png"));
        assert_eq!(context.open_paths(ids[1]).len(), 1);
    }

    #[test]
    fn test_no_history_provider() {
        let category = Category::new("Folders", "Disk");
        let context = CatalogueContext::new(&category, Catalog::new(&CatalogConfig::default()).unwrap());
        assert!(context.history(Path::new("/a.png")).is_empty());
        assert!(context.visible().is_empty());
    }

    #[test]
    fn test_refresh_drops_items_of_vanished_collections() {
        let dir = tempfile::tempdir().unwrap();
        for shot in ["sh010", "sh020"] {
            png(dir.path(), &format!("{}.png", shot));
        }
        let loader = Arc::new(Shots {
            dir: dir.path().to_path_buf(),
            shots: Mutex::new(vec!["sh010", "sh020"]),
        });
        let category = Category::new("Shots", "Production")
            .with_roots(vec![CollectionDescriptor::new("show", "show").with_loader(loader.clone())]);
        let mut context = CatalogueContext::new(&category, Catalog::new(&CatalogConfig::default()).unwrap());

        let root = context.tree().roots()[0];
        context.expand(root).unwrap();
        let sh010 = context.tree().children(root).unwrap()[0];
        let sh020 = context.tree().children(root).unwrap()[1];
        context.check(sh010).unwrap();
        context.check(sh020).unwrap();
        assert_eq!(context.catalog().len(), 2);

        *loader.shots.lock().unwrap() = vec!["sh020"];
        let report = context.refresh(root).unwrap();

        assert_eq!(report.unchecked, vec![sh010]);
        assert_eq!(context.catalog().len(), 1);
        assert!(context.tree().get(sh020).unwrap().is_checked());
        context.catalog_mut().drain();
        assert_eq!(context.catalog().count_in_state(LoadState::Loaded), 1);
    }

    /// Every shot has a task collection keyed `comp`; shots listed in
    /// `retired` report no tasks anymore
    struct Tasks {
        dir: PathBuf,
        retired: Mutex<Vec<String>>,
    }

    impl CollectionLoader for Tasks {
        fn load_children(&self, key: &CollectionKey) -> Result<Vec<CollectionDescriptor>, LoaderError> {
            if self.retired.lock().unwrap().iter().any(|shot| shot == key.as_str()) {
                return Ok(Vec::new());
            }
            let file = FileEntry::new(self.dir.join(format!("{}_comp.png", key)));
            Ok(vec![CollectionDescriptor::new("comp", "comp").with_files(vec![file])])
        }

        fn load_files(&self, _key: &CollectionKey) -> Result<Vec<FileEntry>, LoaderError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_same_key_under_different_parents_stays_separate() {
        let dir = tempfile::tempdir().unwrap();
        png(dir.path(), "sh010_comp.png");
        png(dir.path(), "sh020_comp.png");
        let loader = Arc::new(Tasks {
            dir: dir.path().to_path_buf(),
            retired: Mutex::new(Vec::new()),
        });
        let category = Category::new("Shots", "Production").with_roots(vec![
            CollectionDescriptor::new("sh010", "sh010").with_loader(loader.clone()),
            CollectionDescriptor::new("sh020", "sh020").with_loader(loader.clone()),
        ]);
        let mut context = CatalogueContext::new(&category, Catalog::new(&CatalogConfig::default()).unwrap());

        let roots = context.tree().roots().to_vec();
        let mut comps = Vec::new();
        for root in &roots {
            context.expand(*root).unwrap();
            let comp = context.tree().children(*root).unwrap()[0];
            context.check(comp).unwrap();
            comps.push(comp);
        }
        assert_eq!(context.catalog().len(), 2);

        assert_eq!(context.uncheck(comps[0]).unwrap(), 1);
        assert_eq!(context.catalog().len(), 1);
        assert!(context.tree().get(comps[1]).unwrap().is_checked());

        // Destroying a checked `comp` leaves the other shot's `comp` alone
        context.check(comps[0]).unwrap();
        loader.retired.lock().unwrap().push("sh010".to_string());
        let report = context.refresh(roots[0]).unwrap();
        assert_eq!(report.unchecked, vec![comps[0]]);
        assert_eq!(context.catalog().len(), 1);
        let left = context.catalog().items()[0].collection();
        assert_eq!(left, Some(comps[1]));
    }
}
