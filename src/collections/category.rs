use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use log::warn;

use super::source::{CollectionDescriptor, HistoryProvider};

/// A named browsing mode: which collections to show and how
#[derive(Clone)]
pub struct Category {
    pub name: String,
    /// Categories of the same family are listed together
    pub family: String,
    pub roots: Vec<CollectionDescriptor>,
    pub history: Option<Arc<dyn HistoryProvider>>,
    /// Open grouped files as one group rather than individually
    pub expand_group: bool,
}

impl Category {
    pub fn new(name: impl Into<String>, family: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            family: family.into(),
            roots: Vec::new(),
            history: None,
            expand_group: false,
        }
    }

    pub fn with_roots(mut self, roots: Vec<CollectionDescriptor>) -> Self {
        self.roots = roots;
        self
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryProvider>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_expand_group(mut self, expand_group: bool) -> Self {
        self.expand_group = expand_group;
        self
    }

    pub fn has_history(&self) -> bool {
        self.history.is_some()
    }
}

impl fmt::Debug for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Category")
            .field("name", &self.name)
            .field("family", &self.family)
            .field("roots", &self.roots)
            .field("history", &self.has_history())
            .field("expand_group", &self.expand_group)
            .finish()
    }
}

/// Known categories, in registration order
#[derive(Debug, Default, Clone)]
pub struct CategoryRegistry {
    categories: Vec<Category>,
}

impl CategoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `category`, replacing one with the same name
    pub fn register(&mut self, category: Category) {
        match self.categories.iter_mut().find(|c| c.name == category.name) {
            Some(existing) => {
                warn!("[Categories] Replacing category '{}'", category.name);
                *existing = category;
            }
            None => self.categories.push(category),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.name.as_str())
    }

    pub fn by_family(&self) -> BTreeMap<&str, Vec<&Category>> {
        let mut families: BTreeMap<&str, Vec<&Category>> = BTreeMap::new();
        for category in &self.categories {
            families.entry(category.family.as_str()).or_default().push(category);
        }
        families
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}
