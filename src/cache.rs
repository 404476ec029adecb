use std::sync::Arc;

use dashmap::DashMap;

use crate::models::CategoryWithSubcategories;

const CATEGORIES_KEY: &str = "categories";

/// Key-value cache for the category list. Owned by the application state and
/// injected into the category store; the only entry points are get, set and
/// an explicit invalidate. No TTL and no write-path eviction: categories are
/// effectively static reference data, refreshed by restart or by calling
/// `invalidate` by hand.
///
/// Concurrent first reads may both miss and both populate; DashMap insert is
/// last-write-wins, which is fine since both writers hold identical data.
#[derive(Clone, Default)]
pub struct CategoryCache {
    store: Arc<DashMap<String, Arc<Vec<CategoryWithSubcategories>>>>,
}

impl CategoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<Vec<CategoryWithSubcategories>>> {
        self.store.get(CATEGORIES_KEY).map(|e| e.value().clone())
    }

    pub fn set(&self, categories: Vec<CategoryWithSubcategories>) -> Arc<Vec<CategoryWithSubcategories>> {
        let value = Arc::new(categories);
        self.store.insert(CATEGORIES_KEY.to_string(), value.clone());
        value
    }

    pub fn invalidate(&self) {
        self.store.remove(CATEGORIES_KEY);
    }
}
