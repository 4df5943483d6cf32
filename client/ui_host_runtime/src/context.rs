use crate::error::{Result, RuntimeError};
use std::collections::HashMap;
use tracing::debug;

pub const ROOT_KEY: &str = "root";
pub const SIDEBAR_KEY: &str = "sidebar";

/// Addressable host surfaces by key. `root` and `sidebar` always exist.
#[derive(Debug, Clone)]
pub struct ContextTree<S> {
    contexts: HashMap<String, S>,
}

impl<S> ContextTree<S> {
    pub fn new(root: S, sidebar: S) -> Self {
        let mut contexts = HashMap::new();
        contexts.insert(ROOT_KEY.to_string(), root);
        contexts.insert(SIDEBAR_KEY.to_string(), sidebar);
        Self { contexts }
    }

    /// An absent or empty key addresses `root`.
    pub fn resolve(&self, key: Option<&str>) -> Result<&S> {
        let key = normalize(key);
        self.contexts
            .get(key)
            .ok_or_else(|| RuntimeError::UnknownContext(key.to_string()))
    }

    pub fn insert(&mut self, key: &str, surface: S) {
        debug!(key, "saving context");
        self.contexts.insert(key.to_string(), surface);
    }

    /// Inserts one surface per key, index-aligned. Nothing is inserted when
    /// the counts differ.
    pub fn insert_all(&mut self, message: &'static str, keys: &[String], surfaces: Vec<S>) -> Result<()> {
        if keys.len() != surfaces.len() {
            return Err(RuntimeError::SlotMismatch {
                message,
                slots: surfaces.len(),
                keys: keys.len(),
            });
        }

        for (key, surface) in keys.iter().zip(surfaces) {
            self.insert(key, surface);
        }

        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.contexts.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn reset(&mut self, root: S, sidebar: S) {
        *self = Self::new(root, sidebar);
    }
}

fn normalize(key: Option<&str>) -> &str {
    match key {
        None | Some("") => ROOT_KEY,
        Some(key) => key,
    }
}
