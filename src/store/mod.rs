//! Local customization store
//!
//! Durable key/value persistence for operator customization: row ordering,
//! collapsed and selected rows, and filter state. Reads never fail: missing
//! or corrupt values fall back to the caller's default.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::reconcile::FilterState;
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

pub const ORDERING_KEY: &str = "fleetdeck.ordering";
pub const COLLAPSED_KEY: &str = "fleetdeck.collapsed";
pub const SELECTED_KEY: &str = "fleetdeck.selected";
pub const FILTERS_KEY: &str = "fleetdeck.filters";

/// Raw string storage backend
pub trait DurableStore: Send {
    fn get_raw(&self, key: &str) -> Result<Option<String>>;

    fn set_raw(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    fn backend_name(&self) -> &'static str;
}

/// In-memory backend; nothing survives the process
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_data<T>(&self, f: impl FnOnce(&mut HashMap<String, String>) -> T) -> Result<T> {
        let mut data = self
            .data
            .lock()
            .map_err(|_| crate::FleetError::Io(std::io::Error::other("memory store lock poisoned")))?;
        Ok(f(&mut data))
    }
}

impl DurableStore for MemoryStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        self.with_data(|data| data.get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        self.with_data(|data| {
            data.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with_data(|data| {
            data.remove(key);
        })
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Typed customization accessors on top of a [`DurableStore`]
pub struct CustomizationStore<S: DurableStore> {
    backend: S,
}

impl<S: DurableStore> CustomizationStore<S> {
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Read a JSON value, returning `default` when missing or unreadable
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let raw = match self.backend.get_raw(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return default,
            Err(e) => {
                tracing::warn!("Reading '{}' from {} failed, using default: {}", key, self.backend.backend_name(), e);
                return default;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Stored value for '{}' is corrupt, using default: {}", key, e);
                default
            }
        }
    }

    /// Write a JSON value through; failures are logged, never raised
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let result = serde_json::to_string(value)
            .map_err(crate::FleetError::from)
            .and_then(|json| self.backend.set_raw(key, &json));
        if let Err(e) = result {
            tracing::warn!("Persisting '{}' failed: {}", key, e);
        }
    }

    pub fn remove(&self, key: &str) {
        if let Err(e) = self.backend.remove(key) {
            tracing::warn!("Removing '{}' failed: {}", key, e);
        }
    }

    /// Persisted ordering with duplicates dropped (first occurrence wins)
    pub fn load_ordering(&self) -> Vec<String> {
        let stored: Vec<String> = self.get(ORDERING_KEY, Vec::new());
        let mut seen = HashSet::new();
        stored.into_iter().filter(|id| seen.insert(id.clone())).collect()
    }

    pub fn save_ordering(&self, ordering: &[String]) {
        self.set(ORDERING_KEY, ordering);
    }

    pub fn load_collapsed(&self) -> BTreeSet<String> {
        self.get(COLLAPSED_KEY, BTreeSet::new())
    }

    pub fn save_collapsed(&self, collapsed: &BTreeSet<String>) {
        self.set(COLLAPSED_KEY, collapsed);
    }

    pub fn load_selected(&self) -> BTreeSet<String> {
        self.get(SELECTED_KEY, BTreeSet::new())
    }

    pub fn save_selected(&self, selected: &BTreeSet<String>) {
        self.set(SELECTED_KEY, selected);
    }

    pub fn load_filters(&self) -> FilterState {
        self.get(FILTERS_KEY, FilterState::default())
    }

    pub fn save_filters(&self, filters: &FilterState) {
        self.set(FILTERS_KEY, filters);
    }

    /// Drop every customization key
    pub fn clear(&self) {
        for key in [ORDERING_KEY, COLLAPSED_KEY, SELECTED_KEY, FILTERS_KEY] {
            self.remove(key);
        }
    }
}
