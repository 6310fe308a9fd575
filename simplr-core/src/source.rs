//! Seams to the collaborators that own the data: the task store and the
//! shared sort-preference slot.
//!
//! Both are pull-based. The main process and the companion process each read
//! the same persisted snapshot and token and run the same algorithm; nothing
//! else is shared between them.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::sort::SortOption;
use crate::task::{Category, Task};

/// Well-known slot holding the current [`SortOption`] token.
pub const SORT_OPTION_KEY: &str = "simplr.sortOption";

/// Point-in-time view of the task store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Monotonic marker; the store bumps it on every mutation.
    pub version: u64,
    pub tasks: Vec<Task>,
    pub categories: Vec<Category>,
    /// Reference instant for overdue/pending predicates.
    pub taken_at: DateTime<Utc>,
}

impl TaskSnapshot {
    pub fn new(
        version: u64,
        tasks: Vec<Task>,
        categories: Vec<Category>,
        taken_at: DateTime<Utc>,
    ) -> Self {
        Self {
            version,
            tasks,
            categories,
            taken_at,
        }
    }
}

/// Supplies the current task/category collections.
pub trait TaskSource {
    fn snapshot(&self) -> Result<TaskSnapshot>;
}

impl TaskSource for TaskSnapshot {
    fn snapshot(&self) -> Result<TaskSnapshot> {
        Ok(self.clone())
    }
}

/// String-valued key/value slots shared between processes.
pub trait PreferenceStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Read the persisted sort policy. Missing, unreadable or stale tokens all
/// resolve to `Priority`.
pub fn load_sort_option<P: PreferenceStore + ?Sized>(store: &P) -> SortOption {
    match store.get(SORT_OPTION_KEY) {
        Ok(Some(token)) => SortOption::from_token_lossy(&token),
        Ok(None) => SortOption::default(),
        Err(e) => {
            tracing::warn!(error = %e, "sort preference unreadable, using priority");
            SortOption::default()
        }
    }
}

pub fn save_sort_option<P: PreferenceStore + ?Sized>(store: &P, option: SortOption) -> Result<()> {
    store.set(SORT_OPTION_KEY, option.token())
}

/// In-process preference slots.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(slots.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
