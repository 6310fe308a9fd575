//! simplr-core: task ordering, grouping and query caching for Simplr
//!
//! The same engine backs the main list views and the companion surface, so
//! both render an identical order from an identical snapshot.

pub mod cache;
pub mod error;
pub mod grouping;
pub mod hierarchy;
pub mod query;
pub mod sort;
pub mod source;
pub mod task;
pub mod time;

pub use cache::{
    CacheConfig, CacheManager, CacheStats, Clock, ManualClock, MemoryPressure, Namespace,
    NamespaceLimits, NamespaceStats, SystemClock,
};
pub use error::{QueryError, Result};
pub use grouping::{flatten, group, TaskGroup};
pub use hierarchy::{CategoryHierarchy, HierarchyLevel};
pub use query::{CachedResult, CompanionView, Fingerprint, Mutation, MutationKind, QueryFacade, TaskFilter};
pub use sort::{SortEngine, SortOption};
pub use source::{
    load_sort_option, save_sort_option, MemoryPreferences, PreferenceStore, TaskSnapshot,
    TaskSource, SORT_OPTION_KEY,
};
pub use task::{Category, Task};
pub use time::{format_local, parse_local_due_to_utc, resolve_zone};

/// Number of rows the companion surface renders.
pub const COMPANION_LIMIT: usize = 3;
