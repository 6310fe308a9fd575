//! QueryFacade, the public entry point for list views and the companion surface.
//!
//! Every call derives its cache key from one fingerprint scheme:
//!
//! `v{version}|filter={filter}|sort={sort}|grouped={0|1}`
//!
//! so a single version bump from the store makes every dependent entry
//! unreachable. `apply_mutation` then purges every other generation.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheConfig, CacheManager, CacheStats, MemoryPressure, Namespace};
use crate::error::{QueryError, Result};
use crate::grouping::{self, TaskGroup};
use crate::hierarchy::CategoryHierarchy;
use crate::sort::{SortEngine, SortOption};
use crate::source::{load_sort_option, PreferenceStore, TaskSnapshot, TaskSource};
use crate::task::Task;

/// Closed set of predicates a list or count can be restricted to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskFilter {
    All,
    Active,
    Completed,
    Overdue,
    Pending,
    Urgent,
    /// Tasks with no resolvable category.
    Uncategorized,
    Category(String),
}

impl TaskFilter {
    pub fn matches(&self, task: &Task, engine: &SortEngine<'_>) -> bool {
        match self {
            TaskFilter::All => true,
            TaskFilter::Active => !task.completed,
            TaskFilter::Completed => task.completed,
            TaskFilter::Overdue => task.is_overdue(engine.now()),
            TaskFilter::Pending => task.is_pending(engine.now()),
            TaskFilter::Urgent => engine.is_urgent(task),
            TaskFilter::Uncategorized => engine.category_of(task).is_none(),
            TaskFilter::Category(id) => engine.category_of(task).is_some_and(|c| &c.id == id),
        }
    }
}

impl fmt::Display for TaskFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFilter::All => f.write_str("all"),
            TaskFilter::Active => f.write_str("active"),
            TaskFilter::Completed => f.write_str("completed"),
            TaskFilter::Overdue => f.write_str("overdue"),
            TaskFilter::Pending => f.write_str("pending"),
            TaskFilter::Urgent => f.write_str("urgent"),
            TaskFilter::Uncategorized => f.write_str("uncategorized"),
            TaskFilter::Category(id) => write!(f, "category:{id}"),
        }
    }
}

impl FromStr for TaskFilter {
    type Err = QueryError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let filter = match s {
            "all" => TaskFilter::All,
            "active" => TaskFilter::Active,
            "completed" => TaskFilter::Completed,
            "overdue" => TaskFilter::Overdue,
            "pending" => TaskFilter::Pending,
            "urgent" => TaskFilter::Urgent,
            "uncategorized" => TaskFilter::Uncategorized,
            _ => match s.strip_prefix("category:") {
                Some(id) if !id.is_empty() => TaskFilter::Category(id.to_string()),
                _ => return Err(QueryError::UnknownFilter(s.to_string())),
            },
        };
        Ok(filter)
    }
}

/// Deterministic cache key for one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint<'a> {
    pub version: u64,
    pub filter: &'a TaskFilter,
    pub sort: Option<SortOption>,
    pub grouped: bool,
}

impl Fingerprint<'_> {
    /// Snapshot version encoded in a fingerprint string.
    pub fn version_of(key: &str) -> Option<u64> {
        key.strip_prefix('v')?.split('|').next()?.parse().ok()
    }
}

impl fmt::Display for Fingerprint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sort = self.sort.map_or("-", |s| s.token());
        write!(
            f,
            "v{}|filter={}|sort={}|grouped={}",
            self.version,
            self.filter,
            sort,
            u8::from(self.grouped)
        )
    }
}

/// What the store just did. Drives cache purges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    TaskAdded,
    TaskEdited,
    TaskDeleted,
    CompletionToggled,
    CategoryChanged,
    /// Another process changed the store; only the new version is known.
    SnapshotReloaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    pub kind: MutationKind,
    /// Store version after the mutation was committed.
    pub version: u64,
}

/// Values held by the facade's cache, one variant per namespace.
#[derive(Debug, Clone)]
pub enum CachedResult {
    Groups(Arc<Vec<TaskGroup>>),
    Tasks(Arc<Vec<Task>>),
    Count(usize),
}

impl CachedResult {
    fn weight(&self) -> usize {
        match self {
            CachedResult::Groups(groups) => {
                groups.iter().map(|g| g.len() + 1).sum::<usize>().max(1)
            }
            CachedResult::Tasks(tasks) => tasks.len().max(1),
            CachedResult::Count(_) => 1,
        }
    }
}

/// What one companion refresh read and produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanionView {
    /// Store version the rows were computed from.
    pub version: u64,
    pub sort: SortOption,
    pub rows: Vec<Task>,
}

/// Cache-wrapped grouping/sorting for one process.
///
/// Construct once at startup and pass by reference; there is no global instance.
#[derive(Debug)]
pub struct QueryFacade {
    hierarchy: CategoryHierarchy,
    cache: CacheManager<CachedResult>,
}

impl Default for QueryFacade {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl QueryFacade {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_cache(CategoryHierarchy::standard(), CacheManager::new(config))
    }

    pub fn with_cache(hierarchy: CategoryHierarchy, cache: CacheManager<CachedResult>) -> Self {
        Self {
            hierarchy,
            cache: cache.with_weigher(CachedResult::weight),
        }
    }

    pub fn hierarchy(&self) -> &CategoryHierarchy {
        &self.hierarchy
    }

    /// All tasks, grouped by category in hierarchy order.
    pub fn ordered_groups(&self, snapshot: &TaskSnapshot, option: SortOption) -> Vec<TaskGroup> {
        self.groups(snapshot, &TaskFilter::All, option).to_vec()
    }

    /// Grouped tasks restricted to `filter`.
    pub fn ordered_groups_where(
        &self,
        snapshot: &TaskSnapshot,
        filter: &TaskFilter,
        option: SortOption,
    ) -> Vec<TaskGroup> {
        self.groups(snapshot, filter, option).to_vec()
    }

    /// Head of the flattened `ordered_groups` ordering.
    pub fn flattened_top(
        &self,
        snapshot: &TaskSnapshot,
        option: SortOption,
        limit: usize,
    ) -> Vec<Task> {
        self.groups(snapshot, &TaskFilter::All, option)
            .iter()
            .flat_map(|g| g.tasks.iter())
            .take(limit)
            .cloned()
            .collect()
    }

    /// Number of tasks matching `filter`.
    pub fn aggregate_count(&self, snapshot: &TaskSnapshot, filter: &TaskFilter) -> usize {
        let key = Fingerprint {
            version: snapshot.version,
            filter,
            sort: None,
            grouped: false,
        }
        .to_string();

        let compute = || {
            let engine = self.engine(snapshot);
            snapshot
                .tasks
                .iter()
                .filter(|t| filter.matches(t, &engine))
                .count()
        };

        match self
            .cache
            .get_with(Namespace::Aggregates, &key, || CachedResult::Count(compute()))
        {
            CachedResult::Count(n) => n,
            other => mismatch(&key, &other, compute),
        }
    }

    /// Ordered tasks of one category; `None` selects tasks without a resolvable category.
    pub fn category_tasks(
        &self,
        snapshot: &TaskSnapshot,
        category_id: Option<&str>,
        option: SortOption,
    ) -> Vec<Task> {
        let filter = match category_id {
            Some(id) => TaskFilter::Category(id.to_string()),
            None => TaskFilter::Uncategorized,
        };
        let key = Fingerprint {
            version: snapshot.version,
            filter: &filter,
            sort: Some(option),
            grouped: false,
        }
        .to_string();

        let compute = || {
            let engine = self.engine(snapshot);
            let mut tasks: Vec<Task> = snapshot
                .tasks
                .iter()
                .filter(|t| filter.matches(t, &engine))
                .cloned()
                .collect();
            engine.sort(&mut tasks, option);
            Arc::new(tasks)
        };

        match self
            .cache
            .get_with(Namespace::CategoryLists, &key, || CachedResult::Tasks(compute()))
        {
            CachedResult::Tasks(tasks) => tasks.to_vec(),
            other => mismatch(&key, &other, compute).to_vec(),
        }
    }

    /// Companion refresh: read the shared snapshot and sort token, return the head.
    pub fn companion_view<S, P>(&self, source: &S, prefs: &P, limit: usize) -> Result<CompanionView>
    where
        S: TaskSource + ?Sized,
        P: PreferenceStore + ?Sized,
    {
        let snapshot = source.snapshot()?;
        let sort = load_sort_option(prefs);
        Ok(CompanionView {
            version: snapshot.version,
            sort,
            rows: self.flattened_top(&snapshot, sort, limit),
        })
    }

    /// Purge entries fingerprinted with any version other than the mutation's.
    /// Newer ones go too: a store that was reset may hand out lower versions.
    /// Returns how many entries were removed.
    pub fn apply_mutation(&self, mutation: Mutation) -> usize {
        let stale = |key: &str| Fingerprint::version_of(key) != Some(mutation.version);
        let removed: usize = Namespace::ALL
            .into_iter()
            .map(|ns| self.cache.invalidate_where(ns, stale))
            .sum();
        tracing::debug!(kind = ?mutation.kind, version = mutation.version, removed, "applied mutation");
        removed
    }

    pub fn report_memory_pressure(&self, tier: MemoryPressure) -> usize {
        self.cache.report_memory_pressure(tier)
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn engine<'a>(&'a self, snapshot: &'a TaskSnapshot) -> SortEngine<'a> {
        SortEngine::new(&self.hierarchy, &snapshot.categories, snapshot.taken_at)
    }

    fn groups(
        &self,
        snapshot: &TaskSnapshot,
        filter: &TaskFilter,
        option: SortOption,
    ) -> Arc<Vec<TaskGroup>> {
        let key = Fingerprint {
            version: snapshot.version,
            filter,
            sort: Some(option),
            grouped: true,
        }
        .to_string();

        let compute = || {
            let engine = self.engine(snapshot);
            let matching = snapshot.tasks.iter().filter(|t| filter.matches(t, &engine));
            Arc::new(grouping::group(matching, &engine, option))
        };

        match self
            .cache
            .get_with(Namespace::FilteredLists, &key, || CachedResult::Groups(compute()))
        {
            CachedResult::Groups(groups) => groups,
            other => mismatch(&key, &other, compute),
        }
    }
}

// Keys are namespaced per call site, so a foreign variant means a key collision.
// Serve a fresh uncached value rather than a wrong one.
fn mismatch<T>(key: &str, found: &CachedResult, compute: impl FnOnce() -> T) -> T {
    tracing::error!(key, ?found, "cached value has unexpected shape, recomputing");
    compute()
}
