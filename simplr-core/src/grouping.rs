//! Grouping stage: category sections ordered by hierarchy, tasks ordered by policy.
//!
//! Two-level order:
//! 1) groups by hierarchy rank ASC, then category id ASC (absent-category bucket last on a tie)
//! 2) tasks inside a group by `SortEngine::compare`
//!
//! The hierarchy always wins over the sort policy: a task in a higher-ranked
//! category precedes every task in a lower-ranked one, whatever its due date.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::sort::{SortEngine, SortOption};
use crate::task::{Category, Task};

/// One rendered section: a category (or none) and its ordered tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskGroup {
    pub category: Option<Category>,
    pub tasks: Vec<Task>,
}

impl TaskGroup {
    pub fn category_id(&self) -> Option<&str> {
        self.category.as_ref().map(|c| c.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Partition `tasks` by category and order both levels.
///
/// Tasks whose category id does not resolve land in the absent-category bucket.
/// Empty partitions are never emitted.
pub fn group<'a, I>(tasks: I, engine: &SortEngine<'_>, option: SortOption) -> Vec<TaskGroup>
where
    I: IntoIterator<Item = &'a Task>,
{
    let mut buckets: HashMap<Option<&str>, (Option<&Category>, Vec<Task>)> = HashMap::new();
    for task in tasks {
        let category = engine.category_of(task);
        let key = category.map(|c| c.id.as_str());
        buckets
            .entry(key)
            .or_insert_with(|| (category, Vec::new()))
            .1
            .push(task.clone());
    }

    let hierarchy = engine.hierarchy();
    let mut ranked: Vec<(usize, Option<&Category>, Vec<Task>)> = buckets
        .into_values()
        .map(|(category, tasks)| (hierarchy.rank(category), category, tasks))
        .collect();

    ranked.sort_by(|(ra, ca, _), (rb, cb, _)| {
        ra.cmp(rb).then_with(|| match (ca, cb) {
            (Some(a), Some(b)) => a.id.cmp(&b.id),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
    });

    ranked
        .into_iter()
        .map(|(_, category, mut tasks)| {
            engine.sort(&mut tasks, option);
            TaskGroup {
                category: category.cloned(),
                tasks,
            }
        })
        .collect()
}

/// Concatenate groups, preserving order.
pub fn flatten(groups: &[TaskGroup]) -> Vec<Task> {
    groups.iter().flat_map(|g| g.tasks.iter().cloned()).collect()
}
