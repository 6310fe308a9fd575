//! Sort policies and the total-order comparator behind them.
//!
//! Every policy ends in an identifier tie-break, so the same inputs always
//! produce the same order no matter how they arrive. Cache determinism and
//! app/companion parity both depend on that.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::hierarchy::CategoryHierarchy;
use crate::task::{Category, Task};

/// User-selectable ordering policy.
///
/// Persisted as a stable string token shared with the companion process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOption {
    #[default]
    Priority,
    DueDate,
    CreationNewest,
    CreationOldest,
    Alphabetical,
}

impl SortOption {
    pub const ALL: [SortOption; 5] = [
        SortOption::Priority,
        SortOption::DueDate,
        SortOption::CreationNewest,
        SortOption::CreationOldest,
        SortOption::Alphabetical,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            SortOption::Priority => "priority",
            SortOption::DueDate => "dueDate",
            SortOption::CreationNewest => "creationNewest",
            SortOption::CreationOldest => "creationOldest",
            SortOption::Alphabetical => "alphabetical",
        }
    }

    /// Parse a persisted token, falling back to `Priority` for anything unknown.
    ///
    /// Stale tokens written by an older build must never break the list.
    pub fn from_token_lossy(token: &str) -> Self {
        match token.parse() {
            Ok(option) => option,
            Err(_) => {
                tracing::warn!(token, "unknown sort token, falling back to priority");
                SortOption::Priority
            }
        }
    }
}

impl fmt::Display for SortOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for SortOption {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        SortOption::ALL
            .into_iter()
            .find(|o| o.token() == s)
            .ok_or_else(|| QueryError::UnknownSortOption(s.to_string()))
    }
}

/// Comparator bound to one snapshot: category lookup, hierarchy and the
/// reference instant used for the overdue predicate.
#[derive(Debug, Clone)]
pub struct SortEngine<'a> {
    hierarchy: &'a CategoryHierarchy,
    categories: HashMap<&'a str, &'a Category>,
    now: DateTime<Utc>,
}

impl<'a> SortEngine<'a> {
    /// Duplicate category ids keep their first occurrence.
    pub fn new(
        hierarchy: &'a CategoryHierarchy,
        categories: &'a [Category],
        now: DateTime<Utc>,
    ) -> Self {
        let mut by_id: HashMap<&'a str, &'a Category> = HashMap::with_capacity(categories.len());
        for c in categories {
            by_id.entry(c.id.as_str()).or_insert(c);
        }
        Self {
            hierarchy,
            categories: by_id,
            now,
        }
    }

    pub fn hierarchy(&self) -> &'a CategoryHierarchy {
        self.hierarchy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Category record for a task. A dangling category id resolves to `None`.
    pub fn category_of(&self, task: &Task) -> Option<&'a Category> {
        task.category_id
            .as_deref()
            .and_then(|id| self.categories.get(id).copied())
    }

    pub fn is_urgent(&self, task: &Task) -> bool {
        self.hierarchy.is_urgent(self.category_of(task))
    }

    /// Strict total order between two tasks under `option`.
    pub fn compare(&self, a: &Task, b: &Task, option: SortOption) -> Ordering {
        let primary = match option {
            SortOption::Priority => self
                .is_urgent(b)
                .cmp(&self.is_urgent(a))
                .then_with(|| b.is_overdue(self.now).cmp(&a.is_overdue(self.now)))
                .then_with(|| due_ascending(a.due, b.due))
                .then_with(|| b.created_at.cmp(&a.created_at)),
            SortOption::DueDate => match (a.due, b.due) {
                (Some(da), Some(db)) => da.cmp(&db),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => b.created_at.cmp(&a.created_at),
            },
            SortOption::CreationNewest => b.created_at.cmp(&a.created_at),
            SortOption::CreationOldest => a.created_at.cmp(&b.created_at),
            SortOption::Alphabetical => caseless_cmp(&a.title, &b.title),
        };

        primary.then_with(|| a.id.cmp(&b.id))
    }

    /// Sort in place under `option`.
    pub fn sort(&self, tasks: &mut [Task], option: SortOption) {
        tasks.sort_by(|a, b| self.compare(a, b, option));
    }
}

// Dated before undated, then ascending.
fn due_ascending(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(da), Some(db)) => da.cmp(&db),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn caseless_cmp(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn categories() -> Vec<Category> {
        vec![
            Category::new("c-urgent", "Now", "urgent"),
            Category::new("c-home", "Home", "personal"),
        ]
    }

    fn ids(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn token_round_trip_for_every_option() {
        for option in SortOption::ALL {
            let parsed: SortOption = option.token().parse().unwrap();
            assert_eq!(parsed, option);

            let json = serde_json::to_string(&option).unwrap();
            assert_eq!(json, format!("\"{}\"", option.token()));
            let back: SortOption = serde_json::from_str(&json).unwrap();
            assert_eq!(back, option);
        }
    }

    #[test]
    fn unknown_token_falls_back_to_priority() {
        assert!("byMood".parse::<SortOption>().is_err());
        assert_eq!(SortOption::from_token_lossy("byMood"), SortOption::Priority);
        assert_eq!(SortOption::from_token_lossy(""), SortOption::Priority);
        assert_eq!(SortOption::from_token_lossy("dueDate"), SortOption::DueDate);
    }

    #[test]
    fn priority_puts_urgent_then_overdue_first() {
        let h = CategoryHierarchy::standard();
        let cats = categories();
        let engine = SortEngine::new(&h, &cats, now());

        let urgent = Task::new("a", "urgent later", now())
            .with_category("c-urgent")
            .with_due(now() + Duration::days(5));
        let overdue = Task::new("b", "overdue", now())
            .with_category("c-home")
            .with_due(now() - Duration::hours(2));
        let soon = Task::new("c", "due soon", now())
            .with_category("c-home")
            .with_due(now() + Duration::hours(1));
        let undated = Task::new("d", "whenever", now()).with_category("c-home");

        let mut tasks = vec![undated, soon, overdue, urgent];
        engine.sort(&mut tasks, SortOption::Priority);
        assert_eq!(ids(&tasks), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn priority_breaks_due_ties_by_newest_creation_then_id() {
        let h = CategoryHierarchy::standard();
        let cats = categories();
        let engine = SortEngine::new(&h, &cats, now());
        let due = now() + Duration::days(1);

        let older = Task::new("x", "older", now() - Duration::days(2)).with_due(due);
        let newer = Task::new("y", "newer", now() - Duration::days(1)).with_due(due);
        let twin = Task::new("w", "twin", now() - Duration::days(1)).with_due(due);

        let mut tasks = vec![older, newer, twin];
        engine.sort(&mut tasks, SortOption::Priority);
        assert_eq!(ids(&tasks), vec!["w", "y", "x"]);
    }

    #[test]
    fn due_date_orders_dated_before_undated() {
        let h = CategoryHierarchy::standard();
        let engine = SortEngine::new(&h, &[], now());

        let late = Task::new("late", "late", now()).with_due(now() + Duration::days(3));
        let early = Task::new("early", "early", now()).with_due(now() + Duration::days(1));
        let undated_old = Task::new("u-old", "u", now() - Duration::days(9));
        let undated_new = Task::new("u-new", "u", now() - Duration::days(1));

        let mut tasks = vec![undated_old, late, undated_new, early];
        engine.sort(&mut tasks, SortOption::DueDate);
        assert_eq!(ids(&tasks), vec!["early", "late", "u-new", "u-old"]);
    }

    #[test]
    fn creation_orders_are_mirrors() {
        let h = CategoryHierarchy::standard();
        let engine = SortEngine::new(&h, &[], now());

        let a = Task::new("a", "a", now() - Duration::days(2));
        let b = Task::new("b", "b", now() - Duration::days(1));

        let mut tasks = vec![a.clone(), b.clone()];
        engine.sort(&mut tasks, SortOption::CreationNewest);
        assert_eq!(ids(&tasks), vec!["b", "a"]);

        engine.sort(&mut tasks, SortOption::CreationOldest);
        assert_eq!(ids(&tasks), vec!["a", "b"]);
    }

    #[test]
    fn alphabetical_ignores_case_and_ties_on_id() {
        let h = CategoryHierarchy::standard();
        let engine = SortEngine::new(&h, &[], now());

        let mut tasks = vec![
            Task::new("3", "banana", now()),
            Task::new("2", "Apple", now()),
            Task::new("1", "apple", now()),
        ];
        engine.sort(&mut tasks, SortOption::Alphabetical);
        assert_eq!(ids(&tasks), vec!["1", "2", "3"]);
    }

    #[test]
    fn compare_is_antisymmetric_and_never_equal_for_distinct_ids() {
        let h = CategoryHierarchy::standard();
        let engine = SortEngine::new(&h, &[], now());
        let a = Task::new("a", "same", now());
        let b = Task::new("b", "same", now());

        for option in SortOption::ALL {
            assert_eq!(engine.compare(&a, &b, option), Ordering::Less);
            assert_eq!(engine.compare(&b, &a, option), Ordering::Greater);
        }
    }

    #[test]
    fn dangling_category_is_not_urgent() {
        let h = CategoryHierarchy::standard();
        let cats = categories();
        let engine = SortEngine::new(&h, &cats, now());
        let t = Task::new("t", "ghost", now()).with_category("deleted");
        assert!(engine.category_of(&t).is_none());
        assert!(!engine.is_urgent(&t));
    }
}
