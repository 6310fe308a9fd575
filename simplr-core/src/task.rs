//! Task and category records as the engine sees them.
//!
//! The external store owns these; the engine only reads them. Everything here
//! stays small + serializable so the same snapshot can be handed to the
//! companion process unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single to-do item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Stable, unique identifier. Final tie-break for every ordering.
    pub id: String,
    pub title: String,

    /// Optional hard due time (UTC).
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,

    /// Optional reminder time (UTC). Not used for ordering.
    #[serde(default)]
    pub reminder: Option<DateTime<Utc>>,

    #[serde(default)]
    pub completed: bool,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub category_id: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            due: None,
            reminder: None,
            completed: false,
            completed_at: None,
            created_at,
            category_id: None,
        }
    }

    pub fn with_due(mut self, due: DateTime<Utc>) -> Self {
        self.due = Some(due);
        self
    }

    pub fn with_reminder(mut self, reminder: DateTime<Utc>) -> Self {
        self.reminder = Some(reminder);
        self
    }

    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn mark_completed(mut self, at: DateTime<Utc>) -> Self {
        self.completed = true;
        self.completed_at = Some(at);
        self
    }

    /// Due in the past and not completed.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.completed && self.due.is_some_and(|due| due < now)
    }

    /// Due in the future and not completed.
    pub fn is_pending(&self, now: DateTime<Utc>) -> bool {
        !self.completed && self.due.is_some_and(|due| due > now)
    }
}

/// A user category. Renames arrive as a new value with a bumped snapshot version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    /// Declared hierarchy name, e.g. "urgent". Resolved to a rank by
    /// [`crate::hierarchy::CategoryHierarchy`].
    pub hierarchy: String,
}

impl Category {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        hierarchy: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            hierarchy: hierarchy.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn overdue_requires_past_due_and_open() {
        let t = Task::new("t1", "file taxes", now() - Duration::days(3))
            .with_due(now() - Duration::hours(1));
        assert!(t.is_overdue(now()));
        assert!(!t.is_pending(now()));

        let done = t.clone().mark_completed(now());
        assert!(!done.is_overdue(now()));
    }

    #[test]
    fn pending_requires_future_due() {
        let t = Task::new("t2", "dentist", now()).with_due(now() + Duration::days(1));
        assert!(t.is_pending(now()));
        assert!(!t.is_overdue(now()));

        let undated = Task::new("t3", "someday", now());
        assert!(!undated.is_pending(now()));
        assert!(!undated.is_overdue(now()));
    }

    #[test]
    fn task_json_defaults_optional_fields() {
        let json = r#"{"id":"a","title":"x","created_at":"2026-03-01T12:00:00Z"}"#;
        let t: Task = serde_json::from_str(json).unwrap();
        assert_eq!(t.id, "a");
        assert!(t.due.is_none());
        assert!(!t.completed);
        assert!(t.category_id.is_none());
    }
}
