//! Category hierarchy: maps a category (or its absence) to a rank.
//!
//! Lower rank = higher in the list. The rank is the primary grouping key and
//! dominates every sort policy.

use serde::{Deserialize, Serialize};

use crate::task::Category;

/// Closed set of hierarchy levels a category can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HierarchyLevel {
    Urgent,
    Important,
    Work,
    Personal,
    Health,
    Shopping,
    Uncategorized,
}

impl HierarchyLevel {
    /// Default ordering, highest to lowest.
    pub const STANDARD: [HierarchyLevel; 7] = [
        HierarchyLevel::Urgent,
        HierarchyLevel::Important,
        HierarchyLevel::Work,
        HierarchyLevel::Personal,
        HierarchyLevel::Health,
        HierarchyLevel::Shopping,
        HierarchyLevel::Uncategorized,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            HierarchyLevel::Urgent => "urgent",
            HierarchyLevel::Important => "important",
            HierarchyLevel::Work => "work",
            HierarchyLevel::Personal => "personal",
            HierarchyLevel::Health => "health",
            HierarchyLevel::Shopping => "shopping",
            HierarchyLevel::Uncategorized => "uncategorized",
        }
    }

    /// Case-insensitive lookup of a declared hierarchy name.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::STANDARD
            .into_iter()
            .find(|level| level.name().eq_ignore_ascii_case(name))
    }
}

/// Resolves categories to ranks against a fixed level order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryHierarchy {
    levels: Vec<HierarchyLevel>,
}

impl Default for CategoryHierarchy {
    fn default() -> Self {
        Self::standard()
    }
}

impl CategoryHierarchy {
    pub fn standard() -> Self {
        Self {
            levels: HierarchyLevel::STANDARD.to_vec(),
        }
    }

    /// Custom order. Duplicates are dropped and `Uncategorized` is forced to the end.
    pub fn with_levels(levels: impl IntoIterator<Item = HierarchyLevel>) -> Self {
        let mut out: Vec<HierarchyLevel> = Vec::new();
        for level in levels {
            if level != HierarchyLevel::Uncategorized && !out.contains(&level) {
                out.push(level);
            }
        }
        out.push(HierarchyLevel::Uncategorized);
        Self { levels: out }
    }

    pub fn levels(&self) -> &[HierarchyLevel] {
        &self.levels
    }

    /// Rank of a category.
    ///
    /// - absent category: position of `Uncategorized`
    /// - hierarchy name not in the list: list length, i.e. one below `Uncategorized`
    pub fn rank(&self, category: Option<&Category>) -> usize {
        let Some(category) = category else {
            return self.position(HierarchyLevel::Uncategorized);
        };

        HierarchyLevel::from_name(&category.hierarchy)
            .and_then(|level| self.levels.iter().position(|l| *l == level))
            .unwrap_or(self.levels.len())
    }

    /// A category is urgent when it resolves to the top rank.
    pub fn is_urgent(&self, category: Option<&Category>) -> bool {
        self.rank(category) == 0
    }

    fn position(&self, level: HierarchyLevel) -> usize {
        self.levels
            .iter()
            .position(|l| *l == level)
            .unwrap_or(self.levels.len())
    }
}
