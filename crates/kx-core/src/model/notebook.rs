use crate::ids::{AuthorId, NotebookId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The five-level classification lattice used by the access-control gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationLevel {
    Public,
    Internal,
    Confidential,
    Secret,
    TopSecret,
}

/// `(level, compartments)` — dominance is defined in the access-control
/// component: `A` dominates `B` iff `A.level >= B.level` and
/// `A.compartments` is a superset of `B.compartments`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub level: ClassificationLevel,
    pub compartments: BTreeSet<String>,
}

impl Label {
    pub fn new(level: ClassificationLevel, compartments: impl IntoIterator<Item = String>) -> Self {
        Self {
            level,
            compartments: compartments.into_iter().collect(),
        }
    }

    /// `self` dominates `other`.
    pub fn dominates(&self, other: &Label) -> bool {
        self.level >= other.level && other.compartments.is_subset(&self.compartments)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notebook {
    pub id: NotebookId,
    pub name: String,
    pub owner_author: AuthorId,
    pub created: DateTime<Utc>,
    /// Monotonic counter, strictly increasing on each entry insert.
    pub current_sequence: u64,
    pub classification_level: ClassificationLevel,
    pub compartments: BTreeSet<String>,
    /// Friction threshold above which an entry is flagged `needs_review`.
    pub review_threshold: f64,
}

impl Notebook {
    pub fn label(&self) -> Label {
        Label {
            level: self.classification_level,
            compartments: self.compartments.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(level: ClassificationLevel, comps: &[&str]) -> Label {
        Label::new(level, comps.iter().map(|s| s.to_string()))
    }

    #[test]
    fn higher_level_with_superset_compartments_dominates() {
        let a = label(ClassificationLevel::Secret, &["alpha", "bravo"]);
        let b = label(ClassificationLevel::Confidential, &["alpha"]);
        assert!(a.dominates(&b));
        assert!(!b.dominates(&a));
    }

    #[test]
    fn equal_level_missing_compartment_does_not_dominate() {
        let a = label(ClassificationLevel::Secret, &["alpha"]);
        let b = label(ClassificationLevel::Secret, &["alpha", "bravo"]);
        assert!(!a.dominates(&b));
    }

    #[test]
    fn same_label_dominates_itself() {
        let a = label(ClassificationLevel::Internal, &["x"]);
        assert!(a.dominates(&a));
    }
}
