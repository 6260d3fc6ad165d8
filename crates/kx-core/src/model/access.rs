use serde::{Deserialize, Serialize};

/// Access grant tier. Ordered: `Existence < Read < ReadWrite < Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessTier {
    Existence,
    Read,
    ReadWrite,
    Admin,
}

/// `(notebook, author) -> tier`. The notebook owner is implicitly `Admin`
/// and need not have a row here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessGrant {
    pub notebook_id: crate::ids::NotebookId,
    pub author_id: crate::ids::AuthorId,
    pub tier: AccessTier,
}
