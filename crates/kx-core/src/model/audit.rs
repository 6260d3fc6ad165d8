use crate::ids::{AuthorId, NotebookId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Append-only action log entry (§4.I). Every state-changing operation and
/// every access denial writes exactly one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub time: DateTime<Utc>,
    pub notebook_id: Option<NotebookId>,
    pub author: Option<AuthorId>,
    pub action: String,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub detail: serde_json::Value,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditRecord {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            time: Utc::now(),
            notebook_id: None,
            author: None,
            action: action.into(),
            target_type: None,
            target_id: None,
            detail: serde_json::Value::Null,
            ip: None,
            user_agent: None,
        }
    }

    pub fn notebook(mut self, id: NotebookId) -> Self {
        self.notebook_id = Some(id);
        self
    }

    pub fn author(mut self, id: AuthorId) -> Self {
        self.author = Some(id);
        self
    }

    pub fn target(mut self, target_type: impl Into<String>, target_id: impl Into<String>) -> Self {
        self.target_type = Some(target_type.into());
        self.target_id = Some(target_id.into());
        self
    }

    pub fn detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}
