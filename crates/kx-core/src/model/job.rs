use crate::ids::{EntryId, JobId, NotebookId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    DistillClaims,
    EmbedClaims,
    EmbedMirrored,
    CompareClaims,
    ClassifyTopic,
}

impl JobType {
    /// Baseline priority by type (spec.md §3 Job entity). Downstream types
    /// outrank upstream ones so the pipeline is depth-first (§4.D).
    pub fn baseline_priority(self) -> i32 {
        match self {
            JobType::EmbedClaims => 30,
            JobType::EmbedMirrored => 25,
            JobType::CompareClaims => 20,
            JobType::ClassifyTopic => 10,
            JobType::DistillClaims => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Tagged payload/result variants, one arm per job type, so the
/// orchestrator's schema is closed (Design Notes §9 — dynamic JSON payloads
/// abstract to a tagged variant with typed decoders at dispatch time).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    DistillClaims {
        entry_id: EntryId,
        context_claims: Vec<crate::model::ClaimRecord>,
    },
    EmbedClaims {
        entry_id: EntryId,
        claims: Vec<crate::model::ClaimRecord>,
    },
    EmbedMirrored {
        subscription_id: crate::ids::SubscriptionId,
        source_entry_id: EntryId,
        claims: Vec<crate::model::ClaimRecord>,
    },
    CompareClaims {
        entry_id: EntryId,
        compare_against_id: EntryId,
        claims_a: Vec<crate::model::ClaimRecord>,
        claims_b: Vec<crate::model::ClaimRecord>,
        discount_factor: Option<f64>,
        against_is_mirrored: bool,
    },
    ClassifyTopic {
        entry_id: EntryId,
        claims: Vec<crate::model::ClaimRecord>,
        available_topics: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobResult {
    DistillClaims {
        claims: Vec<crate::model::ClaimRecord>,
    },
    EmbedClaims {
        embedding: Vec<f32>,
    },
    EmbedMirrored {
        embedding: Vec<f32>,
    },
    CompareClaims {
        entropy: f64,
        friction: f64,
        contradictions: Vec<crate::model::Contradiction>,
    },
    ClassifyTopic {
        primary_topic: String,
        secondary_topics: Vec<String>,
        new_topic: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub notebook_id: NotebookId,
    pub job_type: JobType,
    pub status: JobStatus,
    pub payload: JobPayload,
    pub result: Option<JobResult>,
    pub error: Option<String>,
    pub created: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub timeout_seconds: i64,
    pub retry_count: u32,
    pub max_retries: u32,
    pub priority: i32,
}

impl Job {
    pub const DEFAULT_TIMEOUT_SECONDS: i64 = 120;
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
}
