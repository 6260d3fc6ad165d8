//! Domain entities from the specification's data model. These are plain
//! structs decoupled from any storage row representation — repositories in
//! `kx-storage` translate between the two with targeted column updates,
//! never a whole-row read-modify-write.

mod access;
mod audit;
mod author;
mod entry;
mod job;
mod notebook;
mod review;
mod subscription;

pub use access::{AccessGrant, AccessTier};
pub use audit::AuditRecord;
pub use author::Author;
pub use entry::{
    ClaimRecord, ClaimsStatus, Comparison, Contradiction, Entry, IntegrationStatus, ReviewStatus,
};
pub use job::{Job, JobPayload, JobResult, JobStatus, JobType};
pub use notebook::{ClassificationLevel, Label, Notebook};
pub use review::EntryReview;
pub use subscription::{MirroredClaim, MirroredEntry, Subscription, SubscriptionScope, SyncStatus};
