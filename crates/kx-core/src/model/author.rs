use crate::ids::AuthorId;
use serde::{Deserialize, Serialize};

/// A writer's identity. Immutable once created; the id itself is the
/// content hash of the author's signing public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: AuthorId,
    pub public_key: Vec<u8>,
    pub trusted: bool,
}
