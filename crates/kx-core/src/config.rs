//! Per-subsystem configuration structs aggregated into one [`KxConfig`],
//! loaded from TOML with `serde(default)` filling in documented defaults
//! for anything the deployment's config file omits.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `ConnectionStrings:Notebook` — path to the SQLite database file, or
    /// `:memory:` for ephemeral/test deployments.
    pub connection_string: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            connection_string: "notebook.sqlite3".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// `Auth:PublicKey` — base64 SPKI-encoded Ed25519 public key used to
    /// verify bearer tokens.
    pub public_key_base64: String,
    /// `Auth:AllowDevIdentity` — allow the `X-Author-Id` header fallback.
    pub allow_dev_identity: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            public_key_base64: String::new(),
            allow_dev_identity: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// `Jobs:DefaultTimeoutSeconds`
    pub default_timeout_seconds: i64,
    pub default_max_retries: u32,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            default_timeout_seconds: 120,
            default_max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// `Pipeline:SemanticTopK`
    pub semantic_top_k: usize,
    /// Minimum cosine similarity for a peer to be considered for
    /// `COMPARE_CLAIMS` at all.
    pub semantic_min_similarity: f64,
    /// `Pipeline:SimilarityThresholds:integrate` (T_int).
    pub integration_threshold: f64,
    /// `Pipeline:SimilarityThresholds:low` (T_low).
    pub low_similarity_threshold: f64,
    /// `Pipeline:SimilarityThresholds:friction` (T_fric).
    pub friction_threshold: f64,
    /// Whether `EMBED_MIRRORED` rows participate in `COMPARE_CLAIMS`
    /// candidate selection alongside native embeddings (Open Question,
    /// resolved in DESIGN.md: default on).
    pub include_mirrored_in_compare: bool,
    /// Whether retroactive friction recompute on peers is performed
    /// (Open Question, resolved in DESIGN.md: default on, bounded).
    pub retroactive_propagation_enabled: bool,
    pub retroactive_queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            semantic_top_k: 5,
            semantic_min_similarity: 0.5,
            integration_threshold: 0.75,
            low_similarity_threshold: 0.35,
            friction_threshold: 0.6,
            include_mirrored_in_compare: true,
            retroactive_propagation_enabled: true,
            retroactive_queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FragmenterConfig {
    /// `Fragmenter:TokenBudget`, approximated as `token_budget * 4` chars.
    pub token_budget: usize,
}

impl Default for FragmenterConfig {
    fn default() -> Self {
        Self { token_budget: 4000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// `Review:FrictionThreshold` — default for `Notebook::review_threshold`.
    pub friction_threshold: f64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            friction_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// `Subscriptions:PollIntervalSeconds` — default when a subscription
    /// does not specify its own interval.
    pub default_poll_interval_seconds: u32,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            default_poll_interval_seconds: 30,
        }
    }
}

/// Top-level configuration aggregating all subsystem configs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct KxConfig {
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub jobs: JobsConfig,
    pub pipeline: PipelineConfig,
    pub fragmenter: FragmenterConfig,
    pub review: ReviewConfig,
    pub subscriptions: SubscriptionConfig,
}

impl KxConfig {
    /// Load config from a TOML string, falling back to defaults for any
    /// field the source omits.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_falls_back_to_defaults() {
        let cfg = KxConfig::from_toml("").unwrap();
        assert_eq!(cfg.pipeline.semantic_top_k, 5);
        assert_eq!(cfg.review.friction_threshold, 0.7);
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let cfg = KxConfig::from_toml(
            r#"
            [pipeline]
            semantic_top_k = 8
            "#,
        )
        .unwrap();
        assert_eq!(cfg.pipeline.semantic_top_k, 8);
        assert_eq!(cfg.pipeline.friction_threshold, 0.6);
    }
}
