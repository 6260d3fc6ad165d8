use std::sync::Arc;

use kx_browse::Browser;
use kx_browse::search::{Embedder, NullEmbedder};
use kx_core::config::KxConfig;
use kx_pipeline::Orchestrator;
use kx_queue::JobQueue;
use kx_storage::StorageEngine;
use kx_subscription::Manager as SubscriptionManager;
use kx_writer::Writer;

/// Everything a request handler needs, cheaply `Clone`d per request — every
/// field is already an `Arc`/`StorageEngine` handle, not owned state.
#[derive(Clone)]
pub struct AppState {
    pub engine: StorageEngine,
    pub config: Arc<KxConfig>,
    pub writer: Arc<Writer>,
    pub browser: Arc<Browser>,
    pub queue: Arc<JobQueue>,
    pub orchestrator: Arc<Orchestrator>,
    pub subscriptions: Arc<SubscriptionManager>,
    pub embedder: Arc<dyn Embedder>,
}

impl AppState {
    /// `JobQueue` is a thin handle over `engine`, so a fresh one is
    /// constructed per component here rather than shared — cheaper than
    /// threading one instance through every constructor and equivalent in
    /// behavior, since they all resolve to the same underlying connection.
    pub fn new(engine: StorageEngine, config: KxConfig) -> Self {
        let config = Arc::new(config);
        let queue = Arc::new(JobQueue::new(engine.clone()));
        let writer = Arc::new(Writer::new(
            engine.clone(),
            JobQueue::new(engine.clone()),
            config.fragmenter.clone(),
        ));
        let browser = Arc::new(Browser::new(engine.clone()));
        let orchestrator = Arc::new(Orchestrator::new(
            engine.clone(),
            JobQueue::new(engine.clone()),
            config.pipeline.clone(),
        ));
        let subscriptions = Arc::new(SubscriptionManager::new(engine.clone()));
        Self {
            engine,
            config,
            writer,
            browser,
            queue,
            orchestrator,
            subscriptions,
            embedder: Arc::new(NullEmbedder),
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }
}
