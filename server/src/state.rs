use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tokio::sync::Semaphore;

use dialogue_core::{GenerationEngine, VoiceRegistry};

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<GenerationEngine>,
    pub voices: Arc<VoiceRegistry>,
    pub request_count: Arc<AtomicU64>,
    /// Bounds concurrent generation workers, abandoned ones included.
    pub generation_slots: Arc<Semaphore>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(
        engine: Arc<GenerationEngine>,
        voices: Arc<VoiceRegistry>,
        config: ServerConfig,
    ) -> Self {
        Self {
            engine,
            voices,
            request_count: Arc::new(AtomicU64::new(0)),
            generation_slots: Arc::new(Semaphore::new(config.max_concurrent_generations)),
            config,
        }
    }
}
