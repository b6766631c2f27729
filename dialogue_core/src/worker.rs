//! Background generation worker.
//!
//! Runs the model on a dedicated blocking thread so the request-handling
//! side never blocks on inference, and owns the channel's terminal
//! transition: `close()` on success, `fail(reason)` on error, exactly once.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::error;

use crate::channel::ChunkSender;
use crate::model::{ChunkSink, ModelRequest, SpeechModel};

/// Handle to one in-flight generation.
pub struct GenerationWorker {
    handle: JoinHandle<()>,
}

impl GenerationWorker {
    /// Launch generation on a blocking thread. Returns immediately; chunks
    /// flow through the sender while the caller drains the other half.
    pub fn spawn(
        model: Arc<dyn SpeechModel>,
        request: ModelRequest,
        sender: ChunkSender,
    ) -> Self {
        let handle = tokio::task::spawn_blocking(move || {
            let sink = ChunkSink::new(&sender);
            match model.generate(&request, &sink) {
                Ok(()) => sender.close(),
                Err(e) => {
                    // Reported once through the channel; never retried.
                    error!("generation worker failed: {e:#}");
                    sender.fail(e.to_string());
                }
            }
        });
        Self { handle }
    }

    /// Wait for the worker thread to finish. The thread is never
    /// interrupted; a timed-out request simply stops waiting and lets the
    /// join happen in a background task.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            error!("generation worker panicked: {e}");
        }
    }
}
