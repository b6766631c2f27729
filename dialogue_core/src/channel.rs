//! Ordered chunk handoff between the generation worker and the request side.
//!
//! Single producer, single consumer, one channel per request. The queue is
//! unbounded: production and consumption run concurrently, so memory is the
//! only limit and the producer never blocks on a slow reader.
//!
//! State transitions (`Open -> Closed` / `Open -> Failed`) are atomic with
//! respect to concurrent pushes: the sender slot lives behind a mutex, so a
//! push can never be accepted after the terminal transition, and dropping
//! the sender inside the same critical section guarantees the consumer sees
//! the final end-of-stream signal.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::chunk::AudioChunk;
use crate::error::ChannelClosed;

/// Producer-side view of the channel state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelState {
    Open,
    Closed,
    Failed(String),
}

struct Shared {
    // `None` once the channel reached a terminal state.
    tx: Option<mpsc::UnboundedSender<AudioChunk>>,
    state: ChannelState,
    next_seq: u64,
}

/// Producer half. Not `Clone`: one worker per channel.
pub struct ChunkSender {
    shared: Arc<Mutex<Shared>>,
}

/// Consumer half.
pub struct ChunkReceiver {
    rx: mpsc::UnboundedReceiver<AudioChunk>,
    shared: Arc<Mutex<Shared>>,
}

/// Outcome of a single `pull`.
#[derive(Debug)]
pub enum Pull {
    Chunk(AudioChunk),
    /// Producer finished normally; no further chunks will arrive.
    Closed,
    /// Producer reported an error; no further chunks will arrive.
    Failed(String),
    /// Nothing arrived within the caller's wait window; the channel may
    /// still be open.
    TimedOut,
}

/// Create a fresh channel for one generation request.
pub fn channel() -> (ChunkSender, ChunkReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Mutex::new(Shared {
        tx: Some(tx),
        state: ChannelState::Open,
        next_seq: 0,
    }));
    (
        ChunkSender {
            shared: shared.clone(),
        },
        ChunkReceiver { rx, shared },
    )
}

impl ChunkSender {
    /// Push one chunk, stamping its arrival order. Fails once the channel
    /// left the `Open` state.
    pub fn push(&self, mut chunk: AudioChunk) -> Result<(), ChannelClosed> {
        let mut shared = self.shared.lock().expect("channel lock poisoned");
        match shared.tx {
            Some(ref tx) => {
                chunk.set_seq(shared.next_seq);
                // Receiver alive or not, order is stamped either way; a
                // dropped receiver just means the audio is discarded.
                if tx.send(chunk).is_err() {
                    return Err(ChannelClosed);
                }
                shared.next_seq += 1;
                Ok(())
            }
            None => Err(ChannelClosed),
        }
    }

    /// Mark normal completion. Idempotent; a no-op after `fail`.
    pub fn close(&self) {
        let mut shared = self.shared.lock().expect("channel lock poisoned");
        if shared.state == ChannelState::Open {
            shared.state = ChannelState::Closed;
            shared.tx = None;
        }
    }

    /// Mark failure with a reason. Idempotent; a no-op after `close`.
    pub fn fail(&self, reason: impl Into<String>) {
        let mut shared = self.shared.lock().expect("channel lock poisoned");
        if shared.state == ChannelState::Open {
            shared.state = ChannelState::Failed(reason.into());
            shared.tx = None;
        }
    }
}

impl Drop for ChunkSender {
    fn drop(&mut self) {
        // A worker that panicked before signalling must not leave the
        // consumer waiting on an open channel forever.
        let mut shared = self.shared.lock().expect("channel lock poisoned");
        if shared.state == ChannelState::Open {
            shared.state = ChannelState::Failed("producer dropped without closing".to_string());
            shared.tx = None;
        }
    }
}

impl ChunkReceiver {
    /// Wait up to `timeout` for the next chunk. Distinguishes a quiet-but-
    /// open channel (`TimedOut`) from the two terminal states.
    pub async fn pull(&mut self, timeout: Duration) -> Pull {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(chunk)) => Pull::Chunk(chunk),
            Ok(None) => match self.state() {
                ChannelState::Failed(reason) => Pull::Failed(reason),
                // `Closed` is the only other way the sender disappears.
                _ => Pull::Closed,
            },
            Err(_) => Pull::TimedOut,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.shared.lock().expect("channel lock poisoned").state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(samples: &[f32]) -> AudioChunk {
        AudioChunk::from_f32(samples.to_vec())
    }

    #[tokio::test]
    async fn test_push_then_pull_preserves_order() {
        let (tx, mut rx) = channel();
        tx.push(chunk(&[0.1])).unwrap();
        tx.push(chunk(&[0.2])).unwrap();
        tx.push(chunk(&[0.3])).unwrap();
        tx.close();

        let mut seen = Vec::new();
        loop {
            match rx.pull(Duration::from_millis(100)).await {
                Pull::Chunk(c) => {
                    assert_eq!(c.seq(), seen.len() as u64);
                    seen.push(c.samples()[0]);
                }
                Pull::Closed => break,
                other => panic!("unexpected pull outcome: {other:?}"),
            }
        }
        assert_eq!(seen, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_push_after_close_rejected() {
        let (tx, _rx) = channel();
        tx.push(chunk(&[0.1])).unwrap();
        tx.close();
        assert!(tx.push(chunk(&[0.2])).is_err());
    }

    #[tokio::test]
    async fn test_fail_reason_reaches_consumer() {
        let (tx, mut rx) = channel();
        tx.push(chunk(&[0.1])).unwrap();
        tx.fail("cuda out of memory");

        // The buffered chunk is still delivered before the terminal signal.
        assert!(matches!(
            rx.pull(Duration::from_millis(100)).await,
            Pull::Chunk(_)
        ));
        match rx.pull(Duration::from_millis(100)).await {
            Pull::Failed(reason) => assert_eq!(reason, "cuda out of memory"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_final() {
        let (tx, mut rx) = channel();
        tx.close();
        tx.close();
        tx.fail("too late");
        assert!(matches!(
            rx.pull(Duration::from_millis(50)).await,
            Pull::Closed
        ));
        assert_eq!(rx.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn test_pull_times_out_while_open() {
        let (tx, mut rx) = channel();
        assert!(matches!(
            rx.pull(Duration::from_millis(20)).await,
            Pull::TimedOut
        ));
        assert_eq!(rx.state(), ChannelState::Open);
        drop(tx);
    }

    #[tokio::test]
    async fn test_dropped_producer_reports_failure() {
        let (tx, mut rx) = channel();
        drop(tx);
        assert!(matches!(
            rx.pull(Duration::from_millis(50)).await,
            Pull::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_produce_and_drain() {
        let (tx, mut rx) = channel();
        let producer = tokio::task::spawn_blocking(move || {
            for i in 0..50 {
                tx.push(AudioChunk::from_f32(vec![i as f32])).unwrap();
                std::thread::sleep(Duration::from_micros(200));
            }
            tx.close();
        });

        let mut next = 0u64;
        loop {
            match rx.pull(Duration::from_secs(1)).await {
                Pull::Chunk(c) => {
                    assert_eq!(c.seq(), next);
                    next += 1;
                }
                Pull::Closed => break,
                other => panic!("unexpected pull outcome: {other:?}"),
            }
        }
        assert_eq!(next, 50);
        producer.await.unwrap();
    }
}
