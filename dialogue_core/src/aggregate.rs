//! Chunk aggregation: drain the channel, keep arrival order, produce one
//! contiguous buffer.
//!
//! [`ChunkDrain`] exposes the drain step by step so the streaming endpoint
//! can emit per-chunk progress; [`collect`] is the one-shot wrapper used by
//! the request/response endpoints. Both share the same timeout layering:
//! a longer grace wait for the first chunk (worker startup is not a stall),
//! a per-pull timeout afterwards, and an overall deadline that turns a
//! still-open channel into `GenerateError::TimedOut`.

use std::time::{Duration, Instant};

use crate::channel::{ChunkReceiver, Pull};
use crate::error::GenerateError;

#[derive(Debug, Clone)]
pub struct CollectOptions {
    /// Grace window for the first pull, covering worker startup latency.
    pub first_chunk_wait: Duration,
    /// Wait per subsequent pull before re-checking the deadline.
    pub poll_timeout: Duration,
    /// Overall budget for the whole generation.
    pub deadline: Duration,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            first_chunk_wait: Duration::from_secs(10),
            poll_timeout: Duration::from_secs(5),
            deadline: Duration::from_secs(240),
        }
    }
}

/// Final assembled buffer plus the metadata derived from it.
#[derive(Debug, Clone)]
pub struct AssembledAudio {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AssembledAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// One observable drain step.
#[derive(Debug)]
pub enum DrainStep {
    /// A chunk arrived and was appended.
    Chunk { seq: u64, samples: usize },
    /// The channel closed normally; the buffer is complete.
    Complete,
}

/// Stepwise consumer for one generation's channel.
pub struct ChunkDrain {
    rx: ChunkReceiver,
    opts: CollectOptions,
    started: Instant,
    buffer: Vec<f32>,
    chunk_count: u64,
    done: bool,
}

impl ChunkDrain {
    pub fn new(rx: ChunkReceiver, opts: CollectOptions) -> Self {
        Self {
            rx,
            opts,
            started: Instant::now(),
            buffer: Vec::new(),
            chunk_count: 0,
            done: false,
        }
    }

    pub fn chunk_count(&self) -> u64 {
        self.chunk_count
    }

    pub fn samples_so_far(&self) -> usize {
        self.buffer.len()
    }

    /// Pull until the next chunk, completion, or a terminal error. After
    /// `Complete`, call [`ChunkDrain::finish`].
    pub async fn step(&mut self) -> Result<DrainStep, GenerateError> {
        debug_assert!(!self.done, "step called after completion");
        loop {
            let elapsed = self.started.elapsed();
            if elapsed >= self.opts.deadline {
                return Err(GenerateError::TimedOut { waited: elapsed });
            }
            let remaining = self.opts.deadline - elapsed;
            let base = if self.chunk_count == 0 {
                self.opts.first_chunk_wait
            } else {
                self.opts.poll_timeout
            };
            match self.rx.pull(base.min(remaining)).await {
                Pull::Chunk(chunk) => {
                    // The channel never reorders; arrival order is
                    // generation order.
                    debug_assert_eq!(chunk.seq(), self.chunk_count);
                    let samples = chunk.len();
                    self.buffer.extend_from_slice(chunk.samples());
                    self.chunk_count += 1;
                    return Ok(DrainStep::Chunk {
                        seq: self.chunk_count - 1,
                        samples,
                    });
                }
                Pull::Closed => {
                    if self.chunk_count == 0 {
                        return Err(GenerateError::Empty);
                    }
                    self.done = true;
                    return Ok(DrainStep::Complete);
                }
                Pull::Failed(reason) => {
                    // Whatever arrived so far is discarded; a partial
                    // buffer is never surfaced as success.
                    return Err(GenerateError::Failed(reason));
                }
                Pull::TimedOut => continue,
            }
        }
    }

    /// Consume the drain after `Complete` and hand back the buffer.
    pub fn finish(self, sample_rate: u32) -> AssembledAudio {
        debug_assert!(self.done, "finish called before completion");
        AssembledAudio::new(self.buffer, sample_rate)
    }
}

/// Drain the whole channel and assemble the result.
pub async fn collect(
    rx: ChunkReceiver,
    sample_rate: u32,
    opts: CollectOptions,
) -> Result<AssembledAudio, GenerateError> {
    let mut drain = ChunkDrain::new(rx, opts);
    loop {
        if let DrainStep::Complete = drain.step().await? {
            return Ok(drain.finish(sample_rate));
        }
    }
}
