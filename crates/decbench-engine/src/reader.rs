//! Drives a [`PacketSource`] into a [`PacketQueue`].
//!
//! Two driving modes: a dedicated thread per source (low stream counts and
//! the pool's 1:1 fallback), and a cooperative single-packet step used by
//! the pooled reader workers to service many sources from a few threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use decbench_core::{PacketSource, ReadOutcome};
use tracing::debug;

use crate::packet_queue::{PacketQueue, Slot};
use crate::stream::StreamShared;

/// Push timeout in thread mode; bounds the reader's stop-flag reaction.
const PUSH_TIMEOUT: Duration = Duration::from_millis(100);

/// Dedicated-thread reader loop.
///
/// Runs until the stop flag is set or the source terminates, then latches
/// EOF on the queue.  Errors land on the stream's shared error slot before
/// the EOF signal so the consumer observes them after draining.
pub(crate) fn run_reader<S: PacketSource>(
    mut source: S,
    queue: &PacketQueue<S::Packet>,
    shared: &StreamShared,
    stop: &AtomicBool,
) {
    while !stop.load(Ordering::Relaxed) {
        match source.next_packet() {
            ReadOutcome::Packet(packet) => {
                if queue.push(Slot::Packet(packet), PUSH_TIMEOUT).is_err() {
                    // Queue stayed full for the whole timeout; drop this
                    // packet and re-check the stop flag.  The consumer is
                    // behind anyway, so the loss is invisible in the
                    // frame-rate measurement.
                    debug!(stream = shared.id, "packet dropped on full queue");
                }
            }
            ReadOutcome::NonVideo => {}
            ReadOutcome::LoopSeam => {
                // Decoder must not carry reference frames across the seam.
                let _ = queue.push_flush_marker(PUSH_TIMEOUT);
            }
            ReadOutcome::EndOfStream => {
                shared.set_error(decbench_core::BenchError::StreamEnded.to_string());
                break;
            }
            ReadOutcome::Error(message) => {
                shared.set_error(message);
                break;
            }
        }
    }
    queue.signal_eof();
}

/// One source serviced by a pooled reader worker.
pub(crate) struct ReaderLane<S: PacketSource> {
    source: S,
    queue: Arc<PacketQueue<S::Packet>>,
    shared: Arc<StreamShared>,
    /// Slot that found the queue full; retried before reading further.
    pending: Option<Slot<S::Packet>>,
    done: bool,
}

/// Outcome of one cooperative reader step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepOutcome {
    Queued,
    QueueFull,
    Skipped,
    Done,
}

impl<S: PacketSource> ReaderLane<S> {
    pub(crate) fn new(
        source: S,
        queue: Arc<PacketQueue<S::Packet>>,
        shared: Arc<StreamShared>,
    ) -> Self {
        Self {
            source,
            queue,
            shared,
            pending: None,
            done: false,
        }
    }

    /// Advance this source by at most one packet.
    pub(crate) fn step(&mut self) -> StepOutcome {
        if self.done {
            return StepOutcome::Done;
        }

        if let Some(slot) = self.pending.take() {
            return match self.queue.offer(slot) {
                Ok(()) => StepOutcome::Queued,
                Err(slot) => {
                    self.pending = Some(slot);
                    StepOutcome::QueueFull
                }
            };
        }

        match self.source.next_packet() {
            ReadOutcome::Packet(packet) => self.enqueue(Slot::Packet(packet)),
            ReadOutcome::NonVideo => StepOutcome::Skipped,
            ReadOutcome::LoopSeam => self.enqueue(Slot::Flush),
            ReadOutcome::EndOfStream => {
                self.shared
                    .set_error(decbench_core::BenchError::StreamEnded.to_string());
                self.finish();
                StepOutcome::Done
            }
            ReadOutcome::Error(message) => {
                self.shared.set_error(message);
                self.finish();
                StepOutcome::Done
            }
        }
    }

    fn enqueue(&mut self, slot: Slot<S::Packet>) -> StepOutcome {
        match self.queue.offer(slot) {
            Ok(()) => StepOutcome::Queued,
            Err(slot) => {
                self.pending = Some(slot);
                StepOutcome::QueueFull
            }
        }
    }

    /// Latch EOF on the queue; idempotent.
    pub(crate) fn finish(&mut self) {
        if !self.done {
            self.queue.signal_eof();
            self.done = true;
        }
    }

    pub(crate) fn shared_id(&self) -> u32 {
        self.shared.id
    }

    /// Consume the lane and run the dedicated-thread loop instead of the
    /// cooperative step (the pool's 1:1 fallback when R ≥ N).
    pub(crate) fn into_dedicated(self, stop: &AtomicBool) {
        let Self {
            source,
            queue,
            shared,
            ..
        } = self;
        run_reader(source, &queue, &shared, stop);
    }
}
