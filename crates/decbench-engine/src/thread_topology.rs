//! Per-stream thread topology.
//!
//! One reader thread plus one decoder thread per stream; used while the
//! stream count stays below the core count, where `2N + 1` OS threads are
//! cheap.  The start barrier's arrival count is `N + 1` (controller + N
//! decoder threads); readers do not barrier — they may start immediately
//! because they block on the channel.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Barrier};
use std::thread::JoinHandle;
use std::time::Instant;

use decbench_core::MediaBackend;
use tracing::debug;

use crate::decode::run_single_stream;
use crate::pacing::{frame_interval_ns, now_ns};
use crate::packet_queue::PacketQueue;
use crate::reader::run_reader;
use crate::stream::{StreamShared, StreamStats};

pub struct ThreadTopology {
    shareds: Vec<Arc<StreamShared>>,
    handles: Vec<JoinHandle<StreamStats>>,
}

impl ThreadTopology {
    /// Spawn N reader/decoder thread pairs.
    ///
    /// Per-stream construction happens on the decoder thread itself; a
    /// stream that fails to open records the error, still arrives at the
    /// barrier so no participant deadlocks, and exits.
    pub fn launch<B: MediaBackend>(
        backend: &Arc<B>,
        stream_count: u32,
        target_fps: f64,
        queue_capacity: usize,
        barrier: &Arc<Barrier>,
        stop: &Arc<AtomicBool>,
    ) -> Self {
        let anchor = Instant::now();
        let interval_ns = frame_interval_ns(target_fps);

        let shareds: Vec<_> = (0..stream_count)
            .map(|id| Arc::new(StreamShared::new(id)))
            .collect();

        let handles = shareds
            .iter()
            .map(|shared| {
                let backend = Arc::clone(backend);
                let shared = Arc::clone(shared);
                let barrier = Arc::clone(barrier);
                let stop = Arc::clone(stop);

                std::thread::Builder::new()
                    .name(format!("decode-{}", shared.id))
                    .spawn(move || {
                        decode_thread(
                            &backend,
                            shared,
                            stream_count,
                            queue_capacity,
                            interval_ns,
                            anchor,
                            &barrier,
                            &stop,
                        )
                    })
                    .expect("spawn decode thread")
            })
            .collect();

        Self { shareds, handles }
    }

    pub fn shareds(&self) -> &[Arc<StreamShared>] {
        &self.shareds
    }

    /// Join every decoder thread (each joins its own reader) and collect
    /// per-stream statistics.
    pub fn join(self) -> Vec<StreamStats> {
        self.handles
            .into_iter()
            .map(|handle| handle.join().expect("decode thread panicked"))
            .collect()
    }
}

#[allow(clippy::too_many_arguments)]
fn decode_thread<B: MediaBackend>(
    backend: &Arc<B>,
    shared: Arc<StreamShared>,
    stream_count: u32,
    queue_capacity: usize,
    interval_ns: u64,
    anchor: Instant,
    barrier: &Barrier,
    stop: &Arc<AtomicBool>,
) -> StreamStats {
    let stream_id = shared.id;

    let (source, mut decoder) = match backend.open_stream(stream_count) {
        Ok(pair) => pair,
        Err(err) => {
            shared.set_error(err.to_string());
            barrier.wait();
            return StreamStats {
                stream_id,
                frames: 0,
                lag_count: 0,
                max_lag_ms: 0.0,
                error: shared.error(),
            };
        }
    };

    let queue = Arc::new(PacketQueue::new(queue_capacity));

    let reader_handle = {
        let queue = Arc::clone(&queue);
        let shared = Arc::clone(&shared);
        let stop = Arc::clone(stop);
        std::thread::Builder::new()
            .name(format!("reader-{stream_id}"))
            .spawn(move || run_reader(source, &queue, &shared, &stop))
            .expect("spawn reader thread")
    };

    barrier.wait();
    let start_ns = now_ns(anchor);

    let (frames, clock) = run_single_stream(
        &mut decoder,
        &queue,
        &shared,
        stop,
        anchor,
        start_ns,
        interval_ns,
    );

    // The reader observes the stop flag within one push timeout.
    reader_handle.join().expect("reader thread panicked");
    debug!(stream = stream_id, frames, "stream finished");

    StreamStats {
        stream_id,
        frames,
        lag_count: clock.lag_count,
        max_lag_ms: clock.max_lag_ms,
        error: shared.error(),
    }
}
