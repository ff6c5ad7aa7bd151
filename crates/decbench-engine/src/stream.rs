//! Per-stream shared state.
//!
//! Each stream's mutable decode state (decoder, pacing clock, local
//! counters) is owned by exactly one worker at a time; what other threads
//! need to observe lives here behind atomics.  Workers exclude each other
//! either by dedicated assignment or through the `claimed` CAS — no
//! per-stream mutex.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

/// Cross-thread view of one stream.
pub struct StreamShared {
    pub id: u32,
    /// Frame counter published in batches; authoritative only after the
    /// owning worker's final publish.
    frames_decoded: AtomicI64,
    has_error: AtomicBool,
    finished: AtomicBool,
    /// Worker exclusion flag (CAS based).
    claimed: AtomicBool,
    /// Next scheduled frame deadline, nanoseconds from the topology anchor.
    next_frame_ns: AtomicU64,
    error: Mutex<Option<String>>,
}

impl StreamShared {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            frames_decoded: AtomicI64::new(0),
            has_error: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            claimed: AtomicBool::new(false),
            next_frame_ns: AtomicU64::new(0),
            error: Mutex::new(None),
        }
    }

    // ── Frame counter ────────────────────────────────────────────────

    /// Batch publish from the owning worker.  Relaxed: readers only use it
    /// for progress display; the final value is re-published at join.
    pub fn publish_frames(&self, total: i64) {
        self.frames_decoded.store(total, Ordering::Relaxed);
    }

    pub fn frames(&self) -> i64 {
        self.frames_decoded.load(Ordering::Relaxed)
    }

    // ── Error / completion ───────────────────────────────────────────

    /// Record the first error for this stream.  Release store so the
    /// message is visible to whoever observes `has_error`.
    pub fn set_error(&self, message: impl Into<String>) {
        let mut slot = self.error.lock().unwrap();
        if slot.is_none() {
            *slot = Some(message.into());
        }
        drop(slot);
        self.has_error.store(true, Ordering::Release);
    }

    pub fn has_error(&self) -> bool {
        self.has_error.load(Ordering::Acquire)
    }

    pub fn error(&self) -> Option<String> {
        self.error.lock().unwrap().clone()
    }

    pub fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }

    // ── Worker exclusion ─────────────────────────────────────────────

    /// Claim exclusive access.  CAS false→true with acquire semantics.
    pub fn try_claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Release exclusive access.
    pub fn release(&self) {
        self.claimed.store(false, Ordering::Release);
    }

    /// Whether a pool worker should process this stream right now.
    pub fn is_ready(&self, now_ns: u64) -> bool {
        !self.finished.load(Ordering::Relaxed)
            && !self.has_error.load(Ordering::Relaxed)
            && !self.claimed.load(Ordering::Relaxed)
            && now_ns >= self.next_frame_ns.load(Ordering::Relaxed)
    }

    // ── Pacing deadline ──────────────────────────────────────────────

    /// Set by pool worker 0 during the init handshake, then maintained by
    /// the owning worker.
    pub fn store_next_frame_ns(&self, ns: u64) {
        self.next_frame_ns.store(ns, Ordering::Relaxed);
    }

    pub fn next_frame_ns(&self) -> u64 {
        self.next_frame_ns.load(Ordering::Relaxed)
    }
}

/// Final per-stream statistics, collected after a topology joins.
#[derive(Debug, Clone)]
pub struct StreamStats {
    pub stream_id: u32,
    pub frames: i64,
    pub lag_count: i64,
    pub max_lag_ms: f64,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_is_exclusive_until_released() {
        let s = StreamShared::new(0);
        assert!(s.try_claim());
        assert!(!s.try_claim());
        s.release();
        assert!(s.try_claim());
    }

    #[test]
    fn first_error_wins() {
        let s = StreamShared::new(3);
        s.set_error("first");
        s.set_error("second");
        assert!(s.has_error());
        assert_eq!(s.error().as_deref(), Some("first"));
    }

    #[test]
    fn readiness_tracks_deadline_and_flags() {
        let s = StreamShared::new(1);
        s.store_next_frame_ns(1_000);
        assert!(!s.is_ready(999));
        assert!(s.is_ready(1_000));

        assert!(s.try_claim());
        assert!(!s.is_ready(2_000));
        s.release();

        s.mark_finished();
        assert!(!s.is_ready(2_000));
    }
}
