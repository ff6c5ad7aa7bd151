//! Bounded many-producer/single-consumer packet channel.
//!
//! Decouples I/O (reading) from CPU-intensive decoding.  A slot is either a
//! real packet or an in-band flush marker that tells the consumer to reset
//! decoder state at a file-loop seam.  Once EOF is latched no further pushes
//! succeed; pops drain the remaining slots and then report closed.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// One queue entry.
pub enum Slot<T> {
    Packet(T),
    /// Instructs the consumer to flush decoder buffers, then continue.
    Flush,
}

type SpaceCallback = Box<dyn Fn() + Send + Sync>;

struct Inner<T> {
    slots: VecDeque<Slot<T>>,
    eof: bool,
}

/// Thread-safe bounded queue of compressed packets.
///
/// One mutex guards the slot buffer; two condvars signal "not full" and
/// "not empty".  The optional space callback runs after each successful pop,
/// strictly outside the queue lock — it must never reacquire it.
pub struct PacketQueue<T> {
    inner: Mutex<Inner<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
    space_callback: Mutex<Option<SpaceCallback>>,
}

impl<T> PacketQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: VecDeque::with_capacity(capacity),
                eof: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
            space_callback: Mutex::new(None),
        }
    }

    /// Block up to `timeout` for space, then enqueue `slot`.
    ///
    /// Returns the slot back on timeout or if EOF is already latched, so
    /// the producer can retry or release it.
    pub fn push(&self, slot: Slot<T>, timeout: Duration) -> Result<(), Slot<T>> {
        let guard = self.inner.lock().unwrap();
        let (mut guard, wait) = self
            .not_full
            .wait_timeout_while(guard, timeout, |inner| {
                inner.slots.len() >= self.capacity && !inner.eof
            })
            .unwrap();

        if wait.timed_out() || guard.eof {
            return Err(slot);
        }

        guard.slots.push_back(slot);
        drop(guard);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Enqueue the in-band flush marker.  Same blocking behavior as
    /// [`PacketQueue::push`].
    pub fn push_flush_marker(&self, timeout: Duration) -> bool {
        self.push(Slot::Flush, timeout).is_ok()
    }

    /// Enqueue without blocking.  Returns the slot back when full or closed.
    pub fn offer(&self, slot: Slot<T>) -> Result<(), Slot<T>> {
        let mut guard = self.inner.lock().unwrap();
        if guard.eof || guard.slots.len() >= self.capacity {
            return Err(slot);
        }
        guard.slots.push_back(slot);
        drop(guard);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Latch EOF and wake every waiter on both sides.
    pub fn signal_eof(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.eof = true;
        drop(guard);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Block up to `timeout` for a slot.
    ///
    /// `None` means timeout *or* closed; [`PacketQueue::is_eof`]
    /// distinguishes the two.  After a successful pop the space callback is
    /// invoked with the lock released.
    pub fn pop(&self, timeout: Duration) -> Option<Slot<T>> {
        let popped = {
            let guard = self.inner.lock().unwrap();
            let (mut guard, _wait) = self
                .not_empty
                .wait_timeout_while(guard, timeout, |inner| {
                    inner.slots.is_empty() && !inner.eof
                })
                .unwrap();

            let slot = guard.slots.pop_front();
            if slot.is_some() {
                self.not_full.notify_one();
            }
            slot
        };

        if popped.is_some() {
            // Wake pooled readers after releasing the queue lock so the
            // callback can never deadlock against it.
            if let Some(callback) = self.space_callback.lock().unwrap().as_ref() {
                callback();
            }
        }
        popped
    }

    /// EOF latched and all slots drained.
    pub fn is_eof(&self) -> bool {
        let guard = self.inner.lock().unwrap();
        guard.eof && guard.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Install the hook invoked (outside the lock) after each pop.
    pub fn set_space_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.space_callback.lock().unwrap() = Some(Box::new(callback));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    const SHORT: Duration = Duration::from_millis(10);

    fn packet_queue(capacity: usize) -> PacketQueue<u32> {
        PacketQueue::new(capacity)
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let q = packet_queue(4);
        for i in 0..4 {
            assert!(q.push(Slot::Packet(i), SHORT).is_ok());
        }
        assert_eq!(q.len(), 4);
        // Fifth push times out and hands the packet back.
        match q.push(Slot::Packet(99), SHORT) {
            Err(Slot::Packet(99)) => {}
            _ => panic!("expected push to time out with the packet returned"),
        }
        assert_eq!(q.len(), 4);
    }

    #[test]
    fn pop_returns_fifo_order_with_flush_markers_in_band() {
        let q = packet_queue(8);
        q.push(Slot::Packet(1), SHORT).ok().unwrap();
        q.push(Slot::Flush, SHORT).ok().unwrap();
        q.push(Slot::Packet(2), SHORT).ok().unwrap();

        assert!(matches!(q.pop(SHORT), Some(Slot::Packet(1))));
        assert!(matches!(q.pop(SHORT), Some(Slot::Flush)));
        assert!(matches!(q.pop(SHORT), Some(Slot::Packet(2))));
        assert!(q.pop(SHORT).is_none());
    }

    #[test]
    fn eof_rejects_pushes_and_drains_then_closes() {
        let q = packet_queue(8);
        q.push(Slot::Packet(7), SHORT).ok().unwrap();
        q.signal_eof();

        assert!(q.push(Slot::Packet(8), SHORT).is_err());
        assert!(!q.is_eof(), "not closed until drained");
        assert!(matches!(q.pop(SHORT), Some(Slot::Packet(7))));
        assert!(q.is_eof());
        assert!(q.pop(SHORT).is_none());
    }

    #[test]
    fn eof_wakes_blocked_producer_immediately() {
        let q = Arc::new(packet_queue(1));
        q.push(Slot::Packet(0), SHORT).ok().unwrap();

        let q2 = Arc::clone(&q);
        let handle = std::thread::spawn(move || {
            // Would block for a full second without the EOF wakeup.
            q2.push(Slot::Packet(1), Duration::from_secs(1))
        });

        std::thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        q.signal_eof();
        assert!(handle.join().unwrap().is_err());
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn offer_fails_when_full_without_blocking() {
        let q = packet_queue(1);
        assert!(q.offer(Slot::Packet(1)).is_ok());
        let start = Instant::now();
        assert!(q.offer(Slot::Packet(2)).is_err());
        assert!(start.elapsed() < Duration::from_millis(5));
    }

    #[test]
    fn space_callback_runs_outside_the_lock() {
        let q = Arc::new(packet_queue(2));
        let hits = Arc::new(AtomicUsize::new(0));

        let q2 = Arc::clone(&q);
        let hits2 = Arc::clone(&hits);
        // Re-enters the queue API; deadlocks inside pop() if the lock were
        // still held when the callback runs.
        q.set_space_callback(move || {
            let _ = q2.len();
            hits2.fetch_add(1, Ordering::Relaxed);
        });

        q.push(Slot::Packet(1), SHORT).ok().unwrap();
        assert!(matches!(q.pop(SHORT), Some(Slot::Packet(1))));
        assert_eq!(hits.load(Ordering::Relaxed), 1);

        // Timeout pops do not fire the callback.
        assert!(q.pop(SHORT).is_none());
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn pop_wakes_on_push_from_another_thread() {
        let q = Arc::new(packet_queue(4));
        let q2 = Arc::clone(&q);
        let handle = std::thread::spawn(move || q2.pop(Duration::from_secs(2)));
        std::thread::sleep(Duration::from_millis(20));
        q.push(Slot::Packet(42), SHORT).ok().unwrap();
        assert!(matches!(handle.join().unwrap(), Some(Slot::Packet(42))));
    }
}
