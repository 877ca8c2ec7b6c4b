//! Bounded, drop-oldest capture queue (spec.md §5): the capture thread
//! pushes `RawPacket`s, the pipeline thread blocks popping them. When full,
//! the oldest queued packet is evicted to make room rather than blocking
//! the capture thread — the capture interface cannot apply backpressure to
//! the wire.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use meter_capture::RawPacket;

/// Default bound (spec.md §5 names no exact number; this follows the
/// teacher's channel-capacity convention of a few thousand in-flight items,
/// e.g. `services/forwarder`'s broadcast channel capacity).
pub const DEFAULT_CAPACITY: usize = 4096;

#[derive(Default)]
struct Inner {
    items: VecDeque<RawPacket>,
    closed: bool,
}

/// Single-producer single-consumer, bounded, drop-oldest. `push` never
/// blocks; `pop` blocks (with a timeout, so the pipeline thread can observe
/// shutdown) until an item is available or the queue is closed and drained.
pub struct CaptureQueue {
    capacity: usize,
    inner: Mutex<Inner>,
    not_empty: Condvar,
    dropped_total: AtomicU64,
}

impl CaptureQueue {
    pub fn new(capacity: usize) -> Self {
        CaptureQueue {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
            not_empty: Condvar::new(),
            dropped_total: AtomicU64::new(0),
        }
    }

    /// Pushes one packet, evicting the oldest queued packet first if the
    /// queue is already at capacity (spec.md §7's `CaptureQueueFull`).
    pub fn push(&self, packet: RawPacket) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.items.len() >= self.capacity {
            inner.items.pop_front();
            self.dropped_total.fetch_add(1, Ordering::Relaxed);
        }
        inner.items.push_back(packet);
        self.not_empty.notify_one();
    }

    /// Blocks up to `timeout` for the next packet. Returns `None` on
    /// timeout (the caller re-checks its shutdown flag) or once the queue
    /// has been closed and fully drained.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<RawPacket> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(packet) = inner.items.pop_front() {
                return Some(packet);
            }
            if inner.closed {
                return None;
            }
            let (guard, result) = self
                .not_empty
                .wait_timeout(inner, timeout)
                .unwrap_or_else(|e| e.into_inner());
            inner = guard;
            if result.timed_out() && inner.items.is_empty() {
                return None;
            }
        }
    }

    /// Marks the queue closed and wakes any blocked consumer; queued items
    /// are still drained by subsequent `pop_timeout` calls.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.closed = true;
        self.not_empty.notify_all();
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meter_proto::Endpoint;
    use std::net::Ipv4Addr;

    fn packet(ts: i64) -> RawPacket {
        RawPacket {
            ts_usec: ts,
            src: Endpoint::new(Ipv4Addr::new(10, 0, 0, 1), 5055),
            dst: Endpoint::new(Ipv4Addr::new(10, 0, 0, 2), 5056),
            payload: Vec::new(),
        }
    }

    #[test]
    fn pops_in_fifo_order() {
        let q = CaptureQueue::new(4);
        q.push(packet(1));
        q.push(packet(2));
        assert_eq!(q.pop_timeout(Duration::from_millis(10)).unwrap().ts_usec, 1);
        assert_eq!(q.pop_timeout(Duration::from_millis(10)).unwrap().ts_usec, 2);
    }

    #[test]
    fn drops_oldest_when_full() {
        let q = CaptureQueue::new(2);
        q.push(packet(1));
        q.push(packet(2));
        q.push(packet(3));
        assert_eq!(q.dropped_total(), 1);
        assert_eq!(q.pop_timeout(Duration::from_millis(10)).unwrap().ts_usec, 2);
        assert_eq!(q.pop_timeout(Duration::from_millis(10)).unwrap().ts_usec, 3);
    }

    #[test]
    fn pop_times_out_on_empty_queue() {
        let q = CaptureQueue::new(2);
        assert!(q.pop_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn closed_and_drained_queue_returns_none() {
        let q = CaptureQueue::new(2);
        q.push(packet(1));
        q.close();
        assert_eq!(q.pop_timeout(Duration::from_millis(10)).unwrap().ts_usec, 1);
        assert!(q.pop_timeout(Duration::from_millis(10)).is_none());
    }
}
