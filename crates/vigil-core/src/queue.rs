// crates/vigil-core/src/queue.rs
//
// Bounded FIFO with drop-oldest overflow — the only channel between stages.
//
// A live producer can never be back-pressured without corrupting the source
// timeline, so `enqueue` never blocks: a full queue evicts its head to admit
// the new tail, and the evicted item's `Drop` releases whatever it holds
// (for frames, the refcounted pixel buffer). Consumers block with a bounded
// timeout so they keep observing the cancellation token.
//
// Locking: one mutex guards `{items, closed}`, one condvar wakes dequeue
// waiters. Evicted and rejected items are dropped strictly after the guard
// is released — item destructors can call into libavutil and must never run
// under the queue lock.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Outcome of a non-blocking `enqueue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    /// Appended with room to spare.
    Enqueued,
    /// Appended after evicting the oldest item.
    DroppedOldest,
    /// Queue is closed; the item was released.
    Closed,
}

/// Why a dequeue returned no item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DequeueError {
    /// Non-blocking dequeue found nothing buffered.
    Empty,
    /// Timed dequeue hit its deadline.
    TimedOut,
    /// Closed and fully drained — the consumer's signal to exit.
    Closed,
}

pub struct FrameQueue<T> {
    inner:    Mutex<Inner<T>>,
    cond:     Condvar,
    capacity: usize,
}

struct Inner<T> {
    items:  VecDeque<T>,
    closed: bool,
}

impl<T> FrameQueue<T> {
    /// `capacity` must be at least 1.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            inner: Mutex::new(Inner {
                items:  VecDeque::with_capacity(capacity),
                closed: false,
            }),
            cond: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Append `item`, evicting the head if the queue is full. Never blocks.
    pub fn enqueue(&self, item: T) -> Enqueue {
        let evicted;
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                // `item` is dropped after the guard; see drop ordering below.
                return Enqueue::Closed;
            }
            evicted = if inner.items.len() == self.capacity {
                inner.items.pop_front()
            } else {
                None
            };
            inner.items.push_back(item);
            self.cond.notify_one();
        }
        // The evicted item is released here, outside the lock.
        match evicted {
            Some(_) => Enqueue::DroppedOldest,
            None => Enqueue::Enqueued,
        }
    }

    /// Block until an item is available or the queue is closed *and* drained.
    pub fn dequeue(&self) -> Result<T, DequeueError> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Ok(item);
            }
            if inner.closed {
                return Err(DequeueError::Closed);
            }
            self.cond.wait(&mut inner);
        }
    }

    /// Like `dequeue`, but gives up after `timeout` so the caller can poll
    /// its cancellation token.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Result<T, DequeueError> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Ok(item);
            }
            if inner.closed {
                return Err(DequeueError::Closed);
            }
            if self.cond.wait_until(&mut inner, deadline).timed_out() {
                return Err(DequeueError::TimedOut);
            }
        }
    }

    /// Non-blocking dequeue.
    pub fn try_dequeue(&self) -> Result<T, DequeueError> {
        let mut inner = self.inner.lock();
        if let Some(item) = inner.items.pop_front() {
            return Ok(item);
        }
        if inner.closed {
            Err(DequeueError::Closed)
        } else {
            Err(DequeueError::Empty)
        }
    }

    /// Refuse further enqueues and wake every blocked dequeuer. Idempotent.
    /// Buffered items remain dequeuable until drained.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if !inner.closed {
            inner.closed = true;
            self.cond.notify_all();
        }
    }
}

// Dropping the queue drains it; each remaining item's own Drop releases its
// resources. No explicit destroy step is needed.

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    /// Counts drops so tests can verify release-exactly-once.
    struct Tracked {
        value: u64,
        drops: Arc<AtomicUsize>,
    }

    impl Tracked {
        fn new(value: u64, drops: &Arc<AtomicUsize>) -> Self {
            Self { value, drops: Arc::clone(drops) }
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn fifo_order_without_overflow() {
        let q = FrameQueue::new(8);
        for i in 0..5u64 {
            assert_eq!(q.enqueue(i), Enqueue::Enqueued);
        }
        for i in 0..5u64 {
            assert_eq!(q.dequeue().unwrap(), i);
        }
    }

    #[test]
    fn overflow_drops_oldest() {
        // Capacity 3, enqueue 1..=5: queue ends as [3, 4, 5] and the two
        // evicted items have been released.
        let drops = Arc::new(AtomicUsize::new(0));
        let q = FrameQueue::new(3);
        for i in 1..=5u64 {
            q.enqueue(Tracked::new(i, &drops));
        }
        assert_eq!(q.len(), 3);
        assert_eq!(drops.load(Ordering::SeqCst), 2);
        for expected in 3..=5u64 {
            assert_eq!(q.dequeue().unwrap().value, expected);
        }
    }

    #[test]
    fn length_never_exceeds_capacity() {
        let q = FrameQueue::new(4);
        for i in 0..100u64 {
            q.enqueue(i);
            assert!(q.len() <= q.capacity());
        }
    }

    #[test]
    fn try_dequeue_reports_empty_then_closed() {
        let q = FrameQueue::<u64>::new(2);
        assert_eq!(q.try_dequeue().unwrap_err(), DequeueError::Empty);
        q.close();
        assert_eq!(q.try_dequeue().unwrap_err(), DequeueError::Closed);
    }

    #[test]
    fn enqueue_after_close_releases_item() {
        let drops = Arc::new(AtomicUsize::new(0));
        let q = FrameQueue::new(2);
        q.close();
        assert_eq!(q.enqueue(Tracked::new(1, &drops)), Enqueue::Closed);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_serves_buffered_items_before_closed() {
        let q = FrameQueue::new(4);
        q.enqueue(1u64);
        q.enqueue(2u64);
        q.close();
        assert_eq!(q.dequeue().unwrap(), 1);
        assert_eq!(q.dequeue().unwrap(), 2);
        assert_eq!(q.dequeue().unwrap_err(), DequeueError::Closed);
    }

    #[test]
    fn close_wakes_blocked_dequeuer() {
        let q = Arc::new(FrameQueue::<u64>::new(2));
        let consumer = Arc::clone(&q);
        let handle = thread::spawn(move || consumer.dequeue());
        thread::sleep(Duration::from_millis(20));
        q.close();
        assert_eq!(handle.join().unwrap().unwrap_err(), DequeueError::Closed);
    }

    #[test]
    fn dequeue_timeout_expires() {
        let q = FrameQueue::<u64>::new(2);
        let start = Instant::now();
        assert_eq!(
            q.dequeue_timeout(Duration::from_millis(30)).unwrap_err(),
            DequeueError::TimedOut
        );
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn blocked_dequeue_receives_later_enqueue() {
        let q = Arc::new(FrameQueue::<u64>::new(2));
        let consumer = Arc::clone(&q);
        let handle = thread::spawn(move || consumer.dequeue().unwrap());
        thread::sleep(Duration::from_millis(20));
        q.enqueue(42);
        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn shutdown_with_full_queue_releases_everything() {
        // Fill to capacity, close, consume until Closed, then drop the queue:
        // every item must be released exactly once.
        let drops = Arc::new(AtomicUsize::new(0));
        let q = FrameQueue::new(60);
        for i in 0..60u64 {
            q.enqueue(Tracked::new(i, &drops));
        }
        q.close();
        let mut consumed = 0;
        while q.dequeue().is_ok() {
            consumed += 1;
        }
        assert_eq!(consumed, 60);
        drop(q);
        assert_eq!(drops.load(Ordering::SeqCst), 60);
    }

    #[test]
    fn dropping_queue_releases_buffered_items() {
        let drops = Arc::new(AtomicUsize::new(0));
        let q = FrameQueue::new(8);
        for i in 0..5u64 {
            q.enqueue(Tracked::new(i, &drops));
        }
        drop(q);
        assert_eq!(drops.load(Ordering::SeqCst), 5);
    }
}
